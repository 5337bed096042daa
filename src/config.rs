use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONNECT_TYPE_SOCKETS: &str = "sockets";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 13337;

/// How long a REPL submission waits for its reply.
pub const REPL_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

const LOCAL_CONNECT_TIMEOUT: Duration = Duration::from_millis(3500);
const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the interpreter server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, clap::Args)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
    /// Connection type; only `sockets` is supported
    #[arg(long, default_value = CONNECT_TYPE_SOCKETS, help_heading = "Connection")]
    pub connect_type: String,
    /// Host name or address of the interpreter server
    #[serde(rename = "serverHost")]
    #[arg(
        long,
        default_value = DEFAULT_HOST,
        env = "CSCS_SERVER_HOST",
        help_heading = "Connection"
    )]
    pub host: String,
    /// Port of the interpreter server
    #[serde(rename = "serverPort")]
    #[arg(
        long,
        default_value_t = DEFAULT_PORT,
        env = "CSCS_SERVER_PORT",
        help_heading = "Connection"
    )]
    pub port: u16,
    /// Directory on the server that local file names are mapped onto
    #[arg(long, default_value = "", value_name = "DIR", help_heading = "Connection")]
    pub server_base: String,
    /// Log bridge traffic at debug level
    #[arg(long, help_heading = "Connection")]
    pub trace: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_type: CONNECT_TYPE_SOCKETS.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            server_base: String::new(),
            trace: false,
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_type != CONNECT_TYPE_SOCKETS {
            return Err(Error::UnsupportedConnectType(self.connect_type.clone()));
        }
        Ok(())
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self.host.as_str(), "" | "127.0.0.1" | "localhost")
    }

    pub fn connect_timeout(&self) -> Duration {
        if self.is_loopback() {
            LOCAL_CONNECT_TIMEOUT
        } else {
            REMOTE_CONNECT_TIMEOUT
        }
    }

    /// Server base used for path translation. A server on `127.0.0.1` shares
    /// our filesystem, so no translation happens.
    pub fn effective_server_base(&self) -> &str {
        if self.host == DEFAULT_HOST {
            ""
        } else {
            &self.server_base
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_arguments_use_editor_names() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"connectType":"sockets","serverHost":"10.0.0.2","serverPort":9000,"serverBase":"/srv"}"#,
        )
        .unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 9000);
        assert_eq!(config.effective_server_base(), "/srv");
        assert_eq!(config.connect_timeout(), REMOTE_CONNECT_TIMEOUT);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ConnectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConnectionConfig::default());
        assert_eq!(config.connect_timeout(), LOCAL_CONNECT_TIMEOUT);
    }

    #[test]
    fn loopback_ignores_server_base() {
        let config = ConnectionConfig {
            server_base: "/srv".to_string(),
            ..ConnectionConfig::default()
        };
        assert_eq!(config.effective_server_base(), "");
    }

    #[test]
    fn rejects_other_connect_types() {
        let config = ConnectionConfig {
            connect_type: "pipes".to_string(),
            ..ConnectionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
