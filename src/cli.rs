//! Command line surface of the `cscs-debugger` binary.

use clap::{Parser, Subcommand};

use crate::config::ConnectionConfig;

#[derive(Debug, Parser)]
#[command(
    name = "cscs-debugger",
    version,
    about = "Debug adapter and REPL for CSCS scripts",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    mode: Option<Mode>,

    /// Same as the `dap` subcommand; kept for launchers that pass a flag
    #[arg(long, alias = "debug-adapter", hide = true)]
    dap: bool,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Mode {
    /// Serve the Debug Adapter Protocol on stdin/stdout (default)
    Dap,
    /// Interactive REPL in the terminal
    Repl(ConnectionConfig),
    /// REPL host speaking JSON lines on stdin/stdout
    Webview(ConnectionConfig),
}

impl Cli {
    /// The mode to run. `--dap` and a missing subcommand both mean DAP.
    pub fn into_mode(self) -> Mode {
        if self.dap {
            return Mode::Dap;
        }
        self.mode.unwrap_or(Mode::Dap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode_of(args: &[&str]) -> Mode {
        Cli::try_parse_from(args).unwrap().into_mode()
    }

    #[test]
    fn dap_flag_and_alias_select_dap() {
        assert_eq!(mode_of(&["cscs-debugger", "--dap"]), Mode::Dap);
        assert_eq!(mode_of(&["cscs-debugger", "--debug-adapter"]), Mode::Dap);
        assert_eq!(mode_of(&["cscs-debugger"]), Mode::Dap);
    }

    #[test]
    fn subcommands_select_their_mode() {
        assert!(matches!(mode_of(&["cscs-debugger", "repl"]), Mode::Repl(_)));
        assert!(matches!(
            mode_of(&["cscs-debugger", "webview", "--port", "9000"]),
            Mode::Webview(ref c) if c.port == 9000
        ));
    }

    #[test]
    fn dap_flag_with_another_mode_is_rejected() {
        assert!(Cli::try_parse_from(["cscs-debugger", "--dap", "repl"]).is_err());
    }
}
