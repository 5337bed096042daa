use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cscs_debugger::config::ConnectionConfig;
use cscs_debugger::debugger::SessionRegistry;
use cscs_debugger::repl::{ReplHost, WebviewCommand, WebviewEvent, NO_RESPONSE};
use cscs_debugger::wire::{ConnectionEvent, InstanceId, Transport, TransportFactory, WireEnvelope};

#[derive(Clone, Default)]
struct RecordingTransport {
    writes: Arc<Mutex<Vec<String>>>,
}

impl Transport for RecordingTransport {
    fn connect(&mut self, _instance: InstanceId, _host: &str, _port: u16, _timeout: Duration) {}

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writes
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(bytes).into_owned());
        Ok(())
    }

    fn shutdown(&mut self) {}
}

fn new_host() -> (ReplHost, Arc<SessionRegistry>, RecordingTransport) {
    let transport = RecordingTransport::default();
    let shared = transport.clone();
    let factory: TransportFactory =
        Box::new(move || Box::new(shared.clone()) as Box<dyn Transport>);
    let registry = Arc::new(SessionRegistry::new());
    let host = ReplHost::new(ConnectionConfig::default(), Arc::clone(&registry), factory);
    (host, registry, transport)
}

fn submit(host: &mut ReplHost, text: &str, id: u64) -> Vec<WebviewEvent> {
    host.handle(
        WebviewCommand::Repl {
            text: text.to_string(),
            id,
        },
        Instant::now(),
    )
}

fn wire(instance: InstanceId, event: ConnectionEvent) -> WireEnvelope {
    WireEnvelope { instance, event }
}

#[cfg(test)]
mod repl_host_tests {
    use super::*;

    #[test]
    fn test_reply_carries_request_id() {
        let (mut host, registry, transport) = new_host();

        assert!(submit(&mut host, "a = 1;\nprint(a);", 7).is_empty());
        assert_eq!(host.pending_count(), 1);
        let instance = registry.current();

        assert!(host.handle_wire(wire(instance, ConnectionEvent::Connected)).is_empty());
        assert_eq!(
            transport.writes.lock().unwrap()[0],
            "repl|a = 1;\rprint(a);\n"
        );

        let reply = host.handle_wire(wire(instance, ConnectionEvent::Data(b"repl\n1\n".to_vec())));
        assert_eq!(
            reply,
            vec![WebviewEvent::ReplResponse {
                text: "1".to_string(),
                id: 7
            }]
        );
        assert_eq!(host.pending_count(), 0);
        assert_eq!(host.history().entries(), ["a = 1;", "print(a);"]);

        // Anything the closed runtime still receives is dropped.
        assert!(host.handle_wire(wire(instance, ConnectionEvent::Closed)).is_empty());
    }

    #[test]
    fn test_concurrent_requests_are_answered_separately() {
        let (mut host, registry, _) = new_host();

        submit(&mut host, "x = 1;", 1);
        let first = registry.current();
        submit(&mut host, "y = 2;", 2);
        let second = registry.current();
        assert_ne!(first, second);

        host.handle_wire(wire(second, ConnectionEvent::Connected));
        let reply = host.handle_wire(wire(second, ConnectionEvent::Data(b"repl\n2\n".to_vec())));
        assert_eq!(
            reply,
            vec![WebviewEvent::ReplResponse {
                text: "2".to_string(),
                id: 2
            }]
        );
        assert_eq!(host.pending_count(), 1);
    }

    #[test]
    fn test_missing_reply_times_out() {
        let (host, _, _) = new_host();
        let mut host = host.with_timeout(Duration::from_millis(50));
        let start = Instant::now();

        host.handle(
            WebviewCommand::Repl {
                text: "sleep(10000);".to_string(),
                id: 3,
            },
            start,
        );
        assert!(host.poll_timeouts(start).is_empty());

        let expired = host.poll_timeouts(start + Duration::from_secs(1));
        assert_eq!(
            expired,
            vec![WebviewEvent::ReplResponse {
                text: NO_RESPONSE.to_string(),
                id: 3
            }]
        );
        assert_eq!(host.pending_count(), 0);
    }

    #[test]
    fn test_unbalanced_input_is_answered_locally() {
        let (mut host, _, transport) = new_host();

        let reply = submit(&mut host, "print(1", 4);
        assert_eq!(
            reply,
            vec![WebviewEvent::ReplResponse {
                text: "Unbalanced parentheses. Line 1: print(1".to_string(),
                id: 4
            }]
        );
        assert_eq!(host.pending_count(), 0);
        assert!(transport.writes.lock().unwrap().is_empty());
        assert!(host.history().entries().is_empty());
    }

    #[test]
    fn test_comment_only_input_gets_empty_reply() {
        let (mut host, _, _) = new_host();
        let reply = submit(&mut host, "// just a note", 5);
        assert_eq!(
            reply,
            vec![WebviewEvent::ReplResponse {
                text: String::new(),
                id: 5
            }]
        );
    }

    #[test]
    fn test_connection_failure_completes_request() {
        let (mut host, registry, _) = new_host();
        submit(&mut host, "x = 1;", 6);
        let instance = registry.current();

        let reply = host.handle_wire(wire(instance, ConnectionEvent::Closed));
        assert_eq!(
            reply,
            vec![WebviewEvent::ReplResponse {
                text: "Could not connect to 127.0.0.1:13337".to_string(),
                id: 6
            }]
        );
    }

    #[test]
    fn test_history_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("history.repl");
        let filename = file.to_string_lossy().into_owned();
        let (mut host, _, _) = new_host();
        let now = Instant::now();

        host.handle(
            WebviewCommand::SendHistory {
                history: vec!["a = 1;".to_string(), " ".to_string(), "b = 2;".to_string()],
            },
            now,
        );
        host.handle(
            WebviewCommand::Save {
                filename: Some(filename.clone()),
            },
            now,
        );
        assert_eq!(fs::read_to_string(&file).unwrap(), "a = 1;\nb = 2;\n");

        host.handle(WebviewCommand::ClearHistory, now);
        assert!(host.history().entries().is_empty());

        let loaded = host.handle(
            WebviewCommand::Load {
                filename: Some(filename.clone()),
            },
            now,
        );
        assert_eq!(
            loaded,
            vec![WebviewEvent::Load {
                text: "a = 1;\nb = 2;\n".to_string(),
                filename
            }]
        );
        assert_eq!(host.history().entries(), ["a = 1;", "b = 2;"]);

        // Re-running a loaded command does not duplicate it.
        submit(&mut host, "a = 1;", 1);
        assert_eq!(host.history().entries().len(), 2);
    }

    #[test]
    fn test_saving_empty_history_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.repl");
        let (mut host, _, _) = new_host();

        let events = host.handle(
            WebviewCommand::Save {
                filename: Some(file.to_string_lossy().into_owned()),
            },
            Instant::now(),
        );
        assert!(events.is_empty());
        assert!(!file.exists());
    }

    #[test]
    fn test_history_selection() {
        let (mut host, _, _) = new_host();
        let now = Instant::now();
        host.handle(
            WebviewCommand::SendHistory {
                history: vec!["first();".to_string(), "second();".to_string()],
            },
            now,
        );

        assert_eq!(
            host.handle(WebviewCommand::ShowHistory { index: Some(1) }, now),
            vec![WebviewEvent::Request {
                text: "second();".to_string()
            }]
        );
        assert_eq!(
            host.handle(WebviewCommand::ShowHistory { index: None }, now),
            vec![WebviewEvent::History {
                history: vec!["first();".to_string(), "second();".to_string()]
            }]
        );
    }

    #[test]
    fn test_ids_and_clipboard() {
        let (mut host, _, _) = new_host();
        let now = Instant::now();

        let first = host.handle(WebviewCommand::RequestId, now);
        let second = host.handle(WebviewCommand::RequestId, now);
        assert_eq!(first, vec![WebviewEvent::Id { id: 1 }]);
        assert_eq!(second, vec![WebviewEvent::Id { id: 2 }]);

        assert_eq!(
            host.handle(
                WebviewCommand::WriteClipboard {
                    text: "x = 1;".to_string()
                },
                now
            ),
            vec![WebviewEvent::CopyCompleted {
                text: "x = 1;".to_string()
            }]
        );
        assert_eq!(
            host.handle(WebviewCommand::GetClipboard, now),
            vec![WebviewEvent::ClipboardContent {
                text: "x = 1;".to_string()
            }]
        );
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[test]
    fn test_front_end_commands_parse() {
        let cmd: WebviewCommand =
            serde_json::from_str(r#"{"command":"repl","text":"x = 1;","id":3}"#).unwrap();
        assert_eq!(
            cmd,
            WebviewCommand::Repl {
                text: "x = 1;".to_string(),
                id: 3
            }
        );

        let cmd: WebviewCommand = serde_json::from_str(r#"{"command":"clear_history"}"#).unwrap();
        assert_eq!(cmd, WebviewCommand::ClearHistory);

        let cmd: WebviewCommand = serde_json::from_str(r#"{"command":"load"}"#).unwrap();
        assert_eq!(cmd, WebviewCommand::Load { filename: None });
    }

    #[test]
    fn test_replies_serialize_with_command_tag() {
        let event = WebviewEvent::ReplResponse {
            text: "3".to_string(),
            id: 9,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"command": "repl_response", "text": "3", "id": 9})
        );
    }
}
