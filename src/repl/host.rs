use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{ConnectionConfig, REPL_RESPONSE_TIMEOUT};
use crate::debugger::{resolve, NotificationLevel, Runtime, RuntimeEvent, SessionRegistry};
use crate::wire::{InstanceId, TransportFactory, WireEnvelope};

use super::messages::{WebviewCommand, WebviewEvent};

pub const NO_RESPONSE: &str = "*** No response received from the REPL server ***";
pub const DEFAULT_HISTORY_FILE: &str = "session.repl";

/// Submitted REPL commands.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
    /// Entries came from a file and have not been added to since.
    loaded: bool,
}

impl History {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn push(&mut self, entry: &str) {
        let entry = entry.trim();
        if entry.is_empty() {
            return;
        }
        if self.loaded && self.entries.iter().any(|e| e == entry) {
            return;
        }
        self.loaded = false;
        self.entries.push(entry.to_string());
    }

    pub fn replace(&mut self, entries: Vec<String>) {
        self.entries = entries
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        self.loaded = false;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.loaded = false;
    }

    /// Replace the history with the non-blank lines of `path`. Returns the
    /// raw file contents.
    pub fn load(&mut self, path: &Path) -> io::Result<String> {
        let text = fs::read_to_string(path)?;
        self.entries = text
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        self.loaded = true;
        Ok(text)
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if self.entries.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "There is no history to save",
            ));
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        fs::write(path, text)
    }
}

struct PendingRequest {
    request_id: u64,
    runtime: Runtime,
    events: Receiver<RuntimeEvent>,
    deadline: Instant,
}

/// Serves a REPL front end: every submission gets its own short-lived
/// runtime, and exactly one `repl_response` carrying the submission's id.
pub struct ReplHost {
    config: ConnectionConfig,
    registry: Arc<SessionRegistry>,
    transports: TransportFactory,
    history: History,
    pending: HashMap<InstanceId, PendingRequest>,
    next_request_id: u64,
    clipboard: String,
    timeout: Duration,
}

impl ReplHost {
    pub fn new(
        config: ConnectionConfig,
        registry: Arc<SessionRegistry>,
        transports: TransportFactory,
    ) -> Self {
        Self {
            config,
            registry,
            transports,
            history: History::default(),
            pending: HashMap::new(),
            next_request_id: 0,
            clipboard: String::new(),
            timeout: REPL_RESPONSE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn issue_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    pub fn handle(&mut self, command: WebviewCommand, now: Instant) -> Vec<WebviewEvent> {
        match command {
            WebviewCommand::Repl { text, id } => self.submit(&text, id, now),
            WebviewCommand::Load { filename } => {
                let path = history_path(filename);
                match self.history.load(&path) {
                    Ok(text) => vec![WebviewEvent::Load {
                        text,
                        filename: path.to_string_lossy().into_owned(),
                    }],
                    Err(e) => {
                        log::error!("could not load {}: {}", path.display(), e);
                        Vec::new()
                    }
                }
            }
            WebviewCommand::Save { filename } => {
                let path = history_path(filename);
                match self.history.save(&path) {
                    Ok(()) => log::info!("Saved file at {}", path.display()),
                    Err(e) => log::error!("{}", e),
                }
                Vec::new()
            }
            WebviewCommand::ShowHistory { index } => {
                match index.and_then(|i| self.history.entries().get(i)) {
                    Some(entry) => vec![WebviewEvent::Request {
                        text: entry.clone(),
                    }],
                    None => vec![WebviewEvent::History {
                        history: self.history.entries().to_vec(),
                    }],
                }
            }
            WebviewCommand::ClearHistory => {
                self.history.clear();
                Vec::new()
            }
            WebviewCommand::RequestId => vec![WebviewEvent::Id {
                id: self.issue_id(),
            }],
            WebviewCommand::RequestHistory => vec![WebviewEvent::History {
                history: self.history.entries().to_vec(),
            }],
            WebviewCommand::SendHistory { history } => {
                self.history.replace(history);
                Vec::new()
            }
            WebviewCommand::GetClipboard => vec![WebviewEvent::ClipboardContent {
                text: self.clipboard.clone(),
            }],
            WebviewCommand::WriteClipboard { text } => {
                self.clipboard = text.clone();
                vec![WebviewEvent::CopyCompleted { text }]
            }
            WebviewCommand::Info { text } => {
                log::info!("{}", text);
                Vec::new()
            }
            WebviewCommand::Warning { text } => {
                log::warn!("{}", text);
                Vec::new()
            }
            WebviewCommand::Error { text } => {
                log::error!("{}", text);
                Vec::new()
            }
        }
    }

    fn submit(&mut self, text: &str, id: u64, now: Instant) -> Vec<WebviewEvent> {
        let (sender, events) = channel();
        let mut runtime = Runtime::new(
            Arc::clone(&self.registry),
            (self.transports)(),
            sender,
            true,
        );

        let statements = match runtime.send_repl(text, "") {
            Ok(statements) => statements,
            Err(e) => {
                log::debug!("REPL input rejected: {}", e);
                return vec![WebviewEvent::ReplResponse {
                    text: e.to_string(),
                    id,
                }];
            }
        };
        for statement in &statements {
            self.history.push(statement);
        }

        if runtime.queued_commands().is_empty() {
            return vec![WebviewEvent::ReplResponse {
                text: String::new(),
                id,
            }];
        }

        runtime.start_repl(&self.config);
        let instance = runtime.id();
        self.pending.insert(
            instance,
            PendingRequest {
                request_id: id,
                runtime,
                events,
                deadline: now + self.timeout,
            },
        );
        self.drain(instance).into_iter().collect()
    }

    /// Deliver socket activity to the runtime serving that request.
    pub fn handle_wire(&mut self, envelope: WireEnvelope) -> Vec<WebviewEvent> {
        match self.pending.get_mut(&envelope.instance) {
            Some(pending) => pending.runtime.handle_connection_event(envelope.event),
            None => {
                log::debug!(
                    "dropping {:?} for finished REPL runtime {}",
                    envelope.event,
                    envelope.instance
                );
                return Vec::new();
            }
        }
        self.drain(envelope.instance).into_iter().collect()
    }

    /// Answer requests whose reply did not arrive in time.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<WebviewEvent> {
        let expired: Vec<InstanceId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(&instance, _)| instance)
            .collect();

        let mut responses = Vec::new();
        for instance in expired {
            if let Some(mut pending) = self.pending.remove(&instance) {
                log::warn!("REPL request {} timed out", pending.request_id);
                pending.runtime.disconnect_from_debugger();
                responses.push(WebviewEvent::ReplResponse {
                    text: NO_RESPONSE.to_string(),
                    id: pending.request_id,
                });
            }
        }
        responses
    }

    fn drain(&mut self, instance: InstanceId) -> Option<WebviewEvent> {
        let pending = self.pending.get_mut(&instance)?;

        let mut reply = None;
        while let Ok(event) = pending.events.try_recv() {
            match event {
                RuntimeEvent::ReplCompleted(text) => {
                    reply.get_or_insert_with(|| strip_response_tag(&text));
                }
                RuntimeEvent::Notification {
                    level: NotificationLevel::Error,
                    message,
                } => {
                    reply.get_or_insert(message);
                }
                RuntimeEvent::Output(line) => log::debug!("REPL output: {}", line.text),
                other => log::trace!("REPL runtime event {:?}", other),
            }
        }

        let text = reply?;
        let mut pending = self.pending.remove(&instance)?;
        pending.runtime.disconnect_from_debugger();
        Some(WebviewEvent::ReplResponse {
            text,
            id: pending.request_id,
        })
    }
}

fn history_path(filename: Option<String>) -> PathBuf {
    let name = filename
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HISTORY_FILE.to_string());
    resolve(&name)
}

/// Drop the `repl`/`_repl` tag line from a server reply.
pub fn strip_response_tag(text: &str) -> String {
    let body = match text.split_once('\n') {
        Some((tag, rest)) if matches!(tag.trim(), "repl" | "_repl") => rest,
        None if matches!(text.trim(), "repl" | "_repl") => "",
        _ => text,
    };
    body.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_line_is_removed() {
        assert_eq!(strip_response_tag("repl\n3\n"), "3");
        assert_eq!(strip_response_tag("Saved remote file to: a.txt"), "Saved remote file to: a.txt");
        assert_eq!(strip_response_tag("repl"), "");
    }

    #[test]
    fn loaded_history_suppresses_duplicates() {
        let mut history = History::default();
        history.replace(vec!["a = 1;".to_string()]);
        history.loaded = true;
        history.push("a = 1;");
        assert_eq!(history.entries().len(), 1);
        history.push("b = 2;");
        history.push("a = 1;");
        assert_eq!(history.entries().len(), 3);
    }
}
