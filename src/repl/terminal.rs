use std::str::FromStr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustyline::{error::ReadlineError, DefaultEditor};

use super::host::ReplHost;
use super::messages::{WebviewCommand, WebviewEvent};
use crate::config::ConnectionConfig;
use crate::debugger::SessionRegistry;
use crate::error::Result;
use crate::wire::{TcpTransport, Transport, TransportFactory, WireEnvelope};

const PROMPT: &str = "CSCS> ";
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Commands handled locally instead of being sent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    Load(Option<String>),
    Save(Option<String>),
    History,
    Clear,
    Quit,
}

impl FromStr for MetaCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches(':');
        let tokens = shlex::split(s).ok_or_else(|| format!("unbalanced quotes in '{}'", s))?;
        let mut tokens = tokens.into_iter();
        let name = tokens.next().unwrap_or_default();
        let arg = tokens.next();

        match name.as_str() {
            "load" | "l" => Ok(MetaCommand::Load(arg)),
            "save" | "s" => Ok(MetaCommand::Save(arg)),
            "history" | "h" => Ok(MetaCommand::History),
            "clear" => Ok(MetaCommand::Clear),
            "quit" | "q" | "exit" => Ok(MetaCommand::Quit),
            other => Err(format!("unknown command ':{}'", other)),
        }
    }
}

/// Interactive line editor talking to the interpreter server.
pub struct TerminalRepl {
    host: ReplHost,
    wire: Receiver<WireEnvelope>,
    editor: DefaultEditor,
}

impl TerminalRepl {
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let (tx, wire) = mpsc::channel::<WireEnvelope>();
        let transports: TransportFactory =
            Box::new(move || Box::new(TcpTransport::new(tx.clone())) as Box<dyn Transport>);
        let host = ReplHost::new(config, Arc::new(SessionRegistry::new()), transports);
        let editor = DefaultEditor::new()?;

        Ok(Self { host, wire, editor })
    }

    pub fn run(&mut self) -> Result<()> {
        println!("CSCS REPL. Type :quit to leave, :history to list past commands.");

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    if line.starts_with(':') {
                        match line.parse::<MetaCommand>() {
                            Ok(MetaCommand::Quit) => break,
                            Ok(meta) => self.run_meta(meta),
                            Err(e) => eprintln!("Error: {}", e),
                        }
                        continue;
                    }

                    self.evaluate(line);
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    fn run_meta(&mut self, meta: MetaCommand) {
        let now = Instant::now();
        let events = match meta {
            MetaCommand::Load(filename) => self.host.handle(WebviewCommand::Load { filename }, now),
            MetaCommand::Save(filename) => self.host.handle(WebviewCommand::Save { filename }, now),
            MetaCommand::History => self
                .host
                .handle(WebviewCommand::ShowHistory { index: None }, now),
            MetaCommand::Clear => self.host.handle(WebviewCommand::ClearHistory, now),
            MetaCommand::Quit => Vec::new(),
        };

        for event in events {
            match event {
                WebviewEvent::Load { filename, .. } => {
                    for entry in self.host.history().entries() {
                        let _ = self.editor.add_history_entry(entry.as_str());
                    }
                    println!(
                        "Loaded {} commands from {}",
                        self.host.history().entries().len(),
                        filename
                    );
                }
                WebviewEvent::History { history } => {
                    for (index, entry) in history.iter().enumerate() {
                        println!("{:>4}  {}", index, entry);
                    }
                }
                other => log::debug!("unexpected event {:?}", other),
            }
        }
    }

    /// Send one submission and block until its reply or the timeout.
    fn evaluate(&mut self, text: &str) {
        let id = self.host.issue_id();
        let mut events = self.host.handle(
            WebviewCommand::Repl {
                text: text.to_string(),
                id,
            },
            Instant::now(),
        );

        loop {
            for event in events.drain(..) {
                if let WebviewEvent::ReplResponse { text, id: reply_id } = event {
                    if !text.is_empty() {
                        println!("{}", text);
                    }
                    if reply_id == id {
                        return;
                    }
                }
            }

            match self.wire.recv_timeout(WAIT_SLICE) {
                Ok(envelope) => events = self.host.handle_wire(envelope),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            }
            events.extend(self.host.poll_timeouts(Instant::now()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_commands_parse_quoted_arguments() {
        assert_eq!(
            ":load \"my session.repl\"".parse::<MetaCommand>(),
            Ok(MetaCommand::Load(Some("my session.repl".to_string())))
        );
        assert_eq!(":q".parse::<MetaCommand>(), Ok(MetaCommand::Quit));
        assert!(":frobnicate".parse::<MetaCommand>().is_err());
    }
}
