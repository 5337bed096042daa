use super::protocol::{
    DapMessage, DapMessageContent, EvaluateArguments, LaunchArguments, SetBreakpointsArguments,
    VariablesArguments,
};
use crate::debugger::{
    NotificationLevel, OutputLine, Runtime, RuntimeEvent, SessionRegistry, StopReason, Variable,
};
use crate::wire::{Command, TransportFactory, WireEnvelope};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

const THREAD_ID: u64 = 1;
const LOCAL_SCOPE: u64 = 1;
const GLOBAL_SCOPE: u64 = 2;

/// How long `launch` waits for `configurationDone`.
const CONFIGURATION_TIMEOUT: Duration = Duration::from_secs(1);

struct PendingLaunch {
    seq: u64,
    command: String,
    arguments: Option<Value>,
    deadline: Instant,
}

/// Debug adapter for one editor session. Requests are answered on `writer`;
/// runtime events are turned into DAP events as they are drained.
pub struct DapServer<W: Write> {
    seq: u64,
    writer: W,
    registry: Arc<SessionRegistry>,
    transports: TransportFactory,
    runtime: Runtime,
    event_sender: Sender<RuntimeEvent>,
    event_receiver: Receiver<RuntimeEvent>,
    configuration_done: bool,
    pending_launch: Option<PendingLaunch>,
    terminated: bool,
}

impl<W: Write> DapServer<W> {
    pub fn new(writer: W, registry: Arc<SessionRegistry>, mut transports: TransportFactory) -> Self {
        let (event_sender, event_receiver) = channel();
        let runtime = Runtime::new(
            Arc::clone(&registry),
            transports(),
            event_sender.clone(),
            false,
        );
        Self {
            seq: 0,
            writer,
            registry,
            transports,
            runtime,
            event_sender,
            event_receiver,
            configuration_done: false,
            pending_launch: None,
            terminated: false,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn send_response(
        &mut self,
        request_seq: u64,
        command: String,
        success: bool,
        body: Option<Value>,
    ) {
        self.send_response_with_message(request_seq, command, success, None, body);
    }

    fn send_response_with_message(
        &mut self,
        request_seq: u64,
        command: String,
        success: bool,
        message: Option<String>,
        body: Option<Value>,
    ) {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success,
                command,
                message,
                body,
            },
        };
        self.send_message(&msg);
    }

    pub fn send_event(&mut self, event: &str, body: Option<Value>) {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "event".to_string(),
            content: DapMessageContent::Event {
                event: event.to_string(),
                body,
            },
        };
        self.send_message(&msg);
    }

    fn send_message(&mut self, msg: &DapMessage) {
        let json = match serde_json::to_string(msg) {
            Ok(json) => json,
            Err(e) => {
                log::error!("could not serialize DAP message: {}", e);
                return;
            }
        };

        let written = write!(self.writer, "Content-Length: {}\r\n\r\n{}", json.len(), json)
            .and_then(|_| self.writer.flush());
        match written {
            Ok(()) => log::trace!("sent {} bytes", json.len()),
            Err(e) => log::error!("could not write DAP message: {}", e),
        }
    }

    /// Handle one client message. Returns false once the session is over.
    pub fn dispatch(&mut self, msg: DapMessage) -> bool {
        let keep_running = match msg.content {
            DapMessageContent::Request { command, arguments } => {
                log::debug!("request {} #{}", command, msg.seq);
                self.handle_request(msg.seq, command, arguments)
            }
            other => {
                log::debug!("ignoring non-request message: {:?}", other);
                true
            }
        };
        self.flush_runtime_events();
        keep_running
    }

    fn handle_request(&mut self, seq: u64, command: String, arguments: Option<Value>) -> bool {
        match command.as_str() {
            "initialize" => self.handle_initialize(seq, command),
            "launch" | "attach" => self.handle_launch(seq, command, arguments),
            "configurationDone" => {
                self.send_response(seq, command, true, None);
                self.configuration_done = true;
                if let Some(pending) = self.pending_launch.take() {
                    self.launch(pending.seq, pending.command, pending.arguments);
                }
            }
            "setBreakpoints" => self.handle_set_breakpoints(seq, command, arguments),
            "threads" => self.handle_threads(seq, command),
            "stackTrace" => self.handle_stack_trace(seq, command, arguments),
            "scopes" => self.handle_scopes(seq, command),
            "variables" => self.handle_variables(seq, command, arguments),
            "continue" | "reverseContinue" => {
                self.runtime.continue_execution();
                self.send_response(seq, command, true, Some(json!({"allThreadsContinued": true})));
            }
            "next" => {
                self.runtime.step(StopReason::Step);
                self.send_response(seq, command, true, None);
            }
            "stepIn" => {
                self.runtime.step_in();
                self.send_response(seq, command, true, None);
            }
            "stepOut" => {
                self.runtime.step_out();
                self.send_response(seq, command, true, None);
            }
            "stepBack" => self.send_response(seq, command, true, None),
            "evaluate" => self.handle_evaluate(seq, command, arguments),
            "disconnect" | "terminate" => {
                self.runtime.disconnect_from_debugger();
                self.send_response(seq, command, true, None);
                self.flush_runtime_events();
                return false;
            }
            _ => {
                log::warn!("unhandled DAP command: {}", command);
                self.send_response_with_message(
                    seq,
                    command,
                    false,
                    Some("unsupported request".to_string()),
                    None,
                );
            }
        }
        true
    }

    pub fn handle_initialize(&mut self, seq: u64, command: String) {
        let body = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsEvaluateForHovers": true,
            "supportsStepBack": false,
            "supportsSetVariable": false,
            "supportsRestartFrame": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": false,
        });
        self.send_response(seq, command, true, Some(body));
        self.send_event("initialized", None);
    }

    /// Launch once the client has finished configuring, or after a short
    /// wait if it never says so.
    pub fn handle_launch(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        if self.configuration_done {
            self.launch(seq, command, arguments);
            return;
        }
        log::debug!("launch waiting for configurationDone");
        self.pending_launch = Some(PendingLaunch {
            seq,
            command,
            arguments,
            deadline: Instant::now() + CONFIGURATION_TIMEOUT,
        });
    }

    fn launch(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        let args: LaunchArguments =
            match serde_json::from_value(arguments.unwrap_or_else(|| json!({}))) {
                Ok(args) => args,
                Err(e) => {
                    log::error!("bad launch arguments: {}", e);
                    self.send_response_with_message(seq, command, false, Some(e.to_string()), None);
                    return;
                }
            };

        if args.connection.trace {
            log::set_max_level(log::LevelFilter::Debug);
        }
        log::info!(
            "launching {} (stop on entry: {}) against {}",
            args.program,
            args.stop_on_entry,
            args.connection.address()
        );

        if self.runtime.is_stale() {
            self.runtime = Runtime::new(
                Arc::clone(&self.registry),
                (self.transports)(),
                self.event_sender.clone(),
                false,
            );
        }
        self.runtime
            .start(&args.program, args.stop_on_entry, &args.connection);
        self.send_response(seq, command, true, None);
    }

    pub fn handle_set_breakpoints(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        let args: SetBreakpointsArguments = arguments
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        let path = args.source.path.clone().unwrap_or_default();

        if !self.runtime.verify_debug(&path) {
            self.send_response(seq, command, true, Some(json!({ "breakpoints": [] })));
            return;
        }

        self.runtime.clear_breakpoints(&path);
        let breakpoints: Vec<Value> = args
            .client_lines()
            .into_iter()
            .map(|line| {
                let bp = self.runtime.set_breakpoint(&path, line.saturating_sub(1));
                json!({
                    "id": bp.id,
                    "verified": bp.verified,
                    "line": bp.line + 1
                })
            })
            .collect();

        self.runtime.send_breakpoints_to_server(&path);
        self.send_response(seq, command, true, Some(json!({ "breakpoints": breakpoints })));
    }

    pub fn handle_threads(&mut self, seq: u64, command: String) {
        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "threads": [
                    {
                        "id": THREAD_ID,
                        "name": "thread 1"
                    }
                ]
            })),
        );
    }

    pub fn handle_stack_trace(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        let start = arguments
            .as_ref()
            .and_then(|v| v.get("startFrame"))
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let levels = arguments
            .as_ref()
            .and_then(|v| v.get("levels"))
            .and_then(Value::as_u64)
            .filter(|&levels| levels > 0)
            .unwrap_or(1000) as usize;

        let trace = self.runtime.stack();
        let frames: Vec<Value> = trace
            .frames
            .iter()
            .skip(start)
            .take(levels)
            .map(|frame| {
                json!({
                    "id": frame.id,
                    "name": frame.name,
                    "line": frame.line + 1,
                    "column": 1,
                    "source": source_json(&frame.file)
                })
            })
            .collect();

        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "stackFrames": frames,
                "totalFrames": trace.count
            })),
        );
    }

    pub fn handle_scopes(&mut self, seq: u64, command: String) {
        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "scopes": [
                    {
                        "name": "Local",
                        "variablesReference": LOCAL_SCOPE,
                        "expensive": false
                    },
                    {
                        "name": "Global",
                        "variablesReference": GLOBAL_SCOPE,
                        "expensive": true
                    }
                ]
            })),
        );
    }

    pub fn handle_variables(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        let args: VariablesArguments = arguments
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let variables = if args.variables_reference == LOCAL_SCOPE {
            self.runtime.locals()
        } else {
            self.runtime.globals()
        };
        let variables: Vec<Value> = variables.iter().map(variable_json).collect();

        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "variables": variables
            })),
        );
    }

    pub fn handle_evaluate(&mut self, seq: u64, command: String, arguments: Option<Value>) {
        let args: EvaluateArguments = arguments
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let result = match args.context.as_deref() {
            Some("repl") => {
                self.runtime
                    .send_to_server(Command::DebugRepl(args.expression));
                String::new()
            }
            Some("hover") => self.runtime.hover_value(&args.expression),
            Some("watch") => self.runtime.variable_value(&args.expression),
            _ => String::new(),
        };

        self.send_response(
            seq,
            command,
            true,
            Some(json!({
                "result": result,
                "variablesReference": 0
            })),
        );
    }

    /// Route socket activity to the runtime it belongs to.
    pub fn handle_wire(&mut self, envelope: WireEnvelope) {
        if envelope.instance == self.runtime.id() {
            self.runtime.handle_connection_event(envelope.event);
        } else {
            log::debug!(
                "dropping {:?} for retired runtime {}",
                envelope.event,
                envelope.instance
            );
        }
        self.flush_runtime_events();
    }

    /// Time based work: a launch whose configurationDone never came.
    pub fn poll(&mut self, now: Instant) {
        let expired = matches!(&self.pending_launch, Some(pending) if pending.deadline <= now);
        if expired {
            if let Some(pending) = self.pending_launch.take() {
                log::debug!("configurationDone not received, launching anyway");
                self.launch(pending.seq, pending.command, pending.arguments);
                self.flush_runtime_events();
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Translate everything the runtime reported into DAP events.
    pub fn flush_runtime_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            match event {
                RuntimeEvent::Stopped(reason) => self.send_event(
                    "stopped",
                    Some(json!({
                        "reason": reason.as_dap_reason(),
                        "threadId": THREAD_ID,
                        "allThreadsStopped": true
                    })),
                ),
                RuntimeEvent::BreakpointChanged(bp) => self.send_event(
                    "breakpoint",
                    Some(json!({
                        "reason": "changed",
                        "breakpoint": {
                            "id": bp.id,
                            "verified": bp.verified,
                            "line": bp.line + 1
                        }
                    })),
                ),
                RuntimeEvent::Output(line) => {
                    let body = output_json(&line, "console");
                    self.send_event("output", Some(body));
                }
                RuntimeEvent::Status(text) => log::info!("{}", text),
                RuntimeEvent::Notification { level, message } => match level {
                    NotificationLevel::Info => log::info!("{}", message),
                    NotificationLevel::Warning => log::warn!("{}", message),
                    NotificationLevel::Error => {
                        log::error!("{}", message);
                        self.send_event(
                            "output",
                            Some(json!({
                                "category": "stderr",
                                "output": format!("{}\n", message)
                            })),
                        );
                    }
                },
                RuntimeEvent::ReplCompleted(text) => {
                    log::debug!("REPL reply outside a REPL session: {}", text.trim_end())
                }
                RuntimeEvent::Terminated => {
                    if !self.terminated {
                        self.terminated = true;
                        self.send_event("terminated", None);
                    }
                }
            }
        }
    }
}

fn source_json(file: &str) -> Value {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    json!({
        "name": name,
        "path": file,
        "adapterData": "cscs-adapter-data"
    })
}

fn variable_json(variable: &Variable) -> Value {
    json!({
        "name": variable.name,
        "type": variable.type_name,
        "value": variable.value,
        "variablesReference": 0
    })
}

fn output_json(line: &OutputLine, category: &str) -> Value {
    let output = if line.newline {
        format!("{}\n", line.text)
    } else {
        line.text.clone()
    };
    let mut body = json!({
        "category": category,
        "output": output,
        "column": line.column + 1
    });
    if !line.file.is_empty() {
        body["source"] = source_json(&line.file);
    }
    if let Some(number) = line.line {
        body["line"] = json!(number + 1);
    }
    body
}

/// Read one `Content-Length` framed message. Returns `Ok(None)` at end of
/// input; malformed bodies are skipped.
pub fn read_message<R: BufRead>(reader: &mut R) -> io::Result<Option<DapMessage>> {
    loop {
        let mut content_length = 0usize;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if saw_header {
                    break;
                }
                continue;
            }
            saw_header = true;
            if let Some(value) = line.strip_prefix("Content-Length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }

        if content_length == 0 {
            log::warn!("DAP message without Content-Length");
            continue;
        }

        let mut buffer = vec![0u8; content_length];
        reader.read_exact(&mut buffer)?;
        match serde_json::from_slice(&buffer) {
            Ok(msg) => return Ok(Some(msg)),
            Err(e) => log::warn!("skipping malformed DAP message: {}", e),
        }
    }
}
