use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::config::ConnectionConfig;
use crate::parser::{
    first_executable_line, has_source_extension, load_source_lines, split_statements, SplitError,
};
use crate::wire::{
    Command, ConnectionEvent, FileChunk, InstanceId, ResponseTag, SessionConnection, Transport,
};

use super::breakpoints::{Breakpoint, Breakpoints};
use super::events::{NotificationLevel, OutputLine, RuntimeEvent};
use super::keywords::keyword_doc;
use super::paths::{canonical_key, resolve, Filenames, PathMapper};
use super::registry::SessionRegistry;
use super::stepping::{RunMode, StopReason};
use super::variables::{parse_stack, StackEntry, Variable, Variables};

/// Current line value the server sends once the program has finished.
const SERVER_FINISHED_LINE: i64 = -3;

pub const UNKNOWN_VALUE: &str = "--- unknown ---";

/// Frames for the stack trace request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackTrace {
    pub frames: Vec<StackEntry>,
    /// Number of frames the server reported.
    pub count: usize,
}

/// Bridge between a debugging front end and one interpreter server
/// connection. All methods return immediately; results arrive later through
/// [`Runtime::handle_connection_event`] and are reported as [`RuntimeEvent`]s.
pub struct Runtime {
    id: InstanceId,
    registry: Arc<SessionRegistry>,
    connection: SessionConnection,
    events: Sender<RuntimeEvent>,
    config: ConnectionConfig,
    paths: PathMapper,
    filenames: Filenames,

    repl: bool,
    valid: bool,
    /// No connection has been established yet.
    initializing: bool,
    exception: bool,
    mode: RunMode,

    source_file: String,
    source_key: String,
    sources: HashMap<String, Vec<String>>,
    current_line: i64,

    breakpoints: Breakpoints,
    variables: Variables,
    stack: Vec<StackEntry>,
    last_repl_source: String,
}

impl Runtime {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transport: Box<dyn Transport>,
        events: Sender<RuntimeEvent>,
        repl: bool,
    ) -> Self {
        let id = registry.next_generation();
        log::debug!("runtime {} created (repl: {})", id, repl);
        Self {
            id,
            registry,
            connection: SessionConnection::new(id, transport),
            events,
            config: ConnectionConfig::default(),
            paths: PathMapper::default(),
            filenames: Filenames::default(),
            repl,
            valid: true,
            initializing: true,
            exception: false,
            mode: RunMode::StepOver,
            source_file: String::new(),
            source_key: String::new(),
            sources: HashMap::new(),
            current_line: 0,
            breakpoints: Breakpoints::new(),
            variables: Variables::default(),
            stack: Vec::new(),
            last_repl_source: String::new(),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_repl(&self) -> bool {
        self.repl
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// A stale runtime must be replaced before it is used again.
    pub fn is_stale(&self) -> bool {
        !self.registry.is_current(self.id) || (!self.is_connected() && !self.initializing)
    }

    pub fn has_exception(&self) -> bool {
        self.exception
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn source_file(&self) -> &str {
        &self.source_file
    }

    /// Zero based line the server is stopped at.
    pub fn current_line(&self) -> i64 {
        self.current_line
    }

    pub fn locals(&self) -> &[Variable] {
        self.variables.locals()
    }

    pub fn globals(&self) -> &[Variable] {
        self.variables.globals()
    }

    pub fn breakpoint_at(&self, path: &str, line: usize) -> Option<Breakpoint> {
        self.breakpoints.at_line(path, line)
    }

    pub fn queued_commands(&self) -> Vec<Command> {
        self.connection.queued().cloned().collect()
    }

    fn configure(&mut self, config: &ConnectionConfig) {
        self.config = config.clone();
        self.paths = PathMapper::new(config.effective_server_base());
    }

    /// Load `program`, connect, then either stop on the first line of code or
    /// run until a breakpoint.
    pub fn start(&mut self, program: &str, stop_on_entry: bool, config: &ConnectionConfig) {
        self.configure(config);
        self.registry.set_active(self.id);

        self.load_source(program);
        self.current_line = first_executable_line(self.source_lines()) as i64;

        let file = self.source_file.clone();
        self.verify_breakpoints(&file);

        self.connect_to_debugger();

        if stop_on_entry {
            self.step(StopReason::Entry);
        } else {
            self.continue_execution();
        }
    }

    pub fn start_repl(&mut self, config: &ConnectionConfig) {
        if self.is_connected() {
            return;
        }
        self.configure(config);
        self.connect_to_debugger();
    }

    pub fn connect_to_debugger(&mut self) {
        if self.is_connected() {
            return;
        }
        if let Err(e) = self.config.validate() {
            log::error!("{}", e);
            self.print_output(&e.to_string(), None, None, true);
            return;
        }

        let address = self.config.address();
        self.print_output(&format!("Connecting to {}...", address), None, None, false);
        let timeout = self.config.connect_timeout();
        self.connection
            .connect(&self.config.host, self.config.port, timeout);
    }

    /// Feed socket activity for this runtime's connection.
    pub fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected if !self.valid => self.connection.close(),
            ConnectionEvent::Connected => self.on_connected(),
            ConnectionEvent::Data(bytes) => {
                if !self.valid {
                    log::debug!("runtime {} ignoring {} bytes after teardown", self.id, bytes.len());
                    return;
                }
                if let Some(frame) = self.connection.receive(&bytes) {
                    self.process_from_debugger(&frame);
                }
            }
            ConnectionEvent::TimedOut => {
                if !self.is_connected() {
                    let message = format!("Timeout connecting to {}", self.config.address());
                    self.print_output(&message, None, None, true);
                    self.connection.close();
                }
            }
            ConnectionEvent::Closed => {
                if self.initializing && self.valid {
                    let address = self.config.address();
                    self.print_output(&format!("Could not connect to {}", address), None, None, true);
                    self.notify(
                        NotificationLevel::Error,
                        format!("Could not connect to {}", address),
                    );
                    self.emit(RuntimeEvent::Status(format!(
                        "CSCS: Couldn't connect to {}",
                        address
                    )));
                }
                log::debug!("runtime {} connection closed", self.id);
                self.connection.mark_closed();
            }
        }
    }

    fn on_connected(&mut self) {
        self.connection.mark_connected();
        let address = self.config.address();
        log::info!("connected to {}", address);
        self.print_output("Connected to the Debugger Server.", None, None, true);

        if self.registry.take_first_run() {
            self.notify(
                NotificationLevel::Info,
                format!(
                    "CSCS: Connected to {}. Check Output CSCS Window for REPL and Debug Console for Debugger Messages",
                    address
                ),
            );
        }
        self.emit(RuntimeEvent::Status(format!("CSCS: Connected to {}", address)));
        self.initializing = false;

        if !self.repl && !self.source_file.is_empty() {
            let server_file = self.paths.to_server(&self.source_file);
            if !server_file.is_empty() {
                self.send_to_server(Command::File(server_file));
            }
            self.send_all_breakpoints();
        }

        self.connection.flush_queue();
    }

    pub fn send_to_server(&mut self, command: Command) {
        self.connection.send(command);
    }

    /// Split `text` into statements and send the whole block as one `repl`
    /// command. Returns the individual statements for the history.
    pub fn send_repl(&mut self, text: &str, filename: &str) -> Result<Vec<String>, SplitError> {
        self.last_repl_source = filename.to_string();
        let split = split_statements(text)?;

        if !split.block.is_empty() {
            let filename = filename.trim();
            let payload = if filename.is_empty() {
                split.block
            } else {
                format!("{}|{}", filename, split.block)
            };
            self.send_to_server(Command::Repl(payload));
        }

        Ok(split.statements)
    }

    pub fn last_repl_source(&self) -> &str {
        &self.last_repl_source
    }

    pub fn continue_execution(&mut self) {
        if !self.verify_debug_current() {
            return;
        }
        self.mode = RunMode::Continue;
        self.send_to_server(Command::Continue);
    }

    pub fn step(&mut self, reason: StopReason) {
        if !self.verify_debug_current() {
            return;
        }
        self.mode = RunMode::StepOver;
        if self.initializing {
            self.run_once(reason);
        } else {
            self.send_to_server(Command::Next);
        }
    }

    pub fn step_in(&mut self) {
        if !self.verify_debug_current() {
            return;
        }
        self.mode = RunMode::StepInto;
        self.send_to_server(Command::StepIn);
    }

    pub fn step_out(&mut self) {
        if !self.verify_debug_current() {
            return;
        }
        self.mode = RunMode::StepOut;
        self.send_to_server(Command::StepOut);
    }

    /// True if `file` can be debugged. A pending exception ends the session
    /// and fails the check.
    pub fn verify_debug(&mut self, file: &str) -> bool {
        if self.exception {
            self.disconnect_from_debugger();
            return false;
        }
        has_source_extension(file)
    }

    fn verify_debug_current(&mut self) -> bool {
        let file = self.source_file.clone();
        self.verify_debug(&file)
    }

    /// Register a breakpoint and verify it against the file's source.
    /// Returns the breakpoint as it stands after verification.
    pub fn set_breakpoint(&mut self, path: &str, line: usize) -> Breakpoint {
        self.filenames.remember(path);
        let bp = self.breakpoints.add(path, line);
        let changed = self.verify_breakpoints(path);
        changed
            .into_iter()
            .find(|other| other.id == bp.id)
            .or_else(|| self.breakpoints.get(path, bp.id))
            .unwrap_or(bp)
    }

    pub fn clear_breakpoint(&mut self, path: &str, line: usize) -> Option<Breakpoint> {
        self.breakpoints.remove(path, line)
    }

    pub fn clear_breakpoints(&mut self, path: &str) {
        self.breakpoints.clear(path);
    }

    pub fn send_breakpoints_to_server(&mut self, path: &str) {
        if !self.is_connected() {
            return;
        }
        let actual = self.filenames.actual(path);
        let file = self.paths.to_server(&actual);
        let lines = self.breakpoints.lines(path);
        self.send_to_server(Command::SetBreakpoints { file, lines });
    }

    pub fn send_all_breakpoints(&mut self) {
        for key in self.breakpoints.files() {
            self.send_breakpoints_to_server(&key);
        }
    }

    fn verify_breakpoints(&mut self, path: &str) -> Vec<Breakpoint> {
        if !self.verify_debug(path) {
            return Vec::new();
        }

        let key = canonical_key(path);
        if !self.sources.contains_key(&key) {
            match load_source_lines(&resolve(path)) {
                Ok(lines) => {
                    self.sources.insert(key.clone(), lines);
                }
                Err(e) => {
                    log::debug!("no source for {}: {}", path, e);
                    return Vec::new();
                }
            }
        }
        let Some(lines) = self.sources.get(&key) else {
            return Vec::new();
        };

        let changed = self.breakpoints.verify(path, lines);
        for bp in &changed {
            self.emit(RuntimeEvent::BreakpointChanged(*bp));
        }
        changed
    }

    fn source_lines(&self) -> &[String] {
        self.sources
            .get(&self.source_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn load_source(&mut self, filename: &str) {
        if filename.is_empty() {
            return;
        }
        let resolved = resolve(filename).to_string_lossy().into_owned();
        if self.source_file.to_lowercase() == resolved.to_lowercase() {
            return;
        }
        if !self.verify_debug(&resolved) {
            return;
        }

        match load_source_lines(Path::new(&resolved)) {
            Ok(lines) => {
                self.filenames.remember(&resolved);
                let key = canonical_key(&resolved);
                log::debug!("loaded {} ({} lines)", resolved, lines.len());
                self.sources.insert(key.clone(), lines);
                self.source_key = key;
                self.source_file = resolved;
            }
            Err(e) => log::warn!("could not read {}: {}", resolved, e),
        }
    }

    /// Stop at the current line as if the server had stepped there. Comment
    /// lines are skipped forward.
    fn run_once(&mut self, reason: StopReason) -> bool {
        let total = self.source_lines().len();
        for _ in 0..=total {
            let Ok(index) = usize::try_from(self.current_line) else {
                return false;
            };
            let Some(line) = self.source_lines().get(index) else {
                return false;
            };
            let line = line.trim();
            if line.starts_with("//") {
                self.current_line += 1;
                continue;
            }
            let has_code = !line.is_empty();

            let file = self.source_file.clone();
            if self.breakpoints.at_line(&file, index).is_some() {
                self.emit(RuntimeEvent::Stopped(StopReason::Breakpoint));
                if let Some(bp) = self.breakpoints.mark_verified(&file, index) {
                    self.emit(RuntimeEvent::BreakpointChanged(bp));
                }
                return true;
            }
            if has_code {
                self.emit(RuntimeEvent::Stopped(reason));
                return true;
            }
            return false;
        }
        false
    }

    /// Interpret one complete response from the server.
    pub fn process_from_debugger(&mut self, frame: &[u8]) {
        if !self.valid {
            return;
        }
        if self.exception {
            log::debug!(
                "runtime {} ignoring {} bytes while an exception is pending",
                self.id,
                frame.len()
            );
            return;
        }

        let text = String::from_utf8_lossy(frame);
        let lines: Vec<&str> = text.split('\n').collect();
        let tag = ResponseTag::parse(lines[0]);
        log::trace!("runtime {} received {:?} ({} lines)", self.id, tag, lines.len());

        if tag == ResponseTag::SendFile {
            let chunk = self.connection.files().begin(frame);
            self.handle_file_chunk(chunk);
            return;
        }
        if self.connection.files().is_active() {
            let chunk = self.connection.files().push(frame);
            self.handle_file_chunk(chunk);
            return;
        }

        match tag {
            ResponseTag::Repl | ResponseTag::DebugRepl => {
                let end = lines.len().saturating_sub(1);
                for line in lines.iter().take(end).skip(1) {
                    if !line.trim().is_empty() {
                        self.print_output(line, None, None, true);
                    }
                }
                if self.repl {
                    self.emit(RuntimeEvent::ReplCompleted(text.to_string()));
                    self.disconnect_from_debugger();
                }
                return;
            }
            ResponseTag::End => {
                self.disconnect_from_debugger();
                return;
            }
            ResponseTag::Exception => {
                self.handle_exception(&lines);
                return;
            }
            _ => {}
        }

        let mut vars_start = 1;
        let mut stack_start = 1;

        if matches!(tag, ResponseTag::Vars | ResponseTag::Next) {
            self.variables.clear();
        }
        if tag == ResponseTag::Next && lines.len() > 3 {
            vars_start = self.handle_next(&lines);
        }
        if matches!(tag, ResponseTag::Vars | ResponseTag::Next) {
            let count = parse_count(lines.get(vars_start));
            self.variables.fill(&lines, vars_start, count);
            stack_start = vars_start.saturating_add(count).saturating_add(1);
        }
        if matches!(tag, ResponseTag::Stack | ResponseTag::Next) {
            let paths = &mut self.paths;
            self.stack = parse_stack(&lines, stack_start, |file| paths.to_local(file));
        }

        if self.current_line == SERVER_FINISHED_LINE {
            self.disconnect_from_debugger();
            return;
        }

        match &tag {
            ResponseTag::Other(name) => {
                log::debug!("unrecognized response tag {:?}", name);
                self.print_output(text.trim_end(), None, None, true);
            }
            ResponseTag::Vars | ResponseTag::File => {
                log::debug!("{:?} response with {} lines", tag, lines.len());
            }
            _ => {}
        }
    }

    /// Handle the header and output block of a `next` response, then decide
    /// whether to stop. Returns the index of the variable count line.
    fn handle_next(&mut self, lines: &[&str]) -> usize {
        let mut current = 1;
        let filename = self.paths.to_local(lines[current].trim());
        current += 1;
        self.load_source(&filename);

        self.current_line = lines[current].trim().parse().unwrap_or(-1);
        current += 1;
        let output_count = parse_count(lines.get(current));
        current += 1;

        let mut index = 0;
        while index < output_count && current + 1 < lines.len() {
            let header = lines[current].trim();
            current += 1;
            if index + 1 == output_count {
                break;
            }
            let mut parts = header.split('\t');
            let line_number = parts.next().and_then(|n| n.trim().parse::<i64>().ok());
            let file = parts.next().map(str::to_string);

            let text = lines[current].trim();
            current += 1;
            if index + 2 >= output_count && text.is_empty() {
                break;
            }
            self.print_output(text, file.as_deref(), line_number, true);
            index += 2;
        }

        self.variables
            .push_synthetic_global("__line", "number", (self.current_line + 1).to_string());

        if self.current_line >= 0 {
            let line = self.current_line as usize;
            let stop = !self.mode.is_continue()
                || self
                    .breakpoints
                    .at_line(&self.source_file, line)
                    .map_or(false, |bp| bp.verified);
            if stop {
                self.run_once(StopReason::Step);
            } else {
                self.send_to_server(Command::Continue);
            }
        }

        current
    }

    fn handle_exception(&mut self, lines: &[&str]) {
        self.variables.clear();
        self.emit(RuntimeEvent::Stopped(StopReason::Exception));
        self.exception = true;

        let vars_start = 2;
        let count = parse_count(lines.get(vars_start));
        self.variables.fill(lines, vars_start, count);

        let paths = &mut self.paths;
        let stack_start = vars_start.saturating_add(count).saturating_add(1);
        self.stack = parse_stack(lines, stack_start, |file| paths.to_local(file));

        let message = lines.get(1).copied().unwrap_or("");
        let header = format!("Exception thrown. {} ", message);
        match self.stack.first().cloned() {
            Some(top) => self.print_output(&header, Some(&top.file), Some(top.line), true),
            None => self.print_output(&header, None, None, true),
        }
    }

    fn handle_file_chunk(&mut self, chunk: FileChunk) {
        match chunk {
            FileChunk::Pending => {}
            FileChunk::Malformed => log::warn!("ignoring malformed file transfer"),
            FileChunk::Complete(file) => {
                if let Err(e) = fs::write(&file.filename, &file.bytes) {
                    log::error!("could not write {}: {}", file.filename, e);
                    let message = format!("Could not save remote file to: {}", file.filename);
                    self.print_output(&message, None, None, true);
                    self.notify(NotificationLevel::Error, format!("{}: {}", message, e));
                    return;
                }
                let message = format!("Saved remote file to: {}", file.filename);
                self.print_output(&message, None, None, true);
                if self.repl {
                    self.emit(RuntimeEvent::ReplCompleted(message));
                }
            }
        }
    }

    /// End the session. Does nothing if the runtime was already torn down.
    pub fn disconnect_from_debugger(&mut self) {
        if !self.valid {
            return;
        }
        self.print_output("Finished debugging.", None, None, true);
        self.send_to_server(Command::Bye);
        self.connection.close();
        self.source_file.clear();
        self.source_key.clear();
        self.emit(RuntimeEvent::Terminated);
        self.valid = false;
        self.registry.retire(self.id);
        log::debug!("runtime {} retired", self.id);
    }

    pub fn stack(&self) -> StackTrace {
        if !self.stack.is_empty() {
            return StackTrace {
                frames: self.stack.clone(),
                count: self.stack.len(),
            };
        }

        let name = usize::try_from(self.current_line)
            .ok()
            .and_then(|line| self.source_lines().get(line))
            .map(|line| line.trim().to_string())
            .unwrap_or_default();
        StackTrace {
            frames: vec![StackEntry {
                id: 1,
                line: self.current_line,
                name,
                file: self.source_file.clone(),
            }],
            count: 0,
        }
    }

    /// Text shown when hovering over `expr`: its value if it is a variable,
    /// else the doc string of a keyword or built-in function.
    pub fn hover_value(&self, expr: &str) -> String {
        if let Some(value) = self.variables.value_of(expr) {
            return format!("{}={}", expr, value);
        }
        let lower = expr.to_lowercase();
        if let Some(doc) = keyword_doc(&lower) {
            return doc.to_string();
        }
        if let Some(dot) = lower.find('.') {
            if dot + 1 < lower.len() {
                if let Some(doc) = keyword_doc(&lower[dot + 1..]) {
                    return doc.to_string();
                }
            }
        }
        expr.to_string()
    }

    pub fn variable_value(&self, expr: &str) -> String {
        self.variables
            .value_of(expr)
            .unwrap_or(UNKNOWN_VALUE)
            .to_string()
    }

    fn print_output(&mut self, text: &str, file: Option<&str>, line: Option<i64>, newline: bool) {
        let file = match file {
            Some(file) if !file.is_empty() => file.to_string(),
            _ => self.source_file.clone(),
        };
        let file = self.paths.to_local(&file);
        let line = line
            .filter(|line| *line >= 0)
            .or(Some(self.current_line).filter(|line| *line >= 0))
            .and_then(|line| usize::try_from(line).ok());

        self.emit(RuntimeEvent::Output(OutputLine {
            text: text.to_string(),
            file,
            line,
            column: 0,
            newline,
        }));
    }

    fn notify(&self, level: NotificationLevel, message: String) {
        self.emit(RuntimeEvent::Notification { level, message });
    }

    fn emit(&self, event: RuntimeEvent) {
        if self.events.send(event).is_err() {
            log::trace!("runtime {} has no event listener", self.id);
        }
    }
}

fn parse_count(line: Option<&&str>) -> usize {
    line.and_then(|line| line.trim().parse().ok()).unwrap_or(0)
}
