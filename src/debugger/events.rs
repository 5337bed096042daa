use super::breakpoints::Breakpoint;
use super::stepping::StopReason;

/// A line of interpreter or bridge output, located in a local source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub file: String,
    /// Zero based; `None` when no line is known.
    pub line: Option<usize>,
    pub column: usize,
    pub newline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// Everything a runtime reports to whoever drives it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Stopped(StopReason),
    BreakpointChanged(Breakpoint),
    Output(OutputLine),
    /// Status bar text.
    Status(String),
    Notification {
        level: NotificationLevel,
        message: String,
    },
    /// Raw reply to a REPL submission.
    ReplCompleted(String),
    Terminated,
}
