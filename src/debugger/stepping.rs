/// How the runtime reacts to the next `next` response from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Keep sending `continue` until a verified breakpoint is reached.
    Continue,
    StepOver,
    StepInto,
    StepOut,
}

impl RunMode {
    pub fn is_continue(self) -> bool {
        self == RunMode::Continue
    }
}

/// Why execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Entry,
    Step,
    Breakpoint,
    Exception,
}

impl StopReason {
    /// Reason string of the DAP `stopped` event.
    pub fn as_dap_reason(self) -> &'static str {
        match self {
            StopReason::Entry => "entry",
            StopReason::Step => "step",
            StopReason::Breakpoint => "breakpoint",
            StopReason::Exception => "exception",
        }
    }
}
