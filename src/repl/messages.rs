use serde::{Deserialize, Serialize};

/// Messages posted by the REPL front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WebviewCommand {
    Repl {
        text: String,
        #[serde(default)]
        id: u64,
    },
    /// Load a history file. Without a file name the default session file is used.
    Load {
        #[serde(default)]
        filename: Option<String>,
    },
    Save {
        #[serde(default)]
        filename: Option<String>,
    },
    /// Pick an entry from the history; without an index the whole history
    /// is sent back for the front end to choose from.
    ShowHistory {
        #[serde(default)]
        index: Option<usize>,
    },
    ClearHistory,
    RequestId,
    RequestHistory,
    SendHistory {
        #[serde(default)]
        history: Vec<String>,
    },
    GetClipboard,
    WriteClipboard {
        #[serde(default)]
        text: String,
    },
    Info {
        #[serde(default)]
        text: String,
    },
    Warning {
        #[serde(default)]
        text: String,
    },
    Error {
        #[serde(default)]
        text: String,
    },
}

/// Messages sent back to the REPL front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WebviewEvent {
    ReplResponse { text: String, id: u64 },
    Load { text: String, filename: String },
    /// Run this history entry.
    Request { text: String },
    History { history: Vec<String> },
    Id { id: u64 },
    ClipboardContent { text: String },
    CopyCompleted { text: String },
}
