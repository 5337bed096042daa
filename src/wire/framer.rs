//! Wire format spoken with the interpreter server.
//!
//! Outbound commands are single lines: `tag|payload\n`. Inbound responses
//! start with a tag line; large responses are preceded by a line holding the
//! total byte count, and file transfers announce their own length after the
//! `send_file` tag.

use std::fmt;

/// Tag of the response that starts a file transfer.
pub const FILE_SEND_TAG: &str = "send_file";

/// A command understood by the interpreter server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tell the server which file is being debugged.
    File(String),
    /// Replace the breakpoints of one file.
    SetBreakpoints { file: String, lines: Vec<usize> },
    Continue,
    Next,
    StepIn,
    StepOut,
    /// Evaluate code on behalf of a REPL client.
    Repl(String),
    /// Evaluate code from the debug console of an active session.
    DebugRepl(String),
    Bye,
}

impl Command {
    pub fn tag(&self) -> &'static str {
        match self {
            Command::File(_) => "file",
            Command::SetBreakpoints { .. } => "setbp",
            Command::Continue => "continue",
            Command::Next => "next",
            Command::StepIn => "stepin",
            Command::StepOut => "stepout",
            Command::Repl(_) => "repl",
            Command::DebugRepl(_) => "_repl",
            Command::Bye => "bye",
        }
    }

    pub fn payload(&self) -> String {
        match self {
            Command::File(path) => path.clone(),
            Command::SetBreakpoints { file, lines } => {
                let mut data = file.clone();
                for line in lines {
                    data.push('|');
                    data.push_str(&line.to_string());
                }
                data
            }
            Command::Repl(code) | Command::DebugRepl(code) => code.clone(),
            Command::Continue
            | Command::Next
            | Command::StepIn
            | Command::StepOut
            | Command::Bye => String::new(),
        }
    }

    /// Full line as written to the socket, newline included.
    pub fn encode(&self) -> String {
        format!("{}|{}\n", self.tag(), self.payload())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.tag(), self.payload())
    }
}

/// Tag on the first line of an inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseTag {
    Repl,
    DebugRepl,
    SendFile,
    End,
    Vars,
    Next,
    Exception,
    Stack,
    File,
    Other(String),
}

impl ResponseTag {
    pub fn parse(tag: &str) -> Self {
        match tag.trim() {
            "repl" => ResponseTag::Repl,
            "_repl" => ResponseTag::DebugRepl,
            FILE_SEND_TAG => ResponseTag::SendFile,
            "end" => ResponseTag::End,
            "vars" => ResponseTag::Vars,
            "next" => ResponseTag::Next,
            "exc" => ResponseTag::Exception,
            "stack" => ResponseTag::Stack,
            "file" => ResponseTag::File,
            other => ResponseTag::Other(other.to_string()),
        }
    }
}

/// Reassembles responses whose first line announces their total length.
#[derive(Debug, Default)]
pub struct ResponseAssembler {
    expected: usize,
    buffer: Vec<u8>,
    collecting: bool,
}

impl ResponseAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk as read from the socket. Returns a complete response
    /// once available; chunks without a length header pass straight through.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        let mut body = chunk;

        if !self.collecting {
            let header_end = chunk.iter().position(|&b| b == b'\n');
            let expected = match header_end {
                Some(end) if end > 0 => parse_length(&chunk[..end]).unwrap_or(0),
                _ => 0,
            };
            if expected == 0 {
                return Some(chunk.to_vec());
            }
            if let Some(end) = header_end {
                body = &chunk[end + 1..];
            }
            log::trace!("collecting response of {} bytes", expected);
            self.expected = expected;
            self.buffer.clear();
            self.collecting = true;
        }

        self.buffer.extend_from_slice(body);
        if self.buffer.len() >= self.expected {
            self.expected = 0;
            self.collecting = false;
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Bytes received and bytes expected for the response in progress.
    pub fn progress(&self) -> (usize, usize) {
        (self.buffer.len(), self.expected)
    }
}

fn parse_length(header: &[u8]) -> Option<usize> {
    std::str::from_utf8(header).ok()?.trim().parse().ok()
}

/// A file fully received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum FileChunk {
    /// The `send_file` header lacked the length or file name lines.
    Malformed,
    Pending,
    Complete(ReceivedFile),
}

#[derive(Debug)]
struct PendingFile {
    filename: String,
    expected: usize,
    bytes: Vec<u8>,
}

/// Accumulates a raw file payload announced by a `send_file` response.
/// Independent of [`ResponseAssembler`], whose output it consumes.
#[derive(Debug, Default)]
pub struct FileAssembler {
    pending: Option<PendingFile>,
}

impl FileAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a transfer from a frame of the form
    /// `send_file\n<length>\n<filename>\n<bytes...>`.
    pub fn begin(&mut self, frame: &[u8]) -> FileChunk {
        let mut newlines = frame
            .iter()
            .enumerate()
            .filter(|&(_, &b)| b == b'\n')
            .map(|(index, _)| index);

        let (Some(tag_end), Some(length_end)) = (newlines.next(), newlines.next()) else {
            return FileChunk::Malformed;
        };
        let name_end = newlines.next();

        let expected = parse_length(&frame[tag_end + 1..length_end]).unwrap_or(0);
        let name_bytes = &frame[length_end + 1..name_end.unwrap_or(frame.len())];
        let filename = String::from_utf8_lossy(name_bytes).trim().to_string();
        if filename.is_empty() {
            return FileChunk::Malformed;
        }

        let body = match name_end {
            Some(end) => frame[end + 1..].to_vec(),
            None => Vec::new(),
        };
        log::debug!("receiving {} bytes into {}", expected, filename);

        self.pending = Some(PendingFile {
            filename,
            expected,
            bytes: body,
        });
        self.try_complete()
    }

    /// Append raw bytes to the transfer in progress.
    pub fn push(&mut self, chunk: &[u8]) -> FileChunk {
        match self.pending.as_mut() {
            Some(pending) => {
                pending.bytes.extend_from_slice(chunk);
                self.try_complete()
            }
            None => FileChunk::Malformed,
        }
    }

    fn try_complete(&mut self) -> FileChunk {
        let done = matches!(&self.pending, Some(p) if p.bytes.len() >= p.expected);
        if !done {
            return FileChunk::Pending;
        }
        match self.pending.take() {
            Some(mut pending) => {
                pending.bytes.truncate(pending.expected);
                FileChunk::Complete(ReceivedFile {
                    filename: pending.filename,
                    bytes: pending.bytes,
                })
            }
            None => FileChunk::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloadless_commands_keep_separator() {
        assert_eq!(Command::Continue.encode(), "continue|\n");
        assert_eq!(Command::Bye.encode(), "bye|\n");
    }

    #[test]
    fn setbp_joins_lines() {
        let cmd = Command::SetBreakpoints {
            file: "/srv/a.cscs".to_string(),
            lines: vec![3, 7],
        };
        assert_eq!(cmd.encode(), "setbp|/srv/a.cscs|3|7\n");
    }

    #[test]
    fn unknown_tag_is_preserved() {
        assert_eq!(
            ResponseTag::parse("weird\r"),
            ResponseTag::Other("weird".to_string())
        );
    }
}
