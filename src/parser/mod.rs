mod source;
mod splitter;
mod types;

pub use source::{
    first_executable_line, has_source_extension, is_comment, load_source_lines,
    next_executable_line, SOURCE_EXTENSIONS,
};
pub use splitter::split_statements;
pub use types::{SourceExcerpt, SplitError, SplitResult};
