mod breakpoints;
mod events;
mod keywords;
mod paths;
mod registry;
mod runtime;
mod stepping;
mod variables;

pub use breakpoints::{Breakpoint, Breakpoints};
pub use events::{NotificationLevel, OutputLine, RuntimeEvent};
pub use keywords::keyword_doc;
pub use paths::{canonical_key, resolve, Filenames, PathMapper};
pub use registry::SessionRegistry;
pub use runtime::{Runtime, StackTrace, UNKNOWN_VALUE};
pub use stepping::{RunMode, StopReason};
pub use variables::{parse_stack, StackEntry, Variable, Variables};
