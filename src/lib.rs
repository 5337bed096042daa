//! Bridge between editor front ends and a remote CSCS interpreter server.
//!
//! The [`dap`] module speaks the Debug Adapter Protocol to an editor, the
//! [`repl`] module serves interactive evaluation, and both drive a
//! [`debugger::Runtime`] that talks the interpreter's line protocol over
//! [`wire`].

pub mod cli;
pub mod config;
pub mod dap;
pub mod debugger;
pub mod error;
pub mod parser;
pub mod repl;
pub mod wire;

pub use error::{Error, Result};
