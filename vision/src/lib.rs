//! English-like acceptance tests for web pages
//!
//! A script is a list of plain sentences such as
//! `Type 'selenium' in the 'Username' textfield in the 'Login' table`. This
//! crate parses them, tracks the indentation-based test scopes, resolves the
//! nouns to page elements through an [`ActionDispatcher`] and drives the
//! interactive run loop. The browser itself lives behind the dispatcher.

pub mod buffer;
pub mod command;
pub mod config;
pub mod console;
pub mod context;
pub mod dispatcher;
pub mod duration;
pub mod errors;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod resolve;
pub mod scope;
pub mod store;
#[cfg(test)]
mod tests;

pub use buffer::{BufferEntry, EntryStatus, ScriptBuffer, SkipCause};
pub use command::{Command, NounKind, NounSpec, Verb};
pub use config::InterpreterConfig;
pub use console::Console;
pub use context::{ContextStore, Handle};
pub use dispatcher::{ActionDispatcher, ElementRef};
pub use errors::{AutomationError, ResolutionError, VisionError};
pub use interpreter::{Event, Interpreter, Outcome, OutcomeStatus, RunMode, RunState};
pub use parser::parse_line;
pub use resolve::Resolver;
pub use store::{FsScriptStore, MemoryStore, ScriptStore};
