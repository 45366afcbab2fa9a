//! Command dispatch: turns parsed arguments into one validated `Command` and
//! routes it to its handler.
//!
//! ## Commands
//! - `list [prefix]`       — `filename<TAB>length` for every match
//! - `search <substring>`  — same output, substring/glob match
//! - `put <name>`          — store a local file (optionally replacing older ones)
//! - `get <name>`          — write the newest file with that name locally
//! - `delete <name>`       — remove every file with that name

pub mod command;

pub use command::{Command, GetOptions, PutOptions, dispatch};
