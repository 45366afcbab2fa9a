//! Command handlers for the `files` CLI.

pub mod file_handlers;
