//! Always-on companion process that discovers log-like files under one or
//! more root folders, follows their growth in real time, filters filenames
//! and line content, and streams matched lines to stdout.

pub mod command;
pub mod config;
pub mod filter;
pub mod output;
pub mod watcher;
