//! Terminal workspace controller for a spec-driven repository: file explorer
//! with markdown preview, git change browser, task board and an embedded
//! shell, driven by a single message loop.

pub mod ansi;
pub mod app;
pub mod config;
pub mod diff;
pub mod layout;
pub mod render;
pub mod runtime;
pub mod tasks;
pub mod terminal;
pub mod theme;
pub mod tree;
pub mod ui;
pub mod watch;
