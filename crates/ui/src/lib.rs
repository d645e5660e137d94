#![deny(unsafe_code)]

/// Terminal driver for a single chat thread.
pub mod app;
/// Chat thread view model: history, sending, memory and virtualized layout.
pub mod chat;
/// Settings persistence.
pub mod settings;
