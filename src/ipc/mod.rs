//! IPC module for daemon-widget communication

mod protocol;
mod server;

pub use server::{Server, ServerLinks};
