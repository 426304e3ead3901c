//! Widget shell bridge
//!
//! The capabilities themselves live in the widget shell (the page hosting
//! the chat widget). The daemon drives them by broadcasting [`Command`]s to
//! subscribed IPC clients; the shell reports back through IPC requests.

mod capabilities;

pub use capabilities::{Bridge, Command};
