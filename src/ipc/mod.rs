//! IPC between the daemon and the control client.
//!
//! One Unix stream socket, one request per connection: the client sends
//! an encoded command line, the daemon answers with a status and optional
//! error or help text, then the connection closes.

pub mod client;
pub mod server;

pub use client::run_command;
pub use server::IpcServer;
