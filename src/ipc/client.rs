//! IPC client - send one command to the daemon and render the reply

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;

use colored::Colorize;

use crate::error::{PicodError, Result};
use crate::wire::{self, Request, Response, MAX_MESSAGE};

/// Send a command line to the daemon and return the response.
pub fn send_request<P: AsRef<Path>>(socket: P, args: &[String]) -> Result<Response> {
    let socket = socket.as_ref();
    let mut stream = UnixStream::connect(socket).map_err(|e| {
        PicodError::Ipc(format!(
            "failed to connect to {} ({}), is the daemon running?",
            socket.display(),
            e
        ))
    })?;

    let encoded = wire::encode_request(&Request::new(args.to_vec()))?;
    stream
        .write_all(&encoded)
        .map_err(|e| PicodError::Ipc(format!("send: {}", e)))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| PicodError::Ipc(format!("shutdown: {}", e)))?;

    let mut buf = Vec::with_capacity(256);
    // `UnixStream` is both Read and Write, so name the trait for `take`.
    Read::by_ref(&mut stream)
        .take(MAX_MESSAGE as u64 + 1)
        .read_to_end(&mut buf)
        .map_err(|e| PicodError::Ipc(format!("read: {}", e)))?;

    wire::decode_response(&buf)
}

/// Run a command through the daemon, printing its error or help output.
/// Returns the process exit code.
pub fn run_command<P: AsRef<Path>>(socket: P, args: &[String]) -> Result<i32> {
    let response = send_request(socket, args)?;

    if let Some(text) = &response.error {
        eprint!("{}", text.red());
        return Ok(1);
    }
    if let Some(listing) = &response.help {
        println!("\nAvailable commands are:");
        print!("{}", String::from_utf8_lossy(listing));
        return Ok(1);
    }
    Ok(0)
}

/// Probe whether a daemon is alive behind the socket, the quiet way:
/// connect and immediately close without sending anything.
pub fn probe<P: AsRef<Path>>(socket: P) -> bool {
    UnixStream::connect(socket.as_ref()).is_ok()
}
