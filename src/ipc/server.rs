//! IPC server - Unix socket command dispatch
//!
//! Provides:
//! - Unix stream socket listener with stale-socket takeover
//! - Sequential client connection handling
//! - Request dispatch against the frozen command registry

use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{PicodError, Result};
use crate::registry::Registry;
use crate::wire::{self, Request, Response, MAX_MESSAGE};

/// IPC server bound to a Unix socket, dispatching into the registry.
pub struct IpcServer {
    socket_path: PathBuf,
    listener: UnixListener,
    registry: Arc<Registry>,
}

impl IpcServer {
    /// Bind the socket. If the path is in use, probe it: a connectable
    /// socket means another instance is live and we refuse to start; a
    /// dead one is left over from a crash and gets replaced.
    pub fn bind<P: AsRef<Path>>(path: P, registry: Arc<Registry>) -> Result<Self> {
        let socket_path = path.as_ref().to_path_buf();
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                if UnixStream::connect(&socket_path).is_ok() {
                    return Err(PicodError::AlreadyRunning(
                        socket_path.display().to_string(),
                    ));
                }
                debug!("removing stale socket {}", socket_path.display());
                std::fs::remove_file(&socket_path)?;
                UnixListener::bind(&socket_path).map_err(|e| {
                    PicodError::Ipc(format!(
                        "failed to bind {}: {}",
                        socket_path.display(),
                        e
                    ))
                })?
            }
            Err(e) => {
                return Err(PicodError::Ipc(format!(
                    "failed to bind {}: {}",
                    socket_path.display(),
                    e
                )));
            }
        };

        Ok(Self {
            socket_path,
            listener,
            registry,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accept and serve clients one at a time. An accept failure is fatal
    /// and the error propagates to the daemon's exit status.
    pub fn run(&self) -> Result<()> {
        info!("listening on {}", self.socket_path.display());
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if let Err(e) = handle_connection(stream, &self.registry) {
                        warn!("client connection failed: {}", e);
                    }
                }
                Err(e) => {
                    error!("accept failed: {}", e);
                    return Err(PicodError::Ipc(format!("accept failed: {}", e)));
                }
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

fn handle_connection(mut stream: UnixStream, registry: &Registry) -> Result<()> {
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    let request = loop {
        let mut chunk = [0u8; 256];
        let n = stream
            .read(&mut chunk)
            .map_err(|e| PicodError::Ipc(format!("read: {}", e)))?;
        if n == 0 {
            if buf.is_empty() {
                // Connect-and-close, as used by the liveness probe.
                return Ok(());
            }
            return Err(PicodError::Ipc("client closed mid-request".to_string()));
        }
        if buf.len() + n > MAX_MESSAGE {
            return Err(PicodError::Ipc("request too large".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(request) = wire::decode_request(&buf)? {
            break request;
        }
    };

    let response = dispatch(&request, registry);
    let encoded = wire::encode_response(&response)?;
    stream
        .write_all(&encoded)
        .map_err(|e| PicodError::Ipc(format!("write: {}", e)))?;
    Ok(())
}

fn dispatch(request: &Request, registry: &Registry) -> Response {
    let Some((name, args)) = request.args.split_first() else {
        return Response::error(-1, "No command given\n");
    };

    if name == "--help" || name == "-h" {
        return Response::help_listing(registry.help_table().into_bytes());
    }

    debug!("dispatching {} with {} args", name, args.len());
    let status = registry.run(name, args);
    if status < 0 {
        Response::error(status, registry.help_text(name))
    } else {
        Response::status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;

    fn test_registry() -> Arc<Registry> {
        let mut builder = RegistryBuilder::new();
        builder
            .register("buzzer", "Buzz", "Buzz, options are:\n\tshort\n\tlong\n", |args| {
                match args.first().map(String::as_str) {
                    Some("short") | Some("long") => 0,
                    _ => -1,
                }
            })
            .unwrap();
        builder.freeze()
    }

    fn request(args: &[&str]) -> Request {
        Request::new(args.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_dispatch_success() {
        let registry = test_registry();
        let response = dispatch(&request(&["buzzer", "short"]), &registry);
        assert_eq!(response.status, 0);
        assert!(response.error.is_none());
        assert!(response.help.is_none());
    }

    #[test]
    fn test_dispatch_unknown_command() {
        let registry = test_registry();
        let response = dispatch(&request(&["frobnicate"]), &registry);
        assert_eq!(response.status, -1);
        assert_eq!(response.error.as_deref(), Some("Command not found\n"));
    }

    #[test]
    fn test_dispatch_bad_argument_gets_long_help() {
        let registry = test_registry();
        let response = dispatch(&request(&["buzzer", "forever"]), &registry);
        assert_eq!(response.status, -1);
        assert!(response.error.as_deref().unwrap().contains("short"));
    }

    #[test]
    fn test_dispatch_empty_request() {
        let registry = test_registry();
        let response = dispatch(&request(&[]), &registry);
        assert_eq!(response.status, -1);
    }

    #[test]
    fn test_dispatch_help_listing() {
        let registry = test_registry();
        let response = dispatch(&request(&["--help"]), &registry);
        assert_eq!(response.status, 0);
        let table = String::from_utf8(response.help.unwrap()).unwrap();
        assert!(table.contains("buzzer"));
        assert!(table.contains("Buzz"));
    }

    #[test]
    fn test_dispatch_help_short_flag() {
        let registry = test_registry();
        let response = dispatch(&request(&["-h"]), &registry);
        assert_eq!(response.status, 0);
        assert!(response.help.is_some());
    }

    #[test]
    fn test_bind_refuses_second_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picod.sock");
        let first = IpcServer::bind(&path, test_registry()).unwrap();
        let second = IpcServer::bind(&path, test_registry());
        assert!(matches!(second, Err(PicodError::AlreadyRunning(_))));
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn test_run_fails_when_listener_breaks() {
        use std::os::fd::AsRawFd;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picod.sock");
        let server = IpcServer::bind(&path, test_registry()).unwrap();

        // Swap the listening socket for /dev/null; the next accept fails
        // with ENOTSOCK and the serve loop must report that, not exit 0.
        let devnull = std::fs::File::open("/dev/null").unwrap();
        let rc = unsafe { libc::dup2(devnull.as_raw_fd(), server.listener.as_raw_fd()) };
        assert!(rc >= 0);

        assert!(matches!(server.run(), Err(PicodError::Ipc(_))));
    }

    #[test]
    fn test_bind_replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picod.sock");
        {
            // A bare listener leaves its socket file behind on drop,
            // like a crashed daemon would.
            let _stale = UnixListener::bind(&path).unwrap();
        }
        assert!(path.exists());
        let server = IpcServer::bind(&path, test_registry()).unwrap();
        assert_eq!(server.socket_path(), path);
    }
}
