//! Daemon orchestration.
//!
//! Brings the pieces together in a fixed order: activate the configured
//! modules into a registry builder, freeze the registry, hand it to the
//! hook sink, start the pollers, then serve IPC until the accept loop
//! ends. A module that fails to activate is logged and skipped so one
//! missing device does not take down the rest.

use std::sync::Arc;

use log::{error, warn};

use crate::config::Config;
use crate::error::Result;
use crate::event::{EventSink, HookSink};
use crate::ipc::IpcServer;
use crate::modules::{self, ModuleCtx};
use crate::poller::{ArmedPoller, PollerSet};
use crate::registry::{Registry, RegistryBuilder};

/// Activate the configured modules and freeze the result.
fn build(config: &Config) -> (Arc<Registry>, Vec<ArmedPoller>, Arc<HookSink>) {
    let sink = Arc::new(HookSink::new(config.hooks.clone()));
    let mut builder = RegistryBuilder::new();
    let mut armed: Vec<ArmedPoller> = Vec::new();

    {
        let mut ctx = ModuleCtx {
            registry: &mut builder,
            pollers: &mut armed,
            sink: Arc::clone(&sink) as Arc<dyn EventSink>,
        };
        for module in &config.modules {
            if let Err(e) = modules::activate(&module.name, &module.args, &mut ctx) {
                error!("{}", e);
            }
        }
    }

    if builder.is_empty() {
        warn!("no commands registered, check the modules section of the config");
    }
    let registry = builder.freeze();
    sink.bind_registry(Arc::clone(&registry));
    (registry, armed, sink)
}

/// Run the daemon until the IPC accept loop ends.
pub fn run(config: &Config) -> Result<()> {
    let (registry, armed, sink) = build(config);

    let mut pollers = PollerSet::new();
    for poller in armed {
        pollers.spawn(poller, Arc::clone(&sink) as Arc<dyn EventSink>);
    }

    let server = IpcServer::bind(&config.socket, registry)?;
    let result = server.run();
    drop(server);
    pollers.shutdown();
    result
}

/// Execute one command against the hardware without a daemon or socket.
/// Returns the process exit code.
pub fn run_direct(config: &Config, command: &[String]) -> Result<i32> {
    let (registry, armed, _sink) = build(config);

    let Some((name, args)) = command.split_first() else {
        eprint!("{}", registry.help_table());
        return Ok(1);
    };
    let status = registry.run(name, args);
    // Dropping the armed pollers closes the serial lines and restores
    // their settings.
    drop(armed);
    if status < 0 {
        eprint!("{}", registry.help_text(name));
        return Ok(1);
    }
    Ok(0)
}

/// Fork into the background: new session, root working directory, stdio
/// closed. The parent gets `Fork::Parent` and should exit immediately.
pub fn daemonize() -> Result<Fork> {
    match unsafe { libc::fork() } {
        -1 => Err(std::io::Error::last_os_error().into()),
        0 => {
            unsafe {
                libc::umask(0);
            }
            if unsafe { libc::setsid() } < 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            std::env::set_current_dir("/")?;
            unsafe {
                libc::close(libc::STDIN_FILENO);
                libc::close(libc::STDOUT_FILENO);
                libc::close(libc::STDERR_FILENO);
            }
            Ok(Fork::Child)
        }
        _ => Ok(Fork::Parent),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fork {
    Parent,
    Child,
}
