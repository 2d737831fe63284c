//! Device events and the callback boundary.
//!
//! Pollers decode serial bytes into [`Event`]s and hand them to an
//! [`EventSink`]. The sink is the seam to the outside world: the daemon
//! installs a [`HookSink`] that logs every event and applies the actions
//! configured for it, either dispatching a registry command or spawning a
//! shell command.

use std::collections::HashMap;
use std::fmt;
use std::process::Command as ShellCommand;
use std::sync::{Arc, OnceLock};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PicodError, Result};
use crate::registry::Registry;

/// A typed event argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Int(i64),
    Str(String),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(v) => write!(f, "{}", v),
            Arg::Str(s) => write!(f, "{}", s),
        }
    }
}

/// A decoded device event, e.g. `power_button(3)` or
/// `lcd_button(mask, down, up)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: &'static str,
    pub args: Vec<Arg>,
}

impl Event {
    pub fn new(name: &'static str, args: Vec<Arg>) -> Self {
        Self { name, args }
    }

    /// Event with no arguments.
    pub fn plain(name: &'static str) -> Self {
        Self { name, args: Vec::new() }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, ")")
    }
}

/// Callback boundary: pollers deliver events here synchronously, in decode
/// order per module. A slow sink stalls only the delivering poller.
pub trait EventSink: Send + Sync {
    fn invoke(&self, event: &Event) -> Result<()>;
}

/// Sink that only logs events.
pub struct LogSink;

impl EventSink for LogSink {
    fn invoke(&self, event: &Event) -> Result<()> {
        info!("event {}", event);
        Ok(())
    }
}

/// One configured reaction to an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HookAction {
    /// Dispatch a registered command, e.g. `piccmd: [fanspeed, high]`.
    Piccmd(Vec<String>),
    /// Run a shell command; event arguments are passed as `$1`, `$2`, ...
    Exec(String),
}

/// Event-name → actions table, as loaded from the config file.
pub type Hooks = HashMap<String, Vec<HookAction>>;

/// The daemon's sink: logs each event and applies its configured hooks.
///
/// The registry is bound after startup (the builder must be frozen first),
/// strictly before any poller starts delivering events.
pub struct HookSink {
    hooks: Hooks,
    registry: OnceLock<Arc<Registry>>,
}

impl HookSink {
    pub fn new(hooks: Hooks) -> Self {
        Self {
            hooks,
            registry: OnceLock::new(),
        }
    }

    /// Bind the frozen registry. Called once, before pollers start.
    pub fn bind_registry(&self, registry: Arc<Registry>) {
        if self.registry.set(registry).is_err() {
            warn!("registry already bound to event sink");
        }
    }

    fn apply(&self, action: &HookAction, event: &Event) -> Result<()> {
        match action {
            HookAction::Piccmd(cmdline) => {
                let Some((name, args)) = cmdline.split_first() else {
                    return Err(PicodError::Config("empty piccmd hook".into()));
                };
                let registry = self
                    .registry
                    .get()
                    .ok_or_else(|| PicodError::Registry("registry not bound".into()))?;
                let status = registry.run(name, args);
                if status < 0 {
                    warn!("hook piccmd {:?} for {} returned {}", cmdline, event.name, status);
                }
                Ok(())
            }
            HookAction::Exec(cmd) => {
                let mut shell = ShellCommand::new("sh");
                shell.arg("-c").arg(cmd).arg("picod-hook");
                for arg in &event.args {
                    shell.arg(arg.to_string());
                }
                let status = shell.status().map_err(|e| {
                    PicodError::Config(format!("hook exec {:?} failed: {}", cmd, e))
                })?;
                if !status.success() {
                    warn!("hook exec {:?} for {} exited with {}", cmd, event.name, status);
                }
                Ok(())
            }
        }
    }
}

impl EventSink for HookSink {
    fn invoke(&self, event: &Event) -> Result<()> {
        info!("event {}", event);
        let Some(actions) = self.hooks.get(event.name) else {
            debug!("no hooks for {}", event.name);
            return Ok(());
        };
        for action in actions {
            self.apply(action, event)?;
        }
        Ok(())
    }
}
