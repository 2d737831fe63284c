//! Command registry: the table behind IPC dispatch.
//!
//! Hardware modules register their commands into a [`RegistryBuilder`]
//! during single-threaded startup; the builder is then frozen into an
//! immutable [`Registry`] shared by the IPC server and the event sink.
//! Nothing can register after the freeze, so no lock is needed.

use std::fmt;
use std::sync::Arc;

use crate::error::{PicodError, Result};

/// Maximum command name length in bytes.
pub const MAX_CMD_NAME: usize = 16;

/// Handler signature: C-style integer status, 0 = ok, negative = error.
/// The IPC server turns a negative status into an error response carrying
/// the command's long help.
pub type Handler = Box<dyn Fn(&[String]) -> i32 + Send + Sync>;

/// A registered command.
pub struct Command {
    name: String,
    short_help: String,
    long_help: String,
    handler: Handler,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("short_help", &self.short_help)
            .finish()
    }
}

/// Mutable registry, only alive during startup.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: Vec<Command>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Fails if the name exceeds [`MAX_CMD_NAME`]; the
    /// registry is unchanged on failure.
    pub fn register<F>(&mut self, name: &str, short_help: &str, long_help: &str, handler: F) -> Result<()>
    where
        F: Fn(&[String]) -> i32 + Send + Sync + 'static,
    {
        if name.len() > MAX_CMD_NAME {
            return Err(PicodError::Registry(format!(
                "command name {:?} exceeds {} bytes",
                name, MAX_CMD_NAME
            )));
        }
        self.commands.push(Command {
            name: name.to_string(),
            short_help: short_help.to_string(),
            long_help: long_help.to_string(),
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// Number of registered commands. Used for rollback on module failure.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop commands registered after `len`, undoing a failed module's
    /// partial registrations.
    pub fn truncate(&mut self, len: usize) {
        self.commands.truncate(len);
    }

    /// Freeze into the shared, read-only registry.
    pub fn freeze(self) -> Arc<Registry> {
        Arc::new(Registry {
            commands: self.commands,
        })
    }
}

/// Immutable command table. Lookup is first-match in registration order.
pub struct Registry {
    commands: Vec<Command>,
}

impl Registry {
    /// Run a command by name. Returns the handler's status, or -1 if no
    /// command matches.
    pub fn run(&self, name: &str, args: &[String]) -> i32 {
        for cmd in &self.commands {
            if cmd.name == name {
                return (cmd.handler)(args);
            }
        }
        -1
    }

    /// Long help for a command, or the fixed not-found text. The server
    /// attaches this to every negative-status response, so an unknown
    /// command and a rejected one take the same path.
    pub fn help_text(&self, name: &str) -> &str {
        for cmd in &self.commands {
            if cmd.name == name {
                return &cmd.long_help;
            }
        }
        "Command not found\n"
    }

    /// Help table: one line per command in registration order, name padded
    /// to the fixed width.
    pub fn help_table(&self) -> String {
        let mut out = String::new();
        for cmd in &self.commands {
            out.push_str(&format!("{:<16} {}\n", cmd.name, cmd.short_help));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("commands", &self.commands).finish()
    }
}
