//! Device support modules.
//!
//! A module owns one device: activating it registers the device's commands
//! and, for serial-backed devices, arms a poller for unsolicited status
//! bytes. Activation is all-or-nothing: if a module fails part-way, its
//! registrations are rolled back and the daemon carries on with the
//! remaining configured modules.

mod a125;
mod qnap;
mod synology;
mod system;

use std::sync::Arc;

use log::info;

use crate::error::{PicodError, Result};
use crate::event::EventSink;
use crate::poller::ArmedPoller;
use crate::registry::RegistryBuilder;

/// A module's entry in the build table.
pub struct ModuleDef {
    pub name: &'static str,
    init: fn(&[String], &mut ModuleCtx) -> Result<()>,
}

/// What a module init may contribute to the daemon.
pub struct ModuleCtx<'a> {
    pub registry: &'a mut RegistryBuilder,
    pub pollers: &'a mut Vec<ArmedPoller>,
    pub sink: Arc<dyn EventSink>,
}

pub static MODULES: &[ModuleDef] = &[
    ModuleDef {
        name: "ts209",
        init: qnap::ts209_init,
    },
    ModuleDef {
        name: "ts219",
        init: qnap::ts219_init,
    },
    ModuleDef {
        name: "ts409",
        init: qnap::ts409_init,
    },
    ModuleDef {
        name: "ts41x",
        init: qnap::ts41x_init,
    },
    ModuleDef {
        name: "synology",
        init: synology::init,
    },
    ModuleDef {
        name: "a125",
        init: a125::init,
    },
    ModuleDef {
        name: "system-status",
        init: system::init,
    },
];

/// Look up and run a module init, rolling back its partial contributions
/// on failure.
pub fn activate(name: &str, args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    let def = MODULES
        .iter()
        .find(|m| m.name == name)
        .ok_or_else(|| PicodError::ModuleNotFound(name.to_string()))?;

    let commands = ctx.registry.len();
    let pollers = ctx.pollers.len();
    match (def.init)(args, ctx) {
        Ok(()) => {
            info!("activated module {}", name);
            Ok(())
        }
        Err(e) => {
            ctx.registry.truncate(commands);
            ctx.pollers.truncate(pollers);
            Err(PicodError::Module(format!("{}: {}", name, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module() {
        let mut registry = RegistryBuilder::new();
        let mut pollers = Vec::new();
        let mut ctx = ModuleCtx {
            registry: &mut registry,
            pollers: &mut pollers,
            sink: Arc::new(crate::event::LogSink),
        };
        let err = activate("ts999", &[], &mut ctx);
        assert!(matches!(err, Err(PicodError::ModuleNotFound(_))));
    }

    #[test]
    fn test_failed_activation_rolls_back() {
        let mut registry = RegistryBuilder::new();
        let mut pollers = Vec::new();
        let mut ctx = ModuleCtx {
            registry: &mut registry,
            pollers: &mut pollers,
            sink: Arc::new(crate::event::LogSink),
        };
        // Serial device is absent in the test environment, so init fails
        // after argument validation without leaving commands behind.
        let err = activate("ts219", &[], &mut ctx);
        assert!(err.is_err());
        assert!(registry.is_empty());
        assert!(pollers.is_empty());
    }

    #[test]
    fn test_module_args_rejected() {
        let mut registry = RegistryBuilder::new();
        let mut pollers = Vec::new();
        let mut ctx = ModuleCtx {
            registry: &mut registry,
            pollers: &mut pollers,
            sink: Arc::new(crate::event::LogSink),
        };
        let err = activate("synology", &["extra".to_string()], &mut ctx);
        assert!(matches!(err, Err(PicodError::Module(_))));
    }

    #[test]
    fn test_system_status_module_activates_without_hardware() {
        let mut registry = RegistryBuilder::new();
        let mut pollers = Vec::new();
        let mut ctx = ModuleCtx {
            registry: &mut registry,
            pollers: &mut pollers,
            sink: Arc::new(crate::event::LogSink),
        };
        activate("system-status", &[], &mut ctx).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(pollers.is_empty());
    }
}
