//! picod - system controller daemon for NAS PIC devices
//!
//! Talks to the microcontroller found in QNAP and Synology NAS
//! appliances (and the A125 LCD panel) over a serial line, exposing its
//! commands through a Unix socket and turning its status reports into
//! events that run configured hooks.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event;
pub mod ipc;
pub mod modules;
pub mod poller;
pub mod registry;
pub mod serial;
pub mod wire;

pub use error::{PicodError, Result};
