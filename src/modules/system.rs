//! System status forwarding.
//!
//! No hardware behind this one: the `system-status` command just turns
//! its argument into a `system_status` event so configured hooks can
//! react to boot/shutdown notifications from init scripts.

use std::sync::Arc;

use log::error;

use crate::error::{PicodError, Result};
use crate::event::{Arg, Event, EventSink};
use crate::modules::ModuleCtx;

pub(super) fn init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    if !args.is_empty() {
        return Err(PicodError::Config(
            "system-status: module takes no arguments".to_string(),
        ));
    }

    let sink: Arc<dyn EventSink> = Arc::clone(&ctx.sink);
    ctx.registry.register(
        "system-status",
        "Signal system status",
        "",
        move |args: &[String]| {
            let [status] = args else { return -1 };
            let event = Event::new("system_status", vec![Arg::Str(status.clone())]);
            match sink.invoke(&event) {
                Ok(()) => 0,
                Err(e) => {
                    error!("system_status event failed: {}", e);
                    -1
                }
            }
        },
    )
}
