//! Event pollers.
//!
//! Each serial-backed module contributes one poller: a decoder that turns
//! the PIC's unsolicited bytes into events, attached to the module's
//! serial handle. Every poller runs on its own thread; the thread waits
//! for fd readiness without holding the line lock, then takes the lock
//! just long enough to drain complete messages, and finally invokes the
//! event sink outside the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info};

use crate::error::Result;
use crate::event::{Event, EventSink};
use crate::serial::{wait_readable, SerialHandle, SerialIo};

/// Readiness wait granularity; bounds shutdown latency.
const POLL_TICK_MS: i32 = 500;

/// Turns raw PIC bytes into events.
///
/// `decode_one` consumes at most one complete message: `Ok(Some(event))`
/// for a reportable event, `Ok(None)` when no complete message is buffered
/// (or the message carries no event), and `Err` for a fatal stream error
/// that ends the poller.
pub trait ProtocolDecoder: Send {
    fn device_name(&self) -> &'static str;
    fn decode_one(&mut self, io: &mut dyn SerialIo) -> Result<Option<Event>>;
}

/// A decoder bound to its serial line, ready to spawn.
pub struct ArmedPoller {
    pub serial: Arc<SerialHandle>,
    pub decoder: Box<dyn ProtocolDecoder>,
}

/// Running poller threads plus the shared cancellation flag.
pub struct PollerSet {
    cancel: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl PollerSet {
    pub fn new() -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
        }
    }

    pub fn spawn(&mut self, armed: ArmedPoller, sink: Arc<dyn EventSink>) {
        let cancel = Arc::clone(&self.cancel);
        // The line shares the flag so a read parked mid-frame unblocks
        // when shutdown is signalled.
        armed.serial.bind_cancel(Arc::clone(&cancel));
        let name = armed.decoder.device_name();
        let handle = std::thread::Builder::new()
            .name(format!("poll-{}", name))
            .spawn(move || poll_loop(armed, sink, cancel))
            .unwrap_or_else(|e| panic!("failed to spawn poller thread for {}: {}", name, e));
        self.threads.push(handle);
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Signal all pollers and wait for them to exit.
    pub fn shutdown(self) {
        self.cancel.store(true, Ordering::SeqCst);
        for handle in self.threads {
            if handle.join().is_err() {
                error!("poller thread panicked");
            }
        }
    }
}

impl Default for PollerSet {
    fn default() -> Self {
        Self::new()
    }
}

fn poll_loop(mut armed: ArmedPoller, sink: Arc<dyn EventSink>, cancel: Arc<AtomicBool>) {
    let device = armed.decoder.device_name();
    info!("polling {} events", device);
    let fd = armed.serial.fd();
    let mut events: Vec<Event> = Vec::new();

    while !cancel.load(Ordering::SeqCst) {
        match wait_readable(fd, POLL_TICK_MS) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                error!("{}: poll failed: {}", device, e);
                break;
            }
        }

        // Drain everything buffered under one lock, deliver after release.
        {
            let mut line = armed.serial.lock();
            loop {
                match armed.decoder.decode_one(&mut *line) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => break,
                    Err(e) => {
                        if cancel.load(Ordering::SeqCst) {
                            debug!("{}: {}", device, e);
                        } else {
                            error!("{}: {}", device, e);
                        }
                        drop(line);
                        deliver(&sink, &mut events, device);
                        return;
                    }
                }
            }
        }
        deliver(&sink, &mut events, device);
    }
    debug!("poller for {} exiting", device);
}

fn deliver(sink: &Arc<dyn EventSink>, events: &mut Vec<Event>, device: &str) {
    for event in events.drain(..) {
        if let Err(e) = sink.invoke(&event) {
            error!("{}: event {} failed: {}", device, event.name, e);
        }
    }
}
