//! A125 LCD panel support.
//!
//! Unlike the one-byte PIC protocols, the A125 speaks framed messages at
//! 1200 baud: every message from the panel starts with a 0x53 sync byte,
//! then a command byte that determines the payload length. Commands to
//! the panel start with 0x4D. On open we request the current button
//! state; the first status reply doubles as device detection, so a
//! desynced stream before detection is treated as "not an A125" (likely a
//! serial console) and ends the poller, while desync after detection is
//! logged and skipped.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::error::{PicodError, Result};
use crate::event::{Arg, Event};
use crate::modules::ModuleCtx;
use crate::poller::{ArmedPoller, ProtocolDecoder};
use crate::serial::{Baud, SerialHandle, SerialIo};

const DEFAULT_DEVICE: &str = "/dev/ttyS0";

const SYNC: u8 = 0x53;
const MSG_ID: u8 = 0x01;
const MSG_BUTTONS: u8 = 0x05;
const MSG_PROTOCOL: u8 = 0x08;
const MSG_RESET_OK: u8 = 0xaa;
const MSG_NACK: u8 = 0xfb;

const CMD_PREFIX: u8 = 0x4d;
const CMD_BUTTON_STATE: u8 = 0x06;
const CMD_LINE: u8 = 0x0c;
const CMD_CLEAR: u8 = 0x0d;
const CMD_BACKLIGHT: u8 = 0x5e;
const CMD_RESET: u8 = 0xff;

const LINE_WIDTH: usize = 16;

/// 20-byte line-write frame: prefix, line id, fixed width, then the text
/// space-padded and truncated to 16 columns.
fn line_frame(line: u8, text: &str) -> [u8; 20] {
    let mut frame = [b' '; 20];
    frame[0] = CMD_PREFIX;
    frame[1] = CMD_LINE;
    frame[2] = line;
    frame[3] = 0x10;
    let bytes = text.as_bytes();
    let len = bytes.len().min(LINE_WIDTH);
    frame[4..4 + len].copy_from_slice(&bytes[..len]);
    frame
}

struct A125Decoder {
    detected: bool,
    buttons: u16,
}

impl A125Decoder {
    fn new() -> Self {
        Self {
            detected: false,
            buttons: 0,
        }
    }

    /// Button state update: the first one only establishes detection and
    /// the baseline, later ones report newly pressed/released buttons.
    fn button_update(&mut self, state: u16) -> Option<Event> {
        let event = if self.detected {
            let down = state & !self.buttons;
            let up = self.buttons & !state;
            if down != 0 || up != 0 {
                Some(Event::new(
                    "lcd_button",
                    vec![
                        Arg::Int(i64::from(state)),
                        Arg::Int(i64::from(down)),
                        Arg::Int(i64::from(up)),
                    ],
                ))
            } else {
                None
            }
        } else {
            info!("a125: LCD panel detected");
            self.detected = true;
            None
        };
        self.buttons = state;
        event
    }
}

impl ProtocolDecoder for A125Decoder {
    fn device_name(&self) -> &'static str {
        "a125"
    }

    fn decode_one(&mut self, io: &mut dyn SerialIo) -> Result<Option<Event>> {
        let sync = match io.try_read_byte()? {
            Some(b) => b,
            None => return Ok(None),
        };
        if sync != SYNC {
            if !self.detected {
                return Err(PicodError::Protocol(format!(
                    "a125: unknown command 0x{:x} before detection, \
                     disabling reading to avoid disrupting another device",
                    sync
                )));
            }
            error!("a125: unknown command 0x{:x}, stream out of sync", sync);
            return Ok(None);
        }

        let mut cmd = [0u8; 1];
        io.read_exact(&mut cmd)?;
        match cmd[0] {
            MSG_ID => {
                let mut payload = [0u8; 2];
                io.read_exact(&mut payload)?;
                debug!("a125: ID is {:04x}", u16::from_be_bytes(payload));
                Ok(None)
            }
            MSG_BUTTONS => {
                let mut payload = [0u8; 2];
                io.read_exact(&mut payload)?;
                Ok(self.button_update(u16::from_be_bytes(payload)))
            }
            MSG_PROTOCOL => {
                let mut payload = [0u8; 2];
                io.read_exact(&mut payload)?;
                debug!("a125: protocol version is {:04x}", u16::from_be_bytes(payload));
                Ok(None)
            }
            MSG_RESET_OK => {
                debug!("a125: reset OK");
                Ok(None)
            }
            MSG_NACK => {
                let mut payload = [0u8; 1];
                io.read_exact(&mut payload)?;
                warn!("a125: panel NACKs command 0x{:x}", payload[0]);
                Ok(None)
            }
            other => {
                warn!("a125: unknown message 0x{:02x} from panel", other);
                Ok(None)
            }
        }
    }
}

pub(super) fn init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    if args.len() > 1 {
        return Err(PicodError::Config(
            "a125: module takes at most one argument".to_string(),
        ));
    }
    let device = args.first().map(String::as_str).unwrap_or(DEFAULT_DEVICE);

    let serial = SerialHandle::open(device, Baud::B1200)?;

    // Ask for the current button state. The reply doubles as a probe for
    // whether an A125 is attached at all.
    {
        let mut line = serial.lock();
        line.write(&[CMD_PREFIX, CMD_BUTTON_STATE])?;
    }

    let reset_serial = Arc::clone(&serial);
    ctx.registry.register(
        "lcd-reset",
        "Reset the LCD",
        "Reset the LCD\n",
        move |args: &[String]| {
            if !args.is_empty() {
                return -1;
            }
            reset_serial.send(&[CMD_PREFIX, CMD_RESET])
        },
    )?;
    let backlight_serial = Arc::clone(&serial);
    ctx.registry.register(
        "lcd-backlight",
        "Set the LCD backlight",
        "Set the LCD backlight, options are:\n\ton\n\toff\n",
        move |args: &[String]| {
            let [arg] = args else { return -1 };
            let state = match arg.as_str() {
                "on" => 0x01,
                "off" => 0x00,
                _ => return -1,
            };
            backlight_serial.send(&[CMD_PREFIX, CMD_BACKLIGHT, state])
        },
    )?;
    let clear_serial = Arc::clone(&serial);
    ctx.registry.register(
        "lcd-clear",
        "Clear the LCD",
        "Clean the LCD\n",
        move |args: &[String]| {
            if !args.is_empty() {
                return -1;
            }
            clear_serial.send(&[CMD_PREFIX, CMD_CLEAR])
        },
    )?;
    for line in 0..2u8 {
        let line_serial = Arc::clone(&serial);
        ctx.registry.register(
            &format!("lcd-line{}", line),
            &format!("Set LCD line {}", line),
            &format!("Set LCD line {}", line),
            move |args: &[String]| {
                if args.len() > 1 {
                    return -1;
                }
                let text = args.first().map(String::as_str).unwrap_or("");
                line_serial.send(&line_frame(line, text))
            },
        )?;
    }

    ctx.pollers.push(ArmedPoller {
        serial,
        decoder: Box::new(A125Decoder::new()),
    });
    Ok(())
}
