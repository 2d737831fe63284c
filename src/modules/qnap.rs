//! QNAP TS-x09/x19/x4x PIC support.
//!
//! All four variants speak single-byte commands and single-byte status
//! codes over /dev/ttyS1 at 19200 baud. They differ in which commands the
//! PIC accepts (the ts409 PIC has no power LED, the ts41x adds watchdog,
//! WOL, and EUP control) and in how status bytes are reported: the ts209
//! PIC only signals temperature threshold crossings and a single fan,
//! while the later PICs report the temperature in degrees and four fan
//! channels.

use std::sync::Arc;

use log::{debug, warn};

use crate::error::{PicodError, Result};
use crate::event::{Arg, Event};
use crate::modules::ModuleCtx;
use crate::poller::{ArmedPoller, ProtocolDecoder};
use crate::serial::{Baud, SerialHandle, SerialIo};

const DEVICE: &str = "/dev/ttyS1";

// Command codes.
const FAN_STOP: u8 = 0x30;
const FAN_SILENCE: u8 = 0x31;
const FAN_LOW: u8 = 0x32;
const FAN_MEDIUM: u8 = 0x33;
const FAN_HIGH: u8 = 0x34;
const FAN_FULL: u8 = 0x35;
const AUTOPOWER_ON: u8 = 0x48;
const AUTOPOWER_OFF: u8 = 0x49;
const POWER_LED_OFF: u8 = 0x4b;
const POWER_LED_2HZ: u8 = 0x4c;
const POWER_LED_ON: u8 = 0x4d;
const POWER_LED_1HZ: u8 = 0x4e;
const BUZZER_SHORT: u8 = 0x50;
const BUZZER_LONG: u8 = 0x51;
const STATUS_RED_2HZ: u8 = 0x54;
const STATUS_GREEN_2HZ: u8 = 0x55;
const STATUS_GREEN_ON: u8 = 0x56;
const STATUS_RED_ON: u8 = 0x57;
const STATUS_BOTH_2HZ: u8 = 0x58;
const STATUS_OFF: u8 = 0x59;
const STATUS_GREEN_1HZ: u8 = 0x5a;
const STATUS_RED_1HZ: u8 = 0x5b;
const STATUS_BOTH_1HZ: u8 = 0x5c;
const USB_LED_ON: u8 = 0x60;
const USB_LED_8HZ: u8 = 0x61;
const USB_LED_OFF: u8 = 0x62;
const WDT_OFF: u8 = 0x67;
const WOL_ENABLE: u8 = 0xf2;
const WOL_DISABLE: u8 = 0xf3;
const EUP_DISABLE: u8 = 0xf4;
const EUP_ENABLE: u8 = 0xf5;

// Status codes.
const STS_SYS_TEMP_71_79: u8 = 0x38;
const STS_SYS_TEMP_80: u8 = 0x39;
const STS_TEMP_WARM_TO_HOT: u8 = 0x3a;
const STS_TEMP_HOT_TO_WARM: u8 = 0x3b;
const STS_TEMP_COLD_TO_WARM: u8 = 0x3c;
const STS_TEMP_WARM_TO_COLD: u8 = 0x3d;
const STS_POWER_BUTTON: u8 = 0x40;
const STS_POWER_LOSS_POWER_OFF: u8 = 0x43;
const STS_FAN1_ERROR: u8 = 0x73;
const STS_FAN4_NORMAL: u8 = 0x7a;
const STS_SYS_TEMP_0: u8 = 0x80;
const STS_SYS_TEMP_70: u8 = 0xc6;

fn powerled_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(POWER_LED_ON),
        "1hz" => Some(POWER_LED_1HZ),
        "2hz" => Some(POWER_LED_2HZ),
        "off" => Some(POWER_LED_OFF),
        _ => None,
    }
}

fn statusled_code(arg: &str) -> Option<u8> {
    match arg {
        "red2hz" => Some(STATUS_RED_2HZ),
        "green2hz" => Some(STATUS_GREEN_2HZ),
        "greenon" => Some(STATUS_GREEN_ON),
        "redon" => Some(STATUS_RED_ON),
        "greenred2hz" => Some(STATUS_BOTH_2HZ),
        "off" => Some(STATUS_OFF),
        "green1hz" => Some(STATUS_GREEN_1HZ),
        "red1hz" => Some(STATUS_RED_1HZ),
        "greenred1hz" => Some(STATUS_BOTH_1HZ),
        _ => None,
    }
}

fn usbled_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(USB_LED_ON),
        "8hz" => Some(USB_LED_8HZ),
        "off" => Some(USB_LED_OFF),
        _ => None,
    }
}

fn autopower_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(AUTOPOWER_ON),
        "off" => Some(AUTOPOWER_OFF),
        _ => None,
    }
}

fn buzzer_code(arg: &str) -> Option<u8> {
    match arg {
        "short" => Some(BUZZER_SHORT),
        "long" => Some(BUZZER_LONG),
        _ => None,
    }
}

fn fanspeed_code(arg: &str) -> Option<u8> {
    match arg {
        "stop" => Some(FAN_STOP),
        "silence" => Some(FAN_SILENCE),
        "low" => Some(FAN_LOW),
        "medium" => Some(FAN_MEDIUM),
        "high" => Some(FAN_HIGH),
        "full" => Some(FAN_FULL),
        _ => None,
    }
}

fn watchdog_code(arg: &str) -> Option<u8> {
    match arg {
        "off" => Some(WDT_OFF),
        _ => None,
    }
}

fn eup_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(EUP_ENABLE),
        "off" => Some(EUP_DISABLE),
        _ => None,
    }
}

/// EUP puts the device in a power-saving mode too deep for WOL to work,
/// so enabling WOL also disables EUP.
fn wol_codes(arg: &str) -> Option<&'static [u8]> {
    match arg {
        "on" => Some(&[WOL_ENABLE, EUP_DISABLE]),
        "off" => Some(&[WOL_DISABLE]),
        _ => None,
    }
}

/// Status decoding style for a PIC generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusStyle {
    /// Threshold crossings and one fan channel.
    Thresholds,
    /// Temperature in degrees and four fan channels.
    Degrees,
}

struct QnapDecoder {
    name: &'static str,
    style: StatusStyle,
}

impl QnapDecoder {
    fn decode_status(&self, code: u8) -> Option<Event> {
        match (self.style, code) {
            (_, STS_POWER_BUTTON) => Some(Event::new("power_button", vec![Arg::Int(3)])),
            (_, STS_POWER_LOSS_POWER_OFF) => {
                // RTC wake-up, ignored.
                debug!("{}: RTC wake-up status ignored", self.name);
                None
            }
            (StatusStyle::Thresholds, STS_FAN1_ERROR) => Some(Event::plain("fan_error")),
            (StatusStyle::Thresholds, 0x74) => Some(Event::plain("fan_normal")),
            (StatusStyle::Thresholds, STS_TEMP_WARM_TO_HOT | STS_TEMP_COLD_TO_WARM) => {
                Some(Event::plain("temp_low"))
            }
            (StatusStyle::Thresholds, STS_TEMP_HOT_TO_WARM | STS_TEMP_WARM_TO_COLD) => {
                Some(Event::plain("temp_high"))
            }
            (StatusStyle::Degrees, STS_FAN1_ERROR..=STS_FAN4_NORMAL) => {
                let channel = i64::from((code - STS_FAN1_ERROR) / 2) + 1;
                let name = if (code - STS_FAN1_ERROR) % 2 == 0 {
                    "fan_error"
                } else {
                    "fan_normal"
                };
                Some(Event::new(name, vec![Arg::Int(channel)]))
            }
            (StatusStyle::Degrees, STS_SYS_TEMP_0..=STS_SYS_TEMP_70) => Some(Event::new(
                "temp",
                vec![Arg::Int(i64::from(code - STS_SYS_TEMP_0))],
            )),
            (StatusStyle::Degrees, STS_SYS_TEMP_71_79) => {
                Some(Event::new("temp", vec![Arg::Int(75)]))
            }
            (StatusStyle::Degrees, STS_SYS_TEMP_80) => {
                Some(Event::new("temp", vec![Arg::Int(80)]))
            }
            _ => {
                warn!("{}: (PIC 0x{:x}) unknown command from PIC", self.name, code);
                None
            }
        }
    }
}

impl ProtocolDecoder for QnapDecoder {
    fn device_name(&self) -> &'static str {
        self.name
    }

    fn decode_one(&mut self, io: &mut dyn SerialIo) -> Result<Option<Event>> {
        match io.try_read_byte()? {
            Some(code) => Ok(self.decode_status(code)),
            None => Ok(None),
        }
    }
}

/// Which optional commands a PIC generation accepts.
struct Features {
    powerled: bool,
    watchdog: bool,
    wol: bool,
    eup: bool,
}

fn register_single_code<F>(
    ctx: &mut ModuleCtx<'_>,
    serial: &Arc<SerialHandle>,
    name: &str,
    short: &str,
    long: &str,
    map: F,
) -> Result<()>
where
    F: Fn(&str) -> Option<u8> + Send + Sync + 'static,
{
    let serial = Arc::clone(serial);
    ctx.registry.register(name, short, long, move |args: &[String]| {
        let [arg] = args else { return -1 };
        match map(arg) {
            Some(code) => serial.send(&[code]),
            None => -1,
        }
    })
}

fn init_qnap(
    name: &'static str,
    args: &[String],
    ctx: &mut ModuleCtx<'_>,
    style: StatusStyle,
    features: Features,
) -> Result<()> {
    if !args.is_empty() {
        return Err(PicodError::Config(format!(
            "{}: module takes no arguments",
            name
        )));
    }

    let serial = SerialHandle::open(DEVICE, Baud::B19200)?;

    register_single_code(
        ctx,
        &serial,
        "statusled",
        "Change the status LED",
        "Change the status LED, options are:\n\
         \tred2hz\n\tgreen2hz\n\tgreenon\n\tredon\n\
         \tgreenred2hz\n\toff\n\tgreen1hz\n\tred1hz\n",
        statusled_code,
    )?;
    if features.powerled {
        register_single_code(
            ctx,
            &serial,
            "powerled",
            "Change the power LED",
            "Change the power LED, options are:\n\ton\n\toff\n\t1hz\n\t2hz\n",
            powerled_code,
        )?;
    }
    register_single_code(
        ctx,
        &serial,
        "buzzer",
        "Buzz",
        "Buzz, options are:\n\tshort\n\tlong\n",
        buzzer_code,
    )?;
    register_single_code(
        ctx,
        &serial,
        "fanspeed",
        "Set the fanspeed",
        "Set the fanspeed, options are:\n\
         \tstop\n\tsilence\n\tlow\n\tmedium\n\thigh\n\tfull\n",
        fanspeed_code,
    )?;
    register_single_code(
        ctx,
        &serial,
        "usbled",
        "Set the usbled",
        "Set the usbled, options are:\n\ton\n\t8hz\n\toff\n",
        usbled_code,
    )?;
    register_single_code(
        ctx,
        &serial,
        "autopower",
        "Control the automatic power mechanism",
        "Control the automatic power mechanism, options are:\n\ton\n\toff\n",
        autopower_code,
    )?;
    if features.watchdog {
        register_single_code(
            ctx,
            &serial,
            "watchdog",
            "Disable the PIC watchdog",
            "Watchdog options are:\n\toff",
            watchdog_code,
        )?;
    }
    if features.wol {
        let wol_serial = Arc::clone(&serial);
        ctx.registry.register(
            "wol",
            "Control Wake on LAN",
            "Control Wake on LAN, options are:\n\ton\n\toff",
            move |args: &[String]| {
                let [arg] = args else { return -1 };
                match wol_codes(arg) {
                    Some(codes) => wol_serial.send(codes),
                    None => -1,
                }
            },
        )?;
    }
    if features.eup {
        register_single_code(
            ctx,
            &serial,
            "eup",
            "Control EUP (Energy-using Products) power saving",
            "Control EUP, options are:\n\ton\n\toff",
            eup_code,
        )?;
    }

    ctx.pollers.push(ArmedPoller {
        serial,
        decoder: Box::new(QnapDecoder { name, style }),
    });
    Ok(())
}

pub(super) fn ts209_init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    init_qnap(
        "ts209",
        args,
        ctx,
        StatusStyle::Thresholds,
        Features {
            powerled: true,
            watchdog: false,
            wol: false,
            eup: false,
        },
    )
}

pub(super) fn ts219_init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    init_qnap(
        "ts219",
        args,
        ctx,
        StatusStyle::Degrees,
        Features {
            powerled: true,
            watchdog: false,
            wol: false,
            eup: false,
        },
    )
}

pub(super) fn ts409_init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    init_qnap(
        "ts409",
        args,
        ctx,
        StatusStyle::Degrees,
        Features {
            powerled: false,
            watchdog: false,
            wol: false,
            eup: false,
        },
    )
}

pub(super) fn ts41x_init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    init_qnap(
        "ts41x",
        args,
        ctx,
        StatusStyle::Degrees,
        Features {
            powerled: true,
            watchdog: true,
            wol: true,
            eup: true,
        },
    )
}
