//! Synology DiskStation PIC support.
//!
//! Single-byte commands and status codes over /dev/ttyS1 at 9600 baud.
//! The PIC reports three front-panel buttons and accepts LED, buzzer,
//! scheduled-power, and RTC alarm commands.

use std::sync::Arc;

use log::warn;

use crate::error::{PicodError, Result};
use crate::event::{Arg, Event};
use crate::modules::ModuleCtx;
use crate::poller::{ArmedPoller, ProtocolDecoder};
use crate::serial::{Baud, SerialHandle, SerialIo};

const DEVICE: &str = "/dev/ttyS1";

const STS_POWER_BUTTON: u8 = 0x30;
const STS_MEDIA_BUTTON: u8 = 0x60;
const STS_RESET_BUTTON: u8 = 0x61;

const BUZZER_SHORT: u8 = 0x32;
const BUZZER_LONG: u8 = 0x33;
const POWER_LED_ON: u8 = 0x34;
const POWER_LED_2HZ: u8 = 0x35;
const POWER_LED_OFF: u8 = 0x36;
const STATUS_OFF: u8 = 0x37;
const STATUS_GREEN_ON: u8 = 0x38;
const STATUS_GREEN_2HZ: u8 = 0x39;
const STATUS_ORANGE_ON: u8 = 0x3a;
const STATUS_ORANGE_2HZ: u8 = 0x3b;
const USB_LED_ON: u8 = 0x40;
const USB_LED_2HZ: u8 = 0x41;
const USB_LED_OFF: u8 = 0x42;
const AUTOPOWER_OFF: u8 = 0x70;
const AUTOPOWER_ON: u8 = 0x71;
const RTC_DISABLE: u8 = 0x72;
const RTC_ENABLE: u8 = 0x73;

fn powerled_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(POWER_LED_ON),
        "2hz" => Some(POWER_LED_2HZ),
        "off" => Some(POWER_LED_OFF),
        _ => None,
    }
}

fn statusled_code(arg: &str) -> Option<u8> {
    match arg {
        "orange2hz" => Some(STATUS_ORANGE_2HZ),
        "green2hz" => Some(STATUS_GREEN_2HZ),
        "orangeon" => Some(STATUS_ORANGE_ON),
        "greenon" => Some(STATUS_GREEN_ON),
        "off" => Some(STATUS_OFF),
        _ => None,
    }
}

fn usbled_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(USB_LED_ON),
        "2hz" => Some(USB_LED_2HZ),
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

fn rtc_code(arg: &str) -> Option<u8> {
    match arg {
        "on" => Some(RTC_ENABLE),
        "off" => Some(RTC_DISABLE),
        _ => None,
    }
}

struct SynologyDecoder;

impl SynologyDecoder {
    fn decode_status(&self, code: u8) -> Option<Event> {
        match code {
            STS_POWER_BUTTON => Some(Event::new("power_button", vec![Arg::Int(3)])),
            STS_MEDIA_BUTTON => Some(Event::new("media_button", vec![Arg::Int(3)])),
            STS_RESET_BUTTON => Some(Event::new("restart_button", vec![Arg::Int(3)])),
            _ => {
                warn!("synology: (PIC 0x{:x}) unknown command from PIC", code);
                None
            }
        }
    }
}

impl ProtocolDecoder for SynologyDecoder {
    fn device_name(&self) -> &'static str {
        "synology"
    }

    fn decode_one(&mut self, io: &mut dyn SerialIo) -> Result<Option<Event>> {
        match io.try_read_byte()? {
            Some(code) => Ok(self.decode_status(code)),
            None => Ok(None),
        }
    }
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

pub(super) fn init(args: &[String], ctx: &mut ModuleCtx<'_>) -> Result<()> {
    if !args.is_empty() {
        return Err(PicodError::Config(
            "synology: module takes no arguments".to_string(),
        ));
    }

    let serial = SerialHandle::open(DEVICE, Baud::B9600)?;

    register_single_code(
        ctx,
        &serial,
        "powerled",
        "Change the power LED",
        "Change the power LED, options are:\n\ton\n\toff\n\t2hz\n",
        powerled_code,
    )?;
    register_single_code(
        ctx,
        &serial,
        "statusled",
        "Change the status LED",
        "Change the status LED, options are:\n\
         \torange2hz\n\tgreen2hz\n\torangeon\n\tgreenon\n\toff\n",
        statusled_code,
    )?;
    register_single_code(
        ctx,
        &serial,
        "usbled",
        "Set the usbled",
        "Set the usbled, options are:\n\ton\n\t2hz\n\toff\n",
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
        "rtc",
        "Control RTC (real time clock)",
        "Control RTC, options are:\n\ton\n\toff",
        rtc_code,
    )?;

    ctx.pollers.push(ArmedPoller {
        serial,
        decoder: Box::new(SynologyDecoder),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::ScriptedIo;

    #[test]
    fn test_command_code_tables() {
        assert_eq!(powerled_code("2hz"), Some(0x35));
        assert_eq!(powerled_code("1hz"), None);
        assert_eq!(statusled_code("orangeon"), Some(0x3a));
        assert_eq!(statusled_code("redon"), None);
        assert_eq!(usbled_code("2hz"), Some(0x41));
        assert_eq!(autopower_code("off"), Some(0x70));
        assert_eq!(buzzer_code("short"), Some(0x32));
        assert_eq!(rtc_code("on"), Some(0x73));
        assert_eq!(rtc_code("off"), Some(0x72));
    }

    #[test]
    fn test_button_events() {
        let decoder = SynologyDecoder;
        assert_eq!(
            decoder.decode_status(0x30).unwrap().to_string(),
            "power_button(3)"
        );
        assert_eq!(
            decoder.decode_status(0x60).unwrap().to_string(),
            "media_button(3)"
        );
        assert_eq!(
            decoder.decode_status(0x61).unwrap().to_string(),
            "restart_button(3)"
        );
    }

    #[test]
    fn test_unknown_status_ignored() {
        assert!(SynologyDecoder.decode_status(0x42).is_none());
    }

    #[test]
    fn test_decode_one() {
        let mut decoder = SynologyDecoder;
        let mut io = ScriptedIo::new(&[0x61]);
        assert_eq!(
            decoder.decode_one(&mut io).unwrap().unwrap().to_string(),
            "restart_button(3)"
        );
        assert!(decoder.decode_one(&mut io).unwrap().is_none());
    }
}
