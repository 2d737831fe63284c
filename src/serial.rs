//! Serial-line transport to the PIC.
//!
//! Opens a character device in non-blocking raw mode (8 data bits, no
//! parity, local line, receiver enabled, VMIN=1/VTIME=0), saving the prior
//! line settings so they can be restored on close. Reads are non-blocking
//! with an explicit poll(2) readiness wait; repeated "ready but empty"
//! reads are reported once per streak as a contention warning, since they
//! usually mean another process is consuming the same line.
//!
//! A [`SerialHandle`] wraps the line in a mutex so command handlers (IPC
//! server thread) can write while the module's poller reads; the raw fd is
//! kept outside the lock so the poller can wait for readiness without
//! blocking writers.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::error::{PicodError, Result};

/// Consecutive would-block reads after a readiness notification before a
/// contention warning is logged.
pub const CONTENTION_STREAK: u32 = 5;

/// Granularity of the readiness waits inside [`SerialIo::read_exact`];
/// bounds how long a mid-frame read can ignore a shutdown request.
const READ_WAIT_TICK_MS: i32 = 500;

/// Line speeds used by the supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baud {
    B1200,
    B9600,
    B19200,
}

impl Baud {
    fn flag(self) -> libc::speed_t {
        match self {
            Baud::B1200 => libc::B1200,
            Baud::B9600 => libc::B9600,
            Baud::B19200 => libc::B19200,
        }
    }
}

/// Byte source seen by protocol decoders. `try_read_byte` never blocks;
/// `read_exact` blocks (with internal readiness waits) until the buffer is
/// filled, the stream ends, or a bound shutdown flag is raised.
pub trait SerialIo {
    fn try_read_byte(&mut self) -> Result<Option<u8>>;
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// An open serial device with saved line settings.
pub struct SerialLine {
    file: File,
    path: String,
    saved: libc::termios,
    empty_reads: u32,
    cancel: Arc<AtomicBool>,
}

impl SerialLine {
    /// Open and configure the device. Any failure here aborts the owning
    /// module's activation only.
    pub fn open(path: &str, baud: Baud) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|e| PicodError::Serial(format!("open {}: {}", path, e)))?;
        let fd = file.as_raw_fd();

        let mut saved: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut saved) } != 0 {
            return Err(PicodError::Serial(format!(
                "tcgetattr {}: {}",
                path,
                std::io::Error::last_os_error()
            )));
        }

        let mut raw: libc::termios = unsafe { std::mem::zeroed() };
        raw.c_iflag = libc::IGNBRK;
        raw.c_cflag = baud.flag() | libc::CS8 | libc::CLOCAL | libc::CREAD;
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        unsafe {
            libc::cfsetispeed(&mut raw, baud.flag());
            libc::cfsetospeed(&mut raw, baud.flag());
        }
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &raw) } != 0 {
            return Err(PicodError::Serial(format!(
                "tcsetattr {}: {}",
                path,
                std::io::Error::last_os_error()
            )));
        }

        Ok(Self {
            file,
            path: path.to_string(),
            saved,
            empty_reads: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Adopt a shutdown flag. Once it is raised, a `read_exact` parked on
    /// an incomplete frame returns an error instead of waiting on.
    pub fn bind_cancel(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = flag;
    }

    /// Current run of ready-but-empty reads, cleared by any successful
    /// read. At [`CONTENTION_STREAK`] the run is reported once.
    pub fn empty_read_streak(&self) -> u32 {
        self.empty_reads
    }

    fn note_empty_read(&mut self) {
        self.empty_reads += 1;
        if self.empty_reads == CONTENTION_STREAK {
            warn!(
                "Contradicting information about data available to be read from {}. \
                 Please make sure nothing else is reading things there.",
                self.path
            );
        }
    }

    /// Blocking write, result passed through.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (&self.file)
            .write(buf)
            .map_err(|e| PicodError::Serial(format!("write {}: {}", self.path, e)))
    }
}

impl SerialIo for SerialLine {
    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        match (&self.file).read(&mut b) {
            Ok(0) => Err(PicodError::SerialEof(self.path.clone())),
            Ok(_) => {
                self.empty_reads = 0;
                Ok(Some(b[0]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.note_empty_read();
                Ok(None)
            }
            Err(e) => Err(PicodError::Serial(format!("read {}: {}", self.path, e))),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            match (&self.file).read(&mut buf[got..]) {
                Ok(0) => return Err(PicodError::SerialEof(self.path.clone())),
                Ok(n) => {
                    got += n;
                    self.empty_reads = 0;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    self.note_empty_read();
                    // Wait in bounded slices so shutdown is never stuck
                    // behind a frame the device only half-sent.
                    loop {
                        if self.cancel.load(Ordering::SeqCst) {
                            return Err(PicodError::Serial(format!(
                                "read {}: interrupted by shutdown",
                                self.path
                            )));
                        }
                        if wait_readable(self.file.as_raw_fd(), READ_WAIT_TICK_MS)? {
                            break;
                        }
                    }
                }
                Err(e) => {
                    return Err(PicodError::Serial(format!("read {}: {}", self.path, e)));
                }
            }
        }
        Ok(())
    }
}

impl Drop for SerialLine {
    fn drop(&mut self) {
        // Restore the line settings captured at open.
        let rc = unsafe { libc::tcsetattr(self.file.as_raw_fd(), libc::TCSANOW, &self.saved) };
        if rc != 0 {
            debug!(
                "failed to restore line settings for {}: {}",
                self.path,
                std::io::Error::last_os_error()
            );
        }
    }
}

/// Wait until `fd` is readable. `timeout_ms` of -1 blocks indefinitely.
/// Returns `Ok(false)` on timeout or EINTR so callers can re-check their
/// cancellation flag.
pub fn wait_readable(fd: RawFd, timeout_ms: i32) -> Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            return Ok(false);
        }
        return Err(err.into());
    }
    Ok(rc > 0)
}

/// Shared handle to one module's serial line.
pub struct SerialHandle {
    fd: RawFd,
    line: Mutex<SerialLine>,
}

impl SerialHandle {
    pub fn open(path: &str, baud: Baud) -> Result<Arc<Self>> {
        let line = SerialLine::open(path, baud)?;
        let fd = line.fd();
        Ok(Arc::new(Self {
            fd,
            line: Mutex::new(line),
        }))
    }

    /// Raw fd for readiness waits. Never read/written through directly.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Adopt a shutdown flag for the underlying line.
    pub fn bind_cancel(&self, flag: Arc<AtomicBool>) {
        self.lock().bind_cancel(flag);
    }

    pub fn lock(&self) -> MutexGuard<'_, SerialLine> {
        self.line.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a command byte sequence, mapped to a handler status:
    /// 0 when fully written, -1 otherwise.
    pub fn send(&self, bytes: &[u8]) -> i32 {
        match self.lock().write(bytes) {
            Ok(n) if n == bytes.len() => 0,
            Ok(n) => {
                warn!("short serial write: {} of {} bytes", n, bytes.len());
                -1
            }
            Err(e) => {
                warn!("{}", e);
                -1
            }
        }
    }
}

/// Scripted byte source for decoder tests.
#[cfg(test)]
pub(crate) struct ScriptedIo {
    data: std::collections::VecDeque<u8>,
    eof: bool,
}

#[cfg(test)]
impl ScriptedIo {
    pub(crate) fn new(bytes: &[u8]) -> Self {
        Self {
            data: bytes.iter().copied().collect(),
            eof: false,
        }
    }

    pub(crate) fn ending_stream(bytes: &[u8]) -> Self {
        Self {
            data: bytes.iter().copied().collect(),
            eof: true,
        }
    }
}

#[cfg(test)]
impl SerialIo for ScriptedIo {
    fn try_read_byte(&mut self) -> Result<Option<u8>> {
        match self.data.pop_front() {
            Some(b) => Ok(Some(b)),
            None if self.eof => Err(PicodError::SerialEof("scripted".into())),
            None => Ok(None),
        }
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        for slot in buf.iter_mut() {
            match self.data.pop_front() {
                Some(b) => *slot = b,
                None => return Err(PicodError::SerialEof("scripted".into())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_flags() {
        assert_eq!(Baud::B1200.flag(), libc::B1200);
        assert_eq!(Baud::B9600.flag(), libc::B9600);
        assert_eq!(Baud::B19200.flag(), libc::B19200);
    }

    #[test]
    fn test_open_missing_device() {
        let err = SerialLine::open("/dev/picod-does-not-exist", Baud::B19200);
        assert!(matches!(err, Err(PicodError::Serial(_))));
    }

    #[test]
    fn test_open_non_tty() {
        // tcgetattr on a regular file fails with ENOTTY.
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = SerialLine::open(file.path().to_str().unwrap(), Baud::B9600);
        assert!(matches!(err, Err(PicodError::Serial(_))));
    }

    #[test]
    fn test_scripted_io() {
        let mut io = ScriptedIo::new(&[0x40, 0x73]);
        assert_eq!(io.try_read_byte().unwrap(), Some(0x40));
        let mut buf = [0u8; 1];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x73);
        assert_eq!(io.try_read_byte().unwrap(), None);
    }

    #[test]
    fn test_scripted_io_eof() {
        let mut io = ScriptedIo::ending_stream(&[]);
        assert!(matches!(io.try_read_byte(), Err(PicodError::SerialEof(_))));
    }
}
