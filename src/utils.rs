use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DmdError, Result};

/// Serial devices probed by [`auto_detect_port`], in order.
const PORT_PREFIXES: [&str; 2] = ["/dev/ttyACM", "/dev/ttyUSB"];

/// Value of a destination's `port` that asks for auto-detection.
pub const AUTO_PORT: &str = "auto";

/// How long one write or flush on a device port may take.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// Detected serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePort {
    pub path: String,
}

impl DevicePort {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Opens the port for writing. Writes give up after [`WRITE_TIMEOUT`].
    pub fn open(&self) -> Result<TimedWriter> {
        let file = open_port(Path::new(&self.path))?;
        TimedWriter::spawn(&self.path, file, WRITE_TIMEOUT)
    }
}

/// Auto-detect the first serial port a display could be behind
pub fn auto_detect_port() -> Result<DevicePort> {
    info!("Auto-detecting serial ports...");

    for prefix in PORT_PREFIXES {
        for i in 0..10 {
            let path = format!("{}{}", prefix, i);
            if !Path::new(&path).exists() {
                continue;
            }
            match open_port(Path::new(&path)) {
                Ok(_) => {
                    info!("Found serial port: {}", path);
                    return Ok(DevicePort::new(path));
                }
                Err(e) => debug!("Skipping {}: {}", path, e),
            }
        }
    }

    Err(DmdError::device("auto", "no serial port found"))
}

/// Resolves a configured port, `auto` included.
pub fn resolve_port(port: &str) -> Result<DevicePort> {
    if port.eq_ignore_ascii_case(AUTO_PORT) {
        auto_detect_port()
    } else {
        Ok(DevicePort::new(port))
    }
}

pub fn open_port(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| DmdError::device(path.display().to_string(), e.to_string()))
}

enum Command {
    Write(Vec<u8>),
    Flush,
}

/// A transport whose writes run on their own thread.
///
/// Each call waits at most `timeout` for the inner writer. After the first
/// timeout the writer is considered wedged and every later call fails right
/// away; the stuck thread is left behind.
pub struct TimedWriter {
    name: String,
    timeout: Duration,
    commands: Sender<Command>,
    acks: Receiver<io::Result<()>>,
    wedged: bool,
}

impl TimedWriter {
    pub fn spawn<W: Write + Send + 'static>(name: &str, mut inner: W, timeout: Duration) -> Result<Self> {
        let (commands, rx) = flume::bounded::<Command>(1);
        let (ack_tx, acks) = flume::bounded(1);
        thread::Builder::new()
            .name(format!("writer-{}", name))
            .spawn(move || {
                for command in rx.iter() {
                    let result = match command {
                        Command::Write(buf) => inner.write_all(&buf),
                        Command::Flush => inner.flush(),
                    };
                    if ack_tx.send(result).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            name: name.to_string(),
            timeout,
            commands,
            acks,
            wedged: false,
        })
    }

    fn submit(&mut self, command: Command) -> io::Result<()> {
        if self.wedged {
            return Err(io::Error::new(ErrorKind::TimedOut, format!("{} is wedged", self.name)));
        }
        self.commands
            .send(command)
            .map_err(|_| io::Error::new(ErrorKind::BrokenPipe, format!("{} writer is gone", self.name)))?;
        match self.acks.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.wedged = true;
                warn!("Write to {} timed out after {:?}", self.name, self.timeout);
                Err(io::Error::new(
                    ErrorKind::TimedOut,
                    format!("{} did not accept a write within {:?}", self.name, self.timeout),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                ErrorKind::BrokenPipe,
                format!("{} writer is gone", self.name),
            )),
        }
    }
}

impl Write for TimedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.submit(Command::Write(buf.to_vec()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.submit(Command::Flush)
    }
}
