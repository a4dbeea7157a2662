//! Frames read from a named pipe or any other byte stream.
//!
//! Each message is a little-endian `u32` length followed by that many bytes.
//! A message of exactly four bytes is a clear command whatever it contains.
//! Anything else is one frame of the configured dimensions and depth.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use flume::Receiver;
use tracing::{debug, info, instrument, warn};

use crate::capture::{already_started, await_producer, FrameSink, Source, SourceEvent};
use crate::codec;
use crate::error::{DmdError, Result};
use crate::frame::{BitDepth, Dimensions, DmdFrame, Frame};

/// Length of the message that blanks the displays.
pub const CLEAR_SENTINEL_LEN: usize = 4;

const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Layout of the frames on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeFormat {
    pub dimensions: Dimensions,
    pub depth: BitDepth,
    /// Gray frames arrive as concatenated bit planes instead of one byte per
    /// pixel.
    pub planes: bool,
}

impl PipeFormat {
    /// Decodes one message body.
    pub fn decode(&self, message: Bytes) -> Result<SourceEvent> {
        if message.len() == CLEAR_SENTINEL_LEN {
            return Ok(SourceEvent::Clear);
        }
        let frame = if self.planes && self.depth.is_gray() {
            let planes = codec::chunk_planes(self.dimensions, self.depth.bits(), &message)?;
            let data = codec::merge_planes(self.dimensions, &planes)?;
            Frame::new(self.dimensions, self.depth, data)?
        } else {
            Frame::new(self.dimensions, self.depth, message)?
        };
        Ok(SourceEvent::Frame(DmdFrame::from(frame)))
    }
}

pub struct PipeSource<R> {
    name: String,
    format: PipeFormat,
    reader: Option<R>,
    stop: Arc<AtomicBool>,
    done: Option<Receiver<()>>,
}

/// A named pipe that is opened on the first read.
///
/// Opening a FIFO blocks until a writer shows up, which must not happen
/// while the graph is being set up.
#[derive(Debug)]
pub struct PipeReader {
    path: PathBuf,
    file: Option<File>,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
            debug!("Writer connected to {}", self.path.display());
        }
        match &mut self.file {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }
}

impl PipeSource<PipeReader> {
    /// Checks that `path` exists; the pipe itself is opened by the reader
    /// thread once the source starts.
    #[instrument]
    pub fn open(path: &Path, format: PipeFormat) -> Result<Self> {
        std::fs::metadata(path)?;
        info!("Reading frames from {}", path.display());
        let reader = PipeReader {
            path: path.to_path_buf(),
            file: None,
        };
        PipeSource::new(path.display().to_string(), reader, format)
    }
}

impl<R: Read + Send + 'static> PipeSource<R> {
    pub fn new(name: impl Into<String>, reader: R, format: PipeFormat) -> Result<Self> {
        format.dimensions.validate()?;
        if format.planes && format.dimensions.surface() % 8 != 0 {
            return Err(DmdError::InvalidDimensions {
                dim: format.dimensions,
                reason: "surface must be a multiple of 8 to read bit planes",
            });
        }
        Ok(Self {
            name: name.into(),
            format,
            reader: Some(reader),
            stop: Arc::new(AtomicBool::new(false)),
            done: None,
        })
    }
}

impl<R: Read + Send + 'static> Source for PipeSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        let reader = self.reader.take().ok_or_else(|| already_started("running"))?;
        let (done_tx, done_rx) = flume::bounded(1);
        let format = self.format;
        let stop = self.stop.clone();
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("pipe-{}", self.name))
            .spawn(move || {
                read_loop(&name, reader, format, &sink, &stop);
                let _ = done_tx.send(());
            })?;
        self.done = Some(done_rx);
        info!("Pipe source {} started", self.name);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(done) = self.done.take() {
            await_producer(&self.name, &done);
        }
        debug!("Pipe source {} stopped", self.name);
        Ok(())
    }
}

fn read_loop<R: Read>(name: &str, mut reader: R, format: PipeFormat, sink: &FrameSink, stop: &AtomicBool) {
    loop {
        let message = match read_message(&mut reader) {
            Ok(Some(message)) => message,
            Ok(None) => {
                end(sink, stop, format!("{} closed", name));
                return;
            }
            Err(e) => {
                end(sink, stop, format!("{} broken: {}", name, e));
                return;
            }
        };
        if stop.load(Ordering::Acquire) {
            return;
        }
        let event = match format.decode(message) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping message from {}: {}", name, e);
                continue;
            }
        };
        if sink.send(event).is_err() {
            debug!("Graph gone, {} stops reading", name);
            return;
        }
    }
}

fn end(sink: &FrameSink, stop: &AtomicBool, reason: String) {
    if stop.load(Ordering::Acquire) {
        return;
    }
    info!("{}", reason);
    let _ = sink.ended(reason);
}

/// Reads one length-prefixed message; `None` on a clean end of stream.
pub(crate) fn read_message<R: Read>(reader: &mut R) -> Result<Option<Bytes>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(DmdError::Protocol(format!("message of {} bytes", len)));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    Ok(Some(Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn message(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn four_bytes_clear_whatever_they_hold() {
        let format = PipeFormat {
            dimensions: Dimensions::new(2, 2),
            depth: BitDepth::Gray2,
            planes: false,
        };
        assert_eq!(format.decode(Bytes::from_static(&[1, 2, 3, 0])).unwrap(), SourceEvent::Clear);
        assert_eq!(format.decode(Bytes::from_static(&[0, 0, 0, 0])).unwrap(), SourceEvent::Clear);
    }

    #[test]
    fn decodes_plane_messages() {
        let dim = Dimensions::new(32, 2);
        let format = PipeFormat {
            dimensions: dim,
            depth: BitDepth::Gray2,
            planes: true,
        };
        let pixels: Vec<u8> = (0..64).map(|i| (i % 4) as u8).collect();
        let planes = codec::split_into_planes(dim, 2, &pixels).unwrap().concat();
        let SourceEvent::Frame(DmdFrame::Gray(frame)) = format.decode(Bytes::from(planes)).unwrap() else {
            panic!("expected a gray frame");
        };
        assert_eq!(frame.data(), &pixels[..]);
    }

    #[test]
    fn four_byte_frames_are_taken_as_clear() {
        // 16x1 in two planes is exactly four bytes
        let dim = Dimensions::new(16, 1);
        let format = PipeFormat {
            dimensions: dim,
            depth: BitDepth::Gray2,
            planes: true,
        };
        let pixels = vec![3u8; 16];
        let planes = codec::split_into_planes(dim, 2, &pixels).unwrap().concat();
        assert_eq!(planes.len(), CLEAR_SENTINEL_LEN);
        assert_eq!(format.decode(Bytes::from(planes)).unwrap(), SourceEvent::Clear);
    }

    #[test]
    fn missing_pipe_fails_at_setup() {
        let format = PipeFormat {
            dimensions: Dimensions::new(4, 2),
            depth: BitDepth::Gray2,
            planes: false,
        };
        assert!(PipeSource::open(Path::new("/nonexistent/dmd.fifo"), format).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn fifo_without_writer_opens_at_once() {
        use std::process::Command;
        use std::time::Duration;

        let path = std::env::temp_dir().join(format!("dmdgraph-fifo-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let status = Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(status.success());

        let format = PipeFormat {
            dimensions: Dimensions::new(4, 2),
            depth: BitDepth::Gray2,
            planes: false,
        };
        let (tx, rx) = flume::bounded(1);
        let fifo = path.clone();
        thread::spawn(move || {
            let _ = tx.send(PipeSource::open(&fifo, format).is_ok());
        });
        let opened = rx.recv_timeout(Duration::from_secs(5));
        std::fs::remove_file(&path).unwrap();
        assert_eq!(opened, Ok(true));
    }

    #[test]
    fn reads_length_prefixed_stream() {
        let mut stream = message(&[0, 1, 2, 3, 0, 1]);
        stream.extend(message(&[9, 9]));
        let mut cursor = Cursor::new(stream);
        assert_eq!(read_message(&mut cursor).unwrap().unwrap().len(), 6);
        assert_eq!(read_message(&mut cursor).unwrap().unwrap().len(), 2);
        assert!(read_message(&mut cursor).unwrap().is_none());

        let mut truncated = Cursor::new(message(&[1, 2, 3])[..5].to_vec());
        assert!(read_message(&mut truncated).is_err());
    }
}
