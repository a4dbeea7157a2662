//! TCP frame source.
//!
//! Runs a small tokio runtime on its own thread. Every connection sends
//! length-prefixed messages (little-endian `u32` length) in the tagged
//! [`wire`](crate::capture::wire) format; a four-byte message clears the
//! displays. Connections come and go without stopping the source.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::thread;

use bytes::Bytes;
use flume::Receiver;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::capture::pipe::CLEAR_SENTINEL_LEN;
use crate::capture::wire::WireDecoder;
use crate::capture::{already_started, await_producer, FrameSink, Source, SourceEvent, STOP_TIMEOUT};
use crate::error::{DmdError, Result};

const MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

pub struct NetworkSource {
    address: String,
    local_addr: Option<SocketAddr>,
    shutdown: Option<watch::Sender<bool>>,
    done: Option<Receiver<()>>,
}

impl NetworkSource {
    /// Listens on `address` (`host:port`) once started.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            local_addr: None,
            shutdown: None,
            done: None,
        }
    }

    /// The bound address, available once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Source for NetworkSource {
    fn name(&self) -> &str {
        &self.address
    }

    #[instrument(skip_all, fields(address = %self.address))]
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.shutdown.is_some() {
            return Err(already_started("running"));
        }
        let (ready_tx, ready_rx) = flume::bounded::<Result<SocketAddr>>(1);
        let (done_tx, done_rx) = flume::bounded(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let address = self.address.clone();

        thread::Builder::new()
            .name("network-source".into())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(serve(address, sink, shutdown_rx, ready_tx)),
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                    }
                }
                let _ = done_tx.send(());
            })?;

        let local_addr = ready_rx
            .recv_timeout(STOP_TIMEOUT)
            .map_err(|_| DmdError::device(&self.address, "listener did not come up"))??;
        info!("Network source listening on {}", local_addr);
        self.local_addr = Some(local_addr);
        self.shutdown = Some(shutdown_tx);
        self.done = Some(done_rx);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(done) = self.done.take() {
            await_producer(&self.address, &done);
        }
        debug!("Network source {} stopped", self.address);
        Ok(())
    }
}

async fn serve(
    address: String,
    sink: FrameSink,
    mut shutdown: watch::Receiver<bool>,
    ready: flume::Sender<Result<SocketAddr>>,
) {
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Cannot listen on {}: {}", address, e);
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    let _ = ready.send(listener.local_addr().map_err(Into::into));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("Client {} connected", peer);
                    tokio::spawn(handle_connection(stream, peer, sink.clone(), shutdown.clone()));
                }
                Err(e) => warn!("Accept failed: {}", e),
            },
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    sink: FrameSink,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut decoder = WireDecoder::default();
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return,
            message = read_message(&mut stream) => message,
        };
        let message = match message {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("Client {} disconnected", peer);
                return;
            }
            Err(e) => {
                warn!("Dropping client {}: {}", peer, e);
                return;
            }
        };

        let event = if message.len() == CLEAR_SENTINEL_LEN {
            Some(SourceEvent::Clear)
        } else {
            match decoder.decode(message) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Bad message from {}: {}", peer, e);
                    continue;
                }
            }
        };
        if let Some(event) = event {
            if sink.send_async(event).await.is_err() {
                return;
            }
        }
    }
}

async fn read_message(stream: &mut TcpStream) -> Result<Option<Bytes>> {
    let len = match stream.read_u32_le().await {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_MESSAGE_LEN {
        return Err(DmdError::Protocol(format!("message of {} bytes", len)));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;
    Ok(Some(Bytes::from(body)))
}
