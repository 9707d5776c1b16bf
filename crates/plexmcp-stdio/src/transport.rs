//! Pipe-pair transport implementation.
//!
//! Frames are newline-terminated JSON. The reader and writer sides live
//! behind tokio mutexes because framed I/O is held across await points; the
//! state flag lives behind a std mutex and is never held across an await.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::Mutex as TokioMutex;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, trace};

use plexmcp_transport::{
    Transport, TransportConfig, TransportError, TransportMessage, TransportResult, TransportState,
};

type BoxedRead = Pin<Box<dyn AsyncRead + Send + Sync + 'static>>;
type BoxedWrite = Pin<Box<dyn AsyncWrite + Send + Sync + 'static>>;
type FrameReader = FramedRead<BufReader<BoxedRead>, LinesCodec>;
type FrameWriter = FramedWrite<BoxedWrite, LinesCodec>;

/// Newline-delimited JSON over an async read/write pair.
pub struct PipeTransport {
    state: Arc<StdMutex<TransportState>>,
    config: TransportConfig,
    reader: TokioMutex<FrameReader>,
    writer: TokioMutex<FrameWriter>,
}

impl std::fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeTransport")
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipeTransport {
    /// Build a transport over an arbitrary read/write pair.
    ///
    /// When talking to a child process, `reader` is the child's stdout and
    /// `writer` is its stdin.
    pub fn from_raw<R, W>(reader: R, writer: W, config: TransportConfig) -> Self
    where
        R: AsyncRead + Send + Sync + 'static,
        W: AsyncWrite + Send + Sync + 'static,
    {
        let codec = LinesCodec::new_with_max_length(config.max_frame_size);
        let boxed_reader: BoxedRead = Box::pin(reader);
        let boxed_writer: BoxedWrite = Box::pin(writer);
        Self {
            state: Arc::new(StdMutex::new(TransportState::Connected)),
            reader: TokioMutex::new(FramedRead::new(BufReader::new(boxed_reader), codec.clone())),
            writer: TokioMutex::new(FramedWrite::new(boxed_writer, codec)),
            config,
        }
    }

    /// Build a transport over the current process's stdin/stdout.
    pub fn stdio() -> Self {
        Self::from_raw(
            tokio::io::stdin(),
            tokio::io::stdout(),
            TransportConfig::default(),
        )
    }

    /// Build a transport over a spawned child's pipes. The child must have
    /// been spawned with `Stdio::piped()` on both stdin and stdout.
    pub fn from_child(child: &mut tokio::process::Child) -> TransportResult<Self> {
        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::ConnectionFailed("child stdin was not piped".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::ConnectionFailed("child stdout was not piped".to_string())
        })?;
        Ok(Self::from_raw(stdout, stdin, TransportConfig::default()))
    }

    fn set_state(&self, state: TransportState) {
        *self.state.lock().expect("state mutex poisoned") = state;
    }

    fn current_state(&self) -> TransportState {
        self.state.lock().expect("state mutex poisoned").clone()
    }
}

impl Transport for PipeTransport {
    fn state(&self) -> Pin<Box<dyn std::future::Future<Output = TransportState> + Send + '_>> {
        Box::pin(async move { self.current_state() })
    }

    fn connect(&self) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        // The pair is live from construction; connect only validates state.
        Box::pin(async move {
            match self.current_state() {
                TransportState::Connected => Ok(()),
                other => Err(TransportError::ConnectionFailed(format!(
                    "pipe transport not connectable from state {other:?}"
                ))),
            }
        })
    }

    fn disconnect(
        &self,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            self.set_state(TransportState::Closed);
            let mut writer = self.writer.lock().await;
            let _ = SinkExt::<String>::close(&mut *writer).await;
            debug!("pipe transport closed");
            Ok(())
        })
    }

    fn send(
        &self,
        message: TransportMessage,
    ) -> Pin<Box<dyn std::future::Future<Output = TransportResult<()>> + Send + '_>> {
        Box::pin(async move {
            if self.current_state() != TransportState::Connected {
                return Err(TransportError::NotConnected);
            }
            if message.size() > self.config.max_frame_size {
                return Err(TransportError::FrameTooLarge {
                    size: message.size(),
                    max: self.config.max_frame_size,
                });
            }
            let line = String::from_utf8(message.payload.to_vec())
                .map_err(|e| TransportError::MalformedFrame(format!("non-UTF-8 frame: {e}")))?;
            if line.contains('\n') {
                return Err(TransportError::MalformedFrame(
                    "frame contains an embedded newline".to_string(),
                ));
            }
            trace!(bytes = line.len(), "pipe send");
            let mut writer = self.writer.lock().await;
            writer.send(line).await.map_err(|e| match e {
                LinesCodecError::MaxLineLengthExceeded => TransportError::FrameTooLarge {
                    size: message.size(),
                    max: self.config.max_frame_size,
                },
                LinesCodecError::Io(io) => TransportError::Io(io),
            })
        })
    }

    fn receive(
        &self,
    ) -> Pin<
        Box<dyn std::future::Future<Output = TransportResult<Option<TransportMessage>>> + Send + '_>,
    > {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            match reader.next().await {
                Some(Ok(line)) => {
                    trace!(bytes = line.len(), "pipe receive");
                    Ok(Some(TransportMessage::new(Bytes::from(line))))
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    Err(TransportError::FrameTooLarge {
                        size: self.config.max_frame_size + 1,
                        max: self.config.max_frame_size,
                    })
                }
                Some(Err(LinesCodecError::Io(io))) => Err(TransportError::Io(io)),
                None => {
                    self.set_state(TransportState::Closed);
                    debug!("pipe transport reached end of stream");
                    Ok(None)
                }
            }
        })
    }

    fn endpoint(&self) -> Option<String> {
        Some("pipe".to_string())
    }
}

/// Create a connected in-memory transport pair for loopback tests: frames
/// sent on one side arrive on the other.
pub fn duplex_pair(config: TransportConfig) -> (PipeTransport, PipeTransport) {
    let (a_side, b_side) = tokio::io::duplex(config.max_frame_size.min(64 * 1024));
    let (a_read, a_write) = tokio::io::split(a_side);
    let (b_read, b_write) = tokio::io::split(b_side);
    (
        PipeTransport::from_raw(a_read, a_write, config.clone()),
        PipeTransport::from_raw(b_read, b_write, config),
    )
}
