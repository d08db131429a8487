//! The single outbound progress stream shared by concurrent tasks.

use super::{CommitGuard, StreamEvent};
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// A unit handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text appended to the response body.
    Chunk(String),
    /// The response is finalized. `code` is absent when the stream simply ends.
    Commit {
        /// Final status, if any.
        code: Option<u16>,
        /// The message of the committing event.
        message: String,
    },
}

struct Inner {
    tx: mpsc::UnboundedSender<Frame>,
    guard: CommitGuard,
    committed: watch::Sender<bool>,
    // Keeps a chunk and its commit adjacent on the wire.
    write_lock: Mutex<()>,
}

/// Task-safe append-only sink for one request.
///
/// Cloning is cheap; every clone writes to the same stream. Once a terminal
/// event has committed the response, further writes are dropped.
#[derive(Clone)]
pub struct EventChannel {
    inner: Arc<Inner>,
}

impl EventChannel {
    /// Creates a channel and the stream the transport drains.
    #[must_use]
    pub fn new() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (committed, _) = watch::channel(false);
        let channel = Self {
            inner: Arc::new(Inner {
                tx,
                guard: CommitGuard::new(),
                committed,
                write_lock: Mutex::new(()),
            }),
        };
        (channel, EventStream { rx })
    }

    /// Emits an event.
    ///
    /// Returns true if a terminal event won the commit.
    pub fn emit(&self, event: StreamEvent) -> bool {
        if event.has_message() {
            info!(message = %event.message, fault = event.is_fault, "Stream message");
        }

        let _lock = self.inner.write_lock.lock();
        if self.inner.guard.is_consumed() {
            debug!(message = %event.message, "Dropping event after commit");
            return false;
        }

        if event.has_message() {
            self.send(Frame::Chunk(event.message.clone()));
        }

        if !event.terminal {
            return false;
        }

        if !self.inner.guard.try_consume(event.commit_code) {
            return false;
        }
        self.send(Frame::Commit {
            code: event.commit_code,
            message: event.message,
        });
        self.inner.committed.send_replace(true);
        true
    }

    /// Appends raw process output to the stream.
    pub fn write_raw(&self, chunk: impl Into<String>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        let _lock = self.inner.write_lock.lock();
        if !self.inner.guard.is_consumed() {
            self.send(Frame::Chunk(chunk));
        }
    }

    fn send(&self, frame: Frame) {
        if self.inner.tx.send(frame).is_err() {
            debug!("Transport closed, frame discarded");
        }
    }

    /// Returns whether the response has been committed.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.guard.is_consumed()
    }

    /// Returns the committed status, if a commit carried one.
    #[must_use]
    pub fn commit_code(&self) -> Option<u16> {
        self.inner.guard.code()
    }

    /// Resolves once the response has been committed.
    pub async fn committed(&self) {
        let mut rx = self.inner.committed.subscribe();
        let _ = rx.wait_for(|committed| *committed).await;
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("guard", &self.inner.guard)
            .finish()
    }
}

/// The receiving side of an [`EventChannel`].
///
/// The stream ends when every clone of the channel has been dropped.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl EventStream {
    /// Receives the next frame.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Drains the stream until the producers are gone.
    pub async fn collect_frames(mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.rx.recv().await {
            frames.push(frame);
        }
        frames
    }
}

impl Stream for EventStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Frame>> {
        self.rx.poll_recv(cx)
    }
}

/// Returns the commit frames among `frames`.
#[must_use]
pub fn commits(frames: &[Frame]) -> Vec<(Option<u16>, String)> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Commit { code, message } => Some((*code, message.clone())),
            Frame::Chunk(_) => None,
        })
        .collect()
}

/// Returns the text chunks among `frames`.
#[must_use]
pub fn chunks(frames: &[Frame]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Chunk(text) => Some(text.clone()),
            Frame::Commit { .. } => None,
        })
        .collect()
}
