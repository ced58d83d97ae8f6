//! Connection handles and the per-connection writer task.

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::protocol::{MessageCodec, ServerMessage};

/// Process-unique identifier of one client connection.
pub type ConnectionId = Uuid;

/// Outbound queue depth used when none is configured.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(ServerMessage),
    /// Flush what is queued, then shut the socket down.
    Close,
}

/// Cheap, cloneable reference to one connected client.
///
/// The outbound queue is bounded. The connection's own replies wait for room
/// in it with [`send`](Self::send). Messages pushed while a room lock is held
/// go through [`try_send`](Self::try_send), which drops the connection instead
/// of waiting when its queue is full.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Outbound>,
    abort: CancellationToken,
}

/// Receiving side of a connection's queue, drained by [`write_loop`].
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::Receiver<Outbound>,
    abort: CancellationToken,
}

impl Outbox {
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Whether the connection was dropped for falling behind.
    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer drains.
    pub fn new() -> (Self, Outbox) {
        Self::with_capacity(OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Outbox) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let abort = CancellationToken::new();
        let handle = Self {
            id: Uuid::new_v4(),
            sender,
            abort: abort.clone(),
        };
        (handle, Outbox { receiver, abort })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a reply, waiting while the queue is full. Returns `false` once
    /// the writer has gone away.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        if self.abort.is_cancelled() {
            return false;
        }
        self.sender.send(Outbound::Message(msg)).await.is_ok()
    }

    /// Queue a message without waiting. A full queue drops the connection.
    pub fn try_send(&self, msg: ServerMessage) -> bool {
        if self.abort.is_cancelled() {
            return false;
        }
        match self.sender.try_send(Outbound::Message(msg)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(conn = %self.id, "outbound queue full, dropping connection");
                self.abort();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the writer to flush and close. Safe to call more than once.
    pub fn close(&self) {
        if let Err(TrySendError::Full(_)) = self.sender.try_send(Outbound::Close) {
            self.abort();
        }
    }

    /// Stop the writer at once, discarding anything still queued.
    pub fn abort(&self) {
        self.abort.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.abort.is_cancelled() || self.sender.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Drain a connection's outbound queue onto the socket until closed or
/// aborted.
pub async fn write_loop<W>(mut sink: FramedWrite<W, MessageCodec>, mut outbox: Outbox, conn: ConnectionId)
where
    W: AsyncWrite + Unpin,
{
    let abort = outbox.abort.clone();

    loop {
        let item = tokio::select! {
            biased;
            _ = abort.cancelled() => {
                debug!(%conn, "writer aborted");
                return;
            }
            item = outbox.recv() => item,
        };

        match item {
            Some(Outbound::Message(msg)) => {
                let action = msg.action();
                tokio::select! {
                    biased;
                    _ = abort.cancelled() => {
                        debug!(%conn, action, "writer aborted mid-write");
                        return;
                    }
                    sent = sink.send(msg) => {
                        if let Err(e) = sent {
                            warn!(%conn, action, error = %e, "write failed");
                            return;
                        }
                    }
                }
            }
            Some(Outbound::Close) | None => break,
        }
    }

    if let Err(e) = SinkExt::<ServerMessage>::close(&mut sink).await {
        debug!(%conn, error = %e, "error while closing connection");
    }
}
