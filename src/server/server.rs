//! TCP accept loop and per-connection tasks.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, instrument, warn};

use crate::error::ServerError;
use crate::protocol::MessageCodec;

use super::connection::{ConnectionHandle, write_loop};
use super::handler::{ConnectionHandler, Flow};
use super::state::ServerState;

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(state: Arc<ServerState>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(state.config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "quiz server listening");

    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await;
    Ok(())
}

/// Accept connections on `listener` until `shutdown` completes.
///
/// Connections already accepted keep running on their own tasks.
pub async fn serve<F>(listener: TcpListener, state: Arc<ServerState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, Arc::clone(&state)));
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
        }
    }
}

#[instrument(name = "connection", skip(stream, state), fields(conn = tracing::field::Empty))]
async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    let (read_half, write_half) = stream.into_split();
    let (handle, outbox) = ConnectionHandle::with_capacity(state.config.outbound_capacity);
    let conn = handle.id();
    tracing::Span::current().record("conn", tracing::field::display(conn));
    info!("client connected");

    let mut writer = tokio::spawn(write_loop(
        FramedWrite::new(write_half, MessageCodec),
        outbox,
        conn,
    ));
    let mut frames = FramedRead::new(read_half, MessageCodec);
    let mut handler = ConnectionHandler::new(state, handle);
    let mut writer_done = false;

    loop {
        tokio::select! {
            frame = frames.next() => match frame {
                Some(Ok(envelope)) => {
                    if handler.handle_envelope(envelope).await == Flow::Disconnect {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "dropping connection after protocol error");
                    break;
                }
                None => {
                    debug!("peer closed the connection");
                    break;
                }
            },
            _ = &mut writer => {
                writer_done = true;
                debug!("writer stopped, tearing down");
                break;
            }
        }
    }

    handler.cleanup().await;
    if !writer_done {
        if let Err(e) = writer.await {
            warn!(error = %e, "writer task failed");
        }
    }
    info!("client disconnected");
}
