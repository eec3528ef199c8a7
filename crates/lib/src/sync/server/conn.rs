//! Per-connection reader and writer tasks.

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::tcp::{OwnedReadHalf, OwnedWriteHalf},
    sync::{mpsc, oneshot},
};
use tracing::{debug, error, trace};

use super::{ConnectionEvent, ConnectionId};
use crate::sync::{
    codec::{encode_s2c, read_c2s, write_packet},
    protocol::S2cPacket,
};

/// Decode packets and forward them to the server until the stream fails or the
/// server drops the session.
pub(super) async fn read_loop(
    conn: ConnectionId,
    reader: OwnedReadHalf,
    events: mpsc::Sender<ConnectionEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut reader = BufReader::new(reader);
    loop {
        let result = tokio::select! {
            _ = &mut shutdown => {
                debug!("Session closed by server");
                break;
            }
            result = read_c2s(&mut reader) => result,
        };

        let event = match result {
            Ok(packet) => {
                trace!(packet = packet.name(), "Received packet");
                ConnectionEvent::Packet { conn, packet }
            }
            Err(error) => {
                let _ = events.send(ConnectionEvent::Failed { conn, error }).await;
                break;
            }
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
}

/// Write queued packets in order. Ends once the server dropped the queue,
/// after flushing whatever was already in it.
///
/// A packet that cannot be encoded ends the session: skipping it would leave
/// the peer waiting for it.
pub(super) async fn write_loop(
    conn: ConnectionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<S2cPacket>,
    events: mpsc::Sender<ConnectionEvent>,
) {
    while let Some(packet) = outbound.recv().await {
        let bytes = match encode_s2c(&packet) {
            Ok(bytes) => bytes,
            Err(error) => {
                error!(packet = packet.name(), "Failed to encode packet: {error}");
                let _ = events.send(ConnectionEvent::Failed { conn, error }).await;
                break;
            }
        };
        if let Err(e) = write_packet(&mut writer, &bytes).await {
            debug!("Failed to write packet: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Writer stopped");
}
