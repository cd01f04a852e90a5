use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    time::{Instant, interval},
};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::ws::{Msg, server::GameServerHandle};

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upgrades `stream` and runs the connection until either side closes it.
///
/// Text frames go to the game server as they arrive. Everything the game
/// server queues for this connection is written back in order, including a
/// rejection followed by [`Msg::Close`] for clients that cannot join.
///
/// # Errors
///
/// * If the WebSocket handshake fails
#[allow(clippy::too_many_lines)]
pub async fn game_ws(
    game_server: GameServerHandle,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<(), tungstenite::Error> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    log::debug!("Connected {addr}");

    let (mut write, mut read) = ws_stream.split();

    let mut last_heartbeat = Instant::now();
    let mut interval = interval(HEARTBEAT_INTERVAL);

    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();

    let Some(conn_id) = game_server.connect(conn_tx).await else {
        log::debug!("Connection from {addr} turned away");

        while let Ok(msg) = conn_rx.try_recv() {
            let Msg::Text(text) = msg else {
                break;
            };
            if let Err(e) = write.send(Message::text(text)).await {
                log::debug!("Failed to send rejection to {addr}: {e:?}");
                break;
            }
        }

        let _ = write.send(Message::Close(None)).await;
        return Ok(());
    };

    log::debug!("Connection id for {addr}: {conn_id}");

    let close_reason = loop {
        tokio::select! {
            // commands & messages received from client
            msg = read.next() => match msg {
                Some(Ok(msg)) => match msg {
                    Message::Ping(bytes) => {
                        log::trace!("Received ping");
                        last_heartbeat = Instant::now();
                        if let Err(e) = write.send(Message::Pong(bytes)).await {
                            log::error!("Failed to send pong to {conn_id}: {e:?}");
                            break None;
                        }
                    }

                    Message::Pong(_) => {
                        last_heartbeat = Instant::now();
                    }

                    Message::Text(text) => {
                        last_heartbeat = Instant::now();
                        game_server.send_message(conn_id, text.as_str());
                    }

                    Message::Binary(bytes) => {
                        last_heartbeat = Instant::now();
                        match std::str::from_utf8(&bytes) {
                            Ok(text) => game_server.send_message(conn_id, text),
                            Err(e) => log::warn!("Ignoring non-UTF-8 frame from {conn_id}: {e}"),
                        }
                    }

                    Message::Close(reason) => break reason,

                    Message::Frame(_) => {}
                },

                // client WebSocket stream error
                Some(Err(err)) => {
                    log::error!("WebSocket stream error: {err}");
                    break None;
                }

                // client WebSocket stream ended
                None => {
                    log::debug!("WebSocket stream ended");
                    break None;
                }
            },

            // messages queued by the game server
            msg = conn_rx.recv() => match msg {
                Some(Msg::Text(text)) => {
                    if let Err(err) = write.send(Message::text(text)).await {
                        log::error!("Failed to send text message to conn_id='{conn_id}': {err:?}");
                        break None;
                    }
                }

                Some(Msg::Close) => {
                    log::debug!("Game server closed conn_id='{conn_id}'");
                    break None;
                }

                // the game server stopped
                None => break None,
            },

            // heartbeat internal tick
            _ = interval.tick() => {
                // if no heartbeat ping/pong received recently, close the connection
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    log::info!(
                        "client has not sent heartbeat in over {CLIENT_TIMEOUT:?}; disconnecting"
                    );
                    break None;
                }

                // send heartbeat ping
                let _ = write.send(Message::Ping(Vec::new().into())).await;
            }
        }
    };

    log::debug!("game_ws: disconnecting connection");
    game_server.disconnect(conn_id);

    // attempt to close connection gracefully
    log::debug!("game_ws: closing connection");
    let _ = write.send(Message::Close(close_reason)).await;

    Ok(())
}
