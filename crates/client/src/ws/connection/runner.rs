//! Connection task: connect, handshake, pump frames, reconnect.

use std::sync::Arc;

use banter_shared::{ClientEvent, ServerEvent, WsEnvelope};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::{ConnectionState, ReconnectConfig};
use crate::ws::events::{HandlerRegistry, StreamEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Everything the connection task owns for its lifetime.
pub(crate) struct Runner {
    pub url: String,
    pub identity: String,
    pub reconnect: ReconnectConfig,
    pub outbound: UnboundedReceiver<WsEnvelope<ClientEvent>>,
    pub registry: Arc<HandlerRegistry>,
    pub state: Arc<watch::Sender<ConnectionState>>,
}

/// How a live connection ended.
enum Closed {
    /// The server side went away; reconnect.
    Remote,
    /// Our sender was dropped; stop for good.
    Local,
}

impl Runner {
    pub(crate) async fn run(mut self) {
        let mut attempt = 0u32;
        let mut ever_connected = false;

        loop {
            if attempt == 0 {
                self.state.send_replace(ConnectionState::Connecting);
            } else {
                self.state
                    .send_replace(ConnectionState::Reconnecting { attempt });
            }

            match connect_async(self.url.as_str()).await {
                Ok((mut socket, _response)) => {
                    match send_envelope(&mut socket, ClientEvent::Setup(self.identity.clone()))
                        .await
                    {
                        Ok(()) => {
                            attempt = 0;
                            self.state.send_replace(ConnectionState::Connected);
                            crate::log_info!(
                                "Event stream connected to {} as {}",
                                self.url,
                                self.identity
                            );
                            self.registry.dispatch(&if ever_connected {
                                StreamEvent::Reconnected
                            } else {
                                StreamEvent::Connected
                            });
                            ever_connected = true;

                            let (write, read) = socket.split();
                            match self.pump(write, read).await {
                                Closed::Local => {
                                    self.state.send_replace(ConnectionState::Disconnected);
                                    crate::log_info!("Event stream to {} closed", self.url);
                                    return;
                                }
                                Closed::Remote => {
                                    crate::log_warn!("Event stream to {} lost", self.url);
                                    self.state.send_replace(ConnectionState::Disconnected);
                                    self.registry.dispatch(&StreamEvent::Disconnected);
                                }
                            }
                        }
                        Err(e) => {
                            crate::log_error!("Setup handshake to {} failed: {}", self.url, e);
                        }
                    }
                }
                Err(e) => {
                    crate::log_error!("Event stream error for {}: {}", self.url, e);
                }
            }

            attempt += 1;
            if !self.reconnect.allows(attempt) {
                let attempts = attempt - 1;
                self.state.send_replace(ConnectionState::Failed {
                    reason: format!("Max reconnect attempts ({}) exceeded", attempts),
                });
                self.registry
                    .dispatch(&StreamEvent::ReconnectFailed { attempts });
                return;
            }

            crate::log_info!(
                "Reconnecting to {} in {:?} (attempt {})",
                self.url,
                self.reconnect.delay,
                attempt
            );
            tokio::time::sleep(self.reconnect.delay).await;
        }
    }

    /// Forward inbound frames to handlers and queued events to the socket
    /// until either side goes away.
    async fn pump(
        &mut self,
        mut write: SplitSink<Socket, Message>,
        mut read: SplitStream<Socket>,
    ) -> Closed {
        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        crate::log_debug!("Event stream received: {}", text.as_str());
                        match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                            Ok(envelope) => {
                                self.registry.dispatch(&StreamEvent::Server(envelope.payload))
                            }
                            Err(e) => crate::log_error!("Failed to parse event: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Closed::Remote,
                    Some(Ok(_)) => {
                        // Pings are answered by tungstenite; binary frames are not part of the protocol
                    }
                    Some(Err(e)) => {
                        crate::log_error!("Event stream read error: {}", e);
                        return Closed::Remote;
                    }
                },
                queued = self.outbound.next() => match queued {
                    Some(envelope) => match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            crate::log_debug!("Sending to {}: {}", self.url, json);
                            if let Err(e) = write.send(Message::text(json)).await {
                                crate::log_error!("Send failed: {}", e);
                                return Closed::Remote;
                            }
                        }
                        Err(e) => crate::log_error!("Serialize failed: {}", e),
                    },
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Closed::Local;
                    }
                },
            }
        }
    }
}

async fn send_envelope(socket: &mut Socket, event: ClientEvent) -> Result<(), String> {
    let json = serde_json::to_string(&WsEnvelope::new(event)).map_err(|e| e.to_string())?;
    socket
        .send(Message::text(json))
        .await
        .map_err(|e| e.to_string())
}
