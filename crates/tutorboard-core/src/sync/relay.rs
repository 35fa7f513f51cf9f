//! WebSocket client for the relay server.
//!
//! The socket lives on a background thread; commands and events cross over
//! std mpsc channels so the session thread never blocks on the network.

use super::{
    CANVAS_UPDATE_EVENT, CanvasUpdate, ChannelError, ChannelEvent, ChannelState, ClientMessage,
    ServerMessage, SyncChannel, session_topic,
};
use crate::event::ChangeEvent;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

/// Commands sent to the WebSocket thread.
enum RelayCommand {
    Send(String),
    Close,
}

/// Relay-backed [`SyncChannel`].
pub struct RelayChannel {
    url: String,
    topic: String,
    user_id: String,
    state: ChannelState,
    events: Vec<ChannelEvent>,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<RelayCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<ChannelEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl RelayChannel {
    /// Connect to a relay and subscribe to `session_id`.
    ///
    /// Returns immediately; `Connected` is reported through `poll` once the
    /// relay confirms the subscription.
    pub fn connect(url: &str, session_id: &str, user_id: &str) -> Result<Self, ChannelError> {
        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ChannelError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let mut relay = Self {
            url: url.to_string(),
            topic: session_topic(session_id),
            user_id: user_id.to_string(),
            state: ChannelState::Disconnected,
            events: Vec::new(),
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        };
        relay.spawn()?;
        Ok(relay)
    }

    /// Drop the current connection and subscribe again.
    ///
    /// Events published by others while we were away are not replayed.
    pub fn reconnect(&mut self) -> Result<(), ChannelError> {
        self.shutdown();
        self.events.clear();
        self.spawn()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn spawn(&mut self) -> Result<(), ChannelError> {
        let join = serde_json::to_string(&ClientMessage::Join {
            session: self.topic.clone(),
            user_id: self.user_id.clone(),
        })?;

        let (cmd_tx, cmd_rx) = channel::<RelayCommand>();
        let (event_tx, event_rx) = channel::<ChannelEvent>();
        let url = self.url.clone();

        let handle = thread::Builder::new()
            .name("tutorboard-relay".to_string())
            .spawn(move || run_socket(&url, &join, cmd_rx, event_tx))
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        self.state = ChannelState::Connecting;
        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            if let Ok(leave) = serde_json::to_string(&ClientMessage::Leave) {
                let _ = tx.send(RelayCommand::Send(leave));
            }
            let _ = tx.send(RelayCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ChannelState::Disconnected;
    }

    /// Move events from the socket thread into the local buffer.
    fn drain(&mut self) {
        let Some(rx) = &self.event_rx else {
            return;
        };
        while let Ok(event) = rx.try_recv() {
            match &event {
                ChannelEvent::Connected { .. } => self.state = ChannelState::Connected,
                ChannelEvent::Disconnected => self.state = ChannelState::Disconnected,
                ChannelEvent::Error { .. } => self.state = ChannelState::Error,
                _ => {}
            }
            self.events.push(event);
        }
    }
}

impl SyncChannel for RelayChannel {
    fn publish(&mut self, event: &ChangeEvent) -> Result<(), ChannelError> {
        self.drain();
        // Commands queue behind the join while still connecting
        if !matches!(self.state, ChannelState::Connecting | ChannelState::Connected) {
            return Err(ChannelError::NotConnected);
        }
        let tx = self.cmd_tx.as_ref().ok_or(ChannelError::NotConnected)?;

        let payload = serde_json::to_value(CanvasUpdate {
            user_id: self.user_id.clone(),
            data: event.clone(),
        })?;
        let msg = serde_json::to_string(&ClientMessage::Broadcast {
            event: CANVAS_UPDATE_EVENT.to_string(),
            payload,
        })?;
        tx.send(RelayCommand::Send(msg))
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    fn poll(&mut self) -> Vec<ChannelEvent> {
        self.drain();
        std::mem::take(&mut self.events)
    }

    fn unsubscribe(&mut self) {
        self.shutdown();
        self.events.clear();
    }

    fn state(&self) -> ChannelState {
        self.state
    }
}

impl Drop for RelayChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Map a relay message to a channel event; `None` for messages we ignore.
fn translate(msg: ServerMessage) -> Option<ChannelEvent> {
    match msg {
        ServerMessage::Joined { peer_count, .. } => Some(ChannelEvent::Connected { peer_count }),
        ServerMessage::PeerJoined { user_id } => Some(ChannelEvent::PeerJoined { user_id }),
        ServerMessage::PeerLeft { user_id } => Some(ChannelEvent::PeerLeft { user_id }),
        ServerMessage::Broadcast { event, payload, from } => {
            if event != CANVAS_UPDATE_EVENT {
                log::debug!("Ignoring {} broadcast from {}", event, from);
                return None;
            }
            match serde_json::from_value::<CanvasUpdate>(payload) {
                Ok(update) => Some(ChannelEvent::Change(update.data)),
                Err(e) => {
                    log::warn!("Dropping undecodable canvas update from {}: {}", from, e);
                    None
                }
            }
        }
        ServerMessage::Error { message } => Some(ChannelEvent::Error { message }),
    }
}

/// At most the first 100 characters of an outgoing frame, cut on a char boundary.
fn log_preview(msg: &str) -> &str {
    msg.char_indices().nth(100).map_or(msg, |(i, _)| &msg[..i])
}

/// Socket thread body: connect, join, then pump commands and messages.
fn run_socket(url: &str, join: &str, cmd_rx: Receiver<RelayCommand>, event_tx: Sender<ChannelEvent>) {
    log::info!("Relay thread: connecting to {}", url);

    let (mut socket, response) = match connect(url) {
        Ok(connected) => connected,
        Err(e) => {
            log::error!("Relay connection failed: {}", e);
            let _ = event_tx.send(ChannelEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    log::info!("Relay connected, status: {}", response.status());

    // Short read timeout so the loop also services outgoing commands
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    if let Err(e) = socket.send(Message::Text(join.to_string())) {
        log::error!("Relay join failed: {}", e);
        let _ = event_tx.send(ChannelEvent::Error {
            message: format!("Join failed: {}", e),
        });
        return;
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(RelayCommand::Send(msg)) => {
                log::debug!("Relay sending: {}", log_preview(&msg));
                if let Err(e) = socket.send(Message::Text(msg)) {
                    log::error!("Relay send error: {}", e);
                    break;
                }
                // Drain queued commands before blocking on a read
                continue;
            }
            Ok(RelayCommand::Close) => {
                log::info!("Relay close requested");
                let _ = socket.close(None);
                let _ = socket.flush();
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("Relay command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(txt)) => match serde_json::from_str::<ServerMessage>(&txt) {
                Ok(server_msg) => {
                    if let Some(event) = translate(server_msg) {
                        if event_tx.send(event).is_err() {
                            // Receiver dropped: the channel was unsubscribed
                            break;
                        }
                    }
                }
                Err(e) => log::warn!("Failed to parse relay message: {}", e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("Relay sent close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Relay read error: {}", e);
                break;
            }
        }
    }

    log::info!("Relay thread exiting");
    let _ = event_tx.send(ChannelEvent::Disconnected);
}
