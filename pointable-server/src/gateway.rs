use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use parking_lot::Mutex;
use pointable_collab::{
    random_string, CardValue, Collab, CollabEvent, JoinOutcome, MemberData, PrimaryKey, RoomError,
    RoomView,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use crate::context::ServerContext;

const CONNECTION_ID_LENGTH: usize = 16;

/// Messages a client may send over the gateway.
///
/// The admin token travels in every privileged payload and is compared
/// against the room's stored token on each call.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Associates this socket with a member, creating one if needed
    Join {
        session_id: Option<String>,
        name: Option<String>,
    },
    /// Sets or clears the member's vote
    Vote { point: Option<CardValue> },
    Reveal { admin_token: String },
    Reset { admin_token: String },
    End { admin_token: String },
}

/// Messages the server sends, either to one socket or fanned out to every
/// socket in a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Direct reply to a successful join
    Joined {
        member_id: PrimaryKey,
        session_id: String,
        reconnected: bool,
        room: RoomView,
    },
    /// Direct reply when neither a session nor a name was supplied
    NameRequired,
    /// Direct reply carrying a human readable failure
    RoomError { reason: String },
    MemberJoined { member_id: PrimaryKey, room: RoomView },
    MemberReconnected { member_id: PrimaryKey, room: RoomView },
    MemberDisconnected { member_id: PrimaryKey, room: RoomView },
    VoteUpdated { room: RoomView },
    VotesRevealed { room: RoomView },
    VotesReset { room: RoomView },
    RoomExpired,
    RoomEnded,
}

impl From<CollabEvent> for ServerEvent {
    fn from(value: CollabEvent) -> Self {
        match value {
            CollabEvent::MemberJoined { member_id, room, .. } => {
                Self::MemberJoined { member_id, room }
            }
            CollabEvent::MemberReconnected { member_id, room, .. } => {
                Self::MemberReconnected { member_id, room }
            }
            CollabEvent::MemberDisconnected { member_id, room, .. } => {
                Self::MemberDisconnected { member_id, room }
            }
            CollabEvent::VoteUpdated { room, .. } => Self::VoteUpdated { room },
            CollabEvent::VotesRevealed { room, .. } => Self::VotesRevealed { room },
            CollabEvent::VotesReset { room, .. } => Self::VotesReset { room },
            CollabEvent::RoomExpired { .. } => Self::RoomExpired,
            CollabEvent::RoomEnded { .. } => Self::RoomEnded,
        }
    }
}

/// Tracks live gateway sockets and fans collab events out to the rooms
/// they belong to.
pub struct Gateway {
    connections: Mutex<Vec<Connection>>,
}

struct Connection {
    id: String,
    room_id: String,
    sender: UnboundedSender<Message>,
}

impl Gateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: Default::default(),
        })
    }

    /// Spawns the pump forwarding collab events to their room's sockets.
    /// Runs for the lifetime of the process.
    pub fn run(self: &Arc<Self>, collab: Arc<Collab>) {
        let gateway = self.clone();

        std::thread::spawn(move || loop {
            gateway.fan_out(collab.wait_for_event());
        });
    }

    fn fan_out(&self, event: CollabEvent) {
        let room_id = event.room_id().to_string();
        let closing = matches!(
            event,
            CollabEvent::RoomExpired { .. } | CollabEvent::RoomEnded { .. }
        );

        let event = ServerEvent::from(event);
        let text = serde_json::to_string(&event).expect("serializes properly");

        let mut connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.room_id == room_id) {
            // A failed send means the socket task already exited; its close
            // path removes the entry
            let _ = connection.sender.send(Message::Text(text.clone()));
        }

        if closing {
            for connection in connections.iter().filter(|c| c.room_id == room_id) {
                let _ = connection.sender.send(Message::Close(None));
            }

            connections.retain(|c| c.room_id != room_id);
        }
    }

    fn register(&self, connection: Connection) {
        let mut connections = self.connections.lock();

        connections.retain(|c| c.id != connection.id);
        connections.push(connection);
    }

    fn unregister(&self, id: &str) {
        self.connections.lock().retain(|c| c.id != id)
    }
}

pub(crate) async fn gateway(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(context): State<ServerContext>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, context))
}

async fn handle_socket(socket: WebSocket, room_id: String, context: ServerContext) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut receiver) = unbounded_channel::<Message>();

    // All writes to the socket go through one channel, so broadcasts and
    // direct replies cannot interleave
    let writer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut client = GatewayClient::new(room_id, context, sender);

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => client.handle_text(&text).await,
            Ok(Message::Close(_)) => break,
            // Pings and pongs are answered by axum itself
            Ok(_) => {}
            Err(error) => {
                warn!("Failed to read message from client: {error}");
                break;
            }
        }
    }

    client.handle_close().await;
    writer.abort();
}

/// The per-socket protocol state
struct GatewayClient {
    id: String,
    room_id: String,
    context: ServerContext,
    sender: UnboundedSender<Message>,
    /// Set once a join has succeeded
    member_id: Option<PrimaryKey>,
}

impl GatewayClient {
    fn new(room_id: String, context: ServerContext, sender: UnboundedSender<Message>) -> Self {
        Self {
            id: random_string(CONNECTION_ID_LENGTH),
            room_id,
            context,
            sender,
            member_id: None,
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(error) => {
                debug!("Malformed gateway message: {error}");
                self.send(ServerEvent::RoomError {
                    reason: "Malformed message".to_string(),
                });
                return;
            }
        };

        match message {
            ClientMessage::Join { session_id, name } => self.handle_join(session_id, name).await,
            ClientMessage::Vote { point } => self.handle_vote(point).await,
            ClientMessage::Reveal { admin_token } => {
                self.report(
                    self.context
                        .collab
                        .rooms
                        .reveal(&self.room_id, Some(&admin_token))
                        .await
                        .map(|_| ()),
                );
            }
            ClientMessage::Reset { admin_token } => {
                self.report(
                    self.context
                        .collab
                        .rooms
                        .reset(&self.room_id, Some(&admin_token))
                        .await
                        .map(|_| ()),
                );
            }
            ClientMessage::End { admin_token } => {
                self.report(
                    self.context
                        .collab
                        .rooms
                        .end(&self.room_id, Some(&admin_token))
                        .await,
                );
            }
        }
    }

    async fn handle_join(&mut self, session_id: Option<String>, name: Option<String>) {
        let result = self
            .context
            .collab
            .rooms
            .join(
                &self.room_id,
                session_id.as_deref(),
                name.as_deref(),
                Some(&self.id),
            )
            .await;

        match result {
            Ok(JoinOutcome::NameRequired) => self.send(ServerEvent::NameRequired),
            Ok(JoinOutcome::Joined { member, room }) => self.finish_join(member, room, false),
            Ok(JoinOutcome::Reconnected { member, room }) => self.finish_join(member, room, true),
            Err(error) => self.send_error(error),
        }
    }

    fn finish_join(&mut self, member: MemberData, room: RoomView, reconnected: bool) {
        self.member_id = Some(member.id);

        self.context.gateway.register(Connection {
            id: self.id.clone(),
            room_id: self.room_id.clone(),
            sender: self.sender.clone(),
        });

        self.send(ServerEvent::Joined {
            member_id: member.id,
            session_id: member.session_id,
            reconnected,
            room,
        });
    }

    async fn handle_vote(&self, point: Option<CardValue>) {
        let Some(member_id) = self.member_id else {
            self.send_error(RoomError::NotAMember);
            return;
        };

        self.report(
            self.context
                .collab
                .rooms
                .submit_vote(&self.room_id, member_id, point)
                .await
                .map(|_| ()),
        );
    }

    async fn handle_close(&self) {
        self.context.gateway.unregister(&self.id);

        if self.member_id.is_some() {
            if let Err(error) = self
                .context
                .collab
                .rooms
                .disconnect(&self.room_id, &self.id)
                .await
            {
                debug!("Disconnect cleanup for room {} failed: {error}", self.room_id);
            }
        }
    }

    /// Successful operations are observed through the room broadcast; only
    /// failures go back to the initiating socket
    fn report(&self, result: Result<(), RoomError>) {
        if let Err(error) = result {
            self.send_error(error);
        }
    }

    fn send_error(&self, error: RoomError) {
        self.send(ServerEvent::RoomError {
            reason: error.to_string(),
        })
    }

    fn send(&self, event: ServerEvent) {
        let text = serde_json::to_string(&event).expect("serializes properly");
        let _ = self.sender.send(Message::Text(text));
    }
}
