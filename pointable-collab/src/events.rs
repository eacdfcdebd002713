use crossbeam::channel::{Receiver, Sender};

use crate::{rooms::RoomView, PrimaryKey, RoomId};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system whenever room state changes.
///
/// Every variant carrying a [RoomView] is already sanitized: vote values
/// only appear while the room is revealed. Per room, events are emitted in
/// the order their causing operations were accepted by the store.
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A new member joined a room
    MemberJoined {
        room_id: RoomId,
        member_id: PrimaryKey,
        room: RoomView,
    },
    /// An existing member re-associated a live connection
    MemberReconnected {
        room_id: RoomId,
        member_id: PrimaryKey,
        room: RoomView,
    },
    /// A member's connection dropped. Not an error, and the member's vote
    /// state is preserved for reconnection.
    MemberDisconnected {
        room_id: RoomId,
        member_id: PrimaryKey,
        room: RoomView,
    },
    /// A member's vote changed
    VoteUpdated { room_id: RoomId, room: RoomView },
    /// The admin revealed the votes. The view carries per-member points and
    /// the average from here until the next reset.
    VotesRevealed { room_id: RoomId, room: RoomView },
    /// The admin started a new round
    VotesReset { room_id: RoomId, room: RoomView },
    /// The room outlived its lifetime and was deleted
    RoomExpired { room_id: RoomId },
    /// The room was deleted, either explicitly by the admin or through
    /// abandonment
    RoomEnded { room_id: RoomId },
}

impl CollabEvent {
    /// The room this event belongs to
    pub fn room_id(&self) -> &str {
        match self {
            Self::MemberJoined { room_id, .. }
            | Self::MemberReconnected { room_id, .. }
            | Self::MemberDisconnected { room_id, .. }
            | Self::VoteUpdated { room_id, .. }
            | Self::VotesRevealed { room_id, .. }
            | Self::VotesReset { room_id, .. }
            | Self::RoomExpired { room_id }
            | Self::RoomEnded { room_id } => room_id,
        }
    }
}
