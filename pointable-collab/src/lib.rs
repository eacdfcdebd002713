mod config;
mod events;
mod rooms;
mod sessions;
mod store;
mod util;

use std::sync::Arc;

use crossbeam::channel::unbounded;
use dashmap::DashMap;
use tokio::sync::Mutex;

pub use config::*;
pub use events::*;
pub use rooms::*;
pub use sessions::*;
pub use store::*;
pub use util::random_string;

/// The pointable collab system, facilitating room lifecycle, session
/// resolution, and realtime synchronization.
pub struct Collab {
    event_receiver: EventReceiver,

    pub rooms: RoomManager,
}

/// A type passed to various components of the collab system, to access the
/// store, emit events, and coordinate per-room locking.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Config,
    pub store: SharedStore,

    event_sender: EventSender,
    /// One lock per room; every logical operation mutating a room holds it
    /// from first read to final event emit
    room_locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl Collab {
    pub fn new<S>(store: S, config: Config) -> Self
    where
        S: RoomStore + 'static,
    {
        let (event_sender, event_receiver) = unbounded();

        let context = CollabContext {
            config,
            store: Arc::new(store),
            event_sender,
            room_locks: Default::default(),
        };

        let rooms = RoomManager::new(&context);

        Self {
            event_receiver,
            rooms,
        }
    }

    /// Blocks until the next event is emitted
    pub fn wait_for_event(&self) -> CollabEvent {
        self.event_receiver
            .recv()
            .expect("event is received without error")
    }

    /// Returns the next event if one is already queued
    pub fn try_next_event(&self) -> Option<CollabEvent> {
        self.event_receiver.try_recv().ok()
    }
}

impl CollabContext {
    pub(crate) fn emit(&self, event: CollabEvent) {
        self.event_sender.send(event).expect("event is sent");
    }

    pub(crate) fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(room_id.to_string())
            .or_default()
            .clone()
    }

    pub(crate) fn remove_room_lock(&self, room_id: &str) {
        self.room_locks.remove(room_id);
    }
}
