use std::{
    collections::HashMap,
    sync::{Arc, Weak},
};

use log::{error, info};
use parking_lot::Mutex;
use tokio::{
    spawn,
    task::AbortHandle,
    time::{interval, sleep, MissedTickBehavior},
};

use crate::{CollabContext, CollabEvent, RoomId, StoreError};

/// Enforces expiry and deletion-on-abandonment for all rooms.
///
/// At most one pending deletion timer exists per room, enforced by always
/// cancelling and replacing the stored handle. Cancelling a timer that has
/// already fired or was never scheduled is a no-op.
pub struct Lifecycle {
    me: Weak<Self>,
    context: CollabContext,
    deletion_timers: Mutex<HashMap<RoomId, AbortHandle>>,
}

impl Lifecycle {
    pub fn new(context: &CollabContext) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            context: context.clone(),
            deletion_timers: Default::default(),
        })
    }

    /// Spawns the periodic sweep, expiring over-age rooms even when nobody
    /// is connected. Runs for the lifetime of the process.
    pub fn run_sweep(self: &Arc<Self>) {
        let lifecycle = self.clone();

        spawn(async move {
            let mut ticks = interval(lifecycle.context.config.sweep_interval());
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;
                lifecycle.sweep().await;
            }
        });
    }

    async fn sweep(&self) {
        let max_age = self.context.config.room_lifetime();

        let expired = match self.context.store.list_expired(max_age).await {
            Ok(ids) => ids,
            Err(error) => {
                error!("Expiry sweep failed to list rooms: {error}");
                return;
            }
        };

        for room_id in expired {
            let lock = self.context.room_lock(&room_id);
            let _guard = lock.lock().await;

            // One bad room must not abort the sweep of the rest
            if let Err(error) = self.expire(&room_id).await {
                error!("Failed to expire room {room_id}: {error}");
            }
        }
    }

    /// Deletes an expired room and notifies its channel. Callers hold the
    /// room's operation lock.
    pub(crate) async fn expire(&self, room_id: &str) -> Result<(), StoreError> {
        match self.context.store.room_by_id(room_id).await {
            Ok(_) => {}
            // Someone else already deleted it between listing and locking
            Err(StoreError::NotFound { .. }) => return Ok(()),
            Err(error) => return Err(error),
        }

        self.remove(room_id).await?;
        info!("Room {room_id} expired");

        self.context.emit(CollabEvent::RoomExpired {
            room_id: room_id.to_string(),
        });

        Ok(())
    }

    /// Deletes a room immediately, notifying its channel. Used for both the
    /// explicit admin end and abandonment.
    pub(crate) async fn end(&self, room_id: &str) -> Result<(), StoreError> {
        self.remove(room_id).await?;

        self.context.emit(CollabEvent::RoomEnded {
            room_id: room_id.to_string(),
        });

        Ok(())
    }

    /// Starts the grace period timer for a fully disconnected room,
    /// replacing any previous one.
    pub(crate) fn schedule_abandonment(&self, room_id: &str) {
        let lifecycle = self.me.upgrade().expect("lifecycle is alive");
        let grace = self.context.config.grace_period();
        let room_id = room_id.to_string();

        let task = spawn({
            let room_id = room_id.clone();

            async move {
                sleep(grace).await;
                lifecycle.finish_abandonment(&room_id).await;
            }
        });

        info!("Room {room_id} is fully disconnected, deleting in {grace:?} unless someone reconnects");

        let mut timers = self.deletion_timers.lock();

        if let Some(previous) = timers.insert(room_id, task.abort_handle()) {
            previous.abort();
        }
    }

    /// Cancels a pending deletion, if any
    pub(crate) fn cancel_abandonment(&self, room_id: &str) {
        if let Some(handle) = self.deletion_timers.lock().remove(room_id) {
            handle.abort();
        }
    }

    async fn finish_abandonment(&self, room_id: &str) {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        self.deletion_timers.lock().remove(room_id);

        // A reconnection may have won the race right before the lock
        let connected = match self.context.store.count_connected(room_id).await {
            Ok(count) => count,
            Err(_) => return,
        };

        if connected > 0 {
            return;
        }

        match self.end(room_id).await {
            Ok(()) => info!("Room {room_id} was abandoned"),
            Err(error) => error!("Failed to delete abandoned room {room_id}: {error}"),
        }
    }

    async fn remove(&self, room_id: &str) -> Result<(), StoreError> {
        self.cancel_abandonment(room_id);
        self.context.store.delete_room(room_id).await?;
        self.context.remove_room_lock(room_id);

        Ok(())
    }
}
