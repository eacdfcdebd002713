mod lifecycle;
mod view;

use std::sync::Arc;

use chrono::Utc;
use log::info;
use thiserror::Error;

pub use lifecycle::*;
pub use view::*;

use crate::{
    util::random_string, CardValue, CollabContext, CollabEvent, MemberData, NewMember, NewRoom,
    PrimaryKey, Resolution, RoomData, SessionResolver, StoreError,
};

/// Validates and performs every room-mutating operation.
///
/// Each operation takes the room's lock, checks expiry first, mutates the
/// store, and emits the matching event before releasing the lock, so
/// broadcasts observe store acceptance order.
pub struct RoomManager {
    context: CollabContext,
    lifecycle: Arc<Lifecycle>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room does not exist")]
    NotFound,
    #[error("Room has expired")]
    Expired,
    #[error("Room is full")]
    Full,
    #[error("Name is already taken")]
    NameTaken,
    #[error("A display name is required to join")]
    NameRequired,
    #[error("Not a member of this room")]
    NotAMember,
    #[error("Admin token does not match")]
    Unauthorized,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RoomError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound { resource: "room", .. } => Self::NotFound,
            StoreError::NotFound { resource: "member", .. } => Self::NotAMember,
            StoreError::Conflict { resource: "member", field: "name", .. } => Self::NameTaken,
            error => Self::Store(error),
        }
    }
}

/// The outcome of a join attempt
#[derive(Debug)]
pub enum JoinOutcome {
    /// A new member was created
    Joined { member: MemberData, room: RoomView },
    /// An existing member was resolved, and any supplied connection was
    /// re-associated with it
    Reconnected { member: MemberData, room: RoomView },
    /// A display name must be supplied before anything else happens
    NameRequired,
}

/// A freshly registered room, including the only copy of the admin token
/// that ever leaves the store.
#[derive(Debug)]
pub struct CreatedRoom {
    pub room: RoomData,
    pub admin: MemberData,
}

impl RoomManager {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
            lifecycle: Lifecycle::new(context),
        }
    }

    /// Spawns the periodic expiry sweep
    pub fn run_sweep(&self) {
        self.lifecycle.run_sweep()
    }

    /// Creates a new room and pre-registers its admin as the first member,
    /// bound to the caller's durable session identifier.
    pub async fn create_room(
        &self,
        new_room: NewRoom,
        session_id: &str,
    ) -> Result<CreatedRoom, RoomError> {
        let room = self.context.store.create_room(new_room).await?;

        let admin = self
            .context
            .store
            .add_member(
                &room.id,
                NewMember {
                    name: room.admin_name.clone(),
                    session_id: session_id.to_string(),
                    connection_id: None,
                },
            )
            .await?;

        info!("Room {} created by {}", room.id, room.admin_name);

        let room = self.context.store.room_by_id(&room.id).await?;
        Ok(CreatedRoom { room, admin })
    }

    /// Resolves a join request against the room's membership.
    ///
    /// Reconnections of existing members never count against capacity and
    /// cancel any pending deletion of the room. `connection_id` is absent
    /// when a member is pre-registered over HTTP before a live connection
    /// exists; such members still count toward capacity immediately.
    pub async fn join(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        name: Option<&str>,
        connection_id: Option<&str>,
    ) -> Result<JoinOutcome, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        let name = name.filter(|n| !n.trim().is_empty());

        match SessionResolver::resolve(&room, session_id, name) {
            Resolution::ExistingSession(member) => {
                self.reconnect(&room, member, None, connection_id).await
            }
            Resolution::ExistingName(member) => {
                self.reconnect(&room, member, session_id, connection_id).await
            }
            Resolution::NewJoin(name) => {
                if room.members.len() >= self.context.config.max_members {
                    return Err(RoomError::Full);
                }

                let member = self
                    .context
                    .store
                    .add_member(
                        room_id,
                        NewMember {
                            name,
                            session_id: session_id
                                .map(str::to_string)
                                .unwrap_or_else(|| random_string(32)),
                            connection_id: connection_id.map(str::to_string),
                        },
                    )
                    .await?;

                self.lifecycle.cancel_abandonment(room_id);

                let view = self.view_of(room_id).await?;
                info!("{} joined room {room_id}", member.name);

                self.context.emit(CollabEvent::MemberJoined {
                    room_id: room_id.to_string(),
                    member_id: member.id,
                    room: view.clone(),
                });

                Ok(JoinOutcome::Joined { member, room: view })
            }
            Resolution::NeedsName => Ok(JoinOutcome::NameRequired),
        }
    }

    /// Registers a member over HTTP before any live connection exists,
    /// such as the mobile deep link flow.
    ///
    /// Unlike [RoomManager::join], a taken name is rejected here instead of
    /// being treated as a rejoin: without a matching durable session there
    /// is no identity to resume, and name uniqueness must hold ahead of the
    /// first connection.
    pub async fn pre_register(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        name: &str,
    ) -> Result<MemberData, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        let name = Some(name).filter(|n| !n.trim().is_empty());

        match SessionResolver::resolve(&room, session_id, name) {
            Resolution::ExistingSession(member) => Ok(member),
            Resolution::ExistingName(_) => Err(RoomError::NameTaken),
            Resolution::NewJoin(name) => {
                if room.members.len() >= self.context.config.max_members {
                    return Err(RoomError::Full);
                }

                let member = self
                    .context
                    .store
                    .add_member(
                        room_id,
                        NewMember {
                            name,
                            session_id: session_id
                                .map(str::to_string)
                                .unwrap_or_else(|| random_string(32)),
                            connection_id: None,
                        },
                    )
                    .await?;

                self.lifecycle.cancel_abandonment(room_id);

                let view = self.view_of(room_id).await?;
                info!("{} pre-registered in room {room_id}", member.name);

                self.context.emit(CollabEvent::MemberJoined {
                    room_id: room_id.to_string(),
                    member_id: member.id,
                    room: view,
                });

                Ok(member)
            }
            Resolution::NeedsName => Err(RoomError::NameRequired),
        }
    }

    /// An expiry-checked sanitized read
    pub async fn room_view(&self, room_id: &str) -> Result<RoomView, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        Ok(RoomView::of(&room))
    }

    pub async fn submit_vote(
        &self,
        room_id: &str,
        member_id: PrimaryKey,
        point: Option<CardValue>,
    ) -> Result<RoomView, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        self.active_room(room_id).await?;
        self.context.store.set_vote(room_id, member_id, point).await?;

        let view = self.view_of(room_id).await?;

        self.context.emit(CollabEvent::VoteUpdated {
            room_id: room_id.to_string(),
            room: view.clone(),
        });

        Ok(view)
    }

    /// Exposes all votes and the average to everyone in the room
    pub async fn reveal(
        &self,
        room_id: &str,
        admin_token: Option<&str>,
    ) -> Result<RoomView, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        SessionResolver::authorize_admin(&room, admin_token)?;

        let room = self.context.store.set_revealed(room_id, true).await?;
        let view = RoomView::of(&room);

        info!("Votes revealed in room {room_id}");

        self.context.emit(CollabEvent::VotesRevealed {
            room_id: room_id.to_string(),
            room: view.clone(),
        });

        Ok(view)
    }

    /// Starts a new round: clears every vote and hides values again
    pub async fn reset(
        &self,
        room_id: &str,
        admin_token: Option<&str>,
    ) -> Result<RoomView, RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        SessionResolver::authorize_admin(&room, admin_token)?;

        self.context.store.reset_votes(room_id).await?;
        let view = self.view_of(room_id).await?;

        info!("Votes reset in room {room_id}");

        self.context.emit(CollabEvent::VotesReset {
            room_id: room_id.to_string(),
            room: view.clone(),
        });

        Ok(view)
    }

    /// Deletes the room immediately, bypassing the grace period
    pub async fn end(&self, room_id: &str, admin_token: Option<&str>) -> Result<(), RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        let room = self.active_room(room_id).await?;
        SessionResolver::authorize_admin(&room, admin_token)?;

        self.lifecycle.end(room_id).await?;
        info!("Room {room_id} ended by its admin");

        Ok(())
    }

    /// Handles a dropped transport connection. The member is only marked
    /// disconnected; their vote state survives for reconnection. When the
    /// room has no connected members left, the grace period timer starts.
    pub async fn disconnect(&self, room_id: &str, connection_id: &str) -> Result<(), RoomError> {
        let lock = self.context.room_lock(room_id);
        let _guard = lock.lock().await;

        // A socket outliving its room is a normal shutdown order
        match self.active_room(room_id).await {
            Ok(_) => {}
            Err(RoomError::NotFound | RoomError::Expired) => return Ok(()),
            Err(error) => return Err(error),
        }

        let member = match self
            .context
            .store
            .member_by_connection(room_id, connection_id)
            .await
        {
            Ok(member) => member,
            Err(StoreError::NotFound { .. }) => return Ok(()),
            Err(error) => return Err(error.into()),
        };

        let member = self
            .context
            .store
            .update_connection(room_id, member.id, None)
            .await?;

        let view = self.view_of(room_id).await?;
        info!("{} disconnected from room {room_id}", member.name);

        self.context.emit(CollabEvent::MemberDisconnected {
            room_id: room_id.to_string(),
            member_id: member.id,
            room: view,
        });

        if self.context.store.count_connected(room_id).await? == 0 {
            self.lifecycle.schedule_abandonment(room_id);
        }

        Ok(())
    }

    /// Fetches a room, expiring and deleting it first when it is past its
    /// lifetime. Every room-touching operation goes through this. Callers
    /// hold the room's operation lock.
    async fn active_room(&self, room_id: &str) -> Result<RoomData, RoomError> {
        let room = self.context.store.room_by_id(room_id).await?;

        let age = (Utc::now() - room.created_at).to_std().unwrap_or_default();

        if age > self.context.config.room_lifetime() {
            self.lifecycle.expire(room_id).await?;
            return Err(RoomError::Expired);
        }

        Ok(room)
    }

    async fn view_of(&self, room_id: &str) -> Result<RoomView, RoomError> {
        let room = self.context.store.room_by_id(room_id).await?;
        Ok(RoomView::of(&room))
    }

    async fn reconnect(
        &self,
        room: &RoomData,
        member: MemberData,
        adopted_session: Option<&str>,
        connection_id: Option<&str>,
    ) -> Result<JoinOutcome, RoomError> {
        // Rejoin by name from another device: the new durable identifier
        // replaces the stored one so future resolves match it
        if let Some(session_id) = adopted_session {
            self.context
                .store
                .update_session(&room.id, member.id, session_id)
                .await?;
        }

        let member = match connection_id {
            Some(connection_id) => {
                self.context
                    .store
                    .update_connection(&room.id, member.id, Some(connection_id.to_string()))
                    .await?
            }
            // A pre-registration rejoin has no live connection to associate
            None => member,
        };

        self.lifecycle.cancel_abandonment(&room.id);
        let view = self.view_of(&room.id).await?;

        if connection_id.is_some() {
            info!("{} reconnected to room {}", member.name, room.id);

            self.context.emit(CollabEvent::MemberReconnected {
                room_id: room.id.clone(),
                member_id: member.id,
                room: view.clone(),
            });
        }

        Ok(JoinOutcome::Reconnected { member, room: view })
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use tokio::time::sleep;

    use super::*;
    use crate::{CardValue, Collab, Config, MemoryStore};

    fn test_config() -> Config {
        Config {
            max_members: 10,
            room_lifetime_in_seconds: 600.0,
            grace_period_in_seconds: 600.0,
            sweep_interval_in_seconds: 600.0,
        }
    }

    fn collab_with(config: Config) -> Arc<Collab> {
        Arc::new(Collab::new(MemoryStore::new(), config))
    }

    async fn create_room(collab: &Collab) -> CreatedRoom {
        collab
            .rooms
            .create_room(
                NewRoom {
                    task_title: "Estimate the login flow".to_string(),
                    task_description: String::new(),
                    admin_name: "Morgan".to_string(),
                },
                "admin-session",
            )
            .await
            .unwrap()
    }

    async fn join_new(collab: &Collab, room_id: &str, name: &str) -> MemberData {
        let outcome = collab
            .rooms
            .join(room_id, None, Some(name), Some(&format!("conn-{name}")))
            .await
            .unwrap();

        match outcome {
            JoinOutcome::Joined { member, .. } => member,
            other => panic!("expected a fresh join, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_round() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();
        let token = created.room.admin_token.clone();

        let a = join_new(&collab, &room_id, "A").await;
        let b = join_new(&collab, &room_id, "B").await;
        let c = join_new(&collab, &room_id, "C").await;

        collab
            .rooms
            .submit_vote(&room_id, a.id, Some(CardValue::Number(5.0)))
            .await
            .unwrap();
        let view = collab
            .rooms
            .submit_vote(&room_id, b.id, Some(CardValue::Number(8.0)))
            .await
            .unwrap();

        // Votes are recorded but not visible yet
        assert!(view.member(a.id).unwrap().has_voted);
        assert!(view.member(a.id).unwrap().point.is_none());
        assert!(view.average.is_none());

        let view = collab.rooms.reveal(&room_id, Some(&token)).await.unwrap();
        assert!(view.revealed);
        assert_eq!(view.member(a.id).unwrap().point, Some(CardValue::Number(5.0)));
        assert_eq!(view.member(b.id).unwrap().point, Some(CardValue::Number(8.0)));
        assert!(view.member(c.id).unwrap().point.is_none());
        assert_eq!(view.average, Some(6.5), "C is excluded since unvoted");

        // Vote round-trip as seen post-reveal
        let view = collab
            .rooms
            .submit_vote(&room_id, c.id, Some(CardValue::Number(5.0)))
            .await
            .unwrap();
        assert_eq!(view.member(c.id).unwrap().point, Some(CardValue::Number(5.0)));

        let view = collab.rooms.reset(&room_id, Some(&token)).await.unwrap();
        let again = collab.rooms.reset(&room_id, Some(&token)).await.unwrap();

        for view in [view, again] {
            assert!(!view.revealed);
            assert!(view.average.is_none());
            assert!(view.members.iter().all(|m| !m.has_voted));
        }
    }

    #[tokio::test]
    async fn test_name_rejoin_is_same_identity() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;

        let member = join_new(&collab, &created.room.id, "Sam").await;

        // Joining over the realtime channel with a known name but a foreign
        // session is the cross-device case: same identity, not a duplicate
        let result = collab
            .rooms
            .join(
                &created.room.id,
                Some("other-device"),
                Some("Sam"),
                Some("other-conn"),
            )
            .await;

        match result {
            Ok(JoinOutcome::Reconnected { member: rejoined, .. }) => {
                assert_eq!(rejoined.id, member.id)
            }
            other => panic!("expected a name rejoin, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_simultaneous_pre_registrations_with_same_name() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        // Two browsers, two sessions, one name; exactly one wins
        let first = tokio::spawn({
            let collab = collab.clone();
            let room_id = room_id.clone();
            async move {
                collab
                    .rooms
                    .pre_register(&room_id, Some("session-one"), "Sam")
                    .await
            }
        });
        let second = tokio::spawn({
            let collab = collab.clone();
            let room_id = room_id.clone();
            async move {
                collab
                    .rooms
                    .pre_register(&room_id, Some("session-two"), "Sam")
                    .await
            }
        });

        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        let winners = outcomes.iter().filter(|o| o.is_ok()).count();
        let losers = outcomes
            .iter()
            .filter(|o| matches!(o, Err(RoomError::NameTaken)))
            .count();
        assert_eq!(winners, 1, "exactly one join succeeds");
        assert_eq!(losers, 1, "the other gets the duplicate name error");

        let view = collab.rooms.room_view(&room_id).await.unwrap();
        let sams = view.members.iter().filter(|m| m.name == "Sam").count();
        assert_eq!(sams, 1, "member count increases by exactly one");
    }

    #[tokio::test]
    async fn test_pre_registration_is_idempotent_per_session() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        let first = collab
            .rooms
            .pre_register(&room_id, Some("sam-session"), "Sam")
            .await
            .unwrap();
        let second = collab
            .rooms
            .pre_register(&room_id, Some("sam-session"), "Sam")
            .await
            .unwrap();

        assert_eq!(first.id, second.id, "same session resumes the member");
    }

    #[tokio::test]
    async fn test_capacity_is_enforced() {
        let collab = collab_with(Config {
            max_members: 3,
            ..test_config()
        });
        let created = create_room(&collab).await;

        // The admin occupies the first slot
        join_new(&collab, &created.room.id, "A").await;
        join_new(&collab, &created.room.id, "B").await;

        let result = collab
            .rooms
            .join(&created.room.id, None, Some("C"), Some("conn-C"))
            .await;
        assert!(matches!(result, Err(RoomError::Full)));

        // Reconnection of an existing member never counts against capacity
        let result = collab
            .rooms
            .join(&created.room.id, None, Some("B"), Some("conn-B-2"))
            .await;
        assert!(matches!(result, Ok(JoinOutcome::Reconnected { .. })));
    }

    #[tokio::test]
    async fn test_capacity_holds_under_simultaneous_joins() {
        let collab = collab_with(Config {
            max_members: 3,
            ..test_config()
        });
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        // The admin holds one slot; five distinct names race for the
        // remaining two
        let tasks: Vec<_> = (0..5)
            .map(|n| {
                tokio::spawn({
                    let collab = collab.clone();
                    let room_id = room_id.clone();
                    async move {
                        collab
                            .rooms
                            .join(
                                &room_id,
                                None,
                                Some(&format!("Racer-{n}")),
                                Some(&format!("conn-{n}")),
                            )
                            .await
                    }
                })
            })
            .collect();

        let mut joined = 0;
        let mut full = 0;

        for task in tasks {
            match task.await.unwrap() {
                Ok(JoinOutcome::Joined { .. }) => joined += 1,
                Err(RoomError::Full) => full += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(joined, 2, "only the free slots are won");
        assert_eq!(full, 3, "everyone else is turned away");

        let view = collab.rooms.room_view(&room_id).await.unwrap();
        assert_eq!(view.members.len(), 3, "the cap holds exactly");
    }

    #[tokio::test]
    async fn test_needs_name_touches_nothing() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;

        let outcome = collab
            .rooms
            .join(&created.room.id, None, None, Some("conn-1"))
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::NameRequired));

        let outcome = collab
            .rooms
            .join(&created.room.id, None, Some("   "), Some("conn-1"))
            .await
            .unwrap();
        assert!(
            matches!(outcome, JoinOutcome::NameRequired),
            "a blank name is no name"
        );

        let view = collab.rooms.room_view(&created.room.id).await.unwrap();
        assert_eq!(view.members.len(), 1, "only the admin is registered");
    }

    #[tokio::test]
    async fn test_reconnection_preserves_vote() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        let outcome = collab
            .rooms
            .join(&room_id, Some("sam-session"), Some("Sam"), Some("conn-1"))
            .await
            .unwrap();
        let member = match outcome {
            JoinOutcome::Joined { member, .. } => member,
            other => panic!("expected a fresh join, got {other:?}"),
        };

        collab
            .rooms
            .submit_vote(&room_id, member.id, Some(CardValue::Number(5.0)))
            .await
            .unwrap();

        collab.rooms.disconnect(&room_id, "conn-1").await.unwrap();

        let view = collab.rooms.room_view(&room_id).await.unwrap();
        assert!(!view.member(member.id).unwrap().connected);
        assert!(view.member(member.id).unwrap().has_voted, "vote survives the drop");

        let outcome = collab
            .rooms
            .join(&room_id, Some("sam-session"), None, Some("conn-2"))
            .await
            .unwrap();

        match outcome {
            JoinOutcome::Reconnected { member: rejoined, .. } => {
                assert_eq!(rejoined.id, member.id, "same durable identity");
            }
            other => panic!("expected a reconnection, got {other:?}"),
        }

        let view = collab.rooms.room_view(&room_id).await.unwrap();
        assert_eq!(view.members.len(), 2, "no duplicate member");
        assert!(view.member(member.id).unwrap().connected);
        assert!(view.member(member.id).unwrap().has_voted);
    }

    #[tokio::test]
    async fn test_abandoned_room_is_deleted_after_grace() {
        let collab = collab_with(Config {
            grace_period_in_seconds: 0.05,
            ..test_config()
        });
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        join_new(&collab, &room_id, "Sam").await;
        collab.rooms.disconnect(&room_id, "conn-Sam").await.unwrap();

        sleep(Duration::from_millis(300)).await;

        let result = collab.rooms.room_view(&room_id).await;
        assert!(matches!(result, Err(RoomError::NotFound)));
    }

    #[tokio::test]
    async fn test_reconnect_cancels_pending_deletion() {
        let collab = collab_with(Config {
            grace_period_in_seconds: 0.2,
            ..test_config()
        });
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        let member = join_new(&collab, &room_id, "Sam").await;
        collab.rooms.disconnect(&room_id, "conn-Sam").await.unwrap();

        sleep(Duration::from_millis(50)).await;

        let outcome = collab
            .rooms
            .join(&room_id, Some(&member.session_id), None, Some("conn-2"))
            .await
            .unwrap();
        assert!(matches!(outcome, JoinOutcome::Reconnected { .. }));

        // Well past the original grace period
        sleep(Duration::from_millis(500)).await;

        let view = collab.rooms.room_view(&room_id).await.unwrap();
        assert_eq!(view.members.len(), 2, "the room survived");
    }

    #[tokio::test]
    async fn test_expired_room_is_deleted_on_access() {
        let collab = collab_with(Config {
            room_lifetime_in_seconds: 0.05,
            ..test_config()
        });
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        sleep(Duration::from_millis(150)).await;

        let result = collab
            .rooms
            .join(&room_id, None, Some("Late"), Some("conn-1"))
            .await;
        assert!(matches!(result, Err(RoomError::Expired)));

        // The expiry deleted the room, so the next access is a plain miss
        let result = collab.rooms.room_view(&room_id).await;
        assert!(matches!(result, Err(RoomError::NotFound)));
    }

    #[tokio::test]
    async fn test_sweep_expires_idle_rooms() {
        let collab = collab_with(Config {
            room_lifetime_in_seconds: 0.05,
            sweep_interval_in_seconds: 0.05,
            ..test_config()
        });
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        collab.rooms.run_sweep();

        // Nobody touches the room; the sweep alone must clean it up
        sleep(Duration::from_millis(400)).await;

        let result = collab.rooms.room_view(&room_id).await;
        assert!(matches!(result, Err(RoomError::NotFound)));

        let expired = drain_events(&collab)
            .into_iter()
            .any(|e| matches!(e, CollabEvent::RoomExpired { .. }));
        assert!(expired, "expiry is announced to the room channel");
    }

    #[tokio::test]
    async fn test_admin_operations_require_exact_token() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();

        for token in [None, Some("wrong-token")] {
            assert!(matches!(
                collab.rooms.reveal(&room_id, token).await,
                Err(RoomError::Unauthorized)
            ));
            assert!(matches!(
                collab.rooms.reset(&room_id, token).await,
                Err(RoomError::Unauthorized)
            ));
            assert!(matches!(
                collab.rooms.end(&room_id, token).await,
                Err(RoomError::Unauthorized)
            ));
        }

        // Nothing changed
        let view = collab.rooms.room_view(&room_id).await.unwrap();
        assert!(!view.revealed);
    }

    #[tokio::test]
    async fn test_end_deletes_immediately() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();
        let token = created.room.admin_token.clone();

        join_new(&collab, &room_id, "Sam").await;
        collab.rooms.end(&room_id, Some(&token)).await.unwrap();

        let result = collab.rooms.room_view(&room_id).await;
        assert!(matches!(result, Err(RoomError::NotFound)));

        let ended = drain_events(&collab)
            .into_iter()
            .any(|e| matches!(e, CollabEvent::RoomEnded { .. }));
        assert!(ended);
    }

    #[tokio::test]
    async fn test_vote_from_non_member_is_rejected() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;

        let result = collab
            .rooms
            .submit_vote(&created.room.id, 9999, Some(CardValue::Number(5.0)))
            .await;
        assert!(matches!(result, Err(RoomError::NotAMember)));
    }

    #[tokio::test]
    async fn test_events_follow_operation_order() {
        let collab = collab_with(test_config());
        let created = create_room(&collab).await;
        let room_id = created.room.id.clone();
        let token = created.room.admin_token.clone();

        let member = join_new(&collab, &room_id, "Sam").await;
        collab
            .rooms
            .submit_vote(&room_id, member.id, Some(CardValue::Number(5.0)))
            .await
            .unwrap();
        collab.rooms.reveal(&room_id, Some(&token)).await.unwrap();

        let events = drain_events(&collab);

        assert!(matches!(events[0], CollabEvent::MemberJoined { .. }));
        assert!(matches!(events[1], CollabEvent::VoteUpdated { .. }));
        assert!(matches!(events[2], CollabEvent::VotesRevealed { .. }));

        // The pre-reveal broadcast carries no raw value
        if let CollabEvent::VoteUpdated { room, .. } = &events[1] {
            assert!(room.member(member.id).unwrap().point.is_none());
        }
        if let CollabEvent::VotesRevealed { room, .. } = &events[2] {
            assert_eq!(
                room.member(member.id).unwrap().point,
                Some(CardValue::Number(5.0))
            );
        }
    }

    fn drain_events(collab: &Collab) -> Vec<CollabEvent> {
        let mut events = Vec::new();
        while let Some(event) = collab.try_next_event() {
            events.push(event);
        }
        events
    }
}
