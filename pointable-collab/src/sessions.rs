use crate::{rooms::RoomError, MemberData, RoomData};

/// How an inbound connection maps onto a room's membership.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The durable session identifier matches an existing member. The
    /// supplied name is ignored in this case.
    ExistingSession(MemberData),
    /// No session match, but the supplied name belongs to an existing
    /// member. This is the same identity joining without its durable
    /// identifier, such as from a second device.
    ExistingName(MemberData),
    /// Neither matched. A new member can be created, subject to capacity
    /// and name uniqueness.
    NewJoin(String),
    /// No session and no name. The caller must prompt for a display name
    /// before any room state is touched.
    NeedsName,
}

/// Maps inbound connections to prior room memberships.
pub struct SessionResolver;

impl SessionResolver {
    pub fn resolve(room: &RoomData, session_id: Option<&str>, name: Option<&str>) -> Resolution {
        if let Some(session_id) = session_id {
            if let Some(member) = room.members.iter().find(|m| m.session_id == session_id) {
                return Resolution::ExistingSession(member.clone());
            }
        }

        match name {
            Some(name) => match room.members.iter().find(|m| m.name == name) {
                Some(member) => Resolution::ExistingName(member.clone()),
                None => Resolution::NewJoin(name.to_string()),
            },
            None => Resolution::NeedsName,
        }
    }

    /// A connection is admin iff its presented token matches the room's
    /// stored token exactly. Re-evaluated on every privileged operation,
    /// never cached.
    pub fn authorize_admin(room: &RoomData, token: Option<&str>) -> Result<(), RoomError> {
        if token == Some(room.admin_token.as_str()) {
            Ok(())
        } else {
            Err(RoomError::Unauthorized)
        }
    }
}
