use serde::Serialize;

use crate::{CardValue, MemberData, PrimaryKey, RoomData};

/// A room projection safe to send to any observer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub task_title: String,
    pub task_description: String,
    pub admin_name: String,
    pub revealed: bool,
    pub members: Vec<MemberView>,
    /// The arithmetic mean of all numeric votes, rounded to one decimal
    /// place. Only present while the room is revealed and at least one
    /// numeric vote exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: PrimaryKey,
    pub name: String,
    pub connected: bool,
    pub has_voted: bool,
    /// The raw vote value. Withheld until the room is revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<CardValue>,
}

impl RoomView {
    /// Projects room data into its sanitized form. This is the only place
    /// vote visibility is decided.
    pub fn of(room: &RoomData) -> Self {
        let members = room
            .members
            .iter()
            .map(|member| MemberView::of(member, room.revealed))
            .collect();

        let average = room
            .revealed
            .then(|| average_points(&room.members))
            .flatten();

        Self {
            id: room.id.clone(),
            task_title: room.task_title.clone(),
            task_description: room.task_description.clone(),
            admin_name: room.admin_name.clone(),
            revealed: room.revealed,
            members,
            average,
        }
    }

    pub fn member(&self, member_id: PrimaryKey) -> Option<&MemberView> {
        self.members.iter().find(|m| m.id == member_id)
    }
}

impl MemberView {
    fn of(member: &MemberData, revealed: bool) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            connected: member.connected,
            has_voted: member.point.is_some(),
            point: revealed.then(|| member.point.clone()).flatten(),
        }
    }
}

/// The mean of all numeric votes, rounded to one decimal place. Labels and
/// members without a vote are excluded.
fn average_points(members: &[MemberData]) -> Option<f64> {
    let points: Vec<f64> = members
        .iter()
        .filter_map(|m| m.point.as_ref().and_then(CardValue::as_number))
        .collect();

    if points.is_empty() {
        return None;
    }

    let mean = points.iter().sum::<f64>() / points.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
