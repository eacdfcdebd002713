use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use pointable_collab::{random_string, NewRoom, PrimaryKey, RoomView};
use serde::Serialize;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    gateway,
    schemas::{JoinRoomSchema, NewRoomSchema, ValidatedJson},
};

/// The header carrying the caller's durable session identifier. Issued by
/// the server when absent, and only ever compared for equality.
pub const SESSION_HEADER: &str = "x-session-id";

const SESSION_ID_LENGTH: usize = 32;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisteredRoom {
    room: RoomView,
    /// The capability secret for reveal, reset, and end. Returned here and
    /// nowhere else.
    admin_token: String,
    session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinedRoom {
    member: MemberSummary,
    session_id: String,
    room: RoomView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MemberSummary {
    id: PrimaryKey,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomResponse {
    room: RoomView,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_session: Option<String>,
}

/// Creates a room and makes the caller its admin
async fn register(
    State(context): State<ServerContext>,
    headers: HeaderMap,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<RegisteredRoom>> {
    let session_id =
        session_from(&headers).unwrap_or_else(|| random_string(SESSION_ID_LENGTH));

    let created = context
        .collab
        .rooms
        .create_room(
            NewRoom {
                task_title: body.task_title,
                task_description: body.task_description,
                admin_name: body.admin_name,
            },
            &session_id,
        )
        .await?;

    let room = RoomView::of(&created.room);

    Ok(Json(RegisteredRoom {
        room,
        admin_token: created.room.admin_token,
        session_id,
    }))
}

/// The sanitized room view handed to the presentation layer
async fn room(
    State(context): State<ServerContext>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> ServerResult<Json<RoomResponse>> {
    let room = context.collab.rooms.room_view(&room_id).await?;

    Ok(Json(RoomResponse {
        room,
        user_session: session_from(&headers),
    }))
}

/// Pre-registers a member before any live connection exists
async fn join(
    State(context): State<ServerContext>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    ValidatedJson(body): ValidatedJson<JoinRoomSchema>,
) -> ServerResult<Json<JoinedRoom>> {
    let session_id = session_from(&headers);

    let member = context
        .collab
        .rooms
        .pre_register(&room_id, session_id.as_deref(), &body.name)
        .await?;

    let room = context.collab.rooms.room_view(&room_id).await?;

    Ok(Json(JoinedRoom {
        session_id: member.session_id.clone(),
        member: MemberSummary {
            id: member.id,
            name: member.name,
        },
        room,
    }))
}

fn session_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}

pub fn router() -> Router<ServerContext> {
    Router::new()
        .route("/", post(register))
        .route("/:id", get(room))
        .route("/:id/members", post(join))
        .route("/:id/gateway", get(gateway::gateway))
}
