use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use pointable_collab::RoomError;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Room does not exist or has expired")]
    RoomGone,
    #[error("Room is full")]
    RoomFull,
    #[error("Name is already taken")]
    NameTaken,
    #[error("A display name is required")]
    NameRequired,
    #[error("Not a member of this room")]
    NotAMember,
    #[error("Admin token does not match")]
    Unauthorized,
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

impl ServerError {
    fn as_status_code(&self) -> StatusCode {
        match self {
            Self::RoomGone => StatusCode::NOT_FOUND,
            Self::RoomFull => StatusCode::CONFLICT,
            Self::NameTaken => StatusCode::CONFLICT,
            Self::NameRequired => StatusCode::BAD_REQUEST,
            Self::NotAMember => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.as_status_code(), self.to_string()).into_response()
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::NotFound | RoomError::Expired => Self::RoomGone,
            RoomError::Full => Self::RoomFull,
            RoomError::NameTaken => Self::NameTaken,
            RoomError::NameRequired => Self::NameRequired,
            RoomError::NotAMember => Self::NotAMember,
            RoomError::Unauthorized => Self::Unauthorized,
            RoomError::Store(error) => Self::Unknown(error.to_string()),
        }
    }
}
