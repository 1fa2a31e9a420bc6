use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Domain error taxonomy. Every layer speaks these kinds; infrastructure
/// causes are logged where they are collapsed and never cross a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("internal error")]
    Internal,
    #[error("invalid password")]
    InvalidPassword,
    #[error("failed to process data")]
    FailedToProcessData,
    #[error("cursor must be a base64 string")]
    InvalidPaginationCursor,
    #[error("empty request")]
    EmptyRequest,
    #[error("failed to send notification")]
    NotificationNotSent,
    #[error("user not found")]
    UserNotFound,
    #[error("user already exists")]
    UserAlreadyExists,
    #[error("invalid user id")]
    InvalidUserId,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country_iso_code: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Insert-side user record. The password hash only exists on this path; it
/// is never read back out of the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country_iso_code: String,
    pub password_hash: String,
}

/// Full-row user update addressed by id.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    pub country_iso_code: String,
}

/// Searchable user fields. Text fields match as case-insensitive substrings,
/// the country code matches exactly (case-insensitive).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSearchFilters {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub country_iso_code: Option<String>,
}

/// Outbox event types. The string form is the wire-stable `type`
/// discriminator stored in the outbox row and sent to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    CreateUser,
    UpdateUser,
    DeleteUser,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CreateUser => "CreateUser",
            EventType::UpdateUser => "UpdateUser",
            EventType::DeleteUser => "DeleteUser",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claimed outbox row. The payload is opaque here; it was serialised by
/// the command that appended the event.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// An event to append. The id and timestamps are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_wire_stable() {
        assert_eq!(Error::Internal.to_string(), "internal error");
        assert_eq!(
            Error::InvalidPaginationCursor.to_string(),
            "cursor must be a base64 string"
        );
        assert_eq!(Error::UserAlreadyExists.to_string(), "user already exists");
    }

    #[test]
    fn event_type_round_trips_through_display() {
        for (ty, s) in [
            (EventType::CreateUser, "CreateUser"),
            (EventType::UpdateUser, "UpdateUser"),
            (EventType::DeleteUser, "DeleteUser"),
        ] {
            assert_eq!(ty.to_string(), s);
        }
    }
}
