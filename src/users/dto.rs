use serde::{Serialize, Serializer};

use crate::domain::UserSearchFilters;

/// Serialized in place of the password in every outbox payload.
const REDACTED: &str = "<redacted>";

fn redact<S: Serializer>(_password: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(REDACTED)
}

/// Input for user creation. Doubles as the `CreateUser` outbox payload, so
/// its serde shape is wire-stable; the password never leaves the process.
#[derive(Debug, Clone, Serialize)]
pub struct AddUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    #[serde(serialize_with = "redact")]
    pub password: String,
    #[serde(rename = "country")]
    pub country_iso_code: String,
}

/// Input for a full (non-partial) user update. Doubles as the `UpdateUser`
/// outbox payload.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateUserRequest {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: String,
    pub email: String,
    #[serde(rename = "country")]
    pub country_iso_code: String,
}

/// The `DeleteUser` outbox payload. The capital `ID` key is the shape
/// subscribers already parse.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteUserPayload {
    #[serde(rename = "ID")]
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListUsersRequest {
    pub cursor: Option<String>,
    pub limit: i64,
    pub filters: UserSearchFilters,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_request() -> AddUserRequest {
        AddUserRequest {
            first_name: "first".into(),
            last_name: "last".into(),
            nickname: "nick".into(),
            email: "e@x.pt".into(),
            password: "Password1!".into(),
            country_iso_code: "PT".into(),
        }
    }

    #[test]
    fn create_payload_redacts_the_password() {
        let json = serde_json::to_string(&add_request()).unwrap();
        assert!(!json.contains("Password1!"));
        assert!(json.contains(r#""password":"<redacted>""#));
    }

    #[test]
    fn create_payload_uses_the_country_key() {
        let value: serde_json::Value =
            serde_json::to_value(add_request()).unwrap();
        assert_eq!(value["country"], "PT");
        assert_eq!(value["first_name"], "first");
        assert_eq!(value["nickname"], "nick");
        assert!(value.get("country_iso_code").is_none());
    }

    #[test]
    fn update_payload_carries_the_id() {
        let req = UpdateUserRequest {
            id: "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3".into(),
            first_name: "first".into(),
            last_name: "last".into(),
            nickname: "nick".into(),
            email: "e@x.pt".into(),
            country_iso_code: "PT".into(),
        };
        let value: serde_json::Value = serde_json::to_value(req).unwrap();
        assert_eq!(value["id"], "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3");
        assert_eq!(value["country"], "PT");
    }

    #[test]
    fn delete_payload_uses_the_upper_case_id_key() {
        let payload = DeleteUserPayload {
            id: "c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3".into(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(
            json,
            r#"{"ID":"c12e23f3-f5e3-41bc-aeca-9d66bd0b96a3"}"#
        );
    }
}
