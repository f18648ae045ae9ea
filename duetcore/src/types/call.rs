use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Root under which every user's call record lives.
pub const CALLS_ROOT: &str = "calls";

/// Store path of the call record owned by `user_id`.
pub fn call_record_path(user_id: &str) -> String {
    format!("{CALLS_ROOT}/{user_id}")
}

/// Replaces every character outside `[A-Za-z0-9_]` with `_` and truncates to
/// `max_len` characters. An empty result becomes `"user"`.
pub fn sanitize_identifier(raw: &str, max_len: usize) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(max_len)
        .collect();
    if sanitized.is_empty() {
        "user".to_string()
    } else {
        sanitized
    }
}

/// Lifecycle status persisted in a [`CallRecord`].
///
/// There is no `ended` status: a removed record is the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Audio,
    Video,
}

impl CallType {
    pub fn is_video(self) -> bool {
        self == Self::Video
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown call type: {0}")]
pub struct UnknownCallType(pub String);

impl FromStr for CallType {
    type Err = UnknownCallType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(UnknownCallType(other.to_string())),
        }
    }
}

/// Opaque identifier binding both participants to the same media room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh room id for a call placed by `caller_id`.
    ///
    /// Format: `<caller>_<unix-ms>_<16 hex chars>`.
    pub fn generate(caller_id: &str) -> Self {
        use rand::RngCore;
        let mut nonce = [0u8; 8];
        rand::rng().fill_bytes(&mut nonce);
        Self(format!(
            "{}_{}_{}",
            sanitize_identifier(caller_id, 24),
            Utc::now().timestamp_millis(),
            hex::encode(nonce)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed-in user as seen by the other side of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// The per-user document describing an in-progress call.
///
/// Serialized as a flat map with the keys `status`, `callerId`, `callerName`,
/// `roomID`, `callType` and, once accepted, `acceptedAt` (epoch millis).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub status: CallStatus,
    pub caller_id: String,
    pub caller_name: String,
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
    pub call_type: CallType,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub accepted_at: Option<DateTime<Utc>>,
}

impl CallRecord {
    pub fn ringing(caller: &Participant, room_id: RoomId, call_type: CallType) -> Self {
        Self {
            status: CallStatus::Ringing,
            caller_id: caller.id.clone(),
            caller_name: caller.name.clone(),
            room_id,
            call_type,
            accepted_at: None,
        }
    }

    /// Copy of this record moved to `active` at `accepted_at`.
    pub fn accepted(&self, accepted_at: DateTime<Utc>) -> Self {
        Self {
            status: CallStatus::Active,
            accepted_at: Some(accepted_at),
            ..self.clone()
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.status == CallStatus::Ringing
    }

    pub fn is_active(&self) -> bool {
        self.status == CallStatus::Active
    }

    pub fn is_placed_by(&self, user_id: &str) -> bool {
        self.caller_id == user_id
    }

    pub fn caller(&self) -> Participant {
        Participant::new(self.caller_id.clone(), self.caller_name.clone())
    }

    pub fn to_fields(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "call record serialized to non-object {other}"
            ))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn alice() -> Participant {
        Participant::new("u1", "Alice")
    }

    #[test]
    fn test_ringing_record_fields() {
        let record = CallRecord::ringing(&alice(), RoomId::new("r1"), CallType::Video);
        let fields = record.to_fields().unwrap();

        assert_eq!(
            Value::Object(fields),
            json!({
                "status": "ringing",
                "callerId": "u1",
                "callerName": "Alice",
                "roomID": "r1",
                "callType": "video",
            })
        );
    }

    #[test]
    fn test_accepted_record_carries_timestamp() {
        let record = CallRecord::ringing(&alice(), RoomId::new("r1"), CallType::Audio);
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let active = record.accepted(at);

        assert!(active.is_active());
        assert_eq!(active.room_id, record.room_id);
        let fields = active.to_fields().unwrap();
        assert_eq!(fields["acceptedAt"], json!(1_700_000_000_123i64));
        assert_eq!(fields["status"], json!("active"));
    }

    #[test]
    fn test_from_fields_rejects_unknown_status() {
        let fields = json!({
            "status": "ended",
            "callerId": "u1",
            "callerName": "Alice",
            "roomID": "r1",
            "callType": "audio",
        });
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        assert!(CallRecord::from_fields(fields).is_err());
    }

    #[test]
    fn test_generated_room_ids_are_unique() {
        let a = RoomId::generate("u1");
        let b = RoomId::generate("u1");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("u1_"));
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("john.doe@mail.com", 32), "john_doe_mail_com");
        assert_eq!(sanitize_identifier("", 32), "user");
        assert_eq!(sanitize_identifier(&"a".repeat(40), 32).len(), 32);
    }

    #[test]
    fn test_call_type_parse() {
        assert_eq!("video".parse::<CallType>().unwrap(), CallType::Video);
        assert!("screen".parse::<CallType>().is_err());
        assert_eq!(call_record_path("u2"), "calls/u2");
    }
}
