use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type InboxId = String;
pub type MessageId = String;

/// A mail domain offered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    #[serde(alias = "domain")]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_private: bool,
}

impl Domain {
    /// Usable for inbox creation.
    pub fn is_eligible(&self) -> bool {
        self.is_active && !self.is_private
    }
}

/// The provisioned inbox behind an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: InboxId,
    pub address: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Bearer token some backends hand out with the inbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Server view of an inbox, used to reconcile local expiry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxStatus {
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub from: Sender,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen: bool,
}

impl Message {
    /// Display name, then address, then a placeholder.
    pub fn sender_label(&self) -> &str {
        self.from
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(Some(self.from.address.as_str()).filter(|a| !a.is_empty()))
            .unwrap_or("Unknown sender")
    }

    pub fn subject_label(&self) -> &str {
        self.subject
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("(No subject)")
    }
}

/// RFC 3339, or a naive timestamp taken as UTC. Anything else is unknown.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::String(raw)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    Ok(["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc()))
}
