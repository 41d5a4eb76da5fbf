use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::domain::inbox::{Message, MessageId};
use crate::error::{ApiError, InboxError};

/// Handed out when a fetch starts, returned with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    NotFetched,
    Malformed(String),
    Items(Vec<Message>),
}

/// What the message list should show, in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageView<'a> {
    Loading,
    Error(&'a InboxError),
    Malformed(&'a str),
    Empty,
    Populated(&'a [Message]),
}

/// Client-side cache of the inbox messages.
#[derive(Debug)]
pub struct MessageStore {
    payload: Payload,
    error: Option<InboxError>,
    next_seq: u64,
    applied_seq: u64,
    outstanding: usize,
    /// Optimistically removed, waiting for the backend: id -> (index, message)
    pending_deletes: HashMap<MessageId, (usize, Message)>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            payload: Payload::NotFetched,
            error: None,
            next_seq: 0,
            applied_seq: 0,
            outstanding: 0,
            pending_deletes: HashMap::new(),
        }
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_seq += 1;
        self.outstanding += 1;
        FetchTicket { seq: self.next_seq }
    }

    /// Apply a fetch result. Results older than one already applied are
    /// dropped. Returns the messages not present before this fetch.
    pub fn finish_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Value, ApiError>,
    ) -> Vec<Message> {
        self.outstanding = self.outstanding.saturating_sub(1);
        if ticket.seq < self.applied_seq {
            debug!("dropping fetch #{} (already showing #{})", ticket.seq, self.applied_seq);
            return Vec::new();
        }
        self.applied_seq = ticket.seq;

        let value = match result {
            Ok(v) => v,
            Err(e) => {
                warn!("message fetch failed: {e}");
                self.error = Some(InboxError::MessageFetch(e));
                return Vec::new();
            }
        };
        self.error = None;

        match parse_payload(value) {
            Ok(mut items) => {
                items.retain(|m| !self.pending_deletes.contains_key(&m.id));
                let known: HashSet<&str> = match &self.payload {
                    Payload::Items(old) => old.iter().map(|m| m.id.as_str()).collect(),
                    _ => HashSet::new(),
                };
                let fresh: Vec<Message> = items
                    .iter()
                    .filter(|m| !known.contains(m.id.as_str()))
                    .cloned()
                    .collect();
                debug!("fetched {} messages ({} new)", items.len(), fresh.len());
                self.payload = Payload::Items(items);
                fresh
            }
            Err(InboxError::MalformedPayload(detail)) => {
                warn!("malformed message payload: {detail}");
                self.payload = Payload::Malformed(detail);
                Vec::new()
            }
            Err(other) => {
                self.error = Some(other);
                Vec::new()
            }
        }
    }

    /// Remove `id` right away. `false` if no such message is shown.
    pub fn begin_delete(&mut self, id: &str) -> bool {
        let Payload::Items(items) = &mut self.payload else {
            return false;
        };
        let Some(pos) = items.iter().position(|m| m.id == id) else {
            return false;
        };
        let msg = items.remove(pos);
        self.pending_deletes.insert(msg.id.clone(), (pos, msg));
        true
    }

    /// Settle a deletion; a failed one puts the message back where it was.
    pub fn finish_delete(&mut self, id: &str, result: Result<(), ApiError>) -> Option<InboxError> {
        let (pos, msg) = self.pending_deletes.remove(id)?;
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("deleting message {id} failed, restoring it: {e}");
                if let Payload::Items(items) = &mut self.payload
                    && !items.iter().any(|m| m.id == msg.id)
                {
                    let at = pos.min(items.len());
                    items.insert(at, msg);
                }
                Some(InboxError::MessageDelete {
                    id: id.to_string(),
                    source: e,
                })
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.outstanding > 0
    }

    pub fn error(&self) -> Option<&InboxError> {
        self.error.as_ref()
    }

    pub fn items(&self) -> &[Message] {
        match &self.payload {
            Payload::Items(items) => items,
            _ => &[],
        }
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.items().iter().find(|m| m.id == id)
    }

    pub fn view(&self) -> MessageView<'_> {
        if self.is_loading() {
            return MessageView::Loading;
        }
        if let Some(e) = &self.error {
            return MessageView::Error(e);
        }
        match &self.payload {
            // nothing fetched and nothing outstanding reads as "no messages yet"
            Payload::NotFetched => MessageView::Empty,
            Payload::Malformed(detail) => MessageView::Malformed(detail),
            Payload::Items(items) if items.is_empty() => MessageView::Empty,
            Payload::Items(items) => MessageView::Populated(items),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The payload must be a JSON array of messages; anything else is malformed.
pub fn parse_payload(value: Value) -> Result<Vec<Message>, InboxError> {
    let Value::Array(entries) = value else {
        return Err(InboxError::MalformedPayload(json_kind(&value).to_string()));
    };
    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            serde_json::from_value::<Message>(entry)
                .map_err(|e| InboxError::MalformedPayload(format!("entry {i}: {e}")))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Human distance from `created_at` to `now`, e.g. "5 minutes ago".
pub fn recency(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = created_at else {
        return "Unknown time".to_string();
    };
    let secs = (now - at).num_seconds();
    let (secs, future) = if secs < 0 { (-secs, true) } else { (secs, false) };

    let minutes = (secs as f64 / 60.0).round() as i64;
    let hours = (secs as f64 / 3600.0).round() as i64;
    let days = (secs as f64 / 86_400.0).round() as i64;

    let text = if secs < 30 {
        "less than a minute".to_string()
    } else if minutes < 2 {
        "1 minute".to_string()
    } else if minutes < 45 {
        format!("{minutes} minutes")
    } else if minutes < 90 {
        "about 1 hour".to_string()
    } else if hours < 24 {
        format!("about {hours} hours")
    } else if hours < 42 {
        "1 day".to_string()
    } else if days < 30 {
        format!("{days} days")
    } else if days < 45 {
        "about 1 month".to_string()
    } else if days < 365 {
        format!("{} months", (days as f64 / 30.0).round() as i64)
    } else {
        "over a year".to_string()
    };

    if future {
        format!("in {text}")
    } else {
        format!("{text} ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::message_json;
    use chrono::TimeDelta;
    use serde_json::json;

    fn loaded(ids: &[&str]) -> MessageStore {
        let mut store = MessageStore::new();
        let t = store.begin_fetch();
        let payload = Value::Array(ids.iter().map(|id| message_json(id, "s")).collect());
        store.finish_fetch(t, Ok(payload));
        store
    }

    fn ids(store: &MessageStore) -> Vec<&str> {
        store.items().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_view_priority() {
        let mut store = MessageStore::new();
        assert_eq!(store.view(), MessageView::Empty);

        let t = store.begin_fetch();
        assert_eq!(store.view(), MessageView::Loading);
        store.finish_fetch(t, Err(ApiError::Http("timeout".into())));
        assert!(matches!(store.view(), MessageView::Error(_)));

        let t = store.begin_fetch();
        store.finish_fetch(t, Ok(json!({ "messages": [] })));
        assert_eq!(store.view(), MessageView::Malformed("object"));

        let t = store.begin_fetch();
        store.finish_fetch(t, Ok(json!([])));
        assert_eq!(store.view(), MessageView::Empty);

        let store = loaded(&["a", "b"]);
        assert!(matches!(store.view(), MessageView::Populated(items) if items.len() == 2));
    }

    #[test]
    fn test_non_sequence_payloads_are_malformed() {
        for (value, kind) in [
            (json!({ "id": "1" }), "object"),
            (json!("oops"), "string"),
            (json!(null), "null"),
            (json!(3), "number"),
        ] {
            let mut store = MessageStore::new();
            let t = store.begin_fetch();
            store.finish_fetch(t, Ok(value));
            assert_eq!(store.view(), MessageView::Malformed(kind));
            assert!(store.error().is_none());
            assert!(store.items().is_empty());
        }

        let err = parse_payload(json!([{ "id": "1" }])).unwrap_err();
        assert!(matches!(err, InboxError::MalformedPayload(d) if d.starts_with("entry 0")));
    }

    #[test]
    fn test_odd_timestamp_keeps_the_list() {
        let mut odd = message_json("b", "naive");
        odd["createdAt"] = json!("2024-05-01T11:58:00");
        let mut junk = message_json("c", "junk");
        junk["createdAt"] = json!("not a date");

        let mut store = MessageStore::new();
        let t = store.begin_fetch();
        store.finish_fetch(t, Ok(json!([message_json("a", "ok"), odd, junk])));
        assert!(matches!(store.view(), MessageView::Populated(items) if items.len() == 3));
        assert!(store.get("b").unwrap().created_at.is_some());
        assert_eq!(store.get("c").unwrap().created_at, None);
        assert_eq!(recency(store.get("c").unwrap().created_at, Utc::now()), "Unknown time");
    }

    #[test]
    fn test_latest_fetch_wins() {
        let mut store = MessageStore::new();
        let older = store.begin_fetch();
        let newer = store.begin_fetch();
        assert!(store.is_loading());

        store.finish_fetch(newer, Ok(json!([message_json("new", "s")])));
        assert!(store.is_loading());
        store.finish_fetch(older, Ok(json!([message_json("old", "s")])));
        assert!(!store.is_loading());
        assert_eq!(ids(&store), vec!["new"]);
    }

    #[test]
    fn test_reports_new_messages() {
        let mut store = loaded(&["a"]);
        let t = store.begin_fetch();
        let fresh = store.finish_fetch(
            t,
            Ok(json!([message_json("b", "s"), message_json("a", "s")])),
        );
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].id, "b");
    }

    #[test]
    fn test_delete_removes_exactly_one_and_keeps_order() {
        let mut store = loaded(&["a", "b", "c", "d"]);
        assert!(store.begin_delete("b"));
        assert_eq!(ids(&store), vec!["a", "c", "d"]);
        assert!(store.finish_delete("b", Ok(())).is_none());
        assert_eq!(ids(&store), vec!["a", "c", "d"]);

        assert!(!store.begin_delete("missing"));
        assert_eq!(ids(&store), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_failed_delete_restores_position() {
        let mut store = loaded(&["a", "b", "c"]);
        store.begin_delete("b");
        let err = store.finish_delete("b", Err(ApiError::Http("offline".into())));
        assert!(matches!(err, Some(InboxError::MessageDelete { .. })));
        assert_eq!(ids(&store), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_refresh_during_delete_does_not_resurrect() {
        let mut store = loaded(&["a", "b"]);
        store.begin_delete("a");
        let t = store.begin_fetch();
        store.finish_fetch(t, Ok(json!([message_json("a", "s"), message_json("b", "s")])));
        assert_eq!(ids(&store), vec!["b"]);
    }

    #[test]
    fn test_recency() {
        let now: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        assert_eq!(recency(None, now), "Unknown time");
        assert_eq!(recency(Some(now), now), "less than a minute ago");
        assert_eq!(
            recency(Some(now - TimeDelta::seconds(70)), now),
            "1 minute ago"
        );
        assert_eq!(
            recency(Some(now - TimeDelta::minutes(5)), now),
            "5 minutes ago"
        );
        assert_eq!(
            recency(Some(now - TimeDelta::hours(3)), now),
            "about 3 hours ago"
        );
        assert_eq!(recency(Some(now - TimeDelta::days(4)), now), "4 days ago");
        assert_eq!(
            recency(Some(now + TimeDelta::minutes(10)), now),
            "in 10 minutes"
        );
    }
}
