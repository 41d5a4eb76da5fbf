//! In-memory backend for tests.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::api::{ApiResult, DomainApi, InboxApi, MessageApi};
use crate::domain::inbox::{Account, Domain, InboxStatus};
use crate::error::ApiError;

pub struct FakeBackend {
    pub domains: Mutex<ApiResult<Vec<Domain>>>,
    pub expires_at: Mutex<Option<DateTime<Utc>>>,
    pub create_error: Mutex<Option<ApiError>>,
    pub status: Mutex<ApiResult<InboxStatus>>,
    pub delete_inbox_error: Mutex<Option<ApiError>>,
    pub messages: Mutex<ApiResult<Value>>,
    pub delete_message_error: Mutex<Option<ApiError>>,

    pub domain_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub create_domains: Mutex<Vec<Option<String>>>,
    pub delete_inbox_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub deleted_messages: Mutex<Vec<String>>,
}

pub fn domain(name: &str, is_active: bool, is_private: bool) -> Domain {
    Domain {
        name: name.to_string(),
        is_active,
        is_private,
    }
}

pub fn message_json(id: &str, subject: &str) -> Value {
    json!({
        "id": id,
        "from": { "address": format!("{id}@sender.test"), "name": null },
        "subject": subject,
        "intro": "hello",
        "createdAt": "2024-05-01T11:58:00Z",
        "seen": false,
    })
}

impl FakeBackend {
    pub fn new(domains: Vec<Domain>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            domains: Mutex::new(Ok(domains)),
            expires_at: Mutex::new(expires_at),
            create_error: Mutex::new(None),
            status: Mutex::new(Ok(InboxStatus {
                is_expired: false,
                expires_at: None,
            })),
            delete_inbox_error: Mutex::new(None),
            messages: Mutex::new(Ok(json!([]))),
            delete_message_error: Mutex::new(None),
            domain_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            create_domains: Mutex::new(Vec::new()),
            delete_inbox_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            deleted_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn domain_loads(&self) -> usize {
        self.domain_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn inbox_deletes(&self) -> usize {
        self.delete_inbox_calls.load(Ordering::SeqCst)
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn set_messages(&self, value: Value) {
        *self.messages.lock().unwrap() = Ok(value);
    }
}

impl DomainApi for FakeBackend {
    fn list_domains(&self) -> ApiResult<Vec<Domain>> {
        self.domain_calls.fetch_add(1, Ordering::SeqCst);
        self.domains.lock().unwrap().clone()
    }
}

impl InboxApi for FakeBackend {
    fn create_inbox(&self, domain: Option<&str>) -> ApiResult<Account> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.create_domains
            .lock()
            .unwrap()
            .push(domain.map(str::to_string));
        if let Some(err) = self.create_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(Account {
            id: format!("inbox-{n}"),
            address: format!("user{n}@{}", domain.unwrap_or("mail.test")),
            expires_at: *self.expires_at.lock().unwrap(),
            token: Some(format!("token-{n}")),
        })
    }

    fn inbox_status(&self, _account: &Account) -> ApiResult<InboxStatus> {
        self.status.lock().unwrap().clone()
    }

    fn delete_inbox(&self, _account: &Account) -> ApiResult<()> {
        self.delete_inbox_calls.fetch_add(1, Ordering::SeqCst);
        match self.delete_inbox_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MessageApi for FakeBackend {
    fn list_messages(&self, _account: &Account) -> ApiResult<Value> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().clone()
    }

    fn delete_message(&self, _account: &Account, message_id: &str) -> ApiResult<()> {
        if let Some(err) = self.delete_message_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.deleted_messages
            .lock()
            .unwrap()
            .push(message_id.to_string());
        Ok(())
    }
}
