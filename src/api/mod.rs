//! Backend contracts consumed by the inbox core.

pub mod http;

#[cfg(test)]
pub mod fake;

use serde_json::Value;

use crate::domain::inbox::{Account, Domain, InboxStatus};
use crate::error::ApiError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub trait DomainApi: Send + Sync {
    fn list_domains(&self) -> ApiResult<Vec<Domain>>;
}

pub trait InboxApi: Send + Sync {
    fn create_inbox(&self, domain: Option<&str>) -> ApiResult<Account>;
    fn inbox_status(&self, account: &Account) -> ApiResult<InboxStatus>;
    fn delete_inbox(&self, account: &Account) -> ApiResult<()>;
}

pub trait MessageApi: Send + Sync {
    /// Raw payload; the message store validates its shape.
    fn list_messages(&self, account: &Account) -> ApiResult<Value>;
    fn delete_message(&self, account: &Account, message_id: &str) -> ApiResult<()>;
}

/// Everything the inbox manager talks to.
pub trait Backend: DomainApi + InboxApi + MessageApi {}

impl<T: DomainApi + InboxApi + MessageApi> Backend for T {}
