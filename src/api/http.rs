use chrono::{DateTime, Utc};
use log::{debug, warn};
use rand::{Rng, distributions::Alphanumeric};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

use crate::api::{ApiResult, DomainApi, InboxApi, MessageApi};
use crate::domain::inbox::{Account, Domain, InboxStatus};
use crate::error::ApiError;

/// Collections may come bare or wrapped in a JSON-LD envelope.
const COLLECTION_KEY: &str = "hydra:member";
const LOCAL_PART_LEN: usize = 12;
const PASSWORD_LEN: usize = 20;

/// Account resource as the server returns it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResource {
    id: String,
    address: String,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    is_disabled: bool,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl From<AccountResource> for InboxStatus {
    fn from(r: AccountResource) -> Self {
        Self {
            is_expired: r.is_deleted || r.is_disabled,
            expires_at: r.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Blocking client for a mail.tm-compatible API: an inbox is an account with
/// a random address and password, and a bearer token from `/token` grants
/// access to its messages.
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(base: Url, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tempinbox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Http(format!("bad url for '{path}': {e}")))
    }

    fn authed(&self, req: RequestBuilder, account: &Account) -> RequestBuilder {
        match &account.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    fn send(&self, req: RequestBuilder) -> ApiResult<Response> {
        let resp = req.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        warn!("backend answered {status}");
        Err(ApiError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }

    fn first_open_domain(&self) -> ApiResult<String> {
        self.list_domains()?
            .into_iter()
            .find(Domain::is_eligible)
            .map(|d| d.name)
            .ok_or_else(|| ApiError::Http("no active public domain available".to_string()))
    }
}

/// Unwrap a JSON-LD collection envelope, leaving anything else untouched.
fn unwrap_collection(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key(COLLECTION_KEY) => {
            map.remove(COLLECTION_KEY).unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl DomainApi for HttpBackend {
    fn list_domains(&self) -> ApiResult<Vec<Domain>> {
        let url = self.url("domains")?;
        debug!("GET {url}");
        let value: Value = self.send(self.client.get(url))?.json()?;
        Ok(serde_json::from_value(unwrap_collection(value))?)
    }
}

impl InboxApi for HttpBackend {
    fn create_inbox(&self, domain: Option<&str>) -> ApiResult<Account> {
        let domain = match domain {
            Some(d) => d.to_string(),
            None => self.first_open_domain()?,
        };
        let address = format!(
            "{}@{domain}",
            random_alphanumeric(LOCAL_PART_LEN).to_lowercase()
        );
        let credentials = json!({
            "address": address,
            "password": random_alphanumeric(PASSWORD_LEN),
        });

        let url = self.url("accounts")?;
        debug!("POST {url} address={address}");
        let created: AccountResource = self
            .send(self.client.post(url).json(&credentials))?
            .json()?;

        let url = self.url("token")?;
        let token: TokenResponse = self
            .send(self.client.post(url).json(&credentials))?
            .json()?;

        Ok(Account {
            id: created.id,
            address: created.address,
            expires_at: created.expires_at,
            token: Some(token.token),
        })
    }

    fn inbox_status(&self, account: &Account) -> ApiResult<InboxStatus> {
        let url = self.url(&format!("accounts/{}", account.id))?;
        match self.send(self.authed(self.client.get(url), account)) {
            Ok(resp) => Ok(resp.json::<AccountResource>()?.into()),
            // the server forgets an account once it is gone
            Err(ApiError::Status { status: 404, .. }) => Ok(InboxStatus {
                is_expired: true,
                expires_at: None,
            }),
            Err(e) => Err(e),
        }
    }

    fn delete_inbox(&self, account: &Account) -> ApiResult<()> {
        let url = self.url(&format!("accounts/{}", account.id))?;
        debug!("DELETE {url}");
        self.send(self.authed(self.client.delete(url), account))?;
        Ok(())
    }
}

impl MessageApi for HttpBackend {
    fn list_messages(&self, account: &Account) -> ApiResult<Value> {
        let url = self.url("messages")?;
        let value: Value = self
            .send(self.authed(self.client.get(url), account))?
            .json()?;
        Ok(unwrap_collection(value))
    }

    fn delete_message(&self, account: &Account, message_id: &str) -> ApiResult<()> {
        let url = self.url(&format!("messages/{message_id}"))?;
        debug!("DELETE {url}");
        self.send(self.authed(self.client.delete(url), account))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwrap_collection() {
        let wrapped = json!({ "hydra:member": [1, 2], "hydra:totalItems": 2 });
        assert_eq!(unwrap_collection(wrapped), json!([1, 2]));

        let bare = json!([{ "id": "a" }]);
        assert_eq!(unwrap_collection(bare.clone()), bare);

        let other = json!({ "messages": [] });
        assert_eq!(unwrap_collection(other.clone()), other);
    }

    #[test]
    fn test_urls_join_under_base_path() {
        let backend = HttpBackend::new(
            Url::parse("http://localhost:9000/v1/").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            backend.url("messages/abc").unwrap().as_str(),
            "http://localhost:9000/v1/messages/abc"
        );
    }

    #[test]
    fn test_account_resource_to_status() {
        let live: AccountResource = serde_json::from_value(json!({
            "@id": "/accounts/a1",
            "id": "a1",
            "address": "x@mail.test",
            "quota": 40000000,
            "isDisabled": false,
            "isDeleted": false,
            "createdAt": "2024-05-01T11:00:00+00:00",
        }))
        .unwrap();
        assert_eq!(
            InboxStatus::from(live),
            InboxStatus {
                is_expired: false,
                expires_at: None
            }
        );

        let gone: AccountResource = serde_json::from_value(json!({
            "id": "a1",
            "address": "x@mail.test",
            "isDeleted": true,
        }))
        .unwrap();
        assert!(InboxStatus::from(gone).is_expired);
    }

    #[test]
    fn test_random_credentials() {
        let a = random_alphanumeric(LOCAL_PART_LEN);
        let b = random_alphanumeric(LOCAL_PART_LEN);
        assert_eq!(a.len(), LOCAL_PART_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
