//! Inbox session state machine.
//!
//! The controller owns the single account slot. Every change to that slot
//! bumps the session generation; results of backend calls issued under an
//! older generation are stale and must be dropped by the caller.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::catalog::DomainCatalog;
use crate::domain::inbox::Account;
use crate::error::{ApiError, InboxError};

pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Provisioning,
    Active,
    Expired,
}

/// Proof that a create call was started; handed back with its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateTicket {
    generation: Generation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirySource {
    Server,
    LocalTimer,
}

#[derive(Debug, Default)]
pub struct SessionController {
    account: Option<Account>,
    generation: Generation,
    creating: bool,
    /// Set by events that may warrant a new inbox, spent by a creation.
    provision_armed: bool,
    deletes_in_flight: usize,
    expired: Option<ExpirySource>,
    last_error: Option<InboxError>,
}

impl SessionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        match (&self.account, self.expired) {
            (None, _) if self.creating => SessionStatus::Provisioning,
            (None, _) => SessionStatus::Unauthenticated,
            (Some(_), Some(_)) => SessionStatus::Expired,
            (Some(_), None) => SessionStatus::Active,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.account.is_some()
    }

    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_creating(&self) -> bool {
        self.creating
    }

    pub fn is_deleting(&self) -> bool {
        self.deletes_in_flight > 0
    }

    pub fn expired_by(&self) -> Option<ExpirySource> {
        self.account.as_ref().and(self.expired)
    }

    pub fn last_error(&self) -> Option<&InboxError> {
        self.last_error.as_ref()
    }

    /// A domain list arrived or the inbox was torn down: allow one more
    /// automatic creation.
    pub fn arm_auto_provision(&mut self) {
        self.provision_armed = true;
    }

    /// Whether a fresh inbox should be created without user action.
    pub fn should_auto_provision(&self, catalog: &DomainCatalog) -> bool {
        self.provision_armed
            && !self.is_authenticated()
            && !self.creating
            && !self.is_deleting()
            && catalog.can_provision()
    }

    /// Pick the domain to ask for: the preferred one when it is usable,
    /// otherwise leave the choice to the server.
    pub fn choose_domain(catalog: &DomainCatalog, preferred: Option<&str>) -> Option<String> {
        preferred
            .filter(|name| catalog.is_eligible_name(name))
            .map(str::to_string)
    }

    /// `Unauthenticated -> Provisioning`. Returns `None` if an inbox exists or
    /// a creation is already in flight.
    pub fn begin_provisioning(&mut self) -> Option<CreateTicket> {
        if self.is_authenticated() || self.creating {
            debug!("provisioning skipped (authenticated or already creating)");
            return None;
        }
        self.creating = true;
        self.provision_armed = false;
        info!("creating inbox");
        Some(CreateTicket {
            generation: self.generation,
        })
    }

    /// `Provisioning -> Active` or back to `Unauthenticated`. Returns false when
    /// the ticket belongs to a session that no longer exists.
    pub fn finish_provisioning(
        &mut self,
        ticket: CreateTicket,
        result: Result<Account, ApiError>,
    ) -> bool {
        if ticket.generation != self.generation || !self.creating {
            debug!("discarding stale create result");
            return false;
        }
        self.creating = false;
        match result {
            Ok(account) => {
                info!("inbox {} ready as {}", account.id, account.address);
                self.install(account);
            }
            Err(e) => {
                warn!("inbox creation failed: {e}");
                self.last_error = Some(InboxError::InboxCreate(e));
            }
        }
        true
    }

    fn install(&mut self, account: Account) {
        self.account = Some(account);
        self.expired = None;
        self.last_error = None;
        self.generation += 1;
    }

    /// `Active -> Expired`. Only the first source is kept.
    pub fn mark_expired(&mut self, generation: Generation, source: ExpirySource) -> bool {
        if generation != self.generation || self.account.is_none() || self.expired.is_some() {
            return false;
        }
        info!("inbox expired ({source:?})");
        self.expired = Some(source);
        true
    }

    /// Server moved the expiry of the current inbox.
    pub fn update_expiry(
        &mut self,
        generation: Generation,
        expires_at: Option<DateTime<Utc>>,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.account.as_mut() {
            Some(account) if expires_at.is_some() && account.expires_at != expires_at => {
                debug!("expiry moved from {:?} to {:?}", account.expires_at, expires_at);
                account.expires_at = expires_at;
                true
            }
            _ => false,
        }
    }

    /// Clear the local session and hand back the account so the caller can
    /// issue the backend deletion. `None` when there is nothing to delete.
    pub fn begin_delete(&mut self) -> Option<Account> {
        let account = self.account.take()?;
        self.expired = None;
        self.generation += 1;
        self.deletes_in_flight += 1;
        self.provision_armed = true;
        info!("deleting inbox {}", account.id);
        Some(account)
    }

    pub fn finish_delete(&mut self, result: Result<(), ApiError>) -> Option<InboxError> {
        self.deletes_in_flight = self.deletes_in_flight.saturating_sub(1);
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("backend inbox deletion failed: {e}");
                let err = InboxError::InboxDelete(e);
                self.last_error = Some(err.clone());
                Some(err)
            }
        }
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Drop everything, e.g. when the owner shuts down.
    pub fn reset(&mut self) {
        self.account = None;
        self.creating = false;
        self.provision_armed = false;
        self.expired = None;
        self.generation += 1;
    }
}
