use log::{info, warn};

use crate::domain::inbox::Domain;
use crate::error::{ApiError, InboxError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogState {
    Loading,
    Ready(Vec<Domain>),
    Failed(InboxError),
}

/// Known mail domains and whether any of them can host a new inbox.
#[derive(Debug, Clone)]
pub struct DomainCatalog {
    state: CatalogState,
}

impl DomainCatalog {
    pub fn new() -> Self {
        Self {
            state: CatalogState::Loading,
        }
    }

    pub fn state(&self) -> &CatalogState {
        &self.state
    }

    pub fn begin_load(&mut self) {
        self.state = CatalogState::Loading;
    }

    pub fn finish_load(&mut self, result: Result<Vec<Domain>, ApiError>) {
        self.state = match result {
            Ok(domains) => {
                info!(
                    "loaded {} domains ({} eligible)",
                    domains.len(),
                    domains.iter().filter(|d| d.is_eligible()).count()
                );
                CatalogState::Ready(domains)
            }
            Err(e) => {
                warn!("domain fetch failed: {e}");
                CatalogState::Failed(InboxError::DomainFetch(e))
            }
        };
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, CatalogState::Loading)
    }

    pub fn error(&self) -> Option<&InboxError> {
        match &self.state {
            CatalogState::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn all(&self) -> &[Domain] {
        match &self.state {
            CatalogState::Ready(domains) => domains,
            _ => &[],
        }
    }

    pub fn eligible(&self) -> impl Iterator<Item = &Domain> {
        self.all().iter().filter(|d| d.is_eligible())
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible().count()
    }

    /// Loaded without error and at least one domain can host an inbox.
    pub fn can_provision(&self) -> bool {
        matches!(self.state, CatalogState::Ready(_)) && self.eligible_count() > 0
    }

    /// Loaded fine, but nothing usable: a reported condition, not an error.
    pub fn has_no_eligible(&self) -> bool {
        matches!(self.state, CatalogState::Ready(_)) && self.eligible_count() == 0
    }

    pub fn is_eligible_name(&self, name: &str) -> bool {
        self.eligible().any(|d| d.name.eq_ignore_ascii_case(name))
    }
}

impl Default for DomainCatalog {
    fn default() -> Self {
        Self::new()
    }
}
