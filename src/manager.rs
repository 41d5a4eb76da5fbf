//! Single-threaded coordinator for the inbox session.
//!
//! The manager owns the domain catalog, session controller, expiry timer and
//! message store. Backend calls run off the loop and come back as [`Event`]s;
//! after every event the guarded transitions in [`InboxManager::reconcile`]
//! decide what happens next.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use crate::api::{ApiResult, Backend};
use crate::catalog::{CatalogState, DomainCatalog};
use crate::clipboard;
use crate::config::Config;
use crate::domain::inbox::{Account, Domain, InboxStatus, Message, MessageId};
use crate::error::InboxError;
use crate::messages::{FetchTicket, MessageStore, MessageView, recency};
use crate::notify::{Notice, Notifier};
use crate::session::{CreateTicket, ExpirySource, Generation, SessionController, SessionStatus};
use crate::timer::{ArmOutcome, Clock, ExpiryTimer, SystemClock, TICK, TickOutcome, Tier, Ticker};

pub const EXPIRED_NOTICE: &str = "Your inbox has been deleted (timer expired).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    User,
    TimerExpired,
}

/// Results and timer ticks delivered to the loop.
#[derive(Debug)]
pub enum Event {
    DomainsLoaded(ApiResult<Vec<Domain>>),
    InboxCreated {
        ticket: CreateTicket,
        result: ApiResult<Account>,
    },
    InboxDeleted {
        reason: DeleteReason,
        result: ApiResult<()>,
    },
    InboxStatus {
        generation: Generation,
        result: ApiResult<InboxStatus>,
    },
    MessagesFetched {
        generation: Generation,
        ticket: FetchTicket,
        result: ApiResult<Value>,
    },
    MessageDeleted {
        generation: Generation,
        id: MessageId,
        result: ApiResult<()>,
    },
    Tick {
        generation: Generation,
    },
}

/// How backend calls and ticks are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Worker thread per call, background ticker thread.
    Threaded,
    /// Calls run immediately and queue their event; ticks are fed by hand.
    Inline,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub session_lifetime: Duration,
    /// Refresh messages and server state every this many ticks.
    pub poll_every_ticks: u64,
    pub preferred_domain: Option<String>,
}

impl Settings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            session_lifetime: cfg.session_lifetime(),
            poll_every_ticks: cfg.poll_interval().as_secs().max(1),
            preferred_domain: cfg.preferred_domain.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CatalogSnapshot {
    Loading,
    Failed(String),
    NoDomains,
    Ready { eligible: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Countdown {
    pub remaining_secs: u64,
    pub display: String,
    pub progress_percent: f64,
    pub tier: Tier,
    pub expired_locally: bool,
    /// Whether the countdown badge should be shown at all.
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageRow {
    pub message: Message,
    pub received: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagesSnapshot {
    Loading,
    Error(String),
    Malformed(String),
    Empty,
    Populated(Vec<MessageRow>),
}

/// Read-only state for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: SessionStatus,
    pub address: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub expired_by: Option<ExpirySource>,
    pub is_deleting: bool,
    pub catalog: CatalogSnapshot,
    pub countdown: Countdown,
    pub messages: MessagesSnapshot,
    pub message_count: usize,
    pub last_error: Option<String>,
}

pub type SelectCallback = Box<dyn FnMut(&str) + Send>;

pub struct InboxManager {
    backend: Arc<dyn Backend>,
    notifier: Box<dyn Notifier>,
    clock: Box<dyn Clock>,
    settings: Settings,
    dispatch: Dispatch,
    tx: Sender<Event>,
    rx: Receiver<Event>,

    catalog: DomainCatalog,
    session: SessionController,
    timer: ExpiryTimer,
    messages: MessageStore,

    ticker: Option<Ticker>,
    /// Generation and expiry the timer was last armed for.
    armed_for: Option<(Generation, Option<DateTime<Utc>>)>,
    ticks_since_poll: u64,
    loading_domains: bool,
    last_error: Option<InboxError>,
    on_select: Option<SelectCallback>,
}

impl InboxManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Box<dyn Notifier>,
        settings: Settings,
        dispatch: Dispatch,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            backend,
            notifier,
            clock: Box::new(SystemClock),
            timer: ExpiryTimer::new(settings.session_lifetime),
            settings,
            dispatch,
            tx,
            rx,
            catalog: DomainCatalog::new(),
            session: SessionController::new(),
            messages: MessageStore::new(),
            ticker: None,
            armed_for: None,
            ticks_since_poll: 0,
            loading_domains: false,
            last_error: None,
            on_select: None,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Register what happens when the user picks a message.
    pub fn on_message_select(&mut self, callback: SelectCallback) {
        self.on_select = Some(callback);
    }

    /// Kick off the domain fetch; everything else follows from events.
    pub fn start(&mut self) {
        self.load_domains();
    }

    /// Manual retry after a failed domain fetch.
    pub fn retry_domains(&mut self) {
        if self.loading_domains {
            return;
        }
        self.load_domains();
    }

    fn load_domains(&mut self) {
        self.loading_domains = true;
        self.catalog.begin_load();
        self.spawn(|backend| Event::DomainsLoaded(backend.list_domains()));
    }

    pub fn generation(&self) -> Generation {
        self.session.generation()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn catalog(&self) -> &DomainCatalog {
        &self.catalog
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn timer(&self) -> &ExpiryTimer {
        &self.timer
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Handle every queued event without waiting. Returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Wait up to `timeout` for an event, then drain the queue.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            // we hold a sender ourselves, so this cannot happen while alive
            Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::DomainsLoaded(result) => {
                self.loading_domains = false;
                let loaded = result.is_ok();
                self.catalog.finish_load(result);
                if loaded {
                    self.session.arm_auto_provision();
                }
            }
            Event::InboxCreated { ticket, result } => {
                let failure = result.as_ref().err().cloned();
                if self.session.finish_provisioning(ticket, result)
                    && let Some(e) = failure
                {
                    let err = InboxError::InboxCreate(e);
                    self.notify_error(&err);
                    self.last_error = Some(err);
                }
            }
            Event::InboxDeleted { reason, result } => {
                if let Some(err) = self.session.finish_delete(result) {
                    // the local session is gone either way
                    if reason == DeleteReason::TimerExpired {
                        warn!("inbox expired locally but the server did not confirm deletion");
                    }
                    self.notify_error(&err);
                    self.last_error = Some(err);
                }
            }
            Event::InboxStatus { generation, result } => self.on_status(generation, result),
            Event::MessagesFetched {
                generation,
                ticket,
                result,
            } => {
                if generation != self.session.generation() {
                    debug!("discarding messages for a torn-down session");
                    return;
                }
                for msg in self.messages.finish_fetch(ticket, result) {
                    self.notifier.new_message(&msg);
                }
            }
            Event::MessageDeleted {
                generation,
                id,
                result,
            } => {
                if generation != self.session.generation() {
                    return;
                }
                if let Some(err) = self.messages.finish_delete(&id, result) {
                    self.notify_error(&err);
                    self.last_error = Some(err);
                }
            }
            Event::Tick { generation } => self.on_tick(generation),
        }
        self.reconcile();
    }

    /// Apply every transition whose preconditions now hold.
    pub fn reconcile(&mut self) {
        if self.session.should_auto_provision(&self.catalog) {
            info!(
                "auto-creating inbox ({} eligible domains)",
                self.catalog.eligible_count()
            );
            self.create_inbox();
        } else if self.catalog.has_no_eligible() && !self.session.is_authenticated() {
            debug!("no active domains available for inbox creation");
        }

        match self.session.status() {
            SessionStatus::Active => {
                let generation = self.session.generation();
                let expires_at = self.session.account().and_then(|a| a.expires_at);
                if self.armed_for != Some((generation, expires_at)) {
                    let first_arm = self.armed_for.map(|(g, _)| g) != Some(generation);
                    self.arm(generation, expires_at);
                    if first_arm {
                        self.refetch_messages();
                    }
                }
            }
            SessionStatus::Expired => self.stop_ticker(),
            SessionStatus::Unauthenticated | SessionStatus::Provisioning => {
                self.stop_ticker();
                if self.armed_for.take().is_some() {
                    self.timer.disarm();
                }
            }
        }
    }

    fn arm(&mut self, generation: Generation, expires_at: Option<DateTime<Utc>>) {
        // re-arming always replaces the previous ticker
        self.stop_ticker();
        self.armed_for = Some((generation, expires_at));
        self.ticks_since_poll = 0;
        match self.timer.arm(expires_at, self.clock.now()) {
            ArmOutcome::Counting(secs) => {
                info!("inbox expires in {secs}s");
                self.ticker = Some(self.start_ticker(generation));
            }
            ArmOutcome::NoDeadline => {
                // keeps polling; no countdown and no expiry deletion
                info!("inbox has no expiry");
                self.ticker = Some(self.start_ticker(generation));
            }
            ArmOutcome::AlreadyExpired => {
                warn!("inbox expiry is already in the past");
                self.session
                    .mark_expired(generation, ExpirySource::LocalTimer);
            }
        }
    }

    fn start_ticker(&self, generation: Generation) -> Ticker {
        match self.dispatch {
            Dispatch::Inline => Ticker::manual(),
            Dispatch::Threaded => {
                let tx = self.tx.clone();
                Ticker::spawn(TICK, move || tx.send(Event::Tick { generation }).is_ok())
            }
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn on_tick(&mut self, generation: Generation) {
        if generation != self.session.generation()
            || self.session.status() != SessionStatus::Active
            || self.session.is_deleting()
            || !self.is_ticking()
        {
            return;
        }
        match self.timer.tick() {
            TickOutcome::Idle | TickOutcome::Counting(_) => {
                self.ticks_since_poll += 1;
                if self.ticks_since_poll >= self.settings.poll_every_ticks {
                    self.ticks_since_poll = 0;
                    self.poll();
                }
            }
            TickOutcome::Expired => {
                self.stop_ticker();
                self.session
                    .mark_expired(generation, ExpirySource::LocalTimer);
                info!("inbox timer reached zero, deleting");
                self.delete_inbox_for(DeleteReason::TimerExpired);
                self.notifier.notice(&Notice::error(EXPIRED_NOTICE));
            }
        }
    }

    fn on_status(&mut self, generation: Generation, result: ApiResult<InboxStatus>) {
        if generation != self.session.generation() {
            return;
        }
        match result {
            Ok(status) => {
                if status.is_expired {
                    if self.session.mark_expired(generation, ExpirySource::Server) {
                        self.stop_ticker();
                        self.notifier
                            .notice(&Notice::error("This inbox has expired. Please create a new one."));
                    }
                } else {
                    self.session.update_expiry(generation, status.expires_at);
                }
            }
            // polling keeps going; a single failed status check is not an error state
            Err(e) => debug!("inbox status check failed: {e}"),
        }
    }

    /// Refresh messages and check the server view of the inbox.
    fn poll(&mut self) {
        self.refetch_messages();
        let Some(account) = self.session.account().cloned() else {
            return;
        };
        let generation = self.session.generation();
        self.spawn(move |backend| Event::InboxStatus {
            generation,
            result: backend.inbox_status(&account),
        });
    }

    /// Start creating an inbox unless one exists or is being created.
    pub fn create_inbox(&mut self) {
        let Some(ticket) = self.session.begin_provisioning() else {
            return;
        };
        self.last_error = None;
        let domain =
            SessionController::choose_domain(&self.catalog, self.settings.preferred_domain.as_deref());
        self.spawn(move |backend| Event::InboxCreated {
            ticket,
            result: backend.create_inbox(domain.as_deref()),
        });
    }

    /// Tear down the current inbox. A no-op when there is none.
    pub fn delete_inbox(&mut self) {
        self.delete_inbox_for(DeleteReason::User);
    }

    fn delete_inbox_for(&mut self, reason: DeleteReason) {
        let Some(account) = self.session.begin_delete() else {
            debug!("delete requested without an inbox");
            return;
        };
        self.stop_ticker();
        self.messages.reset();
        self.spawn(move |backend| Event::InboxDeleted {
            reason,
            result: backend.delete_inbox(&account),
        });
        self.reconcile();
    }

    /// Fetch messages for the current inbox. Ignored while unauthenticated.
    pub fn refetch_messages(&mut self) {
        let Some(account) = self.session.account().cloned() else {
            return;
        };
        let generation = self.session.generation();
        let ticket = self.messages.begin_fetch();
        self.spawn(move |backend| Event::MessagesFetched {
            generation,
            ticket,
            result: backend.list_messages(&account),
        });
    }

    pub fn delete_message(&mut self, id: &str) {
        let Some(account) = self.session.account().cloned() else {
            return;
        };
        if !self.messages.begin_delete(id) {
            debug!("message {id} not in the list");
            return;
        }
        let generation = self.session.generation();
        let id = id.to_string();
        self.spawn(move |backend| {
            let result = backend.delete_message(&account, &id);
            Event::MessageDeleted {
                generation,
                id,
                result,
            }
        });
    }

    pub fn copy_to_clipboard(&mut self, text: &str) {
        match clipboard::copy(text) {
            Ok(()) => self.notifier.notice(&Notice::info("Copied to clipboard")),
            Err(e) => self.notify_error(&e),
        }
    }

    pub fn select_message(&mut self, id: &str) {
        if let Some(callback) = self.on_select.as_mut() {
            callback(id);
        }
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
        self.session.clear_error();
    }

    fn notify_error(&self, err: &InboxError) {
        self.notifier
            .notice(&Notice::error(format!("{}: {err}", err.title())));
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce(&dyn Backend) -> Event + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        match self.dispatch {
            Dispatch::Inline => {
                let _ = tx.send(job(backend.as_ref()));
            }
            Dispatch::Threaded => {
                thread::spawn(move || {
                    let _ = tx.send(job(backend.as_ref()));
                });
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let status = self.session.status();
        let now = self.clock.now();

        let catalog = match self.catalog.state() {
            CatalogState::Loading => CatalogSnapshot::Loading,
            CatalogState::Failed(e) => CatalogSnapshot::Failed(e.to_string()),
            CatalogState::Ready(_) if self.catalog.eligible_count() == 0 => {
                CatalogSnapshot::NoDomains
            }
            CatalogState::Ready(_) => CatalogSnapshot::Ready {
                eligible: self.catalog.eligible_count(),
            },
        };

        let countdown = Countdown {
            remaining_secs: self.timer.remaining_secs(),
            display: self.timer.display(),
            progress_percent: self.timer.progress_percent(),
            tier: self.timer.tier(),
            expired_locally: self.timer.has_expired_locally(),
            visible: status == SessionStatus::Active && self.timer.is_running(),
        };

        let messages = match self.messages.view() {
            MessageView::Loading => MessagesSnapshot::Loading,
            MessageView::Error(e) => MessagesSnapshot::Error(e.to_string()),
            MessageView::Malformed(kind) => MessagesSnapshot::Malformed(kind.to_string()),
            MessageView::Empty => MessagesSnapshot::Empty,
            MessageView::Populated(items) => MessagesSnapshot::Populated(
                items
                    .iter()
                    .map(|m| MessageRow {
                        message: m.clone(),
                        received: recency(m.created_at, now),
                    })
                    .collect(),
            ),
        };

        Snapshot {
            status,
            address: self.session.account().map(|a| a.address.clone()),
            expires_at: self.session.account().and_then(|a| a.expires_at),
            expired_by: self.session.expired_by(),
            is_deleting: self.session.is_deleting(),
            catalog,
            countdown,
            messages,
            message_count: self.messages.items().len(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// Cancel the ticker and forget the session, e.g. on exit.
    pub fn shutdown(&mut self) {
        self.stop_ticker();
        self.armed_for = None;
        self.timer.disarm();
        self.session.reset();
        self.messages.reset();
    }
}

impl Drop for InboxManager {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}
