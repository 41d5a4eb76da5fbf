use anyhow::Result;
use log::info;
use std::{
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crate::manager::{InboxManager, Snapshot};
use crate::session::SessionStatus;

const WAIT: Duration = Duration::from_millis(500);

/// Keep an inbox alive without a terminal UI until Ctrl-C.
pub fn run_daemon(manager: &mut InboxManager) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    manager.start();
    let mut last = Watched::default();

    while running.load(Ordering::SeqCst) {
        manager.wait(WAIT);
        let snap = manager.snapshot();
        let now = Watched::from(&snap);
        if now != last {
            report(&snap);
            last = now;
        }
    }

    manager.shutdown();
    Ok(())
}

/// The parts of a snapshot worth a log line when they change.
#[derive(Debug, Default, PartialEq)]
struct Watched {
    status: Option<SessionStatus>,
    address: Option<String>,
    message_count: usize,
}

impl From<&Snapshot> for Watched {
    fn from(snap: &Snapshot) -> Self {
        Self {
            status: Some(snap.status),
            address: snap.address.clone(),
            message_count: snap.message_count,
        }
    }
}

fn report(snap: &Snapshot) {
    match (&snap.status, &snap.address) {
        (SessionStatus::Active, Some(address)) if snap.countdown.visible => info!(
            "inbox {address} active, {} left, {} message(s)",
            snap.countdown.display, snap.message_count
        ),
        (SessionStatus::Active, Some(address)) => info!(
            "inbox {address} active, no expiry, {} message(s)",
            snap.message_count
        ),
        (SessionStatus::Expired, Some(address)) => info!("inbox {address} expired"),
        (status, _) => info!("inbox {status:?}"),
    }
}
