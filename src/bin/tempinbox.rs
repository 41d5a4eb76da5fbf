use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use tempinbox::api::DomainApi;
use tempinbox::api::http::HttpBackend;
use tempinbox::catalog::DomainCatalog;
use tempinbox::config::{Config, load_config, load_config_from};
use tempinbox::daemon::run_daemon;
use tempinbox::manager::{Dispatch, InboxManager, Settings};
use tempinbox::notify::{DesktopNotifier, LogNotifier, Notifier};
use tempinbox::terminal::{StatusNotifier, run_tui};

#[derive(Parser)]
#[command(name = "tempinbox")]
#[command(about = "Disposable email inbox (TUI + watcher)", long_about = None)]
struct Cli {
    /// Read this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the API base URL from the config
    #[arg(long, global = true)]
    api: Option<String>,

    /// Disable desktop notifications
    #[arg(long, global = true)]
    no_notify: bool,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive inbox (default)
    Tui,

    /// Keep an inbox alive headless and log activity
    Watch,

    /// Print the domains an inbox can be created on
    Domains,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .map_err(|e| anyhow!("Configuration error: {e}"))?;
    if let Some(api) = cli.api {
        cfg.api_base_url = api;
    }
    if cli.no_notify {
        cfg.desktop_notifications = false;
    }

    let backend = Arc::new(HttpBackend::new(cfg.base_url()?, cfg.request_timeout())?);

    match cli.cmd.unwrap_or(Command::Tui) {
        Command::Domains => {
            let mut catalog = DomainCatalog::new();
            catalog.finish_load(backend.list_domains());
            if let Some(e) = catalog.error() {
                return Err(anyhow!("{e}"));
            }
            for d in catalog.eligible() {
                println!("{}", d.name);
            }
            Ok(())
        }

        Command::Watch => {
            let mut manager = manager(backend, &cfg, notifier(&cfg));
            run_daemon(&mut manager)
        }

        Command::Tui => {
            let forward = cfg.desktop_notifications.then(|| notifier(&cfg));
            let (status_notifier, line) = StatusNotifier::new(forward);
            let mut manager = manager(backend, &cfg, Box::new(status_notifier));
            run_tui(&mut manager, line)
        }
    }
}

fn notifier(cfg: &Config) -> Box<dyn Notifier> {
    if cfg.desktop_notifications {
        Box::new(DesktopNotifier::new())
    } else {
        Box::new(LogNotifier)
    }
}

fn manager(backend: Arc<HttpBackend>, cfg: &Config, notifier: Box<dyn Notifier>) -> InboxManager {
    InboxManager::new(
        backend,
        notifier,
        Settings::from_config(cfg),
        Dispatch::Threaded,
    )
}
