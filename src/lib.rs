pub mod api;
pub mod catalog;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod manager;
pub mod messages;
pub mod notify;
pub mod session;
pub mod terminal;
pub mod timer;
