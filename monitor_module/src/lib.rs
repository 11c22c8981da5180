pub mod browser;
pub mod classifier;
pub mod config;
pub mod connection;
pub mod service;
pub mod storage;
pub mod summary;
pub mod whatsapp_web;

mod monitor;

pub use monitor::{
    Message, Monitor, MonitorError, MonitorEvent, MonitorStatus, PollOutcome, SummaryRecord,
};
