mod core;
mod types;

pub use self::core::Monitor;
pub use types::{
    Message, MonitorError, MonitorEvent, MonitorStatus, PollOutcome, SummaryRecord,
};

#[cfg(test)]
mod tests;
