use std::path::Path;

use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

use crate::monitor::{Message, MonitorError, SummaryRecord};

const DETAIL_SEPARATOR: &str = "--------------------------------------------------";

/// Most-recent `max` messages by insertion order; all of them when the
/// backlog is smaller.
pub fn select_tail(backlog: &[Message], max: usize) -> &[Message] {
    let start = backlog.len().saturating_sub(max);
    &backlog[start..]
}

/// Per-contact counts over `messages`, in first-seen contact order.
pub fn count_by_contact(messages: &[Message]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for message in messages {
        match counts.iter_mut().find(|(contact, _)| contact == &message.contact) {
            Some((_, count)) => *count += 1,
            None => counts.push((message.contact.clone(), 1)),
        }
    }
    counts
}

/// Render the textual report: generation timestamp, totals, per-contact
/// count table, then the selected messages in original insertion order.
pub fn render_report(
    selected: &[Message],
    backlog_len: usize,
    generated_at: DateTime<Local>,
) -> String {
    let mut report = format!(
        "Important message summary - {}\n",
        generated_at.format("%d/%m/%Y %H:%M")
    );
    if backlog_len > selected.len() {
        report.push_str(&format!(
            "Messages in this summary: {} (of {} accumulated since start)\n\n",
            selected.len(),
            backlog_len
        ));
    } else {
        report.push_str(&format!("Messages in this summary: {}\n\n", selected.len()));
    }

    report.push_str("Messages per contact:\n");
    for (contact, count) in count_by_contact(selected) {
        report.push_str(&format!("- {}: {} message(s)\n", contact, count));
    }

    report.push_str("\nMessage details:\n");
    for message in selected {
        report.push_str(&format!(
            "\n[{}] {}:\n{}\n{}\n",
            message.time_label, message.contact, message.text, DETAIL_SEPARATOR
        ));
    }

    report
}

/// Write the report for the backlog tail into `dir` and describe the
/// artifact. The backlog itself is left untouched.
pub fn write_summary(
    dir: &Path,
    selected: &[Message],
    backlog_len: usize,
) -> Result<SummaryRecord, MonitorError> {
    std::fs::create_dir_all(dir)?;

    let id = Uuid::new_v4();
    let generated_at = Utc::now();
    let stamp = generated_at.with_timezone(&Local).format("%Y%m%d_%H%M%S");
    let short_id = id.simple().to_string();
    let file = dir.join(format!("summary_{}_{}.txt", stamp, &short_id[..8]));

    let report = render_report(selected, backlog_len, generated_at.with_timezone(&Local));
    std::fs::write(&file, report)?;

    Ok(SummaryRecord {
        id,
        file,
        message_count: selected.len(),
        generated_at,
    })
}
