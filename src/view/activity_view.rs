use std::io::Write;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::entity::{StreamState, TransactionRecord};
use crate::presenter::activity_presenter::ActivityFeed;
use crate::utils::{format_amount, shorten_id};

#[async_trait]
pub trait ActivityView: Send + Sync {
    async fn display_feed(&self, feed: &ActivityFeed) -> Result<()>;
    async fn display_stream_state(&self, state: &StreamState) -> Result<()>;
    async fn display_error(&self, error_message: String) -> Result<()>;
}

/// Plain-text activity rendering, stdout by default
pub struct ConsoleActivityView {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleActivityView {
    pub fn new() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("Console writer lock poisoned"))?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl Default for ConsoleActivityView {
    fn default() -> Self {
        Self::new()
    }
}

pub fn render_record(record: &TransactionRecord) -> String {
    let amount = match (&record.amount, &record.symbol) {
        (Some(amount), Some(symbol)) => format!(" {} {}", format_amount(*amount, symbol), symbol),
        (Some(amount), None) => format!(" {}", amount.normalize()),
        _ => String::new(),
    };

    format!(
        "  • {}{} | {} [{}] {}",
        record.tx_type,
        amount,
        record.status,
        shorten_id(&record.client_tx_id),
        record.timestamp.format("%Y-%m-%d %H:%M")
    )
}

pub fn render_feed(feed: &ActivityFeed) -> String {
    if feed.is_empty() && feed.hidden_stuck == 0 {
        return "No activity yet\n".to_string();
    }

    let mut text = String::new();

    if !feed.pending.is_empty() || feed.hidden_stuck > 0 {
        text.push_str(&format!("Pending ({})\n", feed.pending.len()));
        for record in &feed.pending {
            text.push_str(&render_record(record));
            text.push('\n');
        }
        if feed.hidden_stuck > 0 {
            text.push_str(&format!("  {} stuck hidden\n", feed.hidden_stuck));
        }
    }

    for section in &feed.sections {
        text.push_str(section.bucket.title());
        text.push('\n');
        for record in &section.records {
            text.push_str(&render_record(record));
            text.push('\n');
        }
    }

    text
}

#[async_trait]
impl ActivityView for ConsoleActivityView {
    async fn display_feed(&self, feed: &ActivityFeed) -> Result<()> {
        self.write(&render_feed(feed))
    }

    async fn display_stream_state(&self, state: &StreamState) -> Result<()> {
        self.write(&format!("Live updates: {}\n", state))
    }

    async fn display_error(&self, error_message: String) -> Result<()> {
        self.write(&format!("❌ {}\n", error_message))
    }
}
