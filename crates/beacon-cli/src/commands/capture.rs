//! Capture command.

use super::CliEnv;
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use beacon_sdk::Properties;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Serialize)]
struct CaptureReport {
    event: String,
    distinct_id: String,
    delivered: bool,
    pending: usize,
}

impl fmt::Display for CaptureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.delivered {
            write!(f, "Captured '{}' for {} (delivered)", self.event, self.distinct_id)
        } else {
            write!(
                f,
                "Captured '{}' for {} ({} event(s) queued for the next run)",
                self.event, self.distinct_id, self.pending
            )
        }
    }
}

/// Parse `key=value` pairs. Values that are valid JSON keep their type.
pub(crate) fn parse_props(pairs: &[String]) -> Result<Properties> {
    let mut properties = Properties::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Property '{}' is not in key=value form", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Property '{}' has an empty key", pair);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        properties.insert(key.to_string(), value);
    }
    Ok(properties)
}

/// Capture one event, then drain for at most `timeout_ms`.
pub async fn capture(
    env: &CliEnv,
    event: &str,
    distinct_id: &str,
    props: &[String],
    timeout_ms: u64,
    format: &OutputFormat,
) -> Result<()> {
    if event.trim().is_empty() {
        bail!("Event name must not be empty");
    }
    let properties = parse_props(props)?;

    let tracker = env.tracker(Some(distinct_id))?;
    tracker.capture(event, Some(properties));
    tracker.shutdown(Duration::from_millis(timeout_ms)).await;

    let pending = tracker.queue_size();
    info!(event, distinct_id, pending, "Capture finished");

    output::print(
        &CaptureReport {
            event: event.to_string(),
            distinct_id: distinct_id.to_string(),
            delivered: pending == 0,
            pending,
        },
        format,
    );
    Ok(())
}
