//! Funnel snapshot input.
//!
//! Snapshots arrive as JSON in one of three shapes:
//!
//! - a list of full steps (`name`/`step`, `count`, `conversion_rate`, `drop_off_rate`)
//! - the same list wrapped as `{ "analysis": [...] }`
//! - a list of raw `{ "name", "count" }` event counts, from which rates are derived

use crate::error::SnapshotError;
use crate::models::{FunnelSnapshot, FunnelStep, RawStep};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Wrapped { analysis: Vec<FunnelStep> },
    Steps(Vec<FunnelStep>),
    Raw(Vec<RawStep>),
}

impl SnapshotFile {
    fn into_snapshot(self) -> FunnelSnapshot {
        match self {
            SnapshotFile::Wrapped { analysis } | SnapshotFile::Steps(analysis) => {
                FunnelSnapshot::new(analysis)
            }
            SnapshotFile::Raw(raw) => {
                debug!("Deriving rates from {} raw event counts", raw.len());
                FunnelSnapshot::from_counts(&raw)
            }
        }
    }
}

/// Parse and validate a snapshot from JSON text.
pub fn parse_snapshot(content: &str) -> Result<FunnelSnapshot> {
    let file: SnapshotFile = serde_json::from_str(content)
        .context("Snapshot must be a list of funnel steps, an {\"analysis\": [...]} object, or a list of {name, count} records")?;

    let snapshot = file.into_snapshot();
    if snapshot.is_empty() {
        return Err(SnapshotError::Empty.into());
    }
    snapshot.validate()?;

    Ok(snapshot)
}

/// Load a snapshot from a JSON file.
pub fn load_snapshot(path: &Path) -> Result<FunnelSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot file: {}", path.display()))?;

    let snapshot = parse_snapshot(&content)
        .with_context(|| format!("Invalid snapshot file: {}", path.display()))?;

    info!("Loaded {} funnel steps from {}", snapshot.len(), path.display());
    Ok(snapshot)
}
