//! Mismatch bundle persistence, loading, and replay classification
//! (§4.8-4.10).

pub mod loader;
pub mod replay;
pub mod writer;

use serde::{Deserialize, Serialize};

use crate::model::{RequestCase, ResponseCase};

/// `target_a.json`/`target_b.json` shape for a single-request bundle: the
/// request duplicated alongside the response so the file stands on its own,
/// mirroring the shape a chain bundle's per-step records carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleExchange {
    pub request: RequestCase,
    pub response: ResponseCase,
}

/// `metadata.json` contents: enough to reproduce the run that produced the
/// bundle and to distinguish bundles from different runs at a glance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub tool_version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub seed: Option<u64>,
    pub target_a_name: String,
    pub target_a_base_url: String,
    pub target_b_name: String,
    pub target_b_base_url: String,
    pub rule_file: Option<String>,
}

/// `summary.json`: written on completion (including interruption).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub cases_sent: u64,
    pub mismatches: u64,
    pub errors: u64,
    pub bundle_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayBundleResult {
    pub bundle_path: String,
    pub classification: replay::ReplayClassification,
}

/// `replay_summary.json`: per-bundle classification from a replay run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub results: Vec<ReplayBundleResult>,
}
