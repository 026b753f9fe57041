//! Reads mismatch bundles back off disk for inspection and replay (§4.9).

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::comparator::ComparisonResult;
use crate::constants::{
    BUNDLE_CASE_FILE, BUNDLE_CHAIN_FILE, BUNDLE_DIFF_FILE, BUNDLE_METADATA_FILE,
    BUNDLE_TARGET_A_FILE, BUNDLE_TARGET_B_FILE, MISMATCHES_SUBDIR,
};
use crate::error::Error;
use crate::model::{ChainCase, ChainExecution, LinkSource, RequestCase, ResponseCase};

use super::{BundleMetadata, SingleExchange};

#[derive(Debug, Clone)]
pub enum LoadedBundle {
    Single {
        path: PathBuf,
        request: RequestCase,
        response_a: ResponseCase,
        response_b: ResponseCase,
        diff: ComparisonResult,
        metadata: BundleMetadata,
    },
    Chain {
        path: PathBuf,
        chain: ChainCase,
        execution_a: ChainExecution,
        execution_b: ChainExecution,
        diff: ComparisonResult,
        metadata: BundleMetadata,
    },
}

impl LoadedBundle {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Single { path, .. } | Self::Chain { path, .. } => path,
        }
    }

    #[must_use]
    pub fn diff(&self) -> &ComparisonResult {
        match self {
            Self::Single { diff, .. } | Self::Chain { diff, .. } => diff,
        }
    }
}

/// Enumerates bundle directories under `dir` (or `dir/mismatches` when that
/// subdirectory exists), sorted by name. A directory that lacks both
/// `case.json` and `chain.json` is not a bundle and is skipped.
#[must_use]
pub fn discover_bundles(dir: &Path) -> Vec<PathBuf> {
    let root = {
        let nested = dir.join(MISMATCHES_SUBDIR);
        if nested.is_dir() {
            nested
        } else {
            dir.to_path_buf()
        }
    };
    let Ok(entries) = std::fs::read_dir(&root) else {
        return Vec::new();
    };
    let mut bundles: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir() && (p.join(BUNDLE_CASE_FILE).exists() || p.join(BUNDLE_CHAIN_FILE).exists()))
        .collect();
    bundles.sort();
    bundles
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let bytes = std::fs::read(path).map_err(|e| Error::bundle_load_error(path.display(), e))?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| Error::bundle_load_error(path.display(), e))?;
    if !value.is_object() {
        return Err(Error::bundle_load_error(path.display(), "expected a JSON object"));
    }
    serde_json::from_value(value).map_err(|e| Error::bundle_load_error(path.display(), e))
}

/// Loads every file in a bundle directory, classifying it as `SINGLE` or
/// `CHAIN` by which case file is present. Any malformed file surfaces as a
/// single `Error::BundleLoad`, never an unhandled panic.
pub fn load_bundle(path: &Path) -> Result<LoadedBundle, Error> {
    let diff_path = path.join(BUNDLE_DIFF_FILE);
    if !diff_path.exists() {
        return Err(Error::bundle_missing_file(path.display(), BUNDLE_DIFF_FILE));
    }
    let diff: ComparisonResult = read_json(&diff_path)?;

    let metadata_path = path.join(BUNDLE_METADATA_FILE);
    if !metadata_path.exists() {
        return Err(Error::bundle_missing_file(path.display(), BUNDLE_METADATA_FILE));
    }
    let metadata: BundleMetadata = read_json(&metadata_path)?;

    let chain_path = path.join(BUNDLE_CHAIN_FILE);
    let case_path = path.join(BUNDLE_CASE_FILE);

    if chain_path.exists() {
        let chain: ChainCase = read_json(&chain_path)?;
        let execution_a: ChainExecution = read_json(&path.join(BUNDLE_TARGET_A_FILE))?;
        let execution_b: ChainExecution = read_json(&path.join(BUNDLE_TARGET_B_FILE))?;
        return Ok(LoadedBundle::Chain {
            path: path.to_path_buf(),
            chain,
            execution_a,
            execution_b,
            diff,
            metadata,
        });
    }

    if case_path.exists() {
        let request: RequestCase = read_json(&case_path)?;
        let exchange_a: SingleExchange = read_json(&path.join(BUNDLE_TARGET_A_FILE))?;
        let exchange_b: SingleExchange = read_json(&path.join(BUNDLE_TARGET_B_FILE))?;
        return Ok(LoadedBundle::Single {
            path: path.to_path_buf(),
            request,
            response_a: exchange_a.response,
            response_b: exchange_b.response,
            diff,
            metadata,
        });
    }

    Err(Error::bundle_missing_file(path.display(), BUNDLE_CASE_FILE))
}

/// A link field a chain step's `link_source` binds from an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkField {
    BodyPointer(String),
    HeaderRef(String),
}

/// Extracts every link field a chain's steps bind from their upstream
/// responses. `link_source` fields are already decoded (by
/// `jsonpointer::decode_link_expression` at discovery time) into a body
/// pointer or a `header/name[/index]` compound key; this just tells the two
/// shapes apart.
#[must_use]
pub fn extract_link_fields_from_chain(chain: &ChainCase) -> Vec<LinkField> {
    let mut fields = Vec::new();
    for step in &chain.steps {
        let Some(link_source) = &step.link_source else { continue };
        let decoded: Vec<&str> = match link_source {
            LinkSource::Single { field, .. } => vec![field.as_str()],
            LinkSource::Multiple { parameters, .. } => parameters.values().map(String::as_str).collect(),
        };
        for field in decoded {
            if let Some(name) = field.strip_prefix("header/") {
                fields.push(LinkField::HeaderRef(name.to_string()));
            } else {
                fields.push(LinkField::BodyPointer(field.to_string()));
            }
        }
    }
    fields
}
