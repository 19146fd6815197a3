//! Evidence directory validation
//!
//! A completed gate run leaves one evidence directory behind: checklist,
//! manifest, per-category logs and a screen recording. Validation checks
//! run in order and short-circuit on the first failure; only genuine I/O
//! errors escape as errors, everything else is a pass/fail verdict.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use vmgate_common::{digest, EvidenceManifest, GateDecision, Result, EXIT_FAIL, EXIT_PASS};
use walkdir::WalkDir;

/// Declared validation policy, loadable from a JSON document.
///
/// Every field has a default so `validate` works without a schema path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSchema {
    #[serde(default = "defaults::schema_version")]
    pub schema_version: u32,
    #[serde(default = "defaults::checklist_file")]
    pub checklist_file: String,
    #[serde(default = "defaults::manifest_file")]
    pub manifest_file: String,
    /// Required log categories, matched by file-name prefix plus `.log`.
    #[serde(default = "defaults::log_categories")]
    pub log_categories: Vec<String>,
    #[serde(default = "defaults::video_extensions")]
    pub video_extensions: Vec<String>,
}

mod defaults {
    pub fn schema_version() -> u32 {
        1
    }
    pub fn checklist_file() -> String {
        "CHECKLIST.md".to_string()
    }
    pub fn manifest_file() -> String {
        "manifest.json".to_string()
    }
    pub fn log_categories() -> Vec<String> {
        ["app", "helper", "ipc"].map(String::from).to_vec()
    }
    pub fn video_extensions() -> Vec<String> {
        ["mp4", "mkv", "webm"].map(String::from).to_vec()
    }
}

impl Default for EvidenceSchema {
    fn default() -> Self {
        Self {
            schema_version: defaults::schema_version(),
            checklist_file: defaults::checklist_file(),
            manifest_file: defaults::manifest_file(),
            log_categories: defaults::log_categories(),
            video_extensions: defaults::video_extensions(),
        }
    }
}

impl EvidenceSchema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Outcome of validating one evidence directory
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub decision: GateDecision,
    pub failures: Vec<String>,
}

impl ValidationReport {
    fn pass() -> Self {
        Self {
            decision: GateDecision::Pass,
            failures: Vec::new(),
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            decision: GateDecision::Fail,
            failures: vec![reason.into()],
        }
    }

    pub fn passed(&self) -> bool {
        self.decision == GateDecision::Pass
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            EXIT_PASS
        } else {
            EXIT_FAIL
        }
    }
}

/// Extract the checklist's final decision.
///
/// The last line labelled `Final decision:` wins; the token after the
/// label is compared literally, so a lowercase `pass` does not pass.
pub fn final_decision(text: &str) -> GateDecision {
    const LABEL: &str = "final decision:";

    let mut decision = GateDecision::Unknown;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(prefix) = trimmed.get(..LABEL.len()) {
            if prefix.eq_ignore_ascii_case(LABEL) {
                decision = GateDecision::from_token(trimmed[LABEL.len()..].trim());
            }
        }
    }
    decision
}

/// Validate an evidence directory against the schema and required-file
/// policy. I/O errors propagate; non-conformance is a Fail verdict.
pub fn validate_evidence(dir: &Path, schema: &EvidenceSchema) -> Result<ValidationReport> {
    // Walking a missing or unreadable directory is a fatal error, not a
    // verdict. Only top-level files count: the manifest and checklist are
    // read from the directory root, so nothing deeper may satisfy check 1.
    let mut names: Vec<String> = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, format!("evidence walk: {}", e))
        })?;
        if entry.file_type().is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    debug!("evidence files: {:?}", names);

    // 1. Required files
    if !names.iter().any(|n| n == &schema.checklist_file) {
        return Ok(ValidationReport::fail(format!(
            "missing checklist {}",
            schema.checklist_file
        )));
    }
    if !names.iter().any(|n| n == &schema.manifest_file) {
        return Ok(ValidationReport::fail(format!(
            "missing manifest {}",
            schema.manifest_file
        )));
    }
    for category in &schema.log_categories {
        let found = names
            .iter()
            .any(|n| n.starts_with(category.as_str()) && n.ends_with(".log"));
        if !found {
            return Ok(ValidationReport::fail(format!(
                "no log file for category '{}'",
                category
            )));
        }
    }
    let has_video = names.iter().any(|n| {
        Path::new(n)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| schema.video_extensions.iter().any(|v| v == e))
            .unwrap_or(false)
    });
    if !has_video {
        return Ok(ValidationReport::fail("no video recording"));
    }

    // 2. Manifest conformance
    let manifest_text = fs::read_to_string(dir.join(&schema.manifest_file))?;
    let manifest: EvidenceManifest = match serde_json::from_str(&manifest_text) {
        Ok(m) => m,
        Err(e) => {
            return Ok(ValidationReport::fail(format!(
                "manifest does not conform to schema: {}",
                e
            )))
        }
    };
    if manifest.schema_version != schema.schema_version {
        return Ok(ValidationReport::fail(format!(
            "manifest schema_version {} != expected {}",
            manifest.schema_version, schema.schema_version
        )));
    }
    if !digest::is_sha256_hex(&manifest.artifact.sha256) {
        return Ok(ValidationReport::fail(
            "artifact.sha256 is not 64 lowercase hex characters",
        ));
    }

    // 3. Checklist decision
    let checklist_text = fs::read_to_string(dir.join(&schema.checklist_file))?;
    let decision = final_decision(&checklist_text);
    if decision != GateDecision::Pass {
        return Ok(ValidationReport::fail(format!(
            "checklist final decision is {}, not PASS",
            decision
        )));
    }

    info!("evidence directory {:?} validated: PASS", dir);
    Ok(ValidationReport::pass())
}
