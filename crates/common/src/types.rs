//! Core types for vmgate

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::{Error, Result};

/// Domain (guest VM) power state as reported by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainState {
    Running,
    Stopping,
    ShutOff,
    Unknown,
}

impl DomainState {
    /// Map the control plane's free-form state string to a DomainState.
    ///
    /// Anything unrecognized is Unknown rather than an error; the lifecycle
    /// layer treats Unknown as "keep polling".
    pub fn from_report(text: &str) -> Self {
        match text.trim() {
            "running" => DomainState::Running,
            "in shutdown" => DomainState::Stopping,
            "shut off" => DomainState::ShutOff,
            _ => DomainState::Unknown,
        }
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainState::Running => write!(f, "running"),
            DomainState::Stopping => write!(f, "stopping"),
            DomainState::ShutOff => write!(f, "shut off"),
            DomainState::Unknown => write!(f, "unknown"),
        }
    }
}

/// A host:port pair for the guest's display/input endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parse a `"host:port"` string. Malformed input is a configuration
    /// error; nothing external has been touched yet.
    pub fn parse(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidConfig(format!("endpoint '{}' is missing ':port'", s)))?;
        if host.is_empty() {
            return Err(Error::InvalidConfig(format!("endpoint '{}' has an empty host", s)));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("endpoint '{}' has a non-numeric port", s)))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One atomic key combination submitted to the guest's input focus.
///
/// Keys are linux-codeset symbol names in press order; modifiers come
/// before the base key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    keys: Vec<String>,
}

impl KeyStroke {
    pub fn single(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
        }
    }

    pub fn shifted(key: impl Into<String>) -> Self {
        Self {
            keys: vec!["KEY_LEFTSHIFT".to_string(), key.into()],
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Final verdict recorded in a checklist document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateDecision {
    Pass,
    Fail,
    Unknown,
}

impl GateDecision {
    /// Literal token comparison; anything other than exactly "PASS" or
    /// "FAIL" is Unknown.
    pub fn from_token(token: &str) -> Self {
        match token {
            "PASS" => GateDecision::Pass,
            "FAIL" => GateDecision::Fail,
            _ => GateDecision::Unknown,
        }
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDecision::Pass => write!(f, "PASS"),
            GateDecision::Fail => write!(f, "FAIL"),
            GateDecision::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Host memory totals parsed from a meminfo document (KiB)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryReport {
    pub total_kib: u64,
    pub available_kib: u64,
}

/// A matched firmware image pair: code image plus writable vars store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwarePair {
    pub code: PathBuf,
    pub vars: PathBuf,
    /// Whether the selected code image is the secure-boot-capable build.
    pub secure_boot: bool,
}

/// Capability flags parsed from the domain capability XML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainCaps {
    pub secure_loader_supported: bool,
    pub tpm_supported: bool,
    pub tpm_models: BTreeSet<String>,
    pub tpm_backends: BTreeSet<String>,
}

/// Everything preflight learns about the host, computed fresh per run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub memory: MemoryReport,
    pub firmware: FirmwarePair,
    pub domain: DomainCaps,
}

/// VM identity section of the evidence manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVm {
    pub platform: String,
    pub image_id: String,
    pub snapshot: String,
    pub windows_version: String,
}

/// Artifact section of the evidence manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestArtifact {
    pub file: String,
    pub sha256: String,
}

/// Run metadata section of the evidence manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRun {
    pub timestamp_utc: String,
    pub commit: String,
    pub operator: String,
    pub checklist: String,
}

/// Schema-versioned record proving a gate run occurred.
///
/// Written once per run by the orchestrator; the validator only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceManifest {
    pub schema_version: u32,
    pub vm: ManifestVm,
    pub artifact: ManifestArtifact,
    pub run: ManifestRun,
}
