//! One linear gate run
//!
//! preflight -> reset to baseline -> inject launch text -> await the
//! operator's checklist decision -> assemble evidence -> validate ->
//! exit code. Strictly sequential; every stage blocks on the control
//! plane or the filesystem.

use chrono::{SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use vmgate_common::{
    digest, Endpoint, Error, EvidenceManifest, GateDecision, ManifestArtifact, ManifestRun,
    ManifestVm, Result,
};

use crate::control::ControlPlane;
use crate::evidence::{self, EvidenceSchema};
use crate::keystroke;
use crate::lifecycle::SnapshotLifecycle;
use crate::preflight;

/// Everything one gate run needs, resolved from CLI flags
#[derive(Debug, Clone)]
pub struct GateRunConfig {
    pub domain: String,
    pub snapshot: String,
    /// Optional "host:port" display endpoint, validated before any
    /// external call.
    pub display: Option<String>,
    pub launch_text: String,
    pub press_enter: bool,
    pub key_delay_ms: i64,
    pub evidence_dir: PathBuf,
    pub schema_path: Option<PathBuf>,
    /// Screen recording produced by the operator's capture tooling.
    pub artifact: PathBuf,
    /// Checklist document filled in by the operator during the run.
    pub checklist: PathBuf,
    pub commit: String,
    pub operator: String,
    pub platform: String,
    pub image_id: String,
    pub windows_version: String,
    pub meminfo_path: PathBuf,
    pub firmware_dirs: Vec<PathBuf>,
    pub min_available_kib: u64,
    pub decision_timeout: Duration,
    pub decision_poll: Duration,
}

/// Poll the checklist document until it carries a non-Unknown final
/// decision, or the bounded wait expires.
pub fn wait_for_decision(
    checklist: &Path,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(String, GateDecision)> {
    let deadline = Instant::now() + timeout;
    loop {
        if checklist.is_file() {
            let text = fs::read_to_string(checklist)?;
            let decision = evidence::final_decision(&text);
            if decision != GateDecision::Unknown {
                info!("checklist decision recorded: {}", decision);
                return Ok((text, decision));
            }
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(poll_interval);
    }
}

/// Assemble the evidence manifest for this run.
pub fn build_manifest(
    cfg: &GateRunConfig,
    artifact_file: &str,
    artifact_sha256: String,
    checklist_file: &str,
) -> EvidenceManifest {
    EvidenceManifest {
        schema_version: 1,
        vm: ManifestVm {
            platform: cfg.platform.clone(),
            image_id: cfg.image_id.clone(),
            snapshot: cfg.snapshot.clone(),
            windows_version: cfg.windows_version.clone(),
        },
        artifact: ManifestArtifact {
            file: artifact_file.to_string(),
            sha256: artifact_sha256,
        },
        run: ManifestRun {
            timestamp_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            commit: cfg.commit.clone(),
            operator: cfg.operator.clone(),
            checklist: checklist_file.to_string(),
        },
    }
}

/// Execute the full gate sequence and return the process exit code
/// (0 pass, 1 fail); operational errors propagate to the caller.
pub fn run_gate<C: ControlPlane>(control: &C, cfg: &GateRunConfig) -> Result<i32> {
    // Configuration checks happen before anything external runs.
    if let Some(display) = &cfg.display {
        let endpoint = Endpoint::parse(display)?;
        info!("guest display endpoint: {}", endpoint);
    }
    let schema = match &cfg.schema_path {
        Some(path) => EvidenceSchema::load(path)?,
        None => EvidenceSchema::default(),
    };
    let artifact_file = cfg
        .artifact
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            Error::InvalidConfig(format!("artifact path {:?} has no file name", cfg.artifact))
        })?
        .to_string();

    // Preflight: fail fast when the host cannot carry the run.
    let meminfo = fs::read_to_string(&cfg.meminfo_path)?;
    let caps_xml = control
        .run(&["domcapabilities"])?
        .into_result("domcapabilities")?
        .stdout;
    let report = preflight::capability_report(&meminfo, &cfg.firmware_dirs, &caps_xml)?;
    preflight::check_capabilities(&report, cfg.min_available_kib)?;
    info!(
        "preflight ok: {} KiB available, firmware {:?} (secure boot: {})",
        report.memory.available_kib, report.firmware.code, report.firmware.secure_boot
    );

    // Reset the guest to the acceptance baseline.
    let lifecycle = SnapshotLifecycle::new(control, cfg.domain.clone());
    lifecycle.reset_to_baseline(&cfg.snapshot)?;

    // Drive the application under test.
    keystroke::type_text(
        control,
        &cfg.domain,
        &cfg.launch_text,
        cfg.press_enter,
        cfg.key_delay_ms,
    )?;

    // The decision is produced by a human operator out-of-band.
    let (checklist_text, decision) =
        wait_for_decision(&cfg.checklist, cfg.decision_timeout, cfg.decision_poll)?;
    info!("operator recorded {}", decision);

    // Assemble and persist the evidence.
    fs::create_dir_all(&cfg.evidence_dir)?;
    let sha256 = digest::sha256_file(&cfg.artifact)?;
    let manifest = build_manifest(cfg, &artifact_file, sha256, &schema.checklist_file);

    fs::write(
        cfg.evidence_dir.join(&schema.manifest_file),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    fs::write(cfg.evidence_dir.join(&schema.checklist_file), checklist_text)?;
    let artifact_dest = cfg.evidence_dir.join(&artifact_file);
    if artifact_dest != cfg.artifact {
        fs::copy(&cfg.artifact, &artifact_dest)?;
    }

    // The validator's verdict is the gate decision.
    let report = evidence::validate_evidence(&cfg.evidence_dir, &schema)?;
    for failure in &report.failures {
        info!("validation failure: {}", failure);
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::testing::ScriptedControl;
    use tempfile::TempDir;

    const CAPS_XML: &str = r#"
<domainCapabilities>
  <os supported='yes'>
    <loader supported='yes'>
      <enum name='secure'><value>yes</value></enum>
    </loader>
  </os>
  <devices>
    <tpm supported='yes'>
      <enum name='model'><value>tpm-crb</value></enum>
      <enum name='backendModel'><value>emulator</value></enum>
    </tpm>
  </devices>
</domainCapabilities>
"#;

    fn base_config(tmp: &TempDir) -> GateRunConfig {
        let firmware_dir = tmp.path().join("firmware");
        std::fs::create_dir_all(&firmware_dir).unwrap();
        std::fs::write(firmware_dir.join("OVMF_CODE.secboot.fd"), b"").unwrap();
        std::fs::write(firmware_dir.join("OVMF_VARS.fd"), b"").unwrap();

        let meminfo_path = tmp.path().join("meminfo");
        std::fs::write(
            &meminfo_path,
            "MemTotal: 16303824 kB\nMemAvailable: 8123456 kB\n",
        )
        .unwrap();

        let artifact = tmp.path().join("run.mp4");
        std::fs::write(&artifact, b"video bytes").unwrap();

        let checklist = tmp.path().join("CHECKLIST.md");
        std::fs::write(&checklist, "- [x] app launched\n\nFinal decision: PASS\n").unwrap();

        GateRunConfig {
            domain: "win11-gate".to_string(),
            snapshot: "baseline".to_string(),
            display: Some("127.0.0.1:5900".to_string()),
            launch_text: "app".to_string(),
            press_enter: true,
            key_delay_ms: 0,
            evidence_dir: tmp.path().join("evidence"),
            schema_path: None,
            artifact,
            checklist,
            commit: "deadbeef".to_string(),
            operator: "qa-operator".to_string(),
            platform: "kvm".to_string(),
            image_id: "win11-23h2".to_string(),
            windows_version: "23H2".to_string(),
            meminfo_path,
            firmware_dirs: vec![tmp.path().join("firmware")],
            min_available_kib: 4 * 1024 * 1024,
            decision_timeout: Duration::from_secs(1),
            decision_poll: Duration::from_millis(10),
        }
    }

    fn scripted_happy_path() -> ScriptedControl {
        ScriptedControl::new(vec![
            ScriptedControl::ok(CAPS_XML),
            ScriptedControl::ok(""),
            ScriptedControl::fail("error: Domain is already active"),
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
            ScriptedControl::ok(""),
        ])
    }

    #[test]
    fn full_run_passes_and_persists_evidence() {
        let tmp = TempDir::new().unwrap();
        let cfg = base_config(&tmp);
        // Logs are collected by external tooling; stage them up front.
        std::fs::create_dir_all(&cfg.evidence_dir).unwrap();
        for log in ["app.log", "helper.log", "ipc.log"] {
            std::fs::write(cfg.evidence_dir.join(log), b"ok\n").unwrap();
        }

        let control = scripted_happy_path();
        let code = run_gate(&control, &cfg).unwrap();
        assert_eq!(code, 0);

        let manifest: EvidenceManifest = serde_json::from_str(
            &std::fs::read_to_string(cfg.evidence_dir.join("manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.run.commit, "deadbeef");
        assert_eq!(manifest.run.operator, "qa-operator");
        assert_eq!(
            manifest.artifact.sha256,
            digest::sha256_hex(b"video bytes")
        );
        assert!(cfg.evidence_dir.join("run.mp4").is_file());
        assert!(cfg.evidence_dir.join("CHECKLIST.md").is_file());
    }

    #[test]
    fn missing_logs_fail_the_gate_with_exit_1() {
        let tmp = TempDir::new().unwrap();
        let cfg = base_config(&tmp);

        let control = scripted_happy_path();
        let code = run_gate(&control, &cfg).unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn bad_display_endpoint_fails_before_any_external_call() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = base_config(&tmp);
        cfg.display = Some("bad-endpoint".to_string());

        let control = scripted_happy_path();
        let err = run_gate(&control, &cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert!(control.calls.borrow().is_empty());
    }

    #[test]
    fn insufficient_memory_fails_preflight() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = base_config(&tmp);
        cfg.min_available_kib = 100 * 1024 * 1024;

        let control = scripted_happy_path();
        let err = run_gate(&control, &cfg).unwrap_err();
        assert!(matches!(err, Error::Preflight(_)));
        // Preflight only queried capabilities; the domain was never touched.
        assert_eq!(control.calls.borrow().len(), 1);
    }

    #[test]
    fn manifest_echoes_run_metadata() {
        let tmp = TempDir::new().unwrap();
        let cfg = base_config(&tmp);
        let sha = digest::sha256_hex(b"video bytes");
        let manifest = build_manifest(&cfg, "run.mp4", sha.clone(), "CHECKLIST.md");

        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.vm.snapshot, "baseline");
        assert_eq!(manifest.run.commit, "deadbeef");
        assert_eq!(manifest.run.operator, "qa-operator");
        assert_eq!(manifest.artifact.sha256, sha);
        assert!(digest::is_sha256_hex(&manifest.artifact.sha256));
        assert!(manifest.run.timestamp_utc.ends_with('Z'));
    }

    #[test]
    fn decision_wait_times_out_without_a_verdict() {
        let tmp = TempDir::new().unwrap();
        let checklist = tmp.path().join("CHECKLIST.md");
        std::fs::write(&checklist, "- [ ] still testing\n").unwrap();

        let err = wait_for_decision(
            &checklist,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn decision_wait_returns_fail_verdicts_too() {
        let tmp = TempDir::new().unwrap();
        let checklist = tmp.path().join("CHECKLIST.md");
        std::fs::write(&checklist, "Final decision: FAIL\n").unwrap();

        let (_, decision) = wait_for_decision(
            &checklist,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .unwrap();
        assert_eq!(decision, GateDecision::Fail);
    }
}
