//! Domain power/snapshot state machine
//!
//! Baseline creation (shutdown, bounded wait, atomic snapshot) and
//! idempotent reset (revert, start). After a successful reset the domain
//! is running with disk/memory state identical to the named snapshot.

use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use vmgate_common::{DomainState, Error, Result};

use crate::control::ControlPlane;

/// Phrase the control plane emits when asked to start a domain that the
/// revert already left running. Matched as a case-insensitive substring
/// and deliberately not broadened; there is no structured error code for
/// this case.
const ALREADY_ACTIVE: &str = "already active";

/// Lifecycle operations bound to one named domain
pub struct SnapshotLifecycle<'a, C: ControlPlane> {
    control: &'a C,
    domain: String,
}

impl<'a, C: ControlPlane> SnapshotLifecycle<'a, C> {
    pub fn new(control: &'a C, domain: impl Into<String>) -> Self {
        Self {
            control,
            domain: domain.into(),
        }
    }

    /// Query the domain's current power state.
    pub fn state(&self) -> Result<DomainState> {
        let out = self
            .control
            .run(&["domstate", &self.domain])?
            .into_result("domstate")?;
        Ok(DomainState::from_report(&out.stdout))
    }

    /// Create the named baseline snapshot.
    ///
    /// A running domain is shut down first; the state is polled at
    /// `poll_interval` until it reaches shut off or `timeout` expires.
    /// On timeout no snapshot is attempted.
    pub fn create_baseline(
        &self,
        snapshot: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<()> {
        if self.state()? == DomainState::Running {
            info!("domain '{}' is running, requesting shutdown", self.domain);
            self.control
                .run(&["shutdown", &self.domain])?
                .into_result("shutdown")?;
            self.wait_for_shutoff(timeout, poll_interval)?;
        }

        info!(
            "domain '{}' is shut off, creating snapshot '{}'",
            self.domain, snapshot
        );
        self.control
            .run(&[
                "snapshot-create-as",
                &self.domain,
                snapshot,
                "--description",
                "vmgate acceptance baseline",
                "--atomic",
            ])?
            .into_result("snapshot-create-as")?;
        Ok(())
    }

    /// Revert to the named snapshot and make sure the domain is running.
    ///
    /// Idempotent with respect to the start request: the revert may
    /// already have left the domain active.
    pub fn reset_to_baseline(&self, snapshot: &str) -> Result<()> {
        info!(
            "reverting domain '{}' to snapshot '{}'",
            self.domain, snapshot
        );
        self.control
            .run(&["snapshot-revert", &self.domain, snapshot, "--running"])?
            .into_result("snapshot-revert")?;

        let start = self.control.run(&["start", &self.domain])?;
        if !start.success() {
            let diagnostic = start.diagnostic().to_string();
            if diagnostic.to_lowercase().contains(ALREADY_ACTIVE) {
                debug!("domain '{}' already active after revert", self.domain);
            } else {
                return Err(Error::operation("start", diagnostic));
            }
        }

        info!("domain '{}' running at baseline '{}'", self.domain, snapshot);
        Ok(())
    }

    fn wait_for_shutoff(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state()?;
            if state == DomainState::ShutOff {
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(
                    "domain '{}' still {} after {}s",
                    self.domain,
                    state,
                    timeout.as_secs()
                );
                return Err(Error::Timeout {
                    seconds: timeout.as_secs(),
                });
            }
            debug!("domain '{}' is {}, waiting", self.domain, state);
            thread::sleep(poll_interval);
        }
    }
}
