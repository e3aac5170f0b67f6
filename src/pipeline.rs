use crate::{
    cancel::CancelToken,
    client::{BatchId, Transport},
    clock::Clock,
    config::{Config, Scenario},
    probe::{self, ProbeSummary},
    report::{self, RunReport, ScenarioResult},
    util::{hash_file, now_rfc3339},
    waiter::{CompletionWaiter, WaitOutcome},
};
use anyhow::{Context, Result, bail};
use std::path::Path;
use tracing::{info, warn};

/// Runs the configured scenarios strictly in sequence: upload, wait for
/// completion, probe read latency, record.
pub struct Harness<T: Transport, C: Clock> {
    cfg: Config,
    transport: T,
    clock: C,
    cancel: CancelToken,
}

impl<T: Transport, C: Clock> Harness<T, C> {
    pub fn new(cfg: &Config, transport: T, clock: C, cancel: CancelToken) -> Self {
        Self {
            cfg: cfg.clone(),
            transport,
            clock,
            cancel,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn check_health(&self) -> Result<()> {
        self.transport
            .health()
            .with_context(|| {
                format!("service health check failed ({})", self.cfg.server.base_url)
            })?;
        info!("service is reachable at {}", self.cfg.server.base_url);
        Ok(())
    }

    /// Health check, then every scenario. Fails only on fatal conditions;
    /// scenarios that fail or time out are simply absent from the report.
    pub fn run(&self) -> Result<RunReport> {
        self.check_health()?;

        let mut report = RunReport::new();
        for scenario in &self.cfg.scenarios {
            info!(
                "scenario {}: input={}",
                scenario.label,
                scenario.input.display()
            );
            if let Some(result) = self.run_scenario(scenario)? {
                report.insert(scenario.label.clone(), result);
            }
        }
        Ok(report)
    }

    /// [`Harness::run`], then persist the report at `out`. Nothing is written
    /// when the run fails.
    pub fn run_and_write(&self, out: &Path) -> Result<RunReport> {
        let report = self.run()?;
        report::write_report(out, &report)?;
        info!("results saved to {}", out.display());
        Ok(report)
    }

    pub fn run_scenario(&self, scenario: &Scenario) -> Result<Option<ScenarioResult>> {
        let input = scenario.input.as_path();
        if !input.exists() {
            if scenario.required {
                bail!("input file not found: {}", input.display());
            }
            warn!(
                "input file not found: {}; skipping scenario {}",
                input.display(),
                scenario.label
            );
            return Ok(None);
        }

        let input_bytes = match self.validate_input(input) {
            Ok(bytes) => bytes,
            Err(err) => return self.skip_or_fail(scenario, err),
        };
        let input_sha256 = match hash_file(input) {
            Ok(digest) => digest,
            Err(err) => return self.skip_or_fail(scenario, err),
        };

        let uploaded_at = now_rfc3339();
        info!("uploading {} ({input_bytes} bytes)", input.display());
        let accepted = match self.transport.upload(input) {
            Ok(accepted) => accepted,
            Err(err) => {
                let err = anyhow::Error::new(err)
                    .context(format!("upload failed: {}", input.display()));
                return self.skip_or_fail(scenario, err);
            }
        };
        let batch_id = accepted.batch_id;
        info!("upload accepted: batch {batch_id}");

        let waiter = CompletionWaiter::new(&self.transport, &self.clock, &self.cfg.polling);
        let done = match waiter.wait(&batch_id, &self.cancel) {
            WaitOutcome::Succeeded(done) => done,
            WaitOutcome::Failed(_) => {
                warn!("scenario {}: processing failed; no result", scenario.label);
                return Ok(None);
            }
            WaitOutcome::TimedOut { elapsed, polls } => {
                warn!(
                    "scenario {}: timed out after {:.1}s ({polls} polls); no result",
                    scenario.label,
                    elapsed.as_secs_f64()
                );
                return Ok(None);
            }
            WaitOutcome::Unreachable(err) => {
                warn!("scenario {}: lost track of batch: {err}; no result", scenario.label);
                return Ok(None);
            }
            WaitOutcome::Cancelled => bail!("interrupted while waiting for batch {batch_id}"),
        };

        if self.cancel.is_cancelled() {
            bail!("interrupted before probing batch {batch_id}");
        }
        let (search, list) = self.probe_batch(&batch_id);

        let mut result = ScenarioResult::from_completion(&done);
        result.set_latencies(search.mean(), list.mean());
        result.input = Some(input.display().to_string());
        result.input_bytes = Some(input_bytes);
        result.input_sha256 = Some(input_sha256);
        result.uploaded_at = Some(uploaded_at);
        Ok(Some(result))
    }

    /// Search battery (global), then list battery (scoped to `batch_id`).
    pub fn probe_batch(&self, batch_id: &BatchId) -> (ProbeSummary, ProbeSummary) {
        let search = probe::probe_search(&self.transport, &self.cfg.probes.search);
        let list = probe::probe_list(&self.transport, batch_id, &self.cfg.probes.list);
        (search, list)
    }

    /// Size and extension checks before upload. Returns the input size.
    fn validate_input(&self, input: &Path) -> Result<u64> {
        let bytes = std::fs::metadata(input)
            .with_context(|| format!("stat input: {}", input.display()))?
            .len();
        if bytes == 0 {
            bail!("input is empty: {}", input.display());
        }
        if bytes > self.cfg.limits.max_upload_bytes {
            bail!(
                "input exceeds max_upload_bytes ({bytes} > {}): {}",
                self.cfg.limits.max_upload_bytes,
                input.display()
            );
        }

        let is_csv = input
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            if self.cfg.limits.require_csv_extension {
                bail!("input is not a CSV: {}", input.display());
            }
            warn!("input has no .csv extension; uploading anyway: {}", input.display());
        }
        Ok(bytes)
    }

    fn skip_or_fail(
        &self,
        scenario: &Scenario,
        err: anyhow::Error,
    ) -> Result<Option<ScenarioResult>> {
        if scenario.required {
            return Err(err);
        }
        warn!("skipping scenario {}: {err:#}", scenario.label);
        Ok(None)
    }
}
