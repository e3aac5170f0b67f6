use crate::client::{BatchId, ReadEndpoint, Transport};
use crate::config::{ListCase, SearchCase};
use std::time::Duration;
use tracing::{info, warn};

/// One timed read request.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub label: String,
    pub elapsed: Duration,
    pub result_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeSummary {
    pub results: Vec<ProbeResult>,
    pub failures: usize,
}

impl ProbeSummary {
    /// Arithmetic mean over successful probes; `None` when none succeeded.
    pub fn mean(&self) -> Option<Duration> {
        let n = u32::try_from(self.results.len()).ok().filter(|n| *n > 0)?;
        let total: Duration = self.results.iter().map(|r| r.elapsed).sum();
        Some(total / n)
    }

    pub fn min(&self) -> Option<Duration> {
        self.results.iter().map(|r| r.elapsed).min()
    }

    pub fn max(&self) -> Option<Duration> {
        self.results.iter().map(|r| r.elapsed).max()
    }
}

/// Runs each case in order against `endpoint`. Failed requests are logged and
/// left out of the summary; they never stop the battery.
pub fn run_battery<T: Transport + ?Sized>(
    transport: &T,
    endpoint: &ReadEndpoint,
    cases: &[(String, Vec<(String, String)>)],
) -> ProbeSummary {
    let mut summary = ProbeSummary::default();
    for (label, params) in cases {
        match transport.query(endpoint, params) {
            Ok(timing) => {
                info!(
                    "  {label}: {:.2}ms ({} results)",
                    millis(timing.elapsed),
                    timing.items
                );
                summary.results.push(ProbeResult {
                    label: label.clone(),
                    elapsed: timing.elapsed,
                    result_count: timing.items,
                });
            }
            Err(err) => {
                warn!("  {label}: failed: {err}");
                summary.failures += 1;
            }
        }
    }
    summary
}

pub fn probe_search<T: Transport + ?Sized>(transport: &T, cases: &[SearchCase]) -> ProbeSummary {
    info!("probing invoice search latency");
    let cases: Vec<_> = cases
        .iter()
        .map(|c| (c.label.clone(), c.params.to_pairs()))
        .collect();
    let summary = run_battery(transport, &ReadEndpoint::InvoiceSearch, &cases);
    log_mean("search", &summary);
    summary
}

pub fn probe_list<T: Transport + ?Sized>(
    transport: &T,
    batch_id: &BatchId,
    cases: &[ListCase],
) -> ProbeSummary {
    info!("probing transaction list latency for batch {batch_id}");
    let cases: Vec<_> = cases
        .iter()
        .map(|c| {
            let params = vec![
                ("status".to_string(), c.status.clone()),
                ("limit".to_string(), c.limit.to_string()),
            ];
            (c.label.clone(), params)
        })
        .collect();
    let endpoint = ReadEndpoint::BatchTransactions(batch_id.clone());
    let summary = run_battery(transport, &endpoint, &cases);
    log_mean("list", &summary);
    summary
}

fn log_mean(kind: &str, summary: &ProbeSummary) {
    match (summary.mean(), summary.min(), summary.max()) {
        (Some(mean), Some(min), Some(max)) => info!(
            "average {kind} time: {:.2}ms (min {:.2}ms, max {:.2}ms, {} failed)",
            millis(mean),
            millis(min),
            millis(max),
            summary.failures
        ),
        _ => warn!(
            "no average {kind} time available ({} probes failed)",
            summary.failures
        ),
    }
}

pub(crate) fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
