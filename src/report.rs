use crate::{
    client::{BatchId, Counts},
    util::ensure_dir,
    waiter::Completion,
};
use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Write as _};
use std::path::Path;
use std::time::Duration;

/// Terminal record of one upload-wait-probe cycle. Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub batch_id: BatchId,
    pub processing_time: f64,
    pub total_transactions: Option<u64>,
    pub counts: Counts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_search_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_list_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<String>,
}

impl ScenarioResult {
    pub fn from_completion(done: &Completion) -> Self {
        Self {
            batch_id: done.batch_id.clone(),
            processing_time: done.processing_time.as_secs_f64(),
            total_transactions: done.total_transactions,
            counts: done.counts,
            avg_search_time: None,
            avg_list_time: None,
            input: None,
            input_bytes: None,
            input_sha256: None,
            uploaded_at: None,
        }
    }

    pub fn set_latencies(&mut self, search: Option<Duration>, list: Option<Duration>) {
        self.avg_search_time = search.map(|d| d.as_secs_f64());
        self.avg_list_time = list.map(|d| d.as_secs_f64());
    }
}

/// Scenario results keyed by label, in the order the scenarios ran.
/// Serialized as a single JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    entries: Vec<(String, ScenarioResult)>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `result` under `label`, replacing an earlier entry with that label.
    pub fn insert(&mut self, label: impl Into<String>, result: ScenarioResult) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(slot) => slot.1 = result,
            None => self.entries.push((label, result)),
        }
    }

    pub fn get(&self, label: &str) -> Option<&ScenarioResult> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, r)| r)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScenarioResult)> {
        self.entries.iter().map(|(l, r)| (l.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for RunReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, result) in &self.entries {
            map.serialize_entry(label, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RunReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReportVisitor;

        impl<'de> Visitor<'de> for ReportVisitor {
            type Value = RunReport;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of scenario label to scenario result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RunReport, A::Error> {
                let mut report = RunReport::new();
                while let Some((label, result)) = access.next_entry::<String, ScenarioResult>()? {
                    report.insert(label, result);
                }
                Ok(report)
            }
        }

        deserializer.deserialize_map(ReportVisitor)
    }
}

/// Writes the report as pretty JSON, replacing any previous artifact.
pub fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let raw = serde_json::to_string_pretty(report)?;
    std::fs::write(path, raw).with_context(|| format!("writing report: {}", path.display()))
}

pub fn load_report(path: &Path) -> Result<RunReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading report: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing report: {}", path.display()))
}

pub fn render_summary(report: &RunReport) -> String {
    let mut out = String::from("PERFORMANCE SUMMARY\n");
    if report.is_empty() {
        out.push_str("\nNo scenario produced a result.\n");
        return out;
    }
    for (label, r) in report.iter() {
        let _ = writeln!(out, "\n{label}:");
        let _ = writeln!(out, "  Processing time: {:.2} seconds", r.processing_time);
        if let Some(total) = r.total_transactions {
            let _ = writeln!(
                out,
                "  Transactions: {total} (auto-matched {}, needs review {}, unmatched {})",
                r.counts.auto_matched, r.counts.needs_review, r.counts.unmatched
            );
        }
        if let Some(t) = r.avg_search_time {
            let _ = writeln!(out, "  Average search time: {:.2}ms", t * 1000.0);
        }
        if let Some(t) = r.avg_list_time {
            let _ = writeln!(out, "  Average list time: {:.2}ms", t * 1000.0);
        }
    }
    out
}
