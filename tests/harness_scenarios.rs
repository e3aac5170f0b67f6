mod common;

use common::{FakeTransport, ManualClock, completed, snap};
use recon_bench::cancel::CancelToken;
use recon_bench::client::{Counts, JobStatus};
use recon_bench::config::{Config, Scenario};
use recon_bench::pipeline::Harness;
use std::path::{Path, PathBuf};

fn write_csv(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(
        &path,
        "id,transaction_date,description,amount,reference_number\n1,2024-01-01,ACME,450.00,INV-1\n",
    )
    .unwrap();
    path
}

fn config(small: PathBuf, large: PathBuf) -> Config {
    let mut cfg = Config::default();
    cfg.scenarios = vec![
        Scenario {
            label: "small".into(),
            input: small,
            required: true,
        },
        Scenario {
            label: "large".into(),
            input: large,
            required: false,
        },
    ];
    cfg
}

fn counts() -> Counts {
    Counts {
        auto_matched: 900,
        needs_review: 80,
        unmatched: 20,
        ..Counts::default()
    }
}

#[test]
fn full_run_records_both_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let transport = FakeTransport::new();
    transport.script(
        "batch-1",
        vec![
            Ok(snap(JobStatus::Queued, 0, Some(1000))),
            Ok(snap(JobStatus::Processing, 400, Some(1000))),
            Ok(snap(JobStatus::Processing, 1000, Some(1000))),
            Ok(completed(1000, counts())),
        ],
    );
    transport.script("batch-2", vec![Ok(completed(10_000, counts()))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let report = harness.run().unwrap();

    let labels: Vec<_> = report.labels().collect();
    assert_eq!(labels, vec!["small", "large"]);
    let small = report.get("small").unwrap();
    assert_eq!(small.total_transactions, Some(1000));
    assert_eq!(small.counts.auto_matched, 900);
    assert_eq!(small.counts.needs_review, 80);
    assert_eq!(small.counts.unmatched, 20);
    assert_eq!(small.processing_time, 3.0);
    assert_eq!(small.avg_search_time, Some(0.01));
    assert_eq!(small.avg_list_time, Some(0.01));
    assert_eq!(small.input_bytes, Some(std::fs::metadata(&cfg.scenarios[0].input).unwrap().len()));
    assert_eq!(small.input_sha256.as_ref().map(String::len), Some(64));
    assert_eq!(report.get("large").unwrap().processing_time, 0.0);
    // 5 search + 4 list probes per scenario
    assert_eq!(harness.transport().query_log.borrow().len(), 18);
}

#[test]
fn missing_optional_input_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        dir.path().join("absent.csv"),
    );
    let transport = FakeTransport::new();
    transport.script("batch-1", vec![Ok(completed(1000, counts()))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let out = dir.path().join("performance_results.json");
    let report = harness.run_and_write(&out).unwrap();

    assert_eq!(report.len(), 1);
    assert!(report.get("small").is_some());
    assert_eq!(harness.transport().uploads.borrow().len(), 1);
    let back = recon_bench::report::load_report(&out).unwrap();
    assert_eq!(back.labels().collect::<Vec<_>>(), vec!["small"]);
}

#[test]
fn missing_required_input_aborts_before_upload() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        dir.path().join("absent.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let harness = Harness::new(
        &cfg,
        FakeTransport::new(),
        ManualClock::new(),
        CancelToken::new(),
    );
    let err = harness.run().unwrap_err();
    assert!(format!("{err:#}").contains("input file not found"));
    assert!(harness.transport().uploads.borrow().is_empty());
}

#[test]
fn upload_rejection_aborts_and_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let transport = FakeTransport::new();
    transport.upload_statuses.borrow_mut().push_back(500);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let out = dir.path().join("performance_results.json");
    let err = harness.run_and_write(&out).unwrap_err();

    assert!(format!("{err:#}").contains("HTTP 500"));
    assert!(!out.exists());
    assert_eq!(harness.transport().uploads.borrow().len(), 1);
}

#[test]
fn optional_upload_rejection_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let transport = FakeTransport::new();
    transport.upload_statuses.borrow_mut().extend([201, 413]);
    transport.script("batch-1", vec![Ok(completed(1000, counts()))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let report = harness.run().unwrap();
    assert_eq!(report.labels().collect::<Vec<_>>(), vec!["small"]);
}

#[test]
fn failed_job_is_omitted_and_next_scenario_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let transport = FakeTransport::new();
    transport.script(
        "batch-1",
        vec![
            Ok(snap(JobStatus::Processing, 1, None)),
            Ok(snap(JobStatus::Failed, 1, None)),
        ],
    );
    transport.script("batch-2", vec![Ok(completed(10_000, counts()))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let report = harness.run().unwrap();

    assert_eq!(report.labels().collect::<Vec<_>>(), vec!["large"]);
    // the failed scenario is never probed
    assert_eq!(harness.transport().query_log.borrow().len(), 9);
}

#[test]
fn timed_out_job_is_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(
        write_csv(dir.path(), "small.csv"),
        dir.path().join("absent.csv"),
    );
    cfg.polling.max_wait_seconds = 3;
    let transport = FakeTransport::new();
    transport.script("batch-1", vec![Ok(snap(JobStatus::Processing, 1, None))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let report = harness.run().unwrap();
    assert!(report.is_empty());
}

#[test]
fn unhealthy_service_aborts_before_any_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let transport = FakeTransport {
        health_status: Some(503),
        ..FakeTransport::default()
    };
    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let err = harness.run().unwrap_err();
    assert!(format!("{err:#}").contains("health check failed"));
    assert!(harness.transport().uploads.borrow().is_empty());
}

#[test]
fn interrupt_during_wait_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    let cancel = CancelToken::new();
    let transport = FakeTransport {
        cancel_on_status_call: Some((2, cancel.clone())),
        ..FakeTransport::default()
    };
    transport.script("batch-1", vec![Ok(snap(JobStatus::Processing, 1, None))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), cancel);
    let out = dir.path().join("performance_results.json");
    let err = harness.run_and_write(&out).unwrap_err();
    assert!(format!("{err:#}").contains("interrupted"));
    assert!(!out.exists());
}

#[test]
fn oversized_required_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(
        write_csv(dir.path(), "small.csv"),
        write_csv(dir.path(), "large.csv"),
    );
    cfg.limits.max_upload_bytes = 8;
    let harness = Harness::new(
        &cfg,
        FakeTransport::new(),
        ManualClock::new(),
        CancelToken::new(),
    );
    let err = harness.run().unwrap_err();
    assert!(format!("{err:#}").contains("max_upload_bytes"));
}

#[test]
fn unreadable_optional_input_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let unreadable = dir.path().join("large.csv");
    std::fs::create_dir(&unreadable).unwrap();
    let cfg = config(write_csv(dir.path(), "small.csv"), unreadable);
    let transport = FakeTransport::new();
    transport.script("batch-1", vec![Ok(completed(1000, counts()))]);

    let harness = Harness::new(&cfg, transport, ManualClock::new(), CancelToken::new());
    let report = harness.run().unwrap();
    let labels: Vec<_> = report.labels().collect();
    assert_eq!(labels, vec!["small"]);
    assert_eq!(harness.transport().uploads.borrow().len(), 1);
}

#[test]
fn unreadable_required_input_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let unreadable = dir.path().join("small.csv");
    std::fs::create_dir(&unreadable).unwrap();
    let cfg = config(unreadable, dir.path().join("absent.csv"));

    let harness = Harness::new(&cfg, FakeTransport::new(), ManualClock::new(), CancelToken::new());
    let err = harness.run().unwrap_err();
    assert!(format!("{err:#}").contains("small.csv"));
    assert!(harness.transport().uploads.borrow().is_empty());
}
