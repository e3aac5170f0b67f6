#![allow(dead_code)]

use recon_bench::cancel::CancelToken;
use recon_bench::client::{
    BatchId, Counts, JobStatus, QueryTiming, ReadEndpoint, StatusSnapshot, Transport,
    TransportError, UploadAccepted,
};
use recon_bench::clock::Clock;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Clock that only moves when slept on.
pub struct ManualClock {
    base: Instant,
    offset: Cell<Duration>,
    pub sleeps: Cell<u32>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.offset.set(self.offset.get() + d);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        self.sleeps.set(self.sleeps.get() + 1);
        self.advance(duration);
        false
    }
}

pub fn status_error(status: u16) -> TransportError {
    TransportError::Status {
        url: "http://fake".into(),
        status,
        body: "boom".into(),
    }
}

pub fn snap(status: JobStatus, processed: u64, total: Option<u64>) -> StatusSnapshot {
    StatusSnapshot::new(status, processed, total)
}

pub fn completed(total: u64, counts: Counts) -> StatusSnapshot {
    StatusSnapshot::new(JobStatus::Completed, total, Some(total)).with_counts(counts)
}

/// Scripted stand-in for the service.
///
/// Status queues are per batch; the last scripted snapshot repeats once the
/// queue is down to one entry. Query results are consumed in order and fall
/// back to a 10ms / 3 item success when exhausted.
#[derive(Default)]
pub struct FakeTransport {
    pub health_status: Option<u16>,
    pub upload_statuses: RefCell<VecDeque<u16>>,
    pub statuses: RefCell<HashMap<BatchId, VecDeque<Result<StatusSnapshot, u16>>>>,
    pub queries: RefCell<VecDeque<Result<QueryTiming, u16>>>,
    pub cancel_on_status_call: Option<(u32, CancelToken)>,

    pub uploads: RefCell<Vec<PathBuf>>,
    pub status_calls: Cell<u32>,
    pub query_log: RefCell<Vec<(ReadEndpoint, Vec<(String, String)>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, batch: &str, seq: Vec<Result<StatusSnapshot, u16>>) {
        self.statuses
            .borrow_mut()
            .insert(BatchId::new(batch), seq.into_iter().collect());
    }

    pub fn push_query(&self, r: Result<QueryTiming, u16>) {
        self.queries.borrow_mut().push_back(r);
    }
}

impl Transport for FakeTransport {
    fn health(&self) -> Result<(), TransportError> {
        match self.health_status {
            Some(code) => Err(status_error(code)),
            None => Ok(()),
        }
    }

    fn upload(&self, input: &Path) -> Result<UploadAccepted, TransportError> {
        self.uploads.borrow_mut().push(input.to_path_buf());
        let code = self.upload_statuses.borrow_mut().pop_front().unwrap_or(201);
        if code != 201 {
            return Err(status_error(code));
        }
        let n = self.uploads.borrow().len();
        Ok(UploadAccepted {
            batch_id: BatchId::new(format!("batch-{n}")),
            status: Some("processing".into()),
        })
    }

    fn batch_status(&self, batch_id: &BatchId) -> Result<StatusSnapshot, TransportError> {
        let calls = self.status_calls.get() + 1;
        self.status_calls.set(calls);
        if let Some((at, token)) = &self.cancel_on_status_call {
            if *at == calls {
                token.cancel();
            }
        }

        let mut statuses = self.statuses.borrow_mut();
        let queue = statuses
            .get_mut(batch_id)
            .unwrap_or_else(|| panic!("no script for {batch_id}"));
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match next.unwrap_or_else(|| panic!("empty script for {batch_id}")) {
            Ok(s) => Ok(s),
            Err(code) => Err(status_error(code)),
        }
    }

    fn query(
        &self,
        endpoint: &ReadEndpoint,
        params: &[(String, String)],
    ) -> Result<QueryTiming, TransportError> {
        self.query_log
            .borrow_mut()
            .push((endpoint.clone(), params.to_vec()));
        match self.queries.borrow_mut().pop_front() {
            Some(Ok(t)) => Ok(t),
            Some(Err(code)) => Err(status_error(code)),
            None => Ok(QueryTiming {
                items: 3,
                elapsed: Duration::from_millis(10),
            }),
        }
    }
}
