//! Bounded attempt history with durable failure persistence.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

use crate::probe::ProbeAttempt;

/// Default in-memory history size.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Longest response body excerpt kept as diagnostics.
pub const EXCERPT_LIMIT: usize = 512;

/// A recorded attempt plus free-form diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(flatten)]
    pub attempt: ProbeAttempt,
    /// First characters of the response body, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_excerpt: Option<String>,
    /// Transport or parse error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FailureRecord {
    pub fn new(attempt: ProbeAttempt) -> Self {
        Self {
            attempt,
            response_excerpt: None,
            detail: None,
        }
    }

    pub fn with_excerpt(mut self, body: &str) -> Self {
        if !body.is_empty() {
            self.response_excerpt = Some(excerpt(body));
        }
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.attempt.is_failure()
    }
}

/// Truncate `body` to [`EXCERPT_LIMIT`] characters.
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_LIMIT).collect()
}

/// Append-only JSON-lines file written by a dedicated thread.
///
/// Callers only enqueue; serialization and disk I/O happen off the runtime.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    tx: mpsc::UnboundedSender<FailureRecord>,
    writer: JoinHandle<()>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = {
            let path = path.clone();
            std::thread::Builder::new()
                .name("failure-sink".into())
                .spawn(move || drain(rx, BufWriter::new(file), &path))?
        };

        Ok(Self { path, tx, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn send(&self, record: FailureRecord) {
        if self.tx.send(record).is_err() {
            tracing::warn!(
                path = %self.path.display(),
                "Failure sink writer is gone, record dropped"
            );
        }
    }

    /// Stop accepting records and wait until everything queued is on disk.
    pub fn close(self) {
        let Self { path, tx, writer } = self;
        drop(tx);
        if writer.join().is_err() {
            tracing::error!(path = %path.display(), "Failure sink writer panicked");
        }
    }
}

fn drain(mut rx: mpsc::UnboundedReceiver<FailureRecord>, mut writer: BufWriter<File>, path: &Path) {
    while let Some(record) = rx.blocking_recv() {
        if let Err(e) = write_line(&mut writer, &record) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist failure record");
        }
    }
}

fn write_line(writer: &mut BufWriter<File>, record: &FailureRecord) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<FailureRecord>,
    sink: Option<JsonlSink>,
}

/// Ring buffer of recent attempts; failures also go to the durable sink.
///
/// Every attempt is mirrored so the history can be paged with or without
/// successes. Only failures are persisted.
#[derive(Debug)]
pub struct FailureLog {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl FailureLog {
    /// In-memory only.
    pub fn new(capacity: usize) -> Self {
        Self::with_sink(capacity, None)
    }

    pub fn with_sink(capacity: usize, sink: Option<JsonlSink>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                sink,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push a record, evicting the oldest beyond capacity.
    pub fn append(&self, record: FailureRecord) {
        let mut inner = self.lock();

        if record.is_failure() {
            if let Some(sink) = inner.sink.as_ref() {
                sink.send(record.clone());
            }
        }

        if inner.entries.len() == self.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(record);
    }

    /// Detach the durable sink and flush whatever it still has queued.
    /// Later failures are kept in memory only.
    pub fn close(&self) {
        let sink = self.lock().sink.take();
        if let Some(sink) = sink {
            sink.close();
        }
    }

    /// Most recent `limit` records, newest first.
    pub fn recent(&self, limit: usize, failed_only: bool) -> Vec<FailureRecord> {
        self.page(0, limit, failed_only)
    }

    /// Skip `offset` matching records (newest first), then take `limit`.
    pub fn page(&self, offset: usize, limit: usize, failed_only: bool) -> Vec<FailureRecord> {
        self.lock()
            .entries
            .iter()
            .rev()
            .filter(|r| !failed_only || r.is_failure())
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records matching the filter.
    pub fn count(&self, failed_only: bool) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|r| !failed_only || r.is_failure())
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Endpoint, InvoiceId, Outcome};
    use std::time::Duration;

    fn record(n: u64, outcome: Outcome) -> FailureRecord {
        FailureRecord::new(ProbeAttempt {
            invoice_id: InvoiceId::from(format!("{:010}", n).as_str()),
            endpoint: Endpoint::Token,
            started_at_ms: n,
            duration: Duration::from_millis(5),
            outcome,
            http_status: None,
            error: None,
        })
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("probe-failures-{}.jsonl", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_eviction_is_oldest_first() {
        let log = FailureLog::new(3);
        for n in 0..5 {
            log.append(record(n, Outcome::NetworkError));
        }
        assert_eq!(log.len(), 3);

        let ids: Vec<u64> = log.recent(10, false).iter().map(|r| r.attempt.started_at_ms).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }

    #[test]
    fn test_failed_only_and_paging() {
        let log = FailureLog::new(10);
        for n in 0..6 {
            let outcome = if n % 2 == 0 { Outcome::Success } else { Outcome::ProtocolError };
            log.append(record(n, outcome));
        }

        let failed: Vec<u64> = log
            .recent(10, true)
            .iter()
            .map(|r| r.attempt.started_at_ms)
            .collect();
        assert_eq!(failed, vec![5, 3, 1]);
        assert_eq!(log.count(true), 3);

        let page: Vec<u64> = log
            .page(1, 2, false)
            .iter()
            .map(|r| r.attempt.started_at_ms)
            .collect();
        assert_eq!(page, vec![4, 3]);
    }

    #[test]
    fn test_sink_persists_failures_only() {
        let path = temp_path();
        let sink = JsonlSink::open(&path).unwrap();
        let log = FailureLog::with_sink(10, Some(sink));

        log.append(record(1, Outcome::Success));
        log.append(record(2, Outcome::ParseError).with_detail("missing data.token"));
        log.append(record(3, Outcome::NetworkError));
        log.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: FailureRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.attempt.outcome, Outcome::ParseError);
        assert_eq!(first.detail.as_deref(), Some("missing data.token"));

        std::fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_concurrent_appends_all_persisted() {
        let path = temp_path();
        let sink = JsonlSink::open(&path).unwrap();
        let log = std::sync::Arc::new(FailureLog::with_sink(8, Some(sink)));

        let workers: Vec<_> = (0..4u64)
            .map(|w| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for n in 0..25 {
                        log.append(record(w * 100 + n, Outcome::NetworkError));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        log.close();

        // The ring is bounded, the file is not.
        assert_eq!(log.len(), 8);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 100);
        assert!(content.lines().all(|l| serde_json::from_str::<FailureRecord>(l).is_ok()));

        // After close, failures still land in memory.
        log.append(record(999, Outcome::ParseError));
        assert_eq!(log.recent(1, true)[0].attempt.started_at_ms, 999);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 100);

        std::fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(EXCERPT_LIMIT + 10);
        assert_eq!(excerpt(&body).chars().count(), EXCERPT_LIMIT);
        let rec = record(1, Outcome::ProtocolError).with_excerpt("");
        assert!(rec.response_excerpt.is_none());
    }
}
