//! Invoice number generation.
//!
//! Invoice numbers only correlate the two phases of one probe in logs. They
//! come from an atomic counter seeded with the process start time in Unix
//! seconds and are zero-padded to at least ten digits. The counter is never
//! truncated, so numbers stay unique for the life of the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::pacing::clock::unix_secs;

/// Minimum width of a rendered invoice number.
pub const INVOICE_WIDTH: usize = 10;

/// Opaque correlation identifier for one probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(String);

impl InvoiceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InvoiceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock-free source of unique invoice numbers.
#[derive(Debug)]
pub struct InvoiceIdGenerator {
    counter: AtomicU64,
}

impl InvoiceIdGenerator {
    /// Seed the counter at `seed`.
    pub fn starting_at(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Seed the counter from a wall-clock time.
    pub fn seeded_from(now: SystemTime) -> Self {
        Self::starting_at(unix_secs(now))
    }

    /// Next invoice number.
    pub fn next(&self) -> InvoiceId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        InvoiceId(format!("{:0width$}", n, width = INVOICE_WIDTH))
    }
}

impl Default for InvoiceIdGenerator {
    fn default() -> Self {
        Self::seeded_from(SystemTime::now())
    }
}
