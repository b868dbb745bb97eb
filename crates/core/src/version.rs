//! Optimistic concurrency for ledger records.

use crate::error::{DomainError, DomainResult};

/// Optimistic concurrency expectation for a stock item.
///
/// Every ledger mutation bumps the item version by one. Writers that made a
/// decision based on a read pass `Exact(version_read)` so the write is
/// rejected if anything else committed in between.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (compensating writes, migrations).
    Any,
    /// Require the item to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}
