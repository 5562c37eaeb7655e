//! Failure aggregation across multi-step operations

use crate::error::{Error, Result};

/// Accumulated result of a multi-step operation
///
/// Steps keep running after a failure; the first error is what the caller
/// gets back, every other one is logged and counted.
#[derive(Debug, Default)]
pub(crate) struct Status {
    first: Option<Error>,
    failures: usize,
}

impl Status {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record the result of one step, returning whether it succeeded
    pub(crate) fn record(&mut self, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("{}", e);
                self.failures += 1;
                if self.first.is_none() {
                    self.first = Some(e);
                }
                false
            }
        }
    }

    pub(crate) fn is_ok(&self) -> bool {
        self.first.is_none()
    }

    pub(crate) fn into_result(self) -> Result<()> {
        match self.first {
            None => Ok(()),
            Some(e) => {
                if self.failures > 1 {
                    log::error!("{} steps failed, first failure: {}", self.failures, e);
                }
                Err(e)
            }
        }
    }
}
