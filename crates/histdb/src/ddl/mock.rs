//! In-memory destination that records executed statements.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::traits::Destination;
use crate::ddl::Statement;
use crate::error::{HistError, Result};

#[derive(Default)]
pub struct RecordingDestination {
    executed: Mutex<Vec<String>>,
    round_trips: Mutex<usize>,
    fail_on: Mutex<Option<String>>,
}

impl RecordingDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any round trip containing `pattern` until cleared.
    pub fn fail_on(&self, pattern: &str) {
        *self.fail_on.lock().unwrap() = Some(pattern.to_string());
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    /// Every statement that reached the destination, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn round_trips(&self) -> usize {
        *self.round_trips.lock().unwrap()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.executed()
            .iter()
            .filter(|sql| sql.contains(pattern))
            .count()
    }

    fn apply(&self, statements: &[Statement], cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(HistError::Cancelled);
        }
        let text = Statement::batch(statements);
        if let Some(pattern) = self.fail_on.lock().unwrap().as_deref() {
            if text.contains(pattern) {
                return Err(HistError::destination(self.name(), text, "injected failure"));
            }
        }
        *self.round_trips.lock().unwrap() += 1;
        self.executed
            .lock()
            .unwrap()
            .extend(statements.iter().map(|s| s.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Destination for RecordingDestination {
    fn name(&self) -> &str {
        "recording"
    }

    async fn execute(&self, statement: &Statement, cancel: &CancellationToken) -> Result<()> {
        self.apply(std::slice::from_ref(statement), cancel)
    }

    async fn execute_batch(
        &self,
        statements: &[Statement],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.apply(statements, cancel)
    }

    async fn ping(&self, statement: &Statement, cancel: &CancellationToken) -> Result<Duration> {
        self.apply(std::slice::from_ref(statement), cancel)?;
        Ok(Duration::from_millis(1))
    }
}
