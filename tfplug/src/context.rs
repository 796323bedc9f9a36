//! Request-scoped context
//!
//! Carries cancellation, an optional deadline and log correlation fields
//! (operation, type name) across async boundaries.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time;

/// Pass this as first parameter to every async trait method
#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    fields: Arc<BTreeMap<String, String>>,
    done: watch::Receiver<bool>,
    done_tx: Arc<watch::Sender<bool>>,
}

impl Context {
    pub fn new() -> Self {
        let (done_tx, done) = watch::channel(false);

        Self {
            deadline: None,
            fields: Arc::new(BTreeMap::new()),
            done,
            done_tx: Arc::new(done_tx),
        }
    }

    /// Cancels the returned context once `timeout` elapses.
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        let done_tx = self.done_tx.clone();

        tokio::spawn(async move {
            time::sleep_until(deadline.into()).await;
            let _ = done_tx.send(true);
        });

        self.deadline = Some(deadline);
        self
    }

    /// Attach a correlation field; clones share earlier fields
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.fields).insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.done.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Receiver flipped to true when work on behalf of this context
    /// should stop
    pub fn done(&self) -> watch::Receiver<bool> {
        self.done.clone()
    }

    pub fn cancel(&self) {
        let _ = self.done_tx.send(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline)
            .field("fields", &self.fields)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
