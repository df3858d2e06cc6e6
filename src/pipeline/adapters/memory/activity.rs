//! In-memory activity log.

use crate::pipeline::ports::{ActivityError, ActivityRecorder, TaskStatusActivity};
use async_trait::async_trait;
use std::sync::{Arc, RwLock};

/// Activity recorder that keeps every activity in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryActivityLog {
    entries: Arc<RwLock<Vec<TaskStatusActivity>>>,
}

impl InMemoryActivityLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded activities, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError`] when the log lock is poisoned.
    pub fn entries(&self) -> Result<Vec<TaskStatusActivity>, ActivityError> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .map_err(|err| ActivityError::new(std::io::Error::other(err.to_string())))
    }
}

#[async_trait]
impl ActivityRecorder for InMemoryActivityLog {
    async fn record(&self, activity: TaskStatusActivity) -> Result<(), ActivityError> {
        self.entries
            .write()
            .map_err(|err| ActivityError::new(std::io::Error::other(err.to_string())))?
            .push(activity);
        Ok(())
    }
}
