use crate::model::{ScheduledTask, TodayTask};
use async_trait::async_trait;

/// Errors crossing the store boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The remote document could not be reached (network or auth failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The document or an expected section is missing.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// Section content was not valid structured data.
    #[error("parse error: {0}")]
    Parse(String),
}

/// The document store as the engine sees it: two named sections, each loaded
/// and saved whole. Every save is a last-writer-wins overwrite of the entire
/// section; there is no per-item patch API.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load_today(&self) -> Result<Vec<TodayTask>, StoreError>;
    async fn save_today(&self, tasks: &[TodayTask]) -> Result<(), StoreError>;
    async fn load_scheduled(&self) -> Result<Vec<ScheduledTask>, StoreError>;
    async fn save_scheduled(&self, tasks: &[ScheduledTask]) -> Result<(), StoreError>;

    /// Append one instance to the today section (load + save round trip).
    async fn create_today(&self, task: TodayTask) -> Result<(), StoreError> {
        let mut current = self.load_today().await?;
        current.push(task);
        self.save_today(&current).await
    }

    /// Append one definition to the scheduled section.
    async fn create_scheduled(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let mut current = self.load_scheduled().await?;
        current.push(task);
        self.save_scheduled(&current).await
    }
}

/// In-memory store used by the engine tests. Failure injection and a save
/// delay let tests exercise rollback and the in-flight toggle guard.
#[cfg(test)]
pub struct MemoryStore {
    today: std::sync::Mutex<Vec<TodayTask>>,
    scheduled: std::sync::Mutex<Vec<ScheduledTask>>,
    fail_save_today: std::sync::atomic::AtomicBool,
    save_delay: std::sync::Mutex<Option<std::time::Duration>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            today: std::sync::Mutex::new(Vec::new()),
            scheduled: std::sync::Mutex::new(Vec::new()),
            fail_save_today: std::sync::atomic::AtomicBool::new(false),
            save_delay: std::sync::Mutex::new(None),
        }
    }

    pub fn with_today(tasks: Vec<TodayTask>) -> Self {
        let store = Self::new();
        *store.today.lock().unwrap() = tasks;
        store
    }

    pub fn with_scheduled(tasks: Vec<ScheduledTask>) -> Self {
        let store = Self::new();
        *store.scheduled.lock().unwrap() = tasks;
        store
    }

    pub fn today(&self) -> Vec<TodayTask> {
        self.today.lock().unwrap().clone()
    }

    pub fn scheduled(&self) -> Vec<ScheduledTask> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn set_today(&self, tasks: Vec<TodayTask>) {
        *self.today.lock().unwrap() = tasks;
    }

    pub fn set_scheduled(&self, tasks: Vec<ScheduledTask>) {
        *self.scheduled.lock().unwrap() = tasks;
    }

    pub fn fail_save_today(&self, fail: bool) {
        self.fail_save_today
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set_save_delay(&self, delay: std::time::Duration) {
        *self.save_delay.lock().unwrap() = Some(delay);
    }
}

#[cfg(test)]
#[async_trait]
impl TaskStore for MemoryStore {
    async fn load_today(&self) -> Result<Vec<TodayTask>, StoreError> {
        Ok(self.today.lock().unwrap().clone())
    }

    async fn save_today(&self, tasks: &[TodayTask]) -> Result<(), StoreError> {
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_save_today.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        *self.today.lock().unwrap() = tasks.to_vec();
        Ok(())
    }

    async fn load_scheduled(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        Ok(self.scheduled.lock().unwrap().clone())
    }

    async fn save_scheduled(&self, tasks: &[ScheduledTask]) -> Result<(), StoreError> {
        *self.scheduled.lock().unwrap() = tasks.to_vec();
        Ok(())
    }
}
