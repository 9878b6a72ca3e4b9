use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::{Result, TaskflowError};
use crate::scheduler::{start_auto_save, AutoSave};
use crate::state::AppState;
use crate::storage::{KeyValueStore, StorageManager};

/// A running application instance: the live state, where it is persisted, and the auto-save
/// timer keeping the two in sync.
pub struct Session<S: KeyValueStore + 'static> {
    storage: Arc<StorageManager<S>>,
    state: AppState,
    auto_save: Option<AutoSave>,
    load_error: Option<TaskflowError>,
}

impl<S: KeyValueStore + 'static> Session<S> {
    /// Loads the stored aggregate, falling back to a fresh one. A load failure does not stop
    /// the session from opening; it is kept in [`Session::load_error`] for the UI to surface.
    pub fn open(storage: StorageManager<S>) -> Self {
        let loaded = storage.load();
        if let Some(error) = &loaded.error {
            log::warn!("session opened with fallback data: {error}");
        }
        Self {
            storage: Arc::new(storage),
            state: AppState::new(loaded.data),
            auto_save: None,
            load_error: loaded.error,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn storage(&self) -> &StorageManager<S> {
        &self.storage
    }

    pub fn load_error(&self) -> Option<&TaskflowError> {
        self.load_error.as_ref()
    }

    pub fn is_auto_saving(&self) -> bool {
        self.auto_save.as_ref().is_some_and(AutoSave::is_active)
    }

    /// Starts the periodic save using the configured interval. Calling it again restarts
    /// the timer.
    pub fn start_auto_save(&mut self, runtime: &Handle) {
        if let Some(previous) = self.auto_save.take() {
            previous.disable();
        }
        let period = self.storage.config().auto_save_interval();
        self.auto_save = Some(start_auto_save(
            runtime,
            self.storage.clone(),
            self.state.clone(),
            period,
        ));
    }

    pub fn save(&self) -> Result<()> {
        self.storage.save_state(&self.state)
    }

    /// Stops the timer and writes the final state.
    pub async fn close(mut self) -> Result<()> {
        if let Some(auto_save) = self.auto_save.take() {
            auto_save.shutdown().await;
        }
        let saved = self.save();
        log::info!("session closed saved={}", saved.is_ok());
        saved
    }
}
