use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::state::AppState;
use crate::storage::{KeyValueStore, StorageManager};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running auto-save timer. Dropping it stops the timer as well.
pub struct AutoSave {
    handle: JoinHandle<()>,
}

impl AutoSave {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops future firings. The timer task releases its state handle once the runtime
    /// drops it; use [`AutoSave::shutdown`] to wait for that.
    pub fn disable(&self) {
        self.handle.abort();
    }

    pub async fn shutdown(mut self) {
        self.handle.abort();
        let _ = (&mut self.handle).await;
        log::info!("auto-save stopped");
    }
}

impl Drop for AutoSave {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Saves a snapshot of `state` every `period`, first firing one period from now.
pub fn start_auto_save<S>(
    runtime: &Handle,
    storage: Arc<StorageManager<S>>,
    state: AppState,
    period: Duration,
) -> AutoSave
where
    S: KeyValueStore + 'static,
{
    let period = period.max(MIN_PERIOD);
    log::info!("auto-save enabled period_ms={}", period.as_millis());
    let handle = runtime.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(err) = storage.save_state(&state) {
                log::warn!("auto-save failed: {err}");
            }
        }
    });
    AutoSave { handle }
}
