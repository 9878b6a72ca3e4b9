use std::sync::{Arc, Mutex};

use crate::app_data::{AppData, AppDataRecord};
use crate::error::Result;
use crate::models::{
    AppStats, Category, CategoryData, CategoryWithCounts, Task, TaskData, TaskPatch,
};

/// Cheaply clonable handle to the live aggregate, shared between the command layer and the
/// auto-save timer.
#[derive(Clone)]
pub struct AppState {
    pub(crate) inner: Arc<Mutex<AppData>>,
}

impl AppState {
    pub fn new(data: AppData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(data)),
        }
    }

    pub fn snapshot(&self) -> AppData {
        let guard = self.inner.lock().expect("state poisoned");
        guard.clone()
    }

    pub fn plain_data(&self) -> AppDataRecord {
        let guard = self.inner.lock().expect("state poisoned");
        guard.to_plain_data()
    }

    /// Runs a read-only closure against the aggregate without cloning it.
    pub fn read<T>(&self, f: impl FnOnce(&AppData) -> T) -> T {
        let guard = self.inner.lock().expect("state poisoned");
        f(&guard)
    }

    pub fn replace(&self, data: AppData) {
        let mut guard = self.inner.lock().expect("state poisoned");
        *guard = data;
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks().to_vec()
    }

    pub fn categories(&self) -> Vec<Category> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.categories().to_vec()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.task(id).cloned()
    }

    pub fn tasks_by_category(&self, name: &str) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks_by_category(name).into_iter().cloned().collect()
    }

    pub fn categories_with_counts(&self) -> Vec<CategoryWithCounts> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.categories_with_counts()
    }

    pub fn stats(&self) -> AppStats {
        let guard = self.inner.lock().expect("state poisoned");
        guard.stats()
    }

    pub fn add_task(&self, data: TaskData) -> Result<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.add_task(data).cloned()
    }

    pub fn update_task(&self, id: &str, patch: &TaskPatch) -> Result<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.update_task(id, patch).cloned()
    }

    pub fn toggle_task(&self, id: &str) -> Result<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.toggle_task(id).cloned()
    }

    pub fn delete_task(&self, id: &str) -> Result<Task> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.delete_task(id)
    }

    pub fn add_category(&self, data: CategoryData) -> Result<Category> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.add_category(data).cloned()
    }

    pub fn delete_category(&self, name: &str) -> Result<Category> {
        let mut guard = self.inner.lock().expect("state poisoned");
        guard.delete_category(name)
    }
}
