//! The aggregate root: every task and category lives here and is changed only through the
//! methods below. Each mutation either applies completely or leaves the aggregate untouched.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::{EntityKind, Result, TaskflowError};
use crate::models::{
    null_as_default, AppStats, Category, CategoryData, CategoryWithCounts, Task, TaskData,
    TaskPatch, Timestamp,
};
use crate::utils::{format_timestamp, now, parse_timestamp};

/// Persisted shape of the aggregate. Every field is optional on the way in so a partial or
/// damaged record still loads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppDataRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tasks: Vec<TaskData>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<CategoryData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppData {
    config: Arc<AppConfig>,
    tasks: Vec<Task>,
    categories: Vec<Category>,
    version: String,
    last_modified: Timestamp,
}

impl Default for AppData {
    fn default() -> Self {
        Self::new(Arc::new(AppConfig::default()))
    }
}

impl AppData {
    /// Fresh aggregate seeded with the configured default categories.
    pub fn new(config: Arc<AppConfig>) -> Self {
        let categories = config
            .default_categories
            .iter()
            .map(|name| Category::new(CategoryData::new(name.as_str()), &config))
            .collect();
        Self::from_parts(config, Vec::new(), categories)
    }

    pub(crate) fn from_parts(
        config: Arc<AppConfig>,
        tasks: Vec<Task>,
        categories: Vec<Category>,
    ) -> Self {
        let version = config.version.clone();
        Self {
            config,
            tasks,
            categories,
            version,
            last_modified: now(),
        }
    }

    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|category| category.name == name)
    }

    /// Tasks whose category equals `name`, in storage order.
    pub fn tasks_by_category(&self, name: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|task| task.category == name).collect()
    }

    pub fn categories_with_counts(&self) -> Vec<CategoryWithCounts> {
        self.categories
            .iter()
            .map(|category| {
                let tasks = self.tasks_by_category(&category.name);
                CategoryWithCounts {
                    category: category.clone(),
                    task_count: tasks.len(),
                    completed_count: tasks.iter().filter(|task| task.completed).count(),
                }
            })
            .collect()
    }

    pub fn stats(&self) -> AppStats {
        let total = self.tasks.len();
        let completed = self.tasks.iter().filter(|task| task.completed).count();
        let completion_rate = if total == 0 {
            0
        } else {
            ((completed as f64 / total as f64) * 100.0).round() as u32
        };
        AppStats {
            total,
            completed,
            pending: total - completed,
            categories: self.categories.len(),
            completion_rate,
        }
    }

    pub fn add_task(&mut self, data: TaskData) -> Result<&Task> {
        let task = Task::new(data, &self.config);
        task.validate(&self.config).into_result("task")?;
        self.ensure_category(&task.category)?;
        if self.task(&task.id).is_some() {
            return Err(TaskflowError::AlreadyExists {
                kind: EntityKind::Task,
                key: task.id,
            });
        }
        log::debug!("task added id={} category={}", task.id, task.category);
        self.tasks.push(task);
        self.touch();
        let index = self.tasks.len() - 1;
        Ok(&self.tasks[index])
    }

    /// Validates an updated copy and commits it only if it passes, so a rejected update
    /// leaves the stored task exactly as it was.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<&Task> {
        let index = self.task_index(id)?;
        let mut candidate = self.tasks[index].clone();
        candidate.update(patch, &self.config);
        candidate.validate(&self.config).into_result("task update")?;
        if candidate.category != self.tasks[index].category {
            self.ensure_category(&candidate.category)?;
        }
        log::debug!("task updated id={id}");
        self.tasks[index] = candidate;
        self.touch();
        Ok(&self.tasks[index])
    }

    pub fn toggle_task(&mut self, id: &str) -> Result<&Task> {
        let completed = self
            .task(id)
            .map(|task| task.completed)
            .ok_or_else(|| TaskflowError::task_not_found(id))?;
        self.update_task(id, &TaskPatch::completed(!completed))
    }

    pub fn delete_task(&mut self, id: &str) -> Result<Task> {
        let index = self.task_index(id)?;
        let removed = self.tasks.remove(index);
        log::debug!("task deleted id={id}");
        self.touch();
        Ok(removed)
    }

    pub fn add_category(&mut self, data: CategoryData) -> Result<&Category> {
        let category = Category::new(data, &self.config);
        category.validate(&self.config).into_result("category")?;
        if self.category(&category.name).is_some() {
            return Err(TaskflowError::AlreadyExists {
                kind: EntityKind::Category,
                key: category.name,
            });
        }
        log::debug!("category added name={}", category.name);
        self.categories.push(category);
        self.touch();
        let index = self.categories.len() - 1;
        Ok(&self.categories[index])
    }

    /// Removes the category together with every task filed under it.
    pub fn delete_category(&mut self, name: &str) -> Result<Category> {
        let index = self
            .categories
            .iter()
            .position(|category| category.name == name)
            .ok_or_else(|| TaskflowError::category_not_found(name))?;
        let before = self.tasks.len();
        self.tasks.retain(|task| task.category != name);
        let removed_tasks = before - self.tasks.len();
        let removed = self.categories.remove(index);
        log::info!("category deleted name={name} removed_tasks={removed_tasks}");
        self.touch();
        Ok(removed)
    }

    pub fn to_plain_data(&self) -> AppDataRecord {
        AppDataRecord {
            tasks: self.tasks.iter().map(Task::to_plain_data).collect(),
            categories: self.categories.iter().map(Category::to_plain_data).collect(),
            version: Some(self.version.clone()),
            last_modified: Some(format_timestamp(&self.last_modified)),
        }
    }

    /// Rebuilds an aggregate from its persisted shape. Missing pieces fall back to empty
    /// collections, the configured version and the current time. Only the first task per id
    /// and the first category per name are kept.
    pub fn from_plain_data(record: AppDataRecord, config: Arc<AppConfig>) -> Self {
        let mut tasks: Vec<Task> = Vec::with_capacity(record.tasks.len());
        for task in record
            .tasks
            .into_iter()
            .map(|data| Task::from_plain_data(data, &config))
        {
            if tasks.iter().any(|kept| kept.id == task.id) {
                log::warn!("dropping duplicate task id={}", task.id);
                continue;
            }
            tasks.push(task);
        }
        let mut categories: Vec<Category> = Vec::with_capacity(record.categories.len());
        for category in record
            .categories
            .into_iter()
            .map(|data| Category::from_plain_data(data, &config))
        {
            if categories.iter().any(|kept| kept.name == category.name) {
                log::warn!("dropping duplicate category name={}", category.name);
                continue;
            }
            categories.push(category);
        }
        let version = record
            .version
            .filter(|version| !version.trim().is_empty())
            .unwrap_or_else(|| config.version.clone());
        let last_modified = record
            .last_modified
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(now);
        Self {
            config,
            tasks,
            categories,
            version,
            last_modified,
        }
    }

    fn task_index(&self, id: &str) -> Result<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| TaskflowError::task_not_found(id))
    }

    fn ensure_category(&self, name: &str) -> Result<()> {
        if self.category(name).is_none() {
            return Err(TaskflowError::category_not_found(name));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.last_modified = now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_and_home() -> AppData {
        let config = Arc::new(AppConfig {
            default_categories: vec!["Work".to_string(), "Home".to_string()],
            ..AppConfig::default()
        });
        AppData::new(config)
    }

    fn task_id(data: &mut AppData, title: &str, category: &str) -> String {
        data.add_task(TaskData::new(title, category))
            .expect("task should be added")
            .id
            .clone()
    }

    #[test]
    fn new_seeds_default_categories() {
        let data = AppData::default();
        let names: Vec<&str> = data.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Websites", "Projects", "Personal", "Work"]);
        assert!(data.tasks().is_empty());
        assert_eq!(data.version(), "1.0.0");
    }

    #[test]
    fn add_task_appears_exactly_once_in_its_category() {
        let mut data = work_and_home();
        let before = data.last_modified();
        let id = task_id(&mut data, "Ship release", "Work");

        let in_work = data.tasks_by_category("Work");
        assert_eq!(in_work.iter().filter(|task| task.id == id).count(), 1);
        assert!(data.tasks_by_category("Home").is_empty());
        assert!(data.last_modified() >= before);
    }

    #[test]
    fn add_task_rejects_invalid_fields_without_appending() {
        let mut data = work_and_home();

        let err = data
            .add_task(TaskData::new("a".repeat(201), "Work"))
            .unwrap_err();
        assert_eq!(
            err.validation_errors(),
            ["Title must be less than 200 characters"]
        );

        let err = data.add_task(TaskData::new("", "Work")).unwrap_err();
        assert_eq!(err.validation_errors(), ["Title is required"]);

        let err = data.add_task(TaskData::new("", "")).unwrap_err();
        assert_eq!(
            err.validation_errors(),
            ["Title is required", "Category is required"]
        );
        assert!(data.tasks().is_empty());
    }

    #[test]
    fn add_task_requires_an_existing_category_and_unique_id() {
        let mut data = work_and_home();
        let err = data.add_task(TaskData::new("x", "Garden")).unwrap_err();
        assert!(matches!(
            err,
            TaskflowError::NotFound {
                kind: EntityKind::Category,
                ..
            }
        ));

        let id = task_id(&mut data, "first", "Work");
        let dup = TaskData {
            id: Some(id),
            ..TaskData::new("second", "Work")
        };
        let err = data.add_task(dup).unwrap_err();
        assert!(matches!(
            err,
            TaskflowError::AlreadyExists {
                kind: EntityKind::Task,
                ..
            }
        ));
        assert_eq!(data.tasks().len(), 1);
    }

    #[test]
    fn update_task_commits_valid_changes() {
        let mut data = work_and_home();
        let id = task_id(&mut data, "draft", "Work");
        let created_at = data.task(&id).unwrap().created_at;

        let updated = data
            .update_task(
                &id,
                &TaskPatch {
                    title: Some("final".to_string()),
                    category: Some("Home".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(updated.category, "Home");
        assert_eq!(updated.created_at, created_at);
        assert_eq!(data.tasks_by_category("Home").len(), 1);
    }

    #[test]
    fn rejected_update_leaves_task_unchanged() {
        let mut data = work_and_home();
        let id = task_id(&mut data, "keep me", "Work");
        let original = data.task(&id).unwrap().clone();

        let err = data.update_task(&id, &TaskPatch::title("")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid task update: Title is required");
        assert_eq!(data.task(&id), Some(&original));

        let err = data
            .update_task(
                &id,
                &TaskPatch {
                    category: Some("Nowhere".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Category not found");
        assert_eq!(data.task(&id), Some(&original));

        let err = data.update_task("missing", &TaskPatch::title("x")).unwrap_err();
        assert_eq!(err.to_string(), "Task not found");
    }

    #[test]
    fn toggle_task_flips_completion() {
        let mut data = work_and_home();
        let id = task_id(&mut data, "toggle", "Work");
        assert!(data.toggle_task(&id).unwrap().completed);
        assert!(!data.toggle_task(&id).unwrap().completed);
        assert!(data.toggle_task("missing").is_err());
    }

    #[test]
    fn delete_task_returns_removed_task() {
        let mut data = work_and_home();
        let id = task_id(&mut data, "gone", "Work");
        let removed = data.delete_task(&id).unwrap();
        assert_eq!(removed.title, "gone");
        assert!(data.tasks().is_empty());
        assert_eq!(data.delete_task(&id).unwrap_err().to_string(), "Task not found");
    }

    #[test]
    fn add_category_rejects_duplicates_and_invalid_names() {
        let mut data = work_and_home();
        data.add_category(CategoryData::new("Garden")).unwrap();
        assert_eq!(data.categories().len(), 3);

        let err = data.add_category(CategoryData::new("Garden")).unwrap_err();
        assert_eq!(err.to_string(), "Category already exists");
        assert_eq!(data.categories().len(), 3);

        // Exact, case-sensitive match.
        data.add_category(CategoryData::new("garden")).unwrap();
        assert_eq!(data.categories().len(), 4);

        let err = data.add_category(CategoryData::new("  ")).unwrap_err();
        assert_eq!(err.validation_errors(), ["Category name is required"]);
        assert_eq!(data.categories().len(), 4);
    }

    #[test]
    fn delete_category_cascades_to_its_tasks_only() {
        let mut data = work_and_home();
        task_id(&mut data, "A", "Work");
        let b = task_id(&mut data, "B", "Home");

        let removed = data.delete_category("Work").unwrap();
        assert_eq!(removed.name, "Work");

        let remaining: Vec<&str> = data.tasks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(remaining, vec![b.as_str()]);
        let names: Vec<&str> = data.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Home"]);

        assert_eq!(
            data.delete_category("Work").unwrap_err().to_string(),
            "Category not found"
        );
    }

    #[test]
    fn categories_with_counts_and_stats() {
        let mut data = work_and_home();
        let a = task_id(&mut data, "A", "Work");
        task_id(&mut data, "B", "Work");
        task_id(&mut data, "C", "Home");
        data.toggle_task(&a).unwrap();

        let counts = data.categories_with_counts();
        assert_eq!(counts[0].category.name, "Work");
        assert_eq!(counts[0].task_count, 2);
        assert_eq!(counts[0].completed_count, 1);
        assert_eq!(counts[1].task_count, 1);
        assert_eq!(counts[1].completed_count, 0);

        let stats = data.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.completion_rate, 33);

        assert_eq!(AppData::default().stats().completion_rate, 0);
    }

    #[test]
    fn plain_data_round_trip_preserves_state() {
        let mut data = work_and_home();
        let a = task_id(&mut data, "Buy \"milk\", eggs", "Work");
        task_id(&mut data, "B", "Home");
        data.toggle_task(&a).unwrap();

        let back = AppData::from_plain_data(data.to_plain_data(), data.config().clone());
        assert_eq!(back.tasks(), data.tasks());
        assert_eq!(back.categories(), data.categories());
        assert_eq!(back.version(), data.version());
        assert_eq!(back.last_modified(), data.last_modified());
        assert_eq!(back, data);
    }

    #[test]
    fn from_plain_data_fills_missing_pieces() {
        let record: AppDataRecord = serde_json::from_str(r#"{ "tasks": null }"#).unwrap();
        let data = AppData::from_plain_data(record, Arc::new(AppConfig::default()));
        assert!(data.tasks().is_empty());
        assert!(data.categories().is_empty());
        assert_eq!(data.version(), "1.0.0");

        let record: AppDataRecord = serde_json::from_str(
            r#"{
              "tasks": [{ "id": "t1", "title": "orphan", "category": "Gone" }],
              "version": "0.9.0",
              "lastModified": "2024-05-01T08:00:00.000Z"
            }"#,
        )
        .unwrap();
        let data = AppData::from_plain_data(record, Arc::new(AppConfig::default()));
        assert_eq!(data.version(), "0.9.0");
        assert_eq!(
            format_timestamp(&data.last_modified()),
            "2024-05-01T08:00:00.000Z"
        );
        // Loading is permissive: orphaned tasks survive and can still be toggled.
        assert_eq!(data.task("t1").unwrap().category, "Gone");
        let mut data = data;
        assert!(data.toggle_task("t1").unwrap().completed);
    }

    #[test]
    fn from_plain_data_keeps_the_first_duplicate() {
        let record: AppDataRecord = serde_json::from_str(
            r##"{
              "tasks": [
                { "id": "t1", "title": "first", "category": "Work" },
                { "id": "t1", "title": "second", "category": "Work" },
                { "id": "t2", "title": "other", "category": "Work" }
              ],
              "categories": [
                { "name": "Work", "color": "#10B981" },
                { "name": "Work", "color": "#EF4444" },
                { "name": "Home" }
              ]
            }"##,
        )
        .unwrap();
        let mut data = AppData::from_plain_data(record, Arc::new(AppConfig::default()));

        let titles: Vec<&str> = data.tasks().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["first", "other"]);
        let names: Vec<&str> = data.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Work", "Home"]);
        assert_eq!(data.category("Work").unwrap().color, "#10B981");

        data.delete_category("Work").unwrap();
        assert!(data.category("Work").is_none());
        assert!(data.tasks().is_empty());
    }

    const STALE: &str = "2000-01-01T00:00:00.000Z";

    fn aged(data: &AppData) -> AppData {
        let mut record = data.to_plain_data();
        record.last_modified = Some(STALE.to_string());
        AppData::from_plain_data(record, data.config().clone())
    }

    #[test]
    fn every_mutation_refreshes_last_modified() {
        let stale = parse_timestamp(STALE).unwrap();
        let mut data = aged(&work_and_home());
        assert_eq!(data.last_modified(), stale);

        let id = task_id(&mut data, "a", "Work");
        assert!(data.last_modified() > stale);

        data = aged(&data);
        data.update_task(&id, &TaskPatch::title("b")).unwrap();
        assert!(data.last_modified() > stale);

        data = aged(&data);
        data.toggle_task(&id).unwrap();
        assert!(data.last_modified() > stale);

        data = aged(&data);
        data.add_category(CategoryData::new("Garden")).unwrap();
        assert!(data.last_modified() > stale);

        data = aged(&data);
        data.delete_task(&id).unwrap();
        assert!(data.last_modified() > stale);

        data = aged(&data);
        data.delete_category("Garden").unwrap();
        assert!(data.last_modified() > stale);

        data = aged(&data);
        assert!(data.update_task("missing", &TaskPatch::title("x")).is_err());
        assert!(data.add_category(CategoryData::new("Work")).is_err());
        assert!(data.delete_category("Nowhere").is_err());
        assert_eq!(data.last_modified(), stale);
    }
}
