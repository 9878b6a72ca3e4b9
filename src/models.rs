use serde::{Deserialize, Deserializer, Serialize};

use crate::config::AppConfig;
use crate::error::{Result, TaskflowError};
use crate::utils::{format_timestamp, generate_id, now, parse_timestamp, sanitize_text};

pub use crate::utils::Timestamp;

/// Outcome of an entity-level validation. Never an error by itself; the aggregate decides
/// whether to reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Validation {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn into_result(self, subject: &'static str) -> Result<()> {
        if self.is_valid {
            return Ok(());
        }
        Err(TaskflowError::Validation {
            subject,
            errors: self.errors,
        })
    }
}

/// Plain-data form of a task: the persisted record, the JSON export row and the field set
/// accepted when creating one. Missing or `null` fields fall back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl TaskData {
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "TaskData")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub color: String,
    pub completed: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    /// Builds a task from a field set. Does not validate: an invalid task may exist until the
    /// aggregate rejects it.
    pub fn new(data: TaskData, config: &AppConfig) -> Self {
        let created_at = timestamp_or_now(data.created_at.as_deref());
        let updated_at = timestamp_or_now(data.updated_at.as_deref());
        Self {
            id: non_empty(data.id).unwrap_or_else(generate_id),
            title: sanitize_text(&data.title),
            description: sanitize_text(&data.description),
            category: sanitize_text(&data.category),
            color: non_empty(data.color).unwrap_or_else(|| config.default_color().to_string()),
            completed: data.completed,
            created_at,
            updated_at,
        }
    }

    pub fn validate(&self, config: &AppConfig) -> Validation {
        let mut errors = Vec::new();
        if self.title.is_empty() {
            errors.push("Title is required".to_string());
        }
        if self.title.chars().count() > config.max_task_length {
            errors.push(format!(
                "Title must be less than {} characters",
                config.max_task_length
            ));
        }
        if self.category.is_empty() {
            errors.push("Category is required".to_string());
        }
        Validation::from_errors(errors)
    }

    /// Applies the patch and refreshes `updated_at`. `id` and `created_at` are not patchable;
    /// a blank color falls back to the palette default as it does on construction.
    pub fn update(&mut self, patch: &TaskPatch, config: &AppConfig) {
        if let Some(title) = &patch.title {
            self.title = sanitize_text(title);
        }
        if let Some(description) = &patch.description {
            self.description = sanitize_text(description);
        }
        if let Some(category) = &patch.category {
            self.category = sanitize_text(category);
        }
        if let Some(color) = &patch.color {
            self.color = non_empty(Some(color.clone()))
                .unwrap_or_else(|| config.default_color().to_string());
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        self.updated_at = now();
    }

    pub fn to_plain_data(&self) -> TaskData {
        TaskData {
            id: Some(self.id.clone()),
            title: self.title.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            color: Some(self.color.clone()),
            completed: self.completed,
            created_at: Some(format_timestamp(&self.created_at)),
            updated_at: Some(format_timestamp(&self.updated_at)),
        }
    }

    pub fn from_plain_data(data: TaskData, config: &AppConfig) -> Self {
        Self::new(data, config)
    }
}

impl From<Task> for TaskData {
    fn from(task: Task) -> Self {
        task.to_plain_data()
    }
}

/// Partial update for a task. Unknown keys such as `id` or `createdAt` are ignored when the
/// patch is deserialized from a UI payload.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl CategoryData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "CategoryData")]
pub struct Category {
    pub name: String,
    pub color: String,
    pub created_at: Timestamp,
}

impl Category {
    pub fn new(data: CategoryData, config: &AppConfig) -> Self {
        Self {
            name: sanitize_text(&data.name),
            color: non_empty(data.color).unwrap_or_else(|| config.default_color().to_string()),
            created_at: timestamp_or_now(data.created_at.as_deref()),
        }
    }

    pub fn validate(&self, config: &AppConfig) -> Validation {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push("Category name is required".to_string());
        }
        if self.name.chars().count() > config.max_category_length {
            errors.push(format!(
                "Category name must be less than {} characters",
                config.max_category_length
            ));
        }
        Validation::from_errors(errors)
    }

    pub fn to_plain_data(&self) -> CategoryData {
        CategoryData {
            name: self.name.clone(),
            color: Some(self.color.clone()),
            created_at: Some(format_timestamp(&self.created_at)),
        }
    }

    pub fn from_plain_data(data: CategoryData, config: &AppConfig) -> Self {
        Self::new(data, config)
    }
}

impl From<Category> for CategoryData {
    fn from(category: Category) -> Self {
        category.to_plain_data()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCounts {
    #[serde(flatten)]
    pub category: Category,
    pub task_count: usize,
    pub completed_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub categories: usize,
    /// Whole percent, 0 when there are no tasks.
    pub completion_rate: u32,
}

pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn timestamp_or_now(raw: Option<&str>) -> Timestamp {
    match raw {
        Some(raw) => parse_timestamp(raw).unwrap_or_else(|| {
            log::warn!("unparsable timestamp {raw:?}, using current time");
            now()
        }),
        None => now(),
    }
}
