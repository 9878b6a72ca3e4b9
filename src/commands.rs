use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_data::AppData;
use crate::config::AppConfig;
use crate::error::Result;
use crate::events::{StatePayload, EVENT_STATE_UPDATED};
use crate::export::{
    ExportFile, ExportFormat, ExportManager, ExportMetadata, ExportOptions, SkippedRow,
};
use crate::models::{
    AppStats, Category, CategoryData, CategoryWithCounts, Task, TaskData, TaskPatch,
};
use crate::state::AppState;
use crate::storage::{KeyValueStore, LoadResult, StorageInfo, StorageManager};

/// Uniform envelope handed back to the UI. Commands never panic and never return `Err`.
#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// What a host shell provides to the command layer: durable storage plus a way to tell the
/// UI that the live state changed.
pub trait CommandCtx {
    fn config(&self) -> &Arc<AppConfig>;
    fn load(&self) -> LoadResult;
    /// Persists the live state. Implementations snapshot it themselves so concurrent saves
    /// can be ordered.
    fn save(&self, state: &AppState) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn storage_info(&self) -> Result<StorageInfo>;
    fn emit_state_updated(&self, payload: StatePayload);
}

impl<S: KeyValueStore> CommandCtx for StorageManager<S> {
    fn config(&self) -> &Arc<AppConfig> {
        StorageManager::config(self)
    }

    fn load(&self) -> LoadResult {
        StorageManager::load(self)
    }

    fn save(&self, state: &AppState) -> Result<()> {
        StorageManager::save_state(self, state)
    }

    fn clear(&self) -> Result<()> {
        StorageManager::clear(self)
    }

    fn storage_info(&self) -> Result<StorageInfo> {
        StorageManager::storage_info(self)
    }

    fn emit_state_updated(&self, payload: StatePayload) {
        log::debug!(
            "{EVENT_STATE_UPDATED} tasks={} categories={}",
            payload.tasks.len(),
            payload.categories.len()
        );
    }
}

/// Summary of an import that replaced the live state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub tasks: usize,
    pub categories: usize,
    pub skipped: Vec<SkippedRow>,
    pub metadata: Option<ExportMetadata>,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        success: true,
        data: Some(data),
        error: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        success: false,
        data: None,
        error: Some(message.to_string()),
    }
}

fn payload(state: &AppState) -> StatePayload {
    state.read(|data| StatePayload {
        tasks: data.tasks().to_vec(),
        categories: data.categories().to_vec(),
    })
}

/// Saves the live state and notifies the host. The notification goes out even when the save
/// fails; the in-memory mutation is kept.
fn persist(ctx: &impl CommandCtx, state: &AppState) -> Result<()> {
    let saved = ctx.save(state);
    ctx.emit_state_updated(payload(state));
    saved
}

fn finish<T>(ctx: &impl CommandCtx, state: &AppState, outcome: Result<T>) -> CommandResult<T> {
    match outcome {
        Ok(value) => match persist(ctx, state) {
            Ok(()) => ok(value),
            Err(error) => err(&error.to_string()),
        },
        Err(error) => {
            log::debug!("command rejected: {error}");
            err(&error.to_string())
        }
    }
}

/// Replaces the live state with whatever storage holds. When loading fails the fresh
/// fallback aggregate is still installed and returned alongside the error.
pub fn load_state(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<StatePayload> {
    let LoadResult { data, error } = ctx.load();
    state.replace(data);
    let current = payload(state);
    match error {
        None => ok(current),
        Some(error) => CommandResult {
            success: false,
            data: Some(current),
            error: Some(error.to_string()),
        },
    }
}

pub fn create_task(ctx: &impl CommandCtx, state: &AppState, task: TaskData) -> CommandResult<Task> {
    finish(ctx, state, state.add_task(task))
}

pub fn update_task(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: &str,
    patch: TaskPatch,
) -> CommandResult<Task> {
    finish(ctx, state, state.update_task(task_id, &patch))
}

pub fn toggle_task(ctx: &impl CommandCtx, state: &AppState, task_id: &str) -> CommandResult<Task> {
    finish(ctx, state, state.toggle_task(task_id))
}

pub fn delete_task(ctx: &impl CommandCtx, state: &AppState, task_id: &str) -> CommandResult<Task> {
    finish(ctx, state, state.delete_task(task_id))
}

pub fn create_category(
    ctx: &impl CommandCtx,
    state: &AppState,
    category: CategoryData,
) -> CommandResult<Category> {
    finish(ctx, state, state.add_category(category))
}

pub fn delete_category(
    ctx: &impl CommandCtx,
    state: &AppState,
    name: &str,
) -> CommandResult<Category> {
    finish(ctx, state, state.delete_category(name))
}

pub fn tasks_by_category(state: &AppState, name: &str) -> CommandResult<Vec<Task>> {
    ok(state.tasks_by_category(name))
}

pub fn categories_with_counts(state: &AppState) -> CommandResult<Vec<CategoryWithCounts>> {
    ok(state.categories_with_counts())
}

pub fn stats(state: &AppState) -> CommandResult<AppStats> {
    ok(state.stats())
}

pub fn storage_info(ctx: &impl CommandCtx) -> CommandResult<StorageInfo> {
    match ctx.storage_info() {
        Ok(info) => ok(info),
        Err(error) => err(&error.to_string()),
    }
}

pub fn export_data(
    ctx: &impl CommandCtx,
    state: &AppState,
    format: &str,
    options: ExportOptions,
) -> CommandResult<String> {
    let exporter = ExportManager::new(ctx.config().clone());
    let outcome = format
        .parse::<ExportFormat>()
        .and_then(|format| state.read(|data| exporter.export(data, format, &options)));
    match outcome {
        Ok(content) => ok(content),
        Err(error) => err(&error.to_string()),
    }
}

pub fn quick_export(
    ctx: &impl CommandCtx,
    state: &AppState,
    format: &str,
) -> CommandResult<ExportFile> {
    let exporter = ExportManager::new(ctx.config().clone());
    let outcome = format
        .parse::<ExportFormat>()
        .and_then(|format| state.read(|data| exporter.quick_export(data, format)));
    match outcome {
        Ok(file) => ok(file),
        Err(error) => err(&error.to_string()),
    }
}

/// Quick export written straight to `dir`. Returns the written path.
pub fn export_to_dir(
    ctx: &impl CommandCtx,
    state: &AppState,
    format: &str,
    dir: &Path,
) -> CommandResult<PathBuf> {
    let exporter = ExportManager::new(ctx.config().clone());
    let outcome = format
        .parse::<ExportFormat>()
        .and_then(|format| state.read(|data| exporter.quick_export(data, format)))
        .and_then(|file| exporter.write_export(dir, &file));
    match outcome {
        Ok(path) => ok(path),
        Err(error) => err(&error.to_string()),
    }
}

fn parse_import(
    config: &Arc<AppConfig>,
    format: &str,
    content: &str,
) -> Result<(AppData, ImportSummary)> {
    let importer = ExportManager::new(config.clone());
    let (data, skipped, metadata) = match format.parse::<ExportFormat>()? {
        ExportFormat::Json => {
            let imported = importer.import_json(content)?;
            (imported.data, Vec::new(), imported.metadata)
        }
        ExportFormat::Csv => {
            let imported = importer.import_csv(content)?;
            (imported.data, imported.skipped, None)
        }
    };
    let summary = ImportSummary {
        tasks: data.tasks().len(),
        categories: data.categories().len(),
        skipped,
        metadata,
    };
    Ok((data, summary))
}

/// Parses `content` and, only if that succeeds, replaces the live state with it.
pub fn import_data(
    ctx: &impl CommandCtx,
    state: &AppState,
    format: &str,
    content: &str,
) -> CommandResult<ImportSummary> {
    let outcome = parse_import(ctx.config(), format, content).map(|(data, summary)| {
        log::info!(
            "import replaced state tasks={} categories={} skipped={}",
            summary.tasks,
            summary.categories,
            summary.skipped.len()
        );
        state.replace(data);
        summary
    });
    finish(ctx, state, outcome)
}

/// Clears the stored record and starts over with a fresh aggregate.
pub fn reset_data(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<StatePayload> {
    if let Err(error) = ctx.clear() {
        return err(&error.to_string());
    }
    state.replace(AppData::new(ctx.config().clone()));
    let outcome: Result<StatePayload> = Ok(payload(state));
    finish(ctx, state, outcome)
}
