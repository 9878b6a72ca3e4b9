//! TaskFlow core: categorized tasks, their persistence to a key-value slot, and JSON/CSV
//! export and import. UI shells drive it through [`commands`] or a [`Session`].

pub mod app_data;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod export;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod storage;
pub mod utils;

pub use crate::app_data::{AppData, AppDataRecord};
pub use crate::commands::{CommandCtx, CommandResult};
pub use crate::config::AppConfig;
pub use crate::error::{EntityKind, Result, TaskflowError};
pub use crate::export::{ExportFile, ExportFormat, ExportManager, ExportOptions};
pub use crate::models::{Category, CategoryData, Task, TaskData, TaskPatch};
pub use crate::session::Session;
pub use crate::state::AppState;
pub use crate::storage::{FileStore, KeyValueStore, MemoryStore, StorageError, StorageManager};
