use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::app_data::{AppData, AppDataRecord};
use crate::config::AppConfig;
use crate::error::{Result, TaskflowError};
use crate::models::{Category, CategoryData, Task, TaskData};
use crate::storage::{write_atomic, StorageError};
use crate::utils::{format_display_date, format_timestamp, now, parse_display_date};

const CSV_HEADERS: [&str; 8] = [
    "ID",
    "Title",
    "Description",
    "Category",
    "Color",
    "Completed",
    "Created Date",
    "Updated Date",
];
const CSV_MIN_FIELDS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = TaskflowError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(TaskflowError::UnsupportedFormat(raw.to_string())),
        }
    }
}

/// Restricts which tasks end up in an export. The source aggregate is never modified.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    #[serde(default)]
    pub category_filter: Option<String>,
    /// `Some(true)` keeps only completed tasks, `Some(false)` only pending ones.
    #[serde(default)]
    pub completed_only: Option<bool>,
}

impl ExportOptions {
    fn matches(&self, category: &str, completed: bool) -> bool {
        if let Some(filter) = self.category_filter.as_deref().filter(|f| !f.is_empty()) {
            if category != filter {
                return false;
            }
        }
        self.completed_only.map_or(true, |wanted| completed == wanted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub export_date: String,
    pub version: String,
    pub total_tasks: usize,
    pub total_categories: usize,
}

#[derive(Debug, Serialize)]
struct ExportDocument {
    metadata: ExportMetadata,
    data: AppDataRecord,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExportFile {
    pub filename: String,
    pub mime_type: String,
    pub content: String,
}

#[derive(Debug)]
pub struct JsonImport {
    pub data: AppData,
    pub metadata: Option<ExportMetadata>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedRow {
    /// 1-based line where the record starts.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct CsvImport {
    pub data: AppData,
    pub skipped: Vec<SkippedRow>,
}

pub struct ExportManager {
    config: Arc<AppConfig>,
}

impl ExportManager {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self { config }
    }

    pub fn export(
        &self,
        data: &AppData,
        format: ExportFormat,
        options: &ExportOptions,
    ) -> Result<String> {
        match format {
            ExportFormat::Json => self.export_json(data, options),
            ExportFormat::Csv => self.export_csv(data, options),
        }
    }

    /// Metadata plus the full persisted record; `options` only narrow the task list.
    pub fn export_json(&self, data: &AppData, options: &ExportOptions) -> Result<String> {
        let mut record = data.to_plain_data();
        record
            .tasks
            .retain(|task| options.matches(&task.category, task.completed));
        let document = ExportDocument {
            metadata: ExportMetadata {
                export_date: format_timestamp(&now()),
                version: data.version().to_string(),
                total_tasks: data.tasks().len(),
                total_categories: data.categories().len(),
            },
            data: record,
        };
        serde_json::to_string_pretty(&document).map_err(|err| TaskflowError::Format {
            action: "export JSON data",
            reason: err.to_string(),
        })
    }

    pub fn export_csv(&self, data: &AppData, options: &ExportOptions) -> Result<String> {
        let mut lines = vec![CSV_HEADERS.join(",")];
        for task in data
            .tasks()
            .iter()
            .filter(|task| options.matches(&task.category, task.completed))
        {
            let row = [
                csv_escape(&task.id),
                csv_escape(&task.title),
                csv_escape(&task.description),
                csv_escape(&task.category),
                csv_escape(&task.color),
                (if task.completed { "Yes" } else { "No" }).to_string(),
                csv_escape(&format_display_date(&task.created_at)),
                csv_escape(&format_display_date(&task.updated_at)),
            ];
            lines.push(row.join(","));
        }
        Ok(lines.join("\n"))
    }

    /// Reads a JSON export. Only `data.tasks` is required; everything else degrades to
    /// defaults the same way a persisted record does.
    pub fn import_json(&self, raw: &str) -> Result<JsonImport> {
        let fail = |reason: String| TaskflowError::Format {
            action: "import JSON data",
            reason,
        };
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|err| fail(err.to_string()))?;
        let data = value
            .get("data")
            .filter(|data| data.get("tasks").is_some_and(|tasks| tasks.is_array()))
            .ok_or_else(|| fail("Invalid import data structure".to_string()))?;
        let record: AppDataRecord =
            serde_json::from_value(data.clone()).map_err(|err| fail(err.to_string()))?;
        let metadata = value
            .get("metadata")
            .and_then(|metadata| serde_json::from_value(metadata.clone()).ok());
        Ok(JsonImport {
            data: AppData::from_plain_data(record, self.config.clone()),
            metadata,
        })
    }

    /// Builds a fresh aggregate from CSV rows. Categories are created on first sight instead
    /// of being seeded; rows that are too short or invalid are skipped and reported.
    pub fn import_csv(&self, raw: &str) -> Result<CsvImport> {
        let records: Vec<CsvRecord> = parse_csv_records(raw.trim())
            .into_iter()
            .filter(|record| !record.is_blank())
            .collect();
        if records.len() < 2 {
            return Err(TaskflowError::Format {
                action: "import CSV data",
                reason: "CSV file must have headers and at least one data row".to_string(),
            });
        }

        let mut tasks: Vec<Task> = Vec::new();
        let mut categories: Vec<Category> = Vec::new();
        let mut skipped = Vec::new();
        for record in records.iter().skip(1) {
            match self.task_from_record(record, &tasks) {
                Ok(task) => {
                    if !categories.iter().any(|c| c.name == task.category) {
                        categories.push(Category::new(
                            CategoryData::new(task.category.as_str()),
                            &self.config,
                        ));
                    }
                    tasks.push(task);
                }
                Err(reason) => {
                    log::warn!("skipping csv row line={} reason={reason}", record.line);
                    skipped.push(SkippedRow {
                        line: record.line,
                        reason,
                    });
                }
            }
        }

        Ok(CsvImport {
            data: AppData::from_parts(self.config.clone(), tasks, categories),
            skipped,
        })
    }

    /// `<prefix>_<YYYY-MM-DD>_<n>tasks.<ext>`
    pub fn generate_filename(&self, data: &AppData, format: ExportFormat) -> String {
        build_filename(
            &self.config.export_prefix,
            now().date_naive(),
            data.tasks().len(),
            format,
        )
    }

    /// Unfiltered export with a generated filename, the one-click path.
    pub fn quick_export(&self, data: &AppData, format: ExportFormat) -> Result<ExportFile> {
        let content = self.export(data, format, &ExportOptions::default())?;
        Ok(ExportFile {
            filename: self.generate_filename(data, format),
            mime_type: format.mime_type().to_string(),
            content,
        })
    }

    pub fn write_export(&self, dir: &Path, file: &ExportFile) -> Result<PathBuf> {
        let path = dir.join(&file.filename);
        let write = || -> std::result::Result<(), StorageError> {
            fs::create_dir_all(dir)?;
            write_atomic(&path, file.content.as_bytes())
        };
        write().map_err(|source| TaskflowError::Storage {
            action: "write export file",
            source,
        })?;
        log::info!("export written path={}", path.display());
        Ok(path)
    }

    fn task_from_record(
        &self,
        record: &CsvRecord,
        imported: &[Task],
    ) -> std::result::Result<Task, String> {
        let fields = &record.fields;
        if fields.len() < CSV_MIN_FIELDS {
            return Err(format!(
                "expected at least {CSV_MIN_FIELDS} fields, found {}",
                fields.len()
            ));
        }
        let completed = matches!(fields[5].to_lowercase().as_str(), "yes" | "true");
        let mut task = Task::new(
            TaskData {
                id: Some(fields[0].clone()),
                title: fields[1].clone(),
                description: fields[2].clone(),
                category: fields[3].clone(),
                color: Some(fields[4].clone()),
                completed,
                created_at: None,
                updated_at: None,
            },
            &self.config,
        );
        if let Some(created_at) = fields.get(6).and_then(|raw| parse_display_date(raw)) {
            task.created_at = created_at;
        }
        if let Some(updated_at) = fields.get(7).and_then(|raw| parse_display_date(raw)) {
            task.updated_at = updated_at;
        }

        let verdict = task.validate(&self.config);
        if !verdict.is_valid {
            return Err(verdict.errors.join(", "));
        }
        let category = Category::new(CategoryData::new(task.category.as_str()), &self.config);
        let verdict = category.validate(&self.config);
        if !verdict.is_valid {
            return Err(verdict.errors.join(", "));
        }
        if imported.iter().any(|existing| existing.id == task.id) {
            return Err(format!("duplicate task id {}", task.id));
        }
        Ok(task)
    }
}

fn build_filename(
    prefix: &str,
    date: NaiveDate,
    task_count: usize,
    format: ExportFormat,
) -> String {
    format!(
        "{prefix}_{}_{task_count}tasks.{}",
        date.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Quotes a field when it contains a comma, quote or line break, doubling inner quotes.
pub fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CsvRecord {
    line: usize,
    fields: Vec<String>,
}

impl CsvRecord {
    fn is_blank(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].is_empty()
    }
}

/// Splits CSV text into records. Inside quotes a doubled quote is a literal quote and commas
/// or line breaks belong to the field. Fields are trimmed.
fn parse_csv_records(raw: &str) -> Vec<CsvRecord> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;

    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
                records.push(CsvRecord {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                });
                line += 1;
                record_line = line;
            }
            _ => {
                if c == '\n' {
                    line += 1;
                }
                current.push(c);
            }
        }
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current.trim().to_string());
        records.push(CsvRecord {
            line: record_line,
            fields,
        });
    }
    records
}
