//! Upload and status command handlers.
//!
//! Uploads return as soon as the document is accepted; processing runs in
//! the background unless `--wait` is given.

use super::context::{open_service, print_json, split_list, IdentityArgs};
use super::tenant::parse_access_level;
use clap::Args;
use kbase_core::{config::AppConfig, AppError, AppResult};
use kbase_knowledge::{
    Caller, ContentType, DocumentStatus, IngestHandle, KnowledgeService, NewDocument, UploadedFile,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Upload files or directories
#[derive(Args, Debug)]
pub struct UploadCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Files or directories to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Document title (single file only; default: file name)
    #[arg(long)]
    pub title: Option<String>,

    /// Description
    #[arg(long)]
    pub description: Option<String>,

    /// Tags (comma-separated)
    #[arg(long)]
    pub tags: Vec<String>,

    /// Category
    #[arg(long)]
    pub category: Option<String>,

    /// Department (default: the uploader's)
    #[arg(long)]
    pub department: Option<String>,

    /// Access level (public, department, private; default: tenant setting)
    #[arg(long)]
    pub access: Option<String>,

    /// Replace the chunks of an existing document instead of uploading a new one
    #[arg(long, value_name = "DOCUMENT_ID")]
    pub replace: Option<String>,

    /// Wait for processing to finish
    #[arg(long)]
    pub wait: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadReport {
    path: String,
    document_id: String,
    status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl UploadCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing upload command");

        let files = collect_files(&self.paths)?;
        if files.is_empty() {
            return Err(AppError::Validation("No supported files found".to_string()));
        }
        if files.len() > 1 && (self.title.is_some() || self.replace.is_some()) {
            return Err(AppError::Validation(
                "--title and --replace need exactly one file".to_string(),
            ));
        }

        let access_level = self.access.as_deref().map(parse_access_level).transpose()?;
        let service = open_service(config)?;
        let caller = self.identity.caller();

        let mut reports = Vec::with_capacity(files.len());
        for path in &files {
            let file = read_upload(path)?;

            let (document_id, handle) = match &self.replace {
                Some(document_id) => {
                    let handle = service.reprocess_document(&caller, document_id, file).await?;
                    (document_id.clone(), handle)
                }
                None => {
                    let metadata = NewDocument {
                        title: self.title.clone().unwrap_or_else(|| default_title(path)),
                        description: self.description.clone(),
                        tags: split_list(&self.tags),
                        category: self.category.clone(),
                        department: self.department.clone(),
                        access_level,
                    };
                    let (document, handle) = service.upload_document(&caller, file, metadata).await?;
                    (document.id, handle)
                }
            };

            let report = self.finish(path, document_id, handle, &service, &caller).await?;
            if !self.json {
                println!(
                    "{} -> {} [{}]{}",
                    report.path,
                    report.document_id,
                    report.status,
                    report.error.as_deref().map(|e| format!(" {}", e)).unwrap_or_default()
                );
            }
            reports.push(report);
        }

        if self.json {
            print_json(&reports)?;
        }

        Ok(())
    }

    async fn finish(
        &self,
        path: &Path,
        document_id: String,
        handle: IngestHandle,
        service: &KnowledgeService,
        caller: &Caller,
    ) -> AppResult<UploadReport> {
        let (status, error) = if self.wait {
            handle.wait().await?;
            let report = service.get_document_status(caller, &document_id)?;
            (report.status, report.error)
        } else {
            (DocumentStatus::Processing, None)
        };

        Ok(UploadReport {
            path: path.display().to_string(),
            document_id,
            status,
            error,
        })
    }
}

/// Show a document's processing status
#[derive(Args, Debug)]
pub struct StatusCommand {
    #[command(flatten)]
    pub identity: IdentityArgs,

    /// Document id
    pub document_id: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let service = open_service(config)?;
        let report = service.get_document_status(&self.identity.caller(), &self.document_id)?;

        if self.json {
            return print_json(&report);
        }

        match &report.error {
            Some(error) => println!("{}: {} ({})", self.document_id, report.status, error),
            None => println!("{}: {}", self.document_id, report.status),
        }
        Ok(())
    }
}

/// Expand directories into the supported files they contain.
///
/// Explicit file arguments are always kept; unsupported types then fail
/// during processing.
fn collect_files(paths: &[PathBuf]) -> AppResult<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(AppError::NotFound(format!("Path does not exist: {:?}", path)));
        }

        for entry in WalkDir::new(path).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| AppError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if ContentType::detect(&name, None) == ContentType::Unsupported {
                tracing::debug!("Skipping unsupported file {:?}", entry.path());
                continue;
            }
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn read_upload(path: &Path) -> AppResult<UploadedFile> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(UploadedFile::new(file_name, bytes))
}

fn default_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_else(|| path.display().to_string())
}
