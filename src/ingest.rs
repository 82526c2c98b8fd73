//! Batch ingestion of contract files (`crag ingest`).
//!
//! Runs every file through the same [`Pipeline`](contract_rag_core::pipeline::Pipeline)
//! the HTTP server uses. A failing file is reported and the batch continues;
//! the command fails at the end if any file failed.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use contract_rag_core::chunk::chunk_document;
use contract_rag_core::identity::identify;
use contract_rag_core::models::{DocumentId, IngestStatus};
use contract_rag_core::normalize::normalize_text;

use crate::app::build_pipeline;
use crate::config::Config;
use crate::extract::extract_text;
use crate::tokenizer::load_tokenizer;

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub contract_id: Option<DocumentId>,
    pub status: String,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn run_ingest(config: &Config, files: &[PathBuf], dry_run: bool, json: bool) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }

    let reports = if dry_run {
        dry_run_reports(config, files).await?
    } else {
        ingest_reports(config, files).await?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_reports(&reports, dry_run);
    }

    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!("{} of {} file(s) failed to ingest", failed, reports.len());
    }
    Ok(())
}

async fn ingest_reports(config: &Config, files: &[PathBuf]) -> Result<Vec<FileReport>> {
    let pipeline = build_pipeline(config).await?;
    let mut reports = Vec::with_capacity(files.len());

    for file in files {
        let bytes = match read_file(file) {
            Ok(b) => b,
            Err(e) => {
                reports.push(failed(file, None, format!("{:#}", e)));
                continue;
            }
        };
        match pipeline.ingest(&bytes).await {
            Ok(report) => reports.push(FileReport {
                file: file.clone(),
                contract_id: Some(report.contract_id),
                status: report.status.to_string(),
                chunks: report.chunks,
                error: None,
            }),
            Err(e) => {
                tracing::error!(file = %file.display(), code = e.code(), "ingest failed: {}", e);
                reports.push(failed(file, Some(identify(&bytes)), e.to_string()));
            }
        }
    }
    Ok(reports)
}

/// Identity and chunk counts only: no embedding model, no store writes.
async fn dry_run_reports(config: &Config, files: &[PathBuf]) -> Result<Vec<FileReport>> {
    let tokenizer = load_tokenizer(&config.chunking.tokenizer).await?;
    let params = config.chunking.params()?;
    let mut reports = Vec::with_capacity(files.len());

    for file in files {
        let bytes = match read_file(file) {
            Ok(b) => b,
            Err(e) => {
                reports.push(failed(file, None, format!("{:#}", e)));
                continue;
            }
        };
        let id = identify(&bytes);
        let chunked = extract_text(&bytes)
            .map_err(anyhow::Error::from)
            .and_then(|raw| {
                chunk_document(&id, tokenizer.as_ref(), &normalize_text(&raw), &params)
                    .map_err(anyhow::Error::from)
            });
        match chunked {
            Ok(doc) => reports.push(FileReport {
                file: file.clone(),
                contract_id: Some(id),
                status: "dry-run".to_string(),
                chunks: doc.chunks.len(),
                error: None,
            }),
            Err(e) => reports.push(failed(file, Some(id), format!("{:#}", e))),
        }
    }
    Ok(reports)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn failed(file: &Path, contract_id: Option<DocumentId>, error: String) -> FileReport {
    FileReport {
        file: file.to_path_buf(),
        contract_id,
        status: "failed".to_string(),
        chunks: 0,
        error: Some(error),
    }
}

fn print_reports(reports: &[FileReport], dry_run: bool) {
    println!("ingest{}", if dry_run { " (dry-run)" } else { "" });
    for r in reports {
        let id = r
            .contract_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {}", r.file.display());
        println!("    contract_id: {}", id);
        println!("    status:      {}", r.status);
        println!("    chunks:      {}", r.chunks);
        if let Some(ref err) = r.error {
            println!("    error:       {}", err);
        }
    }

    let indexed = reports
        .iter()
        .filter(|r| r.status == IngestStatus::Indexed.to_string())
        .count();
    let duplicates = reports
        .iter()
        .filter(|r| r.status == IngestStatus::Duplicate.to_string())
        .count();
    if !dry_run {
        println!(
            "  indexed: {}, duplicate: {}, failed: {}",
            indexed,
            duplicates,
            reports.iter().filter(|r| r.error.is_some()).count()
        );
    }
}
