//! `write_files`: a minimal leaf step that serializes context artifacts to
//! disk. String content is written verbatim; non-string content is
//! serialized as JSON with 2-space indentation.
//!
//! Two config shapes are accepted, mirroring `read_files`:
//! - `files: [{ path, content_key }]` (+ optional `root`): for each entry,
//!   write the artifact named `content_key` to `root/path`.
//! - `input_key` (default `"files"`): write the canonical file-list
//!   artifact, `[{ path, content }]`, directly.

use crate::context::Context;
use crate::registry::StepArgs;
use crate::step::Step;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

struct FileRef {
    path: String,
    content_key: String,
}

enum Mode {
    ByKey { root: String, files: Vec<FileRef> },
    FileList { input_key: String },
}

pub struct WriteFilesStep {
    mode: Mode,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;

    let mode = match cfg.get("files").and_then(Value::as_array) {
        Some(entries) => {
            let root = cfg
                .get("root")
                .and_then(Value::as_str)
                .unwrap_or(".")
                .to_string();
            let files = entries
                .iter()
                .map(|entry| {
                    let path = entry
                        .get("path")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow::anyhow!("write_files: file entry missing `path`"))?
                        .to_string();
                    let content_key = entry
                        .get("content_key")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow::anyhow!("write_files: file entry missing `content_key`"))?
                        .to_string();
                    Ok(FileRef { path, content_key })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Mode::ByKey { root, files }
        }
        None => {
            let input_key = cfg
                .get("input_key")
                .and_then(Value::as_str)
                .unwrap_or("files")
                .to_string();
            Mode::FileList { input_key }
        }
    };

    Ok(Box::new(WriteFilesStep { mode }))
}

fn content_to_text(content: &Value) -> anyhow::Result<String> {
    Ok(match content {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other)?,
    })
}

async fn write_one(path: &Path, text: String) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, text).await?;
    Ok(())
}

#[async_trait]
impl Step for WriteFilesStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        match &self.mode {
            Mode::ByKey { root, files } => {
                for file in files {
                    let content = context.get(&file.content_key).cloned().ok_or_else(|| {
                        anyhow::anyhow!("write_files: artifact '{}' not found", file.content_key)
                    })?;
                    let text = content_to_text(&content)?;
                    let full_path = PathBuf::from(root).join(&file.path);
                    write_one(&full_path, text).await?;
                }
            }
            Mode::FileList { input_key } => {
                let entries = context
                    .get(input_key)
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("write_files: artifact '{input_key}' is not a file list"))?;

                for entry in entries {
                    let path = entry
                        .get("path")
                        .and_then(Value::as_str)
                        .ok_or_else(|| anyhow::anyhow!("write_files: file entry missing `path`"))?;
                    let content = entry
                        .get("content")
                        .ok_or_else(|| anyhow::anyhow!("write_files: file entry missing `content`"))?;
                    let text = content_to_text(content)?;
                    write_one(Path::new(path), text).await?;
                }
            }
        }
        Ok(())
    }
}
