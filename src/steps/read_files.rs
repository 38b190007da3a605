//! `read_files`: a minimal leaf step producing content artifacts from
//! literal, templated paths. Glob expansion is out of scope; each path is
//! read as-is. `llm_generate` and `mcp` are external-provider leaf steps and
//! are not implemented here.
//!
//! Two config shapes are accepted:
//! - `path` + `content_key`: read one file, store its text verbatim at
//!   `content_key`.
//! - `paths` + `output_key`: read several files into the canonical file-list
//!   artifact, `[{ path, content }]`, for steps downstream that expect that
//!   shape.

use crate::context::Context;
use crate::registry::StepArgs;
use crate::step::Step;
use crate::template::TemplateEngine;
use async_trait::async_trait;
use serde_json::{json, Value};

enum Mode {
    Single { path: String, content_key: String },
    List { paths: Vec<String>, output_key: String },
}

pub struct ReadFilesStep {
    mode: Mode,
}

pub fn build(args: StepArgs) -> anyhow::Result<Box<dyn Step>> {
    let cfg = args.config;

    let mode = match (cfg.get("path"), cfg.get("content_key")) {
        (Some(path), Some(content_key)) => Mode::Single {
            path: path
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("read_files `path` must be a string"))?
                .to_string(),
            content_key: content_key
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("read_files `content_key` must be a string"))?
                .to_string(),
        },
        _ => {
            let paths = cfg
                .get("paths")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow::anyhow!("read_files requires `path`+`content_key` or `paths`"))?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| anyhow::anyhow!("read_files `paths` entries must be strings"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let output_key = cfg
                .get("output_key")
                .and_then(Value::as_str)
                .unwrap_or("files")
                .to_string();
            Mode::List { paths, output_key }
        }
    };

    Ok(Box::new(ReadFilesStep { mode }))
}

#[async_trait]
impl Step for ReadFilesStep {
    async fn execute(&self, context: &mut Context) -> anyhow::Result<()> {
        let engine = TemplateEngine::new();
        match &self.mode {
            Mode::Single { path, content_key } => {
                let path = engine.render(path, context)?;
                let content = tokio::fs::read_to_string(&path).await?;
                context.set(content_key.clone(), Value::String(content));
            }
            Mode::List { paths, output_key } => {
                let mut files = Vec::with_capacity(paths.len());
                for raw_path in paths {
                    let path = engine.render(raw_path, context)?;
                    let content = tokio::fs::read_to_string(&path).await?;
                    files.push(json!({ "path": path, "content": content }));
                }
                context.set(output_key.clone(), Value::Array(files));
            }
        }
        Ok(())
    }
}
