//! Reading output files back after a run
//!
//! A missing file is reported, not fatal: the report shows
//! `"<file> not found yet"` in its place and still shows the others.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// How an artifact is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Pretty-printed if it parses, verbatim otherwise
    Json,
    Text,
}

/// An output file to include in the final report
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub heading: String,
    pub file: PathBuf,
    pub format: ArtifactFormat,
}

impl ArtifactSpec {
    pub fn new(heading: impl Into<String>, file: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            heading: heading.into(),
            file: file.into(),
            format,
        }
    }

    fn display_name(&self) -> String {
        self.file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// Read an artifact; a missing file maps to [`PipelineError::ArtifactNotFound`]
pub async fn read_artifact(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::ArtifactNotFound {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            path: path.to_path_buf(),
        }),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Render one section per artifact
///
/// ```text
///
/// === Venue Details ===
/// { ... }
/// ```
pub async fn render_report(output_dir: &Path, specs: &[ArtifactSpec]) -> Result<String> {
    let mut report = String::new();

    for spec in specs {
        let path = if spec.file.is_absolute() {
            spec.file.clone()
        } else {
            output_dir.join(&spec.file)
        };

        let body = match read_artifact(&path).await {
            Ok(contents) => match spec.format {
                ArtifactFormat::Json => pretty_json(&contents),
                ArtifactFormat::Text => contents.trim_end().to_string(),
            },
            Err(e) if e.is_recoverable() => {
                tracing::warn!(path = %path.display(), "artifact missing");
                format!("{} not found yet", spec.display_name())
            }
            Err(e) => return Err(e),
        };

        let _ = writeln!(report, "\n=== {} ===", spec.heading);
        let _ = writeln!(report, "{}", body);
    }

    Ok(report)
}

fn pretty_json(contents: &str) -> String {
    serde_json::from_str::<serde_json::Value>(contents)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .unwrap_or_else(|| contents.trim_end().to_string())
}
