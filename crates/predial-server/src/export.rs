use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Não foi possível salvar o relatório em {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Optional on-disk copy of exported reports.
///
/// Files are named `<kind>-<first 12 hex digits of the document's SHA-256>.html`, so
/// exporting the same document twice overwrites one file.
#[derive(Debug, Clone, Default)]
pub struct ReportSink {
    dir: Option<PathBuf>,
}

impl ReportSink {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Write `document` and return its path, or `None` when no directory is configured.
    pub async fn save(&self, kind: &str, document: &str) -> Result<Option<PathBuf>, ExportError> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let hash = format!("{:x}", Sha256::digest(document.as_bytes()));
        let path = dir.join(format!("{kind}-{}.html", &hash[..12]));

        let write_err = |source| ExportError::Write {
            path: path.display().to_string(),
            source,
        };
        tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        tokio::fs::write(&path, document).await.map_err(write_err)?;

        info!(path = %path.display(), bytes = document.len(), "report saved");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_sink_saves_nothing() {
        let sink = ReportSink::default();
        assert!(!sink.is_enabled());
        assert!(sink.save("inspection", "<html></html>").await.expect("ok").is_none());
    }

    #[tokio::test]
    async fn test_save_names_file_by_kind_and_hash() {
        let scratch = tempfile::tempdir().expect("temp dir");
        let sink = ReportSink::new(Some(scratch.path().join("reports")));
        let path = sink
            .save("inspection", "<html></html>")
            .await
            .expect("saved")
            .expect("path");
        let name = path.file_name().and_then(|n| n.to_str()).expect("name");
        assert!(name.starts_with("inspection-"));
        assert!(name.ends_with(".html"));
        assert_eq!(name.len(), "inspection-".len() + 12 + ".html".len());
        assert_eq!(path.parent(), Some(scratch.path().join("reports").as_path()));
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "<html></html>");
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_an_error() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let sink = ReportSink::new(Some(file.path().to_path_buf()));
        let err = sink.save("inspection", "<html></html>").await.expect_err("fails");
        assert!(matches!(err, ExportError::Write { .. }));
    }
}
