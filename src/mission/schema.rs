//! Schema validation of generated mission documents.
//!
//! Validation itself is delegated to `xmllint`; this module only picks the schema
//! and maps the tool's verdict into a [`SchemaVerdict`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::util::sanitize_output;

/// Outcome of validating one document.
///
/// # Invariants
/// - `message` always explains the verdict; for failures it is the validator output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaVerdict {
    pub valid: bool,
    pub message: String,
}

impl SchemaVerdict {
    pub fn valid() -> Self {
        Self {
            valid: true,
            message: "XML is valid.".to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
        }
    }
}

/// Validates a document against an XSD schema.
#[async_trait]
pub trait SchemaValidator: Send + Sync {
    /// Validate `document` against `schema`.
    ///
    /// # Errors
    /// Returns `Err` only when the validator itself cannot run (missing binary or
    /// schema file). A document that fails validation is `Ok` with `valid == false`.
    async fn validate(&self, schema: &Path, document: &str) -> anyhow::Result<SchemaVerdict>;
}

/// Pick the configured schema that the document asks for.
///
/// The hint (second token of `xsi:schemaLocation`) is matched against the configured
/// paths first literally, then by file name. Without a usable hint the first configured
/// schema is used.
pub fn select_schema<'a>(schemas: &'a [PathBuf], hint: Option<&str>) -> Option<&'a Path> {
    if let Some(hint) = hint {
        let hinted = Path::new(hint);
        if let Some(found) = schemas.iter().find(|s| s.as_path() == hinted) {
            return Some(found.as_path());
        }
        if let Some(name) = hinted.file_name() {
            if let Some(found) = schemas.iter().find(|s| s.file_name() == Some(name)) {
                return Some(found.as_path());
            }
        }
        tracing::warn!(
            "Schema hint {} matches no configured schema, falling back to the default",
            hint
        );
    }
    schemas.first().map(PathBuf::as_path)
}

/// `xmllint --noout --schema <xsd> -` with the document on stdin.
pub struct XmllintValidator {
    binary: PathBuf,
}

impl XmllintValidator {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for XmllintValidator {
    fn default() -> Self {
        Self::new("xmllint")
    }
}

#[async_trait]
impl SchemaValidator for XmllintValidator {
    async fn validate(&self, schema: &Path, document: &str) -> anyhow::Result<SchemaVerdict> {
        if !schema.is_file() {
            anyhow::bail!("schema file {} does not exist", schema.display());
        }

        let mut child = Command::new(&self.binary)
            .arg("--noout")
            .arg("--schema")
            .arg(schema)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to run {}: {}", self.binary.display(), e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(document.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(SchemaVerdict::valid());
        }

        let stderr = sanitize_output(&output.stderr);
        tracing::debug!("xmllint rejected mission: {}", stderr);
        Ok(SchemaVerdict::invalid(format!("XML is invalid: {}", stderr.trim())))
    }
}
