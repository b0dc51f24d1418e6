//! Artifact stores holding uploaded resumes until their job finishes.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use resmatch_core::{sanitize_filename, ArtifactRef, ArtifactStore, Error, Result, ResumeDocument};

/// Decode raw upload bytes into plain text based on the file extension.
pub fn decode_document(artifact: &ArtifactRef, data: &[u8]) -> Result<ResumeDocument> {
    let text = match artifact.extension().as_deref() {
        Some("txt") | Some("md") => String::from_utf8(data.to_vec()).map_err(|_| {
            Error::Artifact(format!("'{}' is not valid UTF-8 text", artifact.file_name))
        })?,
        Some("docx") => docx_text(data).map_err(|e| {
            Error::Artifact(format!(
                "Could not read DOCX '{}': {}",
                artifact.file_name, e
            ))
        })?,
        Some("pdf") => {
            // Malformed PDFs can panic inside the parser.
            std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(data))
                .map_err(|_| {
                    Error::Artifact(format!("Could not parse PDF '{}'", artifact.file_name))
                })?
                .map_err(|e| {
                    Error::Artifact(format!(
                        "Could not read PDF '{}': {}",
                        artifact.file_name, e
                    ))
                })?
        }
        other => {
            return Err(Error::Artifact(format!(
                "Unsupported file type '{}' for '{}'",
                other.unwrap_or(""),
                artifact.file_name
            )))
        }
    };

    Ok(ResumeDocument {
        name: artifact.file_name.clone(),
        text,
    })
}

/// Runs of text (`<w:t>`) and paragraph ends (`</w:p>`) in WordprocessingML.
static DOCX_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|</w:p>").expect("static regex")
});

/// Paragraph text of a DOCX file, one paragraph per line.
fn docx_text(data: &[u8]) -> std::result::Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| e.to_string())?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;

    let mut text = String::new();
    for caps in DOCX_TEXT.captures_iter(&xml) {
        match caps.get(1) {
            Some(run) => text.push_str(&unescape_xml(run.as_str())),
            None => text.push('\n'),
        }
    }
    Ok(text.trim_end().to_string())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Decode on the blocking pool; PDF parsing is CPU-bound.
async fn decode_blocking(artifact: &ArtifactRef, data: Vec<u8>) -> Result<ResumeDocument> {
    let artifact = artifact.clone();
    tokio::task::spawn_blocking(move || decode_document(&artifact, &data))
        .await
        .map_err(|e| Error::Internal(format!("Decode task failed: {}", e)))?
}

/// Filesystem artifact store.
///
/// Each upload gets its own directory: `{base_path}/{uuid}/{file_name}`.
pub struct FilesystemArtifactStore {
    base_path: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Create the base directory if needed.
    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    fn artifact_dir(&self, artifact: &ArtifactRef) -> Result<PathBuf> {
        let key = Uuid::parse_str(&artifact.key)
            .map_err(|_| Error::Artifact(format!("Invalid artifact key '{}'", artifact.key)))?;
        Ok(self.base_path.join(key.to_string()))
    }

    fn artifact_path(&self, artifact: &ArtifactRef) -> Result<PathBuf> {
        if sanitize_filename(&artifact.file_name) != artifact.file_name {
            return Err(Error::Artifact(format!(
                "Invalid artifact file name '{}'",
                artifact.file_name
            )));
        }
        Ok(self.artifact_dir(artifact)?.join(&artifact.file_name))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put(&self, file_name: &str, data: &[u8]) -> Result<ArtifactRef> {
        let artifact = ArtifactRef::new(Uuid::now_v7().to_string(), sanitize_filename(file_name));
        let dir = self.artifact_dir(&artifact)?;
        fs::create_dir_all(&dir).await.map_err(|e| {
            warn!(dir = %dir.display(), error = %e, "artifacts: create_dir_all failed");
            e
        })?;

        let path = dir.join(&artifact.file_name);
        fs::write(&path, data).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "artifacts: write failed");
            e
        })?;

        debug!(key = %artifact.key, file = %artifact.file_name, size = data.len(), "artifacts: stored");
        Ok(artifact)
    }

    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool> {
        let path = match self.artifact_path(artifact) {
            Ok(path) => path,
            Err(_) => return Ok(false),
        };
        Ok(fs::try_exists(path).await?)
    }

    async fn load(&self, artifact: &ArtifactRef) -> Result<ResumeDocument> {
        let path = self.artifact_path(artifact)?;
        let data = fs::read(&path).await.map_err(|e| {
            Error::Artifact(format!("Could not read '{}': {}", artifact.file_name, e))
        })?;
        decode_blocking(artifact, data).await
    }

    async fn release(&self, artifact: &ArtifactRef) -> Result<()> {
        let dir = self.artifact_dir(artifact)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(key = %artifact.key, "artifacts: released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory artifact store.
#[derive(Default)]
pub struct MemoryArtifactStore {
    files: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, file_name: &str, data: &[u8]) -> Result<ArtifactRef> {
        let artifact = ArtifactRef::new(Uuid::now_v7().to_string(), sanitize_filename(file_name));
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                artifact.key.clone(),
                (artifact.file_name.clone(), data.to_vec()),
            );
        Ok(artifact)
    }

    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool> {
        Ok(self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&artifact.key))
    }

    async fn load(&self, artifact: &ArtifactRef) -> Result<ResumeDocument> {
        let data = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&artifact.key)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| Error::Artifact(format!("Artifact '{}' not found", artifact.file_name)))?;
        decode_blocking(artifact, data).await
    }

    async fn release(&self, artifact: &ArtifactRef) -> Result<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&artifact.key);
        Ok(())
    }
}
