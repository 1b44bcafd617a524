//! Local-disk media store for chat attachments and purchase proofs.
//! Accepts an uploaded binary and hands back the URL it is served under.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;

const MAX_FILE_SIZE: usize = 25 * 1024 * 1024; // 25MB

pub struct MediaStore {
    dir: PathBuf,
    // sha256 -> served URL, so re-uploading identical content reuses the file
    by_hash: RwLock<HashMap<String, String>>,
}

impl MediaStore {
    pub async fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(MediaStore {
            dir,
            by_hash: RwLock::new(HashMap::new()),
        })
    }

    /// Stores an uploaded binary and returns its `/uploads/...` URL.
    pub async fn save(&self, original_name: &str, content: Vec<u8>) -> Result<String, String> {
        if content.is_empty() {
            return Err("No file uploaded".to_string());
        }
        if content.len() > MAX_FILE_SIZE {
            return Err("File size exceeds maximum allowed size".to_string());
        }

        let mut hasher = Sha256::new();
        hasher.update(&content);
        let sha256 = format!("{:x}", hasher.finalize());

        {
            let by_hash = self.by_hash.read().await;
            if let Some(url) = by_hash.get(&sha256) {
                return Ok(url.clone());
            }
        }

        let filename = unique_filename(original_name);
        let path = self.dir.join(&filename);
        fs::write(&path, content).await.map_err(|e| e.to_string())?;

        let url = format!("/uploads/{filename}");
        let mut by_hash = self.by_hash.write().await;
        by_hash.insert(sha256, url.clone());
        Ok(url)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `<millis>-<random>` plus the original extension, like the uploads the
/// frontends already link to.
fn unique_filename(original_name: &str) -> String {
    let ext = Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}{ext}", Utc::now().timestamp_millis(), suffix.to_lowercase())
}
