//! Local-disk storage for message attachments.
//!
//! Uploaded files are written under `upload_dir` and served back by the router
//! under `/images`. The chat core treats the resulting [`Attachment`] as opaque.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::Result, message::message_models::Attachment};

pub const PUBLIC_PREFIX: &str = "images";

#[derive(Clone)]
pub struct AttachmentStore {
    upload_dir: PathBuf,
    public_base_url: String,
}

impl AttachmentStore {
    pub fn new(upload_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Writes `data` to disk and returns where it can be fetched from.
    pub async fn save(&self, original_name: Option<&str>, data: &[u8]) -> Result<Attachment> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let file_name = format!(
            "{}-{}",
            Uuid::new_v4().simple(),
            sanitize_file_name(original_name.unwrap_or("attachment"))
        );
        let local_path = self.upload_dir.join(&file_name);
        tokio::fs::write(&local_path, data).await?;

        debug!("Stored attachment {} ({} bytes)", local_path.display(), data.len());

        Ok(Attachment {
            url: format!("{}/{}/{}", self.public_base_url, PUBLIC_PREFIX, file_name),
            local_path: local_path.to_string_lossy().into_owned(),
        })
    }

    /// Best-effort removal. Files outside the upload directory are never touched.
    pub async fn remove(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            let path = Path::new(&attachment.local_path);
            if !path.starts_with(&self.upload_dir) {
                warn!("Refusing to remove attachment outside upload dir: {}", path.display());
                continue;
            }

            match tokio::fs::remove_file(path).await {
                Ok(()) => debug!("Removed attachment {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove attachment {}: {}", path.display(), e),
            }
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}
