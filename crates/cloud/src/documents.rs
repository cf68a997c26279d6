//! Identity document attachments for patient records.
//!
//! A record's document lives at `<folder>/<record_id>.<ext>`. New uploads go to
//! [`DOCUMENTS_FOLDER`]; lookups and deletes also search
//! [`LEGACY_DOCUMENTS_FOLDER`], where earlier deployments stored them.

use crate::constants::{DOCUMENTS_FOLDER, DOCUMENT_EXTENSIONS, LEGACY_DOCUMENTS_FOLDER};
use crate::dropbox::{AccountInfo, DropboxClient, RemoteEntry, WriteMode};
use crate::CloudResult;
use consent_types::ParticipantId;
use std::path::Path;

/// Result of looking a record's document up.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DocumentLookup {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DocumentLookup {
    fn missing() -> Self {
        Self {
            found: false,
            path: None,
            url: None,
        }
    }
}

/// Result of deleting a record's document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DocumentDeletion {
    pub found: bool,
    pub deleted: Vec<String>,
}

/// Document Reference Store over the remote storage API.
#[derive(Clone)]
pub struct DocumentStore {
    client: DropboxClient,
}

impl DocumentStore {
    pub fn new(client: DropboxClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DropboxClient {
        &self.client
    }

    /// Whether remote storage has its OAuth secrets.
    pub fn is_configured(&self) -> bool {
        self.client.tokens().is_configured()
    }

    /// Every path a record's document may live at, current folder first.
    pub fn candidate_paths(record_id: &ParticipantId) -> Vec<String> {
        [DOCUMENTS_FOLDER, LEGACY_DOCUMENTS_FOLDER]
            .iter()
            .flat_map(|folder| {
                DOCUMENT_EXTENSIONS
                    .iter()
                    .map(move |ext| format!("{folder}/{record_id}.{ext}"))
            })
            .collect()
    }

    /// Stores `bytes` as the record's document, replacing any earlier one.
    ///
    /// `extension` must be one of [`DOCUMENT_EXTENSIONS`]; callers sniff it
    /// from the content. Other stored copies are removed only once the new
    /// upload has succeeded.
    pub async fn upload(
        &self,
        record_id: &ParticipantId,
        extension: &str,
        bytes: Vec<u8>,
    ) -> CloudResult<RemoteEntry> {
        let target = format!("{DOCUMENTS_FOLDER}/{record_id}.{extension}");
        let entry = self
            .client
            .upload(&target, bytes, WriteMode::Overwrite)
            .await?;

        for path in Self::candidate_paths(record_id) {
            if !path.eq_ignore_ascii_case(&target) {
                self.client.delete(&path).await?;
            }
        }

        Ok(entry)
    }

    /// Uploads a local file to an arbitrary remote path (backup exports).
    pub async fn upload_file(&self, local: &Path, remote_path: &str) -> CloudResult<RemoteEntry> {
        self.client
            .upload_file(local, remote_path, WriteMode::Overwrite)
            .await
    }

    /// Finds the record's document and a temporary download link for it.
    pub async fn exists(&self, record_id: &ParticipantId) -> CloudResult<DocumentLookup> {
        for path in Self::candidate_paths(record_id) {
            if let Some(entry) = self.client.get_metadata(&path).await? {
                let path = entry.path_display.unwrap_or(path);
                let url = self.client.temporary_link(&path).await?;
                return Ok(DocumentLookup {
                    found: true,
                    path: Some(path),
                    url: Some(url),
                });
            }
        }
        Ok(DocumentLookup::missing())
    }

    /// Deletes the record's document from both folders.
    pub async fn delete(&self, record_id: &ParticipantId) -> CloudResult<DocumentDeletion> {
        let mut deleted = Vec::new();
        for path in Self::candidate_paths(record_id) {
            if self.client.delete(&path).await? {
                deleted.push(path);
            }
        }
        Ok(DocumentDeletion {
            found: !deleted.is_empty(),
            deleted,
        })
    }

    pub async fn list(&self, folder: &str) -> CloudResult<Vec<RemoteEntry>> {
        self.client.list_folder(folder, true).await
    }

    pub async fn account(&self) -> CloudResult<AccountInfo> {
        self.client.current_account().await
    }
}
