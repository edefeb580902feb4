use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::error::{CatalogError, Result};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadStatus {
    #[default]
    Unread,
    Read,
}

/// Cover art attached to an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Cover {
    /// Image hosted elsewhere.
    Remote(String),
    /// `data:` URL holding the encoded image.
    Embedded(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub cover: Option<Cover>,
    pub read_status: ReadStatus,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogEntry {
    /// Volume number derived from the title; never stored.
    pub fn volume(&self) -> Option<u32> {
        crate::series::extract_volume_number(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCatalogEntry {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub series: Option<String>,
    pub cover: Option<Cover>,
    #[serde(default)]
    pub read_status: ReadStatus,
    pub owner: String,
}

impl NewCatalogEntry {
    fn into_entry(self, now: DateTime<Utc>) -> CatalogEntry {
        CatalogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            isbn: self.isbn,
            title: self.title,
            author: self.author,
            publisher: self.publisher,
            series: self.series,
            cover: self.cover,
            read_status: self.read_status,
            owner: self.owner,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Narrows a listing. Empty fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    pub status: Option<ReadStatus>,
    /// Case-insensitive substring of title, author or series.
    pub search: Option<String>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        if self.status.is_some_and(|status| status != entry.read_status) {
            return false;
        }
        let Some(needle) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };
        let needle = needle.to_lowercase();
        [Some(&entry.title), entry.author.as_ref(), entry.series.as_ref()]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogStats {
    pub total: usize,
    pub unread: usize,
    pub read: usize,
}

impl CatalogStats {
    pub fn from_entries(entries: &[CatalogEntry]) -> Self {
        let read = entries
            .iter()
            .filter(|e| e.read_status == ReadStatus::Read)
            .count();
        Self {
            total: entries.len(),
            unread: entries.len() - read,
            read,
        }
    }
}

/// Durable catalog collaborator.
///
/// `create` must be all-or-nothing and must refuse an ISBN the owner already
/// has with [`CatalogError::DuplicateEntry`].
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn exists(&self, isbn: &str, owner: &str) -> Result<bool>;
    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry>;
    async fn get_by_isbn(&self, isbn: &str, owner: &str) -> Result<Option<CatalogEntry>>;
    /// Entries for `owner`, newest first.
    async fn list(&self, owner: &str) -> Result<Vec<CatalogEntry>>;
    async fn set_read_status(
        &self,
        isbn: &str,
        owner: &str,
        status: ReadStatus,
    ) -> Result<Option<CatalogEntry>>;
    /// Returns whether an entry was removed.
    async fn delete(&self, isbn: &str, owner: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    entries: RwLock<HashMap<(String, String), CatalogEntry>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn exists(&self, isbn: &str, owner: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(&(owner.to_string(), isbn.to_string())))
    }

    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry> {
        let mut entries = self.entries.write().await;
        let key = (entry.owner.clone(), entry.isbn.clone());
        if entries.contains_key(&key) {
            return Err(CatalogError::DuplicateEntry(entry.isbn));
        }
        let entry = entry.into_entry(Utc::now());
        entries.insert(key, entry.clone());
        Ok(entry)
    }

    async fn get_by_isbn(&self, isbn: &str, owner: &str) -> Result<Option<CatalogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(owner.to_string(), isbn.to_string()))
            .cloned())
    }

    async fn list(&self, owner: &str) -> Result<Vec<CatalogEntry>> {
        let entries = self.entries.read().await;
        let mut out = entries
            .values()
            .filter(|e| e.owner == owner)
            .cloned()
            .collect::<Vec<_>>();
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn set_read_status(
        &self,
        isbn: &str,
        owner: &str,
        status: ReadStatus,
    ) -> Result<Option<CatalogEntry>> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&(owner.to_string(), isbn.to_string())) else {
            return Ok(None);
        };
        entry.read_status = status;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn delete(&self, isbn: &str, owner: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(&(owner.to_string(), isbn.to_string()))
            .is_some())
    }
}

/// One JSON file per entry under `<base>/owners/<hex(owner)>/<isbn>.json`.
#[derive(Debug)]
pub struct LocalFsCatalogStore {
    base_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalFsCatalogStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        self.base_dir.join("owners").join(hex::encode(owner))
    }

    fn entry_path(&self, isbn: &str, owner: &str) -> Result<PathBuf> {
        if isbn.is_empty() || !isbn.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(CatalogError::InvalidIdentifier(isbn.to_string()));
        }
        Ok(self.owner_dir(owner).join(format!("{isbn}.json")))
    }
}

#[async_trait]
impl CatalogStore for LocalFsCatalogStore {
    async fn exists(&self, isbn: &str, owner: &str) -> Result<bool> {
        let path = self.entry_path(isbn, owner)?;
        let exists = fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?;
        Ok(exists)
    }

    async fn create(&self, entry: NewCatalogEntry) -> Result<CatalogEntry> {
        let path = self.entry_path(&entry.isbn, &entry.owner)?;
        let _guard = self.write_lock.lock().await;

        if fs::try_exists(&path)
            .await
            .with_context(|| format!("stat: {}", path.display()))?
        {
            return Err(CatalogError::DuplicateEntry(entry.isbn));
        }

        let entry = entry.into_entry(Utc::now());
        write_json_atomic(&path, &entry)
            .await
            .context("write catalog entry")?;
        Ok(entry)
    }

    async fn get_by_isbn(&self, isbn: &str, owner: &str) -> Result<Option<CatalogEntry>> {
        let path = self.entry_path(isbn, owner)?;
        let entry = read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?;
        Ok(entry)
    }

    async fn list(&self, owner: &str) -> Result<Vec<CatalogEntry>> {
        let dir = self.owner_dir(owner);
        let mut read_dir = match fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("read dir: {}", dir.display()))
                    .into());
            }
        };

        let mut out = Vec::new();
        while let Some(item) = read_dir
            .next_entry()
            .await
            .with_context(|| format!("list dir: {}", dir.display()))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(entry) = read_json::<CatalogEntry>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                out.push(entry);
            }
        }
        sort_newest_first(&mut out);
        Ok(out)
    }

    async fn set_read_status(
        &self,
        isbn: &str,
        owner: &str,
        status: ReadStatus,
    ) -> Result<Option<CatalogEntry>> {
        let path = self.entry_path(isbn, owner)?;
        let _guard = self.write_lock.lock().await;

        let Some(mut entry) = read_json::<CatalogEntry>(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))?
        else {
            return Ok(None);
        };
        entry.read_status = status;
        entry.updated_at = Utc::now();
        write_json_atomic(&path, &entry)
            .await
            .context("write catalog entry")?;
        Ok(Some(entry))
    }

    async fn delete(&self, isbn: &str, owner: &str) -> Result<bool> {
        let path = self.entry_path(isbn, owner)?;
        let _guard = self.write_lock.lock().await;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("remove: {}", path.display()))
                .into()),
        }
    }
}

fn sort_newest_first(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.isbn.cmp(&b.isbn))
    });
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    // Not ".json" so listing never picks up a half-written file.
    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
