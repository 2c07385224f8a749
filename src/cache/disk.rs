//! Directory-backed cache storage.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<base64url(cache name)>/<sha256(url)>.json           entry metadata
//! <root>/<base64url(cache name)>/<sha256(url)>.<unique>.body  response body
//! ```
//!
//! Every put writes a body file of its own, then replaces the metadata
//! through a uniquely named temp file and a rename. The metadata names its
//! body, so concurrent puts of one URL never pair one response's headers
//! with another's body. The replaced body is removed afterwards.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{CacheStorage, ensure_cacheable};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Metadata stored next to each cached body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// File name of the body, relative to the cache directory.
    body: String,
    stored_at: DateTime<Utc>,
}

impl EntryMeta {
    fn from_response(url: String, body: String, response: &Response) -> Self {
        let headers = response
            .headers
            .iter()
            .filter_map(|(name, value)| match value.to_str() {
                Ok(v) => Some((name.as_str().to_string(), v.to_string())),
                Err(_) => {
                    log::debug!("Not persisting non-text header {name} for {url}");
                    None
                }
            })
            .collect();
        Self {
            url,
            status: response.status.as_u16(),
            headers,
            body,
            stored_at: Utc::now(),
        }
    }

    fn into_response(self, body: Bytes) -> Result<Response> {
        let status = StatusCode::from_u16(self.status)
            .map_err(|e| Error::Cache(format!("stored status {}: {e}", self.status)))?;
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                log::debug!("Skipping unreadable stored header {name} for {}", self.url);
                continue;
            };
            headers.append(name, value);
        }
        Ok(Response::new(status, body).with_headers(headers))
    }
}

/// Cache storage persisted under a root directory.
///
/// [`keys`](CacheStorage::keys) lists caches sorted by name.
#[derive(Debug, Clone)]
pub struct DiskCacheStorage {
    root: PathBuf,
}

impl DiskCacheStorage {
    /// Creates a storage rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(URL_SAFE_NO_PAD.encode(name))
    }

    /// Returns the cache directory and the file stem for `key`.
    fn entry_location(&self, name: &str, key: &str) -> (PathBuf, String) {
        let digest = Sha256::digest(key.as_bytes());
        let stem = digest.iter().map(|b| format!("{b:02x}")).collect();
        (self.cache_dir(name), stem)
    }
}

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Returns a suffix no other write in any process shares.
fn unique_suffix() -> String {
    format!(
        "{}-{}",
        std::process::id(),
        WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

/// Writes `contents` to `path` atomically (write tmp + rename).
async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_path = path.as_os_str().to_owned();
    tmp_path.push(format!(".{}.tmp", unique_suffix()));
    let tmp_path = PathBuf::from(tmp_path);
    tokio::fs::write(&tmp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

async fn read_meta(path: &Path) -> Result<Option<EntryMeta>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Joins a stored body name onto `dir`, keeping only its last component.
fn body_path(dir: &Path, body: &str) -> Option<PathBuf> {
    Path::new(body).file_name().map(|file| dir.join(file))
}

fn decode_name(dir_name: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(dir_name).ok()?;
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn keys(&self) -> Result<Vec<String>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            match dir_name.to_str().and_then(decode_name) {
                Some(name) => names.push(name),
                None => log::debug!("Ignoring foreign directory {}", entry.path().display()),
            }
        }
        names.sort();
        Ok(names)
    }

    async fn has(&self, name: &str) -> Result<bool> {
        match tokio::fs::metadata(self.cache_dir(name)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, name: &str) -> Result<()> {
        tokio::fs::create_dir_all(self.cache_dir(name)).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        match tokio::fs::remove_dir_all(self.cache_dir(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        ensure_cacheable(request)?;
        self.open(name).await?;

        let key = request.cache_key();
        let (dir, stem) = self.entry_location(name, &key);
        let meta_path = dir.join(format!("{stem}.json"));
        let body_name = format!("{stem}.{}.body", unique_suffix());

        let meta = EntryMeta::from_response(key, body_name.clone(), response);
        let meta = serde_json::to_vec_pretty(&meta)?;
        if let Err(e) = tokio::fs::write(dir.join(&body_name), &response.body).await {
            let _ = tokio::fs::remove_file(dir.join(&body_name)).await;
            return Err(e.into());
        }

        let previous = read_meta(&meta_path).await.ok().flatten();
        if let Err(e) = write_atomic(&meta_path, &meta).await {
            let _ = tokio::fs::remove_file(dir.join(&body_name)).await;
            return Err(e.into());
        }

        let Some(old) = previous.and_then(|m| body_path(&dir, &m.body)) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&old).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                log::debug!("Could not remove replaced body {}: {e}", old.display());
            }
            _ => {}
        }
        Ok(())
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::GET {
            return Ok(None);
        }
        let key = request.cache_key();
        let (dir, stem) = self.entry_location(name, &key);

        let Some(meta) = read_meta(&dir.join(format!("{stem}.json"))).await? else {
            return Ok(None);
        };
        if meta.url != key {
            log::warn!("Cache entry hash collision: {} vs {key}", meta.url);
            return Ok(None);
        }
        let Some(path) = body_path(&dir, &meta.body) else {
            return Err(Error::Cache(format!("stored body name {:?} for {key}", meta.body)));
        };
        // A concurrent put may have replaced the entry and removed this body.
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        meta.into_response(Bytes::from(body)).map(Some)
    }
}
