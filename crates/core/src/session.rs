//! Session-scoped storage for uploaded files and submitted mappings.
//!
//! A session groups one uploaded document, one uploaded image, and one
//! mapping. Entries expire `ttl` after their last write; callers run
//! [`SessionStore::evict_expired`] periodically and delete the returned
//! files.

use crate::types::MappingEntry;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Default lifetime of a session entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Opaque 8-character session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let mut token = uuid::Uuid::new_v4().simple().to_string();
        token.truncate(8);
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
struct Stamped<T> {
    value: T,
    written: Instant,
}

impl<T> Stamped<T> {
    fn new(value: T, written: Instant) -> Self {
        Self { value, written }
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.written) >= ttl
    }
}

/// Latest mapping per session. Saving replaces the previous list wholesale.
#[derive(Debug, Default)]
pub struct MappingStore {
    entries: HashMap<SessionId, Stamped<Vec<MappingEntry>>>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entries` for `session`, replacing anything saved before.
    /// Entries are not validated here.
    pub fn save(&mut self, session: &SessionId, entries: Vec<MappingEntry>) {
        self.save_at(session, entries, Instant::now());
    }

    fn save_at(&mut self, session: &SessionId, entries: Vec<MappingEntry>, now: Instant) {
        log::debug!("Saving {} mapping entries for {}", entries.len(), session);
        self.entries
            .insert(session.clone(), Stamped::new(entries, now));
    }

    /// The stored mapping, or an empty list if none was ever saved.
    pub fn load(&self, session: &SessionId) -> Vec<MappingEntry> {
        self.entries
            .get(session)
            .map(|s| s.value.clone())
            .unwrap_or_default()
    }

    fn evict_expired(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, s| !s.expired(now, ttl));
        before - self.entries.len()
    }
}

/// Owns every per-session map: document paths, image paths, and mappings.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    documents: HashMap<SessionId, Stamped<PathBuf>>,
    images: HashMap<SessionId, Stamped<PathBuf>>,
    mappings: MappingStore,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            documents: HashMap::new(),
            images: HashMap::new(),
            mappings: MappingStore::new(),
        }
    }

    /// Register an uploaded document and return its new session id.
    pub fn register_document(&mut self, path: impl Into<PathBuf>) -> SessionId {
        let id = SessionId::generate();
        self.documents
            .insert(id.clone(), Stamped::new(path.into(), Instant::now()));
        id
    }

    /// Register an uploaded image and return its id.
    pub fn register_image(&mut self, path: impl Into<PathBuf>) -> SessionId {
        let id = SessionId::generate();
        self.images
            .insert(id.clone(), Stamped::new(path.into(), Instant::now()));
        id
    }

    pub fn document(&self, session: &SessionId) -> Result<&Path> {
        self.documents
            .get(session)
            .map(|s| s.value.as_path())
            .ok_or_else(|| Error::SessionNotFound(session.to_string()))
    }

    pub fn image(&self, image: &SessionId) -> Result<&Path> {
        self.images
            .get(image)
            .map(|s| s.value.as_path())
            .ok_or_else(|| Error::ImageNotFound(image.to_string()))
    }

    /// Replace the mapping for `session`.
    pub fn save_mapping(&mut self, session: &SessionId, entries: Vec<MappingEntry>) {
        self.mappings.save(session, entries);
    }

    pub fn load_mapping(&self, session: &SessionId) -> Vec<MappingEntry> {
        self.mappings.load(session)
    }

    /// Drop every entry older than the TTL and return the file paths that
    /// belonged to evicted documents and images.
    pub fn evict_expired(&mut self, now: Instant) -> Vec<PathBuf> {
        let ttl = self.ttl;
        let mut evicted = Vec::new();

        for map in [&mut self.documents, &mut self.images] {
            let expired: Vec<SessionId> = map
                .iter()
                .filter(|(_, s)| s.expired(now, ttl))
                .map(|(id, _)| id.clone())
                .collect();
            for id in expired {
                if let Some(stamped) = map.remove(&id) {
                    evicted.push(stamped.value);
                }
            }
        }

        let dropped_mappings = self.mappings.evict_expired(now, ttl);
        if !evicted.is_empty() || dropped_mappings > 0 {
            log::debug!(
                "Evicted {} files and {} mappings",
                evicted.len(),
                dropped_mappings
            );
        }

        evicted
    }
}
