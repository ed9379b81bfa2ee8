// 🗂️ Versioned in-memory store
//
// "Identity persists, values change": every entity keeps a stable id and a
// timeline of immutable versions. Updates expire the current version and
// append the next one; deletes expire the current version with no
// successor. Nothing is ever physically removed.

use crate::error::{ServiceError, ServiceResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// VERSION METADATA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: i64,
    pub system_time: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl VersionMeta {
    pub fn new() -> Self {
        let now = Utc::now();
        VersionMeta {
            version: 1,
            system_time: now,
            valid_from: now,
            valid_until: None,
        }
    }

    pub fn is_current(&self) -> bool {
        self.valid_until.is_none()
    }

    pub fn was_valid_at(&self, time: DateTime<Utc>) -> bool {
        self.valid_from <= time && self.valid_until.map_or(true, |until| until > time)
    }
}

impl Default for VersionMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Entities stored in a [`VersionedStore`].
pub trait Versioned: Clone {
    /// Human readable entity name used in errors ("Banner", "User", ...)
    const ENTITY: &'static str;

    fn id(&self) -> &str;
    fn meta(&self) -> &VersionMeta;
    fn meta_mut(&mut self) -> &mut VersionMeta;

    fn is_current(&self) -> bool {
        self.meta().is_current()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Append-only multi-version storage. Cloning yields another handle to the
/// same data.
pub struct VersionedStore<T: Versioned> {
    versions: Arc<RwLock<Vec<T>>>,
}

impl<T: Versioned> Clone for VersionedStore<T> {
    fn clone(&self) -> Self {
        VersionedStore {
            versions: Arc::clone(&self.versions),
        }
    }
}

impl<T: Versioned> Default for VersionedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Versioned> VersionedStore<T> {
    pub fn new() -> Self {
        VersionedStore {
            versions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn read(&self) -> ServiceResult<RwLockReadGuard<'_, Vec<T>>> {
        self.versions
            .read()
            .map_err(|_| ServiceError::Storage(format!("{} store lock poisoned", T::ENTITY)))
    }

    fn write(&self) -> ServiceResult<RwLockWriteGuard<'_, Vec<T>>> {
        self.versions
            .write()
            .map_err(|_| ServiceError::Storage(format!("{} store lock poisoned", T::ENTITY)))
    }

    /// Store a new entity as version 1. A retired id comes back as the next
    /// version of its timeline.
    pub fn insert(&self, mut entity: T) -> ServiceResult<T> {
        let mut versions = self.write()?;

        let mut last_version = 0;
        for existing in versions.iter().filter(|e| e.id() == entity.id()) {
            if existing.is_current() {
                return Err(ServiceError::duplicate(T::ENTITY, format!("id {}", entity.id())));
            }
            last_version = last_version.max(existing.meta().version);
        }

        let mut meta = VersionMeta::new();
        meta.version = last_version + 1;
        *entity.meta_mut() = meta;
        versions.push(entity.clone());
        Ok(entity)
    }

    /// Current version of an entity
    pub fn current(&self, id: &str) -> ServiceResult<Option<T>> {
        let versions = self.read()?;
        Ok(versions
            .iter()
            .find(|e| e.id() == id && e.is_current())
            .cloned())
    }

    /// Current version, or `NotFound`
    pub fn get(&self, id: &str) -> ServiceResult<T> {
        self.current(id)?
            .ok_or_else(|| ServiceError::not_found(T::ENTITY, id))
    }

    /// Every version ever stored for an id, oldest first
    pub fn history(&self, id: &str) -> ServiceResult<Vec<T>> {
        let versions = self.read()?;
        let mut history: Vec<T> = versions.iter().filter(|e| e.id() == id).cloned().collect();
        history.sort_by_key(|e| e.meta().version);
        Ok(history)
    }

    /// "What did this entity look like at time T?"
    pub fn as_of(&self, id: &str, time: DateTime<Utc>) -> ServiceResult<Option<T>> {
        let versions = self.read()?;
        Ok(versions
            .iter()
            .filter(|e| e.id() == id)
            .find(|e| e.meta().was_valid_at(time))
            .cloned())
    }

    /// Expire the current version and append the one produced by `update_fn`.
    ///
    /// If `update_fn` fails the store is left untouched.
    pub fn update<F>(&self, id: &str, update_fn: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut T) -> ServiceResult<()>,
    {
        let mut versions = self.write()?;
        let now = Utc::now();

        let index = versions
            .iter()
            .position(|e| e.id() == id && e.is_current())
            .ok_or_else(|| ServiceError::not_found(T::ENTITY, id))?;

        let mut next = versions[index].clone();
        update_fn(&mut next)?;

        {
            let meta = next.meta_mut();
            meta.version += 1;
            meta.valid_from = now;
            meta.valid_until = None;
        }

        versions[index].meta_mut().valid_until = Some(now);
        versions.push(next.clone());

        Ok(next)
    }

    /// Expire the current version without a successor (logical delete)
    pub fn retire(&self, id: &str) -> ServiceResult<T> {
        let mut versions = self.write()?;

        let entity = versions
            .iter_mut()
            .find(|e| e.id() == id && e.is_current())
            .ok_or_else(|| ServiceError::not_found(T::ENTITY, id))?;

        entity.meta_mut().valid_until = Some(Utc::now());
        Ok(entity.clone())
    }

    /// All current versions, ordered by when each identity was first stored
    pub fn all_current(&self) -> ServiceResult<Vec<T>> {
        let versions = self.read()?;
        let mut current: Vec<(usize, T)> = versions
            .iter()
            .filter(|e| e.is_current())
            .map(|e| {
                let first_seen = versions
                    .iter()
                    .position(|v| v.id() == e.id())
                    .unwrap_or(usize::MAX);
                (first_seen, e.clone())
            })
            .collect();
        current.sort_by_key(|(first_seen, _)| *first_seen);
        Ok(current.into_iter().map(|(_, e)| e).collect())
    }

    /// Current versions matching a predicate
    pub fn find<P>(&self, predicate: P) -> ServiceResult<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self
            .all_current()?
            .into_iter()
            .filter(|e| predicate(e))
            .collect())
    }

    pub fn count(&self) -> ServiceResult<usize> {
        let versions = self.read()?;
        Ok(versions.iter().filter(|e| e.is_current()).count())
    }

    /// Poison the lock, as a writer panicking mid-update would
    #[cfg(test)]
    pub(crate) fn poison(&self)
    where
        T: Send + Sync + 'static,
    {
        let versions = Arc::clone(&self.versions);
        let _ = std::thread::spawn(move || {
            let _guard = versions.write();
            panic!("writer panicked");
        })
        .join();
    }
}
