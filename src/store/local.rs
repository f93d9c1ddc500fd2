//! Local fallback backend: one JSON array per collection in a key-value store.

use log::*;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::models::{Entity, Kind, PollOption, PollVote};

/**
 * Per-device key-value persistence, the shape of a browser's local storage
 */
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
}

/**
 * Keeps each key in `<dir>/<key>.json`
 */
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)
    }
}

/**
 * Storage that lives and dies with the process, with an optional byte quota
 */
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            values: Mutex::default(),
            quota: Some(quota),
        }
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(quota) = self.quota {
            let used: usize = values
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(io::Error::new(io::ErrorKind::Other, "storage quota exceeded"));
            }
        }

        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/**
 * Collection semantics on top of a `Storage`, with changes signalled through
 * an `Emitter` shared by every adapter looking at the same storage
 */
pub struct LocalStore {
    storage: Arc<dyn Storage>,
    emitter: Arc<Emitter>,
    writes: Mutex<()>,
}

impl LocalStore {
    pub fn new(storage: Arc<dyn Storage>, emitter: Arc<Emitter>) -> Self {
        Self {
            storage,
            emitter,
            writes: Mutex::new(()),
        }
    }

    pub fn emitter(&self) -> &Arc<Emitter> {
        &self.emitter
    }

    /**
     * The stored array as-is, in insertion order
     */
    fn load<T: Entity>(&self) -> Result<Vec<T>> {
        let key = T::KIND.storage_key();
        match self.storage.get(key)? {
            None => Ok(vec![]),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| Error::Corrupt {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn store<T: Entity>(&self, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.storage.set(T::KIND.storage_key(), &raw)?;
        Ok(())
    }

    pub fn read<T: Entity>(&self) -> Result<Vec<T>> {
        let mut items = self.load::<T>()?;
        T::order(&mut items);
        Ok(items)
    }

    pub fn save<T: Entity>(&self, entity: &T) -> Result<()> {
        {
            let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
            let mut items = self.load::<T>()?;
            upsert(&mut items, entity.clone());
            self.store(&items)?;
        }
        debug!("Saved {} into {}", entity.id(), T::KIND.collection());
        self.emitter.notify(T::KIND);
        Ok(())
    }

    pub fn delete<T: Entity>(&self, id: &str) -> Result<bool> {
        let removed = {
            let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
            let mut items = self.load::<T>()?;
            let before = items.len();
            items.retain(|item| item.id() != id);
            let removed = items.len() != before;
            if removed {
                self.store(&items)?;
            }
            removed
        };

        if removed {
            debug!("Deleted {} from {}", id, T::KIND.collection());
            self.emitter.notify(T::KIND);
        }
        Ok(removed)
    }

    /**
     * Swap a participant's poll vote and move the option counters along with it
     *
     * Both collections are validated before anything is written. The vote is
     * written first and put back as it was if the counters cannot follow, so
     * a failure leaves both collections untouched
     */
    pub fn cast_poll_vote(&self, vote: &PollVote, previous: Option<&str>) -> Result<()> {
        {
            let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
            let mut options = self.load::<PollOption>()?;
            let votes_before = self.storage.get(Kind::PollVotes.storage_key())?;
            let mut votes = self.load::<PollVote>()?;

            if !options
                .iter()
                .any(|o| o.id == vote.option_id && o.poll_id == vote.poll_id)
            {
                return Err(Error::UnknownOption {
                    poll: vote.poll_id.clone(),
                    option: vote.option_id.clone(),
                });
            }

            let stored = votes.iter().find(|v| v.id == vote.id);
            let previous = super::resolve_previous(stored, previous);
            let moved = previous.as_deref() != Some(vote.option_id.as_str());

            if moved {
                for option in options.iter_mut().filter(|o| o.poll_id == vote.poll_id) {
                    if Some(option.id.as_str()) == previous.as_deref() {
                        option.votes -= 1;
                    }
                    if option.id == vote.option_id {
                        option.votes += 1;
                    }
                }
            }

            upsert(&mut votes, vote.clone());
            self.store(&votes)?;

            if moved {
                if let Err(err) = self.store(&options) {
                    self.restore(Kind::PollVotes, votes_before.as_deref());
                    return Err(err);
                }
            }
        }

        self.emitter.notify(Kind::PollOptions);
        self.emitter.notify(Kind::PollVotes);
        Ok(())
    }

    /**
     * Put a collection back to the raw value read before a failed write
     */
    fn restore(&self, kind: Kind, raw: Option<&str>) {
        let key = kind.storage_key();
        if let Err(err) = self.storage.set(key, raw.unwrap_or("[]")) {
            error!("Failed to roll back {}, it may be out of step: {}", key, err);
        }
    }
}

/**
 * Replace the record with the same id in place, or append it
 */
fn upsert<T: Entity>(items: &mut Vec<T>, mut entity: T) {
    match items.iter().position(|item| item.id() == entity.id()) {
        Some(index) => {
            entity.keep_stored(&items[index]);
            items[index] = entity;
        }
        None => items.push(entity),
    }
}
