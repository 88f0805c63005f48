/*
 *
 *  *
 *  *      Copyright (c) 2018-2025, SnackCloud All rights reserved.
 *  *
 *  *   Redistribution and use in source and binary forms, with or without
 *  *   modification, are permitted provided that the following conditions are met:
 *  *
 *  *   Redistributions of source code must retain the above copyright notice,
 *  *   this list of conditions and the following disclaimer.
 *  *   Redistributions in binary form must reproduce the above copyright
 *  *   notice, this list of conditions and the following disclaimer in the
 *  *   documentation and/or other materials provided with the distribution.
 *  *   Neither the name of the www.snackcloud.cn developer nor the names of its
 *  *   contributors may be used to endorse or promote products derived from
 *  *   this software without specific prior written permission.
 *  *   Author: SnackCloud
 *  *
 *
 */

use crate::config::DislockConfig;
use crate::errors::{DislockError, DislockResult};
use crate::keys::LockKey;
use crate::kv::KvStore;
use crate::util::{new_queue_id, now_epoch_nanos};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const QUEUE_SEPARATOR: char = ',';
const ENTRY_SEPARATOR: char = ':';

/// One waiting attempt. Only `queue_id` takes part in position lookup and
/// acquisition; `client_id` is kept for operator observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub queue_id: String,
    pub client_id: String,
}

impl QueueEntry {
    fn encode(&self) -> String {
        format!("{}{}{}", self.queue_id, ENTRY_SEPARATOR, self.client_id)
    }

    fn decode(raw: &str) -> Self {
        match raw.split_once(ENTRY_SEPARATOR) {
            Some((queue_id, client_id)) => Self {
                queue_id: queue_id.to_string(),
                client_id: client_id.to_string(),
            },
            None => Self {
                queue_id: raw.to_string(),
                client_id: String::new(),
            },
        }
    }
}

/// Outcome of a head waiter trying to complete its handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireDecision {
    /// The waiter was the eligible head and its entry has been removed.
    Granted,
    /// Someone else is the grantee, or no handoff window is open.
    NotNext,
    /// The waiter held the window past its deadline and forfeited; the next
    /// waiter has been promoted.
    Expired,
}

/// Per-lock FIFO of waiters plus the grantee/deadline handoff slot. All state
/// lives in the store; the only in-process state is the serialization map.
pub struct QueueManager {
    config: Arc<DislockConfig>,
    store: Arc<dyn KvStore>,
    // Per-lock mutexes, created on demand and never removed. Every queue
    // mutation holds the lock's mutex for its whole read-modify-write.
    mutexes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QueueManager {
    pub fn new(config: Arc<DislockConfig>, store: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            store,
            mutexes: Mutex::new(HashMap::new()),
        }
    }

    fn guard(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut mutexes = self.mutexes.lock();
        mutexes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn read_entries(&self, key: &LockKey) -> DislockResult<Vec<QueueEntry>> {
        let raw = self.store.get(key.instance, &key.queue_key())?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        Ok(raw.split(QUEUE_SEPARATOR).map(QueueEntry::decode).collect())
    }

    fn write_entries(&self, key: &LockKey, entries: &[QueueEntry]) -> DislockResult<()> {
        let joined = entries
            .iter()
            .map(QueueEntry::encode)
            .collect::<Vec<_>>()
            .join(&QUEUE_SEPARATOR.to_string());
        self.store.set(key.instance, &key.queue_key(), &joined)
    }

    fn clear_queue_keys(&self, key: &LockKey) -> DislockResult<()> {
        self.store.delete(key.instance, &key.queue_key())?;
        self.store.delete(key.instance, &key.next_key())?;
        self.store.delete(key.instance, &key.deadline_key())?;
        Ok(())
    }

    /// Enqueues a waiting attempt for `client_id` and returns its queue id.
    /// The sole waiter of a fresh queue is immediately marked as grantee, with
    /// no deadline until a release opens a handoff window.
    pub fn schedule(&self, key: &LockKey, client_id: Uuid) -> DislockResult<String> {
        self.config.validate_key(key)?;
        if client_id.is_nil() {
            return Err(DislockError::ClientIdEmpty);
        }

        let slot = self.guard(key);
        let _held = slot.lock();

        let mut entries = self.read_entries(key)?;
        let queue_id = new_queue_id();
        entries.push(QueueEntry {
            queue_id: queue_id.clone(),
            client_id: client_id.to_string(),
        });
        self.write_entries(key, &entries)?;

        if entries.len() == 1 {
            self.store.set(key.instance, &key.next_key(), &queue_id)?;
        }

        debug!(lock = %key, queue_id, position = entries.len() - 1, "waiter scheduled");
        Ok(queue_id)
    }

    /// Zero-based position of a waiting attempt in the queue.
    pub fn position(&self, key: &LockKey, queue_id: &str) -> DislockResult<usize> {
        self.config.validate_key(key)?;
        if queue_id.is_empty() {
            return Err(DislockError::Internal("queue id is empty".to_string()));
        }

        let entries = self.read_entries(key)?;
        entries
            .iter()
            .position(|e| e.queue_id == queue_id)
            .ok_or_else(|| DislockError::QueueEntryNotFound {
                lock: key.to_string(),
                queue_id: queue_id.to_string(),
            })
    }

    /// Current queue content, head first.
    pub fn entries(&self, key: &LockKey) -> DislockResult<Vec<QueueEntry>> {
        self.config.validate_key(key)?;
        self.read_entries(key)
    }

    /// Lets the grantee complete its handoff. On `Granted` the entry has been
    /// removed and the grantee slot cleared; the caller is expected to move
    /// the lock itself to its held state.
    pub fn try_acquire(&self, key: &LockKey, queue_id: &str) -> DislockResult<AcquireDecision> {
        self.config.validate_key(key)?;
        if queue_id.is_empty() {
            return Err(DislockError::Internal("queue id is empty".to_string()));
        }

        let slot = self.guard(key);
        let _held = slot.lock();

        let next = self.store.get(key.instance, &key.next_key())?;
        if next.is_empty() || next != queue_id {
            return Ok(AcquireDecision::NotNext);
        }

        let deadline_raw = self.store.get(key.instance, &key.deadline_key())?;
        if !deadline_raw.is_empty() {
            let deadline: u64 = deadline_raw.parse().map_err(|_| {
                DislockError::Backend(format!("malformed handoff deadline: {deadline_raw}"))
            })?;
            if now_epoch_nanos() > deadline {
                warn!(lock = %key, queue_id, "handoff window expired, advancing queue head");
                self.advance_locked(key)?;
                return Ok(AcquireDecision::Expired);
            }
        }

        self.remove_granted_locked(key, queue_id)?;
        info!(lock = %key, queue_id, "queue head granted");
        Ok(AcquireDecision::Granted)
    }

    /// Handoff entry point, invoked after a lock is released. Promotes the
    /// head waiter to grantee and opens its deadline window.
    pub fn release(&self, key: &LockKey) -> DislockResult<()> {
        self.config.validate_key(key)?;

        let slot = self.guard(key);
        let _held = slot.lock();

        self.handoff_locked(key)
    }

    /// Drops the current head and promotes its successor with a fresh window.
    pub fn advance_head(&self, key: &LockKey) -> DislockResult<()> {
        self.config.validate_key(key)?;

        let slot = self.guard(key);
        let _held = slot.lock();

        self.advance_locked(key)
    }

    /// Removes a waiting attempt. Cancelling the current grantee promotes the
    /// next waiter as if its window had expired.
    pub fn cancel(&self, key: &LockKey, queue_id: &str) -> DislockResult<()> {
        self.config.validate_key(key)?;
        if queue_id.is_empty() {
            return Err(DislockError::Internal("queue id is empty".to_string()));
        }

        let slot = self.guard(key);
        let _held = slot.lock();

        let mut entries = self.read_entries(key)?;
        let index = entries
            .iter()
            .position(|e| e.queue_id == queue_id)
            .ok_or_else(|| DislockError::QueueEntryNotFound {
                lock: key.to_string(),
                queue_id: queue_id.to_string(),
            })?;

        let next = self.store.get(key.instance, &key.next_key())?;
        if next == queue_id {
            if index == 0 {
                debug!(lock = %key, queue_id, "grantee cancelled, advancing queue head");
                return self.advance_locked(key);
            }
            // The grantee slot should always point at the head.
            warn!(lock = %key, queue_id, index, "grantee does not match the queue head");
        }

        entries.remove(index);
        if entries.is_empty() {
            self.clear_queue_keys(key)?;
        } else {
            self.write_entries(key, &entries)?;
        }
        debug!(lock = %key, queue_id, "waiter cancelled");
        Ok(())
    }

    /// Drops every waiter and clears the handoff slot. Returns how many
    /// waiters were removed.
    pub fn cancel_all(&self, key: &LockKey) -> DislockResult<usize> {
        self.config.validate_key(key)?;

        let slot = self.guard(key);
        let _held = slot.lock();

        let entries = self.read_entries(key)?;
        self.clear_queue_keys(key)?;
        if !entries.is_empty() {
            info!(lock = %key, waiters = entries.len(), "dropped all waiters");
        }
        Ok(entries.len())
    }

    fn handoff_locked(&self, key: &LockKey) -> DislockResult<()> {
        let entries = self.read_entries(key)?;
        let Some(head) = entries.first() else {
            return Ok(());
        };

        let timeout = self
            .config
            .next_in_queue_timeout(key.instance, &key.namespace)?;
        self.store
            .set(key.instance, &key.next_key(), &head.queue_id)?;
        let deadline = now_epoch_nanos() + timeout.as_nanos() as u64;
        self.store
            .set(key.instance, &key.deadline_key(), &deadline.to_string())?;

        debug!(lock = %key, queue_id = %head.queue_id, "handoff window opened");
        Ok(())
    }

    fn advance_locked(&self, key: &LockKey) -> DislockResult<()> {
        let mut entries = self.read_entries(key)?;
        if entries.is_empty() {
            return self.clear_queue_keys(key);
        }

        entries.remove(0);
        self.store.delete(key.instance, &key.deadline_key())?;

        if entries.is_empty() {
            self.store.delete(key.instance, &key.queue_key())?;
            self.store.delete(key.instance, &key.next_key())?;
            return Ok(());
        }

        self.write_entries(key, &entries)?;
        self.handoff_locked(key)
    }

    fn remove_granted_locked(&self, key: &LockKey, queue_id: &str) -> DislockResult<()> {
        self.store.delete(key.instance, &key.deadline_key())?;
        self.store.delete(key.instance, &key.next_key())?;

        let mut entries = self.read_entries(key)?;
        match entries.iter().position(|e| e.queue_id == queue_id) {
            Some(index) => {
                if index != 0 {
                    warn!(lock = %key, queue_id, index, "granted entry was not the queue head");
                }
                entries.remove(index);
            }
            None => warn!(lock = %key, queue_id, "granted entry missing from queue"),
        }

        if entries.is_empty() {
            self.store.delete(key.instance, &key.queue_key())?;
        } else {
            self.write_entries(key, &entries)?;
        }
        Ok(())
    }
}
