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
use crate::queue::QueueManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Persisted lifecycle of a lock. The pending states are transient markers
/// written at the start of creation and deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    PendingCreation,
    Locked,
    Unlocked,
    PendingDeletion,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::PendingCreation => "PENDING_CREATION",
            LockStatus::Locked => "LOCKED",
            LockStatus::Unlocked => "UNLOCKED",
            LockStatus::PendingDeletion => "PENDING_DELETION",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING_CREATION" => Some(LockStatus::PendingCreation),
            "LOCKED" => Some(LockStatus::Locked),
            "UNLOCKED" => Some(LockStatus::Unlocked),
            "PENDING_DELETION" => Some(LockStatus::PendingDeletion),
            _ => None,
        }
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State transitions the registry can apply to a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAction {
    Create,
    Lock,
    Unlock,
    Delete,
}

impl LockAction {
    // The marker written first for every action. For Lock and Unlock the
    // marker is already the terminal state.
    fn pending_status(self) -> LockStatus {
        match self {
            LockAction::Create => LockStatus::PendingCreation,
            LockAction::Lock => LockStatus::Locked,
            LockAction::Unlock => LockStatus::Unlocked,
            LockAction::Delete => LockStatus::PendingDeletion,
        }
    }
}

/// Owns the per-lock status key. Does not verify that the prior state was
/// legal before transitioning; the coordinator performs the pre-checks.
pub struct LockRegistry {
    config: Arc<DislockConfig>,
    store: Arc<dyn KvStore>,
    queues: Arc<QueueManager>,
}

impl LockRegistry {
    pub fn new(
        config: Arc<DislockConfig>,
        store: Arc<dyn KvStore>,
        queues: Arc<QueueManager>,
    ) -> Self {
        Self {
            config,
            store,
            queues,
        }
    }

    pub fn exists(&self, key: &LockKey) -> DislockResult<bool> {
        self.config.validate_key(key)?;
        let exists = self.store.exists(key.instance, &key.status_key())?;
        debug!(lock = %key, exists, "lock existence checked");
        Ok(exists)
    }

    pub fn status(&self, key: &LockKey) -> DislockResult<LockStatus> {
        self.config.validate_key(key)?;
        let raw = self.store.get(key.instance, &key.status_key())?;
        if raw.is_empty() {
            return Err(DislockError::Backend(format!(
                "lock status missing for {key}"
            )));
        }
        LockStatus::parse(&raw)
            .ok_or_else(|| DislockError::Backend(format!("unknown lock status: {raw}")))
    }

    pub fn transition(&self, key: &LockKey, action: LockAction) -> DislockResult<()> {
        self.config.validate_key(key)?;

        let pending = action.pending_status();
        self.store
            .set(key.instance, &key.status_key(), pending.as_str())?;
        debug!(lock = %key, status = %pending, "status marker written");

        match action {
            LockAction::Create => {
                self.store
                    .set(key.instance, &key.status_key(), LockStatus::Unlocked.as_str())?;
                info!(lock = %key, "lock created");
            }
            LockAction::Delete => {
                self.store.delete(key.instance, &key.status_key())?;
                info!(lock = %key, "lock deleted");
            }
            LockAction::Lock => {
                info!(lock = %key, "lock held");
            }
            LockAction::Unlock => {
                // The lock is already free; a failed handoff must not undo
                // the unlock. Later queue traffic re-converges the state.
                if let Err(err) = self.queues.release(key) {
                    error!(lock = %key, %err, "queue handoff failed after unlock");
                }
                info!(lock = %key, "lock released");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceConfig, NamespaceConfig};
    use crate::kv::MemoryKvStore;
    use uuid::Uuid;

    fn test_registry() -> (Arc<MemoryKvStore>, Arc<QueueManager>, LockRegistry) {
        let config = Arc::new(
            DislockConfig::new()
                .with_management_instance(0)
                .with_instance(
                    InstanceConfig::new(1).with_namespace(NamespaceConfig::new("default")),
                ),
        );
        let store = Arc::new(MemoryKvStore::new());
        let queues = Arc::new(QueueManager::new(config.clone(), store.clone()));
        let registry = LockRegistry::new(config, store.clone(), queues.clone());
        (store, queues, registry)
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            LockStatus::PendingCreation,
            LockStatus::Locked,
            LockStatus::Unlocked,
            LockStatus::PendingDeletion,
        ] {
            assert_eq!(LockStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(LockStatus::parse("HELD"), None);
    }

    #[test]
    fn test_create_leaves_lock_unlocked() {
        let (store, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        assert!(!registry.exists(&key).unwrap());
        registry.transition(&key, LockAction::Create).unwrap();
        assert!(registry.exists(&key).unwrap());
        assert_eq!(registry.status(&key).unwrap(), LockStatus::Unlocked);
        assert_eq!(store.peek(1, &key.status_key()), Some("UNLOCKED".to_string()));
    }

    #[test]
    fn test_lock_transition_is_terminal() {
        let (_, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        registry.transition(&key, LockAction::Create).unwrap();
        registry.transition(&key, LockAction::Lock).unwrap();
        assert_eq!(registry.status(&key).unwrap(), LockStatus::Locked);
    }

    #[test]
    fn test_delete_removes_status_key() {
        let (store, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        registry.transition(&key, LockAction::Create).unwrap();
        registry.transition(&key, LockAction::Delete).unwrap();
        assert!(!registry.exists(&key).unwrap());
        assert_eq!(store.peek(1, &key.status_key()), None);
    }

    #[test]
    fn test_unlock_opens_handoff_window() {
        let (store, queues, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        registry.transition(&key, LockAction::Create).unwrap();
        registry.transition(&key, LockAction::Lock).unwrap();
        let q1 = queues.schedule(&key, Uuid::new_v4()).unwrap();

        registry.transition(&key, LockAction::Unlock).unwrap();
        assert_eq!(registry.status(&key).unwrap(), LockStatus::Unlocked);
        assert_eq!(store.peek(1, &key.next_key()), Some(q1));
        assert!(store.peek(1, &key.deadline_key()).is_some());
    }

    #[test]
    fn test_unlock_without_waiters() {
        let (store, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        registry.transition(&key, LockAction::Create).unwrap();
        registry.transition(&key, LockAction::Lock).unwrap();
        registry.transition(&key, LockAction::Unlock).unwrap();

        assert_eq!(registry.status(&key).unwrap(), LockStatus::Unlocked);
        assert_eq!(store.peek(1, &key.next_key()), None);
        assert_eq!(store.peek(1, &key.deadline_key()), None);
    }

    #[test]
    fn test_status_of_absent_lock_is_backend_failure() {
        let (_, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");
        assert!(matches!(
            registry.status(&key),
            Err(DislockError::Backend(_))
        ));
    }

    #[test]
    fn test_unparseable_status_is_backend_failure() {
        let (store, _, registry) = test_registry();
        let key = LockKey::new(1, "default", "r1");

        store.set(1, &key.status_key(), "HELD").unwrap();
        assert!(matches!(
            registry.status(&key),
            Err(DislockError::Backend(_))
        ));
    }

    #[test]
    fn test_registry_validates_before_touching_store() {
        let (_, _, registry) = test_registry();
        assert!(matches!(
            registry.exists(&LockKey::new(0, "default", "r1")),
            Err(DislockError::InstanceReserved(0))
        ));
        assert!(matches!(
            registry.exists(&LockKey::new(7, "default", "r1")),
            Err(DislockError::InstanceOutOfRange(7))
        ));
    }
}
