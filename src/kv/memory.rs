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

use crate::errors::DislockResult;
use crate::kv::KvStore;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Deterministic in-process store. Backs the test suite and single-process
/// embeddings that do not want an external Redis.
#[derive(Default)]
pub struct MemoryKvStore {
    partitions: Mutex<HashMap<u32, HashMap<String, String>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw view of a key, distinguishing absent from stored. Handy when
    /// inspecting persisted state directly.
    pub fn peek(&self, instance: u32, key: &str) -> Option<String> {
        let partitions = self.partitions.lock();
        partitions.get(&instance)?.get(key).cloned()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, instance: u32, key: &str) -> DislockResult<String> {
        let partitions = self.partitions.lock();
        Ok(partitions
            .get(&instance)
            .and_then(|p| p.get(key))
            .cloned()
            .unwrap_or_default())
    }

    fn set(&self, instance: u32, key: &str, value: &str) -> DislockResult<()> {
        let mut partitions = self.partitions.lock();
        partitions
            .entry(instance)
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn exists(&self, instance: u32, key: &str) -> DislockResult<bool> {
        let partitions = self.partitions.lock();
        Ok(partitions.get(&instance).is_some_and(|p| p.contains_key(key)))
    }

    fn delete(&self, instance: u32, key: &str) -> DislockResult<()> {
        let mut partitions = self.partitions.lock();
        if let Some(partition) = partitions.get_mut(&instance) {
            partition.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_absent_returns_empty_string() {
        let store = MemoryKvStore::new();
        assert_eq!(store.get(1, "missing").unwrap(), "");
        assert!(!store.exists(1, "missing").unwrap());
        assert_eq!(store.peek(1, "missing"), None);
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = MemoryKvStore::new();
        store.set(1, "k", "v").unwrap();
        assert_eq!(store.get(1, "k").unwrap(), "v");
        assert!(store.exists(1, "k").unwrap());
        assert_eq!(store.peek(1, "k"), Some("v".to_string()));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryKvStore::new();
        store.set(1, "k", "v").unwrap();
        store.delete(1, "k").unwrap();
        store.delete(1, "k").unwrap();
        assert!(!store.exists(1, "k").unwrap());
    }

    #[test]
    fn test_partitions_are_isolated() {
        let store = MemoryKvStore::new();
        store.set(1, "k", "one").unwrap();
        store.set(2, "k", "two").unwrap();
        assert_eq!(store.get(1, "k").unwrap(), "one");
        assert_eq!(store.get(2, "k").unwrap(), "two");
        store.delete(1, "k").unwrap();
        assert_eq!(store.get(2, "k").unwrap(), "two");
    }
}
