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

// Key templates instantiated by literal substitution. The base form (no
// suffix) is also the key of the per-lock serialization mutex.
const BASE_KEY: &str = "$INSTANCE:$NAMESPACE:$ID";
const STATUS_KEY: &str = "$INSTANCE:$NAMESPACE:$ID:lock";
const QUEUE_KEY: &str = "$INSTANCE:$NAMESPACE:$ID:q";
const QUEUE_NEXT_KEY: &str = "$INSTANCE:$NAMESPACE:$ID:qn";
const QUEUE_TIME_KEY: &str = "$INSTANCE:$NAMESPACE:$ID:qt";

/// The `(instance, namespace, id)` triple addressing a single lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub instance: u32,
    pub namespace: String,
    pub id: String,
}

impl LockKey {
    pub fn new(instance: u32, namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            instance,
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    fn render(&self, template: &str) -> String {
        template
            .replace("$INSTANCE", &self.instance.to_string())
            .replace("$NAMESPACE", &self.namespace)
            .replace("$ID", &self.id)
    }

    /// Key holding the lock status value.
    pub fn status_key(&self) -> String {
        self.render(STATUS_KEY)
    }

    /// Key holding the comma-separated wait queue.
    pub fn queue_key(&self) -> String {
        self.render(QUEUE_KEY)
    }

    /// Key holding the queue id of the current grantee.
    pub fn next_key(&self) -> String {
        self.render(QUEUE_NEXT_KEY)
    }

    /// Key holding the handoff deadline in epoch nanoseconds.
    pub fn deadline_key(&self) -> String {
        self.render(QUEUE_TIME_KEY)
    }
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render(BASE_KEY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        let key = LockKey::new(1, "default", "r1");
        assert_eq!(key.status_key(), "1:default:r1:lock");
        assert_eq!(key.queue_key(), "1:default:r1:q");
        assert_eq!(key.next_key(), "1:default:r1:qn");
        assert_eq!(key.deadline_key(), "1:default:r1:qt");
        assert_eq!(key.to_string(), "1:default:r1");
    }

    #[test]
    fn test_keys_differ_per_lock() {
        let a = LockKey::new(1, "default", "a");
        let b = LockKey::new(1, "default", "b");
        let c = LockKey::new(2, "default", "a");
        assert_ne!(a.status_key(), b.status_key());
        assert_ne!(a.status_key(), c.status_key());
        assert_ne!(a.queue_key(), b.queue_key());
    }
}
