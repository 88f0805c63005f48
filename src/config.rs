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

use crate::errors::{DislockError, DislockResult};
use crate::keys::LockKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_next_in_queue_timeout() -> Duration {
    Duration::from_secs(15)
}

/// Engine configuration: the partition/namespace layout plus the reserved
/// management partition. Transport and process concerns stay with the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DislockConfig {
    /// Configured partitions
    pub instances: Vec<InstanceConfig>,
    /// Partition reserved for cluster management; client operations against it are rejected
    #[serde(default)]
    pub management_instance: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// The partition id (selects the logical database in the backing store)
    pub id: u32,
    /// Namespaces scoped under this partition
    pub namespaces: Vec<NamespaceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub name: String,
    /// Grace window the head waiter has to complete acquisition after a release
    #[serde(default = "default_next_in_queue_timeout", with = "humantime_serde")]
    pub next_in_queue_timeout: Duration,
}

impl Default for DislockConfig {
    fn default() -> Self {
        Self {
            instances: vec![InstanceConfig::new(1).with_namespace(NamespaceConfig::new("default"))],
            management_instance: 0,
        }
    }
}

impl DislockConfig {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            management_instance: 0,
        }
    }

    pub fn with_instance(mut self, instance: InstanceConfig) -> Self {
        self.instances.push(instance);
        self
    }

    pub fn with_management_instance(mut self, instance: u32) -> Self {
        self.management_instance = instance;
        self
    }

    pub fn instance(&self, id: u32) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.id == id)
    }

    pub fn namespace(&self, instance: u32, name: &str) -> Option<&NamespaceConfig> {
        self.instance(instance)?.namespace(name)
    }

    /// Validates that a lock key is routable: non-empty components, a
    /// configured non-management partition, and a configured namespace.
    /// Runs before any store interaction and has no side effects.
    pub fn validate_key(&self, key: &LockKey) -> DislockResult<()> {
        if key.id.is_empty() {
            return Err(DislockError::LockIdEmpty);
        }
        if key.namespace.is_empty() {
            return Err(DislockError::NamespaceEmpty);
        }
        if key.instance == self.management_instance {
            return Err(DislockError::InstanceReserved(key.instance));
        }
        let instance = self
            .instance(key.instance)
            .ok_or(DislockError::InstanceOutOfRange(key.instance))?;
        if instance.namespace(&key.namespace).is_none() {
            return Err(DislockError::NamespaceNotFound(key.namespace.clone()));
        }
        Ok(())
    }

    /// The handoff window configured for a namespace.
    pub fn next_in_queue_timeout(&self, instance: u32, namespace: &str) -> DislockResult<Duration> {
        let instance_config = self
            .instance(instance)
            .ok_or(DislockError::InstanceOutOfRange(instance))?;
        let namespace_config = instance_config
            .namespace(namespace)
            .ok_or_else(|| DislockError::NamespaceNotFound(namespace.to_string()))?;
        Ok(namespace_config.next_in_queue_timeout)
    }
}

impl InstanceConfig {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            namespaces: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: NamespaceConfig) -> Self {
        self.namespaces.push(namespace);
        self
    }

    pub fn namespace(&self, name: &str) -> Option<&NamespaceConfig> {
        self.namespaces.iter().find(|n| n.name == name)
    }
}

impl NamespaceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_in_queue_timeout: default_next_in_queue_timeout(),
        }
    }

    pub fn with_next_in_queue_timeout(mut self, timeout: Duration) -> Self {
        self.next_in_queue_timeout = timeout;
        self
    }
}
