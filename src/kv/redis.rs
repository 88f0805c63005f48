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
use parking_lot::{Mutex, RwLock};
use redis::{Client, Commands, Connection, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Connection settings for the Redis adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisKvConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl Default for RedisKvConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
        }
    }
}

impl RedisKvConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

// One connection per partition, guarded so that operations against that
// partition are totally ordered with no pipelining.
struct PartitionConnection {
    conn: Mutex<Connection>,
}

/// Redis-backed store. Partitions map onto logical Redis databases; exactly
/// one connection per partition is kept process-wide, created lazily.
pub struct RedisKvStore {
    config: RedisKvConfig,
    partitions: RwLock<HashMap<u32, Arc<PartitionConnection>>>,
}

impl RedisKvStore {
    pub fn new(config: RedisKvConfig) -> Self {
        Self {
            config,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    fn connection(&self, instance: u32) -> DislockResult<Arc<PartitionConnection>> {
        {
            let partitions = self.partitions.read();
            if let Some(partition) = partitions.get(&instance) {
                return Ok(partition.clone());
            }
        }

        let mut partitions = self.partitions.write();

        // Double check: another caller may have connected while we waited.
        if let Some(partition) = partitions.get(&instance) {
            return Ok(partition.clone());
        }

        debug!(instance, "opening redis connection for partition");
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.config.host.clone(), self.config.port),
            redis: RedisConnectionInfo {
                db: i64::from(instance),
                password: self.config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info)?;
        let conn = client.get_connection()?;

        let partition = Arc::new(PartitionConnection {
            conn: Mutex::new(conn),
        });
        partitions.insert(instance, partition.clone());
        Ok(partition)
    }
}

impl KvStore for RedisKvStore {
    fn get(&self, instance: u32, key: &str) -> DislockResult<String> {
        let partition = self.connection(instance)?;
        let mut conn = partition.conn.lock();
        let value: Option<String> = conn.get(key)?;
        Ok(value.unwrap_or_default())
    }

    fn set(&self, instance: u32, key: &str, value: &str) -> DislockResult<()> {
        let partition = self.connection(instance)?;
        let mut conn = partition.conn.lock();
        conn.set::<_, _, ()>(key, value)?;
        Ok(())
    }

    fn exists(&self, instance: u32, key: &str) -> DislockResult<bool> {
        let partition = self.connection(instance)?;
        let mut conn = partition.conn.lock();
        let exists: bool = conn.exists(key)?;
        Ok(exists)
    }

    fn delete(&self, instance: u32, key: &str) -> DislockResult<()> {
        let partition = self.connection(instance)?;
        let mut conn = partition.conn.lock();
        conn.del::<_, ()>(key)?;
        Ok(())
    }
}
