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

mod memory;
mod redis;

pub use self::memory::*;
pub use self::redis::*;

use crate::errors::DislockResult;

/// Contract the engine requires of the backing store. Operations are blocking
/// and totally ordered per partition; the adapter owns that serialization.
///
/// `get` returns the empty string for absent keys. The engine never stores the
/// empty string, so the two cases are never ambiguous.
pub trait KvStore: Send + Sync {
    fn get(&self, instance: u32, key: &str) -> DislockResult<String>;
    fn set(&self, instance: u32, key: &str, value: &str) -> DislockResult<()>;
    fn exists(&self, instance: u32, key: &str) -> DislockResult<bool>;
    fn delete(&self, instance: u32, key: &str) -> DislockResult<()>;
}
