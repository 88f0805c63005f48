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

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generates a fresh queue id for a waiting attempt.
pub fn new_queue_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time as nanoseconds since the Unix epoch.
pub fn now_epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_ids_are_unique() {
        assert_ne!(new_queue_id(), new_queue_id());
    }

    #[test]
    fn test_epoch_nanos_is_monotonic_enough() {
        let a = now_epoch_nanos();
        let b = now_epoch_nanos();
        assert!(b >= a);
        assert!(a > 0);
    }
}
