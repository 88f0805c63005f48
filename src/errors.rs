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

use redis::RedisError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type DislockResult<T> = std::result::Result<T, DislockError>;

#[derive(Error, Debug)]
pub enum DislockError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("no correlation id provided")]
    NoCorrelationId,

    #[error("no locks provided")]
    NoLocksProvided,

    #[error("lock id is empty")]
    LockIdEmpty,

    #[error("lock namespace is empty")]
    NamespaceEmpty,

    #[error("client id is empty")]
    ClientIdEmpty,

    #[error("client id is not a valid uuid: {0}")]
    ClientIdMalformed(String),

    #[error("instance {0} is outside the configured range")]
    InstanceOutOfRange(u32),

    #[error("instance {0} is reserved for management")]
    InstanceReserved(u32),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("lock already exists: {0}")]
    LockAlreadyExists(String),

    #[error("lock not found: {0}")]
    LockNotFound(String),

    #[error("queue entry {queue_id} not found for lock {lock}")]
    QueueEntryNotFound { lock: String, queue_id: String },

    #[error("queue entry {0} is not next in queue")]
    NotNextInQueue(String),

    #[error("handoff window expired for lock {0}")]
    HandoffExpired(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error codes reported on the request boundary. Backend and bookkeeping
/// failures all collapse to `Internal`; the detail stays in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoCorrelationId,
    NoLocksProvided,
    LockIdEmpty,
    NamespaceEmpty,
    ClientIdEmpty,
    ClientIdMalformed,
    InstanceOutOfRange,
    InstanceReserved,
    NamespaceNotFound,
    LockAlreadyExists,
    LockNotFound,
    NotNextInQueue,
    HandoffExpired,
    Internal,
}

impl DislockError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DislockError::NoCorrelationId => ErrorCode::NoCorrelationId,
            DislockError::NoLocksProvided => ErrorCode::NoLocksProvided,
            DislockError::LockIdEmpty => ErrorCode::LockIdEmpty,
            DislockError::NamespaceEmpty => ErrorCode::NamespaceEmpty,
            DislockError::ClientIdEmpty => ErrorCode::ClientIdEmpty,
            DislockError::ClientIdMalformed(_) => ErrorCode::ClientIdMalformed,
            DislockError::InstanceOutOfRange(_) => ErrorCode::InstanceOutOfRange,
            DislockError::InstanceReserved(_) => ErrorCode::InstanceReserved,
            DislockError::NamespaceNotFound(_) => ErrorCode::NamespaceNotFound,
            DislockError::LockAlreadyExists(_) => ErrorCode::LockAlreadyExists,
            DislockError::LockNotFound(_) => ErrorCode::LockNotFound,
            DislockError::NotNextInQueue(_) => ErrorCode::NotNextInQueue,
            DislockError::HandoffExpired(_) => ErrorCode::HandoffExpired,
            DislockError::Redis(_)
            | DislockError::Backend(_)
            | DislockError::QueueEntryNotFound { .. }
            | DislockError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::NoCorrelationId => "NO_CORRELATION_ID",
            ErrorCode::NoLocksProvided => "NO_LOCKS_PROVIDED",
            ErrorCode::LockIdEmpty => "LOCK_ID_EMPTY",
            ErrorCode::NamespaceEmpty => "NAMESPACE_EMPTY",
            ErrorCode::ClientIdEmpty => "CLIENT_ID_EMPTY",
            ErrorCode::ClientIdMalformed => "CLIENT_ID_MALFORMED",
            ErrorCode::InstanceOutOfRange => "INSTANCE_OUT_OF_RANGE",
            ErrorCode::InstanceReserved => "INSTANCE_RESERVED",
            ErrorCode::NamespaceNotFound => "NAMESPACE_NOT_FOUND",
            ErrorCode::LockAlreadyExists => "LOCK_ALREADY_EXISTS",
            ErrorCode::LockNotFound => "LOCK_NOT_FOUND",
            ErrorCode::NotNextInQueue => "NOT_NEXT_IN_QUEUE",
            ErrorCode::HandoffExpired => "HANDOFF_EXPIRED",
            ErrorCode::Internal => "INTERNAL",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_errors_collapse_to_internal() {
        assert_eq!(DislockError::Backend("boom".to_string()).code(), ErrorCode::Internal);
        assert_eq!(
            DislockError::QueueEntryNotFound {
                lock: "1:default:r1".to_string(),
                queue_id: "q1".to_string(),
            }
            .code(),
            ErrorCode::Internal
        );
        assert_eq!(DislockError::Internal("oops".to_string()).code(), ErrorCode::Internal);
    }

    #[test]
    fn test_validation_errors_keep_their_code() {
        assert_eq!(DislockError::LockIdEmpty.code(), ErrorCode::LockIdEmpty);
        assert_eq!(DislockError::InstanceReserved(0).code(), ErrorCode::InstanceReserved);
        assert_eq!(
            DislockError::LockAlreadyExists("1:default:r1".to_string()).code(),
            ErrorCode::LockAlreadyExists
        );
    }

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(ErrorCode::NoCorrelationId.to_string(), "NO_CORRELATION_ID");
        assert_eq!(ErrorCode::LockAlreadyExists.to_string(), "LOCK_ALREADY_EXISTS");
        assert_eq!(ErrorCode::Internal.to_string(), "INTERNAL");
    }
}
