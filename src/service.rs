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
use crate::errors::{DislockError, DislockResult, ErrorCode};
use crate::keys::LockKey;
use crate::kv::KvStore;
use crate::queue::{AcquireDecision, QueueManager};
use crate::registry::{LockAction, LockRegistry, LockStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const QUEUE_ID_LABEL: &str = "queue_id";

/// One lock named by a request, relative to the request's partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSpec {
    pub id: String,
    pub namespace: String,
}

impl LockSpec {
    pub fn new(id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            namespace: namespace.into(),
        }
    }

    fn key(&self, instance: u32) -> LockKey {
        LockKey::new(instance, self.namespace.clone(), self.id.clone())
    }
}

/// A request against the coordination engine. The transport layer fills this
/// in from whatever framing it speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub correlation_id: String,
    pub instance: u32,
    pub locks: Vec<LockSpec>,
    /// Stable caller identity, required for Lock
    pub client_id: String,
}

impl Request {
    pub fn new(correlation_id: impl Into<String>, instance: u32) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            instance,
            locks: Vec::new(),
            client_id: String::new(),
        }
    }

    pub fn with_lock(mut self, id: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.locks.push(LockSpec::new(id, namespace));
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// Per-lock slice of a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockView {
    pub id: String,
    pub namespace: String,
    pub status: Option<LockStatus>,
    pub labels: Vec<Label>,
}

impl LockView {
    fn new(spec: &LockSpec) -> Self {
        Self {
            id: spec.id.clone(),
            namespace: spec.namespace.clone(),
            status: None,
            labels: Vec::new(),
        }
    }

    fn with_status(mut self, status: LockStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.push(Label {
            key: key.to_string(),
            value: value.to_string(),
        });
        self
    }

    /// The queue id label, present only when the caller was queued.
    pub fn queue_id(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.key == QUEUE_ID_LABEL)
            .map(|l| l.value.as_str())
    }
}

/// Uniform response shape. Batches stop on the first failure;
/// `failed_on_lock` names the offending lock and the views accumulated
/// before it stay in place (there is no batch atomicity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub correlation_id: String,
    pub error: Option<ErrorCode>,
    pub failed_on_lock: Option<String>,
    pub locks: Vec<LockView>,
    /// Highest queue position across the batch, when any lock was queued
    pub queue_position: Option<i64>,
}

impl Response {
    fn ok(correlation_id: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            error: None,
            failed_on_lock: None,
            locks: Vec::new(),
            queue_position: None,
        }
    }

    fn denied(correlation_id: &str, code: ErrorCode) -> Self {
        Self {
            error: Some(code),
            ..Self::ok(correlation_id)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

enum LockOutcome {
    Immediate,
    Queued { queue_id: String, position: usize },
}

/// Stateless request-level glue: validates inputs, composes registry and
/// queue calls, and folds outcomes into the uniform response shape.
pub struct DislockService {
    registry: LockRegistry,
    queues: Arc<QueueManager>,
}

impl DislockService {
    pub fn new(config: DislockConfig, store: Arc<dyn KvStore>) -> Self {
        let config = Arc::new(config);
        let queues = Arc::new(QueueManager::new(config.clone(), store.clone()));
        let registry = LockRegistry::new(config, store, queues.clone());
        Self { registry, queues }
    }

    pub fn queues(&self) -> &Arc<QueueManager> {
        &self.queues
    }

    /// Creates every named lock, failing on the first that already exists.
    pub fn create(&self, req: &Request) -> Response {
        if let Some(denied) = Self::screen(req) {
            return denied;
        }

        let mut response = Response::ok(&req.correlation_id);
        for spec in &req.locks {
            let key = spec.key(req.instance);

            let exists = match self.registry.exists(&key) {
                Ok(exists) => exists,
                Err(err) => {
                    error!(correlation_id = %req.correlation_id, lock = %key, %err, "lock creation failed");
                    return Self::fail(response, spec, &key, &err);
                }
            };
            if exists {
                warn!(correlation_id = %req.correlation_id, lock = %key, "lock already exists");
                return Self::fail(
                    response,
                    spec,
                    &key,
                    &DislockError::LockAlreadyExists(key.to_string()),
                );
            }

            if let Err(err) = self.registry.transition(&key, LockAction::Create) {
                error!(correlation_id = %req.correlation_id, lock = %key, %err, "lock creation failed");
                return Self::fail(response, spec, &key, &err);
            }
            response
                .locks
                .push(LockView::new(spec).with_status(LockStatus::Unlocked));
        }

        info!(correlation_id = %req.correlation_id, "all locks created");
        response
    }

    /// Acquires each lock immediately when free, otherwise queues the caller.
    /// A queued lock still reports `LOCKED` from the client's perspective; the
    /// `queue_id` label is the signal that the caller is waiting.
    pub fn lock(&self, req: &Request) -> Response {
        if let Some(denied) = Self::screen(req) {
            return denied;
        }

        let client_id = match Self::parse_client_id(&req.client_id) {
            Ok(client_id) => client_id,
            Err(err) => {
                warn!(correlation_id = %req.correlation_id, %err, "client id rejected");
                return Response::denied(&req.correlation_id, err.code());
            }
        };

        let mut response = Response::ok(&req.correlation_id);
        let mut highest_position: Option<i64> = None;
        for spec in &req.locks {
            let key = spec.key(req.instance);
            match self.lock_one(&key, client_id) {
                Ok(LockOutcome::Immediate) => {
                    info!(correlation_id = %req.correlation_id, lock = %key, "lock acquired");
                    response
                        .locks
                        .push(LockView::new(spec).with_status(LockStatus::Locked));
                }
                Ok(LockOutcome::Queued { queue_id, position }) => {
                    info!(
                        correlation_id = %req.correlation_id,
                        lock = %key,
                        queue_id,
                        position,
                        "client queued"
                    );
                    response.locks.push(
                        LockView::new(spec)
                            .with_status(LockStatus::Locked)
                            .with_label(QUEUE_ID_LABEL, &queue_id),
                    );
                    let position = position as i64;
                    highest_position = Some(highest_position.map_or(position, |h| h.max(position)));
                }
                Err(err) => {
                    warn!(correlation_id = %req.correlation_id, lock = %key, %err, "lock acquisition failed");
                    return Self::fail(response, spec, &key, &err);
                }
            }
        }

        response.queue_position = highest_position;
        response
    }

    /// Releases each lock, triggering the queue handoff. Unlocking an already
    /// idle lock succeeds without mutating anything.
    pub fn unlock(&self, req: &Request) -> Response {
        if let Some(denied) = Self::screen(req) {
            return denied;
        }

        let mut response = Response::ok(&req.correlation_id);
        for spec in &req.locks {
            let key = spec.key(req.instance);
            match self.unlock_one(&key) {
                Ok(()) => {
                    response
                        .locks
                        .push(LockView::new(spec).with_status(LockStatus::Unlocked));
                }
                Err(err) => {
                    warn!(correlation_id = %req.correlation_id, lock = %key, %err, "unlock failed");
                    return Self::fail(response, spec, &key, &err);
                }
            }
        }

        response
    }

    /// Deletes each lock, dropping any waiters first.
    pub fn delete(&self, req: &Request) -> Response {
        if let Some(denied) = Self::screen(req) {
            return denied;
        }

        let mut response = Response::ok(&req.correlation_id);
        for spec in &req.locks {
            let key = spec.key(req.instance);
            match self.delete_one(&key) {
                Ok(()) => response.locks.push(LockView::new(spec)),
                Err(err) => {
                    warn!(correlation_id = %req.correlation_id, lock = %key, %err, "lock deletion failed");
                    return Self::fail(response, spec, &key, &err);
                }
            }
        }

        response
    }

    /// Completes a queued acquisition: succeeds only for the current grantee,
    /// within its handoff window, once the holder has released.
    pub fn acquire(
        &self,
        correlation_id: &str,
        instance: u32,
        lock: &LockSpec,
        queue_id: &str,
    ) -> Response {
        if correlation_id.is_empty() {
            warn!("correlation id is required");
            return Response::denied(correlation_id, ErrorCode::NoCorrelationId);
        }

        let mut response = Response::ok(correlation_id);
        let key = lock.key(instance);
        match self.acquire_one(&key, queue_id) {
            Ok(()) => {
                info!(correlation_id, lock = %key, queue_id, "queued lock acquired");
                response
                    .locks
                    .push(LockView::new(lock).with_status(LockStatus::Locked));
                response
            }
            Err(err) => {
                warn!(correlation_id, lock = %key, queue_id, %err, "queued acquisition failed");
                Self::fail(response, lock, &key, &err)
            }
        }
    }

    fn screen(req: &Request) -> Option<Response> {
        if req.correlation_id.is_empty() {
            warn!("correlation id is required");
            return Some(Response::denied(&req.correlation_id, ErrorCode::NoCorrelationId));
        }
        if req.locks.is_empty() {
            warn!(correlation_id = %req.correlation_id, "no locks provided in request");
            return Some(Response::denied(&req.correlation_id, ErrorCode::NoLocksProvided));
        }
        None
    }

    fn fail(mut response: Response, spec: &LockSpec, key: &LockKey, err: &DislockError) -> Response {
        response.error = Some(err.code());
        response.failed_on_lock = Some(key.to_string());
        response.locks.push(LockView::new(spec));
        response
    }

    fn parse_client_id(raw: &str) -> DislockResult<Uuid> {
        if raw.is_empty() {
            return Err(DislockError::ClientIdEmpty);
        }
        Uuid::parse_str(raw).map_err(|_| DislockError::ClientIdMalformed(raw.to_string()))
    }

    fn lock_one(&self, key: &LockKey, client_id: Uuid) -> DislockResult<LockOutcome> {
        if !self.registry.exists(key)? {
            return Err(DislockError::LockNotFound(key.to_string()));
        }
        match self.registry.status(key)? {
            LockStatus::Unlocked => {
                self.registry.transition(key, LockAction::Lock)?;
                Ok(LockOutcome::Immediate)
            }
            LockStatus::Locked => {
                let queue_id = self.queues.schedule(key, client_id)?;
                let position = self.queues.position(key, &queue_id)?;
                Ok(LockOutcome::Queued { queue_id, position })
            }
            status => Err(DislockError::Internal(format!("lock {key} is {status}"))),
        }
    }

    fn unlock_one(&self, key: &LockKey) -> DislockResult<()> {
        if !self.registry.exists(key)? {
            return Err(DislockError::LockNotFound(key.to_string()));
        }
        match self.registry.status(key)? {
            LockStatus::Unlocked => {
                info!(lock = %key, "lock already unlocked");
                Ok(())
            }
            LockStatus::Locked => self.registry.transition(key, LockAction::Unlock),
            status => Err(DislockError::Internal(format!("lock {key} is {status}"))),
        }
    }

    fn delete_one(&self, key: &LockKey) -> DislockResult<()> {
        if !self.registry.exists(key)? {
            return Err(DislockError::LockNotFound(key.to_string()));
        }
        self.queues.cancel_all(key)?;
        self.registry.transition(key, LockAction::Delete)
    }

    fn acquire_one(&self, key: &LockKey, queue_id: &str) -> DislockResult<()> {
        if queue_id.is_empty() {
            return Err(DislockError::Internal("queue id is empty".to_string()));
        }
        if !self.registry.exists(key)? {
            return Err(DislockError::LockNotFound(key.to_string()));
        }
        match self.registry.status(key)? {
            // The window only opens once the holder releases; even the
            // grantee cannot jump ahead while the lock is held.
            LockStatus::Locked => Err(DislockError::NotNextInQueue(queue_id.to_string())),
            LockStatus::Unlocked => match self.queues.try_acquire(key, queue_id)? {
                AcquireDecision::Granted => self.registry.transition(key, LockAction::Lock),
                AcquireDecision::NotNext => {
                    Err(DislockError::NotNextInQueue(queue_id.to_string()))
                }
                AcquireDecision::Expired => Err(DislockError::HandoffExpired(key.to_string())),
            },
            status => Err(DislockError::Internal(format!("lock {key} is {status}"))),
        }
    }
}
