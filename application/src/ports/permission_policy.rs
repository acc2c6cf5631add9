//! Permission policy port.
//!
//! The application supplies one [`PermissionPolicy`] per session. It is
//! consulted for every registered tool invocation and for every built-in
//! capability the backend asks to use.
//!
//! # Built-in Implementations
//!
//! - [`ApproveAll`] - Always returns `approved`
//! - [`DenyAll`] - Always returns `denied-by-rules`
//! - [`from_fn`] - Wraps an async closure (may prompt a user, call a service, ...)
//!
//! A policy that returns `Err` is broken, not negative: the session engine
//! fails the current turn and marks the session unusable instead of treating
//! the error as a denial.

use async_trait::async_trait;
use harness_domain::{PermissionDecision, PermissionInvocation, PermissionRequest};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

/// Failure of the policy itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct PolicyError(String);

impl PolicyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Port for deciding permission requests.
#[async_trait]
pub trait PermissionPolicy: Send + Sync {
    /// Decide one request. Called at most once per request.
    async fn decide(
        &self,
        request: &PermissionRequest,
        invocation: &PermissionInvocation,
    ) -> Result<PermissionDecision, PolicyError>;
}

/// Approves every request.
///
/// # Warning
///
/// Only use when every registered tool and every built-in capability of the
/// backend is acceptable to run unattended.
pub struct ApproveAll;

#[async_trait]
impl PermissionPolicy for ApproveAll {
    async fn decide(
        &self,
        _request: &PermissionRequest,
        _invocation: &PermissionInvocation,
    ) -> Result<PermissionDecision, PolicyError> {
        Ok(PermissionDecision::Approved)
    }
}

/// Denies every request by rule.
pub struct DenyAll;

#[async_trait]
impl PermissionPolicy for DenyAll {
    async fn decide(
        &self,
        _request: &PermissionRequest,
        _invocation: &PermissionInvocation,
    ) -> Result<PermissionDecision, PolicyError> {
        Ok(PermissionDecision::DeniedByRules)
    }
}

/// Policy backed by an async closure. See [`from_fn`].
pub struct FnPolicy<F> {
    f: F,
}

/// Build a policy from an async closure receiving owned copies of the
/// request and invocation.
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn PermissionPolicy>
where
    F: Fn(PermissionRequest, PermissionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PermissionDecision, PolicyError>> + Send + 'static,
{
    Arc::new(FnPolicy { f })
}

#[async_trait]
impl<F, Fut> PermissionPolicy for FnPolicy<F>
where
    F: Fn(PermissionRequest, PermissionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PermissionDecision, PolicyError>> + Send + 'static,
{
    async fn decide(
        &self,
        request: &PermissionRequest,
        invocation: &PermissionInvocation,
    ) -> Result<PermissionDecision, PolicyError> {
        (self.f)(request.clone(), invocation.clone()).await
    }
}
