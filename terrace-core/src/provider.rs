//! Provider - the seam between the engine and a cloud
//!
//! A Provider turns Effects into calls against one cloud API. The engine
//! only ever sees `State` snapshots keyed by the identifier the cloud hands
//! back (`vpc-...`, `eipalloc-...`) and `ProviderError`s carrying the
//! cloud's error code when it reported one.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::resource::{Resource, ResourceId, State};

/// Error code for a resource the cloud no longer knows about
pub const NOT_FOUND: &str = "NotFound";

#[derive(Debug)]
pub struct ProviderError {
    pub resource: Option<ResourceId>,
    /// Cloud error code, e.g. `DependencyViolation` or `AddressLimitExceeded`
    pub code: Option<String>,
    pub message: String,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = &self.resource {
            write!(f, "[{}] ", id)?;
        }
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            resource: None,
            code: None,
            message: message.into(),
            cause: None,
        }
    }

    /// An error the cloud classified with `code`
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(message)
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(NOT_FOUND)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations the engine needs from a cloud.
///
/// Implemented by the Cloud Control provider and the in-process simulator.
pub trait Provider: Send + Sync {
    /// Name recorded in state (e.g., "awscc")
    fn name(&self) -> &'static str;

    /// Whether this provider can manage `resource_type`
    fn handles(&self, resource_type: &str) -> bool;

    /// Current state of a resource; `State::not_found()` without an identifier
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource; the returned State carries the cloud identifier
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Change the mutable attributes of an existing resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource. A resource that is already gone fails with `NOT_FOUND`.
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn handles(&self, resource_type: &str) -> bool {
        (**self).handles(resource_type)
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}

/// Fail when `provider` cannot manage every declared resource type
pub fn check_coverage(provider: &dyn Provider, resources: &[Resource]) -> ProviderResult<()> {
    let mut missing: Vec<&str> = resources
        .iter()
        .map(|r| r.id.resource_type.as_str())
        .filter(|t| !provider.handles(t))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort_unstable();
    missing.dedup();
    Err(ProviderError::new(format!(
        "provider '{}' cannot manage {}",
        provider.name(),
        missing.join(", ")
    )))
}
