//! Deferred - One-shot values shared between effect tasks
//!
//! A `Resolver` is the write half and is consumed by `resolve`. Any number of
//! `Deferred` readers wait for the value without polling. If the resolver is
//! dropped first, every reader observes `DeferredError::Abandoned`.

use std::collections::HashMap;

use tokio::sync::watch;

use crate::resource::{Attributes, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeferredError {
    #[error("value was abandoned before it resolved")]
    Abandoned,

    #[error("no deferred value registered for '{0}'")]
    Unknown(String),

    #[error("'{binding}' has no attribute '{attribute}'")]
    MissingAttribute { binding: String, attribute: String },
}

/// Write half of a deferred value
#[derive(Debug)]
pub struct Resolver<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        // send_replace never fails, even with no readers left
        self.tx.send_replace(Some(value));
    }
}

/// Read half of a deferred value
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    rx: watch::Receiver<Option<T>>,
}

/// Create a connected resolver/deferred pair
pub fn deferred<T>() -> (Resolver<T>, Deferred<T>) {
    let (tx, rx) = watch::channel(None);
    (Resolver { tx }, Deferred { rx })
}

impl<T: Clone> Deferred<T> {
    /// A deferred value that is already known
    pub fn ready(value: T) -> Self {
        let (tx, rx) = watch::channel(Some(value));
        // Receivers keep the last value after the sender is gone
        drop(tx);
        Self { rx }
    }

    /// Wait until the value is resolved
    pub async fn get(&self) -> Result<T, DeferredError> {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone().ok_or(DeferredError::Abandoned),
            Err(_) => Err(DeferredError::Abandoned),
        }
    }

    /// The value if it is already resolved
    pub fn try_get(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

/// Deferred attributes of every binding taking part in one apply
#[derive(Debug, Clone, Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, Deferred<Attributes>>,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding whose attributes are already known
    pub fn settle(&mut self, binding: impl Into<String>, attributes: Attributes) {
        self.bindings
            .insert(binding.into(), Deferred::ready(attributes));
    }

    /// Register a binding resolved later through the returned resolver
    pub fn register(&mut self, binding: impl Into<String>) -> Resolver<Attributes> {
        let (resolver, reader) = deferred();
        self.bindings.insert(binding.into(), reader);
        resolver
    }

    pub fn get(&self, binding: &str) -> Option<&Deferred<Attributes>> {
        self.bindings.get(binding)
    }

    pub fn contains(&self, binding: &str) -> bool {
        self.bindings.contains_key(binding)
    }

    /// Wait for one attribute of a binding
    pub async fn attribute(&self, binding: &str, attribute: &str) -> Result<Value, DeferredError> {
        let reader = self
            .bindings
            .get(binding)
            .ok_or_else(|| DeferredError::Unknown(binding.to_string()))?;
        let attrs = reader.get().await?;
        attrs
            .get(attribute)
            .cloned()
            .ok_or_else(|| DeferredError::MissingAttribute {
                binding: binding.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Attributes of every binding resolved so far
    pub fn snapshot(&self) -> HashMap<String, Attributes> {
        self.bindings
            .iter()
            .filter_map(|(name, d)| d.try_get().map(|attrs| (name.clone(), attrs)))
            .collect()
    }
}
