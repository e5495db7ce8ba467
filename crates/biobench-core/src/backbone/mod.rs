//! Backbone registry: organization name → loader.
//!
//! The registry is an explicit object. Build it once at startup (every loader
//! registered before the first [`BackboneRegistry::load`]) and share it
//! read-only afterwards.

pub mod builtin;

use crate::config::Device;
use crate::errors::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A loaded backbone, as plain data.
///
/// Handles cross the worker-process boundary by value, so they describe the
/// model (organization, checkpoint, device, resolved descriptor) instead of
/// holding live resources. A task reconstructs whatever it needs from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub org: String,
    pub ckpt: String,
    pub device: Device,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub descriptor: BTreeMap<String, String>,
}

impl ModelHandle {
    pub fn new(org: impl Into<String>, ckpt: impl Into<String>, device: Device) -> Self {
        Self {
            org: org.into(),
            ckpt: ckpt.into(),
            device,
            descriptor: BTreeMap::new(),
        }
    }

    pub fn with_descriptor(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.insert(key.into(), value.into());
        self
    }
}

/// Loader contract consumed from the model-loading side.
pub trait BackboneLoader: Send + Sync {
    fn load(&self, ckpt: &str, device: Device) -> anyhow::Result<ModelHandle>;
}

impl<F> BackboneLoader for F
where
    F: Fn(&str, Device) -> anyhow::Result<ModelHandle> + Send + Sync,
{
    fn load(&self, ckpt: &str, device: Device) -> anyhow::Result<ModelHandle> {
        self(ckpt, device)
    }
}

#[derive(Clone, Default)]
pub struct BackboneRegistry {
    loaders: BTreeMap<String, Arc<dyn BackboneLoader>>,
}

impl BackboneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `open-clip` and `timm-vit` loaders.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        builtin::register_builtin_backbones(&mut registry)?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        loader: impl BackboneLoader + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.loaders.contains_key(&name) {
            return Err(RegistryError::DuplicateRegistration { name });
        }
        self.loaders.insert(name, Arc::new(loader));
        Ok(())
    }

    pub fn load(
        &self,
        name: &str,
        ckpt: &str,
        device: Device,
    ) -> Result<ModelHandle, RegistryError> {
        let loader = self
            .loaders
            .get(name)
            .ok_or_else(|| RegistryError::UnknownBackbone {
                name: name.to_string(),
                known: self.list_names(),
            })?;
        loader
            .load(ckpt, device)
            .map_err(|e| RegistryError::LoadFailed {
                org: name.to_string(),
                ckpt: ckpt.to_string(),
                reason: format!("{e:#}"),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Valid organization names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        self.loaders.keys().cloned().collect()
    }
}

impl std::fmt::Debug for BackboneRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackboneRegistry")
            .field("names", &self.list_names())
            .finish()
    }
}
