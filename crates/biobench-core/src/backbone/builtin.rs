//! Built-in loaders for the `open-clip` and `timm-vit` organizations.
//!
//! Loaders only resolve a checkpoint string into a [`ModelHandle`]
//! descriptor; weights are materialized by whichever task consumes the handle.

use super::{BackboneRegistry, ModelHandle};
use crate::config::Device;
use crate::errors::RegistryError;
use anyhow::{bail, Result};

pub const OPEN_CLIP: &str = "open-clip";
pub const TIMM_VIT: &str = "timm-vit";

const HF_HUB_PREFIX: &str = "hf-hub:";

pub fn register_builtin_backbones(registry: &mut BackboneRegistry) -> Result<(), RegistryError> {
    registry.register(OPEN_CLIP, load_open_clip)?;
    registry.register(TIMM_VIT, load_timm_vit)?;
    Ok(())
}

/// `<arch>/<pretrained>` (e.g. `RN50/openai`) or `hf-hub:<org>/<repo>`.
pub fn load_open_clip(ckpt: &str, device: Device) -> Result<ModelHandle> {
    let handle = ModelHandle::new(OPEN_CLIP, ckpt, device);
    if let Some(repo) = ckpt.strip_prefix(HF_HUB_PREFIX) {
        if repo.is_empty() || repo.chars().any(char::is_whitespace) {
            bail!("invalid hf-hub repository '{repo}'");
        }
        return Ok(handle
            .with_descriptor("source", "hf-hub")
            .with_descriptor("repo", repo));
    }
    match ckpt.split_once('/') {
        Some((arch, tag)) if !arch.is_empty() && !tag.is_empty() && !tag.contains('/') => {
            Ok(handle
                .with_descriptor("source", "open-clip")
                .with_descriptor("arch", arch)
                .with_descriptor("pretrained", tag))
        }
        _ => bail!("expected '<arch>/<pretrained>' or '{HF_HUB_PREFIX}<repo>', got '{ckpt}'"),
    }
}

/// A timm model name, optionally with a `.tag` suffix
/// (e.g. `vit_base_patch14_reg4_dinov2.lvd142m`).
pub fn load_timm_vit(ckpt: &str, device: Device) -> Result<ModelHandle> {
    if ckpt.is_empty() || ckpt.chars().any(|c| c.is_whitespace() || c == '/') {
        bail!("invalid timm model name '{ckpt}'");
    }
    let handle = ModelHandle::new(TIMM_VIT, ckpt, device).with_descriptor("source", "timm");
    Ok(match ckpt.split_once('.') {
        Some((arch, tag)) if !arch.is_empty() && !tag.is_empty() => handle
            .with_descriptor("arch", arch)
            .with_descriptor("pretrained", tag),
        Some(_) => bail!("invalid timm model name '{ckpt}'"),
        None => handle.with_descriptor("arch", ckpt),
    })
}
