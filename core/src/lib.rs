//! Bakery Core - immediate-mode to retained-mode GPU state translation
//!
//! Game code sets XNA-style state one piece at a time; modern graphics APIs
//! want immutable pipeline objects. This crate sits between the two.
//!
//! # Architecture
//!
//! - [`codec`] - packs client state descriptions into fixed-width keys
//! - [`ObjectCache`] - native blend, depth-stencil, rasterizer and sampler objects by key
//! - [`VertexLayoutCache`] - vertex input layouts resolved against shader inputs
//! - [`PipelineCache`] - pipelines keyed on everything a draw depends on
//! - [`DeferredStateTracker`] - dirty flags and draw-time revalidation
//! - [`VirtualFramebuffer`] - off-screen backbuffer with resolve, resize and present
//! - [`Device`] - the client-facing facade over all of the above
//! - [`Backend`] - the seam to the native graphics API

pub mod backend;
pub mod cache;
pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod framebuffer;
#[cfg(test)]
mod integration;
#[cfg(test)]
pub mod test_utils;
pub mod tracker;

pub use backend::{
    Backend, ClearValues, PipelineDesc, PipelineHandle, RenderPassDesc, RenderTargetView,
    Shader, ShaderHandle, ShaderId, ShaderPair, StateHandle, TextureHandle, VertexLayoutHandle,
};
pub use cache::{
    ObjectCache, PipelineCache, PipelineKey, StateKind, VertexLayoutCache, VertexLayoutKey,
};
pub use codec::{FloatKeyMode, PackedStateKey};
pub use config::{DeviceConfig, ScaleMode};
pub use device::{Device, Stats};
pub use error::{BackendError, ConfigError, DeviceError, VertexLayoutError};
pub use framebuffer::{FramebufferParams, RenderTargetBinding, VirtualFramebuffer};
pub use tracker::{DeferredStateTracker, DrawCall, DrawOutcome};

// Re-export the client state types so users need a single dependency
pub use bakery_shared as state;
