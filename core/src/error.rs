//! Error types

use std::path::PathBuf;

use bakery_shared::VertexElementUsage;

/// Failure reported by the native backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// A native object (state object, layout, pipeline, attachment) could not be created
    #[error("failed to create {kind}: {reason}")]
    Creation { kind: &'static str, reason: String },

    /// The native render pass could not be started
    #[error("failed to begin render pass: {0}")]
    RenderPass(String),
}

impl BackendError {
    pub fn creation(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::Creation {
            kind,
            reason: reason.into(),
        }
    }
}

/// Vertex declaration that cannot be mapped onto shader inputs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VertexLayoutError {
    /// Every usage index 0-15 was already claimed when this element asked for one
    #[error(
        "vertex element {element} of binding {binding}: all 16 {usage:?} usage indices are already claimed"
    )]
    UsageSlotsExhausted {
        usage: VertexElementUsage,
        binding: usize,
        element: usize,
    },
}

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is outside its allowed range
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors surfaced by [`crate::Device`]
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// The render pass for a draw or clear could not be started. The frame is lost.
    #[error(transparent)]
    RenderPass(BackendError),

    /// The virtual framebuffer could not be (re)allocated
    #[error("failed to allocate backbuffer: {0}")]
    Framebuffer(BackendError),

    #[error("{requested} render targets bound, at most {max} are supported")]
    TooManyRenderTargets { requested: usize, max: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
