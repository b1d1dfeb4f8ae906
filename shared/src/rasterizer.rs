//! Rasterizer state

use serde::{Deserialize, Serialize};

state_enum! {
    /// Winding order of the faces to discard
    #[derive(Default)]
    pub enum CullMode {
        #[default]
        None = 0,
        CullClockwiseFace = 1,
        CullCounterClockwiseFace = 2,
    }
}

state_enum! {
    #[derive(Default)]
    pub enum FillMode {
        #[default]
        Solid = 0,
        WireFrame = 1,
    }
}

/// Rasterizer configuration
///
/// `depth_bias` is expressed in XNA units (a fraction of the depth range) and is
/// scaled to the bound depth format's resolution before it reaches the native API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub scissor_test_enable: bool,
    pub multi_sample_anti_alias: bool,
    pub depth_bias: f32,
    pub slope_scale_depth_bias: f32,
}

impl RasterizerState {
    pub const CULL_NONE: Self = Self::culling(CullMode::None);
    pub const CULL_CLOCKWISE: Self = Self::culling(CullMode::CullClockwiseFace);
    pub const CULL_COUNTER_CLOCKWISE: Self = Self::culling(CullMode::CullCounterClockwiseFace);

    const fn culling(cull_mode: CullMode) -> Self {
        Self {
            cull_mode,
            fill_mode: FillMode::Solid,
            scissor_test_enable: false,
            multi_sample_anti_alias: true,
            depth_bias: 0.0,
            slope_scale_depth_bias: 0.0,
        }
    }
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self::CULL_COUNTER_CLOCKWISE
    }
}
