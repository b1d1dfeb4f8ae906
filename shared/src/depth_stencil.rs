//! Depth/stencil state

use serde::{Deserialize, Serialize};

state_enum! {
    /// Comparison used by depth tests, stencil tests and comparison samplers
    #[derive(Default)]
    pub enum CompareFunction {
        #[default]
        Always = 0,
        Never = 1,
        Less = 2,
        LessEqual = 3,
        Equal = 4,
        GreaterEqual = 5,
        Greater = 6,
        NotEqual = 7,
    }
}

state_enum! {
    /// Stencil buffer update
    #[derive(Default)]
    pub enum StencilOperation {
        #[default]
        Keep = 0,
        Zero = 1,
        Replace = 2,
        Increment = 3,
        Decrement = 4,
        IncrementSaturation = 5,
        DecrementSaturation = 6,
        Invert = 7,
    }
}

/// Depth and stencil configuration
///
/// `ccw_*` fields apply to counter-clockwise faces and are only read when
/// `two_sided_stencil_mode` is set. `reference_stencil` is set per draw
/// on the native side and never baked into a state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilState {
    pub depth_buffer_enable: bool,
    pub depth_buffer_write_enable: bool,
    pub depth_buffer_function: CompareFunction,
    pub stencil_enable: bool,
    pub two_sided_stencil_mode: bool,
    pub stencil_mask: u8,
    pub stencil_write_mask: u8,
    pub stencil_function: CompareFunction,
    pub stencil_pass: StencilOperation,
    pub stencil_fail: StencilOperation,
    pub stencil_depth_buffer_fail: StencilOperation,
    pub ccw_stencil_function: CompareFunction,
    pub ccw_stencil_pass: StencilOperation,
    pub ccw_stencil_fail: StencilOperation,
    pub ccw_stencil_depth_buffer_fail: StencilOperation,
    pub reference_stencil: u8,
}

impl DepthStencilState {
    /// Depth test and depth write, `LessEqual`
    pub const DEFAULT: Self = Self::depth(true, true);
    /// Depth test without writes
    pub const DEPTH_READ: Self = Self::depth(true, false);
    /// No depth test, no depth write
    pub const NONE: Self = Self::depth(false, false);

    const fn depth(enable: bool, write: bool) -> Self {
        Self {
            depth_buffer_enable: enable,
            depth_buffer_write_enable: write,
            depth_buffer_function: CompareFunction::LessEqual,
            stencil_enable: false,
            two_sided_stencil_mode: false,
            stencil_mask: 0xFF,
            stencil_write_mask: 0xFF,
            stencil_function: CompareFunction::Always,
            stencil_pass: StencilOperation::Keep,
            stencil_fail: StencilOperation::Keep,
            stencil_depth_buffer_fail: StencilOperation::Keep,
            ccw_stencil_function: CompareFunction::Always,
            ccw_stencil_pass: StencilOperation::Keep,
            ccw_stencil_fail: StencilOperation::Keep,
            ccw_stencil_depth_buffer_fail: StencilOperation::Keep,
            reference_stencil: 0,
        }
    }

    /// Returns true if any stencil operation can modify the stencil buffer
    pub fn writes_stencil(&self) -> bool {
        let ops = [
            self.stencil_pass,
            self.stencil_fail,
            self.stencil_depth_buffer_fail,
        ];
        self.stencil_enable
            && self.stencil_write_mask != 0
            && ops.iter().any(|op| *op != StencilOperation::Keep)
    }
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self::DEFAULT
    }
}
