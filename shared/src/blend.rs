//! Blend state
//!
//! Mirrors the XNA `BlendState`: separate colour and alpha equations, four
//! per-target write masks, a constant blend factor and the multisample mask.

use serde::{Deserialize, Serialize};

use crate::Color;

state_enum! {
    /// Source or destination blend factor
    #[derive(Default)]
    pub enum Blend {
        #[default]
        One = 0,
        Zero = 1,
        SourceColor = 2,
        InverseSourceColor = 3,
        SourceAlpha = 4,
        InverseSourceAlpha = 5,
        DestinationColor = 6,
        InverseDestinationColor = 7,
        DestinationAlpha = 8,
        InverseDestinationAlpha = 9,
        BlendFactor = 10,
        InverseBlendFactor = 11,
        SourceAlphaSaturation = 12,
    }
}

state_enum! {
    /// Equation combining the weighted source and destination
    #[derive(Default)]
    pub enum BlendFunction {
        #[default]
        Add = 0,
        Subtract = 1,
        ReverseSubtract = 2,
        Max = 3,
        Min = 4,
    }
}

bitflags::bitflags! {
    /// Which colour channels a render target slot writes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorWriteChannels: u8 {
        const RED = 0b0001;
        const GREEN = 0b0010;
        const BLUE = 0b0100;
        const ALPHA = 0b1000;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteChannels {
    fn default() -> Self {
        Self::ALL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendState {
    pub color_source_blend: Blend,
    pub color_destination_blend: Blend,
    pub color_blend_function: BlendFunction,
    pub alpha_source_blend: Blend,
    pub alpha_destination_blend: Blend,
    pub alpha_blend_function: BlendFunction,
    /// Write masks for render target slots 0..4
    pub color_write_channels: [ColorWriteChannels; 4],
    /// Constant used by `Blend::BlendFactor` (dynamic state, not baked)
    pub blend_factor: Color,
    /// Coverage mask applied to multisampled targets
    pub multi_sample_mask: u32,
}

impl BlendState {
    /// Source replaces destination
    pub const OPAQUE: Self = Self::preset(Blend::One, Blend::Zero, Blend::One, Blend::Zero);

    /// Premultiplied alpha blending
    pub const ALPHA_BLEND: Self = Self::preset(
        Blend::One,
        Blend::InverseSourceAlpha,
        Blend::One,
        Blend::InverseSourceAlpha,
    );

    /// Additive blending weighted by source alpha
    pub const ADDITIVE: Self =
        Self::preset(Blend::SourceAlpha, Blend::One, Blend::SourceAlpha, Blend::One);

    /// Straight (non-premultiplied) alpha blending
    pub const NON_PREMULTIPLIED: Self = Self::preset(
        Blend::SourceAlpha,
        Blend::InverseSourceAlpha,
        Blend::SourceAlpha,
        Blend::InverseSourceAlpha,
    );

    const fn preset(color_src: Blend, color_dst: Blend, alpha_src: Blend, alpha_dst: Blend) -> Self {
        Self {
            color_source_blend: color_src,
            color_destination_blend: color_dst,
            color_blend_function: BlendFunction::Add,
            alpha_source_blend: alpha_src,
            alpha_destination_blend: alpha_dst,
            alpha_blend_function: BlendFunction::Add,
            color_write_channels: [ColorWriteChannels::ALL; 4],
            blend_factor: Color::WHITE,
            multi_sample_mask: u32::MAX,
        }
    }

    /// Returns true unless both equations reduce to "source replaces destination".
    ///
    /// Native APIs take an explicit enable bit; it is always derived from the factors.
    pub fn is_blending(&self) -> bool {
        !(self.color_source_blend == Blend::One
            && self.color_destination_blend == Blend::Zero
            && self.alpha_source_blend == Blend::One
            && self.alpha_destination_blend == Blend::Zero)
    }
}

impl Default for BlendState {
    fn default() -> Self {
        Self::OPAQUE
    }
}
