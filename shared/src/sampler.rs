//! Sampler state

use serde::{Deserialize, Serialize};

state_enum! {
    /// Minification/magnification/mip filter combination
    #[derive(Default)]
    pub enum TextureFilter {
        #[default]
        Linear = 0,
        Point = 1,
        Anisotropic = 2,
        LinearMipPoint = 3,
        PointMipLinear = 4,
        MinLinearMagPointMipLinear = 5,
        MinLinearMagPointMipPoint = 6,
        MinPointMagLinearMipLinear = 7,
        MinPointMagLinearMipPoint = 8,
    }
}

state_enum! {
    #[derive(Default)]
    pub enum TextureAddressMode {
        #[default]
        Wrap = 0,
        Clamp = 1,
        Mirror = 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerState {
    pub filter: TextureFilter,
    pub address_u: TextureAddressMode,
    pub address_v: TextureAddressMode,
    pub address_w: TextureAddressMode,
    pub max_anisotropy: u32,
    pub max_mip_level: u32,
    pub mip_map_level_of_detail_bias: f32,
}

impl SamplerState {
    pub const POINT_CLAMP: Self = Self::preset(TextureFilter::Point, TextureAddressMode::Clamp);
    pub const POINT_WRAP: Self = Self::preset(TextureFilter::Point, TextureAddressMode::Wrap);
    pub const LINEAR_CLAMP: Self = Self::preset(TextureFilter::Linear, TextureAddressMode::Clamp);
    pub const LINEAR_WRAP: Self = Self::preset(TextureFilter::Linear, TextureAddressMode::Wrap);
    pub const ANISOTROPIC_CLAMP: Self =
        Self::preset(TextureFilter::Anisotropic, TextureAddressMode::Clamp);
    pub const ANISOTROPIC_WRAP: Self =
        Self::preset(TextureFilter::Anisotropic, TextureAddressMode::Wrap);

    const fn preset(filter: TextureFilter, address: TextureAddressMode) -> Self {
        Self {
            filter,
            address_u: address,
            address_v: address,
            address_w: address,
            max_anisotropy: 4,
            max_mip_level: 0,
            mip_map_level_of_detail_bias: 0.0,
        }
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::LINEAR_WRAP
    }
}
