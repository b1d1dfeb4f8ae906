//! Surface formats, primitive types and screen-space geometry

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

state_enum! {
    /// Colour surface format
    #[derive(Default)]
    pub enum SurfaceFormat {
        #[default]
        Color = 0,
        Bgr565 = 1,
        Bgra5551 = 2,
        Bgra4444 = 3,
        Dxt1 = 4,
        Dxt3 = 5,
        Dxt5 = 6,
        NormalizedByte2 = 7,
        NormalizedByte4 = 8,
        Rgba1010102 = 9,
        Rg32 = 10,
        Rgba64 = 11,
        Alpha8 = 12,
        Single = 13,
        Vector2 = 14,
        Vector4 = 15,
        HalfSingle = 16,
        HalfVector2 = 17,
        HalfVector4 = 18,
        HdrBlendable = 19,
        ColorBgraExt = 20,
        ColorSrgbExt = 21,
        Dxt5SrgbExt = 22,
        Bc7Ext = 23,
        Bc7SrgbExt = 24,
    }
}

state_enum! {
    /// Depth/stencil surface format
    #[derive(Default)]
    pub enum DepthFormat {
        #[default]
        None = 0,
        Depth16 = 1,
        Depth24 = 2,
        Depth24Stencil8 = 3,
    }
}

impl DepthFormat {
    /// Multiplier turning an XNA depth bias into the native constant bias.
    ///
    /// Native APIs express constant bias in units of the format's smallest
    /// representable depth step.
    pub fn bias_scale(self) -> f32 {
        match self {
            DepthFormat::None => 0.0,
            DepthFormat::Depth16 => 65_535.0,
            DepthFormat::Depth24 | DepthFormat::Depth24Stencil8 => 16_777_215.0,
        }
    }

    pub fn has_stencil(self) -> bool {
        self == DepthFormat::Depth24Stencil8
    }

    pub fn is_none(self) -> bool {
        self == DepthFormat::None
    }
}

state_enum! {
    #[derive(Default)]
    pub enum PrimitiveType {
        #[default]
        TriangleList = 0,
        TriangleStrip = 1,
        LineList = 2,
        LineStrip = 3,
        PointList = 4,
    }
}

impl PrimitiveType {
    /// Number of vertices (or indices) consumed by `primitive_count` primitives,
    /// or `None` if that does not fit in a `u32`
    pub fn vertex_count(self, primitive_count: u32) -> Option<u32> {
        match self {
            PrimitiveType::TriangleList => primitive_count.checked_mul(3),
            PrimitiveType::TriangleStrip => primitive_count.checked_add(2),
            PrimitiveType::LineList => primitive_count.checked_mul(2),
            PrimitiveType::LineStrip => primitive_count.checked_add(1),
            PrimitiveType::PointList => Some(primitive_count),
        }
    }
}

state_enum! {
    #[derive(Default)]
    pub enum IndexElementSize {
        #[default]
        SixteenBits = 0,
        ThirtyTwoBits = 1,
    }
}

impl IndexElementSize {
    pub fn bytes(self) -> u32 {
        match self {
            IndexElementSize::SixteenBits => 2,
            IndexElementSize::ThirtyTwoBits => 4,
        }
    }
}

state_enum! {
    pub enum CubeMapFace {
        PositiveX = 0,
        NegativeX = 1,
        PositiveY = 2,
        NegativeY = 3,
        PositiveZ = 4,
        NegativeZ = 5,
    }
}

bitflags::bitflags! {
    /// Buffers affected by a clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ClearOptions: u8 {
        const TARGET = 0b001;
        const DEPTH_BUFFER = 0b010;
        const STENCIL = 0b100;
    }
}

/// 8-bit RGBA colour
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0, 255);
    pub const WHITE: Color = Color::new(255, 255, 255, 255);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Normalized `[r, g, b, a]` in `0.0..=1.0`
    pub fn to_f32_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

/// Integer rectangle in pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a `width` x `height` surface
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Viewport in pixels with a depth range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
