//! Client-side state descriptions for the bakery graphics layer.
//!
//! These are the immutable, XNA-style state objects game code builds and hands to
//! the device (`BlendState`, `DepthStencilState`, `RasterizerState`, `SamplerState`,
//! vertex declarations). They carry no GPU knowledge; `bakery-core` packs them into
//! keys and turns them into native objects.

/// Declares a fieldless state enum with a dense `u8` discriminant.
///
/// Generates `COUNT`, `ALL`, `index()` and a fallible `from_index()`, which is what the
/// key codec needs to pack and unpack the value into a fixed-width bit field.
macro_rules! state_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )+
        }

        impl $name {
            /// Every variant, in discriminant order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            /// Number of valid values.
            pub const COUNT: usize = Self::ALL.len();

            #[inline]
            pub const fn index(self) -> u8 {
                self as u8
            }

            pub fn from_index(value: u8) -> Option<Self> {
                Self::ALL.get(value as usize).copied()
            }
        }
    };
}

mod blend;
mod depth_stencil;
mod format;
mod rasterizer;
mod sampler;
mod vertex;

pub use blend::{Blend, BlendFunction, BlendState, ColorWriteChannels};
pub use depth_stencil::{CompareFunction, DepthStencilState, StencilOperation};
pub use format::{
    ClearOptions, Color, CubeMapFace, DepthFormat, IndexElementSize, PrimitiveType, Rect,
    SurfaceFormat, Viewport,
};
pub use rasterizer::{CullMode, FillMode, RasterizerState};
pub use sampler::{SamplerState, TextureAddressMode, TextureFilter};
pub use vertex::{
    BufferHandle, VertexBufferBinding, VertexDeclaration, VertexElement, VertexElementFormat,
    VertexElementUsage,
};

/// Number of (usage, usage index) slots per vertex element usage.
pub const MAX_USAGE_INDEX: usize = 16;
