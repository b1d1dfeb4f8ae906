//! Native backend boundary
//!
//! Everything below this trait is a 1:1 mapping onto a concrete retained-mode API.
//! The translation layer only ever hands the backend fully resolved creation
//! descriptions and opaque handles it previously returned.

use std::sync::Arc;

use bakery_shared::{
    BlendState, BufferHandle, Color, CubeMapFace, DepthFormat, DepthStencilState,
    IndexElementSize, PrimitiveType, RasterizerState, Rect, SamplerState, SurfaceFormat,
    VertexElementUsage, Viewport,
};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::cache::VertexLayoutKey;
use crate::error::BackendError;

macro_rules! native_handle {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
            pub struct $name(pub u64);

            impl $name {
                pub const NULL: $name = $name(0);

                #[inline]
                pub fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )+
    };
}

native_handle! {
    /// Blend, depth-stencil, rasterizer or sampler object
    StateHandle,
    /// Compiled graphics pipeline
    PipelineHandle,
    /// Vertex input layout / descriptor
    VertexLayoutHandle,
    /// Texture, renderbuffer or framebuffer attachment
    TextureHandle,
    /// Compiled shader stage
    ShaderHandle,
}

/// Stable identity of a shader for the lifetime of the shader object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ShaderId(pub u64);

/// A compiled shader plus the reflection data the translation layer needs
#[derive(Debug, Clone)]
pub struct Shader {
    pub id: ShaderId,
    pub native: ShaderHandle,
    /// (usage, usage index) -> native attribute location
    inputs: HashMap<(VertexElementUsage, u8), u32>,
}

impl Shader {
    pub fn new(id: ShaderId, native: ShaderHandle) -> Self {
        Self {
            id,
            native,
            inputs: HashMap::new(),
        }
    }

    /// Declares that the shader reads `(usage, usage_index)` at `location`
    pub fn with_input(mut self, usage: VertexElementUsage, usage_index: u8, location: u32) -> Self {
        self.inputs.insert((usage, usage_index), location);
        self
    }

    pub fn input_location(&self, usage: VertexElementUsage, usage_index: u8) -> Option<u32> {
        self.inputs.get(&(usage, usage_index)).copied()
    }
}

/// Vertex and pixel stage bound together by an effect pass
#[derive(Debug, Clone)]
pub struct ShaderPair {
    pub vertex: Arc<Shader>,
    pub pixel: Arc<Shader>,
}

impl ShaderPair {
    pub fn new(vertex: Arc<Shader>, pixel: Arc<Shader>) -> Self {
        Self { vertex, pixel }
    }

    pub fn ids(&self) -> (ShaderId, ShaderId) {
        (self.vertex.id, self.pixel.id)
    }
}

/// Blend state as a pipeline needs it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendDesc {
    pub state: BlendState,
    /// Derived from the factors, never stored in the key
    pub enabled: bool,
}

/// Everything needed to compile one graphics pipeline
#[derive(Debug, Clone)]
pub struct PipelineDesc {
    pub vertex_shader: ShaderHandle,
    pub pixel_shader: ShaderHandle,
    pub vertex_layout: VertexLayoutHandle,
    pub primitive: PrimitiveType,
    pub blend: BlendDesc,
    pub depth_stencil: DepthStencilState,
    /// Depth bias already scaled to `depth_format`
    pub rasterizer: RasterizerState,
    /// State objects for backends that bind fixed-function state separately
    pub blend_object: StateHandle,
    pub depth_stencil_object: StateHandle,
    pub rasterizer_object: StateHandle,
    pub color_formats: SmallVec<[SurfaceFormat; 4]>,
    pub depth_format: DepthFormat,
    pub sample_count: u32,
    pub sample_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Color(SurfaceFormat),
    DepthStencil(DepthFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDesc {
    pub width: u32,
    pub height: u32,
    pub kind: AttachmentKind,
    pub sample_count: u32,
}

/// Where a color attachment writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetView {
    Texture2D { texture: TextureHandle },
    CubeFace { texture: TextureHandle, face: CubeMapFace },
    Renderbuffer { renderbuffer: TextureHandle },
}

impl RenderTargetView {
    pub fn handle(&self) -> TextureHandle {
        match *self {
            RenderTargetView::Texture2D { texture } => texture,
            RenderTargetView::CubeFace { texture, .. } => texture,
            RenderTargetView::Renderbuffer { renderbuffer } => renderbuffer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachment {
    pub view: RenderTargetView,
    pub format: SurfaceFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthAttachment {
    pub texture: TextureHandle,
    pub format: DepthFormat,
}

/// Load operations for a render pass. `None` means load the existing contents.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearValues {
    pub color: Option<Color>,
    pub depth: Option<f32>,
    pub stencil: Option<u8>,
}

impl ClearValues {
    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.depth.is_none() && self.stencil.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassDesc {
    pub color: SmallVec<[ColorAttachment; 4]>,
    pub depth: Option<DepthAttachment>,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub load: ClearValues,
}

/// Precomputed quad for the present blit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlitGeometry {
    pub source: TextureHandle,
    pub src_rect: Rect,
    pub dst_rect: Rect,
    pub surface_size: (u32, u32),
    /// Source rect in normalized texture coordinates: u0, v0, u1, v1
    pub uv: [f32; 4],
    /// Destination rect in normalized device coordinates: x0, y0, x1, y1
    pub ndc: [f32; 4],
}

/// The native graphics API.
///
/// Creation calls either return a live handle or an error; they never return
/// `NULL` on success. Every handle returned is released exactly once by the
/// translation layer.
pub trait Backend {
    fn create_blend_state(&mut self, state: &BlendState) -> Result<StateHandle, BackendError>;
    fn create_depth_stencil_state(
        &mut self,
        state: &DepthStencilState,
    ) -> Result<StateHandle, BackendError>;
    fn create_rasterizer_state(
        &mut self,
        state: &RasterizerState,
    ) -> Result<StateHandle, BackendError>;
    fn create_sampler_state(&mut self, state: &SamplerState) -> Result<StateHandle, BackendError>;
    fn create_vertex_layout(
        &mut self,
        layout: &VertexLayoutKey,
    ) -> Result<VertexLayoutHandle, BackendError>;
    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle, BackendError>;
    fn create_attachment(&mut self, desc: &AttachmentDesc) -> Result<TextureHandle, BackendError>;

    fn release_state(&mut self, handle: StateHandle);
    fn release_vertex_layout(&mut self, handle: VertexLayoutHandle);
    fn release_pipeline(&mut self, handle: PipelineHandle);
    fn release_attachment(&mut self, handle: TextureHandle);

    fn begin_render_pass(&mut self, desc: &RenderPassDesc) -> Result<(), BackendError>;
    fn end_render_pass(&mut self);

    fn bind_pipeline(&mut self, pipeline: PipelineHandle);
    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64);
    fn bind_index_buffer(&mut self, buffer: BufferHandle, size: IndexElementSize);
    fn bind_sampler(&mut self, slot: u32, texture: TextureHandle, sampler: StateHandle);

    fn set_viewport(&mut self, viewport: &Viewport);
    fn set_scissor(&mut self, rect: Rect);
    fn set_blend_constants(&mut self, color: Color);
    fn set_stencil_reference(&mut self, reference: u8);
    fn set_uniforms(&mut self, data: &[u8]);

    /// Clears attachments of the open render pass
    fn clear(&mut self, values: &ClearValues);

    fn draw(&mut self, first_vertex: u32, vertex_count: u32, instance_count: u32);
    fn draw_indexed(
        &mut self,
        base_vertex: i32,
        first_index: u32,
        index_count: u32,
        instance_count: u32,
    );

    /// Resolves a multisampled texture into a single-sample destination
    fn resolve(&mut self, source: TextureHandle, destination: &RenderTargetView);

    /// Filtered copy onto the presentation surface
    fn blit(&mut self, geometry: &BlitGeometry);

    fn max_sample_count(&self) -> u32;
}
