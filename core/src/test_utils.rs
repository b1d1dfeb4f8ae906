//! Shared test utilities for integration and unit tests

use bakery_shared::{
    BlendState, BufferHandle, Color, DepthStencilState, IndexElementSize, RasterizerState, Rect,
    SamplerState, Viewport,
};
use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;

use crate::backend::{
    AttachmentDesc, Backend, BlitGeometry, ClearValues, PipelineDesc, PipelineHandle,
    RenderPassDesc, RenderTargetView, StateHandle, TextureHandle, VertexLayoutHandle,
};
use crate::cache::VertexLayoutKey;
use crate::error::BackendError;

/// Installs a test-friendly subscriber once. Honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Recording Backend
// ============================================================================

/// Per-call counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    pub blend_builds: u32,
    pub depth_stencil_builds: u32,
    pub rasterizer_builds: u32,
    pub sampler_builds: u32,
    pub layout_builds: u32,
    pub pipeline_builds: u32,
    pub attachment_builds: u32,

    pub state_releases: u32,
    pub layout_releases: u32,
    pub pipeline_releases: u32,
    pub attachment_releases: u32,

    pub pass_begins: u32,
    pub pass_ends: u32,
    pub pipeline_binds: u32,
    pub vertex_buffer_binds: u32,
    pub index_buffer_binds: u32,
    pub sampler_binds: u32,
    pub viewport_sets: u32,
    pub scissor_sets: u32,
    pub blend_constant_sets: u32,
    pub stencil_reference_sets: u32,
    pub uniform_uploads: u32,
    pub clears: u32,
    pub draws: u32,
    pub resolves: u32,
    pub blits: u32,
}

/// Failure injection switches
#[derive(Debug, Clone, Default)]
pub struct Failures {
    pub state_objects: bool,
    pub vertex_layouts: bool,
    pub pipelines: bool,
    pub render_pass: bool,
    /// Let this many more attachment allocations succeed, then fail the rest
    pub attachments_after: Option<u32>,
}

/// Set of live native handles, shared so it can be inspected after the
/// backend was moved into (and dropped with) a device
#[derive(Debug, Clone, Default)]
pub struct LiveHandles(Arc<Mutex<HashSet<u64>>>);

impl LiveHandles {
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.0.lock().contains(&handle)
    }
}

/// Backend that hands out unique handles and records what it was asked to do.
///
/// Releasing a handle that is not live (never created, or already released)
/// panics, so double frees show up as test failures.
pub struct RecordingBackend {
    pub counters: Counters,
    pub failures: Failures,
    pub max_samples: u32,
    next_handle: u64,
    live: LiveHandles,
    in_pass: bool,

    pub last_rasterizer: Option<RasterizerState>,
    pub last_pipeline: Option<PipelineDesc>,
    pub attachments: Vec<(TextureHandle, AttachmentDesc)>,
    pub passes: Vec<RenderPassDesc>,
    pub clears: Vec<ClearValues>,
    pub resolves: Vec<(TextureHandle, RenderTargetView)>,
    pub blits: Vec<BlitGeometry>,
    pub bound_pipeline: PipelineHandle,
    pub vertex_buffers: Vec<(u32, BufferHandle, u64)>,
    pub samplers: Vec<(u32, TextureHandle, StateHandle)>,
    pub viewport: Option<Viewport>,
    pub uniforms: Vec<u8>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            counters: Counters::default(),
            failures: Failures::default(),
            max_samples: 8,
            next_handle: 1,
            live: LiveHandles::default(),
            in_pass: false,
            last_rasterizer: None,
            last_pipeline: None,
            attachments: Vec::new(),
            passes: Vec::new(),
            clears: Vec::new(),
            resolves: Vec::new(),
            blits: Vec::new(),
            bound_pipeline: PipelineHandle::NULL,
            vertex_buffers: Vec::new(),
            samplers: Vec::new(),
            viewport: None,
            uniforms: Vec::new(),
        }
    }

    fn allocate(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.0.lock().insert(handle);
        handle
    }

    fn free(&mut self, handle: u64) {
        let removed = self.live.0.lock().remove(&handle);
        assert!(removed, "handle {handle} released twice or never created");
    }

    /// Number of handles created and not yet released
    pub fn live_handles(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: u64) -> bool {
        self.live.contains(handle)
    }

    /// Handle to the live set that outlives the backend
    pub fn live(&self) -> LiveHandles {
        self.live.clone()
    }

    pub fn in_pass(&self) -> bool {
        self.in_pass
    }

    fn create_state(&mut self, kind: &'static str) -> Result<StateHandle, BackendError> {
        if self.failures.state_objects {
            return Err(BackendError::creation(kind, "injected failure"));
        }
        Ok(StateHandle(self.allocate()))
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for RecordingBackend {
    fn create_blend_state(&mut self, _state: &BlendState) -> Result<StateHandle, BackendError> {
        let handle = self.create_state("blend state")?;
        self.counters.blend_builds += 1;
        Ok(handle)
    }

    fn create_depth_stencil_state(
        &mut self,
        _state: &DepthStencilState,
    ) -> Result<StateHandle, BackendError> {
        let handle = self.create_state("depth-stencil state")?;
        self.counters.depth_stencil_builds += 1;
        Ok(handle)
    }

    fn create_rasterizer_state(
        &mut self,
        state: &RasterizerState,
    ) -> Result<StateHandle, BackendError> {
        let handle = self.create_state("rasterizer state")?;
        self.counters.rasterizer_builds += 1;
        self.last_rasterizer = Some(*state);
        Ok(handle)
    }

    fn create_sampler_state(&mut self, _state: &SamplerState) -> Result<StateHandle, BackendError> {
        let handle = self.create_state("sampler state")?;
        self.counters.sampler_builds += 1;
        Ok(handle)
    }

    fn create_vertex_layout(
        &mut self,
        _layout: &VertexLayoutKey,
    ) -> Result<VertexLayoutHandle, BackendError> {
        if self.failures.vertex_layouts {
            return Err(BackendError::creation("vertex layout", "injected failure"));
        }
        self.counters.layout_builds += 1;
        Ok(VertexLayoutHandle(self.allocate()))
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc) -> Result<PipelineHandle, BackendError> {
        if self.failures.pipelines {
            return Err(BackendError::creation("pipeline", "injected failure"));
        }
        self.counters.pipeline_builds += 1;
        self.last_pipeline = Some(desc.clone());
        Ok(PipelineHandle(self.allocate()))
    }

    fn create_attachment(&mut self, desc: &AttachmentDesc) -> Result<TextureHandle, BackendError> {
        if let Some(remaining) = self.failures.attachments_after.as_mut() {
            if *remaining == 0 {
                return Err(BackendError::creation("attachment", "injected failure"));
            }
            *remaining -= 1;
        }
        self.counters.attachment_builds += 1;
        let handle = TextureHandle(self.allocate());
        self.attachments.push((handle, *desc));
        Ok(handle)
    }

    fn release_state(&mut self, handle: StateHandle) {
        self.free(handle.0);
        self.counters.state_releases += 1;
    }

    fn release_vertex_layout(&mut self, handle: VertexLayoutHandle) {
        self.free(handle.0);
        self.counters.layout_releases += 1;
    }

    fn release_pipeline(&mut self, handle: PipelineHandle) {
        self.free(handle.0);
        self.counters.pipeline_releases += 1;
    }

    fn release_attachment(&mut self, handle: TextureHandle) {
        self.free(handle.0);
        self.counters.attachment_releases += 1;
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc) -> Result<(), BackendError> {
        assert!(!self.in_pass, "render pass begun while another is open");
        if self.failures.render_pass {
            return Err(BackendError::RenderPass("injected failure".to_string()));
        }
        self.in_pass = true;
        self.counters.pass_begins += 1;
        self.passes.push(desc.clone());
        Ok(())
    }

    fn end_render_pass(&mut self) {
        assert!(self.in_pass, "render pass ended while none is open");
        self.in_pass = false;
        self.counters.pass_ends += 1;
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.counters.pipeline_binds += 1;
        self.bound_pipeline = pipeline;
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, offset: u64) {
        self.counters.vertex_buffer_binds += 1;
        self.vertex_buffers.push((slot, buffer, offset));
    }

    fn bind_index_buffer(&mut self, _buffer: BufferHandle, _size: IndexElementSize) {
        self.counters.index_buffer_binds += 1;
    }

    fn bind_sampler(&mut self, slot: u32, texture: TextureHandle, sampler: StateHandle) {
        self.counters.sampler_binds += 1;
        self.samplers.push((slot, texture, sampler));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.counters.viewport_sets += 1;
        self.viewport = Some(*viewport);
    }

    fn set_scissor(&mut self, _rect: Rect) {
        self.counters.scissor_sets += 1;
    }

    fn set_blend_constants(&mut self, _color: Color) {
        self.counters.blend_constant_sets += 1;
    }

    fn set_stencil_reference(&mut self, _reference: u8) {
        self.counters.stencil_reference_sets += 1;
    }

    fn set_uniforms(&mut self, data: &[u8]) {
        self.counters.uniform_uploads += 1;
        self.uniforms = data.to_vec();
    }

    fn clear(&mut self, values: &ClearValues) {
        assert!(self.in_pass, "clear outside a render pass");
        self.counters.clears += 1;
        self.clears.push(*values);
    }

    fn draw(&mut self, _first_vertex: u32, _vertex_count: u32, _instance_count: u32) {
        assert!(self.in_pass, "draw outside a render pass");
        self.counters.draws += 1;
    }

    fn draw_indexed(
        &mut self,
        _base_vertex: i32,
        _first_index: u32,
        _index_count: u32,
        _instance_count: u32,
    ) {
        assert!(self.in_pass, "draw outside a render pass");
        self.counters.draws += 1;
    }

    fn resolve(&mut self, source: TextureHandle, destination: &RenderTargetView) {
        self.counters.resolves += 1;
        self.resolves.push((source, *destination));
    }

    fn blit(&mut self, geometry: &BlitGeometry) {
        self.counters.blits += 1;
        self.blits.push(*geometry);
    }

    fn max_sample_count(&self) -> u32 {
        self.max_samples
    }
}
