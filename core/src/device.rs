//! Client-facing device
//!
//! [`Device`] is the XNA-style entry point. It owns the backend, every cache and
//! the virtual framebuffer behind one lock, so all methods take `&self`.

use std::sync::Arc;

use bakery_shared::{
    BlendState, BufferHandle, ClearOptions, Color, DepthStencilState, IndexElementSize,
    PrimitiveType, RasterizerState, Rect, SamplerState, VertexBufferBinding, Viewport,
};
use bytemuck::Pod;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::backend::{Backend, ClearValues, ShaderPair, TextureHandle};
use crate::cache::{ObjectCache, PipelineCache, StateKind, VertexLayoutCache};
use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::framebuffer::{FramebufferParams, RenderTargetBinding, VirtualFramebuffer};
use crate::tracker::{DeferredStateTracker, DrawCall, DrawOutcome, DrawResources};

/// Cache sizes and build counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub blend_states: usize,
    pub depth_stencil_states: usize,
    pub rasterizer_states: usize,
    pub sampler_states: usize,
    pub vertex_layouts: usize,
    pub pipelines: usize,
    /// Native state objects created, all kinds
    pub state_builds: u64,
    pub layout_builds: u64,
    pub pipeline_builds: u64,
    pub pipeline_failures: u64,
}

struct Inner<B> {
    backend: B,
    tracker: DeferredStateTracker,
    objects: ObjectCache,
    layouts: VertexLayoutCache,
    pipelines: PipelineCache,
    framebuffer: VirtualFramebuffer,
}

impl<B: Backend> Inner<B> {
    fn draw(&mut self, call: DrawCall) -> Result<DrawOutcome, DeviceError> {
        let Inner {
            backend,
            tracker,
            objects,
            layouts,
            pipelines,
            framebuffer,
        } = self;
        let mut res = DrawResources {
            backend,
            objects,
            layouts,
            pipelines,
            framebuffer,
        };
        tracker.draw(&call, &mut res)
    }
}

/// Graphics device translating immediate-mode state into cached native objects
pub struct Device<B: Backend> {
    inner: Mutex<Inner<B>>,
}

impl<B: Backend> Device<B> {
    /// Validates `config` and allocates the virtual framebuffer
    pub fn new(mut backend: B, config: DeviceConfig) -> Result<Self, DeviceError> {
        config.validate().inspect_err(|e| tracing::error!("{e}"))?;

        let params = FramebufferParams::from(&config.backbuffer);
        let framebuffer =
            VirtualFramebuffer::create(params, config.backbuffer.scale_mode, &mut backend)
                .map_err(DeviceError::Framebuffer)?;
        let tracker = DeferredStateTracker::new(
            config.limits.sampler_slots,
            config.limits.max_render_targets,
            config.cache.float_keys,
            (framebuffer.width(), framebuffer.height()),
        );

        tracing::info!(
            width = framebuffer.width(),
            height = framebuffer.height(),
            sample_count = framebuffer.sample_count(),
            "device created"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                backend,
                tracker,
                objects: ObjectCache::new(),
                layouts: VertexLayoutCache::new(),
                pipelines: PipelineCache::new(config.cache.pipeline_buckets),
                framebuffer,
            }),
        })
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn set_blend_state(&self, state: &BlendState) {
        self.inner.lock().tracker.set_blend_state(state);
    }

    pub fn set_depth_stencil_state(&self, state: &DepthStencilState) {
        self.inner.lock().tracker.set_depth_stencil_state(state);
    }

    pub fn set_rasterizer_state(&self, state: &RasterizerState) {
        self.inner.lock().tracker.set_rasterizer_state(state);
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.inner.lock().tracker.set_viewport(viewport);
    }

    pub fn set_scissor_rect(&self, rect: Rect) {
        self.inner.lock().tracker.set_scissor_rect(rect);
    }

    /// Binds `texture` sampled with `sampler` to `slot`
    pub fn verify_sampler(&self, slot: usize, texture: TextureHandle, sampler: &SamplerState) {
        self.inner
            .lock()
            .tracker
            .verify_sampler(slot, texture, sampler);
    }

    pub fn apply_vertex_buffer_bindings(&self, bindings: &[VertexBufferBinding]) {
        self.inner
            .lock()
            .tracker
            .apply_vertex_buffer_bindings(bindings);
    }

    pub fn apply_shaders(&self, shaders: &Arc<ShaderPair>) {
        self.inner.lock().tracker.apply_shaders(shaders);
    }

    pub fn set_uniforms(&self, data: &[u8]) {
        self.inner.lock().tracker.set_uniforms(data);
    }

    /// Typed form of [`Device::set_uniforms`] for plain register data
    pub fn set_uniform_data<T: Pod>(&self, data: &[T]) {
        self.set_uniforms(bytemuck::cast_slice(data));
    }

    /// Binds client render targets. An empty slice selects the backbuffer.
    pub fn set_render_targets(&self, targets: &[RenderTargetBinding]) -> Result<(), DeviceError> {
        let inner = &mut *self.inner.lock();
        inner
            .tracker
            .set_render_targets(targets, &mut inner.backend, &inner.framebuffer)?;
        Ok(())
    }

    /// Clears the channels selected by `options` on the bound targets
    pub fn clear(&self, options: ClearOptions, color: Color, depth: f32, stencil: u8) {
        let values = ClearValues {
            color: options.contains(ClearOptions::TARGET).then_some(color),
            depth: options.contains(ClearOptions::DEPTH_BUFFER).then_some(depth),
            stencil: options.contains(ClearOptions::STENCIL).then_some(stencil),
        };
        if values.is_empty() {
            return;
        }
        let inner = &mut *self.inner.lock();
        inner.tracker.clear(values, &mut inner.backend);
    }

    // ========================================================================
    // Draws
    // ========================================================================

    pub fn draw_primitives(
        &self,
        primitive: PrimitiveType,
        vertex_start: u32,
        primitive_count: u32,
    ) -> Result<DrawOutcome, DeviceError> {
        self.inner
            .lock()
            .draw(DrawCall::primitives(primitive, vertex_start, primitive_count))
    }

    pub fn draw_indexed_primitives(
        &self,
        primitive: PrimitiveType,
        base_vertex: i32,
        start_index: u32,
        primitive_count: u32,
        indices: BufferHandle,
        index_size: IndexElementSize,
    ) -> Result<DrawOutcome, DeviceError> {
        self.inner.lock().draw(DrawCall::indexed(
            primitive,
            base_vertex,
            start_index,
            primitive_count,
            indices,
            index_size,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_instanced_primitives(
        &self,
        primitive: PrimitiveType,
        base_vertex: i32,
        start_index: u32,
        primitive_count: u32,
        instance_count: u32,
        indices: BufferHandle,
        index_size: IndexElementSize,
    ) -> Result<DrawOutcome, DeviceError> {
        let call = DrawCall::indexed(
            primitive,
            base_vertex,
            start_index,
            primitive_count,
            indices,
            index_size,
        )
        .instanced(instance_count);
        self.inner.lock().draw(call)
    }

    // ========================================================================
    // Targets and presentation
    // ========================================================================

    /// Resolves a multisampled client target so it can be sampled
    pub fn resolve_target(&self, target: &RenderTargetBinding) {
        let inner = &mut *self.inner.lock();
        inner.tracker.resolve_target(target, &mut inner.backend);
    }

    /// Rebuilds the backbuffer for `params`.
    ///
    /// A pass open on the old backbuffer is ended first. If the new attachments
    /// cannot be allocated the old backbuffer stays in use.
    pub fn reset_backbuffer(&self, params: FramebufferParams) -> Result<(), DeviceError> {
        let inner = &mut *self.inner.lock();
        let params = params.clamped(inner.backend.max_sample_count());
        if inner.framebuffer.params() == &params {
            return Ok(());
        }
        if inner.tracker.render_targets().is_empty() {
            inner.tracker.end_pass(&mut inner.backend);
        }
        let rebuilt = inner
            .framebuffer
            .reset(params, &mut inner.backend)
            .map_err(|e| {
                tracing::error!("backbuffer reset failed: {e}");
                DeviceError::Framebuffer(e)
            })?;
        if rebuilt {
            inner.tracker.rebind_default_target(&inner.framebuffer);
        }
        Ok(())
    }

    /// Ends the frame and blits the backbuffer onto a surface of `surface_size`.
    ///
    /// `src` defaults to the whole backbuffer and `dst` to the placement given by
    /// the configured scale mode.
    pub fn present(
        &self,
        src: Option<Rect>,
        dst: Option<Rect>,
        surface_size: (u32, u32),
    ) -> Result<(), DeviceError> {
        let inner = &mut *self.inner.lock();
        inner
            .tracker
            .flush_pending_clear(&mut inner.backend, &inner.framebuffer)?;
        inner.tracker.end_pass(&mut inner.backend);
        inner.framebuffer.resolve(&mut inner.backend);
        inner
            .framebuffer
            .present(src, dst, surface_size, &mut inner.backend);
        Ok(())
    }

    /// Parameters of the current backbuffer, after sample-count clamping
    pub fn backbuffer(&self) -> FramebufferParams {
        *self.inner.lock().framebuffer.params()
    }

    pub fn stats(&self) -> Stats {
        let inner = self.inner.lock();
        let objects = &inner.objects;
        Stats {
            blend_states: objects.len(StateKind::Blend),
            depth_stencil_states: objects.len(StateKind::DepthStencil),
            rasterizer_states: objects.len(StateKind::Rasterizer),
            sampler_states: objects.len(StateKind::Sampler),
            vertex_layouts: inner.layouts.len(),
            pipelines: inner.pipelines.len(),
            state_builds: StateKind::ALL.iter().map(|&kind| objects.builds(kind)).sum(),
            layout_builds: inner.layouts.builds(),
            pipeline_builds: inner.pipelines.builds(),
            pipeline_failures: inner.pipelines.failures(),
        }
    }

    /// Locks the device and exposes the backend
    pub fn backend(&self) -> MappedMutexGuard<'_, B> {
        MutexGuard::map(self.inner.lock(), |inner| &mut inner.backend)
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.tracker.end_pass(&mut inner.backend);
        inner.framebuffer.release(&mut inner.backend);
        inner.pipelines.release_all(&mut inner.backend);
        inner.layouts.release_all(&mut inner.backend);
        inner.objects.release_all(&mut inner.backend);
        tracing::debug!("device released");
    }
}
