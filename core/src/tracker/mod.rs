//! Deferred state tracking
//!
//! State setters only record the new value and raise dirty flags; setting a
//! value equal to the current one raises nothing. All native work happens in
//! [`DeferredStateTracker::draw`], which revalidates exactly what the flags say
//! changed since the previous draw:
//!
//! 1. begin a render pass if the attachments changed
//! 2. fetch or build the pipeline, binding it only if the handle differs
//! 3. bind dirty sampler slots
//! 4. bind vertex and index buffers
//! 5. clear the consumed flags and issue the draw

mod dirty;

use std::sync::Arc;

use bakery_shared::{
    BlendState, BufferHandle, DepthFormat, DepthStencilState, IndexElementSize, PrimitiveType,
    RasterizerState, Rect, SamplerState, SurfaceFormat, VertexBufferBinding, Viewport,
};
use smallvec::SmallVec;

pub use dirty::{Dirty, DirtyFlags, MAX_SAMPLER_SLOTS};

use crate::backend::{
    Backend, ClearValues, PipelineHandle, RenderPassDesc, ShaderPair, TextureHandle,
    VertexLayoutHandle,
};
use crate::cache::{
    ObjectCache, PipelineCache, PipelineKey, StateKind, VertexLayoutCache, VertexLayoutKey,
};
use crate::codec::{
    pack_blend, pack_depth_stencil, pack_rasterizer, pack_rasterizer_resolved, pack_sampler,
    FloatKeyMode, PackedStateKey,
};
use crate::error::DeviceError;
use crate::framebuffer::{RenderTargetBinding, VirtualFramebuffer};

/// Result of a draw call that did not fail the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    Drawn,
    /// Nothing was drawn: no shaders bound, or a native object failed to build
    Skipped,
}

/// Parameters of one draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    pub primitive: PrimitiveType,
    pub primitive_count: u32,
    /// Start vertex, or start index for indexed draws
    pub first: u32,
    pub base_vertex: i32,
    pub instance_count: u32,
    pub indices: Option<(BufferHandle, IndexElementSize)>,
}

impl DrawCall {
    pub fn primitives(primitive: PrimitiveType, vertex_start: u32, primitive_count: u32) -> Self {
        Self {
            primitive,
            primitive_count,
            first: vertex_start,
            base_vertex: 0,
            instance_count: 1,
            indices: None,
        }
    }

    pub fn indexed(
        primitive: PrimitiveType,
        base_vertex: i32,
        start_index: u32,
        primitive_count: u32,
        indices: BufferHandle,
        index_size: IndexElementSize,
    ) -> Self {
        Self {
            primitive,
            primitive_count,
            first: start_index,
            base_vertex,
            instance_count: 1,
            indices: Some((indices, index_size)),
        }
    }

    pub fn instanced(mut self, instance_count: u32) -> Self {
        self.instance_count = instance_count;
        self
    }
}

/// Caches and targets a draw may need to touch
pub struct DrawResources<'a, B: ?Sized> {
    pub backend: &'a mut B,
    pub objects: &'a mut ObjectCache,
    pub layouts: &'a mut VertexLayoutCache,
    pub pipelines: &'a mut PipelineCache,
    pub framebuffer: &'a VirtualFramebuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundSampler {
    texture: TextureHandle,
    key: PackedStateKey,
}

/// Attachment configuration of the open render pass
#[derive(Debug, Clone)]
struct ActivePass {
    color_formats: SmallVec<[SurfaceFormat; 4]>,
    depth_format: DepthFormat,
    sample_count: u32,
    /// Empty when rendering to the virtual framebuffer
    targets: SmallVec<[RenderTargetBinding; 4]>,
}

/// Current client state, what was last resolved from it, and the flags between them
pub struct DeferredStateTracker {
    float_keys: FloatKeyMode,
    max_render_targets: usize,

    blend: BlendState,
    blend_key: PackedStateKey,
    depth_stencil: DepthStencilState,
    depth_stencil_key: PackedStateKey,
    rasterizer: RasterizerState,
    rasterizer_key: PackedStateKey,
    viewport: Viewport,
    scissor: Rect,
    vertex_bindings: SmallVec<[VertexBufferBinding; 4]>,
    shaders: Option<Arc<ShaderPair>>,
    uniforms: Vec<u8>,
    samplers: Vec<Option<BoundSampler>>,
    render_targets: SmallVec<[RenderTargetBinding; 4]>,
    pending_clear: ClearValues,

    dirty: DirtyFlags,

    pass: Option<ActivePass>,
    primitive: Option<PrimitiveType>,
    vertex_layout: VertexLayoutHandle,
    bound_pipeline: PipelineHandle,
    bound_indices: Option<(BufferHandle, IndexElementSize)>,
}

impl DeferredStateTracker {
    /// Creates a tracker with XNA default state, rendering to a backbuffer of `backbuffer_size`.
    ///
    /// `sampler_slots` is clamped to `1..=MAX_SAMPLER_SLOTS`.
    pub fn new(
        sampler_slots: usize,
        max_render_targets: usize,
        float_keys: FloatKeyMode,
        backbuffer_size: (u32, u32),
    ) -> Self {
        let requested = sampler_slots;
        let sampler_slots = requested.clamp(1, MAX_SAMPLER_SLOTS);
        if sampler_slots != requested {
            tracing::warn!(requested, sampler_slots, "sampler slot count out of range, clamping");
        }
        let blend = BlendState::OPAQUE;
        let depth_stencil = DepthStencilState::DEFAULT;
        let rasterizer = RasterizerState::CULL_COUNTER_CLOCKWISE;
        let (width, height) = backbuffer_size;
        Self {
            float_keys,
            max_render_targets,
            blend_key: pack_blend(&blend),
            blend,
            depth_stencil_key: pack_depth_stencil(&depth_stencil),
            depth_stencil,
            rasterizer_key: pack_rasterizer(&rasterizer, float_keys),
            rasterizer,
            viewport: Viewport::new(0, 0, width as i32, height as i32),
            scissor: Rect::from_size(width, height),
            vertex_bindings: SmallVec::new(),
            shaders: None,
            uniforms: Vec::new(),
            samplers: vec![None; sampler_slots],
            render_targets: SmallVec::new(),
            pending_clear: ClearValues::default(),
            dirty: DirtyFlags::new(sampler_slots),
            pass: None,
            primitive: None,
            vertex_layout: VertexLayoutHandle::NULL,
            bound_pipeline: PipelineHandle::NULL,
            bound_indices: None,
        }
    }

    fn raise(&mut self, flags: Dirty) -> bool {
        if flags.is_empty() {
            return false;
        }
        tracing::trace!(?flags, "state changed");
        self.dirty.set(flags);
        true
    }

    // ========================================================================
    // State setters. Each returns whether anything was invalidated.
    // ========================================================================

    pub fn set_blend_state(&mut self, state: &BlendState) -> bool {
        let key = pack_blend(state);
        let mut flags = Dirty::empty();
        if key != self.blend_key || state.multi_sample_mask != self.blend.multi_sample_mask {
            flags |= Dirty::PIPELINE;
        }
        if state.blend_factor != self.blend.blend_factor {
            flags |= Dirty::BLEND_FACTOR;
        }
        self.blend = *state;
        self.blend_key = key;
        self.raise(flags)
    }

    pub fn set_depth_stencil_state(&mut self, state: &DepthStencilState) -> bool {
        let key = pack_depth_stencil(state);
        let mut flags = Dirty::empty();
        if key != self.depth_stencil_key {
            flags |= Dirty::PIPELINE;
        }
        if state.reference_stencil != self.depth_stencil.reference_stencil {
            flags |= Dirty::STENCIL_REF;
        }
        self.depth_stencil = *state;
        self.depth_stencil_key = key;
        self.raise(flags)
    }

    pub fn set_rasterizer_state(&mut self, state: &RasterizerState) -> bool {
        let key = pack_rasterizer(state, self.float_keys);
        if key == self.rasterizer_key {
            return false;
        }
        self.rasterizer = *state;
        self.rasterizer_key = key;
        self.raise(Dirty::PIPELINE)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        if viewport == self.viewport {
            return false;
        }
        self.viewport = viewport;
        self.raise(Dirty::VIEWPORT)
    }

    pub fn set_scissor_rect(&mut self, rect: Rect) -> bool {
        if rect == self.scissor {
            return false;
        }
        self.scissor = rect;
        self.raise(Dirty::SCISSOR)
    }

    /// Binds the vertex streams for the next draw.
    ///
    /// Changing only buffers or offsets rebinds buffers; changing declarations or
    /// step rates also invalidates the vertex layout and the pipeline.
    pub fn apply_vertex_buffer_bindings(&mut self, bindings: &[VertexBufferBinding]) -> bool {
        if self.vertex_bindings.as_slice() == bindings {
            return false;
        }
        let layout_changed = self.vertex_bindings.len() != bindings.len()
            || self
                .vertex_bindings
                .iter()
                .zip(bindings)
                .any(|(old, new)| {
                    old.instance_frequency != new.instance_frequency
                        || old.declaration != new.declaration
                });
        self.vertex_bindings = bindings.iter().cloned().collect();

        let mut flags = Dirty::VERTEX_BUFFERS;
        if layout_changed {
            flags |= Dirty::VERTEX_LAYOUT | Dirty::PIPELINE;
        }
        self.raise(flags)
    }

    pub fn apply_shaders(&mut self, shaders: &Arc<ShaderPair>) -> bool {
        let mut flags = Dirty::PIPELINE | Dirty::UNIFORMS;
        match &self.shaders {
            Some(current) if current.ids() == shaders.ids() => return false,
            Some(current) if current.vertex.id == shaders.vertex.id => {}
            _ => flags |= Dirty::VERTEX_LAYOUT,
        }
        self.shaders = Some(Arc::clone(shaders));
        self.raise(flags)
    }

    /// Records the uniform register block for the bound shaders
    pub fn set_uniforms(&mut self, data: &[u8]) -> bool {
        if self.uniforms == data {
            return false;
        }
        self.uniforms.clear();
        self.uniforms.extend_from_slice(data);
        self.raise(Dirty::UNIFORMS)
    }

    /// Records the texture and sampler for `slot`; only a change marks the slot dirty
    pub fn verify_sampler(
        &mut self,
        slot: usize,
        texture: TextureHandle,
        sampler: &SamplerState,
    ) -> bool {
        let Some(current) = self.samplers.get_mut(slot) else {
            tracing::warn!(slot, "sampler slot out of range, ignoring");
            return false;
        };
        let bound = Some(BoundSampler {
            texture,
            key: pack_sampler(sampler, self.float_keys),
        });
        if *current == bound {
            return false;
        }
        *current = bound;
        self.dirty.set_sampler(slot);
        true
    }

    /// Binds client render targets; an empty slice selects the virtual framebuffer.
    ///
    /// A change always starts a new render pass at the next draw and resets the
    /// viewport and scissor to the new target size. A clear still pending for the
    /// old targets is flushed to them first.
    pub fn set_render_targets<B: Backend + ?Sized>(
        &mut self,
        targets: &[RenderTargetBinding],
        backend: &mut B,
        framebuffer: &VirtualFramebuffer,
    ) -> Result<bool, DeviceError> {
        if targets.len() > self.max_render_targets {
            return Err(DeviceError::TooManyRenderTargets {
                requested: targets.len(),
                max: self.max_render_targets,
            });
        }
        if self.render_targets.as_slice() == targets {
            return Ok(false);
        }
        self.flush_pending_clear(backend, framebuffer)?;
        self.render_targets = targets.iter().copied().collect();
        self.bind_current_targets(framebuffer);
        Ok(true)
    }

    /// Re-runs the default target binding after the virtual framebuffer was rebuilt
    pub fn rebind_default_target(&mut self, framebuffer: &VirtualFramebuffer) {
        if self.render_targets.is_empty() {
            self.bind_current_targets(framebuffer);
        }
    }

    fn bind_current_targets(&mut self, framebuffer: &VirtualFramebuffer) {
        self.dirty.set(Dirty::RENDER_PASS);
        let (width, height) = match self.render_targets.first() {
            Some(target) => (target.width, target.height),
            None => (framebuffer.width(), framebuffer.height()),
        };
        self.set_viewport(Viewport::new(0, 0, width as i32, height as i32));
        self.set_scissor_rect(Rect::from_size(width, height));
    }

    // ========================================================================
    // Render passes
    // ========================================================================

    fn pass_is_current(&self) -> bool {
        self.pass.is_some() && !self.dirty.contains(Dirty::RENDER_PASS)
    }

    /// Clears the bound targets: immediately inside a current pass, otherwise as
    /// the load operation of the next one
    pub fn clear<B: Backend + ?Sized>(&mut self, values: ClearValues, backend: &mut B) {
        if self.pass_is_current() {
            backend.clear(&values);
            return;
        }
        let pending = &mut self.pending_clear;
        pending.color = values.color.or(pending.color);
        pending.depth = values.depth.or(pending.depth);
        pending.stencil = values.stencil.or(pending.stencil);
    }

    /// Applies a pending clear by opening (and keeping) a pass on the bound targets
    pub fn flush_pending_clear<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        framebuffer: &VirtualFramebuffer,
    ) -> Result<(), DeviceError> {
        if self.pending_clear.is_empty() {
            return Ok(());
        }
        self.ensure_pass(backend, framebuffer)
    }

    fn pass_desc(&self, framebuffer: &VirtualFramebuffer) -> RenderPassDesc {
        let Some(first) = self.render_targets.first() else {
            return framebuffer.pass_desc(self.pending_clear);
        };
        RenderPassDesc {
            color: self.render_targets.iter().map(|t| t.attachment()).collect(),
            depth: first.depth,
            sample_count: if first.is_multisampled() {
                first.sample_count
            } else {
                1
            },
            width: first.width,
            height: first.height,
            load: self.pending_clear,
        }
    }

    fn ensure_pass<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        framebuffer: &VirtualFramebuffer,
    ) -> Result<(), DeviceError> {
        if self.pass_is_current() {
            return Ok(());
        }
        self.end_pass(backend);

        let desc = self.pass_desc(framebuffer);
        backend.begin_render_pass(&desc).map_err(|e| {
            tracing::error!("render pass begin failed: {e}");
            DeviceError::RenderPass(e)
        })?;

        let pass = ActivePass {
            color_formats: desc.color.iter().map(|c| c.format).collect(),
            depth_format: desc.depth.map_or(DepthFormat::None, |d| d.format),
            sample_count: desc.sample_count,
            targets: self.render_targets.clone(),
        };
        tracing::debug!(
            targets = pass.color_formats.len(),
            backbuffer = pass.targets.is_empty(),
            depth_format = ?pass.depth_format,
            sample_count = pass.sample_count,
            "began render pass"
        );
        self.pass = Some(pass);
        self.pending_clear = ClearValues::default();
        self.dirty.reset_for_new_pass();
        self.bound_pipeline = PipelineHandle::NULL;
        self.bound_indices = None;
        Ok(())
    }

    /// Ends the open pass, resolving any multisampled client targets it rendered to
    pub fn end_pass<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        let Some(pass) = self.pass.take() else {
            return;
        };
        backend.end_render_pass();
        for target in &pass.targets {
            target.resolve(backend);
        }
        self.dirty.set(Dirty::RENDER_PASS);
    }

    /// Resolves a multisampled client target now
    pub fn resolve_target<B: Backend + ?Sized>(
        &mut self,
        target: &RenderTargetBinding,
        backend: &mut B,
    ) {
        let in_open_pass = self
            .pass
            .as_ref()
            .is_some_and(|pass| pass.targets.iter().any(|t| t.view == target.view));
        if in_open_pass {
            // Ending the pass resolves every target it wrote
            self.end_pass(backend);
        } else {
            target.resolve(backend);
        }
    }

    // ========================================================================
    // Draw resolution
    // ========================================================================

    fn pipeline_key(&self, pass: &ActivePass, shaders: &ShaderPair) -> PipelineKey {
        PipelineKey {
            blend: self.blend_key,
            depth_stencil: self.depth_stencil_key,
            rasterizer: pack_rasterizer_resolved(
                &self.rasterizer,
                pass.depth_format,
                self.float_keys,
            ),
            vertex_layout: self.vertex_layout,
            vertex_shader: shaders.vertex.id,
            pixel_shader: shaders.pixel.id,
            primitive: self.primitive.unwrap_or_default(),
            sample_count: pass.sample_count,
            sample_mask: self.blend.multi_sample_mask,
            color_formats: pass.color_formats.clone(),
            depth_format: pass.depth_format,
        }
    }

    /// Revalidates dirty state and issues `call`.
    ///
    /// A render pass that cannot begin fails the call. A pipeline, layout or
    /// sampler that cannot be built skips the draw and leaves its flag raised,
    /// so the next draw retries.
    pub fn draw<B: Backend + ?Sized>(
        &mut self,
        call: &DrawCall,
        res: &mut DrawResources<'_, B>,
    ) -> Result<DrawOutcome, DeviceError> {
        let Some(count) = call.primitive.vertex_count(call.primitive_count) else {
            tracing::error!(
                primitive = ?call.primitive,
                primitive_count = call.primitive_count,
                "vertex count overflows u32, skipping draw"
            );
            return Ok(DrawOutcome::Skipped);
        };
        self.ensure_pass(res.backend, res.framebuffer)?;

        if self.primitive != Some(call.primitive) {
            self.primitive = Some(call.primitive);
            self.dirty.set(Dirty::PIPELINE);
        }

        let Some(shaders) = self.shaders.clone() else {
            tracing::trace!("no shaders bound, skipping draw");
            return Ok(DrawOutcome::Skipped);
        };

        if self.dirty.contains(Dirty::VERTEX_LAYOUT) {
            let (key, errors) = VertexLayoutKey::resolve(&self.vertex_bindings, &shaders.vertex);
            for error in &errors {
                tracing::error!("{error}");
            }
            let Ok(layout) = res.layouts.fetch_or_build(key, res.backend) else {
                return Ok(DrawOutcome::Skipped);
            };
            if layout != self.vertex_layout {
                self.vertex_layout = layout;
                self.dirty.set(Dirty::PIPELINE);
            }
            self.dirty.clear(Dirty::VERTEX_LAYOUT);
        }

        if self.dirty.contains(Dirty::PIPELINE) {
            let key = match &self.pass {
                Some(pass) => self.pipeline_key(pass, &shaders),
                None => return Ok(DrawOutcome::Skipped),
            };
            let pipeline = res
                .pipelines
                .fetch_or_build(key, &shaders, res.objects, res.backend);
            if pipeline.is_null() {
                return Ok(DrawOutcome::Skipped);
            }
            if pipeline != self.bound_pipeline {
                tracing::trace!(pipeline = pipeline.0, "binding pipeline");
                res.backend.bind_pipeline(pipeline);
                self.bound_pipeline = pipeline;
                self.dirty.set(Dirty::DOWNSTREAM);
                self.dirty.set_all_samplers();
            }
            self.dirty.clear(Dirty::PIPELINE);
        }

        for slot in self.dirty.dirty_samplers() {
            if let Some(bound) = self.samplers[slot] {
                let Ok(sampler) = res.objects.resolve(StateKind::Sampler, bound.key, res.backend)
                else {
                    return Ok(DrawOutcome::Skipped);
                };
                res.backend.bind_sampler(slot as u32, bound.texture, sampler);
            }
            self.dirty.clear_sampler(slot);
        }

        if self.dirty.contains(Dirty::VERTEX_BUFFERS) {
            for (slot, binding) in self.vertex_bindings.iter().enumerate() {
                res.backend
                    .bind_vertex_buffer(slot as u32, binding.buffer, binding.byte_offset());
            }
        }
        let mut consumed = Dirty::all() - Dirty::RENDER_PASS - Dirty::INDEX_BUFFER;
        if let Some((buffer, size)) = call.indices {
            if self.dirty.contains(Dirty::INDEX_BUFFER) || self.bound_indices != call.indices {
                res.backend.bind_index_buffer(buffer, size);
                self.bound_indices = call.indices;
            }
            consumed |= Dirty::INDEX_BUFFER;
        }

        if self.dirty.contains(Dirty::VIEWPORT) {
            res.backend.set_viewport(&self.viewport);
        }
        if self.dirty.contains(Dirty::SCISSOR) {
            res.backend.set_scissor(self.scissor);
        }
        if self.dirty.contains(Dirty::BLEND_FACTOR) {
            res.backend.set_blend_constants(self.blend.blend_factor);
        }
        if self.dirty.contains(Dirty::STENCIL_REF) {
            res.backend
                .set_stencil_reference(self.depth_stencil.reference_stencil);
        }
        if self.dirty.contains(Dirty::UNIFORMS) && !self.uniforms.is_empty() {
            res.backend.set_uniforms(&self.uniforms);
        }
        self.dirty.clear(consumed);

        match call.indices {
            None => res.backend.draw(call.first, count, call.instance_count),
            Some(_) => {
                res.backend
                    .draw_indexed(call.base_vertex, call.first, count, call.instance_count)
            }
        }
        Ok(DrawOutcome::Drawn)
    }

    // ========================================================================
    // Snapshot accessors
    // ========================================================================

    pub fn dirty(&self) -> &DirtyFlags {
        &self.dirty
    }

    pub fn blend_state(&self) -> &BlendState {
        &self.blend
    }

    pub fn depth_stencil_state(&self) -> &DepthStencilState {
        &self.depth_stencil
    }

    pub fn rasterizer_state(&self) -> &RasterizerState {
        &self.rasterizer
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor_rect(&self) -> Rect {
        self.scissor
    }

    pub fn render_targets(&self) -> &[RenderTargetBinding] {
        &self.render_targets
    }

    pub fn bound_pipeline(&self) -> PipelineHandle {
        self.bound_pipeline
    }

    pub fn vertex_layout(&self) -> VertexLayoutHandle {
        self.vertex_layout
    }

    pub fn is_pass_open(&self) -> bool {
        self.pass.is_some()
    }

    /// Color formats of the open pass
    pub fn pass_color_formats(&self) -> Option<&[SurfaceFormat]> {
        self.pass.as_ref().map(|pass| pass.color_formats.as_slice())
    }

    pub fn pending_clear(&self) -> &ClearValues {
        &self.pending_clear
    }
}
