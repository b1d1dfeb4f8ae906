//! Integration tests for the bakery device
//!
//! Drives full frames through [`Device`] against the recording backend and checks
//! what reached the native side: builds, binds, passes and releases.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bakery_shared::{
        BlendState, BufferHandle, ClearOptions, Color, CubeMapFace, DepthFormat, DepthStencilState,
        PrimitiveType, RasterizerState, SamplerState, SurfaceFormat, VertexBufferBinding,
        VertexDeclaration, VertexElement, VertexElementFormat, VertexElementUsage,
    };

    use crate::backend::{RenderTargetView, Shader, ShaderHandle, ShaderId, ShaderPair, TextureHandle};
    use crate::config::DeviceConfig;
    use crate::device::Device;
    use crate::framebuffer::{FramebufferParams, RenderTargetBinding};
    use crate::test_utils::{init_tracing, RecordingBackend};
    use crate::tracker::DrawOutcome;

    // ============================================================================
    // Fixtures
    // ============================================================================

    fn sprite_shaders() -> Arc<ShaderPair> {
        let vs = Shader::new(ShaderId(10), ShaderHandle(1000))
            .with_input(VertexElementUsage::Position, 0, 0)
            .with_input(VertexElementUsage::Color, 0, 1)
            .with_input(VertexElementUsage::TextureCoordinate, 0, 2);
        let ps = Shader::new(ShaderId(11), ShaderHandle(1001));
        Arc::new(ShaderPair::new(Arc::new(vs), Arc::new(ps)))
    }

    fn position_stream() -> VertexBufferBinding {
        let decl = VertexDeclaration::new(vec![VertexElement::new(
            0,
            VertexElementFormat::Vector3,
            VertexElementUsage::Position,
            0,
        )]);
        VertexBufferBinding::new(BufferHandle(1), Arc::new(decl))
    }

    fn sprite_stream() -> VertexBufferBinding {
        let decl = VertexDeclaration::new(vec![
            VertexElement::new(0, VertexElementFormat::Vector3, VertexElementUsage::Position, 0),
            VertexElement::new(12, VertexElementFormat::Color, VertexElementUsage::Color, 0),
            VertexElement::new(
                16,
                VertexElementFormat::Vector2,
                VertexElementUsage::TextureCoordinate,
                0,
            ),
        ]);
        VertexBufferBinding::new(BufferHandle(2), Arc::new(decl))
    }

    fn device_800x600() -> Device<RecordingBackend> {
        init_tracing();
        let config = DeviceConfig::from_toml_str(
            r#"
            [backbuffer]
            width = 800
            height = 600
            depth_format = "None"
            "#,
        )
        .unwrap();
        Device::new(RecordingBackend::new(), config).unwrap()
    }

    fn draw_triangle(device: &Device<RecordingBackend>) -> DrawOutcome {
        device
            .draw_primitives(PrimitiveType::TriangleList, 0, 1)
            .unwrap()
    }

    // ============================================================================
    // First draw
    // ============================================================================

    #[test]
    fn test_first_draw_builds_each_object_once() {
        let device = device_800x600();
        device.set_blend_state(&BlendState::OPAQUE);
        device.set_depth_stencil_state(&DepthStencilState::NONE);
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);

        assert_eq!(draw_triangle(&device), DrawOutcome::Drawn);
        let configured = device.backbuffer().color_format;
        {
            let backend = device.backend();
            let c = &backend.counters;
            assert_eq!(c.blend_builds, 1);
            assert_eq!(c.depth_stencil_builds, 1);
            assert_eq!(c.rasterizer_builds, 1);
            assert_eq!(c.pipeline_builds, 1);
            assert_eq!(c.layout_builds, 1);

            let pass = &backend.passes[0];
            assert_eq!(configured, SurfaceFormat::Color);
            assert_eq!(pass.color[0].format, configured);
            let desc = backend.last_pipeline.as_ref().unwrap();
            assert_eq!(desc.color_formats.as_slice(), &[SurfaceFormat::Color]);
            assert_eq!(desc.depth_format, DepthFormat::None);
            assert!(!desc.blend.enabled);
        }

        let before = device.backend().counters.clone();
        assert_eq!(draw_triangle(&device), DrawOutcome::Drawn);
        let after = device.backend().counters.clone();
        assert_eq!(after.blend_builds, before.blend_builds);
        assert_eq!(after.depth_stencil_builds, before.depth_stencil_builds);
        assert_eq!(after.rasterizer_builds, before.rasterizer_builds);
        assert_eq!(after.pipeline_builds, before.pipeline_builds);
        assert_eq!(after.layout_builds, before.layout_builds);
        assert_eq!(after.pipeline_binds, before.pipeline_binds);
        assert_eq!(after.draws, before.draws + 1);
    }

    #[test]
    fn test_repeated_state_resolves_to_cached_pipeline() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[sprite_stream()]);
        device.set_blend_state(&BlendState::ALPHA_BLEND);
        draw_triangle(&device);
        let first = device.backend().bound_pipeline;

        device.set_blend_state(&BlendState::ALPHA_BLEND);
        device.set_blend_state(&BlendState::ALPHA_BLEND);
        draw_triangle(&device);
        device.set_blend_state(&BlendState::OPAQUE);
        device.set_blend_state(&BlendState::ALPHA_BLEND);
        draw_triangle(&device);

        assert_eq!(device.backend().bound_pipeline, first);
        assert_eq!(device.stats().pipelines, 1);
        assert_eq!(device.stats().pipeline_builds, 1);
        assert!(device.backend().last_pipeline.as_ref().unwrap().blend.enabled);
    }

    #[test]
    fn test_sprite_batch_frame() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[sprite_stream()]);
        device.set_blend_state(&BlendState::ALPHA_BLEND);
        device.set_rasterizer_state(&RasterizerState::CULL_NONE);
        device.clear(ClearOptions::TARGET, Color::new(100, 149, 237, 255), 1.0, 0);

        for texture in [TextureHandle(900), TextureHandle(901), TextureHandle(900)] {
            device.verify_sampler(0, texture, &SamplerState::LINEAR_CLAMP);
            draw_triangle(&device);
        }
        device.present(None, None, (1920, 1080)).unwrap();

        let backend = device.backend();
        let c = &backend.counters;
        assert_eq!(c.pass_begins, 1);
        assert_eq!(c.pass_ends, 1);
        assert_eq!(c.clears, 0);
        assert_eq!(c.pipeline_builds, 1);
        assert_eq!(c.sampler_builds, 1);
        assert_eq!(c.sampler_binds, 3);
        assert_eq!(c.draws, 3);
        assert_eq!(c.blits, 1);
        assert_eq!(backend.passes[0].load.color, Some(Color::new(100, 149, 237, 255)));

        let layout = backend.last_pipeline.as_ref().unwrap();
        assert_eq!(layout.primitive, PrimitiveType::TriangleList);
        assert_eq!(backend.blits[0].source.0, backend.passes[0].color[0].view.handle().0);
    }

    #[test]
    fn test_missing_shaders_skip_without_native_work() {
        let device = device_800x600();
        device.apply_vertex_buffer_bindings(&[position_stream()]);
        assert_eq!(draw_triangle(&device), DrawOutcome::Skipped);
        let stats = device.stats();
        assert_eq!(stats.pipelines, 0);
        assert_eq!(stats.state_builds, 0);
    }

    #[test]
    fn test_pipeline_failure_recovers_next_frame() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);

        device.backend().failures.pipelines = true;
        assert_eq!(draw_triangle(&device), DrawOutcome::Skipped);
        assert_eq!(draw_triangle(&device), DrawOutcome::Skipped);
        device.backend().failures.pipelines = false;
        assert_eq!(draw_triangle(&device), DrawOutcome::Drawn);

        let stats = device.stats();
        assert_eq!(stats.pipeline_failures, 2);
        assert_eq!(stats.pipeline_builds, 1);
        assert_eq!(device.backend().counters.draws, 1);
    }

    // ============================================================================
    // Backbuffer lifetime
    // ============================================================================

    #[test]
    fn test_resize_releases_old_attachments_once() {
        let mut config = DeviceConfig::default();
        config.backbuffer.depth_format = DepthFormat::Depth24;
        config.backbuffer.sample_count = 4;
        let device = Device::new(RecordingBackend::new(), config).unwrap();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);
        draw_triangle(&device);

        let old: Vec<u64> = device
            .backend()
            .attachments
            .iter()
            .map(|(handle, _)| handle.0)
            .collect();
        assert_eq!(old.len(), 3);

        device
            .reset_backbuffer(
                FramebufferParams::new(1280, 720)
                    .with_depth(DepthFormat::Depth24)
                    .with_samples(4),
            )
            .unwrap();
        {
            let backend = device.backend();
            assert_eq!(backend.counters.attachment_releases, 3);
            assert!(old.iter().all(|&handle| !backend.is_live(handle)));
            assert_eq!(backend.counters.attachment_builds, 6);
        }

        // The default binding now points at the new attachments
        draw_triangle(&device);
        let backend = device.backend();
        let pass = backend.passes.last().unwrap();
        assert_eq!((pass.width, pass.height), (1280, 720));
        assert!(backend.is_live(pass.color[0].view.handle().0));
        assert_eq!(backend.viewport.map(|v| (v.width, v.height)), Some((1280, 720)));
        // The rest of the pipeline key is unchanged, so the pipeline is reused
        assert_eq!(backend.counters.pipeline_builds, 1);
    }

    #[test]
    fn test_failed_resize_keeps_old_backbuffer() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);
        device.backend().failures.attachments_after = Some(0);

        let err = device
            .reset_backbuffer(FramebufferParams::new(1024, 768))
            .unwrap_err();
        assert!(matches!(err, crate::error::DeviceError::Framebuffer(_)));
        assert_eq!(device.backbuffer().width, 800);
        device.backend().failures.attachments_after = None;

        draw_triangle(&device);
        let backend = device.backend();
        assert_eq!(backend.passes[0].width, 800);
        assert_eq!(backend.counters.attachment_releases, 0);
    }

    #[test]
    fn test_drop_releases_everything_once() {
        let backend = RecordingBackend::new();
        let live = backend.live();
        let device = Device::new(backend, DeviceConfig::default()).unwrap();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[sprite_stream()]);
        device.verify_sampler(1, TextureHandle(900), &SamplerState::POINT_WRAP);
        draw_triangle(&device);
        device.set_blend_state(&BlendState::ADDITIVE);
        draw_triangle(&device);
        assert!(!live.is_empty());

        drop(device);
        assert!(live.is_empty());
    }

    // ============================================================================
    // Render targets
    // ============================================================================

    #[test]
    fn test_multisampled_target_resolves_before_sampling() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);

        let shadow =
            RenderTargetBinding::texture_2d(TextureHandle(700), SurfaceFormat::Color, 512, 512)
                .with_multisample(TextureHandle(701), 4)
                .with_depth(TextureHandle(702), DepthFormat::Depth24);
        device.set_render_targets(&[shadow]).unwrap();
        device.clear(ClearOptions::TARGET | ClearOptions::DEPTH_BUFFER, Color::BLACK, 1.0, 0);
        draw_triangle(&device);

        device.set_render_targets(&[]).unwrap();
        device.verify_sampler(0, TextureHandle(700), &SamplerState::LINEAR_CLAMP);
        draw_triangle(&device);

        let backend = device.backend();
        assert_eq!(
            backend.resolves,
            vec![(TextureHandle(701), RenderTargetView::Texture2D { texture: TextureHandle(700) })]
        );
        let offscreen = &backend.passes[0];
        assert_eq!(offscreen.sample_count, 4);
        assert_eq!(offscreen.load.depth, Some(1.0));
        assert_eq!(backend.passes[1].sample_count, 1);
        // Different attachments, different pipelines
        assert_eq!(backend.counters.pipeline_builds, 2);
    }

    #[test]
    fn test_cube_face_targets_are_distinct() {
        let device = device_800x600();
        device.apply_shaders(&sprite_shaders());
        device.apply_vertex_buffer_bindings(&[position_stream()]);

        for face in [CubeMapFace::PositiveX, CubeMapFace::NegativeX] {
            let target =
                RenderTargetBinding::cube_face(TextureHandle(800), face, SurfaceFormat::Color, 128);
            device.set_render_targets(&[target]).unwrap();
            draw_triangle(&device);
        }

        let backend = device.backend();
        assert_eq!(backend.counters.pass_begins, 2);
        // Same formats and size: one pipeline serves both faces
        assert_eq!(backend.counters.pipeline_builds, 1);
    }

    // ============================================================================
    // Concurrency
    // ============================================================================

    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_device_is_shareable_across_threads() {
        assert_sync::<Device<RecordingBackend>>();
    }

    #[test]
    fn test_concurrent_setters_and_draws_share_caches() {
        const THREADS: usize = 4;
        const DRAWS: usize = 50;

        let device = device_800x600();
        let shaders = sprite_shaders();
        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let device = &device;
                let shaders = &shaders;
                scope.spawn(move || {
                    let blend = if thread % 2 == 0 {
                        BlendState::OPAQUE
                    } else {
                        BlendState::ADDITIVE
                    };
                    for _ in 0..DRAWS {
                        device.set_blend_state(&blend);
                        device.apply_shaders(shaders);
                        device.apply_vertex_buffer_bindings(&[position_stream()]);
                        assert_eq!(draw_triangle(device), DrawOutcome::Drawn);
                    }
                });
            }
        });

        // Whichever blend won each race, both keys are cached after these
        for blend in [BlendState::OPAQUE, BlendState::ADDITIVE] {
            device.set_blend_state(&blend);
            assert_eq!(draw_triangle(&device), DrawOutcome::Drawn);
        }

        let stats = device.stats();
        assert_eq!(stats.pipelines, 2);
        assert_eq!(stats.pipeline_builds, 2);
        assert_eq!(stats.blend_states, 2);
        assert_eq!(stats.vertex_layouts, 1);
        assert_eq!(stats.layout_builds, 1);
        let backend = device.backend();
        assert_eq!(backend.counters.draws as usize, THREADS * DRAWS + 2);
        assert_eq!(backend.counters.pass_begins, 1);
    }
}
