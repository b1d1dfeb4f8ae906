//! Virtual backbuffer and render target bindings
//!
//! The client always renders into an off-screen framebuffer of its own size,
//! format and sample count. `present` resolves it and blits it onto whatever
//! surface the window system hands us.

use bakery_shared::{DepthFormat, Rect, SurfaceFormat};
use smallvec::smallvec;

use crate::backend::{
    AttachmentDesc, AttachmentKind, Backend, BlitGeometry, ClearValues, ColorAttachment,
    DepthAttachment, RenderPassDesc, RenderTargetView, TextureHandle,
};
use crate::config::{BackbufferConfig, ScaleMode};
use crate::error::BackendError;

/// Creation parameters of the virtual framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferParams {
    pub width: u32,
    pub height: u32,
    pub color_format: SurfaceFormat,
    pub depth_format: DepthFormat,
    pub sample_count: u32,
}

impl FramebufferParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            color_format: SurfaceFormat::Color,
            depth_format: DepthFormat::None,
            sample_count: 1,
        }
    }

    pub fn with_depth(mut self, depth_format: DepthFormat) -> Self {
        self.depth_format = depth_format;
        self
    }

    pub fn with_samples(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// These parameters with the sample count clamped to `max_samples`
    pub(crate) fn clamped(mut self, max_samples: u32) -> Self {
        let clamped = clamp_sample_count(self.sample_count, max_samples);
        if clamped != self.sample_count {
            tracing::warn!(
                requested = self.sample_count,
                clamped,
                "unsupported backbuffer sample count"
            );
            self.sample_count = clamped;
        }
        self
    }
}

impl From<&BackbufferConfig> for FramebufferParams {
    fn from(config: &BackbufferConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            color_format: config.color_format,
            depth_format: config.depth_format,
            sample_count: config.sample_count,
        }
    }
}

/// Clamps `requested` to `[1, max]` and rounds down to a power of two
pub fn clamp_sample_count(requested: u32, max: u32) -> u32 {
    let count = requested.clamp(1, max.max(1));
    1 << (u32::BITS - 1 - count.leading_zeros())
}

/// A client render target as bound with `set_render_targets`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetBinding {
    /// Resolve destination, or the render target itself when single-sampled
    pub view: RenderTargetView,
    pub format: SurfaceFormat,
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    /// Texture rendered into when multisampled
    pub multisample: Option<TextureHandle>,
    /// Only the first binding's depth buffer is used
    pub depth: Option<DepthAttachment>,
}

impl RenderTargetBinding {
    fn new(view: RenderTargetView, format: SurfaceFormat, width: u32, height: u32) -> Self {
        Self {
            view,
            format,
            width,
            height,
            sample_count: 1,
            multisample: None,
            depth: None,
        }
    }

    pub fn texture_2d(texture: TextureHandle, format: SurfaceFormat, width: u32, height: u32) -> Self {
        Self::new(RenderTargetView::Texture2D { texture }, format, width, height)
    }

    pub fn cube_face(
        texture: TextureHandle,
        face: bakery_shared::CubeMapFace,
        format: SurfaceFormat,
        size: u32,
    ) -> Self {
        Self::new(RenderTargetView::CubeFace { texture, face }, format, size, size)
    }

    pub fn renderbuffer(
        renderbuffer: TextureHandle,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self::new(RenderTargetView::Renderbuffer { renderbuffer }, format, width, height)
    }

    pub fn with_multisample(mut self, texture: TextureHandle, sample_count: u32) -> Self {
        self.multisample = Some(texture);
        self.sample_count = sample_count;
        self
    }

    pub fn with_depth(mut self, texture: TextureHandle, format: DepthFormat) -> Self {
        self.depth = Some(DepthAttachment { texture, format });
        self
    }

    pub fn is_multisampled(&self) -> bool {
        self.sample_count > 1 && self.multisample.is_some()
    }

    /// The texture the render pass writes to
    pub(crate) fn attachment(&self) -> ColorAttachment {
        let view = match self.multisample {
            Some(texture) if self.sample_count > 1 => RenderTargetView::Texture2D { texture },
            _ => self.view,
        };
        ColorAttachment {
            view,
            format: self.format,
        }
    }

    /// Resolves the multisample texture into `view`. No-op when single-sampled.
    pub(crate) fn resolve<B: Backend + ?Sized>(&self, backend: &mut B) {
        if let Some(source) = self.multisample.filter(|_| self.sample_count > 1) {
            tracing::trace!(texture = self.view.handle().0, "resolving render target");
            backend.resolve(source, &self.view);
        }
    }
}

#[derive(Debug, Default)]
struct Attachments {
    /// Multisampled when `sample_count > 1`
    color: TextureHandle,
    resolve: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

impl Attachments {
    fn allocate<B: Backend + ?Sized>(
        params: &FramebufferParams,
        backend: &mut B,
    ) -> Result<Self, BackendError> {
        let mut attachments = Attachments::default();
        match attachments.allocate_into(params, backend) {
            Ok(()) => Ok(attachments),
            Err(e) => {
                attachments.release(backend);
                Err(e)
            }
        }
    }

    fn allocate_into<B: Backend + ?Sized>(
        &mut self,
        params: &FramebufferParams,
        backend: &mut B,
    ) -> Result<(), BackendError> {
        let desc = |kind, sample_count| AttachmentDesc {
            width: params.width,
            height: params.height,
            kind,
            sample_count,
        };
        let color = AttachmentKind::Color(params.color_format);
        self.color = backend.create_attachment(&desc(color, params.sample_count))?;
        if params.sample_count > 1 {
            self.resolve = Some(backend.create_attachment(&desc(color, 1))?);
        }
        if !params.depth_format.is_none() {
            let depth = AttachmentKind::DepthStencil(params.depth_format);
            self.depth = Some(backend.create_attachment(&desc(depth, params.sample_count))?);
        }
        Ok(())
    }

    fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        let Attachments {
            color,
            resolve,
            depth,
        } = std::mem::take(self);
        for handle in [Some(color), resolve, depth].into_iter().flatten() {
            if !handle.is_null() {
                backend.release_attachment(handle);
            }
        }
    }
}

/// Off-screen render target standing in for the real backbuffer
#[derive(Debug)]
pub struct VirtualFramebuffer {
    params: FramebufferParams,
    attachments: Attachments,
    scale_mode: ScaleMode,
    blit: Option<CachedBlit>,
    geometry_builds: u64,
}

#[derive(Debug, Clone, Copy)]
struct CachedBlit {
    src: Option<Rect>,
    dst: Option<Rect>,
    surface_size: (u32, u32),
    geometry: BlitGeometry,
}

impl VirtualFramebuffer {
    /// Allocates the attachments for `params`.
    ///
    /// The sample count is clamped to what the backend supports. On failure
    /// anything already allocated is released again.
    pub fn create<B: Backend + ?Sized>(
        params: FramebufferParams,
        scale_mode: ScaleMode,
        backend: &mut B,
    ) -> Result<Self, BackendError> {
        let params = params.clamped(backend.max_sample_count());
        let attachments = Attachments::allocate(&params, backend)?;
        tracing::debug!(
            width = params.width,
            height = params.height,
            color_format = ?params.color_format,
            depth_format = ?params.depth_format,
            sample_count = params.sample_count,
            "created virtual framebuffer"
        );
        Ok(Self {
            params,
            attachments,
            scale_mode,
            blit: None,
            geometry_builds: 0,
        })
    }

    pub fn params(&self) -> &FramebufferParams {
        &self.params
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn sample_count(&self) -> u32 {
        self.params.sample_count
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }

    pub fn set_scale_mode(&mut self, scale_mode: ScaleMode) {
        if self.scale_mode != scale_mode {
            self.scale_mode = scale_mode;
            self.blit = None;
        }
    }

    /// Attachment the render pass writes color into
    pub fn color_attachment(&self) -> TextureHandle {
        self.attachments.color
    }

    pub fn resolve_attachment(&self) -> Option<TextureHandle> {
        self.attachments.resolve
    }

    pub fn depth_attachment(&self) -> Option<TextureHandle> {
        self.attachments.depth
    }

    /// Single-sample texture holding the final image
    pub fn presentable(&self) -> TextureHandle {
        self.attachments.resolve.unwrap_or(self.attachments.color)
    }

    /// Render pass targeting the framebuffer
    pub fn pass_desc(&self, load: ClearValues) -> RenderPassDesc {
        RenderPassDesc {
            color: smallvec![ColorAttachment {
                view: RenderTargetView::Texture2D {
                    texture: self.attachments.color,
                },
                format: self.params.color_format,
            }],
            depth: self.attachments.depth.map(|texture| DepthAttachment {
                texture,
                format: self.params.depth_format,
            }),
            sample_count: self.params.sample_count,
            width: self.params.width,
            height: self.params.height,
            load,
        }
    }

    /// Resolves the multisampled color attachment. No-op when single-sampled.
    pub fn resolve<B: Backend + ?Sized>(&self, backend: &mut B) {
        if let Some(resolve) = self.attachments.resolve {
            backend.resolve(
                self.attachments.color,
                &RenderTargetView::Texture2D { texture: resolve },
            );
        }
    }

    /// Blits the (resolved) color attachment onto the surface.
    ///
    /// `src` defaults to the whole framebuffer and `dst` to the scale-mode
    /// placement. The blit geometry is cached until one of the inputs changes.
    pub fn present<B: Backend + ?Sized>(
        &mut self,
        src: Option<Rect>,
        dst: Option<Rect>,
        surface_size: (u32, u32),
        backend: &mut B,
    ) {
        let cached = self
            .blit
            .filter(|c| c.src == src && c.dst == dst && c.surface_size == surface_size);
        let geometry = match cached {
            Some(cached) => cached.geometry,
            None => {
                let geometry = self.blit_geometry(src, dst, surface_size);
                self.geometry_builds += 1;
                self.blit = Some(CachedBlit {
                    src,
                    dst,
                    surface_size,
                    geometry,
                });
                geometry
            }
        };
        backend.blit(&geometry);
    }

    fn blit_geometry(
        &self,
        src: Option<Rect>,
        dst: Option<Rect>,
        surface_size: (u32, u32),
    ) -> BlitGeometry {
        let size = (self.params.width, self.params.height);
        let src_rect = src.unwrap_or(Rect::from_size(size.0, size.1));
        let dst_rect = dst.unwrap_or_else(|| scaled_rect(self.scale_mode, size, surface_size));

        let (fw, fh) = (size.0 as f32, size.1 as f32);
        let (sw, sh) = (surface_size.0.max(1) as f32, surface_size.1.max(1) as f32);
        let uv = [
            src_rect.x as f32 / fw,
            src_rect.y as f32 / fh,
            (src_rect.x + src_rect.width) as f32 / fw,
            (src_rect.y + src_rect.height) as f32 / fh,
        ];
        let ndc = [
            dst_rect.x as f32 / sw * 2.0 - 1.0,
            1.0 - dst_rect.y as f32 / sh * 2.0,
            (dst_rect.x + dst_rect.width) as f32 / sw * 2.0 - 1.0,
            1.0 - (dst_rect.y + dst_rect.height) as f32 / sh * 2.0,
        ];
        BlitGeometry {
            source: self.presentable(),
            src_rect,
            dst_rect,
            surface_size,
            uv,
            ndc,
        }
    }

    /// Rebuilds the framebuffer for `params`.
    ///
    /// Returns `Ok(false)` without touching anything when the (clamped) parameters
    /// are unchanged. New attachments are allocated before the old ones are
    /// released; if allocation fails the current framebuffer stays valid.
    pub fn reset<B: Backend + ?Sized>(
        &mut self,
        params: FramebufferParams,
        backend: &mut B,
    ) -> Result<bool, BackendError> {
        let params = params.clamped(backend.max_sample_count());
        if params == self.params {
            return Ok(false);
        }
        let attachments = Attachments::allocate(&params, backend)?;
        let mut old = std::mem::replace(&mut self.attachments, attachments);
        old.release(backend);

        tracing::debug!(
            width = params.width,
            height = params.height,
            sample_count = params.sample_count,
            "rebuilt virtual framebuffer"
        );
        self.params = params;
        self.blit = None;
        Ok(true)
    }

    /// Releases all attachments. Safe to call more than once.
    pub fn release<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        self.attachments.release(backend);
        self.blit = None;
    }

    /// Number of times the present blit geometry was recomputed
    pub fn geometry_builds(&self) -> u64 {
        self.geometry_builds
    }
}

/// Placement of a `size` image on a `surface` of the given size
pub fn scaled_rect(mode: ScaleMode, size: (u32, u32), surface: (u32, u32)) -> Rect {
    let (w, h) = (size.0.max(1) as f32, size.1.max(1) as f32);
    let (sw, sh) = (surface.0 as f32, surface.1 as f32);
    let scale = match mode {
        ScaleMode::Stretch => return Rect::from_size(surface.0, surface.1),
        ScaleMode::Fit => (sw / w).min(sh / h),
        ScaleMode::PixelPerfect => (sw / w).floor().min((sh / h).floor()).max(1.0),
    };
    let (scaled_w, scaled_h) = ((w * scale).round(), (h * scale).round());
    Rect::new(
        ((sw - scaled_w) / 2.0).round() as i32,
        ((sh - scaled_h) / 2.0).round() as i32,
        scaled_w as i32,
        scaled_h as i32,
    )
}
