//! # Graphics — one GL context's shared state
//!
//! [`Graphics`] owns what every surface and batch of a context shares: the
//! `Rc<dyn Gl>`, the [`RenderConfig`], the display scale, the screen
//! [`RenderTarget`], the white texture used for solid fills, the frame
//! [`RenderStats`] and a [`GpuRegistry`] counting live GPU objects.
//!
//! Textures and framebuffers created here report to the registry when they
//! are created and deleted, so leaks show up in diagnostics and as a warning
//! when the context goes away.

use std::cell::{Cell, OnceCell};
use std::rc::Rc;

use image::{Rgba, RgbaImage};

use crate::batch::{SharedBatch, UniformQuadBatch, shared};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::gl::{Gl, TextureId, check_gl_error, consts};
use crate::math::Vec2;
use crate::render_target::RenderTarget;
use crate::scale::Scale;
use crate::stats::RenderStats;
use crate::surface::{Surface, TextureSurface};
use crate::texture::{Texture, TextureConfig};

/// Counts of live GPU objects created through a [`Graphics`].
#[derive(Debug, Default)]
pub struct GpuRegistry {
    textures: Cell<usize>,
    framebuffers: Cell<usize>,
}

impl GpuRegistry {
    pub fn live_textures(&self) -> usize {
        self.textures.get()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.get()
    }

    pub(crate) fn texture_created(&self) {
        self.textures.set(self.textures.get() + 1);
    }

    pub(crate) fn texture_deleted(&self) {
        self.textures.set(self.textures.get().saturating_sub(1));
    }

    pub(crate) fn framebuffer_created(&self) {
        self.framebuffers.set(self.framebuffers.get() + 1);
    }

    pub(crate) fn framebuffer_deleted(&self) {
        self.framebuffers.set(self.framebuffers.get().saturating_sub(1));
    }
}

pub struct Graphics {
    gl: Rc<dyn Gl>,
    config: RenderConfig,
    scale: Scale,
    view_size: Vec2,
    default_target: RenderTarget,
    color_tex: OnceCell<Texture>,
    registry: Rc<GpuRegistry>,
    stats: Rc<RenderStats>,
}

impl Graphics {
    /// Takes over `gl` and sets up premultiplied-alpha blending. The screen
    /// is zero-sized until the first [`viewport_changed`](Self::viewport_changed).
    pub fn new(gl: Rc<dyn Gl>, config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let scale = Scale::new(config.scale_factor);
        gl.blend_func(consts::ONE, consts::ONE_MINUS_SRC_ALPHA);
        gl.enable(consts::BLEND);
        check_gl_error(&*gl, config.check_errors, "Graphics init");

        Ok(Self {
            default_target: RenderTarget::screen(gl.clone(), 0, 0, scale),
            gl,
            config,
            scale,
            view_size: Vec2::ZERO,
            color_tex: OnceCell::new(),
            registry: Rc::new(GpuRegistry::default()),
            stats: Rc::new(RenderStats::new()),
        })
    }

    pub fn gl(&self) -> &Rc<dyn Gl> {
        &self.gl
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Size of the screen in display units.
    pub fn view_size(&self) -> Vec2 {
        self.view_size
    }

    pub fn default_render_target(&self) -> &RenderTarget {
        &self.default_target
    }

    pub fn stats(&self) -> &Rc<RenderStats> {
        &self.stats
    }

    pub fn registry(&self) -> &Rc<GpuRegistry> {
        &self.registry
    }

    pub fn live_textures(&self) -> usize {
        self.registry.live_textures()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.registry.live_framebuffers()
    }

    /// The screen framebuffer is now `pixel_width`×`pixel_height`.
    pub fn viewport_changed(&mut self, pixel_width: i32, pixel_height: i32) {
        self.default_target.set_size(pixel_width, pixel_height);
        self.view_size = Vec2::new(
            self.scale.inv_scaled(pixel_width as f32),
            self.scale.inv_scaled(pixel_height as f32),
        );
        log::info!(
            "viewport changed {pixel_width}x{pixel_height}/{} -> {}x{}",
            self.scale.factor(),
            self.view_size.x,
            self.view_size.y
        );
    }

    pub fn scale_changed(&mut self, scale: Scale) {
        self.scale = scale;
        self.default_target.set_scale(scale);
        let (w, h) = (self.default_target.width(), self.default_target.height());
        self.view_size = Vec2::new(scale.inv_scaled(w as f32), scale.inv_scaled(h as f32));
    }

    /// The stock quad batch for this context.
    pub fn create_batch(&self) -> Result<SharedBatch> {
        let batch = UniformQuadBatch::new(self.gl.clone(), &self.config, self.stats.clone())?;
        Ok(shared(batch))
    }

    /// An empty texture of `width`×`height` display units.
    pub fn create_texture(&self, width: f32, height: f32, config: TextureConfig) -> Result<Texture> {
        let pw = self.scale.scaled_ceil(width);
        let ph = self.scale.scaled_ceil(height);
        check_size(pw, ph)?;
        let (tw, th) = (config.to_tex_width(pw), config.to_tex_height(ph));

        let id = self.alloc_texture(&config)?;
        self.gl.tex_image_2d(
            consts::TEXTURE_2D,
            0,
            consts::RGBA as i32,
            tw,
            th,
            consts::RGBA,
            consts::UNSIGNED_BYTE,
            None,
        );
        check_gl_error(&*self.gl, self.config.check_errors, "create_texture");
        Ok(self.wrap_texture(id, config, (tw, th), (width, height)))
    }

    /// Uploads `image`, which is taken to be at this context's scale.
    pub fn create_texture_from_image(&self, image: &RgbaImage, config: TextureConfig) -> Result<Texture> {
        let (w, h) = image.dimensions();
        check_size(w as i32, h as i32)?;
        let (tw, th) = (config.to_tex_width(w as i32), config.to_tex_height(h as i32));

        let id = self.alloc_texture(&config)?;
        let display = (self.scale.inv_scaled(w as f32), self.scale.inv_scaled(h as f32));
        let texture = self.wrap_texture(id, config, (tw, th), display);
        texture.update(image)?;
        Ok(texture)
    }

    /// A framebuffer that renders into `texture`.
    pub fn create_render_target(&self, texture: &Texture) -> Result<RenderTarget> {
        RenderTarget::create(
            self.gl.clone(),
            texture,
            self.config.check_errors,
            Some(self.registry.clone()),
        )
    }

    /// A surface drawing to the screen.
    pub fn create_surface(&self, batch: SharedBatch) -> Result<Surface> {
        Surface::new(self, self.default_target.clone(), batch)
    }

    /// A surface drawing into a fresh managed texture of `width`×`height`
    /// display units.
    pub fn create_texture_surface(&self, batch: SharedBatch, width: f32, height: f32) -> Result<TextureSurface> {
        let texture = self.create_texture(width, height, TextureConfig::DEFAULT)?;
        TextureSurface::new(self, batch, texture)
    }

    /// 1×1 opaque white, tinted to draw solid fills. Owned by this context.
    pub fn color_tex(&self) -> Result<Texture> {
        if let Some(tex) = self.color_tex.get() {
            return Ok(tex.clone());
        }
        let id = self.alloc_texture(&TextureConfig::UNMANAGED)?;
        let tex = Texture::build(
            self.gl.clone(),
            id,
            TextureConfig::UNMANAGED,
            (1, 1),
            Scale::ONE,
            (1.0, 1.0),
            self.config.check_errors,
            Some(self.registry.clone()),
        );
        tex.update(&RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 255])))?;
        Ok(self.color_tex.get_or_init(|| tex).clone())
    }

    fn alloc_texture(&self, config: &TextureConfig) -> Result<TextureId> {
        let gl = &self.gl;
        let id = gl.create_texture().ok_or_else(|| RenderError::Driver {
            op: "glGenTexture",
            code: gl.get_error(),
        })?;
        gl.bind_texture(consts::TEXTURE_2D, Some(id));
        gl.tex_parameter_i32(consts::TEXTURE_2D, consts::TEXTURE_MAG_FILTER, config.mag_filter as i32);
        gl.tex_parameter_i32(
            consts::TEXTURE_2D,
            consts::TEXTURE_MIN_FILTER,
            mipmapify(config.min_filter, config.mipmaps) as i32,
        );
        gl.tex_parameter_i32(consts::TEXTURE_2D, consts::TEXTURE_WRAP_S, wrap(config.repeat_x) as i32);
        gl.tex_parameter_i32(consts::TEXTURE_2D, consts::TEXTURE_WRAP_T, wrap(config.repeat_y) as i32);
        log::debug!("created texture {}", id.raw());
        Ok(id)
    }

    fn wrap_texture(&self, id: TextureId, config: TextureConfig, pixel: (i32, i32), display: (f32, f32)) -> Texture {
        Texture::build(
            self.gl.clone(),
            id,
            config,
            pixel,
            self.scale,
            display,
            self.config.check_errors,
            Some(self.registry.clone()),
        )
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        if let Some(tex) = self.color_tex.get() {
            tex.close();
        }
        let (textures, framebuffers) = (self.live_textures(), self.live_framebuffers());
        if textures > 0 || framebuffers > 0 {
            log::warn!(
                "Graphics dropped with {textures} live textures and {framebuffers} live framebuffers"
            );
        }
    }
}

/// Pixel sizes must be positive and small enough for power-of-two rounding.
fn check_size(width: i32, height: i32) -> Result<()> {
    if width <= 0 || height <= 0 || width >= 0x10000 || height >= 0x10000 {
        return Err(RenderError::InvalidTextureSize { width, height });
    }
    Ok(())
}

/// Only nearest-mipmap variants: trilinear filtering costs more than it
/// shows in 2D.
fn mipmapify(filter: u32, mipmaps: bool) -> u32 {
    if !mipmaps {
        return filter;
    }
    match filter {
        consts::NEAREST => consts::NEAREST_MIPMAP_NEAREST,
        consts::LINEAR => consts::LINEAR_MIPMAP_NEAREST,
        other => other,
    }
}

fn wrap(repeat: bool) -> u32 {
    if repeat { consts::REPEAT } else { consts::CLAMP_TO_EDGE }
}
