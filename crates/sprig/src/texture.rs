//! # Texture — reference-counted GPU images and tiles
//!
//! A [`Texture`] is a cheap, clonable handle to one GL texture object. Clones
//! share the same GPU image. There are two lifecycles:
//!
//! - **managed** textures count [`reference`](Texture::reference) /
//!   [`release`](Texture::release) calls and delete the GL object when the
//!   count returns to zero;
//! - **unmanaged** textures ignore the count; the owner calls
//!   [`close`](Texture::close).
//!
//! Either way, dropping the last handle to a texture that was never closed
//! deletes it, so GPU memory never outlives the Rust value.
//!
//! A [`Tile`] is the whole texture or a rectangular region of it, in display
//! units. Tiles are what surfaces draw.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use image::RgbaImage;
use image::imageops::{self, FilterType};

use crate::batch::QuadBatch;
use crate::error::{RenderError, Result};
use crate::gl::{Gl, TextureId, check_gl_error, consts};
use crate::graphics::GpuRegistry;
use crate::math::{Affine2, Rect};
use crate::scale::Scale;

/// Creation-time texture settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureConfig {
    /// Whether `reference`/`release` govern the texture's lifetime.
    pub managed: bool,
    pub repeat_x: bool,
    pub repeat_y: bool,
    /// `GL_LINEAR` or `GL_NEAREST`.
    pub min_filter: u32,
    pub mag_filter: u32,
    pub mipmaps: bool,
}

impl TextureConfig {
    /// Managed, linear filtering, no repeat, no mipmaps.
    pub const DEFAULT: Self = Self {
        managed: true,
        repeat_x: false,
        repeat_y: false,
        min_filter: consts::LINEAR,
        mag_filter: consts::LINEAR,
        mipmaps: false,
    };

    /// Like [`DEFAULT`](Self::DEFAULT) but unmanaged.
    pub const UNMANAGED: Self = Self {
        managed: false,
        ..Self::DEFAULT
    };

    pub fn repeat(self, repeat_x: bool, repeat_y: bool) -> Self {
        Self {
            repeat_x,
            repeat_y,
            ..self
        }
    }

    /// `source_width`, rounded up to a power of two if repeating on x or
    /// mipmapping.
    pub fn to_tex_width(&self, source_width: i32) -> i32 {
        if self.repeat_x || self.mipmaps {
            pot_or_same(source_width)
        } else {
            source_width
        }
    }

    pub fn to_tex_height(&self, source_height: i32) -> i32 {
        if self.repeat_y || self.mipmaps {
            pot_or_same(source_height)
        } else {
            source_height
        }
    }

    /// True if uploads may need a CPU-side rescale.
    pub fn needs_pot(&self) -> bool {
        self.repeat_x || self.repeat_y || self.mipmaps
    }
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for TextureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rx = if self.repeat_x { "x" } else { "" };
        let ry = if self.repeat_y { "y" } else { "" };
        write!(
            f,
            "[managed={}, repeat={rx}{ry}, filter={:#x}/{:#x}, mipmaps={}]",
            self.managed, self.min_filter, self.mag_filter, self.mipmaps
        )
    }
}

/// The next power of two strictly above `value`, or 0 if `value` already is
/// one (or is zero). `value` must be below `0x10000`.
pub fn next_pot(value: u32) -> u32 {
    assert!(value < 0x10000, "next_pot: {value} out of range");
    if value.count_ones() > 1 {
        1 << (32 - value.leading_zeros())
    } else {
        0
    }
}

fn pot_or_same(value: i32) -> i32 {
    match next_pot(value.max(0) as u32) {
        0 => value,
        pot => pot as i32,
    }
}

struct TextureInner {
    gl: Rc<dyn Gl>,
    id: TextureId,
    config: TextureConfig,
    pixel_width: i32,
    pixel_height: i32,
    scale: Scale,
    display_width: f32,
    display_height: f32,
    check_errors: bool,
    refs: Cell<u32>,
    disposed: Cell<bool>,
    registry: Option<Rc<GpuRegistry>>,
}

impl TextureInner {
    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.gl.delete_texture(self.id);
        if let Some(registry) = &self.registry {
            registry.texture_deleted();
        }
        log::debug!("deleted texture {}", self.id.raw());
    }
}

impl Drop for TextureInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Handle to a GL texture. Clones share the texture.
#[derive(Clone)]
pub struct Texture(Rc<TextureInner>);

impl Texture {
    /// Wraps an existing GL texture of `pixel_size` at `scale`. The handle
    /// takes ownership of the GL object.
    pub fn from_parts(
        gl: Rc<dyn Gl>,
        id: TextureId,
        config: TextureConfig,
        pixel_size: (i32, i32),
        scale: Scale,
    ) -> Self {
        let display_size = (
            scale.inv_scaled(pixel_size.0 as f32),
            scale.inv_scaled(pixel_size.1 as f32),
        );
        Self::build(gl, id, config, pixel_size, scale, display_size, false, None)
    }

    /// `display_size` may be smaller than `pixel_size / scale` when the
    /// pixel size was rounded up to a power of two.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn build(
        gl: Rc<dyn Gl>,
        id: TextureId,
        config: TextureConfig,
        (pixel_width, pixel_height): (i32, i32),
        scale: Scale,
        (display_width, display_height): (f32, f32),
        check_errors: bool,
        registry: Option<Rc<GpuRegistry>>,
    ) -> Self {
        if let Some(registry) = &registry {
            registry.texture_created();
        }
        Self(Rc::new(TextureInner {
            gl,
            id,
            config,
            pixel_width,
            pixel_height,
            scale,
            display_width,
            display_height,
            check_errors,
            refs: Cell::new(0),
            disposed: Cell::new(false),
            registry,
        }))
    }

    /// The GL handle. Panics once the texture is disposed.
    pub fn id(&self) -> TextureId {
        if self.0.disposed.get() {
            panic!("Texture {}: used after dispose", self.0.id.raw());
        }
        self.0.id
    }

    pub fn try_id(&self) -> Result<TextureId> {
        if self.0.disposed.get() {
            Err(RenderError::TextureDisposed)
        } else {
            Ok(self.0.id)
        }
    }

    pub fn config(&self) -> &TextureConfig {
        &self.0.config
    }

    pub fn pixel_width(&self) -> i32 {
        self.0.pixel_width
    }

    pub fn pixel_height(&self) -> i32 {
        self.0.pixel_height
    }

    pub fn display_width(&self) -> f32 {
        self.0.display_width
    }

    pub fn display_height(&self) -> f32 {
        self.0.display_height
    }

    pub fn scale(&self) -> Scale {
        self.0.scale
    }

    pub fn ref_count(&self) -> u32 {
        self.0.refs.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// True if both handles point at the same texture.
    pub fn ptr_eq(&self, other: &Texture) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Adds a reference. No-op for unmanaged textures.
    pub fn reference(&self) {
        if self.0.config.managed {
            self.0.refs.set(self.0.refs.get() + 1);
        }
    }

    /// Drops a reference, disposing the texture when none remain. No-op for
    /// unmanaged textures. Panics if a managed texture has no references.
    pub fn release(&self) {
        if !self.0.config.managed {
            return;
        }
        let refs = self.0.refs.get();
        assert!(
            refs > 0,
            "Texture {}: released a texture with no references",
            self.0.id.raw()
        );
        self.0.refs.set(refs - 1);
        if refs == 1 {
            self.close();
        }
    }

    /// Deletes the GL texture. Later calls do nothing.
    pub fn close(&self) {
        self.0.dispose();
    }

    /// Re-uploads the texture from `image`.
    ///
    /// The image must be the texture's source size: the pixel size itself,
    /// or a size that rounds up to it when the config needs powers of two.
    /// In the latter case the image is rescaled on the CPU first. On error
    /// the previous contents are untouched.
    pub fn update(&self, image: &RgbaImage) -> Result<()> {
        let id = self.try_id()?;
        let (w, h) = image.dimensions();
        let config = &self.0.config;
        let (pw, ph) = (self.0.pixel_width, self.0.pixel_height);
        if w == 0 || h == 0 || w >= 0x10000 || h >= 0x10000 {
            return Err(RenderError::ImageSizeMismatch {
                expected: (pw as u32, ph as u32),
                actual: (w, h),
            });
        }
        if config.to_tex_width(w as i32) != pw || config.to_tex_height(h as i32) != ph {
            return Err(RenderError::ImageSizeMismatch {
                expected: (pw as u32, ph as u32),
                actual: (w, h),
            });
        }

        if (w as i32, h as i32) != (pw, ph) {
            let scaled = imageops::resize(image, pw as u32, ph as u32, FilterType::Triangle);
            self.upload(id, &scaled);
        } else {
            self.upload(id, image);
        }
        Ok(())
    }

    /// Re-uploads from tightly packed RGBA bytes.
    pub fn update_pixels(&self, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(RenderError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            });
        }
        let image = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or(
            RenderError::InvalidPixelData {
                expected,
                actual: pixels.len(),
            },
        )?;
        self.update(&image)
    }

    fn upload(&self, id: TextureId, image: &RgbaImage) {
        let gl = &self.0.gl;
        gl.bind_texture(consts::TEXTURE_2D, Some(id));
        gl.tex_image_2d(
            consts::TEXTURE_2D,
            0,
            consts::RGBA as i32,
            image.width() as i32,
            image.height() as i32,
            consts::RGBA,
            consts::UNSIGNED_BYTE,
            Some(image.as_raw().as_slice()),
        );
        if self.0.config.mipmaps {
            gl.generate_mipmap(consts::TEXTURE_2D);
        }
        check_gl_error(&**gl, self.0.check_errors, "Texture update");
    }

    /// The whole texture as a tile.
    pub fn to_tile(&self) -> Tile {
        Tile::Full(self.clone())
    }

    /// A sub-region in display units. Shares this texture.
    pub fn tile(&self, x: f32, y: f32, width: f32, height: f32) -> Tile {
        Tile::Region {
            texture: self.clone(),
            rect: Rect::new(x, y, width, height),
        }
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = &self.0;
        write!(
            f,
            "Texture[id={}, psize={}x{}, dsize={}x{} @ {}, config={}]",
            t.id.raw(),
            t.pixel_width,
            t.pixel_height,
            t.display_width,
            t.display_height,
            t.scale,
            t.config
        )
    }
}

/// Something that can eventually provide a [`Tile`], such as an image that
/// is still decoding.
pub trait TileSource {
    fn is_loaded(&self) -> bool;

    /// The tile, once loaded.
    fn tile(&self) -> Option<Tile>;
}

impl TileSource for Texture {
    fn is_loaded(&self) -> bool {
        !self.is_disposed()
    }

    fn tile(&self) -> Option<Tile> {
        Some(self.to_tile())
    }
}

/// A drawable region of a texture.
#[derive(Debug, Clone)]
pub enum Tile {
    Full(Texture),
    /// `rect` is in the texture's display units.
    Region { texture: Texture, rect: Rect },
}

impl Tile {
    pub fn texture(&self) -> &Texture {
        match self {
            Tile::Full(texture) | Tile::Region { texture, .. } => texture,
        }
    }

    /// Width in display units.
    pub fn width(&self) -> f32 {
        match self {
            Tile::Full(t) => t.display_width(),
            Tile::Region { rect, .. } => rect.w,
        }
    }

    pub fn height(&self) -> f32 {
        match self {
            Tile::Full(t) => t.display_height(),
            Tile::Region { rect, .. } => rect.h,
        }
    }

    /// Left texture coordinate.
    pub fn sx(&self) -> f32 {
        match self {
            Tile::Full(_) => 0.0,
            Tile::Region { texture, rect } => rect.x / texture.display_width(),
        }
    }

    /// Top texture coordinate.
    pub fn sy(&self) -> f32 {
        match self {
            Tile::Full(_) => 0.0,
            Tile::Region { texture, rect } => rect.y / texture.display_height(),
        }
    }

    /// Right texture coordinate.
    pub fn tx(&self) -> f32 {
        match self {
            Tile::Full(_) => 1.0,
            Tile::Region { texture, rect } => rect.right() / texture.display_width(),
        }
    }

    /// Bottom texture coordinate.
    pub fn ty(&self) -> f32 {
        match self {
            Tile::Full(_) => 1.0,
            Tile::Region { texture, rect } => rect.bottom() / texture.display_height(),
        }
    }

    /// A region of this tile, relative to its top-left corner.
    pub fn sub_tile(&self, x: f32, y: f32, width: f32, height: f32) -> Tile {
        let (ox, oy) = match self {
            Tile::Full(_) => (0.0, 0.0),
            Tile::Region { rect, .. } => (rect.x, rect.y),
        };
        Tile::Region {
            texture: self.texture().clone(),
            rect: Rect::new(ox + x, oy + y, width, height),
        }
    }
}

impl TileSource for Tile {
    fn is_loaded(&self) -> bool {
        true
    }

    fn tile(&self) -> Option<Tile> {
        Some(self.clone())
    }
}

/// Adds `tile` to `batch`, stretched over `(x, y, w, h)`.
#[allow(clippy::too_many_arguments)]
pub fn add_to_batch(
    tile: &Tile,
    batch: &mut dyn QuadBatch,
    tint: u32,
    xf: &Affine2,
    x: f32,
    y: f32,
    w: f32,
    h: f32,
) {
    match tile {
        Tile::Full(texture) => batch.add_texture_quad(texture, tint, xf, x, y, w, h),
        Tile::Region { texture, rect } => {
            batch.add_texture_region(texture, tint, xf, x, y, w, h, rect.x, rect.y, rect.w, rect.h)
        }
    }
}

/// Adds the `(sx, sy, sw, sh)` part of `tile` (relative to the tile, in
/// display units) to `batch` at `(dx, dy, dw, dh)`.
#[allow(clippy::too_many_arguments)]
pub fn add_region_to_batch(
    tile: &Tile,
    batch: &mut dyn QuadBatch,
    tint: u32,
    xf: &Affine2,
    dx: f32,
    dy: f32,
    dw: f32,
    dh: f32,
    sx: f32,
    sy: f32,
    sw: f32,
    sh: f32,
) {
    match tile {
        Tile::Full(texture) => {
            batch.add_texture_region(texture, tint, xf, dx, dy, dw, dh, sx, sy, sw, sh)
        }
        Tile::Region { texture, rect } => batch.add_texture_region(
            texture,
            tint,
            xf,
            dx,
            dy,
            dw,
            dh,
            rect.x + sx,
            rect.y + sy,
            sw,
            sh,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingGl};

    fn recorder() -> (Rc<RecordingGl>, Rc<dyn Gl>) {
        let rec = Rc::new(RecordingGl::new());
        let gl: Rc<dyn Gl> = rec.clone();
        (rec, gl)
    }

    fn texture(gl: &Rc<dyn Gl>, config: TextureConfig, w: i32, h: i32) -> Texture {
        Texture::from_parts(gl.clone(), gl.create_texture().unwrap(), config, (w, h), Scale::ONE)
    }

    #[test]
    fn next_pot_values() {
        assert_eq!(next_pot(0), 0);
        assert_eq!(next_pot(1), 0);
        assert_eq!(next_pot(3), 4);
        assert_eq!(next_pot(64), 0);
        assert_eq!(next_pot(65), 128);
        assert_eq!(next_pot(0x8001), 0x10000);
        assert_eq!(next_pot(0xFFFF), 0x10000);
    }

    #[test]
    fn next_pot_is_smallest_greater_power() {
        for x in 1u32..0x10000 {
            let p = next_pot(x);
            if x.is_power_of_two() {
                assert_eq!(p, 0, "{x} is already a power of two");
            } else {
                assert!(p.is_power_of_two() && p > x && p / 2 < x, "next_pot({x}) = {p}");
            }
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn next_pot_rejects_large() {
        next_pot(0x10000);
    }

    #[test]
    fn tex_size_rounds_only_when_needed() {
        let plain = TextureConfig::DEFAULT;
        assert_eq!(plain.to_tex_width(100), 100);
        let rx = plain.repeat(true, false);
        assert_eq!(rx.to_tex_width(100), 128);
        assert_eq!(rx.to_tex_height(100), 100);
        assert_eq!(rx.to_tex_width(64), 64);
        let mip = TextureConfig { mipmaps: true, ..plain };
        assert_eq!(mip.to_tex_height(33), 64);
    }

    #[test]
    fn released_exactly_at_last_reference() {
        let (rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::DEFAULT, 8, 8);
        let id = tex.id();
        for _ in 0..3 {
            tex.reference();
        }
        tex.release();
        tex.release();
        assert!(!tex.is_disposed());
        assert!(rec.is_texture_live(id));
        tex.release();
        assert!(tex.is_disposed());
        assert!(!rec.is_texture_live(id));
        assert_eq!(rec.count_calls(|c| matches!(c, GlCall::DeleteTexture(_))), 1);
    }

    #[test]
    #[should_panic(expected = "released a texture with no references")]
    fn double_release_panics() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::DEFAULT, 8, 8);
        tex.reference();
        tex.release();
        tex.release();
    }

    #[test]
    #[should_panic(expected = "used after dispose")]
    fn use_after_release_panics() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::DEFAULT, 8, 8);
        tex.reference();
        tex.release();
        let _ = tex.id();
    }

    #[test]
    fn unmanaged_ignores_counting() {
        let (rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 8, 8);
        tex.release();
        tex.reference();
        assert_eq!(tex.ref_count(), 0);
        assert!(!tex.is_disposed());
        tex.close();
        tex.close();
        assert!(tex.is_disposed());
        assert_eq!(rec.live_textures(), 0);
        assert!(matches!(tex.try_id(), Err(RenderError::TextureDisposed)));
    }

    #[test]
    fn dropping_last_handle_deletes() {
        let (rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 8, 8);
        let tile = tex.tile(0.0, 0.0, 4.0, 4.0);
        drop(tex);
        assert_eq!(rec.live_textures(), 1, "the tile still holds the texture");
        drop(tile);
        assert_eq!(rec.live_textures(), 0);
    }

    #[test]
    fn update_uploads_and_rejects_wrong_size() {
        let (rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 4, 2);
        tex.update(&RgbaImage::new(4, 2)).unwrap();
        assert!(rec.calls().contains(&GlCall::TexImage2D {
            width: 4,
            height: 2,
            format: consts::RGBA,
            len: Some(32),
        }));

        let err = tex.update(&RgbaImage::new(3, 2)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::ImageSizeMismatch { expected: (4, 2), actual: (3, 2) }
        ));
    }

    #[test]
    fn update_rejects_oversized_and_empty_images() {
        let (rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED.repeat(true, false), 64, 4);
        rec.take_calls();
        assert!(matches!(
            tex.update(&RgbaImage::new(70_000, 1)),
            Err(RenderError::ImageSizeMismatch { expected: (64, 4), actual: (70_000, 1) })
        ));
        assert!(matches!(
            tex.update_pixels(0, 4, &[]),
            Err(RenderError::ImageSizeMismatch { actual: (0, 4), .. })
        ));
        assert!(rec.calls().is_empty(), "nothing uploaded");
    }

    #[test]
    fn update_rescales_to_pot() {
        let (rec, gl) = recorder();
        let config = TextureConfig {
            mipmaps: true,
            ..TextureConfig::UNMANAGED
        };
        let tex = texture(&gl, config, 8, 4);
        tex.update(&RgbaImage::new(5, 3)).unwrap();
        assert!(rec.calls().contains(&GlCall::TexImage2D {
            width: 8,
            height: 4,
            format: consts::RGBA,
            len: Some(8 * 4 * 4),
        }));
        assert!(rec.calls().contains(&GlCall::GenerateMipmap(consts::TEXTURE_2D)));
    }

    #[test]
    fn update_pixels_validates_length() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 2, 2);
        assert!(tex.update_pixels(2, 2, &[0; 16]).is_ok());
        assert!(matches!(
            tex.update_pixels(2, 2, &[0; 15]),
            Err(RenderError::InvalidPixelData { expected: 16, actual: 15 })
        ));
    }

    #[test]
    fn update_after_close_fails() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 2, 2);
        tex.close();
        assert!(matches!(tex.update(&RgbaImage::new(2, 2)), Err(RenderError::TextureDisposed)));
    }

    #[test]
    fn tile_coordinates_are_proportional() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 200, 100);
        let tile = tex.tile(50.0, 25.0, 100.0, 50.0);
        assert_eq!(tile.width(), 100.0);
        assert_eq!(tile.height(), 50.0);
        assert_eq!(tile.sx(), 0.25);
        assert_eq!(tile.sy(), 0.25);
        assert_eq!(tile.tx(), 0.75);
        assert_eq!(tile.ty(), 0.75);

        let full = tex.to_tile();
        assert_eq!((full.sx(), full.sy(), full.tx(), full.ty()), (0.0, 0.0, 1.0, 1.0));
        assert_eq!(full.width(), 200.0);
    }

    #[test]
    fn sub_tile_offsets_accumulate() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl, TextureConfig::UNMANAGED, 100, 100);
        let sub = tex.tile(10.0, 20.0, 50.0, 50.0).sub_tile(5.0, 5.0, 10.0, 10.0);
        let Tile::Region { rect, .. } = &sub else {
            panic!("expected a region");
        };
        assert_eq!(*rect, Rect::new(15.0, 25.0, 10.0, 10.0));
        assert!(sub.texture().ptr_eq(&tex));
    }

    #[test]
    fn display_size_follows_scale() {
        let (_rec, gl) = recorder();
        let tex = Texture::from_parts(
            gl.clone(),
            gl.create_texture().unwrap(),
            TextureConfig::DEFAULT,
            (64, 32),
            Scale::new(2.0),
        );
        assert_eq!(tex.display_width(), 32.0);
        assert_eq!(tex.display_height(), 16.0);
        let dbg = format!("{tex:?}");
        assert!(dbg.contains("psize=64x32"), "{dbg}");
        assert!(dbg.contains("@ x2"), "{dbg}");
    }
}
