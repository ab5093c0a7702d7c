//! # Surface — the drawing API
//!
//! A [`Surface`] draws into one [`RenderTarget`] through a [`QuadBatch`]. It
//! keeps the state a frame of drawing needs:
//!
//! - a **transform stack**. The bottom entry is the target's pixel scale, so
//!   callers work in display units. `save_tx`/`restore_tx` bracket changes.
//! - a **clip stack** of scissor boxes in target pixels with the origin at the
//!   top left. Each box is the intersection of the requested rectangle with
//!   its parent. The GL scissor box is derived from the top of the stack,
//!   flipped for targets that flip y.
//! - a **tint** multiplied into everything drawn, and a **fill** that is
//!   either a solid color or a pattern texture.
//!
//! Drawing goes between [`begin`](Surface::begin) and [`end`](Surface::end).
//! Transform, tint and fill setters work at any time.
//!
//! ```text
//!   surf.begin();
//!   surf.save_tx().translate(10.0, 10.0).rotate(0.3);
//!   surf.set_fill_color(0xFF336699).fill_rect(0.0, 0.0, 40.0, 20.0);
//!   surf.restore_tx();
//!   surf.end();
//! ```

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::batch::{Batch, QuadBatch, SharedBatch};
use crate::error::Result;
use crate::gl::{Gl, check_gl_error, consts};
use crate::graphics::Graphics;
use crate::math::{Affine2, IRect, Rect, Vec2};
use crate::render_target::RenderTarget;
use crate::stats::RenderStats;
use crate::texture::{self, Texture, Tile};
use crate::tint::{self, NOOP_TINT};

pub struct Surface {
    gl: Rc<dyn Gl>,
    target: RenderTarget,
    batch: SharedBatch,
    color_tex: Texture,
    stats: Rc<RenderStats>,
    check_errors: bool,
    check_intersection: bool,
    transforms: Vec<Affine2>,
    scissors: Vec<IRect>,
    tint: u32,
    fill_color: u32,
    pattern: Option<Texture>,
}

impl Surface {
    /// A surface rendering to `target` with `batch` as its quad batch.
    pub fn new(gfx: &Graphics, target: RenderTarget, batch: SharedBatch) -> Result<Self> {
        let base = Affine2::from_scale(Vec2::new(target.xscale(), target.yscale()));
        Ok(Self {
            gl: gfx.gl().clone(),
            color_tex: gfx.color_tex()?,
            stats: gfx.stats().clone(),
            check_errors: gfx.config().check_errors,
            check_intersection: gfx.config().check_intersection,
            target,
            batch,
            transforms: vec![base],
            scissors: Vec::new(),
            tint: NOOP_TINT,
            fill_color: 0,
            pattern: None,
        })
    }

    /// Skip [`draw`](Self::draw) calls whose bounds miss the visible area.
    /// Pays off when many draws are entirely off screen.
    pub fn set_check_intersection(&mut self, check: bool) -> &mut Self {
        self.check_intersection = check;
        self
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn batch(&self) -> &SharedBatch {
        &self.batch
    }

    /// Binds the target and begins the batch.
    pub fn begin(&mut self) -> &mut Self {
        self.target.bind();
        self.begin_batch();
        self
    }

    /// Ends the batch, flushing whatever is pending.
    pub fn end(&mut self) -> &mut Self {
        self.batch.borrow_mut().end();
        self
    }

    /// Switches to `batch` mid-frame, ending the current one first. Returns
    /// the previous batch for [`pop_batch`](Self::pop_batch).
    pub fn push_batch(&mut self, batch: SharedBatch) -> SharedBatch {
        self.batch.borrow_mut().end();
        let old = std::mem::replace(&mut self.batch, batch);
        self.begin_batch();
        old
    }

    /// Ends the pushed batch and resumes `old`.
    pub fn pop_batch(&mut self, old: SharedBatch) {
        self.batch.borrow_mut().end();
        self.batch = old;
        self.begin_batch();
    }

    fn begin_batch(&self) {
        self.batch.borrow_mut().begin(
            self.target.width() as f32,
            self.target.height() as f32,
            self.target.flip(),
        );
    }

    // -- transform stack --------------------------------------------------

    /// The current transform.
    pub fn tx(&self) -> &Affine2 {
        // The stack never drops below its base entry.
        &self.transforms[self.transforms.len() - 1]
    }

    fn tx_mut(&mut self) -> &mut Affine2 {
        let top = self.transforms.len() - 1;
        &mut self.transforms[top]
    }

    pub fn save_tx(&mut self) -> &mut Self {
        let top = *self.tx();
        self.transforms.push(top);
        self
    }

    /// Panics if there is no matching [`save_tx`](Self::save_tx).
    pub fn restore_tx(&mut self) -> &mut Self {
        assert!(self.transforms.len() > 1, "Surface: unbalanced save/restore");
        self.transforms.pop();
        self
    }

    /// Number of saved transforms plus the base.
    pub fn tx_depth(&self) -> usize {
        self.transforms.len()
    }

    pub fn translate(&mut self, x: f32, y: f32) -> &mut Self {
        self.concat(Affine2::from_translation(Vec2::new(x, y)))
    }

    pub fn scale(&mut self, sx: f32, sy: f32) -> &mut Self {
        self.concat(Affine2::from_scale(Vec2::new(sx, sy)))
    }

    /// Rotates by `angle` radians.
    pub fn rotate(&mut self, angle: f32) -> &mut Self {
        let (sin, cos) = angle.sin_cos();
        self.transform(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Multiplies the current transform by the given matrix.
    pub fn transform(&mut self, m00: f32, m01: f32, m10: f32, m11: f32, tx: f32, ty: f32) -> &mut Self {
        self.concat(Affine2::from_cols_array(&[m00, m01, m10, m11, tx, ty]))
    }

    /// Applies `xf` with its origin at `(origin_x, origin_y)`.
    pub fn concatenate(&mut self, xf: &Affine2, origin_x: f32, origin_y: f32) -> &mut Self {
        self.concat(*xf);
        if origin_x != 0.0 || origin_y != 0.0 {
            self.translate(-origin_x, -origin_y);
        }
        self
    }

    /// Applies `xf` after the current transform, in target space.
    pub fn pre_concatenate(&mut self, xf: &Affine2) -> &mut Self {
        let top = self.tx_mut();
        *top = *xf * *top;
        self
    }

    fn concat(&mut self, xf: Affine2) -> &mut Self {
        let top = self.tx_mut();
        *top = *top * xf;
        self
    }

    // -- clipping ---------------------------------------------------------

    /// Clips drawing to `(x, y, width, height)` in target pixels, origin top
    /// left, intersected with any enclosing clip.
    ///
    /// Returns false if nothing is visible. Callers may skip their drawing
    /// then, but must still call [`end_clipped`](Self::end_clipped).
    pub fn start_clipped(&mut self, x: i32, y: i32, width: i32, height: i32) -> bool {
        self.batch.borrow_mut().flush();
        let parent = self
            .scissors
            .last()
            .copied()
            .unwrap_or_else(|| IRect::new(0, 0, self.target.width(), self.target.height()));
        let r = parent.intersection(&IRect::new(x, y, width, height));
        self.scissors.push(r);
        self.apply_scissor(&r);
        if self.scissors.len() == 1 {
            self.gl.enable(consts::SCISSOR_TEST);
        }
        self.stats.record_clip();
        check_gl_error(&*self.gl, self.check_errors, "Surface start_clipped");
        !r.is_empty()
    }

    /// Flushes the clipped draws and restores the enclosing clip, or turns
    /// clipping off at the outermost level.
    pub fn end_clipped(&mut self) {
        assert!(!self.scissors.is_empty(), "Surface: end_clipped() without start_clipped()");
        self.batch.borrow_mut().flush();
        self.scissors.pop();
        match self.scissors.last().copied() {
            Some(r) => self.apply_scissor(&r),
            None => self.gl.disable(consts::SCISSOR_TEST),
        }
        check_gl_error(&*self.gl, self.check_errors, "Surface end_clipped");
    }

    /// The active clip in target pixels (origin top left), if any.
    pub fn scissor(&self) -> Option<IRect> {
        self.scissors.last().copied()
    }

    pub fn clip_depth(&self) -> usize {
        self.scissors.len()
    }

    fn apply_scissor(&self, r: &IRect) {
        let y = if self.target.flip() {
            self.target.height() - r.y - r.h
        } else {
            r.y
        };
        self.gl.scissor(r.x, y, r.w, r.h);
    }

    /// True if `(x, y, w, h)` under the current transform overlaps the active
    /// clip, or the whole target when nothing is clipped.
    pub fn intersects(&self, x: f32, y: f32, w: f32, h: f32) -> bool {
        let bounds = Rect::new(x, y, w, h).transformed_bounds(self.tx());
        let visible = match self.scissors.last() {
            Some(s) => Rect::new(s.x as f32, s.y as f32, s.w as f32, s.h as f32),
            None => Rect::new(0.0, 0.0, self.target.width() as f32, self.target.height() as f32),
        };
        bounds.intersects(&visible)
    }

    // -- tint and fill ----------------------------------------------------

    pub fn alpha(&self) -> f32 {
        tint::alpha(self.tint)
    }

    /// Replaces the alpha of the current tint, clamped to `[0, 1]`.
    pub fn set_alpha(&mut self, alpha: f32) -> &mut Self {
        self.tint = tint::set_alpha(self.tint, alpha);
        self
    }

    pub fn tint(&self) -> u32 {
        self.tint
    }

    /// Replaces the whole tint, alpha included.
    pub fn set_tint(&mut self, tint: u32) -> &mut Self {
        self.tint = tint;
        self
    }

    /// Multiplies `tint` into the current tint and returns the previous one,
    /// for restoring with [`set_tint`](Self::set_tint).
    pub fn combine_tint(&mut self, tint: u32) -> u32 {
        let prev = self.tint;
        if tint != NOOP_TINT {
            self.tint = tint::combine(tint, prev);
        }
        prev
    }

    pub fn fill_color(&self) -> u32 {
        self.fill_color
    }

    /// Fills with a solid ARGB color from now on. Clears any pattern.
    pub fn set_fill_color(&mut self, color: u32) -> &mut Self {
        self.fill_color = color;
        self.pattern = None;
        self
    }

    /// Fills with `texture` from now on. Replaces the fill color.
    pub fn set_fill_pattern(&mut self, texture: &Texture) -> &mut Self {
        self.pattern = Some(texture.clone());
        self
    }

    pub fn fill_pattern(&self) -> Option<&Texture> {
        self.pattern.as_ref()
    }

    // -- drawing ----------------------------------------------------------

    /// Clears the whole target to `(r, g, b, a)`, ignoring clip and tint.
    pub fn clear(&mut self, r: f32, g: f32, b: f32, a: f32) -> &mut Self {
        self.gl.clear_color(r, g, b, a);
        self.gl.clear(consts::COLOR_BUFFER_BIT);
        self
    }

    /// Draws `tile` at its own size.
    pub fn draw(&mut self, tile: &Tile, x: f32, y: f32) -> &mut Self {
        self.draw_sized(tile, x, y, tile.width(), tile.height())
    }

    /// Draws `tile` stretched over `(x, y, w, h)`.
    pub fn draw_sized(&mut self, tile: &Tile, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        self.draw_tinted(tile, self.tint, x, y, w, h)
    }

    /// Like [`draw_sized`](Self::draw_sized) with `tint` in place of the
    /// surface tint.
    pub fn draw_tinted(&mut self, tile: &Tile, tint: u32, x: f32, y: f32, w: f32, h: f32) -> &mut Self {
        if !self.check_intersection || self.intersects(x, y, w, h) {
            let xf = *self.tx();
            let mut batch = self.batch.borrow_mut();
            texture::add_to_batch(tile, &mut *batch, tint, &xf, x, y, w, h);
        }
        self
    }

    /// Draws the `(sx, sy, sw, sh)` part of `tile` at `(dx, dy, dw, dh)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_region(
        &mut self,
        tile: &Tile,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
    ) -> &mut Self {
        self.draw_region_tinted(tile, self.tint, dx, dy, dw, dh, sx, sy, sw, sh)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn draw_region_tinted(
        &mut self,
        tile: &Tile,
        tint: u32,
        dx: f32,
        dy: f32,
        dw: f32,
        dh: f32,
        sx: f32,
        sy: f32,
        sw: f32,
        sh: f32,
    ) -> &mut Self {
        if !self.check_intersection || self.intersects(dx, dy, dw, dh) {
            let xf = *self.tx();
            let mut batch = self.batch.borrow_mut();
            texture::add_region_to_batch(tile, &mut *batch, tint, &xf, dx, dy, dw, dh, sx, sy, sw, sh);
        }
        self
    }

    /// Draws `tile` centered on `(x, y)`.
    pub fn draw_centered(&mut self, tile: &Tile, x: f32, y: f32) -> &mut Self {
        self.draw(tile, x - tile.width() / 2.0, y - tile.height() / 2.0)
    }

    /// Fills a `width` thick line from `(x0, y0)` to `(x1, y1)` with the
    /// current fill. A zero-length line draws nothing.
    pub fn draw_line(&mut self, x0: f32, y0: f32, x1: f32, y1: f32, width: f32) -> &mut Self {
        let (a, b) = if x1 < x0 {
            (Vec2::new(x1, y1), Vec2::new(x0, y0))
        } else {
            (Vec2::new(x0, y0), Vec2::new(x1, y1))
        };
        let d = b - a;
        let length = d.length();
        if length == 0.0 {
            return self;
        }
        // Offset the start by half the width along the left normal so the
        // quad straddles the segment.
        let w = d * (width / 2.0) / length;
        let line = Affine2::from_angle_translation(d.y.atan2(d.x), Vec2::new(a.x + w.y, a.y - w.x));
        let xf = *self.tx() * line;
        self.fill_quad(&xf, 0.0, 0.0, length, width);
        self
    }

    /// Fills `(x, y, width, height)` with the current fill.
    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32) -> &mut Self {
        let xf = *self.tx();
        self.fill_quad(&xf, x, y, width, height);
        self
    }

    fn fill_quad(&self, xf: &Affine2, x: f32, y: f32, w: f32, h: f32) {
        let mut batch = self.batch.borrow_mut();
        match &self.pattern {
            Some(pattern) => batch.add_texture_quad(pattern, self.tint, xf, x, y, w, h),
            None => {
                let tint = tint::combine(self.fill_color, self.tint);
                batch.add_texture_quad(&self.color_tex, tint, xf, x, y, w, h);
            }
        }
    }
}

/// A [`Surface`] that renders into a texture.
///
/// The framebuffer belongs to the surface and is deleted by
/// [`close`](Self::close) or on drop. The batch and the texture are not
/// owned: the texture is neither referenced nor released here, whoever
/// displays it manages its lifetime.
pub struct TextureSurface {
    surface: Surface,
    texture: Texture,
}

impl TextureSurface {
    pub fn new(gfx: &Graphics, batch: SharedBatch, texture: Texture) -> Result<Self> {
        let target = gfx.create_render_target(&texture)?;
        Ok(Self {
            surface: Surface::new(gfx, target, batch)?,
            texture,
        })
    }

    /// The texture being rendered into.
    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    /// Deletes the framebuffer. Closing twice is harmless.
    pub fn close(&mut self) {
        self.surface.target.close();
    }
}

impl Deref for TextureSurface {
    type Target = Surface;

    fn deref(&self) -> &Surface {
        &self.surface
    }
}

impl DerefMut for TextureSurface {
    fn deref_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchState;
    use crate::config::RenderConfig;
    use crate::gl::{GlCall, RecordingGl};
    use crate::texture::TextureConfig;

    fn setup(scale: f32) -> (Rc<RecordingGl>, Graphics, SharedBatch) {
        let rec = Rc::new(RecordingGl::new());
        let config = RenderConfig {
            check_errors: true,
            scale_factor: scale,
            ..RenderConfig::default()
        };
        let mut gfx = Graphics::new(rec.clone(), config).unwrap();
        gfx.viewport_changed(200, 100);
        let batch = gfx.create_batch().unwrap();
        (rec, gfx, batch)
    }

    fn screen() -> (Rc<RecordingGl>, Graphics, Surface) {
        let (rec, gfx, batch) = setup(1.0);
        let surf = gfx.create_surface(batch).unwrap();
        (rec, gfx, surf)
    }

    /// The quad records uploaded by every flush, 12 floats each.
    fn uploaded_quads(rec: &RecordingGl) -> Vec<Vec<f32>> {
        rec.calls()
            .into_iter()
            .filter_map(|c| match c {
                GlCall::Uniform4fv { data, .. } => Some(data),
                _ => None,
            })
            .flat_map(|data| data.chunks(12).map(<[f32]>::to_vec).collect::<Vec<_>>())
            .collect()
    }

    fn bound_textures(rec: &RecordingGl) -> Vec<u32> {
        rec.calls()
            .into_iter()
            .filter_map(|c| match c {
                GlCall::BindTexture { texture: Some(t), .. } => Some(t.raw()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn base_transform_is_target_scale() {
        let (_rec, gfx, batch) = setup(2.0);
        let surf = gfx.create_surface(batch).unwrap();
        assert_eq!(*surf.tx(), Affine2::from_scale(Vec2::splat(2.0)));
        assert_eq!(surf.tx_depth(), 1);
    }

    #[test]
    fn restore_brings_back_exact_transform() {
        let (_rec, _gfx, mut surf) = screen();
        surf.translate(3.5, -1.25).rotate(0.3);
        let before = *surf.tx();
        surf.save_tx().rotate(1.1).scale(2.0, 0.5).translate(7.0, 9.0);
        surf.save_tx().concatenate(&Affine2::from_angle(0.2), 4.0, 4.0);
        surf.restore_tx();
        surf.pre_concatenate(&Affine2::from_translation(Vec2::new(1.0, 1.0)));
        surf.restore_tx();
        assert_eq!(surf.tx().to_cols_array(), before.to_cols_array(), "bit-for-bit");
    }

    #[test]
    #[should_panic(expected = "unbalanced save/restore")]
    fn restore_past_base_panics() {
        let (_rec, _gfx, mut surf) = screen();
        surf.save_tx();
        surf.restore_tx();
        surf.restore_tx();
    }

    #[test]
    fn transform_composition_order() {
        let (_rec, _gfx, mut surf) = screen();
        surf.translate(10.0, 0.0).scale(2.0, 2.0);
        assert_eq!(surf.tx().transform_point2(Vec2::new(1.0, 1.0)), Vec2::new(12.0, 2.0));

        surf.pre_concatenate(&Affine2::from_translation(Vec2::new(0.0, 5.0)));
        assert_eq!(surf.tx().transform_point2(Vec2::ZERO), Vec2::new(10.0, 5.0));

        let (_rec, _gfx, mut surf) = screen();
        surf.concatenate(&Affine2::from_scale(Vec2::splat(3.0)), 1.0, 1.0);
        assert_eq!(surf.tx().transform_point2(Vec2::new(1.0, 1.0)), Vec2::ZERO, "origin maps to 0");
    }

    #[test]
    fn nested_clips_restore_parent() {
        let (rec, gfx, batch) = setup(1.0);
        let mut surf = gfx.create_texture_surface(batch, 100.0, 100.0).unwrap();
        surf.begin();
        assert!(surf.start_clipped(10, 10, 50, 50));
        assert!(rec.is_enabled(consts::SCISSOR_TEST));
        assert!(surf.start_clipped(20, 20, 10, 10));
        assert_eq!(rec.current_scissor(), Some((20, 20, 10, 10)));

        surf.end_clipped();
        assert_eq!(surf.scissor(), Some(IRect::new(10, 10, 50, 50)));
        assert_eq!(rec.current_scissor(), Some((10, 10, 50, 50)));
        assert!(rec.is_enabled(consts::SCISSOR_TEST));

        surf.end_clipped();
        assert_eq!(surf.scissor(), None);
        assert!(!rec.is_enabled(consts::SCISSOR_TEST));
        assert_eq!(rec.count_calls(|c| *c == GlCall::Enable(consts::SCISSOR_TEST)), 1);
        surf.end();
    }

    #[test]
    fn screen_scissor_is_flipped() {
        let (rec, _gfx, mut surf) = screen();
        surf.begin();
        surf.start_clipped(10, 10, 50, 30);
        assert_eq!(surf.scissor(), Some(IRect::new(10, 10, 50, 30)));
        assert_eq!(rec.current_scissor(), Some((10, 100 - 10 - 30, 50, 30)));
        surf.end_clipped();
        surf.end();
    }

    #[test]
    fn clips_only_shrink() {
        let (_rec, _gfx, mut surf) = screen();
        surf.begin();
        let requests = [
            (-20, -20, 150, 90),
            (30, 5, 400, 40),
            (25, 20, 10, 100),
            (0, 0, 1000, 1000),
            (33, 21, 1, 1),
        ];
        let mut parents = vec![IRect::new(0, 0, 200, 100)];
        for (x, y, w, h) in requests {
            surf.start_clipped(x, y, w, h);
            let r = surf.scissor().unwrap();
            let parent = *parents.last().unwrap();
            assert!(r.is_empty() || parent.contains(&r), "{r:?} escapes {parent:?}");
            parents.push(r);
        }
        while surf.clip_depth() > 0 {
            parents.pop();
            surf.end_clipped();
            if surf.clip_depth() > 0 {
                assert_eq!(surf.scissor(), parents.last().copied());
            }
        }
        surf.end();
    }

    #[test]
    fn empty_clip_reports_false() {
        let (_rec, _gfx, mut surf) = screen();
        surf.begin();
        assert!(surf.start_clipped(0, 0, 50, 50));
        assert!(!surf.start_clipped(60, 60, 10, 10), "disjoint from parent");
        assert!(surf.scissor().unwrap().is_empty());
        surf.end_clipped();
        surf.end_clipped();
        assert!(!surf.start_clipped(300, 0, 10, 10), "off the target");
        surf.end_clipped();
        surf.end();
    }

    #[test]
    #[should_panic(expected = "end_clipped() without start_clipped()")]
    fn unmatched_end_clipped_panics() {
        let (_rec, _gfx, mut surf) = screen();
        surf.begin();
        surf.end_clipped();
    }

    #[test]
    fn clipping_flushes_pending_quads() {
        let (rec, _gfx, mut surf) = screen();
        surf.begin().set_fill_color(0xFFFFFFFF);
        surf.fill_rect(0.0, 0.0, 10.0, 10.0);
        surf.start_clipped(0, 0, 50, 50);
        assert_eq!(rec.draw_counts(), vec![6], "unclipped quad drawn before the scissor");
        surf.fill_rect(0.0, 0.0, 10.0, 10.0);
        surf.end_clipped();
        assert_eq!(rec.draw_counts(), vec![6, 6], "clipped quad drawn before the scissor is lifted");
        surf.end();
    }

    #[test]
    fn intersects_target_and_clip() {
        let (_rec, _gfx, mut surf) = screen();
        assert!(surf.intersects(10.0, 10.0, 5.0, 5.0));
        assert!(!surf.intersects(-10.0, 10.0, 5.0, 5.0));
        assert!(!surf.intersects(10.0, 100.0, 5.0, 5.0));

        surf.translate(-100.0, 0.0);
        assert!(!surf.intersects(10.0, 10.0, 5.0, 5.0));
        assert!(surf.intersects(150.0, 10.0, 5.0, 5.0));

        surf.begin();
        surf.start_clipped(150, 0, 10, 10);
        assert!(surf.intersects(252.0, 2.0, 2.0, 2.0));
        assert!(!surf.intersects(150.0, 2.0, 2.0, 2.0));
        surf.end_clipped();
        surf.end();
    }

    #[test]
    fn culled_draws_skip_the_batch() {
        let (rec, gfx, mut surf) = screen();
        let tex = gfx.create_texture(10.0, 10.0, TextureConfig::UNMANAGED).unwrap();
        surf.set_check_intersection(true).begin();
        surf.draw(&tex.to_tile(), 500.0, 500.0);
        surf.draw(&tex.to_tile(), 5.0, 5.0);
        surf.end();
        assert_eq!(rec.draw_counts(), vec![6], "only the visible tile is drawn");

        rec.take_calls();
        surf.set_check_intersection(false).begin();
        surf.draw(&tex.to_tile(), 500.0, 500.0);
        surf.end();
        assert_eq!(rec.draw_counts(), vec![6]);
    }

    #[test]
    fn fill_combines_color_with_tint() {
        let (rec, _gfx, mut surf) = screen();
        surf.begin();
        surf.set_fill_color(0xFF0000FF).set_alpha(0.5).fill_rect(0.0, 0.0, 100.0, 25.0);
        surf.end();
        let quads = uploaded_quads(&rec);
        let expected = tint::to_quad_floats(tint::combine(0xFF0000FF, surf.tint()));
        assert_eq!(&quads[0][10..12], &expected);
        assert_eq!(&quads[0][0..6], &[100.0, 0.0, 0.0, 25.0, 0.0, 0.0]);
    }

    #[test]
    fn fill_color_and_pattern_are_exclusive() {
        let (rec, gfx, mut surf) = screen();
        let pattern = gfx
            .create_texture(8.0, 8.0, TextureConfig::UNMANAGED.repeat(true, true))
            .unwrap();
        let white = gfx.color_tex().unwrap();

        surf.set_fill_color(0xFF00FF00).set_fill_pattern(&pattern);
        assert!(surf.fill_pattern().is_some());
        surf.begin().fill_rect(0.0, 0.0, 32.0, 16.0);
        surf.set_fill_color(0xFF00FF00);
        assert!(surf.fill_pattern().is_none());
        surf.fill_rect(0.0, 0.0, 32.0, 16.0);
        surf.end();

        assert_eq!(bound_textures(&rec).last(), Some(&white.id().raw()));
        let quads = uploaded_quads(&rec);
        assert_eq!(&quads[0][8..10], &[4.0, 2.0], "pattern repeats over the rect");
        assert_eq!(&quads[0][10..12], &tint::to_quad_floats(NOOP_TINT));
        assert_eq!(quads.len(), 2);
        assert!(bound_textures(&rec).contains(&pattern.id().raw()));
    }

    #[test]
    fn line_is_a_rotated_quad() {
        let (rec, _gfx, mut surf) = screen();
        surf.begin().set_fill_color(0xFFFFFFFF);
        surf.draw_line(30.0, 20.0, 10.0, 20.0, 4.0);
        surf.draw_line(5.0, 5.0, 5.0, 5.0, 4.0);
        surf.end();
        let quads = uploaded_quads(&rec);
        assert_eq!(quads.len(), 1, "zero-length line is skipped");
        // Endpoints are swapped so the line runs left to right, and the quad
        // is shifted up by half the width.
        assert_eq!(&quads[0][0..6], &[20.0, 0.0, 0.0, 4.0, 10.0, 18.0]);

        rec.take_calls();
        surf.begin();
        surf.draw_line(0.0, 0.0, 0.0, 10.0, 2.0);
        surf.end();
        let q = &uploaded_quads(&rec)[0];
        // Pointing straight down: length runs along +y, width along -x.
        assert!((q[1] - 10.0).abs() < 1e-5 && q[0].abs() < 1e-5, "{q:?}");
        assert!((q[2] + 2.0).abs() < 1e-5 && q[3].abs() < 1e-5, "{q:?}");
        assert!((q[4] - 1.0).abs() < 1e-5 && q[5].abs() < 1e-5, "{q:?}");
    }

    #[test]
    fn tint_helpers() {
        let (_rec, _gfx, mut surf) = screen();
        assert_eq!(surf.tint(), NOOP_TINT);
        let prev = surf.combine_tint(0x80FF0000);
        assert_eq!(prev, NOOP_TINT);
        assert_eq!(surf.tint(), 0x80FF0000);
        assert_eq!(surf.combine_tint(NOOP_TINT), 0x80FF0000);
        assert_eq!(surf.tint(), 0x80FF0000, "noop leaves the tint alone");
        surf.set_tint(prev);
        surf.set_alpha(2.0);
        assert_eq!(surf.alpha(), 1.0);
    }

    #[test]
    fn tinted_draw_overrides_surface_tint() {
        let (rec, gfx, mut surf) = screen();
        let tex = gfx.create_texture(10.0, 10.0, TextureConfig::UNMANAGED).unwrap();
        surf.set_tint(0xFF112233).begin();
        surf.draw_tinted(&tex.to_tile(), 0xFF445566, 0.0, 0.0, 10.0, 10.0);
        surf.draw_region(&tex.to_tile(), 0.0, 0.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0);
        surf.end();
        let quads = uploaded_quads(&rec);
        assert_eq!(&quads[0][10..12], &tint::to_quad_floats(0xFF445566));
        assert_eq!(&quads[1][10..12], &tint::to_quad_floats(0xFF112233));
        assert_eq!(&quads[1][6..10], &[0.5, 0.5, 0.5, 0.5]);
    }

    #[test]
    fn draw_centered_offsets_by_half() {
        let (rec, gfx, mut surf) = screen();
        let tex = gfx.create_texture(20.0, 10.0, TextureConfig::UNMANAGED).unwrap();
        surf.begin().draw_centered(&tex.to_tile(), 50.0, 50.0);
        surf.end();
        assert_eq!(&uploaded_quads(&rec)[0][4..6], &[40.0, 45.0]);
    }

    #[test]
    fn texture_switch_keeps_order() {
        let (rec, gfx, mut surf) = screen();
        let a = gfx.create_texture(10.0, 10.0, TextureConfig::UNMANAGED).unwrap();
        let b = gfx.create_texture(10.0, 10.0, TextureConfig::UNMANAGED).unwrap();
        rec.take_calls();
        surf.begin();
        surf.draw(&a.to_tile(), 0.0, 0.0);
        surf.draw(&b.to_tile(), 0.0, 0.0);
        surf.draw(&b.to_tile(), 10.0, 0.0);
        surf.end();
        assert_eq!(rec.draw_counts(), vec![6, 12]);
        assert_eq!(bound_textures(&rec), vec![a.id().raw(), b.id().raw()]);
    }

    #[test]
    fn push_and_pop_batch() {
        let (_rec, gfx, batch) = setup(1.0);
        let mut surf = gfx.create_surface(batch.clone()).unwrap();
        let special = gfx.create_batch().unwrap();
        surf.begin();
        let saved = surf.push_batch(special.clone());
        assert!(Rc::ptr_eq(&saved, &batch));
        assert_eq!(batch.borrow().state(), BatchState::Idle);
        assert_eq!(special.borrow().state(), BatchState::Active);

        surf.pop_batch(saved);
        assert_eq!(special.borrow().state(), BatchState::Idle);
        assert_eq!(batch.borrow().state(), BatchState::Active);
        assert!(Rc::ptr_eq(surf.batch(), &batch));
        surf.end();
    }

    #[test]
    fn begin_binds_target_and_sizes_batch() {
        let (rec, _gfx, mut surf) = screen();
        rec.take_calls();
        surf.begin();
        let calls = rec.calls();
        assert_eq!(calls[0], GlCall::BindFramebuffer { framebuffer: None });
        assert_eq!(calls[1], GlCall::Viewport { x: 0, y: 0, width: 200, height: 100 });
        assert!(calls.iter().any(|c| matches!(c, GlCall::Uniform2f { x, y, .. } if *x == 100.0 && *y == 50.0)));
        assert!(calls.iter().any(|c| matches!(c, GlCall::Uniform1f { x, .. } if *x == -1.0)), "screen flips");
        surf.end();
    }

    #[test]
    #[should_panic(expected = "outside begin()/end()")]
    fn drawing_before_begin_panics() {
        let (_rec, _gfx, mut surf) = screen();
        surf.fill_rect(0.0, 0.0, 1.0, 1.0);
    }

    #[test]
    fn clear_is_a_gl_clear() {
        let (rec, _gfx, mut surf) = screen();
        surf.clear(0.1, 0.2, 0.3, 1.0);
        let calls = rec.calls();
        assert!(calls.contains(&GlCall::ClearColor([0.1, 0.2, 0.3, 1.0])));
        assert!(calls.contains(&GlCall::Clear(consts::COLOR_BUFFER_BIT)));
    }

    #[test]
    fn texture_surface_owns_only_its_framebuffer() {
        let (rec, gfx, batch) = setup(2.0);
        let mut surf = gfx.create_texture_surface(batch, 40.0, 30.0).unwrap();
        assert!(!surf.target().flip());
        assert_eq!((surf.target().width(), surf.target().height()), (80, 60));
        assert_eq!(*surf.tx(), Affine2::from_scale(Vec2::splat(2.0)));
        assert_eq!(surf.texture().ref_count(), 0, "not referenced by the surface");

        surf.begin().set_fill_color(0xFFFFFFFF).fill_rect(0.0, 0.0, 40.0, 30.0);
        surf.end();
        assert_eq!(rec.live_framebuffers(), 1);
        surf.close();
        surf.close();
        assert_eq!(rec.live_framebuffers(), 0);
        assert_eq!(rec.count_calls(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
        assert!(!surf.texture().is_disposed());
    }

    #[test]
    fn clips_are_counted() {
        let (_rec, gfx, mut surf) = screen();
        surf.begin();
        surf.start_clipped(0, 0, 10, 10);
        surf.end_clipped();
        surf.end();
        assert_eq!(gfx.stats().snapshot().clips, 1);
    }
}
