//! # Batch — Begin, Accumulate, Flush, End
//!
//! A batch collects drawing work on the CPU and hands it to the GPU in as few
//! draw calls as it can. Every batch follows the same lifecycle:
//!
//! ```text
//!   Idle ──begin──▶ Active ──end (flush)──▶ Idle ──close──▶ Closed
//!                    │  ▲
//!                    └──┘ flush
//! ```
//!
//! Breaking the bracket (`begin` twice, `flush`/`end` while idle, `close`
//! while active) is a bug in the caller and panics with the batch's name.
//! GPU state such as the bound program and buffers is only valid inside the
//! bracket, so there is nothing sensible to recover to.
//!
//! ## Textures
//!
//! Every quad in one flush samples the same texture. Switching to another
//! texture while quads are pending forces a flush first, so draw order is
//! preserved across the split.
//!
//! ## Comparison
//!
//! - **Vertex-buffer batchers** (most 2D engines): write four vertices per
//!   quad into a streaming buffer each frame.
//! - **Uniform batching** (ours, see [`UniformQuadBatch`]): upload three
//!   vec4s per quad into a uniform array and reuse one static buffer of
//!   unit-square corners forever.

use std::cell::RefCell;
use std::rc::Rc;

use crate::gl::{Gl, TextureId, check_gl_error, consts};
use crate::math::Affine2;
use crate::stats::RenderStats;
use crate::texture::Texture;

pub mod source;
mod uniform_quad;

pub use source::QuadShaderSource;
pub use uniform_quad::UniformQuadBatch;

/// The active batch of a surface, swappable mid-frame.
pub type SharedBatch = Rc<RefCell<dyn QuadBatch>>;

/// Wraps a batch for sharing between surfaces.
pub fn shared<B: QuadBatch + 'static>(batch: B) -> SharedBatch {
    Rc::new(RefCell::new(batch))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Active,
    Closed,
}

/// The begin/flush/end/close lifecycle shared by all batches.
pub trait Batch {
    /// Starts a session targeting a `fbuf_width`×`fbuf_height` framebuffer.
    /// `flip` inverts the y axis (true for the screen).
    fn begin(&mut self, fbuf_width: f32, fbuf_height: f32, flip: bool);

    /// Sends pending work to the GPU. A no-op when nothing is pending.
    fn flush(&mut self);

    /// Flushes and returns to idle.
    fn end(&mut self);

    /// Releases GPU resources. Closing twice is a no-op.
    fn close(&mut self);

    fn state(&self) -> BatchState;
}

/// One corner of a quad: display position and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QuadVertex {
    pub x: f32,
    pub y: f32,
    pub sx: f32,
    pub sy: f32,
}

impl QuadVertex {
    pub const fn new(x: f32, y: f32, sx: f32, sy: f32) -> Self {
        Self { x, y, sx, sy }
    }
}

/// A batch of textured, transformed, tinted quads.
///
/// Implementors provide [`add_quad_corners`](Self::add_quad_corners) and
/// access to their [`TexturedBatch`]; the rest is built on those.
pub trait QuadBatch: Batch {
    fn textured(&mut self) -> &mut TexturedBatch;

    /// Adds a quad given its four corners in the order top-left, top-right,
    /// bottom-left, bottom-right (before `xf` is applied).
    fn add_quad_corners(&mut self, tint: u32, xf: &Affine2, corners: &[QuadVertex; 4]);

    /// Quads added after this sample `texture`. Flushes first if quads for
    /// a different texture are pending.
    fn set_texture(&mut self, texture: &Texture) {
        let id = texture.id();
        if self.textured().needs_flush_for(id) {
            self.flush();
        }
        self.textured().bind_pending(id);
    }

    /// Adds an axis-aligned quad with explicit texture coordinates.
    #[allow(clippy::too_many_arguments)]
    fn add_quad_bounds(
        &mut self,
        tint: u32,
        xf: &Affine2,
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
        sl: f32,
        st: f32,
        sr: f32,
        sb: f32,
    ) {
        self.add_quad_corners(
            tint,
            xf,
            &[
                QuadVertex::new(left, top, sl, st),
                QuadVertex::new(right, top, sr, st),
                QuadVertex::new(left, bottom, sl, sb),
                QuadVertex::new(right, bottom, sr, sb),
            ],
        );
    }

    /// Adds all of `texture` stretched over `(x, y, w, h)`. On repeating
    /// axes the texture tiles instead of stretching.
    #[allow(clippy::too_many_arguments)]
    fn add_texture_quad(&mut self, texture: &Texture, tint: u32, xf: &Affine2, x: f32, y: f32, w: f32, h: f32) {
        self.set_texture(texture);
        let config = texture.config();
        let sr = if config.repeat_x { w / texture.display_width() } else { 1.0 };
        let sb = if config.repeat_y { h / texture.display_height() } else { 1.0 };
        self.add_quad_bounds(tint, xf, x, y, x + w, y + h, 0.0, 0.0, sr, sb);
    }

    /// Adds the `(sx, sy, sw, sh)` region of `texture` (display units) drawn
    /// at `(dx, dy, dw, dh)`.
    #[allow(clippy::too_many_arguments)]
    fn add_texture_region(
        &mut self,
        texture: &Texture,
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
        self.set_texture(texture);
        let tw = texture.display_width();
        let th = texture.display_height();
        self.add_quad_bounds(
            tint,
            xf,
            dx,
            dy,
            dx + dw,
            dy + dh,
            sx / tw,
            sy / th,
            (sx + sw) / tw,
            (sy + sh) / th,
        );
    }
}

/// Lifecycle and bound-texture bookkeeping shared by textured batches.
///
/// Batches embed one of these and forward to it; the GL work specific to a
/// batch kind stays in the batch.
pub struct TexturedBatch {
    name: &'static str,
    state: BatchState,
    current: Option<TextureId>,
    gl: Rc<dyn Gl>,
    check_errors: bool,
    stats: Rc<RenderStats>,
}

impl TexturedBatch {
    pub fn new(name: &'static str, gl: Rc<dyn Gl>, check_errors: bool, stats: Rc<RenderStats>) -> Self {
        Self {
            name,
            state: BatchState::Idle,
            current: None,
            gl,
            check_errors,
            stats,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn gl(&self) -> &Rc<dyn Gl> {
        &self.gl
    }

    pub fn stats(&self) -> &Rc<RenderStats> {
        &self.stats
    }

    pub fn check_errors(&self) -> bool {
        self.check_errors
    }

    pub fn current_texture(&self) -> Option<TextureId> {
        self.current
    }

    /// Idle → Active.
    pub fn begin(&mut self) {
        match self.state {
            BatchState::Idle => self.state = BatchState::Active,
            BatchState::Active => panic!("{}: mismatched begin()", self.name),
            BatchState::Closed => panic!("{}: begin() after close()", self.name),
        }
    }

    /// Asserts a flush is legal and counts it.
    pub fn flush(&mut self) {
        if self.state != BatchState::Active {
            panic!("{}: flush() without begin()", self.name);
        }
        self.stats.record_flush();
    }

    /// Asserts `end` is legal. The batch flushes, then calls
    /// [`finish_end`](Self::finish_end).
    pub fn check_end(&self) {
        if self.state != BatchState::Active {
            panic!("{}: mismatched end()", self.name);
        }
    }

    /// Active → Idle, forgetting the bound texture.
    pub fn finish_end(&mut self) {
        self.state = BatchState::Idle;
        self.current = None;
    }

    /// Idle → Closed. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        match self.state {
            BatchState::Idle => {
                self.state = BatchState::Closed;
                true
            }
            BatchState::Active => panic!("{}: close() without end()", self.name),
            BatchState::Closed => false,
        }
    }

    /// Asserts quads may be added right now.
    pub fn check_active(&self, op: &str) {
        if self.state != BatchState::Active {
            panic!("{}: {op} outside begin()/end()", self.name);
        }
    }

    /// True if switching to `texture` must flush pending quads first.
    pub fn needs_flush_for(&self, texture: TextureId) -> bool {
        matches!(self.current, Some(cur) if cur != texture)
    }

    pub fn bind_pending(&mut self, texture: TextureId) {
        if self.current != Some(texture) {
            if self.current.is_some() {
                self.stats.record_texture_switch();
            }
            self.current = Some(texture);
        }
    }

    /// Binds the current texture for a draw.
    pub fn bind_texture(&self) {
        self.gl.bind_texture(consts::TEXTURE_2D, self.current);
        check_gl_error(&*self.gl, self.check_errors, "QuadBatch bind_texture");
    }
}
