//! Framebuffers a surface can draw into.
//!
//! The screen target has no framebuffer object, flips y so that display
//! space has its origin at the top left, and tracks the window size. A
//! texture target owns one framebuffer with the texture as its color
//! attachment and does not flip.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::gl::{FramebufferId, Gl, check_gl_error, consts};
use crate::graphics::GpuRegistry;
use crate::scale::Scale;
use crate::texture::Texture;

struct TargetInner {
    gl: Rc<dyn Gl>,
    framebuffer: Option<FramebufferId>,
    width: Cell<i32>,
    height: Cell<i32>,
    xscale: Cell<f32>,
    yscale: Cell<f32>,
    flip: bool,
    disposed: Cell<bool>,
    registry: Option<Rc<GpuRegistry>>,
    // Keeps the color attachment alive while the framebuffer exists.
    _texture: Option<Texture>,
}

impl TargetInner {
    fn dispose(&self) {
        let Some(fb) = self.framebuffer else {
            return;
        };
        if self.disposed.replace(true) {
            return;
        }
        self.gl.delete_framebuffer(fb);
        if let Some(registry) = &self.registry {
            registry.framebuffer_deleted();
        }
        log::debug!("deleted framebuffer {}", fb.raw());
    }
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A bindable framebuffer. Clones share it.
#[derive(Clone)]
pub struct RenderTarget(Rc<TargetInner>);

impl RenderTarget {
    /// The default framebuffer, `pixel_width`×`pixel_height` at `scale`.
    pub fn screen(gl: Rc<dyn Gl>, pixel_width: i32, pixel_height: i32, scale: Scale) -> Self {
        Self(Rc::new(TargetInner {
            gl,
            framebuffer: None,
            width: Cell::new(pixel_width),
            height: Cell::new(pixel_height),
            xscale: Cell::new(scale.factor()),
            yscale: Cell::new(scale.factor()),
            flip: true,
            disposed: Cell::new(false),
            registry: None,
            _texture: None,
        }))
    }

    /// A framebuffer rendering into `texture`.
    pub fn for_texture(gl: Rc<dyn Gl>, texture: &Texture, check_errors: bool) -> Result<Self> {
        Self::create(gl, texture, check_errors, None)
    }

    pub(crate) fn create(
        gl: Rc<dyn Gl>,
        texture: &Texture,
        check_errors: bool,
        registry: Option<Rc<GpuRegistry>>,
    ) -> Result<Self> {
        let tex_id = texture.try_id()?;
        let fb = gl.create_framebuffer().ok_or_else(|| RenderError::Driver {
            op: "glGenFramebuffer",
            code: gl.get_error(),
        })?;
        gl.bind_framebuffer(consts::FRAMEBUFFER, Some(fb));
        gl.framebuffer_texture_2d(
            consts::FRAMEBUFFER,
            consts::COLOR_ATTACHMENT0,
            consts::TEXTURE_2D,
            Some(tex_id),
            0,
        );
        let status = gl.check_framebuffer_status(consts::FRAMEBUFFER);
        if status != consts::FRAMEBUFFER_COMPLETE {
            gl.bind_framebuffer(consts::FRAMEBUFFER, None);
            gl.delete_framebuffer(fb);
            return Err(RenderError::Framebuffer { status });
        }
        check_gl_error(&*gl, check_errors, "RenderTarget create");

        if let Some(registry) = &registry {
            registry.framebuffer_created();
        }
        log::debug!("created framebuffer {} for texture {}", fb.raw(), tex_id.raw());
        Ok(Self(Rc::new(TargetInner {
            gl,
            framebuffer: Some(fb),
            width: Cell::new(texture.pixel_width()),
            height: Cell::new(texture.pixel_height()),
            xscale: Cell::new(texture.pixel_width() as f32 / texture.display_width()),
            yscale: Cell::new(texture.pixel_height() as f32 / texture.display_height()),
            flip: false,
            disposed: Cell::new(false),
            registry,
            _texture: Some(texture.clone()),
        })))
    }

    /// `None` for the default framebuffer.
    pub fn id(&self) -> Option<FramebufferId> {
        self.0.framebuffer
    }

    /// Width in pixels.
    pub fn width(&self) -> i32 {
        self.0.width.get()
    }

    pub fn height(&self) -> i32 {
        self.0.height.get()
    }

    /// Pixels per display unit along x.
    pub fn xscale(&self) -> f32 {
        self.0.xscale.get()
    }

    pub fn yscale(&self) -> f32 {
        self.0.yscale.get()
    }

    /// Whether y is flipped when rendering here.
    pub fn flip(&self) -> bool {
        self.0.flip
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.get()
    }

    /// Binds the framebuffer and sets the viewport to all of it.
    pub fn bind(&self) {
        assert!(!self.is_disposed(), "RenderTarget: bind() after close()");
        let gl = &self.0.gl;
        gl.bind_framebuffer(consts::FRAMEBUFFER, self.0.framebuffer);
        gl.viewport(0, 0, self.width(), self.height());
    }

    /// Deletes the framebuffer. Later calls do nothing; the screen target
    /// has nothing to delete.
    pub fn close(&self) {
        self.0.dispose();
    }

    pub(crate) fn set_size(&self, width: i32, height: i32) {
        self.0.width.set(width);
        self.0.height.set(height);
    }

    pub(crate) fn set_scale(&self, scale: Scale) {
        self.0.xscale.set(scale.factor());
        self.0.yscale.set(scale.factor());
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.0.framebuffer.map_or(0, FramebufferId::raw);
        write!(
            f,
            "[id={id}, size={}x{} @ {}x{}, flip={}]",
            self.width(),
            self.height(),
            self.xscale(),
            self.yscale(),
            self.flip()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingGl};
    use crate::texture::TextureConfig;

    fn recorder() -> (Rc<RecordingGl>, Rc<dyn Gl>) {
        let rec = Rc::new(RecordingGl::new());
        let gl: Rc<dyn Gl> = rec.clone();
        (rec, gl)
    }

    fn texture(gl: &Rc<dyn Gl>) -> Texture {
        Texture::from_parts(
            gl.clone(),
            gl.create_texture().unwrap(),
            TextureConfig::UNMANAGED,
            (64, 32),
            Scale::new(2.0),
        )
    }

    #[test]
    fn screen_target_flips_and_binds_default() {
        let (rec, gl) = recorder();
        let target = RenderTarget::screen(gl, 800, 600, Scale::ONE);
        assert!(target.flip());
        assert_eq!(target.id(), None);
        target.bind();
        assert_eq!(
            rec.calls(),
            vec![
                GlCall::BindFramebuffer { framebuffer: None },
                GlCall::Viewport { x: 0, y: 0, width: 800, height: 600 },
            ]
        );
        target.close();
        assert_eq!(rec.count_calls(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 0);
    }

    #[test]
    fn texture_target_matches_texture() {
        let (rec, gl) = recorder();
        let tex = texture(&gl);
        let target = RenderTarget::for_texture(gl, &tex, true).unwrap();
        assert!(!target.flip());
        assert_eq!((target.width(), target.height()), (64, 32));
        assert_eq!((target.xscale(), target.yscale()), (2.0, 2.0));
        assert!(rec.calls().contains(&GlCall::FramebufferTexture2D {
            attachment: consts::COLOR_ATTACHMENT0,
            texture: Some(tex.id()),
        }));

        rec.take_calls();
        target.bind();
        assert_eq!(
            rec.calls()[1],
            GlCall::Viewport { x: 0, y: 0, width: 64, height: 32 }
        );
    }

    #[test]
    fn close_is_idempotent() {
        let (rec, gl) = recorder();
        let tex = texture(&gl);
        let target = RenderTarget::for_texture(gl, &tex, true).unwrap();
        assert_eq!(rec.live_framebuffers(), 1);
        target.close();
        target.close();
        drop(target);
        assert_eq!(rec.live_framebuffers(), 0);
        assert_eq!(rec.count_calls(|c| matches!(c, GlCall::DeleteFramebuffer(_))), 1);
    }

    #[test]
    fn successful_create_leaves_pending_errors() {
        let (rec, gl) = recorder();
        let tex = texture(&gl);
        rec.push_error(consts::INVALID_OPERATION);
        let _target = RenderTarget::for_texture(gl, &tex, false).unwrap();
        assert_eq!(rec.get_error(), consts::INVALID_OPERATION, "error still queued for the caller");
    }

    #[test]
    fn incomplete_framebuffer_is_an_error() {
        let (rec, gl) = recorder();
        rec.set_framebuffer_status(consts::FRAMEBUFFER_INCOMPLETE_ATTACHMENT);
        let tex = texture(&gl);
        let err = RenderTarget::for_texture(gl, &tex, true).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Framebuffer { status: consts::FRAMEBUFFER_INCOMPLETE_ATTACHMENT }
        ));
        assert_eq!(rec.live_framebuffers(), 0);
    }

    #[test]
    #[should_panic(expected = "bind() after close()")]
    fn bind_after_close_panics() {
        let (_rec, gl) = recorder();
        let tex = texture(&gl);
        let target = RenderTarget::for_texture(gl, &tex, false).unwrap();
        target.close();
        target.bind();
    }
}
