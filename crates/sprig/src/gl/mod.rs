//! # GL Binding — the GL-ES-2.0-shaped seam under the batcher
//!
//! [`Gl`] covers exactly the entry points the core issues: buffers,
//! textures, framebuffers, shaders and programs, uniforms, one vertex
//! attribute, scissor/viewport/clear and an indexed draw. It is object safe
//! and shared as `Rc<dyn Gl>`, which keeps every GL call on the thread that
//! owns the context.
//!
//! Handles are distinct newtypes, so a texture id cannot be passed where a
//! buffer id is expected. `None` stands for GL's zero handle (the default
//! framebuffer, "no texture bound").
//!
//! ## Backends
//!
//! - [`GlowGl`] (feature `glow`) forwards to a `glow::Context`.
//! - [`RecordingGl`] allocates handles in memory and records every call, for
//!   tests and headless runs.

use std::num::NonZeroU32;

pub mod recording;

#[cfg(feature = "glow")]
mod glow_backend;

#[cfg(feature = "glow")]
pub use glow_backend::GlowGl;
pub use recording::{GlCall, RecordingGl};

macro_rules! gl_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Wraps a raw GL name. Zero is GL's "no object" and maps to `None`.
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub fn raw(self) -> u32 {
                self.0.get()
            }
        }
    };
}

gl_handle!(
    /// A vertex or element buffer object.
    BufferId
);
gl_handle!(
    /// A texture object.
    TextureId
);
gl_handle!(
    /// A framebuffer object. The default (screen) framebuffer has no id.
    FramebufferId
);
gl_handle!(ProgramId);
gl_handle!(ShaderId);

/// A uniform location inside a linked program. Location 0 is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// The GL enum values the core uses.
pub mod consts {
    pub const NO_ERROR: u32 = 0;
    pub const INVALID_ENUM: u32 = 0x0500;
    pub const INVALID_VALUE: u32 = 0x0501;
    pub const INVALID_OPERATION: u32 = 0x0502;
    pub const OUT_OF_MEMORY: u32 = 0x0505;
    pub const INVALID_FRAMEBUFFER_OPERATION: u32 = 0x0506;

    pub const ARRAY_BUFFER: u32 = 0x8892;
    pub const ELEMENT_ARRAY_BUFFER: u32 = 0x8893;
    pub const STATIC_DRAW: u32 = 0x88E4;

    pub const TEXTURE_2D: u32 = 0x0DE1;
    pub const TEXTURE0: u32 = 0x84C0;
    pub const TEXTURE_MAG_FILTER: u32 = 0x2800;
    pub const TEXTURE_MIN_FILTER: u32 = 0x2801;
    pub const TEXTURE_WRAP_S: u32 = 0x2802;
    pub const TEXTURE_WRAP_T: u32 = 0x2803;
    pub const NEAREST: u32 = 0x2600;
    pub const LINEAR: u32 = 0x2601;
    pub const NEAREST_MIPMAP_NEAREST: u32 = 0x2700;
    pub const LINEAR_MIPMAP_NEAREST: u32 = 0x2701;
    pub const REPEAT: u32 = 0x2901;
    pub const CLAMP_TO_EDGE: u32 = 0x812F;

    pub const RGBA: u32 = 0x1908;
    pub const UNSIGNED_BYTE: u32 = 0x1401;
    pub const SHORT: u32 = 0x1402;
    pub const UNSIGNED_SHORT: u32 = 0x1403;
    pub const FLOAT: u32 = 0x1406;

    pub const FRAMEBUFFER: u32 = 0x8D40;
    pub const COLOR_ATTACHMENT0: u32 = 0x8CE0;
    pub const FRAMEBUFFER_COMPLETE: u32 = 0x8CD5;
    pub const FRAMEBUFFER_INCOMPLETE_ATTACHMENT: u32 = 0x8CD6;

    pub const FRAGMENT_SHADER: u32 = 0x8B30;
    pub const VERTEX_SHADER: u32 = 0x8B31;
    pub const MAX_VERTEX_UNIFORM_VECTORS: u32 = 0x8DFB;

    pub const TRIANGLES: u32 = 0x0004;
    pub const BLEND: u32 = 0x0BE2;
    pub const SCISSOR_TEST: u32 = 0x0C11;
    pub const COLOR_BUFFER_BIT: u32 = 0x4000;
    pub const ONE: u32 = 1;
    pub const ONE_MINUS_SRC_ALPHA: u32 = 0x0303;
}

/// The GL entry points the rendering core needs.
///
/// Creation calls return `None` when the driver hands back no object.
pub trait Gl {
    fn get_integer(&self, pname: u32) -> i32;
    fn get_error(&self) -> u32;

    fn create_buffer(&self) -> Option<BufferId>;
    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>);
    fn buffer_data(&self, target: u32, data: &[u8], usage: u32);
    fn delete_buffer(&self, buffer: BufferId);

    fn create_texture(&self) -> Option<TextureId>;
    fn bind_texture(&self, target: u32, texture: Option<TextureId>);
    fn active_texture(&self, unit: u32);
    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32);
    /// `pixels: None` allocates storage without uploading.
    #[allow(clippy::too_many_arguments)]
    fn tex_image_2d(
        &self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    );
    fn generate_mipmap(&self, target: u32);
    fn delete_texture(&self, texture: TextureId);

    fn create_framebuffer(&self) -> Option<FramebufferId>;
    fn bind_framebuffer(&self, target: u32, framebuffer: Option<FramebufferId>);
    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: Option<TextureId>,
        level: i32,
    );
    fn check_framebuffer_status(&self, target: u32) -> u32;
    fn delete_framebuffer(&self, framebuffer: FramebufferId);

    fn create_shader(&self, kind: u32) -> Option<ShaderId>;
    fn shader_source(&self, shader: ShaderId, source: &str);
    fn compile_shader(&self, shader: ShaderId);
    fn shader_compile_status(&self, shader: ShaderId) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&self, shader: ShaderId);

    fn create_program(&self) -> Option<ProgramId>;
    fn attach_shader(&self, program: ProgramId, shader: ShaderId);
    fn link_program(&self, program: ProgramId);
    fn program_link_status(&self, program: ProgramId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn use_program(&self, program: Option<ProgramId>);
    fn delete_program(&self, program: ProgramId);

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_1i(&self, location: &UniformLocation, x: i32);
    fn uniform_1f(&self, location: &UniformLocation, x: f32);
    fn uniform_2f(&self, location: &UniformLocation, x: f32, y: f32);
    fn uniform_4fv(&self, location: &UniformLocation, data: &[f32]);
    fn uniform_matrix_2fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]);
    fn uniform_matrix_3fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]);
    fn uniform_matrix_4fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]);

    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn draw_elements(&self, mode: u32, count: i32, ty: u32, offset: i32);

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&self, x: i32, y: i32, width: i32, height: i32);
    fn enable(&self, cap: u32);
    fn disable(&self, cap: u32);
    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32);
    fn clear(&self, mask: u32);
    fn blend_func(&self, src: u32, dst: u32);
}

/// Offset/count-aware uniform array uploads.
///
/// `offset` and `count` are in elements (vec4s or matrices), not floats.
/// Out-of-range requests panic like any slice index.
pub trait GlExt: Gl {
    fn uniform_4fv_range(&self, location: &UniformLocation, data: &[f32], offset: usize, count: usize) {
        self.uniform_4fv(location, &data[4 * offset..4 * (offset + count)]);
    }

    fn uniform_matrix_2fv_range(
        &self,
        location: &UniformLocation,
        transpose: bool,
        data: &[f32],
        offset: usize,
        count: usize,
    ) {
        self.uniform_matrix_2fv(location, transpose, &data[2 * 2 * offset..2 * 2 * (offset + count)]);
    }

    fn uniform_matrix_3fv_range(
        &self,
        location: &UniformLocation,
        transpose: bool,
        data: &[f32],
        offset: usize,
        count: usize,
    ) {
        self.uniform_matrix_3fv(location, transpose, &data[3 * 3 * offset..3 * 3 * (offset + count)]);
    }

    fn uniform_matrix_4fv_range(
        &self,
        location: &UniformLocation,
        transpose: bool,
        data: &[f32],
        offset: usize,
        count: usize,
    ) {
        self.uniform_matrix_4fv(location, transpose, &data[4 * 4 * offset..4 * 4 * (offset + count)]);
    }
}

impl<T: Gl + ?Sized> GlExt for T {}

/// Drivers that lost their context can report the same error forever.
const MAX_DRAINED_ERRORS: usize = 32;

/// Drains `glGetError` and logs every code against `op`. Returns whether any
/// error was pending. Does nothing when `enabled` is false.
pub fn check_gl_error(gl: &dyn Gl, enabled: bool, op: &str) -> bool {
    if !enabled {
        return false;
    }
    let mut seen = false;
    for _ in 0..MAX_DRAINED_ERRORS {
        let code = gl.get_error();
        if code == consts::NO_ERROR {
            break;
        }
        seen = true;
        log::error!("{op}: {} (0x{code:04X})", error_name(code));
    }
    seen
}

pub fn error_name(code: u32) -> &'static str {
    match code {
        consts::NO_ERROR => "NO_ERROR",
        consts::INVALID_ENUM => "INVALID_ENUM",
        consts::INVALID_VALUE => "INVALID_VALUE",
        consts::INVALID_OPERATION => "INVALID_OPERATION",
        consts::OUT_OF_MEMORY => "OUT_OF_MEMORY",
        consts::INVALID_FRAMEBUFFER_OPERATION => "INVALID_FRAMEBUFFER_OPERATION",
        _ => "UNKNOWN_ERROR",
    }
}
