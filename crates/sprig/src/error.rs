//! Recoverable rendering errors.
//!
//! Misuse of the stateful API (mismatched `begin`/`end`, double release,
//! unbalanced transform stack) is not represented here: those panic at the
//! call site. This enum covers what a caller can reasonably react to, such
//! as a device that cannot run a batching strategy or a bad pixel upload.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The driver's vertex uniform budget cannot hold even one quad.
    #[error("uniform budget too small: {have} vec4s available, {need} required")]
    UniformBudget { have: i32, need: i32 },

    /// A driver query or handle allocation failed.
    #[error("GL call {op} failed (0x{code:04X})")]
    Driver { op: &'static str, code: u32 },

    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile { stage: &'static str, log: String },

    #[error("program failed to link: {log}")]
    ProgramLink { log: String },

    #[error("missing uniform `{0}`")]
    MissingUniform(String),

    #[error("missing attribute `{0}`")]
    MissingAttribute(String),

    #[error("framebuffer incomplete (status 0x{status:04X})")]
    Framebuffer { status: u32 },

    #[error("invalid texture size {width}x{height}")]
    InvalidTextureSize { width: i32, height: i32 },

    #[error("image size mismatch: expected {expected:?}, got {actual:?}")]
    ImageSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("pixel data has {actual} bytes, expected {expected}")]
    InvalidPixelData { expected: usize, actual: usize },

    #[error("texture has been disposed")]
    TextureDisposed,

    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
