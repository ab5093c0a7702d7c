//! # Sprig — Batched 2D GPU Rendering Core
//!
//! Turns high-level drawing commands (transformed rectangles, tinted images,
//! filled shapes) into a minimal sequence of GL draw calls.
//!
//! The pieces, leaves first:
//!
//! - [`gl`] — the GL-ES-2.0-shaped binding ([`gl::Gl`]), a `glow` backend and
//!   a recording fake for tests.
//! - [`program`] — shader compile/link.
//! - [`batch`] — the begin/flush/end state machine, texture tracking and the
//!   uniform-storage quad batch.
//! - [`texture`] — reference-counted GPU images and sub-region tiles.
//! - [`render_target`] — screen or texture-backed framebuffers.
//! - [`surface`] — the drawing API: transform stack, clip stack, tint, fill.
//! - [`graphics`] — one GL context's shared state and resource registry.
//!
//! Everything here is single-thread confined: GL handles are shared through
//! `Rc` and never cross threads.

pub mod batch;
pub mod config;
pub mod error;
pub mod gl;
pub mod graphics;
pub mod math;
pub mod program;
pub mod render_target;
pub mod scale;
pub mod stats;
pub mod surface;
pub mod texture;
pub mod tint;

#[cfg(feature = "diagnostics")]
pub mod diag;

pub use batch::{QuadBatch, SharedBatch, UniformQuadBatch};
pub use config::RenderConfig;
pub use error::{RenderError, Result};
pub use graphics::Graphics;
pub use render_target::RenderTarget;
pub use surface::{Surface, TextureSurface};
pub use texture::{Texture, TextureConfig, Tile, TileSource};
