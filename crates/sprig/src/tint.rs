//! ARGB tint helpers.
//!
//! A tint is a packed `0xAARRGGBB` multiplier applied to sampled texture
//! color. Quads carry it to the vertex shader as two floats, each holding two
//! 8-bit channels: `A*256 + R` and `G*256 + B`. Both fit in the 24-bit
//! mantissa of an `f32` exactly, so the shader can split them back apart with
//! `mod(v, 256.0)`.

/// Opaque white: multiplying by it changes nothing.
pub const NOOP_TINT: u32 = 0xFFFF_FFFF;

/// Channel-wise product of two tints, rounded to the nearest 8-bit value.
pub fn combine(a: u32, b: u32) -> u32 {
    if a == NOOP_TINT {
        return b;
    }
    if b == NOOP_TINT {
        return a;
    }
    let mut out = 0u32;
    for shift in [24, 16, 8, 0] {
        let ca = (a >> shift) & 0xFF;
        let cb = (b >> shift) & 0xFF;
        out |= ((ca * cb + 127) / 255) << shift;
    }
    out
}

/// Replaces the alpha byte of `tint`. `alpha` is clamped to `[0, 1]`.
pub fn set_alpha(tint: u32, alpha: f32) -> u32 {
    let ialpha = (alpha.clamp(0.0, 1.0) * 255.0) as u32;
    (ialpha << 24) | (tint & 0x00FF_FFFF)
}

pub fn alpha(tint: u32) -> f32 {
    (tint >> 24) as f32 / 255.0
}

/// Builds a tint from `[0, 1]` channels.
pub fn from_argb(a: f32, r: f32, g: f32, b: f32) -> u32 {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (q(a) << 24) | (q(r) << 16) | (q(g) << 8) | q(b)
}

/// The two floats a quad record carries for `tint`.
pub fn to_quad_floats(tint: u32) -> [f32; 2] {
    [((tint >> 16) & 0xFFFF) as f32, (tint & 0xFFFF) as f32]
}

/// Inverse of [`to_quad_floats`].
pub fn from_quad_floats(v: [f32; 2]) -> u32 {
    ((v[0] as u32 & 0xFFFF) << 16) | (v[1] as u32 & 0xFFFF)
}

/// Packs two `[0, 1]` channels into one float as `hi*256 + lo` with each
/// channel quantized to `0..=255`.
pub fn pack_pair(hi: f32, lo: f32) -> f32 {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round();
    q(hi) * 256.0 + q(lo)
}

/// Splits a float made by [`pack_pair`] back into its two channels, the same
/// way the vertex shader does.
pub fn unpack_pair(v: f32) -> (f32, f32) {
    let lo = v % 256.0;
    let hi = (v - lo) / 256.0;
    (hi / 255.0, lo / 255.0)
}
