//! GLSL for the textured quad shaders.
//!
//! The fragment stage is shared by every textured batch: sample, multiply by
//! the tint color, multiply by the tint alpha. The vertex stage of
//! [`UniformQuadBatch`](super::UniformQuadBatch) is a template whose array
//! size depends on the device, so `_MAX_QUADS_` and `_VEC4S_PER_QUAD_` are
//! substituted once the capacity is known.

use std::borrow::Cow;

/// GLES needs a default float precision; desktop GL may not know the
/// qualifiers at all, so they are defined away there.
pub const FRAGMENT_PREAMBLE: &str = "\
#ifdef GL_ES
precision lowp float;
#else
#define lowp
#define mediump
#define highp
#endif
";

pub const TEXTURE_UNIFORMS: &str = "uniform lowp sampler2D u_Texture;\n";

pub const TEXTURE_VARYINGS: &str = "\
varying mediump vec2 v_TexCoord;
varying lowp vec4 v_Color;
";

/// Builds the textured fragment shader.
pub fn fragment() -> String {
    let mut src = String::from(FRAGMENT_PREAMBLE);
    src.push_str(TEXTURE_UNIFORMS);
    src.push_str(TEXTURE_VARYINGS);
    src.push_str("void main(void) {\n");
    src.push_str("  vec4 textureColor = texture2D(u_Texture, v_TexCoord);\n");
    src.push_str("  textureColor.rgb *= v_Color.rgb;\n");
    src.push_str("  textureColor *= v_Color.a;\n");
    src.push_str("  gl_FragColor = textureColor;\n}");
    src
}

/// Raw vertex template for the uniform quad batch.
///
/// Each quad occupies three vec4s of `u_Data`:
///
/// | vec4 | x | y | z | w |
/// |------|---|---|---|---|
/// | `mat` | m00·w | m01·w | m10·h | m11·h |
/// | `txc` | tx | ty | s0 | t0 |
/// | `tcs` | sw | th | A·256+R | G·256+B |
///
/// `a_Vertex.xy` is the unit-square corner and `a_Vertex.z` the quad index.
pub const UNIFORM_QUAD_VERTEX: &str = "\
uniform vec2 u_HScreenSize;
uniform float u_Flip;
uniform vec4 u_Data[_VEC4S_PER_QUAD_*_MAX_QUADS_];
attribute vec3 a_Vertex;
varying vec2 v_TexCoord;
varying vec4 v_Color;
void main(void) {
int index = _VEC4S_PER_QUAD_*int(a_Vertex.z);
vec4 mat = u_Data[index+0];
vec4 txc = u_Data[index+1];
vec4 tcs = u_Data[index+2];
mat3 transform = mat3(
  mat.x, mat.y, 0,
  mat.z, mat.w, 0,
  txc.x, txc.y, 1);
gl_Position = vec4(transform * vec3(a_Vertex.xy, 1.0), 1.0);
gl_Position.xy /= u_HScreenSize.xy;
gl_Position.xy -= 1.0;
gl_Position.y *= u_Flip;
v_TexCoord = a_Vertex.xy * tcs.xy + txc.zw;
float red = mod(tcs.z, 256.0);
float alpha = (tcs.z - red) / 256.0;
float blue = mod(tcs.w, 256.0);
float green = (tcs.w - blue) / 256.0;
v_Color = vec4(red / 255.0, green / 255.0, blue / 255.0, alpha / 255.0);
}";

/// Shader sources for a [`UniformQuadBatch`](super::UniformQuadBatch).
///
/// Custom shaders must keep the uniform, attribute and varying names of the
/// stock ones, and may add to them.
#[derive(Debug, Clone)]
pub struct QuadShaderSource {
    pub vertex_template: Cow<'static, str>,
    pub fragment: Cow<'static, str>,
}

impl Default for QuadShaderSource {
    fn default() -> Self {
        Self {
            vertex_template: Cow::Borrowed(UNIFORM_QUAD_VERTEX),
            fragment: Cow::Owned(fragment()),
        }
    }
}

impl QuadShaderSource {
    /// The vertex source with the array dimensions filled in.
    pub fn vertex(&self, max_quads: usize, vec4s_per_quad: usize) -> String {
        self.vertex_template
            .replace("_MAX_QUADS_", &max_quads.to_string())
            .replace("_VEC4S_PER_QUAD_", &vec4s_per_quad.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_substitutes_dimensions() {
        let src = QuadShaderSource::default().vertex(64, 3);
        assert!(src.contains("uniform vec4 u_Data[3*64];"));
        assert!(src.contains("int index = 3*int(a_Vertex.z);"));
        assert!(!src.contains("_MAX_QUADS_"));
        assert!(!src.contains("_VEC4S_PER_QUAD_"));
    }

    #[test]
    fn fragment_multiplies_tint() {
        let src = fragment();
        assert!(src.starts_with("#ifdef GL_ES"));
        assert!(src.contains("textureColor.rgb *= v_Color.rgb;"));
        assert!(src.contains("textureColor *= v_Color.a;"));
        assert!(src.ends_with('}'));
    }
}
