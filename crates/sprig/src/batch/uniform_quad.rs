//! # UniformQuadBatch — quads packed into shader uniforms
//!
//! Per-quad data (transform, texture region, tint) goes into one big
//! `uniform vec4 u_Data[]`, three vec4s per quad. The geometry is a static
//! buffer of unit-square corners, four per slot, each carrying its slot
//! index in `z`. A flush is one `glUniform4fv` plus one `glDrawElements`.
//!
//! Capacity comes from `GL_MAX_VERTEX_UNIFORM_VECTORS`, minus three vectors
//! for the other uniforms and the vertex attribute, divided by three. It is
//! further capped by the 16-bit index range and by
//! [`RenderConfig::max_quads`].

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use super::source::QuadShaderSource;
use super::{Batch, BatchState, QuadBatch, QuadVertex, TexturedBatch};
use crate::config::RenderConfig;
use crate::error::{RenderError, Result};
use crate::gl::{BufferId, Gl, GlExt, UniformLocation, check_gl_error, consts};
use crate::math::Affine2;
use crate::program::ShaderProgram;
use crate::stats::RenderStats;

const VERTICES_PER_QUAD: usize = 4;
const ELEMENTS_PER_QUAD: usize = 6;
/// Components of `a_Vertex`: corner x, corner y, quad index.
const VERTEX_SIZE: i32 = 3;
/// Vectors held back from the driver limit: `u_HScreenSize`, `u_Flip`,
/// and one that some drivers spend on the vec3 attribute.
const RESERVED_VEC4S: i32 = 3;
/// Below this many quads per flush an indexed-triangle batch would win.
const MIN_PERFORMANT_QUADS: i32 = 16;
/// Largest quad count whose vertex indices still fit in `u16`.
const MAX_INDEXABLE_QUADS: usize = (u16::MAX as usize + 1) / VERTICES_PER_QUAD;

/// One unit-square corner as stored in the static vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct CornerVertex {
    x: i16,
    y: i16,
    quad: i16,
}

pub struct UniformQuadBatch {
    base: TexturedBatch,
    program: ShaderProgram,
    u_texture: UniformLocation,
    u_hscreen_size: UniformLocation,
    u_flip: UniformLocation,
    u_data: UniformLocation,
    a_vertex: u32,
    vertices: BufferId,
    elements: BufferId,
    data: Vec<f32>,
    max_quads: usize,
    quad_count: usize,
}

impl UniformQuadBatch {
    pub const VEC4S_PER_QUAD: usize = 3;
    const FLOATS_PER_QUAD: usize = Self::VEC4S_PER_QUAD * 4;

    pub fn new(gl: Rc<dyn Gl>, config: &RenderConfig, stats: Rc<RenderStats>) -> Result<Self> {
        Self::with_source(gl, config, stats, &QuadShaderSource::default())
    }

    /// Builds the batch with custom shaders. See [`QuadShaderSource`] for the
    /// names a custom shader must keep.
    pub fn with_source(
        gl: Rc<dyn Gl>,
        config: &RenderConfig,
        stats: Rc<RenderStats>,
        source: &QuadShaderSource,
    ) -> Result<Self> {
        let max_quads = Self::capacity(&*gl, config)?;
        let check = config.check_errors;

        let program = ShaderProgram::new(
            gl.clone(),
            &source.vertex(max_quads, Self::VEC4S_PER_QUAD),
            &source.fragment,
            check,
        )?;
        let u_texture = program.uniform_location("u_Texture")?;
        let u_hscreen_size = program.uniform_location("u_HScreenSize")?;
        let u_flip = program.uniform_location("u_Flip")?;
        let u_data = program.uniform_location("u_Data")?;
        let a_vertex = program.attrib_location("a_Vertex")?;

        let (corners, elems) = unit_quads(max_quads);

        let vertices = gl.create_buffer().ok_or_else(|| RenderError::Driver {
            op: "glGenBuffers",
            code: gl.get_error(),
        })?;
        let Some(elements) = gl.create_buffer() else {
            gl.delete_buffer(vertices);
            return Err(RenderError::Driver {
                op: "glGenBuffers",
                code: gl.get_error(),
            });
        };

        gl.bind_buffer(consts::ARRAY_BUFFER, Some(vertices));
        gl.buffer_data(
            consts::ARRAY_BUFFER,
            bytemuck::cast_slice(&corners),
            consts::STATIC_DRAW,
        );
        gl.bind_buffer(consts::ELEMENT_ARRAY_BUFFER, Some(elements));
        gl.buffer_data(
            consts::ELEMENT_ARRAY_BUFFER,
            bytemuck::cast_slice(&elems),
            consts::STATIC_DRAW,
        );
        check_gl_error(&*gl, check, "UniformQuadBatch new");

        log::info!("UniformQuadBatch: {max_quads} quads per flush");
        Ok(Self {
            base: TexturedBatch::new("UniformQuadBatch", gl, check, stats),
            program,
            u_texture,
            u_hscreen_size,
            u_flip,
            u_data,
            a_vertex,
            vertices,
            elements,
            data: vec![0.0; max_quads * Self::FLOATS_PER_QUAD],
            max_quads,
            quad_count: 0,
        })
    }

    /// Quads per flush this device (and `config`) allows.
    pub fn capacity(gl: &dyn Gl, config: &RenderConfig) -> Result<usize> {
        let max_vecs = usable_max_uniform_vectors(gl)?;
        let need = Self::VEC4S_PER_QUAD as i32;
        if max_vecs < need {
            return Err(RenderError::UniformBudget { have: max_vecs, need });
        }
        let mut quads = (max_vecs / need) as usize;
        quads = quads.min(MAX_INDEXABLE_QUADS);
        if let Some(cap) = config.max_quads {
            quads = quads.min(cap);
        }
        Ok(quads)
    }

    /// False when the device cannot fit enough quads per flush for this
    /// strategy to beat plain triangle batching.
    pub fn is_likely_to_perform(gl: &dyn Gl) -> Result<bool> {
        let max_vecs = usable_max_uniform_vectors(gl)?;
        Ok(max_vecs >= MIN_PERFORMANT_QUADS * Self::VEC4S_PER_QUAD as i32)
    }

    pub fn max_quads(&self) -> usize {
        self.max_quads
    }

    /// Quads added since the last flush.
    pub fn pending_quads(&self) -> usize {
        self.quad_count
    }

    fn release_gpu(&mut self) {
        let gl = self.base.gl().clone();
        self.program.close();
        gl.delete_buffer(self.vertices);
        gl.delete_buffer(self.elements);
        check_gl_error(&*gl, self.base.check_errors(), "UniformQuadBatch close");
    }
}

/// The driver's vec4 budget minus [`RESERVED_VEC4S`]. The error is always
/// checked here: a failed query leaves garbage that would otherwise be
/// compiled into the shader's array size.
fn usable_max_uniform_vectors(gl: &dyn Gl) -> Result<i32> {
    let max = gl.get_integer(consts::MAX_VERTEX_UNIFORM_VECTORS);
    let code = gl.get_error();
    if code != consts::NO_ERROR {
        return Err(RenderError::Driver {
            op: "glGetIntegerv(GL_MAX_VERTEX_UNIFORM_VECTORS)",
            code,
        });
    }
    Ok(max - RESERVED_VEC4S)
}

/// Corners `(0,0) (1,0) (0,1) (1,1)` for every slot, and the two triangles
/// `0 1 2` / `1 3 2` of each.
fn unit_quads(max_quads: usize) -> (Vec<CornerVertex>, Vec<u16>) {
    let mut corners = Vec::with_capacity(max_quads * VERTICES_PER_QUAD);
    let mut elems = Vec::with_capacity(max_quads * ELEMENTS_PER_QUAD);
    for quad in 0..max_quads {
        let q = quad as i16;
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            corners.push(CornerVertex { x, y, quad: q });
        }
        let base = (quad * VERTICES_PER_QUAD) as u16;
        elems.extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 3, base + 2]);
    }
    (corners, elems)
}

impl Batch for UniformQuadBatch {
    fn begin(&mut self, fbuf_width: f32, fbuf_height: f32, flip: bool) {
        self.base.begin();
        let gl = self.base.gl().clone();
        self.program.activate();
        gl.uniform_2f(&self.u_hscreen_size, fbuf_width / 2.0, fbuf_height / 2.0);
        gl.uniform_1f(&self.u_flip, if flip { -1.0 } else { 1.0 });
        gl.bind_buffer(consts::ARRAY_BUFFER, Some(self.vertices));
        gl.enable_vertex_attrib_array(self.a_vertex);
        gl.vertex_attrib_pointer(self.a_vertex, VERTEX_SIZE, consts::SHORT, false, 0, 0);
        gl.bind_buffer(consts::ELEMENT_ARRAY_BUFFER, Some(self.elements));
        gl.active_texture(consts::TEXTURE0);
        gl.uniform_1i(&self.u_texture, 0);
        check_gl_error(&*gl, self.base.check_errors(), "UniformQuadBatch begin");
    }

    fn flush(&mut self) {
        self.base.flush();
        if self.quad_count == 0 {
            return;
        }
        let gl = self.base.gl().clone();
        self.base.bind_texture();
        gl.uniform_4fv_range(&self.u_data, &self.data, 0, self.quad_count * Self::VEC4S_PER_QUAD);
        gl.draw_elements(
            consts::TRIANGLES,
            (self.quad_count * ELEMENTS_PER_QUAD) as i32,
            consts::UNSIGNED_SHORT,
            0,
        );
        self.base.stats().record_draw(self.quad_count as u32);
        check_gl_error(&*gl, self.base.check_errors(), "UniformQuadBatch flush");
        self.quad_count = 0;
    }

    fn end(&mut self) {
        self.base.check_end();
        self.flush();
        self.base.finish_end();
        let gl = self.base.gl().clone();
        gl.disable_vertex_attrib_array(self.a_vertex);
        check_gl_error(&*gl, self.base.check_errors(), "UniformQuadBatch end");
    }

    fn close(&mut self) {
        if self.base.close() {
            self.release_gpu();
        }
    }

    fn state(&self) -> BatchState {
        self.base.state()
    }
}

impl QuadBatch for UniformQuadBatch {
    fn textured(&mut self) -> &mut TexturedBatch {
        &mut self.base
    }

    fn add_quad_corners(&mut self, tint: u32, xf: &Affine2, corners: &[QuadVertex; 4]) {
        self.base.check_active("add_quad");
        let [c1, c2, c3, _] = corners;
        let m = xf.matrix2;
        let (m00, m01, m10, m11) = (m.x_axis.x, m.x_axis.y, m.y_axis.x, m.y_axis.y);
        let (tx, ty) = (xf.translation.x, xf.translation.y);
        let dw = c2.x - c1.x;
        let dh = c3.y - c1.y;
        let [tint_hi, tint_lo] = crate::tint::to_quad_floats(tint);

        let pos = self.quad_count * Self::FLOATS_PER_QUAD;
        self.data[pos..pos + Self::FLOATS_PER_QUAD].copy_from_slice(&[
            m00 * dw,
            m01 * dw,
            m10 * dh,
            m11 * dh,
            tx + m00 * c1.x + m10 * c1.y,
            ty + m01 * c1.x + m11 * c1.y,
            c1.sx,
            c1.sy,
            c2.sx - c1.sx,
            c3.sy - c1.sy,
            tint_hi,
            tint_lo,
        ]);
        self.quad_count += 1;

        if self.quad_count >= self.max_quads {
            self.flush();
        }
    }
}

impl Drop for UniformQuadBatch {
    fn drop(&mut self) {
        if self.base.state() != BatchState::Closed {
            self.release_gpu();
        }
    }
}

impl std::fmt::Debug for UniformQuadBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uquad/{}", self.max_quads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingGl};
    use crate::tint::NOOP_TINT;

    /// A recorder whose budget yields exactly `quads` quads.
    fn recorder(quads: i32) -> (Rc<RecordingGl>, Rc<dyn Gl>) {
        let rec = Rc::new(
            RecordingGl::new().with_max_vertex_uniform_vectors(quads * 3 + RESERVED_VEC4S),
        );
        let gl: Rc<dyn Gl> = rec.clone();
        (rec, gl)
    }

    fn batch(gl: Rc<dyn Gl>) -> UniformQuadBatch {
        UniformQuadBatch::new(gl, &RenderConfig::default(), Rc::new(RenderStats::new())).unwrap()
    }

    fn texture(gl: &Rc<dyn Gl>) -> crate::texture::Texture {
        crate::texture::Texture::from_parts(
            gl.clone(),
            gl.create_texture().unwrap(),
            crate::texture::TextureConfig::UNMANAGED,
            (16, 16),
            crate::scale::Scale::ONE,
        )
    }

    fn add_unit(b: &mut UniformQuadBatch) {
        b.add_quad_bounds(NOOP_TINT, &Affine2::IDENTITY, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0);
    }

    #[test]
    fn capacity_from_driver_budget() {
        let (_rec, gl) = recorder(64);
        assert_eq!(UniformQuadBatch::capacity(&*gl, &RenderConfig::default()).unwrap(), 64);
        let b = batch(gl);
        assert_eq!(b.max_quads(), 64);
    }

    #[test]
    fn capacity_respects_config_cap() {
        let (_rec, gl) = recorder(64);
        let config = RenderConfig {
            max_quads: Some(10),
            ..RenderConfig::default()
        };
        assert_eq!(UniformQuadBatch::capacity(&*gl, &config).unwrap(), 10);
        let config = RenderConfig {
            max_quads: Some(1000),
            ..RenderConfig::default()
        };
        assert_eq!(UniformQuadBatch::capacity(&*gl, &config).unwrap(), 64, "cap never raises");
    }

    #[test]
    fn capacity_capped_by_u16_indices() {
        let rec = RecordingGl::new().with_max_vertex_uniform_vectors(1_000_000);
        let quads = UniformQuadBatch::capacity(&rec, &RenderConfig::default()).unwrap();
        assert_eq!(quads, 16384);
        let (corners, elems) = unit_quads(quads);
        assert_eq!(corners.last().unwrap().quad, 16383);
        assert_eq!(*elems.iter().max().unwrap(), u16::MAX);
    }

    #[test]
    fn too_small_budget_fails() {
        let rec = Rc::new(RecordingGl::new().with_max_vertex_uniform_vectors(5));
        let gl: Rc<dyn Gl> = rec.clone();
        let err = UniformQuadBatch::new(gl, &RenderConfig::default(), Rc::new(RenderStats::new()))
            .unwrap_err();
        assert!(matches!(err, RenderError::UniformBudget { have: 2, need: 3 }));
        assert_eq!(rec.live_programs(), 0, "nothing is created on failure");
        assert_eq!(rec.live_buffers(), 0);
    }

    #[test]
    fn failed_budget_query_is_reported() {
        let rec = RecordingGl::new();
        rec.push_error(consts::INVALID_ENUM);
        assert!(matches!(
            UniformQuadBatch::capacity(&rec, &RenderConfig::default()),
            Err(RenderError::Driver { code: consts::INVALID_ENUM, .. })
        ));
    }

    #[test]
    fn likely_to_perform_needs_sixteen_quads() {
        let rec = RecordingGl::new().with_max_vertex_uniform_vectors(16 * 3 + 3);
        assert!(UniformQuadBatch::is_likely_to_perform(&rec).unwrap());
        let rec = RecordingGl::new().with_max_vertex_uniform_vectors(16 * 3 + 2);
        assert!(!UniformQuadBatch::is_likely_to_perform(&rec).unwrap());
    }

    #[test]
    fn unit_quad_layout() {
        let (corners, elems) = unit_quads(2);
        assert_eq!(corners.len(), 8);
        assert_eq!(corners[5], CornerVertex { x: 1, y: 0, quad: 1 });
        assert_eq!(elems, vec![0, 1, 2, 1, 3, 2, 4, 5, 6, 5, 7, 6]);
    }

    #[test]
    fn three_quads_one_draw() {
        let (rec, gl) = recorder(64);
        let tex = texture(&gl);
        let mut b = batch(gl);
        rec.take_calls();

        b.begin(100.0, 50.0, true);
        for _ in 0..3 {
            b.add_texture_quad(&tex, NOOP_TINT, &Affine2::IDENTITY, 0.0, 0.0, 10.0, 10.0);
        }
        assert_eq!(rec.draw_counts(), Vec::<i32>::new(), "nothing drawn before end");
        b.end();

        assert_eq!(rec.draw_counts(), vec![18]);
        let uploads: Vec<_> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GlCall::Uniform4fv { data, .. } => Some(data.len()),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![3 * 12]);
        assert!(rec.calls().contains(&GlCall::Uniform2f {
            location: b.u_hscreen_size,
            x: 50.0,
            y: 25.0
        }));
        assert!(rec.calls().contains(&GlCall::Uniform1f { location: b.u_flip, x: -1.0 }));
    }

    #[test]
    fn texture_switch_splits_draws() {
        let (rec, gl) = recorder(64);
        let t1 = texture(&gl);
        let t2 = texture(&gl);
        let mut b = batch(gl);

        b.begin(100.0, 100.0, false);
        b.set_texture(&t1);
        add_unit(&mut b);
        assert_eq!(rec.draw_counts().len(), 0);
        b.set_texture(&t2);
        assert_eq!(rec.draw_counts(), vec![6], "switch flushed the first quad");
        add_unit(&mut b);
        b.end();
        assert_eq!(rec.draw_counts(), vec![6, 6]);

        let binds: Vec<_> = rec
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                GlCall::BindTexture { texture, .. } => texture,
                _ => None,
            })
            .collect();
        assert_eq!(binds, vec![t1.id(), t2.id()]);
    }

    #[test]
    fn never_exceeds_capacity() {
        let (rec, gl) = recorder(4);
        let mut b = batch(gl);
        b.begin(10.0, 10.0, false);
        for n in 1..=10 {
            add_unit(&mut b);
            assert!(b.pending_quads() < b.max_quads(), "after {n} adds");
        }
        b.end();
        // 4 + 4 flushed at capacity, 2 at end
        assert_eq!(rec.draw_counts(), vec![24, 24, 12]);
    }

    #[test]
    fn quad_record_layout() {
        let (rec, gl) = recorder(8);
        let mut b = batch(gl);
        let xf = Affine2::from_scale_angle_translation(
            glam::Vec2::new(2.0, 3.0),
            0.0,
            glam::Vec2::new(5.0, 7.0),
        );
        b.begin(10.0, 10.0, false);
        b.add_quad_bounds(0x11223344, &xf, 1.0, 2.0, 5.0, 10.0, 0.25, 0.5, 0.75, 1.0);
        b.end();
        let data = rec
            .calls()
            .into_iter()
            .find_map(|c| match c {
                GlCall::Uniform4fv { data, .. } => Some(data),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            data,
            vec![
                8.0,  // m00 * w
                0.0,  // m01 * w
                0.0,  // m10 * h
                24.0, // m11 * h
                7.0,  // tx + m00 * x
                13.0, // ty + m11 * y
                0.25,
                0.5,
                0.5,
                0.5,
                (0x11 * 256 + 0x22) as f32,
                (0x33 * 256 + 0x44) as f32,
            ]
        );
    }

    #[test]
    #[should_panic(expected = "UniformQuadBatch: mismatched begin()")]
    fn begin_twice_panics() {
        let (_rec, gl) = recorder(8);
        let mut b = batch(gl);
        b.begin(1.0, 1.0, false);
        b.begin(1.0, 1.0, false);
    }

    #[test]
    #[should_panic(expected = "UniformQuadBatch: add_quad outside begin()/end()")]
    fn add_while_idle_panics() {
        let (_rec, gl) = recorder(8);
        let mut b = batch(gl);
        add_unit(&mut b);
    }

    #[test]
    fn close_releases_everything_once() {
        let (rec, gl) = recorder(8);
        let mut b = batch(gl);
        assert_eq!(rec.live_buffers(), 2);
        b.close();
        b.close();
        assert_eq!(rec.live_buffers(), 0);
        assert_eq!(rec.live_programs(), 0);
        drop(b);
        assert_eq!(
            rec.count_calls(|c| matches!(c, GlCall::DeleteBuffer(_))),
            2,
            "drop after close deletes nothing"
        );
    }

    #[test]
    fn drop_releases_buffers() {
        let (rec, gl) = recorder(8);
        drop(batch(gl));
        assert_eq!(rec.live_buffers(), 0);
        assert_eq!(rec.live_programs(), 0);
    }

    #[test]
    fn custom_source_is_compiled() {
        let (rec, gl) = recorder(8);
        let source = QuadShaderSource {
            fragment: "void main(void) { gl_FragColor = vec4(1.0); }".into(),
            ..QuadShaderSource::default()
        };
        let _b = UniformQuadBatch::with_source(
            gl,
            &RenderConfig::default(),
            Rc::new(RenderStats::new()),
            &source,
        )
        .unwrap();
        let sources = rec.shader_sources();
        assert!(sources[0].contains("u_Data[3*8]"));
        assert_eq!(sources[1], "void main(void) { gl_FragColor = vec4(1.0); }");
    }
}
