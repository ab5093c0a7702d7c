//! [`Gl`] over a `glow::Context`.
//!
//! Every method is a direct forward. The `unsafe` blocks are sound as long as
//! the context is current on the calling thread, which `GlowGl` cannot check;
//! that is the caller's contract when constructing it.

use glow::{HasContext, PixelUnpackData};

use super::{BufferId, FramebufferId, Gl, ProgramId, ShaderId, TextureId, UniformLocation};

pub struct GlowGl {
    gl: glow::Context,
}

impl GlowGl {
    /// Wraps a context that is current on this thread.
    pub fn new(gl: glow::Context) -> Self {
        Self { gl }
    }

    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn created<T>(what: &str, result: Result<T, String>) -> Option<T> {
    result
        .map_err(|e| log::warn!("glow: create {what} failed: {e}"))
        .ok()
}

fn loc(location: &UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(location.0)
}

impl Gl for GlowGl {
    fn get_integer(&self, pname: u32) -> i32 {
        unsafe { self.gl.get_parameter_i32(pname) }
    }

    fn get_error(&self) -> u32 {
        unsafe { self.gl.get_error() }
    }

    fn create_buffer(&self) -> Option<BufferId> {
        created("buffer", unsafe { self.gl.create_buffer() }).map(|b| BufferId(b.0))
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        unsafe { self.gl.bind_buffer(target, buffer.map(|b| glow::NativeBuffer(b.0))) }
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        unsafe { self.gl.buffer_data_u8_slice(target, data, usage) }
    }

    fn delete_buffer(&self, buffer: BufferId) {
        unsafe { self.gl.delete_buffer(glow::NativeBuffer(buffer.0)) }
    }

    fn create_texture(&self) -> Option<TextureId> {
        created("texture", unsafe { self.gl.create_texture() }).map(|t| TextureId(t.0))
    }

    fn bind_texture(&self, target: u32, texture: Option<TextureId>) {
        unsafe { self.gl.bind_texture(target, texture.map(|t| glow::NativeTexture(t.0))) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(unit) }
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        unsafe { self.gl.tex_parameter_i32(target, pname, value) }
    }

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
    ) {
        unsafe {
            self.gl.tex_image_2d(
                target,
                level,
                internal_format,
                width,
                height,
                0,
                format,
                ty,
                PixelUnpackData::Slice(pixels),
            )
        }
    }

    fn generate_mipmap(&self, target: u32) {
        unsafe { self.gl.generate_mipmap(target) }
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { self.gl.delete_texture(glow::NativeTexture(texture.0)) }
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        created("framebuffer", unsafe { self.gl.create_framebuffer() }).map(|f| FramebufferId(f.0))
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: Option<FramebufferId>) {
        unsafe {
            self.gl
                .bind_framebuffer(target, framebuffer.map(|f| glow::NativeFramebuffer(f.0)))
        }
    }

    fn framebuffer_texture_2d(
        &self,
        target: u32,
        attachment: u32,
        tex_target: u32,
        texture: Option<TextureId>,
        level: i32,
    ) {
        unsafe {
            self.gl.framebuffer_texture_2d(
                target,
                attachment,
                tex_target,
                texture.map(|t| glow::NativeTexture(t.0)),
                level,
            )
        }
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        unsafe { self.gl.check_framebuffer_status(target) }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        unsafe { self.gl.delete_framebuffer(glow::NativeFramebuffer(framebuffer.0)) }
    }

    fn create_shader(&self, kind: u32) -> Option<ShaderId> {
        created("shader", unsafe { self.gl.create_shader(kind) }).map(|s| ShaderId(s.0))
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        unsafe { self.gl.shader_source(glow::NativeShader(shader.0), source) }
    }

    fn compile_shader(&self, shader: ShaderId) {
        unsafe { self.gl.compile_shader(glow::NativeShader(shader.0)) }
    }

    fn shader_compile_status(&self, shader: ShaderId) -> bool {
        unsafe { self.gl.get_shader_compile_status(glow::NativeShader(shader.0)) }
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        unsafe { self.gl.get_shader_info_log(glow::NativeShader(shader.0)) }
    }

    fn delete_shader(&self, shader: ShaderId) {
        unsafe { self.gl.delete_shader(glow::NativeShader(shader.0)) }
    }

    fn create_program(&self) -> Option<ProgramId> {
        created("program", unsafe { self.gl.create_program() }).map(|p| ProgramId(p.0))
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        unsafe {
            self.gl
                .attach_shader(glow::NativeProgram(program.0), glow::NativeShader(shader.0))
        }
    }

    fn link_program(&self, program: ProgramId) {
        unsafe { self.gl.link_program(glow::NativeProgram(program.0)) }
    }

    fn program_link_status(&self, program: ProgramId) -> bool {
        unsafe { self.gl.get_program_link_status(glow::NativeProgram(program.0)) }
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        unsafe { self.gl.get_program_info_log(glow::NativeProgram(program.0)) }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.map(|p| glow::NativeProgram(p.0))) }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { self.gl.delete_program(glow::NativeProgram(program.0)) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        unsafe { self.gl.get_uniform_location(glow::NativeProgram(program.0), name) }
            .map(|l| UniformLocation(l.0))
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(glow::NativeProgram(program.0), name) }
    }

    fn uniform_1i(&self, location: &UniformLocation, x: i32) {
        unsafe { self.gl.uniform_1_i32(Some(&loc(location)), x) }
    }

    fn uniform_1f(&self, location: &UniformLocation, x: f32) {
        unsafe { self.gl.uniform_1_f32(Some(&loc(location)), x) }
    }

    fn uniform_2f(&self, location: &UniformLocation, x: f32, y: f32) {
        unsafe { self.gl.uniform_2_f32(Some(&loc(location)), x, y) }
    }

    fn uniform_4fv(&self, location: &UniformLocation, data: &[f32]) {
        unsafe { self.gl.uniform_4_f32_slice(Some(&loc(location)), data) }
    }

    fn uniform_matrix_2fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_2_f32_slice(Some(&loc(location)), transpose, data)
        }
    }

    fn uniform_matrix_3fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_3_f32_slice(Some(&loc(location)), transpose, data)
        }
    }

    fn uniform_matrix_4fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&loc(location)), transpose, data)
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer(
        &self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        // The `_f32` variant is glVertexAttribPointer; integer data is
        // converted to float by the driver.
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, ty, normalized, stride, offset)
        }
    }

    fn draw_elements(&self, mode: u32, count: i32, ty: u32, offset: i32) {
        unsafe { self.gl.draw_elements(mode, count, ty, offset) }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.scissor(x, y, width, height) }
    }

    fn enable(&self, cap: u32) {
        unsafe { self.gl.enable(cap) }
    }

    fn disable(&self, cap: u32) {
        unsafe { self.gl.disable(cap) }
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn clear(&self, mask: u32) {
        unsafe { self.gl.clear(mask) }
    }

    fn blend_func(&self, src: u32, dst: u32) {
        unsafe { self.gl.blend_func(src, dst) }
    }
}
