//! In-memory [`Gl`] that records calls instead of issuing them.
//!
//! Handles come from one counter shared across object kinds, so ids never
//! collide between a texture and a buffer. Deleting an unknown or already
//! deleted handle is logged and recorded, but has no other effect, which
//! mirrors what drivers do with stale names.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use super::{
    BufferId, FramebufferId, Gl, ProgramId, ShaderId, TextureId, UniformLocation, consts,
};

/// One recorded GL call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    GetInteger { pname: u32 },
    CreateBuffer(BufferId),
    BindBuffer { target: u32, buffer: Option<BufferId> },
    BufferData { target: u32, len: usize, usage: u32 },
    DeleteBuffer(BufferId),
    CreateTexture(TextureId),
    BindTexture { target: u32, texture: Option<TextureId> },
    ActiveTexture(u32),
    TexParameter { target: u32, pname: u32, value: i32 },
    TexImage2D {
        width: i32,
        height: i32,
        format: u32,
        /// Byte length of the upload, `None` for an allocation only.
        len: Option<usize>,
    },
    GenerateMipmap(u32),
    DeleteTexture(TextureId),
    CreateFramebuffer(FramebufferId),
    BindFramebuffer { framebuffer: Option<FramebufferId> },
    FramebufferTexture2D { attachment: u32, texture: Option<TextureId> },
    CheckFramebufferStatus,
    DeleteFramebuffer(FramebufferId),
    CreateShader { kind: u32, shader: ShaderId },
    ShaderSource { shader: ShaderId },
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    AttachShader { program: ProgramId, shader: ShaderId },
    LinkProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    DeleteProgram(ProgramId),
    Uniform1i { location: UniformLocation, x: i32 },
    Uniform1f { location: UniformLocation, x: f32 },
    Uniform2f { location: UniformLocation, x: f32, y: f32 },
    Uniform4fv { location: UniformLocation, data: Vec<f32> },
    UniformMatrix { size: u8, location: UniformLocation, transpose: bool, data: Vec<f32> },
    EnableVertexAttribArray(u32),
    DisableVertexAttribArray(u32),
    VertexAttribPointer { index: u32, size: i32, ty: u32, normalized: bool, stride: i32, offset: i32 },
    DrawElements { mode: u32, count: i32, ty: u32, offset: i32 },
    Viewport { x: i32, y: i32, width: i32, height: i32 },
    Scissor { x: i32, y: i32, width: i32, height: i32 },
    Enable(u32),
    Disable(u32),
    ClearColor([f32; 4]),
    Clear(u32),
    BlendFunc { src: u32, dst: u32 },
}

struct State {
    calls: Vec<GlCall>,
    next_id: u32,
    buffers: HashSet<u32>,
    textures: HashSet<u32>,
    framebuffers: HashSet<u32>,
    shaders: HashSet<u32>,
    programs: HashSet<u32>,
    shader_sources: HashMap<u32, String>,
    uniforms: HashMap<(u32, String), u32>,
    missing_uniforms: HashSet<String>,
    errors: VecDeque<u32>,
    max_vertex_uniform_vectors: i32,
    compile_failure: Option<String>,
    link_failure: Option<String>,
    framebuffer_status: u32,
    enabled_caps: HashSet<u32>,
    scissor: Option<(i32, i32, i32, i32)>,
}

pub struct RecordingGl {
    state: RefCell<State>,
}

impl Default for RecordingGl {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingGl {
    /// A recorder reporting 256 vertex uniform vectors, the GLES 2.0 minimum
    /// guaranteed by most desktop drivers.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                calls: Vec::new(),
                next_id: 1,
                buffers: HashSet::new(),
                textures: HashSet::new(),
                framebuffers: HashSet::new(),
                shaders: HashSet::new(),
                programs: HashSet::new(),
                shader_sources: HashMap::new(),
                uniforms: HashMap::new(),
                missing_uniforms: HashSet::new(),
                errors: VecDeque::new(),
                max_vertex_uniform_vectors: 256,
                compile_failure: None,
                link_failure: None,
                framebuffer_status: consts::FRAMEBUFFER_COMPLETE,
                enabled_caps: HashSet::new(),
                scissor: None,
            }),
        }
    }

    pub fn with_max_vertex_uniform_vectors(self, vectors: i32) -> Self {
        self.state.borrow_mut().max_vertex_uniform_vectors = vectors;
        self
    }

    /// Every subsequent shader compile fails with `log`.
    pub fn fail_shader_compile(&self, log: &str) {
        self.state.borrow_mut().compile_failure = Some(log.to_string());
    }

    /// Every subsequent program link fails with `log`.
    pub fn fail_program_link(&self, log: &str) {
        self.state.borrow_mut().link_failure = Some(log.to_string());
    }

    pub fn set_framebuffer_status(&self, status: u32) {
        self.state.borrow_mut().framebuffer_status = status;
    }

    /// Makes `uniform_location` report `name` as absent.
    pub fn hide_uniform(&self, name: &str) {
        self.state.borrow_mut().missing_uniforms.insert(name.to_string());
    }

    /// Queues an error code for the next `get_error`.
    pub fn push_error(&self, code: u32) {
        self.state.borrow_mut().errors.push_back(code);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.state.borrow().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<GlCall> {
        std::mem::take(&mut self.state.borrow_mut().calls)
    }

    pub fn count_calls(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// Index counts of every `draw_elements` call, in order.
    pub fn draw_counts(&self) -> Vec<i32> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                GlCall::DrawElements { count, .. } => Some(*count),
                _ => None,
            })
            .collect()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state.borrow().framebuffers.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn is_texture_live(&self, texture: TextureId) -> bool {
        self.state.borrow().textures.contains(&texture.raw())
    }

    pub fn is_enabled(&self, cap: u32) -> bool {
        self.state.borrow().enabled_caps.contains(&cap)
    }

    /// The most recent scissor box, as `(x, y, width, height)`.
    pub fn current_scissor(&self) -> Option<(i32, i32, i32, i32)> {
        self.state.borrow().scissor
    }

    /// Sources handed to `shader_source`, in creation order.
    pub fn shader_sources(&self) -> Vec<String> {
        let state = self.state.borrow();
        let mut ids: Vec<_> = state.shader_sources.keys().copied().collect();
        ids.sort_unstable();
        ids.iter().map(|id| state.shader_sources[id].clone()).collect()
    }

    fn record(&self, call: GlCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn alloc(&self, pick: impl FnOnce(&mut State) -> &mut HashSet<u32>) -> u32 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        pick(&mut state).insert(id);
        id
    }

    fn free(&self, kind: &str, id: u32, pick: impl FnOnce(&mut State) -> &mut HashSet<u32>) {
        let mut state = self.state.borrow_mut();
        if !pick(&mut state).remove(&id) {
            log::warn!("RecordingGl: delete of unknown {kind} {id}");
        }
    }
}

impl Gl for RecordingGl {
    fn get_integer(&self, pname: u32) -> i32 {
        self.record(GlCall::GetInteger { pname });
        match pname {
            consts::MAX_VERTEX_UNIFORM_VECTORS => self.state.borrow().max_vertex_uniform_vectors,
            _ => 0,
        }
    }

    fn get_error(&self) -> u32 {
        self.state
            .borrow_mut()
            .errors
            .pop_front()
            .unwrap_or(consts::NO_ERROR)
    }

    fn create_buffer(&self) -> Option<BufferId> {
        let id = BufferId::from_raw(self.alloc(|s| &mut s.buffers))?;
        self.record(GlCall::CreateBuffer(id));
        Some(id)
    }

    fn bind_buffer(&self, target: u32, buffer: Option<BufferId>) {
        self.record(GlCall::BindBuffer { target, buffer });
    }

    fn buffer_data(&self, target: u32, data: &[u8], usage: u32) {
        self.record(GlCall::BufferData { target, len: data.len(), usage });
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.free("buffer", buffer.raw(), |s| &mut s.buffers);
        self.record(GlCall::DeleteBuffer(buffer));
    }

    fn create_texture(&self) -> Option<TextureId> {
        let id = TextureId::from_raw(self.alloc(|s| &mut s.textures))?;
        self.record(GlCall::CreateTexture(id));
        Some(id)
    }

    fn bind_texture(&self, target: u32, texture: Option<TextureId>) {
        self.record(GlCall::BindTexture { target, texture });
    }

    fn active_texture(&self, unit: u32) {
        self.record(GlCall::ActiveTexture(unit));
    }

    fn tex_parameter_i32(&self, target: u32, pname: u32, value: i32) {
        self.record(GlCall::TexParameter { target, pname, value });
    }

    fn tex_image_2d(
        &self,
        _target: u32,
        _level: i32,
        _internal_format: i32,
        width: i32,
        height: i32,
        format: u32,
        _ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(GlCall::TexImage2D {
            width,
            height,
            format,
            len: pixels.map(<[u8]>::len),
        });
    }

    fn generate_mipmap(&self, target: u32) {
        self.record(GlCall::GenerateMipmap(target));
    }

    fn delete_texture(&self, texture: TextureId) {
        self.free("texture", texture.raw(), |s| &mut s.textures);
        self.record(GlCall::DeleteTexture(texture));
    }

    fn create_framebuffer(&self) -> Option<FramebufferId> {
        let id = FramebufferId::from_raw(self.alloc(|s| &mut s.framebuffers))?;
        self.record(GlCall::CreateFramebuffer(id));
        Some(id)
    }

    fn bind_framebuffer(&self, _target: u32, framebuffer: Option<FramebufferId>) {
        self.record(GlCall::BindFramebuffer { framebuffer });
    }

    fn framebuffer_texture_2d(
        &self,
        _target: u32,
        attachment: u32,
        _tex_target: u32,
        texture: Option<TextureId>,
        _level: i32,
    ) {
        self.record(GlCall::FramebufferTexture2D { attachment, texture });
    }

    fn check_framebuffer_status(&self, _target: u32) -> u32 {
        self.record(GlCall::CheckFramebufferStatus);
        self.state.borrow().framebuffer_status
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.free("framebuffer", framebuffer.raw(), |s| &mut s.framebuffers);
        self.record(GlCall::DeleteFramebuffer(framebuffer));
    }

    fn create_shader(&self, kind: u32) -> Option<ShaderId> {
        let shader = ShaderId::from_raw(self.alloc(|s| &mut s.shaders))?;
        self.record(GlCall::CreateShader { kind, shader });
        Some(shader)
    }

    fn shader_source(&self, shader: ShaderId, source: &str) {
        self.state
            .borrow_mut()
            .shader_sources
            .insert(shader.raw(), source.to_string());
        self.record(GlCall::ShaderSource { shader });
    }

    fn compile_shader(&self, shader: ShaderId) {
        self.record(GlCall::CompileShader(shader));
    }

    fn shader_compile_status(&self, _shader: ShaderId) -> bool {
        self.state.borrow().compile_failure.is_none()
    }

    fn shader_info_log(&self, _shader: ShaderId) -> String {
        self.state.borrow().compile_failure.clone().unwrap_or_default()
    }

    fn delete_shader(&self, shader: ShaderId) {
        self.free("shader", shader.raw(), |s| &mut s.shaders);
        self.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Option<ProgramId> {
        let id = ProgramId::from_raw(self.alloc(|s| &mut s.programs))?;
        self.record(GlCall::CreateProgram(id));
        Some(id)
    }

    fn attach_shader(&self, program: ProgramId, shader: ShaderId) {
        self.record(GlCall::AttachShader { program, shader });
    }

    fn link_program(&self, program: ProgramId) {
        self.record(GlCall::LinkProgram(program));
    }

    fn program_link_status(&self, _program: ProgramId) -> bool {
        self.state.borrow().link_failure.is_none()
    }

    fn program_info_log(&self, _program: ProgramId) -> String {
        self.state.borrow().link_failure.clone().unwrap_or_default()
    }

    fn use_program(&self, program: Option<ProgramId>) {
        self.record(GlCall::UseProgram(program));
    }

    fn delete_program(&self, program: ProgramId) {
        self.free("program", program.raw(), |s| &mut s.programs);
        self.record(GlCall::DeleteProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let mut state = self.state.borrow_mut();
        if state.missing_uniforms.contains(name) {
            return None;
        }
        let next = state
            .uniforms
            .keys()
            .filter(|(p, _)| *p == program.raw())
            .count() as u32;
        let loc = *state
            .uniforms
            .entry((program.raw(), name.to_string()))
            .or_insert(next);
        Some(UniformLocation(loc))
    }

    fn attrib_location(&self, _program: ProgramId, _name: &str) -> Option<u32> {
        Some(0)
    }

    fn uniform_1i(&self, location: &UniformLocation, x: i32) {
        self.record(GlCall::Uniform1i { location: *location, x });
    }

    fn uniform_1f(&self, location: &UniformLocation, x: f32) {
        self.record(GlCall::Uniform1f { location: *location, x });
    }

    fn uniform_2f(&self, location: &UniformLocation, x: f32, y: f32) {
        self.record(GlCall::Uniform2f { location: *location, x, y });
    }

    fn uniform_4fv(&self, location: &UniformLocation, data: &[f32]) {
        self.record(GlCall::Uniform4fv { location: *location, data: data.to_vec() });
    }

    fn uniform_matrix_2fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        self.record(GlCall::UniformMatrix { size: 2, location: *location, transpose, data: data.to_vec() });
    }

    fn uniform_matrix_3fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        self.record(GlCall::UniformMatrix { size: 3, location: *location, transpose, data: data.to_vec() });
    }

    fn uniform_matrix_4fv(&self, location: &UniformLocation, transpose: bool, data: &[f32]) {
        self.record(GlCall::UniformMatrix { size: 4, location: *location, transpose, data: data.to_vec() });
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::EnableVertexAttribArray(index));
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        self.record(GlCall::DisableVertexAttribArray(index));
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
        self.record(GlCall::VertexAttribPointer { index, size, ty, normalized, stride, offset });
    }

    fn draw_elements(&self, mode: u32, count: i32, ty: u32, offset: i32) {
        self.record(GlCall::DrawElements { mode, count, ty, offset });
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        self.record(GlCall::Viewport { x, y, width, height });
    }

    fn scissor(&self, x: i32, y: i32, width: i32, height: i32) {
        self.state.borrow_mut().scissor = Some((x, y, width, height));
        self.record(GlCall::Scissor { x, y, width, height });
    }

    fn enable(&self, cap: u32) {
        self.state.borrow_mut().enabled_caps.insert(cap);
        self.record(GlCall::Enable(cap));
    }

    fn disable(&self, cap: u32) {
        self.state.borrow_mut().enabled_caps.remove(&cap);
        self.record(GlCall::Disable(cap));
    }

    fn clear_color(&self, r: f32, g: f32, b: f32, a: f32) {
        self.record(GlCall::ClearColor([r, g, b, a]));
    }

    fn clear(&self, mask: u32) {
        self.record(GlCall::Clear(mask));
    }

    fn blend_func(&self, src: u32, dst: u32) {
        self.record(GlCall::BlendFunc { src, dst });
    }
}
