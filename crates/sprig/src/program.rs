//! Vertex + fragment shader program.

use std::rc::Rc;

use crate::error::{RenderError, Result};
use crate::gl::{Gl, ProgramId, ShaderId, UniformLocation, check_gl_error, consts};

/// A linked GL program and its two shaders.
///
/// Deleted on [`close`](Self::close) or drop, whichever comes first.
pub struct ShaderProgram {
    gl: Rc<dyn Gl>,
    id: ProgramId,
    vertex: ShaderId,
    fragment: ShaderId,
    closed: bool,
}

impl ShaderProgram {
    /// Compiles both stages and links them. On any failure every object
    /// created so far is deleted before the error is returned.
    pub fn new(gl: Rc<dyn Gl>, vertex_src: &str, fragment_src: &str, check_errors: bool) -> Result<Self> {
        let id = gl.create_program().ok_or_else(|| RenderError::Driver {
            op: "glCreateProgram",
            code: gl.get_error(),
        })?;
        check_gl_error(&*gl, check_errors, "glCreateProgram");

        let vertex = match compile(&*gl, consts::VERTEX_SHADER, vertex_src) {
            Ok(s) => s,
            Err(e) => {
                gl.delete_program(id);
                return Err(e);
            }
        };
        gl.attach_shader(id, vertex);

        let fragment = match compile(&*gl, consts::FRAGMENT_SHADER, fragment_src) {
            Ok(s) => s,
            Err(e) => {
                gl.delete_shader(vertex);
                gl.delete_program(id);
                return Err(e);
            }
        };
        gl.attach_shader(id, fragment);
        check_gl_error(&*gl, check_errors, "glAttachShader");

        gl.link_program(id);
        if !gl.program_link_status(id) {
            let log = gl.program_info_log(id);
            gl.delete_shader(vertex);
            gl.delete_shader(fragment);
            gl.delete_program(id);
            return Err(RenderError::ProgramLink { log });
        }

        log::debug!("linked program {}", id.raw());
        Ok(Self {
            gl,
            id,
            vertex,
            fragment,
            closed: false,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn activate(&self) {
        self.gl.use_program(Some(self.id));
    }

    pub fn uniform_location(&self, name: &str) -> Result<UniformLocation> {
        self.gl
            .uniform_location(self.id, name)
            .ok_or_else(|| RenderError::MissingUniform(name.to_string()))
    }

    pub fn attrib_location(&self, name: &str) -> Result<u32> {
        self.gl
            .attrib_location(self.id, name)
            .ok_or_else(|| RenderError::MissingAttribute(name.to_string()))
    }

    /// Deletes the program and its shaders. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.gl.delete_shader(self.vertex);
        self.gl.delete_shader(self.fragment);
        self.gl.delete_program(self.id);
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.close();
    }
}

fn compile(gl: &dyn Gl, kind: u32, source: &str) -> Result<ShaderId> {
    let stage = if kind == consts::VERTEX_SHADER { "vertex" } else { "fragment" };
    let shader = gl.create_shader(kind).ok_or_else(|| RenderError::Driver {
        op: "glCreateShader",
        code: gl.get_error(),
    })?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.shader_compile_status(shader) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(RenderError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::RecordingGl;

    fn recorder() -> (Rc<RecordingGl>, Rc<dyn Gl>) {
        let rec = Rc::new(RecordingGl::new());
        let gl: Rc<dyn Gl> = rec.clone();
        (rec, gl)
    }

    #[test]
    fn links_and_closes() {
        let (rec, gl) = recorder();
        let mut program = ShaderProgram::new(gl, "vs", "fs", true).unwrap();
        assert_eq!(rec.live_programs(), 1);
        assert_eq!(rec.live_shaders(), 2);
        assert_eq!(rec.shader_sources(), vec!["vs".to_string(), "fs".to_string()]);
        program.close();
        program.close();
        assert_eq!(rec.live_programs(), 0);
        assert_eq!(rec.live_shaders(), 0);
    }

    #[test]
    fn compile_failure_cleans_up() {
        let (rec, gl) = recorder();
        rec.fail_shader_compile("0:1: syntax error");
        let err = ShaderProgram::new(gl, "vs", "fs", true).err().unwrap();
        assert!(matches!(err, RenderError::ShaderCompile { stage: "vertex", ref log } if log.contains("syntax")));
        assert_eq!(rec.live_programs(), 0);
        assert_eq!(rec.live_shaders(), 0);
    }

    #[test]
    fn link_failure_cleans_up() {
        let (rec, gl) = recorder();
        rec.fail_program_link("varying mismatch");
        let err = ShaderProgram::new(gl, "vs", "fs", true).err().unwrap();
        assert!(matches!(err, RenderError::ProgramLink { .. }));
        assert_eq!(rec.live_programs(), 0);
        assert_eq!(rec.live_shaders(), 0);
    }

    #[test]
    fn successful_link_leaves_pending_errors() {
        let (rec, gl) = recorder();
        rec.push_error(consts::INVALID_VALUE);
        let _program = ShaderProgram::new(gl, "vs", "fs", false).unwrap();
        assert_eq!(rec.get_error(), consts::INVALID_VALUE);
    }

    #[test]
    fn drop_deletes() {
        let (rec, gl) = recorder();
        {
            let _program = ShaderProgram::new(gl, "vs", "fs", false).unwrap();
        }
        assert_eq!(rec.live_programs(), 0);
    }

    #[test]
    fn missing_uniform_is_an_error() {
        let (rec, gl) = recorder();
        rec.hide_uniform("u_Gone");
        let program = ShaderProgram::new(gl, "vs", "fs", false).unwrap();
        assert!(program.uniform_location("u_Here").is_ok());
        assert!(matches!(
            program.uniform_location("u_Gone"),
            Err(RenderError::MissingUniform(name)) if name == "u_Gone"
        ));
    }
}
