use std::fmt::{Display, Formatter};
use wgpu::naga::WithSpan;
use wgpu::naga::front::wgsl;
use wgpu::naga::front::wgsl::ParseError;
use wgpu::naga::valid::{Capabilities, ModuleInfo, ValidationError, ValidationFlags, Validator};

#[derive(Debug)]
pub enum ShaderValidError {
    Parse(ParseError),
    Validation(Box<WithSpan<ValidationError>>),
}

impl ShaderValidError {
    /// Renders the diagnostic with source spans, the way naga prints it to a terminal.
    pub fn emit_to_string(&self, source: &str) -> String {
        match self {
            ShaderValidError::Parse(e) => e.emit_to_string(source),
            ShaderValidError::Validation(e) => e.emit_to_string(source),
        }
    }
}

impl Display for ShaderValidError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderValidError::Parse(e) => write!(f, "{e}"),
            ShaderValidError::Validation(e) => write!(f, "{}", e.as_inner()),
        }
    }
}

impl std::error::Error for ShaderValidError {}

pub fn validate_wgsl_source(shader: &str) -> Result<ModuleInfo, ShaderValidError> {
    let module = wgsl::parse_str(shader).map_err(ShaderValidError::Parse)?;
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator
        .validate(&module)
        .map_err(|e| ShaderValidError::Validation(Box::new(e)))
}
