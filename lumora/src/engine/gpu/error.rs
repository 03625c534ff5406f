use snafu::Snafu;
use std::sync::Arc;

/// Failures at the device boundary.
///
/// Cloneable, since a failed pipeline build is handed to every caller that waited on it.
#[derive(Debug, Clone, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum GpuError {
    #[snafu(display("Unknown {kind} {id} referenced"))]
    UnknownResource { kind: &'static str, id: u64 },

    #[snafu(display("Shader module \"{label}\" failed to compile: {message}"))]
    ShaderCompilation { label: String, message: Arc<str> },

    #[snafu(display("Render pipeline \"{label}\" could not be created: {message}"))]
    PipelineCreation { label: String, message: Arc<str> },

    #[snafu(display("The device rejected the operation: {message}"))]
    Rejected { message: Arc<str> },

    #[snafu(display("No suitable graphics adapter was found: {message}"))]
    AdapterRequest { message: Arc<str> },

    #[snafu(display("The graphics device could not be opened: {message}"))]
    DeviceRequest { message: Arc<str> },

    #[snafu(display("A background GPU task did not finish: {message}"))]
    TaskJoin { message: Arc<str> },
}
