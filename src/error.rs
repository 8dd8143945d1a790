use thiserror::Error;

/// Fatal errors raised while building the pipeline or its size-dependent
/// resources. A pipeline that failed construction must not be used.
#[derive(Error, Debug)]
pub enum GraphicsInitError {
    #[error("no compatible graphics adapter: {0}")]
    AdapterUnavailable(#[from] wgpu::RequestAdapterError),

    #[error("failed to create graphics device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("shader program `{0}` is not provided by the resource layer")]
    MissingShader(String),

    #[error("model buffer `{0}` is not provided by the resource layer")]
    MissingModel(String),

    #[error("model buffer `{name}` could not be decoded: {source}")]
    InvalidModel {
        name: String,
        #[source]
        source: MeshDecodeError,
    },

    #[error("invalid render target size {width}x{height} (device limit {limit})")]
    InvalidTargetSize { width: u32, height: u32, limit: u32 },

    #[error("GPU rejected {label}: {message}")]
    Validation { label: String, message: String },
}

/// Problems found while decoding a model byte buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshDecodeError {
    #[error("buffer holds {0} bytes, shorter than the model header")]
    Truncated(usize),

    #[error("buffer does not start with the model magic")]
    BadMagic,

    #[error("unsupported model version {0}")]
    UnsupportedVersion(u32),

    #[error("header declares {expected} bytes but the buffer holds {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("index {index} references vertex beyond count {vertex_count}")]
    IndexOutOfRange { index: u32, vertex_count: u32 },

    #[error("subset {subset} spans indices {start}..{end} beyond count {index_count}")]
    SubsetOutOfRange {
        subset: usize,
        start: u32,
        end: u32,
        index_count: u32,
    },
}

/// Errors reading a settings or configuration file.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("settings root must be a JSON object")]
    NotAnObject,
}
