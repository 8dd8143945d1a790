pub(crate) mod buffers;
pub(crate) mod shaders;
pub mod targets;
