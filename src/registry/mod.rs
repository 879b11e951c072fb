//! Per-process registry of mapped buffers and the CPU-access protocol

pub mod lock;
pub mod mapper;
pub(crate) mod table;

pub use lock::AccessRegion;
pub use mapper::{BufferMapper, MapperStats};
