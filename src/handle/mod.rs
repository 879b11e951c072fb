//! Buffer handle: the self-describing, validatable descriptor for one
//! allocated graphics buffer, plus its cross-process wire format.

pub mod attrs;
pub mod descriptor;
pub mod flags;
#[allow(clippy::module_inception)]
pub mod handle;
pub mod wire;

pub use attrs::{BufferAttributes, CropRect};
pub use descriptor::ShareDescriptor;
pub use flags::{lock_state, BufferUsage, HandleFlags, PixelFormat, YuvInfo};
pub use handle::{BufferHandle, HANDLE_MAGIC};
pub use wire::{WireHandle, WireHeader, WireVersion};
