//! # Vermeer - Graphics Buffer Allocation & Sharing Layer
//!
//! Vermeer allocates device memory buffers usable by a GPU, a display
//! controller and multiple cooperating processes, and hands out opaque,
//! self-describing handles that let a receiving process independently
//! reconstruct a usable memory mapping without trusting the sender.
//!
//! ## Features
//!
//! - **Self-describing handles**: versioned fixed-layout wire format with
//!   structural validation before any field is trusted
//! - **Cross-process sharing**: fd-like share descriptors re-mapped per
//!   process through an explicit register/unregister protocol
//! - **Lock/unlock protocol**: non-blocking CPU-access windows with device
//!   cache sync on write-unlock
//! - **Pluggable backend**: the physical heap allocator is an injected
//!   capability with a documented unavailable state
//! - **Shared attribute area**: extended per-buffer metadata in a second
//!   small shared region
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                 Vermeer Core                      │
//! ├───────────────────────────────────────────────────┤
//! │  BufferHandle + wire   │  BufferMapper (registry) │
//! │  - validation          │  - register/unregister   │
//! │  - versioned layout    │  - lock/unlock           │
//! └───────────────────────────────────────────────────┘
//!            │                        │
//!            ▼                        ▼
//! ┌──────────────────┐   ┌──────────────────────────┐
//! │  Device surface  │   │   AllocationBackend      │
//! │  (gpu0 / fb0)    │   │   (memfd, heap drivers)  │
//! └──────────────────┘   └──────────────────────────┘
//! ```
//!
//! Control flow: a process opens the allocator device and allocates a
//! buffer, receiving a handle; the handle may travel to another process by
//! value through IPC; the receiver registers it to get a local mapping;
//! either process brackets CPU access with lock/unlock; the mapping owner
//! unregisters, and the allocating process frees.

pub mod backend;
pub mod device;
pub mod error;
pub mod handle;
pub mod registry;

// Main API re-exports
pub use backend::{Allocation, AllocationBackend, Backend};
#[cfg(all(unix, target_os = "linux"))]
pub use backend::MemFdBackend;
pub use device::{
    open, BufferDescriptor, Device, DeviceClass, FramebufferConfig, FramebufferDevice,
    GraphicsAllocator, ModuleConfig,
};
pub use error::{Result, VermeerError};
pub use handle::{
    lock_state, BufferAttributes, BufferHandle, BufferUsage, CropRect, HandleFlags, PixelFormat,
    ShareDescriptor, WireHandle, WireHeader, WireVersion, YuvInfo, HANDLE_MAGIC,
};
pub use registry::{AccessRegion, BufferMapper, MapperStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Page size buffers are rounded up to
    pub const PAGE_SIZE: u32 = 4096;

    /// Row stride alignment in pixels
    pub const STRIDE_ALIGN_PIXELS: u32 = 16;

    /// Size of the shared attribute area backing each buffer
    pub const ATTRIBUTE_REGION_SIZE: usize = 4096;

    /// Default number of framebuffer swap buffers
    pub const NUM_FB_BUFFERS: u32 = 2;
}
