//! Allocation backend: the physical memory-heap collaborator contract
//!
//! The core never talks to a kernel heap driver directly; everything goes
//! through [`AllocationBackend`]. The backend is injected once at context
//! construction as a [`Backend`], which has an explicit `Unavailable`
//! variant instead of a late runtime module lookup: calls that need the
//! backend get a clean [`BackendUnavailable`] error, and the per-frame
//! unlock path logs and carries on.
//!
//! [`BackendUnavailable`]: crate::error::VermeerError::BackendUnavailable

use std::sync::Arc;

use crate::error::{Result, VermeerError};
use crate::handle::{BufferUsage, ShareDescriptor};

#[cfg(all(unix, target_os = "linux"))]
pub mod memfd;

#[cfg(all(unix, target_os = "linux"))]
pub use memfd::MemFdBackend;

/// Result of one backend allocation: a transferable descriptor for the new
/// region plus backend metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Transferable reference to the allocated region
    pub descriptor: ShareDescriptor,
    /// Minimum physical page size backing the region
    pub min_page_size: u32,
}

/// Contract exposed to the core by the physical allocator backend.
///
/// Implementations own any persistent kernel session (heap client fd,
/// driver connection) internally; such sessions are opened lazily on first
/// use and never explicitly closed by this layer, an accepted
/// resource-lifetime gap inherited from the systems this models.
///
/// `map_local`/`unmap_local` may be called from the registry's serialized
/// path only; `sync_for_device` must be safe to call concurrently for
/// different descriptors.
pub trait AllocationBackend: Send + Sync {
    /// Allocate a region of at least `size` bytes suitable for `usage`
    fn allocate(&self, size: usize, usage: BufferUsage) -> Result<Allocation>;

    /// Establish a process-local mapping of a region received by
    /// descriptor. Returns the local base address.
    fn map_local(&self, descriptor: ShareDescriptor, size: usize) -> Result<u64>;

    /// Tear down a process-local mapping previously returned by
    /// `map_local`
    fn unmap_local(&self, base: u64, size: usize) -> Result<()>;

    /// Make CPU writes to the region visible to GPU/display consumers
    fn sync_for_device(&self, descriptor: ShareDescriptor) -> Result<()>;

    /// Release the underlying region. The descriptor is dead afterwards.
    fn release(&self, descriptor: ShareDescriptor) -> Result<()>;
}

/// Injected backend capability, resolved once at initialization
#[derive(Clone)]
pub enum Backend {
    /// A live backend
    Available(Arc<dyn AllocationBackend>),
    /// No backend reachable in this process; allocation-affecting calls
    /// fail, the hot-path calls degrade gracefully
    Unavailable,
}

impl Backend {
    /// Wrap a concrete backend
    pub fn available(backend: impl AllocationBackend + 'static) -> Self {
        Self::Available(Arc::new(backend))
    }

    /// Wrap an already-shared backend
    pub fn from_arc(backend: Arc<dyn AllocationBackend>) -> Self {
        Self::Available(backend)
    }

    /// Whether a backend is reachable
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Get the backend or fail with `BackendUnavailable`
    pub fn get(&self) -> Result<&Arc<dyn AllocationBackend>> {
        match self {
            Self::Available(backend) => Ok(backend),
            Self::Unavailable => Err(VermeerError::backend_unavailable(
                "no allocation backend injected in this process",
            )),
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Backend::Available"),
            Self::Unavailable => f.write_str("Backend::Unavailable"),
        }
    }
}
