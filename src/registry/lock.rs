//! CPU-access lock/unlock protocol
//!
//! Lock and unlock are metadata operations on the per-frame hot path: no
//! blocking, no waiting on buffer readiness, and no failure modes beyond a
//! malformed handle. They deliberately bypass the mapper's register mutex;
//! they only touch per-handle fields and the backend sync call, which is
//! safe for concurrent use on different handles. Serializing concurrent
//! lock/unlock on the *same* handle is the caller's job, as is
//! producer/consumer exclusion (a higher-level fence protocol owns that;
//! this layer does not enforce single-writer access).

use std::ptr::NonNull;

use log::warn;

use crate::{
    error::Result,
    handle::{BufferHandle, BufferUsage},
};

use super::mapper::BufferMapper;

/// Region of a buffer the caller intends to access, in pixels.
///
/// Advisory only: mappings cover the whole buffer, so the region does not
/// change the returned address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl AccessRegion {
    /// The full extent of a buffer
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
        }
    }
}

impl BufferMapper {
    /// Open a CPU-access window on a buffer.
    ///
    /// Records whether the caller requested write access; that flag decides
    /// the cache sync at unlock time. Returns the process-local address
    /// when the usage asks for CPU read or write and the buffer is mapped;
    /// GPU-only usage gets no pointer.
    pub fn lock(
        &self,
        handle: &mut BufferHandle,
        usage: BufferUsage,
        _region: AccessRegion,
    ) -> Result<Option<NonNull<u8>>> {
        handle.validate()?;

        if handle.is_heap_backed() {
            handle.write_owner = usage.wants_cpu_write();
        }

        if usage.wants_cpu_access() {
            return Ok(NonNull::new(handle.base() as *mut u8));
        }
        Ok(None)
    }

    /// Close a CPU-access window.
    ///
    /// If the matching lock requested write access, issues exactly one
    /// device cache sync keyed by the handle's share descriptor so CPU
    /// writes are visible to GPU/display consumers before the caller
    /// signals buffer-ready. Backend unavailability or sync failure is
    /// logged, never surfaced: forward progress beats strict signaling
    /// here.
    pub fn unlock(&self, handle: &mut BufferHandle) -> Result<()> {
        handle.validate()?;

        if handle.is_heap_backed() && handle.write_owner() {
            match self.backend().get() {
                Ok(backend) => {
                    if let Err(e) = backend.sync_for_device(handle.share) {
                        warn!(
                            "device cache sync failed for buffer {}: {}",
                            handle.buffer_id(),
                            e
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "cannot sync buffer {} for device: {}",
                        handle.buffer_id(),
                        e
                    );
                }
            }
            handle.write_owner = false;
        }

        Ok(())
    }
}
