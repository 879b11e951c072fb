//! Per-process buffer mapper: register/unregister bookkeeping
//!
//! One `BufferMapper` per process, constructed once at startup with the
//! injected backend. All register/unregister traffic is serialized by a
//! single mutex: backend mapping calls are not assumed reentrant, and the
//! side table of live mappings is shared state.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

use log::{error, warn};

use crate::{
    backend::Backend,
    config::ATTRIBUTE_REGION_SIZE,
    error::{Result, VermeerError},
    handle::{lock_state, BufferHandle, WireVersion},
};

use super::table::{LocalMapping, MappingTable};

/// Snapshot of mapper activity counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MapperStats {
    /// Buffers successfully registered since construction
    pub registered: usize,
    /// Buffers successfully unregistered since construction
    pub unregistered: usize,
    /// Buffers currently mapped in this process
    pub active: usize,
}

/// Per-process registry of mapped buffers.
///
/// The explicit context object replaces process-wide singleton state: tests
/// construct one per fake backend, production constructs one at startup and
/// passes it by reference.
#[derive(Debug)]
pub struct BufferMapper {
    backend: Backend,
    table: Mutex<MappingTable>,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
}

impl BufferMapper {
    /// Create a mapper over the injected backend
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            table: Mutex::new(MappingTable::new()),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        }
    }

    /// The injected backend capability
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Whether this process currently holds a mapping for the buffer
    pub fn is_registered(&self, handle: &BufferHandle) -> bool {
        self.table.lock().unwrap().contains(handle.buffer_id())
    }

    /// Activity counters
    pub fn stats(&self) -> MapperStats {
        MapperStats {
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
            active: self.table.lock().unwrap().len(),
        }
    }

    /// Establish a process-local mapping for a handle received from another
    /// process (or allocated here and not yet mapped).
    ///
    /// On success the handle's local fields are updated in place: the
    /// calling process becomes the local-mapping owner, `base` (and
    /// `attr_base` for attribute-area handles) point at the new mapping and
    /// the mapped bit is set.
    pub fn register_buffer(&self, handle: &mut BufferHandle) -> Result<()> {
        handle.validate().map_err(|e| {
            error!("refusing to register invalid buffer handle");
            e
        })?;

        if handle.is_framebuffer() {
            error!(
                "cannot register buffer {}: it is a framebuffer",
                handle.buffer_id()
            );
            return Err(VermeerError::unsupported(
                "framebuffers are pre-mapped by their producer and never registered",
            ));
        }
        if !handle.is_heap_backed() {
            error!(
                "cannot register buffer {}: unknown buffer flags {:#x}",
                handle.buffer_id(),
                handle.flags.bits()
            );
            return Err(VermeerError::unsupported("unknown buffer flags"));
        }

        let backend = self.backend.get()?;

        let mut table = self.table.lock().unwrap();

        if table.contains(handle.buffer_id()) {
            warn!(
                "buffer {} is already registered in this process",
                handle.buffer_id()
            );
            return Err(VermeerError::invalid_parameter(
                "handle",
                "buffer already registered in this process",
            ));
        }

        let base = backend.map_local(handle.share, handle.size as usize)?;

        let attr_base = if handle.version() == WireVersion::V2 && handle.attr_share.is_valid() {
            match backend.map_local(handle.attr_share, ATTRIBUTE_REGION_SIZE) {
                Ok(addr) => addr,
                Err(e) => {
                    if let Err(unmap_err) = backend.unmap_local(base, handle.size as usize) {
                        warn!("rollback unmap failed: {}", unmap_err);
                    }
                    return Err(e);
                }
            }
        } else {
            0
        };

        // Registration takes local-mapping ownership, whichever process
        // allocated the buffer.
        handle.owner_pid = std::process::id();
        handle.base = base;
        handle.attr_base = attr_base;
        handle.lock_state |= lock_state::MAPPED;

        table.insert(
            handle.buffer_id(),
            LocalMapping {
                base,
                attr_base,
                size: handle.size,
            },
        );
        self.registered.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Tear down the process-local mapping for a handle.
    ///
    /// Never unmaps memory this process did not map: a non-owning caller is
    /// logged and the call reports success without touching the handle or
    /// the backend. A second unregister of an already-torn-down handle is a
    /// successful no-op.
    pub fn unregister_buffer(&self, handle: &mut BufferHandle) -> Result<()> {
        handle.validate().map_err(|e| {
            error!("refusing to unregister invalid buffer handle");
            e
        })?;

        if handle.is_locked() {
            // Caller bug: lock/unlock were not balanced. Tear down anyway
            // so the mapping cannot leak.
            warn!(
                "unregistering buffer {} while still locked (state={:#010x})",
                handle.buffer_id(),
                handle.lock_state()
            );
        }

        if handle.is_framebuffer() {
            warn!(
                "cannot unregister buffer {}: it is a framebuffer",
                handle.buffer_id()
            );
            return Err(VermeerError::unsupported(
                "framebuffers are fixed-lifetime and never unregistered",
            ));
        }

        if let Err(violation) = Self::check_local_owner(handle) {
            // Misbehaving but non-corrupting caller: report success so a
            // process that received a handle by value and never registered
            // it does not crash, but perform no teardown.
            warn!(
                "refusing to unregister buffer {}: {}",
                handle.buffer_id(),
                violation
            );
            return Ok(());
        }

        let backend = self.backend.get()?;

        let mut table = self.table.lock().unwrap();

        let Some(mapping) = table.remove(handle.buffer_id()) else {
            // Already unregistered; nothing to unmap.
            return Ok(());
        };

        if let Err(e) = backend.unmap_local(mapping.base, mapping.size as usize) {
            warn!(
                "could not unmap buffer {} at {:#x}: {}",
                handle.buffer_id(),
                mapping.base,
                e
            );
        }
        if mapping.attr_base != 0 {
            if let Err(e) = backend.unmap_local(mapping.attr_base, ATTRIBUTE_REGION_SIZE) {
                warn!(
                    "could not unmap attribute area of buffer {}: {}",
                    handle.buffer_id(),
                    e
                );
            }
        }

        handle.base = 0;
        handle.attr_base = 0;
        handle.lock_state = 0;
        handle.write_owner = false;
        self.unregistered.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// The local-mapping fields of a handle may only be torn down by the
    /// process that established them.
    fn check_local_owner(handle: &BufferHandle) -> Result<()> {
        let caller = std::process::id();
        if handle.owner_pid != caller {
            return Err(VermeerError::cross_process(handle.owner_pid, caller));
        }
        Ok(())
    }
}
