//! memfd-based allocation backend (Linux)
//!
//! Backs buffers with anonymous memory file descriptors: the fd doubles as
//! the transferable share descriptor, process-local mappings are plain
//! mmaps of that fd. Stands in for a real heap driver (ion/dma-buf) while
//! honouring the same contract.

use std::{
    collections::HashMap,
    ffi::CString,
    os::fd::{AsRawFd, OwnedFd},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use memmap2::{MmapMut, MmapOptions};
use nix::{
    sys::memfd::{memfd_create, MemFdCreateFlag},
    unistd::ftruncate,
};

use crate::{
    config::PAGE_SIZE,
    error::{Result, VermeerError},
    handle::{BufferUsage, ShareDescriptor},
};

use super::{Allocation, AllocationBackend};

/// Allocation backend over Linux memfd regions
#[derive(Debug)]
pub struct MemFdBackend {
    /// Owned fds for regions allocated by this process, keyed by raw fd
    regions: Mutex<HashMap<i32, OwnedFd>>,
    /// Live process-local mappings, keyed by base address
    mappings: Mutex<HashMap<u64, MmapMut>>,
    /// Sequence for memfd debug names
    next_name: AtomicU64,
}

impl MemFdBackend {
    pub fn new() -> Self {
        Self {
            regions: Mutex::new(HashMap::new()),
            mappings: Mutex::new(HashMap::new()),
            next_name: AtomicU64::new(1),
        }
    }

    /// Number of regions this process has allocated and not yet released
    pub fn region_count(&self) -> usize {
        self.regions.lock().unwrap().len()
    }

    /// Number of live local mappings
    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }
}

impl Default for MemFdBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocationBackend for MemFdBackend {
    fn allocate(&self, size: usize, _usage: BufferUsage) -> Result<Allocation> {
        if size == 0 {
            return Err(VermeerError::invalid_parameter(
                "size",
                "allocation size must be greater than 0",
            ));
        }

        let seq = self.next_name.fetch_add(1, Ordering::Relaxed);
        let name = CString::new(format!("vermeer_buf_{}", seq))
            .map_err(|_| VermeerError::invalid_parameter("name", "name contains null bytes"))?;

        let owned_fd = memfd_create(&name, MemFdCreateFlag::MFD_CLOEXEC)
            .map_err(|e| VermeerError::platform(format!("failed to create memfd: {}", e)))?;

        ftruncate(&owned_fd, size as i64)
            .map_err(|e| VermeerError::platform(format!("failed to set memfd size: {}", e)))?;

        let raw_fd = owned_fd.as_raw_fd();
        self.regions.lock().unwrap().insert(raw_fd, owned_fd);

        Ok(Allocation {
            descriptor: ShareDescriptor::new(raw_fd),
            min_page_size: PAGE_SIZE,
        })
    }

    fn map_local(&self, descriptor: ShareDescriptor, size: usize) -> Result<u64> {
        if !descriptor.is_valid() {
            return Err(VermeerError::invalid_parameter(
                "descriptor",
                "cannot map an invalid share descriptor",
            ));
        }

        let mmap = unsafe {
            MmapOptions::new()
                .len(size)
                .map_mut(descriptor.raw())
                .map_err(|e| VermeerError::from_io(e, "failed to map shared region"))?
        };

        let base = mmap.as_ptr() as u64;
        self.mappings.lock().unwrap().insert(base, mmap);
        Ok(base)
    }

    fn unmap_local(&self, base: u64, size: usize) -> Result<()> {
        match self.mappings.lock().unwrap().remove(&base) {
            Some(mmap) => {
                if mmap.len() != size {
                    log::warn!(
                        "unmapping region at {:#x} with mismatched size {} (mapped {})",
                        base,
                        size,
                        mmap.len()
                    );
                }
                // Dropping the mapping unmaps it.
                Ok(())
            }
            None => Err(VermeerError::memory(format!(
                "no local mapping at address {:#x}",
                base
            ))),
        }
    }

    fn sync_for_device(&self, descriptor: ShareDescriptor) -> Result<()> {
        if !descriptor.is_valid() {
            return Err(VermeerError::invalid_parameter(
                "descriptor",
                "cannot sync an invalid share descriptor",
            ));
        }
        let rc = unsafe { libc::fsync(descriptor.raw()) };
        if rc < 0 {
            return Err(VermeerError::platform(format!(
                "device cache sync failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    fn release(&self, descriptor: ShareDescriptor) -> Result<()> {
        match self.regions.lock().unwrap().remove(&descriptor.raw()) {
            // Dropping the OwnedFd closes the region.
            Some(_) => Ok(()),
            None => Err(VermeerError::invalid_parameter(
                "descriptor",
                "unknown or already released region",
            )),
        }
    }
}
