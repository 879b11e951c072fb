//! Shared test helpers: an in-memory fake allocation backend with call
//! counters, so tests can assert exactly which backend operations each
//! registry call performed.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
};

use vermeer::{
    Allocation, AllocationBackend, BufferUsage, Result, ShareDescriptor, VermeerError,
};

/// Heap-allocated regions indexed by fake descriptor value. Mapping a
/// region hands out the region's real heap pointer, so attribute seeding
/// and CPU access through locked pointers work exactly as with a real
/// backend.
#[derive(Debug, Default)]
pub struct FakeBackend {
    next_fd: AtomicI32,
    regions: Mutex<HashMap<i32, Box<[u8]>>>,
    mappings: Mutex<HashMap<u64, (i32, usize)>>,
    pub alloc_calls: AtomicUsize,
    pub map_calls: AtomicUsize,
    pub unmap_calls: AtomicUsize,
    pub sync_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    /// When set, the next sync_for_device call fails
    pub fail_sync: AtomicBool,
    /// When set, the next map_local call fails
    pub fail_next_map: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            next_fd: AtomicI32::new(100),
            ..Default::default()
        }
    }

    pub fn sync_count(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    pub fn unmap_count(&self) -> usize {
        self.unmap_calls.load(Ordering::SeqCst)
    }

    pub fn map_count(&self) -> usize {
        self.map_calls.load(Ordering::SeqCst)
    }

    pub fn region_count(&self) -> usize {
        self.regions.lock().unwrap().len()
    }
}

impl AllocationBackend for FakeBackend {
    fn allocate(&self, size: usize, _usage: BufferUsage) -> Result<Allocation> {
        self.alloc_calls.fetch_add(1, Ordering::SeqCst);
        let fd = self.next_fd.fetch_add(1, Ordering::SeqCst);
        self.regions
            .lock()
            .unwrap()
            .insert(fd, vec![0u8; size].into_boxed_slice());
        Ok(Allocation {
            descriptor: ShareDescriptor::new(fd),
            min_page_size: 4096,
        })
    }

    fn map_local(&self, descriptor: ShareDescriptor, size: usize) -> Result<u64> {
        if self.fail_next_map.swap(false, Ordering::SeqCst) {
            return Err(VermeerError::memory("injected map failure"));
        }
        self.map_calls.fetch_add(1, Ordering::SeqCst);
        let regions = self.regions.lock().unwrap();
        let region = regions.get(&descriptor.raw()).ok_or_else(|| {
            VermeerError::invalid_parameter("descriptor", "unknown region")
        })?;
        let base = region.as_ptr() as u64;
        self.mappings
            .lock()
            .unwrap()
            .insert(base, (descriptor.raw(), size));
        Ok(base)
    }

    fn unmap_local(&self, base: u64, _size: usize) -> Result<()> {
        self.unmap_calls.fetch_add(1, Ordering::SeqCst);
        self.mappings
            .lock()
            .unwrap()
            .remove(&base)
            .map(|_| ())
            .ok_or_else(|| VermeerError::memory("no mapping at address"))
    }

    fn sync_for_device(&self, descriptor: ShareDescriptor) -> Result<()> {
        if self.fail_sync.swap(false, Ordering::SeqCst) {
            return Err(VermeerError::platform("injected sync failure"));
        }
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        if !self.regions.lock().unwrap().contains_key(&descriptor.raw()) {
            return Err(VermeerError::invalid_parameter(
                "descriptor",
                "unknown region",
            ));
        }
        Ok(())
    }

    fn release(&self, descriptor: ShareDescriptor) -> Result<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.regions
            .lock()
            .unwrap()
            .remove(&descriptor.raw())
            .map(|_| ())
            .ok_or_else(|| {
                VermeerError::invalid_parameter("descriptor", "unknown or already released region")
            })
    }
}
