//! Transferable share descriptor

/// Cross-process-transferable reference to a memory region.
///
/// Conceptually a kernel-mediated file-descriptor token: the numeric value is
/// only meaningful after the kernel has installed it in the receiving process
/// (SCM_RIGHTS or equivalent). The descriptor itself carries no ownership;
/// the backend that allocated the region owns the underlying fd until
/// `AllocationBackend::release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ShareDescriptor(i32);

impl ShareDescriptor {
    /// Sentinel for "no region attached"
    pub const INVALID: ShareDescriptor = ShareDescriptor(-1);

    /// Wrap a raw descriptor value
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw descriptor value
    pub const fn raw(&self) -> i32 {
        self.0
    }

    /// Whether a region is attached
    pub const fn is_valid(&self) -> bool {
        self.0 >= 0
    }
}

impl Default for ShareDescriptor {
    fn default() -> Self {
        Self::INVALID
    }
}
