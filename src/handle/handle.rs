//! The buffer handle itself

use super::descriptor::ShareDescriptor;
use super::flags::{lock_state, BufferUsage, HandleFlags, PixelFormat, YuvInfo};
use super::wire::WireVersion;
use crate::error::{Result, VermeerError};

/// Sentinel identifying a live, valid handle. Set at construction, cleared
/// on free, never reused.
pub const HANDLE_MAGIC: u32 = 0x5662_7566;

/// Self-describing descriptor for one allocated graphics buffer.
///
/// The handle is a plain value: it travels across process boundaries by
/// value through IPC (words in-band, descriptors kernel-mediated) and
/// carries no ownership of the underlying memory. The process-local fields
/// (`base`, `attr_base`, `owner_pid`, `lock_state`) are only meaningful in
/// the process that registered a mapping; every other process sees the
/// unmapped sentinel until it registers the handle itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferHandle {
    pub(crate) magic: u32,
    version: WireVersion,
    num_words: u32,
    num_descriptors: u32,

    /// Transferable reference to the data region
    pub share: ShareDescriptor,
    /// Transferable reference to the attribute area (attribute-area wire
    /// version only)
    pub attr_share: ShareDescriptor,

    /// Opaque driver-internal format
    pub internal_format: u64,
    /// Origin/kind flags, immutable after creation
    pub flags: HandleFlags,
    /// Usage hints supplied at allocation, immutable
    pub usage: BufferUsage,
    /// Total buffer size in bytes
    pub size: u32,
    pub width: u32,
    pub height: u32,
    /// Pixel format wire code (see [`PixelFormat`])
    pub format: u32,
    /// Row stride in pixels
    pub stride: u32,
    pub yuv_info: YuvInfo,
    /// Minimum physical page size backing this buffer
    pub min_page_size: u32,
    /// Byte offset into the framebuffer device memory (framebuffer only)
    pub fb_offset: u64,

    buffer_id: u64,
    pub(crate) lock_state: u32,
    pub(crate) write_owner: bool,
    /// Pid of the process owning the local mapping. Stamped by
    /// `register_buffer`; carried on the wire like the rest of the record.
    pub owner_pid: u32,
    pub(crate) base: u64,
    pub(crate) attr_base: u64,
}

impl BufferHandle {
    /// Construct a fresh handle for a newly allocated buffer. Shape and
    /// format fields start zeroed; the allocator fills them in.
    pub fn new(
        version: WireVersion,
        flags: HandleFlags,
        usage: BufferUsage,
        size: u32,
        buffer_id: u64,
    ) -> Self {
        Self {
            magic: HANDLE_MAGIC,
            version,
            num_words: version.num_words(),
            num_descriptors: version.num_descriptors(),
            share: ShareDescriptor::INVALID,
            attr_share: ShareDescriptor::INVALID,
            internal_format: 0,
            flags,
            usage,
            size,
            width: 0,
            height: 0,
            format: 0,
            stride: 0,
            yuv_info: YuvInfo::NoInfo,
            min_page_size: 0,
            fb_offset: 0,
            buffer_id,
            lock_state: 0,
            write_owner: false,
            owner_pid: std::process::id(),
            base: 0,
            attr_base: 0,
        }
    }

    /// Structural validation: declared counts must equal this build's
    /// constants for the handle's wire version and the magic must be live.
    ///
    /// Pure and side-effect free. Runs before every public operation; no
    /// other field may be trusted until it passes. Every failure is the
    /// same generic [`VermeerError::InvalidHandle`].
    pub fn validate(&self) -> Result<()> {
        if self.num_words != self.version.num_words()
            || self.num_descriptors != self.version.num_descriptors()
            || self.magic != HANDLE_MAGIC
        {
            return Err(VermeerError::InvalidHandle);
        }
        Ok(())
    }

    /// Current magic value; equals [`HANDLE_MAGIC`] while the handle is live
    pub fn magic(&self) -> u32 {
        self.magic
    }

    /// Wire format version of this handle
    pub fn version(&self) -> WireVersion {
        self.version
    }

    /// Declared word count (fixed per wire version)
    pub fn num_words(&self) -> u32 {
        self.num_words
    }

    /// Declared descriptor count (fixed per wire version)
    pub fn num_descriptors(&self) -> u32 {
        self.num_descriptors
    }

    /// Stable buffer identifier, assigned once at allocation
    pub fn buffer_id(&self) -> u64 {
        self.buffer_id
    }

    /// Process-local mapping address; 0 until this process registers
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Process-local attribute-area address; 0 until registered
    pub fn attr_base(&self) -> u64 {
        self.attr_base
    }

    /// Raw lock-state word (see [`lock_state`])
    pub fn lock_state(&self) -> u32 {
        self.lock_state
    }

    /// Whether the current lock holder requested CPU write access
    pub fn write_owner(&self) -> bool {
        self.write_owner
    }

    /// Whether this process holds a mapping for the buffer
    pub fn is_mapped(&self) -> bool {
        self.lock_state & lock_state::MAPPED != 0
    }

    /// Whether any read or write lock is outstanding
    pub fn is_locked(&self) -> bool {
        self.lock_state & (lock_state::WRITE | lock_state::READ_COUNT_MASK) != 0
    }

    /// Whether the buffer is the scanout framebuffer
    pub fn is_framebuffer(&self) -> bool {
        self.flags.contains(HandleFlags::FRAMEBUFFER)
    }

    /// Whether the buffer is managed by the allocation backend
    pub fn is_heap_backed(&self) -> bool {
        self.flags.contains(HandleFlags::HEAP_BACKED)
    }

    /// Decoded pixel format, if the wire code is known
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_code(self.format)
    }

    /// Clear the magic so the handle can never validate again. Called on
    /// free; the sentinel value is never reused.
    pub(crate) fn invalidate(&mut self) {
        self.magic = 0;
    }

    /// Rebuild a handle from decoded wire fields. Local-mapping fields are
    /// deliberately absent: a received handle is never mapped.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_wire_fields(
        version: WireVersion,
        magic: u32,
        share: ShareDescriptor,
        attr_share: ShareDescriptor,
        internal_format: u64,
        flags: HandleFlags,
        usage: BufferUsage,
        size: u32,
        width: u32,
        height: u32,
        format: u32,
        stride: u32,
        yuv_info: YuvInfo,
        min_page_size: u32,
        fb_offset: u64,
        buffer_id: u64,
        lock_state_word: u32,
        write_owner: bool,
        owner_pid: u32,
    ) -> Self {
        Self {
            magic,
            version,
            num_words: version.num_words(),
            num_descriptors: version.num_descriptors(),
            share,
            attr_share,
            internal_format,
            flags,
            usage,
            size,
            width,
            height,
            format,
            stride,
            yuv_info,
            min_page_size,
            fb_offset,
            buffer_id,
            // The sender's mapping means nothing in this address space.
            lock_state: lock_state_word & !lock_state::MAPPED,
            write_owner,
            owner_pid,
            base: 0,
            attr_base: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_handle() -> BufferHandle {
        BufferHandle::new(
            WireVersion::V2,
            HandleFlags::HEAP_BACKED,
            BufferUsage::CPU_READ | BufferUsage::CPU_WRITE,
            4096,
            1,
        )
    }

    #[test]
    fn test_new_handle_validates() {
        let handle = test_handle();
        assert!(handle.validate().is_ok());
        assert_eq!(handle.size, 4096);
        assert_eq!(handle.lock_state(), 0);
        assert_eq!(handle.base(), 0);
        assert_eq!(handle.owner_pid, std::process::id());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut handle = test_handle();
        handle.magic = 0xDEAD_BEEF;
        assert!(matches!(
            handle.validate(),
            Err(VermeerError::InvalidHandle)
        ));
    }

    #[test]
    fn test_bad_counts_rejected() {
        let mut handle = test_handle();
        handle.num_words += 1;
        assert!(handle.validate().is_err());

        let mut handle = test_handle();
        handle.num_descriptors += 1;
        assert!(handle.validate().is_err());
    }

    #[test]
    fn test_invalidate_is_permanent() {
        let mut handle = test_handle();
        handle.invalidate();
        assert!(handle.validate().is_err());
    }

    #[test]
    fn test_kind_predicates() {
        let handle = test_handle();
        assert!(handle.is_heap_backed());
        assert!(!handle.is_framebuffer());
        assert!(!handle.is_mapped());
        assert!(!handle.is_locked());

        let fb = BufferHandle::new(
            WireVersion::V1,
            HandleFlags::FRAMEBUFFER,
            BufferUsage::DISPLAY,
            4096,
            2,
        );
        assert!(fb.is_framebuffer());
        assert!(!fb.is_heap_backed());
    }
}
