//! Flag and usage bit-sets carried by buffer handles

use serde::{Deserialize, Serialize};

bitflags::bitflags! {
    /// Origin/kind flags of a buffer. Immutable after allocation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct HandleFlags: u32 {
        /// Buffer is the scanout framebuffer (fixed-lifetime system resource)
        const FRAMEBUFFER = 1 << 0;
        /// Buffer is backed by the memory-heap allocation backend
        const HEAP_BACKED = 1 << 1;
        /// Backed by the physically contiguous heap class
        const CONTIGUOUS_HEAP = 1 << 2;
        /// Backed by the DMA-capable heap class
        const DMA_HEAP = 1 << 3;
    }
}

bitflags::bitflags! {
    /// Producer/consumer usage hints supplied at allocation and lock time
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BufferUsage: u32 {
        /// CPU will read the buffer contents
        const CPU_READ = 1 << 0;
        /// CPU will write the buffer contents
        const CPU_WRITE = 1 << 1;
        /// GPU will sample the buffer as a texture
        const GPU_TEXTURE = 1 << 2;
        /// GPU will render into the buffer
        const GPU_RENDER = 1 << 3;
        /// Display controller will scan out the buffer
        const DISPLAY = 1 << 4;
        /// Composer will read the buffer
        const COMPOSER = 1 << 5;
    }
}

impl BufferUsage {
    /// Mask of usages that require a CPU-visible mapping
    pub const CPU_MASK: BufferUsage = BufferUsage::CPU_READ.union(BufferUsage::CPU_WRITE);

    /// Whether this usage needs a CPU address from `lock`
    pub fn wants_cpu_access(&self) -> bool {
        self.intersects(Self::CPU_MASK)
    }

    /// Whether this usage requests CPU write access (drives cache sync)
    pub fn wants_cpu_write(&self) -> bool {
        self.intersects(Self::CPU_WRITE)
    }
}

/// Bit layout of the handle's mutable lock-state word
pub mod lock_state {
    /// Exclusive write lock held
    pub const WRITE: u32 = 1 << 31;
    /// Buffer currently has a process-local mapping
    pub const MAPPED: u32 = 1 << 30;
    /// Concurrent read-lock count occupies the low 30 bits
    pub const READ_COUNT_MASK: u32 = 0x3FFF_FFFF;
}

/// YUV colorimetry tags for planar/semi-planar formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YuvInfo {
    #[default]
    NoInfo,
    Bt601Narrow,
    Bt601Wide,
    Bt709Narrow,
    Bt709Wide,
}

impl YuvInfo {
    /// Wire code for this tag
    pub fn code(self) -> u32 {
        match self {
            YuvInfo::NoInfo => 0,
            YuvInfo::Bt601Narrow => 1,
            YuvInfo::Bt601Wide => 2,
            YuvInfo::Bt709Narrow => 3,
            YuvInfo::Bt709Wide => 4,
        }
    }

    /// Decode a wire code; unknown tags degrade to `NoInfo` so newer
    /// producers stay readable by older consumers.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => YuvInfo::Bt601Narrow,
            2 => YuvInfo::Bt601Wide,
            3 => YuvInfo::Bt709Narrow,
            4 => YuvInfo::Bt709Wide,
            _ => YuvInfo::NoInfo,
        }
    }
}

/// Pixel formats understood by the allocator's layout computation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8888,
    Rgbx8888,
    Rgb888,
    Rgb565,
    Bgra8888,
    /// NV21: Y plane followed by interleaved V/U at half resolution
    YCrCb420Sp,
}

impl PixelFormat {
    /// Wire code stored in the handle's `format` word
    pub fn code(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 => 1,
            PixelFormat::Rgbx8888 => 2,
            PixelFormat::Rgb888 => 3,
            PixelFormat::Rgb565 => 4,
            PixelFormat::Bgra8888 => 5,
            PixelFormat::YCrCb420Sp => 0x11,
        }
    }

    /// Decode a wire code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(PixelFormat::Rgba8888),
            2 => Some(PixelFormat::Rgbx8888),
            3 => Some(PixelFormat::Rgb888),
            4 => Some(PixelFormat::Rgb565),
            5 => Some(PixelFormat::Bgra8888),
            0x11 => Some(PixelFormat::YCrCb420Sp),
            _ => None,
        }
    }

    /// Bits per pixel (average, for layout math)
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgbx8888 | PixelFormat::Bgra8888 => 32,
            PixelFormat::Rgb888 => 24,
            PixelFormat::Rgb565 => 16,
            PixelFormat::YCrCb420Sp => 12,
        }
    }
}
