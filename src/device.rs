//! Device surface: the operations this layer exposes to callers
//!
//! `open` dispatches a well-known device class to either the graphics
//! allocator (GPU-facing buffer allocation) or the framebuffer device
//! (the display controller's pre-mapped scanout memory). Display timing,
//! posting and vsync belong to the display driver, not here.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    backend::Backend,
    config::{ATTRIBUTE_REGION_SIZE, NUM_FB_BUFFERS, PAGE_SIZE, STRIDE_ALIGN_PIXELS},
    error::{Result, VermeerError},
    handle::{
        BufferAttributes, BufferHandle, BufferUsage, HandleFlags, PixelFormat, WireVersion,
        YuvInfo,
    },
};

/// Well-known device classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceClass {
    /// The GPU-facing allocator device
    Gpu0,
    /// The framebuffer device
    Fb0,
}

/// A device opened via [`open`]
#[derive(Debug)]
pub enum Device {
    Allocator(GraphicsAllocator),
    Framebuffer(FramebufferDevice),
}

impl Device {
    pub fn into_allocator(self) -> Option<GraphicsAllocator> {
        match self {
            Device::Allocator(a) => Some(a),
            Device::Framebuffer(_) => None,
        }
    }

    pub fn into_framebuffer(self) -> Option<FramebufferDevice> {
        match self {
            Device::Framebuffer(fb) => Some(fb),
            Device::Allocator(_) => None,
        }
    }
}

/// Module-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub framebuffer: FramebufferConfig,
}

/// Shape of the framebuffer device memory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramebufferConfig {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Number of swap buffers in the framebuffer memory
    pub buffer_count: u32,
}

impl Default for FramebufferConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            format: PixelFormat::Rgba8888,
            buffer_count: NUM_FB_BUFFERS,
        }
    }
}

impl FramebufferConfig {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    pub fn with_buffer_count(mut self, buffer_count: u32) -> Self {
        self.buffer_count = buffer_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VermeerError::invalid_parameter(
                "framebuffer",
                "framebuffer dimensions must be non-zero",
            ));
        }
        if self.buffer_count == 0 {
            return Err(VermeerError::invalid_parameter(
                "buffer_count",
                "framebuffer needs at least one buffer",
            ));
        }
        Ok(())
    }
}

/// Open a device by class
pub fn open(class: DeviceClass, backend: Backend, config: &ModuleConfig) -> Result<Device> {
    match class {
        DeviceClass::Gpu0 => Ok(Device::Allocator(GraphicsAllocator::new(backend))),
        DeviceClass::Fb0 => Ok(Device::Framebuffer(FramebufferDevice::open(
            &backend,
            &config.framebuffer,
        )?)),
    }
}

/// Request for one buffer allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(width: u32, height: u32, format: PixelFormat, usage: BufferUsage) -> Self {
        Self {
            width,
            height,
            format,
            usage,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(VermeerError::invalid_parameter(
                "dimensions",
                "buffer dimensions must be non-zero",
            ));
        }
        Ok(())
    }

    /// Compute (stride in pixels, total size in bytes) for this request.
    ///
    /// The math runs in `u64` and the result must fit the handle's `u32`
    /// size word: dimensions whose layout would wrap are rejected, never
    /// silently truncated into a handle describing more bytes than the
    /// allocation holds.
    pub fn layout(&self) -> Result<(u32, u32)> {
        self.validate()?;
        let stride = align_up(self.width as u64, STRIDE_ALIGN_PIXELS as u64);
        let body = match self.format {
            // Y plane plus half-resolution interleaved chroma
            PixelFormat::YCrCb420Sp => stride
                .checked_mul(self.height as u64)
                .and_then(|v| v.checked_mul(3))
                .map(|v| v / 2),
            _ => stride
                .checked_mul((self.format.bits_per_pixel() / 8) as u64)
                .and_then(|v| v.checked_mul(self.height as u64)),
        };
        let size = body
            .and_then(|v| v.checked_add(PAGE_SIZE as u64 - 1))
            .map(|v| v / PAGE_SIZE as u64 * PAGE_SIZE as u64);
        match (u32::try_from(stride), size.map(u32::try_from)) {
            (Ok(stride), Some(Ok(size))) => Ok((stride, size)),
            _ => Err(VermeerError::invalid_parameter(
                "dimensions",
                "buffer layout exceeds the maximum supported size",
            )),
        }
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

/// The GPU-facing allocator device: turns buffer descriptors into handles
#[derive(Debug)]
pub struct GraphicsAllocator {
    backend: Backend,
    next_seq: AtomicU64,
}

impl GraphicsAllocator {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Stable buffer ids mix the allocating pid into the high bits so ids
    /// from different producer processes never collide in one consumer's
    /// registry.
    fn next_buffer_id(&self) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        (std::process::id() as u64) << 32 | (seq & 0xFFFF_FFFF)
    }

    /// Allocate a buffer and build its transferable handle.
    ///
    /// The handle uses the attribute-area wire version: a second one-page
    /// region is allocated and seeded with the buffer's
    /// [`BufferAttributes`]. The returned handle is not yet mapped in any
    /// process; callers register it before CPU access.
    pub fn allocate(&self, descriptor: &BufferDescriptor) -> Result<BufferHandle> {
        let (stride, size) = descriptor.layout()?;
        let backend = self.backend.get()?;

        let data = backend.allocate(size as usize, descriptor.usage)?;

        let attrs = match backend.allocate(ATTRIBUTE_REGION_SIZE, BufferUsage::CPU_MASK) {
            Ok(allocation) => allocation,
            Err(e) => {
                if let Err(release_err) = backend.release(data.descriptor) {
                    log::warn!(
                        "could not release data region after failed allocation: {}",
                        release_err
                    );
                }
                return Err(e);
            }
        };

        let yuv_info = match descriptor.format {
            PixelFormat::YCrCb420Sp => YuvInfo::Bt601Narrow,
            _ => YuvInfo::NoInfo,
        };

        self.seed_attributes(attrs.descriptor, yuv_info).map_err(|e| {
            for region in [data.descriptor, attrs.descriptor] {
                if let Err(release_err) = backend.release(region) {
                    log::warn!("cleanup release failed: {}", release_err);
                }
            }
            e
        })?;

        let mut handle = BufferHandle::new(
            WireVersion::V2,
            HandleFlags::HEAP_BACKED,
            descriptor.usage,
            size,
            self.next_buffer_id(),
        );
        handle.share = data.descriptor;
        handle.attr_share = attrs.descriptor;
        handle.width = descriptor.width;
        handle.height = descriptor.height;
        handle.stride = stride;
        handle.format = descriptor.format.code();
        handle.internal_format = descriptor.format.code() as u64;
        handle.yuv_info = yuv_info;
        handle.min_page_size = data.min_page_size;

        Ok(handle)
    }

    /// Write the initial attribute record into the freshly allocated
    /// attribute region
    fn seed_attributes(
        &self,
        region: crate::handle::ShareDescriptor,
        yuv_info: YuvInfo,
    ) -> Result<()> {
        let backend = self.backend.get()?;
        let base = backend.map_local(region, ATTRIBUTE_REGION_SIZE)?;
        let slice =
            unsafe { std::slice::from_raw_parts_mut(base as *mut u8, ATTRIBUTE_REGION_SIZE) };
        let result = BufferAttributes {
            yuv_info,
            crop: None,
            content_dirty: false,
        }
        .write_to(slice);
        if let Err(e) = backend.unmap_local(base, ATTRIBUTE_REGION_SIZE) {
            log::warn!("could not unmap attribute region after seeding: {}", e);
        }
        result
    }

    /// Destroy a buffer: clears the magic (the handle can never validate
    /// again) and releases the backend regions.
    ///
    /// The buffer must not be mapped in this process; unregister first.
    pub fn free(&self, mut handle: BufferHandle) -> Result<()> {
        handle.validate()?;

        if handle.is_framebuffer() {
            return Err(VermeerError::unsupported(
                "framebuffer memory is a fixed-lifetime system resource",
            ));
        }
        if handle.is_mapped() || handle.base() != 0 {
            return Err(VermeerError::invalid_parameter(
                "handle",
                "buffer is still mapped locally; unregister it before freeing",
            ));
        }

        let backend = self.backend.get()?;
        backend.release(handle.share)?;
        if handle.attr_share.is_valid() {
            backend.release(handle.attr_share)?;
        }

        handle.invalidate();
        Ok(())
    }
}

/// The framebuffer device: owns the pre-mapped scanout memory.
///
/// Its handle carries the framebuffer flag, so the registry refuses to
/// register or unregister it; the mapping lives as long as the process.
/// Posting buffers to the display is the display driver's job.
#[derive(Debug)]
pub struct FramebufferDevice {
    handle: BufferHandle,
    config: FramebufferConfig,
    stride: u32,
    buffer_size: u32,
}

impl FramebufferDevice {
    /// Map the framebuffer memory and build its fixed handle
    pub fn open(backend: &Backend, config: &FramebufferConfig) -> Result<Self> {
        config.validate()?;

        let descriptor = BufferDescriptor::new(
            config.width,
            config.height,
            config.format,
            BufferUsage::DISPLAY | BufferUsage::CPU_WRITE,
        );
        let (stride, buffer_size) = descriptor.layout()?;
        let total = buffer_size
            .checked_mul(config.buffer_count)
            .ok_or_else(|| {
                VermeerError::invalid_parameter("buffer_count", "framebuffer size overflows")
            })?;

        let backend_impl = backend.get()?;
        let allocation = backend_impl.allocate(total as usize, descriptor.usage)?;
        let base = backend_impl.map_local(allocation.descriptor, total as usize)?;

        let mut handle = BufferHandle::new(
            WireVersion::V1,
            HandleFlags::FRAMEBUFFER,
            descriptor.usage,
            total,
            0, // the framebuffer is the one well-known buffer
        );
        handle.share = allocation.descriptor;
        handle.width = config.width;
        handle.height = config.height;
        handle.stride = stride;
        handle.format = config.format.code();
        handle.min_page_size = allocation.min_page_size;
        handle.base = base;
        handle.lock_state = crate::handle::lock_state::MAPPED;

        Ok(Self {
            handle,
            config: config.clone(),
            stride,
            buffer_size,
        })
    }

    /// The framebuffer's fixed handle
    pub fn handle(&self) -> &BufferHandle {
        &self.handle
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Row stride in pixels
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.config.format
    }

    pub fn buffer_count(&self) -> u32 {
        self.config.buffer_count
    }

    /// Size of one swap buffer in bytes
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Byte offset of the n-th swap buffer within the framebuffer memory
    pub fn buffer_offset(&self, index: u32) -> Result<u64> {
        if index >= self.config.buffer_count {
            return Err(VermeerError::invalid_parameter(
                "index",
                format!(
                    "framebuffer has {} buffers, index {} out of range",
                    self.config.buffer_count, index
                ),
            ));
        }
        Ok(index as u64 * self.buffer_size as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_rgba() {
        let desc = BufferDescriptor::new(
            100,
            100,
            PixelFormat::Rgba8888,
            BufferUsage::CPU_READ | BufferUsage::CPU_WRITE,
        );
        let (stride, size) = desc.layout().unwrap();
        assert_eq!(stride, 112); // 100 aligned up to 16 pixels
        assert_eq!(size % PAGE_SIZE, 0);
        assert!(size >= 112 * 4 * 100);
    }

    #[test]
    fn test_layout_yuv() {
        let desc = BufferDescriptor::new(
            64,
            64,
            PixelFormat::YCrCb420Sp,
            BufferUsage::GPU_TEXTURE,
        );
        let (stride, size) = desc.layout().unwrap();
        assert_eq!(stride, 64);
        assert!(size >= 64 * 64 * 3 / 2);
        assert_eq!(size % PAGE_SIZE, 0);
    }

    #[test]
    fn test_layout_rejects_oversized_dimensions() {
        // 65536x65537 RGBA needs ~16 GiB; a wrapped u32 size would describe
        // far fewer bytes than the stride and height promise.
        let desc = BufferDescriptor::new(
            65536,
            65537,
            PixelFormat::Rgba8888,
            BufferUsage::CPU_READ | BufferUsage::CPU_WRITE,
        );
        assert!(matches!(
            desc.layout(),
            Err(VermeerError::InvalidParameter { .. })
        ));

        let desc = BufferDescriptor::new(
            u32::MAX,
            u32::MAX,
            PixelFormat::YCrCb420Sp,
            BufferUsage::GPU_TEXTURE,
        );
        assert!(desc.layout().is_err());

        // Large but representable layouts still work: 16384x16384 RGBA is
        // exactly 1 GiB.
        let desc = BufferDescriptor::new(
            16384,
            16384,
            PixelFormat::Rgba8888,
            BufferUsage::GPU_RENDER,
        );
        let (stride, size) = desc.layout().unwrap();
        assert_eq!(stride, 16384);
        assert_eq!(size, 1 << 30);
    }

    #[test]
    fn test_layout_rejects_zero_dimensions() {
        let desc = BufferDescriptor::new(0, 64, PixelFormat::Rgb565, BufferUsage::CPU_READ);
        assert!(desc.layout().is_err());
    }

    #[test]
    fn test_framebuffer_config_validation() {
        assert!(FramebufferConfig::default().validate().is_ok());

        let bad = FramebufferConfig::new(0, 480, PixelFormat::Rgb565);
        assert!(bad.validate().is_err());

        let bad = FramebufferConfig::default().with_buffer_count(0);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_open_allocator_needs_no_backend_upfront() {
        // Opening the allocator device succeeds even without a backend;
        // allocation itself reports BackendUnavailable.
        let device = open(
            DeviceClass::Gpu0,
            Backend::Unavailable,
            &ModuleConfig::default(),
        )
        .unwrap();
        let allocator = device.into_allocator().unwrap();
        let desc = BufferDescriptor::new(64, 64, PixelFormat::Rgb565, BufferUsage::CPU_READ);
        assert!(matches!(
            allocator.allocate(&desc),
            Err(VermeerError::BackendUnavailable { .. })
        ));
    }

    #[test]
    fn test_open_framebuffer_without_backend_fails() {
        let err = open(
            DeviceClass::Fb0,
            Backend::Unavailable,
            &ModuleConfig::default(),
        );
        assert!(matches!(err, Err(VermeerError::BackendUnavailable { .. })));
    }
}
