//! Integration tests for handle validation and the wire format

mod common;

use std::sync::Arc;

use common::FakeBackend;
use vermeer::{
    AccessRegion, Backend, BufferAttributes, BufferDescriptor, BufferMapper, BufferUsage,
    GraphicsAllocator, PixelFormat, VermeerError, WireHandle, WireVersion, YuvInfo,
};

fn fake_allocator() -> (Arc<FakeBackend>, GraphicsAllocator, BufferMapper) {
    let backend = Arc::new(FakeBackend::new());
    let capability = Backend::from_arc(backend.clone());
    (
        backend,
        GraphicsAllocator::new(capability.clone()),
        BufferMapper::new(capability),
    )
}

fn rgba_4k() -> BufferDescriptor {
    // 32x32 RGBA = exactly one 4096-byte page
    BufferDescriptor::new(
        32,
        32,
        PixelFormat::Rgba8888,
        BufferUsage::CPU_READ | BufferUsage::CPU_WRITE,
    )
}

#[test]
fn validate_iff_counts_and_magic_match() {
    let (_backend, allocator, _mapper) = fake_allocator();
    let handle = allocator.allocate(&rgba_4k()).unwrap();
    assert!(handle.validate().is_ok());

    let wire = WireHandle::encode(&handle);
    assert!(wire.decode().is_ok());

    // Flipping any one of the three validated properties flips the result.
    let mut tampered = wire.clone();
    tampered.header.num_words += 1;
    assert!(matches!(
        tampered.decode(),
        Err(VermeerError::InvalidHandle)
    ));

    let mut tampered = wire.clone();
    tampered.header.num_descriptors -= 1;
    assert!(tampered.decode().is_err());

    let mut tampered = wire;
    tampered.words[0] = 0; // magic word
    assert!(tampered.decode().is_err());
}

#[test]
fn wire_round_trip_preserves_shape_and_drops_mapping() {
    let (_backend, allocator, mapper) = fake_allocator();
    let mut handle = allocator.allocate(&rgba_4k()).unwrap();
    mapper.register_buffer(&mut handle).unwrap();
    assert_ne!(handle.base(), 0);

    let received = WireHandle::encode(&handle).decode().unwrap();
    assert_eq!(received.size, handle.size);
    assert_eq!(received.width, 32);
    assert_eq!(received.stride, 32);
    assert_eq!(received.buffer_id(), handle.buffer_id());
    assert_eq!(received.share, handle.share);
    assert_eq!(received.attr_share, handle.attr_share);
    // The receiver must not inherit the sender's mapping.
    assert_eq!(received.base(), 0);
    assert_eq!(received.attr_base(), 0);
    assert!(!received.is_mapped());

    mapper.unregister_buffer(&mut handle).unwrap();
}

#[test]
fn handles_are_not_portable_across_wire_versions() {
    let (_backend, allocator, _mapper) = fake_allocator();
    let handle = allocator.allocate(&rgba_4k()).unwrap();
    assert_eq!(handle.version(), WireVersion::V2);

    // A build configured for the other variant declares different counts;
    // simulate its records by relabelling the version tag.
    let mut wire = WireHandle::encode(&handle);
    wire.header.version_tag = WireVersion::V1.tag();
    assert!(wire.decode().is_err());
}

#[test]
fn attribute_area_readable_after_register() {
    let (_backend, allocator, mapper) = fake_allocator();
    let mut handle = allocator.allocate(&rgba_4k()).unwrap();

    mapper.register_buffer(&mut handle).unwrap();
    assert_ne!(handle.attr_base(), 0);

    let region = unsafe {
        std::slice::from_raw_parts(handle.attr_base() as *const u8, 4096)
    };
    let attrs = BufferAttributes::read_from(region).unwrap();
    assert_eq!(attrs.yuv_info, YuvInfo::NoInfo);
    assert!(!attrs.content_dirty);
    assert!(attrs.crop.is_none());

    mapper.unregister_buffer(&mut handle).unwrap();
}

#[test]
fn yuv_allocation_tags_attributes() {
    let (_backend, allocator, mapper) = fake_allocator();
    let desc = BufferDescriptor::new(
        64,
        64,
        PixelFormat::YCrCb420Sp,
        BufferUsage::CPU_WRITE | BufferUsage::GPU_TEXTURE,
    );
    let mut handle = allocator.allocate(&desc).unwrap();
    assert_eq!(handle.yuv_info, YuvInfo::Bt601Narrow);

    mapper.register_buffer(&mut handle).unwrap();
    let region = unsafe {
        std::slice::from_raw_parts(handle.attr_base() as *const u8, 4096)
    };
    let attrs = BufferAttributes::read_from(region).unwrap();
    assert_eq!(attrs.yuv_info, YuvInfo::Bt601Narrow);
    mapper.unregister_buffer(&mut handle).unwrap();
}

#[test]
fn free_rejects_mapped_buffer_and_releases_regions() {
    let (backend, allocator, mapper) = fake_allocator();
    let mut handle = allocator.allocate(&rgba_4k()).unwrap();
    assert_eq!(backend.region_count(), 2); // data + attribute area

    mapper.register_buffer(&mut handle).unwrap();
    let clone = handle.clone();
    assert!(matches!(
        allocator.free(clone),
        Err(VermeerError::InvalidParameter { .. })
    ));
    assert_eq!(backend.region_count(), 2);

    mapper.unregister_buffer(&mut handle).unwrap();
    allocator.free(handle).unwrap();
    assert_eq!(backend.region_count(), 0);
}

#[test]
fn double_free_fails() {
    let (_backend, allocator, _mapper) = fake_allocator();
    let handle = allocator.allocate(&rgba_4k()).unwrap();
    let clone = handle.clone();
    allocator.free(handle).unwrap();
    // The backend regions are gone; a stale copy cannot free them again.
    assert!(allocator.free(clone).is_err());
}

#[test]
fn operations_reject_invalid_handles() {
    let (_backend, allocator, mapper) = fake_allocator();
    let handle = allocator.allocate(&rgba_4k()).unwrap();

    // Corrupt the magic the way a buggy sender would: over the wire. The
    // record never decodes, so a corrupted handle cannot reach
    // register/lock/unlock at all.
    let mut wire = WireHandle::encode(&handle);
    wire.words[0] = 0xBAD;
    assert!(wire.decode().is_err());

    // Sanity: the untampered handle still passes everywhere.
    let mut good = handle;
    assert!(mapper
        .lock(
            &mut good,
            BufferUsage::CPU_READ,
            AccessRegion::full(32, 32)
        )
        .is_ok());
    assert!(mapper.unlock(&mut good).is_ok());
}
