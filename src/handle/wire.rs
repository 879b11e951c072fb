//! Cross-process wire format for buffer handles
//!
//! A handle travels as a fixed-layout little-endian record: a header
//! declaring the format version, total byte size, descriptor count and word
//! count, followed by the integer words in stable order. Share descriptors
//! are carried out-of-band by the IPC layer (the kernel installs them in the
//! receiving process) and re-attached at decode time.
//!
//! The format version is an explicit enum baked into the header, not a
//! compile-time toggle: a receiver validates the declared counts against the
//! constants for the version named in the record, so handles from a build
//! with a different configuration are rejected instead of misread.

use super::descriptor::ShareDescriptor;
use super::flags::{BufferUsage, HandleFlags, YuvInfo};
use super::handle::{BufferHandle, HANDLE_MAGIC};
use crate::error::{Result, VermeerError};

/// Size of the wire header in bytes (four u32 fields)
pub const HEADER_BYTES: usize = 16;

/// Wire format versions. Each version fixes the word and descriptor counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireVersion {
    /// Data region only, no attribute area
    V1,
    /// Data region plus shared attribute area (current default)
    V2,
}

impl WireVersion {
    /// Numeric tag stored in the wire header
    pub const fn tag(self) -> u32 {
        match self {
            WireVersion::V1 => 1,
            WireVersion::V2 => 2,
        }
    }

    /// Decode a header tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(WireVersion::V1),
            2 => Some(WireVersion::V2),
            _ => None,
        }
    }

    /// Fixed integer-word count for this version
    pub const fn num_words(self) -> u32 {
        match self {
            WireVersion::V1 => 21,
            WireVersion::V2 => 23,
        }
    }

    /// Fixed transferable-descriptor count for this version
    pub const fn num_descriptors(self) -> u32 {
        match self {
            WireVersion::V1 => 1,
            WireVersion::V2 => 2,
        }
    }

    /// Declared total record size in bytes (header plus words)
    pub const fn declared_size(self) -> u32 {
        HEADER_BYTES as u32 + self.num_words() * 4
    }
}

/// Header of a wire record. Received counts are claims; nothing past the
/// header is trusted until they match the compiled-in constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub version_tag: u32,
    pub declared_size: u32,
    pub num_descriptors: u32,
    pub num_words: u32,
}

/// A handle in transit: header, integer words, and re-attached descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireHandle {
    pub header: WireHeader,
    pub words: Vec<u32>,
    pub descriptors: Vec<ShareDescriptor>,
}

// Word indices within the record, stable across versions for the common
// prefix. V2 appends the attribute-area base.
const W_MAGIC: usize = 0;
const W_INTERNAL_FORMAT: usize = 1; // 2 words
const W_FLAGS: usize = 3;
const W_USAGE: usize = 4;
const W_SIZE: usize = 5;
const W_WIDTH: usize = 6;
const W_HEIGHT: usize = 7;
const W_FORMAT: usize = 8;
const W_STRIDE: usize = 9;
const W_LOCK_STATE: usize = 10;
const W_WRITE_OWNER: usize = 11;
const W_OWNER_PID: usize = 12;
const W_YUV_INFO: usize = 13;
const W_MIN_PAGE_SIZE: usize = 14;
const W_BUFFER_ID: usize = 15; // 2 words
const W_FB_OFFSET: usize = 17; // 2 words
const W_BASE: usize = 19; // 2 words
const W_ATTR_BASE: usize = 21; // 2 words, V2 only

fn put_u64(words: &mut [u32], index: usize, value: u64) {
    words[index] = value as u32;
    words[index + 1] = (value >> 32) as u32;
}

fn get_u64(words: &[u32], index: usize) -> u64 {
    words[index] as u64 | (words[index + 1] as u64) << 32
}

impl WireHandle {
    /// Encode a handle for transfer
    pub fn encode(handle: &BufferHandle) -> Self {
        let version = handle.version();
        let mut words = vec![0u32; version.num_words() as usize];

        words[W_MAGIC] = handle.magic;
        put_u64(&mut words, W_INTERNAL_FORMAT, handle.internal_format);
        words[W_FLAGS] = handle.flags.bits();
        words[W_USAGE] = handle.usage.bits();
        words[W_SIZE] = handle.size;
        words[W_WIDTH] = handle.width;
        words[W_HEIGHT] = handle.height;
        words[W_FORMAT] = handle.format;
        words[W_STRIDE] = handle.stride;
        words[W_LOCK_STATE] = handle.lock_state;
        words[W_WRITE_OWNER] = handle.write_owner as u32;
        words[W_OWNER_PID] = handle.owner_pid;
        words[W_YUV_INFO] = handle.yuv_info.code();
        words[W_MIN_PAGE_SIZE] = handle.min_page_size;
        put_u64(&mut words, W_BUFFER_ID, handle.buffer_id());
        put_u64(&mut words, W_FB_OFFSET, handle.fb_offset);
        put_u64(&mut words, W_BASE, handle.base);

        let mut descriptors = vec![handle.share];
        if version == WireVersion::V2 {
            put_u64(&mut words, W_ATTR_BASE, handle.attr_base);
            descriptors.push(handle.attr_share);
        }

        Self {
            header: WireHeader {
                version_tag: version.tag(),
                declared_size: version.declared_size(),
                num_descriptors: version.num_descriptors(),
                num_words: version.num_words(),
            },
            words,
            descriptors,
        }
    }

    /// Serialize header and words to bytes. Descriptors travel out-of-band.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_BYTES + self.words.len() * 4);
        bytes.extend_from_slice(&self.header.version_tag.to_le_bytes());
        bytes.extend_from_slice(&self.header.declared_size.to_le_bytes());
        bytes.extend_from_slice(&self.header.num_descriptors.to_le_bytes());
        bytes.extend_from_slice(&self.header.num_words.to_le_bytes());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Reassemble a record from received bytes and kernel-installed
    /// descriptors. Only structural length checks happen here; field-level
    /// validation is [`WireHandle::decode`].
    pub fn from_bytes(bytes: &[u8], descriptors: Vec<ShareDescriptor>) -> Result<Self> {
        if bytes.len() < HEADER_BYTES {
            return Err(VermeerError::InvalidHandle);
        }
        let word_at = |i: usize| {
            u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]])
        };
        let header = WireHeader {
            version_tag: word_at(0),
            declared_size: word_at(1),
            num_descriptors: word_at(2),
            num_words: word_at(3),
        };
        let expected_len = HEADER_BYTES + header.num_words as usize * 4;
        if bytes.len() != expected_len || header.num_words > 64 {
            return Err(VermeerError::InvalidHandle);
        }
        let words = (4..4 + header.num_words as usize).map(word_at).collect();
        Ok(Self {
            header,
            words,
            descriptors,
        })
    }

    /// Validate the record and rebuild a usable handle.
    ///
    /// Checks, in order: declared total size, descriptor count and word
    /// count against the constants for the named version, then the magic.
    /// Any mismatch is the single generic [`VermeerError::InvalidHandle`];
    /// no other field is read until all checks pass. The sender's local
    /// addresses are discarded: the returned handle is unmapped.
    ///
    /// Inside one process (tests) the descriptor values are reused as-is;
    /// across real process boundaries the IPC layer has already dup'd them
    /// into this process before they reach here.
    pub fn decode(&self) -> Result<BufferHandle> {
        let version =
            WireVersion::from_tag(self.header.version_tag).ok_or(VermeerError::InvalidHandle)?;
        if self.header.declared_size != version.declared_size()
            || self.header.num_descriptors != version.num_descriptors()
            || self.header.num_words != version.num_words()
            || self.words.len() != version.num_words() as usize
            || self.descriptors.len() != version.num_descriptors() as usize
        {
            return Err(VermeerError::InvalidHandle);
        }
        if self.words[W_MAGIC] != HANDLE_MAGIC {
            return Err(VermeerError::InvalidHandle);
        }

        let attr_share = if version == WireVersion::V2 {
            self.descriptors[1]
        } else {
            ShareDescriptor::INVALID
        };

        Ok(BufferHandle::from_wire_fields(
            version,
            self.words[W_MAGIC],
            self.descriptors[0],
            attr_share,
            get_u64(&self.words, W_INTERNAL_FORMAT),
            HandleFlags::from_bits_retain(self.words[W_FLAGS]),
            BufferUsage::from_bits_retain(self.words[W_USAGE]),
            self.words[W_SIZE],
            self.words[W_WIDTH],
            self.words[W_HEIGHT],
            self.words[W_FORMAT],
            self.words[W_STRIDE],
            YuvInfo::from_code(self.words[W_YUV_INFO]),
            self.words[W_MIN_PAGE_SIZE],
            get_u64(&self.words, W_FB_OFFSET),
            get_u64(&self.words, W_BUFFER_ID),
            self.words[W_LOCK_STATE],
            self.words[W_WRITE_OWNER] != 0,
            self.words[W_OWNER_PID],
        ))
    }
}
