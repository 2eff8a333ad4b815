// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Payload type descriptors. The middleware never interprets payload bytes;
// it only guarantees that every port attached to a service agrees on the
// payload's name, size, alignment, and size variant. Mismatch is rejected at
// creation time, so it can never become a runtime corruption.

use crate::error::CreationError;

/// Maximum byte length of a payload type name stored in the registry.
pub const MAX_TYPE_NAME_LEN: usize = 128;

/// Maximum supported payload alignment.
pub const MAX_ALIGNMENT: usize = 4096;

/// Whether a sample carries exactly one element or a slice of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeVariant {
    /// Every sample is exactly one element.
    FixedSize,
    /// A sample is a run of 1..=max_slice_len elements; the element count is
    /// chosen per loan.
    Slice,
}

/// Describes the fixed memory layout of a service's payload.
///
/// Two ports may only connect to the same service if their descriptors are
/// identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDescriptor {
    type_name: String,
    size: usize,
    align: usize,
    variant: TypeVariant,
}

impl PayloadDescriptor {
    /// Build a descriptor from explicit layout details.
    pub fn new(
        type_name: &str,
        size: usize,
        align: usize,
        variant: TypeVariant,
    ) -> Result<Self, CreationError> {
        if type_name.is_empty() {
            return Err(CreationError::InvalidDescriptor("type name is empty"));
        }
        if type_name.len() > MAX_TYPE_NAME_LEN {
            return Err(CreationError::InvalidDescriptor("type name too long"));
        }
        if type_name.bytes().any(|b| b == 0) {
            return Err(CreationError::InvalidDescriptor(
                "type name contains a null byte",
            ));
        }
        if size == 0 {
            return Err(CreationError::InvalidDescriptor("payload size is 0"));
        }
        if !align.is_power_of_two() || align > MAX_ALIGNMENT {
            return Err(CreationError::InvalidDescriptor(
                "alignment is not a power of two within the supported range",
            ));
        }
        Ok(Self {
            type_name: type_name.to_owned(),
            size,
            align,
            variant,
        })
    }

    /// Descriptor for a single fixed-size element of `T`.
    pub fn of<T: Copy + 'static>() -> Self {
        Self {
            type_name: trimmed_type_name::<T>(),
            size: std::mem::size_of::<T>().max(1),
            align: std::mem::align_of::<T>(),
            variant: TypeVariant::FixedSize,
        }
    }

    /// Descriptor for slices of `T` elements.
    pub fn slice_of<T: Copy + 'static>() -> Self {
        Self {
            variant: TypeVariant::Slice,
            ..Self::of::<T>()
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn variant(&self) -> TypeVariant {
        self.variant
    }

    pub(crate) fn to_raw(&self) -> RawDescriptor {
        let mut raw = RawDescriptor::zeroed();
        let bytes = self.type_name.as_bytes();
        raw.type_name[..bytes.len()].copy_from_slice(bytes);
        raw.type_name_len = bytes.len() as u32;
        raw.size = self.size as u64;
        raw.align = self.align as u64;
        raw.variant = match self.variant {
            TypeVariant::FixedSize => 0,
            TypeVariant::Slice => 1,
        };
        raw
    }
}

/// Strip module paths from `core::any::type_name`, keeping generic arguments
/// readable: `foo::bar::Baz` becomes `Baz`.
fn trimmed_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut segment_start = 0;
    for (i, c) in full.char_indices() {
        match c {
            ':' => segment_start = i + 1,
            '<' | '>' | ',' | ' ' => {
                out.push_str(&full[segment_start..=i]);
                segment_start = i + 1;
            }
            _ => {}
        }
    }
    out.push_str(&full[segment_start..]);
    out
}

// ---------------------------------------------------------------------------
// Raw form stored in the shared registry record
// ---------------------------------------------------------------------------

/// Fixed-layout descriptor as stored in shared memory. Compared byte-wise
/// (via field equality) when a second port attaches to an existing service.
#[repr(C)]
#[derive(Clone, Copy)]
pub(crate) struct RawDescriptor {
    pub type_name: [u8; MAX_TYPE_NAME_LEN],
    pub type_name_len: u32,
    pub variant: u32,
    pub size: u64,
    pub align: u64,
}

impl RawDescriptor {
    pub fn zeroed() -> Self {
        unsafe { std::mem::zeroed() }
    }

    pub fn matches(&self, other: &RawDescriptor) -> bool {
        self.type_name_len == other.type_name_len
            && self.type_name[..self.type_name_len as usize]
                == other.type_name[..other.type_name_len as usize]
            && self.size == other.size
            && self.align == other.align
            && self.variant == other.variant
    }

    pub fn to_descriptor(&self) -> PayloadDescriptor {
        let len = (self.type_name_len as usize).min(MAX_TYPE_NAME_LEN);
        let type_name = String::from_utf8_lossy(&self.type_name[..len]).into_owned();
        PayloadDescriptor {
            type_name,
            size: self.size as usize,
            align: self.align as usize,
            variant: if self.variant == 1 {
                TypeVariant::Slice
            } else {
                TypeVariant::FixedSize
            },
        }
    }
}
