// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Validated service names and the derivation of POSIX/Win32-safe shared
// memory segment names from them.

use thiserror::Error;

/// Maximum byte length of a normalised service name.
pub const MAX_NAME_LEN: usize = 64;

/// Why a service name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("service name is empty")]
    Empty,
    #[error("service name is {len} bytes, maximum is {max}")]
    TooLong { len: usize, max: usize },
    #[error("service name contains an embedded null byte")]
    EmbeddedNul,
    #[error("service name contains a control character")]
    ControlCharacter,
}

/// An immutable, validated service identifier used as a discovery key.
///
/// Names are normalised before validation: repeated `/` separators collapse
/// to one and leading/trailing separators are stripped, so `"a//b/"` and
/// `"a/b"` name the same service. Equality is exact-string on the normalised
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceName {
    name: String,
}

impl ServiceName {
    /// Normalise and validate `raw`.
    pub fn new(raw: &str) -> Result<Self, NameError> {
        if raw.bytes().any(|b| b == 0) {
            return Err(NameError::EmbeddedNul);
        }
        if raw.chars().any(|c| c.is_control()) {
            return Err(NameError::ControlCharacter);
        }

        let mut name = String::with_capacity(raw.len());
        for part in raw.split('/').filter(|p| !p.is_empty()) {
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(part);
        }

        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong {
                len: name.len(),
                max: MAX_NAME_LEN,
            });
        }
        Ok(Self { name })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// 64-bit FNV-1a hash of the normalised name, used to derive fixed-width
    /// shared-memory segment names regardless of the characters the service
    /// name contains.
    pub fn hash(&self) -> u64 {
        fnv1a_64(self.name.as_bytes())
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<&str> for ServiceName {
    type Error = NameError;

    fn try_from(raw: &str) -> Result<Self, NameError> {
        Self::new(raw)
    }
}

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in data {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Map a free-form string to a segment-name-safe component: anything outside
/// `[A-Za-z0-9_]` becomes `_`. Collisions are acceptable here, the callers
/// append a hash of the exact original where uniqueness matters.
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Fixed-width lowercase hex rendering of a 64-bit value.
pub(crate) fn to_hex(val: u64) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut buf = [0u8; 16];
    let mut v = val;
    for i in (0..16).rev() {
        buf[i] = DIGITS[(v & 0xf) as usize];
        v >>= 4;
    }
    // Safety-free: all bytes are ASCII hex digits.
    String::from_utf8_lossy(&buf).into_owned()
}
