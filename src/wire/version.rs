use std::fmt;

use crate::error::DecodeError;

/// A protocol version known to this build.
///
/// The ordinal is the first field of every message. Versions differ in the width of length
/// prefixes: `V1` uses 16-bit lengths, `V2` uses 32-bit lengths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum Version {
    /// 16-bit length prefixes.
    V1 = 1,
    /// 32-bit length prefixes.
    V2 = 2,
}

impl Version {
    /// The newest version this build speaks.
    pub const CURRENT: Version = Version::V2;

    /// The oldest version this build still accepts.
    pub const OLDEST: Version = Version::V1;

    /// Every supported version, oldest first.
    pub const ALL: [Version; 2] = [Version::V1, Version::V2];

    /// The on-wire ordinal.
    pub const fn ordinal(self) -> u16 {
        self as u16
    }

    /// Looks up a version by its ordinal.
    pub fn from_ordinal(ordinal: u16) -> Result<Self, DecodeError> {
        match ordinal {
            1 => Ok(Version::V1),
            2 => Ok(Version::V2),
            _ => Err(DecodeError::UnknownVersion(ordinal)),
        }
    }

    pub(crate) const fn max_field_len(self) -> usize {
        match self {
            Version::V1 => u16::MAX as usize,
            Version::V2 => u32::MAX as usize,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.ordinal())
    }
}

/// Picks the version two peers talk after exchanging ordinals.
///
/// The lower of the two versions wins. A remote newer than this build is answered with `local`;
/// a remote older than [`Version::OLDEST`] cannot be served.
pub fn negotiate(local: Version, remote_ordinal: u16) -> Result<Version, DecodeError> {
    if remote_ordinal < Version::OLDEST.ordinal() {
        return Err(DecodeError::UnknownVersion(remote_ordinal));
    }
    if remote_ordinal >= local.ordinal() {
        return Ok(local);
    }
    Version::from_ordinal(remote_ordinal)
}
