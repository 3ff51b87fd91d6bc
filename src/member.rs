//! Identity of a cluster member.

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

static MEMBER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies a single participant in the distributed system.
///
/// A `MemberId` combines the member's network address with a token that is unique within the
/// process that created it, so a member which restarts on the same address is a different member.
/// It is the unit of addressing and of failure reporting: a reply which cannot be delivered is
/// reported as the set of `MemberId`s that could not be reached.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId {
    addr: SocketAddr,
    token: u64,
}

impl MemberId {
    /// Creates a `MemberId` with an explicit token.
    pub const fn new(addr: SocketAddr, token: u64) -> Self {
        MemberId { addr, token }
    }

    /// Creates a `MemberId` for `addr`, drawing a fresh token from a process-wide counter.
    pub fn generate(addr: SocketAddr) -> Self {
        MemberId::new(addr, MEMBER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// The member's network address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The process-unique token.
    pub fn token(&self) -> u64 {
        self.token
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({}#{})", self.addr, self.token)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.addr, self.token)
    }
}
