//! Actor/action fingerprints for thread dedup.
//!
//! The digest input is the plain concatenation of the identity `type`,
//! `principalId`, `arn`, `accountId` and the `eventName`, with absent
//! identity fields replaced by [`SENTINEL`]. Keeping the input unseparated
//! keeps keys identical to those already stored in existing thread tables.

use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;

use trailpost_core::CloudTrailRecord;

/// Stand-in for an identity field the record does not carry.
pub const SENTINEL: &str = "N/A";

/// Identity fields that feed the digest, in order.
pub const IDENTITY_FIELDS: [&str; 4] = ["type", "principalId", "arn", "accountId"];

/// Minimum number of identity fields that must be present.
pub const MIN_KNOWN_FIELDS: usize = 2;

/// Hex-encoded SHA-256 digest identifying one actor performing one action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the fingerprint of `record`.
///
/// Returns `None` when `userIdentity` is missing or empty, or when fewer
/// than [`MIN_KNOWN_FIELDS`] identity fields are present: such records
/// cannot be attributed confidently and are never threaded.
pub fn fingerprint(record: &CloudTrailRecord) -> Option<Fingerprint> {
    let identity = record.user_identity().filter(|identity| !identity.is_empty());
    if identity.is_none() {
        debug!(event_name = record.event_name(), "no userIdentity to fingerprint");
        return None;
    }

    let fields = IDENTITY_FIELDS.map(|field| record.identity_field(field).unwrap_or(SENTINEL));
    let known = fields.iter().filter(|value| **value != SENTINEL).count();
    if known < MIN_KNOWN_FIELDS {
        debug!(known, "not enough identity information to fingerprint");
        return None;
    }

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
    }
    hasher.update(record.event_name().as_bytes());
    let digest = Fingerprint(hex::encode(hasher.finalize()));
    debug!(fingerprint = %digest, "record fingerprinted");
    Some(digest)
}
