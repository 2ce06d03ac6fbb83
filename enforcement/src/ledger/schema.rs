//! Column family and key layout for the RocksDB ledger
//!
//! Key formats are shared with the in-memory ledger's ordering rules so both
//! return violations in the same order.

/// Column family for sanction state, one row per identity
pub const CF_SANCTIONS: &str = "sanctions";

/// Column family for violation records
pub const CF_VIOLATIONS: &str = "violations";

/// Column family for the ban-event outbox
pub const CF_OUTBOX: &str = "outbox";

/// All column family names
pub const ALL_CFS: &[&str] = &[CF_SANCTIONS, CF_VIOLATIONS, CF_OUTBOX];

/// Key prefixes for compound keys
pub mod keys {
    /// Sanction state key
    pub fn sanction(identity_id: &str) -> String {
        format!("sanction:{}", identity_id)
    }

    /// Prefix covering every violation of one identity.
    ///
    /// Identities are opaque and may contain `/`, so the prefix carries a
    /// fixed-width blake3 digest of the identity instead of the raw string.
    /// No identity's prefix can then be a prefix of another's keys.
    pub fn violation_prefix(identity_id: &str) -> String {
        format!("viol:{}/", blake3::hash(identity_id.as_bytes()).to_hex())
    }

    /// Violation key, zero-padded so lexicographic order is strike order
    pub fn violation(identity_id: &str, warning_number: u32) -> String {
        format!("{}{:010}", violation_prefix(identity_id), warning_number)
    }

    /// Outbox key
    pub fn outbox(idempotency_key: &str) -> String {
        format!("outbox:{}", idempotency_key)
    }

    /// Parse the warning number back out of a violation key
    pub fn parse_warning_number(key: &[u8]) -> Option<u32> {
        let key = std::str::from_utf8(key).ok()?;
        let (_, number) = key.rsplit_once('/')?;
        number.parse().ok()
    }
}
