//! Shared scalar types and the capacity units inventory reports in.

/// Row ids are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;

/// Unsigned inventory counters stored in BIGINT columns. Values past
/// `i64::MAX` pin to it.
pub fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Whole gibibytes, rounded down.
pub fn bytes_to_gb(bytes: u64) -> i64 {
    saturating_i64(bytes / GB)
}

pub fn bytes_to_mb(bytes: u64) -> i64 {
    saturating_i64(bytes / MB)
}

/// Virtual disk capacity is reported in KiB.
pub fn kb_to_gb(kb: u64) -> i64 {
    saturating_i64(kb / MB)
}

pub fn hz_to_mhz(hz: u64) -> i64 {
    saturating_i64(hz / 1_000_000)
}
