//! Stream spec to JetStream configuration
//!
//! Pure and deterministic: the same spec always yields the same
//! [`StreamConfig`], and nothing here touches the network. Enum-valued spec
//! fields map through a closed table with an explicit default. Durations use
//! the NATS server's syntax (`"1h30m"`, `"1.5s"`, `"250ms"`). Integer fields
//! that don't fit the server's widths are rejected rather than truncated.

use std::time::Duration;

use jetstream_common::crd::StreamSpec;
use jetstream_common::{Error, Result};

/// Message retention policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep messages until a limit is reached
    Limits,
    /// Keep messages while a consumer is interested
    Interest,
    /// Remove messages once acknowledged
    WorkQueue,
}

impl From<&str> for RetentionPolicy {
    fn from(value: &str) -> Self {
        match value {
            "interest" => Self::Interest,
            "workqueue" => Self::WorkQueue,
            _ => Self::Limits,
        }
    }
}

/// Storage backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageType {
    /// Persisted to disk
    File,
    /// Held in memory
    Memory,
}

impl From<&str> for StorageType {
    fn from(value: &str) -> Self {
        match value {
            "file" => Self::File,
            _ => Self::Memory,
        }
    }
}

/// What to drop when a limit is reached
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardPolicy {
    /// Drop the oldest messages
    Old,
    /// Refuse new messages
    New,
}

impl From<&str> for DiscardPolicy {
    fn from(value: &str) -> Self {
        match value {
            "new" => Self::New,
            _ => Self::Old,
        }
    }
}

/// JetStream-native stream configuration, rebuilt on every reconcile
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamConfig {
    /// Stream name on the server
    pub name: String,
    /// Subjects bound to the stream
    pub subjects: Vec<String>,
    /// Retention policy
    pub retention: RetentionPolicy,
    /// Storage backend
    pub storage: StorageType,
    /// Discard policy
    pub discard: DiscardPolicy,
    /// Replica count
    pub replicas: usize,
    /// Maximum message age; zero means unlimited
    pub max_age: Duration,
    /// Maximum stored bytes
    pub max_bytes: i64,
    /// Maximum stored messages
    pub max_msgs: i64,
    /// Maximum message size
    pub max_msg_size: i32,
    /// Maximum consumer count
    pub max_consumers: i32,
    /// Duplicate tracking window; zero means server default
    pub duplicate_window: Duration,
    /// Disable publish acknowledgements
    pub no_ack: bool,
}

/// Translate a Stream spec into the server configuration
pub fn translate(spec: &StreamSpec) -> Result<StreamConfig> {
    if spec.name.is_empty() {
        return Err(Error::validation("spec.name", "must not be empty"));
    }

    Ok(StreamConfig {
        name: spec.name.clone(),
        subjects: spec.subjects.clone(),
        retention: RetentionPolicy::from(spec.retention.as_str()),
        storage: StorageType::from(spec.storage.as_str()),
        discard: DiscardPolicy::from(spec.discard.as_str()),
        replicas: narrow_count("spec.replicas", spec.replicas)?,
        max_age: parse_duration("spec.maxAge", &spec.max_age)?,
        max_bytes: spec.max_bytes,
        max_msgs: spec.max_msgs,
        max_msg_size: narrow_i32("spec.maxMsgSize", spec.max_msg_size)?,
        max_consumers: narrow_i32("spec.maxConsumers", spec.max_consumers)?,
        duplicate_window: parse_duration("spec.duplicateWindow", &spec.duplicate_window)?,
        no_ack: spec.no_ack,
    })
}

fn narrow_i32(field: &str, value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| {
        Error::validation(
            field,
            format!("{value} is out of range for a 32-bit signed integer"),
        )
    })
}

fn narrow_count(field: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::validation(field, format!("{value} must be a non-negative count")))
}

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Durations above this are rejected, matching the server's 64-bit signed nanoseconds
const MAX_DURATION_NANOS: u128 = i64::MAX as u128;

/// Fraction digits beyond this are ignored
const MAX_FRACTION_DIGITS: usize = 18;

/// Parse a duration in NATS server syntax
///
/// A possibly signed sequence of decimal numbers, each with an optional
/// fraction and a required unit suffix: `ns`, `us` (or `µs`), `ms`, `s`,
/// `m`, `h`. The bare string `"0"` is accepted. An empty string means
/// "unset" and yields zero. Negative durations are rejected.
pub fn parse_duration(field: &str, input: &str) -> Result<Duration> {
    if input.is_empty() {
        return Ok(Duration::ZERO);
    }

    let invalid = |reason: &str| Error::validation(field, format!("invalid duration {input:?}: {reason}"));

    let (negative, mut rest) = if let Some(r) = input.strip_prefix('-') {
        (true, r)
    } else if let Some(r) = input.strip_prefix('+') {
        (false, r)
    } else {
        (false, input)
    };

    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid("missing value"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_digits, mut after) = rest.split_at(int_len);

        let mut frac_digits = "";
        if let Some(stripped) = after.strip_prefix('.') {
            let frac_len = stripped.bytes().take_while(u8::is_ascii_digit).count();
            frac_digits = &stripped[..frac_len];
            after = &stripped[frac_len..];
        }
        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(invalid("expected a number"));
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, next) = after.split_at(unit_len);
        let unit_nanos = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NANOS_PER_MICRO,
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            "" => return Err(invalid("missing unit")),
            other => return Err(invalid(&format!("unknown unit {other:?}"))),
        };

        let whole: u128 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| invalid("overflow"))?
        };
        let mut nanos = whole
            .checked_mul(unit_nanos)
            .ok_or_else(|| invalid("overflow"))?;

        if !frac_digits.is_empty() {
            let kept = &frac_digits[..frac_digits.len().min(MAX_FRACTION_DIGITS)];
            let fraction: u128 = kept.parse().map_err(|_| invalid("overflow"))?;
            let scale = 10u128.pow(kept.len() as u32);
            nanos += fraction * unit_nanos / scale;
        }

        total = total
            .checked_add(nanos)
            .filter(|t| *t <= MAX_DURATION_NANOS)
            .ok_or_else(|| invalid("overflow"))?;
        rest = next;
    }

    if negative && total != 0 {
        return Err(Error::validation(
            field,
            format!("invalid duration {input:?}: must not be negative"),
        ));
    }

    let nanos = u64::try_from(total).map_err(|_| invalid("overflow"))?;
    Ok(Duration::from_nanos(nanos))
}
