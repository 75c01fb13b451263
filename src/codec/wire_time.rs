//! Serde adapters for every date-valued field in the record tree.
//!
//! Encoding always produces RFC 3339 with millisecond precision and a `Z`
//! suffix. Decoding is lenient and accepts every representation a remote
//! document has been seen to carry:
//! - RFC 3339 (`2025-12-11T06:50:10.674Z`)
//! - storage format without zone (`2025-12-11 06:50:10.674`), read as UTC
//! - epoch milliseconds as a JSON number, integral or fractional
//! - document-store timestamp objects (`{"seconds": .., "nanoseconds": ..}`,
//!   also with leading underscores)

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serializer};

/// Any timestamp shape accepted on the wire.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTime {
    Text(String),
    Millis(i64),
    FractionalMillis(f64),
    Timestamp {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(alias = "_nanoseconds", default)]
        nanoseconds: u32,
    },
}

impl WireTime {
    fn into_datetime(self) -> Option<DateTime<Utc>> {
        match self {
            WireTime::Text(s) => parse(&s),
            WireTime::Millis(ms) => DateTime::from_timestamp_millis(ms),
            // Sub-millisecond digits are dropped, towards zero.
            WireTime::FractionalMillis(ms) if ms.is_finite() => {
                DateTime::from_timestamp_millis(ms.trunc() as i64)
            }
            WireTime::FractionalMillis(_) => None,
            WireTime::Timestamp {
                seconds,
                nanoseconds,
            } => DateTime::from_timestamp(seconds, nanoseconds),
        }
    }
}

/// Encode a timestamp for the wire.
pub fn encode(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a textual timestamp.
/// Handles both RFC 3339 and the `YYYY-MM-DD HH:MM:SS.fff` storage format.
pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Fallback for items written before they carried a timestamp.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn decode_one<E: de::Error>(raw: WireTime) -> Result<DateTime<Utc>, E> {
    raw.into_datetime()
        .ok_or_else(|| E::custom("unrecognized timestamp representation"))
}

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&encode(dt))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    decode_one(WireTime::deserialize(deserializer)?)
}

/// Adapter for `Option<DateTime<Utc>>`. `null` decodes as `None`.
pub mod option {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_some(&encode(dt)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<WireTime>::deserialize(deserializer)?
            .map(decode_one)
            .transpose()
    }
}

/// Adapter for `Vec<DateTime<Utc>>`. `null` decodes as an empty list.
pub mod vec {
    use super::*;

    pub fn serialize<S>(values: &[DateTime<Utc>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(encode))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<Vec<WireTime>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(decode_one)
            .collect()
    }
}
