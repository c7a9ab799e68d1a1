//! Time values.
//!
//! Time points and durations are stored as `int64` seconds relative to the
//! Unix epoch. Sub-second precision is truncated on write.

use chrono::{DateTime, Duration, Utc};
use obs_common::{ObsError, ObsResult};
use serde::{Deserialize, Serialize};

use super::accessor::{wrong_width, PackedAccessor, PackedElement, StorageType};
use super::{BasicType, CompoundField, TypeDescriptor};

impl PackedElement for DateTime<Utc> {
    fn packed_size() -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        self.timestamp().pack(out);
    }

    fn unpack(bytes: &[u8]) -> ObsResult<Self> {
        let secs = i64::unpack(bytes)?;
        DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
            ObsError::invalid_argument("stored time point is out of range").with("seconds", secs)
        })
    }
}

impl StorageType for DateTime<Utc> {
    type Accessor = PackedAccessor<DateTime<Utc>>;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Fundamental(BasicType::Int64)
    }
}

impl PackedElement for Duration {
    fn packed_size() -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        self.num_seconds().pack(out);
    }

    fn unpack(bytes: &[u8]) -> ObsResult<Self> {
        let secs = i64::unpack(bytes)?;
        Duration::try_seconds(secs).ok_or_else(|| {
            ObsError::invalid_argument("stored duration is out of range").with("seconds", secs)
        })
    }
}

impl StorageType for Duration {
    type Accessor = PackedAccessor<Duration>;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Fundamental(BasicType::Int64)
    }
}

/// Date and time of day as two integers: `YYYYMMDD` and `HHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateTimeRecord {
    pub date: i32,
    pub time: i32,
}

impl DateTimeRecord {
    pub fn new(date: i32, time: i32) -> Self {
        Self { date, time }
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> ObsResult<Self> {
        let date = dt.format("%Y%m%d").to_string();
        let time = dt.format("%H%M%S").to_string();
        let parse = |s: &str| {
            s.parse::<i32>().map_err(|e| {
                ObsError::invalid_argument("time point does not fit a date/time record")
                    .with("value", s)
                    .with_source(e)
            })
        };
        Ok(Self {
            date: parse(&date)?,
            time: parse(&time)?,
        })
    }
}

impl PackedElement for DateTimeRecord {
    fn packed_size() -> usize {
        8
    }

    fn pack(&self, out: &mut Vec<u8>) {
        self.date.pack(out);
        self.time.pack(out);
    }

    fn unpack(bytes: &[u8]) -> ObsResult<Self> {
        if bytes.len() != 8 {
            return Err(wrong_width(8, bytes.len()));
        }
        Ok(Self {
            date: i32::unpack(&bytes[0..4])?,
            time: i32::unpack(&bytes[4..8])?,
        })
    }
}

impl StorageType for DateTimeRecord {
    type Accessor = PackedAccessor<DateTimeRecord>;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Compound {
            size: 8,
            fields: vec![
                CompoundField {
                    name: "date".to_string(),
                    offset: 0,
                    field_type: TypeDescriptor::Fundamental(BasicType::Int32),
                },
                CompoundField {
                    name: "time".to_string(),
                    offset: 4,
                    field_type: TypeDescriptor::Fundamental(BasicType::Int32),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectAccessor;
    use chrono::TimeZone;

    #[test]
    fn test_time_point_is_epoch_seconds() {
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let buf = <DateTime<Utc>>::accessor().serialize(&[t]).unwrap();
        let secs = i64::accessor().deserialize(&buf, 1).unwrap();
        assert_eq!(secs, vec![1_705_320_000]);
        assert_eq!(<DateTime<Utc>>::accessor().deserialize(&buf, 1).unwrap(), vec![t]);
    }

    #[test]
    fn test_duration_roundtrip() {
        let d = Duration::try_seconds(-3600).unwrap();
        let buf = Duration::accessor().serialize(&[d]).unwrap();
        assert_eq!(Duration::accessor().deserialize(&buf, 1).unwrap(), vec![d]);
    }

    #[test]
    fn test_record_layout() {
        let rec = DateTimeRecord::new(20240115, 123000);
        let buf = DateTimeRecord::accessor().serialize(&[rec]).unwrap();
        let halves = i32::accessor().deserialize(
            &crate::buffer::ElementBuffer::packed(4, buf.packed_bytes(8).unwrap().to_vec())
                .unwrap(),
            2,
        );
        assert_eq!(halves.unwrap(), vec![20240115, 123000]);
        assert_eq!(DateTimeRecord::descriptor().size(), 8);
        assert!(DateTimeRecord::descriptor().validate().is_ok());
    }

    #[test]
    fn test_record_from_datetime() {
        let t = Utc.with_ymd_and_hms(2021, 6, 30, 23, 59, 1).unwrap();
        assert_eq!(
            DateTimeRecord::from_datetime(&t).unwrap(),
            DateTimeRecord::new(20210630, 235901)
        );
    }
}
