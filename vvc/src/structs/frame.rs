//! Assembled frames and gathered access units.
//!
//! A [`Frame`] is the packetizer's view of one coded picture of one layer:
//! the NAL units in arrival order plus flags and timestamps. Gathering a
//! frame concatenates the unit bytes into a single [`AccessUnit`] that can be
//! handed to any number of sinks.

use std::fmt::Display;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use crate::structs::nal::NalUnit;
use crate::utils::buffer_pool::BufferPool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    pub key: bool,
    pub predicted: bool,
    pub bidirectional: bool,
    /// Emitted to keep its position only; the payload must not be decoded.
    pub drop: bool,
}

impl FrameFlags {
    pub const KEY: Self = Self {
        key: true,
        predicted: false,
        bidirectional: false,
        drop: false,
    };

    pub const DROP: Self = Self {
        key: false,
        predicted: false,
        bidirectional: false,
        drop: true,
    };

    /// Picture type implied by the highest temporal id seen in a frame.
    pub fn from_temporal_id(temporal_id: i8) -> Self {
        Self {
            predicted: temporal_id < 2,
            bidirectional: temporal_id >= 2,
            ..Default::default()
        }
    }

    /// Flags contributed by a single unit.
    pub fn from_unit(unit: &NalUnit) -> Self {
        let unit_type = unit.unit_type();
        if unit_type.is_slice() && unit_type.is_irap() {
            Self::KEY
        } else {
            Self::default()
        }
    }
}

impl BitOr for FrameFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            key: self.key | rhs.key,
            predicted: self.predicted | rhs.predicted,
            bidirectional: self.bidirectional | rhs.bidirectional,
            drop: self.drop | rhs.drop,
        }
    }
}

impl BitOrAssign for FrameFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl Display for FrameFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.key {
            "I"
        } else if self.bidirectional {
            "B"
        } else if self.predicted {
            "P"
        } else {
            "-"
        };

        write!(f, "{kind}")?;
        if self.drop {
            write!(f, " (drop)")?;
        }
        Ok(())
    }
}

/// NAL units of one access unit, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub units: Vec<NalUnit>,
    pub flags: FrameFlags,
    pub dts: i64,
    pub pts: Option<i64>,
    pub layer_id: u8,
}

impl Frame {
    pub fn nal_count(&self) -> usize {
        self.units.len()
    }

    /// Total Annex-B size in bytes, start codes included.
    pub fn byte_len(&self) -> usize {
        self.units.iter().map(NalUnit::len).sum()
    }

    pub fn is_drop(&self) -> bool {
        self.flags.drop
    }

    /// A frame with the same timing holding `units` instead.
    ///
    /// The key flag is recomputed from the new units when gathering.
    pub fn select(&self, units: Vec<NalUnit>) -> Frame {
        let layer_id = units
            .iter()
            .find(|unit| unit.unit_type().is_slice())
            .map_or(self.layer_id, NalUnit::layer_id);

        Frame {
            units,
            flags: FrameFlags {
                key: false,
                ..self.flags
            },
            dts: self.dts,
            pts: self.pts,
            layer_id,
        }
    }

    /// Concatenates the unit bytes into one access unit.
    ///
    /// Dropped frames still cycle a pool buffer but yield no payload.
    pub fn gather(self, pool: &mut BufferPool) -> AccessUnit {
        let flags = self
            .units
            .iter()
            .fold(self.flags, |flags, unit| flags | FrameFlags::from_unit(unit));

        let mut buffer = pool.acquire();
        if !flags.drop {
            for unit in &self.units {
                buffer.extend_from_slice(unit.bytes());
            }
        }

        let data: Arc<[u8]> = Arc::from(buffer.as_slice());
        pool.release(buffer);

        AccessUnit {
            data,
            dts: self.dts,
            pts: self.pts,
            flags,
            layer_id: self.layer_id,
            nal_count: self.units.len(),
        }
    }
}

/// A gathered frame ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    pub data: Arc<[u8]>,
    pub dts: i64,
    pub pts: Option<i64>,
    pub flags: FrameFlags,
    pub layer_id: u8,
    pub nal_count: usize,
}

impl AccessUnit {
    /// Dropped units carry no payload and must be treated as empty.
    pub fn is_discarded(&self) -> bool {
        self.flags.drop
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[test]
fn gather_concatenates_units() {
    let units: Vec<NalUnit> = [
        vec![0, 0, 0, 1, 0x00, 0x79, 0x11],
        vec![0, 0, 1, 0x00, 0x41, 0x80, 0x22],
    ]
    .into_iter()
    .map(|bytes| NalUnit::from_annexb(bytes).unwrap())
    .collect();

    let frame = Frame {
        units,
        flags: FrameFlags::from_temporal_id(0),
        dts: 40_000,
        pts: Some(80_000),
        layer_id: 0,
    };
    assert_eq!(frame.byte_len(), 14);

    let mut pool = BufferPool::new(2, 64);
    let au = frame.gather(&mut pool);
    assert_eq!(
        &au.data[..],
        &[0, 0, 0, 1, 0x00, 0x79, 0x11, 0, 0, 1, 0x00, 0x41, 0x80, 0x22]
    );
    assert!(au.flags.key && au.flags.predicted);
    assert_eq!(au.flags.to_string(), "I");
    assert_eq!(au.nal_count, 2);
    assert_eq!(au.pts, Some(80_000));
    assert_eq!(pool.idle(), 1);
}

#[test]
fn dropped_frame_is_empty() {
    let frame = Frame {
        units: vec![NalUnit::from_annexb(vec![0, 0, 1, 0x00, 0x01, 0x80]).unwrap()],
        flags: FrameFlags::from_temporal_id(3) | FrameFlags::DROP,
        ..Default::default()
    };

    let au = frame.gather(&mut BufferPool::default());
    assert!(au.is_discarded());
    assert!(au.is_empty());
    assert_eq!(au.flags.to_string(), "B (drop)");
}
