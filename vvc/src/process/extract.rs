use std::collections::VecDeque;

use log::{debug, trace};

use crate::structs::nal::{NAL_HEADER_LEN, NalUnit};
use crate::utils::errors::ExtractError;
use crate::utils::startcode::{STARTCODE, find_startcode, startcode_len};

/// Timestamps supplied with one pushed chunk.
#[derive(Debug, Clone, Copy)]
struct ChunkTimestamp {
    /// Absolute stream offset of the first byte of the chunk.
    start: u64,
    end: u64,
    dts: Option<i64>,
    pts: Option<i64>,
}

/// Extracts NAL units from a continuous Annex-B byte stream.
///
/// A unit is complete once the start code of the next unit is buffered, so
/// the last unit of a stream is only released by [`flush`](Extractor::flush).
/// Bytes before the first start code are skipped.
///
/// # Example
///
/// ```rust
/// use vvc::process::EXAMPLE_DATA;
/// use vvc::process::extract::Extractor;
///
/// let mut extractor = Extractor::default();
/// extractor.push_bytes(EXAMPLE_DATA);
///
/// let mut units = 0;
/// for unit in &mut extractor {
///     match unit {
///         Ok(unit) => {
///             println!("{} on layer {}", unit.unit_type(), unit.layer_id());
///             units += 1;
///         }
///         Err(e) if e.is_insufficient_data() => break,
///         Err(e) => eprintln!("{e}"),
///     }
/// }
///
/// // the final EOS waits for the end of input
/// assert_eq!(units, 9);
/// assert!(extractor.flush().is_some());
/// ```
#[derive(Debug)]
pub struct Extractor {
    buffer: VecDeque<u8>,
    /// Absolute stream offset of `buffer[0]`.
    base_offset: u64,
    synced: bool,
    /// Buffer position where the next start code search resumes.
    scan_from: usize,
    io_counter: usize,
    timestamps: VecDeque<ChunkTimestamp>,
    skipped_bytes: u64,
    units_extracted: usize,
    malformed_units: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            buffer: VecDeque::with_capacity(256 * 1024),
            base_offset: 0,
            synced: false,
            scan_from: 0,
            io_counter: 0,
            timestamps: VecDeque::new(),
            skipped_bytes: 0,
            units_extracted: 0,
            malformed_units: 0,
        }
    }
}

impl Extractor {
    /// Adds raw stream data to the internal buffer.
    ///
    /// Chunks may end anywhere, including inside a start code.
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.push_bytes_with_time(data, None, None);
    }

    /// Adds stream data carrying external timestamps.
    ///
    /// The timestamps go to the first unit whose start code lies inside this
    /// chunk and are used at most once.
    pub fn push_bytes_with_time(&mut self, data: &[u8], dts: Option<i64>, pts: Option<i64>) {
        if dts.is_some() || pts.is_some() {
            let start = self.base_offset + self.buffer.len() as u64;
            self.timestamps.push_back(ChunkTimestamp {
                start,
                end: start + data.len() as u64,
                dts,
                pts,
            });
        }

        self.buffer.extend(data);
        self.io_counter += 1;
    }

    /// Releases the buffered tail as the last unit of the stream.
    ///
    /// Returns `None` when nothing but skipped bytes remain.
    pub fn flush(&mut self) -> Option<Result<NalUnit, ExtractError>> {
        self.io_counter = 0;

        if !self.synced && self.sync().is_none() {
            let remaining = self.buffer.len();
            self.consume_front(remaining);
            self.skipped_bytes += remaining as u64;
            return None;
        }

        self.synced = false;
        self.scan_from = 0;

        let len = self.buffer.len();
        if len == 0 {
            return None;
        }

        Some(self.take_unit(len))
    }

    /// Drops all buffered data and pending timestamps.
    pub fn reset(&mut self) {
        let buffered = self.buffer.len();
        self.consume_front(buffered);
        self.timestamps.clear();
        self.synced = false;
        self.scan_from = 0;
        self.io_counter = 0;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Bytes discarded while searching for the first start code.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    pub fn units_extracted(&self) -> usize {
        self.units_extracted
    }

    pub fn malformed_units(&self) -> usize {
        self.malformed_units
    }

    /// Aligns the buffer to the first start code. Keeps a possible partial
    /// start code at the end when none is found.
    fn sync(&mut self) -> Option<()> {
        let found = find_startcode(self.buffer.make_contiguous(), 0);

        let Some(pos) = found else {
            // a zero before a partial start code may open the 4-byte form
            let keep = STARTCODE.len();
            let skipped = self.buffer.len().saturating_sub(keep);
            self.consume_front(skipped);
            self.skipped_bytes += skipped as u64;
            return None;
        };

        let start = if pos > 0 && self.buffer[pos - 1] == 0x00 {
            pos - 1
        } else {
            pos
        };

        if start > 0 {
            debug!("Skipped {start} bytes before the first start code");
            self.consume_front(start);
            self.skipped_bytes += start as u64;
        }

        self.synced = true;
        self.scan_from = 0;
        Some(())
    }

    fn take_unit(&mut self, len: usize) -> Result<NalUnit, ExtractError> {
        let startcode_abs = self.base_offset;
        let mut data: Vec<u8> = self.buffer.drain(..len).collect();
        self.base_offset += len as u64;

        let prefix = startcode_len(&data);
        let startcode_abs = startcode_abs + prefix.saturating_sub(STARTCODE.len()) as u64;

        // zero_byte / trailing_zero_8bits
        while data.len() > prefix + NAL_HEADER_LEN && data.last() == Some(&0x00) {
            data.pop();
        }

        let (dts, pts) = self.take_timestamps(startcode_abs);

        match NalUnit::from_annexb(data) {
            Ok(unit) => {
                self.units_extracted += 1;
                trace!(
                    "NAL {} layer {} tid {} ({} bytes)",
                    unit.unit_type(),
                    unit.layer_id(),
                    unit.temporal_id(),
                    unit.len()
                );
                Ok(unit.with_timestamps(dts, pts))
            }
            Err(source) => {
                self.malformed_units += 1;
                Err(ExtractError::MalformedNal { len, source })
            }
        }
    }

    fn take_timestamps(&mut self, startcode_abs: u64) -> (Option<i64>, Option<i64>) {
        while self
            .timestamps
            .front()
            .is_some_and(|ts| ts.end <= startcode_abs)
        {
            self.timestamps.pop_front();
        }

        match self.timestamps.front() {
            Some(ts) if ts.start <= startcode_abs => {
                let (dts, pts) = (ts.dts, ts.pts);
                self.timestamps.pop_front();
                (dts, pts)
            }
            _ => (None, None),
        }
    }

    fn consume_front(&mut self, cnt: usize) {
        self.buffer.drain(..cnt);
        self.base_offset += cnt as u64;
    }

    fn iter_insufficient(&mut self) -> Option<Result<NalUnit, ExtractError>> {
        self.io_counter = 0;
        Some(Err(ExtractError::InsufficientData))
    }
}

impl Iterator for Extractor {
    type Item = Result<NalUnit, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.io_counter == 0 {
            return None;
        }

        if !self.synced && self.sync().is_none() {
            return self.iter_insufficient();
        }

        let prefix = startcode_len(self.buffer.make_contiguous());
        let from = self.scan_from.max(prefix);

        let Some(pos) = find_startcode(self.buffer.make_contiguous(), from) else {
            self.scan_from = self
                .buffer
                .len()
                .saturating_sub(STARTCODE.len() - 1)
                .max(prefix);
            return self.iter_insufficient();
        };

        // a zero before the next start code makes it the 4-byte form
        let end = if pos > prefix && self.buffer[pos - 1] == 0x00 {
            pos - 1
        } else {
            pos
        };

        self.scan_from = 0;
        Some(self.take_unit(end))
    }
}

#[test]
fn split_chunks_and_long_startcodes() {
    use crate::process::EXAMPLE_DATA;

    let mut extractor = Extractor::default();
    let mut units = Vec::new();

    for chunk in EXAMPLE_DATA.chunks(3) {
        extractor.push_bytes(chunk);
        for unit in &mut extractor {
            match unit {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    assert_eq!(e, ExtractError::InsufficientData);
                    break;
                }
            }
        }
    }
    units.push(extractor.flush().unwrap().unwrap());

    assert_eq!(units.len(), 10);
    assert_eq!(units[0].startcode_len(), 4);
    let rebuilt: Vec<u8> = units.iter().flat_map(|u| u.bytes().to_vec()).collect();
    assert_eq!(rebuilt, EXAMPLE_DATA);
    assert!(extractor.next().is_none());
}

#[test]
fn skip_garbage_and_trailing_zeros() {
    let mut extractor = Extractor::default();
    extractor.push_bytes(&[0xFF, 0x12, 0x00, 0x00, 0x00, 0x01, 0x00, 0x79, 0x33]);
    extractor.push_bytes(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x81, 0x44]);

    let sps = extractor.next().unwrap().unwrap();
    assert_eq!(sps.bytes(), &[0x00, 0x00, 0x00, 0x01, 0x00, 0x79, 0x33]);
    assert_eq!(extractor.skipped_bytes(), 2);

    assert_eq!(
        extractor.next(),
        Some(Err(ExtractError::InsufficientData))
    );
    assert_eq!(extractor.next(), None);

    let pps = extractor.flush().unwrap().unwrap();
    assert_eq!(pps.bytes(), &[0x00, 0x00, 0x00, 0x01, 0x00, 0x81, 0x44]);
    assert!(extractor.flush().is_none());
}

#[test]
fn malformed_units_are_reported() {
    let mut extractor = Extractor::default();
    extractor.push_bytes(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x01, 0x80, 0x79, 0x00, 0x00, 0x01]);

    assert!(matches!(
        extractor.next(),
        Some(Err(ExtractError::MalformedNal { .. }))
    ));
    assert!(matches!(
        extractor.next(),
        Some(Err(ExtractError::MalformedNal { .. }))
    ));
    assert_eq!(extractor.malformed_units(), 2);
    assert!(extractor.flush().unwrap().is_err());
}

#[test]
fn chunk_timestamps_attach_once() {
    use crate::process::EXAMPLE_DATA;

    let mut extractor = Extractor::default();
    // VPS and SPS start in the first chunk, PPS in the second
    extractor.push_bytes_with_time(&EXAMPLE_DATA[..19], Some(1_000), Some(3_000));
    extractor.push_bytes_with_time(&EXAMPLE_DATA[19..], Some(2_000), None);

    let units: Vec<NalUnit> = extractor.by_ref().map_while(Result::ok).collect();
    assert_eq!((units[0].dts, units[0].pts), (Some(1_000), Some(3_000)));
    assert_eq!(units[1].dts, None);
    assert_eq!(units[2].dts, Some(2_000));
    assert_eq!(units[3].dts, None);
}
