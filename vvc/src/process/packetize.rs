use std::collections::VecDeque;

use log::Level::{Info, Warn};
use log::{debug, trace};

use crate::log_or_err;
use crate::process::extract::Extractor;
use crate::structs::frame::{Frame, FrameFlags};
use crate::structs::nal::{NalUnit, NalUnitType};
use crate::utils::errors::{ExtractError, PacketizeError};
use crate::utils::timing::{ClockState, Discontinuity, FrameRate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketizerState {
    /// No start code has been found yet.
    Unsynced,
    Accumulating,
}

#[derive(Debug, Clone)]
pub struct PacketizerConfig {
    /// Rate used to advance timestamps; 50/1 when unset.
    pub frame_rate: Option<FrameRate>,
    /// Warnings at or above this severity are returned as errors.
    pub fail_level: log::Level,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            frame_rate: None,
            fail_level: log::Level::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketizerStats {
    pub nal_units: usize,
    pub frames_emitted: usize,
    pub frames_dropped: usize,
    pub malformed_units: usize,
    pub skipped_bytes: u64,
    pub discontinuities: usize,
}

/// Groups NAL units into access units.
///
/// Picture boundaries are decided from NAL header bits and the first bit of
/// each slice only. Units that may open the next picture (prefix SEI and
/// APS, filler data, reserved types) are held back until the following unit
/// shows whether a new picture starts.
///
/// # Example
///
/// ```rust
/// use vvc::process::EXAMPLE_DATA;
/// use vvc::process::packetize::Packetizer;
///
/// let mut packetizer = Packetizer::default();
/// packetizer.push_bytes(EXAMPLE_DATA);
///
/// let mut frames = Vec::new();
/// for result in &mut packetizer {
///     match result {
///         Ok(frame) => frames.push(frame),
///         Err(e) if e.is_insufficient_data() => break,
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// frames.extend(packetizer.flush()?);
///
/// assert_eq!(frames.len(), 4);
/// assert!(frames[0].flags.key);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Packetizer {
    extractor: Extractor,
    frame: Vec<NalUnit>,
    pending: Vec<NalUnit>,
    output: VecDeque<Frame>,

    slice_in_picture: bool,
    got_vps: bool,
    got_sps: bool,
    got_pps: bool,
    init_sequence_complete: bool,
    last_temporal_id: i8,

    clock: ClockState,
    fail_level: log::Level,
    stats: PacketizerStats,
}

impl Default for Packetizer {
    fn default() -> Self {
        Self::new(PacketizerConfig::default())
    }
}

impl Packetizer {
    pub fn new(config: PacketizerConfig) -> Self {
        Self {
            extractor: Extractor::default(),
            frame: Vec::new(),
            pending: Vec::new(),
            output: VecDeque::new(),
            slice_in_picture: false,
            got_vps: false,
            got_sps: false,
            got_pps: false,
            init_sequence_complete: false,
            last_temporal_id: 0,
            clock: ClockState::new(config.frame_rate.unwrap_or_default()),
            fail_level: config.fail_level,
            stats: PacketizerStats::default(),
        }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.extractor.push_bytes(data);
    }

    pub fn push_bytes_with_time(&mut self, data: &[u8], dts: Option<i64>, pts: Option<i64>) {
        self.extractor.push_bytes_with_time(data, dts, pts);
    }

    /// Primes the packetizer with out-of-band parameter sets.
    ///
    /// The units lead the first frame. Call before any stream data.
    pub fn push_header(&mut self, data: &[u8]) -> Result<(), PacketizeError> {
        let mut extractor = Extractor::default();
        extractor.push_bytes(data);

        let mut units = Vec::new();
        for result in extractor.by_ref() {
            match result {
                Ok(unit) => units.push(unit),
                Err(ExtractError::InsufficientData) => break,
                Err(error) => log_or_err!(self, Warn, PacketizeError::from(error)),
            }
        }
        match extractor.flush() {
            Some(Ok(unit)) => units.push(unit),
            Some(Err(error)) => log_or_err!(self, Warn, PacketizeError::from(error)),
            None => {}
        }

        debug!("Priming with {} header units", units.len());
        for unit in units {
            self.packetize(unit)?;
        }

        if !self.output.is_empty() {
            debug!("Discarding {} frames completed by the header", self.output.len());
            self.output.clear();
        }
        Ok(())
    }

    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }

    pub fn set_frame_rate(&mut self, rate: FrameRate) {
        self.clock.set_rate(rate);
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.clock.rate()
    }

    /// Numerically smallest layer id seen so far.
    pub fn base_layer_id(&self) -> Option<u8> {
        self.clock.base_layer_id()
    }

    pub fn is_init_sequence_complete(&self) -> bool {
        self.init_sequence_complete
    }

    pub fn has_vps(&self) -> bool {
        self.got_vps
    }

    pub fn state(&self) -> PacketizerState {
        if self.extractor.is_synced() || !self.frame.is_empty() || !self.pending.is_empty() {
            PacketizerState::Accumulating
        } else {
            PacketizerState::Unsynced
        }
    }

    pub fn stats(&self) -> PacketizerStats {
        PacketizerStats {
            nal_units: self.extractor.units_extracted(),
            malformed_units: self.extractor.malformed_units(),
            skipped_bytes: self.extractor.skipped_bytes(),
            ..self.stats
        }
    }

    /// Takes the next completed frame, if any.
    pub fn take_frame(&mut self) -> Option<Frame> {
        self.output.pop_front()
    }

    /// Feeds one classified unit. Completed frames are queued for
    /// [`take_frame`](Packetizer::take_frame) and the iterator.
    pub fn packetize(&mut self, unit: NalUnit) -> Result<(), PacketizeError> {
        use NalUnitType::*;

        self.clock.anchor(unit.dts, unit.pts);
        if self.clock.observe_layer(unit.layer_id()) {
            debug!("Base layer is now {}", unit.layer_id());
        }

        let unit_type = unit.unit_type();
        let mut first_slice = false;
        let mut speculative = false;

        let new_picture = match unit_type {
            Aud | Opi | Dci | Vps | Sps | Pps | Ph => self.slice_in_picture,
            Eos | Eob => true,
            SuffixSei | SuffixAps => false,
            _ if unit_type.is_slice() => {
                first_slice = unit.first_slice_in_pic_flag() || !self.slice_in_picture;
                let new_picture = self.slice_in_picture && first_slice;
                self.slice_in_picture = true;
                new_picture
            }
            _ => {
                speculative = self.slice_in_picture;
                false
            }
        };

        match unit_type {
            Vps => self.got_vps = true,
            Sps => self.got_sps = true,
            Pps => self.got_pps = true,
            _ => {}
        }
        if !self.init_sequence_complete && self.got_sps && self.got_pps {
            debug!("Initialization sequence complete");
            self.init_sequence_complete = true;
        }

        let mut discontinuity = None;
        if new_picture {
            if !self.frame.is_empty() {
                let frame = self.finalize(self.init_sequence_complete);
                self.output.push_back(frame);
                discontinuity = self.clock.advance(unit.layer_id(), unit.dts, unit.pts);
            }
            self.slice_in_picture = first_slice;
        }

        self.last_temporal_id = unit.temporal_id();

        if speculative {
            trace!("Holding {unit_type} until the next unit");
            self.pending.push(unit);
        } else {
            self.promote();
            self.frame.push(unit);
        }

        if let Some(Discontinuity { expected, supplied }) = discontinuity {
            self.stats.discontinuities += 1;
            log_or_err!(
                self,
                Info,
                PacketizeError::DiscontinuityDetected { expected, supplied }
            );
        }

        Ok(())
    }

    /// Drains the stream at end of input and returns every remaining frame.
    pub fn flush(&mut self) -> Result<Vec<Frame>, PacketizeError> {
        while let Some(result) = self.extractor.next() {
            match result {
                Ok(unit) => self.packetize(unit)?,
                Err(ExtractError::InsufficientData) => break,
                Err(error) => self.drop_in_flight(error)?,
            }
        }

        match self.extractor.flush() {
            Some(Ok(unit)) => self.packetize(unit)?,
            Some(Err(error)) => self.drop_in_flight(error)?,
            None => {}
        }

        self.promote();
        if !self.frame.is_empty() {
            let frame = self.finalize(self.init_sequence_complete);
            self.output.push_back(frame);
        }

        Ok(self.output.drain(..).collect())
    }

    /// Discards everything in flight and returns to the initial state.
    ///
    /// The frame rate and the accumulated statistics are kept.
    pub fn reset(&mut self) {
        debug!(
            "Packetizer reset with {} units in flight",
            self.frame.len() + self.pending.len()
        );

        self.extractor.reset();
        self.frame.clear();
        self.pending.clear();
        self.output.clear();
        self.slice_in_picture = false;
        self.got_vps = false;
        self.got_sps = false;
        self.got_pps = false;
        self.init_sequence_complete = false;
        self.last_temporal_id = 0;
        self.clock.reset();
    }

    /// A malformed unit flushes the frame in flight as a dropped frame.
    fn drop_in_flight(&mut self, error: ExtractError) -> Result<(), PacketizeError> {
        self.promote();
        if !self.frame.is_empty() {
            let frame = self.finalize(false);
            self.output.push_back(frame);
        }

        log_or_err!(self, Warn, PacketizeError::from(error));
        Ok(())
    }

    fn promote(&mut self) {
        if !self.pending.is_empty() {
            self.frame.append(&mut self.pending);
        }
    }

    fn finalize(&mut self, valid: bool) -> Frame {
        let units = std::mem::take(&mut self.frame);

        let dts = units
            .iter()
            .rev()
            .find_map(|unit| unit.dts)
            .unwrap_or_else(|| self.clock.frame_dts());
        let pts = units
            .iter()
            .rev()
            .find_map(|unit| unit.pts)
            .or(self.clock.pending_pts());

        let mut flags = units.iter().fold(
            FrameFlags::from_temporal_id(self.last_temporal_id),
            |flags, unit| flags | FrameFlags::from_unit(unit),
        );
        if !valid {
            flags |= FrameFlags::DROP;
        }

        let layer_id = units
            .iter()
            .find(|unit| unit.unit_type().is_slice())
            .or(units.first())
            .map_or(0, NalUnit::layer_id);

        if flags.drop {
            self.stats.frames_dropped += 1;
        }
        self.stats.frames_emitted += 1;

        debug!(
            "Frame {} on layer {layer_id}: {} units, dts {dts}, flags {flags}",
            self.stats.frames_emitted,
            units.len()
        );

        Frame {
            units,
            flags,
            dts,
            pts,
            layer_id,
        }
    }
}

impl Iterator for Packetizer {
    type Item = Result<Frame, PacketizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.output.pop_front() {
                return Some(Ok(frame));
            }

            let outcome = match self.extractor.next()? {
                Ok(unit) => self.packetize(unit),
                Err(ExtractError::InsufficientData) => {
                    return Some(Err(ExtractError::InsufficientData.into()));
                }
                Err(error) => self.drop_in_flight(error),
            };

            if let Err(e) = outcome {
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
fn run(packetizer: &mut Packetizer, data: &[u8]) -> Result<Vec<Frame>, PacketizeError> {
    packetizer.push_bytes(data);

    let mut frames = Vec::new();
    for result in &mut *packetizer {
        match result {
            Ok(frame) => frames.push(frame),
            Err(e) if e.is_insufficient_data() => break,
            Err(e) => return Err(e),
        }
    }
    frames.extend(packetizer.flush()?);
    Ok(frames)
}

#[test]
fn round_trip_example_data() -> anyhow::Result<()> {
    use crate::process::EXAMPLE_DATA;

    let mut packetizer = Packetizer::default();
    let frames = run(&mut packetizer, EXAMPLE_DATA)?;

    let counts: Vec<usize> = frames.iter().map(Frame::nal_count).collect();
    assert_eq!(counts, [6, 2, 1, 1]);

    let rebuilt: Vec<u8> = frames
        .iter()
        .flat_map(|frame| frame.units.iter().flat_map(|u| u.bytes().to_vec()))
        .collect();
    assert_eq!(rebuilt, EXAMPLE_DATA);

    assert!(frames[0].flags.key && !frames[0].flags.drop);
    assert!(frames[1].flags.predicted && !frames[1].flags.key);
    assert!(frames.iter().all(|frame| !frame.is_drop()));
    assert_eq!(packetizer.stats().nal_units, 10);
    assert_eq!(packetizer.stats().frames_emitted, 4);
    Ok(())
}

#[test]
fn boundary_on_parameter_sets() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        annexb_nal(0, Sps, 0, &[0x01, 0x11]),
        annexb_nal(0, Pps, 0, &[0x02, 0x22]),
        slice_nal(0, IdrNLp, 0, true),
        slice_nal(0, IdrNLp, 0, false),
        annexb_nal(0, Sps, 0, &[0x01, 0x11]),
        annexb_nal(0, Pps, 0, &[0x02, 0x22]),
        slice_nal(0, IdrNLp, 0, true),
    ]
    .concat();

    let frames = run(&mut Packetizer::default(), &stream)?;
    let counts: Vec<usize> = frames.iter().map(Frame::nal_count).collect();
    assert_eq!(counts, [4, 3]);
    assert!(frames.iter().all(|frame| frame.flags.key && !frame.is_drop()));
    Ok(())
}

#[test]
fn speculative_units_open_next_picture() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, Cra, 0, true),
        annexb_nal(0, PrefixSei, 0, &[0x05, 0x01, 0x80]),
        slice_nal(0, Cra, 0, false),
        annexb_nal(0, PrefixAps, 0, &[0x31]),
        slice_nal(0, Trail, 2, true),
        annexb_nal(0, SuffixSei, 0, &[0x05, 0x01, 0x80]),
    ]
    .concat();

    let frames = run(&mut Packetizer::default(), &stream)?;
    assert_eq!(frames.len(), 2);

    let types: Vec<NalUnitType> = frames[0].units.iter().map(NalUnit::unit_type).collect();
    assert_eq!(types, [Sps, Pps, Cra, PrefixSei, Cra]);

    let types: Vec<NalUnitType> = frames[1].units.iter().map(NalUnit::unit_type).collect();
    assert_eq!(types, [PrefixAps, Trail, SuffixSei]);
    assert!(!frames[1].flags.key);
    Ok(())
}

#[test]
fn clock_advances_per_base_picture() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let mut stream = [annexb_nal(0, Sps, 0, &[0x01]), annexb_nal(0, Pps, 0, &[0x02])].concat();
    for _ in 0..6 {
        stream.extend(slice_nal(0, Trail, 0, true));
    }

    let mut packetizer = Packetizer::new(PacketizerConfig {
        frame_rate: Some(FrameRate::new(25, 1)?),
        ..Default::default()
    });
    let frames = run(&mut packetizer, &stream)?;

    let dts: Vec<i64> = frames.iter().map(|frame| frame.dts).collect();
    assert_eq!(dts, [0, 40_000, 80_000, 120_000, 160_000, 200_000]);
    Ok(())
}

#[test]
fn enhancement_layer_shares_timestamps() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, IdrNLp, 0, true),
        slice_nal(1, Trail, 0, true),
        slice_nal(0, Trail, 0, true),
        slice_nal(1, Trail, 0, true),
    ]
    .concat();

    let mut packetizer = Packetizer::default();
    let frames = run(&mut packetizer, &stream)?;

    let summary: Vec<(u8, i64)> = frames.iter().map(|f| (f.layer_id, f.dts)).collect();
    assert_eq!(summary, [(0, 0), (1, 0), (0, 20_000), (1, 20_000)]);
    assert_eq!(packetizer.base_layer_id(), Some(0));
    Ok(())
}

#[test]
fn frames_before_parameter_sets_are_dropped() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        slice_nal(0, Trail, 0, true),
        slice_nal(0, Trail, 0, true),
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, IdrWRadl, 0, true),
    ]
    .concat();

    let mut packetizer = Packetizer::default();
    let frames = run(&mut packetizer, &stream)?;

    let dropped: Vec<bool> = frames.iter().map(Frame::is_drop).collect();
    assert_eq!(dropped, [true, true, false]);
    assert_eq!(packetizer.stats().frames_dropped, 2);
    Ok(())
}

#[test]
fn malformed_unit_drops_frame_in_flight() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, IdrNLp, 0, true),
        vec![0x00, 0x00, 0x01, 0x00],
        slice_nal(0, Trail, 0, true),
    ]
    .concat();

    let mut packetizer = Packetizer::default();
    let frames = run(&mut packetizer, &stream)?;
    assert_eq!(frames.len(), 2);
    assert!(frames[0].is_drop());
    assert_eq!(frames[0].nal_count(), 3);
    assert!(!frames[1].is_drop());
    assert_eq!(packetizer.stats().malformed_units, 1);

    // strict sessions report the unit after recovering
    let mut strict = Packetizer::new(PacketizerConfig {
        fail_level: log::Level::Warn,
        ..Default::default()
    });
    strict.push_bytes(&stream);
    let results: Vec<_> = strict.by_ref().take(2).collect();
    assert!(matches!(
        results[0],
        Err(PacketizeError::Extract(ExtractError::MalformedNal { .. }))
    ));
    assert!(results[1].as_ref().is_ok_and(Frame::is_drop));
    assert_eq!(strict.flush()?.len(), 1);
    Ok(())
}

#[test]
fn reset_reproduces_output() -> anyhow::Result<()> {
    use crate::process::EXAMPLE_DATA;

    let mut packetizer = Packetizer::default();
    packetizer.push_bytes(&EXAMPLE_DATA[..30]);
    let _ = packetizer.by_ref().count();
    assert_eq!(packetizer.state(), PacketizerState::Accumulating);

    packetizer.reset();
    assert_eq!(packetizer.state(), PacketizerState::Unsynced);
    let first = run(&mut packetizer, EXAMPLE_DATA)?;

    packetizer.reset();
    let second = run(&mut packetizer, EXAMPLE_DATA)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn supplied_timestamps_are_carried() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let mut packetizer = Packetizer::new(PacketizerConfig {
        frame_rate: Some(FrameRate::new(25, 1)?),
        ..Default::default()
    });

    let header = [annexb_nal(0, Sps, 0, &[0x01]), annexb_nal(0, Pps, 0, &[0x02])].concat();
    packetizer.push_bytes(&header);
    packetizer.push_bytes_with_time(
        &slice_nal(0, IdrNLp, 0, true),
        Some(1_000_000),
        Some(1_080_000),
    );
    packetizer.push_bytes(&slice_nal(0, Trail, 0, true));
    // backwards jump
    packetizer.push_bytes_with_time(&slice_nal(0, Trail, 0, true), Some(400_000), None);

    let mut frames: Vec<Frame> = packetizer.by_ref().map_while(Result::ok).collect();
    frames.extend(packetizer.flush()?);

    let dts: Vec<i64> = frames.iter().map(|frame| frame.dts).collect();
    assert_eq!(dts, [1_000_000, 1_040_000, 400_000]);
    assert_eq!(frames[0].pts, Some(1_080_000));
    assert_eq!(packetizer.stats().discontinuities, 1);
    Ok(())
}

#[test]
fn header_primes_parameter_sets() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let header = [
        annexb_nal(0, Vps, 0, &[0x10, 0x01]),
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
    ]
    .concat();
    let stream = [slice_nal(0, IdrNLp, 0, true), slice_nal(0, Trail, 0, true)].concat();

    let mut packetizer = Packetizer::default();
    packetizer.push_header(&header)?;
    assert!(packetizer.is_init_sequence_complete() && packetizer.has_vps());
    assert_eq!(packetizer.state(), PacketizerState::Accumulating);

    let frames = run(&mut packetizer, &stream)?;
    let types: Vec<NalUnitType> = frames[0].units.iter().map(NalUnit::unit_type).collect();
    assert_eq!(types, [Vps, Sps, Pps, IdrNLp]);
    assert!(frames.iter().all(|frame| !frame.is_drop()));
    assert!(frames[0].flags.key);

    // without extradata the same stream starts undecodable
    let frames = run(&mut Packetizer::default(), &stream)?;
    assert!(frames.iter().all(Frame::is_drop));
    Ok(())
}

#[test]
fn forward_jump_is_a_discontinuity() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let feed = |packetizer: &mut Packetizer| {
        let header = [annexb_nal(0, Sps, 0, &[0x01]), annexb_nal(0, Pps, 0, &[0x02])].concat();
        packetizer.push_bytes(&header);
        packetizer.push_bytes_with_time(&slice_nal(0, IdrNLp, 0, true), Some(1_000_000), None);
        // three ticks ahead is still in step
        packetizer.push_bytes_with_time(&slice_nal(0, Trail, 0, true), Some(1_160_000), None);
        packetizer.push_bytes_with_time(&slice_nal(0, Trail, 0, true), Some(1_400_000), None);
        packetizer.push_bytes(&slice_nal(0, Trail, 0, false));
    };
    let config = PacketizerConfig {
        frame_rate: Some(FrameRate::new(25, 1)?),
        ..Default::default()
    };

    let mut packetizer = Packetizer::new(config.clone());
    feed(&mut packetizer);
    let mut frames: Vec<Frame> = packetizer.by_ref().map_while(Result::ok).collect();
    frames.extend(packetizer.flush()?);

    let dts: Vec<i64> = frames.iter().map(|frame| frame.dts).collect();
    assert_eq!(dts, [1_000_000, 1_160_000, 1_400_000]);
    assert_eq!(packetizer.stats().discontinuities, 1);

    // at the Info fail level the jump is returned, with the unit already queued
    let mut strict = Packetizer::new(PacketizerConfig {
        fail_level: log::Level::Info,
        ..config
    });
    feed(&mut strict);
    let results: Vec<_> = strict.by_ref().take(3).collect();
    assert!(results[0].is_ok());
    assert_eq!(
        results[1],
        Err(PacketizeError::DiscontinuityDetected {
            expected: 1_200_000,
            supplied: 1_400_000
        })
    );
    assert!(results[2].as_ref().is_ok_and(|frame| frame.dts == 1_160_000));

    let rest = strict.flush()?;
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].dts, 1_400_000);
    assert_eq!(rest[0].nal_count(), 2);
    Ok(())
}
