use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::{debug, info, trace};

use crate::process::packetize::{Packetizer, PacketizerConfig, PacketizerStats};
use crate::structs::frame::{AccessUnit, Frame};
use crate::structs::layer::{LayerInfo, SinkId, SinkKind};
use crate::structs::nal::NalUnit;
use crate::utils::buffer_pool::BufferPool;
use crate::utils::errors::PacketizeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    /// A sink was created; it is announced before its first packet.
    NewSink(LayerInfo),
    Packet {
        sink: SinkId,
        access_unit: AccessUnit,
    },
    /// Program clock reference taken from a base-layer frame.
    Pcr(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub frames: usize,
    pub packets: usize,
    /// Frames none of whose units reached a sink.
    pub unrouted: usize,
}

/// Units of layers without a sink kept for when the layer shows up.
const MAX_ORPHANS: usize = 64;

/// Splits a multi-layer stream into per-layer and composite sinks.
///
/// A per-layer sink is created the first time slices of a layer show up. Once
/// a second layer appears, a "layer N only" sink for the base layer and a
/// combined sink per enhancement layer are added; a combined sink carries
/// its own layer plus every layer below it.
///
/// Each NAL unit goes to the sinks that accept its own layer id, so a frame
/// holding parameter sets of several layers is split between sinks. Units a
/// sink accepts from a frame without any of its slices are carried over and
/// lead the sink's next access unit; units of a layer with no sink yet wait
/// for that layer's first slice.
///
/// # Example
///
/// ```rust
/// use vvc::process::EXAMPLE_DATA;
/// use vvc::process::demux::{DemuxEvent, LayerDemuxer};
///
/// let mut demuxer = LayerDemuxer::default();
/// demuxer.push_bytes(EXAMPLE_DATA);
///
/// let mut packets = 0;
/// for event in demuxer.by_ref().map_while(Result::ok) {
///     if let DemuxEvent::Packet { sink, access_unit } = event {
///         println!("sink {sink}: {} bytes", access_unit.len());
///         packets += 1;
///     }
/// }
/// packets += demuxer
///     .flush()?
///     .iter()
///     .filter(|event| matches!(event, DemuxEvent::Packet { .. }))
///     .count();
///
/// assert_eq!(demuxer.sinks().len(), 1);
/// assert_eq!(packets, 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct LayerDemuxer {
    packetizer: Packetizer,
    pool: BufferPool,
    sinks: Vec<LayerInfo>,
    carried: Vec<Vec<NalUnit>>,
    orphans: VecDeque<NalUnit>,
    last_dts: i64,
    layer_index: BTreeMap<u8, SinkId>,
    multi_layer: bool,
    events: VecDeque<DemuxEvent>,
    last_pcr: Option<i64>,
    stats: DemuxStats,
}

impl Default for LayerDemuxer {
    fn default() -> Self {
        Self::new(PacketizerConfig::default())
    }
}

impl LayerDemuxer {
    pub fn new(config: PacketizerConfig) -> Self {
        Self {
            packetizer: Packetizer::new(config),
            pool: BufferPool::default(),
            sinks: Vec::new(),
            carried: Vec::new(),
            orphans: VecDeque::new(),
            last_dts: 0,
            layer_index: BTreeMap::new(),
            multi_layer: false,
            events: VecDeque::new(),
            last_pcr: None,
            stats: DemuxStats::default(),
        }
    }

    pub fn push_bytes(&mut self, data: &[u8]) {
        self.packetizer.push_bytes(data);
    }

    pub fn push_bytes_with_time(&mut self, data: &[u8], dts: Option<i64>, pts: Option<i64>) {
        self.packetizer.push_bytes_with_time(data, dts, pts);
    }

    /// See [`Packetizer::push_header`].
    pub fn push_header(&mut self, data: &[u8]) -> Result<(), PacketizeError> {
        self.packetizer.push_header(data)
    }

    pub fn packetizer(&self) -> &Packetizer {
        &self.packetizer
    }

    pub fn packetizer_mut(&mut self) -> &mut Packetizer {
        &mut self.packetizer
    }

    pub fn sinks(&self) -> &[LayerInfo] {
        &self.sinks
    }

    pub fn sink(&self, id: SinkId) -> Option<&LayerInfo> {
        self.sinks.get(id.0)
    }

    /// Layer ids with a per-layer sink, in ascending order.
    pub fn layers(&self) -> impl Iterator<Item = u8> + '_ {
        self.layer_index.keys().copied()
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    pub fn packetizer_stats(&self) -> PacketizerStats {
        self.packetizer.stats()
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Drains the stream at end of input.
    pub fn flush(&mut self) -> Result<Vec<DemuxEvent>, PacketizeError> {
        for frame in self.packetizer.flush()? {
            self.route(frame);
        }

        // units still waiting for a slice close their sink
        for index in 0..self.carried.len() {
            if self.carried[index].is_empty() {
                continue;
            }

            let units = std::mem::take(&mut self.carried[index]);
            let frame = Frame {
                layer_id: units.first().map_or(0, NalUnit::layer_id),
                units,
                dts: self.last_dts,
                ..Default::default()
            };
            self.stats.packets += 1;
            self.events.push_back(DemuxEvent::Packet {
                sink: SinkId(index),
                access_unit: frame.gather(&mut self.pool),
            });
        }
        if !self.orphans.is_empty() {
            debug!("{} units of layers without a sink discarded", self.orphans.len());
            self.orphans.clear();
        }

        Ok(self.events.drain(..).collect())
    }

    /// Discards data in flight. Sinks stay registered.
    pub fn reset(&mut self) {
        self.packetizer.reset();
        self.events.clear();
        self.carried.iter_mut().for_each(Vec::clear);
        self.orphans.clear();
        self.last_pcr = None;
    }

    fn route(&mut self, frame: Frame) {
        self.stats.frames += 1;
        self.last_dts = frame.dts;

        let slice_layers: BTreeSet<u8> = frame
            .units
            .iter()
            .filter(|unit| unit.unit_type().is_slice())
            .map(|unit| unit.layer_id())
            .collect();
        for &layer_id in &slice_layers {
            self.discover(layer_id);
        }
        self.orphans.retain(|unit| !slice_layers.contains(&unit.layer_id()));

        let on_base_layer = self.packetizer.base_layer_id() == Some(frame.layer_id);
        if on_base_layer && !frame.is_drop() {
            self.emit_pcr(frame.dts);
        }

        let mut routed = vec![false; frame.units.len()];
        // sinks picking the same units share one gathered buffer
        let mut shared: Vec<(Vec<usize>, AccessUnit)> = Vec::new();
        let mut delivered = false;

        for index in 0..self.sinks.len() {
            let sink = &self.sinks[index];
            let picked: Vec<usize> = (0..frame.units.len())
                .filter(|&i| sink.accepts(frame.units[i].layer_id()))
                .collect();
            if picked.is_empty() {
                continue;
            }
            picked.iter().for_each(|&i| routed[i] = true);

            let has_slice = picked.iter().any(|&i| frame.units[i].unit_type().is_slice());
            if !has_slice && !slice_layers.is_empty() {
                trace!("Sink {} carries {} units over", sink.display_name, picked.len());
                self.carried[index].extend(picked.iter().map(|&i| frame.units[i].clone()));
                continue;
            }

            let carry = !frame.is_drop() && !self.carried[index].is_empty();
            let access_unit = match shared.iter().find(|(units, _)| !carry && *units == picked) {
                Some((_, access_unit)) => access_unit.clone(),
                None => {
                    let mut units = if carry {
                        std::mem::take(&mut self.carried[index])
                    } else {
                        Vec::new()
                    };
                    units.extend(picked.iter().map(|&i| frame.units[i].clone()));

                    let access_unit = frame.select(units).gather(&mut self.pool);
                    if !carry {
                        shared.push((picked, access_unit.clone()));
                    }
                    access_unit
                }
            };

            delivered = true;
            self.stats.packets += 1;
            self.events.push_back(DemuxEvent::Packet {
                sink: SinkId(index),
                access_unit,
            });
        }

        for (unit, routed) in frame.units.into_iter().zip(routed) {
            if routed || unit.unit_type().is_slice() {
                continue;
            }
            if self.orphans.len() == MAX_ORPHANS {
                self.orphans.pop_front();
            }
            self.orphans.push_back(unit);
        }

        if !delivered {
            trace!("No sink for layer {} yet", frame.layer_id);
            self.stats.unrouted += 1;
        }
    }

    fn emit_pcr(&mut self, pcr: i64) {
        match self.last_pcr {
            Some(last) if pcr < last => {
                info!("PCR went backwards from {last} to {pcr}, re-anchoring");
            }
            _ => {}
        }

        self.last_pcr = Some(pcr);
        self.events.push_back(DemuxEvent::Pcr(pcr));
    }

    fn discover(&mut self, layer_id: u8) {
        if self.layer_index.contains_key(&layer_id) {
            return;
        }

        let order_id = self.layer_index.len();
        let handle = self.add_sink(|handle| LayerInfo::layer(order_id, layer_id, handle));
        self.layer_index.insert(layer_id, handle);

        if self.layer_index.len() < 2 {
            return;
        }

        if !self.multi_layer {
            self.multi_layer = true;
            let base = self.layer_index.keys().next().copied().unwrap_or(layer_id);
            self.add_sink(|handle| LayerInfo::base_only(order_id, base, handle));
        }

        for (sink, carried) in self.sinks.iter_mut().zip(self.carried.iter_mut()) {
            if sink.absorb(layer_id) {
                debug!("Sink {} now includes layer {layer_id}", sink.display_name);
                carried.extend(
                    self.orphans
                        .iter()
                        .filter(|unit| unit.layer_id() == layer_id)
                        .cloned(),
                );
            }
        }

        // every layer above the lowest one gets a combined sink
        let layers: Vec<u8> = self.layer_index.keys().copied().collect();
        for &upper in layers.iter().skip(1) {
            let has_combined = self
                .sinks
                .iter()
                .any(|sink| sink.kind == SinkKind::Combined && sink.layer_id == upper);
            if has_combined {
                continue;
            }

            let below: BTreeSet<u8> = layers.iter().copied().filter(|&id| id < upper).collect();
            self.add_sink(|handle| LayerInfo::combined(order_id, upper, below, handle));
        }
    }

    fn add_sink(&mut self, make: impl FnOnce(SinkId) -> LayerInfo) -> SinkId {
        let handle = SinkId(self.sinks.len());
        let info = make(handle);

        debug!("New sink {info}");
        let carried = self
            .orphans
            .iter()
            .filter(|unit| info.accepts(unit.layer_id()))
            .cloned()
            .collect();
        self.events.push_back(DemuxEvent::NewSink(info.clone()));
        self.sinks.push(info);
        self.carried.push(carried);
        handle
    }
}

impl Iterator for LayerDemuxer {
    type Item = Result<DemuxEvent, PacketizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(Ok(event));
            }

            match self.packetizer.next()? {
                Ok(frame) => self.route(frame),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
fn layered_stream(layers: &[u8]) -> Vec<u8> {
    use crate::process::{annexb_nal, slice_nal};
    use crate::structs::nal::NalUnitType::*;

    let mut stream = [annexb_nal(0, Sps, 0, &[0x01]), annexb_nal(0, Pps, 0, &[0x02])].concat();
    for &layer_id in layers {
        stream.extend(slice_nal(layer_id, Trail, 0, true));
    }
    stream
}

#[cfg(test)]
fn demux_all(demuxer: &mut LayerDemuxer, data: &[u8]) -> Result<Vec<DemuxEvent>, PacketizeError> {
    demuxer.push_bytes(data);

    let mut events = Vec::new();
    for result in &mut *demuxer {
        match result {
            Ok(event) => events.push(event),
            Err(e) if e.is_insufficient_data() => break,
            Err(e) => return Err(e),
        }
    }
    events.extend(demuxer.flush()?);
    Ok(events)
}

#[test]
fn sinks_follow_layer_discovery() -> anyhow::Result<()> {
    let mut demuxer = LayerDemuxer::default();
    let events = demux_all(&mut demuxer, &layered_stream(&[0, 0, 1, 0, 1, 2]))?;

    let sinks: Vec<(SinkKind, u8, usize, Vec<u8>)> = demuxer
        .sinks()
        .iter()
        .map(|s| {
            let contributing = s.contributing_layers.iter().copied().collect();
            (s.kind, s.layer_id, s.order_id, contributing)
        })
        .collect();
    assert_eq!(
        sinks,
        [
            (SinkKind::Layer, 0, 0, vec![]),
            (SinkKind::Layer, 1, 1, vec![]),
            (SinkKind::BaseOnly, 0, 1, vec![0]),
            (SinkKind::Combined, 1, 1, vec![0]),
            (SinkKind::Layer, 2, 2, vec![]),
            (SinkKind::Combined, 2, 2, vec![0, 1]),
        ]
    );
    assert_eq!(demuxer.sinks()[5].display_name, "layer ids 0 -> 2");

    let mut per_sink = [0usize; 6];
    for event in &events {
        if let DemuxEvent::Packet { sink, .. } = event {
            per_sink[sink.0] += 1;
        }
    }
    assert_eq!(per_sink, [3, 2, 1, 3, 1, 1]);

    let pcrs: Vec<i64> = events
        .iter()
        .filter_map(|event| match event {
            DemuxEvent::Pcr(pcr) => Some(*pcr),
            _ => None,
        })
        .collect();
    assert_eq!(pcrs, [0, 20_000, 40_000]);

    // each sink is announced before its first packet
    let first_packet = events
        .iter()
        .position(|e| matches!(e, DemuxEvent::Packet { sink: SinkId(3), .. }));
    let announced = events
        .iter()
        .position(|e| matches!(e, DemuxEvent::NewSink(info) if info.output_handle == SinkId(3)));
    assert!(announced < first_packet);
    Ok(())
}

#[test]
fn units_follow_their_own_layer() -> anyhow::Result<()> {
    use crate::process::{annexb_nal, slice_nal};
    use crate::structs::nal::NalUnitType::{self, *};

    let mut stream = Vec::new();
    for _ in 0..3 {
        stream.extend(annexb_nal(0, Sps, 0, &[0x01]));
        stream.extend(annexb_nal(1, Sps, 0, &[0x11]));
        stream.extend(annexb_nal(0, Pps, 0, &[0x02]));
        stream.extend(annexb_nal(1, Pps, 0, &[0x12]));
        stream.extend(slice_nal(0, IdrNLp, 0, true));
        stream.extend(slice_nal(1, Trail, 0, true));
    }

    let mut demuxer = LayerDemuxer::default();
    let events = demux_all(&mut demuxer, &stream)?;

    let mut per_sink: Vec<Vec<Vec<(u8, NalUnitType)>>> =
        vec![Vec::new(); demuxer.sinks().len()];
    for event in &events {
        if let DemuxEvent::Packet { sink, access_unit } = event {
            let mut extractor = crate::process::extract::Extractor::default();
            extractor.push_bytes(&access_unit.data);
            let mut units: Vec<NalUnit> = extractor.by_ref().map_while(Result::ok).collect();
            units.extend(extractor.flush().transpose()?);
            let headers = units.iter().map(|u| (u.layer_id(), u.unit_type())).collect();
            per_sink[sink.0].push(headers);
        }
    }

    let base = vec![(0, Sps), (0, Pps), (0, IdrNLp)];
    let enhancement = vec![(1, Sps), (1, Pps), (1, Trail)];

    assert_eq!(demuxer.sinks()[1].display_name, "layer 1");
    assert_eq!(demuxer.sinks()[2].display_name, "layer 0 only");
    assert_eq!(per_sink[0], vec![base.clone(); 3]);
    assert_eq!(per_sink[1], vec![enhancement.clone(); 3]);
    assert_eq!(per_sink[2], vec![base.clone(); 2]);

    // the combined sink keeps the stream order of both layers
    let both = vec![(0, Sps), (1, Sps), (0, Pps), (1, Pps), (0, IdrNLp)];
    let trail = vec![(1, Trail)];
    assert_eq!(
        per_sink[3],
        [enhancement, both.clone(), trail.clone(), both, trail]
    );
    assert_eq!(demuxer.stats().unrouted, 0);
    Ok(())
}

#[test]
fn late_lower_layer_is_absorbed() -> anyhow::Result<()> {
    let mut demuxer = LayerDemuxer::default();
    demux_all(&mut demuxer, &layered_stream(&[1, 1, 0, 2]))?;

    let combined: Vec<(u8, Vec<u8>)> = demuxer
        .sinks()
        .iter()
        .filter(|s| s.kind == SinkKind::Combined)
        .map(|s| (s.layer_id, s.contributing_layers.iter().copied().collect()))
        .collect();
    assert_eq!(combined, [(1, vec![0]), (2, vec![0, 1])]);
    assert!(
        demuxer
            .sinks()
            .iter()
            .all(|s| s.kind != SinkKind::Combined || !s.contributing_layers.is_empty())
    );
    assert_eq!(demuxer.layers().collect::<Vec<_>>(), [0, 1, 2]);
    Ok(())
}

#[test]
fn single_layer_has_no_composites() -> anyhow::Result<()> {
    use crate::process::EXAMPLE_DATA;

    let mut demuxer = LayerDemuxer::default();
    let events = demux_all(&mut demuxer, EXAMPLE_DATA)?;

    assert_eq!(demuxer.sinks().len(), 1);
    assert_eq!(demuxer.sinks()[0].display_name, "layer 0");

    let payload: Vec<u8> = events
        .iter()
        .filter_map(|event| match event {
            DemuxEvent::Packet { access_unit, .. } => Some(access_unit.data.to_vec()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(payload, EXAMPLE_DATA);
    assert_eq!(demuxer.stats().unrouted, 0);

    demuxer.reset();
    let again = demux_all(&mut demuxer, EXAMPLE_DATA)?;
    assert_eq!(
        again.iter().filter(|e| matches!(e, DemuxEvent::NewSink(_))).count(),
        0
    );
    Ok(())
}
