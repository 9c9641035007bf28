use std::path::Path;

use serde::Serialize;
use vvc::process::demux::DemuxEvent;
use vvc::structs::frame::AccessUnit;
use vvc::structs::layer::{LayerInfo, SinkKind};
use vvc::utils::timing::FrameRate;

use crate::session::Session;
use crate::timestamp::ts_str;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamReport {
    pub input: String,
    pub frame_rate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_layer: Option<u8>,
    pub bytes: u64,
    pub nal_units: usize,
    pub frames: usize,
    pub dropped_frames: usize,
    pub malformed_units: usize,
    pub skipped_bytes: u64,
    pub discontinuities: usize,
    pub duration: String,
    #[serde(skip)]
    pub duration_us: i64,
    pub sinks: Vec<SinkReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SinkKindTag {
    Layer,
    BaseOnly,
    Combined,
}

impl From<SinkKind> for SinkKindTag {
    fn from(kind: SinkKind) -> Self {
        match kind {
            SinkKind::Layer => SinkKindTag::Layer,
            SinkKind::BaseOnly => SinkKindTag::BaseOnly,
            SinkKind::Combined => SinkKindTag::Combined,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkReport {
    pub id: usize,
    pub name: String,
    pub kind: SinkKindTag,
    pub layer_id: u8,
    pub order_id: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contributing_layers: Vec<u8>,
    pub packets: usize,
    pub key_frames: usize,
    pub dropped: usize,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_dts: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_dts: Option<i64>,
}

impl SinkReport {
    fn describe(&mut self, info: &LayerInfo) {
        self.name = info.display_name.clone();
        self.contributing_layers = info.contributing_layers.iter().copied().collect();
    }

    fn count(&mut self, access_unit: &AccessUnit) {
        self.packets += 1;
        if access_unit.is_discarded() {
            self.dropped += 1;
            return;
        }

        if access_unit.flags.key {
            self.key_frames += 1;
        }
        self.bytes += access_unit.len() as u64;
        self.first_dts.get_or_insert(access_unit.dts);
        self.last_dts = Some(access_unit.dts);
    }
}

impl From<&LayerInfo> for SinkReport {
    fn from(info: &LayerInfo) -> Self {
        let mut report = Self {
            id: info.output_handle.0,
            name: String::new(),
            kind: info.kind.into(),
            layer_id: info.layer_id,
            order_id: info.order_id,
            contributing_layers: Vec::new(),
            packets: 0,
            key_frames: 0,
            dropped: 0,
            bytes: 0,
            first_dts: None,
            last_dts: None,
        };
        report.describe(info);
        report
    }
}

/// One access unit as written to a sink file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub sink: usize,
    pub dts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pts: Option<i64>,
    pub layer_id: u8,
    pub offset: u64,
    pub size: usize,
    pub nal_units: usize,
    pub picture: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamIndex {
    pub input: String,
    pub frame_rate: String,
    pub entries: Vec<IndexEntry>,
}

/// Per-sink counters collected from demultiplexer events.
#[derive(Debug, Default)]
pub struct StreamTally {
    sinks: Vec<SinkReport>,
    first_pcr: Option<i64>,
    last_pcr: Option<i64>,
}

impl StreamTally {
    pub fn observe(&mut self, event: &DemuxEvent) {
        match event {
            DemuxEvent::NewSink(info) => self.sinks.push(SinkReport::from(info)),
            DemuxEvent::Packet { sink, access_unit } => {
                if let Some(report) = self.sinks.get_mut(sink.0) {
                    report.count(access_unit);
                }
            }
            DemuxEvent::Pcr(pcr) => {
                self.first_pcr.get_or_insert(*pcr);
                self.last_pcr = Some(*pcr);
            }
        }
    }

    /// Span of the base layer, including the last frame.
    pub fn duration_us(&self, rate: FrameRate) -> i64 {
        match (self.first_pcr, self.last_pcr) {
            (Some(first), Some(last)) => last - first + rate.tick_us(),
            _ => 0,
        }
    }

    pub fn into_report(mut self, input: &Path, session: &Session) -> StreamReport {
        // sinks may have been renamed after they were announced
        for info in session.demuxer().sinks() {
            if let Some(report) = self.sinks.get_mut(info.output_handle.0) {
                report.describe(info);
            }
        }

        let stats = session.demuxer().packetizer_stats();
        let rate = session.frame_rate();
        let duration_us = self.duration_us(rate);

        StreamReport {
            input: input.display().to_string(),
            frame_rate: rate.to_string(),
            base_layer: session.demuxer().packetizer().base_layer_id(),
            bytes: session.bytes_read(),
            nal_units: stats.nal_units,
            frames: stats.frames_emitted,
            dropped_frames: stats.frames_dropped,
            malformed_units: stats.malformed_units,
            skipped_bytes: stats.skipped_bytes,
            discontinuities: stats.discontinuities,
            duration: ts_str(duration_us),
            duration_us,
            sinks: self.sinks,
        }
    }
}

#[test]
fn tally_example_stream() -> anyhow::Result<()> {
    use vvc::process::EXAMPLE_DATA;

    let mut session = Session::new(None, log::Level::Error);
    let mut tally = StreamTally::default();
    session.feed(EXAMPLE_DATA, |event| {
        tally.observe(&event);
        Ok(())
    })?;
    session.finish(|event| {
        tally.observe(&event);
        Ok(())
    })?;

    assert_eq!(tally.duration_us(FrameRate::default()), 80_000);

    let report = tally.into_report(Path::new("example.266"), &session);
    assert_eq!(report.frames, 4);
    assert_eq!(report.sinks.len(), 1);
    assert_eq!(report.sinks[0].packets, 4);
    assert_eq!(report.sinks[0].key_frames, 1);
    assert_eq!(report.sinks[0].bytes, EXAMPLE_DATA.len() as u64);

    let yaml = serde_yaml_ng::to_string(&report)?;
    assert!(yaml.contains("kind: layer"));
    assert!(yaml.contains("50/1 (50.000 fps)"));
    Ok(())
}
