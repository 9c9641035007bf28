use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use indicatif::ProgressBar;
use log::Level;
use vvc::log_or_err;
use vvc::process::demux::DemuxEvent;
use vvc::structs::frame::AccessUnit;
use vvc::structs::layer::{LayerInfo, SinkId};

use super::output::{SinkWriter, index_path, sink_path};
use crate::report::{IndexEntry, StreamIndex, StreamReport};
use crate::timestamp::ts_str;

pub struct WriterState {
    pub fail_level: Level,
}

/// Writes demultiplexer events to per-sink Annex-B files.
pub struct DemuxHandler {
    base_path: PathBuf,
    selected: BTreeSet<usize>,
    writers: BTreeMap<SinkId, SinkWriter>,
    index: Option<Vec<IndexEntry>>,
    pub discarded: u64,
    pub last_pcr: Option<i64>,
}

impl DemuxHandler {
    /// An empty selection writes every sink.
    pub fn new(base_path: &Path, selected: &[usize], write_index: bool) -> Self {
        Self {
            base_path: base_path.to_path_buf(),
            selected: selected.iter().copied().collect(),
            writers: BTreeMap::new(),
            index: write_index.then(Vec::new),
            discarded: 0,
            last_pcr: None,
        }
    }

    fn wants(&self, sink: SinkId) -> bool {
        self.selected.is_empty() || self.selected.contains(&sink.0)
    }

    pub fn handle_event(&mut self, event: DemuxEvent, pb: &Option<ProgressBar>) -> Result<()> {
        match event {
            DemuxEvent::NewSink(info) => self.open_sink(&info),
            DemuxEvent::Packet { sink, access_unit } => self.write_packet(sink, &access_unit),
            DemuxEvent::Pcr(pcr) => {
                self.last_pcr = Some(pcr);
                if let Some(pb) = pb {
                    pb.set_message(format!("timestamp: {}", ts_str(pcr)));
                }
                Ok(())
            }
        }
    }

    fn open_sink(&mut self, info: &LayerInfo) -> Result<()> {
        if !self.wants(info.output_handle) {
            log::debug!("Skipping sink {info}");
            return Ok(());
        }

        let path = sink_path(&self.base_path, info.output_handle);
        log::info!("Writing sink {info} to {}", path.display());
        self.writers
            .insert(info.output_handle, SinkWriter::create(path)?);
        Ok(())
    }

    fn write_packet(&mut self, sink: SinkId, access_unit: &AccessUnit) -> Result<()> {
        let Some(writer) = self.writers.get_mut(&sink) else {
            return Ok(());
        };

        if access_unit.is_discarded() {
            log::trace!("Discarded access unit at dts {} on sink {sink}", access_unit.dts);
            self.discarded += 1;
            return Ok(());
        }

        let offset = writer.write_access_unit(&access_unit.data)?;
        if let Some(index) = self.index.as_mut() {
            index.push(IndexEntry {
                sink: sink.0,
                dts: access_unit.dts,
                pts: access_unit.pts,
                layer_id: access_unit.layer_id,
                offset,
                size: access_unit.len(),
                nal_units: access_unit.nal_count,
                picture: access_unit.flags.to_string(),
            });
        }
        Ok(())
    }

    /// Flushes all sink files and writes the index if requested.
    pub fn finalize(&mut self, report: &StreamReport, state: &WriterState) -> Result<()> {
        for (sink, writer) in self.writers.iter_mut() {
            writer.finish()?;
            log::info!(
                "Sink {sink}: {} access units, {} bytes -> {}",
                writer.packets(),
                writer.bytes_written(),
                writer.path().display()
            );
        }

        for &wanted in &self.selected {
            if !self.writers.contains_key(&SinkId(wanted)) {
                log_or_err!(
                    state,
                    Level::Warn,
                    anyhow!("Sink {wanted} was requested but never appeared in the stream")
                );
            }
        }

        if let Some(entries) = self.index.take() {
            let path = index_path(&self.base_path);
            let index = StreamIndex {
                input: report.input.clone(),
                frame_rate: report.frame_rate.clone(),
                entries,
            };
            let writer = BufWriter::new(File::create(&path)?);
            serde_yaml_ng::to_writer(writer, &index)?;
            log::info!("Wrote index of {} access units to {}", index.entries.len(), path.display());
        }

        Ok(())
    }
}

#[test]
fn writes_selected_sinks() -> Result<()> {
    use crate::session::Session;
    use vvc::process::EXAMPLE_DATA;

    let dir = std::env::temp_dir().join(format!("vvcd-handler-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let base = dir.join("example");

    let mut handler = DemuxHandler::new(&base, &[0], true);
    let mut session = Session::new(None, Level::Error);
    session.feed(EXAMPLE_DATA, |event| handler.handle_event(event, &None))?;
    session.finish(|event| handler.handle_event(event, &None))?;

    let report = crate::report::StreamTally::default().into_report(&base, &session);
    handler.finalize(&report, &WriterState { fail_level: Level::Error })?;

    assert_eq!(std::fs::read(sink_path(&base, SinkId(0)))?, EXAMPLE_DATA);
    let index = std::fs::read_to_string(index_path(&base))?;
    assert_eq!(index.matches("offset:").count(), 4);

    // a sink that never shows up fails only in strict mode
    let mut strict = DemuxHandler::new(&base, &[5], false);
    assert!(strict.finalize(&report, &WriterState { fail_level: Level::Warn }).is_err());

    std::fs::remove_dir_all(&dir)?;
    Ok(())
}
