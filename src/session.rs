use anyhow::Result;
use log::Level;
use vvc::process::demux::{DemuxEvent, LayerDemuxer};
use vvc::process::packetize::PacketizerConfig;
use vvc::utils::timing::FrameRate;

/// One pass of the demultiplexer over an input. Statistics are logged when
/// the session goes away, whether it finished or failed.
pub struct Session {
    demuxer: LayerDemuxer,
    bytes_read: u64,
}

impl Session {
    pub fn new(frame_rate: Option<FrameRate>, fail_level: Level) -> Self {
        Self {
            demuxer: LayerDemuxer::new(PacketizerConfig {
                frame_rate,
                fail_level,
            }),
            bytes_read: 0,
        }
    }

    pub fn demuxer(&self) -> &LayerDemuxer {
        &self.demuxer
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.demuxer.packetizer().frame_rate()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Pushes one chunk and passes every event that is ready to `on_event`.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_event: F) -> Result<()>
    where
        F: FnMut(DemuxEvent) -> Result<()>,
    {
        self.bytes_read += chunk.len() as u64;
        self.demuxer.push_bytes(chunk);

        for result in self.demuxer.by_ref() {
            match result {
                Ok(event) => on_event(event)?,
                Err(e) if e.is_insufficient_data() => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Drains the last access units at end of input.
    pub fn finish<F>(&mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(DemuxEvent) -> Result<()>,
    {
        for event in self.demuxer.flush()? {
            on_event(event)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let stats = self.demuxer.packetizer_stats();
        let routing = self.demuxer.stats();

        log::info!(
            "Session statistics: {} bytes, {} NAL units, {} frames ({} dropped), {} packets to {} sinks",
            self.bytes_read,
            stats.nal_units,
            stats.frames_emitted,
            stats.frames_dropped,
            routing.packets,
            self.demuxer.sinks().len()
        );

        if stats.malformed_units > 0 || stats.skipped_bytes > 0 || routing.unrouted > 0 {
            log::info!(
                "{} malformed NAL units, {} bytes skipped before sync, {} frames without a sink",
                stats.malformed_units,
                stats.skipped_bytes,
                routing.unrouted
            );
        }
        if stats.discontinuities > 0 {
            log::info!("{} timestamp discontinuities", stats.discontinuities);
        }
    }
}

#[test]
fn chunked_session_matches_example() -> Result<()> {
    use vvc::process::EXAMPLE_DATA;

    let mut session = Session::new(None, Level::Error);
    let mut packets = Vec::new();
    let mut collect = |event: DemuxEvent| -> Result<()> {
        if let DemuxEvent::Packet { access_unit, .. } = event {
            packets.push(access_unit);
        }
        Ok(())
    };

    for chunk in EXAMPLE_DATA.chunks(7) {
        session.feed(chunk, &mut collect)?;
    }
    session.finish(&mut collect)?;

    assert_eq!(session.bytes_read(), EXAMPLE_DATA.len() as u64);
    assert_eq!(packets.len(), 4);
    let rebuilt: Vec<u8> = packets.iter().flat_map(|au| au.data.to_vec()).collect();
    assert_eq!(rebuilt, EXAMPLE_DATA);
    Ok(())
}
