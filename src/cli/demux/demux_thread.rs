use anyhow::{Result, anyhow};
use indicatif::ProgressBar;
use log::Level;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use vvc::process::demux::DemuxEvent;
use vvc::utils::timing::FrameRate;

use crate::cli::probe::check_input;
use crate::input::InputReader;
use crate::report::{StreamReport, StreamTally};
use crate::session::Session;

pub struct DemuxThreadConfig {
    pub input_path: PathBuf,
    pub force: bool,
    pub frame_rate: Option<FrameRate>,
    pub fail_level: Level,
    pub tx: mpsc::Sender<Result<DemuxEvent>>,
    pub pb_clone: Option<ProgressBar>,
}

/// Runs a whole session on its own thread, forwarding every event. The
/// stream report is returned once the input is exhausted.
pub fn spawn_demux_thread(config: DemuxThreadConfig) -> thread::JoinHandle<Result<StreamReport>> {
    thread::spawn(move || -> Result<StreamReport> {
        let DemuxThreadConfig {
            input_path,
            force,
            frame_rate,
            fail_level,
            tx,
            pb_clone,
        } = config;

        let mut input_reader = InputReader::new(&input_path)?;
        check_input(&mut input_reader, force)?;

        let mut session = Session::new(frame_rate, fail_level);
        let mut tally = StreamTally::default();

        let mut forward = |event: DemuxEvent| -> Result<()> {
            tally.observe(&event);
            tx.send(Ok(event))
                .map_err(|_| anyhow!("Output handler stopped receiving"))
        };

        let outcome = input_reader
            .process_chunks(64 * 1024, |chunk| {
                session.feed(chunk, &mut forward)?;
                if let Some(ref pb) = pb_clone {
                    pb.set_position(session.demuxer().stats().frames as u64);
                }
                Ok(true)
            })
            .and_then(|()| session.finish(&mut forward));

        if let Err(e) = outcome {
            let message = e.to_string();
            let _ = tx.send(Err(e));
            return Err(anyhow!("Demultiplexing aborted: {message}"));
        }

        if let Some(ref pb) = pb_clone {
            pb.set_position(session.demuxer().stats().frames as u64);
        }

        let report = tally.into_report(&input_path, &session);
        log::info!(
            "Processing complete: {} access units, {} sinks",
            report.frames,
            report.sinks.len()
        );
        Ok(report)
    })
}
