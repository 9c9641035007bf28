use super::demux_thread::{DemuxThreadConfig, spawn_demux_thread};
use super::handler::{DemuxHandler, WriterState};
use super::progress::{bar_style, create_progress_bar, estimate_total_frames};
use crate::cli::command::{Cli, DemuxArgs};
use crate::fps::resolve_frame_rate;
use crate::report::StreamReport;
use crate::timestamp::ts_str;
use anyhow::{Result, anyhow};
use indicatif::{MultiProgress, ProgressBar};
use std::sync::mpsc;
use vvc::utils::timing::CLOCK_FREQ;

pub fn cmd_demux(args: &DemuxArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Demultiplexing VVC stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );
    log::info!("Output path: {}", args.output_path.display());

    let is_pipe = args.input.to_string_lossy() == "-";
    let frame_rate = resolve_frame_rate(args.fps, &args.input);

    // Estimate total access units if needed
    let should_estimate = !args.no_estimate_progress && !is_pipe && multi.is_some();
    let total_frames = if should_estimate {
        Some(estimate_total_frames(&args.input)?)
    } else {
        if is_pipe {
            log::debug!("Skipping progress estimation for pipe input");
        } else if args.no_estimate_progress {
            log::debug!("Progress estimation disabled by --no-estimate-progress flag");
        }
        None
    };

    let pb = multi.map(|multi| create_progress_bar(multi, total_frames));

    let (tx, rx) = mpsc::channel();
    let state = WriterState {
        fail_level: cli.fail_level(),
    };

    let demux_thread = spawn_demux_thread(DemuxThreadConfig {
        input_path: args.input.clone(),
        force: args.force,
        frame_rate,
        fail_level: state.fail_level,
        tx,
        pb_clone: pb.clone(),
    });

    let mut handler = DemuxHandler::new(&args.output_path, &args.sinks, args.index);
    let start_time = std::time::Instant::now();

    while let Ok(result) = rx.recv() {
        match result {
            Ok(event) => {
                if let Err(e) = handler.handle_event(event, &pb) {
                    if let Some(pb) = pb {
                        pb.finish_with_message("writing output failed");
                    }
                    return Err(e);
                }
            }
            Err(e) => {
                if let Some(pb) = pb {
                    pb.finish_with_message("demux failed");
                }
                return Err(e);
            }
        }
    }

    match demux_thread.join() {
        Ok(Ok(report)) => {
            handler.finalize(&report, &state)?;
            finalize_progress_bar(&pb, total_frames.is_some(), &report, start_time);
            if handler.discarded > 0 {
                log::info!(
                    "{} access units were discarded as undecodable",
                    handler.discarded
                );
            }
            log::info!("Demultiplexing completed successfully");
        }
        Ok(Err(e)) => {
            if let Some(pb) = pb {
                pb.finish_with_message("demux failed");
            }
            return Err(e);
        }
        Err(_) => {
            if let Some(pb) = pb {
                pb.finish_with_message("demux thread panicked");
            }
            return Err(anyhow!("Demux thread panicked"));
        }
    }

    Ok(())
}

fn finalize_progress_bar(
    pb: &Option<ProgressBar>,
    total_known: bool,
    report: &StreamReport,
    start_time: std::time::Instant,
) {
    if let Some(pb) = pb {
        let elapsed = start_time.elapsed();
        let stream_secs = report.duration_us as f64 / CLOCK_FREQ as f64;
        let realtime_multiplier = stream_secs / elapsed.as_secs_f64().max(f64::EPSILON);

        pb.set_style(bar_style(total_known, true));
        pb.finish_with_message(format!(
            "speed: {realtime_multiplier:.1}x | duration: {}",
            ts_str(report.duration_us)
        ));
    }
}
