use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use vvc::process::packetize::Packetizer;

use crate::input::InputReader;

pub fn estimate_total_frames(input_path: &Path) -> Result<u64> {
    log::info!("Counting access units for progress estimation");
    let count_start = std::time::Instant::now();

    let mut input_reader_count = InputReader::new(input_path)?;
    let mut packetizer_count = Packetizer::default();
    let mut frames = 0u64;
    let mut bytes_read = 0u64;

    input_reader_count.process_chunks(64 * 1024, |chunk| {
        bytes_read += chunk.len() as u64;
        packetizer_count.push_bytes(chunk);

        for frame_result in packetizer_count.by_ref() {
            match frame_result {
                Ok(_) => frames += 1,
                Err(e) if e.is_insufficient_data() => break,
                Err(_) => {}
            }
        }

        Ok(true)
    })?;

    // malformed units only cost a frame here
    frames += packetizer_count.flush().map_or(0, |rest| rest.len() as u64);

    let count_elapsed = count_start.elapsed();
    let read_speed_mbps = if count_elapsed.as_secs_f64() > 0.0 {
        (bytes_read as f64) / 1_000_000.0 / count_elapsed.as_secs_f64()
    } else {
        0.0
    };

    log::info!(
        "Found {frames} access units in {:.3}s ({:.1} MB/s, {} bytes)",
        count_elapsed.as_secs_f64(),
        read_speed_mbps,
        bytes_read
    );

    Ok(frames)
}

pub fn bar_style(total_known: bool, finished: bool) -> ProgressStyle {
    let template = match (total_known, finished) {
        (true, false) => {
            "{bar:40.cyan/blue} {pos}/{len} access units ({percent}%)\n{msg} | elapsed: {elapsed_precise} | ETA: {eta_precise}"
        }
        (true, true) => {
            "{bar:40.cyan/blue} {pos}/{len} access units ({percent}%)\n{msg} | elapsed: {elapsed_precise}"
        }
        (false, _) => "{spinner:.green} {pos} access units\n{msg} | elapsed: {elapsed_precise}",
    };

    ProgressStyle::with_template(template).unwrap_or_else(|_| {
        if total_known {
            ProgressStyle::default_bar()
        } else {
            ProgressStyle::default_spinner()
        }
    })
}

pub fn create_progress_bar(multi: &MultiProgress, total_frames: Option<u64>) -> ProgressBar {
    let pb = match total_frames {
        Some(total) => multi.add(ProgressBar::new(total)),
        None => multi.add(ProgressBar::new_spinner()),
    };
    pb.set_style(bar_style(total_frames.is_some(), false));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("initializing demuxer");
    pb
}
