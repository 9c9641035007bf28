use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use vvc::process::demux::DemuxEvent;
use vvc::utils::timing::CLOCK_FREQ;

use super::command::{Cli, InfoArgs};
use super::probe::check_input;
use crate::fps::resolve_frame_rate;
use crate::input::InputReader;
use crate::report::{SinkReport, StreamReport, StreamTally};
use crate::session::Session;
use crate::timestamp::{time_str, ts_str};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing VVC stream: {}", args.input.display());

    let report = analyze_stream(args, cli, multi)?;

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&report)?);
        return Ok(());
    }

    if report.frames == 0 {
        println!("No VVC access units found in the input.");
        println!("This doesn't appear to be a valid VVC elementary stream.");
        return Ok(());
    }

    display_stream_info(&report);
    display_sinks(&report.sinks);
    display_summary(&report);

    Ok(())
}

fn analyze_stream(
    args: &InfoArgs,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<StreamReport> {
    let mut input_reader = InputReader::new(&args.input)?;
    check_input(&mut input_reader, args.force)?;

    let frame_rate = resolve_frame_rate(args.fps, &args.input);
    let mut session = Session::new(frame_rate, cli.fail_level());
    let mut context = AnalysisContext {
        announce_sinks: !args.yaml,
        ..Default::default()
    };

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing access units...");
        context.pb = Some(pb);
    }

    input_reader.process_chunks(64 * 1024, |chunk| {
        session.feed(chunk, |event| context.process_event(event))?;
        Ok(true)
    })?;
    session.finish(|event| context.process_event(event))?;

    if let Some(ref pb) = context.pb {
        pb.finish_and_clear();
    }

    Ok(context.tally.into_report(&args.input, &session))
}

#[derive(Default)]
struct AnalysisContext {
    tally: StreamTally,
    frame_count: usize,
    announce_sinks: bool,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn process_event(&mut self, event: DemuxEvent) -> Result<()> {
        self.tally.observe(&event);

        match event {
            DemuxEvent::NewSink(info) if self.announce_sinks => {
                let line = format!("New sink                    {info}");
                match self.pb {
                    Some(ref pb) => pb.suspend(|| println!("{line}")),
                    None => println!("{line}"),
                }
            }
            DemuxEvent::Pcr(_) => {
                self.frame_count += 1;
                if self.frame_count.is_multiple_of(100) {
                    if let Some(ref pb) = self.pb {
                        pb.set_message(format!("Analyzing access units... {}", self.frame_count));
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }
}

fn display_stream_info(report: &StreamReport) {
    println!();
    println!("VVC Stream Information");
    println!("======================");
    println!();
    println!("Stream Information");
    println!("  Frame rate                {}", report.frame_rate);
    if let Some(base_layer) = report.base_layer {
        println!("  Base layer                {base_layer}");
    }
    println!("  NAL units                 {}", report.nal_units);
    println!(
        "  Access units              {} ({} dropped)",
        report.frames, report.dropped_frames
    );
    if report.malformed_units > 0 {
        println!("  Malformed NAL units       {}", report.malformed_units);
    }
    if report.skipped_bytes > 0 {
        println!("  Skipped before sync       {} bytes", report.skipped_bytes);
    }
    if report.discontinuities > 0 {
        println!("  DTS discontinuities       {}", report.discontinuities);
    }
    println!();
}

fn display_sinks(sinks: &[SinkReport]) {
    println!("Sink Information");

    for sink in sinks {
        println!("  Sink {}", sink.id);
        println!("    Name                    {}", sink.name);
        println!("    Layer id                {}", sink.layer_id);
        println!("    Discovery order         {}", sink.order_id);
        if !sink.contributing_layers.is_empty() {
            let layers = sink
                .contributing_layers
                .iter()
                .map(u8::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            println!("    Contributing layers     {layers}");
        }
        println!(
            "    Access units            {} ({} key, {} dropped)",
            sink.packets, sink.key_frames, sink.dropped
        );
        println!("    Size                    {} bytes", sink.bytes);
        if let (Some(first), Some(last)) = (sink.first_dts, sink.last_dts) {
            println!("    DTS range               {} - {}", ts_str(first), ts_str(last));
        }
    }
    println!();
}

fn display_summary(report: &StreamReport) {
    println!("Analysis Summary");
    println!("  Frames processed          {}", report.frames);

    let size_mb = report.bytes as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        report.bytes
    );

    let duration_secs = report.duration_us as f64 / CLOCK_FREQ as f64;
    println!("  Duration                  {}", time_str(duration_secs));

    if duration_secs > 0.0 {
        let avg_data_rate_kbps = (report.bytes as f64 * 8.0) / (duration_secs * 1000.0);
        println!("  Average data rate         {avg_data_rate_kbps:.1} kbps");
    }

    println!();
}
