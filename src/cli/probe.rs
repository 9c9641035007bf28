use anyhow::{Result, bail};
use vvc::process::probe::{
    MAX_PROBE_BYTES, ProbeReport, ProbeVerdict, Prober, has_known_extension,
};

use super::command::{Cli, ProbeArgs};
use crate::input::InputReader;

pub fn cmd_probe(args: &ProbeArgs, _cli: &Cli) -> Result<()> {
    log::info!("Probing VVC stream: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;
    if !input_reader.is_pipe() && !has_known_extension(&args.input) {
        log::warn!(
            "{} has no typical VVC file extension, checking contents anyway",
            args.input.display()
        );
    }

    let prefix = input_reader.peek(MAX_PROBE_BYTES)?;
    let report = Prober::default().probe_prefix(prefix);
    display_report(&report);

    match report.verdict {
        ProbeVerdict::Accept => Ok(()),
        _ if args.force => {
            log::warn!("Probe did not accept the stream, continuing because of --force");
            Ok(())
        }
        ProbeVerdict::Reject(reason) => bail!("Not a VVC elementary stream: {reason}"),
        ProbeVerdict::Inconclusive => bail!("Probe was inconclusive"),
    }
}

/// Runs the probe ahead of a full pass. Returns an error unless the stream
/// is accepted or `force` is set.
pub fn check_input(input_reader: &mut InputReader, force: bool) -> Result<()> {
    let prefix = input_reader.peek(MAX_PROBE_BYTES)?;
    if !vvc::process::probe::probe(prefix, force) {
        bail!("Input doesn't look like a VVC elementary stream, use --force to process it anyway");
    }
    Ok(())
}

fn display_report(report: &ProbeReport) {
    let verdict = match &report.verdict {
        ProbeVerdict::Accept => "VVC elementary stream".to_string(),
        ProbeVerdict::Reject(reason) => format!("rejected ({reason})"),
        ProbeVerdict::Inconclusive => "inconclusive".to_string(),
    };

    println!();
    println!("Probe Result");
    println!("  Verdict                   {verdict}");
    println!("  NAL units inspected       {}", report.nal_count);
    println!("  Bytes inspected           {}", report.bytes_inspected);
    println!();
}
