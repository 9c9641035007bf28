use std::path::Path;

use log::{debug, trace, warn};

use crate::structs::nal::{NAL_HEADER_LEN, NalHeader, NalUnitType};
use crate::utils::errors::ProbeError;
use crate::utils::startcode::find_startcode;

/// Maximum number of NAL units inspected by [`Prober::probe_prefix`].
pub const MAX_PROBE_NAL_COUNT: usize = 16;

/// Maximum number of stream bytes inspected by [`Prober::probe_prefix`].
pub const MAX_PROBE_BYTES: usize = 64 * 1024;

/// File extensions commonly used for raw VVC elementary streams.
pub const KNOWN_EXTENSIONS: &[&str] = &["h266", "266", "bin", "bit", "raw"];

pub fn has_known_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            KNOWN_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Parameter sets seen so far during one probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeContext {
    pub seen_vps: bool,
    pub seen_sps: bool,
    pub seen_pps: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    Accept,
    Reject(ProbeError),
    /// Nothing decisive yet; look at the next unit.
    Inconclusive,
}

impl ProbeVerdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, ProbeVerdict::Accept)
    }
}

/// Judges one NAL unit. `rest` starts at the unit's header and runs to the
/// end of the available data, so the next start code may be included.
pub fn probe_nal(rest: &[u8], ctx: &mut ProbeContext) -> ProbeVerdict {
    use NalUnitType::*;

    let header = match NalHeader::read(rest) {
        Ok(header) => header,
        Err(e) => return ProbeVerdict::Reject(e.into()),
    };

    let unit_len = find_startcode(rest, NAL_HEADER_LEN).unwrap_or(rest.len());
    let on_base_layer = header.layer_id == 0;
    let unit_type = header.unit_type;

    trace!("Probing {unit_type} on layer {}", header.layer_id);

    let non_base_layer = || {
        ProbeVerdict::Reject(ProbeError::NonBaseLayer {
            unit_type: unit_type.name().to_string(),
            layer_id: header.layer_id,
        })
    };

    match unit_type {
        _ if unit_type.is_slice() || unit_type == PrefixAps => {
            if ctx.seen_sps && ctx.seen_pps && on_base_layer {
                ProbeVerdict::Accept
            } else {
                ProbeVerdict::Inconclusive
            }
        }
        Vps => {
            if !on_base_layer {
                return non_base_layer();
            }
            // vps_video_parameter_set_id
            if unit_len < 3 || rest[2] >> 4 == 0 {
                return ProbeVerdict::Reject(ProbeError::InvalidVpsId);
            }
            ctx.seen_vps = true;
            ProbeVerdict::Inconclusive
        }
        Sps | Pps => {
            if !on_base_layer {
                return non_base_layer();
            }
            if unit_type == Sps {
                ctx.seen_sps = true;
            } else {
                ctx.seen_pps = true;
            }
            ProbeVerdict::Inconclusive
        }
        Opi | Dci | Ph => ProbeVerdict::Inconclusive,
        Aud => match rest.get(3..5) {
            Some([0x00, 0x00]) => ProbeVerdict::Inconclusive,
            _ => ProbeVerdict::Reject(ProbeError::DanglingAud),
        },
        PrefixSei => {
            if unit_len <= NAL_HEADER_LEN || rest[2] == 0xFF {
                ProbeVerdict::Reject(ProbeError::EmptySei)
            } else {
                ProbeVerdict::Inconclusive
            }
        }
        _ => ProbeVerdict::Reject(ProbeError::UnexpectedNalType(unit_type.to_string())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub verdict: ProbeVerdict,
    pub nal_count: usize,
    pub bytes_inspected: usize,
}

/// Heuristic detection of VVC elementary streams over a bounded prefix.
///
/// # Example
///
/// ```rust
/// use vvc::process::EXAMPLE_DATA;
/// use vvc::process::probe::{Prober, ProbeVerdict};
///
/// let report = Prober::default().probe_prefix(EXAMPLE_DATA);
/// assert_eq!(report.verdict, ProbeVerdict::Accept);
/// assert_eq!(report.nal_count, 5);
/// ```
#[derive(Debug, Clone)]
pub struct Prober {
    pub max_nal_count: usize,
    pub max_bytes: usize,
}

impl Default for Prober {
    fn default() -> Self {
        Self {
            max_nal_count: MAX_PROBE_NAL_COUNT,
            max_bytes: MAX_PROBE_BYTES,
        }
    }
}

impl Prober {
    pub fn probe_prefix(&self, prefix: &[u8]) -> ProbeReport {
        let prefix = &prefix[..prefix.len().min(self.max_bytes)];
        let mut ctx = ProbeContext::default();

        let report = |verdict, nal_count, bytes_inspected| ProbeReport {
            verdict,
            nal_count,
            bytes_inspected,
        };

        // leading zero bytes, then 00 00 01
        let mut payload_start = match prefix.iter().position(|&byte| byte != 0x00) {
            Some(pos) if pos >= 2 && prefix[pos] == 0x01 => pos + 1,
            _ => return report(ProbeVerdict::Reject(ProbeError::NoStartCode), 0, 0),
        };

        for nal_count in 1..=self.max_nal_count {
            let verdict = probe_nal(&prefix[payload_start..], &mut ctx);
            if verdict != ProbeVerdict::Inconclusive {
                debug!("Probe finished after {nal_count} NAL units: {verdict:?}");
                return report(verdict, nal_count, payload_start);
            }

            match find_startcode(prefix, payload_start + NAL_HEADER_LEN) {
                Some(pos) => payload_start = pos + 3,
                None => break,
            }
        }

        let nal_count = self.max_nal_count.min(count_units(prefix));
        report(
            ProbeVerdict::Reject(ProbeError::BudgetExhausted {
                nal_count,
                bytes: prefix.len(),
            }),
            nal_count,
            prefix.len(),
        )
    }
}

fn count_units(prefix: &[u8]) -> usize {
    let mut count = 0;
    let mut from = 0;
    while let Some(pos) = find_startcode(prefix, from) {
        count += 1;
        from = pos + 3;
    }
    count
}

/// Returns `true` if `prefix` looks like a VVC stream, or if `force` is set.
pub fn probe(prefix: &[u8], force: bool) -> bool {
    let report = Prober::default().probe_prefix(prefix);

    match report.verdict {
        ProbeVerdict::Accept => true,
        ProbeVerdict::Reject(reason) if force => {
            warn!("This doesn't look like a VVC elementary stream ({reason}), continuing anyway");
            true
        }
        ProbeVerdict::Reject(reason) => {
            debug!("Probe rejected stream: {reason}");
            false
        }
        ProbeVerdict::Inconclusive => force,
    }
}

#[test]
fn accept_parameter_sets_then_idr() {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        vec![0x00],
        annexb_nal(0, Vps, 0, &[0x10, 0x01]),
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, IdrWRadl, 0, true),
    ]
    .concat();

    let report = Prober::default().probe_prefix(&stream);
    assert_eq!(report.verdict, ProbeVerdict::Accept);
    assert_eq!(report.nal_count, 4);
    assert!(probe(&stream, false));
}

#[test]
fn reject_suspicious_streams() {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let prober = Prober::default();
    let verdict = |stream: Vec<u8>| prober.probe_prefix(&stream).verdict;

    assert_eq!(
        verdict(annexb_nal(0, PrefixSei, 0, &[0xFF, 0x01])),
        ProbeVerdict::Reject(ProbeError::EmptySei)
    );
    assert_eq!(
        verdict(annexb_nal(0, Vps, 0, &[0x00, 0x01])),
        ProbeVerdict::Reject(ProbeError::InvalidVpsId)
    );
    assert!(matches!(
        verdict(annexb_nal(2, Sps, 0, &[0x01])),
        ProbeVerdict::Reject(ProbeError::NonBaseLayer { layer_id: 2, .. })
    ));
    assert_eq!(
        verdict(annexb_nal(0, Aud, 0, &[0x50])),
        ProbeVerdict::Reject(ProbeError::DanglingAud)
    );
    assert!(matches!(
        verdict(annexb_nal(0, Eos, 0, &[])),
        ProbeVerdict::Reject(ProbeError::UnexpectedNalType(_))
    ));
    assert_eq!(
        verdict(vec![0x47, 0x40, 0x00, 0x10]),
        ProbeVerdict::Reject(ProbeError::NoStartCode)
    );

    // slices before the parameter sets never decide
    let stream = [slice_nal(0, Trail, 0, true), annexb_nal(0, Sps, 0, &[0x01])].concat();
    assert!(matches!(
        verdict(stream.clone()),
        ProbeVerdict::Reject(ProbeError::BudgetExhausted { nal_count: 2, .. })
    ));
    assert!(!probe(&stream, false));
    assert!(probe(&stream, true));
}

#[test]
fn aud_before_parameter_sets() {
    use crate::process::{annexb_nal, slice_nal};
    use NalUnitType::*;

    let stream = [
        annexb_nal(0, Aud, 0, &[0x50]),
        annexb_nal(0, Sps, 0, &[0x01]),
        annexb_nal(0, Pps, 0, &[0x02]),
        slice_nal(0, Cra, 0, true),
    ]
    .concat();

    assert!(Prober::default().probe_prefix(&stream).verdict.is_accept());
}

#[test]
fn known_extensions() {
    assert!(has_known_extension(Path::new("clip_60fps.266")));
    assert!(has_known_extension(Path::new("/tmp/stream.H266")));
    assert!(!has_known_extension(Path::new("movie.mkv")));
    assert!(!has_known_extension(Path::new("noext")));
}
