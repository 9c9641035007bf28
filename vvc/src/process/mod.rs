/// NAL unit extraction from Annex-B byte streams.
///
/// Provides the [`Extractor`](extract::Extractor) for locating start codes and
/// yielding classified [`NalUnit`](crate::structs::nal::NalUnit) objects from
/// continuous stream data.
pub mod extract;

/// Access unit assembly.
///
/// Provides the [`Packetizer`](packetize::Packetizer) for grouping NAL units
/// into timestamped [`Frame`](crate::structs::frame::Frame) objects.
pub mod packetize;

/// Stream format detection.
///
/// Provides the [`Prober`](probe::Prober) deciding whether a stream prefix is
/// plausibly a VVC elementary stream.
pub mod probe;

/// Layer demultiplexing.
///
/// Provides the [`LayerDemuxer`](demux::LayerDemuxer) routing access units to
/// per-layer and composite sinks.
pub mod demux;

/// A short single-layer stream: VPS, SPS, PPS, prefix SEI, a two-slice IDR
/// picture, a TRAIL picture with a suffix SEI, a TRAIL picture at temporal
/// id 1 and an end of sequence.
pub const EXAMPLE_DATA: &[u8] = &[
    0x00, 0x00, 0x00, 0x01, 0x00, 0x71, 0x10, 0x01, 0x40, 0x11, // VPS
    0x00, 0x00, 0x01, 0x00, 0x79, 0x00, 0x02, 0x20, 0x80, // SPS
    0x00, 0x00, 0x01, 0x00, 0x81, 0x00, 0xC1, 0x88, // PPS
    0x00, 0x00, 0x01, 0x00, 0xB9, 0x05, 0x02, 0x4C, 0x80, // PREFIX_SEI
    0x00, 0x00, 0x01, 0x00, 0x41, 0x80, 0xE3, 0x54, 0x21, // IDR_N_LP, first slice
    0x00, 0x00, 0x01, 0x00, 0x41, 0x00, 0xC4, 0x8A, // IDR_N_LP
    0x00, 0x00, 0x01, 0x00, 0x01, 0x80, 0x9A, 0x3C, // TRAIL, first slice
    0x00, 0x00, 0x01, 0x00, 0xC1, 0x05, 0x01, 0x90, // SUFFIX_SEI
    0x00, 0x00, 0x01, 0x00, 0x02, 0x80, 0x5E, 0x11, // TRAIL, temporal id 1
    0x00, 0x00, 0x01, 0x00, 0xA9, // EOS
];

/// Builds one Annex-B NAL unit with a 3 byte start code.
#[cfg(test)]
pub(crate) fn annexb_nal(
    layer_id: u8,
    unit_type: crate::structs::nal::NalUnitType,
    temporal_id: u8,
    body: &[u8],
) -> Vec<u8> {
    let mut nal = vec![0x00, 0x00, 0x01];
    nal.push(layer_id & 0x3F);
    nal.push(((unit_type as u8) << 3) | ((temporal_id + 1) & 0x07));
    nal.extend_from_slice(body);
    nal
}

/// A slice NAL unit; `first` sets the first-slice-of-picture bit.
#[cfg(test)]
pub(crate) fn slice_nal(
    layer_id: u8,
    unit_type: crate::structs::nal::NalUnitType,
    temporal_id: u8,
    first: bool,
) -> Vec<u8> {
    let lead = if first { 0x80 } else { 0x40 };
    annexb_nal(layer_id, unit_type, temporal_id, &[lead, 0x1C, 0x2D])
}

#[test]
fn example_data_headers() {
    use crate::structs::nal::{NalHeader, NalUnitType};

    let header = NalHeader::read(&EXAMPLE_DATA[4..6]).unwrap();
    assert_eq!(header.unit_type, NalUnitType::Vps);
    assert_eq!(
        annexb_nal(0, NalUnitType::Eos, 0, &[]),
        &EXAMPLE_DATA[EXAMPLE_DATA.len() - 5..]
    );
}
