//! NAL unit header and classification.
//!
//! ## Header Layout
//!
//! Every VVC NAL unit starts with a two byte header:
//!
//! ```text
//! forbidden_zero_bit(1) nuh_reserved_zero_bit(1) nuh_layer_id(6)
//! nal_unit_type(5) nuh_temporal_id_plus1(3)
//! ```
//!
//! Only these fields and the first payload bit (the slice header's
//! `sh_picture_header_in_slice_header_flag` position, used as the
//! first-slice-of-picture heuristic) are ever inspected.

use std::fmt::Display;

use crate::utils::bitstream_io::HeaderReader;
use crate::utils::errors::NalError;
use crate::utils::startcode::startcode_len;

/// Size of the NAL unit header in bytes.
pub const NAL_HEADER_LEN: usize = 2;

/// The 32 five-bit NAL unit type codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NalUnitType {
    Trail = 0,
    Stsa = 1,
    Radl = 2,
    Rasl = 3,
    RsvVcl4 = 4,
    RsvVcl5 = 5,
    RsvVcl6 = 6,
    IdrWRadl = 7,
    IdrNLp = 8,
    Cra = 9,
    Gdr = 10,
    RsvIrap11 = 11,
    Opi = 12,
    Dci = 13,
    Vps = 14,
    Sps = 15,
    Pps = 16,
    PrefixAps = 17,
    SuffixAps = 18,
    Ph = 19,
    Aud = 20,
    Eos = 21,
    Eob = 22,
    PrefixSei = 23,
    SuffixSei = 24,
    Fd = 25,
    RsvNvcl26 = 26,
    RsvNvcl27 = 27,
    Unspec28 = 28,
    Unspec29 = 29,
    Unspec30 = 30,
    Unspec31 = 31,
}

impl From<u8> for NalUnitType {
    fn from(code: u8) -> Self {
        use NalUnitType::*;

        match code & 0x1F {
            0 => Trail,
            1 => Stsa,
            2 => Radl,
            3 => Rasl,
            4 => RsvVcl4,
            5 => RsvVcl5,
            6 => RsvVcl6,
            7 => IdrWRadl,
            8 => IdrNLp,
            9 => Cra,
            10 => Gdr,
            11 => RsvIrap11,
            12 => Opi,
            13 => Dci,
            14 => Vps,
            15 => Sps,
            16 => Pps,
            17 => PrefixAps,
            18 => SuffixAps,
            19 => Ph,
            20 => Aud,
            21 => Eos,
            22 => Eob,
            23 => PrefixSei,
            24 => SuffixSei,
            25 => Fd,
            26 => RsvNvcl26,
            27 => RsvNvcl27,
            28 => Unspec28,
            29 => Unspec29,
            30 => Unspec30,
            _ => Unspec31,
        }
    }
}

impl NalUnitType {
    /// Coded slice of a picture, including the reserved VCL and IRAP codes.
    pub fn is_slice(self) -> bool {
        (self as u8) <= NalUnitType::RsvIrap11 as u8
    }

    pub fn is_irap(self) -> bool {
        matches!(
            self,
            Self::IdrWRadl | Self::IdrNLp | Self::Cra | Self::RsvIrap11
        )
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(self, Self::Vps | Self::Sps | Self::Pps)
    }

    pub fn name(self) -> &'static str {
        use NalUnitType::*;

        match self {
            Trail => "TRAIL",
            Stsa => "STSA",
            Radl => "RADL",
            Rasl => "RASL",
            RsvVcl4 | RsvVcl5 | RsvVcl6 => "RSV_VCL",
            IdrWRadl => "IDR_W_RADL",
            IdrNLp => "IDR_N_LP",
            Cra => "CRA",
            Gdr => "GDR",
            RsvIrap11 => "RSV_IRAP",
            Opi => "OPI",
            Dci => "DCI",
            Vps => "VPS",
            Sps => "SPS",
            Pps => "PPS",
            PrefixAps => "PREFIX_APS",
            SuffixAps => "SUFFIX_APS",
            Ph => "PH",
            Aud => "AUD",
            Eos => "EOS",
            Eob => "EOB",
            PrefixSei => "PREFIX_SEI",
            SuffixSei => "SUFFIX_SEI",
            Fd => "FD",
            RsvNvcl26 | RsvNvcl27 => "RSV_NVCL",
            Unspec28 | Unspec29 | Unspec30 | Unspec31 => "UNSPEC",
        }
    }
}

impl Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// Decoded two byte NAL unit header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub layer_id: u8,
    pub unit_type: NalUnitType,
    /// `nuh_temporal_id_plus1 - 1`; `-1` for the invalid value 0.
    pub temporal_id: i8,
}

impl NalHeader {
    /// Reads the header at the start of `payload` (the bytes after the
    /// start code).
    pub fn read(payload: &[u8]) -> Result<Self, NalError> {
        if payload.len() < NAL_HEADER_LEN {
            return Err(NalError::TooShort(payload.len()));
        }

        let too_short = |_: std::io::Error| NalError::TooShort(payload.len());
        let mut reader = HeaderReader::from_slice(&payload[..NAL_HEADER_LEN]);

        if reader.flag().map_err(too_short)? {
            return Err(NalError::ForbiddenZeroBit);
        }
        reader.skip(1).map_err(too_short)?;

        let layer_id = reader.bits::<u8>(6).map_err(too_short)?;
        let unit_type = reader.bits::<u8>(5).map_err(too_short)?;
        let temporal_id_plus1 = reader.bits::<u8>(3).map_err(too_short)?;

        Ok(Self {
            layer_id,
            unit_type: NalUnitType::from(unit_type),
            temporal_id: temporal_id_plus1 as i8 - 1,
        })
    }
}

/// A classified NAL unit owning its Annex-B bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    data: Vec<u8>,
    payload_offset: usize,
    pub header: NalHeader,
    pub dts: Option<i64>,
    pub pts: Option<i64>,
}

impl NalUnit {
    /// Classifies `data`, which begins with a 3 or 4 byte start code.
    pub fn from_annexb(data: Vec<u8>) -> Result<Self, NalError> {
        let payload_offset = startcode_len(&data);
        let header = NalHeader::read(&data[payload_offset..])?;

        Ok(Self {
            data,
            payload_offset,
            header,
            dts: None,
            pts: None,
        })
    }

    pub fn with_timestamps(mut self, dts: Option<i64>, pts: Option<i64>) -> Self {
        self.dts = dts;
        self.pts = pts;
        self
    }

    /// Start code and payload, exactly as they appeared in the stream.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.payload_offset..]
    }

    pub fn startcode_len(&self) -> usize {
        self.payload_offset
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn layer_id(&self) -> u8 {
        self.header.layer_id
    }

    pub fn unit_type(&self) -> NalUnitType {
        self.header.unit_type
    }

    pub fn temporal_id(&self) -> i8 {
        self.header.temporal_id
    }

    /// First bit after the header; set on the first slice of a picture.
    pub fn first_slice_in_pic_flag(&self) -> bool {
        self.payload()
            .get(NAL_HEADER_LEN)
            .is_some_and(|byte| byte & 0x80 != 0)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[test]
fn read_nal_header() {
    let header = NalHeader::read(&[0x01, 0x79]).unwrap();
    assert_eq!(header.layer_id, 1);
    assert_eq!(header.unit_type, NalUnitType::Sps);
    assert_eq!(header.temporal_id, 0);

    let header = NalHeader::read(&[0x00, 0x0A, 0x80]).unwrap();
    assert_eq!(header.unit_type, NalUnitType::Trail);
    assert_eq!(header.temporal_id, 1);

    assert_eq!(NalHeader::read(&[0x00]), Err(NalError::TooShort(1)));
    assert_eq!(
        NalHeader::read(&[0x80, 0x79]),
        Err(NalError::ForbiddenZeroBit)
    );
}

#[test]
fn classify_unit_types() {
    assert!((0..32u8).all(|code| NalUnitType::from(code) as u8 == code));
    assert!((0..12u8).all(|code| NalUnitType::from(code).is_slice()));
    assert!(!NalUnitType::Opi.is_slice());
    assert!(NalUnitType::Cra.is_irap());
    assert!(!NalUnitType::Gdr.is_irap());
    assert_eq!(NalUnitType::PrefixSei.to_string(), "PREFIX_SEI(23)");
}

#[test]
fn nal_unit_views() {
    let unit = NalUnit::from_annexb(vec![0, 0, 0, 1, 0x00, 0x41, 0x80, 0x12]).unwrap();
    assert_eq!(unit.startcode_len(), 4);
    assert_eq!(unit.payload(), &[0x00, 0x41, 0x80, 0x12]);
    assert_eq!(unit.unit_type(), NalUnitType::IdrNLp);
    assert!(unit.first_slice_in_pic_flag());

    let unit = NalUnit::from_annexb(vec![0, 0, 1, 0x00, 0x01]).unwrap();
    assert!(!unit.first_slice_in_pic_flag());
    assert!(NalUnit::from_annexb(vec![0, 0, 1, 0x00]).is_err());
}
