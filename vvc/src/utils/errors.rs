#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NalError {
    #[error("NAL unit too short: {0} header bytes available, 2 required")]
    TooShort(usize),

    #[error("forbidden_zero_bit is set, corrupted NAL unit")]
    ForbiddenZeroBit,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Insufficient buffer data to confirm the next start code")]
    InsufficientData,

    #[error("Malformed NAL unit dropped ({len} bytes): {source}")]
    MalformedNal {
        len: usize,
        #[source]
        source: NalError,
    },
}

impl ExtractError {
    /// `true` when the extractor only needs more bytes.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketizeError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Timestamp discontinuity: expected dts {expected}, stream supplied {supplied}")]
    DiscontinuityDetected { expected: i64, supplied: i64 },
}

impl PacketizeError {
    /// `true` when the session only needs more bytes.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::Extract(ExtractError::InsufficientData))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("No Annex-B start code at the beginning of the stream")]
    NoStartCode,

    #[error("Malformed NAL header: {0}")]
    Malformed(#[from] NalError),

    #[error("{unit_type} found on layer {layer_id}, expected layer 0")]
    NonBaseLayer { unit_type: String, layer_id: u8 },

    #[error("VPS is truncated or carries vps_video_parameter_set_id 0")]
    InvalidVpsId,

    #[error("Access unit delimiter is not followed by another NAL unit")]
    DanglingAud,

    #[error("Empty prefix SEI")]
    EmptySei,

    #[error("Unexpected NAL unit type {0} at stream start")]
    UnexpectedNalType(String),

    #[error("Probe budget exhausted after {nal_count} NAL units and {bytes} bytes")]
    BudgetExhausted { nal_count: usize, bytes: usize },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameRateError {
    #[error("Frame rate numerator and denominator must be non-zero, got {num}/{den}")]
    ZeroComponent { num: u32, den: u32 },

    #[error("Invalid frame rate value: {0}")]
    Invalid(String),
}
