#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Streaming re-framing of H.266/VVC Annex-B elementary streams into
//! timestamped access units, without decoding parameter sets or slice
//! headers.
//!
//! ### Bitstream Organization
//!
//! **External Structure**: NAL units delimited by `00 00 01` or `00 00 00 01`
//! start codes.
//! **Internal Structure**: A two byte NAL header carrying the unit type,
//! `nuh_layer_id` and temporal id.
//!
//! ### Picture Boundaries
//!
//! A new access unit starts at an access unit delimiter, a parameter set or
//! picture header following a slice, the first slice of a picture, and at end
//! of sequence or bitstream units. Prefix SEI and APS units between pictures
//! are held back until the next unit decides which picture they belong to.
//!
//! ### Layers
//!
//! Multi-layer streams are split per `nuh_layer_id`. The numerically lowest
//! layer is the base layer and drives the decoding clock.
//!
//! ## Quick Start
//!
//! Steps for processing a stream:
//!
//! 1. Check the stream prefix using [`process::probe::probe`]
//! 2. Assemble access units using [`process::packetize::Packetizer`]
//! 3. Route them to layer sinks using [`process::demux::LayerDemuxer`]
//!
//! ```rust
//! use vvc::process::{demux::{DemuxEvent, LayerDemuxer}, probe::probe, EXAMPLE_DATA};
//!
//! assert!(probe(EXAMPLE_DATA, false));
//!
//! let mut demuxer = LayerDemuxer::default();
//! demuxer.push_bytes(EXAMPLE_DATA);
//!
//! let mut events = Vec::new();
//! for result in &mut demuxer {
//!     match result {
//!         Ok(event) => events.push(event),
//!         // more input is needed to complete the next access unit
//!         Err(e) if e.is_insufficient_data() => break,
//!         Err(e) => eprintln!("Demux error: {e}"),
//!     }
//! }
//! events.extend(demuxer.flush()?);
//!
//! for event in events {
//!     if let DemuxEvent::Packet { sink, access_unit } = event {
//!         println!("sink {sink}: dts {} {} bytes", access_unit.dts, access_unit.len());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Processing stages for VVC elementary streams.
///
/// 1. **Extraction** ([`process::extract`]): Splits the byte stream into
///    classified NAL units.
///
/// 2. **Packetizing** ([`process::packetize`]): Groups NAL units into access
///    units and assigns timestamps.
///
/// 3. **Probing** ([`process::probe`]): Format detection on a stream prefix.
///
/// 4. **Demultiplexing** ([`process::demux`]): Per-layer and composite sinks.
pub mod process;

/// Data structures representing stream components.
///
/// - **NAL units** ([`structs::nal`]): Header fields and unit types
/// - **Frames** ([`structs::frame`]): Assembled and gathered access units
/// - **Layers** ([`structs::layer`]): Sink descriptions
pub mod structs;

/// Support infrastructure.
///
/// - **Start codes** ([`utils::startcode`]): Annex-B scanning
/// - **Timing** ([`utils::timing`]): Frame rates and the decoding clock
/// - **Errors** ([`utils::errors`]): Error types
pub mod utils;
