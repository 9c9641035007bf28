//! Data structures representing stream components.
//!
//! Contains the classified NAL unit, the assembled frame and gathered access
//! unit, and the sink descriptions produced by the layer demultiplexer.

pub mod frame;
pub mod layer;
pub mod nal;
