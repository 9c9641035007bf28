//! Utility functions and supporting infrastructure.
//!
//! Provides start code scanning, header bit reading, timestamp tracking,
//! error handling and buffer management used by the processing stages.

pub mod bitstream_io;
pub mod buffer_pool;
pub mod errors;
pub mod startcode;
pub mod timing;
