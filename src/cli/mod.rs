pub mod command;
pub mod demux;
pub mod info;
pub mod probe;
