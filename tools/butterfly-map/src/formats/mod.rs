//! Binary file formats

pub mod crc;
pub mod map_file;

pub use map_file::{MapFile, MapFileError};
