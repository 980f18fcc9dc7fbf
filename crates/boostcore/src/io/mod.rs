//! Persistence primitives.
//!
//! - [`binary`]: little-endian field readers and writers used by the raw
//!   matrix and tree layouts
//! - [`native`]: the checksummed envelope that tags booster model streams
//!   with their [`BoosterKind`]

pub mod binary;
pub mod native;

pub use binary::{ReadLe, WriteLe};
pub use native::{
    compute_checksum, BoosterKind, DeserializeError, FormatHeader, NativeCodec, SerializeError,
    HEADER_SIZE, MAGIC,
};
