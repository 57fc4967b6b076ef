//! Dump persistence layer: on-disk record naming, the dump directory store
//! and the writer/reader codec seam.

mod codec;
mod path;
mod store;

pub use codec::*;
pub(crate) use path::*;
pub use store::*;

#[cfg(test)]
mod codec_test;
#[cfg(test)]
mod path_test;
