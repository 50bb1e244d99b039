//! CMake binary sources.
//!
//! Release archives are fetched over HTTP, unpacked with a generic
//! extractor and normalized so that `bin/` sits at the extraction root.

pub mod archive;
pub mod download;
pub mod normalize;

pub use archive::{ArchiveError, ArchiveFormat, Extractor};
pub use download::download;
pub use normalize::{normalize, NormalizeError};
