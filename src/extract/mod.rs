//! Static extraction of a service's observable surface.

mod go;
mod scan;

use std::path::Path;

use crate::error::ProbeError;
use crate::types::SourceModel;

pub use go::GoSourceExtractor;

/// Produces a [`SourceModel`] from a source tree.
///
/// Extraction is synchronous file-system work; async callers run it on the
/// blocking pool.
pub trait SourceExtractor: Send + Sync {
    fn extract(&self, root: &Path) -> Result<SourceModel, ProbeError>;
}
