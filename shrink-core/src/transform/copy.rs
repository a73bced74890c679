use std::path::Path;

use super::{TransformFailure, Transformer};

/// Identity strategy. Always lands in the `none` bucket; useful for
/// mirroring a tree through the same resumable machinery.
pub struct CopyTransformer;

impl Transformer for CopyTransformer {
    fn name(&self) -> &str {
        "copy"
    }

    fn transform(&self, source: &Path, output: &Path) -> Result<(), TransformFailure> {
        std::fs::copy(source, output)?;
        Ok(())
    }
}
