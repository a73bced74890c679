use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use super::{TransformFailure, Transformer};

pub struct ZstdTransformer {
    level: i32,
}

impl ZstdTransformer {
    pub fn new(level: i32) -> Self {
        Self {
            level: level.clamp(1, 22),
        }
    }
}

impl Transformer for ZstdTransformer {
    fn name(&self) -> &str {
        "zstd"
    }

    fn output_extension(&self) -> Option<&str> {
        Some("zst")
    }

    fn transform(&self, source: &Path, output: &Path) -> Result<(), TransformFailure> {
        let mut src = BufReader::new(File::open(source)?);
        let dst = BufWriter::new(File::create(output)?);
        let mut enc = zstd::stream::Encoder::new(dst, self.level)?;
        #[cfg(feature = "zstdmt")]
        enc.multithread(0)?;
        std::io::copy(&mut src, &mut enc)?;
        let mut dst = enc.finish()?;
        dst.flush()?;
        dst.get_ref().sync_all()?;
        Ok(())
    }
}
