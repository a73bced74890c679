use std::path::Path;

use serde::{Deserialize, Serialize};

/// Why a transformation produced no usable output. Only the detail string
/// is kept; the core classifies it as `transform-failure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransformFailure {
    pub detail: String,
}

impl TransformFailure {
    pub fn new(detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.len() > MAX_DETAIL {
            let mut cut = MAX_DETAIL;
            while !detail.is_char_boundary(cut) {
                cut -= 1;
            }
            detail.truncate(cut);
        }
        Self { detail }
    }
}

impl From<std::io::Error> for TransformFailure {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl std::fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail)
    }
}

const MAX_DETAIL: usize = 200;

/// Per-file operation applied by the batch. Implementations read `source`
/// and write `output`; sizes are measured by the caller, never self-reported.
/// Strategy settings are captured when the value is built.
pub trait Transformer {
    fn name(&self) -> &str;
    fn transform(&self, source: &Path, output: &Path) -> Result<(), TransformFailure>;

    /// Extension appended to kept outputs whose format differs from the
    /// source, e.g. `zst`. Rejected files are mirrored under their own name.
    fn output_extension(&self) -> Option<&str> {
        None
    }
}

impl<F> Transformer for F
where
    F: Fn(&Path, &Path) -> Result<(), TransformFailure>,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn transform(&self, source: &Path, output: &Path) -> Result<(), TransformFailure> {
        self(source, output)
    }
}

/// Strategy selection. The default `zstd` writes frames, so kept outputs
/// land in the mirror as `<name>.zst` rather than as readable originals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransformerConfig {
    Zstd {
        #[serde(default = "default_zstd_level")]
        level: i32,
    },
    Copy,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

fn default_zstd_level() -> i32 {
    19
}

impl Default for TransformerConfig {
    fn default() -> Self {
        TransformerConfig::Zstd {
            level: default_zstd_level(),
        }
    }
}

impl TransformerConfig {
    pub fn build(&self) -> Box<dyn Transformer> {
        match self {
            TransformerConfig::Zstd { level } => Box::new(zstdc::ZstdTransformer::new(*level)),
            TransformerConfig::Copy => Box::new(copy::CopyTransformer),
            TransformerConfig::Command { program, args } => {
                Box::new(command::CommandTransformer::new(program.clone(), args.clone()))
            }
        }
    }
}

pub mod command;
pub mod copy;
pub mod zstdc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_is_tagged_by_kind() {
        let c: TransformerConfig = serde_json::from_str(r#"{"kind":"zstd"}"#).unwrap();
        assert_eq!(c, TransformerConfig::Zstd { level: 19 });
        let c: TransformerConfig =
            serde_json::from_str(r#"{"kind":"command","program":"gs","args":["{input}"]}"#)
                .unwrap();
        assert_eq!(c.build().name(), "command");
        assert_eq!(TransformerConfig::Copy.build().name(), "copy");
        assert_eq!(TransformerConfig::Copy.build().output_extension(), None);
        assert_eq!(TransformerConfig::default().build().output_extension(), Some("zst"));
    }

    #[test]
    fn failure_detail_is_bounded_on_char_boundary() {
        let long = "é".repeat(300);
        let f = TransformFailure::new(long);
        assert!(f.detail.len() <= MAX_DETAIL);
        assert!(f.detail.chars().all(|c| c == 'é'));
    }

    #[test]
    fn closures_are_transformers() {
        let t = |_: &Path, _: &Path| -> Result<(), TransformFailure> { Err(TransformFailure::new("nope")) };
        assert_eq!(t.name(), "closure");
        assert_eq!(
            t.transform(Path::new("a"), Path::new("b")).unwrap_err().detail,
            "nope"
        );
    }
}
