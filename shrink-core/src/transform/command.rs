use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use super::{TransformFailure, Transformer};

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Runs an external program once per file, e.g. a PDF rewriter.
/// `{input}` and `{output}` inside any argument are replaced with the paths.
/// The driver imposes no timeout.
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
}

impl CommandTransformer {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    fn render_args(&self, source: &Path, output: &Path) -> Vec<String> {
        let input = source.to_string_lossy();
        let out = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| {
                a.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &out)
            })
            .collect()
    }
}

impl Transformer for CommandTransformer {
    fn name(&self) -> &str {
        "command"
    }

    fn transform(&self, source: &Path, output: &Path) -> Result<(), TransformFailure> {
        let args = self.render_args(source, output);
        debug!(program = %self.program, ?args, "spawning transformer");
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| TransformFailure::new(format!("spawn {}: {e}", self.program)))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(TransformFailure::new(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }
        if !output.exists() {
            return Err(TransformFailure::new(format!(
                "{} produced no output file",
                self.program
            )));
        }
        Ok(())
    }
}
