//! Decoder Module
//!
//! Bridge to the external service that turns an image into text.
//!
//! The default decoder shells out to the ZXing command line runner. Anything
//! implementing `Decoder` can stand in for it, including plain closures.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{QrLinkError, Result};

/// Placeholder replaced by the artifact path in decoder arguments
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Longest stretch of decoder stderr carried into an error
const MAX_STDERR_IN_ERROR: usize = 256;

/// Converts a received artifact into text
pub trait Decoder: Send + Sync {
    /// Decode the artifact at `path`
    ///
    /// Runs synchronously on the session worker's thread.
    fn decode(&self, path: &Path) -> Result<String>;
}

impl<F> Decoder for F
where
    F: Fn(&Path) -> Result<String> + Send + Sync,
{
    fn decode(&self, path: &Path) -> Result<String> {
        self(path)
    }
}

/// Runs an external program and returns its stdout
#[derive(Debug, Clone)]
pub struct CommandDecoder {
    program: String,
    args: Vec<String>,
}

impl CommandDecoder {
    /// Create a decoder for `program`
    ///
    /// `{input}` in any argument is replaced by the artifact path. If no
    /// argument contains it, the path is appended as the last argument.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line such as `zbarimg -q --raw {input}`
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| QrLinkError::Config("decoder command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// The ZXing Java command line runner
    pub fn zxing() -> Self {
        Self::new(
            "java",
            vec![
                "-cp".to_string(),
                "javase.jar:core.jar".to_string(),
                "com.google.zxing.client.j2se.CommandLineRunner".to_string(),
                INPUT_PLACEHOLDER.to_string(),
            ],
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn args_for(&self, path: &Path) -> Vec<String> {
        let input = path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(INPUT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(INPUT_PLACEHOLDER, &input)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(input.into_owned());
        }
        args
    }
}

impl Default for CommandDecoder {
    fn default() -> Self {
        Self::zxing()
    }
}

impl Decoder for CommandDecoder {
    fn decode(&self, path: &Path) -> Result<String> {
        let args = self.args_for(path);
        tracing::debug!("Running decoder: {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| QrLinkError::Decode(format!("failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let stderr: String = stderr.chars().take(MAX_STDERR_IN_ERROR).collect();
            return Err(QrLinkError::Decode(if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                format!("{} exited with {}: {}", self.program, output.status, stderr)
            }));
        }

        // Replacing bytes would hand the client a different payload
        String::from_utf8(output.stdout).map_err(|e| {
            QrLinkError::Decode(format!(
                "{} produced non UTF-8 output at byte {}",
                self.program,
                e.utf8_error().valid_up_to()
            ))
        })
    }
}
