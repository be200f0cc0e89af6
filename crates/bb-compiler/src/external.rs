//! Converter backed by an external executable.
//!
//! The executable reads rules from stdin, one per line, and writes a JSON
//! [`ConversionOutput`] report to stdout:
//!
//! ```text
//! ConverterTool -limit=50000 -optimize=false -advancedBlocking=false < rules.txt
//! {"totalConvertedCount":..,"convertedCount":..,"errorsCount":..,"overLimit":false,"converted":"[...]"}
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use crate::adapter::{ConversionOutput, ConvertError, RuleConverter};

#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: PathBuf,
    args: Vec<String>,
    optimize: bool,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            optimize: false,
        }
    }

    /// Extra arguments passed before the limit flags.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    fn command(&self, limit: usize, advanced: bool) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(format!("-limit={}", limit))
            .arg(format!("-optimize={}", self.optimize))
            .arg(format!("-advancedBlocking={}", advanced))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl RuleConverter for ExternalConverter {
    fn convert(&self, rules: &[String], limit: usize, advanced: bool) -> Result<ConversionOutput, ConvertError> {
        log::debug!(
            "Running {} on {} rules (limit={}, advanced={})",
            self.program.display(),
            rules.len(),
            limit,
            advanced
        );

        let mut child = self.command(limit, advanced).spawn().map_err(ConvertError::Spawn)?;

        let mut input = String::with_capacity(rules.iter().map(|rule| rule.len() + 1).sum());
        for rule in rules {
            input.push_str(rule);
            input.push('\n');
        }

        // Feed stdin from a separate thread so a converter that starts
        // writing before it has read everything cannot deadlock us.
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            }
        });

        let output = child.wait_with_output()?;
        let write_result = writer
            .join()
            .unwrap_or_else(|_| Err(io::Error::new(io::ErrorKind::Other, "stdin writer panicked")));

        if !output.status.success() {
            return Err(ConvertError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        match write_result {
            // A converter may stop reading once it hits the limit.
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(ConvertError::Io(e)),
            _ => {}
        }

        serde_json::from_slice(&output.stdout).map_err(ConvertError::Report)
    }
}
