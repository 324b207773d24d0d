//! Per-target transcripts and the shared diagnostic log they are mirrored to.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::transport::Invocation;

/// Shared log destination. Each write holds the lock for one block only.
#[derive(Debug, Default)]
pub struct LogSink {
    file: Option<Mutex<File>>,
}

impl LogSink {
    /// Append to `path`, creating it if needed.
    pub fn to_file(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("open {}", path.display())))
            })?;

        Ok(Self {
            file: Some(Mutex::new(file)),
        })
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { file: None }
    }

    pub fn write_block(&self, target: &str, lines: &[String]) {
        let Some(file) = &self.file else {
            return;
        };

        let mut block = String::new();
        for line in lines {
            block.push_str(&format!("[{}] {}\n", target, line));
        }

        // A poisoned lock only means another worker panicked mid-write.
        let mut handle = match file.lock() {
            Ok(handle) => handle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = handle.write_all(block.as_bytes()) {
            log_status!("log", "Failed to write diagnostic log: {}", e);
        }
    }
}

/// Ordered record of everything issued against one target.
#[derive(Debug)]
pub struct Transcript {
    target: String,
    lines: Vec<String>,
    sink: Arc<LogSink>,
}

impl Transcript {
    pub fn new(target: &str, sink: Arc<LogSink>) -> Self {
        Self {
            target: target.to_string(),
            lines: Vec::new(),
            sink,
        }
    }

    fn append(&mut self, block: Vec<String>) {
        self.sink.write_block(&self.target, &block);
        self.lines.extend(block);
    }

    pub fn begin(&mut self) {
        let marker = format!(
            "===== begin {} ({}) =====",
            self.target,
            chrono::Utc::now().to_rfc3339()
        );
        self.append(vec![marker]);
    }

    /// Record one issued command with its captured output and exit status.
    pub fn record(&mut self, stage: &str, invocation: &Invocation) {
        let mut block = vec![format!("[{}] $ {}", stage, invocation.command_line)];
        block.extend(invocation.output.combined().lines().map(str::to_string));
        block.push(format!("[{}] exit {}", stage, invocation.output.exit_code));
        self.append(block);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.append(vec![message.into()]);
    }

    pub fn finish(&mut self, outcome: &str) {
        let marker = format!("===== end {}: {} =====", self.target, outcome);
        self.append(vec![marker]);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}
