//! Human-readable progress lines, one per regional completion.

use std::sync::Mutex;

pub trait Progress: Send + Sync {
    fn line(&self, line: &str);
}

/// Writes progress to stdout.
pub struct StdoutProgress;

impl Progress for StdoutProgress {
    fn line(&self, line: &str) {
        println!("{line}");
    }
}

/// Collects progress in memory.
#[derive(Default)]
pub struct BufferProgress {
    lines: Mutex<Vec<String>>,
}

impl BufferProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl Progress for BufferProgress {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}
