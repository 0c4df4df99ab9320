//! Per-task output interleaving
//!
//! Tasks run in parallel but their console output must not interleave.
//! Each task writes into its own buffer through a cheap cloneable handle;
//! the scheduler flushes one task's buffer to the console when that task
//! reaches a terminal status, so output appears in finish order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared buffer registry, owned by the scheduler
#[derive(Debug, Default)]
pub struct OutputInterleaver {
    buffers: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

/// Write handle for one task
#[derive(Debug, Clone)]
pub struct TaskWriter {
    name: String,
    buffers: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl OutputInterleaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and hand back its writer.
    ///
    /// Registration is idempotent per name; the scheduler is the sole
    /// registrar.
    pub fn register(&self, name: &str) -> TaskWriter {
        let mut buffers = self.buffers.lock().expect("interleaver lock");
        buffers.entry(name.to_string()).or_default();
        TaskWriter {
            name: name.to_string(),
            buffers: Arc::clone(&self.buffers),
        }
    }

    /// Drain a task's buffered lines for display
    pub fn take(&self, name: &str) -> Vec<String> {
        let mut buffers = self.buffers.lock().expect("interleaver lock");
        buffers.remove(name).unwrap_or_default()
    }

    /// Flush a finished task's output to the console under a banner
    pub fn flush_to_console(&self, name: &str) {
        let lines = self.take(name);
        if lines.is_empty() {
            return;
        }
        println!("===== {name} =====");
        for line in lines {
            println!("{line}");
        }
    }
}

impl TaskWriter {
    /// Append one line to this task's buffer
    pub fn write_line(&self, line: &str) {
        let mut buffers = self.buffers.lock().expect("interleaver lock");
        buffers
            .entry(self.name.clone())
            .or_default()
            .push(line.to_string());
    }

    /// The owning task's name
    pub fn task_name(&self) -> &str {
        &self.name
    }
}
