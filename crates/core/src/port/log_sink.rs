// Log Sink Port
// Line-oriented, append-only destination for user-facing job logs

/// Append-only line sink
pub trait LogSink: Send + Sync {
    fn append_line(&self, line: &str);
}

/// Discards every line
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn append_line(&self, _line: &str) {}
}

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Keeps lines in memory
    #[derive(Default)]
    pub struct MemoryLogSink {
        lines: Mutex<Vec<String>>,
    }

    impl MemoryLogSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().map(|l| l.clone()).unwrap_or_default()
        }
    }

    impl LogSink for MemoryLogSink {
        fn append_line(&self, line: &str) {
            if let Ok(mut lines) = self.lines.lock() {
                lines.push(line.to_string());
            }
        }
    }
}
