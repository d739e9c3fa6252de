use std::io::Write;
use std::sync::Mutex;

/// Consumer of streamed answer text. Chunks arrive in order.
pub trait OutputSink: Send + Sync {
    fn emit(&self, chunk: &str);

    /// Called once after the last chunk.
    fn finish(&self) {}
}

/// Collects every chunk into a string.
#[derive(Debug, Default)]
pub struct BufferedSink {
    buffer: Mutex<String>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutputSink for BufferedSink {
    fn emit(&self, chunk: &str) {
        match self.buffer.lock() {
            Ok(mut buffer) => buffer.push_str(chunk),
            Err(poisoned) => poisoned.into_inner().push_str(chunk),
        }
    }
}

/// Prints chunks to stdout as they arrive.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn emit(&self, chunk: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    }

    fn finish(&self) {
        println!();
    }
}
