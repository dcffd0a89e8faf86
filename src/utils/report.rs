// Shared output sink for driver and worker messages. One lock per
// line keeps concurrent workers from interleaving partial lines.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use crate::utils::command::{CommandResult, LineLevel};

#[derive(Clone)]
pub struct Reporter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

/// Memory sink handle returned by [`Reporter::buffer`]; read it back
/// with [`ReportBuffer::contents`] after the writers are done.
#[derive(Clone)]
pub struct ReportBuffer(Arc<Mutex<Vec<u8>>>);

impl ReportBuffer {
    pub fn contents(&self) -> String {
        let guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&guard).into_owned()
    }
}

struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Reporter {
    pub fn stdout() -> Self {
        Self::with_sink(Box::new(io::stdout()))
    }

    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Reporter {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    /// In-memory reporter for tests.
    pub fn buffer() -> (Self, ReportBuffer) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let handle = ReportBuffer(buf.clone());
        (Self::with_sink(Box::new(BufferWriter(buf))), handle)
    }

    fn writeln(&self, line: &str) {
        let mut guard = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        let _ = writeln!(guard, "{}", line);
        let _ = guard.flush();
    }

    pub fn println(&self, message: &str) {
        self.writeln(message);
    }

    pub fn rule(&self, title: &str) {
        self.writeln(&format!("---- {} ----", title));
    }

    pub fn banner(&self, study_name: &str, message: &str) {
        self.writeln(&format!("==== [{}] {} ====", study_name.to_uppercase(), message));
    }

    /// One-per-worker status line, tagged with the worker slot.
    pub fn status(&self, slot: usize, message: &str) {
        self.writeln(&format!("[worker {}] {}", slot, message));
    }

    pub fn command_start(&self, command: &str, desc: Option<&str>) {
        match desc {
            Some(desc) => self.writeln(&format!("[{}] $ {}", desc, command)),
            None => self.writeln(&format!("$ {}", command)),
        }
    }

    pub fn child_line(&self, level: LineLevel, line: &str) {
        let prefix = match level {
            LineLevel::Error => "  ! ",
            LineLevel::Warning => "  ~ ",
            LineLevel::Info => "    ",
        };
        self.writeln(&format!("{}{}", prefix, line));
    }

    pub fn command_done(&self, result: &CommandResult) {
        let minutes = result.elapsed.as_secs_f64() / 60.0;
        if result.success() {
            self.writeln(&format!("[ok] Command finished in {:.2} minutes", minutes));
        } else {
            self.writeln(&format!(
                "[fail] Command stopped after {:.2} minutes (exit code {})",
                minutes, result.status
            ));
        }
    }
}
