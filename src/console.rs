//! User-facing console output. Everything the loader and the standard host
//! modules print goes through a [`Console`] so hosts and tests can capture it.

use std::io::{self, Write};

use parking_lot::Mutex;

/// Width of the `-` separator around a run.
pub const SEPARATOR_WIDTH: usize = 29;

/// Blank lines written before the loading banner.
pub const BLANK_LINES: usize = 10;

pub trait Console: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Writes to the process's standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn write_line(&self, line: &str) {
        write_line_to(&mut io::stdout().lock(), line);
    }
}

/// Write one line, tolerating a reader that went away (`| head`). Other
/// failures are logged; console output never aborts a run.
fn write_line_to(out: &mut impl Write, line: &str) {
    match writeln!(out, "{line}") {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        Err(e) => log::warn!("console write failed: {e}"),
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// All output joined with newlines.
    pub fn text(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Console for MemoryConsole {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

pub fn separator() -> String {
    "-".repeat(SEPARATOR_WIDTH)
}

pub fn loading_banner(console: &dyn Console) {
    for _ in 0..BLANK_LINES {
        console.write_line("");
    }
    console.write_line(&separator());
    console.write_line("##LOADING");
}

pub fn done_banner(console: &dyn Console) {
    console.write_line("##DONE");
    console.write_line(&separator());
}

/// Print a non-empty diagnostic snapshot.
pub fn report_error(console: &dyn Console, diagnostics: &str) {
    console.write_line(&format!("ERROR!\n{diagnostics}"));
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn banners_frame_a_run() {
        let console = MemoryConsole::new();
        loading_banner(&console);
        done_banner(&console);
        let lines = console.lines();
        assert_eq!(lines.len(), BLANK_LINES + 4);
        assert!(lines.iter().take(BLANK_LINES).all(String::is_empty));
        assert_eq!(lines[BLANK_LINES], "-----------------------------");
        assert_eq!(lines[BLANK_LINES + 1], "##LOADING");
        assert_eq!(lines[BLANK_LINES + 2], "##DONE");
        assert_eq!(lines[BLANK_LINES + 3], separator());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_stdout_is_tolerated() {
        write_line_to(&mut ClosedPipe, "##LOADING");
        let mut buf = Vec::new();
        write_line_to(&mut buf, "##DONE");
        assert_eq!(buf, b"##DONE\n");
    }

    #[test]
    fn error_report_prefix() {
        let console = MemoryConsole::new();
        report_error(&console, "a(1,1): error[parser]: x");
        assert_eq!(console.text(), "ERROR!\na(1,1): error[parser]: x");
    }
}
