//! Report destinations.
//!
//! A [`ReportSink`] is any writer reports can be rendered into. Sinks that
//! are attached to an interactive display can be cleared between periodic
//! snapshots so the latest report replaces the previous one on screen.

use crate::error::ReportError;
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Stdout, Write};
use std::path::{Path, PathBuf};

/// ANSI sequence moving the cursor home and erasing the screen
const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[2J";

/// Output target name meaning standard output
pub const STDOUT: &str = "stdout";

/// Writer that reports are rendered into
pub trait ReportSink: Write {
    /// Whether the sink is an interactive display
    fn is_interactive(&self) -> bool {
        false
    }

    /// Erase previously written content; a no-op for non-interactive sinks.
    fn clear_screen(&mut self) -> io::Result<()> {
        if self.is_interactive() {
            self.write_all(CLEAR_SCREEN)?;
        }
        Ok(())
    }
}

impl ReportSink for Vec<u8> {}

impl<S: ReportSink + ?Sized> ReportSink for &mut S {
    fn is_interactive(&self) -> bool {
        (**self).is_interactive()
    }

    fn clear_screen(&mut self) -> io::Result<()> {
        (**self).clear_screen()
    }
}

/// Standard output or a file
#[derive(Debug)]
pub enum Output {
    Stdout { stdout: Stdout, terminal: bool },
    File { path: PathBuf, writer: BufWriter<File> },
}

impl Output {
    /// Open `target`, where `stdout` selects standard output and anything
    /// else is a file path created or truncated.
    pub fn open(target: &Path) -> Result<Self, ReportError> {
        if target == Path::new(STDOUT) {
            let stdout = io::stdout();
            let terminal = stdout.is_terminal();
            return Ok(Output::Stdout { stdout, terminal });
        }

        let file = File::create(target).map_err(|source| ReportError::Open {
            path: target.to_path_buf(),
            source,
        })?;
        Ok(Output::File {
            path: target.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            Output::Stdout { .. } => STDOUT.to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { stdout, .. } => stdout.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { stdout, .. } => stdout.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

impl ReportSink for Output {
    fn is_interactive(&self) -> bool {
        matches!(self, Output::Stdout { terminal: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Sink that claims to be a terminal
    struct Screen(Vec<u8>);

    impl Write for Screen {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ReportSink for Screen {
        fn is_interactive(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_buffer_sink_is_never_cleared() {
        let mut sink = b"previous".to_vec();
        assert!(!sink.is_interactive());
        sink.clear_screen().unwrap();
        assert_eq!(sink, b"previous");
    }

    #[test]
    fn test_interactive_sink_is_cleared() {
        let mut screen = Screen(Vec::new());
        screen.clear_screen().unwrap();
        assert_eq!(screen.0, CLEAR_SCREEN);
    }

    #[test]
    fn test_file_output_is_not_interactive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.txt");

        let mut output = Output::open(&path).unwrap();
        assert!(!output.is_interactive());
        output.clear_screen().unwrap();
        output.write_all(b"hello").unwrap();
        output.flush().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
        assert_eq!(output.describe(), path.display().to_string());
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = Output::open(&dir.path().join("missing").join("out.txt")).unwrap_err();
        assert!(matches!(err, ReportError::Open { .. }));
    }
}
