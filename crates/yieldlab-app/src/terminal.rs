//! Terminal display and tap source

use std::cell::{Cell, RefCell};
use std::io::{self, BufRead, Stdout, Write};
use std::thread;

use smol::channel::{Receiver, unbounded};
use yieldlab_sched::LogDisplay;

/// Prints every log line to a writer (stdout by default), in order
#[derive(Debug)]
pub struct TerminalDisplay<W: Write = Stdout> {
    out: RefCell<W>,
    lines: Cell<usize>,
}

impl TerminalDisplay {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn with_writer(out: W) -> Self {
        Self {
            out: RefCell::new(out),
            lines: Cell::new(0),
        }
    }

    /// Lines printed so far
    pub fn lines(&self) -> usize {
        self.lines.get()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> LogDisplay for TerminalDisplay<W> {
    fn append_line(&self, text: &str) {
        let mut out = self.out.borrow_mut();
        // A closed stdout must not take the run down with it.
        let _ = writeln!(out, "{text}");
        let _ = out.flush();
        self.lines.set(self.lines.get() + 1);
    }
}

/// One message per line read from stdin; closes at EOF
///
/// Reading happens on its own thread so a blocked main context does not stop
/// taps from queueing up.
pub fn stdin_taps() -> Receiver<()> {
    let (sender, receiver) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line.is_err() || sender.send_blocking(()).is_err() {
                break;
            }
        }
        tracing::debug!("stdin closed");
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_lines_in_order() {
        let display = TerminalDisplay::with_writer(Vec::new());
        display.append_line("result without await: 0");
        display.append_line("end");
        assert_eq!(display.lines(), 2);

        let text = String::from_utf8(display.into_inner()).unwrap();
        assert_eq!(text, "result without await: 0\nend\n");
    }

    #[test]
    fn test_write_errors_are_ignored() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
        }

        let display = TerminalDisplay::with_writer(Closed);
        display.append_line("end");
        assert_eq!(display.lines(), 1);
    }
}
