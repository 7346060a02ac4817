//! Process-wide critical section around the console streams.
//!
//! Every line the runtime prints, including `log` records routed through
//! [`Console::log_writer`], is written while holding a single lock, so output
//! from concurrent work items never interleaves mid-line. The lock is not
//! recursive: calling back into the console from inside a critical body
//! deadlocks.

use std::fmt::Display;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Stream = Box<dyn Write + Send>;

/// The writers guarded by the critical section.
pub struct Streams {
    out: Stream,
    err: Stream,
}

impl Streams {
    pub fn out(&mut self) -> &mut dyn Write {
        &mut *self.out
    }

    pub fn err(&mut self) -> &mut dyn Write {
        &mut *self.err
    }
}

pub struct Console {
    streams: Mutex<Streams>,
    silent: AtomicBool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    /// A console writing to the process stdout and stderr.
    pub fn new() -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    pub fn with_writers(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Console {
            streams: Mutex::new(Streams { out, err }),
            silent: AtomicBool::new(false),
        }
    }

    pub fn set_silent(&self, silent: bool) {
        self.silent.store(silent, Ordering::Relaxed);
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Streams> {
        // a body that panicked leaves the writers usable
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `body` inside the critical section.
    pub fn critical<R>(&self, body: impl FnOnce(&mut Streams) -> R) -> R {
        let mut streams = self.lock();
        body(&mut streams)
    }

    /// Writes `msg` and a newline to stdout unless the console is silent.
    pub fn echo(&self, msg: impl Display) {
        if self.is_silent() {
            return;
        }
        self.critical(|s| {
            let _ = write!(s.out, "{msg}");
            let _ = s.out.write_all(b"\n");
            let _ = s.out.flush();
        });
    }

    /// Like [`Console::echo`] but without the trailing newline.
    pub fn echo_flush(&self, msg: impl Display) {
        if self.is_silent() {
            return;
        }
        self.critical(|s| {
            let _ = write!(s.out, "{msg}");
            let _ = s.out.flush();
        });
    }

    /// Writes `msg` and a newline to stdout even when silent.
    pub fn print(&self, msg: impl Display) {
        self.critical(|s| {
            let _ = writeln!(s.out, "{msg}");
            let _ = s.out.flush();
        });
    }

    pub fn blank(&self) {
        self.echo("");
    }

    /// Writes `msg` to stderr. Silent mode does not apply.
    pub fn error(&self, msg: impl Display) {
        self.critical(|s| {
            let _ = s.out.flush();
            let _ = write!(s.err, "{msg}");
            let _ = s.err.write_all(b"\n");
            let _ = s.err.flush();
        });
    }

    /// A writer for `env_logger::Target::Pipe`; each formatted record is
    /// written to stderr in one locked call.
    pub fn log_writer(self: &Arc<Self>) -> LogWriter {
        LogWriter {
            console: Arc::clone(self),
        }
    }
}

pub struct LogWriter {
    console: Arc<Console>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.console.critical(|s| {
            s.err.write_all(buf)?;
            Ok(buf.len())
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        self.console.critical(|s| s.err.flush())
    }
}

/// An in-memory stream, cloneable so the test can read back what the
/// console wrote.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Console {
    /// A console backed by two [`Capture`] buffers (stdout, stderr).
    pub fn captured() -> (Self, Capture, Capture) {
        let out = Capture::new();
        let err = Capture::new();
        let console = Self::with_writers(Box::new(out.clone()), Box::new(err.clone()));
        (console, out, err)
    }
}
