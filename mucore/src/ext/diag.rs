//! Diagnostics sink shared by every stage of the pipeline.
//!
//! Messages are routed to a swappable callback. The default callback prints
//! coloured lines on stderr and forwards every message to the `log` facade.
use std::{
    io::Write,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::RwLock;
use strum::{FromRepr, IntoStaticStr};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromRepr, IntoStaticStr)]
#[repr(u32)]
#[strum(serialize_all = "lowercase")]
pub enum DiagLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    #[strum(serialize = "warning")]
    Warn = 3,
    Error = 4,
}

impl DiagLevel {
    fn color(&self) -> Option<Color> {
        match self {
            DiagLevel::Trace | DiagLevel::Debug => Some(Color::Cyan),
            DiagLevel::Info => None,
            DiagLevel::Warn => Some(Color::Yellow),
            DiagLevel::Error => Some(Color::Red),
        }
    }
}

impl From<DiagLevel> for log::Level {
    fn from(level: DiagLevel) -> Self {
        match level {
            DiagLevel::Trace => log::Level::Trace,
            DiagLevel::Debug => log::Level::Debug,
            DiagLevel::Info => log::Level::Info,
            DiagLevel::Warn => log::Level::Warn,
            DiagLevel::Error => log::Level::Error,
        }
    }
}

/// A single diagnostic, as produced by the `mu*!` macros.
#[derive(Debug, Clone)]
pub struct DiagMessage {
    pub level: DiagLevel,
    pub timepoint: chrono::NaiveDateTime,
    pub message: String,
    pub module: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub thread_name: Option<String>,
}

pub type DiagCallback = Box<dyn Fn(&Diagnostics, &DiagMessage) + Send + Sync>;

/// Structured error and warning reporting.
///
/// The sink is shared by reference between worker threads. It counts the
/// warnings and errors it receives so that callers can produce a summary.
pub struct Diagnostics {
    callback: RwLock<DiagCallback>,
    warnings: AtomicUsize,
    errors: AtomicUsize,
    debug: AtomicBool,
}

impl Diagnostics {
    /// Diagnostics printing to stderr.
    pub fn new(debug: bool) -> Self {
        Self::with_callback(debug, Box::new(stderr_callback))
    }

    pub fn with_callback(debug: bool, callback: DiagCallback) -> Self {
        Self {
            callback: RwLock::new(callback),
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            debug: AtomicBool::new(debug),
        }
    }

    /// Diagnostics discarding every message, counters are still maintained.
    pub fn silent() -> Self {
        Self::with_callback(false, Box::new(|_, _| {}))
    }

    pub fn set_callback(&self, callback: DiagCallback) {
        *self.callback.write() = callback;
    }

    pub fn set_debug(&self, debug: bool) {
        self.debug.store(debug, Ordering::Relaxed);
    }

    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Deliver a message to the callback.
    pub fn dispatch(&self, msg: DiagMessage) {
        match msg.level {
            DiagLevel::Warn => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            DiagLevel::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            DiagLevel::Trace | DiagLevel::Debug if !self.is_debug() => return,
            _ => {}
        }

        (self.callback.read())(self, &msg);
    }

    pub fn warnings(&self) -> usize {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn has_errors(&self) -> bool {
        self.errors() > 0
    }

    /// Report completion of a stage.
    pub fn progress(
        &self,
        stage: &str,
        threads: usize,
        done: usize,
        total: usize,
        elapsed: Duration,
    ) {
        crate::muinfo!(
            self,
            "{} (threads: {}): {}/{}. Finished in {}ms",
            stage,
            threads,
            done,
            total,
            elapsed.as_millis()
        );
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(false)
    }
}

fn stderr_callback(diag: &Diagnostics, msg: &DiagMessage) {
    log::log!(target: msg.module.as_str(), log::Level::from(msg.level), "{}", msg.message);

    let mut stream = StandardStream::stderr(ColorChoice::Auto);
    let tag: &'static str = msg.level.into();
    let _ = stream.set_color(ColorSpec::new().set_fg(msg.level.color()).set_bold(true));
    let _ = write!(stream, "[{}]", tag);
    let _ = stream.reset();
    if diag.is_debug() {
        let _ = write!(
            stream,
            " {} {}",
            msg.timepoint.format("%H:%M:%S%.3f"),
            msg.thread_name.as_deref().unwrap_or("-")
        );
    }
    let _ = writeln!(stream, " {}", msg.message);
}

#[macro_export]
macro_rules! mudiag {
    (
        $diag:expr,
        $level:expr,
        $( $arg:tt )*
    ) => {
        {
            let msg = $crate::ext::diag::DiagMessage {
                level: $level,
                timepoint: $crate::chrono::Local::now().naive_local(),
                message: format!($($arg)*),
                module: module_path!().to_string(),
                file: Some(file!().to_string()),
                line: Some(line!()),
                thread_name: std::thread::current().name().map(|s| s.to_string()),
            };
            $crate::ext::diag::Diagnostics::dispatch(&$diag, msg);
        }
    };
}

#[macro_export]
macro_rules! mutrace {
    (
        $diag:expr,
        $( $arg:tt )*
    ) => {
        $crate::mudiag!(
            $diag,
            $crate::ext::diag::DiagLevel::Trace,
            $( $arg )*
        );
    };
}

#[macro_export]
macro_rules! mudebug {
    (
        $diag:expr,
        $( $arg:tt )*
    ) => {
        $crate::mudiag!(
            $diag,
            $crate::ext::diag::DiagLevel::Debug,
            $( $arg )*
        );
    };
}

#[macro_export]
macro_rules! muinfo {
    (
        $diag:expr,
        $( $arg:tt )*
    ) => {
        $crate::mudiag!(
            $diag,
            $crate::ext::diag::DiagLevel::Info,
            $( $arg )*
        );
    };
}

#[macro_export]
macro_rules! muwarn {
    (
        $diag:expr,
        $( $arg:tt )*
    ) => {
        $crate::mudiag!(
            $diag,
            $crate::ext::diag::DiagLevel::Warn,
            $( $arg )*
        );
    };
}

#[macro_export]
macro_rules! muerror {
    (
        $diag:expr,
        $( $arg:tt )*
    ) => {
        $crate::mudiag!(
            $diag,
            $crate::ext::diag::DiagLevel::Error,
            $( $arg )*
        );
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recording(debug: bool) -> (Diagnostics, Arc<Mutex<Vec<(DiagLevel, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let diag = Diagnostics::with_callback(
            debug,
            Box::new(move |_, msg| sink.lock().push((msg.level, msg.message.clone()))),
        );
        (diag, seen)
    }

    #[test]
    fn counts_warnings_and_errors() {
        let (diag, seen) = recording(false);
        crate::muwarn!(diag, "first {}", 1);
        crate::muerror!(diag, "second");
        crate::muinfo!(diag, "third");

        assert_eq!(diag.warnings(), 1);
        assert_eq!(diag.errors(), 1);
        assert!(diag.has_errors());
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(seen.lock()[0], (DiagLevel::Warn, "first 1".to_string()));
    }

    #[test]
    fn debug_messages_need_debug_mode() {
        let (diag, seen) = recording(false);
        crate::mudebug!(diag, "hidden");
        crate::mutrace!(diag, "hidden");
        assert!(seen.lock().is_empty());

        diag.set_debug(true);
        crate::mudebug!(diag, "shown");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn progress_line_format() {
        let (diag, seen) = recording(false);
        diag.progress("Loading bitcode", 4, 3, 3, Duration::from_millis(12));
        assert_eq!(
            seen.lock()[0].1,
            "Loading bitcode (threads: 4): 3/3. Finished in 12ms"
        );
    }

    #[test]
    fn level_names() {
        let warn: &'static str = DiagLevel::Warn.into();
        let error: &'static str = DiagLevel::Error.into();
        assert_eq!(warn, "warning");
        assert_eq!(error, "error");
        assert_eq!(DiagLevel::from_repr(2), Some(DiagLevel::Info));
    }
}
