//! Per-thread output capture.
//!
//! Each worker installs a fresh [`Captured`] sink on its own thread before invoking a case and takes it back when the
//! case returns. Anything the case prints through [`cprint!`](crate::cprint), [`cprintln!`](crate::cprintln),
//! [`ceprint!`](crate::ceprint), [`ceprintln!`](crate::ceprintln) or [`forward`] lands in that sink instead of the
//! process streams, so concurrent workers never interleave.
//!
//! Panics raised while a sink is installed are routed into its stderr by a process-wide hook. Threads without a sink
//! get the previously installed hook.
//!
//! ## Notes
//!
//! - The sink is thread-local; there is no shared stream.
//! - Without a sink, output goes to the real stdout/stderr.

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::panic;
use std::sync::Once;

/// Output collected from one case.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

thread_local! {
    static SINK: RefCell<Option<Captured>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Restores the thread's previous sink when finished or dropped.
#[must_use = "dropping the guard ends the capture immediately"]
pub struct CaptureGuard {
    previous: Option<Captured>,
    finished: bool,
    // the sink is thread-local, so the guard must stay on this thread
    _thread_bound: PhantomData<*const ()>,
}

impl CaptureGuard {
    /// Starts capturing on the current thread.
    pub fn install() -> Self {
        install_panic_hook();
        let previous = SINK.with(|sink| sink.replace(Some(Captured::default())));
        Self {
            previous,
            finished: false,
            _thread_bound: PhantomData,
        }
    }

    /// Ends the capture and returns what was collected.
    pub fn finish(mut self) -> Captured {
        self.finished = true;
        let previous = self.previous.take();
        SINK.with(|sink| sink.replace(previous)).unwrap_or_default()
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        if !self.finished {
            let previous = self.previous.take();
            let _ = SINK.try_with(|sink| sink.replace(previous));
        }
    }
}

/// Installs the panic hook that routes panic messages into the active sink. Idempotent.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let message = format!("{info}\n");
            if !append(Stream::Stderr, message.as_bytes()) {
                previous(info);
            }
        }));
    });
}

/// Returns true while the current thread has a sink installed.
pub fn is_capturing() -> bool {
    SINK.try_with(|sink| sink.try_borrow().map(|s| s.is_some()).unwrap_or(false))
        .unwrap_or(false)
}

/// Appends to the active sink. Returns false if there is none.
fn append(stream: Stream, bytes: &[u8]) -> bool {
    SINK.try_with(|sink| {
        let Ok(mut sink) = sink.try_borrow_mut() else {
            return false;
        };
        match sink.as_mut() {
            Some(captured) => {
                match stream {
                    Stream::Stdout => captured.stdout.extend_from_slice(bytes),
                    Stream::Stderr => captured.stderr.extend_from_slice(bytes),
                }
                true
            }
            None => false,
        }
    })
    .unwrap_or(false)
}

/// Writes raw bytes to the active sink, or to the real stream when nothing is capturing.
pub fn forward(stream: Stream, bytes: &[u8]) {
    if bytes.is_empty() || append(stream, bytes) {
        return;
    }
    // nowhere to report a failed console write
    let _ = match stream {
        Stream::Stdout => io::stdout().lock().write_all(bytes),
        Stream::Stderr => io::stderr().lock().write_all(bytes),
    };
}

#[doc(hidden)]
pub fn emit(stream: Stream, args: fmt::Arguments<'_>) {
    match args.as_str() {
        Some(text) => forward(stream, text.as_bytes()),
        None => forward(stream, args.to_string().as_bytes()),
    }
}

/// Like `print!`, into the worker's capture sink.
#[macro_export]
macro_rules! cprint {
    ($($arg:tt)*) => {
        $crate::capture::emit($crate::capture::Stream::Stdout, format_args!($($arg)*))
    };
}

/// Like `println!`, into the worker's capture sink.
#[macro_export]
macro_rules! cprintln {
    () => {
        $crate::capture::emit($crate::capture::Stream::Stdout, format_args!("\n"))
    };
    ($($arg:tt)*) => {
        $crate::capture::emit($crate::capture::Stream::Stdout, format_args!("{}\n", format_args!($($arg)*)))
    };
}

/// Like `eprint!`, into the worker's capture sink.
#[macro_export]
macro_rules! ceprint {
    ($($arg:tt)*) => {
        $crate::capture::emit($crate::capture::Stream::Stderr, format_args!($($arg)*))
    };
}

/// Like `eprintln!`, into the worker's capture sink.
#[macro_export]
macro_rules! ceprintln {
    () => {
        $crate::capture::emit($crate::capture::Stream::Stderr, format_args!("\n"))
    };
    ($($arg:tt)*) => {
        $crate::capture::emit($crate::capture::Stream::Stderr, format_args!("{}\n", format_args!($($arg)*)))
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_both_streams() {
        let guard = CaptureGuard::install();
        crate::cprint!("a=");
        crate::cprintln!("{}", 1);
        crate::ceprintln!("warned");
        forward(Stream::Stdout, b"raw\n");
        let captured = guard.finish();

        assert_eq!(captured.stdout, b"a=1\nraw\n");
        assert_eq!(captured.stderr, b"warned\n");
        assert!(!is_capturing());
    }

    #[test]
    fn test_nested_capture_restores_outer_sink() {
        let outer = CaptureGuard::install();
        crate::cprintln!("outer");
        {
            let inner = CaptureGuard::install();
            crate::cprintln!("inner");
            assert_eq!(inner.finish().stdout, b"inner\n");
        }
        crate::cprintln!("again");
        assert_eq!(outer.finish().stdout, b"outer\nagain\n");
    }

    #[test]
    fn test_dropped_guard_stops_capturing() {
        {
            let _guard = CaptureGuard::install();
            assert!(is_capturing());
        }
        assert!(!is_capturing());
    }

    #[test]
    fn test_threads_do_not_share_sinks() {
        let guard = CaptureGuard::install();
        std::thread::spawn(|| {
            let other = CaptureGuard::install();
            crate::cprintln!("from other thread");
            assert_eq!(other.finish().stdout, b"from other thread\n");
        })
        .join()
        .unwrap();
        crate::cprintln!("mine");
        assert_eq!(guard.finish().stdout, b"mine\n");
    }

    #[test]
    fn test_panic_message_lands_in_stderr_sink() {
        let guard = CaptureGuard::install();
        let outcome = std::panic::catch_unwind(|| panic!("case exploded"));
        let captured = guard.finish();
        assert!(outcome.is_err());
        assert!(String::from_utf8_lossy(&captured.stderr).contains("case exploded"));
    }
}
