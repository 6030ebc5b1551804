//! Symbolic tracebacks - construction-site capture for diagnostics
//!
//! Every plan-mutating operation records where in the user's program the node was
//! added. When a call fails during execution, the scheduler attaches this
//! *symbolic traceback* to the error, distinct from the runtime error chain of the
//! failing call itself: the runtime chain says what went wrong, the symbolic
//! traceback says which line of plan-building code asked for it.
//!
//! Capture is unresolved (cheap); symbol resolution happens lazily when the trace
//! is displayed. The retained depth is a process-wide tunable; setting it to zero
//! disables capture entirely, which is useful for plans with very many nodes.

use backtrace::Backtrace;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static MAX_FRAMES: AtomicUsize = AtomicUsize::new(16);

/// Set the number of frames retained when displaying symbolic tracebacks.
///
/// Zero disables capture for nodes created afterwards.
pub fn set_max_frames(frames: usize) {
    MAX_FRAMES.store(frames, Ordering::Relaxed);
}

/// The current frame retention limit.
pub fn max_frames() -> usize {
    MAX_FRAMES.load(Ordering::Relaxed)
}

/// A bounded capture of the call stack at a plan-mutation site.
#[derive(Clone, Default)]
pub struct SymbolicTrace {
    inner: Option<Arc<Mutex<Backtrace>>>,
}

impl SymbolicTrace {
    /// Capture the current call stack, honoring the process-wide frame limit.
    pub(crate) fn capture() -> Self {
        if max_frames() == 0 {
            return Self { inner: None };
        }
        Self {
            inner: Some(Arc::new(Mutex::new(Backtrace::new_unresolved()))),
        }
    }

    /// True when capture was disabled at creation time.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }
}

fn frame_is_internal(name: &str) -> bool {
    name.starts_with("backtrace::")
        || name.contains("uberjob_core::trace")
        || name.starts_with("std::")
        || name.starts_with("core::")
}

impl fmt::Display for SymbolicTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(inner) = &self.inner else {
            return write!(f, "  <symbolic traceback disabled>");
        };
        let mut bt = inner.lock();
        bt.resolve();

        let mut shown = 0;
        let limit = max_frames().max(1);
        for frame in bt.frames() {
            for symbol in frame.symbols() {
                let name = symbol
                    .name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string());
                if frame_is_internal(&name) {
                    continue;
                }
                write!(f, "  at {name}")?;
                if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                    write!(f, " ({}:{})", file.display(), line)?;
                }
                writeln!(f)?;
                shown += 1;
                if shown >= limit {
                    return Ok(());
                }
            }
        }
        if shown == 0 {
            writeln!(f, "  <no symbols>")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SymbolicTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.is_some() {
            write!(f, "SymbolicTrace(captured)")
        } else {
            write!(f, "SymbolicTrace(disabled)")
        }
    }
}
