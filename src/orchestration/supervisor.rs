use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Why a supervised step did not hand back a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutSignal {
    /// The deadline passed. The worker keeps running detached; its result is discarded.
    Expired { label: String, deadline: Duration },
    /// The worker ended without a result, e.g. it panicked.
    WorkerLost { label: String },
}

impl std::fmt::Display for TimeoutSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { label, deadline } => {
                write!(f, "`{label}` exceeded its {}ms deadline", deadline.as_millis())
            }
            Self::WorkerLost { label } => write!(f, "`{label}` worker exited without a result"),
        }
    }
}

impl std::error::Error for TimeoutSignal {}

/// Runs `step` on a worker thread and waits at most `deadline` for it.
pub fn run_bounded<T, F>(label: &str, deadline: Duration, step: F) -> Result<T, TimeoutSignal>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let _ = thread::spawn(move || {
        let _ = tx.send(step());
    });

    match rx.recv_timeout(deadline) {
        Ok(value) => {
            tracing::debug!(
                step = label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "supervised step finished"
            );
            Ok(value)
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(
                step = label,
                deadline_ms = deadline.as_millis() as u64,
                "supervised step exceeded deadline"
            );
            Err(TimeoutSignal::Expired {
                label: label.to_string(),
                deadline,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(TimeoutSignal::WorkerLost {
            label: label.to_string(),
        }),
    }
}
