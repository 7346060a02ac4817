use std::any::Any;
use std::fmt;

/// A fault a work item raises on purpose, e.g. to abandon a computation.
///
/// Returning this (wrapped in `anyhow::Error`) from a work item marks the
/// failure as a declared runtime fault rather than a general one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeFault {
    #[error("{0}")]
    Aborted(String),
}

impl RuntimeFault {
    pub fn aborted(msg: impl Into<String>) -> Self {
        RuntimeFault::Aborted(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A `RuntimeFault` returned by the work item.
    Runtime,
    /// Any other error, or a panic carrying a message.
    General,
    /// A panic whose payload is not a string.
    Unknown,
}

/// A failure recovered at the task boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    /// Sorts an error returned by a work item into its category.
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<RuntimeFault>() {
            Some(fault) => Fault {
                kind: FaultKind::Runtime,
                message: fault.to_string(),
            },
            None => Fault {
                kind: FaultKind::General,
                message: format!("{err:#}"),
            },
        }
    }

    /// Sorts a panic payload caught with `catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            Some((*s).to_string())
        } else {
            payload.downcast_ref::<String>().cloned()
        };

        match message {
            Some(message) => Fault {
                kind: FaultKind::General,
                message,
            },
            None => Fault {
                kind: FaultKind::Unknown,
                message: String::new(),
            },
        }
    }

    /// The line written to the error stream, tagged with `origin`
    /// (`thread 3`, `main`, ...).
    pub fn report(&self, origin: impl fmt::Display) -> String {
        match self.kind {
            FaultKind::Runtime => format!("[{origin}] Runtime error: {}", self.message),
            FaultKind::General => {
                format!("[{origin}] Caught a general exception: {}", self.message)
            }
            FaultKind::Unknown => format!("[{origin}] An unknown error occurred."),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FaultKind::Runtime => write!(f, "runtime fault: {}", self.message),
            FaultKind::General => write!(f, "fault: {}", self.message),
            FaultKind::Unknown => write!(f, "unknown fault"),
        }
    }
}
