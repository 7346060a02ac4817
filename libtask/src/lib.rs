//! A process-wide task pool: fire-and-forget submission, a blocking task
//! group barrier and a serialized console for ordered side effects.

pub mod config;
pub mod console;
pub mod fault;
pub mod scheduler;

pub use config::{PoolMode, SchedulerConfig};
pub use console::Console;
pub use fault::{Fault, FaultKind, RuntimeFault};
pub use scheduler::{Handle, Scheduler, SchedulerStats, TaskHandle, TaskState, WorkItem};
