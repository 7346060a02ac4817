//! Process entry for runcore: flags, configuration, logging and the work
//! items submitted on startup.

mod app;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod notify;
pub mod uptime;

pub use app::{EXIT_FAILURE, EXIT_OK, init_logging, launch, run, send_menu};
pub use cli::{Cli, parse_lenient, version_line};
pub use config::{CoreConfig, load_config};
