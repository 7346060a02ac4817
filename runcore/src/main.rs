use std::process::ExitCode;
use std::sync::Arc;

use libtask::Console;
use log::debug;
use runcore::{init_logging, launch};
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    // before logging, so RUST_LOG may come from .env
    let dotenv = dotenvy::dotenv();

    let console = Arc::new(Console::new());
    let code = launch(std::env::args_os(), &console, CancellationToken::new(), |cli| {
        init_logging(&console, cli.debug);
        if let Ok(path) = &dotenv {
            debug!("loaded {}", path.display());
        }
    });
    ExitCode::from(code)
}
