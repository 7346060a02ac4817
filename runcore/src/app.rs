use std::ffi::OsString;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::error::ErrorKind;
use libsandbox::FileCache;
use libtask::{Console, Fault, Handle, Scheduler};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, parse_lenient, version_line};
use crate::config::{CoreConfig, NotifyConfig, load_config};
use crate::diagnostics;
use crate::notify::{Notifier, TelegramNotifier, keyboard};
use crate::uptime::Uptime;

/// Routes `log` records through the console so they never interleave with
/// task output. Safe to call more than once; later calls are ignored.
pub fn init_logging(console: &Arc<Console>, debug: bool) {
    let filter = if debug { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_secs()
        .target(env_logger::Target::Pipe(Box::new(console.log_writer())))
        .try_init();
}

fn resolve_config(cli: &Cli) -> Result<CoreConfig> {
    let mut cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => CoreConfig::default(),
    };
    if let Some(port) = cli.port {
        cfg.listener.port = port;
    }
    Ok(cfg)
}

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// The whole process from raw arguments to exit code. Help, version, a
/// normal run and a failed one all end with the uptime report. `on_parsed`
/// sees the flags before anything runs.
pub fn launch<I, T>(
    args: I,
    console: &Arc<Console>,
    cancel: CancellationToken,
    on_parsed: impl FnOnce(&Cli),
) -> u8
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let uptime = Uptime::start();
    let code = match parse_lenient(args) {
        Ok((cli, skipped)) => {
            on_parsed(&cli);
            for arg in &skipped {
                warn!("ignoring unrecognised option {arg}");
            }
            if cli.version {
                console.print(version_line());
                EXIT_OK
            } else {
                match run(&cli, Arc::clone(console), cancel) {
                    Ok(()) => EXIT_OK,
                    Err(e) => fail(console, &e),
                }
            }
        }
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            console.print(e.render().to_string().trim_end());
            EXIT_OK
        }
        Err(e) => fail(console, &anyhow!("{}", e.render().to_string().trim_end())),
    };
    uptime.report(console);
    code
}

fn fail(console: &Console, err: &anyhow::Error) -> u8 {
    console.error(Fault::from_error(err).report("main"));
    EXIT_FAILURE
}

/// Banners, then one task group with everything the flags ask for.
/// `cancel` stops the listener when server mode is on.
pub fn run(cli: &Cli, console: Arc<Console>, cancel: CancellationToken) -> Result<()> {
    let cfg = resolve_config(cli)?;

    console.set_silent(cli.silent);
    for line in cli.mode_banners() {
        console.print(line);
    }

    let scheduler = Scheduler::new(&cfg.scheduler, Arc::clone(&console));
    let handle = scheduler.handle().clone();
    let server = cli.server;
    let notify = cli.test;
    scheduler.run_group(move || {
        submit_all(&handle, cfg, server, notify, cancel);
        Ok(())
    });
    // waits for anything still detached, then joins the workers
    drop(scheduler);
    Ok(())
}

fn submit_all(handle: &Handle, cfg: CoreConfig, server: bool, notify: bool, cancel: CancellationToken) {
    if server {
        let listener = cfg.listener.clone();
        handle.submit(move || liblistener::serve_blocking(&listener, cancel));

        let files = Arc::new(FileCache::new(&cfg.sandbox));
        handle.submit(move || {
            warm_index(&files);
            Ok(())
        });
    }

    let command = cfg
        .diagnostics
        .command
        .clone()
        .unwrap_or_else(diagnostics::default_command);
    let console = Arc::clone(handle.console());
    handle.submit(move || {
        console.echo(diagnostics::report(&diagnostics::exec(&command)));
        Ok(())
    });

    if notify {
        match cfg.notify.credentials() {
            Some((token, chat_id)) => {
                let console = Arc::clone(handle.console());
                let settings = cfg.notify;
                handle.submit(move || {
                    let notifier = TelegramNotifier::new(&settings.api_base, &token)?;
                    send_menu(&notifier, &settings, &chat_id, &console)
                });
            }
            None => info!("no bot token or chat id configured, skipping notification"),
        }
    }
}

fn warm_index(files: &FileCache) {
    let root = files.root().path().display();
    match files.read(files.root().join("index.html")) {
        Some(body) => info!("serving files from {root} (index.html, {} bytes)", body.len()),
        None => info!("serving files from {root} (no index.html)"),
    }
}

/// Sends the configured menu and echoes the raw reply.
pub fn send_menu(
    notifier: &dyn Notifier,
    settings: &NotifyConfig,
    chat_id: &str,
    console: &Console,
) -> Result<()> {
    let reply = notifier.send_message(
        chat_id,
        &settings.message,
        &settings.parse_mode,
        &keyboard(&settings.keyboard),
    )?;
    console.echo(format!("Response: {reply}"));
    Ok(())
}
