use clap::Parser;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "runcore", about = "The runcore process runtime", disable_version_flag = true)]
pub struct Cli {
    /// Show version
    #[arg(short = 'v', long)]
    pub version: bool,
    /// Enable silent mode
    #[arg(long, aliases = ["quiet", "sick"])]
    pub silent: bool,
    /// Run in test mode
    #[arg(short = 't', long)]
    pub test: bool,
    /// Enable debugging
    #[arg(short = 'd', long)]
    pub debug: bool,
    /// Enable development mode
    #[arg(long)]
    pub dev: bool,
    /// Enable server mode
    #[arg(long)]
    pub server: bool,
    /// YAML config file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Listener port, overrides the config file
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// One line per enabled mode flag, in a fixed order.
    pub fn mode_banners(&self) -> Vec<&'static str> {
        let mut lines = Vec::new();
        if self.test {
            lines.push("Running in test mode.");
        }
        if self.debug {
            lines.push("Debugging enabled.");
        }
        if self.dev {
            lines.push("Development enabled.");
        }
        if self.server {
            lines.push("Server enabled.");
        }
        lines
    }
}

/// Like `Cli::try_parse_from`, except that unrecognised options are dropped
/// instead of rejected. Returns the flags and the arguments that were skipped.
/// Any other parse error, such as a bad `--port` value, is still returned.
pub fn parse_lenient<I, T>(args: I) -> Result<(Cli, Vec<String>), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut args: Vec<String> = args
        .into_iter()
        .map(|a| a.into().to_string_lossy().into_owned())
        .collect();
    let mut skipped = Vec::new();
    loop {
        let err = match Cli::try_parse_from(&args) {
            Ok(cli) => return Ok((cli, skipped)),
            Err(err) if err.kind() == ErrorKind::UnknownArgument => err,
            Err(err) => return Err(err),
        };
        let Some(ContextValue::String(bad)) = err.get(ContextKind::InvalidArg) else {
            return Err(err);
        };
        let with_value = format!("{bad}=");
        // argv[0] is never an option
        let Some(pos) = args
            .iter()
            .skip(1)
            .position(|a| a == bad || a.starts_with(&with_value))
        else {
            return Err(err);
        };
        skipped.push(args.remove(pos + 1));
    }
}

pub fn version_line() -> String {
    format!("Core Version: {}", env!("CARGO_PKG_VERSION"))
}
