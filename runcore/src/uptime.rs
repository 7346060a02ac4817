use std::time::{Duration, Instant};

use libtask::Console;
use log::debug;
use nix::sys::resource::{UsageWho, getrusage};

/// CPU time is only worth printing for short runs.
const CPU_REPORT_LIMIT: Duration = Duration::from_secs(2);

pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn start() -> Self {
        Uptime {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn report(&self, console: &Console) {
        let elapsed = self.elapsed();
        console.blank();
        if elapsed <= CPU_REPORT_LIMIT {
            match user_cpu_secs() {
                Some(user) => console.echo_flush(format_cpu(user)),
                None => debug!("getrusage unavailable, skipping cpu time"),
            }
        }
        console.echo(format_uptime(elapsed));
    }
}

fn user_cpu_secs() -> Option<f64> {
    let usage = getrusage(UsageWho::RUSAGE_SELF).ok()?;
    let tv = usage.user_time();
    Some(tv.tv_sec() as f64 + tv.tv_usec() as f64 / 1_000_000.0)
}

fn format_cpu(user_secs: f64) -> String {
    format!("core time: {user_secs:.6}s user total, ")
}

fn format_uptime(elapsed: Duration) -> String {
    format!("uptime: {:.6}s", elapsed.as_secs_f64())
}
