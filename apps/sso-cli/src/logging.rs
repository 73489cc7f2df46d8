use std::io::IsTerminal;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose level follows `-v`; everything else stays at `warn`
const OWN_CRATES: &[&str] = &["sso_cli", "sso_session", "sso_http"];

fn level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn default_directives(verbose: u8) -> String {
    let level = level(verbose);
    OWN_CRATES
        .iter()
        .fold(String::from("warn"), |mut acc, krate| {
            acc.push(',');
            acc.push_str(krate);
            acc.push('=');
            acc.push_str(level);
            acc
        })
}

/// Install the stderr subscriber. `RUST_LOG`, when set, replaces the
/// `-v` derived filter.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(verbose >= 2);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
