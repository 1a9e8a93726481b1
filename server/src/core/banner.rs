//! Startup banner and URL display

use super::config::{AppConfig, is_all_interfaces};
use super::constants::APP_NAME;

// Label width: "Write interval:" is 15 chars, pad to 17 for alignment
const W: usize = 17;

/// Print the startup banner with endpoints and the limits in force
pub fn print_banner(config: &AppConfig) {
    let host = config.server.host.as_str();
    let port = config.server.port;

    // Use localhost for display when binding to all interfaces
    let display_host = if is_all_interfaces(host) {
        "localhost"
    } else {
        host
    };
    let base = format!("http://{}:{}", display_host, port);

    println!();
    println!(
        "  \x1b[1m\x1b[36m{}\x1b[0m \x1b[90mv{}\x1b[0m",
        APP_NAME,
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!(
        "  \x1b[32m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}/upload \x1b[90m({} header)\x1b[0m",
        "Push:", base, config.ingest.partition_header
    );
    println!(
        "  \x1b[33m➜\x1b[0m  \x1b[1m{:<W$}\x1b[0m {}/federate",
        "Federate:", base
    );

    if host == "127.0.0.1" || host == "localhost" {
        println!(
            "  \x1b[90m➜  {:<W$} use --host 0.0.0.0 to expose\x1b[0m",
            "Network:"
        );
    }

    let interval = config.store.write_interval.as_secs();
    if interval == 0 {
        println!("  \x1b[90m➜  {:<W$} unlimited\x1b[0m", "Write interval:");
    } else {
        println!("  \x1b[90m➜  {:<W$} {}s\x1b[0m", "Write interval:", interval);
    }

    println!();
}
