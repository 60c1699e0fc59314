use std::process::ExitCode;
use std::time::Duration;

use certdays::error::CheckError;
use certdays::metrics::prom;
use certdays::{ExpiryChecker, ExpiryReport, HostTarget, TIMEOUT};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "certdays", version, about = env!("CARGO_PKG_DESCRIPTION"))]
struct Cli {
    /// Hostname to check: host, host:port, or URL
    host: String,

    /// Port used when the hostname does not carry one
    #[arg(long, default_value_t = 443)]
    port: u16,

    /// Connect/read timeout in seconds
    #[arg(long, default_value_t = TIMEOUT)]
    timeout: u64,

    /// Print the full report as JSON instead of the bare day count
    #[arg(long)]
    json: bool,

    /// Push expiry gauges to a Prometheus push gateway at this address
    #[arg(long, value_name = "ADDRESS")]
    prometheus: Option<String>,
}

// Exit codes: 0 valid, 1 expired, 2 usage, 254 retrieval failed, 255 DNS failed.
fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report).unwrap());
            } else {
                println!("{}", report.days_left);
            }
            if let Some(address) = &cli.prometheus {
                prom::push_report(&report, address);
            }
            if report.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<ExpiryReport, CheckError> {
    let target = HostTarget::parse(&cli.host, cli.port)?;
    let checker = ExpiryChecker::new(Duration::from_secs(cli.timeout));
    checker.check(&target)
}
