use arp_cli::{commands, output, telemetry, Cli};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return;
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };
    telemetry::init(cli.verbose, cli.log_json);

    match commands::run(cli).await {
        Ok(payload) => output::print_success(&payload),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            output::print_error(&commands::error_envelope(&err));
            std::process::exit(1);
        }
    }
}
