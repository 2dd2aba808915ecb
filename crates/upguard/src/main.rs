use std::process::ExitCode;

use upguard::cli::{build_cli, handlers};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = build_cli().get_matches();

    match handlers::dispatch(&matches).await {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}
