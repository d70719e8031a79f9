use anyhow::Context;
use clap::Parser;
use console::style;
use dapsync::config::Cli;
use dapsync::Config;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Exit code for runs that could not start or finish
const EXIT_FATAL: i32 = 2;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Convert CLI args to Config - this validates immediately
    let config = Config::try_from(cli).context("invalid arguments")?;
    dapsync::logging::init(config.verbose);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing in-flight files");
                cancel.cancel();
            }
        });
    }

    let source = config.source.clone();
    let report = dapsync::commands::sync::run(config, cancel)
        .await
        .with_context(|| format!("cannot sync {}", source))?;
    Ok(report.exit_code())
}
