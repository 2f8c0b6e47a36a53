use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wikisync::runner::{RunOutcome, WikiSync};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Build,
    Dev,
    Preview,
    Help,
}

impl CliMode {
    fn skips_sync(self) -> bool {
        matches!(self, CliMode::Dev | CliMode::Preview)
    }
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Build;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "build" => mode = CliMode::Build,
            "dev" => mode = CliMode::Dev,
            "preview" => mode = CliMode::Preview,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mode = parse_cli_mode(std::env::args())?;
    if mode == CliMode::Help {
        println!("Usage: wikisync [build|dev|preview]");
        println!("  build     Sync wiki content from GitHub (default)");
        println!("  dev       Keep existing local content, no network access");
        println!("  preview   Same as dev");
        return Ok(());
    }

    let result = match WikiSync::from_env(mode.skips_sync()) {
        Ok(sync) => sync.run().await,
        Err(err) => Err(err),
    };
    match result {
        Ok(RunOutcome::Synced { head, .. }) | Ok(RunOutcome::Unchanged { head }) => {
            tracing::info!(%head, "content is up to date");
            Ok(())
        }
        Ok(RunOutcome::Skipped) => Ok(()),
        Err(err) => {
            if let Some(hint) = err.hint() {
                tracing::error!("{hint}");
            }
            Err(err.into())
        }
    }
}
