use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

use grist_superset::cli::{self, Command};
use grist_superset::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = std::env::args().collect();
    let program = if args.is_empty() { "grist-superset".to_string() } else { args.remove(0) };

    let mut settings = Settings::from_env()?;
    let command = match cli::parse_args(&args, &mut settings) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::usage(&program));
            std::process::exit(2);
        }
    };
    if command == Command::Help {
        println!("{}", cli::usage(&program));
        return Ok(());
    }

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "grist_superset",
        "grist-superset starting: RUST_LOG='{}', server={}, doc='{}', publish_url='{}'",
        rust_log, settings.grist_server, settings.doc_id, settings.publish_url
    );

    cli::run(command, settings).await?;
    Ok(())
}
