//!
//! grist-superset command line
//! ---------------------------
//! Headless front end for the publish widget: list a table's columns, export
//! it as CSV, or log in through the identity provider and publish or link it.

pub mod outputformatter;
mod terminal;

use std::sync::Arc;

use tracing::info;

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::export::{build_csv, filter_columns};
use crate::grist::{fetch_rows, get_columns_for_table, GristHost, GristRestClient, HostApi};
use crate::identity::callback::{self, CallbackServer};
use crate::identity::{LoginHandshake, OidcLogin, SessionStore, SystemBrowser, TokenSource};
use crate::superset::{PublishClient, Publisher};
use crate::widget::WidgetController;

pub use terminal::TerminalView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Columns,
    Export { out: Option<String> },
    Publish { index: String },
    Link,
    Login,
    Help,
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage:\n  {program} columns [--table <id>]\n  {program} export [--table <id>] [--out <file.csv>]\n  {program} publish --index <column> [--table <id>]\n  {program} link [--table <id>]\n  {program} login\n\nFlags (override the environment):\n  --server <url>           Grist server (GRIST_SERVER, default http://localhost:8484)\n  --doc <id>               Document id (GRIST_DOC_ID)\n  --api-key <key>          Grist API key (GRIST_API_KEY)\n  --table <id>             Table to work on (GRIST_TABLE_ID)\n  --publish-url <url>      Publish backend base URL (SUPERSET_PUBLISH_URL)\n  --issuer <url>           Identity provider URL (OIDC_ISSUER_URL)\n  --realm <name>           Identity provider realm (OIDC_REALM)\n  --client-id <id>         OIDC client id (OIDC_CLIENT_ID)\n  --callback-port <port>   Loopback port for the login callback, 0 for any (OIDC_CALLBACK_PORT)\n  --index-types <a,b>      Column types allowed as index (INDEX_COLUMN_TYPES)\n  -h, --help               Show this help"
    )
}

/// Parse everything after the program name; settings flags are applied in place.
pub fn parse_args(args: &[String], settings: &mut Settings) -> AppResult<Command> {
    let mut command: Option<&str> = None;
    let mut index: Option<String> = None;
    let mut out: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "-h" | "--help" => return Ok(Command::Help),
            "--index" | "--out" => {
                let value = args.get(i + 1).ok_or_else(|| AppError::user(format!("{} requires a value", arg)))?;
                if arg == "--index" { index = Some(value.clone()); } else { out = Some(value.clone()); }
                i += 2;
            }
            flag if flag.starts_with("--") => {
                let value = args.get(i + 1).ok_or_else(|| AppError::user(format!("{} requires a value", flag)))?;
                if !settings.apply_flag(flag, value)? {
                    return Err(AppError::user(format!("unrecognized flag: {}", flag)));
                }
                i += 2;
            }
            word if command.is_none() => {
                command = Some(word);
                i += 1;
            }
            other => return Err(AppError::user(format!("unexpected argument: {}", other))),
        }
    }

    match command {
        None => Ok(Command::Help),
        Some("columns") => Ok(Command::Columns),
        Some("export") => Ok(Command::Export { out }),
        Some("publish") => {
            let index = index.ok_or_else(|| AppError::user("publish requires --index <column>"))?;
            Ok(Command::Publish { index })
        }
        Some("link") => Ok(Command::Link),
        Some("login") => Ok(Command::Login),
        Some(other) => Err(AppError::user(format!("unknown command: {}", other))),
    }
}

fn grist_host(settings: &Settings) -> AppResult<Arc<GristHost>> {
    settings.require_document()?;
    Ok(Arc::new(GristHost::new(&settings.grist_server, &settings.doc_id, settings.api_key.clone(), settings.table_id.clone())))
}

async fn selected_table(host: &dyn HostApi) -> AppResult<String> {
    host.selected_table_id()
        .await?
        .ok_or_else(|| AppError::user("no table selected (GRIST_TABLE_ID or --table)"))
}

/// Loopback relay plus the handshake it feeds; shut the relay down when done.
async fn start_login(settings: &Settings) -> AppResult<(Arc<LoginHandshake>, CallbackServer)> {
    settings.require_oidc()?;
    let (listener, origin) = callback::bind(settings.callback_port).await?;
    let handshake = Arc::new(LoginHandshake::new(&origin, SessionStore::new(), Arc::new(SystemBrowser)));
    let server = CallbackServer::spawn(listener, handshake.clone());
    Ok((handshake, server))
}

pub async fn run(command: Command, settings: Settings) -> AppResult<()> {
    match command {
        Command::Help => {
            println!("{}", usage("grist-superset"));
            Ok(())
        }
        Command::Columns => {
            let host = grist_host(&settings)?;
            let table = selected_table(host.as_ref()).await?;
            let rest = GristRestClient::new(host);
            let columns = get_columns_for_table(&rest, &table).await?;
            outputformatter::print_columns(&table, &columns);
            Ok(())
        }
        Command::Export { out } => {
            let host = grist_host(&settings)?;
            let table = selected_table(host.as_ref()).await?;
            let rest = GristRestClient::new(host.clone());
            let columns = filter_columns(get_columns_for_table(&rest, &table).await?);
            let rows = fetch_rows(host.as_ref(), Some(&table), &columns).await?;
            let csv = build_csv(&columns, &rows).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, csv.as_bytes()).await?;
                    info!(target: "cli", "wrote {} rows of '{}' to {}", rows.len(), table, path);
                }
                None => print!("{}", csv),
            }
            Ok(())
        }
        Command::Login => {
            let (handshake, server) = start_login(&settings).await?;
            let result = handshake.login(&settings.oidc).await;
            server.shutdown().await;
            println!("{}", result?);
            Ok(())
        }
        Command::Publish { .. } | Command::Link => run_widget(command, settings).await,
    }
}

async fn run_widget(command: Command, settings: Settings) -> AppResult<()> {
    settings.require_publish()?;
    let host = grist_host(&settings)?;
    let publisher = Publisher::new(host, PublishClient::new(&settings.publish_url)?);
    let (handshake, server) = start_login(&settings).await?;
    let tokens: Arc<dyn TokenSource> = Arc::new(OidcLogin::new(handshake, settings.oidc.clone()));
    let config = settings.widget_config();
    let view = Arc::new(TerminalView::new(config.elements.clone()));
    let controller = WidgetController::new(config, publisher, tokens, view);

    let result = async {
        controller.init().await?;
        match &command {
            Command::Publish { index } => {
                controller.select(Some(index.as_str()))?;
                controller.submit().await
            }
            _ => controller.link().await,
        }
    }
    .await;
    server.shutdown().await;
    outputformatter::print_response(&result?);
    Ok(())
}
