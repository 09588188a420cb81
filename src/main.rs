use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use metricboard::auth::http::HttpAuthProvider;
use metricboard::auth::{AuthError, AuthProvider, TokenOptions};
use metricboard::binder::{BinderOptions, DataClientBinder};
use metricboard::client::{ClientError, DataClient, DataClientFactory};
use metricboard::config::{AppConfig, ConfigError};
use metricboard::guard::{Guarded, MemoryHistory, RouteGuard};
use metricboard::schema::{Entity, Operation, ValidationError};
use metricboard::session::SessionStore;
use metricboard::session::bootstrap::SessionBootstrap;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("auth failed: {0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Client(#[from] ClientError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not signed in; set METRICBOARD_SESSION_KEY or pass --session-key")]
    SignedOut,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "metricboard", about = "Metricboard session and data-API CLI")]
struct Cli {
    /// Overrides the session key from the environment.
    #[arg(long, env = "METRICBOARD_SESSION_KEY", hide_env_values = true)]
    session_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap the session and print the signed-in user.
    Whoami,
    /// Run the route guard for a protected path.
    Guard { path: String },
    /// Fetch a data-API token through the binder.
    Token,
    /// Check a payload against an entity contract without any network call.
    Validate { entity: Entity, operation: Operation, json: String },
    /// List rows, optionally filtered by equality.
    List {
        entity: Entity,
        #[arg(long = "where")]
        filter: Option<String>,
        #[arg(long)]
        select: Option<String>,
    },
    /// Fetch one row by unique key.
    Get { entity: Entity, key: String },
    Create { entity: Entity, json: String },
    Update { entity: Entity, key: String, json: String },
    Delete { entity: Entity, key: String },
    Count {
        entity: Entity,
        #[arg(long = "where")]
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    if let Command::Validate { entity, operation, json } = &cli.command {
        let value = entity.schema().validate(*operation, parse_json(json)?)?;
        return Ok(format!("valid {entity} {operation}: {value}"));
    }

    let mut config = AppConfig::from_env()?;
    if cli.session_key.is_some() {
        config.session_key = cli.session_key;
    }
    tracing::debug!(?config, "configuration loaded");

    let provider: Arc<dyn AuthProvider> =
        Arc::new(HttpAuthProvider::new(&config.auth_url, config.session_key.clone(), config.timeouts)?);
    let store = SessionStore::new();
    SessionBootstrap::new(store.clone(), provider.clone()).activate().await?;

    match cli.command {
        Command::Whoami => {
            let session = store.read();
            Ok(match session.user {
                Some(user) => serde_json::to_string_pretty(&user)?,
                None => "signed out".to_owned(),
            })
        }
        Command::Guard { path } => {
            let guard = RouteGuard::new(config.login_path.clone());
            let history = MemoryHistory::new(&path);
            Ok(match guard.guard(&store.read(), &path, &history, ()) {
                Guarded::Loading => "loading".to_owned(),
                Guarded::Redirected { to, from } => format!("redirect {from} -> {to}"),
                Guarded::Content(()) => format!("render {path}"),
            })
        }
        command => {
            let factory = DataClientFactory::new(&config.data_url, &config.data_key, config.timeouts)?;
            let options = BinderOptions {
                token: TokenOptions::with_template(config.token_template.clone()),
                ordering: config.ordering,
            };
            let binder = DataClientBinder::mount(store, provider, factory, options);
            let output = data_command(&binder, command).await;
            binder.unmount();
            output
        }
    }
}

async fn data_command(binder: &DataClientBinder<DataClientFactory>, command: Command) -> Result<String, CliError> {
    if let Command::Token = command {
        return match binder.refresh().await {
            Some(token) => Ok(token.as_str().to_owned()),
            None => Err(CliError::SignedOut),
        };
    }

    let client = binder.client().ok_or(CliError::SignedOut)?;
    let value = execute(&client, command).await?;
    Ok(serde_json::to_string_pretty(&value)?)
}

async fn execute(client: &DataClient, command: Command) -> Result<Value, CliError> {
    let value = match command {
        Command::List { entity, filter, select } => {
            let filter = filter.as_deref().map(parse_json).transpose()?;
            let select = select.as_deref().map(parse_json).transpose()?;
            Value::Array(client.select(entity, select.as_ref(), filter.as_ref()).await?)
        }
        Command::Get { entity, key } => client
            .find_unique(entity, &parse_json(&key)?, None)
            .await?
            .unwrap_or(Value::Null),
        Command::Create { entity, json } => client.insert(entity, &parse_json(&json)?).await?,
        Command::Update { entity, key, json } => client.update(entity, &parse_json(&key)?, &parse_json(&json)?).await?,
        Command::Delete { entity, key } => {
            client.delete(entity, &parse_json(&key)?).await?;
            serde_json::json!({ "deleted": true })
        }
        Command::Count { entity, filter } => {
            let filter = filter.as_deref().map(parse_json).transpose()?;
            serde_json::json!({ "count": client.count(entity, filter.as_ref()).await? })
        }
        Command::Whoami | Command::Guard { .. } | Command::Token | Command::Validate { .. } => Value::Null,
    };
    Ok(value)
}

fn parse_json(raw: &str) -> Result<Value, CliError> {
    Ok(serde_json::from_str(raw)?)
}
