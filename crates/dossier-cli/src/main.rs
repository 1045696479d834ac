//! CLI entry point for the Dossier graph tools.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tracing_subscriber::{fmt, EnvFilter};

use dossier_core::config::DossierConfig;
use dossier_core::{AuthContext, RelatedEntity, RequestContext};
use dossier_graph::{Direction, GraphClient, OpContext};
use dossier_identity::KeycloakClient;

#[derive(Parser)]
#[command(name = "dossier")]
#[command(about = "Provision and query the Dossier knowledge graph in ArangoDB")]
struct Cli {
    /// Config file prefix (default: dossier).
    #[arg(short, long, default_value = "dossier", global = true)]
    config: String,

    /// Request id for log correlation; generated when omitted.
    #[arg(long, global = true)]
    request_id: Option<String>,

    /// `Bearer <jwt>` of the caller, already verified upstream. Only used
    /// to attribute log lines.
    #[arg(long, global = true)]
    authorization: Option<String>,

    /// Give up after this many seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure the database, graph, and every configured collection exist.
    Provision,

    /// Print entities related to a document, one JSON object per line.
    Related {
        /// Start document, as `collection/key`.
        id: String,

        /// Maximum number of hops.
        #[arg(short, long, default_value_t = 1)]
        depth: u32,

        #[arg(long, value_enum, default_value_t = DirectionArg::Outbound)]
        direction: DirectionArg,
    },

    /// Print the public profile of a Keycloak user as JSON.
    User {
        /// Keycloak user id.
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Outbound,
    Inbound,
    Any,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Outbound => Direction::Outbound,
            DirectionArg::Inbound => Direction::Inbound,
            DirectionArg::Any => Direction::Any,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let config = DossierConfig::load(&cli.config)?;

    let mut request = RequestContext::new(cli.request_id.as_deref());
    if let Some(header) = cli.authorization.as_deref() {
        request = request.with_auth(AuthContext::from_authorization_header(header)?);
    }

    let cancel = CancellationToken::new();
    let mut ctx = OpContext::with_cancel(cancel.clone());
    if let Some(secs) = cli.timeout_secs {
        ctx = ctx.with_timeout(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    run(cli.command, &config, &ctx)
        .instrument(request.span())
        .await
}

async fn run(command: Command, config: &DossierConfig, ctx: &OpContext) -> anyhow::Result<()> {
    match command {
        Command::Provision => {
            let graph = GraphClient::connect(config, ctx).await?;
            let schema = graph.ensure_schema(ctx).await?;
            let summary = json!({
                "database": config.arango.database,
                "graph": config.graph.name,
                "vertex_collections": schema
                    .vertex_collections
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>(),
                "edge_collections": schema
                    .edge_collections
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>(),
            });
            println!("{summary}");
        }
        Command::Related {
            id,
            depth,
            direction,
        } => {
            let graph = GraphClient::connect(config, ctx).await?;
            let start = graph.parse_doc_id(&id)?;
            let mut related = graph.traverse(ctx, &start, depth, direction.into()).await?;
            let mut count = 0usize;
            loop {
                let entity = match related.next(ctx).await {
                    Ok(Some(entity)) => entity,
                    Ok(None) => break,
                    Err(e) => {
                        related.close(ctx).await;
                        return Err(e.into());
                    }
                };
                println!("{}", related_line(&entity)?);
                count += 1;
            }
            tracing::info!(start = %start, depth, count, "Traversal complete");
        }
        Command::User { id } => {
            let keycloak = KeycloakClient::new(&config.keycloak)?;
            let user = tokio::select! {
                _ = ctx.cancel_token().cancelled() => anyhow::bail!("cancelled"),
                user = keycloak.public_user_data(&id) => user?,
            };
            println!("{}", serde_json::to_string(&user)?);
        }
    }

    Ok(())
}

/// One output line: the related entity plus its timestamp as RFC 3339, or null.
fn related_line(entity: &RelatedEntity) -> serde_json::Result<Value> {
    let mut line = serde_json::to_value(entity)?;
    if let Value::Object(fields) = &mut line {
        let timestamp = entity.entity.timestamp().map(|t| t.to_rfc3339());
        fields.insert("timestamp".to_string(), json!(timestamp));
    }
    Ok(line)
}
