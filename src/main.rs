use buzon_channels::graph::{FacebookSender, GraphClient, InstagramSender, WhatsAppSender};
use buzon_core::{config, model::ChannelKind, webhook::WebhookBody};
use buzon_ingest::Router;
use buzon_store::{Encryptor, NewCredential, Store};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "buzon",
    version,
    about = "Buzón — unified multi-channel inbox core for the CLIC CRM"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a captured webhook body (JSON file, or - for stdin).
    Ingest {
        /// Path to the webhook body.
        file: String,
    },
    /// Manage channel credentials.
    Credentials {
        #[command(subcommand)]
        command: CredentialCommands,
    },
    /// Show configuration and store counters.
    Status,
}

#[derive(Subcommand)]
enum CredentialCommands {
    /// Provision or refresh a credential.
    Add {
        /// Tenant the account belongs to.
        #[arg(long)]
        tenant: String,
        /// CRM user id for a user-scoped credential. Omit for tenant-scoped.
        #[arg(long)]
        user: Option<String>,
        /// Channel: facebook_dm, instagram_dm, or whatsapp.
        #[arg(long)]
        channel: ChannelKind,
        /// Page id, Instagram account id, or WhatsApp phone number id.
        #[arg(long)]
        account: String,
        /// WhatsApp business account id, when the channel has one.
        #[arg(long)]
        secondary: Option<String>,
        /// Access token (stored encrypted).
        #[arg(long)]
        token: String,
    },
    /// Deactivate a credential by id.
    Deactivate {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = config::load(&cli.config)?;

    match cli.command {
        Commands::Ingest { file } => {
            let raw = if file == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)?
            };
            let body: WebhookBody = serde_json::from_str(&raw)?;

            let store = open_store(&cfg).await?;
            let router = build_router(&cfg, store)?;

            let report = router.dispatch(&body).await;
            println!(
                "handled: {}  skipped: {}  failed: {}",
                report.handled, report.skipped, report.failed
            );
        }
        Commands::Credentials { command } => match command {
            CredentialCommands::Add {
                tenant,
                user,
                channel,
                account,
                secondary,
                token,
            } => {
                let store = open_store(&cfg).await?;
                let id = store
                    .upsert_credential(&NewCredential {
                        tenant_id: tenant,
                        user_id: user,
                        channel,
                        external_account_id: account,
                        secondary_account_id: secondary,
                        access_token: token,
                    })
                    .await?;
                println!("credential stored: {id}");
            }
            CredentialCommands::Deactivate { id } => {
                let store = open_store(&cfg).await?;
                if store.deactivate_credential(&id).await? {
                    println!("credential deactivated: {id}");
                } else {
                    anyhow::bail!("no credential with id {id}");
                }
            }
        },
        Commands::Status => {
            println!("Buzón — Status\n");
            println!("Config: {}", cli.config);
            println!("Database: {}", cfg.store.db_path);
            println!("Graph API: {}", cfg.graph.api_base);

            let store = open_store(&cfg).await?;
            let stats = store.stats().await?;
            println!("  conversations: {}", stats.conversations);
            println!("  messages: {}", stats.messages);
            println!("  credentials: {}", stats.credentials);
        }
    }

    Ok(())
}

async fn open_store(cfg: &config::Config) -> anyhow::Result<Store> {
    let key = cfg.crypto.key_material()?;
    let encryptor = Encryptor::from_base64(&key)?;
    Ok(Store::new(&cfg.store, encryptor).await?)
}

fn build_router(cfg: &config::Config, store: Store) -> anyhow::Result<Router> {
    let graph = GraphClient::new(&cfg.graph)?;
    let mut router = Router::new(store);
    router.register(
        ChannelKind::FacebookDm,
        Arc::new(FacebookSender::new(graph.clone())),
    );
    router.register(
        ChannelKind::InstagramDm,
        Arc::new(InstagramSender::new(graph.clone())),
    );
    router.register(ChannelKind::Whatsapp, Arc::new(WhatsAppSender::new(graph)));
    Ok(router)
}
