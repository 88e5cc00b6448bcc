use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand};
use grantsync_api::{ClientConfig, GrantClient};
use grantsync_engine::{CredentialResolver, ResolutionState, SettingsSynchronizer, SyncState};
use grantsync_types::{Collection, UserId};
use grantsync_util::{DocumentStore, Fields, JsonDocumentStore, mask_secret};
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "grantsync", version, about = "Resolve grant key organizations and manage synced settings")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the organizations a grant key has access to
    Orgs {
        #[arg(long, env = "GRANTSYNC_GRANT_KEY", hide_env_values = true)]
        grant_key: String,
    },
    /// Inspect or change stored settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Create the user and organization documents in the local store
    Seed {
        #[arg(long)]
        user: String,
        #[arg(long)]
        org: String,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    /// Print the stored settings
    Show(UserArgs),
    /// Edit settings and save them
    Set(SetArgs),
}

#[derive(Debug, Args)]
struct UserArgs {
    /// Authenticated user identity
    #[arg(long, env = "GRANTSYNC_USER_ID")]
    user: Option<String>,
}

#[derive(Debug, Args)]
struct SetArgs {
    #[command(flatten)]
    user: UserArgs,
    #[arg(long)]
    grant_key: Option<String>,
    #[arg(long)]
    org_id: Option<String>,
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    notifications: Option<bool>,
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    auto_sync: Option<bool>,
    #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
    dark_mode: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Orgs { grant_key } => run_orgs(&grant_key).await,
        Command::Settings(SettingsCommand::Show(args)) => run_show(args).await,
        Command::Settings(SettingsCommand::Set(args)) => run_set(args).await,
        Command::Seed { user, org } => run_seed(&user, &org).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_resolver() -> Result<Arc<CredentialResolver>> {
    let config = ClientConfig::from_env()?;
    let timeout = config.timeout;
    let client = GrantClient::new(config)?;
    Ok(CredentialResolver::new(Arc::new(client), timeout))
}

fn open_settings(user: Option<String>) -> Result<SettingsSynchronizer> {
    let store = JsonDocumentStore::with_defaults().context("open document store")?;
    Ok(SettingsSynchronizer::new(
        Arc::new(store),
        build_resolver()?,
        user.map(UserId::new),
    ))
}

async fn run_orgs(grant_key: &str) -> Result<()> {
    let resolver = build_resolver()?;
    match resolver.resolve(grant_key).await {
        ResolutionState::Ready(organizations) if organizations.is_empty() => println!("No organizations found"),
        ResolutionState::Ready(organizations) => {
            for organization in organizations {
                println!("{}\t{}", organization.id, organization.name);
            }
        }
        ResolutionState::Failed(error) => bail!("organization lookup failed: {error}"),
        ResolutionState::Idle | ResolutionState::Loading => bail!("a grant key is required"),
    }
    Ok(())
}

async fn run_show(args: UserArgs) -> Result<()> {
    let mut settings = open_settings(args.user)?;
    let _ = settings.load().await.context("load settings")?;
    print_settings(&settings)
}

async fn run_set(args: SetArgs) -> Result<()> {
    let mut settings = open_settings(args.user.user)?;
    let _ = settings.load().await.context("load settings")?;

    if let Some(grant_key) = args.grant_key {
        match settings.set_credential(grant_key).run().await {
            ResolutionState::Failed(error) => warn!(%error, "organization lookup failed for the new grant key"),
            ResolutionState::Ready(organizations) => {
                let selected = args.org_id.as_deref().unwrap_or(&settings.draft().selected_organization_id);
                if !selected.is_empty() && !organizations.iter().any(|organization| organization.id == selected) {
                    warn!(organization = selected, "selected organization is not reachable with this grant key");
                }
            }
            ResolutionState::Idle | ResolutionState::Loading => {}
        }
    }
    if let Some(org_id) = args.org_id {
        settings.select_organization(org_id);
    }
    if let Some(enabled) = args.notifications {
        settings.set_notifications(enabled);
    }
    if let Some(enabled) = args.auto_sync {
        settings.set_auto_sync(enabled);
    }
    if let Some(enabled) = args.dark_mode {
        settings.set_dark_mode(enabled);
    }

    if !settings.can_save() {
        println!("No changes to save");
        return Ok(());
    }
    settings.save().await.context("save settings")?;
    println!("Settings saved");
    print_settings(&settings)
}

async fn run_seed(user: &str, org: &str) -> Result<()> {
    let store = JsonDocumentStore::with_defaults().context("open document store")?;
    if store.get(Collection::Orgs, org).await?.is_none() {
        store.insert(Collection::Orgs, org, Fields::new()).await?;
    }
    match store.get(Collection::Users, user).await? {
        Some(_) => store.update(Collection::Users, user, object(json!({ "org": org }))).await?,
        None => store.insert(Collection::Users, user, object(json!({ "org": org }))).await?,
    }
    println!("Seeded users/{user} -> orgs/{org} in {}", store.path().display());
    Ok(())
}

fn object(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

fn print_settings(settings: &SettingsSynchronizer) -> Result<()> {
    let draft = settings.draft();
    let state = match settings.state() {
        SyncState::Loading => "loading",
        SyncState::Clean => "clean",
        SyncState::Dirty => "dirty",
        SyncState::Saving => "saving",
        SyncState::SaveFailed => "save-failed",
        SyncState::LoadFailed => "load-failed",
    };
    let out = json!({
        "user": settings.identity().map(UserId::as_str),
        "state": state,
        "grantKey": mask_secret(&draft.credential),
        "orgID": draft.selected_organization_id,
        "enableNotifications": draft.notifications_enabled,
        "enableAutoSync": draft.auto_sync_enabled,
        "enableDarkMode": draft.dark_mode_enabled,
        "lastError": settings.last_error(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
