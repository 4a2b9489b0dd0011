use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use berner_core::{ConfigError, CoreError, Credentials, ErrorExt};
use bot_workflow::{authorize, CredentialStore, ForumRegistry, MonitorEngine, TemplatePool, AUTH_TIMEOUT};
use reddit_client::{RedditApiClient, RedditClient, RedditOAuth2Config, RedditPlatform};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Installed-app client id registered for this bot.
const DEFAULT_APP_ID: &str = "z8huXvY0aph0PQ";
const REDIRECT_URI: &str = "http://localhost:8080/callback";
const USER_AGENT: &str = "redditberner/0.1 (by /u/redditberner)";

const CONFIG_DIR: &str = "config";
const SCRIPTS_DIR: &str = "scripts";
const CREDENTIALS_FILE: &str = "config/redditberner.config.json";
const SUBREDDITS_FILE: &str = "config/subreddits.json";

const DEFAULT_SUBREDDITS: &[&str] = &[
    "StillSandersForPres",
    "WayOfTheBern",
    "SandersForPresident",
    "BernieSanders",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "redditberner=info,bot_workflow=info,reddit_client=info",
                )
            }),
        )
        .init();

    if let Err(e) = run().await {
        if let Some(core) = e.downcast_ref::<CoreError>() {
            error!("{}", core.user_friendly_message());
        }
        return Err(e);
    }
    Ok(())
}

async fn run() -> Result<()> {
    fs::create_dir_all(CONFIG_DIR).context("Failed to create config directory")?;
    fs::create_dir_all(SCRIPTS_DIR).context("Failed to create scripts directory")?;

    let store = CredentialStore::new(CREDENTIALS_FILE);
    let credentials = load_or_authorize(&store).await?;

    let templates = TemplatePool::load(SCRIPTS_DIR).context(
        "Failed to load comment scripts; add at least one text file under 10 K to scripts/",
    )?;
    info!("Loaded {} comment script(s)", templates.len());

    let config =
        RedditOAuth2Config::installed_app(&credentials.app_id, REDIRECT_URI, USER_AGENT);
    let auth = RedditClient::from_credentials(config, &credentials)?;
    let api = RedditApiClient::new(USER_AGENT.to_string())?;
    let platform = Arc::new(RedditPlatform::new(auth, api));
    platform
        .identity()
        .await
        .context("Reddit authentication check failed")?;

    let registry = ForumRegistry::new(SUBREDDITS_FILE);
    let forums = registry
        .load_or_default(DEFAULT_SUBREDDITS, platform.as_ref())
        .await
        .context("Failed to load the monitored subreddits")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, shutting down");
            signal.cancel();
        }
    });

    info!("Commencing bot workflow");
    let mut engine = MonitorEngine::new(platform, Arc::new(templates));
    engine.run(&forums, shutdown).await?;
    info!("Bot workflow terminated");
    Ok(())
}

async fn load_or_authorize(store: &CredentialStore) -> Result<Credentials> {
    match store.load() {
        Ok(credentials) => {
            info!("Config loaded successfully");
            Ok(credentials)
        }
        Err(CoreError::Config(ConfigError::CredentialsNotFound { .. })) => {
            println!("****************************");
            println!("* Welcome to RedditBerner! *");
            println!("****************************");
            println!();
            println!("Before the bot can run, it needs to be linked to your Reddit account.");
            println!("Press Enter and a browser window will open the Reddit authorization");
            println!("page. Log in if needed, then click 'Allow'.");
            println!();
            print!("Press Enter to continue...");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().read_line(&mut line)?;

            let config =
                RedditOAuth2Config::installed_app(DEFAULT_APP_ID, REDIRECT_URI, USER_AGENT);
            let mut flow = RedditClient::new(config)?;
            let credentials = authorize(&mut flow, store, DEFAULT_APP_ID, AUTH_TIMEOUT)
                .await
                .context("Reddit authorization failed")?;
            println!("Reddit authentication successful!");
            Ok(credentials)
        }
        Err(e) => Err(e).context("Failed to load credentials"),
    }
}
