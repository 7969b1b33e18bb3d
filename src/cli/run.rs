use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::info;

use super::{Cli, Command};
use crate::config::AppConfig;
use crate::domain::{LikeAction, SignInCredentials};
use crate::infrastructure::logging;
use crate::infrastructure::query::{QueryCache, QueryCacheConfig};
use crate::infrastructure::remote::{HttpClient, HttpRemoteService};
use crate::infrastructure::services::SocialClient;

/// Runs one CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);
    config.remote.validate()?;

    let client = build_client(&config)?;

    if let (Some(email), Some(password)) = (&cli.email, &cli.password) {
        let session = client
            .sign_in(SignInCredentials::new(email.as_str(), password.as_str()))
            .await
            .context("Sign in failed")?;
        info!(session_id = %session.id, "Signed in");
    }

    let result = execute(&client, cli.command).await;
    client.teardown();
    result
}

fn build_client(config: &AppConfig) -> anyhow::Result<SocialClient> {
    let http = HttpClient::with_timeout(config.remote.timeout())?;
    let remote = HttpRemoteService::new(http, config.remote.clone());
    let cache = QueryCache::new(QueryCacheConfig::from(&config.cache));

    Ok(SocialClient::new(Arc::new(remote), cache))
}

async fn execute(client: &SocialClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Recent => print_json(&*client.get_recent_posts().await?),
        Command::Feed { pages } => {
            let mut feed = client.get_posts().await?;

            while feed.page_count() < pages && client.has_more_posts() {
                feed = client.fetch_next_posts().await?;
            }

            print_json(&*feed)
        }
        Command::Post { id } => print_json(&*client.get_post_by_id(&id).await?),
        Command::Search { term } => print_json(&*client.search_posts(&term).await?),
        Command::Like { post, user, remove } => {
            let action = if remove { LikeAction::Del } else { LikeAction::Add };
            print_json(&client.like_post(&post, &user, action).await?)
        }
        Command::Save { post, user } => print_json(&client.save_post(&post, &user).await?),
        Command::Whoami => print_json(&*client.get_current_user().await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
