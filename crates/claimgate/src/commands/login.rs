//! Login command - runs the desktop authorization-code flow.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use claimgate_config::DesktopConfig;
use claimgate_oauth::{ApiClient, LoopbackConfig, OAuthConfig, OAuthError, TokenLifecycleManager};

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// API endpoint to call with the new access token
    #[arg(long)]
    pub api_url: Option<String>,

    /// Print the raw access token after signing in
    #[arg(long)]
    pub show_token: bool,
}

/// Run the login command.
pub async fn run(args: LoginArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let desktop = config.desktop()?;

    let http = reqwest::Client::new();
    let manager = Arc::new(TokenLifecycleManager::with_http_client(
        oauth_config(desktop)?,
        http.clone(),
    ));

    println!("Opening the system browser to sign in...");
    let outcome = tokio::select! {
        result = manager.login() => result,
        _ = tokio::signal::ctrl_c() => {
            manager.cancel_login();
            Err(OAuthError::LoginCancelled)
        }
    };

    match outcome {
        Ok(()) => println!("Signed in."),
        Err(OAuthError::LoginCancelled) => {
            println!("Login was cancelled.");
            return Ok(());
        }
        Err(e) => return Err(describe(e)),
    }

    if args.show_token
        && let Some(token) = manager.tokens().and_then(|t| t.access_token)
    {
        println!("Access token: {}", token);
    }

    if let Some(url) = args.api_url {
        let client = ApiClient::new(http, manager.clone());
        let body: serde_json::Value = client.get_json(&url).await.map_err(describe)?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}

fn oauth_config(desktop: &DesktopConfig) -> Result<OAuthConfig> {
    let loopback = LoopbackConfig {
        hostname: desktop.loopback_hostname.clone(),
        min_port: desktop.loopback_min_port,
        max_port: desktop.loopback_max_port,
        redirect_path: desktop.redirect_path.clone(),
        post_login_page: desktop.post_login_page.clone(),
    };

    Ok(OAuthConfig::new(
        desktop.authority_url()?.as_str(),
        desktop.client_id.clone().unwrap_or_default(),
    )
    .with_scope(desktop.scope.clone())
    .with_loopback(loopback)
    .with_login_timeout(desktop.login_timeout()))
}

/// Attach the stable error code so failures can be matched in scripts.
fn describe(e: OAuthError) -> anyhow::Error {
    match e.error_code() {
        Some(code) => anyhow::anyhow!("{} ({})", e, code),
        None => anyhow::Error::new(e),
    }
}
