//! Serve command - runs the claims-resolving API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;

use claimgate_cache::CacheConfig;
use claimgate_config::{ApiConfig, AuthenticatorKind, CacheSection, resolve_client_secret};
use claimgate_server::{
    Authenticator, HeaderAuthenticator, IntrospectionAuthenticator, Server, ServerConfig,
    TokenIntrospector,
};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let api = config.api()?;

    let mut bind_address: SocketAddr = args
        .bind
        .as_deref()
        .unwrap_or(&api.bind_address)
        .parse()
        .context("Invalid bind address")?;
    if let Some(port) = args.port {
        bind_address.set_port(port);
    }

    let server_config = ServerConfig::new(api.api_name.clone())
        .with_bind_address(bind_address)
        .with_unsecured_paths(api.unsecured_paths.clone())
        .with_cache(cache_config(&config.cache()?));

    let authenticator = build_authenticator(api)?;
    let server = Server::new(server_config, authenticator);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }
    Ok(())
}

fn cache_config(section: &CacheSection) -> CacheConfig {
    CacheConfig::default()
        .with_max_entries(section.max_entries)
        .with_max_ttl(section.max_ttl())
        .with_cleanup_task(section.enable_cleanup_task)
        .with_cleanup_interval(section.cleanup_interval())
}

fn build_authenticator(api: &ApiConfig) -> Result<Arc<dyn Authenticator>> {
    match api.authenticator {
        AuthenticatorKind::Introspection => {
            let authority = api.authority_url()?;
            let client_id = api.client_id.clone().unwrap_or_default();
            let secret = resolve_client_secret(api.client_secret.as_deref())?;
            tracing::info!(
                authority = %authority,
                client_id = %client_id,
                secret_source = %secret.source,
                "Using token introspection"
            );

            let introspector = TokenIntrospector::new(
                reqwest::Client::new(),
                authority.as_str(),
                client_id,
                secret.value,
            );
            Ok(Arc::new(IntrospectionAuthenticator::new(introspector)))
        }
        AuthenticatorKind::Headers => {
            tracing::info!("Reading claims from gateway headers");
            Ok(Arc::new(HeaderAuthenticator))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cache_config_from_section() {
        let section = CacheSection {
            max_ttl_secs: 120,
            max_entries: 50,
            cleanup_interval_secs: 5,
            enable_cleanup_task: false,
        };
        let cache = cache_config(&section);
        assert_eq!(cache.max_entries, 50);
        assert_eq!(cache.max_ttl, Duration::from_secs(120));
        assert_eq!(cache.cleanup_interval, Duration::from_secs(5));
        assert!(!cache.enable_cleanup_task);
    }

    #[test]
    fn test_header_authenticator_needs_no_secret() {
        let api = ApiConfig {
            authenticator: AuthenticatorKind::Headers,
            ..Default::default()
        };
        let authenticator = build_authenticator(&api).unwrap();
        assert!(!authenticator.validates_bearer_token());
    }
}
