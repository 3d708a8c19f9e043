//! Certificate acquisition via the certbot webroot flow
//!
//! Certificate material is opaque to this tool: certbot owns issuance, renewal
//! bookkeeping, and key storage under the certificate directory. We only build
//! the invocation and run it through a one-off compose container.

use crate::compose::Compose;
use crate::config::EnvConfig;
use tracing::info;

/// Webroot path as mounted inside the certbot container
const CONTAINER_WEBROOT: &str = "/var/www/certbot";

/// Build the `certonly` argument list for the configured domains.
/// HTTP-01 webroot: the challenge file is written under the shared webroot
/// volume and served by the proxy on plain HTTP.
pub fn certonly_args(config: &EnvConfig) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "certonly".into(),
        "--webroot".into(),
        "-w".into(),
        CONTAINER_WEBROOT.into(),
        "-d".into(),
        config.primary_domain.clone(),
        "-d".into(),
        config.secondary_domain.clone(),
        "--email".into(),
        config.letsencrypt_email.clone(),
        "--agree-tos".into(),
        "--no-eff-email".into(),
        "--non-interactive".into(),
    ];

    if config.certbot_staging {
        args.push("--staging".into());
    }

    args.extend(config.certbot_extra_args.iter().cloned());
    args
}

/// Obtain (or renew) the certificate for the configured domains
pub async fn issue(compose: &Compose, config: &EnvConfig) -> anyhow::Result<()> {
    info!(
        primary = %config.primary_domain,
        secondary = %config.secondary_domain,
        staging = config.certbot_staging,
        "Requesting certificate via webroot challenge"
    );

    let args = certonly_args(config);
    compose.run_service(&config.certbot_service, &args).await?;

    info!(cert = %config.live_cert_path().display(), "Certificate obtained");
    Ok(())
}
