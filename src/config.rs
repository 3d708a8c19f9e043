//! Env-file configuration for the proxy stack
//!
//! The stack is configured through a plain `KEY=VALUE` env file shared with the
//! compose services. Three keys are required (primary domain, secondary domain,
//! ACME contact email); everything else has a default.

use crate::error::OpsError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parsed and validated stack configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Main public domain, used for certificates and health probes
    pub primary_domain: String,

    /// Additional certificate SAN (typically the `www.` variant)
    pub secondary_domain: String,

    /// Contact email passed to the certificate authority
    pub letsencrypt_email: String,

    /// Binary used for orchestration (default: docker, invoked as `docker compose`)
    pub compose_bin: String,

    /// Compose file describing the stack
    pub compose_file: PathBuf,

    /// Compose service name of the reverse proxy
    pub nginx_service: String,

    /// Compose service name of the certbot helper
    pub certbot_service: String,

    /// Proxy configuration template with `${VAR}` placeholders
    pub nginx_template: PathBuf,

    /// Rendered proxy configuration
    pub nginx_conf: PathBuf,

    /// Webroot served for ACME HTTP-01 challenges
    pub webroot_dir: PathBuf,

    /// Directory where certbot keeps issued certificates
    pub cert_dir: PathBuf,

    /// Directory for configuration snapshots
    pub backup_dir: PathBuf,

    /// Use the staging certificate authority directory
    pub certbot_staging: bool,

    /// Extra arguments appended to the certbot invocation
    pub certbot_extra_args: Vec<String>,

    /// Telegram credentials; notifications are disabled unless both are set
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,

    /// Availability monitor tunables
    pub monitor: MonitorSettings,

    /// Raw key-value map, used for template substitution
    pub vars: HashMap<String, String>,
}

/// Tunables for the availability monitor
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Interval between probes in the long-running loop
    pub interval: Duration,
    /// Timeout for a single probe
    pub timeout: Duration,
    /// Consecutive failures before the target is considered down
    pub failure_threshold: u32,
    /// Consecutive successes before a down target is considered recovered
    pub recovery_threshold: u32,
    /// Responses slower than this log a warning
    pub max_response_time: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(default_monitor_interval()),
            timeout: Duration::from_secs(default_monitor_timeout()),
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            max_response_time: Duration::from_secs(default_max_response_time()),
        }
    }
}

impl EnvConfig {
    /// Load the env file at `path`, apply defaults, and validate required keys
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpsError::MissingEnvFile(path.to_path_buf()).into());
        }
        let content = std::fs::read_to_string(path)?;
        let vars = parse_env_file(&content);
        let config = Self::from_vars(vars)?;
        Ok(config)
    }

    /// Build a configuration from an already-parsed key-value map
    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let get = |key: &str| vars.get(key).cloned().unwrap_or_default();
        let get_or = |key: &str, default: &str| {
            let v = get(key);
            if v.is_empty() { default.to_string() } else { v }
        };

        let certbot_extra_args = match vars.get("CERTBOT_EXTRA_ARGS") {
            Some(raw) if !raw.trim().is_empty() => shell_words::split(raw)
                .map_err(|e| anyhow::anyhow!("invalid CERTBOT_EXTRA_ARGS: {}", e))?,
            _ => Vec::new(),
        };

        let non_empty = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let monitor = MonitorSettings {
            interval: Duration::from_secs(parse_u64(
                &vars,
                "MONITOR_INTERVAL",
                default_monitor_interval(),
            )?),
            timeout: Duration::from_secs(parse_u64(
                &vars,
                "MONITOR_TIMEOUT",
                default_monitor_timeout(),
            )?),
            failure_threshold: parse_u64(
                &vars,
                "MONITOR_FAILURE_THRESHOLD",
                default_failure_threshold() as u64,
            )? as u32,
            recovery_threshold: parse_u64(
                &vars,
                "MONITOR_RECOVERY_THRESHOLD",
                default_recovery_threshold() as u64,
            )? as u32,
            max_response_time: Duration::from_secs(parse_u64(
                &vars,
                "MONITOR_MAX_RESPONSE_TIME",
                default_max_response_time(),
            )?),
        };

        let primary_domain = get("PRIMARY_DOMAIN");
        let secondary_domain = get("SECONDARY_DOMAIN");
        let letsencrypt_email = get("LETSENCRYPT_EMAIL");
        let compose_bin = get_or("COMPOSE_BIN", "docker");
        let compose_file = PathBuf::from(get_or("COMPOSE_FILE", "docker-compose.yml"));
        let nginx_service = get_or("NGINX_SERVICE", "nginx");
        let certbot_service = get_or("CERTBOT_SERVICE", "certbot");
        let nginx_template = PathBuf::from(get_or("NGINX_TEMPLATE", "nginx/nginx.conf.template"));
        let nginx_conf = PathBuf::from(get_or("NGINX_CONF", "nginx/nginx.conf"));
        let webroot_dir = PathBuf::from(get_or("WEBROOT_DIR", "certbot/www"));
        let cert_dir = PathBuf::from(get_or("CERT_DIR", "certbot/conf"));
        let backup_dir = PathBuf::from(get_or("BACKUP_DIR", "backups"));
        let certbot_staging = parse_bool(&get("CERTBOT_STAGING"));
        let telegram_bot_token = non_empty("TELEGRAM_BOT_TOKEN");
        let telegram_chat_id = non_empty("TELEGRAM_CHAT_ID");

        let config = Self {
            primary_domain,
            secondary_domain,
            letsencrypt_email,
            compose_bin,
            compose_file,
            nginx_service,
            certbot_service,
            nginx_template,
            nginx_conf,
            webroot_dir,
            cert_dir,
            backup_dir,
            certbot_staging,
            certbot_extra_args,
            telegram_bot_token,
            telegram_chat_id,
            monitor,
            vars,
        };

        config.validate()?;
        Ok(config)
    }

    /// Path to the certificate chain issued for the primary domain
    pub fn live_cert_path(&self) -> PathBuf {
        self.cert_dir
            .join("live")
            .join(&self.primary_domain)
            .join("fullchain.pem")
    }

    /// Telegram notifications are enabled when both credentials are present
    pub fn telegram_enabled(&self) -> bool {
        self.telegram_bot_token.is_some() && self.telegram_chat_id.is_some()
    }

    /// Validate required keys, collecting all errors before reporting
    pub fn validate(&self) -> Result<(), OpsError> {
        let mut errors = Vec::new();

        for (key, value) in [
            ("PRIMARY_DOMAIN", &self.primary_domain),
            ("SECONDARY_DOMAIN", &self.secondary_domain),
            ("LETSENCRYPT_EMAIL", &self.letsencrypt_email),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} must be set and non-empty", key));
            }
        }

        if !self.letsencrypt_email.is_empty() && !self.letsencrypt_email.contains('@') {
            errors.push(format!(
                "LETSENCRYPT_EMAIL '{}' does not look like an email address",
                self.letsencrypt_email
            ));
        }

        if self.monitor.failure_threshold == 0 {
            errors.push("MONITOR_FAILURE_THRESHOLD must be at least 1".to_string());
        }
        if self.monitor.recovery_threshold == 0 {
            errors.push("MONITOR_RECOVERY_THRESHOLD must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OpsError::InvalidConfig(errors))
        }
    }
}

/// Parse `KEY=VALUE` lines, ignoring comments and blanks, stripping quotes
pub fn parse_env_file(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_u64(vars: &HashMap<String, String>, key: &str, default: u64) -> anyhow::Result<u64> {
    match vars.get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}

// Default value functions
fn default_monitor_interval() -> u64 {
    300 // 5 minutes between probes
}

fn default_monitor_timeout() -> u64 {
    15
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_recovery_threshold() -> u32 {
    2
}

fn default_max_response_time() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_vars() -> HashMap<String, String> {
        parse_env_file(
            r#"
PRIMARY_DOMAIN=example.com
SECONDARY_DOMAIN=www.example.com
LETSENCRYPT_EMAIL=admin@example.com
"#,
        )
    }

    #[test]
    fn test_parse_env_file() {
        let vars = parse_env_file(
            r#"
# Stack configuration
PRIMARY_DOMAIN=example.com
SECONDARY_DOMAIN="www.example.com"
LETSENCRYPT_EMAIL='admin@example.com'
export CERTBOT_STAGING=true

MALFORMED LINE WITHOUT EQUALS
"#,
        );

        assert_eq!(vars["PRIMARY_DOMAIN"], "example.com");
        assert_eq!(vars["SECONDARY_DOMAIN"], "www.example.com");
        assert_eq!(vars["LETSENCRYPT_EMAIL"], "admin@example.com");
        assert_eq!(vars["CERTBOT_STAGING"], "true");
        assert_eq!(vars.len(), 4);
    }

    #[test]
    fn test_defaults_applied() {
        let config = EnvConfig::from_vars(minimal_vars()).unwrap();

        assert_eq!(config.compose_bin, "docker");
        assert_eq!(config.compose_file, PathBuf::from("docker-compose.yml"));
        assert_eq!(config.nginx_service, "nginx");
        assert_eq!(config.certbot_service, "certbot");
        assert_eq!(config.backup_dir, PathBuf::from("backups"));
        assert!(!config.certbot_staging);
        assert!(config.certbot_extra_args.is_empty());
        assert!(!config.telegram_enabled());
        assert_eq!(config.monitor.interval, Duration::from_secs(300));
        assert_eq!(config.monitor.timeout, Duration::from_secs(15));
        assert_eq!(config.monitor.failure_threshold, 2);
        assert_eq!(config.monitor.recovery_threshold, 2);
    }

    #[test]
    fn test_missing_required_keys_collected() {
        let vars = parse_env_file("PRIMARY_DOMAIN=example.com\n");
        let err = EnvConfig::from_vars(vars).unwrap_err();
        let msg = err.to_string();

        assert!(msg.contains("SECONDARY_DOMAIN"));
        assert!(msg.contains("LETSENCRYPT_EMAIL"));
        assert!(!msg.contains("PRIMARY_DOMAIN must be set"));
    }

    #[test]
    fn test_invalid_email_rejected() {
        let mut vars = minimal_vars();
        vars.insert("LETSENCRYPT_EMAIL".to_string(), "not-an-email".to_string());
        let err = EnvConfig::from_vars(vars).unwrap_err();
        assert!(err.to_string().contains("does not look like an email"));
    }

    #[test]
    fn test_certbot_extra_args_split() {
        let mut vars = minimal_vars();
        vars.insert(
            "CERTBOT_EXTRA_ARGS".to_string(),
            "--rsa-key-size 4096 --preferred-challenges http".to_string(),
        );
        let config = EnvConfig::from_vars(vars).unwrap();
        assert_eq!(
            config.certbot_extra_args,
            vec!["--rsa-key-size", "4096", "--preferred-challenges", "http"]
        );
    }

    #[test]
    fn test_telegram_requires_both_credentials() {
        let mut vars = minimal_vars();
        vars.insert("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string());
        let config = EnvConfig::from_vars(vars).unwrap();
        assert!(!config.telegram_enabled());

        let mut vars = minimal_vars();
        vars.insert("TELEGRAM_BOT_TOKEN".to_string(), "123:abc".to_string());
        vars.insert("TELEGRAM_CHAT_ID".to_string(), "-100200300".to_string());
        let config = EnvConfig::from_vars(vars).unwrap();
        assert!(config.telegram_enabled());
    }

    #[test]
    fn test_live_cert_path() {
        let config = EnvConfig::from_vars(minimal_vars()).unwrap();
        assert_eq!(
            config.live_cert_path(),
            PathBuf::from("certbot/conf/live/example.com/fullchain.pem")
        );
    }

    #[test]
    fn test_monitor_overrides() {
        let mut vars = minimal_vars();
        vars.insert("MONITOR_INTERVAL".to_string(), "60".to_string());
        vars.insert("MONITOR_FAILURE_THRESHOLD".to_string(), "5".to_string());
        let config = EnvConfig::from_vars(vars).unwrap();
        assert_eq!(config.monitor.interval, Duration::from_secs(60));
        assert_eq!(config.monitor.failure_threshold, 5);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut vars = minimal_vars();
        vars.insert("MONITOR_FAILURE_THRESHOLD".to_string(), "0".to_string());
        let err = EnvConfig::from_vars(vars).unwrap_err();
        assert!(err.to_string().contains("MONITOR_FAILURE_THRESHOLD"));
    }
}
