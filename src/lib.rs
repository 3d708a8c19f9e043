//! bubblectl - Control CLI for a dockerised reverse-proxy stack
//!
//! This library backs the `bubblectl` binary, which wraps:
//! - The compose CLI for container lifecycle (start/stop/restart/logs/status)
//! - certbot's webroot HTTP-01 flow for certificate acquisition
//! - `${VAR}` templating of the proxy configuration from the shared env file
//! - tar.gz snapshots of the env file, certificates, and rendered config
//! - X.509 inspection of the issued certificate chain
//! - An availability monitor with Telegram alerting

pub mod backup;
pub mod certbot;
pub mod compose;
pub mod config;
pub mod error;
pub mod monitor;
pub mod notify;
pub mod template;
pub mod tls;
