//! Availability monitor for the proxy's public health endpoint
//!
//! A probe is a GET of `https://<domain>/health` with a browser-like
//! User-Agent. Consecutive failures past a threshold mark the target down and
//! fire an alert; consecutive successes while down mark it recovered.

use crate::config::MonitorSettings;
use crate::notify::TelegramNotifier;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Outcome of a single availability probe
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_secs: Option<f64>,
    pub error: Option<String>,
    pub timestamp: String,
}

/// State transition produced by feeding an outcome into the monitor state
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Failure threshold reached, target is now considered down
    Down,
    /// Recovery threshold reached; carries the downtime duration
    Recovered { downtime: Duration },
}

/// Pure threshold state machine, independent of the probing transport
pub struct MonitorState {
    failure_threshold: u32,
    recovery_threshold: u32,
    consecutive_failures: u32,
    consecutive_successes: u32,
    is_down: bool,
    downtime_start: Option<Instant>,
}

impl MonitorState {
    pub fn new(failure_threshold: u32, recovery_threshold: u32) -> Self {
        Self {
            failure_threshold,
            recovery_threshold,
            consecutive_failures: 0,
            consecutive_successes: 0,
            is_down: false,
            downtime_start: None,
        }
    }

    pub fn is_down(&self) -> bool {
        self.is_down
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Record a probe result, returning a transition when a threshold is crossed
    pub fn observe(&mut self, success: bool, now: Instant) -> Option<Transition> {
        if success {
            self.consecutive_failures = 0;
            self.consecutive_successes += 1;

            if self.is_down && self.consecutive_successes >= self.recovery_threshold {
                let downtime = self
                    .downtime_start
                    .map(|start| now.duration_since(start))
                    .unwrap_or_default();
                self.is_down = false;
                self.downtime_start = None;
                self.consecutive_successes = 0;
                return Some(Transition::Recovered { downtime });
            }
            None
        } else {
            self.consecutive_successes = 0;
            self.consecutive_failures += 1;

            if !self.is_down && self.consecutive_failures >= self.failure_threshold {
                self.is_down = true;
                self.downtime_start = Some(now);
                return Some(Transition::Down);
            }
            None
        }
    }
}

/// Monitors a single domain and pushes Telegram notifications on transitions
pub struct ProxyMonitor {
    domain: String,
    url: String,
    client: reqwest::Client,
    settings: MonitorSettings,
    state: MonitorState,
    notifier: Option<TelegramNotifier>,
}

impl ProxyMonitor {
    pub fn new(
        domain: &str,
        settings: MonitorSettings,
        notifier: Option<TelegramNotifier>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            domain: domain.to_string(),
            url: format!("https://{}/health", domain),
            client,
            state: MonitorState::new(settings.failure_threshold, settings.recovery_threshold),
            settings,
            notifier,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Perform one availability probe
    pub async fn probe(&self) -> ProbeOutcome {
        let mut outcome = ProbeOutcome {
            success: false,
            status_code: None,
            response_time_secs: None,
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let start = Instant::now();
        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let elapsed = start.elapsed().as_secs_f64();
                outcome.response_time_secs = Some(elapsed);
                outcome.status_code = Some(response.status().as_u16());

                if response.status().as_u16() == 200 {
                    outcome.success = true;
                    if elapsed > self.settings.max_response_time.as_secs_f64() {
                        warn!(response_time = elapsed, "Slow response");
                    }
                } else {
                    outcome.error = Some(format!("Bad status code: {}", response.status().as_u16()));
                }
            }
            Err(e) if e.is_timeout() => {
                outcome.error = Some(format!("Timeout after {}s", self.settings.timeout.as_secs()));
                error!(url = %self.url, "Probe timed out");
            }
            Err(e) => {
                outcome.error = Some(format!("Connection error: {}", e));
                error!(url = %self.url, error = %e, "Probe failed");
            }
        }

        outcome
    }

    /// Feed an outcome into the state machine and deliver notifications
    pub async fn handle_outcome(&mut self, outcome: &ProbeOutcome) {
        match self.state.observe(outcome.success, Instant::now()) {
            Some(Transition::Down) => {
                error!(
                    domain = %self.domain,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Service DOWN"
                );
                if let Some(notifier) = &self.notifier {
                    if let Err(e) = notifier
                        .send_alert(
                            &self.domain,
                            outcome.status_code,
                            outcome.error.as_deref(),
                            outcome.response_time_secs,
                        )
                        .await
                    {
                        error!(error = %e, "Failed to send Telegram alert");
                    }
                }
            }
            Some(Transition::Recovered { downtime }) => {
                info!(
                    domain = %self.domain,
                    downtime_secs = downtime.as_secs(),
                    "Service recovered"
                );
                if let Some(notifier) = &self.notifier {
                    if let Err(e) = notifier.send_recovery(&self.domain, downtime.as_secs()).await {
                        error!(error = %e, "Failed to send Telegram recovery message");
                    }
                }
            }
            None => {
                if outcome.success {
                    info!(
                        status = outcome.status_code.unwrap_or(0),
                        response_time = outcome.response_time_secs.unwrap_or(0.0),
                        "Check passed"
                    );
                } else {
                    warn!(
                        failures = self.state.consecutive_failures(),
                        threshold = self.settings.failure_threshold,
                        error = outcome.error.as_deref().unwrap_or("unknown"),
                        "Check failed"
                    );
                }
            }
        }
    }

    /// Probe on the configured interval until Ctrl+C
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!(
            domain = %self.domain,
            interval_secs = self.settings.interval.as_secs(),
            failure_threshold = self.settings.failure_threshold,
            "Monitor started"
        );

        if let Some(notifier) = &self.notifier {
            let text = format!(
                "🚀 <b>Monitoring started</b>\n\n<b>Domain:</b> {}\n<b>Interval:</b> {}s",
                self.domain,
                self.settings.interval.as_secs()
            );
            if let Err(e) = notifier.send_message(&text).await {
                error!(error = %e, "Failed to send Telegram startup message");
            }
        }

        loop {
            let outcome = self.probe().await;
            self.handle_outcome(&outcome).await;

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Monitor stopped");
                    if let Some(notifier) = &self.notifier {
                        let text = format!(
                            "⏸️ <b>Monitoring stopped</b>\n\n<b>Domain:</b> {}",
                            self.domain
                        );
                        let _ = notifier.send_message(&text).await;
                    }
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_after_failure_threshold() {
        let mut state = MonitorState::new(2, 2);
        let now = Instant::now();

        assert_eq!(state.observe(false, now), None);
        assert!(!state.is_down());
        assert_eq!(state.observe(false, now), Some(Transition::Down));
        assert!(state.is_down());

        // Further failures while down do not re-fire
        assert_eq!(state.observe(false, now), None);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut state = MonitorState::new(3, 1);
        let now = Instant::now();

        state.observe(false, now);
        state.observe(false, now);
        state.observe(true, now);
        assert_eq!(state.consecutive_failures(), 0);

        // Takes a full three failures again to go down
        state.observe(false, now);
        state.observe(false, now);
        assert!(!state.is_down());
        assert_eq!(state.observe(false, now), Some(Transition::Down));
    }

    #[test]
    fn test_recovery_after_success_threshold() {
        let mut state = MonitorState::new(1, 2);
        let start = Instant::now();

        assert_eq!(state.observe(false, start), Some(Transition::Down));

        let later = start + Duration::from_secs(90);
        assert_eq!(state.observe(true, later), None);
        let transition = state.observe(true, later + Duration::from_secs(30));
        match transition {
            Some(Transition::Recovered { downtime }) => {
                assert_eq!(downtime.as_secs(), 120);
            }
            other => panic!("expected recovery, got {:?}", other),
        }
        assert!(!state.is_down());
    }

    #[test]
    fn test_failure_while_recovering_resets_successes() {
        let mut state = MonitorState::new(1, 2);
        let now = Instant::now();

        state.observe(false, now);
        assert!(state.is_down());

        state.observe(true, now);
        state.observe(false, now);
        // The single failure reset the success streak
        assert_eq!(state.observe(true, now), None);
        assert!(state.is_down());
    }

    #[test]
    fn test_monitor_url() {
        let monitor =
            ProxyMonitor::new("example.com", MonitorSettings::default(), None).unwrap();
        assert_eq!(monitor.url(), "https://example.com/health");
    }
}
