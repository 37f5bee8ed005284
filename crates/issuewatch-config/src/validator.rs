//! Configuration validation.

use crate::schema::{Config, MonitoringConfig, NotificationsConfig, ThresholdsConfig};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_github(config, &mut result);
        Self::validate_monitoring(&config.monitoring, &mut result);
        Self::validate_thresholds(&config.monitoring.thresholds, &mut result);
        Self::validate_notifications(&config.monitoring.notifications, &mut result);

        if config.server.port == 0 {
            result.add_error(ValidationError::new("server.port", "Port cannot be 0"));
        }

        result
    }

    fn validate_github(config: &Config, result: &mut ValidationResult) {
        let url = &config.github.api_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            result.add_error(ValidationError::new(
                "github.api_url",
                "api_url must start with http:// or https://",
            ));
        }

        if config.github.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            result.add_warning(ValidationWarning::new(
                "github.token",
                "No API token configured, authentication probe will need --token or GITHUB_TOKEN",
            ));
        }

        if config.github.request_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "github.request_timeout_secs",
                "request_timeout_secs must be greater than 0",
            ));
        }
    }

    fn validate_monitoring(monitoring: &MonitoringConfig, result: &mut ValidationResult) {
        let positive = [
            ("monitoring.interval_secs", monitoring.interval_secs),
            ("monitoring.probe_timeout_secs", monitoring.probe_timeout_secs),
            ("monitoring.cycle_timeout_secs", monitoring.cycle_timeout_secs),
            ("monitoring.summary_window_secs", monitoring.summary_window_secs),
        ];
        for (path, value) in positive {
            if value == 0 {
                result.add_error(ValidationError::new(path, "must be greater than 0"));
            }
        }

        if monitoring.retention_days == 0 {
            result.add_error(ValidationError::new(
                "monitoring.retention_days",
                "retention_days must be at least 1",
            ));
        }

        if monitoring.health_history_size == 0 || monitoring.alert_history_size == 0 {
            result.add_error(ValidationError::new(
                "monitoring",
                "history sizes must be greater than 0",
            ));
        }

        if monitoring.max_events == 0 {
            result.add_error(ValidationError::new(
                "monitoring.max_events",
                "max_events must be greater than 0",
            ));
        }

        if monitoring.probe_timeout_secs > monitoring.interval_secs {
            result.add_warning(ValidationWarning::new(
                "monitoring.probe_timeout_secs",
                "probe timeout exceeds the cycle interval, slow probes will delay cycles",
            ));
        }
    }

    fn validate_thresholds(thresholds: &ThresholdsConfig, result: &mut ValidationResult) {
        let ratios = [
            ("monitoring.thresholds.error_rate", thresholds.error_rate),
            ("monitoring.thresholds.rate_limit", thresholds.rate_limit),
            ("monitoring.thresholds.accuracy", thresholds.accuracy),
        ];
        for (path, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                result.add_error(ValidationError::new(
                    path,
                    format!("{} is outside [0, 1]", value),
                ));
            }
        }

        if thresholds.response_time_ms == 0 || thresholds.processing_time_ms == 0 {
            result.add_error(ValidationError::new(
                "monitoring.thresholds",
                "time thresholds must be greater than 0",
            ));
        }

        if thresholds.cooldown_secs < 60 {
            result.add_warning(ValidationWarning::new(
                "monitoring.thresholds.cooldown_secs",
                "cooldown under a minute may flood notification channels",
            ));
        }
    }

    fn validate_notifications(notifications: &NotificationsConfig, result: &mut ValidationResult) {
        if let Some(ref url) = notifications.slack_webhook {
            if !url.starts_with("https://") {
                result.add_error(ValidationError::new(
                    "monitoring.notifications.slack_webhook",
                    "Slack webhook must be an https:// URL",
                ));
            }
        }

        if let Some(ref webhook) = notifications.webhook {
            if !webhook.url.starts_with("http://") && !webhook.url.starts_with("https://") {
                result.add_error(ValidationError::new(
                    "monitoring.notifications.webhook.url",
                    "webhook url must start with http:// or https://",
                ));
            }
        }

        if let Some(ref email) = notifications.email {
            if email.to.is_empty() {
                result.add_error(ValidationError::new(
                    "monitoring.notifications.email.to",
                    "at least one recipient is required",
                ));
            }
            if email.smtp_server.is_empty() {
                result.add_error(ValidationError::new(
                    "monitoring.notifications.email.smtp_server",
                    "SMTP server cannot be empty",
                ));
            }
        }

        if notifications.dispatch_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "monitoring.notifications.dispatch_timeout_secs",
                "dispatch_timeout_secs must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
