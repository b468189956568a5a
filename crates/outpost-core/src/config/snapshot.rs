//! The configuration snapshot and the static option metadata table.

/// An immutable, revisioned view of every option value.
///
/// Published behind an atomic pointer by `ConfigurationStorage`; readers
/// hold an `Arc` and never observe a half-written update. Two snapshots
/// carry the same configuration iff every option value is equal; the
/// revision moves only when some value changed.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationSnapshot {
    pub revision: u64,

    pub enabled: bool,
    pub bootstrap_php_part_file: String,
    pub otlp_endpoint: String,
    pub otlp_insecure: bool,
    pub otlp_headers: String,
    pub otlp_timeout_ms: u64,
    pub max_send_retries: u32,
    pub retry_delay_ms: u64,
    pub log_level: String,
    pub log_file: String,
    pub opamp_endpoint: String,
}

impl Default for ConfigurationSnapshot {
    fn default() -> Self {
        Self {
            revision: 0,
            enabled: true,
            bootstrap_php_part_file: String::new(),
            otlp_endpoint: "http://localhost:4318".into(),
            otlp_insecure: false,
            otlp_headers: String::new(),
            otlp_timeout_ms: 10_000,
            max_send_retries: 3,
            retry_delay_ms: 500,
            log_level: "info".into(),
            log_file: String::new(),
            opamp_endpoint: String::new(),
        }
    }
}

// ── Option metadata ──────────────────────────────────────────────────────────

/// Source-specific addressing and handling for one option.
pub struct OptionMetadata {
    pub key: &'static str,
    pub env_name: &'static str,
    pub ini_name: &'static str,
    pub dynamic_name: &'static str,
    pub secret: bool,
}

macro_rules! option {
    ($key:literal, $env:literal) => {
        OptionMetadata {
            key: $key,
            env_name: $env,
            ini_name: concat!("opentelemetry_distro.", $key),
            dynamic_name: $key,
            secret: false,
        }
    };
    ($key:literal, $env:literal, secret) => {
        OptionMetadata {
            key: $key,
            env_name: $env,
            ini_name: concat!("opentelemetry_distro.", $key),
            dynamic_name: $key,
            secret: true,
        }
    };
}

static OPTIONS: [OptionMetadata; 11] = [
    option!("enabled", "OTEL_PHP_ENABLED"),
    option!("bootstrap_php_part_file", "OTEL_PHP_BOOTSTRAP_PHP_PART_FILE"),
    option!("otlp_endpoint", "OTEL_EXPORTER_OTLP_ENDPOINT"),
    option!("otlp_insecure", "OTEL_EXPORTER_OTLP_INSECURE"),
    option!("otlp_headers", "OTEL_EXPORTER_OTLP_HEADERS", secret),
    option!("otlp_timeout_ms", "OTEL_EXPORTER_OTLP_TIMEOUT"),
    option!("max_send_retries", "OTEL_PHP_MAX_SEND_RETRIES"),
    option!("retry_delay_ms", "OTEL_PHP_RETRY_DELAY"),
    option!("log_level", "OTEL_PHP_LOG_LEVEL"),
    option!("log_file", "OTEL_PHP_LOG_FILE"),
    option!("opamp_endpoint", "OTEL_PHP_OPAMP_ENDPOINT"),
];

/// The static table of every known option.
pub fn option_metadata() -> &'static [OptionMetadata] {
    &OPTIONS
}

// ── Per-option parsing and display ───────────────────────────────────────────

/// A raw value a source produced but no parser accepted.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for option '{option}'")]
pub struct InvalidOptionValue {
    pub option: &'static str,
}

/// Write one raw source value into its typed snapshot field.
pub(crate) fn apply_option(
    snapshot: &mut ConfigurationSnapshot,
    option: &'static OptionMetadata,
    raw: &str,
) -> Result<(), InvalidOptionValue> {
    let invalid = || InvalidOptionValue { option: option.key };
    match option.key {
        "enabled" => snapshot.enabled = parse_bool(raw).ok_or_else(invalid)?,
        "bootstrap_php_part_file" => snapshot.bootstrap_php_part_file = raw.to_string(),
        "otlp_endpoint" => snapshot.otlp_endpoint = raw.to_string(),
        "otlp_insecure" => snapshot.otlp_insecure = parse_bool(raw).ok_or_else(invalid)?,
        "otlp_headers" => snapshot.otlp_headers = raw.to_string(),
        "otlp_timeout_ms" => snapshot.otlp_timeout_ms = raw.trim().parse().map_err(|_| invalid())?,
        "max_send_retries" => {
            snapshot.max_send_retries = raw.trim().parse().map_err(|_| invalid())?
        }
        "retry_delay_ms" => snapshot.retry_delay_ms = raw.trim().parse().map_err(|_| invalid())?,
        "log_level" => snapshot.log_level = raw.to_string(),
        "log_file" => snapshot.log_file = raw.to_string(),
        "opamp_endpoint" => snapshot.opamp_endpoint = raw.to_string(),
        _ => return Err(invalid()),
    }
    Ok(())
}

/// Render one option's effective value. Secrets are the caller's problem.
pub(crate) fn display_option(snapshot: &ConfigurationSnapshot, key: &str) -> String {
    match key {
        "enabled" => snapshot.enabled.to_string(),
        "bootstrap_php_part_file" => snapshot.bootstrap_php_part_file.clone(),
        "otlp_endpoint" => snapshot.otlp_endpoint.clone(),
        "otlp_insecure" => snapshot.otlp_insecure.to_string(),
        "otlp_headers" => snapshot.otlp_headers.clone(),
        "otlp_timeout_ms" => snapshot.otlp_timeout_ms.to_string(),
        "max_send_retries" => snapshot.max_send_retries.to_string(),
        "retry_delay_ms" => snapshot.retry_delay_ms.to_string(),
        "log_level" => snapshot.log_level.clone(),
        "log_file" => snapshot.log_file.clone(),
        "opamp_endpoint" => snapshot.opamp_endpoint.clone(),
        _ => String::new(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
