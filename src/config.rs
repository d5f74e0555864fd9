use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the irrigation controller, e.g. `http://10.0.0.12:5000`.
    pub device_base_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Snapshot polling interval.
    pub poll_interval: Duration,
    /// Upper bound on every request sent to the controller.
    pub request_timeout: Duration,
    /// Directory receiving `irrigation_history.csv`.
    pub export_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            device_base_url: required("DEVICE_BASE_URL")?
                .trim_end_matches('/')
                .to_owned(),
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "8080")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            poll_interval: parse_millis("POLL_INTERVAL_MS", &optional("POLL_INTERVAL_MS", "5000"))?,
            request_timeout: parse_millis(
                "REQUEST_TIMEOUT_MS",
                &optional("REQUEST_TIMEOUT_MS", "8000"),
            )?,
            export_dir: PathBuf::from(optional("EXPORT_DIR", ".")),
        })
    }
}

/// Parse a strictly positive millisecond count.
fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got: {raw:?}"))?;
    if ms == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_millis(ms))
}

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("missing required env var: {key}"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_millis_accepts_positive_values() {
        assert_eq!(
            parse_millis("POLL_INTERVAL_MS", "5000").unwrap(),
            Duration::from_millis(5000)
        );
        assert_eq!(
            parse_millis("POLL_INTERVAL_MS", " 250 ").unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn parse_millis_rejects_zero() {
        let err = parse_millis("POLL_INTERVAL_MS", "0").unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn parse_millis_rejects_garbage_and_names_the_variable() {
        let err = parse_millis("REQUEST_TIMEOUT_MS", "soon").unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_MS"));
    }

    #[test]
    fn parse_millis_rejects_negative() {
        assert!(parse_millis("POLL_INTERVAL_MS", "-5").is_err());
    }
}
