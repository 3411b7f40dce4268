//! Connection configuration: local persistence and shareable links.
//!
//! A configuration can be serialised into a URL query parameter so one
//! team member sets up the gateway connection and shares a link with the
//! rest. The encoding is reversible (JSON, percent-escaped, then base64);
//! on load a shared configuration takes priority over the locally saved
//! one, is validated and sanitised, and is persisted for the next run.

use std::path::{Path, PathBuf};
use std::{env, fs};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::error::{EngineError, EngineResult};

/// Default location of the saved configuration file.
const DEFAULT_CONFIG_PATH: &str = "config/connect.json";
/// Environment variable overriding [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RETRO_BOARD_CONNECT_PATH";
/// Query parameter carrying a shared configuration.
pub const SHARE_QUERY_PARAM: &str = "config";

/// Connection settings for a sync gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectConfig {
    /// Base URL of the gateway, e.g. `https://retro.example.com`.
    #[validate(
        length(min = 1, max = 200),
        custom(function = validate_base_url)
    )]
    pub base_url: String,
    /// Board namespace segregating teams that share one gateway.
    #[validate(
        length(min = 1, max = 50),
        custom(function = validate_namespace)
    )]
    pub namespace: String,
    /// Optional bearer token forwarded with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 100))]
    pub token: Option<String>,
}

fn validate_base_url(value: &str) -> Result<(), ValidationError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ValidationError::new("base_url_scheme")
            .with_message("base url must start with http:// or https://".into()))
    }
}

fn validate_namespace(value: &str) -> Result<(), ValidationError> {
    let well_formed = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::new("namespace_charset")
            .with_message("namespace may only contain lowercase letters, digits, and dashes".into()))
    }
}

/// Serialise a configuration for embedding in a share link.
pub fn encode_config(config: &ConnectConfig) -> EngineResult<String> {
    let json = serde_json::to_string(config)
        .map_err(|err| EngineError::Validation(format!("failed to encode configuration: {err}")))?;
    Ok(BASE64.encode(percent_escape(&json)))
}

/// Decode a configuration from its share-link representation.
pub fn decode_config(encoded: &str) -> EngineResult<ConnectConfig> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| EngineError::Validation(format!("malformed share link: {err}")))?;
    let escaped = String::from_utf8(bytes)
        .map_err(|err| EngineError::Validation(format!("malformed share link: {err}")))?;
    let json = percent_unescape(&escaped)?;
    serde_json::from_str(&json)
        .map_err(|err| EngineError::Validation(format!("malformed share link: {err}")))
}

/// Build a share link pointing at `page_url` with the encoded configuration.
pub fn share_link(page_url: &str, config: &ConnectConfig) -> EngineResult<String> {
    let encoded = encode_config(config)?;
    Ok(format!("{page_url}?{SHARE_QUERY_PARAM}={encoded}"))
}

/// Strip characters that could smuggle markup and trim every field.
pub fn sanitize_config(config: ConnectConfig) -> ConnectConfig {
    ConnectConfig {
        base_url: sanitize_field(&config.base_url),
        namespace: sanitize_field(&config.namespace),
        token: config.token.map(|token| sanitize_field(&token)),
    }
}

fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '`'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolve the effective configuration.
///
/// A decodable, valid configuration supplied via the share-link query
/// parameter wins over the saved file and is persisted for the next run;
/// otherwise the saved configuration (if any) is used.
pub fn resolve_config(share_param: Option<&str>) -> Option<ConnectConfig> {
    resolve_config_at(&resolve_config_path(), share_param)
}

/// Same as [`resolve_config`] with an explicit file location.
pub fn resolve_config_at(path: &Path, share_param: Option<&str>) -> Option<ConnectConfig> {
    if let Some(encoded) = share_param {
        match decode_config(encoded) {
            Ok(decoded) => {
                let sanitized = sanitize_config(decoded);
                match sanitized.validate() {
                    Ok(()) => {
                        save_config_at(path, &sanitized);
                        return Some(sanitized);
                    }
                    Err(error) => {
                        warn!(%error, "shared configuration failed validation; ignoring it")
                    }
                }
            }
            Err(error) => warn!(%error, "failed to decode shared configuration; ignoring it"),
        }
    }
    load_config_at(path)
}

/// Persist the configuration, best-effort.
pub fn save_config(config: &ConnectConfig) {
    save_config_at(&resolve_config_path(), config);
}

/// Same as [`save_config`] with an explicit file location.
pub fn save_config_at(path: &Path, config: &ConnectConfig) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        warn!(path = %path.display(), error = %err, "failed to create configuration directory");
        return;
    }

    let contents = match serde_json::to_string_pretty(config) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(error = %err, "failed to encode configuration");
            return;
        }
    };
    match fs::write(path, contents) {
        Ok(()) => info!(path = %path.display(), "saved connection configuration"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to save configuration"),
    }
}

/// Load the saved configuration, if a readable one exists.
pub fn load_config() -> Option<ConnectConfig> {
    load_config_at(&resolve_config_path())
}

/// Same as [`load_config`] with an explicit file location.
pub fn load_config_at(path: &Path) -> Option<ConnectConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read configuration file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to parse configuration file");
            None
        }
    }
}

/// Resolve the configuration path, honouring the environment override.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Escape every byte outside the unreserved set as `%XX`.
///
/// The unreserved set matches what browsers leave intact when encoding a
/// URI component, so links produced here and by a web client are
/// byte-identical.
fn percent_escape(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for byte in input.bytes() {
        if is_unreserved(byte) {
            escaped.push(byte as char);
        } else {
            escaped.push('%');
            escaped.push_str(&format!("{byte:02X}"));
        }
    }
    escaped
}

fn percent_unescape(input: &str) -> EngineResult<String> {
    let mut bytes = Vec::with_capacity(input.len());
    let mut cursor = input.bytes();
    while let Some(byte) = cursor.next() {
        if byte != b'%' {
            bytes.push(byte);
            continue;
        }
        let hi = cursor.next();
        let lo = cursor.next();
        let decoded = hi
            .zip(lo)
            .and_then(|(hi, lo)| {
                let hi = (hi as char).to_digit(16)?;
                let lo = (lo as char).to_digit(16)?;
                Some((hi * 16 + lo) as u8)
            })
            .ok_or_else(|| EngineError::Validation("malformed percent escape".into()))?;
        bytes.push(decoded);
    }
    String::from_utf8(bytes)
        .map_err(|err| EngineError::Validation(format!("malformed share link: {err}")))
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(byte, b'-' | b'_' | b'.' | b'!' | b'~' | b'*' | b'\'' | b'(' | b')')
}
