//! Durable per-profile participant identity.
//!
//! The identifier is generated once, persisted locally, and reused across
//! sessions. Persistence is best-effort: if the identity file cannot be
//! read or written the caller still gets a usable (ephemeral) identifier,
//! mirroring how a browser profile would behave with storage disabled.

use std::path::{Path, PathBuf};
use std::{env, fs};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default location of the identity file.
const DEFAULT_IDENTITY_PATH: &str = "config/participant.json";
/// Environment variable overriding [`DEFAULT_IDENTITY_PATH`].
const IDENTITY_PATH_ENV: &str = "RETRO_BOARD_IDENTITY_PATH";
/// Namespace prefix of every participant identifier.
const ID_PREFIX: &str = "participant-";
/// Entropy of the identifier, in bytes (rendered as hex).
const ID_ENTROPY_BYTES: usize = 16;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredIdentity {
    participant_id: String,
}

/// Return this profile's durable participant identifier, creating and
/// persisting it on first use.
pub fn get_or_create_participant_id() -> String {
    get_or_create_at(&resolve_identity_path())
}

/// Same as [`get_or_create_participant_id`] with an explicit file location.
pub fn get_or_create_at(path: &Path) -> String {
    if let Some(existing) = load_identity(path) {
        return existing;
    }

    let id = generate_participant_id();
    persist_identity(path, &id);
    id
}

fn load_identity(path: &Path) -> Option<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to read identity file");
            return None;
        }
    };

    match serde_json::from_str::<StoredIdentity>(&contents) {
        Ok(stored) if is_valid_participant_id(&stored.participant_id) => {
            Some(stored.participant_id)
        }
        Ok(stored) => {
            warn!(
                path = %path.display(),
                id = %stored.participant_id,
                "stored identity is malformed; regenerating"
            );
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to parse identity file; regenerating");
            None
        }
    }
}

fn persist_identity(path: &Path, id: &str) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = fs::create_dir_all(parent)
    {
        warn!(path = %path.display(), error = %err, "failed to create identity directory; using ephemeral identity");
        return;
    }

    let stored = StoredIdentity {
        participant_id: id.to_string(),
    };
    let contents = match serde_json::to_string_pretty(&stored) {
        Ok(contents) => contents,
        Err(err) => {
            warn!(error = %err, "failed to encode identity; using ephemeral identity");
            return;
        }
    };

    match fs::write(path, contents) {
        Ok(()) => info!(path = %path.display(), "created participant identity"),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to persist identity; using ephemeral identity");
        }
    }
}

/// Generate a fresh namespaced identifier from cryptographic randomness.
fn generate_participant_id() -> String {
    let mut entropy = [0u8; ID_ENTROPY_BYTES];
    rand::rng().fill_bytes(&mut entropy);
    let hex: String = entropy.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("{ID_PREFIX}{hex}")
}

fn is_valid_participant_id(id: &str) -> bool {
    id.strip_prefix(ID_PREFIX).is_some_and(|suffix| {
        suffix.len() == ID_ENTROPY_BYTES * 2 && suffix.chars().all(|c| c.is_ascii_hexdigit())
    })
}

/// Resolve the identity file path, honouring the environment override.
fn resolve_identity_path() -> PathBuf {
    env::var_os(IDENTITY_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> PathBuf {
        let unique = generate_participant_id();
        env::temp_dir().join(format!("retro-board-{tag}-{unique}.json"))
    }

    #[test]
    fn identity_is_created_once_and_reused() {
        let path = scratch_path("reuse");
        let first = get_or_create_at(&path);
        let second = get_or_create_at(&path);
        assert_eq!(first, second);
        assert!(is_valid_participant_id(&first));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn malformed_identity_files_are_regenerated() {
        let path = scratch_path("malformed");
        fs::write(&path, "{not json").unwrap();
        let id = get_or_create_at(&path);
        assert!(is_valid_participant_id(&id));
        // The regenerated identity is persisted for the next run.
        assert_eq!(get_or_create_at(&path), id);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn foreign_identifiers_are_rejected() {
        assert!(!is_valid_participant_id("user-0011223344556677"));
        assert!(!is_valid_participant_id("participant-short"));
        assert!(is_valid_participant_id(&generate_participant_id()));
    }
}
