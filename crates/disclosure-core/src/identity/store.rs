//! On-disk session key file
//!
//! ```json
//! { "identity": "did:plc:...", "keypair": "<base64 key pair bytes>" }
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use super::keys::{RecipientKeyPair, SessionKeys};
use super::Identity;
use crate::error::{DisclosureError, DisclosureResult};

#[derive(Serialize, Deserialize)]
struct KeyFile {
    identity: Identity,
    keypair: String,
}

/// Write `keys` to `path`, creating parent directories as needed.
pub fn save_session_keys(path: impl AsRef<Path>, keys: &SessionKeys) -> DisclosureResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = KeyFile {
        identity: keys.identity().clone(),
        keypair: STANDARD.encode(keys.keypair().to_bytes()),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| DisclosureError::Serialization(e.to_string()))?;
    std::fs::write(path, json)?;

    info!(identity = %keys.identity(), path = %path.display(), "Saved session keys");
    Ok(())
}

/// Read session keys from `path`; `Ok(None)` if the file does not exist.
pub fn load_session_keys(path: impl AsRef<Path>) -> DisclosureResult<Option<SessionKeys>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)?;
    let file: KeyFile = serde_json::from_str(&json)
        .map_err(|e| DisclosureError::Serialization(format!("Invalid key file: {}", e)))?;
    let bytes = STANDARD
        .decode(file.keypair.as_bytes())
        .map_err(|e| DisclosureError::Serialization(format!("Invalid key encoding: {}", e)))?;
    let keypair = RecipientKeyPair::from_bytes(&bytes)?;

    Ok(Some(SessionKeys::new(file.identity, keypair)))
}
