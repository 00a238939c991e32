//! Host-key loading and persistence

use std::path::Path;

use anyhow::{Context, Result};
use russh_keys::key::{KeyPair, SignatureHash};

/// Load the persisted host key, or generate and persist a new one
///
/// A key file that fails to load is treated the same as a missing one:
/// the service regenerates rather than refuse to start. A persistence
/// failure is only a warning: the service still starts with the
/// freshly generated key, clients just see a new fingerprint after the
/// next restart.
pub fn load_or_create_host_key(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        tracing::info!("Loading SSH host key from {:?}", path);
        match russh_keys::load_secret_key(path, None) {
            Ok(key) => return Ok(key),
            Err(e) => {
                tracing::warn!("Failed to load host key from {:?}: {} (regenerating)", path, e);
            }
        }
    }

    tracing::info!("Generating new SSH host key");
    let key = KeyPair::generate_rsa(2048, SignatureHash::SHA2_256)
        .context("Failed to generate RSA host key")?;

    if let Err(e) = persist_key(&key, path) {
        tracing::warn!(
            "Failed to persist host key to {:?}: {} (fingerprint will change on restart)",
            path,
            e
        );
    }

    Ok(key)
}

fn persist_key(key: &KeyPair, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let mut pem = Vec::new();
    russh_keys::encode_pkcs8_pem(key, &mut pem).context("Failed to encode host key")?;
    std::fs::write(path, &pem).with_context(|| format!("Failed to write {:?}", path))?;

    // Private key: owner-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {:?}", path))?;
    }

    Ok(())
}
