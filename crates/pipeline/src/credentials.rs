//! Turning a stored platform and credential into connection parameters.

use std::time::Duration;

use virtsync_core::status::PlatformType;
use virtsync_db::models::platform::{Platform, PlatformCredential};
use virtsync_inventory::ConnectParams;

use crate::error::SyncError;

/// Recovers the plaintext secret from what the credential row stores.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, credential: &PlatformCredential) -> Result<String, SyncError>;
}

/// Treats the stored secret as plaintext.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextSecrets;

impl SecretResolver for PlaintextSecrets {
    fn resolve(&self, credential: &PlatformCredential) -> Result<String, SyncError> {
        Ok(credential.secret.clone())
    }
}

pub fn connect_params(
    platform: &Platform,
    credential: &PlatformCredential,
    secrets: &dyn SecretResolver,
    timeout: Duration,
) -> Result<ConnectParams, SyncError> {
    let platform_type: PlatformType = platform.kind().ok_or_else(|| {
        SyncError::UnsupportedPlatform {
            platform_id: platform.id,
            platform_type: platform.platform_type.clone(),
        }
    })?;
    let port = u16::try_from(platform.port).map_err(|_| {
        SyncError::Internal(format!(
            "platform {} has out-of-range port {}",
            platform.id, platform.port
        ))
    })?;

    Ok(ConnectParams {
        platform_id: platform.id,
        platform_type,
        address: platform.address.clone(),
        port,
        username: credential.username.clone(),
        secret: secrets.resolve(credential)?,
        verify_tls: platform.verify_tls,
        timeout,
    })
}
