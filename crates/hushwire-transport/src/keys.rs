//! Signing identity and password-derived symmetric keys

use std::collections::HashMap;
use std::sync::Arc;

use hushwire_core::{IdentityKey, Relay};
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

use crate::error::{Result, TransportError};

/// Keys the transport registers with the relay.
///
/// The signing key pair is registered once. Symmetric keys are derived from
/// passwords at most once per password for the lifetime of the manager.
pub struct KeysManager {
    relay: Arc<dyn Relay>,
    identity: IdentityKey,
    sig_id: OnceCell<String>,
    passwords: RwLock<HashMap<String, String>>,
}

impl KeysManager {
    /// Create a new keys manager for `identity`
    pub fn new(relay: Arc<dyn Relay>, identity: IdentityKey) -> Self {
        Self {
            relay,
            identity,
            sig_id: OnceCell::new(),
            passwords: RwLock::new(HashMap::new()),
        }
    }

    /// Local identity key
    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    /// Relay handle of the signing key pair
    pub async fn add_or_get_key_pair(&self) -> Result<String> {
        let id = self
            .sig_id
            .get_or_try_init(|| async {
                let id = self
                    .relay
                    .add_key_pair(&self.identity)
                    .await
                    .map_err(TransportError::Signature)?;
                debug!("Registered signing key pair {}", id);
                Ok::<_, TransportError>(id)
            })
            .await?;
        Ok(id.clone())
    }

    /// Relay handle of the symmetric key derived from `password`
    pub async fn add_or_get_sym_key_from_password(&self, password: &str) -> Result<String> {
        if let Some(id) = self.passwords.read().await.get(password) {
            return Ok(id.clone());
        }

        let mut passwords = self.passwords.write().await;
        // Another caller may have derived it while we waited for the lock
        if let Some(id) = passwords.get(password) {
            return Ok(id.clone());
        }

        let id = self
            .relay
            .add_sym_key_from_password(password)
            .await
            .map_err(TransportError::Key)?;
        passwords.insert(password.to_string(), id.clone());
        Ok(id)
    }

    /// Raw bytes of a symmetric key
    pub async fn raw_sym_key(&self, id: &str) -> Result<Vec<u8>> {
        self.relay.get_sym_key(id).await.map_err(TransportError::Key)
    }
}
