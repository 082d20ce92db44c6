//! Ephemeral per-user account custody.
//!
//! Accounts live only in process memory. Each chat user gets at most one
//! account, created on first use and never rotated; a restart discards
//! every key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::zeroize::Zeroize;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::VaultError;

/// Chat-transport user identity (e.g. a Telegram numeric id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A signing key and its derived address.
///
/// The key never leaves this type except to sign transactions.
pub struct Account {
    wallet: LocalWallet,
}

impl Account {
    /// Generate a fresh secp256k1 key from the OS entropy source.
    pub fn generate() -> Result<Self, VaultError> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| VaultError::KeyGeneration(e.to_string()))?;

        let key = SigningKey::from_slice(&bytes);
        bytes.zeroize();
        let key = key.map_err(|e| VaultError::KeyGeneration(e.to_string()))?;

        Ok(Self {
            wallet: LocalWallet::from(key),
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub(crate) fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Mapping from chat user to signing account.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Existing account for `user_id`, if any.
    async fn get(&self, user_id: &UserId) -> Option<Arc<Account>>;

    /// Existing account for `user_id`, or a newly generated one.
    ///
    /// Concurrent calls for the same user resolve to the same account.
    async fn get_or_create(&self, user_id: &UserId) -> Result<Arc<Account>, VaultError>;
}

type KeySource = fn() -> Result<Account, VaultError>;

/// Process-local account store.
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<UserId, Arc<Account>>>,
    key_source: KeySource,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            key_source: Account::generate,
        }
    }

    /// Replace the key generator (used to simulate entropy failures).
    pub fn with_key_source(mut self, key_source: KeySource) -> Self {
        self.key_source = key_source;
        self
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, user_id: &UserId) -> Option<Arc<Account>> {
        self.accounts.read().await.get(user_id).cloned()
    }

    async fn get_or_create(&self, user_id: &UserId) -> Result<Arc<Account>, VaultError> {
        if let Some(account) = self.accounts.read().await.get(user_id) {
            return Ok(Arc::clone(account));
        }

        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get(user_id) {
            return Ok(Arc::clone(account));
        }

        let account = Arc::new((self.key_source)()?);
        tracing::info!(
            user_id = %user_id,
            address = %format!("{:#x}", account.address()),
            "created account"
        );
        accounts.insert(user_id.clone(), Arc::clone(&account));
        Ok(account)
    }
}
