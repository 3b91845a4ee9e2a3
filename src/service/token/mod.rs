//! Per-tenant bot credential storage.

pub mod redis;

use std::{ops::Deref, sync::Arc};

use async_trait::async_trait;

use crate::base::types::{Res, Void};

// Traits.

/// Generic tenant-credential lookup trait.
///
/// A single shared mapping from tenant (team) identifier to bot access
/// token, written once at install time and read on every outbound delivery.
/// No rotation, expiry, or cache invalidation.
#[async_trait]
pub trait GenericTokenStore: Send + Sync + 'static {
    /// Store the access token for a tenant.
    async fn put(&self, team: &str, token: &str) -> Void;

    /// Look up the access token for a tenant.
    async fn get(&self, team: &str) -> Res<Option<String>>;
}

// Structs.

/// Tenant-credential handle for the application.
///
/// This is trivially cloneable and can be passed around without the need for
/// `Arc` or `Mutex`.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<dyn GenericTokenStore>,
}

impl Deref for TokenStore {
    type Target = dyn GenericTokenStore;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl TokenStore {
    /// Creates a handle over any token-store implementation.
    pub fn new(inner: Arc<dyn GenericTokenStore>) -> Self {
        Self { inner }
    }
}
