use std::sync::{Arc, RwLock};

use crate::db::{DbPool, queries};
use crate::error::Result;

use super::Provider;

/// Settings key holding the selected provider.
pub const PROVIDER_SETTING_KEY: &str = "payment_provider";

/// Process-wide provider preference, persisted in `settings`.
///
/// Selecting a provider does not check that it is configured. A missing
/// configuration surfaces when a session is created.
#[derive(Clone)]
pub struct ProviderSelector {
    db: DbPool,
    current: Arc<RwLock<Provider>>,
}

impl ProviderSelector {
    /// Load the stored preference, falling back to `default`.
    pub fn load(db: DbPool, default: Provider) -> Result<Self> {
        let stored = {
            let conn = db.get()?;
            queries::get_setting(&conn, PROVIDER_SETTING_KEY)?
        };

        let current = match stored {
            Some(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    "Ignoring stored payment provider '{}', using {}",
                    value,
                    default
                );
                default
            }),
            None => default,
        };

        Ok(Self {
            db,
            current: Arc::new(RwLock::new(current)),
        })
    }

    pub fn get(&self) -> Provider {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn switch(&self, provider: Provider) -> Result<()> {
        let conn = self.db.get()?;
        queries::set_setting(&conn, PROVIDER_SETTING_KEY, provider.as_str())?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = provider;
        tracing::info!("Payment provider switched to {}", provider);
        Ok(())
    }
}
