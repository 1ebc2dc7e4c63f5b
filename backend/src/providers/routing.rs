//! Routing cache
//!
//! Key-indexed store of per-invoice routing metadata, populated once through
//! the provider and then treated as append-only. Reads before initialization
//! fail with [`ProviderError::NotInitialized`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{InvoiceId, InvoiceProvider, ProviderError};

/// Routing metadata of one invoice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub contract_address: String,
    /// Whether a payoff callback is registered for the funded position
    pub callback_registered: bool,
}

/// Append-only cache of invoice routes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingCache {
    routes: BTreeMap<InvoiceId, Route>,
}

impl RoutingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize routing for `id` through the provider if not cached yet
    pub fn ensure<P: InvoiceProvider + ?Sized>(
        &mut self,
        id: InvoiceId,
        provider: &mut P,
    ) -> Result<&Route, ProviderError> {
        if !self.routes.contains_key(&id) {
            provider.initialize(id)?;
            let contract_address = provider.contract_address(id)?;
            self.routes.insert(
                id,
                Route {
                    contract_address,
                    callback_registered: false,
                },
            );
        }
        self.get(id)
    }

    /// Cached route for `id`
    pub fn get(&self, id: InvoiceId) -> Result<&Route, ProviderError> {
        self.routes.get(&id).ok_or(ProviderError::NotInitialized(id))
    }

    pub fn contains(&self, id: InvoiceId) -> bool {
        self.routes.contains_key(&id)
    }

    /// Mark the payoff callback for `id` as registered or cleared
    pub fn set_callback(&mut self, id: InvoiceId, registered: bool) -> Result<(), ProviderError> {
        let route = self
            .routes
            .get_mut(&id)
            .ok_or(ProviderError::NotInitialized(id))?;
        route.callback_registered = registered;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{InMemoryInvoiceProvider, InvoiceDetails};

    #[test]
    fn test_read_before_initialize_fails() {
        let cache = RoutingCache::new();
        assert_eq!(cache.get(7).unwrap_err(), ProviderError::NotInitialized(7));
    }

    #[test]
    fn test_ensure_initializes_once() {
        let mut provider = InMemoryInvoiceProvider::new("0xinvoices");
        provider.insert(7, InvoiceDetails::new(100, 10, "c", "d", "USDC"));
        let mut cache = RoutingCache::new();

        cache.ensure(7, &mut provider).unwrap();
        cache.set_callback(7, true).unwrap();
        // Second call must not reset the cached route
        let route = cache.ensure(7, &mut provider).unwrap();
        assert!(route.callback_registered);
        assert_eq!(provider.initialize_calls(7), 1);
    }
}
