//! Server-level address feature.

use std::sync::{Arc, RwLock};

/// Ordered list of address prefixes a server should bind.
///
/// Shared handle: hosts fill it in before the server starts, and the server
/// reads it once at start.
#[derive(Debug, Clone, Default)]
pub struct ServerAddresses {
    addresses: Arc<RwLock<Vec<String>>>,
}

impl ServerAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, address: impl Into<String>) {
        let address = address.into();
        let mut addresses = self.addresses.write().unwrap_or_else(|p| p.into_inner());
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    pub fn clear(&self) {
        self.addresses.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Copy of the current addresses, in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.addresses.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.addresses.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S: Into<String>> Extend<S> for ServerAddresses {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for address in iter {
            self.add(address);
        }
    }
}

/// Feature exposing a server's configured addresses.
#[derive(Debug, Clone, Default)]
pub struct ServerAddressesFeature {
    pub addresses: ServerAddresses,
}
