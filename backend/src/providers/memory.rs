//! In-memory collaborators
//!
//! Deterministic stand-ins for the invoice registry and permission lists.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{InvoiceDetails, InvoiceId, InvoiceProvider, Permissions, ProviderError};

/// Invoice registry held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceProvider {
    contract_address: String,
    invoices: BTreeMap<InvoiceId, InvoiceDetails>,
    initialized: HashMap<InvoiceId, usize>,
}

impl InMemoryInvoiceProvider {
    /// Create an empty registry whose invoices live at `contract_address`
    pub fn new(contract_address: &str) -> Self {
        Self {
            contract_address: contract_address.to_string(),
            ..Self::default()
        }
    }

    /// Register or replace an invoice
    pub fn insert(&mut self, id: InvoiceId, details: InvoiceDetails) {
        self.invoices.insert(id, details);
    }

    /// Mutable access for simulating provider-side changes
    pub fn details_mut(&mut self, id: InvoiceId) -> Result<&mut InvoiceDetails, ProviderError> {
        self.invoices
            .get_mut(&id)
            .ok_or(ProviderError::UnknownInvoice(id))
    }

    /// Record a payment from the debtor
    pub fn pay(&mut self, id: InvoiceId, amount: i64) -> Result<(), ProviderError> {
        let invoice = self.details_mut(id)?;
        invoice.paid_amount = (invoice.paid_amount + amount).min(invoice.face_value);
        invoice.is_paid = invoice.paid_amount >= invoice.face_value;
        Ok(())
    }

    /// Pay whatever is outstanding
    pub fn pay_in_full(&mut self, id: InvoiceId) -> Result<(), ProviderError> {
        let outstanding = self.details_mut(id)?.outstanding();
        self.pay(id, outstanding)
    }

    pub fn cancel(&mut self, id: InvoiceId) -> Result<(), ProviderError> {
        self.details_mut(id)?.is_canceled = true;
        Ok(())
    }

    pub fn transfer(&mut self, id: InvoiceId, new_creditor: &str) -> Result<(), ProviderError> {
        self.details_mut(id)?.creditor = new_creditor.to_string();
        Ok(())
    }

    /// How many times `initialize` ran for `id`
    pub fn initialize_calls(&self, id: InvoiceId) -> usize {
        self.initialized.get(&id).copied().unwrap_or(0)
    }
}

impl InvoiceProvider for InMemoryInvoiceProvider {
    fn invoice_details(&self, id: InvoiceId) -> Result<InvoiceDetails, ProviderError> {
        self.invoices
            .get(&id)
            .cloned()
            .ok_or(ProviderError::UnknownInvoice(id))
    }

    fn contract_address(&self, id: InvoiceId) -> Result<String, ProviderError> {
        if !self.initialized.contains_key(&id) {
            return Err(ProviderError::NotInitialized(id));
        }
        Ok(self.contract_address.clone())
    }

    fn initialize(&mut self, id: InvoiceId) -> Result<(), ProviderError> {
        if !self.invoices.contains_key(&id) {
            return Err(ProviderError::UnknownInvoice(id));
        }
        *self.initialized.entry(id).or_insert(0) += 1;
        Ok(())
    }
}

/// Permission check that admits everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Permissions for AllowAll {
    fn is_allowed(&self, _identity: &str) -> bool {
        true
    }
}

/// Explicit allow-list
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: BTreeSet<String>,
}

impl AllowList {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: identities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow(&mut self, identity: &str) {
        self.allowed.insert(identity.to_string());
    }

    pub fn revoke(&mut self, identity: &str) {
        self.allowed.remove(identity);
    }
}

impl Permissions for AllowList {
    fn is_allowed(&self, identity: &str) -> bool {
        self.allowed.contains(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pay_caps_at_face_value() {
        let mut provider = InMemoryInvoiceProvider::new("0x1");
        provider.insert(1, InvoiceDetails::new(100, 10, "c", "d", "USDC"));
        provider.pay(1, 60).unwrap();
        assert!(!provider.invoice_details(1).unwrap().is_paid);
        provider.pay(1, 60).unwrap();
        let invoice = provider.invoice_details(1).unwrap();
        assert_eq!(invoice.paid_amount, 100);
        assert!(invoice.is_paid);
    }

    #[test]
    fn test_allow_list() {
        let mut list = AllowList::new(["alice"]);
        assert!(list.is_allowed("alice"));
        assert!(!list.is_allowed("bob"));
        list.allow("bob");
        list.revoke("alice");
        assert!(list.is_allowed("bob"));
        assert!(!list.is_allowed("alice"));
    }
}
