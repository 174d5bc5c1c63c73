//! Transaction bookkeeping consumed by the dispatch stage.
//!
//! Full RFC 3261 transaction state machines are not modeled; the dispatch
//! stage needs exactly two things from a transaction: the dialog it may be
//! establishing (so a to-tag-less CANCEL can find its INVITE's dialog) and
//! the name of the serializer that sent its last request (so the matching
//! response lands on the same serializer).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use util::ArcStr;

use crate::dialog::Dialog;
use crate::message::SipMethod;

/// The role a transaction plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client transaction: we sent the request.
    Uac,
    /// Server transaction: we received the request.
    Uas,
}

/// The key a transaction is found under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TsxKey {
    /// The transaction role.
    pub role: Role,
    /// The method that opened the transaction.
    pub method: SipMethod,
    /// The Via branch parameter.
    pub branch: ArcStr,
}

impl TsxKey {
    /// Key of a client transaction.
    pub fn client(method: SipMethod, branch: &ArcStr) -> Self {
        TsxKey {
            role: Role::Uac,
            method,
            branch: branch.clone(),
        }
    }

    /// Key of a server transaction.
    pub fn server(method: SipMethod, branch: &ArcStr) -> Self {
        TsxKey {
            role: Role::Uas,
            method,
            branch: branch.clone(),
        }
    }
}

struct Inner {
    key: TsxKey,
    dialog: Mutex<Option<Dialog>>,
    last_serializer: Mutex<Option<ArcStr>>,
}

/// Represents a SIP Transaction.
#[derive(Clone)]
pub struct Transaction(Arc<Inner>);

impl Transaction {
    fn new(key: TsxKey) -> Self {
        Transaction(Arc::new(Inner {
            key,
            dialog: Mutex::new(None),
            last_serializer: Mutex::new(None),
        }))
    }

    /// Returns the transaction key.
    pub fn key(&self) -> &TsxKey {
        &self.0.key
    }

    /// Links the dialog this transaction is establishing.
    pub fn set_dialog(&self, dialog: Dialog) {
        let mut guard = self.0.dialog.lock().expect("Lock failed");
        *guard = Some(dialog);
    }

    /// Returns the dialog linked to this transaction, if any.
    pub fn dialog(&self) -> Option<Dialog> {
        let guard = self.0.dialog.lock().expect("Lock failed");
        guard.clone()
    }

    /// Stores the name of the serializer that sent the last request.
    pub fn set_last_serializer(&self, name: Option<ArcStr>) {
        let mut guard = self.0.last_serializer.lock().expect("Lock failed");
        *guard = name;
    }

    /// Returns the name recorded on the last transmitted request.
    pub fn last_serializer(&self) -> Option<ArcStr> {
        let guard = self.0.last_serializer.lock().expect("Lock failed");
        guard.clone()
    }
}

/// The set of live transactions, indexed by [`TsxKey`].
#[derive(Default)]
pub struct TransactionSet {
    transactions: Mutex<HashMap<TsxKey, Transaction>>,
}

impl TransactionSet {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Creates and registers a transaction under `key`.
    pub fn create(&self, key: TsxKey) -> Transaction {
        let tsx = Transaction::new(key.clone());
        let mut transactions = self.transactions.lock().expect("Lock failed");
        transactions.insert(key, tsx.clone());

        tsx
    }

    /// Looks a transaction up by key.
    pub fn find(&self, key: &TsxKey) -> Option<Transaction> {
        let transactions = self.transactions.lock().expect("Lock failed");
        transactions.get(key).cloned()
    }

    /// Drops the transaction registered under `key`.
    pub fn remove(&self, key: &TsxKey) {
        let mut transactions = self.transactions.lock().expect("Lock failed");
        transactions.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_role_and_method() {
        let branch: ArcStr = "z9hG4bK74bf9".into();
        let uac = TsxKey::client(SipMethod::Invite, &branch);
        let uas = TsxKey::server(SipMethod::Invite, &branch);

        assert_ne!(uac, uas);
        assert_ne!(uac, TsxKey::client(SipMethod::Bye, &branch));
        assert_eq!(uac, TsxKey::client(SipMethod::Invite, &branch));
    }

    #[test]
    fn find_returns_the_registered_transaction() {
        let set = TransactionSet::new();
        let branch: ArcStr = "z9hG4bK74bf9".into();
        let key = TsxKey::server(SipMethod::Invite, &branch);
        let tsx = set.create(key.clone());

        tsx.set_last_serializer(Some("wrk-7".into()));

        let found = set.find(&key).unwrap();
        assert_eq!(found.last_serializer().as_deref(), Some("wrk-7"));

        set.remove(&key);
        assert!(set.find(&key).is_none());
    }
}
