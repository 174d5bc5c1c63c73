//! Dialogs and the dispatch affinity pinned to them.
//!
//! Dialog state machines live in the user-agent layer; what matters here is
//! identity (so arriving messages can be matched) and the affinity slot
//! every dialog carries: the serializer that processes the dialog's
//! messages and the peer the dialog belongs to. Once the slot holds a
//! serializer, every later message matching the dialog is queued onto it,
//! which is what gives a dialog its arrival-order processing guarantee.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use util::ArcStr;

use crate::peer::Peer;
use crate::serializer::Serializer;

/// Unique identifier of a SIP dialog (Call-ID + local tag + remote tag).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId {
    /// The Call-ID shared by both sides.
    pub call_id: ArcStr,
    /// Our tag.
    pub local_tag: ArcStr,
    /// The remote side's tag.
    pub remote_tag: ArcStr,
}

impl DialogId {
    /// Constructs a `DialogId` from its three parts.
    pub fn new(call_id: &str, local_tag: &str, remote_tag: &str) -> Self {
        DialogId {
            call_id: call_id.into(),
            local_tag: local_tag.into(),
            remote_tag: remote_tag.into(),
        }
    }
}

#[derive(Default)]
struct Affinity {
    serializer: Option<Serializer>,
    peer: Option<Arc<Peer>>,
}

struct Inner {
    id: DialogId,
    affinity: Mutex<Affinity>,
}

/// Represents a SIP Dialog.
#[derive(Clone)]
pub struct Dialog {
    inner: Arc<Inner>,
}

impl Dialog {
    fn new(id: DialogId) -> Self {
        Dialog {
            inner: Arc::new(Inner {
                id,
                affinity: Mutex::new(Affinity::default()),
            }),
        }
    }

    /// Returns the dialog identifier.
    pub fn id(&self) -> &DialogId {
        &self.inner.id
    }

    /// Pins this dialog's messages to `serializer`, or unpins with `None`.
    pub fn set_serializer(&self, serializer: Option<Serializer>) {
        let mut affinity = self.inner.affinity.lock().expect("Lock failed");
        affinity.serializer = serializer;
    }

    /// Returns the serializer this dialog is pinned to.
    pub fn serializer(&self) -> Option<Serializer> {
        let affinity = self.inner.affinity.lock().expect("Lock failed");
        affinity.serializer.clone()
    }

    /// Associates the dialog with `peer`, or clears with `None`.
    pub fn set_peer(&self, peer: Option<Arc<Peer>>) {
        let mut affinity = self.inner.affinity.lock().expect("Lock failed");
        affinity.peer = peer;
    }

    /// Returns the peer this dialog belongs to.
    pub fn peer(&self) -> Option<Arc<Peer>> {
        let affinity = self.inner.affinity.lock().expect("Lock failed");
        affinity.peer.clone()
    }

    /// Reads serializer and peer under a single lock acquisition.
    pub fn affinity(&self) -> (Option<Serializer>, Option<Arc<Peer>>) {
        let affinity = self.inner.affinity.lock().expect("Lock failed");
        (affinity.serializer.clone(), affinity.peer.clone())
    }
}

/// The set of live dialogs, indexed by [`DialogId`].
#[derive(Default)]
pub struct DialogSet {
    dialogs: Mutex<HashMap<DialogId, Dialog>>,
}

impl DialogSet {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Creates and registers a dialog for `id`.
    ///
    /// An existing dialog with the same id is replaced.
    pub fn create(&self, id: DialogId) -> Dialog {
        let dialog = Dialog::new(id.clone());
        let mut dialogs = self.dialogs.lock().expect("Lock failed");
        dialogs.insert(id, dialog.clone());

        dialog
    }

    /// Standard dialog lookup on (Call-ID, local tag, remote tag).
    pub fn find(&self, call_id: &str, local_tag: &str, remote_tag: &str) -> Option<Dialog> {
        let id = DialogId::new(call_id, local_tag, remote_tag);
        let dialogs = self.dialogs.lock().expect("Lock failed");

        dialogs.get(&id).cloned()
    }

    /// Drops the dialog registered for `id`.
    pub fn remove(&self, id: &DialogId) {
        let mut dialogs = self.dialogs.lock().expect("Lock failed");
        dialogs.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::SerializerRegistry;

    #[tokio::test]
    async fn serializer_slot_round_trips() {
        let registry = SerializerRegistry::new();
        let serializer = registry.create("wrk-7").unwrap();
        let set = DialogSet::new();
        let dialog = set.create(DialogId::new("a84b4c76e66710", "as58f4201b", "1928301774"));

        dialog.set_serializer(Some(serializer.clone()));
        assert_eq!(dialog.serializer().unwrap().name(), &"wrk-7");

        dialog.set_serializer(None);
        assert!(dialog.serializer().is_none());
    }

    #[test]
    fn lookup_matches_the_exact_triple() {
        let set = DialogSet::new();
        let id = DialogId::new("a84b4c76e66710", "as58f4201b", "1928301774");
        set.create(id.clone());

        assert!(set.find("a84b4c76e66710", "as58f4201b", "1928301774").is_some());
        assert!(set.find("a84b4c76e66710", "1928301774", "as58f4201b").is_none());
        assert!(set.find("other", "as58f4201b", "1928301774").is_none());

        set.remove(&id);
        assert!(set.find("a84b4c76e66710", "as58f4201b", "1928301774").is_none());
    }
}
