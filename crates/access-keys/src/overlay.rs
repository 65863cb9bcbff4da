use crate::types::{AccessKey, KeyView, PendingKey, is_expired};
use alloy::primitives::Address;
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashSet},
    sync::Arc,
};
use tracing::debug;

pub type SharedOverlay = Arc<Mutex<Overlay>>;

/// Local knowledge the ledger has not caught up with yet: keys this process
/// created and keys it asked to revoke.
///
/// Every successful poll calls [`Overlay::reconcile`], so entries disappear
/// as soon as the ledger reflects them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Overlay {
    /// Insertion order; the newest key is last.
    pending: Vec<PendingKey>,
    revoking: BTreeSet<Address>,
}

impl Overlay {
    pub fn shared() -> SharedOverlay {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn pending(&self) -> &[PendingKey] {
        &self.pending
    }

    pub fn revoking(&self) -> &BTreeSet<Address> {
        &self.revoking
    }

    /// Replaces any pending entry with the same `key_id`.
    pub fn add_pending(&mut self, key: PendingKey) {
        self.pending.retain(|pending| pending.key_id != key.key_id);
        self.pending.push(key);
    }

    /// Drops pending keys the ledger now reports.
    pub fn clear_confirmed(&mut self, confirmed: &HashSet<Address>) {
        self.pending.retain(|pending| {
            let keep = !confirmed.contains(&pending.key_id);
            if !keep {
                debug!(key_id = %pending.key_id, "pending key confirmed");
            }
            keep
        });
    }

    pub fn mark_revoking(&mut self, key_id: Address) {
        self.revoking.insert(key_id);
    }

    /// Drops revocations the ledger already applied.
    pub fn clear_revoked(&mut self, still_on_chain: &HashSet<Address>) {
        self.revoking.retain(|key_id| {
            let keep = still_on_chain.contains(key_id);
            if !keep {
                debug!(%key_id, "revocation observed on chain");
            }
            keep
        });
    }

    pub fn remove_pending(&mut self, key_id: Address) {
        self.pending.retain(|pending| pending.key_id != key_id);
    }

    pub fn unmark_revoking(&mut self, key_id: Address) {
        self.revoking.remove(&key_id);
    }

    /// Applies the keys of a poll.
    ///
    /// Pending keys are cleared by any confirmation. Revoking marks are only
    /// cleared when the poll's authorizations are known to be complete, since
    /// a key missing from a partial read may still be on chain.
    pub fn reconcile(&mut self, confirmed: &[AccessKey], authorizations_complete: bool) {
        let ids: HashSet<Address> = confirmed.iter().map(|key| key.key_id).collect();
        self.clear_confirmed(&ids);
        if authorizations_complete {
            self.clear_revoked(&ids);
        } else {
            debug!(
                revoking = self.revoking.len(),
                "authorizations unknown; keeping revoking marks"
            );
        }
    }

    pub fn prune_expired(&mut self, now: u64) {
        self.pending.retain(|pending| !is_expired(pending.expiry, now));
    }

    pub fn merge(&self, confirmed: &[AccessKey]) -> Vec<KeyView> {
        merge_views(&self.pending, &self.revoking, confirmed)
    }
}

/// Pending keys not yet confirmed, newest first, followed by confirmed keys
/// flagged with whether a revocation is in flight.
pub(crate) fn merge_views(
    pending: &[PendingKey],
    revoking: &BTreeSet<Address>,
    confirmed: &[AccessKey],
) -> Vec<KeyView> {
    let confirmed_ids: HashSet<Address> = confirmed.iter().map(|key| key.key_id).collect();

    pending
        .iter()
        .rev()
        .filter(|pending| !confirmed_ids.contains(&pending.key_id))
        .cloned()
        .map(KeyView::Pending)
        .chain(confirmed.iter().map(|key| KeyView::Confirmed {
            key: key.clone(),
            revoking: revoking.contains(&key.key_id),
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempo_primitives::SignatureType;

    fn pending(byte: u8, expiry: u64) -> PendingKey {
        PendingKey {
            key_id: Address::repeat_byte(byte),
            expiry,
            token_address: None,
            spending_limit: None,
        }
    }

    fn confirmed(byte: u8) -> AccessKey {
        AccessKey {
            key_id: Address::repeat_byte(byte),
            signature_type: SignatureType::P256,
            expiry: 0,
            block_number: 100,
            created_at: None,
            enforce_limits: false,
            spending_limits: BTreeMap::new(),
            original_limits: BTreeMap::new(),
        }
    }

    #[test]
    fn pending_key_heals_once_confirmed() {
        let mut overlay = Overlay::default();
        overlay.add_pending(pending(1, 0));

        overlay.reconcile(&[], true);
        assert_eq!(overlay.pending().len(), 1);

        overlay.reconcile(&[confirmed(1)], true);
        assert!(overlay.pending().is_empty());
    }

    #[test]
    fn revoking_key_heals_once_gone_from_chain() {
        let mut overlay = Overlay::default();
        overlay.mark_revoking(Address::repeat_byte(2));

        overlay.reconcile(&[confirmed(2)], true);
        assert!(overlay.revoking().contains(&Address::repeat_byte(2)));

        overlay.reconcile(&[], true);
        assert!(overlay.revoking().is_empty());
    }

    #[test]
    fn partial_authorizations_only_clear_pending() {
        let mut overlay = Overlay::default();
        overlay.add_pending(pending(1, 0));
        overlay.mark_revoking(Address::repeat_byte(2));

        overlay.reconcile(&[confirmed(1)], false);
        assert!(overlay.pending().is_empty());
        assert!(overlay.revoking().contains(&Address::repeat_byte(2)));
    }

    #[test]
    fn merge_lists_newest_pending_first() {
        let mut overlay = Overlay::default();
        overlay.add_pending(pending(1, 0));
        overlay.add_pending(pending(2, 0));
        overlay.add_pending(pending(3, 0));
        overlay.mark_revoking(Address::repeat_byte(4));

        let views = overlay.merge(&[confirmed(3), confirmed(4), confirmed(5)]);
        let ids: Vec<_> = views.iter().map(KeyView::key_id).collect();
        assert_eq!(
            ids,
            vec![
                Address::repeat_byte(2),
                Address::repeat_byte(1),
                Address::repeat_byte(3),
                Address::repeat_byte(4),
                Address::repeat_byte(5),
            ]
        );
        assert!(matches!(views[3], KeyView::Confirmed { revoking: true, .. }));
        assert!(matches!(views[4], KeyView::Confirmed { revoking: false, .. }));
    }

    #[test]
    fn rollback_and_expiry() {
        let mut overlay = Overlay::default();
        overlay.add_pending(pending(1, 50));
        overlay.add_pending(pending(2, 0));
        overlay.mark_revoking(Address::repeat_byte(3));

        overlay.prune_expired(60);
        assert_eq!(overlay.pending(), &[pending(2, 0)]);

        overlay.remove_pending(Address::repeat_byte(2));
        overlay.unmark_revoking(Address::repeat_byte(3));
        assert_eq!(overlay, Overlay::default());
    }
}
