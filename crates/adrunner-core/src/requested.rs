//! Registry of ads currently in play.
//!
//! Every ad the resolver selects is marked here so later selection steps
//! skip it. A registry is normally scoped to one waterfall run; clones share
//! the same underlying set so it can also be injected across runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::model::{AdId, AdReference, Chain};

#[derive(Debug, Clone, Default)]
pub struct RequestedAdSet {
    ids: Arc<Mutex<HashSet<AdId>>>,
}

impl RequestedAdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `ad` as requested. Returns `false` if it already was.
    pub fn mark(&self, ad: &AdReference) -> bool {
        self.lock().insert(ad.id().clone())
    }

    /// Release `ad`. Returns `false` if it was not marked.
    pub fn unmark(&self, ad: &AdReference) -> bool {
        self.lock().remove(ad.id())
    }

    pub fn contains(&self, ad: &AdReference) -> bool {
        self.lock().contains(ad.id())
    }

    /// Release every ad referenced by `chain`.
    pub fn release_chain(&self, chain: &Chain) {
        let mut ids = self.lock();
        for ad in chain.ads() {
            ids.remove(ad.id());
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<AdId>> {
        // A poisoned set is still a valid set.
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AdEntry, ChainLink, InlineAd};

    fn ad(id: &str) -> AdReference {
        AdReference::from(AdEntry {
            id: Some(id.to_string()),
            inline: Some(InlineAd::default()),
            ..Default::default()
        })
    }

    #[test]
    fn test_mark_and_unmark() {
        let set = RequestedAdSet::new();
        let a = ad("a");
        assert!(set.mark(&a));
        assert!(!set.mark(&a));
        assert!(set.contains(&a));
        assert!(set.unmark(&a));
        assert!(!set.contains(&a));
        assert!(set.is_empty());
    }

    #[test]
    fn test_clones_share_state() {
        let set = RequestedAdSet::new();
        let shared = set.clone();
        set.mark(&ad("a"));
        assert!(shared.contains(&ad("a")));
    }

    #[test]
    fn test_release_chain_unmarks_every_link() {
        let set = RequestedAdSet::new();
        let mut chain = Chain::new();
        for id in ["a", "b"] {
            let mut link = ChainLink::new(id);
            link.ad = Some(ad(id));
            set.mark(link.ad.as_ref().unwrap());
            chain.push_head(link);
        }
        set.mark(&ad("unrelated"));
        set.release_chain(&chain);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&ad("unrelated")));
    }
}
