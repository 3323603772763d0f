//! Connection protection and trimming.

use crate::{Error, PeerId, Result};

use tokio::time::{Duration, Instant};
use tracing::debug;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Decides which connections may be closed to keep the connection count bounded.
///
/// Protection is tracked per peer and per tag: a peer stays protected as long as at least one
/// tag is registered for it. A tag may be registered before any connection to the peer exists.
pub trait ConnManager: Send + Sync {
    fn protect(&self, peer: &PeerId, tag: &str);

    /// Removes `tag` and returns whether the peer is still protected by another tag.
    fn unprotect(&self, peer: &PeerId, tag: &str) -> bool;

    /// Whether `peer` is protected by `tag`, or by any tag when `tag` is `None`.
    fn is_protected(&self, peer: &PeerId, tag: Option<&str>) -> bool;
}

/// Watermark based connection manager.
///
/// Once more than `high_water` connections are live, unprotected connections older than the
/// grace period are selected for closing, oldest first, until `low_water` remain.
#[derive(Debug)]
pub struct BasicConnManager {
    low_water: usize,
    high_water: usize,
    grace_period: Duration,
    protected: Mutex<HashMap<PeerId, HashSet<String>>>,
}

impl BasicConnManager {
    pub fn new(low_water: usize, high_water: usize, grace_period: Duration) -> Result<Self> {
        if high_water == 0 || low_water > high_water {
            return Err(Error::HostConstructionFailed {
                stage: "connection manager",
                source: format!(
                    "invalid watermarks: low {} must not exceed high {} (high > 0)",
                    low_water, high_water
                )
                .into(),
            });
        }
        Ok(BasicConnManager {
            low_water,
            high_water,
            grace_period,
            protected: Mutex::new(HashMap::new()),
        })
    }

    /// Picks the peers whose connections should be closed, given every live connection and
    /// when it was opened.
    pub fn select_for_trim(&self, live: &[(PeerId, Instant)], now: Instant) -> Vec<PeerId> {
        if live.len() <= self.high_water {
            return vec![];
        }
        let excess = live.len() - self.low_water;
        let protected = self.lock();
        let mut candidates: Vec<&(PeerId, Instant)> = live
            .iter()
            .filter(|(peer, _)| !protected.contains_key(peer))
            .filter(|(_, opened)| now.saturating_duration_since(*opened) >= self.grace_period)
            .collect();
        candidates.sort_by_key(|(_, opened)| *opened);
        let victims: Vec<PeerId> = candidates.into_iter().take(excess).map(|(p, _)| *p).collect();
        debug!("trimming {} of {} connections", victims.len(), live.len());
        victims
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, HashSet<String>>> {
        // the map is always left consistent, so a poisoned lock is still usable
        self.protected.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConnManager for BasicConnManager {
    fn protect(&self, peer: &PeerId, tag: &str) {
        self.lock().entry(*peer).or_insert_with(HashSet::new).insert(tag.to_owned());
    }

    fn unprotect(&self, peer: &PeerId, tag: &str) -> bool {
        let mut protected = self.lock();
        match protected.get_mut(peer) {
            Some(tags) => {
                tags.remove(tag);
                if tags.is_empty() {
                    protected.remove(peer);
                    false
                } else {
                    true
                }
            }
            None => false,
        }
    }

    fn is_protected(&self, peer: &PeerId, tag: Option<&str>) -> bool {
        match (self.lock().get(peer), tag) {
            (Some(tags), Some(tag)) => tags.contains(tag),
            (Some(tags), None) => !tags.is_empty(),
            (None, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(low: usize, high: usize) -> BasicConnManager {
        BasicConnManager::new(low, high, Duration::from_secs(0)).unwrap()
    }

    #[test]
    fn invalid_watermarks_are_rejected() {
        assert!(BasicConnManager::new(10, 5, Duration::from_secs(1)).is_err());
        assert!(BasicConnManager::new(0, 0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn tags_protect_independently() {
        let cm = manager(1, 2);
        let peer = PeerId::generate();
        cm.protect(&peer, "a");
        cm.protect(&peer, "b");
        assert!(cm.is_protected(&peer, Some("a")));

        assert!(cm.unprotect(&peer, "a"));
        assert!(!cm.is_protected(&peer, Some("a")));
        assert!(cm.is_protected(&peer, None));

        assert!(!cm.unprotect(&peer, "b"));
        assert!(!cm.is_protected(&peer, None));
    }

    #[test]
    fn unprotecting_unknown_tag_is_harmless() {
        let cm = manager(1, 2);
        let peer = PeerId::generate();
        assert!(!cm.unprotect(&peer, "never-set"));
    }

    #[test]
    fn nothing_is_trimmed_below_high_water() {
        let cm = manager(1, 3);
        let now = Instant::now();
        let live: Vec<_> = (0..3).map(|_| (PeerId::generate(), now)).collect();
        assert!(cm.select_for_trim(&live, now).is_empty());
    }

    #[test]
    fn oldest_unprotected_connections_are_trimmed_to_low_water() {
        let cm = manager(2, 3);
        let now = Instant::now();
        let live: Vec<_> = (0..5u64)
            .map(|age| (PeerId::generate(), now - Duration::from_secs(10 - age)))
            .collect();
        cm.protect(&live[0].0, "in-flight");

        let victims = cm.select_for_trim(&live, now);
        // oldest is protected, so the next three oldest go
        assert_eq!(victims, vec![live[1].0, live[2].0, live[3].0]);
    }

    #[test]
    fn protection_registered_before_connecting_covers_the_connection() {
        let cm = manager(0, 1);
        let now = Instant::now();
        let peer = PeerId::generate();
        cm.protect(&peer, "pre-emptive");

        let live = vec![(peer, now), (PeerId::generate(), now)];
        let victims = cm.select_for_trim(&live, now);
        assert!(!victims.contains(&peer));
        assert_eq!(victims.len(), 1);
    }

    #[test]
    fn young_connections_are_spared() {
        let cm = BasicConnManager::new(0, 1, Duration::from_secs(60)).unwrap();
        let now = Instant::now();
        let live = vec![(PeerId::generate(), now), (PeerId::generate(), now)];
        assert!(cm.select_for_trim(&live, now).is_empty());
    }
}
