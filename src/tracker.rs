//! Rising-edge detection of watched SKUs entering a valid availability state.

use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};

use crate::parser::SkuStateMap;

/// One watched SKU that just became available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub sku: u64,
    pub availability: String,
    pub raw_payload: String,
    pub timestamp: DateTime<Local>,
}

impl TransitionEvent {
    /// Short `sku=… availability=…` form used in logs and email subjects.
    #[must_use]
    pub fn detail(&self) -> String {
        format!("sku={} availability={}", self.sku, self.availability)
    }
}

/// Last observed state of every watched SKU; `None` means unknown or absent
/// from the latest payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastSeenState {
    states: BTreeMap<u64, Option<String>>,
}

impl LastSeenState {
    /// Starts every watched SKU as unknown.
    #[must_use]
    pub fn new(watch_skus: &BTreeSet<u64>) -> Self {
        Self {
            states: watch_skus.iter().map(|sku| (*sku, None)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, sku: u64) -> Option<&str> {
        self.states.get(&sku).and_then(Option::as_deref)
    }

    /// Compares `current` against the stored states and returns the SKUs that
    /// moved from a non-valid (or unknown) state into a valid one, paired with
    /// their new state. Every watched SKU's stored state is then replaced by
    /// what `current` says, including `None` for SKUs missing from it.
    pub fn advance(
        &mut self,
        watch_skus: &BTreeSet<u64>,
        valid_states: &BTreeSet<String>,
        current: &SkuStateMap,
    ) -> Vec<(u64, String)> {
        let is_valid = |state: Option<&str>| state.is_some_and(|s| valid_states.contains(s));

        let mut became_available = Vec::new();
        for &sku in watch_skus {
            let new = current.get(&sku).cloned();
            let old = self.states.get(&sku).cloned().flatten();

            if let Some(state) = &new
                && valid_states.contains(state)
                && !is_valid(old.as_deref())
            {
                became_available.push((sku, state.clone()));
            }

            self.states.insert(sku, new);
        }
        became_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skus(ids: &[u64]) -> BTreeSet<u64> {
        ids.iter().copied().collect()
    }

    fn states(valid: &[&str]) -> BTreeSet<String> {
        valid.iter().map(|s| (*s).to_string()).collect()
    }

    fn poll(pairs: &[(u64, &str)]) -> SkuStateMap {
        pairs.iter().map(|(sku, s)| (*sku, (*s).to_string())).collect()
    }

    #[test]
    fn test_new_tracker_starts_unknown() {
        let tracker = LastSeenState::new(&skus(&[1, 2]));
        assert_eq!(tracker.get(1), None);
        assert_eq!(tracker.get(2), None);
    }

    #[test]
    fn test_rising_edge_fires_once_and_rearms_after_disappearing() {
        let watch = skus(&[100]);
        let valid = states(&["in_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        let fired = tracker.advance(&watch, &valid, &poll(&[(100, "in_stock")]));
        assert_eq!(fired, vec![(100, "in_stock".to_string())]);

        let fired = tracker.advance(&watch, &valid, &poll(&[(100, "in_stock")]));
        assert!(fired.is_empty());

        let fired = tracker.advance(&watch, &valid, &poll(&[]));
        assert!(fired.is_empty());
        assert_eq!(tracker.get(100), None);

        let fired = tracker.advance(&watch, &valid, &poll(&[(100, "in_stock")]));
        assert_eq!(fired, vec![(100, "in_stock".to_string())]);
    }

    #[test]
    fn test_independent_skus_fire_in_same_poll() {
        let watch = skus(&[1, 2, 3]);
        let valid = states(&["in_stock", "low_on_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        let mut fired = tracker.advance(
            &watch,
            &valid,
            &poll(&[(1, "in_stock"), (2, "low_on_stock"), (3, "out_of_stock")]),
        );
        fired.sort_unstable();
        assert_eq!(
            fired,
            vec![(1, "in_stock".to_string()), (2, "low_on_stock".to_string())]
        );
        assert_eq!(tracker.get(3), Some("out_of_stock"));
    }

    #[test]
    fn test_non_valid_states_never_fire() {
        let watch = skus(&[7]);
        let valid = states(&["in_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        for state in ["out_of_stock", "coming_soon", "out_of_stock", "back_soon"] {
            assert!(tracker.advance(&watch, &valid, &poll(&[(7, state)])).is_empty());
        }
        assert_eq!(tracker.get(7), Some("back_soon"));
    }

    #[test]
    fn test_moving_between_valid_states_does_not_fire() {
        let watch = skus(&[7]);
        let valid = states(&["in_stock", "low_on_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        assert_eq!(tracker.advance(&watch, &valid, &poll(&[(7, "in_stock")])).len(), 1);
        assert!(tracker.advance(&watch, &valid, &poll(&[(7, "low_on_stock")])).is_empty());
        assert_eq!(tracker.get(7), Some("low_on_stock"));
    }

    #[test]
    fn test_unwatched_skus_are_ignored() {
        let watch = skus(&[1]);
        let valid = states(&["in_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        let fired = tracker.advance(&watch, &valid, &poll(&[(2, "in_stock")]));
        assert!(fired.is_empty());
        assert_eq!(tracker.get(2), None);
    }

    #[test]
    fn test_falling_then_rising_fires_again() {
        let watch = skus(&[5]);
        let valid = states(&["in_stock"]);
        let mut tracker = LastSeenState::new(&watch);

        assert_eq!(tracker.advance(&watch, &valid, &poll(&[(5, "in_stock")])).len(), 1);
        assert!(tracker.advance(&watch, &valid, &poll(&[(5, "out_of_stock")])).is_empty());
        assert_eq!(tracker.advance(&watch, &valid, &poll(&[(5, "in_stock")])).len(), 1);
    }

    #[test]
    fn test_event_detail_format() {
        let event = TransitionEvent {
            sku: 100,
            availability: "in_stock".into(),
            raw_payload: String::new(),
            timestamp: Local::now(),
        };
        assert_eq!(event.detail(), "sku=100 availability=in_stock");
    }
}
