//! Edge detection between the persisted state and a cycle's observations.

use tracing::debug;

use crate::domain::{Facet, Observation, TrackedKey};
use crate::notification::events::{EdgeEvent, Transition};
use crate::state::AlertState;

/// Facets whose state is tracked at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetToggles {
    pub availability: bool,
    pub open_box: bool,
}

impl Default for FacetToggles {
    fn default() -> Self {
        Self {
            availability: true,
            open_box: true,
        }
    }
}

impl FacetToggles {
    pub fn is_enabled(&self, facet: Facet) -> bool {
        match facet {
            Facet::Availability => self.availability,
            Facet::OpenBox => self.open_box,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = Facet> + '_ {
        Facet::ALL.into_iter().filter(|f| self.is_enabled(*f))
    }
}

/// Result of diffing one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleDiff {
    pub events: Vec<EdgeEvent>,
    /// State to persist once the cycle completes.
    pub next_state: AlertState,
}

/// Turns level observations into edge events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    facets: FacetToggles,
}

impl ChangeDetector {
    pub fn new(facets: FacetToggles) -> Self {
        Self { facets }
    }

    pub fn facets(&self) -> FacetToggles {
        self.facets
    }

    /// Diff `batch` against `previous`.
    ///
    /// `batch` holds one observation per (subject, store) pair, keyed by any
    /// facet of that pair; each enabled facet is evaluated from it. Absent keys
    /// count as `false`. Keys not observed this cycle carry forward; keys of
    /// disabled facets are dropped. Events come out in batch order,
    /// availability before open-box.
    pub fn detect<'a, I>(&self, previous: &AlertState, batch: I) -> CycleDiff
    where
        I: IntoIterator<Item = (&'a TrackedKey, &'a Observation)>,
    {
        let mut next_state: AlertState = previous
            .iter()
            .filter(|(key, _)| self.facets.is_enabled(key.facet))
            .map(|(key, value)| (key.clone(), *value))
            .collect();
        let mut events = Vec::new();

        for (pair_key, observation) in batch {
            for facet in self.facets.enabled() {
                let key = pair_key.with_facet(facet);
                let was = previous.get(&key).copied().unwrap_or(false);
                let now = observation.is_true(facet);

                if was != now {
                    let transition = if now {
                        Transition::BecameTrue
                    } else {
                        Transition::BecameFalse
                    };
                    debug!(key = %key, transition = %transition, "Detected transition");
                    events.push(EdgeEvent::new(key.clone(), transition, *observation));
                }
                next_state.insert(key, now);
            }
        }

        CycleDiff { events, next_state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(subject: &str, store: &str) -> TrackedKey {
        TrackedKey::availability(subject, store)
    }

    fn run(
        detector: &ChangeDetector,
        previous: &AlertState,
        batch: &[(TrackedKey, Observation)],
    ) -> CycleDiff {
        detector.detect(previous, batch.iter().map(|(k, o)| (k, o)))
    }

    #[test]
    fn test_false_to_true_fires_once() {
        let detector = ChangeDetector::default();
        let batch = [(pair("P", "S1"), Observation::in_stock(Some(5)))];

        let first = run(&detector, &AlertState::new(), &batch);
        assert_eq!(first.events.len(), 1);
        let event = &first.events[0];
        assert_eq!(event.key, TrackedKey::availability("P", "S1"));
        assert_eq!(event.transition, Transition::BecameTrue);
        assert_eq!(event.quantity(), Some(5));
        assert_eq!(first.next_state.get(&event.key), Some(&true));
        assert_eq!(
            first.next_state.get(&TrackedKey::open_box("P", "S1")),
            Some(&false)
        );

        // Identical observation: no new events.
        let second = run(&detector, &first.next_state, &batch);
        assert!(second.events.is_empty());
        assert_eq!(second.next_state, first.next_state);
    }

    #[test]
    fn test_true_to_false() {
        let detector = ChangeDetector::default();
        let previous = AlertState::from([(TrackedKey::availability("P", "S1"), true)]);
        let diff = run(&detector, &previous, &[(pair("P", "S1"), Observation::unavailable())]);

        assert_eq!(diff.events.len(), 1);
        assert_eq!(diff.events[0].transition, Transition::BecameFalse);
        assert_eq!(
            diff.next_state.get(&TrackedKey::availability("P", "S1")),
            Some(&false)
        );
    }

    #[test]
    fn test_quantity_change_alone_is_silent() {
        let detector = ChangeDetector::default();
        let previous = AlertState::from([
            (TrackedKey::availability("P", "S1"), true),
            (TrackedKey::open_box("P", "S1"), false),
        ]);
        let diff = run(&detector, &previous, &[(pair("P", "S1"), Observation::in_stock(Some(9)))]);
        assert!(diff.events.is_empty());
    }

    #[test]
    fn test_disabled_facet_removed_and_silent() {
        let detector = ChangeDetector::new(FacetToggles {
            availability: true,
            open_box: false,
        });
        let previous = AlertState::from([
            (TrackedKey::open_box("P", "S1"), true),
            (TrackedKey::open_box("Q", "S9"), true),
        ]);
        let obs = Observation::unavailable().with_open_box(Some(1));
        let diff = run(&detector, &previous, &[(pair("P", "S1"), obs)]);

        assert!(diff.events.is_empty());
        assert!(!diff.next_state.contains_key(&TrackedKey::open_box("P", "S1")));
        assert!(!diff.next_state.contains_key(&TrackedKey::open_box("Q", "S9")));
        assert_eq!(
            diff.next_state.get(&TrackedKey::availability("P", "S1")),
            Some(&false)
        );
    }

    #[test]
    fn test_unobserved_keys_carry_forward() {
        let detector = ChangeDetector::default();
        let previous = AlertState::from([(TrackedKey::availability("Q", "S2"), true)]);
        let diff = run(&detector, &previous, &[(pair("P", "S1"), Observation::unavailable())]);

        assert!(diff.events.is_empty());
        assert_eq!(
            diff.next_state.get(&TrackedKey::availability("Q", "S2")),
            Some(&true)
        );
    }

    #[test]
    fn test_facets_are_independent() {
        let detector = ChangeDetector::default();
        let previous = AlertState::from([(TrackedKey::availability("P", "S1"), true)]);
        let obs = Observation::in_stock(None).with_open_box(Some(2));
        let diff = run(&detector, &previous, &[(pair("P", "S1"), obs)]);

        assert_eq!(diff.events.len(), 1);
        assert_eq!(diff.events[0].key, TrackedKey::open_box("P", "S1"));
        assert_eq!(diff.events[0].quantity(), Some(2));
    }
}
