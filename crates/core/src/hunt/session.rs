use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::geo::LatLon;
use crate::domain::quest::StopId;
use crate::errors::DomainError;

/// Per-conversation hunt progress for one calendar day.
///
/// `collected`, `skipped` and `ignored` are kept pairwise disjoint by every
/// mutator; [`HuntSession::check_invariants`] verifies it after the fact.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HuntSession {
    pub hunt_date: Option<NaiveDate>,
    pub user_location: Option<LatLon>,
    pub collected: BTreeSet<StopId>,
    /// Deferred stops in the order they were skipped.
    pub skipped: Vec<StopId>,
    pub ignored: BTreeSet<StopId>,
    pub is_hunting: bool,
}

impl HuntSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops yesterday's progress when `today` differs from the stamped date,
    /// then stamps `today`. Returns whether anything was reset.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        let stale = self.hunt_date.is_some_and(|date| date != today);
        if stale {
            self.reset();
        }
        self.hunt_date = Some(today);
        stale
    }

    /// Forgets collected, skipped and ignored stops along with the date stamp.
    pub fn reset(&mut self) {
        self.collected.clear();
        self.skipped.clear();
        self.ignored.clear();
        self.hunt_date = None;
    }

    /// A hunt can be resumed only on the day it was started and while it is
    /// still flagged active.
    pub fn is_resumable(&self, today: NaiveDate) -> bool {
        self.is_hunting && self.hunt_date == Some(today)
    }

    pub fn begin(&mut self, start: LatLon) {
        self.user_location = Some(start);
        self.is_hunting = true;
    }

    pub fn finish(&mut self) {
        self.is_hunting = false;
    }

    /// Records a visit. The hunt continues from `location` when the quest is
    /// still known, otherwise from where the user was before.
    pub fn mark_collected(&mut self, stop_id: &StopId, location: Option<LatLon>) {
        self.skipped.retain(|skipped| skipped != stop_id);
        self.ignored.remove(stop_id);
        self.collected.insert(stop_id.clone());
        if let Some(location) = location {
            self.user_location = Some(location);
        }
    }

    /// Defers a stop. Returns `false` when the stop is already terminal or
    /// already deferred.
    pub fn skip(&mut self, stop_id: &StopId) -> bool {
        if self.collected.contains(stop_id)
            || self.ignored.contains(stop_id)
            || self.skipped.contains(stop_id)
        {
            return false;
        }
        self.skipped.push(stop_id.clone());
        true
    }

    pub fn ignore(&mut self, stop_id: &StopId) -> bool {
        if self.collected.contains(stop_id) {
            return false;
        }
        self.skipped.retain(|skipped| skipped != stop_id);
        self.ignored.insert(stop_id.clone())
    }

    /// Moves every deferred stop back into the active queue. Returns how many
    /// were released.
    pub fn enqueue_skipped(&mut self) -> usize {
        let released = self.skipped.len();
        self.skipped.clear();
        released
    }

    pub fn is_skipped(&self, stop_id: &StopId) -> bool {
        self.skipped.contains(stop_id)
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        let mut seen_skipped = BTreeSet::new();
        for stop_id in &self.skipped {
            if !seen_skipped.insert(stop_id) {
                return Err(violation(format!("stop {stop_id} skipped twice")));
            }
            if self.collected.contains(stop_id) {
                return Err(violation(format!("stop {stop_id} both skipped and collected")));
            }
            if self.ignored.contains(stop_id) {
                return Err(violation(format!("stop {stop_id} both skipped and ignored")));
            }
        }
        if let Some(stop_id) = self.collected.intersection(&self.ignored).next() {
            return Err(violation(format!("stop {stop_id} both collected and ignored")));
        }
        Ok(())
    }
}

fn violation(message: String) -> DomainError {
    error!(event_name = "hunt.invariant_violation", detail = %message, "hunt session out of sync");
    DomainError::InvariantViolation(message)
}
