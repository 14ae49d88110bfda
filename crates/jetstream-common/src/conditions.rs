//! Condition ledger for Stream status
//!
//! Conditions are kept as an ordered list with at most one entry per type.
//! `lastTransitionTime` only moves when a condition's status flips, so a
//! stream that fails repeatedly with different messages keeps the time it
//! first became unhealthy.

use crate::crd::{Condition, ConditionStatus, StreamStatus, READY_CONDITION};

/// Reason recorded when a reconcile fails
pub const REASON_ERRORED: &str = "Errored";
/// Reason recorded after a stream is created
pub const REASON_CREATED: &str = "Created";
/// Reason recorded after a stream is updated
pub const REASON_UPDATED: &str = "Updated";

/// Insert or replace a condition by type
///
/// - same type and status: reason and message are replaced, the original
///   transition time is kept
/// - same type, different status: the entry is replaced wholesale
/// - no entry of that type: the condition is appended
///
/// Other entries keep their position.
pub fn upsert_condition(conditions: &[Condition], new: Condition) -> Vec<Condition> {
    let mut out = conditions.to_vec();
    match out.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) if existing.status == new.status => {
            existing.reason = new.reason;
            existing.message = new.message;
        }
        Some(existing) => *existing = new,
        None => out.push(new),
    }
    out
}

/// Build a `Ready=True` condition
pub fn ready_condition(reason: impl Into<String>, message: impl Into<String>) -> Condition {
    Condition::new(READY_CONDITION, ConditionStatus::True, reason, message)
}

/// Build a `Ready=False` condition with reason `Errored`
pub fn errored_condition(message: impl Into<String>) -> Condition {
    Condition::new(
        READY_CONDITION,
        ConditionStatus::False,
        REASON_ERRORED,
        message,
    )
}

impl StreamStatus {
    /// Status after a successful apply of `generation`
    ///
    /// The observed generation never moves backwards, even if a stale
    /// generation is passed in.
    pub fn ready(
        &self,
        generation: i64,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> StreamStatus {
        StreamStatus {
            observed_generation: self.observed_generation.max(generation),
            conditions: upsert_condition(&self.conditions, ready_condition(reason, message)),
        }
    }

    /// Status after a failed reconcile; the observed generation is unchanged
    pub fn errored(&self, message: impl Into<String>) -> StreamStatus {
        StreamStatus {
            observed_generation: self.observed_generation,
            conditions: upsert_condition(&self.conditions, errored_condition(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn aged(mut c: Condition, secs: i64) -> Condition {
        c.last_transition_time = Utc::now() - Duration::seconds(secs);
        c
    }

    // ==========================================================================
    // Story Tests: Ready Condition Across Reconciles
    // ==========================================================================

    /// Story: Repeated failures keep the time the stream first went unhealthy
    #[test]
    fn story_same_status_keeps_transition_time() {
        let first = aged(errored_condition("connection refused"), 60);
        let original_time = first.last_transition_time;

        let out = upsert_condition(&[first], errored_condition("timeout"));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message, "timeout");
        assert_eq!(out[0].last_transition_time, original_time);
    }

    /// Story: Recovery flips the status and moves the transition time
    #[test]
    fn story_status_flip_replaces_entry() {
        let failed = aged(errored_condition("connection refused"), 60);
        let original_time = failed.last_transition_time;

        let out = upsert_condition(&[failed], ready_condition(REASON_CREATED, "created"));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, ConditionStatus::True);
        assert_eq!(out[0].reason, REASON_CREATED);
        assert!(out[0].last_transition_time > original_time);
    }

    /// Story: Unrelated conditions keep their place
    #[test]
    fn story_unrelated_conditions_keep_order() {
        let other_a = Condition::new("Synced", ConditionStatus::True, "A", "a");
        let ready = errored_condition("boom");
        let other_b = Condition::new("Healthy", ConditionStatus::Unknown, "B", "b");
        let existing = vec![other_a, ready, other_b];

        let out = upsert_condition(&existing, ready_condition(REASON_UPDATED, "updated"));

        let types: Vec<&str> = out.iter().map(|c| c.type_.as_str()).collect();
        assert_eq!(types, vec!["Synced", "Ready", "Healthy"]);
        assert_eq!(out[0], existing[0]);
        assert_eq!(out[2], existing[2]);
        assert_eq!(out[1].reason, REASON_UPDATED);
    }

    #[test]
    fn test_absent_type_appends() {
        let existing = vec![Condition::new("Synced", ConditionStatus::True, "A", "a")];
        let out = upsert_condition(&existing, errored_condition("boom"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].type_, READY_CONDITION);
    }

    #[test]
    fn test_ready_sets_observed_generation() {
        let status = StreamStatus::default().ready(3, REASON_CREATED, "created");
        assert_eq!(status.observed_generation, 3);
        assert_eq!(
            status.condition(READY_CONDITION).map(|c| &c.status),
            Some(&ConditionStatus::True)
        );
    }

    #[test]
    fn test_observed_generation_never_decreases() {
        let status = StreamStatus {
            observed_generation: 5,
            conditions: vec![],
        };
        assert_eq!(status.ready(4, REASON_UPDATED, "").observed_generation, 5);
    }

    #[test]
    fn test_errored_keeps_generation() {
        let status = StreamStatus::default()
            .ready(2, REASON_CREATED, "created")
            .errored("failed to update stream");

        assert_eq!(status.observed_generation, 2);
        let ready = status.condition(READY_CONDITION).unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert_eq!(ready.reason, REASON_ERRORED);
        assert_eq!(ready.message, "failed to update stream");
    }
}
