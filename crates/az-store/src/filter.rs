//! Pure filter, sort, and column-mapping pipeline for the board.
//!
//! Filters compose left to right with AND semantics; an empty filter set is
//! a pass-through. All sorts are stable so equal keys keep input order.

use std::collections::{BTreeSet, HashMap};

use az_core::types::{BeadId, BeadStatus, IssueType, Priority, SessionState, Timestamp};

use crate::bead::Bead;

/// Sortable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    /// Session state: Waiting > Busy > Paused > Error > Done > Idle
    Session,
    /// P0 first
    #[default]
    Priority,
    /// Newest `updated_at` first
    Updated,
}

impl SortField {
    /// All fields in menu order.
    pub fn all() -> [Self; 3] {
        [Self::Session, Self::Priority, Self::Updated]
    }

    /// Menu label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::Priority => "Priority",
            Self::Updated => "Updated",
        }
    }
}

/// The complete filter state applied to the bead snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    /// Empty = pass-through
    pub statuses: BTreeSet<BeadStatus>,
    pub priorities: BTreeSet<Priority>,
    pub types: BTreeSet<IssueType>,
    /// Evaluated against the session table; missing entry = Idle
    pub session_states: BTreeSet<SessionState>,
    /// Drop beads that have a parent
    pub hide_epic_children: bool,
    /// Retain only beads untouched for more than N days
    pub min_age_days: Option<u32>,
    /// Case-insensitive substring against title and id
    pub query: String,
}

impl FilterState {
    /// Returns true if every filter is at its pass-through value.
    pub fn is_clear(&self) -> bool {
        self.statuses.is_empty()
            && self.priorities.is_empty()
            && self.types.is_empty()
            && self.session_states.is_empty()
            && !self.hide_epic_children
            && self.min_age_days.is_none()
            && self.query.is_empty()
    }

    /// Reset every filter. After this, `is_clear()` holds.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Toggle a status in the status filter set.
    pub fn toggle_status(&mut self, status: BeadStatus) {
        if !self.statuses.remove(&status) {
            self.statuses.insert(status);
        }
    }

    /// Toggle a priority in the priority filter set.
    pub fn toggle_priority(&mut self, priority: Priority) {
        if !self.priorities.remove(&priority) {
            self.priorities.insert(priority);
        }
    }

    /// Toggle an issue type in the type filter set.
    pub fn toggle_type(&mut self, issue_type: IssueType) {
        if !self.types.remove(&issue_type) {
            self.types.insert(issue_type);
        }
    }

    /// Toggle a session state in the session filter set.
    pub fn toggle_session_state(&mut self, state: SessionState) {
        if !self.session_states.remove(&state) {
            self.session_states.insert(state);
        }
    }

    /// Count of active (non-pass-through) filters, for the status line.
    pub fn active_count(&self) -> usize {
        let mut n = 0;
        if !self.statuses.is_empty() {
            n += 1;
        }
        if !self.priorities.is_empty() {
            n += 1;
        }
        if !self.types.is_empty() {
            n += 1;
        }
        if !self.session_states.is_empty() {
            n += 1;
        }
        if self.hide_epic_children {
            n += 1;
        }
        if self.min_age_days.is_some() {
            n += 1;
        }
        if !self.query.is_empty() {
            n += 1;
        }
        n
    }
}

/// Apply the filter pipeline. `sessions` maps bead id to session state; a
/// missing entry is treated as Idle.
pub fn apply_filters<'a>(
    beads: &'a [Bead],
    filters: &FilterState,
    sessions: &HashMap<BeadId, SessionState>,
    now: Timestamp,
) -> Vec<&'a Bead> {
    beads
        .iter()
        .filter(|b| filters.statuses.is_empty() || filters.statuses.contains(&b.status))
        .filter(|b| filters.priorities.is_empty() || filters.priorities.contains(&b.priority))
        .filter(|b| filters.types.is_empty() || filters.types.contains(&b.issue_type))
        .filter(|b| {
            if filters.session_states.is_empty() {
                return true;
            }
            let state = sessions.get(&b.id).copied().unwrap_or_default();
            filters.session_states.contains(&state)
        })
        .filter(|b| !(filters.hide_epic_children && b.has_parent()))
        .filter(|b| match filters.min_age_days {
            Some(days) => now.signed_duration_since(b.updated_at).num_days() > i64::from(days),
            None => true,
        })
        .filter(|b| b.matches_query(&filters.query))
        .collect()
}

/// Stable sort by the given field. Idempotent: sorting a sorted list again
/// yields the same order.
pub fn apply_sort<'a>(
    mut beads: Vec<&'a Bead>,
    field: SortField,
    sessions: &HashMap<BeadId, SessionState>,
) -> Vec<&'a Bead> {
    match field {
        SortField::Session => beads.sort_by_key(|b| {
            let state = sessions.get(&b.id).copied().unwrap_or_default();
            std::cmp::Reverse(state.sort_weight())
        }),
        SortField::Priority => beads.sort_by_key(|b| b.priority),
        SortField::Updated => beads.sort_by_key(|b| std::cmp::Reverse(b.updated_at)),
    }
    beads
}

/// Split a filtered, sorted view into the four board columns.
pub fn columns<'a>(view: &[&'a Bead]) -> [Vec<&'a Bead>; 4] {
    let mut cols: [Vec<&Bead>; 4] = Default::default();
    for bead in view {
        cols[bead.status.column()].push(bead);
    }
    cols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bead::test_support::bead;
    use chrono::{Duration, TimeZone, Utc};

    fn fixed_now() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn sample() -> Vec<Bead> {
        let mut b1 = bead("az-1", "alpha", BeadStatus::Open);
        b1.priority = Priority::P0;
        let mut b2 = bead("az-2", "beta", BeadStatus::InProgress);
        b2.priority = Priority::P2;
        b2.parent = Some("az-9".into());
        let mut b3 = bead("az-3", "gamma", BeadStatus::Review);
        b3.priority = Priority::P0;
        b3.issue_type = IssueType::Bug;
        let b4 = bead("az-4", "delta", BeadStatus::Done);
        vec![b1, b2, b3, b4]
    }

    #[test]
    fn test_empty_filters_pass_everything() {
        let beads = sample();
        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        assert_eq!(view.len(), beads.len());
    }

    #[test]
    fn test_status_filter() {
        let beads = sample();
        let mut filters = FilterState::default();
        filters.toggle_status(BeadStatus::Open);
        filters.toggle_status(BeadStatus::Done);
        let view = apply_filters(&beads, &filters, &HashMap::new(), fixed_now());
        assert_eq!(
            view.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["az-1", "az-4"]
        );
    }

    #[test]
    fn test_filters_and_compose() {
        let beads = sample();
        let mut filters = FilterState::default();
        filters.toggle_priority(Priority::P0);
        filters.toggle_type(IssueType::Bug);
        let view = apply_filters(&beads, &filters, &HashMap::new(), fixed_now());
        // P0 AND Bug leaves only az-3
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "az-3");
    }

    #[test]
    fn test_session_state_filter_missing_is_idle() {
        let beads = sample();
        let mut sessions = HashMap::new();
        sessions.insert("az-2".to_string(), SessionState::Busy);

        let mut filters = FilterState::default();
        filters.toggle_session_state(SessionState::Idle);
        let view = apply_filters(&beads, &filters, &sessions, fixed_now());
        // Every bead but az-2 has no entry and therefore counts as Idle
        assert_eq!(view.len(), 3);
        assert!(view.iter().all(|b| b.id != "az-2"));
    }

    #[test]
    fn test_hide_epic_children() {
        let beads = sample();
        let filters = FilterState {
            hide_epic_children: true,
            ..Default::default()
        };
        let view = apply_filters(&beads, &filters, &HashMap::new(), fixed_now());
        assert!(view.iter().all(|b| !b.has_parent()));
    }

    #[test]
    fn test_age_filter() {
        let mut beads = sample();
        beads[0].updated_at = fixed_now() - Duration::days(10);
        beads[1].updated_at = fixed_now() - Duration::days(1);

        let filters = FilterState {
            min_age_days: Some(5),
            ..Default::default()
        };
        let view = apply_filters(&beads, &filters, &HashMap::new(), fixed_now());
        assert_eq!(view.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), ["az-1"]);
    }

    #[test]
    fn test_search_query() {
        let beads = sample();
        let filters = FilterState {
            query: "GAM".into(),
            ..Default::default()
        };
        let view = apply_filters(&beads, &filters, &HashMap::new(), fixed_now());
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "az-3");
    }

    #[test]
    fn test_toggle_twice_restores_filter_state() {
        let mut filters = FilterState::default();
        let before = filters.clone();
        filters.toggle_status(BeadStatus::Open);
        filters.toggle_status(BeadStatus::Open);
        assert_eq!(filters, before);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut filters = FilterState {
            hide_epic_children: true,
            min_age_days: Some(3),
            query: "x".into(),
            ..Default::default()
        };
        filters.toggle_status(BeadStatus::Open);
        filters.toggle_session_state(SessionState::Busy);
        filters.clear();
        assert!(filters.is_clear());
        assert!(!filters.hide_epic_children);
    }

    #[test]
    fn test_priority_sort_stable() {
        let beads = sample();
        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        let sorted = apply_sort(view, SortField::Priority, &HashMap::new());
        // az-1 and az-3 are both P0; input order preserved
        assert_eq!(
            sorted.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["az-1", "az-3", "az-2", "az-4"]
        );
    }

    #[test]
    fn test_sort_idempotent() {
        let beads = sample();
        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        let once = apply_sort(view.clone(), SortField::Priority, &HashMap::new());
        let twice = apply_sort(once.clone(), SortField::Priority, &HashMap::new());
        let once_ids: Vec<_> = once.iter().map(|b| &b.id).collect();
        let twice_ids: Vec<_> = twice.iter().map(|b| &b.id).collect();
        assert_eq!(once_ids, twice_ids);
    }

    #[test]
    fn test_session_sort_order() {
        let beads = sample();
        let mut sessions = HashMap::new();
        sessions.insert("az-1".to_string(), SessionState::Done);
        sessions.insert("az-2".to_string(), SessionState::Waiting);
        sessions.insert("az-3".to_string(), SessionState::Busy);
        // az-4 missing -> Idle, sorts last

        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        let sorted = apply_sort(view, SortField::Session, &sessions);
        assert_eq!(
            sorted.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            ["az-2", "az-3", "az-1", "az-4"]
        );
    }

    #[test]
    fn test_updated_sort_newest_first() {
        let mut beads = sample();
        beads[3].updated_at = fixed_now();
        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        let sorted = apply_sort(view, SortField::Updated, &HashMap::new());
        assert_eq!(sorted[0].id, "az-4");
    }

    #[test]
    fn test_columns_by_status() {
        let beads = sample();
        let view = apply_filters(&beads, &FilterState::default(), &HashMap::new(), fixed_now());
        let cols = columns(&view);
        assert_eq!(cols[0].len(), 1);
        assert_eq!(cols[1].len(), 1);
        assert_eq!(cols[2].len(), 1);
        assert_eq!(cols[3].len(), 1);
        assert_eq!(cols[2][0].id, "az-3");
    }

    #[test]
    fn test_active_count() {
        let mut filters = FilterState::default();
        assert_eq!(filters.active_count(), 0);
        filters.toggle_status(BeadStatus::Open);
        filters.query = "x".into();
        filters.hide_epic_children = true;
        assert_eq!(filters.active_count(), 3);
    }
}
