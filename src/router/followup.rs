use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Roles a user mentioned most recently
#[derive(Debug, Clone)]
struct FollowUpState {
    role_ids: Vec<String>,
    last_activity: DateTime<Utc>,
}

/// Per-user memory of the last mentioned roles, used to route media-only
/// messages that follow a role mention.
///
/// Entries are never evicted; staleness is checked on lookup. Each hit slides
/// the window forward.
pub struct FollowUpCorrelator {
    window: Duration,
    states: HashMap<u64, FollowUpState>,
}

impl FollowUpCorrelator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            states: HashMap::new(),
        }
    }

    /// Replace the user's remembered roles
    pub fn record_mention(&mut self, user_id: u64, role_ids: Vec<String>, now: DateTime<Utc>) {
        self.states.insert(
            user_id,
            FollowUpState {
                role_ids,
                last_activity: now,
            },
        );
    }

    /// Roles to use for a follow-up message, if the user's last mention is
    /// still within the window
    pub fn try_correlate(&mut self, user_id: u64, now: DateTime<Utc>) -> Option<Vec<String>> {
        let state = self.states.get_mut(&user_id)?;
        if now - state.last_activity > self.window {
            return None;
        }
        state.last_activity = now;
        Some(state.role_ids.clone())
    }
}
