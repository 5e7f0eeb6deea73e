use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;

/// Whether the owner has only claimed ownership or has presented its view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    #[default]
    Claiming,
    Active,
}

/// The single host-wide record of which application owns "active" status.
///
/// There is never more than one of these. "No owner" is the empty record
/// returned by [`OwnershipRecord::default`], not the absence of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipRecord {
    pub owner_identity: String,
    pub liveness_token: Option<String>,
    pub close_requested: bool,
    pub state: ClaimState,
    pub pid: Option<u32>,
    pub heartbeat_at: Option<DateTime<Utc>>,
}

impl OwnershipRecord {
    /// A fresh claim written by `identity`. Identity and token always travel
    /// together in one write.
    pub fn claim(
        identity: &str,
        liveness_token: String,
        state: ClaimState,
        now: DateTime<Utc>,
    ) -> Self {
        OwnershipRecord {
            owner_identity: identity.to_string(),
            liveness_token: Some(liveness_token),
            close_requested: false,
            state,
            pid: Some(std::process::id()),
            heartbeat_at: Some(now),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owner_identity.is_empty()
    }

    /// True if the record still carries the claim identified by `identity`
    /// and `token`
    pub fn is_held_by(&self, identity: &str, token: &str) -> bool {
        !self.is_empty()
            && self.owner_identity == identity
            && self.liveness_token.as_deref() == Some(token)
    }

    /// True if the owner has not refreshed its heartbeat within `stale_after`.
    ///
    /// With no policy (`None`) an owner is never considered stale and only
    /// `will_close` releases it.
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Option<Duration>) -> bool {
        let Some(stale_after) = stale_after else {
            return false;
        };
        let Some(heartbeat_at) = self.heartbeat_at else {
            return !self.is_empty();
        };
        let stale_after = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
        now - heartbeat_at > stale_after
    }
}
