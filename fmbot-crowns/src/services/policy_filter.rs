//! Guild policy filter
//!
//! Pure functions deciding which roster members may appear on a guild's
//! leaderboards and which may hold crowns. Each rule applies on its own;
//! a member must pass every rule of the requested scope.

use crate::types::{BlockScope, GuildMember, GuildPolicy, LeaderboardEntry, UserId};
use chrono::{DateTime, Utc};
use fmbot_common::time::days_before;
use serde::Serialize;
use std::collections::HashSet;

/// Why a member was filtered out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Not seen within the guild activity threshold
    Inactive,
    /// Not seen within the crown activity threshold
    CrownInactive,
    /// On the block-list for the requested scope
    Blocked,
    /// Guild restricts crowns to whitelisted roles and the member has none
    MissingWhitelistRole,
}

/// First rule the member fails, if any
pub fn exclusion_reason(
    member: &GuildMember,
    policy: &GuildPolicy,
    scope: BlockScope,
    now: DateTime<Utc>,
) -> Option<ExclusionReason> {
    if !seen_within(member.last_message, policy.activity_threshold_days, now) {
        return Some(ExclusionReason::Inactive);
    }

    if policy.blocked_user_ids(scope).contains(&member.user_id) {
        return Some(ExclusionReason::Blocked);
    }

    if scope == BlockScope::Crowns {
        if !seen_within(member.last_message, policy.crown_activity_threshold_days, now) {
            return Some(ExclusionReason::CrownInactive);
        }

        if !policy.crown_whitelist_role_ids.is_empty()
            && !member
                .role_ids
                .iter()
                .any(|role| policy.crown_whitelist_role_ids.contains(role))
        {
            return Some(ExclusionReason::MissingWhitelistRole);
        }
    }

    None
}

/// `true` when no threshold is set, or the member was seen on/after the cutoff
fn seen_within(
    last_message: Option<DateTime<Utc>>,
    threshold_days: Option<i64>,
    now: DateTime<Utc>,
) -> bool {
    match threshold_days {
        None => true,
        Some(days) => {
            let cutoff = days_before(now, days);
            matches!(last_message, Some(seen) if seen >= cutoff)
        }
    }
}

/// Members eligible for the given scope, roster order preserved
pub fn filter_members(
    members: &[GuildMember],
    policy: &GuildPolicy,
    scope: BlockScope,
    now: DateTime<Utc>,
) -> Vec<GuildMember> {
    members
        .iter()
        .filter(|member| exclusion_reason(member, policy, scope, now).is_none())
        .cloned()
        .collect()
}

/// Ids of members who may hold crowns
pub fn crown_eligible_user_ids(
    members: &[GuildMember],
    policy: &GuildPolicy,
    now: DateTime<Utc>,
) -> HashSet<UserId> {
    members
        .iter()
        .filter(|member| exclusion_reason(member, policy, BlockScope::Crowns, now).is_none())
        .map(|member| member.user_id)
        .collect()
}

/// Leaderboard rows whose user may hold crowns, ranking preserved
pub fn crown_eligible_entries(
    entries: &[LeaderboardEntry],
    members: &[GuildMember],
    policy: &GuildPolicy,
    now: DateTime<Utc>,
) -> Vec<LeaderboardEntry> {
    let eligible = crown_eligible_user_ids(members, policy, now);
    entries
        .iter()
        .filter(|entry| entry.user_id.is_some_and(|id| eligible.contains(&id)))
        .cloned()
        .collect()
}
