//! Lineage reconstruction
//!
//! Turns a flat, unordered set of decrypted messages into the linear branch
//! shown to the user. Regenerated answers are siblings that share a parent;
//! the branch records them as versions of a single slot.
//!
//! Reconstruction is a pure function of its input: the same messages and the
//! same target leaf always produce the same branch.
//!
//! # Parent repair
//!
//! Legacy records carry no `parent_id`. After sorting by creation time, a
//! single left-to-right pass assigns one:
//!
//! - the first message becomes a root
//! - a message with the same role as its predecessor is a sibling of it and
//!   inherits the predecessor's (already repaired) parent
//! - otherwise the predecessor itself is the parent
//!
//! The pass is local and can misattribute lineage when three or more
//! same-role messages interleave with branching. Such runs are counted in the
//! [`RepairReport`] and logged rather than reinterpreted.

use crate::messages::{Message, MessageVersion};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One position in a branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSlot {
    /// The message displayed at this position
    pub message: Message,
    /// All sibling versions, empty when the slot was never regenerated
    pub versions: Vec<MessageVersion>,
    /// Index of `message` within `versions`
    pub current_version_index: usize,
}

impl BranchSlot {
    /// Whether this slot has more than one version
    pub fn has_versions(&self) -> bool {
        self.versions.len() > 1
    }
}

/// Ordered path from the conversation root to the selected leaf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Slots from root to leaf
    pub slots: Vec<BranchSlot>,
}

impl Branch {
    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the branch is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Displayed messages in order
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.slots.iter().map(|slot| &slot.message)
    }

    /// Id of the last message in the branch
    pub fn leaf_id(&self) -> Option<&str> {
        self.slots.last().map(|slot| slot.message.id.as_str())
    }

    /// Id of version `version_index` at `slot_index`, if both exist
    pub fn version_id(&self, slot_index: usize, version_index: usize) -> Option<&str> {
        self.slots
            .get(slot_index)?
            .versions
            .get(version_index)
            .map(|v| v.id.as_str())
    }
}

/// Diagnostics from the parent repair pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Messages whose parent was inferred
    pub inferred: usize,
    /// Messages whose stored parent was not in the set and was inferred instead
    pub orphans: usize,
    /// Runs of three or more consecutive same-role inferred messages
    pub ambiguous_runs: usize,
}

/// Sorts messages chronologically and fills in missing parents
///
/// Ties on `created_at` are broken by id so that the result does not depend
/// on input order. A stored parent that does not resolve to a message in the
/// set is treated as missing.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use pqsync::lineage::repair_parents;
/// use pqsync::messages::{Message, Role};
///
/// let t = |s| Utc.timestamp_opt(s, 0).unwrap();
/// let msgs = vec![
///     Message::new("a", Role::User, "hi", None, t(1)),
///     Message::new("b", Role::Assistant, "hello", None, t(2)),
///     Message::new("c", Role::Assistant, "hey", None, t(3)),
/// ];
/// let (repaired, _) = repair_parents(&msgs);
/// assert_eq!(repaired[0].parent_id, None);
/// assert_eq!(repaired[1].parent_id.as_deref(), Some("a"));
/// assert_eq!(repaired[2].parent_id.as_deref(), Some("a"));
/// ```
pub fn repair_parents(messages: &[Message]) -> (Vec<Message>, RepairReport) {
    let mut sorted: Vec<Message> = messages.to_vec();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let known: HashSet<String> = sorted.iter().map(|m| m.id.clone()).collect();
    let mut report = RepairReport::default();
    let mut same_role_run = 0usize;

    for i in 0..sorted.len() {
        let stored = sorted[i].parent_id.clone();
        let dangling = matches!(&stored, Some(p) if !known.contains(p) || *p == sorted[i].id);
        if stored.is_some() && !dangling {
            same_role_run = 0;
            continue;
        }
        if dangling {
            report.orphans += 1;
        }
        report.inferred += 1;

        if i == 0 {
            sorted[i].parent_id = None;
            same_role_run = 1;
            continue;
        }

        let (prev_id, prev_role, prev_parent) = {
            let prev = &sorted[i - 1];
            (prev.id.clone(), prev.role, prev.parent_id.clone())
        };

        if prev_role == sorted[i].role {
            sorted[i].parent_id = prev_parent;
            same_role_run += 1;
            if same_role_run == 3 {
                report.ambiguous_runs += 1;
            }
        } else {
            sorted[i].parent_id = Some(prev_id);
            same_role_run = 1;
        }
    }

    if report.orphans > 0 {
        tracing::warn!(
            "{} message(s) referenced a parent outside the conversation; lineage was inferred",
            report.orphans
        );
    }
    if report.ambiguous_runs > 0 {
        tracing::warn!(
            "{} run(s) of 3+ same-role messages without stored parents; inferred versions may be inaccurate",
            report.ambiguous_runs
        );
    }

    (sorted, report)
}

/// Reconstructs the branch ending at `target_leaf`, or the newest branch
///
/// At every level the child on the target leaf's ancestor chain is chosen;
/// without a target (or when no child lies on the chain) the chronologically
/// last child is chosen, so the default view shows the newest regeneration.
pub fn build_branch(messages: &[Message], target_leaf: Option<&str>) -> Branch {
    let (sorted, report) = repair_parents(messages);
    tracing::debug!(
        "Reconstructing branch from {} messages ({} parents inferred)",
        sorted.len(),
        report.inferred
    );

    let index_by_id: HashMap<&str, usize> = sorted
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id.as_str(), i))
        .collect();

    let mut children: HashMap<Option<&str>, Vec<usize>> = HashMap::new();
    for (i, msg) in sorted.iter().enumerate() {
        children.entry(msg.parent_id.as_deref()).or_default().push(i);
    }

    let on_path = target_leaf
        .map(|leaf| ancestor_chain(&sorted, &index_by_id, leaf))
        .unwrap_or_default();

    let mut slots = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut parent: Option<&str> = None;

    while let Some(siblings) = children.get(&parent) {
        let selected = siblings
            .iter()
            .copied()
            .find(|i| on_path.contains(i))
            .or_else(|| siblings.last().copied());
        let Some(selected) = selected else {
            break;
        };
        if !visited.insert(selected) {
            break;
        }

        let (versions, current_version_index) = if siblings.len() > 1 {
            let versions = siblings
                .iter()
                .map(|&i| MessageVersion::from(&sorted[i]))
                .collect();
            let position = siblings.iter().position(|&i| i == selected).unwrap_or(0);
            (versions, position)
        } else {
            (Vec::new(), 0)
        };

        slots.push(BranchSlot {
            message: sorted[selected].clone(),
            versions,
            current_version_index,
        });
        parent = Some(sorted[selected].id.as_str());
    }

    Branch { slots }
}

/// Indices of `leaf` and all of its ancestors
fn ancestor_chain(sorted: &[Message], index_by_id: &HashMap<&str, usize>, leaf: &str) -> HashSet<usize> {
    let mut chain = HashSet::new();
    let mut current = index_by_id.get(leaf).copied();

    while let Some(i) = current {
        if !chain.insert(i) {
            break;
        }
        current = sorted[i]
            .parent_id
            .as_deref()
            .and_then(|p| index_by_id.get(p).copied());
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn msg(id: &str, role: Role, secs: i64, parent: Option<&str>) -> Message {
        Message::new(id, role, format!("content of {}", id), parent.map(String::from), t(secs))
    }

    fn ids(branch: &Branch) -> Vec<&str> {
        branch.messages().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn test_repair_sibling_assistant_replies() {
        let msgs = vec![
            msg("c", Role::Assistant, 3, None),
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
        ];
        let (repaired, report) = repair_parents(&msgs);
        let parents: Vec<_> = repaired
            .iter()
            .map(|m| (m.id.as_str(), m.parent_id.as_deref()))
            .collect();
        assert_eq!(parents, vec![("a", None), ("b", Some("a")), ("c", Some("a"))]);
        assert_eq!(report.inferred, 3);
        assert_eq!(report.ambiguous_runs, 0);
    }

    #[test]
    fn test_default_branch_selects_newest_version() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
        ];
        let branch = build_branch(&msgs, None);

        assert_eq!(ids(&branch), vec!["a", "c"]);
        let slot = &branch.slots[1];
        let version_ids: Vec<_> = slot.versions.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(version_ids, vec!["b", "c"]);
        assert_eq!(slot.current_version_index, 1);
        assert!(branch.slots[0].versions.is_empty());
    }

    #[test]
    fn test_target_leaf_selects_older_version() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
        ];
        let branch = build_branch(&msgs, Some("b"));
        assert_eq!(ids(&branch), vec!["a", "b"]);
        assert_eq!(branch.slots[1].current_version_index, 0);
    }

    #[test]
    fn test_explicit_parents_deep_branch() {
        // a -> b -> d -> f
        //   -> c -> e
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, Some("a")),
            msg("c", Role::Assistant, 3, Some("a")),
            msg("d", Role::User, 4, Some("b")),
            msg("e", Role::User, 5, Some("c")),
            msg("f", Role::Assistant, 6, Some("d")),
        ];

        assert_eq!(ids(&build_branch(&msgs, None)), vec!["a", "c", "e"]);

        let targeted = build_branch(&msgs, Some("f"));
        assert_eq!(ids(&targeted), vec!["a", "b", "d", "f"]);
        assert_eq!(targeted.slots[1].current_version_index, 0);
        assert_eq!(targeted.slots[1].versions.len(), 2);
    }

    #[test]
    fn test_target_on_middle_node_continues_with_latest_descendant() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, Some("a")),
            msg("c", Role::User, 3, Some("b")),
            msg("d", Role::Assistant, 4, Some("c")),
            msg("d2", Role::Assistant, 5, Some("c")),
        ];
        let branch = build_branch(&msgs, Some("b"));
        assert_eq!(ids(&branch), vec!["a", "b", "c", "d2"]);
    }

    #[test]
    fn test_unknown_target_falls_back_to_latest() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
        ];
        assert_eq!(ids(&build_branch(&msgs, Some("zzz"))), vec!["a", "c"]);
    }

    #[test]
    fn test_reconstruction_is_idempotent() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
            msg("d", Role::User, 4, None),
            msg("e", Role::Assistant, 5, None),
        ];
        let first = build_branch(&msgs, Some("b"));
        let second = build_branch(&msgs, Some("b"));
        assert_eq!(first, second);

        let mut shuffled = msgs.clone();
        shuffled.reverse();
        assert_eq!(build_branch(&shuffled, Some("b")), first);
    }

    #[test]
    fn test_orphan_parent_is_inferred() {
        let msgs = vec![
            msg("a", Role::User, 1, Some("deleted")),
            msg("b", Role::Assistant, 2, Some("a")),
        ];
        let (repaired, report) = repair_parents(&msgs);
        assert_eq!(repaired[0].parent_id, None);
        assert_eq!(report.orphans, 1);
        assert_eq!(ids(&build_branch(&msgs, None)), vec!["a", "b"]);
    }

    #[test]
    fn test_long_same_role_run_is_reported() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
            msg("d", Role::Assistant, 4, None),
        ];
        let (repaired, report) = repair_parents(&msgs);
        assert!(repaired[1..].iter().all(|m| m.parent_id.as_deref() == Some("a")));
        assert_eq!(report.ambiguous_runs, 1);
    }

    #[test]
    fn test_parentless_first_messages_with_same_role_are_root_siblings() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("a2", Role::User, 2, None),
            msg("b", Role::Assistant, 3, None),
        ];
        let branch = build_branch(&msgs, None);
        assert_eq!(ids(&branch), vec!["a2", "b"]);
        assert_eq!(branch.slots[0].versions.len(), 2);
        assert_eq!(branch.slots[0].current_version_index, 1);
    }

    #[test]
    fn test_every_branch_parent_resolves() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::User, 3, Some("b")),
            msg("x", Role::Assistant, 4, Some("ghost")),
        ];
        let branch = build_branch(&msgs, None);
        let mut seen: HashSet<&str> = HashSet::new();
        for m in branch.messages() {
            match m.parent_id.as_deref() {
                None => assert!(seen.is_empty()),
                Some(p) => assert!(seen.contains(p)),
            }
            seen.insert(m.id.as_str());
        }
    }

    #[test]
    fn test_empty_input() {
        let branch = build_branch(&[], None);
        assert!(branch.is_empty());
        assert!(branch.leaf_id().is_none());
    }

    #[test]
    fn test_version_id_lookup() {
        let msgs = vec![
            msg("a", Role::User, 1, None),
            msg("b", Role::Assistant, 2, None),
            msg("c", Role::Assistant, 3, None),
        ];
        let branch = build_branch(&msgs, None);
        assert_eq!(branch.version_id(1, 0), Some("b"));
        assert_eq!(branch.version_id(1, 5), None);
        assert_eq!(branch.version_id(0, 0), None);
    }
}
