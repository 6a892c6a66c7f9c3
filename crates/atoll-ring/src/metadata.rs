//! Ring snapshot: host → token → status, plus the replication stage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use atoll_types::{HostId, Token};

use crate::stage::ReplicationStage;

/// Per-token marker during a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    /// Token is active in the current ring.
    Normal,

    /// Token is joining: owned by the post-transition ring only.
    Pending,

    /// Token is exiting: owned by the pre-transition ring only.
    Leaving,
}

/// A ring, or a transition between two rings.
///
/// Immutable value: the `with_*` transforms return a new snapshot, and the
/// only thing that crosses process boundaries is the mutation produced by
/// [`as_mutation`](crate::RingMutation::install) /
/// [`stage mutations`](crate::RingMutation::set_stage).
///
/// A snapshot with any `Pending` or `Leaving` token is *transitional* and
/// describes both rings at once; [`old_ring`](Self::old_ring) and
/// [`new_ring`](Self::new_ring) collapse it to either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    entries: BTreeMap<HostId, BTreeMap<Token, TokenStatus>>,
    stage: ReplicationStage,
}

impl TokenMetadata {
    /// An empty ring at stage `UseOnlyOld`.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            stage: ReplicationStage::UseOnlyOld,
        }
    }

    /// Hosts owning at least one token.
    pub fn members(&self) -> BTreeSet<HostId> {
        self.entries
            .iter()
            .filter(|(_, tokens)| !tokens.is_empty())
            .map(|(host, _)| *host)
            .collect()
    }

    /// All tokens of a host, regardless of status.
    pub fn tokens_of(&self, host: HostId) -> BTreeSet<Token> {
        self.entries
            .get(&host)
            .map(|tokens| tokens.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Status of one token of a host.
    pub fn status_of(&self, host: HostId, token: Token) -> Option<TokenStatus> {
        self.entries.get(&host).and_then(|tokens| tokens.get(&token)).copied()
    }

    /// The current replication stage.
    pub fn stage(&self) -> ReplicationStage {
        self.stage
    }

    /// True if any token is `Pending` or `Leaving`.
    pub fn is_transitional(&self) -> bool {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .any(|status| *status != TokenStatus::Normal)
    }

    /// Returns a snapshot with the given tokens set for `host` at `status`.
    ///
    /// Existing tokens of the host not in `tokens` keep their assignment;
    /// overlapping tokens are overwritten.
    pub fn with_tokens(
        mut self,
        host: HostId,
        tokens: impl IntoIterator<Item = Token>,
        status: TokenStatus,
    ) -> Self {
        let entry = self.entries.entry(host).or_default();
        for token in tokens {
            entry.insert(token, status);
        }
        self
    }

    /// Returns a snapshot at the given replication stage.
    pub fn with_stage(mut self, stage: ReplicationStage) -> Self {
        self.stage = stage;
        self
    }

    /// The pre-transition ring: `Leaving` tokens become `Normal`, `Pending`
    /// tokens are removed. Stage is `UseOnlyOld`.
    pub fn old_ring(&self) -> Self {
        self.collapse(|status| match status {
            TokenStatus::Normal | TokenStatus::Leaving => Some(TokenStatus::Normal),
            TokenStatus::Pending => None,
        })
    }

    /// The post-transition ring: `Pending` tokens become `Normal`, `Leaving`
    /// tokens are removed. Stage is `UseOnlyOld`.
    pub fn new_ring(&self) -> Self {
        self.collapse(|status| match status {
            TokenStatus::Normal | TokenStatus::Pending => Some(TokenStatus::Normal),
            TokenStatus::Leaving => None,
        })
    }

    fn collapse(&self, map: impl Fn(TokenStatus) -> Option<TokenStatus>) -> Self {
        let mut entries: BTreeMap<HostId, BTreeMap<Token, TokenStatus>> = BTreeMap::new();
        for (host, tokens) in &self.entries {
            let kept: BTreeMap<Token, TokenStatus> = tokens
                .iter()
                .filter_map(|(token, status)| map(*status).map(|s| (*token, s)))
                .collect();
            if !kept.is_empty() {
                entries.insert(*host, kept);
            }
        }
        Self {
            entries,
            stage: ReplicationStage::UseOnlyOld,
        }
    }
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn host(n: u128) -> HostId {
        HostId::from(Uuid::from_u128(n))
    }

    fn tokens(values: &[i64]) -> Vec<Token> {
        values.iter().copied().map(Token::new).collect()
    }

    /// {A: normal, B: normal, C: leaving, D: pending} - the transitional
    /// ring of a combined decommission(C) after an add(D).
    fn transitional() -> TokenMetadata {
        TokenMetadata::new()
            .with_tokens(host(1), tokens(&[10, 20]), TokenStatus::Normal)
            .with_tokens(host(2), tokens(&[30]), TokenStatus::Normal)
            .with_tokens(host(3), tokens(&[40, 50]), TokenStatus::Leaving)
            .with_tokens(host(4), tokens(&[60]), TokenStatus::Pending)
    }

    #[test]
    fn members_skips_hosts_without_tokens() {
        let ring = transitional();
        let members = ring.members();
        assert_eq!(members.len(), 4);
        assert!(members.contains(&host(4)));
    }

    #[test]
    fn old_ring_drops_pending_and_normalizes_leaving() {
        let old = transitional().with_stage(ReplicationStage::WriteBothReadNew).old_ring();

        assert!(!old.members().contains(&host(4)));
        assert_eq!(old.status_of(host(3), Token::new(40)), Some(TokenStatus::Normal));
        assert_eq!(old.stage(), ReplicationStage::UseOnlyOld);
        assert!(!old.is_transitional());
    }

    #[test]
    fn new_ring_drops_leaving_and_normalizes_pending() {
        let new = transitional().new_ring();

        assert!(!new.members().contains(&host(3)));
        assert_eq!(new.status_of(host(4), Token::new(60)), Some(TokenStatus::Normal));
        assert_eq!(new.stage(), ReplicationStage::UseOnlyOld);
        assert!(!new.is_transitional());
    }

    #[test]
    fn non_transitional_ring_collapses_to_itself() {
        let ring = TokenMetadata::new()
            .with_tokens(host(1), tokens(&[1, 2]), TokenStatus::Normal)
            .with_tokens(host(2), tokens(&[3]), TokenStatus::Normal);
        assert_eq!(ring.old_ring(), ring);
        assert_eq!(ring.new_ring(), ring);
    }

    #[test]
    fn with_tokens_overwrites_overlapping_assignments() {
        let ring = TokenMetadata::new()
            .with_tokens(host(1), tokens(&[10]), TokenStatus::Normal)
            .with_tokens(host(1), tokens(&[10]), TokenStatus::Leaving);
        assert_eq!(ring.status_of(host(1), Token::new(10)), Some(TokenStatus::Leaving));
        assert_eq!(ring.tokens_of(host(1)).len(), 1);
    }

    #[test]
    fn replace_shape_keeps_token_set_on_both_sides() {
        // Replace: old host's tokens leaving, same tokens pending on new.
        let ring = TokenMetadata::new()
            .with_tokens(host(1), tokens(&[10, 20]), TokenStatus::Leaving)
            .with_tokens(host(2), tokens(&[10, 20]), TokenStatus::Pending);

        assert_eq!(ring.old_ring().tokens_of(host(1)), ring.new_ring().tokens_of(host(2)));
        assert!(ring.old_ring().tokens_of(host(2)).is_empty());
        assert!(ring.new_ring().tokens_of(host(1)).is_empty());
    }
}
