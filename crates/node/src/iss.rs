//! Inconsistent state signature (ISS) detection.
//!
//! Every node reports the hash of each round it handled. Honest nodes that
//! handled the same input must report the same hash; a supermajority of vote
//! power agreeing on a hash different from ours means this node diverged.

use concord_types::{Hash, NodeId, RoundNumber, VotePower};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, error, warn};

/// Vote power configuration for ISS detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssConfig {
    /// This node's vote power.
    pub own_weight: u64,
    /// Vote power of the whole network.
    pub total_weight: u64,
    /// Rounds kept while waiting for peer reports.
    pub retained_rounds: u64,
}

impl Default for IssConfig {
    fn default() -> Self {
        Self {
            own_weight: 1,
            total_weight: 1,
            retained_rounds: 256,
        }
    }
}

/// Verdict on one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssStatus {
    /// Not enough vote power reported yet.
    Pending,
    /// A supermajority agrees with our hash.
    Agreed(Hash),
    /// A supermajority agrees on a hash that is not ours.
    SelfIss { ours: Hash, network: Hash },
    /// No hash can reach a supermajority any more.
    Catastrophic,
}

#[derive(Debug, Default)]
struct RoundVotes {
    own: Option<Hash>,
    voters: HashMap<NodeId, Hash>,
    weight_by_hash: HashMap<Hash, u64>,
    reported_weight: u64,
    decided: Option<IssStatus>,
}

/// Collects round hashes from this node and its peers.
#[derive(Debug)]
pub struct IssDetector {
    own_id: NodeId,
    config: IssConfig,
    rounds: BTreeMap<RoundNumber, RoundVotes>,
}

impl IssDetector {
    pub fn new(own_id: NodeId, config: IssConfig) -> Self {
        Self {
            own_id,
            config,
            rounds: BTreeMap::new(),
        }
    }

    /// Record the hash this node computed for `round`.
    pub fn record_own(&mut self, round: RoundNumber, hash: Hash) -> IssStatus {
        self.prune(round);
        let weight = VotePower::new(self.config.own_weight).get();
        let votes = self.rounds.entry(round).or_default();
        votes.own = Some(hash);
        Self::add_vote(votes, self.own_id, hash, weight);
        self.evaluate(round)
    }

    /// Record the hash a peer reported for `round`.
    ///
    /// Only the first report of each peer counts.
    pub fn report(
        &mut self,
        node: NodeId,
        round: RoundNumber,
        hash: Hash,
        weight: VotePower,
    ) -> IssStatus {
        if self.is_pruned(round) {
            debug!(node = %node.0, round = round.0, "Ignoring report for pruned round");
            return IssStatus::Pending;
        }
        let votes = self.rounds.entry(round).or_default();
        if let Some(previous) = votes.voters.get(&node) {
            if *previous != hash {
                warn!(node = %node.0, round = round.0, "Peer reported conflicting round hashes");
            }
            return self.evaluate(round);
        }
        Self::add_vote(votes, node, hash, weight.get());
        self.evaluate(round)
    }

    /// Current verdict on `round`.
    pub fn status(&self, round: RoundNumber) -> IssStatus {
        self.rounds
            .get(&round)
            .and_then(|votes| votes.decided)
            .unwrap_or(IssStatus::Pending)
    }

    fn add_vote(votes: &mut RoundVotes, node: NodeId, hash: Hash, weight: u64) {
        votes.voters.insert(node, hash);
        *votes.weight_by_hash.entry(hash).or_default() += weight;
        votes.reported_weight += weight;
    }

    fn evaluate(&mut self, round: RoundNumber) -> IssStatus {
        let total = self.config.total_weight;
        let Some(votes) = self.rounds.get_mut(&round) else {
            return IssStatus::Pending;
        };
        if let Some(decided) = votes.decided {
            return decided;
        }

        let leader = votes
            .weight_by_hash
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(hash, weight)| (*hash, *weight));
        let Some((network, weight)) = leader else {
            return IssStatus::Pending;
        };

        let status = if VotePower::has_quorum(weight, total) {
            match votes.own {
                Some(ours) if ours != network => IssStatus::SelfIss { ours, network },
                Some(_) => IssStatus::Agreed(network),
                // Wait for our own hash before judging.
                None => return IssStatus::Pending,
            }
        } else {
            let unreported = total.saturating_sub(votes.reported_weight);
            if VotePower::has_quorum(weight.saturating_add(unreported), total) {
                return IssStatus::Pending;
            }
            IssStatus::Catastrophic
        };

        match status {
            IssStatus::SelfIss { ours, network } => {
                error!(round = round.0, %ours, %network, "Self ISS: this node diverged");
            }
            IssStatus::Catastrophic => {
                error!(round = round.0, "Catastrophic ISS: no round hash can reach a supermajority");
            }
            _ => debug!(round = round.0, "Round hash agreed"),
        }
        votes.decided = Some(status);
        status
    }

    fn is_pruned(&self, round: RoundNumber) -> bool {
        self.rounds
            .last_key_value()
            .is_some_and(|(newest, _)| round.0 + self.config.retained_rounds < newest.0)
    }

    fn prune(&mut self, newest: RoundNumber) {
        let keep_from = RoundNumber(newest.0.saturating_sub(self.config.retained_rounds));
        self.rounds = self.rounds.split_off(&keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn detector(total_weight: u64) -> IssDetector {
        IssDetector::new(
            NodeId(0),
            IssConfig {
                own_weight: 1,
                total_weight,
                retained_rounds: 4,
            },
        )
    }

    fn hash(tag: &str) -> Hash {
        Hash::from_bytes(tag.as_bytes())
    }

    #[test]
    fn test_single_node_agrees_with_itself() {
        let mut iss = detector(1);
        assert_eq!(
            iss.record_own(RoundNumber(1), hash("a")),
            IssStatus::Agreed(hash("a"))
        );
    }

    #[test]
    fn test_agreement_needs_supermajority() {
        let mut iss = detector(4);
        let round = RoundNumber(1);

        assert_eq!(iss.record_own(round, hash("a")), IssStatus::Pending);
        assert_eq!(
            iss.report(NodeId(1), round, hash("a"), VotePower::new(1)),
            IssStatus::Pending
        );
        assert_eq!(
            iss.report(NodeId(2), round, hash("a"), VotePower::new(1)),
            IssStatus::Agreed(hash("a"))
        );
        assert_eq!(iss.status(round), IssStatus::Agreed(hash("a")));
    }

    #[traced_test]
    #[test]
    fn test_self_iss() {
        let mut iss = detector(4);
        let round = RoundNumber(1);

        iss.report(NodeId(1), round, hash("b"), VotePower::new(1));
        iss.report(NodeId(2), round, hash("b"), VotePower::new(1));
        iss.report(NodeId(3), round, hash("b"), VotePower::new(1));
        assert_eq!(
            iss.record_own(round, hash("a")),
            IssStatus::SelfIss {
                ours: hash("a"),
                network: hash("b")
            }
        );
        assert!(logs_contain("Self ISS"));
    }

    #[test]
    fn test_catastrophic_split() {
        let mut iss = detector(4);
        let round = RoundNumber(1);

        iss.record_own(round, hash("a"));
        iss.report(NodeId(1), round, hash("a"), VotePower::new(1));
        iss.report(NodeId(2), round, hash("b"), VotePower::new(1));
        assert_eq!(
            iss.report(NodeId(3), round, hash("b"), VotePower::new(1)),
            IssStatus::Catastrophic
        );
    }

    #[test]
    fn test_repeated_reports_count_once() {
        let mut iss = detector(4);
        let round = RoundNumber(1);

        iss.record_own(round, hash("a"));
        for _ in 0..3 {
            assert_eq!(
                iss.report(NodeId(1), round, hash("a"), VotePower::new(1)),
                IssStatus::Pending
            );
        }
    }

    #[test]
    fn test_old_rounds_are_pruned() {
        let mut iss = detector(4);
        iss.record_own(RoundNumber(1), hash("a"));
        iss.record_own(RoundNumber(10), hash("a"));

        assert_eq!(
            iss.report(NodeId(1), RoundNumber(1), hash("a"), VotePower::new(3)),
            IssStatus::Pending
        );
        assert!(!iss.rounds.contains_key(&RoundNumber(1)));
    }
}
