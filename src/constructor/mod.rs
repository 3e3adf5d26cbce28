//! Forward exploration of the belief-support MDP of a parity model.

pub(crate) mod queue;

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

use log::debug;

use crate::mdp::{Belief, BeliefIndex, BeliefSuppMdp};
use crate::pomdp::{ObsIndex, StateIndex};
use crate::product::ParityModel;
use crate::{Error, Interrupt};
use queue::ExplorationQueue;

/// Statistics of a belief-space exploration.
#[derive(Debug, Default, Clone)]
pub(crate) struct ExplorationStats {
    beliefs: usize,
    edges: usize,
    time: Duration,
}

impl ExplorationStats {
    pub(crate) fn beliefs(&self) -> usize {
        self.beliefs
    }

    pub(crate) fn edges(&self) -> usize {
        self.edges
    }

    pub(crate) fn time(&self) -> Duration {
        self.time
    }
}

impl fmt::Display for ExplorationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|B| = {}, |E| = {}, exploration time: {:.2}",
            self.beliefs(),
            self.edges(),
            self.time().as_secs_f32(),
        )
    }
}

/// Explores the reachable belief supports of a model and assembles the
/// belief-support MDP.
pub(crate) struct MdpConstructor<'a, M, Q> {
    model: &'a M,
    queue: Q,
    beliefs: Vec<Belief>,
    index: HashMap<Belief, BeliefIndex>,
    trans: Vec<Vec<Vec<BeliefIndex>>>,
    stats: ExplorationStats,
}

impl<'a, M: ParityModel, Q: ExplorationQueue<BeliefIndex>> MdpConstructor<'a, M, Q> {
    pub(crate) fn new(model: &'a M, queue: Q) -> Self {
        let initial: Belief = model.initial_support().into_iter().collect();
        let mut constructor = Self {
            model,
            queue,
            beliefs: Vec::with_capacity(4096),
            index: HashMap::with_capacity(4096),
            trans: Vec::with_capacity(4096),
            stats: ExplorationStats::default(),
        };
        let (initial_index, _) = constructor.add_belief(initial);
        constructor.queue.push(initial_index);
        constructor
    }

    fn add_belief(&mut self, belief: Belief) -> (BeliefIndex, bool) {
        match self.index.entry(belief) {
            Entry::Occupied(entry) => (*entry.get(), false),
            Entry::Vacant(entry) => {
                let index = self.beliefs.len();
                self.beliefs.push(entry.key().clone());
                self.trans.push(vec![Vec::new(); self.model.num_actions()]);
                entry.insert(index);
                (index, true)
            }
        }
    }

    /// Explores until no undiscovered belief remains. For each popped
    /// belief and action the product successors are partitioned by
    /// observation; every non-empty cell becomes one successor belief.
    pub(crate) fn explore(&mut self, interrupt: &Interrupt) -> Result<(), Error> {
        let start = Instant::now();
        let mut explored_edges = 0;
        while let Some(belief_index) = self.queue.pop() {
            interrupt.check()?;
            let belief = self.beliefs[belief_index].clone();
            for a in 0..self.model.num_actions() {
                let mut posterior: BTreeMap<ObsIndex, BTreeSet<StateIndex>> = BTreeMap::new();
                for &state in &belief {
                    for &((successor, obs), p) in self.model.transitions(state, a) {
                        if p > 0.0 {
                            posterior.entry(obs).or_default().insert(successor);
                        }
                    }
                }
                // one successor belief per observation, deduplicated by its
                // canonical sorted tuple
                for support in posterior.into_values() {
                    let successor: Belief = support.into_iter().collect();
                    debug_assert!(!successor.is_empty());
                    let (successor_index, new_belief) = self.add_belief(successor);
                    if new_belief {
                        self.queue.push(successor_index);
                    }
                    let row = &mut self.trans[belief_index][a];
                    if !row.contains(&successor_index) {
                        row.push(successor_index);
                        explored_edges += 1;
                    }
                }
                self.trans[belief_index][a].sort_unstable();
            }
        }
        self.stats.beliefs = self.beliefs.len();
        self.stats.edges += explored_edges;
        self.stats.time += start.elapsed();
        debug!("Exploration finished: {}", self.stats);
        Ok(())
    }

    pub(crate) fn stats(&self) -> &ExplorationStats {
        &self.stats
    }

    pub(crate) fn into_mdp(self) -> BeliefSuppMdp {
        let model = self.model;
        let priorities = self
            .beliefs
            .iter()
            .map(|belief| {
                belief
                    .iter()
                    .map(|&s| model.priority(s))
                    .max()
                    .unwrap_or(0)
            })
            .collect();
        let actions = (0..model.num_actions())
            .map(|a| model.action_name(a).to_owned())
            .collect();
        let state_names = (0..model.num_states())
            .map(|s| model.state_name(s))
            .collect();
        let pomdp_projection = (0..model.num_states())
            .map(|s| model.pomdp_state(s))
            .collect();
        BeliefSuppMdp::from_parts(
            self.beliefs,
            self.trans,
            priorities,
            0,
            actions,
            state_names,
            pomdp_projection,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::queue::BfsQueue;
    use super::*;
    use crate::automaton::{LabelExpr, ParityAcceptance, ParityAutomaton};
    use crate::pomdp::parser;
    use crate::product::ProductPomdp;

    const BLIND: &str = "
states: s0 s1
actions: a
observations: o
start: uniform
T: a : s0 0.5 0.5
T: a : s1 0.0 1.0
O: a : * : o 1.0
atom 0: o
";

    fn explore_product(input: &str, automaton: &ParityAutomaton) -> BeliefSuppMdp {
        let pomdp = parser::parse(input).unwrap();
        let product = ProductPomdp::new(&pomdp, automaton, &Interrupt::none()).unwrap();
        let mut constructor = MdpConstructor::new(&product, BfsQueue::with_capacity(16));
        constructor.explore(&Interrupt::none()).unwrap();
        constructor.into_mdp()
    }

    fn trivial_automaton() -> ParityAutomaton {
        let mut aut = ParityAutomaton::new(1, ParityAcceptance::SingleAcc);
        let q0 = aut.add_state(&[0]);
        aut.add_edge(q0, LabelExpr::True, q0);
        aut
    }

    #[test]
    fn test_blind_beliefs_merge() {
        let mdp = explore_product(BLIND, &trivial_automaton());
        // initial belief {s0, s1}; the single observation cannot split it
        assert_eq!(mdp.num_states(), 1);
        assert_eq!(mdp.successors(0, 0), &[0]);
        assert_eq!(mdp.priority(0), 2);
        assert_eq!(mdp.pretty_name(0), "{s0-0, s1-0}");
    }

    const SPLIT: &str = "
states: s0 s1
actions: a
observations: left right
start: uniform
T: a uniform
O: a : s0 : left 1.0
O: a : s1 : right 1.0
atom 0: left
";

    #[test]
    fn test_observations_split_beliefs() {
        let mdp = explore_product(SPLIT, &trivial_automaton());
        // the observation reveals the state, so all reachable successor
        // beliefs are singletons
        assert_eq!(mdp.num_states(), 3);
        assert_eq!(mdp.successors(0, 0), &[1, 2]);
        assert_eq!(mdp.successors(1, 0), &[1, 2]);
        assert!(mdp.singleton_pomdp_state(1).is_some());
    }

    #[test]
    fn test_deterministic_chain_is_isomorphic_to_model() {
        // deterministic flip with a revealing observation: beliefs are the
        // two singletons reachable from the initial one
        let input = "
states: s0 s1
actions: a
observations: here there
start include: s0
T: a : s0 : s1 1.0
T: a : s1 : s0 1.0
O: a : s0 : here 1.0
O: a : s1 : there 1.0
atom 0: here
";
        let mdp = explore_product(input, &trivial_automaton());
        assert_eq!(mdp.num_states(), 2);
        for b in 0..mdp.num_states() {
            assert_eq!(mdp.successors(b, 0).len(), 1);
        }
    }
}
