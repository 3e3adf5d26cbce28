//! Belief-support MDPs.

use tinyvec::TinyVec;

use crate::automaton::Priority;
use crate::pomdp::{ActionIndex, StateIndex};

/// The type for an index of a belief in a belief-support MDP.
pub type BeliefIndex = usize;

/// A belief support: the canonical sorted tuple of model states consistent
/// with an observation/action history. Small supports stay inline.
pub type Belief = TinyVec<[StateIndex; 8]>;

/// The belief-support MDP of a parity model: states are reachable belief
/// supports, the system chooses the action and the environment chooses the
/// observation, which selects one of the successor beliefs.
///
/// All structure is fixed after construction; the solver only reads it.
#[derive(Debug)]
pub struct BeliefSuppMdp {
    beliefs: Vec<Belief>,
    /// Successor beliefs indexed by belief, then action; each row is sorted
    /// and duplicate-free. An empty row means the action is disabled.
    trans: Vec<Vec<Vec<BeliefIndex>>>,
    priorities: Vec<Priority>,
    initial: BeliefIndex,
    actions: Vec<String>,
    /// Display names of the model states appearing inside beliefs.
    state_names: Vec<String>,
    /// Projection from model states to POMDP states.
    pomdp_projection: Vec<StateIndex>,
    max_priority: Priority,
}

impl BeliefSuppMdp {
    pub(crate) fn from_parts(
        beliefs: Vec<Belief>,
        trans: Vec<Vec<Vec<BeliefIndex>>>,
        priorities: Vec<Priority>,
        initial: BeliefIndex,
        actions: Vec<String>,
        state_names: Vec<String>,
        pomdp_projection: Vec<StateIndex>,
    ) -> Self {
        let max_priority = priorities.iter().copied().max().unwrap_or(0);
        Self {
            beliefs,
            trans,
            priorities,
            initial,
            actions,
            state_names,
            pomdp_projection,
            max_priority,
        }
    }

    /// Returns the number of beliefs.
    pub fn num_states(&self) -> usize {
        self.beliefs.len()
    }

    /// Returns an iterator over the indices of all beliefs.
    pub fn states(&self) -> std::ops::Range<BeliefIndex> {
        0..self.beliefs.len()
    }

    /// Returns the number of actions.
    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    /// Returns the name of the given action.
    pub fn action_name(&self, a: ActionIndex) -> &str {
        &self.actions[a]
    }

    /// Returns the initial belief.
    pub fn initial(&self) -> BeliefIndex {
        self.initial
    }

    /// Returns the belief with the given index.
    pub fn belief(&self, b: BeliefIndex) -> &Belief {
        &self.beliefs[b]
    }

    /// Returns the sorted successor beliefs for the given belief and
    /// action. The row is empty iff the action is disabled at this belief.
    pub fn successors(&self, b: BeliefIndex, a: ActionIndex) -> &[BeliefIndex] {
        &self.trans[b][a]
    }

    /// Returns the actions that are enabled at the given belief, in
    /// ascending order.
    pub fn enabled_actions(&self, b: BeliefIndex) -> impl Iterator<Item = ActionIndex> + '_ {
        self.trans[b]
            .iter()
            .enumerate()
            .filter(|(_, row)| !row.is_empty())
            .map(|(a, _)| a)
    }

    /// Returns the priority of the given belief: the maximal priority of
    /// any model state in its support.
    pub fn priority(&self, b: BeliefIndex) -> Priority {
        self.priorities[b]
    }

    /// Returns the maximal priority of any belief.
    pub fn max_priority(&self) -> Priority {
        self.max_priority
    }

    /// Returns the POMDP state of a singleton belief, or `None` if the
    /// support contains more than one model state.
    pub fn singleton_pomdp_state(&self, b: BeliefIndex) -> Option<StateIndex> {
        match &self.beliefs[b][..] {
            &[s] => Some(self.pomdp_projection[s]),
            _ => None,
        }
    }

    /// Returns a display name for the given belief.
    pub fn pretty_name(&self, b: BeliefIndex) -> String {
        let names: Vec<&str> = self.beliefs[b]
            .iter()
            .map(|&s| self.state_names[s].as_str())
            .collect();
        format!("{{{}}}", names.join(", "))
    }

    /// Builds an MDP over singleton beliefs directly from a successor table
    /// and priorities, for solver tests.
    #[cfg(test)]
    pub(crate) fn from_table(trans: Vec<Vec<Vec<BeliefIndex>>>, priorities: Vec<Priority>) -> Self {
        let n = trans.len();
        let num_actions = trans.first().map_or(0, Vec::len);
        let beliefs = (0..n).map(|s| std::iter::once(s).collect()).collect();
        let actions = (0..num_actions).map(|a| format!("a{}", a)).collect();
        let state_names = (0..n).map(|s| format!("s{}", s)).collect();
        let pomdp_projection = (0..n).collect();
        Self::from_parts(
            beliefs,
            trans,
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
    use super::*;

    #[test]
    fn test_enabled_actions_and_singletons() {
        let mdp = BeliefSuppMdp::from_table(
            vec![
                vec![vec![0, 1], vec![]],
                vec![vec![1], vec![0]],
            ],
            vec![0, 2],
        );
        assert_eq!(mdp.enabled_actions(0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(mdp.enabled_actions(1).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(mdp.singleton_pomdp_state(1), Some(1));
        assert_eq!(mdp.max_priority(), 2);
        assert_eq!(mdp.pretty_name(0), "{s0}");
    }
}
