//! POMDP models and their on-disk format.

pub mod parser;

use crate::automaton::{ApValuation, Priority};
use crate::Error;

/// The type for an index of a state of a POMDP.
pub type StateIndex = usize;
/// The type for an index of an action of a POMDP.
pub type ActionIndex = usize;
/// The type for an index of an observation of a POMDP.
pub type ObsIndex = usize;

/// A joint transition row for a fixed state and action: successor
/// state/observation pairs with their probabilities, sorted by
/// `(state, observation)` and containing only positive entries.
pub type TransitionRow = Vec<((StateIndex, ObsIndex), f64)>;

/// Tolerance when checking that probability rows sum up to one.
const DISTRIBUTION_EPSILON: f64 = 1e-6;

/// The objective flavour a POMDP file declares.
///
/// A file carries either `prio` directives (parity priorities directly on
/// states, no automaton needed) or `atom` directives (atomic propositions
/// labelling observations, to be combined with an LTL objective), but never
/// both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flavour {
    /// Parity priorities on states; entry `s` is the priority of state `s`.
    Parity {
        /// The priority of each state. States without a `prio` directive
        /// have priority zero.
        priorities: Vec<Priority>,
    },
    /// Atomic propositions labelling observations.
    AtomicProp {
        /// The valuation of each observation: bit `i` is set iff atomic
        /// proposition `i` holds on that observation.
        labels: Vec<ApValuation>,
        /// The sorted list of declared atomic proposition indices.
        atoms: Vec<usize>,
    },
}

/// An immutable POMDP: states, actions, observations, a joint transition
/// function and an initial distribution.
///
/// The joint transition function maps a state/action pair to a distribution
/// over successor state/observation pairs. A row may also be empty, in which
/// case the action is disabled in that state.
#[derive(Debug, Clone)]
pub struct Pomdp {
    states: Vec<String>,
    actions: Vec<String>,
    observations: Vec<String>,
    /// Initial distribution: positive entries sorted by state.
    start: Vec<(StateIndex, f64)>,
    /// Joint transition rows, indexed by state, then action.
    trans: Vec<Vec<TransitionRow>>,
    flavour: Flavour,
}

impl Pomdp {
    /// Creates a new POMDP from its parts, after validating that every
    /// non-empty transition row and the initial distribution are proper
    /// probability distributions and that the flavour data has the right
    /// dimensions.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Domain`] error naming the offending entity if any
    /// of the checks fail.
    pub fn new(
        states: Vec<String>,
        actions: Vec<String>,
        observations: Vec<String>,
        start: Vec<(StateIndex, f64)>,
        trans: Vec<Vec<TransitionRow>>,
        flavour: Flavour,
    ) -> Result<Self, Error> {
        if states.is_empty() || actions.is_empty() || observations.is_empty() {
            return Err(Error::Domain(
                "POMDP must have at least one state, action and observation".into(),
            ));
        }
        if trans.len() != states.len() || trans.iter().any(|row| row.len() != actions.len()) {
            return Err(Error::Domain("transition table has wrong dimensions".into()));
        }

        let mut pomdp = Self {
            states,
            actions,
            observations,
            start,
            trans,
            flavour,
        };

        for row in &mut pomdp.trans {
            for entries in row.iter_mut() {
                entries.retain(|&(_, p)| p > 0.0);
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        for (s, row) in pomdp.trans.iter().enumerate() {
            for (a, entries) in row.iter().enumerate() {
                let sum: f64 = entries.iter().map(|&(_, p)| p).sum();
                if !entries.is_empty() && (sum - 1.0).abs() > DISTRIBUTION_EPSILON {
                    return Err(Error::Domain(format!(
                        "transition row for state '{}' and action '{}' sums to {}",
                        pomdp.states[s], pomdp.actions[a], sum
                    )));
                }
            }
        }

        pomdp.start.retain(|&(_, p)| p > 0.0);
        pomdp.start.sort_by_key(|&(s, _)| s);
        let start_sum: f64 = pomdp.start.iter().map(|&(_, p)| p).sum();
        if pomdp.start.is_empty() || (start_sum - 1.0).abs() > DISTRIBUTION_EPSILON {
            return Err(Error::Domain(format!(
                "initial distribution sums to {}",
                start_sum
            )));
        }
        if pomdp.start.iter().any(|&(s, _)| s >= pomdp.states.len()) {
            return Err(Error::Domain("initial distribution names unknown state".into()));
        }

        match &pomdp.flavour {
            Flavour::Parity { priorities } => {
                if priorities.len() != pomdp.states.len() {
                    return Err(Error::Domain("priority table has wrong dimensions".into()));
                }
            }
            Flavour::AtomicProp { labels, .. } => {
                if labels.len() != pomdp.observations.len() {
                    return Err(Error::Domain("labelling table has wrong dimensions".into()));
                }
            }
        }

        Ok(pomdp)
    }

    /// Returns the number of states.
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Returns the number of actions.
    pub fn num_actions(&self) -> usize {
        self.actions.len()
    }

    /// Returns the number of observations.
    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    /// Returns the name of the state with the given index.
    pub fn state_name(&self, s: StateIndex) -> &str {
        &self.states[s]
    }

    /// Returns the name of the action with the given index.
    pub fn action_name(&self, a: ActionIndex) -> &str {
        &self.actions[a]
    }

    /// Returns the name of the observation with the given index.
    pub fn observation_name(&self, o: ObsIndex) -> &str {
        &self.observations[o]
    }

    /// Returns the initial distribution as positive entries sorted by state.
    pub fn start(&self) -> &[(StateIndex, f64)] {
        &self.start
    }

    /// Returns the sorted support of the initial distribution.
    pub fn initial_support(&self) -> Vec<StateIndex> {
        self.start.iter().map(|&(s, _)| s).collect()
    }

    /// Returns the joint transition row for the given state and action.
    pub fn transitions(&self, s: StateIndex, a: ActionIndex) -> &TransitionRow {
        &self.trans[s][a]
    }

    /// Returns the objective flavour of this POMDP.
    pub fn flavour(&self) -> &Flavour {
        &self.flavour
    }

    /// Returns the per-observation valuations if this is an
    /// atomic-proposition POMDP.
    pub fn labels(&self) -> Option<&[ApValuation]> {
        match &self.flavour {
            Flavour::AtomicProp { labels, .. } => Some(labels),
            Flavour::Parity { .. } => None,
        }
    }

    /// Returns the per-state priorities if this is a parity POMDP.
    pub fn priorities(&self) -> Option<&[Priority]> {
        match &self.flavour {
            Flavour::Parity { priorities } => Some(priorities),
            Flavour::AtomicProp { .. } => None,
        }
    }

    /// Returns the sorted list of declared atomic proposition indices.
    /// Empty for parity POMDPs.
    pub fn atoms(&self) -> &[usize] {
        match &self.flavour {
            Flavour::AtomicProp { atoms, .. } => atoms,
            Flavour::Parity { .. } => &[],
        }
    }
}
