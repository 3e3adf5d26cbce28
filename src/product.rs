//! Synchronous product of a POMDP with a deterministic parity automaton.

use log::{debug, info};

use crate::automaton::{AutStateIndex, ParityAutomaton, Priority};
use crate::pomdp::{ActionIndex, ObsIndex, Pomdp, StateIndex, TransitionRow};
use crate::{Error, Interrupt};

/// The read-only view the belief-support construction works on: a
/// partially-observed model whose states carry parity priorities.
///
/// Implemented by [`ProductPomdp`] for atomic-proposition POMDPs composed
/// with an automaton, and by [`ParityPomdp`] for POMDPs that declare their
/// priorities directly.
pub trait ParityModel {
    /// Returns the number of model states.
    fn num_states(&self) -> usize;
    /// Returns the number of actions.
    fn num_actions(&self) -> usize;
    /// Returns the number of observations.
    fn num_observations(&self) -> usize;
    /// Returns the name of the given action.
    fn action_name(&self, a: ActionIndex) -> &str;
    /// Returns a display name for the given model state.
    fn state_name(&self, s: StateIndex) -> String;
    /// Returns the sorted support of the initial distribution.
    fn initial_support(&self) -> Vec<StateIndex>;
    /// Returns the joint transition row for the given state and action.
    fn transitions(&self, s: StateIndex, a: ActionIndex) -> &TransitionRow;
    /// Returns the priority of the given state.
    fn priority(&self, s: StateIndex) -> Priority;
    /// Returns the maximal priority of any state.
    fn max_priority(&self) -> Priority;
    /// Projects a model state to the POMDP state it contains.
    fn pomdp_state(&self, s: StateIndex) -> StateIndex;
}

/// A parity POMDP used directly as a model: states are POMDP states and
/// priorities are the declared ones.
pub struct ParityPomdp<'a> {
    pomdp: &'a Pomdp,
    priorities: &'a [Priority],
    max_priority: Priority,
}

impl<'a> ParityPomdp<'a> {
    /// Wraps a parity-flavoured POMDP.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Domain`] error if the POMDP does not declare
    /// priorities.
    pub fn new(pomdp: &'a Pomdp) -> Result<Self, Error> {
        let priorities = pomdp
            .priorities()
            .ok_or_else(|| Error::Domain("POMDP declares no prio directives".into()))?;
        let max_priority = priorities.iter().copied().max().unwrap_or(0);
        Ok(Self {
            pomdp,
            priorities,
            max_priority,
        })
    }
}

impl ParityModel for ParityPomdp<'_> {
    fn num_states(&self) -> usize {
        self.pomdp.num_states()
    }
    fn num_actions(&self) -> usize {
        self.pomdp.num_actions()
    }
    fn num_observations(&self) -> usize {
        self.pomdp.num_observations()
    }
    fn action_name(&self, a: ActionIndex) -> &str {
        self.pomdp.action_name(a)
    }
    fn state_name(&self, s: StateIndex) -> String {
        self.pomdp.state_name(s).to_owned()
    }
    fn initial_support(&self) -> Vec<StateIndex> {
        self.pomdp.initial_support()
    }
    fn transitions(&self, s: StateIndex, a: ActionIndex) -> &TransitionRow {
        self.pomdp.transitions(s, a)
    }
    fn priority(&self, s: StateIndex) -> Priority {
        self.priorities[s]
    }
    fn max_priority(&self) -> Priority {
        self.max_priority
    }
    fn pomdp_state(&self, s: StateIndex) -> StateIndex {
        s
    }
}

/// The synchronous product of an atomic-proposition POMDP and a
/// deterministic parity automaton.
///
/// A product state `(s, q)` is encoded as `q * |S| + s`. The automaton
/// moves on the observation emitted by each transition, so the priorities
/// of automaton states transfer to product states.
pub struct ProductPomdp {
    num_pomdp_states: usize,
    pomdp_states: Vec<String>,
    actions: Vec<String>,
    observations: Vec<String>,
    start: Vec<(StateIndex, f64)>,
    trans: Vec<Vec<TransitionRow>>,
    priorities: Vec<Priority>,
    max_priority: Priority,
}

impl ProductPomdp {
    /// Builds the product of the given POMDP and automaton.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::AlphabetMismatch`] error if the valuation of some
    /// observation matches no automaton edge, and a [`Error::Domain`] error
    /// if the POMDP does not label its observations.
    pub fn new(
        pomdp: &Pomdp,
        automaton: &ParityAutomaton,
        interrupt: &Interrupt,
    ) -> Result<Self, Error> {
        let labels = pomdp
            .labels()
            .ok_or_else(|| Error::Domain("POMDP declares no atom directives".into()))?;
        let num_states = pomdp.num_states();
        let num_product = num_states * automaton.num_states();
        info!(
            "Constructing product of {} POMDP states and {} automaton states",
            num_states,
            automaton.num_states()
        );

        let mut trans = vec![vec![TransitionRow::new(); pomdp.num_actions()]; num_product];
        let mut priorities = vec![0; num_product];
        for q in 0..automaton.num_states() {
            interrupt.check()?;
            for s in 0..num_states {
                let index = q * num_states + s;
                priorities[index] = automaton.priority(q);
                for a in 0..pomdp.num_actions() {
                    let row = pomdp.transitions(s, a);
                    let mut product_row = TransitionRow::with_capacity(row.len());
                    for &((dst, obs), p) in row {
                        let q_next = automaton.successor(q, labels[obs]).ok_or_else(|| {
                            Error::AlphabetMismatch(format!(
                                "observation '{}' matches no automaton edge in state {}",
                                pomdp.observation_name(obs),
                                q
                            ))
                        })?;
                        product_row.push(((q_next * num_states + dst, obs), p));
                    }
                    product_row.sort_by(|x, y| x.0.cmp(&y.0));
                    trans[index][a] = product_row;
                }
            }
        }

        let q0 = automaton.initial_state();
        let start = pomdp
            .start()
            .iter()
            .map(|&(s, p)| (q0 * num_states + s, p))
            .collect();

        let max_priority = priorities.iter().copied().max().unwrap_or(0);
        debug!(
            "Product has {} states, max priority {}",
            num_product, max_priority
        );

        Ok(Self {
            num_pomdp_states: num_states,
            pomdp_states: (0..num_states)
                .map(|s| pomdp.state_name(s).to_owned())
                .collect(),
            actions: (0..pomdp.num_actions())
                .map(|a| pomdp.action_name(a).to_owned())
                .collect(),
            observations: (0..pomdp.num_observations())
                .map(|o| pomdp.observation_name(o).to_owned())
                .collect(),
            start,
            trans,
            priorities,
            max_priority,
        })
    }

    /// Decomposes a product state index into its POMDP and automaton parts.
    pub fn state_pair(&self, index: StateIndex) -> (StateIndex, AutStateIndex) {
        (
            index % self.num_pomdp_states,
            index / self.num_pomdp_states,
        )
    }

    /// Returns the initial distribution over product states.
    pub fn start(&self) -> &[(StateIndex, f64)] {
        &self.start
    }

    /// Returns the name of the given observation.
    pub fn observation_name(&self, o: ObsIndex) -> &str {
        &self.observations[o]
    }
}

impl ParityModel for ProductPomdp {
    fn num_states(&self) -> usize {
        self.trans.len()
    }
    fn num_actions(&self) -> usize {
        self.actions.len()
    }
    fn num_observations(&self) -> usize {
        self.observations.len()
    }
    fn action_name(&self, a: ActionIndex) -> &str {
        &self.actions[a]
    }
    fn state_name(&self, s: StateIndex) -> String {
        let (ps, q) = self.state_pair(s);
        format!("{}-{}", self.pomdp_states[ps], q)
    }
    fn initial_support(&self) -> Vec<StateIndex> {
        self.start.iter().map(|&(s, _)| s).collect()
    }
    fn transitions(&self, s: StateIndex, a: ActionIndex) -> &TransitionRow {
        &self.trans[s][a]
    }
    fn priority(&self, s: StateIndex) -> Priority {
        self.priorities[s]
    }
    fn max_priority(&self) -> Priority {
        self.max_priority
    }
    fn pomdp_state(&self, s: StateIndex) -> StateIndex {
        s % self.num_pomdp_states
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{LabelExpr, ParityAcceptance};
    use crate::pomdp::parser;

    const FLIP: &str = "
states: left right
actions: go
observations: here there
start include: left
T: go : left : right 1.0
T: go : right : left 1.0
O: go : left : here 1.0
O: go : right : there 1.0
atom 0: here
";

    /// Automaton for `G F p0` in the single-acceptance shape.
    fn gf_p0() -> ParityAutomaton {
        let mut aut = ParityAutomaton::new(1, ParityAcceptance::SingleAcc);
        let wait = aut.add_state(&[]);
        let seen = aut.add_state(&[0]);
        for q in [wait, seen] {
            aut.add_edge(q, LabelExpr::Ap(0), seen);
            aut.add_edge(q, LabelExpr::Ap(0).not(), wait);
        }
        aut.set_initial(wait);
        aut
    }

    #[test]
    fn test_product_size_and_priorities() {
        let pomdp = parser::parse(FLIP).unwrap();
        let automaton = gf_p0();
        let product = ProductPomdp::new(&pomdp, &automaton, &Interrupt::none()).unwrap();
        assert_eq!(
            ParityModel::num_states(&product),
            pomdp.num_states() * automaton.num_states()
        );
        // states (left, 0), (right, 0) have the priority of automaton state 0
        assert_eq!(product.priority(0), 1);
        assert_eq!(product.priority(1), 1);
        assert_eq!(product.priority(2), 2);
        assert_eq!(product.max_priority(), 2);
    }

    #[test]
    fn test_product_transitions_follow_observations() {
        let pomdp = parser::parse(FLIP).unwrap();
        let automaton = gf_p0();
        let product = ProductPomdp::new(&pomdp, &automaton, &Interrupt::none()).unwrap();
        // from (left, 0), action go reaches right with observation "there",
        // on which p0 does not hold, so the automaton stays in state 0
        assert_eq!(product.transitions(0, 0), &[((1, 1), 1.0)]);
        // from (right, 0), going to left emits "here" where p0 holds
        let (dst, _) = product.transitions(1, 0)[0].0;
        assert_eq!(product.state_pair(dst), (0, 1));
        // initial distribution sits on automaton state 0
        assert_eq!(product.start(), &[(0, 1.0)]);
        assert_eq!(product.state_name(2), "left-1");
    }

    #[test]
    fn test_alphabet_mismatch() {
        let pomdp = parser::parse(FLIP).unwrap();
        let mut aut = ParityAutomaton::new(1, ParityAcceptance::SingleAcc);
        let q0 = aut.add_state(&[]);
        // no edge for valuations where p0 does not hold
        aut.add_edge(q0, LabelExpr::Ap(0), q0);
        let result = ProductPomdp::new(&pomdp, &aut, &Interrupt::none());
        assert!(matches!(result, Err(Error::AlphabetMismatch(_))));
    }
}
