//! Tarjan's strongly connected components over a restricted subgraph.

use std::collections::BTreeSet;

use fixedbitset::FixedBitSet;

use crate::mdp::{BeliefIndex, BeliefSuppMdp};
use crate::pomdp::ActionIndex;

const UNVISITED: usize = usize::MAX;

/// Computes the strongly connected components of the subgraph induced by
/// `members` under the per-state action restriction `act`.
///
/// Uses the recursive form of Tarjan's algorithm. Roots are taken from
/// `members` in the given order and successors are visited in ascending
/// order, so the decomposition is deterministic; the states of each
/// component are returned sorted.
pub(crate) fn decompose(
    mdp: &BeliefSuppMdp,
    members: &[BeliefIndex],
    act: &[BTreeSet<ActionIndex>],
) -> Vec<Vec<BeliefIndex>> {
    let n = mdp.num_states();
    let mut member_mask = FixedBitSet::with_capacity(n);
    member_mask.extend(members.iter().copied());
    let mut tarjan = Tarjan {
        mdp,
        act,
        member_mask,
        index: vec![UNVISITED; n],
        low: vec![0; n],
        on_stack: FixedBitSet::with_capacity(n),
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for &s in members {
        if tarjan.index[s] == UNVISITED {
            tarjan.strong_connect(s);
        }
    }
    for component in &mut tarjan.components {
        component.sort_unstable();
    }
    tarjan.components
}

struct Tarjan<'a> {
    mdp: &'a BeliefSuppMdp,
    act: &'a [BTreeSet<ActionIndex>],
    member_mask: FixedBitSet,
    index: Vec<usize>,
    low: Vec<usize>,
    on_stack: FixedBitSet,
    stack: Vec<BeliefIndex>,
    next_index: usize,
    components: Vec<Vec<BeliefIndex>>,
}

impl Tarjan<'_> {
    fn strong_connect(&mut self, q: BeliefIndex) {
        self.index[q] = self.next_index;
        self.low[q] = self.next_index;
        self.next_index += 1;
        self.stack.push(q);
        self.on_stack.insert(q);

        let successors: BTreeSet<BeliefIndex> = self.act[q]
            .iter()
            .flat_map(|&a| self.mdp.successors(q, a))
            .copied()
            .filter(|&d| self.member_mask[d])
            .collect();
        for d in successors {
            if self.index[d] == UNVISITED {
                self.strong_connect(d);
                self.low[q] = self.low[q].min(self.low[d]);
            } else if self.on_stack[d] {
                self.low[q] = self.low[q].min(self.index[d]);
            }
        }

        if self.index[q] == self.low[q] {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().expect("Tarjan stack underflow");
                self.on_stack.set(w, false);
                component.push(w);
                if w == q {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
