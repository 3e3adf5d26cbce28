//! Almost-sure parity solving on belief-support MDPs.
//!
//! The solver computes, for each even priority, the maximal end components
//! whose top priority is exactly that value (Baier–Katoen Alg. 47), the
//! almost-sure attractor into their union (Alg. 45) and the memoryless
//! strategies witnessing both.

mod scc;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use fixedbitset::FixedBitSet;
use log::{debug, info};

use crate::automaton::Priority;
use crate::mdp::{BeliefIndex, BeliefSuppMdp};
use crate::pomdp::ActionIndex;
use crate::{Error, Interrupt};

/// A memoryless strategy: each belief in its domain maps to the non-empty
/// sorted set of actions that may be played from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Strategy {
    data: BTreeMap<BeliefIndex, Vec<ActionIndex>>,
}

impl Strategy {
    fn insert(&mut self, belief: BeliefIndex, actions: Vec<ActionIndex>) {
        debug_assert!(!actions.is_empty());
        self.data.insert(belief, actions);
    }

    /// Returns the actions for the given belief, if it is in the domain.
    pub fn actions(&self, belief: BeliefIndex) -> Option<&[ActionIndex]> {
        self.data.get(&belief).map(Vec::as_slice)
    }

    /// Iterates over the domain in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (BeliefIndex, &[ActionIndex])> {
        self.data.iter().map(|(&b, actions)| (b, actions.as_slice()))
    }

    /// Returns the size of the domain.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the domain is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The maximal end components good for one even priority, together with the
/// strategy that keeps play inside them.
#[derive(Debug, Clone)]
pub struct MecFamily {
    priority: Priority,
    mecs: Vec<Vec<BeliefIndex>>,
    strategy: Strategy,
}

impl MecFamily {
    /// The even priority this family was computed for.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The member sets of the components, each sorted.
    pub fn mecs(&self) -> &[Vec<BeliefIndex>] {
        &self.mecs
    }

    /// The strategy keeping play inside the component of each member.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}

/// The classification of a belief after solving.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BeliefClass {
    /// The belief lies in a good MEC at the given priority.
    InMec(Priority),
    /// The belief is outside every good MEC but reaches their union almost
    /// surely.
    Reaching,
    /// The belief is not almost-sure winning.
    Lost,
}

/// The result of an almost-sure parity solve.
#[derive(Debug, Clone)]
pub struct Solution {
    region: Vec<BeliefIndex>,
    region_mask: FixedBitSet,
    reach_strategy: Strategy,
    mec_families: Vec<MecFamily>,
    classification: Vec<BeliefClass>,
}

impl Solution {
    /// The almost-sure winning beliefs, sorted.
    pub fn region(&self) -> &[BeliefIndex] {
        &self.region
    }

    /// Returns true if the given belief is almost-sure winning.
    pub fn is_winning(&self, belief: BeliefIndex) -> bool {
        self.region_mask[belief]
    }

    /// The strategy reaching the union of good MECs almost surely.
    pub fn reach_strategy(&self) -> &Strategy {
        &self.reach_strategy
    }

    /// The MEC families, one per even priority in ascending order.
    pub fn mec_families(&self) -> &[MecFamily] {
        &self.mec_families
    }

    /// The classification of the given belief.
    pub fn classification(&self, belief: BeliefIndex) -> BeliefClass {
        self.classification[belief]
    }
}

/// Statistics of an almost-sure parity solve.
#[derive(Debug, Default, Clone)]
pub struct SolvingStats {
    beliefs: usize,
    winning: usize,
    time: Duration,
}

impl SolvingStats {
    pub fn beliefs(&self) -> usize {
        self.beliefs
    }

    pub fn winning(&self) -> usize {
        self.winning
    }

    pub fn time(&self) -> Duration {
        self.time
    }
}

impl fmt::Display for SolvingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "|B| = {}, |W| = {}, solver time: {:.2}",
            self.beliefs(),
            self.winning(),
            self.time().as_secs_f32(),
        )
    }
}

/// Solver for almost-sure parity objectives on a belief-support MDP.
///
/// The solver owns all scratch structures (predecessor lists, action
/// counts, forbidden pairs); the MDP itself is never mutated.
pub struct ParityMdpSolver<'a> {
    mdp: &'a BeliefSuppMdp,
    interrupt: Interrupt,
    pre: Vec<Vec<(BeliefIndex, ActionIndex)>>,
    act: Vec<usize>,
    stats: SolvingStats,
}

impl<'a> ParityMdpSolver<'a> {
    pub fn new(mdp: &'a BeliefSuppMdp, interrupt: Interrupt) -> Self {
        Self {
            mdp,
            interrupt,
            pre: Vec::new(),
            act: Vec::new(),
            stats: SolvingStats::default(),
        }
    }

    pub fn stats(&self) -> &SolvingStats {
        &self.stats
    }

    /// Rebuilds the predecessor lists and enabled-action counts.
    fn reset_pre_act(&mut self) {
        let n = self.mdp.num_states();
        self.pre = vec![Vec::new(); n];
        self.act = vec![0; n];
        for b in 0..n {
            for a in self.mdp.enabled_actions(b) {
                self.act[b] += 1;
                for &successor in self.mdp.successors(b, a) {
                    self.pre[successor].push((b, a));
                }
            }
        }
    }

    /// Computes the maximal end components whose top priority is exactly
    /// the given even priority, together with the per-state action sets
    /// under which play stays inside them.
    ///
    /// If no state of exactly this priority exists, the next lower even
    /// priority is tried, down to zero.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Timeout`] error if the deadline expires.
    pub fn good_mecs(
        &mut self,
        priority: Priority,
    ) -> Result<(Vec<Vec<BeliefIndex>>, Vec<BTreeSet<ActionIndex>>), Error> {
        debug_assert!(priority % 2 == 0);
        debug!("Computing MECs of priority {}", priority);
        self.reset_pre_act();
        let n = self.mdp.num_states();

        let region: Vec<BeliefIndex> = (0..n)
            .filter(|&b| self.mdp.priority(b) <= priority)
            .collect();
        let has_exact = region.iter().any(|&b| self.mdp.priority(b) == priority);
        if !has_exact {
            if priority >= 2 {
                return self.good_mecs(priority - 2);
            }
            return Ok((Vec::new(), vec![BTreeSet::new(); n]));
        }

        let mut act: Vec<BTreeSet<ActionIndex>> = (0..n)
            .map(|b| self.mdp.enabled_actions(b).collect())
            .collect();
        let mut current: Vec<Vec<BeliefIndex>> = vec![region];

        loop {
            self.interrupt.check()?;
            let mut next: Vec<Vec<BeliefIndex>> = Vec::new();
            let mut mutated = false;

            for candidate in &current {
                let mut member_mask = FixedBitSet::with_capacity(n);
                member_mask.extend(candidate.iter().copied());

                let components = scc::decompose(self.mdp, candidate, &act);
                let mut component_id = vec![usize::MAX; n];
                for (i, component) in components.iter().enumerate() {
                    for &s in component {
                        component_id[s] = i;
                    }
                }

                // drop actions that can exit the component of their state
                let mut removal = Vec::new();
                for component in &components {
                    for &s in component {
                        let exiting: Vec<ActionIndex> = act[s]
                            .iter()
                            .copied()
                            .filter(|&a| {
                                self.mdp
                                    .successors(s, a)
                                    .iter()
                                    .any(|&d| component_id[d] != component_id[s])
                            })
                            .collect();
                        for a in exiting {
                            act[s].remove(&a);
                            mutated = true;
                        }
                        if act[s].is_empty() {
                            removal.push(s);
                        }
                    }
                }

                // remove dead states and propagate to their predecessors
                // inside the candidate
                while let Some(s) = removal.pop() {
                    if !member_mask[s] {
                        continue;
                    }
                    member_mask.set(s, false);
                    mutated = true;
                    for &(t, a) in &self.pre[s] {
                        if member_mask[t] && act[t].remove(&a) && act[t].is_empty() {
                            removal.push(t);
                        }
                    }
                }

                // surviving parts of the components become new candidates;
                // parts whose top priority falls short are discarded
                for component in &components {
                    let survivors: Vec<BeliefIndex> = component
                        .iter()
                        .copied()
                        .filter(|&s| member_mask[s])
                        .collect();
                    if survivors.is_empty() {
                        continue;
                    }
                    let top = survivors
                        .iter()
                        .map(|&s| self.mdp.priority(s))
                        .max()
                        .unwrap_or(0);
                    if priority != 0 && top < priority {
                        mutated = true;
                        continue;
                    }
                    next.push(survivors);
                }
            }

            let stable = !mutated && next == current;
            current = next;
            if stable {
                break;
            }
        }

        current.sort_by_key(|mec| mec.first().copied());
        Ok((current, act))
    }

    /// Computes the states from which no path reaches a target, ignoring
    /// the forbidden state/action pairs.
    fn cannot_reach(
        &self,
        targets: &FixedBitSet,
        forbidden: &HashSet<(BeliefIndex, ActionIndex)>,
    ) -> FixedBitSet {
        let n = self.mdp.num_states();
        let mut visited = FixedBitSet::with_capacity(n);
        let mut queue: Vec<BeliefIndex> = targets.ones().collect();
        for &t in &queue {
            visited.insert(t);
        }
        while let Some(q) = queue.pop() {
            for &(t, a) in &self.pre[q] {
                if forbidden.contains(&(t, a)) {
                    continue;
                }
                if !visited[t] {
                    visited.insert(t);
                    queue.push(t);
                }
            }
        }
        let mut cannot = FixedBitSet::with_capacity(n);
        cannot.extend((0..n).filter(|&b| !visited[b]));
        cannot
    }

    /// Computes the almost-sure attractor of the target set: the beliefs
    /// from which some strategy reaches a target with probability one.
    ///
    /// Targets are never removed, and a state/action pair is forbidden (and
    /// its action count decremented) at most once.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Timeout`] error if the deadline expires.
    pub fn almost_sure_reach(&mut self, targets: &FixedBitSet) -> Result<FixedBitSet, Error> {
        self.reset_pre_act();
        let n = self.mdp.num_states();
        let mut removed = FixedBitSet::with_capacity(n);
        let mut forbidden: HashSet<(BeliefIndex, ActionIndex)> = HashSet::new();

        loop {
            self.interrupt.check()?;
            let cannot = self.cannot_reach(targets, &forbidden);
            let mut frontier: Vec<BeliefIndex> =
                cannot.ones().filter(|&b| !removed[b]).collect();
            if frontier.is_empty() {
                break;
            }
            let mut dead = cannot.clone();
            dead.union_with(&removed);
            while let Some(u) = frontier.pop() {
                for &(t, a) in &self.pre[u] {
                    if dead[t] {
                        continue;
                    }
                    if forbidden.insert((t, a)) {
                        self.act[t] -= 1;
                    }
                    if self.act[t] == 0 && !targets[t] {
                        dead.insert(t);
                        frontier.push(t);
                    }
                }
                removed.insert(u);
            }
        }

        let mut region = FixedBitSet::with_capacity(n);
        region.extend((0..n).filter(|&b| !removed[b]));
        Ok(region)
    }

    /// Computes the almost-sure winning region for the parity objective,
    /// the strategy reaching the union of good MECs and the MEC-staying
    /// strategies for every even priority.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Timeout`] error if the deadline expires.
    pub fn almost_sure_win(&mut self) -> Result<Solution, Error> {
        let start = Instant::now();
        let n = self.mdp.num_states();
        let max_priority = self.mdp.max_priority();
        info!(
            "Solving parity MDP with {} beliefs, max priority {}",
            n, max_priority
        );

        let mut families = Vec::new();
        for priority in (0..=max_priority).filter(|p| p % 2 == 0) {
            let (mecs, act) = self.good_mecs(priority)?;
            debug!("Priority {}: {} MECs", priority, mecs.len());
            families.push((priority, mecs, act));
        }

        let mut targets = FixedBitSet::with_capacity(n);
        for (_, mecs, _) in &families {
            for mec in mecs {
                targets.extend(mec.iter().copied());
            }
        }

        let region_mask = self.almost_sure_reach(&targets)?;
        let region: Vec<BeliefIndex> = region_mask.ones().collect();

        let mut reach_strategy = Strategy::default();
        for &b in &region {
            let actions: Vec<ActionIndex> = self
                .mdp
                .enabled_actions(b)
                .filter(|&a| self.mdp.successors(b, a).iter().all(|&d| region_mask[d]))
                .collect();
            if !actions.is_empty() {
                reach_strategy.insert(b, actions);
            }
        }

        // restrict each MEC strategy to actual members and drop empty
        // entries
        let mut mec_families = Vec::new();
        for (priority, mecs, act) in families {
            let mut strategy = Strategy::default();
            for mec in &mecs {
                for &s in mec {
                    let actions: Vec<ActionIndex> = act[s].iter().copied().collect();
                    if !actions.is_empty() {
                        strategy.insert(s, actions);
                    }
                }
            }
            mec_families.push(MecFamily {
                priority,
                mecs,
                strategy,
            });
        }

        let mut classification = vec![BeliefClass::Lost; n];
        for &b in &region {
            classification[b] = BeliefClass::Reaching;
        }
        for family in &mec_families {
            for mec in &family.mecs {
                for &s in mec {
                    if classification[s] == BeliefClass::Reaching {
                        classification[s] = BeliefClass::InMec(family.priority);
                    }
                }
            }
        }

        self.stats.beliefs = n;
        self.stats.winning = region.len();
        self.stats.time += start.elapsed();
        info!("Solved: {}", self.stats);

        Ok(Solution {
            region,
            region_mask,
            reach_strategy,
            mec_families,
            classification,
        })
    }
}
