//! Library crate for almost-sure analysis of POMDPs against ω-regular
//! specifications.
//!
//! The pipeline composes a POMDP with a deterministic parity automaton for
//! its LTL objective, abstracts the product into the MDP of reachable
//! belief supports and solves the almost-sure parity problem on that MDP,
//! yielding the winning region and memoryless observation-based strategies.

pub mod automaton;
mod constructor;
pub mod graphviz;
pub mod mdp;
pub mod objective;
pub mod options;
pub mod pomdp;
pub mod product;
pub mod solver;

use std::fmt::{self, Display};
use std::io;
use std::time::{Duration, Instant};

use log::{info, trace, warn};

use automaton::{ParityAutomaton, Priority};
use constructor::queue::{BfsQueue, DfsQueue, ExplorationQueue};
use constructor::MdpConstructor;
use mdp::{BeliefIndex, BeliefSuppMdp};
use objective::Objective;
use options::{AnalysisOptions, ExplorationStrategy};
use pomdp::{Flavour, Pomdp, StateIndex};
use product::{ParityModel, ParityPomdp, ProductPomdp};
use solver::{ParityMdpSolver, Solution};

/// The errors surfaced by the analysis pipeline.
#[derive(Debug)]
pub enum Error {
    /// Malformed POMDP or TLSF input.
    Parse {
        /// The line of the offending token, or 0 if unknown.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// A semantically invalid model: unknown names, rows that are not
    /// distributions, or conflicting objective directives.
    Domain(String),
    /// The valuation of some observation matches no automaton edge; the
    /// translator was given an inconsistent proposition set.
    AlphabetMismatch(String),
    /// The external LTL-to-parity translator failed or produced output
    /// outside the supported HOA subset.
    Translator(String),
    /// The deadline expired; the whole computation is abandoned.
    Timeout,
    /// An internal invariant was violated. This indicates a bug.
    Internal(String),
    /// An I/O error.
    Io(io::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse { line: 0, message } => write!(f, "parse error: {}", message),
            Self::Parse { line, message } => {
                write!(f, "parse error (line {}): {}", line, message)
            }
            Self::Domain(message) => write!(f, "domain error: {}", message),
            Self::AlphabetMismatch(message) => write!(f, "alphabet mismatch: {}", message),
            Self::Translator(message) => write!(f, "translator error: {}", message),
            Self::Timeout => write!(f, "timeout: computation abandoned"),
            Self::Internal(message) => write!(f, "internal invariant violated: {}", message),
            Self::Io(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

/// Cooperative cancellation: a deadline checked at the top of every
/// exploration step and solver fixed-point iteration. Expiry abandons the
/// whole computation; no partial results are returned.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    deadline: Option<Instant>,
}

impl Interrupt {
    /// An interrupt that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    /// An interrupt firing after the given wall-clock duration.
    pub fn deadline(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Checks the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] once the deadline has passed.
    pub fn check(&self) -> Result<(), Error> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::Timeout),
            _ => Ok(()),
        }
    }
}

/// The outcome of an analysis: the winning region with its strategies and
/// the intermediate artefacts the pipeline produced.
pub struct AnalysisResult {
    formula: Option<String>,
    num_pomdp_states: usize,
    winning_pomdp_states: Vec<StateIndex>,
    winning_state_names: Vec<String>,
    automaton: Option<ParityAutomaton>,
    product: Option<ProductPomdp>,
    mdp: BeliefSuppMdp,
    solution: Solution,
}

impl AnalysisResult {
    /// The almost-sure winning beliefs, sorted by index.
    pub fn winning_beliefs(&self) -> &[BeliefIndex] {
        self.solution.region()
    }

    /// The POMDP states whose singleton belief is almost-sure winning,
    /// sorted.
    pub fn winning_pomdp_states(&self) -> &[StateIndex] {
        &self.winning_pomdp_states
    }

    /// The names of the winning POMDP states, in index order.
    pub fn winning_state_names(&self) -> &[String] {
        &self.winning_state_names
    }

    /// The solver output: region, reach strategy and MEC strategies.
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    /// The explored belief-support MDP.
    pub fn mdp(&self) -> &BeliefSuppMdp {
        &self.mdp
    }

    /// The product POMDP, if the objective went through an automaton.
    pub fn product(&self) -> Option<&ProductPomdp> {
        self.product.as_ref()
    }

    /// The parity automaton, if the objective went through one.
    pub fn automaton(&self) -> Option<&ParityAutomaton> {
        self.automaton.as_ref()
    }

    /// The LTL formula that was analysed, if any.
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    /// The maximal priority of any belief.
    pub fn max_priority(&self) -> Priority {
        self.mdp.max_priority()
    }

    /// The number of beliefs in the belief-support MDP.
    pub fn num_bs_states(&self) -> usize {
        self.mdp.num_states()
    }

    /// The number of states of the analysed POMDP.
    pub fn num_pomdp_states(&self) -> usize {
        self.num_pomdp_states
    }
}

impl Display for AnalysisResult {
    /// A deterministic rendering of the result, stable across runs on the
    /// same input; suitable as a regression fixture.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "formula: {}", self.formula.as_deref().unwrap_or("-"))?;
        writeln!(f, "num_pomdp_states: {}", self.num_pomdp_states)?;
        writeln!(f, "num_bs_states: {}", self.num_bs_states())?;
        writeln!(f, "max_priority: {}", self.max_priority())?;
        writeln!(f, "winning_bs_states: {:?}", self.solution.region())?;
        writeln!(f, "winning_pomdp_states: {:?}", self.winning_state_names)?;
        write!(f, "reach_strategies: {{")?;
        for (b, actions) in self.solution.reach_strategy().iter() {
            write!(f, " {}: {:?}", b, actions)?;
        }
        writeln!(f, " }}")?;
        for family in self.solution.mec_families() {
            write!(f, "mec_strategies[{}]: {{", family.priority())?;
            for (b, actions) in family.strategy().iter() {
                write!(f, " {}: {:?}", b, actions)?;
            }
            writeln!(f, " }}")?;
        }
        Ok(())
    }
}

/// Analyses a POMDP against its objective.
///
/// A parity POMDP is analysed directly against its declared priorities; an
/// atomic-proposition POMDP requires an objective, which is translated by
/// the external translator configured in the options.
///
/// # Errors
///
/// Returns the first error of the pipeline: domain errors of the model,
/// translator failures, alphabet mismatches or a timeout.
pub fn analyze(
    pomdp: &Pomdp,
    objective: Option<&Objective>,
    options: &AnalysisOptions,
) -> Result<AnalysisResult, Error> {
    let interrupt = options.interrupt();
    match pomdp.flavour() {
        Flavour::Parity { .. } => {
            if objective.is_some() {
                warn!("parity POMDP: the LTL objective is ignored");
            }
            let model = ParityPomdp::new(pomdp)?;
            let (mdp, solution) = explore_and_solve(&model, options, &interrupt)?;
            Ok(assemble(pomdp, None, None, None, mdp, solution))
        }
        Flavour::AtomicProp { .. } => {
            let objective = objective.ok_or_else(|| {
                Error::Domain("an atomic-proposition POMDP needs an LTL objective".into())
            })?;
            let atoms = match &options.atoms {
                Some(atoms) => atoms.clone(),
                None => pomdp.atoms().to_vec(),
            };
            let formula_atoms = objective.formula_atoms();
            if formula_atoms.iter().any(|atom| !atoms.contains(atom)) {
                warn!(
                    "formula uses atoms {:?} but the analysis declares {:?}",
                    formula_atoms, atoms
                );
            }
            let automaton =
                automaton::translator::translate(&options.translator, objective.formula(), &atoms)?;
            analyze_automaton(
                pomdp,
                automaton,
                Some(objective.formula().to_owned()),
                options,
            )
        }
    }
}

/// Analyses an atomic-proposition POMDP against an already constructed
/// parity automaton, bypassing the external translator.
///
/// # Errors
///
/// See [`analyze`].
pub fn analyze_with_automaton(
    pomdp: &Pomdp,
    automaton: ParityAutomaton,
    options: &AnalysisOptions,
) -> Result<AnalysisResult, Error> {
    analyze_automaton(pomdp, automaton, None, options)
}

fn analyze_automaton(
    pomdp: &Pomdp,
    automaton: ParityAutomaton,
    formula: Option<String>,
    options: &AnalysisOptions,
) -> Result<AnalysisResult, Error> {
    let interrupt = options.interrupt();
    let product = ProductPomdp::new(pomdp, &automaton, &interrupt)?;
    let (mdp, solution) = explore_and_solve(&product, options, &interrupt)?;
    Ok(assemble(
        pomdp,
        formula,
        Some(automaton),
        Some(product),
        mdp,
        solution,
    ))
}

fn explore_and_solve<M: ParityModel>(
    model: &M,
    options: &AnalysisOptions,
    interrupt: &Interrupt,
) -> Result<(BeliefSuppMdp, Solution), Error> {
    info!("Exploring reachable belief supports");
    let mdp = match options.exploration_strategy {
        ExplorationStrategy::Bfs => {
            explore_with(model, BfsQueue::with_capacity(4096), interrupt)?
        }
        ExplorationStrategy::Dfs => {
            explore_with(model, DfsQueue::with_capacity(4096), interrupt)?
        }
    };
    let mut solver = ParityMdpSolver::new(&mdp, interrupt.clone());
    let solution = solver.almost_sure_win()?;
    Ok((mdp, solution))
}

fn explore_with<M: ParityModel, Q: ExplorationQueue<BeliefIndex>>(
    model: &M,
    queue: Q,
    interrupt: &Interrupt,
) -> Result<BeliefSuppMdp, Error> {
    let mut constructor = MdpConstructor::new(model, queue);
    constructor.explore(interrupt)?;
    trace!("Stats: {}", constructor.stats());
    Ok(constructor.into_mdp())
}

fn assemble(
    pomdp: &Pomdp,
    formula: Option<String>,
    automaton: Option<ParityAutomaton>,
    product: Option<ProductPomdp>,
    mdp: BeliefSuppMdp,
    solution: Solution,
) -> AnalysisResult {
    let mut winning_pomdp_states: Vec<StateIndex> = solution
        .region()
        .iter()
        .filter_map(|&b| mdp.singleton_pomdp_state(b))
        .collect();
    winning_pomdp_states.sort_unstable();
    winning_pomdp_states.dedup();
    let winning_state_names = winning_pomdp_states
        .iter()
        .map(|&s| pomdp.state_name(s).to_owned())
        .collect();
    AnalysisResult {
        formula,
        num_pomdp_states: pomdp.num_states(),
        winning_pomdp_states,
        winning_state_names,
        automaton,
        product,
        mdp,
        solution,
    }
}
