//! End-to-end tests for the analysis pipeline.
//!
//! Each scenario pairs an inline POMDP with a hand-built parity automaton,
//! so the suite does not depend on the external LTL translator.

use std::time::Duration;

use tyto::automaton::{LabelExpr, ParityAcceptance, ParityAutomaton};
use tyto::options::AnalysisOptions;
use tyto::pomdp::{parser, Flavour};
use tyto::product::ParityModel;
use tyto::{analyze, analyze_with_automaton, AnalysisResult, Error};

fn ap(i: usize) -> LabelExpr {
    LabelExpr::Ap(i)
}

/// Automaton for `G F p0 & G !p1` in the single-acceptance shape: any
/// occurrence of p1 is fatal, and p0 must recur.
fn gf_p0_and_not_p1() -> ParityAutomaton {
    let mut aut = ParityAutomaton::new(2, ParityAcceptance::SingleAcc);
    let wait = aut.add_state(&[]);
    let acc = aut.add_state(&[0]);
    let dead = aut.add_state(&[]);
    for q in [wait, acc] {
        aut.add_edge(q, ap(1), dead);
        aut.add_edge(q, ap(1).not().and(ap(0)), acc);
        aut.add_edge(q, ap(1).not().and(ap(0).not()), wait);
    }
    aut.add_edge(dead, LabelExpr::True, dead);
    aut.set_initial(wait);
    aut
}

/// Automaton for `G F p0 & G F p1`: alternately awaits p0 and p1, with an
/// accepting state after each completed round.
fn gf_p0_and_gf_p1() -> ParityAutomaton {
    let mut aut = ParityAutomaton::new(2, ParityAcceptance::SingleAcc);
    let w0 = aut.add_state(&[]);
    let w1 = aut.add_state(&[]);
    let acc = aut.add_state(&[0]);
    aut.add_edge(w0, ap(0), w1);
    aut.add_edge(w0, ap(0).not(), w0);
    aut.add_edge(w1, ap(1), acc);
    aut.add_edge(w1, ap(1).not(), w1);
    aut.add_edge(acc, ap(0), w1);
    aut.add_edge(acc, ap(0).not(), w0);
    aut.set_initial(w0);
    aut
}

/// Automaton accepting every word, for objectives that use no atoms.
fn always_accepting() -> ParityAutomaton {
    let mut aut = ParityAutomaton::new(0, ParityAcceptance::SingleAcc);
    let acc = aut.add_state(&[0]);
    aut.add_edge(acc, LabelExpr::True, acc);
    aut
}

/// Automaton for `F p0`.
fn f_p0() -> ParityAutomaton {
    let mut aut = ParityAutomaton::new(1, ParityAcceptance::SingleAcc);
    let wait = aut.add_state(&[]);
    let acc = aut.add_state(&[0]);
    aut.add_edge(wait, ap(0), acc);
    aut.add_edge(wait, ap(0).not(), wait);
    aut.add_edge(acc, LabelExpr::True, acc);
    aut.set_initial(wait);
    aut
}

/// Automaton for the room-alternation objective
/// `G(p0 & X!p0 -> X(!p0 U p1)) & G(p1 & X!p1 -> X(!p1 U p0)) & G F p0 & G F p1`
/// over an alphabet where every observation carries exactly one of p0, p1.
/// Accepting states mark a switch of rooms; valuations outside the one-hot
/// fragment are rejected.
fn room_alternation() -> ParityAutomaton {
    let p0_only = ap(0).and(ap(1).not());
    let p1_only = ap(1).and(ap(0).not());
    let other = ap(0).and(ap(1)).or(ap(0).not().and(ap(1).not()));

    let mut aut = ParityAutomaton::new(2, ParityAcceptance::SingleAcc);
    let init = aut.add_state(&[]);
    let left = aut.add_state(&[]);
    let right = aut.add_state(&[]);
    let left_acc = aut.add_state(&[0]);
    let right_acc = aut.add_state(&[0]);
    let dead = aut.add_state(&[]);

    aut.add_edge(init, p0_only.clone(), left);
    aut.add_edge(init, p1_only.clone(), right);
    aut.add_edge(init, other.clone(), dead);
    for q in [left, left_acc] {
        aut.add_edge(q, p0_only.clone(), left);
        aut.add_edge(q, p1_only.clone(), right_acc);
        aut.add_edge(q, other.clone(), dead);
    }
    for q in [right, right_acc] {
        aut.add_edge(q, p1_only.clone(), right);
        aut.add_edge(q, p0_only.clone(), left_acc);
        aut.add_edge(q, other.clone(), dead);
    }
    aut.add_edge(dead, LabelExpr::True, dead);
    aut.set_initial(init);
    aut
}

/// Revealing tiger: the growls carry the recurring reward, opening the
/// wrong door gets the listener eaten, and the growl observations identify
/// the tiger with probability 0.85 only.
const TIGER: &str = "
states: init tiger-left tiger-right
actions: listen open-left open-right
observations: silence growl-left growl-right eaten

start include: init

T: listen : init 0.0 0.5 0.5
T: listen : tiger-left : tiger-left 1.0
T: listen : tiger-right : tiger-right 1.0
T: open-left : init : init 1.0
T: open-left : tiger-left : tiger-left 1.0
T: open-left : tiger-right : init 1.0
T: open-right : init : init 1.0
T: open-right : tiger-left : init 1.0
T: open-right : tiger-right : tiger-right 1.0

O: listen : init : silence 1.0
O: listen : tiger-left 0.0 0.85 0.15 0.0
O: listen : tiger-right 0.0 0.15 0.85 0.0
O: open-left : init : silence 1.0
O: open-left : tiger-left : eaten 1.0
O: open-left : tiger-right : silence 1.0
O: open-right : init : silence 1.0
O: open-right : tiger-left : silence 1.0
O: open-right : tiger-right : eaten 1.0

atom 0: growl-left growl-right
atom 1: eaten
";

/// Two-room corridor: moves are noisy within the target room, the
/// observation names the exact position and the atoms name the room.
const CORRIDOR: &str = "
states: l0 l1 r0 r1
actions: go-left go-right
observations: at-l0 at-l1 at-r0 at-r1

start: uniform

T: go-left : * 0.5 0.5 0.0 0.0
T: go-right : * 0.0 0.0 0.5 0.5

O: * : l0 : at-l0 1.0
O: * : l1 : at-l1 1.0
O: * : r0 : at-r0 1.0
O: * : r1 : at-r1 1.0

atom 0: at-l0 at-l1
atom 1: at-r0 at-r1
";

/// Repeating revealing tiger: growls are fully revealing here, the jackpot
/// pays the reward and resets, and the caught state is terminal.
const TIGER_REPEATING: &str = "
states: init tiger-left tiger-right jackpot caught
actions: listen open-left open-right
observations: null growl-left growl-right reward eaten

start include: init

T: listen : init 0.0 0.5 0.5 0.0 0.0
T: listen : tiger-left : tiger-left 1.0
T: listen : tiger-right : tiger-right 1.0
T: listen : jackpot : init 1.0
T: listen : caught : caught 1.0
T: open-left : init : caught 1.0
T: open-left : tiger-left : caught 1.0
T: open-left : tiger-right : jackpot 1.0
T: open-left : jackpot : init 1.0
T: open-left : caught : caught 1.0
T: open-right : init : caught 1.0
T: open-right : tiger-left : jackpot 1.0
T: open-right : tiger-right : caught 1.0
T: open-right : jackpot : init 1.0
T: open-right : caught : caught 1.0

O: * : init : null 1.0
O: listen : tiger-left 0.15 0.85 0.0 0.0 0.0
O: listen : tiger-right 0.15 0.0 0.85 0.0 0.0
O: open-left : tiger-left : null 1.0
O: open-left : tiger-right : null 1.0
O: open-right : tiger-left : null 1.0
O: open-right : tiger-right : null 1.0
O: * : jackpot : reward 1.0
O: * : caught : eaten 1.0

atom 0: reward
atom 1: eaten
";

/// Blind MDP: every emitted observation is `null`, so the labelled target
/// observation never arrives and no belief ever certifies p0, even though
/// the goal state itself is reachable.
const BLIND_CHAIN: &str = "
states: s0 s1 goal
actions: a b
observations: null reached

start include: s0

T: a : s0 : s1 1.0
T: a : s1 : goal 1.0
T: a : goal : goal 1.0
T: b identity

O: * : * : null 1.0

atom 0: reached
";

/// POMDP without `prio` or `atom` directives: an atomic-proposition POMDP
/// with an empty atom set.
const NO_DIRECTIVES: &str = "
states: s0
actions: a
observations: o

start include: s0

T: a identity
O: a : * : o 1.0
";

/// Blind MDP with priorities directly on states: the even-priority goal is
/// unreachable, so nothing wins.
const BLIND: &str = "
states: s0 s1 goal
actions: a b
observations: null

start include: s0

T: a : s0 : s1 1.0
T: a : s1 : s0 1.0
T: a : goal : goal 1.0
T: b identity

O: * : * : null 1.0

prio 1: s0 s1
prio 2: goal
";

/// Deterministic two-state flip with revealing observations.
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
atom 1: there
";

/// Singleton POMDP with a self-loop whose only observation satisfies p0.
const SINGLETON: &str = "
states: only
actions: wait
observations: tick

start include: only

T: wait : only : only 1.0
O: wait : only : tick 1.0

atom 0: tick
";

/// Runs the pipeline on an inline POMDP with a hand-built automaton.
fn run(pomdp_src: &str, automaton: ParityAutomaton) -> AnalysisResult {
    let pomdp = parser::parse(pomdp_src).expect("POMDP does not parse");
    analyze_with_automaton(&pomdp, automaton, &AnalysisOptions::default())
        .expect("analysis failed")
}

/// Checks the winning set and the structural properties every scenario has
/// to satisfy.
fn verify_scenario(pomdp_src: &str, automaton: ParityAutomaton, expected: &[&str]) {
    let result = run(pomdp_src, automaton);
    let names: Vec<&str> = result
        .winning_state_names()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(names, expected);

    let mdp = result.mdp();
    let solution = result.solution();
    assert!(solution.region().len() <= mdp.num_states());

    // every winning belief has a reachability strategy that stays in the
    // winning region
    for &b in solution.region() {
        let actions = solution
            .reach_strategy()
            .actions(b)
            .expect("winning belief without strategy");
        assert!(!actions.is_empty());
        for &a in actions {
            assert!(!mdp.successors(b, a).is_empty());
            for &d in mdp.successors(b, a) {
                assert!(solution.is_winning(d));
            }
        }
    }

    // every MEC strategy keeps play inside its component
    for family in solution.mec_families() {
        for (b, actions) in family.strategy().iter() {
            let mec = family
                .mecs()
                .iter()
                .find(|mec| mec.contains(&b))
                .expect("strategy entry outside every MEC");
            for &a in actions {
                for &d in mdp.successors(b, a) {
                    assert!(mec.contains(&d));
                }
            }
        }
    }

    // the priority of a belief is the maximal priority over its support
    if let Some(product) = result.product() {
        for b in 0..mdp.num_states() {
            let expected_priority = mdp
                .belief(b)
                .iter()
                .map(|&s| product.priority(s))
                .max()
                .unwrap();
            assert_eq!(mdp.priority(b), expected_priority);
        }
    }
}

macro_rules! scenario_tests {
    ($($name:ident: ($pomdp:expr, $automaton:expr, $expected:expr),)*) => {
        $(
            #[test]
            fn $name() {
                verify_scenario($pomdp, $automaton, $expected);
            }
        )*
    }
}

scenario_tests! {
    revealing_tiger: (TIGER, gf_p0_and_not_p1(), &["init"]),
    corridor_recurrence: (CORRIDOR, gf_p0_and_gf_p1(), &["l0", "l1", "r0", "r1"]),
    corridor_alternation: (CORRIDOR, room_alternation(), &["l0", "l1", "r0", "r1"]),
    tiger_repeating: (
        TIGER_REPEATING,
        gf_p0_and_not_p1(),
        &["init", "tiger-left", "tiger-right", "jackpot"]
    ),
    blind_chain: (BLIND_CHAIN, f_p0(), &[]),
    flip_recurrence: (FLIP, gf_p0_and_gf_p1(), &["left", "right"]),
    singleton_self_loop: (SINGLETON, f_p0(), &["only"]),
}

#[test]
fn test_blindness_defeats_reachability() {
    // the goal is reachable in two steps, but the observations cannot
    // distinguish it, so the automaton never leaves its waiting state
    let result = run(BLIND_CHAIN, f_p0());
    assert!(result.solution().region().is_empty());
    let mdp = result.mdp();
    for b in 0..mdp.num_states() {
        assert_eq!(mdp.priority(b), 1);
    }
}

#[test]
fn test_pomdp_without_directives_is_analysable() {
    let pomdp = parser::parse(NO_DIRECTIVES).unwrap();
    assert!(matches!(pomdp.flavour(), Flavour::AtomicProp { .. }));
    assert!(pomdp.atoms().is_empty());
    let result =
        analyze_with_automaton(&pomdp, always_accepting(), &AnalysisOptions::default()).unwrap();
    let names: Vec<&str> = result
        .winning_state_names()
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(names, ["s0"]);
}

#[test]
fn test_singleton_whole_mdp_wins() {
    let result = run(SINGLETON, f_p0());
    // every reachable belief is winning, including the initial one
    assert_eq!(
        result.solution().region().len(),
        result.mdp().num_states()
    );
    assert!(result.solution().is_winning(result.mdp().initial()));
}

#[test]
fn test_blind_parity_pomdp_loses() {
    let pomdp = parser::parse(BLIND).unwrap();
    let result = analyze(&pomdp, None, &AnalysisOptions::default()).unwrap();
    assert!(result.winning_state_names().is_empty());
    assert!(result.solution().region().is_empty());
    assert!(result.automaton().is_none());
}

#[test]
fn test_product_size_invariant() {
    let pomdp = parser::parse(CORRIDOR).unwrap();
    let automaton = gf_p0_and_gf_p1();
    let num_automaton_states = automaton.num_states();
    let result =
        analyze_with_automaton(&pomdp, automaton, &AnalysisOptions::default()).unwrap();
    let product = result.product().unwrap();
    assert_eq!(
        product.num_states(),
        pomdp.num_states() * num_automaton_states
    );
}

#[test]
fn test_deterministic_chain_matches_product_reachability() {
    // with deterministic transitions and revealing observations, every
    // belief is a singleton and the MDP mirrors the reachable product part
    let result = run(FLIP, gf_p0_and_gf_p1());
    let mdp = result.mdp();
    assert_eq!(mdp.num_states(), 4);
    for b in 0..mdp.num_states() {
        assert_eq!(mdp.belief(b).len(), 1);
    }
}

#[test]
fn test_tiger_strategy_never_opens() {
    let result = run(TIGER, gf_p0_and_not_p1());
    let mdp = result.mdp();
    let solution = result.solution();
    // the belief where the tiger may be behind either door only listens
    let listening = (0..mdp.num_states())
        .find(|&b| mdp.belief(b).len() == 2 && solution.is_winning(b))
        .expect("no winning two-state belief");
    assert_eq!(solution.reach_strategy().actions(listening), Some(&[0][..]));
}

#[test]
fn test_rerunning_is_deterministic() {
    let first = run(CORRIDOR, gf_p0_and_gf_p1());
    let second = run(CORRIDOR, gf_p0_and_gf_p1());
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn test_atomic_prop_pomdp_requires_objective() {
    let pomdp = parser::parse(CORRIDOR).unwrap();
    let result = analyze(&pomdp, None, &AnalysisOptions::default());
    assert!(matches!(result, Err(Error::Domain(_))));
}

#[test]
fn test_missing_translator_is_reported() {
    let pomdp = parser::parse(CORRIDOR).unwrap();
    let objective = tyto::objective::Objective::from_ltl("G F p0 & G F p1");
    let options = AnalysisOptions {
        translator: "nonexistent-ltl-translator".to_owned(),
        ..AnalysisOptions::default()
    };
    let result = analyze(&pomdp, Some(&objective), &options);
    assert!(matches!(result, Err(Error::Translator(_))));
}

#[test]
fn test_zero_timeout_aborts() {
    let pomdp = parser::parse(CORRIDOR).unwrap();
    let options = AnalysisOptions {
        timeout: Some(Duration::from_secs(0)),
        ..AnalysisOptions::default()
    };
    let result = analyze_with_automaton(&pomdp, gf_p0_and_gf_p1(), &options);
    assert!(matches!(result, Err(Error::Timeout)));
}

#[test]
fn test_plot_files_are_written() {
    let dir = tempfile::tempdir().unwrap();
    let pomdp = parser::parse(FLIP).unwrap();
    let result =
        analyze_with_automaton(&pomdp, gf_p0_and_gf_p1(), &AnalysisOptions::default()).unwrap();

    let belief_path = dir.path().join("belief_support_mdp.dot");
    let file = std::fs::File::create(&belief_path).unwrap();
    tyto::graphviz::write_belief_mdp(file, result.mdp(), Some(result.solution())).unwrap();
    let automaton_path = dir.path().join("automaton.dot");
    let file = std::fs::File::create(&automaton_path).unwrap();
    tyto::graphviz::write_automaton(file, result.automaton().unwrap()).unwrap();

    let belief_dot = std::fs::read_to_string(&belief_path).unwrap();
    assert!(belief_dot.contains("digraph belief_support_mdp"));
    assert!(belief_dot.contains("palegreen"));
    let automaton_dot = std::fs::read_to_string(&automaton_path).unwrap();
    assert!(automaton_dot.contains("digraph automaton"));
}
