//! DOT output for the pipeline artefacts.

use std::io::{self, Write};

use crate::automaton::ParityAutomaton;
use crate::mdp::BeliefSuppMdp;
use crate::pomdp::Pomdp;
use crate::product::{ParityModel, ProductPomdp};
use crate::solver::Solution;

/// Writes the POMDP as a graph: states as solid nodes, observations as
/// dotted nodes reached by the transitions emitting them.
pub fn write_pomdp<W: Write>(mut writer: W, pomdp: &Pomdp) -> io::Result<()> {
    writeln!(writer, "digraph pomdp {{")?;
    for s in 0..pomdp.num_states() {
        writeln!(writer, "  {} [label=\"{}\"];", s, pomdp.state_name(s))?;
    }
    for o in 0..pomdp.num_observations() {
        writeln!(
            writer,
            "  {} [style=\"dotted\", label=\"{}\"];",
            pomdp.num_states() + o,
            pomdp.observation_name(o)
        )?;
    }
    for s in 0..pomdp.num_states() {
        for a in 0..pomdp.num_actions() {
            for &((dst, obs), p) in pomdp.transitions(s, a) {
                writeln!(
                    writer,
                    "  {} -> {} [label=\"{} : {}\"];",
                    s,
                    dst,
                    pomdp.action_name(a),
                    p
                )?;
                writeln!(
                    writer,
                    "  {} -> {} [style=\"dotted\", label=\"{}\"];",
                    dst,
                    pomdp.num_states() + obs,
                    pomdp.action_name(a)
                )?;
            }
        }
    }
    writeln!(writer, "}}")
}

/// Writes the parity automaton with priorities on states and guards on
/// edges. The initial state is drawn with a double border.
pub fn write_automaton<W: Write>(mut writer: W, automaton: &ParityAutomaton) -> io::Result<()> {
    writeln!(writer, "digraph automaton {{")?;
    for q in 0..automaton.num_states() {
        let peripheries = if q == automaton.initial_state() { 2 } else { 1 };
        writeln!(
            writer,
            "  {} [label=\"{} : {}\", peripheries={}];",
            q,
            q,
            automaton.priority(q),
            peripheries
        )?;
    }
    for q in 0..automaton.num_states() {
        for (guard, successor) in automaton.edges(q) {
            writeln!(writer, "  {} -> {} [label=\"{}\"];", q, successor, guard)?;
        }
    }
    writeln!(writer, "}}")
}

/// Writes the product POMDP with its per-state priorities.
pub fn write_product<W: Write>(mut writer: W, product: &ProductPomdp) -> io::Result<()> {
    writeln!(writer, "digraph product_pomdp {{")?;
    for s in 0..product.num_states() {
        writeln!(
            writer,
            "  {} [label=\"{} : {}\"];",
            s,
            product.state_name(s),
            product.priority(s)
        )?;
    }
    for s in 0..product.num_states() {
        for a in 0..product.num_actions() {
            for &((dst, obs), p) in product.transitions(s, a) {
                writeln!(
                    writer,
                    "  {} -> {} [label=\"{} : {} / {}\"];",
                    s,
                    dst,
                    product.action_name(a),
                    p,
                    product.observation_name(obs)
                )?;
            }
        }
    }
    writeln!(writer, "}}")
}

/// Writes the belief-support MDP. With a solution, winning beliefs are
/// filled light blue, members of a good MEC pale green; edges chosen by a
/// MEC-staying strategy are green and edges chosen by the reachability
/// strategy blue.
pub fn write_belief_mdp<W: Write>(
    mut writer: W,
    mdp: &BeliefSuppMdp,
    solution: Option<&Solution>,
) -> io::Result<()> {
    let in_mec = |b: usize| {
        solution.map_or(false, |s| {
            s.mec_families()
                .iter()
                .any(|family| family.strategy().actions(b).is_some())
        })
    };

    writeln!(writer, "digraph belief_support_mdp {{")?;
    writeln!(writer, "  rankdir=LR;")?;
    for b in 0..mdp.num_states() {
        let mut color = "white";
        if solution.map_or(false, |s| s.is_winning(b)) {
            color = "lightblue";
        }
        if in_mec(b) {
            color = "palegreen";
        }
        writeln!(
            writer,
            "  {} [label=\"B{}: {}\\nprio={}\", style=\"filled\", fillcolor=\"{}\"];",
            b,
            b,
            mdp.pretty_name(b),
            mdp.priority(b),
            color
        )?;
    }
    for b in 0..mdp.num_states() {
        for a in 0..mdp.num_actions() {
            let mut edge_color = "gray";
            if let Some(solution) = solution {
                let mec_choice = solution
                    .mec_families()
                    .iter()
                    .find_map(|family| family.strategy().actions(b));
                if let Some(actions) = mec_choice {
                    if actions.contains(&a) {
                        edge_color = "green";
                    }
                } else if solution
                    .reach_strategy()
                    .actions(b)
                    .map_or(false, |actions| actions.contains(&a))
                {
                    edge_color = "blue";
                }
            }
            for &dst in mdp.successors(b, a) {
                writeln!(
                    writer,
                    "  {} -> {} [color=\"{}\", label=\"{}\"];",
                    b,
                    dst,
                    edge_color,
                    mdp.action_name(a)
                )?;
            }
        }
    }
    writeln!(writer, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pomdp::parser;

    #[test]
    fn test_pomdp_dot_is_wellformed() {
        let pomdp = parser::parse(
            "
states: s0 s1
actions: a
observations: o
start: uniform
T: a uniform
O: a : * : o 1.0
atom 0: o
",
        )
        .unwrap();
        let mut out = Vec::new();
        write_pomdp(&mut out, &pomdp).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph pomdp {"));
        assert!(text.trim_end().ends_with('}'));
        assert!(text.contains("label=\"s0\""));
        assert!(text.contains("style=\"dotted\""));
    }
}
