//! Adapter for the external LTL-to-parity translator.
//!
//! The translator is an opaque service: it is handed an LTL formula and
//! returns a complete deterministic parity automaton with state-based
//! acceptance in HOA format. Any `ltl2tgba`-compatible executable works.

use std::process::Command;

use log::{debug, info};

use crate::automaton::{hoa, ParityAutomaton};
use crate::Error;

/// Arguments requesting a complete deterministic parity automaton with
/// state-based acceptance.
const TRANSLATOR_ARGS: [&str; 3] = ["--parity=max even", "--complete", "--sbacc"];

/// Runs the external translator on the given formula and adapts its output
/// onto the given atom indices.
///
/// # Errors
///
/// Returns a [`Error::Translator`] error if the translator cannot be run or
/// produces unparseable output, and a [`Error::AlphabetMismatch`] error if
/// its propositions do not match the declared atoms.
pub fn translate(program: &str, formula: &str, atoms: &[usize]) -> Result<ParityAutomaton, Error> {
    info!("Translating formula with '{}': {}", program, formula);
    let output = Command::new(program)
        .args(TRANSLATOR_ARGS)
        .arg(formula)
        .output()
        .map_err(|e| Error::Translator(format!("failed to run '{}': {}", program, e)))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Translator(format!(
            "'{}' failed: {}",
            program,
            stderr.trim()
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    from_hoa(&text, atoms)
}

/// Builds the automaton from translator output, renaming the translator's
/// proposition order onto the POMDP atom indices.
///
/// # Errors
///
/// See [`translate`].
pub fn from_hoa(text: &str, atoms: &[usize]) -> Result<ParityAutomaton, Error> {
    let hoa = hoa::parse(text)?;
    let mut mapping = Vec::with_capacity(hoa.ap_names.len());
    for name in &hoa.ap_names {
        let index = parse_atom_name(name).ok_or_else(|| {
            Error::AlphabetMismatch(format!(
                "translator proposition '{}' is not of the form p<i>",
                name
            ))
        })?;
        if !atoms.contains(&index) {
            return Err(Error::AlphabetMismatch(format!(
                "translator proposition '{}' is not a declared atom of the POMDP",
                name
            )));
        }
        mapping.push(index);
    }
    let num_aps = atoms.iter().max().map_or(0, |&m| m + 1);
    let mut automaton = hoa.automaton;
    automaton.rename_aps(&mapping, num_aps)?;
    debug!(
        "Automaton has {} states, max priority {}",
        automaton.num_states(),
        automaton.max_priority()
    );
    Ok(automaton)
}

/// Extracts the atom index from a proposition name of the form `p<i>`.
fn parse_atom_name(name: &str) -> Option<usize> {
    name.strip_prefix('p')?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOA: &str = r#"HOA: v1
States: 1
Start: 0
AP: 2 "p1" "p0"
acc-name: Buchi
Acceptance: 1 Inf(0)
--BODY--
State: 0 {0}
[0 & !1] 0
[!0 | 1] 0
--END--
"#;

    #[test]
    fn test_proposition_renaming() {
        let aut = from_hoa(HOA, &[0, 1]).unwrap();
        assert_eq!(aut.num_aps(), 2);
        // HOA proposition 0 is "p1", proposition 1 is "p0": the guard
        // `0 & !1` therefore reads "p1 and not p0" after renaming
        assert_eq!(aut.successor(0, 0b10), Some(0));
    }

    #[test]
    fn test_undeclared_atom_is_mismatch() {
        assert!(matches!(
            from_hoa(HOA, &[0]),
            Err(Error::AlphabetMismatch(_))
        ));
    }

    #[test]
    fn test_atom_names() {
        assert_eq!(parse_atom_name("p0"), Some(0));
        assert_eq!(parse_atom_name("p12"), Some(12));
        assert_eq!(parse_atom_name("q0"), None);
        assert_eq!(parse_atom_name("p"), None);
    }
}
