//! Parser for the POMDP file format.
//!
//! The format is a permissive subset of the pomdp.org grammar without
//! discount factors or rewards, extended with `prio` and `atom` directives
//! for the objective. Matrices may span lines; `#` starts a comment.

use crate::automaton::{ApValuation, Priority};
use crate::pomdp::{ActionIndex, Flavour, ObsIndex, Pomdp, StateIndex, TransitionRow};
use crate::Error;

/// The directive keywords that start a new declaration.
const KEYWORDS: [&str; 8] = [
    "states",
    "actions",
    "observations",
    "start",
    "prio",
    "atom",
    "T",
    "O",
];

/// Atoms are packed into a machine word valuation.
const MAX_ATOMS: usize = ApValuation::BITS as usize;

#[derive(Debug, Copy, Clone)]
struct Token<'a> {
    text: &'a str,
    line: usize,
}

/// Splits the input into whitespace-separated tokens, treating `:` as its
/// own token and stripping `#` comments.
fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    for (i, raw_line) in input.lines().enumerate() {
        let line = i + 1;
        let text = raw_line.split('#').next().unwrap_or("");
        for word in text.split_whitespace() {
            let mut rest = word;
            while let Some(pos) = rest.find(':') {
                if pos > 0 {
                    tokens.push(Token {
                        text: &rest[..pos],
                        line,
                    });
                }
                tokens.push(Token { text: ":", line });
                rest = &rest[pos + 1..];
            }
            if !rest.is_empty() {
                tokens.push(Token { text: rest, line });
            }
        }
    }
    tokens
}

#[derive(Debug, Clone)]
enum StartSpec {
    Uniform,
    Probs(Vec<f64>),
    Single(StateIndex),
    Include(Vec<StateIndex>),
    Exclude(Vec<StateIndex>),
}

/// Parses a POMDP from the textual format.
///
/// # Errors
///
/// Returns a [`Error::Parse`] error with a line number for syntactic
/// problems and a [`Error::Domain`] error for semantic ones (unknown names,
/// `prio` and `atom` in the same file, rows that are not distributions).
pub fn parse(input: &str) -> Result<Pomdp, Error> {
    Parser::new(input).run()
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    states: Vec<String>,
    actions: Vec<String>,
    observations: Vec<String>,
    start: Option<StartSpec>,
    /// State transition probabilities, indexed by action, source, target.
    tmat: Vec<Vec<Vec<f64>>>,
    /// Observation probabilities, indexed by action, target, observation.
    omat: Vec<Vec<Vec<f64>>>,
    priorities: Option<Vec<Priority>>,
    labels: Option<Vec<ApValuation>>,
    atoms: Vec<usize>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            tokens: tokenize(input),
            pos: 0,
            states: Vec::new(),
            actions: Vec::new(),
            observations: Vec::new(),
            start: None,
            tmat: Vec::new(),
            omat: Vec::new(),
            priorities: None,
            labels: None,
            atoms: Vec::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let line = if self.pos < self.tokens.len() {
            self.tokens[self.pos].line
        } else {
            self.tokens.last().map_or(0, |t| t.line)
        };
        Error::Parse {
            line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(|t| t.text)
    }

    fn next(&mut self) -> Result<&'a str, Error> {
        let token = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, text: &str) -> Result<(), Error> {
        let token = self.next()?;
        if token != text {
            self.pos -= 1;
            return Err(self.error(format!("expected '{}', found '{}'", text, token)));
        }
        Ok(())
    }

    fn at_keyword(&self) -> bool {
        match self.peek() {
            Some(token) => KEYWORDS.contains(&token),
            None => true,
        }
    }

    fn run(mut self) -> Result<Pomdp, Error> {
        while let Some(token) = self.peek() {
            match token {
                "states" => {
                    self.pos += 1;
                    self.states = self.parse_identifier_set()?;
                }
                "actions" => {
                    self.pos += 1;
                    self.actions = self.parse_identifier_set()?;
                }
                "observations" => {
                    self.pos += 1;
                    self.observations = self.parse_identifier_set()?;
                }
                "start" => {
                    self.pos += 1;
                    self.parse_start()?;
                }
                "prio" => {
                    self.pos += 1;
                    self.parse_prio()?;
                }
                "atom" => {
                    self.pos += 1;
                    self.parse_atom()?;
                }
                "T" => {
                    self.pos += 1;
                    self.parse_trans()?;
                }
                "O" => {
                    self.pos += 1;
                    self.parse_obs()?;
                }
                other => return Err(self.error(format!("unexpected token '{}'", other))),
            }
        }
        self.finish()
    }

    /// Parses `: <int>` or `: <id> <id> ...` after a set keyword.
    fn parse_identifier_set(&mut self) -> Result<Vec<String>, Error> {
        self.expect(":")?;
        if self.at_keyword() {
            return Err(self.error("expected a count or a list of names"));
        }
        let first = self.next()?;
        if let Ok(count) = first.parse::<usize>() {
            if count == 0 {
                return Err(self.error("count must be positive"));
            }
            return Ok((0..count).map(|i| i.to_string()).collect());
        }
        let mut names = vec![first.to_owned()];
        while !self.at_keyword() && self.peek() != Some(":") {
            names.push(self.next()?.to_owned());
        }
        Ok(names)
    }

    fn parse_start(&mut self) -> Result<(), Error> {
        if self.states.is_empty() {
            return Err(self.error("start before states declaration"));
        }
        match self.peek() {
            Some("include") => {
                self.pos += 1;
                self.expect(":")?;
                let list = self.parse_state_list()?;
                self.start = Some(StartSpec::Include(list));
            }
            Some("exclude") => {
                self.pos += 1;
                self.expect(":")?;
                let list = self.parse_state_list()?;
                self.start = Some(StartSpec::Exclude(list));
            }
            _ => {
                self.expect(":")?;
                if self.peek() == Some("uniform") {
                    self.pos += 1;
                    self.start = Some(StartSpec::Uniform);
                } else if self.peek().map_or(false, |t| t.parse::<f64>().is_ok()) {
                    let probs = self.parse_prob_row(self.states.len())?;
                    self.start = Some(StartSpec::Probs(probs));
                } else {
                    let state = self.parse_state()?;
                    self.start = Some(StartSpec::Single(state));
                }
            }
        }
        Ok(())
    }

    fn parse_prio(&mut self) -> Result<(), Error> {
        if self.states.is_empty() {
            return Err(self.error("prio before states declaration"));
        }
        let priority: Priority = self
            .next()?
            .parse()
            .map_err(|_| self.error("expected a priority"))?;
        self.expect(":")?;
        let list = self.parse_state_list()?;
        let priorities = self
            .priorities
            .get_or_insert_with(|| vec![0; self.states.len()]);
        for s in list {
            priorities[s] = priority;
        }
        Ok(())
    }

    fn parse_atom(&mut self) -> Result<(), Error> {
        if self.observations.is_empty() {
            return Err(self.error("atom before observations declaration"));
        }
        let atom: usize = self
            .next()?
            .parse()
            .map_err(|_| self.error("expected an atom index"))?;
        if atom >= MAX_ATOMS {
            return Err(self.error(format!("at most {} atomic propositions", MAX_ATOMS)));
        }
        self.expect(":")?;
        if self.labels.is_none() {
            self.labels = Some(vec![0; self.observations.len()]);
        }
        if self.at_keyword() {
            return Err(self.error("expected a list of observations"));
        }
        while !self.at_keyword() {
            let token = self.next()?;
            let o = lookup(&self.observations, token, "observation")?;
            self.labels.as_mut().unwrap()[o] |= 1 << atom;
        }
        if !self.atoms.contains(&atom) {
            self.atoms.push(atom);
        }
        Ok(())
    }

    fn parse_trans(&mut self) -> Result<(), Error> {
        if self.states.is_empty() || self.actions.is_empty() {
            return Err(self.error("T before states and actions declarations"));
        }
        let n = self.states.len();
        if self.tmat.is_empty() {
            self.tmat = vec![vec![vec![0.0; n]; n]; self.actions.len()];
        }
        self.expect(":")?;
        let actions = self.parse_action_spec()?;
        if self.peek() == Some(":") {
            self.pos += 1;
            let sources = self.parse_state_spec()?;
            if self.peek() == Some(":") {
                // single entry: T: a : src : dst p
                self.pos += 1;
                let targets = self.parse_state_spec()?;
                let p = self.parse_prob()?;
                for &a in &actions {
                    for &s in &sources {
                        for &d in &targets {
                            self.tmat[a][s][d] = p;
                        }
                    }
                }
            } else if self.peek() == Some("uniform") {
                self.pos += 1;
                for &a in &actions {
                    for &s in &sources {
                        self.tmat[a][s] = vec![1.0 / n as f64; n];
                    }
                }
            } else {
                // row: T: a : src p ... p
                let row = self.parse_prob_row(n)?;
                for &a in &actions {
                    for &s in &sources {
                        self.tmat[a][s] = row.clone();
                    }
                }
            }
        } else if self.peek() == Some("uniform") {
            self.pos += 1;
            for &a in &actions {
                self.tmat[a] = vec![vec![1.0 / n as f64; n]; n];
            }
        } else if self.peek() == Some("identity") {
            self.pos += 1;
            for &a in &actions {
                for s in 0..n {
                    self.tmat[a][s] = (0..n).map(|d| if d == s { 1.0 } else { 0.0 }).collect();
                }
            }
        } else {
            // full matrix: n rows of n probabilities
            for s in 0..n {
                let row = self.parse_prob_row(n)?;
                for &a in &actions {
                    self.tmat[a][s] = row.clone();
                }
            }
        }
        Ok(())
    }

    fn parse_obs(&mut self) -> Result<(), Error> {
        if self.states.is_empty() || self.actions.is_empty() || self.observations.is_empty() {
            return Err(self.error("O before states, actions and observations declarations"));
        }
        let n = self.states.len();
        let z = self.observations.len();
        if self.omat.is_empty() {
            self.omat = vec![vec![vec![0.0; z]; n]; self.actions.len()];
        }
        self.expect(":")?;
        let actions = self.parse_action_spec()?;
        if self.peek() == Some(":") {
            self.pos += 1;
            let targets = self.parse_state_spec()?;
            if self.peek() == Some(":") {
                // single entry: O: a : dst : obs p
                self.pos += 1;
                let observations = self.parse_obs_spec()?;
                let p = self.parse_prob()?;
                for &a in &actions {
                    for &d in &targets {
                        for &o in &observations {
                            self.omat[a][d][o] = p;
                        }
                    }
                }
            } else if self.peek() == Some("uniform") {
                self.pos += 1;
                for &a in &actions {
                    for &d in &targets {
                        self.omat[a][d] = vec![1.0 / z as f64; z];
                    }
                }
            } else {
                // row: O: a : dst p ... p
                let row = self.parse_prob_row(z)?;
                for &a in &actions {
                    for &d in &targets {
                        self.omat[a][d] = row.clone();
                    }
                }
            }
        } else if self.peek() == Some("uniform") {
            self.pos += 1;
            for &a in &actions {
                self.omat[a] = vec![vec![1.0 / z as f64; z]; n];
            }
        } else {
            // full matrix: |S| rows of |Z| probabilities
            for d in 0..n {
                let row = self.parse_prob_row(z)?;
                for &a in &actions {
                    self.omat[a][d] = row.clone();
                }
            }
        }
        Ok(())
    }

    fn parse_action_spec(&mut self) -> Result<Vec<ActionIndex>, Error> {
        let token = self.next()?;
        if token == "*" {
            return Ok((0..self.actions.len()).collect());
        }
        Ok(vec![lookup(&self.actions, token, "action")?])
    }

    fn parse_state_spec(&mut self) -> Result<Vec<StateIndex>, Error> {
        let token = self.next()?;
        if token == "*" {
            return Ok((0..self.states.len()).collect());
        }
        Ok(vec![lookup(&self.states, token, "state")?])
    }

    fn parse_obs_spec(&mut self) -> Result<Vec<ObsIndex>, Error> {
        let token = self.next()?;
        if token == "*" {
            return Ok((0..self.observations.len()).collect());
        }
        Ok(vec![lookup(&self.observations, token, "observation")?])
    }

    fn parse_state(&mut self) -> Result<StateIndex, Error> {
        let token = self.next()?;
        lookup(&self.states, token, "state")
    }

    fn parse_state_list(&mut self) -> Result<Vec<StateIndex>, Error> {
        if self.at_keyword() {
            return Err(self.error("expected a list of states"));
        }
        let mut list = Vec::new();
        while !self.at_keyword() {
            list.push(self.parse_state()?);
        }
        Ok(list)
    }

    fn parse_prob(&mut self) -> Result<f64, Error> {
        let token = self.next()?;
        let p: f64 = token.parse().map_err(|_| {
            self.pos -= 1;
            self.error(format!("expected a probability, found '{}'", token))
        })?;
        if !(0.0..=1.0).contains(&p) {
            self.pos -= 1;
            return Err(self.error(format!("probability {} out of range", p)));
        }
        Ok(p)
    }

    fn parse_prob_row(&mut self, len: usize) -> Result<Vec<f64>, Error> {
        let mut row = Vec::with_capacity(len);
        for _ in 0..len {
            row.push(self.parse_prob()?);
        }
        Ok(row)
    }

    fn finish(self) -> Result<Pomdp, Error> {
        if self.states.is_empty() {
            return Err(Error::Parse {
                line: 0,
                message: "no states declared".into(),
            });
        }
        if self.actions.is_empty() || self.observations.is_empty() {
            return Err(Error::Parse {
                line: 0,
                message: "no actions or no observations declared".into(),
            });
        }
        let n = self.states.len();

        // joint transition: delta(s, a)(s', o) = T(s, a, s') * O(a, s', o)
        let mut trans: Vec<Vec<TransitionRow>> = vec![vec![Vec::new(); self.actions.len()]; n];
        for (a, tmat) in self.tmat.iter().enumerate() {
            for s in 0..n {
                let mut row = TransitionRow::new();
                for (d, &pt) in tmat[s].iter().enumerate() {
                    if pt <= 0.0 {
                        continue;
                    }
                    let obs_row: &[f64] = self.omat.get(a).map_or(&[], |m| m[d].as_slice());
                    if obs_row.iter().all(|&po| po <= 0.0) {
                        return Err(Error::Domain(format!(
                            "no observation distribution for action '{}' and state '{}'",
                            self.actions[a], self.states[d]
                        )));
                    }
                    for (o, &po) in obs_row.iter().enumerate() {
                        if po > 0.0 {
                            row.push(((d, o), pt * po));
                        }
                    }
                }
                trans[s][a] = row;
            }
        }

        let start = match self.start.clone().unwrap_or(StartSpec::Uniform) {
            StartSpec::Uniform => uniform_over((0..n).collect()),
            StartSpec::Probs(probs) => probs
                .into_iter()
                .enumerate()
                .filter(|&(_, p)| p > 0.0)
                .collect(),
            StartSpec::Single(s) => vec![(s, 1.0)],
            StartSpec::Include(list) => uniform_over(list),
            StartSpec::Exclude(list) => {
                uniform_over((0..n).filter(|s| !list.contains(s)).collect())
            }
        };

        let flavour = match (self.priorities, self.labels) {
            (Some(_), Some(_)) => {
                return Err(Error::Domain(
                    "a POMDP may declare prio or atom directives, but not both".into(),
                ))
            }
            (Some(priorities), None) => Flavour::Parity { priorities },
            (None, Some(labels)) => {
                let mut atoms = self.atoms;
                atoms.sort_unstable();
                Flavour::AtomicProp { labels, atoms }
            }
            (None, None) => Flavour::AtomicProp {
                labels: vec![0; self.observations.len()],
                atoms: Vec::new(),
            },
        };

        Pomdp::new(
            self.states,
            self.actions,
            self.observations,
            start,
            trans,
            flavour,
        )
    }
}

fn uniform_over(list: Vec<StateIndex>) -> Vec<(StateIndex, f64)> {
    let p = 1.0 / list.len().max(1) as f64;
    list.into_iter().map(|s| (s, p)).collect()
}

/// Resolves a token as an index or a declared name.
fn lookup(names: &[String], token: &str, kind: &str) -> Result<usize, Error> {
    if let Ok(index) = token.parse::<usize>() {
        if index < names.len() {
            return Ok(index);
        }
        return Err(Error::Domain(format!(
            "{} index {} out of range",
            kind, index
        )));
    }
    names
        .iter()
        .position(|name| name == token)
        .ok_or_else(|| Error::Domain(format!("unknown {} '{}'", kind, token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLIP: &str = "
# deterministic two-state flip
states: left right
actions: go stay
observations: here there

start include: left

T: go : left : right 1.0
T: go : right : left 1.0
T: stay identity

O: * : left : here 1.0
O: * : right : there 1.0

atom 0: here
atom 1: there
";

    #[test]
    fn test_parse_flip() {
        let pomdp = parse(FLIP).unwrap();
        assert_eq!(pomdp.num_states(), 2);
        assert_eq!(pomdp.num_actions(), 2);
        assert_eq!(pomdp.num_observations(), 2);
        assert_eq!(pomdp.start(), &[(0, 1.0)]);
        assert_eq!(pomdp.transitions(0, 0), &[((1, 1), 1.0)]);
        assert_eq!(pomdp.transitions(1, 0), &[((0, 0), 1.0)]);
        assert_eq!(pomdp.transitions(0, 1), &[((0, 0), 1.0)]);
        assert_eq!(pomdp.labels(), Some(&[0b01, 0b10][..]));
        assert_eq!(pomdp.atoms(), &[0, 1]);
    }

    #[test]
    fn test_parse_counts_and_matrix() {
        let input = "
states: 2
actions: 1
observations: 1
start: uniform
T: 0
  0.5 0.5
  0.5 0.5
O: 0 uniform
";
        let pomdp = parse(input).unwrap();
        assert_eq!(pomdp.state_name(0), "0");
        assert_eq!(pomdp.transitions(0, 0), &[((0, 0), 0.5), ((1, 0), 0.5)]);
        assert_eq!(pomdp.start(), &[(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn test_parse_rows_and_wildcards() {
        let input = "
states: a b
actions: x y
observations: o0 o1
start: 0.25 0.75
T: * : a 0.0 1.0
T: * : b 1.0 0.0
O: x : * : o0 1.0
O: y : * : o1 1.0
";
        let pomdp = parse(input).unwrap();
        assert_eq!(pomdp.transitions(0, 0), &[((1, 0), 1.0)]);
        assert_eq!(pomdp.transitions(0, 1), &[((1, 1), 1.0)]);
        assert_eq!(pomdp.transitions(1, 1), &[((0, 1), 1.0)]);
        assert_eq!(pomdp.start(), &[(0, 0.25), (1, 0.75)]);
    }

    #[test]
    fn test_parse_prio_flavour() {
        let input = "
states: s0 s1
actions: a
observations: o
start exclude: s1
T: a uniform
O: a : * : o 1.0
prio 2: s1
";
        let pomdp = parse(input).unwrap();
        assert_eq!(pomdp.priorities(), Some(&[0, 2][..]));
        assert_eq!(pomdp.start(), &[(0, 1.0)]);
    }

    #[test]
    fn test_parse_without_objective_directives() {
        // neither prio nor atom: an atomic-proposition POMDP with an empty
        // atom set and all-false labels
        let input = "
states: s0 s1
actions: a
observations: o0 o1
start: uniform
T: a uniform
O: a : * : o0 0.5
O: a : * : o1 0.5
";
        let pomdp = parse(input).unwrap();
        assert!(matches!(pomdp.flavour(), Flavour::AtomicProp { .. }));
        assert!(pomdp.atoms().is_empty());
        assert!(pomdp.priorities().is_none());
        assert_eq!(pomdp.labels(), Some(&[0, 0][..]));
    }

    #[test]
    fn test_prio_and_atom_conflict() {
        let input = "
states: s0
actions: a
observations: o
T: a identity
O: a : * : o 1.0
prio 2: s0
atom 0: o
";
        assert!(matches!(parse(input), Err(Error::Domain(_))));
    }

    #[test]
    fn test_unknown_state_name() {
        let input = "
states: s0
actions: a
observations: o
T: a : s1 : s0 1.0
O: a : * : o 1.0
";
        assert!(matches!(parse(input), Err(Error::Domain(_))));
    }

    #[test]
    fn test_bad_distribution_is_domain_error() {
        let input = "
states: s0 s1
actions: a
observations: o
T: a : s0 : s1 0.5
T: a : s1 : s0 1.0
O: a : * : o 1.0
";
        assert!(matches!(parse(input), Err(Error::Domain(_))));
    }

    #[test]
    fn test_syntax_error_carries_line() {
        let input = "states: 2\nactions: 1\nobservations: 1\nT: 0 : 0 : 0 nope\n";
        match parse(input) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_observation_row() {
        let input = "
states: 2
actions: 1
observations: 1
T: 0 uniform
";
        assert!(matches!(parse(input), Err(Error::Domain(_))));
    }
}
