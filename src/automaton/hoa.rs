//! Parser for automata in the HOA (Hanoi Omega-Automata) format, as
//! produced by the external LTL-to-parity translator.
//!
//! Only the subset the translator emits is supported: version 1, a single
//! initial state, state-based acceptance sets and explicitly labelled edges.

use crate::automaton::{AutStateIndex, LabelExpr, ParityAcceptance, ParityAutomaton};
use crate::Error;

/// A parsed HOA automaton together with the names of its atomic
/// propositions, in HOA declaration order.
#[derive(Debug)]
pub struct HoaAutomaton {
    /// The automaton, with guards indexed by HOA proposition order.
    pub automaton: ParityAutomaton,
    /// The declared proposition names; guard index `i` refers to
    /// `ap_names[i]`.
    pub ap_names: Vec<String>,
}

fn malformed(message: impl Into<String>) -> Error {
    Error::Translator(format!("malformed HOA input: {}", message.into()))
}

/// Parses an automaton in HOA format.
///
/// # Errors
///
/// Returns a [`Error::Translator`] error if the input is not in the
/// supported HOA subset.
pub fn parse(input: &str) -> Result<HoaAutomaton, Error> {
    let mut num_states = None;
    let mut initial = None;
    let mut ap_names: Option<Vec<String>> = None;
    let mut num_acc_sets = None;

    let mut lines = input.lines().map(str::trim);
    for line in &mut lines {
        if line == "--BODY--" {
            break;
        }
        let (key, value) = match line.split_once(':') {
            Some(pair) => pair,
            None if line.is_empty() => continue,
            None => return Err(malformed(format!("unexpected header line '{}'", line))),
        };
        let value = value.trim();
        match key {
            "HOA" => {
                if value != "v1" {
                    return Err(malformed(format!("unsupported version '{}'", value)));
                }
            }
            "States" => num_states = Some(parse_int(value)?),
            "Start" => {
                if initial.is_some() || value.contains('&') || value.contains(' ') {
                    return Err(malformed("more than one initial state"));
                }
                initial = Some(parse_int(value)?);
            }
            "AP" => ap_names = Some(parse_ap_line(value)?),
            "Acceptance" => {
                let count = value
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| malformed("empty Acceptance header"))?;
                num_acc_sets = Some(parse_int(count)?);
            }
            // tool, name, acc-name, properties and other headers carry no
            // information the pipeline needs
            _ => (),
        }
    }

    let num_states = num_states.ok_or_else(|| malformed("missing States header"))?;
    let initial = initial.ok_or_else(|| malformed("missing Start header"))?;
    let ap_names = ap_names.unwrap_or_default();
    let num_acc_sets = num_acc_sets.ok_or_else(|| malformed("missing Acceptance header"))?;
    if initial >= num_states {
        return Err(malformed("initial state out of range"));
    }

    let acceptance = if num_acc_sets == 1 {
        ParityAcceptance::SingleAcc
    } else {
        ParityAcceptance::Parity
    };

    let mut acc_sets: Vec<Vec<usize>> = vec![Vec::new(); num_states];
    let mut edges: Vec<Vec<(LabelExpr, AutStateIndex)>> = vec![Vec::new(); num_states];
    let mut current: Option<AutStateIndex> = None;

    for line in &mut lines {
        if line == "--END--" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix("State:") {
            let (index, sets) = parse_state_line(rest.trim())?;
            if index >= num_states {
                return Err(malformed(format!("state {} out of range", index)));
            }
            acc_sets[index] = sets;
            current = Some(index);
        } else if line.starts_with('[') {
            let q = current.ok_or_else(|| malformed("edge before any state"))?;
            let (guard, successor) = parse_edge_line(line, ap_names.len())?;
            if successor >= num_states {
                return Err(malformed(format!("successor {} out of range", successor)));
            }
            edges[q].push((guard, successor));
        } else {
            return Err(malformed(format!("unexpected body line '{}'", line)));
        }
    }

    let mut automaton = ParityAutomaton::new(ap_names.len(), acceptance);
    for sets in &acc_sets {
        automaton.add_state(sets);
    }
    automaton.set_initial(initial);
    for (q, state_edges) in edges.into_iter().enumerate() {
        for (guard, successor) in state_edges {
            automaton.add_edge(q, guard, successor);
        }
    }

    Ok(HoaAutomaton {
        automaton,
        ap_names,
    })
}

fn parse_int(text: &str) -> Result<usize, Error> {
    text.parse()
        .map_err(|_| malformed(format!("expected integer, found '{}'", text)))
}

/// Parses the value of an `AP:` header: a count followed by quoted names.
fn parse_ap_line(value: &str) -> Result<Vec<String>, Error> {
    let mut parts = value.splitn(2, char::is_whitespace);
    let count = parse_int(parts.next().unwrap_or(""))?;
    let rest = parts.next().unwrap_or("");
    let mut names = Vec::with_capacity(count);
    let mut chars = rest.chars();
    loop {
        match chars.next() {
            None => break,
            Some('"') => {
                let name: String = chars.by_ref().take_while(|&c| c != '"').collect();
                names.push(name);
            }
            Some(c) if c.is_whitespace() => (),
            Some(c) => return Err(malformed(format!("unexpected character '{}' in AP header", c))),
        }
    }
    if names.len() != count {
        return Err(malformed(format!(
            "AP header declares {} propositions but names {}",
            count,
            names.len()
        )));
    }
    Ok(names)
}

/// Parses the remainder of a `State:` line: the state index, an optional
/// quoted name and optional acceptance sets in braces.
fn parse_state_line(rest: &str) -> Result<(AutStateIndex, Vec<usize>), Error> {
    if rest.starts_with('[') {
        return Err(malformed("state labels are not supported"));
    }
    let (head, sets_text) = match rest.split_once('{') {
        Some((head, tail)) => {
            let sets = tail
                .strip_suffix('}')
                .ok_or_else(|| malformed("unterminated acceptance sets"))?;
            (head, Some(sets))
        }
        None => (rest, None),
    };
    // drop an optional quoted state name
    let head = match head.split_once('"') {
        Some((before, _)) => before,
        None => head,
    };
    let index = parse_int(head.trim())?;
    let mut sets = Vec::new();
    if let Some(text) = sets_text {
        for part in text.split_whitespace() {
            sets.push(parse_int(part)?);
        }
    }
    Ok((index, sets))
}

/// Parses an edge line of the form `[guard] successor`.
fn parse_edge_line(line: &str, num_aps: usize) -> Result<(LabelExpr, AutStateIndex), Error> {
    let rest = &line[1..];
    let end = rest
        .find(']')
        .ok_or_else(|| malformed("unterminated edge guard"))?;
    let guard = parse_guard(&rest[..end], num_aps)?;
    let target = rest[end + 1..].trim();
    if target.contains('{') {
        return Err(malformed("edge acceptance sets are not supported"));
    }
    if target.contains('&') {
        return Err(malformed("universal branching is not supported"));
    }
    Ok((guard, parse_int(target)?))
}

/// Recursive-descent parser for guard expressions over `!`, `&`, `|`,
/// parentheses, `t`, `f` and proposition indices.
fn parse_guard(text: &str, num_aps: usize) -> Result<LabelExpr, Error> {
    let mut parser = GuardParser {
        chars: text.chars().collect(),
        pos: 0,
        num_aps,
    };
    let expr = parser.disjunction()?;
    parser.skip_whitespace();
    if parser.pos != parser.chars.len() {
        return Err(malformed(format!("trailing input in guard '{}'", text)));
    }
    Ok(expr)
}

struct GuardParser {
    chars: Vec<char>,
    pos: usize,
    num_aps: usize,
}

impl GuardParser {
    fn skip_whitespace(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn disjunction(&mut self) -> Result<LabelExpr, Error> {
        let mut expr = self.conjunction()?;
        while self.peek() == Some('|') {
            self.pos += 1;
            expr = expr.or(self.conjunction()?);
        }
        Ok(expr)
    }

    fn conjunction(&mut self) -> Result<LabelExpr, Error> {
        let mut expr = self.atom()?;
        while self.peek() == Some('&') {
            self.pos += 1;
            expr = expr.and(self.atom()?);
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<LabelExpr, Error> {
        match self.peek() {
            Some('!') => {
                self.pos += 1;
                Ok(self.atom()?.not())
            }
            Some('(') => {
                self.pos += 1;
                let expr = self.disjunction()?;
                if self.peek() != Some(')') {
                    return Err(malformed("unbalanced parentheses in guard"));
                }
                self.pos += 1;
                Ok(expr)
            }
            Some('t') => {
                self.pos += 1;
                Ok(LabelExpr::True)
            }
            Some('f') => {
                self.pos += 1;
                Ok(LabelExpr::False)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .chars
                    .get(self.pos)
                    .map_or(false, |c| c.is_ascii_digit())
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                let index: usize = text
                    .parse()
                    .map_err(|_| malformed(format!("bad proposition index '{}'", text)))?;
                if index >= self.num_aps {
                    return Err(malformed(format!(
                        "proposition index {} not declared in AP header",
                        index
                    )));
                }
                Ok(LabelExpr::Ap(index))
            }
            other => Err(malformed(format!("unexpected guard token {:?}", other))),
        }
    }
}
