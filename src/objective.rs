//! Objective resolution: LTL formulas, TLSF files and atom sets.

use crate::Error;

/// The ω-regular objective of an analysis, as an LTL formula over atomic
/// propositions `p0`, `p1`, … matching the atom indices declared in the
/// POMDP.
#[derive(Debug, Clone)]
pub struct Objective {
    formula: String,
    /// Atom indices declared by a TLSF `INPUTS` section, if any.
    declared_atoms: Option<Vec<usize>>,
}

impl Objective {
    /// Creates an objective from a raw LTL formula.
    pub fn from_ltl(formula: &str) -> Self {
        Self {
            formula: formula.trim().to_owned(),
            declared_atoms: None,
        }
    }

    /// Creates an objective from the contents of a TLSF file.
    ///
    /// Only the `INPUTS` and `GUARANTEES` sections are consumed; multiple
    /// guarantees are conjoined. The TLSF operators `&&` and `||` become
    /// `&` and `|`, and the escape `\!` becomes `!`.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Parse`] error if no guarantee can be extracted.
    pub fn from_tlsf(content: &str) -> Result<Self, Error> {
        let declared_atoms = section(content, "INPUTS").map(|text| {
            let mut atoms: Vec<usize> = text
                .split(';')
                .filter_map(|entry| parse_atom(entry.trim()))
                .collect();
            atoms.sort_unstable();
            atoms.dedup();
            atoms
        });

        let guarantees = section(content, "GUARANTEES")
            .ok_or_else(|| Error::Parse {
                line: 0,
                message: "TLSF file has no GUARANTEES section".into(),
            })?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .filter_map(|line| line.strip_suffix(';').map(str::trim))
            .filter(|formula| !formula.is_empty())
            .map(convert_operators)
            .collect::<Vec<_>>();

        if guarantees.is_empty() {
            return Err(Error::Parse {
                line: 0,
                message: "TLSF file has an empty GUARANTEES section".into(),
            });
        }

        let formula = if guarantees.len() == 1 {
            guarantees.into_iter().next().unwrap()
        } else {
            guarantees
                .iter()
                .map(|g| format!("({})", g))
                .collect::<Vec<_>>()
                .join(" & ")
        };

        Ok(Self {
            formula,
            declared_atoms,
        })
    }

    /// Returns the LTL formula.
    pub fn formula(&self) -> &str {
        &self.formula
    }

    /// Returns the atoms declared by the TLSF `INPUTS` section, if the
    /// objective came from a TLSF file.
    pub fn declared_atoms(&self) -> Option<&[usize]> {
        self.declared_atoms.as_deref()
    }

    /// Returns the sorted set of atom indices mentioned in the formula as
    /// `p<i>` occurrences.
    pub fn formula_atoms(&self) -> Vec<usize> {
        let mut atoms = Vec::new();
        let bytes = self.formula.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'p'
                && (i == 0 || !(bytes[i - 1].is_ascii_alphanumeric() || bytes[i - 1] == b'_'))
            {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                let followed_by_word =
                    end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_');
                if end > start && !followed_by_word {
                    if let Ok(index) = self.formula[start..end].parse() {
                        atoms.push(index);
                    }
                }
                i = end;
            } else {
                i += 1;
            }
        }
        atoms.sort_unstable();
        atoms.dedup();
        atoms
    }
}

/// Extracts the text between the braces of the given TLSF section.
fn section<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let start = content.find(name)? + name.len();
    let rest = &content[start..];
    let open = rest.find('{')?;
    let close = rest[open..].find('}')? + open;
    Some(&rest[open + 1..close])
}

/// Converts TLSF operators and escapes to plain LTL syntax.
fn convert_operators(formula: &str) -> String {
    formula
        .replace("&&", "&")
        .replace("||", "|")
        .replace("\\!", "!")
        .replace("\\&", "&")
        .replace("\\|", "|")
}

/// Parses a TLSF input declaration of the form `p<i>`.
fn parse_atom(entry: &str) -> Option<usize> {
    entry.strip_prefix('p')?.parse().ok()
}
