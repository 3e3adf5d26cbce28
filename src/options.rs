//! Options for the analysis pipeline and the command-line interface.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, ValueEnum};

use crate::Interrupt;

/// The order in which undiscovered belief supports are explored.
///
/// The winning region does not depend on the order; only the internal
/// numbering of beliefs does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExplorationStrategy {
    /// Explore beliefs in breadth-first order, i.e. pop the belief that
    /// was discovered the earliest.
    #[default]
    Bfs,
    /// Explore beliefs in depth-first order, i.e. pop the belief that was
    /// discovered the latest.
    Dfs,
}

/// Display with the names used by the argument parser, so that default
/// values render consistently in the help text.
impl fmt::Display for ExplorationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bfs => "bfs",
            Self::Dfs => "dfs",
        };
        write!(f, "{}", name)
    }
}

/// Options controlling the analysis pipeline.
///
/// These options can be used with [`analyze`](crate::analyze).
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// The exploration order for the belief-support construction.
    pub exploration_strategy: ExplorationStrategy,
    /// Wall-clock limit for the whole analysis; `None` disables the limit.
    pub timeout: Option<Duration>,
    /// The external LTL-to-parity translator executable.
    pub translator: String,
    /// Atom indices to declare to the translator. `None` uses the atoms
    /// declared by the POMDP.
    pub atoms: Option<Vec<usize>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            exploration_strategy: ExplorationStrategy::default(),
            timeout: None,
            translator: "ltl2tgba".to_owned(),
            atoms: None,
        }
    }
}

impl AnalysisOptions {
    /// Returns a fresh interrupt handle for one analysis run.
    pub fn interrupt(&self) -> Interrupt {
        match self.timeout {
            Some(timeout) => Interrupt::deadline(timeout),
            None => Interrupt::none(),
        }
    }
}

/// A group of options used for parsing the arguments of the command-line
/// interface.
///
/// For using this crate as a library, use [`AnalysisOptions`] directly
/// instead; this struct only adds input and output options.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct CliOptions {
    /// POMDP filename.
    #[arg(value_name = "FILE")]
    pub filename: PathBuf,
    /// LTL formula over the atomic propositions of the POMDP.
    #[arg(long = "ltl_formula", value_name = "LTL")]
    pub ltl_formula: Option<String>,
    /// TLSF specification file; takes precedence over --ltl_formula.
    #[arg(long = "tlsf_file", value_name = "PATH")]
    pub tlsf_file: Option<PathBuf>,
    /// Comma-separated atom indices to use (default: the atoms declared by
    /// the POMDP).
    #[arg(long = "atoms", value_name = "LIST")]
    pub atoms: Option<String>,
    /// External LTL-to-parity translator executable.
    #[arg(long = "translator", value_name = "PATH", default_value = "ltl2tgba")]
    pub translator: String,
    /// Belief exploration order.
    #[arg(
        long = "exploration",
        value_enum,
        value_name = "ORDER",
        default_value_t = ExplorationStrategy::Bfs
    )]
    pub exploration: ExplorationStrategy,
    /// Wall-clock limit in seconds for the whole analysis.
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 300)]
    pub timeout: u64,
    /// Emit DOT files of the pipeline artefacts.
    #[arg(short = 'p', long = "plot")]
    pub plot: bool,
    /// Directory for the DOT files.
    #[arg(long = "output_dir", value_name = "DIR", default_value = "figs")]
    pub output_dir: PathBuf,
    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl From<&CliOptions> for AnalysisOptions {
    fn from(options: &CliOptions) -> Self {
        Self {
            exploration_strategy: options.exploration,
            timeout: Some(Duration::from_secs(options.timeout)),
            translator: options.translator.clone(),
            atoms: None,
        }
    }
}
