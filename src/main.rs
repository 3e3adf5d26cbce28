//! Command-line interface for the almost-sure POMDP analysis.

use std::io::{self, Write};

use clap::Parser;
use fs_err as fs;
use log::LevelFilter;

use tyto::objective::Objective;
use tyto::options::{AnalysisOptions, CliOptions};
use tyto::pomdp::parser;
use tyto::{analyze, graphviz, Error};

fn main() {
    if let Err(error) = tyto_main() {
        // discard the result as we cannot further propagate a write error
        let _ = writeln!(io::stderr(), "Error: {}", error);
        let code = match error {
            Error::Timeout => 2,
            _ => 1,
        };
        std::process::exit(code);
    }
}

/// Initialize the logging framework with the level for the given number of
/// `-v` flags.
///
/// # Errors
///
/// Returns an error if the logging framework has already been initialized.
fn initialize_logging(verbose: u8) -> io::Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::builder()
        .filter(None, level)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Main function that parses the options, loads the model and objective,
/// runs the analysis and writes the winning states and optional plots.
///
/// # Errors
///
/// Returns any error of the pipeline; the caller maps it to the exit code.
fn tyto_main() -> Result<(), Error> {
    let options = CliOptions::parse();
    initialize_logging(options.verbose)?;

    let content = fs::read_to_string(&options.filename)?;
    let pomdp = parser::parse(&content)?;

    let objective = if let Some(path) = &options.tlsf_file {
        Some(Objective::from_tlsf(&fs::read_to_string(path)?)?)
    } else {
        options.ltl_formula.as_deref().map(Objective::from_ltl)
    };

    let mut analysis_options = AnalysisOptions::from(&options);
    if let Some(text) = &options.atoms {
        analysis_options.atoms = Some(parse_atom_list(text)?);
    }

    let result = analyze(&pomdp, objective.as_ref(), &analysis_options)?;

    writeln!(
        io::stdout(),
        "{}",
        result.winning_state_names().join(" ")
    )?;

    if options.plot {
        fs::create_dir_all(&options.output_dir)?;
        graphviz::write_pomdp(fs::File::create(options.output_dir.join("pomdp.dot"))?, &pomdp)?;
        if let Some(automaton) = result.automaton() {
            graphviz::write_automaton(
                fs::File::create(options.output_dir.join("automaton.dot"))?,
                automaton,
            )?;
        }
        if let Some(product) = result.product() {
            graphviz::write_product(
                fs::File::create(options.output_dir.join("product_pomdp.dot"))?,
                product,
            )?;
        }
        graphviz::write_belief_mdp(
            fs::File::create(options.output_dir.join("belief_support_mdp.dot"))?,
            result.mdp(),
            Some(result.solution()),
        )?;
    }
    Ok(())
}

/// Parses a comma-separated list of atom indices.
fn parse_atom_list(text: &str) -> Result<Vec<usize>, Error> {
    text.split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| Error::Domain(format!("invalid atom index '{}'", part.trim())))
        })
        .collect()
}
