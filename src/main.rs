use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use bfgen::machine::Machine;
use bfgen::metrics::{
    concatenated, high_order_entropy, instruction_histogram, mean_program_length,
    unique_program_count,
};
use bfgen::population::{Population, SearchConfig};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bfgen", about = "Evolve tape-machine programs that print a target text")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interpret program files, reading input from stdin.
    Run {
        /// Program files, run in order on separate tapes.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Search for a program whose output equals stdin.
    Search {
        /// Max steps per program execution (0 for unbounded).
        #[arg(long, default_value_t = 10_000)]
        runtime: usize,

        /// Max mutations applied to each copy of an elite.
        #[arg(long, default_value_t = 3)]
        manipulate: usize,

        /// Number of generations to run.
        #[arg(long, default_value_t = 10_000)]
        generations: usize,

        /// Random seed for reproducibility (default: random).
        #[arg(long)]
        seed: Option<u64>,

        /// Programs kept unchanged each generation.
        #[arg(long, default_value_t = 32)]
        elites: usize,

        /// Population slots per elite.
        #[arg(long, default_value_t = 32)]
        copies: usize,

        /// Report population diversity every N generations (0 to disable).
        #[arg(long, default_value_t = 100)]
        metrics_interval: usize,
    },
}

/// Split `s` into lines of at most `width` characters, without a trailing
/// newline.
fn wrap_at(s: &str, width: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(width.max(1))
        .map(|line| line.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { files } => run_files(&files),
        Command::Search {
            runtime,
            manipulate,
            generations,
            seed,
            elites,
            copies,
            metrics_interval,
        } => {
            let config = SearchConfig {
                elites,
                copies,
                step_limit: runtime,
                max_mutations: manipulate,
            };
            let seed = seed.unwrap_or_else(rand::random);
            run_search(config, seed, generations, metrics_interval)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run_files(files: &[PathBuf]) -> Result<(), String> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();
    for path in files {
        let file = File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
        Machine::new()
            .interpret(BufReader::new(file), &mut input, &mut output)
            .map_err(|e| format!("{}: {e}", path.display()))?;
    }
    Ok(())
}

fn run_search(
    config: SearchConfig,
    seed: u64,
    generations: usize,
    metrics_interval: usize,
) -> Result<(), String> {
    let mut target = Vec::new();
    io::stdin()
        .read_to_end(&mut target)
        .map_err(|e| format!("reading target: {e}"))?;

    let mut population = Population::new(config, target, seed);
    let pop_size = population.entries().len();
    eprintln!("seed {seed}, {pop_size} programs, {} target bytes", population.target().len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut best: Option<String> = None;

    for generation in 1..=generations {
        population.evaluate_and_mutate();
        writeln!(out, "{generation}: {}", population.fittest()).map_err(|e| e.to_string())?;

        if let Some(code) = population.success_code() {
            let code = code.to_string();
            if best.as_deref() != Some(code.as_str()) {
                writeln!(out, "{}", wrap_at(&code, 80)).map_err(|e| e.to_string())?;
                best = Some(code);
            }
        }

        if metrics_interval > 0 && generation % metrics_interval == 0 {
            let hoe = high_order_entropy(&concatenated(population.programs()));
            let unique = unique_program_count(population.programs());
            let mean_len = mean_program_length(population.programs());
            let (hist, comments) = instruction_histogram(population.programs());
            let ops = b"><+-.,[]"
                .iter()
                .map(|&b| format!("{}{}", b as char, hist[b as usize]))
                .collect::<Vec<_>>()
                .join(" ");
            eprintln!(
                "generation {generation}/{generations}: hoe {hoe:.4}, unique {unique}/{pop_size}, mean length {mean_len:.1}, ops [{ops}], comments {comments}"
            );
        }
    }
    Ok(())
}
