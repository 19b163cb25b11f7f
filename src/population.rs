use std::fmt;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rayon::prelude::*;

use crate::fitness;
use crate::machine::{ExecError, Machine};
use crate::program::{self, Program};

/// Configuration for a program search.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Entries kept unchanged from one generation to the next.
    pub elites: usize,
    /// Slots per elite: the elite itself, one fresh random program, and
    /// `copies - 2` mutated copies.
    pub copies: usize,
    /// Maximum instructions per program execution; 0 is unbounded.
    pub step_limit: usize,
    /// Upper bound on mutations applied to each copy.
    pub max_mutations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            elites: 32,
            copies: 32,
            step_limit: 10_000,
            max_mutations: 1,
        }
    }
}

impl SearchConfig {
    pub fn population_size(&self) -> usize {
        self.elites * self.copies
    }
}

/// One candidate program and the result of its last evaluation.
#[derive(Debug, Default)]
pub struct Entry {
    program: Program,
    output: Vec<u8>,
    steps: usize,
    error: Option<ExecError>,
    fitness: f64,
    success: bool,
    generation: usize,
}

impl Entry {
    fn new(program: Program) -> Self {
        Self {
            program,
            ..Default::default()
        }
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Instructions dispatched by the last evaluation.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn error(&self) -> Option<&ExecError> {
        self.error.as_ref()
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// True if the output equals the target exactly.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Consecutive generations this program's line has survived as an elite.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Run the program and score its output. Failed runs keep no output
    /// and score zero.
    fn evaluate(&mut self, target: &[u8], step_limit: usize) {
        let execution = Machine::new().run_program(self.program.as_bytes(), Some(step_limit));
        match execution.result {
            Ok(()) => {
                self.output = execution.output;
                self.steps = execution.steps;
                self.error = None;
                self.success = self.output == target;
                self.fitness = fitness::score(target, &self.output, self.program.len());
            }
            Err(e) => {
                self.output.clear();
                self.steps = 0;
                self.error = Some(e);
                self.success = false;
                self.fitness = 0.0;
            }
        }
    }
}

impl AsRef<[u8]> for Entry {
    fn as_ref(&self) -> &[u8] {
        self.program.as_bytes()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "output = {:?} fitness = {:.6} runtime = {} generation = {}",
            String::from_utf8_lossy(&self.output),
            self.fitness,
            self.steps,
            self.generation,
        )
    }
}

/// A fixed-size population searching for a program that prints `target`.
///
/// Slots are laid out as `copies` strata of `elites` entries each. After a
/// generation the first stratum holds the elites, and slot `m * elites + i`
/// holds the `m`-th offspring of elite `i`.
pub struct Population {
    entries: Vec<Entry>,
    target: Vec<u8>,
    config: SearchConfig,
    rng: SmallRng,
    generation: usize,
}

impl Population {
    /// Create a population of single random instructions.
    pub fn new(config: SearchConfig, target: impl Into<Vec<u8>>, seed: u64) -> Self {
        let config = SearchConfig {
            elites: config.elites.max(1),
            copies: config.copies.max(1),
            max_mutations: config.max_mutations.max(1),
            ..config
        };
        let mut rng = SmallRng::seed_from_u64(seed);
        let entries = (0..config.population_size())
            .map(|_| Entry::new(Program::random(&mut rng, 1)))
            .collect();
        Self {
            entries,
            target: target.into(),
            config,
            rng,
            generation: 0,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Generations stepped so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The best entry of the last evaluated generation.
    pub fn fittest(&self) -> &Entry {
        &self.entries[0]
    }

    /// The normalized winning program, once the fittest entry matches the
    /// target exactly.
    pub fn success_code(&self) -> Option<Program> {
        let fittest = self.fittest();
        fittest.success.then(|| fittest.program.normalize())
    }

    /// One generation: evaluate every entry, rank by fitness, keep the
    /// elites and regenerate every other slot from them.
    ///
    /// Evaluation runs in parallel and draws no randomness; regeneration is
    /// sequential, so a given seed always produces the same search.
    pub fn evaluate_and_mutate(&mut self) {
        self.evaluate_all();
        self.rank();
        self.regenerate();
        self.generation += 1;
    }

    fn evaluate_all(&mut self) {
        let target = &self.target;
        let step_limit = self.config.step_limit;
        self.entries
            .par_iter_mut()
            .for_each(|entry| entry.evaluate(target, step_limit));
    }

    /// Best first. Stable: ties keep their previous order.
    fn rank(&mut self) {
        self.entries
            .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
    }

    fn regenerate(&mut self) {
        let keep = self.config.elites;
        let copies = self.config.copies;
        let max_mutations = self.config.max_mutations;
        let (elites, offspring) = self.entries.split_at_mut(keep);

        for elite in elites.iter_mut() {
            elite.generation += 1;
        }
        let elites: &[Entry] = elites;
        for m in 1..copies {
            for i in 0..keep {
                let entry = &mut offspring[(m - 1) * keep + i];
                if m == 1 {
                    entry.program = Program::random(&mut self.rng, 1);
                    entry.generation = 0;
                } else {
                    let elite = &elites[i];
                    entry.program.copy_from(elite.program.as_bytes());
                    let times = self.rng.gen_range(1..=max_mutations);
                    program::mutate_times(&mut entry.program, times, &mut self.rng, elites);
                    entry.generation = elite.generation;
                }
            }
        }
    }

    /// Step up to `max_generations` generations, stopping at the first exact
    /// match.
    pub fn run(&mut self, max_generations: usize) -> Option<Program> {
        for _ in 0..max_generations {
            self.evaluate_and_mutate();
            if let Some(code) = self.success_code() {
                return Some(code);
            }
        }
        None
    }

    /// All programs in slot order.
    pub fn programs(&self) -> impl Iterator<Item = &Program> {
        self.entries.iter().map(|e| &e.program)
    }
}
