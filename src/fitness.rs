//! Scoring of a program's output against the target.
//!
//! Each leading byte that matches the target exactly is worth 1.0. From the
//! first mismatch on, every position contributes its closeness scaled by a
//! weight that shrinks with each mismatch, so getting early bytes right
//! always dominates getting later bytes close. Surplus output is penalised
//! and exact matches gain a small bonus that favours shorter programs.

/// Weight divisor applied after each mismatching position. Large enough
/// that everything after a mismatch together is worth less than the gap
/// between the closest wrong byte and an exact one.
const MISMATCH_DECAY: f64 = 1024.0;

/// Closeness of two bytes in `[0, 1]`: 1 for equal, 0 for 0 vs 255.
pub fn character_fitness(expected: u8, actual: u8) -> f64 {
    let diff = (f64::from(expected) - f64::from(actual)).abs() / 255.0;
    1.0 - diff
}

/// Fitness of `output` against `target` for a program of `program_len`
/// bytes.
pub fn score(target: &[u8], output: &[u8], program_len: usize) -> f64 {
    let mut fitness = 0.0;
    let mut weight = 1.0;
    let mut exact = true;

    for (&expected, &actual) in target.iter().zip(output) {
        exact = exact && expected == actual;
        if exact {
            fitness += 1.0;
        } else {
            fitness += character_fitness(expected, actual) * weight;
            weight /= MISMATCH_DECAY;
        }
    }

    if output.len() > target.len() {
        let excess = (output.len() - target.len()) as f64;
        fitness -= excess / target.len().max(1) as f64;
    }

    if output == target {
        fitness += brevity_bonus(program_len);
    }

    fitness
}

/// Bonus for an exact match; never reaches the value of one more byte.
pub fn brevity_bonus(program_len: usize) -> f64 {
    1.0 / (10.0 * (program_len + 1) as f64)
}
