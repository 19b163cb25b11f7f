//! Diversity measures over a population's programs.

use std::collections::HashSet;

use crate::machine::is_instruction;
use crate::program::Program;

/// Compute the high-order entropy (HOE) of a byte slice.
///
/// HOE = compressed_size / raw_size, where compression uses brotli at quality 2.
/// Values near 1.0 mean the population's code is diverse; values well below
/// 1.0 mean it has converged on repeated material.
pub fn high_order_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut compressed = Vec::new();
    let params = brotli::enc::BrotliEncoderParams {
        quality: 2,
        ..Default::default()
    };
    // Writing into a Vec cannot fail.
    if brotli::BrotliCompress(&mut &data[..], &mut compressed, &params).is_err() {
        return 0.0;
    }

    compressed.len() as f64 / data.len() as f64
}

/// All programs concatenated, for entropy measurement.
pub fn concatenated<'a>(programs: impl IntoIterator<Item = &'a Program>) -> Vec<u8> {
    let mut buf = Vec::new();
    for program in programs {
        buf.extend_from_slice(program.as_bytes());
    }
    buf
}

/// Count the number of distinct programs.
pub fn unique_program_count<'a>(programs: impl IntoIterator<Item = &'a Program>) -> usize {
    let set: HashSet<&[u8]> = programs.into_iter().map(Program::as_bytes).collect();
    set.len()
}

/// Mean program length in bytes; 0 for no programs.
pub fn mean_program_length<'a>(programs: impl IntoIterator<Item = &'a Program>) -> f64 {
    let (count, total) = programs
        .into_iter()
        .fold((0usize, 0usize), |(n, sum), p| (n + 1, sum + p.len()));
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

/// Histogram of byte values across all programs, split into instruction
/// counts (indexed by byte) and the number of comment bytes.
pub fn instruction_histogram<'a>(
    programs: impl IntoIterator<Item = &'a Program>,
) -> ([usize; 256], usize) {
    let mut hist = [0usize; 256];
    let mut comments = 0;
    for program in programs {
        for &b in program.as_bytes() {
            if is_instruction(b) {
                hist[b as usize] += 1;
            } else {
                comments += 1;
            }
        }
    }
    (hist, comments)
}
