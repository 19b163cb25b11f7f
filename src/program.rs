use std::fmt;

use rand::Rng;
use rand::distributions::{Distribution, Standard};

/// Instructions a random program is built from. Search runs on empty
/// input, so `,` is never generated.
const INSTRUCTIONS: &[u8] = b"><+-.[]";

/// Loop idioms spliced in whole by the compound mutation.
const COMPOUNDS: &[&[u8]] = &[
    b"[-]",                     // set zero
    b">++++[<++++>-]<",         // add 0x10
    b">++++[<++++++++>-]<",     // add 0x20
    b">++++++++[<++++++++>-]<", // add 0x40
];

/// A single edit applied by `mutate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Insert one random instruction.
    Insert,
    /// Delete one byte.
    Delete,
    /// Replace one byte with a random instruction.
    Substitute,
    /// Copy a slice of the program to another position.
    Duplicate,
    /// Insert a whole program from the source pool.
    CrossBreed,
    /// Delete a slice.
    DeleteSlice,
    /// Insert one of the `COMPOUNDS` loop idioms.
    Compound,
    /// Wrap a slice in an always-skipped loop.
    CommentOut,
}

impl Distribution<Mutation> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Mutation {
        match rng.gen_range(0..8u32) {
            0 => Mutation::Insert,
            1 => Mutation::Delete,
            2 => Mutation::Substitute,
            3 => Mutation::Duplicate,
            4 => Mutation::CrossBreed,
            5 => Mutation::DeleteSlice,
            6 => Mutation::Compound,
            _ => Mutation::CommentOut,
        }
    }
}

/// A random instruction byte.
pub fn random_instruction<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    INSTRUCTIONS[rng.gen_range(0..INSTRUCTIONS.len())]
}

/// A candidate program: raw byte-code, comments included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Program(Vec<u8>);

impl Program {
    pub fn new() -> Self {
        Self(Vec::with_capacity(128))
    }

    /// A program of `len` random instructions.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Self {
        Self((0..len).map(|_| random_instruction(rng)).collect())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace the contents with a copy of `bytes`, reusing the allocation.
    pub fn copy_from(&mut self, bytes: &[u8]) {
        self.0.clear();
        self.0.extend_from_slice(bytes);
    }

    /// Drop every unmatched bracket, keeping all other bytes in order.
    ///
    /// A backward pass removes each `[` with no `]` after it; a forward pass
    /// over the result then removes each `]` with no `[` before it.
    pub fn normalize(&self) -> Program {
        let mut reversed = Vec::with_capacity(self.0.len());
        let mut level = 0usize;
        for &b in self.0.iter().rev() {
            match b {
                b']' => level += 1,
                b'[' if level == 0 => continue,
                b'[' => level -= 1,
                _ => {}
            }
            reversed.push(b);
        }

        let mut code = Vec::with_capacity(reversed.len());
        level = 0;
        for &b in reversed.iter().rev() {
            match b {
                b'[' => level += 1,
                b']' if level == 0 => continue,
                b']' => level -= 1,
                _ => {}
            }
            code.push(b);
        }
        Program(code)
    }

    /// True if every bracket has a partner.
    pub fn is_balanced(&self) -> bool {
        let mut level = 0usize;
        for &b in &self.0 {
            match b {
                b'[' => level += 1,
                b']' if level == 0 => return false,
                b']' => level -= 1,
                _ => {}
            }
        }
        level == 0
    }

    /// The program as an inert loop: `[-]` zeroes the cell so the
    /// following `[ ... ]` is always skipped.
    pub fn commented(&self) -> Program {
        let mut code = Vec::with_capacity(self.0.len() + 5);
        code.extend_from_slice(b"[-][");
        code.extend_from_slice(&self.0);
        code.push(b']');
        Program(code)
    }
}

impl AsRef<[u8]> for Program {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Program {
    fn from(code: Vec<u8>) -> Self {
        Self(code)
    }
}

impl From<&[u8]> for Program {
    fn from(code: &[u8]) -> Self {
        Self(code.to_vec())
    }
}

impl From<&str> for Program {
    fn from(code: &str) -> Self {
        Self(code.as_bytes().to_vec())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Insert `bytes` before position `pos`.
pub fn insert_at(code: &mut Vec<u8>, pos: usize, bytes: &[u8]) {
    code.splice(pos..pos, bytes.iter().copied());
}

/// Remove `len` bytes starting at `pos`.
pub fn remove_at(code: &mut Vec<u8>, pos: usize, len: usize) {
    code.drain(pos..pos + len);
}

/// Replace `len` bytes starting at `pos` with `bytes`.
pub fn replace_at(code: &mut Vec<u8>, pos: usize, len: usize, bytes: &[u8]) {
    code.splice(pos..pos + len, bytes.iter().copied());
}

/// Apply `times` random mutations in sequence.
pub fn mutate_times<R, S>(program: &mut Program, times: usize, rng: &mut R, sources: &[S])
where
    R: Rng + ?Sized,
    S: AsRef<[u8]>,
{
    for _ in 0..times {
        mutate(program, rng, sources);
    }
}

/// Apply one structural mutation chosen uniformly at random.
///
/// `sources` is the pool cross-breeding draws whole programs from. An empty
/// program becomes a single random instruction.
pub fn mutate<R, S>(program: &mut Program, rng: &mut R, sources: &[S])
where
    R: Rng + ?Sized,
    S: AsRef<[u8]>,
{
    let code = &mut program.0;
    if code.is_empty() {
        code.push(random_instruction(rng));
        return;
    }
    let pos = rng.gen_range(0..code.len());
    let len = rng.gen_range(0..code.len() - pos);
    let mutation = rng.r#gen();
    splice(code, mutation, pos, len, rng, sources);
}

/// Apply `mutation` at a random position. An empty program instead gains a
/// random instruction.
pub fn apply<R, S>(program: &mut Program, mutation: Mutation, rng: &mut R, sources: &[S])
where
    R: Rng + ?Sized,
    S: AsRef<[u8]>,
{
    let code = &mut program.0;
    if code.is_empty() {
        code.push(random_instruction(rng));
        return;
    }
    let pos = rng.gen_range(0..code.len());
    let len = rng.gen_range(0..code.len() - pos);
    splice(code, mutation, pos, len, rng, sources);
}

/// `code[pos..pos + len]` is the slice that slice operators work on.
fn splice<R, S>(
    code: &mut Vec<u8>,
    mutation: Mutation,
    pos: usize,
    len: usize,
    rng: &mut R,
    sources: &[S],
) where
    R: Rng + ?Sized,
    S: AsRef<[u8]>,
{
    match mutation {
        Mutation::Insert => code.insert(pos, random_instruction(rng)),
        Mutation::Delete => {
            code.remove(pos);
        }
        Mutation::Substitute => code[pos] = random_instruction(rng),
        Mutation::Duplicate => {
            let from = rng.gen_range(0..code.len());
            let n = rng.gen_range(0..code.len() - from);
            let chunk = code[from..from + n].to_vec();
            insert_at(code, pos, &chunk);
        }
        Mutation::CrossBreed => {
            if sources.is_empty() {
                code.insert(pos, random_instruction(rng));
            } else {
                let pick = rng.gen_range(0..sources.len());
                insert_at(code, pos, sources[pick].as_ref());
            }
        }
        Mutation::DeleteSlice => remove_at(code, pos, len),
        Mutation::Compound => {
            let compound = COMPOUNDS[rng.gen_range(0..COMPOUNDS.len())];
            insert_at(code, pos, compound);
        }
        Mutation::CommentOut => {
            let inert = Program::from(&code[pos..pos + len]).commented();
            replace_at(code, pos, len, inert.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn normalized(code: &str) -> Vec<u8> {
        Program::from(code).normalize().into_bytes()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalized("["), b"");
        assert_eq!(normalized("]"), b"");
        assert_eq!(normalized("]["), b"");
        assert_eq!(normalized("[]"), b"[]");
    }

    #[test]
    fn test_normalize_keeps_other_bytes_in_order() {
        assert_eq!(normalized("+]a[-[.]"), b"+a-[.]");
        assert_eq!(normalized("[[+]"), b"[+]");
        assert_eq!(normalized("[+]]"), b"[+]");
        assert_eq!(normalized("][+][<"), b"[+]<");
    }

    #[test]
    fn test_is_balanced() {
        assert!(Program::from("").is_balanced());
        assert!(Program::from("[[]][]").is_balanced());
        assert!(!Program::from("[").is_balanced());
        assert!(!Program::from("][").is_balanced());
    }

    #[test]
    fn test_insert_at() {
        let mut code = b"a".to_vec();
        insert_at(&mut code, 0, b"b");
        assert_eq!(code, b"ba");

        let mut code = b"a".to_vec();
        insert_at(&mut code, 1, b"b");
        assert_eq!(code, b"ab");
    }

    #[test]
    fn test_remove_at() {
        let mut code = b"ab".to_vec();
        remove_at(&mut code, 0, 0);
        assert_eq!(code, b"ab");

        let mut code = b"ab".to_vec();
        remove_at(&mut code, 0, 1);
        assert_eq!(code, b"b");

        let mut code = b"ab".to_vec();
        remove_at(&mut code, 1, 1);
        assert_eq!(code, b"a");
    }

    #[test]
    fn test_replace_at() {
        let mut code = b"ab".to_vec();
        replace_at(&mut code, 0, 1, b"c");
        assert_eq!(code, b"cb");

        let mut code = b"ab".to_vec();
        replace_at(&mut code, 1, 1, b"c");
        assert_eq!(code, b"ac");
    }

    #[test]
    fn test_commented() {
        let p = Program::from("+.");
        assert_eq!(p.commented().as_bytes(), b"[-][+.]");
    }

    #[test]
    fn test_commented_code_is_inert() {
        use crate::machine::Machine;
        let code = Program::from("+++.").commented();
        let mut bytes = b"++".to_vec();
        bytes.extend_from_slice(code.as_bytes());
        bytes.extend_from_slice(b"+.");
        let execution = Machine::new().run_program(&bytes, Some(100));
        assert!(execution.result.is_ok());
        assert_eq!(execution.output, vec![1]);
    }

    #[test]
    fn test_random_program_uses_instructions() {
        let mut rng = SmallRng::seed_from_u64(7);
        let p = Program::random(&mut rng, 200);
        assert_eq!(p.len(), 200);
        assert!(p.as_bytes().iter().all(|b| INSTRUCTIONS.contains(b)));
    }

    #[test]
    fn test_mutate_empty_program() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut p = Program::new();
        mutate::<_, Program>(&mut p, &mut rng, &[]);
        assert_eq!(p.len(), 1);
        assert!(INSTRUCTIONS.contains(&p.as_bytes()[0]));
    }

    #[test]
    fn test_mutate_many_times() {
        // Exercise every operator, including cross-breeding.
        let mut rng = SmallRng::seed_from_u64(42);
        let sources = [Program::from("x")];
        for _ in 0..500 {
            let mut p = Program::random(&mut rng, 2);
            mutate_times(&mut p, 3, &mut rng, &sources);
        }
        let mut p = Program::new();
        mutate_times::<_, Program>(&mut p, 50, &mut rng, &[]);
    }

    #[test]
    fn test_mutate_is_deterministic() {
        let run = |seed: u64| {
            let mut rng = SmallRng::seed_from_u64(seed);
            let mut p = Program::from("+[>+<-].");
            mutate_times(&mut p, 20, &mut rng, &[Program::from("++.")]);
            p
        };
        assert_eq!(run(3), run(3));
    }

    #[test]
    fn test_cross_breed_does_not_touch_sources() {
        let mut rng = SmallRng::seed_from_u64(5);
        let sources = vec![Program::from("+++"), Program::from("---")];
        let mut p = Program::from(">.");
        mutate_times(&mut p, 100, &mut rng, &sources);
        assert_eq!(sources[0].as_bytes(), b"+++");
        assert_eq!(sources[1].as_bytes(), b"---");
    }

    const BEFORE: &[u8] = b"+>-<.[]ab";

    /// Every way `after` is `before` with one run of bytes inserted.
    fn insertions<'a>(before: &[u8], after: &'a [u8]) -> Vec<&'a [u8]> {
        if after.len() < before.len() {
            return Vec::new();
        }
        let extra = after.len() - before.len();
        (0..=before.len())
            .filter(|&p| after.starts_with(&before[..p]) && after.ends_with(&before[p..]))
            .map(|p| &after[p..p + extra])
            .collect()
    }

    /// True if `after` is `before` with one run of bytes removed.
    fn is_deletion(before: &[u8], after: &[u8]) -> bool {
        let gone = before.len() - after.len();
        (0..=after.len()).any(|p| {
            after[..p] == before[..p] && after[p..] == before[p + gone..]
        })
    }

    fn applied(mutation: Mutation, seed: u64, sources: &[Program]) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut p = Program::from(BEFORE);
        apply(&mut p, mutation, &mut rng, sources);
        p.into_bytes()
    }

    #[test]
    fn test_insert_adds_one_instruction() {
        for seed in 0..50 {
            let after = applied(Mutation::Insert, seed, &[]);
            let found = insertions(BEFORE, &after);
            assert!(found.iter().any(|ins| ins.len() == 1 && INSTRUCTIONS.contains(&ins[0])));
        }
    }

    #[test]
    fn test_delete_removes_one_byte() {
        for seed in 0..50 {
            let after = applied(Mutation::Delete, seed, &[]);
            assert_eq!(after.len(), BEFORE.len() - 1);
            assert!(is_deletion(BEFORE, &after));
        }
    }

    #[test]
    fn test_substitute_changes_one_position() {
        for seed in 0..50 {
            let after = applied(Mutation::Substitute, seed, &[]);
            assert_eq!(after.len(), BEFORE.len());
            let changed: Vec<usize> = (0..after.len()).filter(|&i| after[i] != BEFORE[i]).collect();
            assert!(changed.len() <= 1);
            assert!(changed.iter().all(|&i| INSTRUCTIONS.contains(&after[i])));
        }
    }

    #[test]
    fn test_duplicate_inserts_own_slice() {
        for seed in 0..50 {
            let after = applied(Mutation::Duplicate, seed, &[]);
            let found = insertions(BEFORE, &after);
            assert!(found.iter().any(|ins| {
                ins.is_empty() || BEFORE.windows(ins.len()).any(|w| w == *ins)
            }));
        }
    }

    #[test]
    fn test_cross_breed_inserts_whole_source() {
        let sources = vec![Program::from("+++."), Program::from(">>--[-]")];
        for seed in 0..50 {
            let after = applied(Mutation::CrossBreed, seed, &sources);
            let found = insertions(BEFORE, &after);
            assert!(
                found
                    .iter()
                    .any(|ins| sources.iter().any(|s| s.as_bytes() == *ins)),
                "{:?}",
                String::from_utf8_lossy(&after)
            );
        }
    }

    #[test]
    fn test_cross_breed_without_sources_inserts_instruction() {
        for seed in 0..20 {
            let after = applied(Mutation::CrossBreed, seed, &[]);
            let found = insertions(BEFORE, &after);
            assert!(found.iter().any(|ins| ins.len() == 1 && INSTRUCTIONS.contains(&ins[0])));
        }
    }

    #[test]
    fn test_delete_slice_removes_contiguous_run() {
        for seed in 0..50 {
            let after = applied(Mutation::DeleteSlice, seed, &[]);
            assert!(is_deletion(BEFORE, &after));
        }
    }

    #[test]
    fn test_compound_is_spliced_intact() {
        let mut seen = Vec::new();
        for seed in 0..100 {
            let after = applied(Mutation::Compound, seed, &[]);
            let found = insertions(BEFORE, &after);
            let compound = found
                .iter()
                .find(|ins| COMPOUNDS.contains(ins))
                .expect("a compound should be inserted whole");
            if !seen.contains(&compound.to_vec()) {
                seen.push(compound.to_vec());
            }
        }
        assert_eq!(seen.len(), COMPOUNDS.len());
    }

    #[test]
    fn test_comment_out_wraps_original_bytes() {
        for seed in 0..50 {
            let after = applied(Mutation::CommentOut, seed, &[]);
            assert_eq!(after.len(), BEFORE.len() + 5);
            let wrapped = (0..BEFORE.len()).any(|pos| {
                (0..BEFORE.len() - pos).any(|len| {
                    let mut expected = BEFORE[..pos].to_vec();
                    expected.extend_from_slice(b"[-][");
                    expected.extend_from_slice(&BEFORE[pos..pos + len]);
                    expected.push(b']');
                    expected.extend_from_slice(&BEFORE[pos + len..]);
                    expected == after
                })
            });
            assert!(wrapped, "{:?}", String::from_utf8_lossy(&after));
        }
    }

    #[test]
    fn test_every_mutation_is_drawn() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut seen: Vec<Mutation> = Vec::new();
        for _ in 0..1000 {
            let m: Mutation = rng.r#gen();
            if !seen.contains(&m) {
                seen.push(m);
            }
        }
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn test_apply_on_empty_program() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut p = Program::default();
        apply(&mut p, Mutation::Delete, &mut rng, &[] as &[Program]);
        assert_eq!(p.len(), 1);
    }
}
