use std::fmt;
use std::io::{self, Read, Write};

const GREATER: u8 = b'>';
const LESS: u8 = b'<';
const PLUS: u8 = b'+';
const MINUS: u8 = b'-';
const DOT: u8 = b'.';
const COMMA: u8 = b',';
const LBRACKET: u8 = b'[';
const RBRACKET: u8 = b']';

/// Number of cells a tape starts with and grows by.
const BLOCK_SIZE: usize = 2048;
/// Bytes pulled from the code reader per fill.
const FETCH_SIZE: usize = 64;
/// Jump table marker for a bracket whose match has not been resolved yet.
const UNRESOLVED: usize = usize::MAX;

/// Returns true if `byte` is one of the eight instructions.
pub fn is_instruction(byte: u8) -> bool {
    matches!(
        byte,
        GREATER | LESS | PLUS | MINUS | DOT | COMMA | LBRACKET | RBRACKET
    )
}

/// Failure modes of a single execution.
#[derive(Debug)]
pub enum ExecError {
    /// The step budget ran out before the program finished.
    BudgetExhausted,
    /// The data pointer was moved left of cell 0.
    MemoryError,
    /// Unmatched loop bracket (only reported in strict mode).
    InvalidNesting,
    /// Reading code or input, or writing output, failed.
    Io(io::Error),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::BudgetExhausted => write!(f, "step budget exhausted"),
            ExecError::MemoryError => write!(f, "invalid memory access"),
            ExecError::InvalidNesting => write!(f, "invalid loop nesting"),
            ExecError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ExecError {
    fn from(e: io::Error) -> Self {
        ExecError::Io(e)
    }
}

/// How unmatched brackets are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nesting {
    /// Any unmatched bracket is an `InvalidNesting` error.
    Strict,
    /// Unmatched brackets are no-ops, so a run behaves like a strict run
    /// of the normalized program.
    Lenient,
}

/// Zero-initialized byte cells that grow to the right on demand.
#[derive(Debug, Clone)]
pub struct Tape {
    cells: Vec<u8>,
    ptr: usize,
}

impl Default for Tape {
    fn default() -> Self {
        Self {
            cells: vec![0; BLOCK_SIZE],
            ptr: 0,
        }
    }
}

impl Tape {
    /// A tape whose leading cells are preloaded with `cells`.
    pub fn with_cells(cells: &[u8]) -> Self {
        let mut tape = Self::default();
        if cells.len() > tape.cells.len() {
            tape.cells.resize(cells.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0);
        }
        tape.cells[..cells.len()].copy_from_slice(cells);
        tape
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn ptr(&self) -> usize {
        self.ptr
    }

    #[inline(always)]
    fn current(&self) -> u8 {
        self.cells[self.ptr]
    }

    #[inline(always)]
    fn current_mut(&mut self) -> &mut u8 {
        &mut self.cells[self.ptr]
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.ptr += 1;
        if self.ptr >= self.cells.len() {
            let len = self.cells.len() + BLOCK_SIZE;
            self.cells.resize(len, 0);
        }
    }

    #[inline(always)]
    fn retreat(&mut self) -> Result<(), ExecError> {
        if self.ptr == 0 {
            return Err(ExecError::MemoryError);
        }
        self.ptr -= 1;
        Ok(())
    }
}

/// Code read so far from a code reader, addressable by position.
struct CodeMemory<R> {
    source: R,
    code: Vec<u8>,
    /// `jumps[i]` is the position of the `]` matching a `[` at `i`.
    jumps: Vec<usize>,
    eof: bool,
}

impl<R: Read> CodeMemory<R> {
    fn new(source: R) -> Self {
        Self {
            source,
            code: Vec::with_capacity(FETCH_SIZE * 2),
            jumps: Vec::with_capacity(FETCH_SIZE * 2),
            eof: false,
        }
    }

    /// The byte at `pos`, reading more code if needed. `None` at end of code.
    #[inline]
    fn fetch(&mut self, pos: usize) -> io::Result<Option<u8>> {
        while pos >= self.code.len() && !self.eof {
            self.fill()?;
        }
        Ok(self.code.get(pos).copied())
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut buf = [0u8; FETCH_SIZE];
        let n = loop {
            match self.source.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            self.eof = true;
        } else {
            self.code.extend_from_slice(&buf[..n]);
            self.jumps.resize(self.code.len(), UNRESOLVED);
        }
        Ok(())
    }

    /// Position of the `]` matching the `[` at `open`, or `None` if the
    /// code ends first. Resolved matches are remembered.
    fn matching_close(&mut self, open: usize) -> io::Result<Option<usize>> {
        if self.jumps[open] != UNRESOLVED {
            return Ok(Some(self.jumps[open]));
        }
        let mut depth = 0usize;
        let mut pos = open + 1;
        while let Some(byte) = self.fetch(pos)? {
            match byte {
                LBRACKET => depth += 1,
                RBRACKET if depth == 0 => {
                    self.jumps[open] = pos;
                    return Ok(Some(pos));
                }
                RBRACKET => depth -= 1,
                _ => {}
            }
            pos += 1;
        }
        Ok(None)
    }
}

/// Outcome of running an in-memory program with collected output.
#[derive(Debug)]
pub struct Execution {
    /// Bytes written before the run ended (also on error).
    pub output: Vec<u8>,
    /// Instructions dispatched.
    pub steps: usize,
    pub result: Result<(), ExecError>,
}

/// The classic eight-instruction tape machine.
///
/// Code is pulled from a reader into code memory on demand, so a loop body
/// is read from the source once and then dispatched from memory on every
/// further pass. Loops use an explicit stack of return positions instead of
/// re-entering the interpreter.
///
/// Instructions:
/// - `>` / `<`: move the data pointer (moving left of cell 0 is a memory error)
/// - `+` / `-`: increment / decrement the current cell, wrapping modulo 256
/// - `.` / `,`: write / read the current cell (end of input reads as 0)
/// - `[` / `]`: loop while the current cell is non-zero
///
/// Every other byte is a comment.
///
/// The tape persists across calls.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    tape: Tape,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tape(tape: Tape) -> Self {
        Self { tape }
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    /// Run `code` to completion with strict nesting and no step limit.
    pub fn interpret<C, I, O>(
        &mut self,
        code: C,
        input: &mut I,
        output: &mut O,
    ) -> Result<usize, ExecError>
    where
        C: Read,
        I: Read,
        O: Write,
    {
        self.execute(code, input, output, Nesting::Strict, None)
    }

    /// Run a program held in memory against empty input, leniently, with
    /// a step limit. This is the oracle used by the search.
    pub fn run_program(&mut self, program: &[u8], limit: Option<usize>) -> Execution {
        let mut output = Vec::new();
        let mut steps = 0;
        let result = self.execute_counted(
            program,
            &mut io::empty(),
            &mut output,
            Nesting::Lenient,
            limit,
            &mut steps,
        );
        Execution {
            output,
            steps,
            result,
        }
    }

    /// Run `code`, reading `,` bytes from `input` and writing `.` bytes to
    /// `output`.
    ///
    /// `limit` caps the number of instructions dispatched; `None` or
    /// `Some(0)` is unbounded. Returns the number of instructions
    /// dispatched. Output written before an error stays in `output`.
    pub fn execute<C, I, O>(
        &mut self,
        code: C,
        input: &mut I,
        output: &mut O,
        nesting: Nesting,
        limit: Option<usize>,
    ) -> Result<usize, ExecError>
    where
        C: Read,
        I: Read,
        O: Write,
    {
        let mut steps = 0;
        self.execute_counted(code, input, output, nesting, limit, &mut steps)
            .map(|()| steps)
    }

    fn execute_counted<C, I, O>(
        &mut self,
        code: C,
        input: &mut I,
        output: &mut O,
        nesting: Nesting,
        limit: Option<usize>,
        steps: &mut usize,
    ) -> Result<(), ExecError>
    where
        C: Read,
        I: Read,
        O: Write,
    {
        let limit = limit.filter(|&n| n > 0);
        let mut code = CodeMemory::new(code);
        // Positions just after each open `[` currently being looped.
        let mut loops: Vec<usize> = Vec::new();
        let mut remaining = limit.unwrap_or(usize::MAX);
        let mut ip = 0usize;

        while let Some(byte) = code.fetch(ip)? {
            if !is_instruction(byte) {
                ip += 1;
                continue;
            }
            if remaining == 0 {
                return Err(ExecError::BudgetExhausted);
            }
            if limit.is_some() {
                remaining -= 1;
            }
            *steps += 1;

            match byte {
                GREATER => self.tape.advance(),
                LESS => self.tape.retreat()?,
                PLUS => {
                    let cell = self.tape.current_mut();
                    *cell = cell.wrapping_add(1);
                }
                MINUS => {
                    let cell = self.tape.current_mut();
                    *cell = cell.wrapping_sub(1);
                }
                DOT => output.write_all(&[self.tape.current()])?,
                COMMA => *self.tape.current_mut() = read_byte(input)?,
                LBRACKET => {
                    if self.tape.current() != 0 {
                        loops.push(ip + 1);
                    } else {
                        match code.matching_close(ip)? {
                            Some(close) => {
                                ip = close + 1;
                                continue;
                            }
                            None if nesting == Nesting::Strict => {
                                return Err(ExecError::InvalidNesting);
                            }
                            None => {}
                        }
                    }
                }
                RBRACKET => match loops.last() {
                    None => {
                        if nesting == Nesting::Strict {
                            return Err(ExecError::InvalidNesting);
                        }
                    }
                    Some(&body) => {
                        if self.tape.current() != 0 {
                            ip = body;
                            continue;
                        }
                        loops.pop();
                    }
                },
                _ => unreachable!("non-instruction bytes are skipped above"),
            }
            ip += 1;
        }

        if !loops.is_empty() && nesting == Nesting::Strict {
            return Err(ExecError::InvalidNesting);
        }
        output.flush()?;
        Ok(())
    }
}

/// Read one byte of input. End of input reads as 0.
fn read_byte<I: Read>(input: &mut I) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    loop {
        match input.read(&mut buf) {
            Ok(0) => return Ok(0),
            Ok(_) => return Ok(buf[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
