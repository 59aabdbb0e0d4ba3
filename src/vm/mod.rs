//! The dispatch loop: fetch-execute over a [`Program`], driving the operand
//! stack, call stack, memory, heap, flags, and native registry.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};

use crate::buffer::BoundedStack;
use crate::flags::Flags;
use crate::heap::Heap;
use crate::location::Location;
use crate::memory::Memory;
use crate::natives::Registry;
use crate::parser::{InstrType, Operand, Program};
use crate::value::{Tag, Value};

const OPERAND_STACK_CAP: usize = 1024;
const CALL_STACK_CAP: usize = 1024;
const HEAP_CAP: usize = 1_048_576;
const MAX_STRING_LEN: usize = 128;

#[derive(Debug, Clone)]
pub enum ErrorKind {
    StackOverflow,
    StackUnderflow,
    CallStackOverflow,
    CallStackUnderflow,
    IllegalInstructionAccess,
    IllegalMemoryAccess,
    ReadBufOverflow,
    BufferOverflow,
    InvalidFd(i64),
    FailedToReadFile(String),
    FailedToGrow,
    StringTooLong(usize),
    UndefinedNative(String),
    NativeFailed(String),
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub loc: Location,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = &self.loc;
        match &self.kind {
            ErrorKind::StackOverflow => write!(f, "{loc}: operand stack overflow"),
            ErrorKind::StackUnderflow => write!(f, "{loc}: operand stack underflow"),
            ErrorKind::CallStackOverflow => write!(f, "{loc}: call stack overflow"),
            ErrorKind::CallStackUnderflow => write!(f, "{loc}: call stack underflow (ret with no call)"),
            ErrorKind::IllegalInstructionAccess => write!(f, "{loc}: illegal instruction access"),
            ErrorKind::IllegalMemoryAccess => write!(f, "{loc}: illegal memory access"),
            ErrorKind::ReadBufOverflow => write!(f, "{loc}: read would overflow available memory"),
            ErrorKind::BufferOverflow => write!(f, "{loc}: buffer overflow"),
            ErrorKind::InvalidFd(fd) => write!(f, "{loc}: invalid file descriptor {fd}"),
            ErrorKind::FailedToReadFile(path) => write!(f, "{loc}: failed to read \"{path}\""),
            ErrorKind::FailedToGrow => write!(f, "{loc}: heap failed to grow past its cap"),
            ErrorKind::StringTooLong(len) => write!(f, "{loc}: string of {len} bytes exceeds the {MAX_STRING_LEN}-byte cap"),
            ErrorKind::UndefinedNative(name) => write!(f, "{loc}: undefined native \"{name}\""),
            ErrorKind::NativeFailed(msg) => write!(f, "{loc}: native call failed: {msg}"),
        }
    }
}

/// Floor division for signed integers: rounds the quotient toward negative
/// infinity rather than toward zero, so the sign of the divisor is what
/// decides whether truncation and flooring diverge.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

/// The VM instance. I/O streams are injected rather than reaching for
/// process-wide stdio directly, so tests can run hermetically.
pub struct Vm {
    program: Program,
    stack: BoundedStack<Value>,
    calls: BoundedStack<usize>,
    memory: Memory,
    heap: Heap,
    flags: Flags,
    natives: Registry,
    ip: usize,
    halted: bool,
    stdin: Box<dyn BufRead>,
    stdout: Box<dyn Write>,
    stderr: Box<dyn Write>,
}

impl Vm {
    pub fn new(program: Program, natives: Registry) -> Vm {
        Vm::with_io(
            program,
            natives,
            Box::new(io::BufReader::new(io::stdin())),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    pub fn with_io(
        program: Program,
        natives: Registry,
        stdin: Box<dyn BufRead>,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Vm {
        Vm {
            ip: program.entry,
            program,
            stack: BoundedStack::with_capacity(OPERAND_STACK_CAP),
            calls: BoundedStack::with_capacity(CALL_STACK_CAP),
            memory: Memory::new(),
            heap: Heap::new(HEAP_CAP),
            flags: Flags::new(),
            natives,
            halted: false,
            stdin,
            stdout,
            stderr,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Current stack contents, bottom to top — used by integration tests to
    /// assert on final VM state without a `dmp`.
    pub fn stack(&self) -> Vec<Value> {
        self.stack.iter().copied().collect()
    }

    fn err(&self, kind: ErrorKind) -> Error {
        let loc = self.program.locations.get(self.ip).cloned().unwrap_or_else(|| Location::new("<unknown>".into(), 0, 0));
        Error { kind, loc }
    }

    /// Push a value onto the operand stack. Exposed for native functions.
    pub fn push_value(&mut self, v: Value) -> Result<(), Error> {
        self.stack.push(v).map_err(|_| self.err(ErrorKind::StackOverflow))
    }

    /// Pop a single stack cell. Exposed for native functions; does not know
    /// about Str headers — use [`Vm::pop_operand`] when a Str must be popped
    /// whole.
    pub fn pop_value(&mut self) -> Result<Value, Error> {
        self.stack.pop().map_err(|_| self.err(ErrorKind::StackUnderflow))
    }

    fn peek_value(&self, depth: usize) -> Result<Value, Error> {
        self.stack.peek(depth).copied().map_err(|_| self.err(ErrorKind::StackUnderflow))
    }

    /// Pop the top operand; if it is a Str header, also discard the `len`
    /// byte cells beneath it.
    fn pop_operand(&mut self) -> Result<Value, Error> {
        let top = self.pop_value()?;
        if top.tag() == Tag::Str {
            let bytes = self.stack.pop_n(top.as_str_len()).map_err(|_| self.err(ErrorKind::StackUnderflow))?;
            drop(bytes);
        }
        Ok(top)
    }

    fn push_string(&mut self, s: &str) -> Result<(), Error> {
        if s.len() > MAX_STRING_LEN {
            return Err(self.err(ErrorKind::StringTooLong(s.len())));
        }
        for byte in s.bytes() {
            self.push_value(Value::from_u64(Tag::U8, byte as u64))?;
        }
        self.push_value(Value::from_u64(Tag::Str, s.len() as u64))
    }

    /// Reassemble a Str value's bytes (the value must be at stack top).
    fn string_bytes_at_top(&self, header: Value) -> Result<Vec<u8>, Error> {
        let len = header.as_str_len();
        let mut bytes = Vec::with_capacity(len);
        for depth in (1..=len).rev() {
            let cell = self.peek_value(depth)?;
            bytes.push(cell.as_u64() as u8);
        }
        Ok(bytes)
    }

    fn resolve_target(&self, operand: &Operand) -> Result<usize, Error> {
        match operand {
            Operand::I64(v) => Ok(*v as usize),
            Operand::Str(name) => {
                self.program.labels.get(name).copied().ok_or_else(|| self.err(ErrorKind::IllegalInstructionAccess))
            }
            _ => Err(self.err(ErrorKind::IllegalInstructionAccess)),
        }
    }

    /// Run until `halt`, a fatal error, or the instruction stream runs out.
    pub fn run(&mut self) -> Result<(), Error> {
        while !self.halted && self.ip < self.program.len() {
            self.step()?;
        }
        Ok(())
    }

    fn step(&mut self) -> Result<(), Error> {
        let instr = self.program.instructions[self.ip].clone();
        use InstrType::*;

        match instr.ty {
            Push => {
                self.exec_push(&instr.operand)?;
                self.ip += 1;
            }
            Pop => {
                self.pop_operand()?;
                self.ip += 1;
            }
            Dup => {
                let depth = self.operand_usize(&instr.operand)?;
                let v = self.peek_value(depth)?;
                self.push_value(v)?;
                self.ip += 1;
            }
            Swap => {
                let depth = self.operand_usize(&instr.operand)?;
                self.stack.swap_from_top(depth).map_err(|_| self.err(ErrorKind::StackUnderflow))?;
                self.ip += 1;
            }
            Spush => {
                self.exec_spush(&instr.operand)?;
                self.ip += 1;
            }
            Spop => {
                self.exec_spop()?;
                self.ip += 1;
            }
            Iadd => {
                self.int_binop(|a, b| a.wrapping_add(b), |a, b| a.wrapping_add(b))?;
                self.ip += 1;
            }
            Isub => {
                self.int_binop(|a, b| a.wrapping_sub(b), |a, b| a.wrapping_sub(b))?;
                self.ip += 1;
            }
            Imul => {
                self.int_binop(|a, b| a.wrapping_mul(b), |a, b| a.wrapping_mul(b))?;
                self.ip += 1;
            }
            Idiv => {
                self.int_binop(
                    |a, b| if b == 0 { 0 } else { floor_div(a, b) },
                    |a, b| if b == 0 { 0 } else { a / b },
                )?;
                self.ip += 1;
            }
            Fadd => {
                self.float_binop(|a, b| a + b)?;
                self.ip += 1;
            }
            Fsub => {
                self.float_binop(|a, b| a - b)?;
                self.ip += 1;
            }
            Fmul => {
                self.float_binop(|a, b| a * b)?;
                self.ip += 1;
            }
            Fdiv => {
                self.float_binop(|a, b| a / b)?;
                self.ip += 1;
            }
            Inc => {
                self.exec_step_one(1)?;
                self.ip += 1;
            }
            Dec => {
                self.exec_step_one(-1)?;
                self.ip += 1;
            }
            Cmp => {
                self.exec_cmp()?;
                self.ip += 1;
            }
            Jmp => {
                self.ip = self.resolve_target(&instr.operand)?;
            }
            Je => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::E))?,
            Jne => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::Ne))?,
            Jg => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::G))?,
            Jl => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::L))?,
            Jge => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::Ge))?,
            Jle => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::Le))?,
            Jz => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::Z))?,
            Jnz => self.branch_if(&instr.operand, self.flags.is_set(crate::flags::Flag::Nz))?,
            JmpIf => {
                let cond = self.pop_operand()?;
                self.branch_if(&instr.operand, cond.is_truthy())?;
            }
            Not => {
                self.exec_not()?;
                self.ip += 1;
            }
            Call => {
                let target = self.resolve_target(&instr.operand)?;
                self.calls.push(self.ip + 1).map_err(|_| self.err(ErrorKind::CallStackOverflow))?;
                self.ip = target;
            }
            Ret => {
                self.ip = self.calls.pop().map_err(|_| self.err(ErrorKind::CallStackUnderflow))?;
            }
            Dmp => {
                self.exec_dmp(false)?;
                self.ip += 1;
            }
            Dmpln => {
                self.exec_dmp(true)?;
                self.ip += 1;
            }
            Pushmp => {
                self.push_value(Value::from_u64(Tag::U64, self.memory.mp() as u64))?;
                self.ip += 1;
            }
            Pushsp => {
                self.push_value(Value::from_u64(Tag::U64, self.stack.len() as u64))?;
                self.ip += 1;
            }
            Write => {
                self.exec_write()?;
                self.ip += 1;
            }
            Read => {
                self.exec_read(&instr.operand)?;
                self.ip += 1;
            }
            Eread => {
                self.exec_eread()?;
                self.ip += 1;
            }
            Fread => {
                self.exec_fread(&instr.operand)?;
                self.ip += 1;
            }
            Fwrite => {
                self.exec_fwrite(&instr.operand)?;
                self.ip += 1;
            }
            Alloc => {
                let n = self.operand_usize(&instr.operand)?;
                self.heap.alloc(n).map_err(|_| self.err(ErrorKind::FailedToGrow))?;
                self.ip += 1;
            }
            Halt => {
                self.halted = true;
                self.ip += 1;
            }
            Nop | Label => {
                self.ip += 1;
            }
            Native => {
                self.exec_native(&instr.operand)?;
                self.ip += 1;
            }
        }
        Ok(())
    }

    fn operand_usize(&self, operand: &Operand) -> Result<usize, Error> {
        match operand {
            Operand::I64(v) => Ok(*v as usize),
            Operand::U64(v) => Ok(*v as usize),
            Operand::U8(v) => Ok(*v as usize),
            _ => Err(self.err(ErrorKind::IllegalInstructionAccess)),
        }
    }

    fn exec_push(&mut self, operand: &Operand) -> Result<(), Error> {
        match operand {
            Operand::Nan(v) => self.push_value(*v),
            Operand::Str(s) => self.push_string(s),
            _ => Err(self.err(ErrorKind::IllegalInstructionAccess)),
        }
    }

    fn exec_spush(&mut self, operand: &Operand) -> Result<(), Error> {
        let extending = self.stack.peek(0).map(|v| v.tag() == Tag::Str).unwrap_or(false);
        if !extending {
            return self.exec_push(operand);
        }

        let header = self.pop_value()?;
        let mut len = header.as_str_len();
        let added: Vec<u8> = match operand {
            Operand::Nan(v) => vec![v.as_i64() as u8],
            Operand::Str(s) => s.bytes().collect(),
            _ => return Err(self.err(ErrorKind::IllegalInstructionAccess)),
        };
        if len + added.len() > MAX_STRING_LEN {
            return Err(self.err(ErrorKind::StringTooLong(len + added.len())));
        }
        for byte in added {
            self.push_value(Value::from_u64(Tag::U8, byte as u64))?;
            len += 1;
        }
        self.push_value(Value::from_u64(Tag::Str, len as u64))
    }

    fn exec_spop(&mut self) -> Result<(), Error> {
        let header = self.pop_value()?;
        if header.tag() != Tag::Str {
            return Err(self.err(ErrorKind::IllegalInstructionAccess));
        }
        let len = header.as_str_len();
        if len == 0 {
            return Ok(());
        }
        self.pop_value()?;
        self.push_value(Value::from_u64(Tag::Str, (len - 1) as u64))
    }

    fn int_binop(&mut self, signed: impl Fn(i64, i64) -> i64, unsigned: impl Fn(u64, u64) -> u64) -> Result<(), Error> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let result = if matches!(a.tag(), Tag::I64 | Tag::I32 | Tag::I8) {
            Value::from_i64(a.tag(), signed(a.as_i64(), b.as_i64()))
        } else {
            Value::from_u64(a.tag(), unsigned(a.as_u64(), b.as_u64()))
        };
        self.push_value(result)
    }

    fn float_binop(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), Error> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        self.push_value(Value::from_f64(f(a.as_f64(), b.as_f64())))
    }

    fn exec_step_one(&mut self, delta: i64) -> Result<(), Error> {
        let a = self.pop_value()?;
        let result = match a.tag() {
            Tag::F64 => Value::from_f64(a.as_f64() + delta as f64),
            Tag::I64 | Tag::I32 | Tag::I8 => Value::from_i64(a.tag(), a.as_i64() + delta),
            _ => Value::from_u64(a.tag(), (a.as_u64() as i64 + delta) as u64),
        };
        self.push_value(result)
    }

    fn exec_cmp(&mut self) -> Result<(), Error> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let ordering = match a.tag() {
            Tag::F64 => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
            Tag::I64 | Tag::I32 | Tag::I8 => a.as_i64().cmp(&b.as_i64()),
            _ => a.as_u64().cmp(&b.as_u64()),
        };
        self.flags.set_from_ordering(ordering);
        Ok(())
    }

    fn exec_not(&mut self) -> Result<(), Error> {
        let a = self.pop_operand()?;
        let result = match a.tag() {
            Tag::Bool => Value::from_bool(!a.as_bool()),
            Tag::Str => Value::from_bool(a.as_str_len() > 0),
            Tag::I64 | Tag::I32 | Tag::I8 => Value::from_i64(a.tag(), !a.as_i64()),
            _ => Value::from_u64(a.tag(), !a.as_u64()),
        };
        self.push_value(result)
    }

    fn branch_if(&mut self, operand: &Operand, condition: bool) -> Result<(), Error> {
        if condition {
            self.ip = self.resolve_target(operand)?;
        } else {
            self.ip += 1;
        }
        Ok(())
    }

    fn exec_dmp(&mut self, newline: bool) -> Result<(), Error> {
        let top = self.peek_value(0)?;
        let text = match top.tag() {
            Tag::Str => {
                let bytes = self.string_bytes_at_top(top)?;
                String::from_utf8_lossy(&bytes).into_owned()
            }
            Tag::F64 => format!("{}", top.as_f64()),
            Tag::I64 | Tag::I32 | Tag::I8 => format!("{}", top.as_i64()),
            Tag::Bool => format!("{}", top.as_bool()),
            _ => format!("{}", top.as_u64()),
        };
        if newline {
            writeln!(self.stdout, "{text}")
        } else {
            write!(self.stdout, "{text}")
        }
        .map_err(|_| self.err(ErrorKind::IllegalInstructionAccess))
    }

    fn exec_write(&mut self) -> Result<(), Error> {
        let idx = self.pop_value()?.as_u64() as usize;
        let byte = self.pop_value()?.as_u64() as u8;
        self.memory.write_byte(idx, byte).map_err(|_| self.err(ErrorKind::IllegalMemoryAccess))
    }

    fn exec_read(&mut self, operand: &Operand) -> Result<(), Error> {
        let len = self.operand_usize(operand)?;
        let start = self.pop_value()?.as_u64() as usize;
        let end = start.checked_add(len).ok_or_else(|| self.err(ErrorKind::ReadBufOverflow))?;
        let bytes = self.memory.read_range(start, end).map_err(|_| self.err(ErrorKind::ReadBufOverflow))?.to_vec();
        for b in bytes {
            self.push_value(Value::from_u64(Tag::U8, b as u64))?;
        }
        Ok(())
    }

    fn exec_eread(&mut self) -> Result<(), Error> {
        let idx = self.pop_value()?.as_u64() as usize;
        let byte = self.memory.read_byte(idx).map_err(|_| self.err(ErrorKind::IllegalMemoryAccess))?;
        self.push_value(Value::from_u64(Tag::U8, byte as u64))
    }

    fn exec_fread(&mut self, operand: &Operand) -> Result<(), Error> {
        match operand {
            Operand::Str(path) => {
                let data = fs::read(path).map_err(|_| self.err(ErrorKind::FailedToReadFile(path.clone())))?;
                self.memory.push_bytes(&data).map_err(|_| self.err(ErrorKind::BufferOverflow))
            }
            Operand::I64(1) => {
                let mut line = String::new();
                self.stdin.read_line(&mut line).map_err(|_| self.err(ErrorKind::FailedToReadFile("<stdin>".into())))?;
                self.memory.push_bytes(line.as_bytes()).map_err(|_| self.err(ErrorKind::BufferOverflow))
            }
            Operand::I64(fd) => Err(self.err(ErrorKind::InvalidFd(*fd))),
            _ => Err(self.err(ErrorKind::IllegalInstructionAccess)),
        }
    }

    fn exec_fwrite(&mut self, operand: &Operand) -> Result<(), Error> {
        let end = self.pop_value()?.as_u64() as usize;
        let start = self.pop_value()?.as_u64() as usize;
        let bytes = self.memory.read_range(start, end).map_err(|_| self.err(ErrorKind::IllegalMemoryAccess))?.to_vec();

        match operand {
            Operand::Str(path) => {
                fs::write(path, &bytes).map_err(|_| self.err(ErrorKind::FailedToReadFile(path.clone())))
            }
            Operand::I64(2) => self.stdout.write_all(&bytes).map_err(|_| self.err(ErrorKind::IllegalInstructionAccess)),
            Operand::I64(3) => self.stderr.write_all(&bytes).map_err(|_| self.err(ErrorKind::IllegalInstructionAccess)),
            Operand::I64(fd) => Err(self.err(ErrorKind::InvalidFd(*fd))),
            _ => Err(self.err(ErrorKind::IllegalInstructionAccess)),
        }
    }

    fn exec_native(&mut self, operand: &Operand) -> Result<(), Error> {
        let name = match operand {
            Operand::Str(s) => s.clone(),
            _ => return Err(self.err(ErrorKind::IllegalInstructionAccess)),
        };
        let (f, argc) = self.natives.get(&name).ok_or_else(|| self.err(ErrorKind::UndefinedNative(name.clone())))?;
        if self.stack.len() < argc {
            return Err(self.err(ErrorKind::StackUnderflow));
        }
        f(self).map_err(|e| self.err(ErrorKind::NativeFailed(e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;
    use std::io::Cursor;
    use std::io::BufReader;

    fn run_program(src: &str) -> (Vm, String) {
        let mut f = tempfile::Builder::new().suffix(".asm").tempfile().unwrap();
        use std::io::Write as _;
        f.write_all(src.as_bytes()).unwrap();
        let lines = lexer::lex_file(f.path(), None).unwrap();
        let program = parser::parse(&lines).unwrap();
        let stdout = Vec::new();
        let mut vm = Vm::with_io(
            program,
            Registry::new(),
            Box::new(BufReader::new(Cursor::new(Vec::new()))),
            Box::new(stdout),
            Box::new(Vec::new()),
        );
        vm.run().unwrap();
        (vm, String::new())
    }

    fn run_and_capture(src: &str) -> String {
        let mut f = tempfile::Builder::new().suffix(".asm").tempfile().unwrap();
        use std::io::Write as _;
        f.write_all(src.as_bytes()).unwrap();
        let lines = lexer::lex_file(f.path(), None).unwrap();
        let program = parser::parse(&lines).unwrap();

        struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut vm = Vm::with_io(
            program,
            Registry::new(),
            Box::new(BufReader::new(Cursor::new(Vec::new()))),
            Box::new(SharedBuf(captured.clone())),
            Box::new(Vec::new()),
        );
        vm.run().unwrap();
        String::from_utf8(captured.lock().unwrap().clone()).unwrap()
    }

    #[test]
    fn adds_two_integers() {
        let out = run_and_capture("_start:\npush 2\npush 3\niadd\ndmpln\nhalt\n");
        assert_eq!(out, "5\n");
    }

    #[test]
    fn divides_floats() {
        let out = run_and_capture("_start:\npush 4.0\npush 2.0\nfdiv\ndmpln\nhalt\n");
        assert_eq!(out, "2\n");
    }

    #[test]
    fn prints_strings() {
        let out = run_and_capture("_start:\npush \"hi\"\ndmpln\nhalt\n");
        assert_eq!(out, "hi\n");
    }

    #[test]
    fn loop_decrements_to_zero() {
        let src = "_start:\npush 10\npush 1\n_loop:\ndec\ndup 0\npush 0\ncmp\njne _loop\npop\ndmpln\nhalt\n";
        let out = run_and_capture(src);
        assert_eq!(out, "10\n");
    }

    #[test]
    fn idiv_floors_toward_negative_infinity() {
        let out = run_and_capture("_start:\npush 7\npush -2\nidiv\ndmpln\nhalt\n");
        assert_eq!(out, "-4\n");
    }

    #[test]
    fn call_and_ret_leave_value_on_stack() {
        let src = "_start:\ncall foo\ndmpln\nhalt\nfoo:\npush 1\nret\n";
        let out = run_and_capture(src);
        assert_eq!(out, "1\n");
    }

    #[test]
    fn stack_underflow_on_empty_pop() {
        let (mut vm, _) = run_program("_start:\nhalt\n");
        let err = vm.pop_value();
        assert!(matches!(err, Err(Error { kind: ErrorKind::StackUnderflow, .. })));
    }
}
