//! Code generation: turns a stream of parsed VM instructions into Hack ASM.
use std::io;

use anyhow::bail;

use crate::{segment::Segment, symbol::SymbolTable, InsnKind, Instruction};

struct GeneratorContext<'s> {
    pub symbol_table: SymbolTable<'s>,
    pub current_file_name: Option<&'s str>,
    pub current_fn_name: Option<&'s str>,
}

/// Emits ASM for a whole build (one file, or every file of a directory
/// sharing one output stream). Owns the counters that must stay unique across
/// the entire build: the comparison-label counter and the per-call-target
/// return-address counter both live here, not on the parser.
pub struct Generator<'s, W: io::Write> {
    w: &'s mut W,
    ctx: GeneratorContext<'s>,
}

impl<'s, W: io::Write> Generator<'s, W> {
    pub fn new(writer: &'s mut W) -> Self {
        let ctx = GeneratorContext {
            symbol_table: SymbolTable::new(),
            current_file_name: None,
            current_fn_name: None,
        };

        Generator { w: writer, ctx }
    }

    /// Translates every instruction of every source file into ASM, in file
    /// order, preceded by the bootstrap preamble when `emit_bootstrap` is set.
    pub fn translate(
        &mut self,
        sources: Vec<(&'s str, Vec<Instruction<'s>>)>,
        emit_bootstrap: bool,
    ) -> anyhow::Result<()> {
        use InsnKind::*;

        if emit_bootstrap {
            self.bootstrap()?;
        }

        for (name, is) in sources {
            self.ctx.current_file_name = Some(name);

            for insn in is {
                writeln!(self.w, "// {}", insn.lexeme)?;

                match insn.kind {
                    // arithmetic
                    Add => self.add()?,
                    Sub => self.sub()?,
                    And => self.and()?,
                    Or => self.or()?,
                    Neg => self.neg()?,
                    Not => self.not()?,
                    Eq => self.eq()?,
                    Gt => self.gt()?,
                    Lt => self.lt()?,
                    // stack
                    Push(ref segment, index) => self.push(segment, index)?,
                    Pop(ref segment, index) => self.pop(segment, index)?,
                    // program flow
                    Label(label) => {
                        let resolved = self.label_symbol(label);
                        writeln!(self.w, "({resolved})")?;
                    }
                    Goto(label) => self.goto(label)?,
                    IfGoto(label) => self.if_goto(label)?,
                    // function call
                    DefFn(name, n_locals) => self.define_fn(name, n_locals)?,
                    CallFn(name, n_args) => self.call_fn(name, n_args)?,
                    Return => self.ret_fn()?,
                };
            }
        }

        self.w.flush()?;

        Ok(())
    }

    /// Initializes SP to 256 and calls `Sys.init` with no arguments.
    pub fn bootstrap(&mut self) -> anyhow::Result<()> {
        writeln!(self.w, "@256\nD = A\n@SP\nM = D")?;
        self.call_fn("Sys.init", 0)
    }

    /// Construct the symbol of a static variable from the current file name
    /// and the given index.
    fn static_variable(&self, index: u16) -> anyhow::Result<String> {
        let Some(file_name) = self.ctx.current_file_name else {
            bail!("current file name is not set");
        };
        Ok(format!("{file_name}.{index}"))
    }

    /// Resolves a VM `label`/`goto`/`if-goto` symbol against the enclosing
    /// function. At top level (no enclosing function) the prefix is empty,
    /// giving the literal symbol `$label`.
    fn label_symbol(&self, label: &str) -> String {
        match self.ctx.current_fn_name {
            Some(f) => format!("{f}${label}"),
            None => format!("${label}"),
        }
    }

    /// Builds one of the four labels a single comparison allocates, prefixed
    /// with the enclosing function exactly like branch labels so two
    /// comparisons in the same function, or across files sharing a function
    /// name, never collide.
    fn compare_label(&self, kind: &str, n: u32) -> String {
        let enclosing = self.ctx.current_fn_name.unwrap_or("");
        format!("{enclosing}.{kind}{n}")
    }

    /// Push the given value onto the top of the stack.
    pub fn push(&mut self, segment: &Segment, index: u16) -> anyhow::Result<()> {
        use Segment::*;

        match segment {
            Constant => writeln!(self.w, "@{index}\nD = A\n{PUSH}")?,
            Static => writeln!(self.w, "@{}\nD = M\n{PUSH}", self.static_variable(index)?)?,
            Temp => writeln!(self.w, "@R{}\nD = M\n{PUSH}", index + 5)?,
            Pointer => writeln!(self.w, "@{}\nD = M\n{PUSH}", pointer_register(index)?)?,
            Local | Argument | This | That => {
                let base = base_register(segment);
                writeln!(
                    self.w,
                    "@{base}\nD = M\n@{index}\nD = D + A\nA = D\nD = M\n{PUSH}"
                )?;
            }
        };
        Ok(())
    }

    /// Pop the value on top of the stack into the given segment[index].
    pub fn pop(&mut self, segment: &Segment, index: u16) -> anyhow::Result<()> {
        use Segment::*;

        match segment {
            Constant => bail!("cannot pop into the constant segment"),
            Static => writeln!(self.w, "{POP}\n@{}\nM = D", self.static_variable(index)?)?,
            Temp => writeln!(self.w, "{POP}\n@R{}\nM = D", index + 5)?,
            Pointer => writeln!(self.w, "{POP}\n@{}\nM = D", pointer_register(index)?)?,
            Local | Argument | This | That => {
                // The target address is computed and stashed in R13 before the
                // pop, since popping only touches SP/A/D and would otherwise
                // be free to clobber whatever held the address.
                let base = base_register(segment);
                writeln!(
                    self.w,
                    "@{base}\nD = M\n@{index}\nD = D + A\n@R13\nM = D\n{POP}\n@R13\nA = M\nM = D"
                )?;
            }
        };
        Ok(())
    }

    /// Define the function with the given name.
    /// - emits the function's own label (no enclosing prefix)
    /// - initializes its local segment to `0`
    /// - sets the generator's enclosing-function context to this function
    pub fn define_fn(&mut self, name: &'s str, n_locals: u16) -> anyhow::Result<()> {
        self.ctx.current_fn_name = Some(name);
        writeln!(self.w, "({name})")?;

        if n_locals > 0 {
            self.push_zero_locals(name, n_locals)?;
        }

        Ok(())
    }

    /// Pushes `n_locals` zeroes via a counted loop, rather than unrolling, so
    /// the emitted code stays proportional to the program and not to
    /// `n_locals`.
    fn push_zero_locals(&mut self, name: &str, n_locals: u16) -> anyhow::Result<()> {
        let n = self.ctx.symbol_table.next_compare_id();
        let loop_label = format!("{name}$LOOP.{n}");
        let end_label = format!("{name}$ENDLOOP.{n}");

        writeln!(
            self.w,
            "\
@{n_locals}
D = A
@R13
M = D
({loop_label})
@R13
D = M
@{end_label}
D; JEQ
@SP
A = M
M = 0
@SP
M = M + 1
@R13
MD = M - 1
@{loop_label}
0; JMP
({end_label})"
        )?;

        Ok(())
    }

    /// Prepares a function call and jumps to the target label. On completion
    /// the memory layout below SP is:
    ///
    /// +------------------+
    /// |     ...          |
    /// |     ARG_0        |
    /// |     ...          |
    /// |     ARG_n-1      |
    /// |------------------|
    /// |  return address  |
    /// |  preserved LCL   |
    /// |  .. ARG ..       |
    /// |  .. THIS ..      |
    /// |  .. THAT ..      |
    /// |------------------|
    /// |                  |  <-- @SP, and @LCL once the callee starts
    /// +------------------+
    pub fn call_fn(&mut self, name: &'s str, n_args: u16) -> anyhow::Result<()> {
        let k = self.ctx.symbol_table.call_ordinal(name);
        let ret_label = format!("{name}$ret.{k}");
        let push_symbol = |sym: &str| format!("@{sym}\nD = M\n{PUSH}");

        writeln!(self.w, "@{ret_label}\nD = A\n{PUSH}")?;
        writeln!(
            self.w,
            "{}{}{}{}",
            push_symbol("LCL"),
            push_symbol("ARG"),
            push_symbol("THIS"),
            push_symbol("THAT"),
        )?;

        // ARG = SP - 5 - nArgs
        writeln!(
            self.w,
            "\
@{}
D = A
@SP
D = M - D
@ARG
M = D
",
            n_args + 5
        )?;

        // LCL = SP
        writeln!(self.w, "@SP\nD = M\n@LCL\nM = D")?;

        writeln!(self.w, "@{name}\n0; JMP")?;
        writeln!(self.w, "({ret_label})")?;

        Ok(())
    }

    /// Generates the `return` sequence: restores the caller's frame and
    /// jumps back to the return address.
    pub fn ret_fn(&mut self) -> anyhow::Result<()> {
        self.ctx.current_fn_name = None;
        writeln!(self.w, "{RET}")?;
        Ok(())
    }

    #[inline]
    pub fn eq(&mut self) -> anyhow::Result<()> {
        self.compare("JEQ", false)
    }

    #[inline]
    pub fn gt(&mut self) -> anyhow::Result<()> {
        self.compare("JGT", true)
    }

    #[inline]
    pub fn lt(&mut self) -> anyhow::Result<()> {
        self.compare("JLT", false)
    }

    #[inline]
    pub fn add(&mut self) -> anyhow::Result<()> {
        self.binary_calc("+")
    }

    #[inline]
    pub fn sub(&mut self) -> anyhow::Result<()> {
        self.binary_calc("-")
    }

    #[inline]
    pub fn and(&mut self) -> anyhow::Result<()> {
        self.binary_calc("&")
    }

    #[inline]
    pub fn or(&mut self) -> anyhow::Result<()> {
        self.binary_calc("|")
    }

    #[inline]
    pub fn neg(&mut self) -> anyhow::Result<()> {
        self.unary_calc("-")
    }

    #[inline]
    pub fn not(&mut self) -> anyhow::Result<()> {
        self.unary_calc("!")
    }

    #[inline]
    pub fn goto(&mut self, label: &str) -> anyhow::Result<()> {
        let resolved = self.label_symbol(label);
        writeln!(self.w, "@{resolved}\n0; JMP")?;
        Ok(())
    }

    /// Pop the value on top of the stack, and jump to `label` if it's not 0.
    pub fn if_goto(&mut self, label: &str) -> anyhow::Result<()> {
        let resolved = self.label_symbol(label);
        writeln!(self.w, "{POP}\n@{resolved}\nD; JNE")?;
        Ok(())
    }

    /// Apply `operand` to the top two stack values, leaving the result in
    /// place of the second one. SP decreases by exactly one: the single pop
    /// is the operation's entire net effect, no further adjustment follows.
    fn binary_calc(&mut self, operand: &str) -> anyhow::Result<()> {
        writeln!(self.w, "{POP}\n@SP\nA = M - 1\nM = M {operand} D")?;
        Ok(())
    }

    /// Apply `operand` to the top stack value in place. SP is never touched.
    fn unary_calc(&mut self, operand: &str) -> anyhow::Result<()> {
        writeln!(self.w, "@SP\nA = M - 1\nM = {operand}M")?;
        Ok(())
    }

    /// Overflow-safe comparison. Naive 16-bit subtraction of the two
    /// operands can wrap around when they have opposite signs and the
    /// magnitude sum doesn't fit, so the one sign combination that can't be
    /// resolved safely by subtracting (first operand negative, second
    /// strictly positive) is short-circuited directly instead.
    fn compare(&mut self, jump: &str, short_circuit_is_true: bool) -> anyhow::Result<()> {
        let n = self.ctx.symbol_table.next_compare_id();
        let true_label = self.compare_label("TRUE_L", n);
        let false_label = self.compare_label("FALSE_L", n);
        let regular_label = self.compare_label("REGULAR_MINUS_L", n);
        let continue_label = self.compare_label("CONTINUE_L", n);
        let short_circuit_label = if short_circuit_is_true {
            &true_label
        } else {
            &false_label
        };

        writeln!(
            self.w,
            "\
@SP
AM = M - 1
D = M
@R14
M = D
@{regular_label}
D; JGE
@SP
A = M - 1
D = M
@{regular_label}
D; JLE
@{short_circuit_label}
0; JMP
({regular_label})
@SP
A = M - 1
D = M
@R14
D = D - M
@{true_label}
D; {jump}
({false_label})
@SP
A = M - 1
M = 0
@{continue_label}
0; JMP
({true_label})
@SP
A = M - 1
M = -1
({continue_label})"
        )?;
        Ok(())
    }
}

/// True if any parsed file in `sources` defines `Sys.init`. The driver uses
/// this to decide whether to emit the bootstrap preamble, in both
/// single-file and directory mode.
pub fn defines_sys_init(sources: &[(&str, Vec<Instruction>)]) -> bool {
    sources.iter().any(|(_, is)| {
        is.iter()
            .any(|i| matches!(i.kind, InsnKind::DefFn(name, ..) if name == "Sys.init"))
    })
}

fn base_register(segment: &Segment) -> &'static str {
    use Segment::*;

    match segment {
        Local => "LCL",
        Argument => "ARG",
        This => "THIS",
        That => "THAT",
        _ => unreachable!("base_register called on a non-indirected segment"),
    }
}

fn pointer_register(index: u16) -> anyhow::Result<&'static str> {
    match index {
        0 => Ok("THIS"),
        1 => Ok("THAT"),
        _ => bail!("pointer segment index must be 0 or 1, got {index}"),
    }
}

/// Push the value in the D register onto the top of the stack.
#[doc(hidden)]
static PUSH: &str = "\
@SP
A = M
M = D
@SP
M = M + 1
";

/// Pop the value on top of the stack into the D register.
#[doc(hidden)]
static POP: &str = "\
@SP
AM = M - 1
D = M
";

/// Restores the caller's frame from LCL and jumps to the saved return
/// address. R13 holds the return address, read out before anything else is
/// touched: the return-address slot and the return-value slot can overlap
/// once SP moves down to ARG (the nArgs == 0 case).
#[doc(hidden)]
static RET: &str = "\
@LCL
D = M
@5
A = D - A
D = M
@R13
M = D
@SP
A = M - 1
D = M
@ARG
A = M
M = D
@ARG
D = M + 1
@SP
M = D
@LCL
AM = M - 1
D = M
@THAT
M = D
@LCL
AM = M - 1
D = M
@THIS
M = D
@LCL
AM = M - 1
D = M
@ARG
M = D
@LCL
AM = M - 1
D = M
@LCL
M = D
@R13
A = M
0; JMP
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn generate(program: &str, file: &'static str, emit_bootstrap: bool) -> String {
        let (instructions, errors) = parser::parse(program).unwrap();
        assert!(errors.is_empty(), "parse errors: {errors:?}");

        let mut buf = Vec::new();
        let mut gen = Generator::new(&mut buf);
        gen.translate(vec![(file, instructions)], emit_bootstrap)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn push_constant_emits_literal_into_d() {
        let asm = generate("push constant 7", "Main", false);
        assert!(asm.contains("@7\nD = A"));
        assert!(asm.contains("// push constant 7"));
    }

    #[test]
    fn add_pops_once_and_writes_in_place() {
        let asm = generate("add", "Main", false);
        assert!(asm.contains("M = M + D"));
    }

    #[test]
    fn neg_never_touches_sp() {
        let asm = generate("neg", "Main", false);
        assert!(asm.contains("M = -M"));
        assert!(!asm.contains("M = M + 1"));
        assert!(!asm.contains("M = M - 1"));
    }

    #[test]
    fn static_symbol_uses_file_basename() {
        let asm = generate("push constant 3\npop static 0", "Foo", false);
        assert!(asm.contains("@Foo.0"));
    }

    #[test]
    fn local_pop_stashes_address_in_r13_before_popping() {
        let asm = generate("pop local 2", "Main", false);
        let r13_pos = asm.find("@R13\nM = D").unwrap();
        let pop_pos = asm.find("AM = M - 1").unwrap();
        assert!(r13_pos < pop_pos, "address must be stashed before the pop");
    }

    #[test]
    fn label_at_top_level_gets_bare_dollar_prefix() {
        let asm = generate("label END", "Main", false);
        assert!(asm.contains("($END)"));
    }

    #[test]
    fn label_inside_function_is_prefixed_by_its_name() {
        let asm = generate("function Main.run 0\nlabel LOOP\ngoto LOOP", "Main", false);
        assert!(asm.contains("(Main.run$LOOP)"));
        assert!(asm.contains("@Main.run$LOOP"));
    }

    #[test]
    fn two_comparisons_in_one_function_get_distinct_counters() {
        let asm = generate(
            "function Main.run 0\npush constant 1\npush constant 2\neq\npush constant 1\npush constant 2\nlt",
            "Main",
            false,
        );
        assert!(asm.contains("Main.run.TRUE_L0") || asm.contains("Main.run.FALSE_L0"));
        assert!(asm.contains("Main.run.FALSE_L1") || asm.contains("Main.run.TRUE_L1"));
    }

    #[test]
    fn call_targets_get_per_target_ordinals() {
        let asm = generate(
            "call Foo.bar 0\ncall Other.baz 0\ncall Foo.bar 1",
            "Main",
            false,
        );
        assert!(asm.contains("(Foo.bar$ret.0)"));
        assert!(asm.contains("(Other.baz$ret.0)"));
        assert!(asm.contains("(Foo.bar$ret.1)"));
    }

    #[test]
    fn return_clears_enclosing_function() {
        let asm = generate("function Main.run 0\nreturn\nlabel AFTER", "Main", false);
        assert!(asm.contains("($AFTER)"));
    }

    #[test]
    fn bootstrap_initializes_sp_and_calls_sys_init() {
        let asm = generate("function Sys.init 0\nreturn", "Sys", true);
        assert!(asm.starts_with("@256\nD = A\n@SP\nM = D"));
        assert!(asm.contains("@Sys.init\n0; JMP"));
    }

    #[test]
    fn defines_sys_init_scans_every_file() {
        let (sys, _) = parser::parse("function Sys.init 0\nreturn").unwrap();
        let (other, _) = parser::parse("function Foo.bar 0\nreturn").unwrap();
        assert!(defines_sys_init(&[("Other", other), ("Sys", sys)]));
    }
}
