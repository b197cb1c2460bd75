//! Hack VM parser
use anyhow::anyhow;

use crate::insn::Instruction;

pub const COMMENT: &str = "//";

pub type ParseResult<'s> = anyhow::Result<(Vec<Instruction<'s>>, Vec<anyhow::Error>)>;

pub fn parse(program: &str) -> ParseResult {
    let mut instructions = Vec::new();
    let mut errors = Vec::new();

    for (row, line) in program.lines().enumerate() {
        let valid_code_range = line.find(COMMENT).unwrap_or(line.len());
        let vmcode = line[..valid_code_range].trim();
        if vmcode.is_empty() {
            continue;
        }

        match Instruction::parse(vmcode, row) {
            Ok(insn) => instructions.push(insn),
            Err(e) => {
                let ctx = anyhow!("failed to parse line {}", row + 1);
                errors.push(e.context(ctx));
            }
        }
    }
    Ok((instructions, errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::InsnKind;

    #[test]
    fn skips_blank_and_comment_only_lines() {
        let program = "\n// just a comment\n   \npush constant 1\n";
        let (instructions, errors) = parse(program).unwrap();
        assert!(errors.is_empty());
        assert_eq!(instructions.len(), 1);
        assert!(matches!(instructions[0].kind, InsnKind::Push(_, 1)));
    }

    #[test]
    fn strips_trailing_comment() {
        let program = "push constant 2 // the answer, almost\n";
        let (instructions, errors) = parse(program).unwrap();
        assert!(errors.is_empty());
        assert_eq!(instructions[0].lexeme, "push constant 2");
    }

    #[test]
    fn collects_errors_without_aborting_the_whole_file() {
        let program = "push constant 1\nbogus line\npush constant 2\n";
        let (instructions, errors) = parse(program).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(errors.len(), 1);
    }
}
