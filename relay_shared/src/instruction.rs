//! A single line of machine code as read from a job or a control message.

use std::fmt;

/// One textual instruction. The raw text is kept as given; only the
/// sanitized form is ever put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    raw: String,
}

impl Instruction {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Text with everything from the first `;` removed, trimmed.
    pub fn sanitized(&self) -> &str {
        let code = match self.raw.split_once(';') {
            Some((code, _comment)) => code,
            None => &self.raw,
        };
        code.trim()
    }

    /// True when nothing would be transmitted for this instruction.
    pub fn is_blank(&self) -> bool {
        self.sanitized().is_empty()
    }

    /// Split job text into instructions, one per line. Blank lines are kept so
    /// that line counting matches the source file.
    pub fn from_lines(text: &str) -> Vec<Instruction> {
        text.lines().map(Instruction::new).collect()
    }
}

impl From<&str> for Instruction {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Instruction {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sanitized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_inline_comment_and_whitespace() {
        let inst = Instruction::new("  G1 X10 Y20 ; move to start  \r");
        assert_eq!(inst.sanitized(), "G1 X10 Y20");
        assert!(!inst.is_blank());
    }

    #[test]
    fn comment_only_and_whitespace_lines_are_blank() {
        assert!(Instruction::new("; home all axes").is_blank());
        assert!(Instruction::new("   \t").is_blank());
        assert!(Instruction::new("").is_blank());
    }

    #[test]
    fn from_lines_keeps_blank_lines() {
        let lines = Instruction::from_lines("G28\n\n; comment\nM105\n");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().filter(|i| !i.is_blank()).count(), 2);
    }
}
