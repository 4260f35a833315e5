//! Structured error taxonomy, one phase per variant (spec.md §7).
//!
//! `ParseError`/`ParseErrorKind` keep the teacher's hand-rolled shape
//! (`src/error.rs`) — gutter line number, `^^^^` underline, Levenshtein
//! "did you mean" hint — since that file is a direct carry-over generalised
//! from English-grammar errors to Sindarin syntax errors. Every other leaf
//! error type is new ambient scaffolding and uses `thiserror`, matching the
//! rest of the pack's stack (e.g. `typedlua-core`).

use crate::style::Style;
use crate::suggest::{find_similar, KNOWN_WORDS};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError<'a> {
    pub kind: ParseErrorKind,
    pub token: Token<'a>,
}

impl<'a> ParseError<'a> {
    pub fn new(kind: ParseErrorKind, token: Token<'a>) -> Self {
        ParseError { kind, token }
    }

    /// Renders a one-error report against the full source of the file the
    /// offending token came from: a gutter line, a `^^^^` underline under
    /// the token's own text, and (for identifier-shaped tokens) a "did you
    /// mean" suggestion against the keyword table.
    pub fn display_with_source(&self, source: &str) -> String {
        let line_no = self.token.line;
        let line_content = source.lines().nth(line_no.saturating_sub(1) as usize).unwrap_or("");
        let col = line_content.find(self.token.text).unwrap_or(0);
        let len = self.token.text.len().max(1);
        let underline = format!("{}{}", " ".repeat(col), "^".repeat(len));

        let error_label = Style::bold_red("error");
        let kind_str = format!("{:?}", self.kind);
        let line_num_str = Style::blue(&format!("{:4}", line_no));
        let pipe = Style::blue("|");
        let underline_colored = Style::red(&underline);

        let mut result = format!(
            "{}: {}\n\n{} {} {}\n     {} {}",
            error_label, kind_str, line_num_str, pipe, line_content, pipe, underline_colored
        );

        if self.token.kind == TokenKind::Ident {
            if let Some(suggestion) = find_similar(self.token.text, KNOWN_WORDS, 2) {
                let hint = Style::cyan("help");
                result.push_str(&format!(
                    "\n     {} {}: did you mean '{}'?",
                    pipe,
                    hint,
                    Style::green(suggestion)
                ));
            }
        }

        result
    }
}

#[derive(Debug, Clone)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: TokenKind, found: TokenKind },
    ExpectedExpression,
    ExpectedIdentifier,
    ExpectedType,
    ExpectedStatement,
    ExpectedColon,
    ExpectedFatArrow,
    ExpectedParam,
    ConflictingFnModifiers,
    ModifierNotAllowedOnBlock,
    MemoryQualifierOnInvalidTarget,
    UnterminatedInterpolationRegion,
    MismatchedInterpolationNesting,
    InvalidMatchArm,
}

/// Lexical-phase failure (spec.md §7's *Lexical* kind). The lexer itself
/// reports these inline as `TokenKind::Error` tokens; this owned form is
/// what the driver converts them into once it needs to propagate past the
/// arena's lifetime.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{filename}:{line}: {message}")]
pub struct LexError {
    pub message: String,
    pub filename: String,
    pub line: u32,
}

/// Import-resolution failure (spec.md §7's *Import* kind, §4.3).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    #[error("cannot find module '{name}'")]
    ModuleNotFound { name: String },
    #[error("cannot read module '{path}': {message}")]
    CannotReadModule { path: String, message: String },
    #[error("import of '{path}' failed during recursive parse")]
    RecursiveParseFailed { path: String },
}

/// Malformed-pragma failure (spec.md §7's *Pragma* kind, §4.2/§6).
#[derive(Debug, Clone, thiserror::Error)]
pub enum PragmaError {
    #[error("{filename}:{line}: malformed pragma: {text}")]
    Malformed { filename: String, line: u32, text: String },
    #[error(
        "{filename}:{line}: the quoted form '{raw}' is no longer accepted; write the include target unquoted, e.g. #pragma include {suggestion}"
    )]
    OldQuotedIncludeForm { filename: String, line: u32, raw: String, suggestion: String },
    #[error("{filename}:{line}: pragma source file not found: {path}")]
    MissingSourceFile { filename: String, line: u32, path: String },
}

/// Toolchain-detection failure (spec.md §7's *Toolchain* kind, §4.4).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolchainError {
    #[error("no C compiler found on PATH; install one of gcc, clang, tcc ({hint})")]
    MissingCompiler { hint: String },
    #[error("runtime archive not found at {path}")]
    MissingRuntimeArchive { path: String },
}

/// Link/compile subprocess failure (spec.md §7's *Link* kind), carrying a
/// verbatim replay of the captured child stderr per §4.4's command
/// construction rules.
#[derive(Debug, Clone, thiserror::Error)]
#[error("compiler exited with status {code:?}\n{stderr}")]
pub struct LinkError {
    pub code: Option<i32>,
    pub stderr: String,
}

/// The top-level error every phase funnels into, surfaced by `main` via its
/// `Display` impl and mapped to exit code 1 (spec.md §6/§7).
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Lex(#[from] LexError),
    /// Rendered `ParseError::display_with_source` output; parse errors are
    /// arena-lifetime-bound, so the driver renders them to an owned string
    /// before converting into this 'static error type.
    #[error("{0}")]
    Parse(String),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Pragma(#[from] PragmaError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error(transparent)]
    Link(#[from] LinkError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok<'a>(text: &'a str, line: u32) -> Token<'a> {
        Token::new(TokenKind::Ident, text, line, "t.sn")
    }

    #[test]
    fn display_with_source_shows_line_and_underline() {
        let error = ParseError::new(ParseErrorKind::ExpectedExpression, tok("brz", 1));
        let source = "var x: int = brz\n";
        let display = error.display_with_source(source);
        assert!(display.contains("brz"), "should contain source word: {display}");
        assert!(display.contains("^^^"), "should contain underline: {display}");
    }

    #[test]
    fn display_with_source_suggests_typo_fix() {
        let error = ParseError::new(ParseErrorKind::ExpectedStatement, tok("retrun", 1));
        let source = "retrun 1\n";
        let display = error.display_with_source(source);
        assert!(display.contains("did you mean"), "should suggest a fix: {display}");
        assert!(display.contains("return"), "should suggest 'return': {display}");
    }

    #[test]
    fn display_with_source_has_color_codes() {
        let error = ParseError::new(ParseErrorKind::ExpectedExpression, tok("x", 1));
        let display = error.display_with_source("var x\n");
        assert!(display.contains("\x1b["), "should contain ANSI escape codes: {display}");
    }

    #[test]
    fn compile_error_display_delegates_to_variant() {
        let err = CompileError::Toolchain(ToolchainError::MissingCompiler { hint: "apt install gcc".into() });
        assert!(err.to_string().contains("no C compiler found"));
    }

    #[test]
    fn link_error_includes_captured_stderr() {
        let err = LinkError { code: Some(1), stderr: "undefined reference to `foo`".into() };
        assert!(err.to_string().contains("undefined reference"));
    }
}
