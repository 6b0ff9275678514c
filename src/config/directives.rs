//! Reader for the nginx-flavoured directive files that carry rules.
//!
//! The grammar is deliberately small: tokens are separated by whitespace,
//! double quotes group a token (with `\"` and `\\` escapes), `;` ends a
//! directive and `#` starts a comment outside quotes. A trailing directive
//! without `;` is accepted so inline directives in the server config can
//! omit it.

use crate::core::waf::error::{ConfigError, ConfigErrorKind, SourcePos};

/// One directive: keyword followed by its arguments, with its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub tokens: Vec<String>,
    pub pos: SourcePos,
}

impl Directive {
    pub fn new(tokens: Vec<String>, pos: SourcePos) -> Self {
        Self { tokens, pos }
    }

    /// The directive keyword (first token).
    pub fn keyword(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or_default()
    }

    /// Tokens after the keyword.
    pub fn args(&self) -> &[String] {
        self.tokens.get(1..).unwrap_or_default()
    }
}

/// Split `text` into directives, tagging each with `origin` and the line of
/// its first token.
pub fn parse_directives(origin: &str, text: &str) -> Result<Vec<Directive>, ConfigError> {
    let mut directives = Vec::new();
    let mut tokens: Vec<String> = Vec::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\n' => line += 1,
            c if c.is_whitespace() => {}
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            ';' => {
                if !tokens.is_empty() {
                    directives.push(Directive::new(
                        std::mem::take(&mut tokens),
                        SourcePos::new(origin, start_line),
                    ));
                }
            }
            '"' => {
                if tokens.is_empty() {
                    start_line = line;
                }
                let quote_line = line;
                let mut token = String::new();
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    match inner {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => token.push(escaped),
                            Some(other) => {
                                token.push('\\');
                                if other == '\n' {
                                    line += 1;
                                }
                                token.push(other);
                            }
                            None => break,
                        },
                        '\n' => {
                            line += 1;
                            token.push(inner);
                        }
                        _ => token.push(inner),
                    }
                }
                if !closed {
                    return Err(
                        ConfigError::new(ConfigErrorKind::UnterminatedQuote, token)
                            .at(&SourcePos::new(origin, quote_line)),
                    );
                }
                tokens.push(token);
            }
            _ => {
                if tokens.is_empty() {
                    start_line = line;
                }
                let mut token = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_whitespace() || next == ';' || next == '"' || next == '#' {
                        break;
                    }
                    token.push(next);
                    chars.next();
                }
                tokens.push(token);
            }
        }
    }

    if !tokens.is_empty() {
        directives.push(Directive::new(tokens, SourcePos::new(origin, start_line)));
    }

    Ok(directives)
}
