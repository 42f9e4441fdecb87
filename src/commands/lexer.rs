//! Lexer for raw input lines.
//!
//! Whitespace separates tokens outside quotes. Matching single or double
//! quotes group their content (including whitespace) into one token and
//! are stripped from the value. A backslash escapes the following
//! character inside double quotes only. Each token carries its byte span
//! in the original line for completion and error reporting.

use super::error::CommandError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Bare,
    SingleQuoted,
    DoubleQuoted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub value: String,
    pub kind: TokenKind,
    /// Byte offset of the first character, quotes included.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

/// Tokenize a whole line. An unterminated quote is an error carrying the
/// byte position of the opening quote.
pub fn tokenize(line: &str) -> Result<Vec<Token>, CommandError> {
    lex(line, true)
}

/// Tolerant variant for completion: an open quote extends to the end of
/// the line instead of failing.
pub fn tokenize_prefix(line: &str) -> Vec<Token> {
    lex(line, false).unwrap_or_default()
}

fn lex(line: &str, strict: bool) -> Result<Vec<Token>, CommandError> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let n = chars.len();
    let mut tokens = Vec::new();
    let mut idx = 0;

    while idx < n {
        let (pos, ch) = chars[idx];
        if ch.is_whitespace() {
            idx += 1;
            continue;
        }

        let start = pos;
        let mut value = String::new();
        let mut end = line.len();
        let mut quoted_runs = 0u32;
        let mut bare_chars = false;
        let mut quote_kind = TokenKind::Bare;

        while idx < n {
            let (pos, ch) = chars[idx];
            if ch == '"' || ch == '\'' {
                let open_position = pos;
                quoted_runs += 1;
                quote_kind = if ch == '"' {
                    TokenKind::DoubleQuoted
                } else {
                    TokenKind::SingleQuoted
                };
                idx += 1;
                let mut closed = false;
                while idx < n {
                    let (_, inner) = chars[idx];
                    if inner == ch {
                        closed = true;
                        idx += 1;
                        break;
                    }
                    if ch == '"' && inner == '\\' && idx + 1 < n {
                        value.push(chars[idx + 1].1);
                        idx += 2;
                        continue;
                    }
                    value.push(inner);
                    idx += 1;
                }
                if !closed && strict {
                    return Err(CommandError::UnterminatedQuote {
                        position: open_position,
                    });
                }
            } else if ch.is_whitespace() {
                end = pos;
                break;
            } else {
                bare_chars = true;
                value.push(ch);
                idx += 1;
            }
        }

        let kind = if quoted_runs == 1 && !bare_chars {
            quote_kind
        } else {
            TokenKind::Bare
        };
        tokens.push(Token {
            value,
            kind,
            start,
            end,
        });
    }

    Ok(tokens)
}
