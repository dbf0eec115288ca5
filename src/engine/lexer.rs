//! Tokenizer for the nodus dialect
//!
//! Line-oriented: newlines separate statements except inside brackets.
//! `#` starts a comment. Identifiers follow Unicode XID rules.

use crate::error::ExecError;
use unicode_xid::UnicodeXID;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Colon,
    Dot,
    Semi,
    Newline,
    Assign,
    EqEq,
    NotEq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

pub fn lex(source: &str) -> Result<Vec<Token>, ExecError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line: u32 = 1;
    // Newlines are soft separators; suppress them inside any bracket pair.
    let mut depth: u32 = 0;

    let push = |tok: Tok, line: u32, tokens: &mut Vec<Token>| {
        tokens.push(Token { tok, line });
    };

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' => {
                chars.next();
                if depth == 0 {
                    push(Tok::Newline, line, &mut tokens);
                }
                line += 1;
            }
            '#' => {
                for nc in chars.by_ref() {
                    if nc == '\n' {
                        if depth == 0 {
                            push(Tok::Newline, line, &mut tokens);
                        }
                        line += 1;
                        break;
                    }
                }
            }
            '{' => {
                chars.next();
                depth += 1;
                push(Tok::LBrace, line, &mut tokens);
            }
            '}' => {
                chars.next();
                depth = depth.saturating_sub(1);
                push(Tok::RBrace, line, &mut tokens);
            }
            '[' => {
                chars.next();
                depth += 1;
                push(Tok::LBracket, line, &mut tokens);
            }
            ']' => {
                chars.next();
                depth = depth.saturating_sub(1);
                push(Tok::RBracket, line, &mut tokens);
            }
            '(' => {
                chars.next();
                depth += 1;
                push(Tok::LParen, line, &mut tokens);
            }
            ')' => {
                chars.next();
                depth = depth.saturating_sub(1);
                push(Tok::RParen, line, &mut tokens);
            }
            ',' => {
                chars.next();
                push(Tok::Comma, line, &mut tokens);
            }
            ':' => {
                chars.next();
                push(Tok::Colon, line, &mut tokens);
            }
            '.' => {
                chars.next();
                push(Tok::Dot, line, &mut tokens);
            }
            ';' => {
                chars.next();
                push(Tok::Semi, line, &mut tokens);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push(Tok::EqEq, line, &mut tokens);
                } else {
                    push(Tok::Assign, line, &mut tokens);
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    push(Tok::NotEq, line, &mut tokens);
                } else {
                    return Err(ExecError::script("unexpected '!'", line));
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        None => return Err(ExecError::script("unterminated string", line)),
                        Some('\n') => {
                            return Err(ExecError::script("unterminated string", line))
                        }
                        Some('\\') => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some('r') => text.push('\r'),
                            Some('\\') => text.push('\\'),
                            Some('\'') => text.push('\''),
                            Some('"') => text.push('"'),
                            Some(other) => {
                                return Err(ExecError::script(
                                    format!("unknown escape '\\{}'", other),
                                    line,
                                ))
                            }
                            None => {
                                return Err(ExecError::script("unterminated string", line))
                            }
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => text.push(ch),
                    }
                }
                push(Tok::Str(text), line, &mut tokens);
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit() || nc == '.' || nc == 'e' || nc == 'E' || nc == '_' {
                        if nc == '.' {
                            // A trailing '.' is member access, not a fraction.
                            let mut lookahead = chars.clone();
                            lookahead.next();
                            if !lookahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                                break;
                            }
                        }
                        if nc != '_' {
                            text.push(nc);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = text
                    .parse()
                    .map_err(|_| ExecError::script(format!("bad number '{}'", text), line))?;
                push(Tok::Num(value), line, &mut tokens);
            }
            c if c == '_' || UnicodeXID::is_xid_start(c) => {
                let mut name = String::new();
                while let Some(&nc) = chars.peek() {
                    if nc == '_' || UnicodeXID::is_xid_continue(nc) {
                        name.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let tok = match name.as_str() {
                    "true" => Tok::True,
                    "false" => Tok::False,
                    "null" => Tok::Null,
                    _ => Tok::Ident(name),
                };
                push(tok, line, &mut tokens);
            }
            other => {
                return Err(ExecError::script(
                    format!("unexpected character '{}'", other),
                    line,
                ));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        lex(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            toks("x = require('./b')"),
            vec![
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Ident("require".into()),
                Tok::LParen,
                Tok::Str("./b".into()),
                Tok::RParen,
            ]
        );
    }

    #[test]
    fn test_comments_and_newlines() {
        let t = toks("a = 1  # set a\nb = 2");
        assert!(t.contains(&Tok::Newline));
        assert!(!t.iter().any(|t| matches!(t, Tok::Ident(s) if s == "set")));
    }

    #[test]
    fn test_newlines_suppressed_in_brackets() {
        let t = toks("x = {\n  a: 1,\n  b: 2\n}\n");
        let newlines = t.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(toks("1.5"), vec![Tok::Num(1.5)]);
        assert_eq!(toks("10"), vec![Tok::Num(10.0)]);
        // Member access on a number stays a Dot.
        assert_eq!(
            toks("x.y"),
            vec![Tok::Ident("x".into()), Tok::Dot, Tok::Ident("y".into())]
        );
    }

    #[test]
    fn test_equality_operators() {
        assert_eq!(toks("a == b")[1], Tok::EqEq);
        assert_eq!(toks("a != b")[1], Tok::NotEq);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(toks(r#""a\nb""#), vec![Tok::Str("a\nb".into())]);
        assert!(lex("'unterminated").is_err());
    }

    #[test]
    fn test_line_tracking() {
        let tokens = lex("a = 1\nb = oops_at_line_two").unwrap();
        let last = tokens.last().unwrap();
        assert_eq!(last.line, 2);
    }
}
