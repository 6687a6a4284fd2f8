//! Tokenizer for the calculation language
//!
//! Newlines and `;` separate statements, except inside brackets where they
//! are plain whitespace. `#` starts a comment that runs to the end of the line.

use super::SandboxError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Number(f64),
    Ident(String),
    Text(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Assign,
    Separator,
}

impl Token {
    pub(super) fn describe(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Ident(name) => name.clone(),
            Self::Text(s) => format!("{s:?}"),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Star => "*".into(),
            Self::StarStar => "**".into(),
            Self::Slash => "/".into(),
            Self::SlashSlash => "//".into(),
            Self::Percent => "%".into(),
            Self::LParen => "(".into(),
            Self::RParen => ")".into(),
            Self::LBracket => "[".into(),
            Self::RBracket => "]".into(),
            Self::Comma => ",".into(),
            Self::Assign => "=".into(),
            Self::Separator => "end of statement".into(),
        }
    }
}

/// A token and its byte offset
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Spanned {
    pub(super) token: Token,
    pub(super) pos: usize,
}

pub(super) fn tokenize(source: &str) -> Result<Vec<Spanned>, SandboxError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();
    let mut depth = 0usize;

    while let Some(&(pos, ch)) = chars.peek() {
        let single = |token| Spanned { token, pos };
        match ch {
            '\n' | ';' => {
                chars.next();
                if depth == 0 && !matches!(tokens.last(), None | Some(Spanned { token: Token::Separator, .. })) {
                    tokens.push(single(Token::Separator));
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while chars.next_if(|&(_, c)| c != '\n').is_some() {}
            }
            '0'..='9' | '.' => tokens.push(single(Token::Number(number(&mut chars)?))),
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_') {
                    name.push(c);
                }
                tokens.push(single(Token::Ident(name)));
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, c)) if c == ch => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(SandboxError::UnterminatedString(pos)),
                        },
                        Some((_, c)) => text.push(c),
                        None => return Err(SandboxError::UnterminatedString(pos)),
                    }
                }
                tokens.push(single(Token::Text(text)));
            }
            _ => {
                chars.next();
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' if chars.next_if(|&(_, c)| c == '*').is_some() => Token::StarStar,
                    '*' => Token::Star,
                    '/' if chars.next_if(|&(_, c)| c == '/').is_some() => Token::SlashSlash,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' | '[' => {
                        depth += 1;
                        if ch == '(' { Token::LParen } else { Token::LBracket }
                    }
                    ')' | ']' => {
                        depth = depth.saturating_sub(1);
                        if ch == ')' { Token::RParen } else { Token::RBracket }
                    }
                    ',' => Token::Comma,
                    '=' => Token::Assign,
                    other => return Err(SandboxError::UnexpectedChar { ch: other, pos }),
                };
                tokens.push(single(token));
            }
        }
    }
    Ok(tokens)
}

fn number(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<f64, SandboxError> {
    let mut raw = String::new();
    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit() || c == '.' || c == '_') {
        if c != '_' {
            raw.push(c);
        }
    }
    if let Some((_, e)) = chars.next_if(|&(_, c)| c == 'e' || c == 'E') {
        raw.push(e);
        if let Some((_, sign)) = chars.next_if(|&(_, c)| c == '+' || c == '-') {
            raw.push(sign);
        }
        while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
            raw.push(c);
        }
    }
    raw.parse().map_err(|_| SandboxError::InvalidNumber(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn operators_and_names() {
        assert_eq!(
            kinds("result = a ** 2 // b"),
            vec![
                Token::Ident("result".into()),
                Token::Assign,
                Token::Ident("a".into()),
                Token::StarStar,
                Token::Number(2.0),
                Token::SlashSlash,
                Token::Ident("b".into()),
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_whitespace() {
        let tokens = kinds("x = [1,\n 2]\n\ny = 3");
        let separators = tokens.iter().filter(|t| **t == Token::Separator).count();
        assert_eq!(separators, 1);
    }

    #[test]
    fn comments_and_strings() {
        assert_eq!(
            kinds("input_data[\"n1\"] # budget"),
            vec![
                Token::Ident("input_data".into()),
                Token::LBracket,
                Token::Text("n1".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn exponent_literal() {
        assert_eq!(kinds("1.5e3"), vec![Token::Number(1500.0)]);
    }

    #[test]
    fn rejects_unknown_character() {
        assert_eq!(
            tokenize("a & b"),
            Err(SandboxError::UnexpectedChar { ch: '&', pos: 2 })
        );
    }
}
