//! Splits date text into runs of digits and runs of letters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Numeric,
    Alphabetic,
}

/// A run of one character class. `start`/`end` are char offsets, half-open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn new(kind: TokenType, chars: &[char], start: usize, end: usize) -> Self {
        Self { kind, text: chars[start..end].iter().collect(), start, end }
    }
}

fn classify(c: char) -> Option<TokenType> {
    if c.is_ascii_digit() {
        Some(TokenType::Numeric)
    } else if c.is_alphabetic() {
        Some(TokenType::Alphabetic)
    } else {
        None
    }
}

/// Tokenizes `text`. Every other character only separates tokens.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut current: Option<(TokenType, usize)> = None;

    for (pos, &c) in chars.iter().enumerate() {
        let class = classify(c);
        match current {
            Some((kind, _)) if class == Some(kind) => {}
            _ => {
                if let Some((kind, start)) = current.take() {
                    tokens.push(Token::new(kind, &chars, start, pos));
                }
                current = class.map(|kind| (kind, pos));
            }
        }
    }
    if let Some((kind, start)) = current {
        tokens.push(Token::new(kind, &chars, start, chars.len()));
    }
    tokens
}
