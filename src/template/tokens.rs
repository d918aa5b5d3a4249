//! Nested delimited-region parsing
//!
//! [`TokenStack::parse`] extracts regions wrapped between a prefix and a
//! suffix (`@{…}` variables, `$(…)` subcommands), innermost first, plus
//! the concatenation of all non-enclosed characters. A backslash before a
//! prefix or suffix suppresses matching of the next character.

/// One delimited region found in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFrame {
    /// Byte-independent character offset of the opening delimiter.
    pub start: usize,
    /// Character offset of the last character of the closing delimiter.
    pub end: usize,
    /// The full region text, delimiters included.
    pub text: String,
    /// Nesting depth; 0 for top-level regions.
    pub nest: usize,
}

/// The result of parsing: frames ordered innermost-first, and the text
/// outside of any region.
#[derive(Debug, Default, Clone)]
pub struct TokenStack {
    pub frames: Vec<TokenFrame>,
    pub extra: String,
}

impl TokenStack {
    pub fn parse(input: &str, prefix: &str, suffix: &str) -> TokenStack {
        let chars: Vec<char> = input.chars().collect();
        let prefix_chars: Vec<char> = prefix.chars().collect();
        let suffix_chars: Vec<char> = suffix.chars().collect();

        let mut stack = TokenStack::default();
        let mut work: Vec<TokenFrame> = Vec::new();
        let mut current: Option<TokenFrame> = None;
        let mut escape_next = false;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                escape_next = true;
                i += 1;
                continue;
            }
            if escape_next {
                escape_next = false;
                i += 1;
                continue;
            }

            if starts_with_at(&chars, i, &prefix_chars) {
                let nest = match &current {
                    Some(frame) => {
                        work.push(frame.clone());
                        frame.nest + 1
                    }
                    None => 0,
                };
                current = Some(TokenFrame {
                    start: i,
                    end: 0,
                    text: String::new(),
                    nest,
                });
            } else if current.is_some() && starts_with_at(&chars, i, &suffix_chars) {
                let mut frame = current.take().unwrap();
                frame.end = i + suffix_chars.len() - 1;
                frame.text = chars[frame.start..=frame.end].iter().collect();
                stack.frames.push(frame);
                current = work.pop();
            } else if current.is_none() {
                stack.extra.push(c);
            }
            i += 1;
        }

        stack
    }
}

fn starts_with_at(chars: &[char], at: usize, needle: &[char]) -> bool {
    chars.len() >= at + needle.len() && chars[at..at + needle.len()] == *needle
}

/// Tracks which string-literal quote (if any) the scanner is inside.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuoteState {
    in_double: bool,
    in_single: bool,
    in_backtick: bool,
}

impl QuoteState {
    pub fn in_quote(&self) -> bool {
        self.in_double || self.in_single || self.in_backtick
    }

    pub fn is_quote(c: char) -> bool {
        c == '"' || c == '\'' || c == '`'
    }

    pub fn toggle(&mut self, c: char) {
        match c {
            '"' => self.in_double = !self.in_double,
            '\'' => self.in_single = !self.in_single,
            '`' => self.in_backtick = !self.in_backtick,
            _ => {}
        }
    }
}

/// Split `input` on any of `delimiters`, ignoring delimiters inside quotes
/// (single, double, or backtick) and delimiters escaped with a preceding
/// backslash. Empty tokens are dropped; tokens are trimmed.
pub fn split_tokens(input: &str, delimiters: &str) -> Vec<String> {
    let chars: Vec<char> = input.trim().chars().collect();
    let mut quote = QuoteState::default();
    let mut tokens = Vec::new();
    let mut start = 0usize;
    let mut escaped = false;

    let mut i = 0;
    while i < chars.len() && start < chars.len() {
        let c = chars[i];
        if c == '\\' {
            escaped = true;
            i += 1;
            continue;
        }
        if escaped {
            escaped = false;
            i += 1;
            continue;
        }

        let is_delim = delimiters.contains(c);
        if !quote.in_quote() && is_delim {
            let token: String = chars[start..i].iter().collect();
            let token = token.trim().to_string();
            if !token.is_empty() {
                tokens.push(token);
            }
            start = i + 1;
        } else if !is_delim && QuoteState::is_quote(c) {
            quote.toggle(c);
        }
        i += 1;
    }

    if start < chars.len() {
        let token: String = chars[start..].iter().collect();
        let token = token.trim().to_string();
        if !token.is_empty() {
            tokens.push(token);
        }
    }

    tokens
}

/// Promote nested quotes up one level: a fully quoted token loses its outer
/// quotes, and each run of backslashes inside collapses one level. This is
/// the contract that lets users embed `$(prog \"arg with spaces\")` inside
/// a double-quoted YAML scalar and still get sane shell-style tokens.
///
/// Collapse rules for a run of N backslashes: N=1 removes the escape
/// entirely, even N keeps N-1, odd N>1 keeps N-2.
pub fn promote_quotes(tokens: Vec<String>) -> Vec<String> {
    let mut promoted = Vec::with_capacity(tokens.len());
    for token in tokens {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() < 2
            || !QuoteState::is_quote(chars[0])
            || !QuoteState::is_quote(chars[chars.len() - 1])
        {
            promoted.push(token);
            continue;
        }
        let inner = &chars[1..chars.len() - 1];

        let mut out = String::new();
        let mut i = 0;
        while i < inner.len() {
            if inner[i] == '\\' {
                let mut end = i + 1;
                while end < inner.len() && inner[end] == '\\' {
                    end += 1;
                }
                let count = end - i;
                let keep = if count == 1 {
                    0
                } else if count % 2 == 0 {
                    count - 1
                } else {
                    count - 2
                };
                for _ in 0..keep {
                    out.push('\\');
                }
                i = end;
                continue;
            }
            out.push(inner[i]);
            i += 1;
        }
        promoted.push(out);
    }
    promoted
}
