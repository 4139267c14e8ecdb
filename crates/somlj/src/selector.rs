//! Stable selector-name encoding for method-table keys.
//!
//! Keyword selectors replace each `:` with `_`. Binary selectors map each
//! operator character to a single letter behind a `_0` prefix. Unary
//! selectors pass through, prefixed with `_` when they collide with a
//! reserved word of the target's textual dialect.

use crate::ast::PatternKind;

/// Reserved words of the target's textual dialect (Lua).
const HOST_KEYWORDS: [&str; 21] = [
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "if", "in", "local",
    "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// `true` when a plain identifier needs the collision prefix.
#[must_use]
pub fn is_host_keyword(name: &str) -> bool {
    HOST_KEYWORDS.contains(&name)
}

/// Prefixes identifiers that collide with a host keyword.
#[must_use]
pub fn prefix(name: &str) -> String {
    if is_host_keyword(name) {
        format!("_{name}")
    } else {
        name.to_owned()
    }
}

fn binary_letter(ch: char) -> Option<char> {
    Some(match ch {
        '~' => 't',
        '&' => 'a',
        '|' => 'b',
        '*' => 's',
        '/' => 'h',
        '\\' => 'B',
        '+' => 'p',
        '=' => 'q',
        '>' => 'g',
        '<' => 'l',
        ',' => 'c',
        '@' => 'A',
        '%' => 'r',
        '-' => 'm',
        _ => return None,
    })
}

/// Encodes a selector of a known pattern kind.
#[must_use]
pub fn encode(name: &str, pattern: PatternKind) -> String {
    match pattern {
        PatternKind::Unary => prefix(name),
        PatternKind::Keyword => name.replace(':', "_"),
        PatternKind::Binary => {
            let mut out = String::with_capacity(name.len() + 2);
            out.push_str("_0");
            for ch in name.chars() {
                match binary_letter(ch) {
                    Some(l) => out.push(l),
                    // '?' and '!' only appear in longer selectors and have
                    // no dedicated letter; keep them verbatim
                    None => out.push(ch),
                }
            }
            out
        }
    }
}

/// Encodes a selector, classifying the pattern kind from its spelling.
#[must_use]
pub fn encode_any(name: &str) -> String {
    if name.contains(':') {
        encode(name, PatternKind::Keyword)
    } else if name.chars().next().is_some_and(|c| binary_letter(c).is_some() || c == '?' || c == '!') {
        encode(name, PatternKind::Binary)
    } else {
        encode(name, PatternKind::Unary)
    }
}
