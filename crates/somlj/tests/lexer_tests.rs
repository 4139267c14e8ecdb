use pretty_assertions::assert_eq;
use somlj::lexer::{Lexer, Token, TokenKind};

fn kinds(src: &str) -> Vec<TokenKind> {
    Lexer::tokens(src).into_iter().map(|t| t.kind).collect()
}

fn vals(src: &str) -> Vec<String> {
    Lexer::tokens(src).into_iter().map(|t| t.val).collect()
}

#[test]
fn basic_class_header_tokens() {
    assert_eq!(
        kinds("Counter = Object ("),
        vec![TokenKind::Ident, TokenKind::Eq, TokenKind::Ident, TokenKind::Lpar]
    );
}

#[test]
fn keyword_token_includes_the_colon() {
    let toks = Lexer::tokens("at: put:");
    assert_eq!(toks[0].kind, TokenKind::Keyword);
    assert_eq!(toks[0].val, "at:");
    assert_eq!(toks[1].val, "put:");
}

#[test]
fn assignment_keeps_the_identifier_plain() {
    assert_eq!(
        kinds("a := 1"),
        vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Integer]
    );
}

#[test]
fn colon_without_equals_is_a_colon() {
    assert_eq!(kinds("[ :x |"), vec![TokenKind::Lbrack, TokenKind::Colon, TokenKind::Ident, TokenKind::Bar]);
}

#[test]
fn strings_preserve_escapes_literally() {
    let toks = Lexer::tokens(r"'a\'b'");
    assert_eq!(toks[0].kind, TokenKind::Str);
    assert_eq!(toks[0].val, r"a\'b");
}

#[test]
fn unterminated_string_is_an_error() {
    let mut lex = Lexer::new("'oops", Default::default());
    let t = lex.next_token();
    assert_eq!(t.kind, TokenKind::Error);
    assert_eq!(t.val, "non-terminated string");
}

#[test]
fn comments_are_skipped_by_default() {
    assert_eq!(kinds("1 \"note\" 2"), vec![TokenKind::Integer, TokenKind::Integer]);
}

#[test]
fn comments_surface_when_requested() {
    let mut lex = Lexer::new("\"note\" 2", Default::default());
    lex.set_eat_comments(false);
    let t = lex.next_token();
    assert_eq!(t.kind, TokenKind::Comment);
    assert_eq!(t.val, "note");
}

#[test]
fn unterminated_comment_is_an_error() {
    let mut lex = Lexer::new("\"oops", Default::default());
    assert_eq!(lex.next_token().kind, TokenKind::Error);
}

#[test]
fn char_literal_takes_any_byte() {
    let toks = Lexer::tokens("$a $) $$");
    assert_eq!(toks.iter().map(|t| t.kind).collect::<Vec<_>>(), vec![TokenKind::Char; 3]);
    assert_eq!(toks[1].val, ")");
    assert_eq!(toks[2].val, "$");
}

#[test]
fn symbol_forms() {
    let toks = Lexer::tokens("#foo #+ #at:put: #'hi there'");
    assert!(toks.iter().all(|t| t.kind == TokenKind::Symbol));
    assert_eq!(
        toks.iter().map(|t| t.val.as_str()).collect::<Vec<_>>(),
        vec!["foo", "+", "at:put:", "hi there"]
    );
}

#[test]
fn symbol_with_interior_colon_is_invalid() {
    let toks: Vec<Token> = {
        let mut lex = Lexer::new("#a:b", Default::default());
        vec![lex.next_token()]
    };
    assert_eq!(toks[0].kind, TokenKind::Error);
}

#[test]
fn hash_before_paren_opens_an_array() {
    assert_eq!(kinds("#(1)"), vec![TokenKind::Hash, TokenKind::Lpar, TokenKind::Integer, TokenKind::Rpar]);
}

#[test]
fn number_forms() {
    assert_eq!(kinds("42"), vec![TokenKind::Integer]);
    assert_eq!(kinds("3.14"), vec![TokenKind::Real]);
    assert_eq!(kinds("2r101"), vec![TokenKind::Integer]);
    assert_eq!(kinds("16rFF"), vec![TokenKind::Integer]);
    assert_eq!(kinds("1e3"), vec![TokenKind::Real]);
    assert_eq!(kinds("2.5e-3"), vec![TokenKind::Real]);
    assert_eq!(vals("16rFF"), vec!["16rFF"]);
}

#[test]
fn invalid_radix_is_an_error() {
    assert_eq!(kinds("3r12"), vec![TokenKind::Error]);
}

#[test]
fn dot_after_number_terminates_the_statement() {
    assert_eq!(
        kinds("4. foo"),
        vec![TokenKind::Integer, TokenKind::Dot, TokenKind::Ident]
    );
}

#[test]
fn binary_selector_runs() {
    assert_eq!(kinds("<="), vec![TokenKind::BinSelector]);
    assert_eq!(kinds("<"), vec![TokenKind::Lt]);
    assert_eq!(kinds("~= %"), vec![TokenKind::BinSelector, TokenKind::Percent]);
}

#[test]
fn four_dashes_make_a_separator() {
    assert_eq!(kinds("----"), vec![TokenKind::Separator]);
    assert_eq!(kinds("-------"), vec![TokenKind::Separator]);
    assert_eq!(kinds("---"), vec![TokenKind::BinSelector]);
}

#[test]
fn peek_does_not_consume() {
    let mut lex = Lexer::new("a b c", Default::default());
    assert_eq!(lex.peek(2).val, "b");
    assert_eq!(lex.peek(1).val, "a");
    assert_eq!(lex.next_token().val, "a");
    assert_eq!(lex.next_token().val, "b");
}

#[test]
fn eof_repeats_forever() {
    let mut lex = Lexer::new("a", Default::default());
    lex.next_token();
    assert_eq!(lex.next_token().kind, TokenKind::Eof);
    assert_eq!(lex.peek(1).kind, TokenKind::Eof);
    assert_eq!(lex.peek(2).kind, TokenKind::Eof);
    assert_eq!(lex.next_token().kind, TokenKind::Eof);
}

#[test]
fn form_feed_counts_as_whitespace_and_advances_the_line() {
    let toks = Lexer::tokens("a\x0cb\nc");
    assert_eq!(toks.len(), 3);
    assert_eq!(toks[0].loc.line, 1);
    assert_eq!(toks[1].loc.line, 2);
    assert_eq!(toks[2].loc.line, 3);
}

#[test]
fn offsets_strictly_increase() {
    let toks = Lexer::tokens("Counter = ( | a | inc = ( a := a + 1 ) )");
    for pair in toks.windows(2) {
        assert!(pair[1].loc.pos > pair[0].loc.pos, "{pair:?}");
    }
}

#[test]
fn token_length_spans_the_lexical_extent() {
    let toks = Lexer::tokens("'ab' foo:");
    assert_eq!(toks[0].loc.len, 4); // quotes included
    assert_eq!(toks[1].loc.len, 4); // colon included
}

/// Renders a token back to source text.
fn unparse(t: &Token) -> String {
    match t.kind {
        TokenKind::Str => format!("'{}'", t.val),
        TokenKind::Char => format!("${}", t.val),
        TokenKind::Symbol => format!("#{}", t.val),
        _ => t.val.clone(),
    }
}

#[test]
fn relexing_unparsed_tokens_reproduces_them() {
    let src = "Ctr = ( | n | bump: k = ( n := n + k. ^ n >= 16r2A ifTrue: [ #ok ] ) ) $x 'str' ---- 2.5e-3";
    let toks = Lexer::tokens(src);
    let mut text = String::new();
    for t in &toks {
        text.push_str(&unparse(t));
        // `#` fuses with the paren that follows it
        if t.kind != TokenKind::Hash {
            text.push(' ');
        }
    }
    let again = Lexer::tokens(&text);
    assert_eq!(toks.len(), again.len());
    for (a, b) in toks.iter().zip(&again) {
        assert_eq!(a.kind, b.kind, "{a:?} vs {b:?}");
        assert_eq!(a.val, b.val);
    }
}
