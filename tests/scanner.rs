use lox_interpreter as lox;

use lox::error::LoxError;
use lox::scanner::{scan, Scanner};
use lox::token::TokenType;

fn assert_token_sequence(source: &str, expected: &[(TokenType, &str)]) {
    let scanner = Scanner::new(source.as_bytes());
    let tokens: Vec<_> = scanner.filter_map(Result::ok).collect();

    assert_eq!(tokens.len(), expected.len());

    for (actual, (expected_type, expected_lexeme)) in tokens.iter().zip(expected.iter()) {
        assert_eq!(actual.token_type, *expected_type);
        assert_eq!(actual.lexeme, *expected_lexeme);
    }
}

#[test]
fn scans_symbols() {
    assert_token_sequence(
        "({*.,+*})",
        &[
            (TokenType::LEFT_PAREN, "("),
            (TokenType::LEFT_BRACE, "{"),
            (TokenType::STAR, "*"),
            (TokenType::DOT, "."),
            (TokenType::COMMA, ","),
            (TokenType::PLUS, "+"),
            (TokenType::STAR, "*"),
            (TokenType::RIGHT_BRACE, "}"),
            (TokenType::RIGHT_PAREN, ")"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn two_char_operators_use_maximal_munch() {
    assert_token_sequence(
        "! != = == < <= > >=",
        &[
            (TokenType::BANG, "!"),
            (TokenType::BANG_EQUAL, "!="),
            (TokenType::EQUAL, "="),
            (TokenType::EQUAL_EQUAL, "=="),
            (TokenType::LESS, "<"),
            (TokenType::LESS_EQUAL, "<="),
            (TokenType::GREATER, ">"),
            (TokenType::GREATER_EQUAL, ">="),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn keywords_and_identifiers() {
    assert_token_sequence(
        "var varx class classy _under score99",
        &[
            (TokenType::VAR, "var"),
            (TokenType::IDENTIFIER, "varx"),
            (TokenType::CLASS, "class"),
            (TokenType::IDENTIFIER, "classy"),
            (TokenType::IDENTIFIER, "_under"),
            (TokenType::IDENTIFIER, "score99"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn comments_and_whitespace_are_discarded() {
    assert_token_sequence(
        "// leading comment\nprint 1; // trailing\n// only comment",
        &[
            (TokenType::PRINT, "print"),
            (TokenType::NUMBER(1.0), "1"),
            (TokenType::SEMICOLON, ";"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn slash_alone_is_division() {
    assert_token_sequence(
        "8 / 2",
        &[
            (TokenType::NUMBER(8.0), "8"),
            (TokenType::SLASH, "/"),
            (TokenType::NUMBER(2.0), "2"),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn string_literal_payload_excludes_quotes() {
    let (tokens, errors) = scan(b"\"hello world\"");

    assert!(errors.is_empty());
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].token_type, TokenType::STRING(String::new()));
    match &tokens[0].token_type {
        TokenType::STRING(s) => assert_eq!(s, "hello world"),
        other => panic!("expected string token, got {:?}", other),
    }
    assert_eq!(tokens[0].lexeme, "\"hello world\"");
}

#[test]
fn multiline_string_advances_line_counter() {
    let (tokens, errors) = scan(b"\"a\nb\"\nident");

    assert!(errors.is_empty());
    // String starts on line 1, identifier lands on line 3.
    assert_eq!(tokens[0].line, 2); // token emitted after the embedded newline
    assert_eq!(tokens[1].lexeme, "ident");
    assert_eq!(tokens[1].line, 3);
}

#[test]
fn unterminated_string_reports_opening_line() {
    let (tokens, errors) = scan(b"var x;\n\"starts here\nand never ends");

    assert_eq!(errors.len(), 1);
    match &errors[0] {
        LoxError::Lex { message, line } => {
            assert_eq!(*line, 2);
            assert!(message.contains("Unterminated string"));
        }
        other => panic!("expected lex error, got {:?}", other),
    }

    // The tokens before the bad literal are unaffected.
    assert_eq!(tokens[0].token_type, TokenType::VAR);
    assert_eq!(tokens[1].token_type, TokenType::IDENTIFIER);
    assert_eq!(tokens[2].token_type, TokenType::SEMICOLON);
    assert_eq!(tokens.last().map(|t| t.token_type.clone()), Some(TokenType::EOF));
}

#[test]
fn number_literals_with_and_without_fraction() {
    let (tokens, errors) = scan(b"123 3.14");

    assert!(errors.is_empty());
    match tokens[0].token_type {
        TokenType::NUMBER(n) => assert_eq!(n, 123.0),
        _ => panic!("expected number"),
    }
    match tokens[1].token_type {
        TokenType::NUMBER(n) => assert_eq!(n, 3.14),
        _ => panic!("expected number"),
    }
}

#[test]
fn trailing_dot_is_not_part_of_the_number() {
    assert_token_sequence(
        "123.",
        &[
            (TokenType::NUMBER(123.0), "123"),
            (TokenType::DOT, "."),
            (TokenType::EOF, ""),
        ],
    );
}

#[test]
fn unexpected_characters_are_recoverable() {
    let (tokens, errors) = scan(b",.$(#");

    // Two diagnostics, and every good token still comes through, EOF last.
    assert_eq!(errors.len(), 2);
    for err in &errors {
        assert!(
            err.to_string().contains("Unexpected character"),
            "unexpected message: {}",
            err
        );
    }

    let kinds: Vec<TokenType> = tokens.iter().map(|t| t.token_type.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            TokenType::COMMA,
            TokenType::DOT,
            TokenType::LEFT_PAREN,
            TokenType::EOF,
        ]
    );
}

#[test]
fn emits_exactly_one_eof() {
    let (tokens, _) = scan(b"");

    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].token_type, TokenType::EOF);
    assert_eq!(tokens[0].line, 1);
}
