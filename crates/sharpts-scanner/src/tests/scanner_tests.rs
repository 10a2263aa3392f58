use crate::token::TokenKind;
use crate::Scanner;

fn kinds(source: &str) -> Vec<TokenKind> {
    Scanner::new(source)
        .scan()
        .expect("scan failed")
        .into_iter()
        .map(|t| t.kind)
        .collect()
}

#[test]
fn scans_numeric_separators() {
    let toks = kinds("let x = 1_000_000;");
    assert!(toks.contains(&TokenKind::Number(1_000_000.0)));
}

#[test]
fn rejects_bad_separators() {
    for bad in ["1__000", "1_", "_1;", "1_.0", "1._0"] {
        let result = Scanner::new(&format!("let x = {bad};")).scan();
        if bad == "_1;" {
            // `_1` scans as an identifier, not a malformed number.
            assert!(result.is_ok());
        } else {
            assert!(result.is_err(), "expected error for {bad}");
        }
    }
}

#[test]
fn scans_radix_and_bigint_literals() {
    use num_bigint::BigInt;
    let toks = kinds("0xFF 0b101 0o17 42n");
    assert_eq!(toks[0], TokenKind::Number(255.0));
    assert_eq!(toks[1], TokenKind::Number(5.0));
    assert_eq!(toks[2], TokenKind::Number(15.0));
    assert_eq!(toks[3], TokenKind::BigInt(BigInt::from(42)));
}

#[test]
fn distinguishes_regex_from_division() {
    // After `=` a slash starts a regex.
    let toks = kinds("let r = /ab+c/gi;");
    assert!(matches!(
        &toks[3],
        TokenKind::Regex { pattern, flags } if pattern == "ab+c" && flags == "gi"
    ));

    // After an identifier a slash is division.
    let toks = kinds("let y = x / 2;");
    assert!(toks.contains(&TokenKind::Slash));
}

#[test]
fn scans_template_parts() {
    let toks = kinds("`a${x}b${y}c`");
    assert_eq!(toks[0], TokenKind::TemplateHead("a".into()));
    assert_eq!(toks[1], TokenKind::Ident("x".into()));
    assert_eq!(toks[2], TokenKind::TemplateMiddle("b".into()));
    assert_eq!(toks[3], TokenKind::Ident("y".into()));
    assert_eq!(toks[4], TokenKind::TemplateTail("c".into()));
}

#[test]
fn template_substitution_tracks_nested_braces() {
    let toks = kinds("`v=${ {a: 1}.a }!`");
    assert_eq!(toks[0], TokenKind::TemplateHead("v=".into()));
    assert_eq!(*toks.last().unwrap(), TokenKind::Eof);
    assert!(toks.contains(&TokenKind::TemplateTail("!".into())));
}

#[test]
fn scans_multichar_operators_longest_first() {
    let toks = kinds("a >>>= b ** c ?? d?.e");
    assert!(toks.contains(&TokenKind::GtGtGtEq));
    assert!(toks.contains(&TokenKind::StarStar));
    assert!(toks.contains(&TokenKind::QuestionQuestion));
    assert!(toks.contains(&TokenKind::QuestionDot));
}

#[test]
fn shift_right_stays_one_token() {
    // The parser splits `>>` in type-argument context; the scanner never does.
    let toks = kinds("Map<string, Array<number>>");
    assert!(toks.contains(&TokenKind::GtGt));
}

#[test]
fn processes_string_escapes() {
    let toks = kinds(r#"let s = "a\nbA\x41";"#);
    assert!(toks.contains(&TokenKind::Str("a\nbAA".into())));
}

#[test]
fn keywords_and_contextual_keywords() {
    let toks = kinds("class c implements i { readonly async x() {} }");
    assert_eq!(toks[0], TokenKind::Class);
    // `implements`, `readonly`, and `async` are contextual.
    assert_eq!(toks[2], TokenKind::Ident("implements".into()));
    assert!(toks.contains(&TokenKind::Ident("readonly".into())));
    assert!(toks.contains(&TokenKind::Ident("async".into())));
}

#[test]
fn skips_line_and_block_comments() {
    let toks = kinds("1 // comment\n/* block\nspanning */ 2");
    assert_eq!(toks[0], TokenKind::Number(1.0));
    assert_eq!(toks[1], TokenKind::Number(2.0));
    assert_eq!(toks[2], TokenKind::Eof);
}
