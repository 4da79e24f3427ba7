use logos::Logos;

use super::universe::{is_builtin_const, is_builtin_func, is_builtin_type};
use crate::model::{Messages, Tok, TokType, ToksResult};
use crate::span::LineIndex;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    #[token("break")]
    #[token("case")]
    #[token("chan")]
    #[token("const")]
    #[token("continue")]
    #[token("default")]
    #[token("defer")]
    #[token("else")]
    #[token("fallthrough")]
    #[token("for")]
    #[token("func")]
    #[token("go")]
    #[token("goto")]
    #[token("if")]
    #[token("import")]
    #[token("interface")]
    #[token("map")]
    #[token("package")]
    #[token("range")]
    #[token("return")]
    #[token("select")]
    #[token("struct")]
    #[token("switch")]
    #[token("type")]
    #[token("var")]
    Keyword,

    #[regex(r"[\p{L}_][\p{L}\p{Nd}_]*")]
    Ident,

    #[regex(r"[0-9][0-9_]*")]
    #[regex(r"0[xX][0-9a-fA-F_]+")]
    #[regex(r"0[bB][01_]+")]
    #[regex(r"0[oO][0-7_]+")]
    Int,

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9_]+)?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9_]+")]
    #[regex(r"0[xX][0-9a-fA-F_]*(\.[0-9a-fA-F_]*)?[pP][+-]?[0-9_]+")]
    Float,

    #[regex(r"[0-9][0-9_]*i")]
    #[regex(r"0[xX][0-9a-fA-F_]+i")]
    #[regex(r"0[bB][01_]+i")]
    #[regex(r"0[oO][0-7_]+i")]
    #[regex(r"0[xX][0-9a-fA-F_]*(\.[0-9a-fA-F_]*)?[pP][+-]?[0-9_]+i")]
    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9_]+)?i")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9_]+)?i")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9_]+i")]
    Imaginary,

    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    #[regex(r"`[^`]*`")]
    Str,

    #[regex(r"'([^'\\\n]|\\[^\n])*'")]
    Char,

    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("<<")]
    #[token(">>")]
    #[token("&^")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<<=")]
    #[token(">>=")]
    #[token("&^=")]
    #[token("&&")]
    #[token("||")]
    #[token("<-")]
    #[token("++")]
    #[token("--")]
    #[token("==")]
    #[token("<")]
    #[token(">")]
    #[token("=")]
    #[token("!")]
    #[token("~")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token(":=")]
    #[token("...")]
    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token("{")]
    #[token("}")]
    #[token(",")]
    #[token(";")]
    #[token(".")]
    #[token(":")]
    Operator,
}

/// Lexes one Go file. Lex errors are recorded and scanning continues.
pub fn tokenize(source: &[u8]) -> ToksResult {
    let lines = LineIndex::new(source);
    let mut toks = Vec::new();
    let mut messages = Messages::default();
    let mut offset = 0;

    for chunk in source.utf8_chunks() {
        let valid = chunk.valid();
        lex_chunk(valid, offset, &lines, &mut toks, &mut messages);
        offset += valid.len();

        let invalid = chunk.invalid();
        if !invalid.is_empty() {
            let (line, col) = lines.position(offset);
            messages.push(format!("{}:{}: invalid UTF-8 encoding", line, col));
            offset += invalid.len();
        }
    }

    let complete = messages.is_empty();
    ToksResult {
        toks,
        messages: messages.into_vec(),
        complete,
    }
}

fn lex_chunk(text: &str, base: usize, lines: &LineIndex, toks: &mut Vec<Tok>, messages: &mut Messages) {
    let mut lexer = RawToken::lexer(text);
    while let Some(token) = lexer.next() {
        let span = lexer.span();
        let start_byte = base + span.start;
        match token {
            Ok(raw) => toks.push(Tok {
                start_byte,
                byte_len: span.len(),
                kind: classify(raw, lexer.slice()),
            }),
            Err(()) => {
                let (line, col) = lines.position(start_byte);
                let preview: String = lexer.slice().chars().take(8).collect();
                messages.push(format!("{}:{}: illegal character {:?}", line, col, preview));
            }
        }
    }
}

fn classify(raw: RawToken, text: &str) -> TokType {
    match raw {
        RawToken::LineComment => TokType::CommentSingle,
        RawToken::BlockComment => TokType::CommentMulti,
        RawToken::Keyword => TokType::Keyword,
        RawToken::Ident => classify_ident(text),
        RawToken::Int => classify_int(text),
        RawToken::Float => TokType::NumberFloat,
        RawToken::Imaginary => TokType::NumberImaginary,
        RawToken::Str => TokType::String,
        RawToken::Char => TokType::StringChar,
        RawToken::Operator => TokType::Operator,
    }
}

fn classify_ident(text: &str) -> TokType {
    if text == "_" {
        TokType::LiteralOther
    } else if is_builtin_type(text) || is_builtin_func(text) {
        TokType::NameBuiltin
    } else if is_builtin_const(text) {
        TokType::NameConstant
    } else if text.chars().next().is_some_and(char::is_uppercase) {
        TokType::NameExportedMarker
    } else {
        TokType::Name
    }
}

fn classify_int(text: &str) -> TokType {
    if text.starts_with("0x") || text.starts_with("0X") {
        TokType::NumberHex
    } else if text.starts_with('0') && text.len() > 1 {
        TokType::NumberOctal
    } else {
        TokType::NumberInteger
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(String, TokType)> {
        let result = tokenize(source.as_bytes());
        result
            .toks
            .iter()
            .map(|t| {
                (
                    source[t.start_byte..t.start_byte + t.byte_len].to_string(),
                    t.kind,
                )
            })
            .collect()
    }

    #[test]
    fn test_identifier_classification() {
        let toks = kinds("x Foo len int nil iota _ Println");
        assert_eq!(
            toks,
            vec![
                ("x".into(), TokType::Name),
                ("Foo".into(), TokType::NameExportedMarker),
                ("len".into(), TokType::NameBuiltin),
                ("int".into(), TokType::NameBuiltin),
                ("nil".into(), TokType::NameConstant),
                ("iota".into(), TokType::NameConstant),
                ("_".into(), TokType::LiteralOther),
                ("Println".into(), TokType::NameExportedMarker),
            ]
        );
    }

    #[test]
    fn test_integer_classification() {
        let toks = kinds("0 7 42 0x1F 0X2a 017 0o17");
        let types: Vec<TokType> = toks.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            types,
            vec![
                TokType::NumberInteger,
                TokType::NumberInteger,
                TokType::NumberInteger,
                TokType::NumberHex,
                TokType::NumberHex,
                TokType::NumberOctal,
                TokType::NumberOctal,
            ]
        );
    }

    #[test]
    fn test_float_imaginary_char_string() {
        let toks = kinds(r#"1.5 .25 1e9 2i 'a' '\n' "s\"q" `raw`"#);
        let types: Vec<TokType> = toks.iter().map(|(_, k)| *k).collect();
        assert_eq!(
            types,
            vec![
                TokType::NumberFloat,
                TokType::NumberFloat,
                TokType::NumberFloat,
                TokType::NumberImaginary,
                TokType::StringChar,
                TokType::StringChar,
                TokType::String,
                TokType::String,
            ]
        );
    }

    #[test]
    fn test_prefixed_imaginary_literals() {
        let toks = kinds("0o7i 0b1i 0x1p-2i 0xFi");
        assert_eq!(
            toks,
            vec![
                ("0o7i".into(), TokType::NumberImaginary),
                ("0b1i".into(), TokType::NumberImaginary),
                ("0x1p-2i".into(), TokType::NumberImaginary),
                ("0xFi".into(), TokType::NumberImaginary),
            ]
        );
    }

    #[test]
    fn test_keywords_operators_comments() {
        let toks = kinds("func f() { // hi\n\treturn a &^ b /* c */ }");
        assert_eq!(toks[0], ("func".into(), TokType::Keyword));
        assert_eq!(toks[2], ("(".into(), TokType::Operator));
        assert!(toks.contains(&("// hi".into(), TokType::CommentSingle)));
        assert!(toks.contains(&("&^".into(), TokType::Operator)));
        assert!(toks.contains(&("/* c */".into(), TokType::CommentMulti)));
        assert!(toks.contains(&("return".into(), TokType::Keyword)));
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        let toks = kinds("format iffy");
        assert_eq!(toks[0], ("format".into(), TokType::Name));
        assert_eq!(toks[1], ("iffy".into(), TokType::Name));
    }

    #[test]
    fn test_byte_lengths_match_source() {
        let source = "x := 0x10 + y";
        let result = tokenize(source.as_bytes());
        assert_eq!(result.toks.len(), 5);
        assert_eq!(result.toks[1].byte_len, 2);
        assert_eq!(result.toks[2].byte_len, 4);
        assert!(result.complete);
    }

    #[test]
    fn test_lex_error_continues() {
        let result = tokenize("a # b".as_bytes());
        assert!(!result.complete);
        assert_eq!(result.messages.len(), 1);
        assert!(result.messages[0].starts_with("1:3:"), "{}", result.messages[0]);
        let names: Vec<usize> = result.toks.iter().map(|t| t.start_byte).collect();
        assert_eq!(names, vec![0, 4]);
    }

    #[test]
    fn test_invalid_utf8_recorded() {
        let mut source = b"a ".to_vec();
        source.push(0xff);
        source.extend_from_slice(b" b");
        let result = tokenize(&source);
        assert!(!result.complete);
        assert_eq!(result.toks.len(), 2);
        assert_eq!(result.toks[1].start_byte, 4);
    }

    #[test]
    fn test_unicode_identifier() {
        let toks = kinds("var größe = 1");
        assert_eq!(toks[1], ("größe".into(), TokType::Name));
    }
}
