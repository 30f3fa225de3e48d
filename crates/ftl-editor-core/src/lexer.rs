//! Per-partition tokenizer.
//!
//! [`tokenize`] turns the text of one partition into typed [`Token`]s. It never looks outside
//! the partition, so it can restart at any partition boundary. The delimiters and the
//! directive/macro name are split off by hand; the expression body in between is lexed with a
//! `logos` lexer shared by tags and interpolations. Text and comment partitions are single
//! tokens. Input the expression lexer does not recognize becomes [`TokenKind::Error`].

use crate::partition::PartitionType;
use ftl_lang::{is_expression_keyword, is_name_char};
use logos::Logos;
use std::ops::Range;

/// Token categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `<#`, `</#`, `<@`, `</@`, `>` and `/>`.
    TagDelimiter,
    /// Name after `<#` or `</#`.
    DirectiveName,
    /// Name after `<@` or `</@`.
    MacroName,
    /// `as`, `in`, `using`, `true`, `gt`, ...
    Keyword,
    /// Any other identifier.
    Identifier,
    /// `==`, `&&`, `??`, `..`, `=`, ...
    Operator,
    /// Quoted or raw string literal.
    String,
    /// Number literal.
    Number,
    /// `?name` built-in call.
    Builtin,
    /// Brackets, commas, dots, colons.
    Punctuation,
    /// `${`, `#{` and the closing `}`.
    InterpolationDelimiter,
    /// Whole comment partition.
    Comment,
    /// Literal template text.
    Text,
    /// White-space inside a tag or interpolation.
    Whitespace,
    /// Unrecognized input.
    Error,
}

impl TokenKind {
    /// Every token kind, in declaration order.
    pub const ALL: [TokenKind; 15] = [
        TokenKind::TagDelimiter,
        TokenKind::DirectiveName,
        TokenKind::MacroName,
        TokenKind::Keyword,
        TokenKind::Identifier,
        TokenKind::Operator,
        TokenKind::String,
        TokenKind::Number,
        TokenKind::Builtin,
        TokenKind::Punctuation,
        TokenKind::InterpolationDelimiter,
        TokenKind::Comment,
        TokenKind::Text,
        TokenKind::Whitespace,
        TokenKind::Error,
    ];

    /// Dense index of this kind.
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One token of a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Document char range.
    pub range: Range<usize>,
    /// Category.
    pub kind: TokenKind,
    /// Type of the partition the token came from.
    pub partition_type: PartitionType,
    /// Start offset of that partition.
    pub partition_start: usize,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,

    #[regex(r"[\p{L}_$@][\p{L}\p{N}_$@]*")]
    Identifier,

    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    #[regex(r#"r"[^"]*""#)]
    #[regex(r"r'[^']*'")]
    String,

    #[regex(r"\?[a-zA-Z_][a-zA-Z0-9_]*")]
    Builtin,

    #[token("??")]
    #[token("?")]
    #[token("!")]
    #[token("==")]
    #[token("!=")]
    #[token("=")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("++")]
    #[token("--")]
    #[token("<")]
    #[token("<=")]
    #[token(">")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("..")]
    #[token("..<")]
    #[token("..!")]
    #[token("..*")]
    #[token("->")]
    Operator,

    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token("{")]
    #[token("}")]
    #[token(",")]
    #[token(".")]
    #[token(":")]
    #[token(";")]
    Punctuation,
}

impl RawToken {
    fn kind(self, slice: &str) -> TokenKind {
        match self {
            RawToken::Whitespace => TokenKind::Whitespace,
            RawToken::Identifier if is_expression_keyword(slice) => TokenKind::Keyword,
            RawToken::Identifier => TokenKind::Identifier,
            RawToken::Number => TokenKind::Number,
            RawToken::String => TokenKind::String,
            RawToken::Builtin => TokenKind::Builtin,
            RawToken::Operator => TokenKind::Operator,
            RawToken::Punctuation => TokenKind::Punctuation,
        }
    }
}

/// Byte layout of a partition: hand-split head tokens, the expression body, and the closer.
struct Layout {
    head: Vec<(Range<usize>, TokenKind)>,
    body: Range<usize>,
    tail: Option<(Range<usize>, TokenKind)>,
}

impl Layout {
    fn of(text: &str, partition_type: PartitionType) -> Self {
        let whole = 0..text.len();
        match partition_type {
            PartitionType::Text | PartitionType::Comment => {
                let kind = if partition_type == PartitionType::Text {
                    TokenKind::Text
                } else {
                    TokenKind::Comment
                };
                let head = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![(whole, kind)]
                };
                Self {
                    head,
                    body: text.len()..text.len(),
                    tail: None,
                }
            }
            PartitionType::DollarInterpolation | PartitionType::HashInterpolation => {
                let opener = partition_type.opener();
                if !text.starts_with(opener) {
                    return Self::body_only(text);
                }
                let head = vec![(0..opener.len(), TokenKind::InterpolationDelimiter)];
                let body_start = opener.len();
                let mut body_end = text.len();
                let mut tail = None;
                if text.len() > body_start && text.ends_with('}') {
                    body_end -= 1;
                    tail = Some((body_end..text.len(), TokenKind::InterpolationDelimiter));
                }
                Self {
                    head,
                    body: body_start..body_end,
                    tail,
                }
            }
            _ => {
                let opener = partition_type.opener();
                if !text.starts_with(opener) {
                    return Self::body_only(text);
                }
                let name_kind = match partition_type {
                    PartitionType::MacroInstanceStart | PartitionType::MacroInstanceEnd => {
                        TokenKind::MacroName
                    }
                    _ => TokenKind::DirectiveName,
                };
                let mut head = vec![(0..opener.len(), TokenKind::TagDelimiter)];
                let name_len = text[opener.len()..]
                    .chars()
                    .take_while(|&c| is_name_char(c))
                    .map(char::len_utf8)
                    .sum::<usize>();
                let name_end = opener.len() + name_len;
                if name_len > 0 {
                    head.push((opener.len()..name_end, name_kind));
                }

                let closer_len = if text.ends_with("/>") {
                    2
                } else if text.ends_with('>') {
                    1
                } else {
                    0
                };
                let tail_start = text.len() - closer_len;
                if closer_len == 0 || tail_start < name_end {
                    return Self {
                        head,
                        body: name_end..text.len(),
                        tail: None,
                    };
                }
                Self {
                    head,
                    body: name_end..tail_start,
                    tail: Some((tail_start..text.len(), TokenKind::TagDelimiter)),
                }
            }
        }
    }

    fn body_only(text: &str) -> Self {
        Self {
            head: Vec::new(),
            body: 0..text.len(),
            tail: None,
        }
    }
}

/// Lazy token stream over one partition; see [`tokenize`].
pub struct Tokens<'a> {
    text: &'a str,
    head: std::vec::IntoIter<(Range<usize>, TokenKind)>,
    body: Option<logos::Lexer<'a, RawToken>>,
    body_offset: usize,
    tail: Option<(Range<usize>, TokenKind)>,
    byte_pos: usize,
    char_pos: usize,
    partition_type: PartitionType,
    partition_start: usize,
}

impl<'a> Tokens<'a> {
    fn emit(&mut self, bytes: Range<usize>, kind: TokenKind) -> Token {
        if bytes.start > self.byte_pos {
            self.char_pos += self.text[self.byte_pos..bytes.start].chars().count();
        }
        let start = self.char_pos;
        self.char_pos += self.text[bytes.clone()].chars().count();
        self.byte_pos = bytes.end;
        Token {
            range: start..self.char_pos,
            kind,
            partition_type: self.partition_type,
            partition_start: self.partition_start,
        }
    }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some((bytes, kind)) = self.head.next() {
            return Some(self.emit(bytes, kind));
        }
        while let Some(lexer) = self.body.as_mut() {
            let Some(raw) = lexer.next() else {
                self.body = None;
                break;
            };
            let span = lexer.span();
            let kind = match raw {
                Ok(raw) => raw.kind(lexer.slice()),
                Err(()) => TokenKind::Error,
            };
            // Error spans may end inside a multi-byte char; widen to the char boundary.
            let start = (span.start + self.body_offset).max(self.byte_pos);
            let mut end = span.end + self.body_offset;
            while end < self.text.len() && !self.text.is_char_boundary(end) {
                end += 1;
            }
            if start < end {
                return Some(self.emit(start..end, kind));
            }
        }
        let (bytes, kind) = self.tail.take()?;
        Some(self.emit(bytes, kind))
    }
}

/// Tokenize the text of one partition.
///
/// `base_offset` is the document offset of the partition's first char; token ranges are
/// document char offsets. Whether the partition is terminated is read off its last char, so a
/// truncated tag simply has no closing delimiter token.
pub fn tokenize(text: &str, partition_type: PartitionType, base_offset: usize) -> Tokens<'_> {
    let layout = Layout::of(text, partition_type);
    let body = (!layout.body.is_empty()).then(|| RawToken::lexer(&text[layout.body.clone()]));
    Tokens {
        text,
        head: layout.head.into_iter(),
        body,
        body_offset: layout.body.start,
        tail: layout.tail,
        byte_pos: 0,
        char_pos: base_offset,
        partition_type,
        partition_start: base_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(text: &str, ty: PartitionType) -> Vec<(TokenKind, String)> {
        let chars: Vec<char> = text.chars().collect();
        tokenize(text, ty, 0)
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, chars[t.range].iter().collect()))
            .collect()
    }

    fn tok(kind: TokenKind, s: &str) -> (TokenKind, String) {
        (kind, s.to_string())
    }

    #[test]
    fn test_directive_tag() {
        use TokenKind::*;
        assert_eq!(
            lex("<#list users as user>", PartitionType::DirectiveStart),
            vec![
                tok(TagDelimiter, "<#"),
                tok(DirectiveName, "list"),
                tok(Identifier, "users"),
                tok(Keyword, "as"),
                tok(Identifier, "user"),
                tok(TagDelimiter, ">"),
            ]
        );
    }

    #[test]
    fn test_interpolation_expression() {
        use TokenKind::*;
        assert_eq!(
            lex("${user.name?upper_case!'x' == \"A\"}", PartitionType::DollarInterpolation),
            vec![
                tok(InterpolationDelimiter, "${"),
                tok(Identifier, "user"),
                tok(Punctuation, "."),
                tok(Identifier, "name"),
                tok(Builtin, "?upper_case"),
                tok(Operator, "!"),
                tok(String, "'x'"),
                tok(Operator, "=="),
                tok(String, "\"A\""),
                tok(InterpolationDelimiter, "}"),
            ]
        );
    }

    #[test]
    fn test_macro_call_self_closing() {
        use TokenKind::*;
        assert_eq!(
            lex("<@page title=r\"t\" size=12.5/>", PartitionType::MacroInstanceStart),
            vec![
                tok(TagDelimiter, "<@"),
                tok(MacroName, "page"),
                tok(Identifier, "title"),
                tok(Operator, "="),
                tok(String, "r\"t\""),
                tok(Identifier, "size"),
                tok(Operator, "="),
                tok(Number, "12.5"),
                tok(TagDelimiter, "/>"),
            ]
        );
    }

    #[test]
    fn test_unknown_chars_become_error_tokens() {
        let tokens: Vec<_> = tokenize("${a ~ b}", PartitionType::DollarInterpolation, 0).collect();
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Error && t.range == (4..5)));
        assert_eq!(tokens.last().map(|t| t.kind), Some(TokenKind::InterpolationDelimiter));
    }

    #[test]
    fn test_unterminated_tag_has_no_closer() {
        use TokenKind::*;
        assert_eq!(
            lex("<#if x", PartitionType::DirectiveStart),
            vec![tok(TagDelimiter, "<#"), tok(DirectiveName, "if"), tok(Identifier, "x")]
        );
        assert_eq!(lex("<#", PartitionType::DirectiveStart), vec![tok(TagDelimiter, "<#")]);
    }

    #[test]
    fn test_text_and_comment_are_single_tokens() {
        assert_eq!(
            lex("<#-- note -->", PartitionType::Comment),
            vec![tok(TokenKind::Comment, "<#-- note -->")]
        );
        assert!(tokenize("", PartitionType::Text, 0).next().is_none());
    }

    #[test]
    fn test_ranges_are_document_char_offsets() {
        let tokens: Vec<_> =
            tokenize("${é + ü}", PartitionType::DollarInterpolation, 10).collect();
        let ranges: Vec<_> = tokens.iter().map(|t| t.range.clone()).collect();
        assert_eq!(
            ranges,
            vec![10..12, 12..13, 13..14, 14..15, 15..16, 16..17, 17..18]
        );
        assert!(tokens.iter().all(|t| t.partition_start == 10));
    }

    #[test]
    fn test_tokens_cover_the_partition() {
        let text = "<#assign x = [1, 2]?size >= 2 && y?? />";
        let tokens: Vec<_> = tokenize(text, PartitionType::DirectiveStart, 0).collect();
        let mut expected_start = 0;
        for token in &tokens {
            assert_eq!(token.range.start, expected_start);
            expected_start = token.range.end;
        }
        assert_eq!(expected_start, text.chars().count());
    }
}
