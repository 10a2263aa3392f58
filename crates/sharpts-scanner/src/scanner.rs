//! The scanner implementation.

use num_bigint::BigInt;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::numeric;
use sharpts_common::span::Span;

use crate::token::{Token, TokenKind, keyword_kind};

/// Scans source text into a token vector ending in [`TokenKind::Eof`].
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
    /// Kind of the last significant token, for the regex/division decision.
    last_significant: Option<TokenKind>,
    /// Brace depths of enclosing template substitutions. The top entry is
    /// the number of unmatched `{` inside the current `${ ... }`.
    template_stack: Vec<u32>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Scanner {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
            last_significant: None,
            template_stack: Vec::new(),
        }
    }

    /// Scan the whole input. Fails fast on the first malformed token.
    pub fn scan(mut self) -> Result<Vec<Token>, Diagnostic> {
        loop {
            let saw_newline = self.skip_trivia();
            if self.pos >= self.bytes.len() {
                let mut eof = Token::new(TokenKind::Eof, Span::at(self.pos as u32));
                eof.newline_before = saw_newline;
                self.tokens.push(eof);
                return Ok(self.tokens);
            }
            let start = self.pos;
            let kind = self.scan_token()?;
            let span = Span::new(start as u32, self.pos as u32);
            self.last_significant = Some(kind.clone());
            let mut token = Token::new(kind, span);
            token.newline_before = saw_newline;
            self.tokens.push(token);
        }
    }

    /// Skip whitespace and comments; report whether a line terminator was
    /// crossed.
    fn skip_trivia(&mut self) -> bool {
        let mut saw_newline = false;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'\n' | b'\r' => {
                    saw_newline = true;
                    self.pos += 1;
                }
                b' ' | b'\t' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.pos < self.bytes.len()
                        && self.bytes[self.pos] != b'\n'
                        && self.bytes[self.pos] != b'\r'
                    {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    self.pos += 2;
                    while self.pos + 1 < self.bytes.len()
                        && !(self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/')
                    {
                        if self.bytes[self.pos] == b'\n' {
                            saw_newline = true;
                        }
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.bytes.len());
                }
                _ => break,
            }
        }
        saw_newline
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn error(&self, start: usize, message: impl Into<String>, code: u32) -> Diagnostic {
        Diagnostic::parse_error(Span::new(start as u32, self.pos as u32), message, code)
    }

    fn scan_token(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        let b = self.bytes[self.pos];
        match b {
            b'0'..=b'9' => self.scan_number(),
            b'"' | b'\'' => self.scan_string(b),
            b'`' => self.scan_template_part(true),
            b'}' if self.in_template_substitution() => {
                // End of `${ ... }` - resume template scanning.
                self.template_stack.pop();
                self.scan_template_part(false)
            }
            b'/' => {
                if self.regex_allowed() {
                    self.scan_regex()
                } else if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    Ok(TokenKind::SlashEq)
                } else {
                    self.pos += 1;
                    Ok(TokenKind::Slash)
                }
            }
            _ if is_ident_start(self.current_char()) => Ok(self.scan_identifier()),
            b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.scan_number(),
            _ => self.scan_punctuation().ok_or_else(|| {
                self.error(
                    start,
                    format!("Invalid character `{}`.", self.current_char()),
                    diagnostic_codes::INVALID_CHARACTER,
                )
            }),
        }
    }

    fn current_char(&self) -> char {
        self.source[self.pos..].chars().next().unwrap_or('\0')
    }

    fn in_template_substitution(&self) -> bool {
        self.template_stack.last() == Some(&0)
    }

    fn regex_allowed(&self) -> bool {
        match &self.last_significant {
            Some(kind) => !kind.may_end_expression(),
            None => true,
        }
    }

    // =========================================================================
    // Identifiers and keywords
    // =========================================================================

    fn scan_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        let mut chars = self.source[self.pos..].char_indices();
        let mut end = self.source.len() - self.pos;
        for (i, c) in chars.by_ref() {
            if i == 0 {
                continue;
            }
            if !is_ident_part(c) {
                end = i;
                break;
            }
        }
        self.pos = start + end;
        let word = &self.source[start..self.pos];
        keyword_kind(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
    }

    // =========================================================================
    // Numbers
    // =========================================================================

    fn scan_number(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        let radix_prefix = self.pos + 1 < self.bytes.len()
            && self.bytes[self.pos] == b'0'
            && matches!(
                self.bytes[self.pos + 1],
                b'x' | b'X' | b'b' | b'B' | b'o' | b'O'
            );
        if radix_prefix {
            self.pos += 2;
            while self
                .peek_at(0)
                .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
            {
                self.pos += 1;
            }
        } else {
            while self
                .peek_at(0)
                .is_some_and(|b| b.is_ascii_digit() || b == b'_')
            {
                self.pos += 1;
            }
            if self.peek_at(0) == Some(b'.') {
                self.pos += 1;
                while self
                    .peek_at(0)
                    .is_some_and(|b| b.is_ascii_digit() || b == b'_')
                {
                    self.pos += 1;
                }
            }
            if matches!(self.peek_at(0), Some(b'e' | b'E')) {
                self.pos += 1;
                if matches!(self.peek_at(0), Some(b'+' | b'-')) {
                    self.pos += 1;
                }
                while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let is_bigint = self.peek_at(0) == Some(b'n');
        let text = &self.source[start..self.pos];

        if let Err(off) = numeric::check_separators(text) {
            let at = start + off;
            return Err(Diagnostic::parse_error(
                Span::new(at as u32, at as u32 + 1),
                "Numeric separators are not allowed here.",
                diagnostic_codes::NUMERIC_SEPARATOR_POSITION,
            ));
        }
        // `1_` and `_1` are caught above; a separator as the final scanned
        // byte also fails because nothing alphanumeric follows it.

        if is_bigint {
            self.pos += 1;
            let value: BigInt = numeric::parse_bigint_literal_value(text).ok_or_else(|| {
                self.error(start, "Invalid bigint literal.", diagnostic_codes::UNEXPECTED_TOKEN)
            })?;
            return Ok(TokenKind::BigInt(value));
        }

        let value = numeric::parse_numeric_literal_value(text).ok_or_else(|| {
            self.error(start, "Invalid numeric literal.", diagnostic_codes::UNEXPECTED_TOKEN)
        })?;
        Ok(TokenKind::Number(value))
    }

    // =========================================================================
    // Strings and templates
    // =========================================================================

    fn scan_string(&mut self, quote: u8) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            match self.peek_at(0) {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(self.error(
                        start,
                        "Unterminated string literal.",
                        diagnostic_codes::UNTERMINATED_STRING,
                    ));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    return Ok(TokenKind::Str(value));
                }
                Some(b'\\') => {
                    if let Some(c) = self.scan_escape(start)? {
                        value.push(c);
                    }
                }
                Some(_) => {
                    let c = self.current_char();
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Scan one template part. `from_backtick` is true at the opening
    /// backtick (full or head), false when resuming after a substitution
    /// (middle or tail).
    fn scan_template_part(&mut self, from_backtick: bool) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        self.pos += 1; // consume ` or }
        let mut value = String::new();
        loop {
            match self.peek_at(0) {
                None => {
                    return Err(self.error(
                        start,
                        "Unterminated template literal.",
                        diagnostic_codes::UNTERMINATED_TEMPLATE,
                    ));
                }
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(if from_backtick {
                        TokenKind::TemplateFull(value)
                    } else {
                        TokenKind::TemplateTail(value)
                    });
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.pos += 2;
                    self.template_stack.push(0);
                    return Ok(if from_backtick {
                        TokenKind::TemplateHead(value)
                    } else {
                        TokenKind::TemplateMiddle(value)
                    });
                }
                Some(b'\\') => {
                    if let Some(c) = self.scan_escape(start)? {
                        value.push(c);
                    }
                }
                Some(_) => {
                    let c = self.current_char();
                    value.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    /// Process one escape sequence. Returns `None` for a line
    /// continuation (`\` followed by a newline), which contributes no
    /// character to the literal value.
    fn scan_escape(&mut self, literal_start: usize) -> Result<Option<char>, Diagnostic> {
        self.pos += 1; // backslash
        let b = match self.peek_at(0) {
            None => {
                return Err(self.error(
                    literal_start,
                    "Unterminated string literal.",
                    diagnostic_codes::UNTERMINATED_STRING,
                ));
            }
            Some(b) => b,
        };
        match b {
            b'n' | b't' | b'r' | b'b' | b'f' | b'v' | b'0' => {
                self.pos += 1;
                Ok(Some(match b {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'b' => '\u{8}',
                    b'f' => '\u{c}',
                    b'v' => '\u{b}',
                    _ => '\0',
                }))
            }
            b'x' => {
                self.pos += 1;
                let hex = self.take_hex_digits(2)?;
                Ok(Some(char::from_u32(hex).unwrap_or('\u{fffd}')))
            }
            b'u' => {
                self.pos += 1;
                if self.peek_at(0) == Some(b'{') {
                    self.pos += 1;
                    let mut v: u32 = 0;
                    while let Some(d) = self.peek_at(0).and_then(hex_value) {
                        v = v.saturating_mul(16).saturating_add(d);
                        self.pos += 1;
                    }
                    if self.peek_at(0) == Some(b'}') {
                        self.pos += 1;
                    }
                    Ok(Some(char::from_u32(v).unwrap_or('\u{fffd}')))
                } else {
                    let hex = self.take_hex_digits(4)?;
                    Ok(Some(char::from_u32(hex).unwrap_or('\u{fffd}')))
                }
            }
            b'\n' => {
                self.pos += 1;
                Ok(None)
            }
            b'\r' => {
                self.pos += 1;
                if self.peek_at(0) == Some(b'\n') {
                    self.pos += 1;
                }
                Ok(None)
            }
            _ => {
                // Identity escape: \' \" \` \\ and anything else.
                let c = self.current_char();
                self.pos += c.len_utf8();
                Ok(Some(c))
            }
        }
    }

    fn take_hex_digits(&mut self, count: usize) -> Result<u32, Diagnostic> {
        let mut v: u32 = 0;
        for _ in 0..count {
            let d = self
                .peek_at(0)
                .and_then(hex_value)
                .ok_or_else(|| {
                    self.error(self.pos, "Hexadecimal digit expected.", diagnostic_codes::UNEXPECTED_TOKEN)
                })?;
            v = v * 16 + d;
            self.pos += 1;
        }
        Ok(v)
    }

    // =========================================================================
    // Regular expressions
    // =========================================================================

    fn scan_regex(&mut self) -> Result<TokenKind, Diagnostic> {
        let start = self.pos;
        self.pos += 1; // leading /
        let mut in_class = false;
        loop {
            match self.peek_at(0) {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(self.error(
                        start,
                        "Unterminated regular expression literal.",
                        diagnostic_codes::UNTERMINATED_REGEX,
                    ));
                }
                Some(b'\\') => {
                    self.pos += 2;
                }
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    break;
                }
                Some(_) => {
                    self.pos += self.current_char().len_utf8();
                }
            }
        }
        let pattern = self.source[start + 1..self.pos].to_string();
        self.pos += 1; // trailing /
        let flags_start = self.pos;
        while self.peek_at(0).is_some_and(|b| b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let flags = self.source[flags_start..self.pos].to_string();
        Ok(TokenKind::Regex { pattern, flags })
    }

    // =========================================================================
    // Punctuation and operators (longest match first)
    // =========================================================================

    fn scan_punctuation(&mut self) -> Option<TokenKind> {
        let rest = &self.bytes[self.pos..];
        let table: &[(&[u8], TokenKind)] = &[
            (b">>>=", TokenKind::GtGtGtEq),
            (b"...", TokenKind::DotDotDot),
            (b"===", TokenKind::EqEqEq),
            (b"!==", TokenKind::BangEqEq),
            (b"**=", TokenKind::StarStarEq),
            (b"<<=", TokenKind::LtLtEq),
            (b">>=", TokenKind::GtGtEq),
            (b">>>", TokenKind::GtGtGt),
            (b"&&=", TokenKind::AmpAmpEq),
            (b"||=", TokenKind::PipePipeEq),
            (b"??=", TokenKind::QuestionQuestionEq),
            (b"=>", TokenKind::Arrow),
            (b"==", TokenKind::EqEq),
            (b"!=", TokenKind::BangEq),
            (b"<=", TokenKind::LtEq),
            (b">=", TokenKind::GtEq),
            (b"<<", TokenKind::LtLt),
            (b">>", TokenKind::GtGt),
            (b"&&", TokenKind::AmpAmp),
            (b"||", TokenKind::PipePipe),
            (b"??", TokenKind::QuestionQuestion),
            (b"?.", TokenKind::QuestionDot),
            (b"**", TokenKind::StarStar),
            (b"++", TokenKind::PlusPlus),
            (b"--", TokenKind::MinusMinus),
            (b"+=", TokenKind::PlusEq),
            (b"-=", TokenKind::MinusEq),
            (b"*=", TokenKind::StarEq),
            (b"%=", TokenKind::PercentEq),
            (b"&=", TokenKind::AmpEq),
            (b"|=", TokenKind::PipeEq),
            (b"^=", TokenKind::CaretEq),
            (b"(", TokenKind::LParen),
            (b")", TokenKind::RParen),
            (b"{", TokenKind::LBrace),
            (b"}", TokenKind::RBrace),
            (b"[", TokenKind::LBracket),
            (b"]", TokenKind::RBracket),
            (b";", TokenKind::Semicolon),
            (b",", TokenKind::Comma),
            (b".", TokenKind::Dot),
            (b":", TokenKind::Colon),
            (b"?", TokenKind::Question),
            (b"@", TokenKind::At),
            (b"+", TokenKind::Plus),
            (b"-", TokenKind::Minus),
            (b"*", TokenKind::Star),
            (b"%", TokenKind::Percent),
            (b"=", TokenKind::Eq),
            (b"<", TokenKind::Lt),
            (b">", TokenKind::Gt),
            (b"&", TokenKind::Amp),
            (b"|", TokenKind::Pipe),
            (b"^", TokenKind::Caret),
            (b"~", TokenKind::Tilde),
            (b"!", TokenKind::Bang),
        ];
        for (spelling, kind) in table {
            if rest.starts_with(spelling) {
                // Track brace depth inside template substitutions so `}`
                // resumes the template at the right nesting level.
                if let Some(depth) = self.template_stack.last_mut() {
                    match kind {
                        TokenKind::LBrace => *depth += 1,
                        TokenKind::RBrace => *depth = depth.saturating_sub(1),
                        _ => {}
                    }
                }
                self.pos += spelling.len();
                return Some(kind.clone());
            }
        }
        None
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '_' || c == '$' || c.is_alphanumeric()
}

fn hex_value(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some(u32::from(b - b'0')),
        b'a'..=b'f' => Some(u32::from(b - b'a' + 10)),
        b'A'..=b'F' => Some(u32::from(b - b'A' + 10)),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/scanner_tests.rs"]
mod tests;
