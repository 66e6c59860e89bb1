// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::as_ptr(&self.src) == Rc::as_ptr(&other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2; // Account for rows, cols possibly starting at 1, EOF etc.
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed statement size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => bail!("Failed to read {}. {e}", path.as_ref().display()),
        };
        Self::from_contents(path.as_ref().to_string_lossy().to_string(), contents)
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }
    pub fn contents(&self) -> &String {
        &self.src.contents
    }
    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() || line == 0 {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = (col as usize).saturating_sub(1);

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
		{:<line_num_width$}| {}\n\
		{:<line_num_width$}| {:<col_spaces$}^\n\
		{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    /// Quoted string. The span covers the text between the quotes, escapes not yet decoded.
    String,
    /// Back-quoted identifier. The span excludes the back-quotes.
    QuotedIdent,
    Number,
    /// `x'..'` or `0x..`. The span covers only the hex digits.
    HexString,
    /// `b'..'` or `0b..`. The span covers only the binary digits.
    BitString,
    Ident,
    /// `@name` or `@@name`, span includes the sigils.
    Variable,
    Param,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn span(&self, line: u32, col: u32, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self) -> Result<Token> {
        let start = self.peek().0;
        let col = self.col;
        loop {
            let ch = self.peek().1;
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        self.col += self.source.contents()[start..end].chars().count() as u32;
        Ok(Token(TokenKind::Ident, self.span(self.line, col, start, end)))
    }

    fn read_variable(&mut self) -> Result<Token> {
        let (start, _) = self.peek();
        let col = self.col;
        self.iter.next();
        if self.peek().1 == '@' {
            self.iter.next();
        }
        let name_start = self.peek().0;
        loop {
            let ch = self.peek().1;
            if ch.is_alphanumeric() || matches!(ch, '_' | '$' | '.') {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        if end == name_start {
            return Err(self.source.error(self.line, col, "missing variable name"));
        }
        self.col += (end - start) as u32;
        Ok(Token(TokenKind::Variable, self.span(self.line, col, start, end)))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.iter.next();
        }
    }

    fn read_radix_digits(&mut self, kind: TokenKind) -> Result<Token> {
        // 0x / 0b prefix.
        let col = self.col;
        self.iter.next();
        self.iter.next();
        let start = self.peek().0;
        let hex = kind == TokenKind::HexString;
        loop {
            let ch = self.peek().1;
            if (hex && ch.is_ascii_hexdigit()) || (!hex && matches!(ch, '0' | '1')) {
                self.iter.next();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        self.col += (end - start) as u32 + 2;
        let ch = self.peek().1;
        if ch.is_alphanumeric() || ch == '_' {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }
        Ok(Token(kind, self.span(self.line, col, start, end)))
    }

    fn read_number(&mut self) -> Result<Token> {
        let (start, chr) = self.peek();
        let col = self.col;

        if chr == '0' && matches!(self.peekahead(1).1, 'x' | 'X') {
            return self.read_radix_digits(TokenKind::HexString);
        }
        if chr == '0' && matches!(self.peekahead(1).1, 'b' | 'B') {
            return self.read_radix_digits(TokenKind::BitString);
        }

        // Read integer part.
        self.read_digits();

        // Read fraction part. Unlike json, `1.` and `.5` are valid.
        if self.peek().1 == '.' {
            self.iter.next();
            self.read_digits();
        }

        // Read exponent part
        let ch = self.peek().1;
        if ch == 'e' || ch == 'E' {
            let ahead = self.peekahead(1).1;
            let ahead2 = self.peekahead(2).1;
            if ahead.is_ascii_digit() || (matches!(ahead, '+' | '-') && ahead2.is_ascii_digit())
            {
                self.iter.next();
                if matches!(self.peek().1, '+' | '-') {
                    self.iter.next();
                }
                self.read_digits();
            }
        }

        let end = self.peek().0;
        self.col += (end - start) as u32;

        // A number immediately followed by identifier characters such as
        // `1abc` is an identifier in MySQL. We do not support that.
        let ch = self.peek().1;
        if ch == '_' || ch == '.' || ch.is_alphanumeric() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        Ok(Token(TokenKind::Number, self.span(self.line, col, start, end)))
    }

    fn read_quoted_ident(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.iter.next();
        self.col += 1;
        let (start, _) = self.peek();
        loop {
            let (_, ch) = self.peek();
            match ch {
                '`' if self.peekahead(1).1 == '`' => {
                    // Escaped back-quote.
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                }
                '`' => break,
                '\x00' => {
                    return Err(self.source.error(line, col, "unmatched `"));
                }
                '\n' => {
                    self.iter.next();
                    self.line += 1;
                    self.col = 1;
                }
                _ => {
                    self.iter.next();
                    self.col += 1;
                }
            }
        }
        let end = self.peek().0;
        self.iter.next();
        self.col += 1;
        Ok(Token(
            TokenKind::QuotedIdent,
            self.span(line, col + 1, start, end),
        ))
    }

    /// Read a string delimited by `quote`. Both backslash escapes and doubled
    /// quotes are accepted. The span covers the raw text between the quotes.
    fn read_string(&mut self, kind: TokenKind, quote: char, prefix: usize) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        for _ in 0..prefix + 1 {
            self.iter.next();
            self.col += 1;
        }
        let (start, _) = self.peek();
        loop {
            let (_, ch) = self.peek();
            match ch {
                '\\' => {
                    self.iter.next();
                    if self.peek().1 == '\x00' {
                        break;
                    }
                    self.iter.next();
                    self.col += 2;
                }
                c if c == quote && self.peekahead(1).1 == quote => {
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                }
                c if c == quote => break,
                '\x00' => break,
                '\n' => {
                    self.iter.next();
                    self.line += 1;
                    self.col = 1;
                }
                _ => {
                    self.iter.next();
                    self.col += 1;
                }
            }
        }

        if self.peek().1 != quote {
            return Err(self.source.error(line, col, &format!("unmatched {quote}")));
        }
        let end = self.peek().0;
        self.iter.next();
        self.col += 1;

        let tok = Token(kind, self.span(line, col + 1 + prefix as u32, start, end));
        match tok.0 {
            TokenKind::HexString
                if !tok.1.text().chars().all(|c| c.is_ascii_hexdigit())
                    || tok.1.text().len() % 2 != 0 =>
            {
                Err(tok.1.error("invalid hexadecimal literal"))
            }
            TokenKind::BitString if !tok.1.text().chars().all(|c| c == '0' || c == '1') => {
                Err(tok.1.error("invalid bit literal"))
            }
            _ => Ok(tok),
        }
    }

    fn skip_ws(&mut self) -> Result<()> {
        // A tab is considered 4 space characters.
        'outer: loop {
            match self.peek().1 {
                ' ' | '\r' => self.col += 1,
                '\t' => self.col += 4,
                '\n' => {
                    self.col = 1;
                    self.line += 1;
                }
                '-' if self.peekahead(1).1 == '-'
                    && matches!(self.peekahead(2).1, ' ' | '\t' | '\n' | '\r' | '\x00') =>
                {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '#' => {
                    self.skip_line_comment();
                    continue 'outer;
                }
                '/' if self.peekahead(1).1 == '*' => {
                    let (line, col) = (self.line, self.col);
                    self.iter.next();
                    self.iter.next();
                    self.col += 2;
                    loop {
                        match self.peek().1 {
                            '*' if self.peekahead(1).1 == '/' => {
                                self.iter.next();
                                self.col += 2;
                                break;
                            }
                            '\n' => {
                                self.line += 1;
                                self.col = 1;
                            }
                            '\x00' => {
                                return Err(self.source.error(line, col, "unterminated comment"))
                            }
                            _ => self.col += 1,
                        }
                        self.iter.next();
                    }
                }
                _ => break,
            }
            self.iter.next();
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        loop {
            match self.peek().1 {
                '\n' | '\x00' => return,
                _ => {
                    self.iter.next();
                }
            }
        }
    }

    fn symbol(&mut self, len: usize) -> Result<Token> {
        let (start, _) = self.peek();
        let col = self.col;
        for _ in 0..len {
            self.iter.next();
        }
        self.col += len as u32;
        Ok(Token(
            TokenKind::Symbol,
            self.span(self.line, col, start, start + len),
        ))
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let col = self.col;
        let next = self.peekahead(1).1;

        match chr {
	    '.' if next.is_ascii_digit() => self.read_number(),
	    // three character operators
	    '<' if next == '=' && self.peekahead(2).1 == '>' => self.symbol(3),
	    // two character operators
	    '<' if matches!(next, '=' | '>' | '<') => self.symbol(2),
	    '>' if matches!(next, '=' | '>') => self.symbol(2),
	    '!' if next == '=' => self.symbol(2),
	    ':' if next == '=' => self.symbol(2),
	    '|' if next == '|' => self.symbol(2),
	    '&' if next == '&' => self.symbol(2),
	    // grouping characters
	    '(' | ')' |
	    // arith operator
	    '+' | '-' | '*' | '/' | '%' |
	    // bit operator
	    '&' | '|' | '^' | '~' |
	    // comparison
	    '<' | '>' | '=' | '!' |
	    // separators
	    ',' | ';' | '.' => self.symbol(1),
	    '?' => {
		self.col += 1;
		self.iter.next();
		Ok(Token(TokenKind::Param, self.span(self.line, col, start, start + 1)))
	    }
	    '@' => self.read_variable(),
	    '\'' | '"' => self.read_string(TokenKind::String, chr, 0),
	    '`' => self.read_quoted_ident(),
	    'x' | 'X' if next == '\'' => self.read_string(TokenKind::HexString, '\'', 1),
	    'b' | 'B' if next == '\'' => self.read_string(TokenKind::BitString, '\'', 1),
	    '\x00' => Ok(Token(TokenKind::Eof, self.span(self.line, col, start, start))),
	    _ if chr.is_ascii_digit() => self.read_number(),
	    _ if chr.is_alphabetic() || chr == '_' || chr == '$' => self.read_ident(),
	    _ => Err(self.source.error(self.line, self.col, "invalid character"))
	}
    }
}

/// Decode the escapes of a quoted string token.
pub fn unescape_string(raw: &str, quote: char) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('b') => out.push('\x08'),
                Some('Z') => out.push('\x1a'),
                // `\%` and `\_` keep the backslash so that LIKE patterns survive.
                Some(c @ ('%' | '_')) => {
                    out.push('\\');
                    out.push(c);
                }
                Some(c) => out.push(c),
                None => out.push('\\'),
            },
            c if c == quote && chars.peek() == Some(&quote) => {
                chars.next();
                out.push(quote);
            }
            c => out.push(c),
        }
    }
    out
}

/// Split a script into statements on `;` that appear outside of quotes and
/// comments. Pieces are trimmed and empty ones dropped.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut stmts = vec![];
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == '\\' && q != '`' {
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            } else if ch == q {
                if chars.peek() == Some(&q) {
                    current.push(q);
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match ch {
            '\'' | '"' | '`' => {
                quote = Some(ch);
                current.push(ch);
            }
            '-' if chars.peek() == Some(&'-') => {
                // Only `-- ` starts a comment.
                let mut ahead = chars.clone();
                ahead.next();
                if matches!(ahead.peek(), None | Some(' ' | '\t' | '\n' | '\r')) {
                    skip_to_eol(&mut chars, &mut current);
                } else {
                    current.push(ch);
                }
            }
            '#' => skip_to_eol(&mut chars, &mut current),
            '/' if chars.peek() == Some(&'*') => {
                current.push(ch);
                let mut prev = ' ';
                for c in chars.by_ref() {
                    current.push(c);
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            ';' => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    stmts.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    let stmt = current.trim();
    if !stmt.is_empty() {
        stmts.push(stmt.to_string());
    }
    stmts
}

fn skip_to_eol(chars: &mut Peekable<core::str::Chars<'_>>, current: &mut String) {
    for c in chars.by_ref() {
        if c == '\n' {
            current.push('\n');
            break;
        }
    }
}
