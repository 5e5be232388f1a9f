use crate::error::ParseError;

// ── Expression AST ────────────────────────────────────────────────────────

/// A parsed `{Name ...}` attribute-value expression.
///
/// Parameter values are kept as raw text: nested `{...}` expressions are
/// returned verbatim (braces included) so the caller can recurse with its own
/// context.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionExpr {
    /// Possibly prefixed extension name (`Binding`, `x:Null`).
    pub name: String,
    pub params: ExtensionParams,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionParams {
    /// `{Ext a, b}`: constructor-style arguments.
    Positional(Vec<String>),
    /// `{Ext A=a, B=b}`: member assignments, in source order.
    Named(Vec<(String, String)>),
}

impl ExtensionParams {
    pub fn is_empty(&self) -> bool {
        match self {
            ExtensionParams::Positional(v) => v.is_empty(),
            ExtensionParams::Named(v) => v.is_empty(),
        }
    }
}

/// Outcome of inspecting an attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Literal(String),
    Extension(ExtensionExpr),
}

/// Classify an attribute value: `{}` escapes a literal, a leading `{` starts
/// an extension expression, everything else is literal text.
pub fn parse_attribute_value(src: &str) -> Result<AttributeValue, ParseError> {
    let trimmed = src.trim();
    if let Some(rest) = trimmed.strip_prefix("{}") {
        return Ok(AttributeValue::Literal(rest.to_string()));
    }
    if trimmed.starts_with('{') {
        return parse_extension(trimmed).map(AttributeValue::Extension);
    }
    Ok(AttributeValue::Literal(trimmed.to_string()))
}

// ── Scanner ───────────────────────────────────────────────────────────────

struct Scanner<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Scanner<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError::new(msg, 1, self.src[..self.pos].chars().count() + 1)
    }

    /// Reads one parameter up to a top-level `,` or the closing `}`.
    /// Returns the text and the position of a top-level `=`, if any.
    fn read_param(&mut self) -> Result<(String, Option<usize>), ParseError> {
        let mut out = String::new();
        let mut equals = None;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated markup extension, expected '}'")),
                Some('}') if depth == 0 => break,
                Some(',') if depth == 0 => break,
                Some('=') if depth == 0 && equals.is_none() => {
                    self.advance();
                    equals = Some(out.len());
                    out.push('=');
                }
                Some('{') => {
                    self.advance();
                    depth += 1;
                    out.push('{');
                }
                Some('}') => {
                    self.advance();
                    depth -= 1;
                    out.push('}');
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated escape sequence")),
                    }
                }
                Some(q @ ('\'' | '"')) if depth == 0 && at_value_start(&out, equals) => {
                    self.advance();
                    loop {
                        match self.advance() {
                            None => return Err(self.error("unterminated quoted value")),
                            Some('\\') => match self.advance() {
                                Some(c) => out.push(c),
                                None => return Err(self.error("unterminated escape sequence")),
                            },
                            Some(c) if c == q => break,
                            Some(c) => out.push(c),
                        }
                    }
                }
                Some(c) => {
                    self.advance();
                    out.push(c);
                }
            }
        }
        Ok((out, equals))
    }
}

fn at_value_start(out: &str, equals: Option<usize>) -> bool {
    match equals {
        Some(at) => out[at + 1..].trim().is_empty(),
        None => out.trim().is_empty(),
    }
}

// ── Entry points ──────────────────────────────────────────────────────────

/// Parse a `{Name params}` expression. The input must start with `{` and end
/// with the matching `}`.
pub fn parse_extension(src: &str) -> Result<ExtensionExpr, ParseError> {
    let mut s = Scanner::new(src);
    s.skip_whitespace();
    if s.advance() != Some('{') {
        return Err(s.error("markup extension must start with '{'"));
    }
    s.skip_whitespace();

    let name_start = s.pos;
    while matches!(s.peek(), Some(c) if c.is_alphanumeric() || matches!(c, '_' | ':' | '.')) {
        s.advance();
    }
    let name = src[name_start..s.pos].to_string();
    if name.is_empty() {
        return Err(s.error("markup extension name expected"));
    }
    if !matches!(s.peek(), Some(c) if c.is_whitespace() || c == '}') {
        return Err(s.error(format!("unexpected character after extension name '{}'", name)));
    }
    s.skip_whitespace();

    let mut positional = Vec::new();
    let mut named = Vec::new();
    while s.peek() != Some('}') {
        let (raw, equals) = s.read_param()?;
        match equals {
            Some(at) => {
                let member = raw[..at].trim();
                if member.is_empty() {
                    return Err(s.error("member name expected before '='"));
                }
                named.push((member.to_string(), raw[at + 1..].trim().to_string()));
            }
            None => positional.push(raw.trim().to_string()),
        }
        if !positional.is_empty() && !named.is_empty() {
            return Err(s.error("positional and named parameters cannot be mixed"));
        }
        if s.peek() == Some(',') {
            s.advance();
            s.skip_whitespace();
            if s.peek() == Some('}') {
                return Err(s.error("parameter expected after ','"));
            }
        }
    }
    s.advance();
    s.skip_whitespace();
    if s.peek().is_some() {
        return Err(s.error("unexpected text after closing '}'"));
    }

    let params = if named.is_empty() {
        ExtensionParams::Positional(positional)
    } else {
        ExtensionParams::Named(named)
    };
    Ok(ExtensionExpr { name, params })
}

/// Split the inside of an index expression (`a, 'b,c', 3`) into its entries.
/// Quoted entries are unquoted; surrounding whitespace is removed.
pub fn split_indices(src: &str) -> Result<Vec<String>, ParseError> {
    let mut s = Scanner::new(src);
    let mut out = Vec::new();
    loop {
        s.skip_whitespace();
        let mut entry = String::new();
        match s.peek() {
            Some(q @ ('\'' | '"')) => {
                s.advance();
                loop {
                    match s.advance() {
                        None => return Err(s.error("unterminated quoted index")),
                        Some(c) if c == q => break,
                        Some(c) => entry.push(c),
                    }
                }
                s.skip_whitespace();
            }
            _ => {
                while !matches!(s.peek(), None | Some(',')) {
                    if let Some(c) = s.advance() {
                        entry.push(c);
                    }
                }
                entry = entry.trim().to_string();
                if entry.is_empty() {
                    return Err(s.error("index value expected"));
                }
            }
        }
        out.push(entry);
        match s.advance() {
            None => break,
            Some(',') => {}
            Some(c) => return Err(s.error(format!("expected ',' between indices, found {:?}", c))),
        }
    }
    Ok(out)
}
