//! Compiled property paths: `Name`, `Items[1].Title`, `(Grid.Row)`,
//! `Lookup['a', 2]`, `!IsEnabled`.
//!
//! A path is compiled once against a namespace context (attached-property
//! providers are resolved at that point) and can then be evaluated any
//! number of times against any starting descriptor.

use std::fmt;

use log::warn;

use crate::convert::TypeConverter;
use crate::descriptor::{DataDescriptor, IndexerDescriptor, RepeaterDescriptor};
use crate::error::{Error, Result};
use crate::namespace::{NamespaceContext, NamespaceHandlerRef};
use crate::object::ObjectRef;
use crate::reflection;
use crate::value::{Value, ValueType};

// ── PathSegment ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum PathSegment {
    /// `Name` or `Name[i, j]`.
    Member { name: String, indices: Option<Vec<Value>> },
    /// `[i, j]` on the current value.
    Indexer { indices: Vec<Value> },
    /// `(Provider.Property)`; the provider's handler is captured at compile time.
    AttachedProperty {
        provider: String,
        local_provider: String,
        property: String,
        namespace_uri: String,
        handler: NamespaceHandlerRef,
    },
    /// Leading `!`: boolean negation of the final result.
    Negate,
}

impl PathSegment {
    /// `Ok(None)` when the segment does not apply to `source`.
    pub fn evaluate(&self, source: &DataDescriptor, conv: &TypeConverter) -> Result<Option<DataDescriptor>> {
        match self {
            PathSegment::Member { name, indices } => {
                let value = source.value()?;
                let Value::Object(obj) = &value else {
                    return Ok(None);
                };
                let Some(dd) = reflection::find_member_descriptor(obj, name)? else {
                    return Ok(None);
                };
                let Some(indices) = indices else {
                    return Ok(Some(dd));
                };
                if let DataDescriptor::SimpleProperty(property) = &dd {
                    let params = property.member().index_params();
                    if !params.is_empty() {
                        if let Some(converted) = reflection::consume_parameters(indices, params, false, conv)? {
                            return Ok(Some(DataDescriptor::SimpleProperty(property.with_indices(converted))));
                        }
                    }
                }
                index_into(&dd, indices, conv)
            }
            PathSegment::Indexer { indices } => index_into(source, indices, conv),
            PathSegment::AttachedProperty { local_provider, property, namespace_uri, handler, .. } => {
                let value = source.value()?;
                match handler.get_attached_property(local_provider, property, &value, namespace_uri) {
                    Ok(dd) => Ok(Some(dd)),
                    Err(e) => {
                        warn!("cannot evaluate attached property '{}' on {}: {}", self, value.describe(), e);
                        Ok(None)
                    }
                }
            }
            PathSegment::Negate => Ok(Some(DataDescriptor::Repeater(RepeaterDescriptor::with_source(
                source.clone(),
                true,
                conv.clone(),
            )))),
        }
    }
}

/// Apply `indices` to the value behind `source`: its indexer when the
/// indices fit, otherwise a single integer position in an enumerable.
fn index_into(source: &DataDescriptor, indices: &[Value], conv: &TypeConverter) -> Result<Option<DataDescriptor>> {
    let value = source.value()?;
    if value.is_null() {
        return Ok(None);
    }
    if let Some(params) = IndexerDescriptor::indexer_params(&value) {
        if let Some(converted) = reflection::consume_parameters(indices, &params, false, conv)? {
            return IndexerDescriptor::new(&value, converted).map(|d| Some(DataDescriptor::Indexer(d)));
        }
    }
    if indices.len() == 1 {
        if let Some(Value::Int(index)) = conv.convert(&indices[0], &ValueType::Int) {
            return match reflection::get_enumeration_entry_by_index(&value, index)? {
                Some(dd) => Ok(Some(dd)),
                None => Err(Error::NotSupported(format!(
                    "index [{}] cannot be applied on {}",
                    index,
                    value.describe()
                ))),
            };
        }
    }
    Ok(None)
}

impl PartialEq for PathSegment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PathSegment::Member { name: a, indices: ai }, PathSegment::Member { name: b, indices: bi }) => {
                a == b && ai == bi
            }
            (PathSegment::Indexer { indices: a }, PathSegment::Indexer { indices: b }) => a == b,
            (
                PathSegment::AttachedProperty { local_provider: a, property: ap, namespace_uri: au, .. },
                PathSegment::AttachedProperty { local_provider: b, property: bp, namespace_uri: bu, .. },
            ) => a == b && ap == bp && au == bu,
            (PathSegment::Negate, PathSegment::Negate) => true,
            _ => false,
        }
    }
}

fn write_indices(f: &mut fmt::Formatter<'_>, indices: &[Value]) -> fmt::Result {
    write!(f, "[")?;
    for (i, index) in indices.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        let text = index.to_string();
        if text.contains([',', ']', '\'']) || text.trim() != text {
            write!(f, "\"{}\"", text)?;
        } else {
            write!(f, "{}", text)?;
        }
    }
    write!(f, "]")
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Member { name, indices } => {
                write!(f, "{}", name)?;
                match indices {
                    Some(indices) => write_indices(f, indices),
                    None => Ok(()),
                }
            }
            PathSegment::Indexer { indices } => write_indices(f, indices),
            PathSegment::AttachedProperty { provider, property, .. } => write!(f, "({}.{})", provider, property),
            PathSegment::Negate => write!(f, "!"),
        }
    }
}

impl fmt::Debug for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::AttachedProperty { provider, property, namespace_uri, .. } => {
                write!(f, "AttachedProperty({}.{} in '{}')", provider, property, namespace_uri)
            }
            other => write!(f, "{}", other),
        }
    }
}

// ── PathExpression ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PathExpression {
    segments: Vec<PathSegment>,
    converter: TypeConverter,
}

impl PathExpression {
    pub fn compile<C: NamespaceContext + ?Sized>(ctx: &C, path: &str) -> Result<Self> {
        let mut compiler = Compiler { ctx, path, chars: path.trim().chars().collect(), pos: 0 };
        let segments = compiler.run()?;
        Ok(Self { segments, converter: ctx.converter() })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_negated(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Negate))
    }

    /// Walk the segments from `start`. `Ok(None)` when a step does not apply
    /// or an intermediate value is null; failures inside a step are errors
    /// naming the whole path.
    pub fn evaluate(&self, start: &DataDescriptor) -> Result<Option<DataDescriptor>> {
        self.trace(start).map(|(_, result)| result)
    }

    /// [`evaluate`](Self::evaluate), also returning the descriptors the walk
    /// passed through before the result, `start` first. When the walk stops
    /// early they end with the descriptor it stopped at.
    pub fn trace(&self, start: &DataDescriptor) -> Result<(Vec<DataDescriptor>, Option<DataDescriptor>)> {
        let mut steps = Vec::with_capacity(self.segments.len());
        let mut current = start.clone();
        for segment in &self.segments {
            let is_null = current.value().map_err(|e| self.wrap(e))?.is_null();
            let next = match is_null {
                true => None,
                false => segment.evaluate(&current, &self.converter).map_err(|e| self.wrap(e))?,
            };
            steps.push(current);
            match next {
                Some(next) => current = next,
                None => return Ok((steps, None)),
            }
        }
        Ok((steps, Some(current)))
    }

    /// Evaluate all but the last segment, then resolve the last one as a
    /// method of the reached object.
    pub fn get_method(&self, start: &DataDescriptor) -> Result<Option<BoundMethod>> {
        let Some((last, init)) = self.segments.split_last() else {
            return Ok(None);
        };
        let mut current = start.clone();
        for segment in init {
            match segment.evaluate(&current, &self.converter).map_err(|e| self.wrap(e))? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        let PathSegment::Member { name, indices: None } = last else {
            return Ok(None);
        };
        let Value::Object(target) = current.value().map_err(|e| self.wrap(e))? else {
            return Ok(None);
        };
        if target.class().methods(name).is_empty() {
            return Ok(None);
        }
        Ok(Some(BoundMethod { target, name: name.clone(), converter: self.converter.clone() }))
    }

    fn wrap(&self, source: Error) -> Error {
        Error::Evaluation { path: self.to_string(), source: Box::new(source) }
    }
}

impl fmt::Display for PathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negated() {
            write!(f, "!")?;
        }
        let mut first = true;
        for segment in self.segments.iter().filter(|s| **s != PathSegment::Negate) {
            if !first {
                write!(f, ".")?;
            }
            first = false;
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// A method resolved by [`PathExpression::get_method`], bound to its target.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    target: ObjectRef,
    name: String,
    converter: TypeConverter,
}

impl BoundMethod {
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the overload that best matches `args`.
    pub fn invoke(&self, args: &[Value]) -> Result<Value> {
        let class = self.target.class();
        let (method, converted) = reflection::find_best_member(&self.name, class.methods(&self.name), args, &self.converter)?
            .ok_or_else(|| Error::MemberNotFound {
                member: format!("{}/{}", self.name, args.len()),
                target: class.name().to_string(),
            })?;
        let mut obj = self.target.borrow_mut();
        method
            .call(&mut *obj, &converted)
            .map_err(|e| Error::access("invoke", self.name.as_str(), class.name(), e))
    }
}

// ── Compiler ──────────────────────────────────────────────────────────────

struct Compiler<'a, C: ?Sized> {
    ctx: &'a C,
    path: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<C: NamespaceContext + ?Sized> Compiler<'_, C> {
    fn error(&self, position: usize, message: impl Into<String>) -> Error {
        Error::Path { path: self.path.trim().to_string(), position, message: message.into() }
    }

    fn run(&mut self) -> Result<Vec<PathSegment>> {
        let negate = self.chars.first() == Some(&'!');
        if negate {
            self.pos = 1;
        }
        let mut segments = Vec::new();
        loop {
            self.skip_spaces();
            if self.pos >= self.chars.len() {
                return Err(self.error(self.pos, "path segment expected"));
            }
            segments.push(self.segment()?);
            self.skip_spaces();
            match self.chars.get(self.pos) {
                None => break,
                Some('.') => self.pos += 1,
                Some(_) => return Err(self.error(self.pos, "'.' expected")),
            }
        }
        if negate {
            segments.push(PathSegment::Negate);
        }
        Ok(segments)
    }

    fn skip_spaces(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn find(&self, from: usize, wanted: char) -> Option<usize> {
        self.chars[from..].iter().position(|c| *c == wanted).map(|i| i + from)
    }

    fn text(&self, from: usize, to: usize) -> String {
        self.chars[from..to].iter().collect::<String>().trim().to_string()
    }

    fn identifier(&self, start: usize, text: String, what: &str) -> Result<String> {
        if text.is_empty() {
            return Err(self.error(start, format!("{} expected", what)));
        }
        if !text.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.error(start, format!("invalid {} '{}'", what, text)));
        }
        Ok(text)
    }

    fn segment(&mut self) -> Result<PathSegment> {
        let start = self.pos;
        match self.chars[start] {
            '[' => Ok(PathSegment::Indexer { indices: self.indices()? }),
            '(' => self.attached(),
            _ => {
                let end = (start..self.chars.len())
                    .find(|&i| matches!(self.chars[i], '.' | '['))
                    .unwrap_or(self.chars.len());
                let name = self.identifier(start, self.text(start, end), "member name")?;
                self.pos = end;
                let indices = if self.chars.get(end) == Some(&'[') { Some(self.indices()?) } else { None };
                Ok(PathSegment::Member { name, indices })
            }
        }
    }

    fn indices(&mut self) -> Result<Vec<Value>> {
        let open = self.pos;
        let close = self.find(open, ']').ok_or_else(|| self.error(open, "unterminated indexer"))?;
        let inner = self.text(open + 1, close);
        let entries = lumen_markup::split_indices(&inner).map_err(|e| self.error(open, e.message))?;
        if entries.is_empty() {
            return Err(self.error(open, "empty indexer"));
        }
        self.pos = close + 1;
        Ok(entries.into_iter().map(Value::Str).collect())
    }

    fn attached(&mut self) -> Result<PathSegment> {
        let open = self.pos;
        let close = self.find(open, ')').ok_or_else(|| self.error(open, "')' expected"))?;
        let dot = self
            .find(open, '.')
            .filter(|d| *d < close)
            .ok_or_else(|| self.error(open, "attached property expected"))?;
        let provider = self.text(open + 1, dot);
        if provider.is_empty() {
            return Err(self.error(open + 1, "property provider expected"));
        }
        let property = self.identifier(dot + 1, self.text(dot + 1, close), "property name")?;
        let (local_provider, namespace_uri) =
            self.ctx.lookup_namespace(&provider).map_err(|e| self.error(open + 1, e.to_string()))?;
        let handler = self
            .ctx
            .namespace_handler(&namespace_uri)
            .map_err(|e| self.error(open + 1, e.to_string()))?;
        self.pos = close + 1;
        Ok(PathSegment::AttachedProperty { provider, local_provider, property, namespace_uri, handler })
    }
}
