//! Namespace handling: prefix → URI resolution and the handlers that turn
//! `(local name, URI)` pairs into types, instances and attached properties.

pub mod clr;
pub mod registry;
pub mod xaml;

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::convert::TypeConverter;
use crate::descriptor::DataDescriptor;
use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

pub use clr::DefaultNamespaceHandler;
pub use registry::{TypeEntry, TypeRegistry};
pub use xaml::XamlNamespaceHandler;

/// URI of the implicit markup namespace (`x:Name`, `x:Key`, `x:Null`, ...).
pub const XAML_NS_URI: &str = "http://schemas.microsoft.com/winfx/2006/xaml";

/// URI scheme of code-namespace imports: `clr-namespace:Name[;assembly=Asm]`.
pub const CLR_NAMESPACE_PREFIX: &str = "clr-namespace:";

/// Resolves element and attached-property names of one or more namespace URIs.
pub trait NamespaceHandler {
    fn resolve_type(&self, type_name: &str, namespace_uri: &str) -> Result<ValueType>;

    /// Create an instance of `type_name` with constructor `params`.
    fn instantiate_element(&self, type_name: &str, namespace_uri: &str, params: &[Value]) -> Result<Value>;

    /// Whether `provider` declares the attached property `property` usable on
    /// `target`.
    fn has_attached_property(
        &self,
        provider: &str,
        property: &str,
        target: &Value,
        namespace_uri: &str,
    ) -> Result<bool>;

    fn get_attached_property(
        &self,
        provider: &str,
        property: &str,
        target: &Value,
        namespace_uri: &str,
    ) -> Result<DataDescriptor>;
}

pub type NamespaceHandlerRef = Rc<dyn NamespaceHandler>;

/// What path compilation and markup extensions need from their surroundings.
pub trait NamespaceContext {
    /// Split `prefix:Local` and resolve the prefix to its URI.
    fn lookup_namespace(&self, qualified: &str) -> Result<(String, String)>;

    fn namespace_handler(&self, namespace_uri: &str) -> Result<NamespaceHandlerRef>;

    fn converter(&self) -> TypeConverter;
}

/// `("p", "Local")` for `p:Local`, `("", "Local")` for `Local`.
pub fn split_prefix(qualified: &str) -> (&str, &str) {
    qualified.split_once(':').unwrap_or(("", qualified))
}

// ── NamespaceScope ────────────────────────────────────────────────────────

/// Prefix declarations and handler registrations made at one level.
#[derive(Clone, Default)]
pub struct NamespaceScope {
    prefixes: IndexMap<String, String>,
    handlers: IndexMap<String, NamespaceHandlerRef>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> &mut Self {
        self.prefixes.insert(prefix.into(), uri.into());
        self
    }

    pub fn register_handler(&mut self, uri: impl Into<String>, handler: NamespaceHandlerRef) -> &mut Self {
        self.handlers.insert(uri.into(), handler);
        self
    }

    pub fn uri_of(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn handler(&self, uri: &str) -> Option<NamespaceHandlerRef> {
        self.handlers.get(uri).cloned()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.prefixes.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }

    /// Take over `other`'s declarations and handlers, replacing ours.
    pub fn merge(&mut self, other: &NamespaceScope) {
        for (prefix, uri) in &other.prefixes {
            self.prefixes.insert(prefix.clone(), uri.clone());
        }
        for (uri, handler) in &other.handlers {
            self.handlers.insert(uri.clone(), Rc::clone(handler));
        }
    }
}

impl fmt::Debug for NamespaceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespaceScope")
            .field("prefixes", &self.prefixes)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ── NamespaceResolver ─────────────────────────────────────────────────────

/// Root-level namespace context: configured declarations plus the built-in
/// handlers for the markup namespace and `clr-namespace:` imports.
///
/// Usable on its own to compile paths outside a parse.
#[derive(Debug, Clone)]
pub struct NamespaceResolver {
    scope: NamespaceScope,
    types: Rc<TypeRegistry>,
    converter: TypeConverter,
}

impl NamespaceResolver {
    pub fn new(scope: NamespaceScope, types: Rc<TypeRegistry>, converter: TypeConverter) -> Self {
        Self { scope, types, converter }
    }

    pub fn scope(&self) -> &NamespaceScope {
        &self.scope
    }

    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    /// A prefix nothing declares: the empty prefix maps to the empty URI,
    /// any other prefix is an error.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<String> {
        match self.scope.uri_of(prefix) {
            Some(uri) => Ok(uri.to_string()),
            None if prefix.is_empty() => Ok(String::new()),
            None => Err(Error::UndefinedPrefix(prefix.to_string())),
        }
    }

    /// Handlers that need no registration. `Ok(None)` for other URIs.
    pub fn builtin_handler(&self, uri: &str) -> Result<Option<NamespaceHandlerRef>> {
        if uri == XAML_NS_URI {
            return Ok(Some(Rc::new(XamlNamespaceHandler)));
        }
        if uri.starts_with(CLR_NAMESPACE_PREFIX) {
            let handler = DefaultNamespaceHandler::from_uri(uri, Rc::clone(&self.types), self.converter.clone())?;
            return Ok(Some(Rc::new(handler)));
        }
        Ok(None)
    }
}

impl NamespaceContext for NamespaceResolver {
    fn lookup_namespace(&self, qualified: &str) -> Result<(String, String)> {
        let (prefix, local) = split_prefix(qualified);
        Ok((local.to_string(), self.resolve_prefix(prefix)?))
    }

    fn namespace_handler(&self, namespace_uri: &str) -> Result<NamespaceHandlerRef> {
        if let Some(handler) = self.scope.handler(namespace_uri) {
            return Ok(handler);
        }
        self.builtin_handler(namespace_uri)?
            .ok_or_else(|| Error::NamespaceNotSupported(namespace_uri.to_string()))
    }

    fn converter(&self) -> TypeConverter {
        self.converter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_registry, Person};

    fn resolver() -> NamespaceResolver {
        let mut scope = NamespaceScope::new();
        scope.declare("x", XAML_NS_URI).declare("t", "clr-namespace:Testing");
        let types = Rc::new(test_registry());
        let converter = TypeConverter::new().with_types(Rc::clone(&types));
        NamespaceResolver::new(scope, types, converter)
    }

    #[test]
    fn prefixes() {
        let r = resolver();
        assert_eq!(r.lookup_namespace("t:Person").unwrap(), ("Person".to_string(), "clr-namespace:Testing".to_string()));
        assert_eq!(r.lookup_namespace("Person").unwrap().1, "");
        assert!(matches!(r.lookup_namespace("q:Person"), Err(Error::UndefinedPrefix(p)) if p == "q"));
    }

    #[test]
    fn builtin_handlers() {
        let r = resolver();
        let t = r.namespace_handler("clr-namespace:Testing").unwrap();
        assert_eq!(t.resolve_type("Person", "clr-namespace:Testing").unwrap(), ValueType::Object(Person::class_def()));
        assert!(r.namespace_handler(XAML_NS_URI).is_ok());
        assert!(matches!(r.namespace_handler("urn:other"), Err(Error::NamespaceNotSupported(_))));
        assert!(matches!(r.namespace_handler(""), Err(Error::NamespaceNotSupported(_))));
    }

    #[test]
    fn registered_handler_wins() {
        let mut scope = NamespaceScope::new();
        scope.register_handler("urn:other", Rc::new(XamlNamespaceHandler));
        let r = NamespaceResolver::new(scope, Rc::new(TypeRegistry::new()), TypeConverter::new());
        assert!(r.namespace_handler("urn:other").is_ok());
    }
}
