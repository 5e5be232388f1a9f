use indexmap::IndexMap;
use lumen_markup::Element;

use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::namespace::{NamespaceContext, NamespaceHandlerRef, NamespaceResolver, NamespaceScope};
use crate::object::ObjectRef;
use crate::value::Value;

/// What objects and markup extensions may ask of the parser while they are
/// being built.
pub trait ParserContext: NamespaceContext {
    /// Store `value` in `target`: bindings are prepared and activated,
    /// evaluable extensions evaluated, collections merged, anything else
    /// converted to the target's type.
    fn handle_member_assignment(&mut self, target: &DataDescriptor, value: Value) -> Result<()>;

    /// Resolve a name through the naming scopes enclosing the current element.
    fn find_name(&self, name: &str) -> Option<Value>;

    /// A keyed element built so far by the current element or an ancestor.
    fn find_keyed_element(&self, key: &Value) -> Option<Value>;

    /// The instance of the innermost element (or extension) being built.
    fn current_instance(&self) -> Option<Value>;

    fn register_name(&mut self, name: &str, instance: Value) -> Result<()>;

    /// Instances of the elements enclosing the one being built, innermost
    /// first.
    fn ancestors(&self) -> Vec<Value>;

    /// Build a child element the way the parser builds content.
    fn instantiate_child(&mut self, element: &Element) -> Result<Value>;
}

// ── ElementContext ────────────────────────────────────────────────────────

/// Parser state of one element (or markup extension) being built.
#[derive(Debug)]
pub struct ElementContext {
    element_name: String,
    instance: Option<Value>,
    namespaces: NamespaceScope,
    keyed: IndexMap<Value, Value>,
}

impl ElementContext {
    pub fn new(element_name: impl Into<String>, namespaces: NamespaceScope) -> Self {
        Self { element_name: element_name.into(), instance: None, namespaces, keyed: IndexMap::new() }
    }

    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    pub fn instance(&self) -> Option<&Value> {
        self.instance.as_ref()
    }

    pub fn set_instance(&mut self, instance: Value) {
        self.instance = Some(instance);
    }

    pub fn namespaces(&self) -> &NamespaceScope {
        &self.namespaces
    }

    /// Later registrations of a key replace earlier ones; duplicate detection
    /// happens where sibling keys are collected.
    pub fn add_keyed_element(&mut self, key: Value, value: Value) {
        self.keyed.insert(key, value);
    }

    pub fn keyed_element(&self, key: &Value) -> Option<&Value> {
        self.keyed.get(key)
    }
}

// ── ElementContextStack ───────────────────────────────────────────────────

/// Element contexts from the root element down to the one being built,
/// on top of the configured root namespace context.
#[derive(Debug)]
pub struct ElementContextStack {
    contexts: Vec<ElementContext>,
    root: NamespaceResolver,
}

impl ElementContextStack {
    pub fn new(root: NamespaceResolver) -> Self {
        Self { contexts: Vec::new(), root }
    }

    pub fn root(&self) -> &NamespaceResolver {
        &self.root
    }

    pub fn push(&mut self, context: ElementContext) {
        self.contexts.push(context);
    }

    pub fn pop(&mut self) -> Option<ElementContext> {
        self.contexts.pop()
    }

    pub fn depth(&self) -> usize {
        self.contexts.len()
    }

    pub fn current(&self) -> Option<&ElementContext> {
        self.contexts.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut ElementContext> {
        self.contexts.last_mut()
    }

    /// Innermost declaration of `prefix`, then the root declarations.
    pub fn namespace_of_prefix(&self, prefix: &str) -> Result<String> {
        match self.contexts.iter().rev().find_map(|c| c.namespaces.uri_of(prefix)) {
            Some(uri) => Ok(uri.to_string()),
            None => self.root.resolve_prefix(prefix),
        }
    }

    /// A handler registered for `uri` on the stack or at the root.
    pub fn handler(&self, uri: &str) -> Option<NamespaceHandlerRef> {
        self.contexts
            .iter()
            .rev()
            .find_map(|c| c.namespaces.handler(uri))
            .or_else(|| self.root.scope().handler(uri))
    }

    pub fn find_keyed_element(&self, key: &Value) -> Option<Value> {
        self.contexts.iter().rev().find_map(|c| c.keyed_element(key).cloned())
    }

    /// Instances below the element being built, innermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = &Value> {
        self.contexts.iter().rev().skip(1).filter_map(|c| c.instance.as_ref())
    }

    /// The innermost instance opening a naming scope, optionally skipping the
    /// element being built.
    pub fn scope_owner(&self, skip_current: bool) -> Option<ObjectRef> {
        let skip = usize::from(skip_current);
        self.contexts.iter().rev().skip(skip).find_map(|c| match &c.instance {
            Some(Value::Object(obj)) if obj.try_borrow().is_some_and(|o| o.name_scope().is_some()) => {
                Some(obj.clone())
            }
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::convert::TypeConverter;
    use crate::error::Error;
    use crate::namespace::{TypeRegistry, XamlNamespaceHandler, XAML_NS_URI};
    use crate::testing::{Panel, Person};

    fn stack() -> ElementContextStack {
        let mut scope = NamespaceScope::new();
        scope.declare("x", XAML_NS_URI);
        ElementContextStack::new(NamespaceResolver::new(scope, Rc::new(TypeRegistry::new()), TypeConverter::new()))
    }

    fn declaring(prefix: &str, uri: &str) -> NamespaceScope {
        let mut scope = NamespaceScope::new();
        scope.declare(prefix, uri);
        scope
    }

    #[test]
    fn inner_declarations_shadow_outer() {
        let mut s = stack();
        s.push(ElementContext::new("Outer", declaring("p", "urn:outer")));
        s.push(ElementContext::new("Inner", declaring("p", "urn:inner")));
        assert_eq!(s.namespace_of_prefix("p").unwrap(), "urn:inner");
        assert_eq!(s.namespace_of_prefix("x").unwrap(), XAML_NS_URI);
        s.pop();
        assert_eq!(s.namespace_of_prefix("p").unwrap(), "urn:outer");
        assert!(matches!(s.namespace_of_prefix("q"), Err(Error::UndefinedPrefix(_))));
    }

    #[test]
    fn handlers_are_found_below() {
        let mut s = stack();
        let mut scope = NamespaceScope::new();
        scope.register_handler("urn:a", Rc::new(XamlNamespaceHandler));
        s.push(ElementContext::new("Outer", scope));
        s.push(ElementContext::new("Inner", NamespaceScope::new()));
        assert!(s.handler("urn:a").is_some());
        assert!(s.handler("urn:b").is_none());
    }

    #[test]
    fn keyed_elements_are_visible_to_descendants() {
        let mut s = stack();
        s.push(ElementContext::new("Outer", NamespaceScope::new()));
        s.current_mut().unwrap().add_keyed_element("k".into(), Value::Int(1));
        s.push(ElementContext::new("Inner", NamespaceScope::new()));
        assert_eq!(s.find_keyed_element(&"k".into()), Some(Value::Int(1)));
        assert_eq!(s.find_keyed_element(&"other".into()), None);
    }

    #[test]
    fn scope_owner_skips_plain_objects() {
        let mut s = stack();
        let panel = ObjectRef::new(Panel::default());
        let mut outer = ElementContext::new("Panel", NamespaceScope::new());
        outer.set_instance(Value::Object(panel.clone()));
        s.push(outer);
        let mut inner = ElementContext::new("Person", NamespaceScope::new());
        inner.set_instance(Value::object(Person::named("a")));
        s.push(inner);
        assert!(s.scope_owner(false).is_some_and(|o| o.ptr_eq(&panel)));
        s.pop();
        assert!(s.scope_owner(false).is_some());
        assert!(s.scope_owner(true).is_none());
    }
}
