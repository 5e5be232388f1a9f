//! Markup document → live object graph.
//!
//! Every element is built in the same order: namespace declarations, the
//! instance itself, naming-scope chaining, `x:Name`/`x:Key`, attribute
//! members and events, member elements, content, and finally
//! [`Object::initialize`](crate::object::Object::initialize).
//!
//! ```rust,ignore
//! let config = ParserConfig::new()
//!     .with_types(registry)
//!     .with_namespace("", "clr-namespace:Demo");
//! let mut parser = Parser::new(source, config)?;
//! let root = parser.parse()?;
//! ```

mod context;

pub use context::{ElementContext, ElementContextStack, ParserContext};

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, trace};
use lumen_markup::{
    parse_attribute_value, parse_document, Attribute, AttributeValue, Document, Element, ExtensionExpr,
    ExtensionParams, Node, QName,
};

use crate::convert::{CustomConverter, TypeConverter};
use crate::descriptor::DataDescriptor;
use crate::error::{Error, Result};
use crate::markup::activate_markup_extension;
use crate::namespace::{
    split_prefix, NamespaceContext, NamespaceHandlerRef, NamespaceResolver, NamespaceScope, TypeRegistry,
    XAML_NS_URI,
};
use crate::object::{Event, EventSignature, Handler, NameScope, ObjectRef};
use crate::reflection;
use crate::value::{Value, ValueType};

/// Resolves namespace URIs that are neither the markup namespace nor
/// `clr-namespace:` imports.
pub type ImportResolver = Rc<dyn Fn(&str) -> Result<NamespaceHandlerRef>>;

/// Turns an event-handler name from the markup into a callable handler.
pub type EventHandlerResolver = Rc<dyn Fn(&EventSignature, &str) -> anyhow::Result<Handler>>;

// ── ParserConfig ──────────────────────────────────────────────────────────

/// Session configuration of a [`Parser`].
#[derive(Clone)]
pub struct ParserConfig {
    pub types: Rc<TypeRegistry>,
    /// Declarations and handlers visible above the document root. The `x`
    /// prefix is declared for the markup namespace by default.
    pub namespaces: NamespaceScope,
    pub import_resolver: Option<ImportResolver>,
    pub event_handler_resolver: Option<EventHandlerResolver>,
    pub custom_converter: Option<CustomConverter>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let mut namespaces = NamespaceScope::new();
        namespaces.declare("x", XAML_NS_URI);
        Self {
            types: Rc::new(TypeRegistry::with_system()),
            namespaces,
            import_resolver: None,
            event_handler_resolver: None,
            custom_converter: None,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = Rc::new(types);
        self
    }

    pub fn with_namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.namespaces.declare(prefix, uri);
        self
    }

    pub fn with_handler(mut self, uri: &str, handler: NamespaceHandlerRef) -> Self {
        self.namespaces.register_handler(uri, handler);
        self
    }

    pub fn with_import_resolver(mut self, resolve: impl Fn(&str) -> Result<NamespaceHandlerRef> + 'static) -> Self {
        self.import_resolver = Some(Rc::new(resolve));
        self
    }

    pub fn with_event_handler_resolver(
        mut self,
        resolve: impl Fn(&EventSignature, &str) -> anyhow::Result<Handler> + 'static,
    ) -> Self {
        self.event_handler_resolver = Some(Rc::new(resolve));
        self
    }

    pub fn with_converter(mut self, convert: impl Fn(&Value, &ValueType) -> Option<Value> + 'static) -> Self {
        self.custom_converter = Some(Rc::new(convert));
        self
    }
}

impl fmt::Debug for ParserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserConfig")
            .field("namespaces", &self.namespaces)
            .field("import_resolver", &self.import_resolver.is_some())
            .field("event_handler_resolver", &self.event_handler_resolver.is_some())
            .field("custom_converter", &self.custom_converter.is_some())
            .finish()
    }
}

// ── Parser ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct NameAndKey {
    name: Option<String>,
    key: Option<Value>,
}

impl NameAndKey {
    fn set_name(&mut self, name: &str, element: &Element) -> Result<()> {
        if self.name.is_some() {
            return Err(Error::AttributeNotAllowed(format!("<{}> is named more than once", element.name)));
        }
        self.name = Some(name.trim().to_string());
        Ok(())
    }

    fn set_key(&mut self, key: Value, element: &Element) -> Result<()> {
        if self.key.is_some() {
            return Err(Error::AttributeNotAllowed(format!("<{}> has more than one key", element.name)));
        }
        self.key = Some(key);
        Ok(())
    }
}

/// Where an attribute or member element stores its value.
enum MemberTarget {
    Data(DataDescriptor),
    Attached(DataDescriptor),
    Event(&'static Event),
}

/// Single-use builder of one document.
///
/// Bindings created during the parse stay active while the parser (or the
/// handles returned by [`Parser::into_bindings`]) are alive.
pub struct Parser {
    document: Option<Document>,
    config: ParserConfig,
    converter: TypeConverter,
    stack: ElementContextStack,
    root_scope: NameScope,
    document_namespaces: NamespaceScope,
    bindings: Vec<ObjectRef>,
}

impl Parser {
    pub fn new(src: &str, config: ParserConfig) -> Result<Self> {
        Ok(Self::from_document(parse_document(src)?, config))
    }

    pub fn from_document(document: Document, config: ParserConfig) -> Self {
        let mut converter = TypeConverter::new().with_types(Rc::clone(&config.types));
        if let Some(custom) = &config.custom_converter {
            converter = converter.with_custom(Rc::clone(custom));
        }
        let root = NamespaceResolver::new(config.namespaces.clone(), Rc::clone(&config.types), converter.clone());
        Self {
            document: Some(document),
            config,
            converter,
            stack: ElementContextStack::new(root),
            root_scope: NameScope::new(),
            document_namespaces: NamespaceScope::new(),
            bindings: Vec::new(),
        }
    }

    /// Build the document. A parser parses once; later calls fail.
    pub fn parse(&mut self) -> Result<Value> {
        let document = self.document.take().ok_or(Error::AlreadyParsed)?;
        let (value, _) = self.instantiate_keyed(&document.root)?;
        debug!("parsed <{}> with {} active binding(s)", document.root.name, self.bindings.len());
        Ok(unwrap_include(value))
    }

    pub fn bindings(&self) -> &[ObjectRef] {
        &self.bindings
    }

    pub fn into_bindings(self) -> Vec<ObjectRef> {
        self.bindings
    }

    /// Names registered outside any object's naming scope.
    pub fn root_name_scope(&self) -> &NameScope {
        &self.root_scope
    }

    /// The configured namespaces plus those declared on the document root,
    /// for compiling paths against the parsed graph.
    pub fn namespace_context(&self) -> NamespaceResolver {
        let mut scope = self.config.namespaces.clone();
        scope.merge(&self.document_namespaces);
        NamespaceResolver::new(scope, Rc::clone(&self.config.types), self.converter.clone())
    }

    // ── element contexts ──────────────────────────────────────────────────

    fn scoped<R>(&mut self, context: ElementContext, f: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.stack.push(context);
        let result = f(self);
        if let Some(done) = self.stack.pop() {
            if self.stack.depth() == 0 {
                self.document_namespaces = done.namespaces().clone();
            }
        }
        result
    }

    fn set_current_instance(&mut self, instance: Value) {
        if let Some(context) = self.stack.current_mut() {
            context.set_instance(instance);
        }
    }

    fn create_handler(&self, uri: &str) -> Result<NamespaceHandlerRef> {
        if let Some(handler) = self.stack.root().builtin_handler(uri)? {
            return Ok(handler);
        }
        match &self.config.import_resolver {
            Some(resolve) => resolve(uri),
            None => Err(Error::NamespaceNotSupported(uri.to_string())),
        }
    }

    fn declare_namespaces(&self, element: &Element) -> Result<NamespaceScope> {
        let mut scope = NamespaceScope::new();
        for attr in element.attributes.iter().filter(|a| a.is_namespace_declaration()) {
            let uri = attr.value.trim();
            scope.declare(attr.declared_prefix(), uri);
            if scope.handler(uri).is_none() && self.stack.handler(uri).is_none() {
                let handler = self.create_handler(uri)?;
                scope.register_handler(uri, handler);
                debug!("imported namespace '{}' as '{}' on <{}>", uri, attr.declared_prefix(), element.name);
            }
        }
        Ok(scope)
    }

    /// The directive an attribute names (`Name` for `x:Name`), if it is in
    /// the markup namespace.
    fn directive<'a>(&self, attr: &'a Attribute) -> Result<Option<&'a str>> {
        if !attr.name.is_prefixed() || attr.is_namespace_declaration() || attr.name.prefix == "xml" {
            return Ok(None);
        }
        let uri = self.stack.namespace_of_prefix(&attr.name.prefix)?;
        Ok((uri == XAML_NS_URI).then_some(attr.name.local.as_str()))
    }

    /// `<x:Key>` / `<x:Name>` given in element syntax.
    fn directive_element<'a>(&self, element: &'a Element) -> Option<&'a str> {
        let local = element.name.local.as_str();
        let is_directive = element.name.is_prefixed()
            && matches!(local, "Key" | "Name")
            && self.stack.namespace_of_prefix(&element.name.prefix).is_ok_and(|uri| uri == XAML_NS_URI);
        is_directive.then_some(local)
    }

    // ── elements ──────────────────────────────────────────────────────────

    fn instantiate_keyed(&mut self, element: &Element) -> Result<(Value, Option<Value>)> {
        let result = self.declare_namespaces(element).and_then(|namespaces| {
            self.scoped(ElementContext::new(element.name.to_string(), namespaces), |p| p.build_element(element))
        });
        result.map_err(|e| e.in_element(element))
    }

    fn build_element(&mut self, element: &Element) -> Result<(Value, Option<Value>)> {
        let (local, uri) = self.lookup_namespace(&element.name.to_string())?;
        let handler = self.namespace_handler(&uri)?;
        if !matches!(handler.resolve_type(&local, &uri)?, ValueType::Object(_)) {
            return self.build_primitive(element, &handler, &local, &uri);
        }
        trace!("instantiating <{}> from '{}'", element.name, uri);
        let instance = handler.instantiate_element(&local, &uri, &[])?;
        self.set_current_instance(instance.clone());

        if let Value::Object(obj) = &instance {
            if let Some(parent) = self.stack.scope_owner(true) {
                if let Some(scope) = obj.borrow().name_scope() {
                    scope.register_parent(&parent);
                }
            }
        }

        let NameAndKey { name, key } = self.check_name_or_key(element, &instance)?;
        if key.is_some() && self.stack.depth() == 1 {
            return Err(Error::KeyOnRoot);
        }
        if let Some(name) = &name {
            self.register_name(name, instance.clone())?;
        }

        for attr in &element.attributes {
            self.handle_member_or_event_assignment(element, &instance, attr)?;
        }
        for child in element.child_elements().filter(|c| c.is_member_element()) {
            self.handle_member_element(element, &instance, child)
                .map_err(|e| e.in_element(child))?;
        }

        match instance.as_object().filter(|o| o.borrow_mut().as_native_element_mut().is_some()) {
            Some(obj) => self.add_native_children(element, obj)?,
            None => {
                let content = self.parse_element_value(element)?;
                if !content.is_null() {
                    self.assign_content(element, &instance, content)?;
                }
            }
        }

        if let Value::Object(obj) = &instance {
            obj.borrow_mut().initialize(&*self)?;
        }
        Ok((instance, key))
    }

    /// Each child is built before `obj` is borrowed to receive it.
    fn add_native_children(&mut self, element: &Element, obj: &ObjectRef) -> Result<()> {
        for child in element.child_elements() {
            if child.is_member_element() || self.directive_element(child).is_some() {
                continue;
            }
            let value = self.instantiate_child(child)?;
            let mut target = obj.borrow_mut();
            if let Some(native) = target.as_native_element_mut() {
                native.add_native_child(child, value).map_err(|e| e.in_element(child))?;
            }
        }
        Ok(())
    }

    /// `<sys:Int32>42</sys:Int32>`: the text content converted to the type.
    fn build_primitive(
        &mut self,
        element: &Element,
        handler: &NamespaceHandlerRef,
        local: &str,
        uri: &str,
    ) -> Result<(Value, Option<Value>)> {
        let mut found = NameAndKey::default();
        for attr in element.attributes.iter().filter(|a| !a.is_namespace_declaration()) {
            match self.directive(attr)? {
                Some("Key") => found.set_key(self.parse_value_str(&attr.value)?, element)?,
                Some("Name") => found.set_name(&attr.value, element)?,
                Some("Uid") => {}
                _ => {
                    return Err(Error::AttributeNotAllowed(format!(
                        "attribute '{}' is not allowed on <{}>",
                        attr.name, element.name
                    )));
                }
            }
        }
        if element.child_elements().next().is_some() {
            return Err(Error::ChildrenNotSupported(element.name.to_string()));
        }
        let text = element.text();
        let params = if text.is_empty() { Vec::new() } else { vec![Value::Str(text)] };
        let value = handler.instantiate_element(local, uri, &params)?;
        self.set_current_instance(value.clone());
        if found.key.is_some() && self.stack.depth() == 1 {
            return Err(Error::KeyOnRoot);
        }
        if let Some(name) = &found.name {
            self.register_name(name, value.clone())?;
        }
        Ok((value, found.key))
    }

    fn check_name_or_key(&mut self, element: &Element, instance: &Value) -> Result<NameAndKey> {
        let mut found = NameAndKey::default();
        for attr in &element.attributes {
            match self.directive(attr)? {
                None if !attr.name.is_prefixed() && attr.name.local == "Name" => found.set_name(&attr.value, element)?,
                None => {}
                Some("Name") => {
                    found.set_name(&attr.value, element)?;
                    self.assign_name_member(instance, attr.value.trim())?;
                }
                Some("Key") => found.set_key(self.parse_value_str(&attr.value)?, element)?,
                Some("Uid") => {}
                Some(_) => {
                    return Err(Error::AttributeNotAllowed(format!(
                        "'{}' is not a supported directive",
                        attr.name
                    )));
                }
            }
        }
        for child in element.child_elements() {
            match self.directive_element(child) {
                Some("Name") => {
                    let name = self.parse_element_value(child)?.to_string();
                    found.set_name(&name, element)?;
                    self.assign_name_member(instance, name.trim())?;
                }
                Some(_) => found.set_key(self.parse_element_value(child)?, element)?,
                None => {}
            }
        }
        Ok(found)
    }

    fn assign_name_member(&mut self, instance: &Value, name: &str) -> Result<()> {
        let Value::Object(obj) = instance else {
            return Ok(());
        };
        match reflection::find_member_descriptor(obj, "Name")? {
            Some(dd) => self.handle_member_assignment(&dd, Value::from(name)),
            None => Ok(()),
        }
    }

    fn assign_content(&mut self, element: &Element, instance: &Value, content: Value) -> Result<()> {
        let Value::Object(obj) = instance else {
            return Err(Error::ChildrenNotSupported(element.name.to_string()));
        };
        if let Some(property) = obj.class().content_property() {
            let dd = reflection::find_member_descriptor(obj, property)?.ok_or_else(|| Error::MemberNotFound {
                member: property.to_string(),
                target: obj.class().name().to_string(),
            })?;
            return self.handle_member_assignment(&dd, content);
        }
        if reflection::check_handle_collection_assignment(instance, &content, &self.converter)? {
            return Ok(());
        }
        Err(Error::ChildrenNotSupported(element.name.to_string()))
    }

    // ── members, attached properties and events ───────────────────────────

    fn resolve_member_target(&mut self, element: &Element, instance: &Value, name: &QName) -> Result<MemberTarget> {
        let (qualifier, member) = match name.member_parts() {
            Some((qualifier, member)) => (Some(qualifier), member),
            None => (None, name.local.as_str()),
        };
        let element_uri = self.stack.namespace_of_prefix(&element.name.prefix)?;
        let member_uri = match name.is_prefixed() {
            true => Some(self.stack.namespace_of_prefix(&name.prefix)?),
            false => None,
        };

        let attached = match qualifier {
            None => false,
            Some(provider) if provider == element.name.local => {
                let uri = member_uri.clone().unwrap_or_else(|| element_uri.clone());
                self.namespace_handler(&uri)?.has_attached_property(provider, member, instance, &uri)?
            }
            Some(_) => true,
        };
        if let (true, Some(provider)) = (attached, qualifier) {
            let uri = match (&member_uri, provider == element.name.local) {
                (Some(uri), _) => uri.clone(),
                (None, true) => element_uri,
                (None, false) => self.stack.namespace_of_prefix("")?,
            };
            let handler = self.namespace_handler(&uri)?;
            return handler.get_attached_property(provider, member, instance, &uri).map(MemberTarget::Attached);
        }

        if member_uri.as_ref().is_none_or(|uri| *uri == element_uri) {
            let Value::Object(obj) = instance else {
                return Err(Error::MemberNotFound { member: member.to_string(), target: instance.describe() });
            };
            if let Some(dd) = reflection::find_member_descriptor(obj, member)? {
                return Ok(MemberTarget::Data(dd));
            }
            if let Some(event) = obj.class().event(member) {
                return Ok(MemberTarget::Event(event));
            }
            return Err(Error::MemberNotFound { member: member.to_string(), target: obj.class().name().to_string() });
        }
        Err(Error::AttributeNotAllowed(format!("'{}' is not allowed on <{}>", name, element.name)))
    }

    fn handle_member_or_event_assignment(&mut self, element: &Element, instance: &Value, attr: &Attribute) -> Result<()> {
        if attr.is_namespace_declaration() || attr.name.prefix == "xml" || self.directive(attr)?.is_some() {
            return Ok(());
        }
        // `Name` only names the element when there is no member to assign
        if !attr.name.is_prefixed()
            && attr.name.local == "Name"
            && instance.as_object().is_none_or(|o| reflection::find_member_descriptor(o, "Name").ok().flatten().is_none())
        {
            return Ok(());
        }
        match self.resolve_member_target(element, instance, &attr.name)? {
            // a null local member keeps its default; attached properties take it
            MemberTarget::Data(dd) => {
                let value = self.parse_value_str(&attr.value)?;
                if value.is_null() {
                    return Ok(());
                }
                self.handle_member_assignment(&dd, value)
            }
            MemberTarget::Attached(dd) => {
                let value = self.parse_value_str(&attr.value)?;
                self.handle_member_assignment(&dd, value)
            }
            MemberTarget::Event(event) => self.handle_event_assignment(instance, event, &attr.value),
        }
    }

    fn handle_event_assignment(&mut self, instance: &Value, event: &Event, handler_name: &str) -> Result<()> {
        let handler_name = handler_name.trim();
        let failed = |source: Option<anyhow::Error>| Error::EventHandler {
            event: event.name().to_string(),
            handler: handler_name.to_string(),
            source: source.map(Into::into),
        };
        let Value::Object(obj) = instance else {
            return Err(failed(None));
        };
        let resolve = self.config.event_handler_resolver.clone().ok_or_else(|| failed(None))?;
        let handler = resolve(event.signature(), handler_name).map_err(|e| failed(Some(e)))?;
        event
            .subscribe(&mut *obj.borrow_mut(), handler)
            .map_err(|e| Error::access("subscribe to", event.name(), obj.class().name(), e))
    }

    fn handle_member_element(&mut self, element: &Element, instance: &Value, child: &Element) -> Result<()> {
        for attr in &child.attributes {
            if self.directive(attr)? != Some("Uid") {
                return Err(Error::AttributeNotAllowed(format!(
                    "member element <{}> cannot carry attribute '{}'",
                    child.name, attr.name
                )));
            }
        }
        match self.resolve_member_target(element, instance, &child.name)? {
            MemberTarget::Data(dd) | MemberTarget::Attached(dd) => {
                let value = self.parse_element_value(child)?;
                self.handle_member_assignment(&dd, value)
            }
            MemberTarget::Event(event) => Err(Error::NotSupported(format!(
                "event '{}' cannot be given in member-element syntax",
                event.name()
            ))),
        }
    }

    // ── values ────────────────────────────────────────────────────────────

    /// Content of `element`: nothing, a single value, a list, or a
    /// dictionary when children carry keys.
    fn parse_element_value(&mut self, element: &Element) -> Result<Value> {
        let mut entries: Vec<(Option<Value>, Value)> = Vec::new();
        for node in &element.children {
            match node {
                Node::Text(text) => entries.push((None, Value::Str(text.clone()))),
                Node::Element(child) => {
                    if child.is_member_element() || self.directive_element(child).is_some() {
                        continue;
                    }
                    let (value, key) = self.instantiate_keyed(child)?;
                    let value = self.evaluate_in_place(value).map_err(|e| e.in_element(child))?;
                    if let (Some(key), Some(context)) = (&key, self.stack.current_mut()) {
                        context.add_keyed_element(key.clone(), value.clone());
                    }
                    entries.push((key, value));
                }
            }
        }
        collect_children(&element.name, entries)
    }

    /// Attribute text: a literal, or the value built from a markup extension.
    fn parse_value_str(&mut self, text: &str) -> Result<Value> {
        match parse_attribute_value(text)? {
            AttributeValue::Literal(literal) => Ok(Value::Str(literal)),
            AttributeValue::Extension(expr) => self.instantiate_extension(&expr),
        }
    }

    fn instantiate_extension(&mut self, expr: &ExtensionExpr) -> Result<Value> {
        let context = ElementContext::new(format!("{{{}}}", expr.name), NamespaceScope::new());
        self.scoped(context, |p| {
            let (local, uri) = p.lookup_namespace(&expr.name)?;
            let handler = p.namespace_handler(&uri)?;
            let type_name = match handler.resolve_type(&local, &uri) {
                Ok(_) => local,
                Err(Error::TypeNotFound { .. }) => format!("{}Extension", local),
                Err(e) => return Err(e),
            };
            let instance = match &expr.params {
                ExtensionParams::Named(params) => {
                    let instance = handler.instantiate_element(&type_name, &uri, &[])?;
                    p.set_current_instance(instance.clone());
                    for (member, raw) in params {
                        p.assign_extension_member(&instance, member, raw)?;
                    }
                    instance
                }
                ExtensionParams::Positional(params) => {
                    let mut args = Vec::with_capacity(params.len());
                    for raw in params {
                        let arg = p.parse_value_str(raw)?;
                        args.push(p.evaluate_in_place(arg)?);
                    }
                    let instance = handler.instantiate_element(&type_name, &uri, &args)?;
                    p.set_current_instance(instance.clone());
                    instance
                }
            };
            if let Value::Object(obj) = &instance {
                obj.borrow_mut().initialize(&*p)?;
            }
            trace!("built markup extension {{{}}}", expr.name);
            Ok(instance)
        })
    }

    fn assign_extension_member(&mut self, instance: &Value, member: &str, raw: &str) -> Result<()> {
        let Value::Object(obj) = instance else {
            return Err(Error::NotSupported(format!("{} cannot take named parameters", instance.describe())));
        };
        let dd = reflection::find_member_descriptor(obj, member)?.ok_or_else(|| Error::MemberNotFound {
            member: member.to_string(),
            target: obj.class().name().to_string(),
        })?;
        let value = self.parse_value_str(raw)?;
        if member == "Name" {
            if let Some(name) = value.as_str() {
                self.register_name(name, instance.clone())?;
            }
        }
        self.handle_member_assignment(&dd, value)
    }

    /// Evaluable extensions built as elements stand for their result;
    /// include objects stand for their content.
    fn evaluate_in_place(&mut self, value: Value) -> Result<Value> {
        let Value::Object(obj) = &value else {
            return Ok(value);
        };
        let include = obj.borrow().include_content();
        if let Some(content) = include {
            return Ok(content);
        }
        let evaluated = {
            let guard = obj.borrow();
            match guard.as_markup_extension() {
                Some(extension) => Some(extension.evaluate(self)?),
                None => None,
            }
        };
        Ok(evaluated.unwrap_or(value))
    }
}

fn implicit_key(value: &Value) -> Option<Value> {
    value.as_object()?.try_borrow()?.implicit_key()
}

fn unwrap_include(value: Value) -> Value {
    let content = value.as_object().and_then(|o| o.borrow().include_content());
    content.unwrap_or(value)
}

/// Children without keys form a list (a single child stands alone); keyed
/// children form a dictionary, and unkeyed siblings among them must carry
/// an implicit key.
fn collect_children(element: &QName, entries: Vec<(Option<Value>, Value)>) -> Result<Value> {
    if entries.iter().all(|(key, _)| key.is_none()) {
        let mut values: Vec<Value> = entries.into_iter().map(|(_, v)| v).collect();
        return Ok(match values.len() {
            0 => Value::Null,
            1 => values.remove(0),
            _ => Value::list(values),
        });
    }
    let mut dict = IndexMap::with_capacity(entries.len());
    for (key, value) in entries {
        let key = match key {
            Some(key) => key,
            None => implicit_key(&value).ok_or_else(|| Error::MixedKeyedChildren(element.to_string()))?,
        };
        if dict.contains_key(&key) {
            return Err(Error::DuplicateKey(key.to_string()));
        }
        dict.insert(key, value);
    }
    Ok(Value::dict(dict))
}

impl NamespaceContext for Parser {
    fn lookup_namespace(&self, qualified: &str) -> Result<(String, String)> {
        let (prefix, local) = split_prefix(qualified);
        Ok((local.to_string(), self.stack.namespace_of_prefix(prefix)?))
    }

    fn namespace_handler(&self, namespace_uri: &str) -> Result<NamespaceHandlerRef> {
        match self.stack.handler(namespace_uri) {
            Some(handler) => Ok(handler),
            None => self.create_handler(namespace_uri),
        }
    }

    fn converter(&self) -> TypeConverter {
        self.converter.clone()
    }
}

impl ParserContext for Parser {
    fn handle_member_assignment(&mut self, target: &DataDescriptor, value: Value) -> Result<()> {
        if let Value::Object(obj) = &value {
            let is_binding = obj.borrow_mut().as_binding_mut().is_some();
            if is_binding {
                {
                    let mut guard = obj.borrow_mut();
                    if let Some(binding) = guard.as_binding_mut() {
                        binding.prepare(self, target.clone())?;
                        binding.activate()?;
                    }
                }
                self.bindings.push(obj.clone());
                return Ok(());
            }
            let guard = obj.borrow();
            if let Some(extension) = guard.as_markup_extension() {
                return activate_markup_extension(extension, self, target);
            }
        }

        if target.supports_write() && (value.is_null() || target.data_type().accepts(&value)) {
            return target.set_value(value);
        }
        if target.supports_read() {
            if let Ok(current) = target.value() {
                if reflection::check_handle_collection_assignment(&current, &value, &self.converter)? {
                    return Ok(());
                }
            }
        }
        let converted = self.converter.convert_or_err(&value, &target.data_type())?;
        target.set_value(converted)
    }

    fn find_name(&self, name: &str) -> Option<Value> {
        let scoped = self
            .stack
            .scope_owner(false)
            .and_then(|owner| owner.try_borrow().and_then(|o| o.name_scope().and_then(|s| s.find_name(name))));
        scoped.or_else(|| self.root_scope.find_name(name))
    }

    fn find_keyed_element(&self, key: &Value) -> Option<Value> {
        self.stack.find_keyed_element(key)
    }

    fn current_instance(&self) -> Option<Value> {
        self.stack.current().and_then(|c| c.instance().cloned())
    }

    /// Names go to the innermost naming scope enclosing the element being
    /// built, or to the parser's root scope.
    fn register_name(&mut self, name: &str, instance: Value) -> Result<()> {
        debug!("registering name '{}' for {}", name, instance.describe());
        if let Some(owner) = self.stack.scope_owner(true) {
            let registered = owner
                .try_borrow()
                .and_then(|o| o.name_scope().map(|s| s.register_name(name, instance.clone())));
            if let Some(result) = registered {
                return result;
            }
        }
        self.root_scope.register_name(name, instance)
    }

    fn ancestors(&self) -> Vec<Value> {
        self.stack.ancestors().cloned().collect()
    }

    fn instantiate_child(&mut self, element: &Element) -> Result<Value> {
        let (value, _) = self.instantiate_keyed(element)?;
        self.evaluate_in_place(value)
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("parsed", &self.document.is_none())
            .field("config", &self.config)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
