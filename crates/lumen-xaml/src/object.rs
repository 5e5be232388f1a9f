//! Object model: the [`Object`] trait, shared object handles and the
//! per-type [`Class`] registry that replaces runtime reflection.
//!
//! A participating type registers its members once, typically in a
//! `static OnceLock<Class>`:
//!
//! ```rust,ignore
//! impl Label {
//!     fn class_def() -> &'static Class {
//!         static CLASS: OnceLock<Class> = OnceLock::new();
//!         CLASS.get_or_init(|| {
//!             ClassBuilder::<Label>::new("Label")
//!                 .default_constructor()
//!                 .property("Text", ValueType::String,
//!                     |l| l.text.clone().into(),
//!                     |l, v| { l.text = v.as_str().unwrap_or_default().to_string(); Ok(()) })
//!                 .content_property("Text")
//!                 .build()
//!         })
//!     }
//! }
//! ```

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use anyhow::anyhow;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::markup::{Binding, MarkupExtension, NativeElement, ValueConverter};
use crate::namespace::NamespaceContext;
use crate::property::{Property, PropertyRef};
use crate::value::{Value, ValueType};

/// Event handler callback resolved by the host.
pub type Handler = Rc<dyn Fn(&[Value]) -> anyhow::Result<()>>;

// ── Object ────────────────────────────────────────────────────────────────

/// Implemented by every type that can appear in the object graph.
///
/// Only `class`, `as_any` and `as_any_mut` are required; the remaining
/// methods are optional capabilities whose defaults mean "not supported".
pub trait Object: Any + fmt::Debug {
    fn class(&self) -> &'static Class;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The naming scope this object opens, if it opens one.
    fn name_scope(&self) -> Option<&NameScope> {
        None
    }

    /// Storage for attached properties set on this object.
    fn attached_properties(&self) -> Option<&AttachedProperties> {
        None
    }

    /// Key used when this object is placed unkeyed among keyed siblings.
    fn implicit_key(&self) -> Option<Value> {
        None
    }

    /// Include objects stand in for their content once built.
    fn include_content(&self) -> Option<Value> {
        None
    }

    fn as_markup_extension(&self) -> Option<&dyn MarkupExtension> {
        None
    }

    fn as_binding_mut(&mut self) -> Option<&mut dyn Binding> {
        None
    }

    fn as_value_converter(&self) -> Option<&dyn ValueConverter> {
        None
    }

    /// Objects that build their own children from the element tree.
    fn as_native_element_mut(&mut self) -> Option<&mut dyn NativeElement> {
        None
    }

    /// Runs once every member and child has been assigned.
    fn initialize(&mut self, _ctx: &dyn NamespaceContext) -> Result<()> {
        Ok(())
    }
}

/// Shared, mutable handle to an object in the graph.
#[derive(Clone)]
pub struct ObjectRef {
    class: &'static Class,
    cell: Rc<RefCell<dyn Object>>,
}

impl ObjectRef {
    pub fn new<T: Object>(obj: T) -> Self {
        let class = obj.class();
        let cell: Rc<RefCell<dyn Object>> = Rc::new(RefCell::new(obj));
        Self { class, cell }
    }

    /// Available without borrowing the object.
    pub fn class(&self) -> &'static Class {
        self.class
    }

    pub fn borrow(&self) -> Ref<'_, dyn Object> {
        self.cell.borrow()
    }

    /// `None` while the object is mutably borrowed elsewhere.
    pub fn try_borrow(&self) -> Option<Ref<'_, dyn Object>> {
        self.cell.try_borrow().ok()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, dyn Object> {
        self.cell.borrow_mut()
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject { class: self.class, cell: Rc::downgrade(&self.cell) }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.cell).cast::<()>() as usize
    }

    /// Run `f` on the concrete object if it is a `T`.
    pub fn with<T: Object, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let obj = self.cell.borrow();
        obj.as_any().downcast_ref::<T>().map(f)
    }

    pub fn with_mut<T: Object, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut obj = self.cell.borrow_mut();
        obj.as_any_mut().downcast_mut::<T>().map(f)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.try_borrow() {
            Ok(obj) => fmt::Debug::fmt(&*obj, f),
            Err(_) => write!(f, "{} <borrowed>", self.class.name()),
        }
    }
}

/// Non-owning counterpart of [`ObjectRef`].
#[derive(Clone)]
pub struct WeakObject {
    class: &'static Class,
    cell: Weak<RefCell<dyn Object>>,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.cell.upgrade().map(|cell| ObjectRef { class: self.class, cell })
    }

    pub fn class(&self) -> &'static Class {
        self.class
    }

    pub fn ptr_eq(&self, other: &WeakObject) -> bool {
        Weak::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Weak({})", self.class.name())
    }
}

// ── Naming scope / attached-property store ────────────────────────────────

/// Name → instance registry for a subtree of the document.
#[derive(Debug, Default)]
pub struct NameScope {
    names: RefCell<IndexMap<String, Value>>,
    parent: RefCell<Option<WeakObject>>,
}

impl NameScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_name(&self, name: &str, instance: Value) -> Result<()> {
        let mut names = self.names.borrow_mut();
        if names.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        names.insert(name.to_string(), instance);
        Ok(())
    }

    pub fn unregister_name(&self, name: &str) -> Option<Value> {
        self.names.borrow_mut().shift_remove(name)
    }

    /// Local names first, then the parent chain.
    pub fn find_name(&self, name: &str) -> Option<Value> {
        if let Some(found) = self.names.borrow().get(name) {
            return Some(found.clone());
        }
        let parent = self.parent.borrow().as_ref()?.upgrade()?;
        let owner = parent.try_borrow()?;
        owner.name_scope()?.find_name(name)
    }

    /// Chain this scope under the scope opened by `parent`.
    pub fn register_parent(&self, parent: &ObjectRef) {
        *self.parent.borrow_mut() = Some(parent.downgrade());
    }

    pub fn parent(&self) -> Option<ObjectRef> {
        self.parent.borrow().as_ref()?.upgrade()
    }

    pub fn names(&self) -> Vec<String> {
        self.names.borrow().keys().cloned().collect()
    }
}

/// Attached-property values set on one object, keyed `Provider.Property`.
#[derive(Debug, Default)]
pub struct AttachedProperties {
    props: RefCell<IndexMap<String, PropertyRef>>,
}

impl AttachedProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<PropertyRef> {
        self.props.borrow().get(key).cloned()
    }

    pub fn get_or_create(&self, key: &str, ty: &ValueType, default: impl FnOnce() -> Value) -> PropertyRef {
        let mut props = self.props.borrow_mut();
        Rc::clone(
            props
                .entry(key.to_string())
                .or_insert_with(|| Property::new(ty.clone(), default())),
        )
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.borrow().keys().cloned().collect()
    }
}

// ── Class members ─────────────────────────────────────────────────────────

type Getter = Box<dyn Fn(&dyn Object, &[Value]) -> anyhow::Result<Value> + Send + Sync>;
type Setter = Box<dyn Fn(&mut dyn Object, &[Value], Value) -> anyhow::Result<()> + Send + Sync>;

/// A formal parameter of a constructor, method or indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: ValueType,
    /// Trailing optional parameters may be omitted by the caller.
    pub optional: bool,
}

impl Param {
    pub fn required(ty: ValueType) -> Self {
        Self { ty, optional: false }
    }

    pub fn optional(ty: ValueType) -> Self {
        Self { ty, optional: true }
    }
}

/// Anything callable with a formal parameter list; overload resolution
/// works over these.
pub trait Signature {
    fn params(&self) -> &[Param];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Property,
    Field,
}

pub struct Member {
    name: String,
    ty: ValueType,
    kind: MemberKind,
    index_params: Vec<Param>,
    get: Option<Getter>,
    set: Option<Setter>,
}

impl Member {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    /// Parameters of an indexed property; empty for plain members.
    pub fn index_params(&self) -> &[Param] {
        &self.index_params
    }

    pub fn can_read(&self) -> bool {
        self.get.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.set.is_some()
    }

    pub fn get(&self, obj: &dyn Object, indices: &[Value]) -> anyhow::Result<Value> {
        match &self.get {
            Some(get) => get(obj, indices),
            None => Err(anyhow!("member '{}' is write-only", self.name)),
        }
    }

    pub fn set(&self, obj: &mut dyn Object, indices: &[Value], value: Value) -> anyhow::Result<()> {
        match &self.set {
            Some(set) => set(obj, indices, value),
            None => Err(anyhow!("member '{}' is read-only", self.name)),
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("type", &self.ty)
            .field("kind", &self.kind)
            .finish()
    }
}

pub struct Indexer {
    params: Vec<Param>,
    ty: ValueType,
    get: Getter,
    set: Option<Setter>,
}

impl Indexer {
    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub fn can_write(&self) -> bool {
        self.set.is_some()
    }

    pub fn get(&self, obj: &dyn Object, indices: &[Value]) -> anyhow::Result<Value> {
        (self.get)(obj, indices)
    }

    pub fn set(&self, obj: &mut dyn Object, indices: &[Value], value: Value) -> anyhow::Result<()> {
        match &self.set {
            Some(set) => set(obj, indices, value),
            None => Err(anyhow!("indexer is read-only")),
        }
    }
}

impl Signature for Indexer {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Parameter types an event passes to its handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSignature {
    pub params: Vec<ValueType>,
}

impl EventSignature {
    pub fn new(params: Vec<ValueType>) -> Self {
        Self { params }
    }
}

pub struct Event {
    name: String,
    signature: EventSignature,
    add: Box<dyn Fn(&mut dyn Object, Handler) -> anyhow::Result<()> + Send + Sync>,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &EventSignature {
        &self.signature
    }

    pub fn subscribe(&self, obj: &mut dyn Object, handler: Handler) -> anyhow::Result<()> {
        (self.add)(obj, handler)
    }
}

pub struct Method {
    name: String,
    params: Vec<Param>,
    ret: ValueType,
    call: Box<dyn Fn(&mut dyn Object, &[Value]) -> anyhow::Result<Value> + Send + Sync>,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish()
    }
}

impl Method {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> &ValueType {
        &self.ret
    }

    pub fn call(&self, obj: &mut dyn Object, args: &[Value]) -> anyhow::Result<Value> {
        (self.call)(obj, args)
    }
}

impl Signature for Method {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

pub struct Constructor {
    params: Vec<Param>,
    make: Box<dyn Fn(&[Value]) -> anyhow::Result<ObjectRef> + Send + Sync>,
}

impl Constructor {
    pub fn construct(&self, args: &[Value]) -> anyhow::Result<ObjectRef> {
        (self.make)(args)
    }
}

impl Signature for Constructor {
    fn params(&self) -> &[Param] {
        &self.params
    }
}

// ── Collection capabilities ───────────────────────────────────────────────

pub struct ListCapability {
    entry: ValueType,
    items: Box<dyn Fn(&dyn Object) -> Vec<Value> + Send + Sync>,
    add: Box<dyn Fn(&mut dyn Object, Value) -> anyhow::Result<()> + Send + Sync>,
}

impl ListCapability {
    pub fn entry_type(&self) -> &ValueType {
        &self.entry
    }

    pub fn items(&self, obj: &dyn Object) -> Vec<Value> {
        (self.items)(obj)
    }

    pub fn add(&self, obj: &mut dyn Object, item: Value) -> anyhow::Result<()> {
        (self.add)(obj, item)
    }
}

pub struct DictionaryCapability {
    key: ValueType,
    value: ValueType,
    entries: Box<dyn Fn(&dyn Object) -> Vec<(Value, Value)> + Send + Sync>,
    insert: Box<dyn Fn(&mut dyn Object, Value, Value) -> anyhow::Result<()> + Send + Sync>,
}

impl DictionaryCapability {
    pub fn key_type(&self) -> &ValueType {
        &self.key
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value
    }

    pub fn entries(&self, obj: &dyn Object) -> Vec<(Value, Value)> {
        (self.entries)(obj)
    }

    pub fn insert(&self, obj: &mut dyn Object, key: Value, value: Value) -> anyhow::Result<()> {
        (self.insert)(obj, key, value)
    }
}

/// Generic "add a child" capability for containers that are neither lists
/// nor dictionaries.
pub struct AddChildCapability {
    entry: ValueType,
    add: Box<dyn Fn(&mut dyn Object, Value) -> anyhow::Result<()> + Send + Sync>,
}

impl AddChildCapability {
    pub fn entry_type(&self) -> &ValueType {
        &self.entry
    }

    pub fn add(&self, obj: &mut dyn Object, child: Value) -> anyhow::Result<()> {
        (self.add)(obj, child)
    }
}

pub struct AttachedPropertyInfo {
    name: String,
    ty: ValueType,
    default: Box<dyn Fn() -> Value + Send + Sync>,
}

impl AttachedPropertyInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub fn default_value(&self) -> Value {
        (self.default)()
    }
}

// ── Class ─────────────────────────────────────────────────────────────────

type FromValue = Box<dyn Fn(&Value) -> Option<ObjectRef> + Send + Sync>;
type ToValue = Box<dyn Fn(&dyn Object, &ValueType) -> Option<Value> + Send + Sync>;

/// Registered description of a type.
pub struct Class {
    name: String,
    bases: Vec<&'static Class>,
    members: IndexMap<String, Member>,
    events: IndexMap<String, Event>,
    methods: IndexMap<String, Vec<Method>>,
    constructors: Vec<Constructor>,
    indexer: Option<Indexer>,
    content_property: Option<String>,
    list: Option<ListCapability>,
    dictionary: Option<DictionaryCapability>,
    add_child: Option<AddChildCapability>,
    attached: IndexMap<String, AttachedPropertyInfo>,
    from_value: Option<FromValue>,
    to_value: Option<ToValue>,
}

impl Class {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `self` is `other` or declares it (transitively) as a base.
    pub fn is_a(&self, other: &Class) -> bool {
        std::ptr::eq(self, other) || self.bases.iter().any(|b| b.is_a(other))
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.events.get(name)
    }

    pub fn methods(&self, name: &str) -> &[Method] {
        self.methods.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn constructors(&self) -> &[Constructor] {
        &self.constructors
    }

    pub fn indexer(&self) -> Option<&Indexer> {
        self.indexer.as_ref()
    }

    pub fn content_property(&self) -> Option<&str> {
        self.content_property.as_deref()
    }

    pub fn list(&self) -> Option<&ListCapability> {
        self.list.as_ref()
    }

    pub fn dictionary(&self) -> Option<&DictionaryCapability> {
        self.dictionary.as_ref()
    }

    pub fn add_child(&self) -> Option<&AddChildCapability> {
        self.add_child.as_ref()
    }

    pub fn attached_property(&self, name: &str) -> Option<&AttachedPropertyInfo> {
        self.attached.get(name)
    }

    /// Type-level conversion into this class.
    pub fn convert_from(&self, value: &Value) -> Option<Value> {
        self.from_value.as_ref()?(value).map(Value::Object)
    }

    /// Type-level conversion of an instance of this class into `target`.
    pub fn convert_to(&self, obj: &dyn Object, target: &ValueType) -> Option<Value> {
        self.to_value.as_ref()?(obj, target)
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::from_ref(self).hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.name)
    }
}

// ── ClassBuilder ──────────────────────────────────────────────────────────

fn downcast<T: Object>(obj: &dyn Object) -> anyhow::Result<&T> {
    obj.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| anyhow!("expected an instance of {}", obj.class().name()))
}

fn downcast_mut<T: Object>(obj: &mut dyn Object) -> anyhow::Result<&mut T> {
    let name = obj.class().name().to_string();
    obj.as_any_mut()
        .downcast_mut::<T>()
        .ok_or_else(|| anyhow!("expected an instance of {}", name))
}

/// Typed registration of a [`Class`] for `T`.
pub struct ClassBuilder<T> {
    class: Class,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Object> ClassBuilder<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            class: Class {
                name: name.into(),
                bases: Vec::new(),
                members: IndexMap::new(),
                events: IndexMap::new(),
                methods: IndexMap::new(),
                constructors: Vec::new(),
                indexer: None,
                content_property: None,
                list: None,
                dictionary: None,
                add_child: None,
                attached: IndexMap::new(),
                from_value: None,
                to_value: None,
            },
            _marker: PhantomData,
        }
    }

    /// Declare `base` for assignability checks.
    pub fn is_a(mut self, base: &'static Class) -> Self {
        self.class.bases.push(base);
        self
    }

    pub fn content_property(mut self, name: impl Into<String>) -> Self {
        self.class.content_property = Some(name.into());
        self
    }

    pub fn constructor(
        mut self,
        params: Vec<Param>,
        make: impl Fn(&[Value]) -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Self {
        self.class.constructors.push(Constructor {
            params,
            make: Box::new(move |args| make(args).map(ObjectRef::new)),
        });
        self
    }

    pub fn default_constructor(self) -> Self
    where
        T: Default,
    {
        self.constructor(Vec::new(), |_| Ok(T::default()))
    }

    fn member(mut self, name: String, ty: ValueType, kind: MemberKind, index_params: Vec<Param>, get: Option<Getter>, set: Option<Setter>) -> Self {
        self.class.members.insert(name.clone(), Member { name, ty, kind, index_params, get, set });
        self
    }

    pub fn property(
        self,
        name: impl Into<String>,
        ty: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
        set: impl Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.member(
            name.into(),
            ty,
            MemberKind::Property,
            Vec::new(),
            Some(Box::new(move |obj, _| Ok(get(downcast::<T>(obj)?)))),
            Some(Box::new(move |obj, _, value| set(downcast_mut::<T>(obj)?, value))),
        )
    }

    pub fn read_only_property(
        self,
        name: impl Into<String>,
        ty: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.member(
            name.into(),
            ty,
            MemberKind::Property,
            Vec::new(),
            Some(Box::new(move |obj, _| Ok(get(downcast::<T>(obj)?)))),
            None,
        )
    }

    /// A property taking index arguments (`Cell[2, 3]`).
    pub fn indexed_property(
        self,
        name: impl Into<String>,
        ty: ValueType,
        params: Vec<Param>,
        get: impl Fn(&T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.member(
            name.into(),
            ty,
            MemberKind::Property,
            params,
            Some(Box::new(move |obj, indices| get(downcast::<T>(obj)?, indices))),
            None,
        )
    }

    pub fn field(
        self,
        name: impl Into<String>,
        ty: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
        set: impl Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.member(
            name.into(),
            ty,
            MemberKind::Field,
            Vec::new(),
            Some(Box::new(move |obj, _| Ok(get(downcast::<T>(obj)?)))),
            Some(Box::new(move |obj, _, value| set(downcast_mut::<T>(obj)?, value))),
        )
    }

    /// Expose an observable property `name`, registered as the member
    /// `<name>Property` yielding the [`Property`] cell.
    pub fn observable(
        self,
        name: &str,
        get: impl Fn(&T) -> PropertyRef + Send + Sync + 'static,
    ) -> Self {
        self.member(
            format!("{}Property", name),
            ValueType::Observable,
            MemberKind::Property,
            Vec::new(),
            Some(Box::new(move |obj, _| Ok(Value::Property(get(downcast::<T>(obj)?))))),
            None,
        )
    }

    pub fn indexer(
        mut self,
        params: Vec<Param>,
        ty: ValueType,
        get: impl Fn(&T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
        set: impl Fn(&mut T, &[Value], Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class.indexer = Some(Indexer {
            params,
            ty,
            get: Box::new(move |obj, indices| get(downcast::<T>(obj)?, indices)),
            set: Some(Box::new(move |obj, indices, value| set(downcast_mut::<T>(obj)?, indices, value))),
        });
        self
    }

    pub fn event(
        mut self,
        name: impl Into<String>,
        signature: EventSignature,
        add: impl Fn(&mut T, Handler) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.class.events.insert(
            name.clone(),
            Event { name, signature, add: Box::new(move |obj, h| add(downcast_mut::<T>(obj)?, h)) },
        );
        self
    }

    /// Register a method; several calls with one name form an overload set.
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: Vec<Param>,
        ret: ValueType,
        call: impl Fn(&mut T, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.class.methods.entry(name.clone()).or_default().push(Method {
            name,
            params,
            ret,
            call: Box::new(move |obj, args| call(downcast_mut::<T>(obj)?, args)),
        });
        self
    }

    pub fn list(
        mut self,
        entry: ValueType,
        items: impl Fn(&T) -> Vec<Value> + Send + Sync + 'static,
        add: impl Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class.list = Some(ListCapability {
            entry,
            items: Box::new(move |obj| downcast::<T>(obj).map(&items).unwrap_or_default()),
            add: Box::new(move |obj, item| add(downcast_mut::<T>(obj)?, item)),
        });
        self
    }

    pub fn dictionary(
        mut self,
        key: ValueType,
        value: ValueType,
        entries: impl Fn(&T) -> Vec<(Value, Value)> + Send + Sync + 'static,
        insert: impl Fn(&mut T, Value, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class.dictionary = Some(DictionaryCapability {
            key,
            value,
            entries: Box::new(move |obj| downcast::<T>(obj).map(&entries).unwrap_or_default()),
            insert: Box::new(move |obj, k, v| insert(downcast_mut::<T>(obj)?, k, v)),
        });
        self
    }

    pub fn add_child(
        mut self,
        entry: ValueType,
        add: impl Fn(&mut T, Value) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.class.add_child = Some(AddChildCapability {
            entry,
            add: Box::new(move |obj, child| add(downcast_mut::<T>(obj)?, child)),
        });
        self
    }

    /// Declare an attached property this class provides to other objects.
    pub fn attached_property(
        mut self,
        name: impl Into<String>,
        ty: ValueType,
        default: impl Fn() -> Value + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        self.class.attached.insert(name.clone(), AttachedPropertyInfo { name, ty, default: Box::new(default) });
        self
    }

    pub fn from_value(mut self, convert: impl Fn(&Value) -> Option<T> + Send + Sync + 'static) -> Self {
        self.class.from_value = Some(Box::new(move |v| convert(v).map(ObjectRef::new)));
        self
    }

    pub fn to_value(mut self, convert: impl Fn(&T, &ValueType) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.class.to_value = Some(Box::new(move |obj, target| convert(downcast::<T>(obj).ok()?, target)));
        self
    }

    pub fn build(self) -> Class {
        self.class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Person, Shape, Square};

    #[test]
    fn members_are_registered() {
        let class = Person::class_def();
        assert_eq!(class.name(), "Person");
        assert_eq!(class.member("Name").map(Member::kind), Some(MemberKind::Property));
        assert_eq!(class.member("Age").map(Member::kind), Some(MemberKind::Field));
        assert!(class.member("TitleProperty").is_some());
        assert!(class.member("Missing").is_none());
    }

    #[test]
    fn accessors_round_trip() {
        let person = ObjectRef::new(Person::named("Ann"));
        let member = person.class().member("Name").unwrap();
        member.set(&mut *person.borrow_mut(), &[], Value::from("Bob")).unwrap();
        assert_eq!(member.get(&*person.borrow(), &[]).unwrap(), Value::from("Bob"));
        assert_eq!(person.with(|p: &Person| p.name.clone()), Some("Bob".to_string()));
    }

    #[test]
    fn is_a_follows_bases() {
        assert!(Square::class_def().is_a(Shape::class_def()));
        assert!(!Shape::class_def().is_a(Square::class_def()));
        let square = Value::object(Square::default());
        assert!(ValueType::Object(Shape::class_def()).accepts(&square));
    }

    #[test]
    fn name_scope_chain() {
        let outer = ObjectRef::new(crate::testing::Panel::default());
        let inner = crate::testing::Panel::default();
        outer.borrow().name_scope().unwrap().register_name("a", Value::Int(1)).unwrap();
        inner.scope.register_parent(&outer);
        assert_eq!(inner.scope.find_name("a"), Some(Value::Int(1)));
        assert!(matches!(
            outer.borrow().name_scope().unwrap().register_name("a", Value::Null),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn attached_store_creates_once() {
        let store = AttachedProperties::new();
        let a = store.get_or_create("Grid.Row", &ValueType::Int, || Value::Int(0));
        let b = store.get_or_create("Grid.Row", &ValueType::Int, || Value::Int(5));
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(b.value(), Value::Int(0));
    }
}
