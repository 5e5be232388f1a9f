use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::object::{Class, Handler, ObjectRef};
use crate::property::PropertyRef;

pub type ListRef = Rc<RefCell<Vec<Value>>>;
pub type DictRef = Rc<RefCell<IndexMap<Value, Value>>>;

// ── Value ─────────────────────────────────────────────────────────────────

/// A dynamically typed value flowing through the object graph.
///
/// Scalars compare by value; lists, dictionaries, objects, properties and
/// handlers compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Enum(EnumValue),
    /// A type used as a value (`{x:Type sys:Int32}`).
    Type(ValueType),
    List(ListRef),
    Dict(DictRef),
    Object(ObjectRef),
    Property(PropertyRef),
    Handler(Handler),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn dict(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    pub fn object<T: crate::object::Object>(obj: T) -> Value {
        Value::Object(ObjectRef::new(obj))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&DictRef> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyRef> {
        match self {
            Value::Property(p) => Some(p),
            _ => None,
        }
    }

    /// The runtime type of this value. Untyped containers report `Any`
    /// entries; null reports `Any`.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null | Value::Handler(_) => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
            Value::Enum(e) => ValueType::Enum(e.ty),
            Value::Type(_) => ValueType::Type,
            Value::List(_) => ValueType::List(Box::new(ValueType::Any)),
            Value::Dict(_) => ValueType::Dict(Box::new(ValueType::Any), Box::new(ValueType::Any)),
            Value::Object(o) => ValueType::Object(o.class()),
            Value::Property(_) => ValueType::Observable,
        }
    }

    /// Short description used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Value::Object(o) => o.class().name().to_string(),
            Value::Str(s) => format!("\"{}\"", s),
            other => other.value_type().to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Property(a), Value::Property(b)) => Rc::ptr_eq(a, b),
            (Value::Handler(a), Value::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            // -0.0 == 0.0, so both must hash alike
            Value::Float(f) => (if *f == 0.0 { 0.0f64 } else { *f }).to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Enum(e) => e.hash(state),
            Value::Type(t) => t.hash(state),
            Value::List(l) => Rc::as_ptr(l).hash(state),
            Value::Dict(d) => Rc::as_ptr(d).hash(state),
            Value::Object(o) => o.addr().hash(state),
            Value::Property(p) => Rc::as_ptr(p).hash(state),
            Value::Handler(h) => Rc::as_ptr(h).cast::<()>().hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Enum(e) => write!(f, "{}", e.name()),
            Value::Type(t) => write!(f, "{}", t),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Object(o) => write!(f, "{}", o.class().name()),
            Value::Property(p) => write!(f, "{}", p.value()),
            Value::Handler(_) => write!(f, "<handler>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Enum(e) => write!(f, "Enum({}.{})", e.ty.name(), e.name()),
            Value::Type(t) => write!(f, "Type({})", t),
            Value::List(items) => f.debug_list().entries(items.borrow().iter()).finish(),
            Value::Dict(entries) => f.debug_map().entries(entries.borrow().iter()).finish(),
            Value::Object(o) => write!(f, "Object({})", o.class().name()),
            Value::Property(p) => write!(f, "Property({:?})", p.value()),
            Value::Handler(_) => write!(f, "Handler"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self { Value::Bool(v) }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self { Value::Int(v) }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v.into()) }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self { Value::Float(v) }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self { Value::Str(v.to_string()) }
}
impl From<String> for Value {
    fn from(v: String) -> Self { Value::Str(v) }
}
impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self { Value::Object(v) }
}
impl From<PropertyRef> for Value {
    fn from(v: PropertyRef) -> Self { Value::Property(v) }
}

// ── Enums ─────────────────────────────────────────────────────────────────

/// A registered enumeration: a name and its member names in declaration order.
///
/// Declared as a `static` so values can refer to it by `&'static`.
#[derive(Debug)]
pub struct EnumType {
    name: &'static str,
    members: &'static [&'static str],
}

impl EnumType {
    pub const fn new(name: &'static str, members: &'static [&'static str]) -> Self {
        Self { name, members }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn members(&self) -> &'static [&'static str] {
        self.members
    }

    /// Exact-name member lookup.
    pub fn value(&'static self, member: &str) -> Option<Value> {
        let index = self.members.iter().position(|m| *m == member)?;
        Some(Value::Enum(EnumValue { ty: self, index }))
    }
}

impl PartialEq for EnumType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for EnumType {}

impl Hash for EnumType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::from_ref(self).hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    ty: &'static EnumType,
    index: usize,
}

impl EnumValue {
    pub fn enum_type(&self) -> &'static EnumType {
        self.ty
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &'static str {
        self.ty.members.get(self.index).copied().unwrap_or("?")
    }
}

// ── ValueType ─────────────────────────────────────────────────────────────

/// Declared type of a storage location, parameter or conversion target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Any,
    Bool,
    Int,
    Float,
    String,
    Type,
    Enum(&'static EnumType),
    /// Mutable list with a typed entry.
    List(Box<ValueType>),
    /// Read-only sequence; a list value is accepted.
    Enumerable(Box<ValueType>),
    Dict(Box<ValueType>, Box<ValueType>),
    Object(&'static Class),
    /// An observable [`Property`](crate::property::Property) cell.
    Observable,
}

impl ValueType {
    pub fn list_of(entry: ValueType) -> Self {
        ValueType::List(Box::new(entry))
    }

    pub fn dict_of(key: ValueType, value: ValueType) -> Self {
        ValueType::Dict(Box::new(key), Box::new(value))
    }

    /// Whether `value` can be stored in a location of this type unchanged.
    /// Null is accepted everywhere.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (ValueType::Any, _) => true,
            (ValueType::Bool, Value::Bool(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Float, Value::Float(_))
            | (ValueType::String, Value::Str(_))
            | (ValueType::Type, Value::Type(_))
            | (ValueType::Observable, Value::Property(_)) => true,
            (ValueType::Enum(ty), Value::Enum(v)) => *ty == v.ty,
            (ValueType::List(entry) | ValueType::Enumerable(entry), Value::List(items)) => {
                items.borrow().iter().all(|v| entry.accepts(v))
            }
            (ValueType::Enumerable(entry), Value::Object(o)) => {
                o.class().list().is_some_and(|l| entry.is_assignable_from(l.entry_type()))
            }
            (ValueType::Dict(k, v), Value::Dict(entries)) => entries
                .borrow()
                .iter()
                .all(|(key, value)| k.accepts(key) && v.accepts(value)),
            (ValueType::Object(class), Value::Object(o)) => o.class().is_a(class),
            _ => false,
        }
    }

    /// Static compatibility: every value of `other` is a valid value of `self`.
    pub fn is_assignable_from(&self, other: &ValueType) -> bool {
        match (self, other) {
            (ValueType::Any, _) => true,
            (ValueType::List(a), ValueType::List(b)) => a == b || **a == ValueType::Any,
            (ValueType::Enumerable(a), ValueType::List(b) | ValueType::Enumerable(b)) => {
                a.is_assignable_from(b)
            }
            (ValueType::Object(a), ValueType::Object(b)) => b.is_a(a),
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "Object"),
            ValueType::Bool => write!(f, "Boolean"),
            ValueType::Int => write!(f, "Int64"),
            ValueType::Float => write!(f, "Double"),
            ValueType::String => write!(f, "String"),
            ValueType::Type => write!(f, "Type"),
            ValueType::Enum(e) => write!(f, "{}", e.name()),
            ValueType::List(e) => write!(f, "List<{}>", e),
            ValueType::Enumerable(e) => write!(f, "Enumerable<{}>", e),
            ValueType::Dict(k, v) => write!(f, "Dictionary<{}, {}>", k, v),
            ValueType::Object(c) => write!(f, "{}", c.name()),
            ValueType::Observable => write!(f, "Property"),
        }
    }
}
