//! Uniform read/write handles over "a place a value lives".
//!
//! [`DataDescriptor`] is a closed set of accessors: a snapshot value, an
//! indexer slot, a plain property, a field, an observable property and the
//! [`Repeater`](RepeaterDescriptor) decorator. A descriptor keeps its target
//! alive, so the result of a path evaluation is usable after every
//! intermediate value along the path has gone out of scope.

mod indexer;
mod member;
mod observable;
mod repeater;

use std::fmt;
use std::rc::Rc;

pub use indexer::{IndexTarget, IndexerDescriptor};
pub use member::{FieldDescriptor, SimplePropertyDescriptor};
pub use observable::{ObservableDescriptor, ObservableSource};
pub use repeater::RepeaterDescriptor;

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// Change callback; receives the descriptor whose value changed.
/// Detaching compares handlers by identity.
pub type ChangeHandler = Rc<dyn Fn(&DataDescriptor)>;

#[derive(Clone)]
pub enum DataDescriptor {
    Value(ValueDescriptor),
    Indexer(IndexerDescriptor),
    SimpleProperty(SimplePropertyDescriptor),
    Field(FieldDescriptor),
    Observable(ObservableDescriptor),
    Repeater(RepeaterDescriptor),
}

impl DataDescriptor {
    /// A read-only snapshot of `value`.
    pub fn value_of(value: Value) -> Self {
        DataDescriptor::Value(ValueDescriptor::new(value))
    }

    pub fn supports_read(&self) -> bool {
        match self {
            DataDescriptor::Value(_) => true,
            DataDescriptor::Indexer(d) => d.supports_read(),
            DataDescriptor::SimpleProperty(d) => d.supports_read(),
            DataDescriptor::Field(_) => true,
            DataDescriptor::Observable(_) => true,
            DataDescriptor::Repeater(d) => d.supports_read(),
        }
    }

    pub fn supports_write(&self) -> bool {
        match self {
            DataDescriptor::Value(_) => false,
            DataDescriptor::Indexer(d) => d.supports_write(),
            DataDescriptor::SimpleProperty(d) => d.supports_write(),
            DataDescriptor::Field(_) => true,
            DataDescriptor::Observable(_) => true,
            DataDescriptor::Repeater(d) => d.supports_write(),
        }
    }

    pub fn supports_change_notification(&self) -> bool {
        matches!(self, DataDescriptor::Observable(_) | DataDescriptor::Repeater(_))
    }

    pub fn supports_target_operations(&self) -> bool {
        !matches!(self, DataDescriptor::Value(_) | DataDescriptor::Repeater(_))
    }

    pub fn value(&self) -> Result<Value> {
        match self {
            DataDescriptor::Value(d) => Ok(d.value().clone()),
            DataDescriptor::Indexer(d) => d.value(),
            DataDescriptor::SimpleProperty(d) => d.value(),
            DataDescriptor::Field(d) => d.value(),
            DataDescriptor::Observable(d) => Ok(d.value()),
            DataDescriptor::Repeater(d) => d.value(),
        }
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        match self {
            DataDescriptor::Value(_) => Err(Error::NotSupported(
                "a value descriptor cannot be written".to_string(),
            )),
            DataDescriptor::Indexer(d) => d.set_value(value),
            DataDescriptor::SimpleProperty(d) => d.set_value(value),
            DataDescriptor::Field(d) => d.set_value(value),
            DataDescriptor::Observable(d) => d.set_value(value),
            DataDescriptor::Repeater(d) => d.set_value(value),
        }
    }

    /// Declared type of the addressed location.
    pub fn data_type(&self) -> ValueType {
        match self {
            DataDescriptor::Value(d) => d.value().value_type(),
            DataDescriptor::Indexer(d) => d.data_type(),
            DataDescriptor::SimpleProperty(d) => d.data_type(),
            DataDescriptor::Field(d) => d.data_type(),
            DataDescriptor::Observable(d) => d.data_type(),
            DataDescriptor::Repeater(d) => d.data_type(),
        }
    }

    /// The object this descriptor reads from, if it is bound to one.
    pub fn target_object(&self) -> Option<Value> {
        match self {
            DataDescriptor::Value(_) | DataDescriptor::Repeater(_) => None,
            DataDescriptor::Indexer(d) => d.target_object(),
            DataDescriptor::SimpleProperty(d) => d.target().map(Value::Object),
            DataDescriptor::Field(d) => d.target().map(Value::Object),
            DataDescriptor::Observable(d) => d.target().map(Value::Object),
        }
    }

    /// The same member or index on `new_target`.
    pub fn retarget(&self, new_target: &Value) -> Result<DataDescriptor> {
        match self {
            DataDescriptor::Value(_) => Err(Error::NotSupported(
                "a value descriptor has no target to replace".to_string(),
            )),
            DataDescriptor::Repeater(_) => Err(Error::NotSupported(
                "a repeater descriptor has no target to replace".to_string(),
            )),
            DataDescriptor::Indexer(d) => d.retarget(new_target).map(DataDescriptor::Indexer),
            DataDescriptor::SimpleProperty(d) => d.retarget(new_target).map(DataDescriptor::SimpleProperty),
            DataDescriptor::Field(d) => d.retarget(new_target).map(DataDescriptor::Field),
            DataDescriptor::Observable(d) => d.retarget(new_target).map(DataDescriptor::Observable),
        }
    }

    /// Register for change notification. A no-op for variants that cannot
    /// notify.
    pub fn attach(&self, handler: ChangeHandler) {
        match self {
            DataDescriptor::Observable(d) => d.attach(handler),
            DataDescriptor::Repeater(d) => d.attach(handler),
            _ => {}
        }
    }

    pub fn detach(&self, handler: &ChangeHandler) {
        match self {
            DataDescriptor::Observable(d) => d.detach(handler),
            DataDescriptor::Repeater(d) => d.detach(handler),
            _ => {}
        }
    }
}

impl PartialEq for DataDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DataDescriptor::Value(a), DataDescriptor::Value(b)) => a == b,
            (DataDescriptor::Indexer(a), DataDescriptor::Indexer(b)) => a == b,
            (DataDescriptor::SimpleProperty(a), DataDescriptor::SimpleProperty(b)) => a == b,
            (DataDescriptor::Field(a), DataDescriptor::Field(b)) => a == b,
            (DataDescriptor::Observable(a), DataDescriptor::Observable(b)) => a == b,
            (DataDescriptor::Repeater(a), DataDescriptor::Repeater(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for DataDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataDescriptor::Value(d) => write!(f, "Value({:?})", d.value()),
            DataDescriptor::Indexer(d) => fmt::Debug::fmt(d, f),
            DataDescriptor::SimpleProperty(d) => fmt::Debug::fmt(d, f),
            DataDescriptor::Field(d) => fmt::Debug::fmt(d, f),
            DataDescriptor::Observable(d) => fmt::Debug::fmt(d, f),
            DataDescriptor::Repeater(d) => fmt::Debug::fmt(d, f),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────

/// Immutable snapshot of a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueDescriptor {
    value: Value,
}

impl ValueDescriptor {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}
