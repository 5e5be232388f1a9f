use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::convert::TypeConverter;
use crate::descriptor::{ChangeHandler, DataDescriptor};
use crate::error::Result;
use crate::value::{Value, ValueType};

struct RepeaterState {
    source: RefCell<Option<DataDescriptor>>,
    negate: Cell<bool>,
    handlers: RefCell<Vec<ChangeHandler>>,
    /// Attached to the source; re-raises its changes as our own.
    forward: ChangeHandler,
    converter: TypeConverter,
}

impl Drop for RepeaterState {
    fn drop(&mut self) {
        if let Some(source) = self.source.get_mut().take() {
            source.detach(&self.forward);
        }
    }
}

/// Forwards to a replaceable source descriptor, optionally negating
/// boolean values.
///
/// Listeners stay registered on the repeater when the source is swapped;
/// they are notified of the swap when it changes the visible value.
#[derive(Clone)]
pub struct RepeaterDescriptor(Rc<RepeaterState>);

impl RepeaterDescriptor {
    pub fn new(converter: TypeConverter) -> Self {
        Self(Rc::new_cyclic(|weak: &std::rc::Weak<RepeaterState>| {
            let weak = weak.clone();
            let forward: ChangeHandler = Rc::new(move |_| {
                if let Some(state) = weak.upgrade() {
                    RepeaterDescriptor(state).notify();
                }
            });
            RepeaterState {
                source: RefCell::new(None),
                negate: Cell::new(false),
                handlers: RefCell::new(Vec::new()),
                forward,
                converter,
            }
        }))
    }

    pub fn with_source(source: DataDescriptor, negate: bool, converter: TypeConverter) -> Self {
        let repeater = Self::new(converter);
        repeater.0.negate.set(negate);
        repeater.set_source(Some(source));
        repeater
    }

    pub fn source(&self) -> Option<DataDescriptor> {
        self.0.source.borrow().clone()
    }

    /// Swap the source descriptor. Listeners are notified when the visible
    /// value differs afterwards (or either value cannot be read).
    pub fn set_source(&self, source: Option<DataDescriptor>) {
        let before = self.value().ok();
        let old = self.0.source.replace(source.clone());
        if let Some(old) = &old {
            old.detach(&self.0.forward);
        }
        if let Some(new) = &source {
            new.attach(Rc::clone(&self.0.forward));
        }
        let after = self.value().ok();
        if before.is_none() || before != after {
            self.notify();
        }
    }

    pub fn negate(&self) -> bool {
        self.0.negate.get()
    }

    pub fn set_negate(&self, negate: bool) {
        if self.0.negate.replace(negate) != negate {
            self.notify();
        }
    }

    pub fn supports_read(&self) -> bool {
        self.source().is_none_or(|s| s.supports_read())
    }

    pub fn supports_write(&self) -> bool {
        self.source().is_some_and(|s| s.supports_write())
    }

    pub fn value(&self) -> Result<Value> {
        let Some(source) = self.source() else {
            return Ok(self.apply_negation(Value::Null));
        };
        Ok(self.apply_negation(source.value()?))
    }

    /// Write through to the source; without a source the write is dropped.
    pub fn set_value(&self, value: Value) -> Result<()> {
        match self.source() {
            Some(source) => source.set_value(self.apply_negation(value)),
            None => Ok(()),
        }
    }

    pub fn data_type(&self) -> ValueType {
        if self.negate() {
            return ValueType::Bool;
        }
        self.source().map_or(ValueType::Any, |s| s.data_type())
    }

    pub fn attach(&self, handler: ChangeHandler) {
        self.0.handlers.borrow_mut().push(handler);
    }

    pub fn detach(&self, handler: &ChangeHandler) {
        let mut handlers = self.0.handlers.borrow_mut();
        if let Some(pos) = handlers.iter().position(|h| Rc::ptr_eq(h, handler)) {
            handlers.remove(pos);
        }
    }

    /// Logical negation of a value. Values that do not convert to a boolean
    /// count as true when present and false when null.
    fn apply_negation(&self, value: Value) -> Value {
        if !self.negate() {
            return value;
        }
        let truthy = match self.0.converter.convert(&value, &ValueType::Bool) {
            Some(Value::Bool(b)) => b,
            Some(_) | None => !value.is_null(),
        };
        Value::Bool(!truthy)
    }

    fn notify(&self) {
        let handlers: Vec<ChangeHandler> = self.0.handlers.borrow().iter().cloned().collect();
        let me = DataDescriptor::Repeater(self.clone());
        for handler in handlers {
            handler(&me);
        }
    }
}

impl PartialEq for RepeaterDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
            || (self.negate() == other.negate() && self.source() == other.source())
    }
}

impl fmt::Debug for RepeaterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Repeater({}{:?})", if self.negate() { "!" } else { "" }, self.source())
    }
}
