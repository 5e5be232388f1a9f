use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::value::{Value, ValueType};

pub type PropertyRef = Rc<Property>;

/// Called after a property changed, with the property and its previous value.
pub type PropertyListener = Rc<dyn Fn(&Property, &Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// An observable value cell.
///
/// Registered types expose these through observable members
/// (`ClassBuilder::observable`); bindings subscribe to them through
/// [`DataDescriptor`](crate::descriptor::DataDescriptor).
pub struct Property {
    ty: ValueType,
    value: RefCell<Value>,
    listeners: RefCell<Vec<(ListenerId, PropertyListener)>>,
    next_id: Cell<u64>,
}

impl Property {
    pub fn new(ty: ValueType, initial: Value) -> PropertyRef {
        Rc::new(Self {
            ty,
            value: RefCell::new(initial),
            listeners: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        })
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Store `value`; listeners run only when the value actually changed.
    pub fn set_value(&self, value: Value) {
        let old = {
            let mut slot = self.value.borrow_mut();
            if *slot == value {
                return;
            }
            std::mem::replace(&mut *slot, value)
        };
        // Snapshot so listeners may attach/detach while being notified.
        let listeners: Vec<PropertyListener> =
            self.listeners.borrow().iter().map(|(_, l)| Rc::clone(l)).collect();
        for listener in listeners {
            listener(self, &old);
        }
    }

    pub fn attach(&self, listener: PropertyListener) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    pub fn detach(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(l, _)| *l != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("type", &self.ty)
            .field("value", &*self.value.borrow())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
