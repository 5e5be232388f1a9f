use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::descriptor::{ChangeHandler, DataDescriptor};
use crate::error::{Error, Result};
use crate::object::{Class, ObjectRef};
use crate::property::{ListenerId, PropertyRef};
use crate::value::{Value, ValueType};

/// How the property was found, so it can be found again on another target.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservableSource {
    /// A `<Name>Property` member of the target.
    Member(String),
    /// An attached property declared by `provider`.
    Attached { provider: &'static Class, name: String },
}

struct ObservableState {
    target: ObjectRef,
    source: ObservableSource,
    property: PropertyRef,
    handlers: RefCell<Vec<ChangeHandler>>,
    subscription: Cell<Option<ListenerId>>,
}

impl Drop for ObservableState {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.property.detach(id);
        }
    }
}

/// Accessor over an observable [`Property`](crate::property::Property).
///
/// Handlers attached to clones of one descriptor share a single
/// subscription on the property: it is made by the first attach and
/// released by the last detach.
#[derive(Clone)]
pub struct ObservableDescriptor(Rc<ObservableState>);

impl ObservableDescriptor {
    /// Look up the observable property `name` on `obj`, declared either as
    /// `{name}Property` or as `name`.
    ///
    /// `Ok(None)` when no such member exists; an error when the member exists
    /// but does not yield a property cell.
    pub fn find(obj: &ObjectRef, name: &str) -> Result<Option<Self>> {
        let class = obj.class();
        let declared = format!("{}Property", name);
        let member = class
            .member(&declared)
            .or_else(|| class.member(name))
            .filter(|m| *m.value_type() == ValueType::Observable);
        let Some(member) = member else {
            return Ok(None);
        };
        let value = {
            let target = obj.borrow();
            member
                .get(&*target, &[])
                .map_err(|e| Error::access("get", member.name(), class.name(), e))?
        };
        let Value::Property(property) = value else {
            return Err(Error::NotAnObservable {
                member: member.name().to_string(),
                target: class.name().to_string(),
            });
        };
        Ok(Some(Self::from_parts(obj, ObservableSource::Member(name.to_string()), property)))
    }

    /// The attached property `provider.name` on `target`, created with its
    /// declared default on first access.
    pub fn attached(target: &ObjectRef, provider: &'static Class, name: &str) -> Result<Self> {
        let info = provider.attached_property(name).ok_or_else(|| Error::MemberNotFound {
            member: name.to_string(),
            target: provider.name().to_string(),
        })?;
        let property = {
            let obj = target.borrow();
            let store = obj.attached_properties().ok_or_else(|| {
                Error::NotSupported(format!(
                    "'{}' cannot hold attached property '{}.{}'",
                    target.class().name(),
                    provider.name(),
                    name
                ))
            })?;
            store.get_or_create(&format!("{}.{}", provider.name(), name), info.value_type(), || {
                info.default_value()
            })
        };
        let source = ObservableSource::Attached { provider, name: name.to_string() };
        Ok(Self::from_parts(target, source, property))
    }

    fn from_parts(target: &ObjectRef, source: ObservableSource, property: PropertyRef) -> Self {
        Self(Rc::new(ObservableState {
            target: target.clone(),
            source,
            property,
            handlers: RefCell::new(Vec::new()),
            subscription: Cell::new(None),
        }))
    }

    pub fn source(&self) -> &ObservableSource {
        &self.0.source
    }

    pub fn property(&self) -> &PropertyRef {
        &self.0.property
    }

    pub fn value(&self) -> Value {
        self.0.property.value()
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        let ty = self.0.property.value_type();
        if !ty.accepts(&value) {
            return Err(Error::TypeMismatch {
                target: self.describe(),
                expected: ty.to_string(),
                value: value.describe(),
            });
        }
        self.0.property.set_value(value);
        Ok(())
    }

    pub fn data_type(&self) -> ValueType {
        self.0.property.value_type().clone()
    }

    pub fn target(&self) -> Option<ObjectRef> {
        Some(self.0.target.clone())
    }

    pub fn retarget(&self, new_target: &Value) -> Result<Self> {
        let incompatible = || Error::IncompatibleTarget { member: self.describe(), target: new_target.describe() };
        let Value::Object(obj) = new_target else {
            return Err(incompatible());
        };
        match &self.0.source {
            ObservableSource::Member(name) => Self::find(obj, name)?.ok_or_else(incompatible),
            ObservableSource::Attached { provider, name } => {
                Self::attached(obj, *provider, name).map_err(|_| incompatible())
            }
        }
    }

    pub fn attach(&self, handler: ChangeHandler) {
        self.0.handlers.borrow_mut().push(handler);
        if self.0.subscription.get().is_none() {
            let weak = Rc::downgrade(&self.0);
            let id = self.0.property.attach(Rc::new(move |_, _| {
                if let Some(state) = weak.upgrade() {
                    ObservableDescriptor(state).notify();
                }
            }));
            self.0.subscription.set(Some(id));
        }
    }

    pub fn detach(&self, handler: &ChangeHandler) {
        let now_empty = {
            let mut handlers = self.0.handlers.borrow_mut();
            if let Some(pos) = handlers.iter().position(|h| Rc::ptr_eq(h, handler)) {
                handlers.remove(pos);
            }
            handlers.is_empty()
        };
        if now_empty {
            if let Some(id) = self.0.subscription.take() {
                self.0.property.detach(id);
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.0.handlers.borrow().len()
    }

    fn notify(&self) {
        let handlers: Vec<ChangeHandler> = self.0.handlers.borrow().iter().cloned().collect();
        let me = DataDescriptor::Observable(self.clone());
        for handler in handlers {
            handler(&me);
        }
    }

    fn describe(&self) -> String {
        match &self.0.source {
            ObservableSource::Member(name) => format!("{}.{}", self.0.target.class().name(), name),
            ObservableSource::Attached { provider, name } => format!("({}.{})", provider.name(), name),
        }
    }
}

impl PartialEq for ObservableDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.target.ptr_eq(&other.0.target)
            && self.0.source == other.0.source
            && Rc::ptr_eq(&self.0.property, &other.0.property)
    }
}

impl fmt::Debug for ObservableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observable({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Broken, Grid, Person};

    fn counter() -> (Rc<Cell<usize>>, ChangeHandler) {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        (hits, Rc::new(move |_: &DataDescriptor| h.set(h.get() + 1)))
    }

    #[test]
    fn found_by_property_suffix() {
        let p = ObjectRef::new(Person::named("Ann"));
        let title = ObservableDescriptor::find(&p, "Title").unwrap().unwrap();
        assert_eq!(title.source(), &ObservableSource::Member("Title".into()));
        title.set_value("Dr".into()).unwrap();
        assert_eq!(p.with(|p: &Person| p.title.value()).unwrap(), Value::from("Dr"));
        assert!(ObservableDescriptor::find(&p, "Name").unwrap().is_none());
    }

    #[test]
    fn member_without_property_cell_is_an_error() {
        let b = ObjectRef::new(Broken);
        assert!(matches!(ObservableDescriptor::find(&b, "Value"), Err(Error::NotAnObservable { .. })));
    }

    #[test]
    fn subscribes_once_and_unsubscribes_on_last_detach() {
        let p = ObjectRef::new(Person::named("Ann"));
        let dd = ObservableDescriptor::find(&p, "Title").unwrap().unwrap();
        let property = Rc::clone(dd.property());
        let (hits_a, a) = counter();
        let (hits_b, b) = counter();
        dd.attach(Rc::clone(&a));
        dd.attach(Rc::clone(&b));
        assert_eq!(property.listener_count(), 1);
        dd.set_value("x".into()).unwrap();
        assert_eq!((hits_a.get(), hits_b.get()), (1, 1));
        dd.detach(&a);
        assert_eq!(property.listener_count(), 1);
        dd.set_value("y".into()).unwrap();
        assert_eq!((hits_a.get(), hits_b.get()), (1, 2));
        dd.detach(&b);
        assert_eq!(property.listener_count(), 0);
    }

    #[test]
    fn dropping_the_descriptor_releases_the_subscription() {
        let p = ObjectRef::new(Person::named("Ann"));
        let property = p.with(|p: &Person| Rc::clone(&p.title)).unwrap();
        {
            let dd = ObservableDescriptor::find(&p, "Title").unwrap().unwrap();
            dd.attach(Rc::new(|_: &DataDescriptor| {}));
            assert_eq!(property.listener_count(), 1);
        }
        assert_eq!(property.listener_count(), 0);
    }

    #[test]
    fn attached_properties() {
        let p = ObjectRef::new(Person::named("Ann"));
        let row = ObservableDescriptor::attached(&p, Grid::class_def(), "Row").unwrap();
        assert_eq!(row.value(), Value::Int(0));
        row.set_value(Value::Int(2)).unwrap();
        let again = ObservableDescriptor::attached(&p, Grid::class_def(), "Row").unwrap();
        assert_eq!(again.value(), Value::Int(2));
        assert_eq!(row, again);

        let q = ObjectRef::new(Person::named("Bob"));
        let moved = row.retarget(&Value::Object(q)).unwrap();
        assert_eq!(moved.value(), Value::Int(0));
        assert!(ObservableDescriptor::attached(&p, Grid::class_def(), "Span").is_err());
    }
}
