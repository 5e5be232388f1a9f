use std::fmt;

use crate::error::{Error, Result};
use crate::object::{Member, MemberKind, ObjectRef};
use crate::value::{Value, ValueType};

/// Shared plumbing of the property and field accessors. Holds its target,
/// so a descriptor returned from a path stays usable on its own.
#[derive(Clone)]
struct MemberAccess {
    target: ObjectRef,
    member: &'static Member,
    indices: Vec<Value>,
}

impl MemberAccess {
    fn find(obj: &ObjectRef, name: &str, kind: MemberKind) -> Option<Self> {
        let member = obj.class().member(name).filter(|m| m.kind() == kind)?;
        Some(Self { target: obj.clone(), member, indices: Vec::new() })
    }

    fn value(&self) -> Result<Value> {
        let target = &self.target;
        let obj = target.borrow();
        self.member
            .get(&*obj, &self.indices)
            .map_err(|e| Error::access("get", self.member.name(), target.class().name(), e))
    }

    fn set_value(&self, value: Value) -> Result<()> {
        let target = &self.target;
        if !self.member.value_type().accepts(&value) {
            return Err(Error::TypeMismatch {
                target: format!("{}.{}", target.class().name(), self.member.name()),
                expected: self.member.value_type().to_string(),
                value: value.describe(),
            });
        }
        let mut obj = target.borrow_mut();
        self.member
            .set(&mut *obj, &self.indices, value)
            .map_err(|e| Error::access("set", self.member.name(), target.class().name(), e))
    }

    fn retarget(&self, new_target: &Value, kind: MemberKind) -> Result<Self> {
        let incompatible = || Error::IncompatibleTarget {
            member: self.member.name().to_string(),
            target: new_target.describe(),
        };
        let Value::Object(obj) = new_target else {
            return Err(incompatible());
        };
        let mut moved = Self::find(obj, self.member.name(), kind).ok_or_else(incompatible)?;
        moved.indices = self.indices.clone();
        Ok(moved)
    }

    fn same_location(&self, other: &Self) -> bool {
        self.target.ptr_eq(&other.target)
            && std::ptr::eq(self.member, other.member)
            && self.indices == other.indices
    }
}

impl fmt::Debug for MemberAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.target.class().name(), self.member.name())?;
        if !self.indices.is_empty() {
            write!(f, "{:?}", self.indices)?;
        }
        Ok(())
    }
}

// ── SimpleProperty ────────────────────────────────────────────────────────

/// A registered property, optionally with stored index arguments.
#[derive(Clone)]
pub struct SimplePropertyDescriptor(MemberAccess);

impl SimplePropertyDescriptor {
    pub fn find(obj: &ObjectRef, name: &str) -> Option<Self> {
        MemberAccess::find(obj, name, MemberKind::Property).map(Self)
    }

    pub fn member(&self) -> &'static Member {
        self.0.member
    }

    /// The same property with index arguments (indexed properties).
    pub fn with_indices(&self, indices: Vec<Value>) -> Self {
        let mut access = self.0.clone();
        access.indices = indices;
        Self(access)
    }

    pub fn indices(&self) -> &[Value] {
        &self.0.indices
    }

    pub fn supports_read(&self) -> bool {
        self.0.member.can_read()
    }

    pub fn supports_write(&self) -> bool {
        self.0.member.can_write()
    }

    pub fn value(&self) -> Result<Value> {
        self.0.value()
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        self.0.set_value(value)
    }

    pub fn data_type(&self) -> ValueType {
        self.0.member.value_type().clone()
    }

    pub fn target(&self) -> Option<ObjectRef> {
        Some(self.0.target.clone())
    }

    pub fn retarget(&self, new_target: &Value) -> Result<Self> {
        self.0.retarget(new_target, MemberKind::Property).map(Self)
    }
}

impl PartialEq for SimplePropertyDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_location(&other.0)
    }
}

impl fmt::Debug for SimplePropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimpleProperty({:?})", self.0)
    }
}

// ── Field ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct FieldDescriptor(MemberAccess);

impl FieldDescriptor {
    pub fn find(obj: &ObjectRef, name: &str) -> Option<Self> {
        MemberAccess::find(obj, name, MemberKind::Field).map(Self)
    }

    pub fn member(&self) -> &'static Member {
        self.0.member
    }

    pub fn value(&self) -> Result<Value> {
        self.0.value()
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        self.0.set_value(value)
    }

    pub fn data_type(&self) -> ValueType {
        self.0.member.value_type().clone()
    }

    pub fn target(&self) -> Option<ObjectRef> {
        Some(self.0.target.clone())
    }

    pub fn retarget(&self, new_target: &Value) -> Result<Self> {
        self.0.retarget(new_target, MemberKind::Field).map(Self)
    }
}

impl PartialEq for FieldDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_location(&other.0)
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Person, Sheet};

    #[test]
    fn property_read_write() {
        let p = ObjectRef::new(Person::named("Ann"));
        let dd = SimplePropertyDescriptor::find(&p, "Name").unwrap();
        assert_eq!(dd.value().unwrap(), Value::from("Ann"));
        dd.set_value("Bob".into()).unwrap();
        assert_eq!(p.with(|p: &Person| p.name.clone()).unwrap(), "Bob");
        assert_eq!(dd.data_type(), ValueType::String);
    }

    #[test]
    fn descriptor_outlives_other_handles() {
        let dd = SimplePropertyDescriptor::find(&ObjectRef::new(Person::named("Zoe")), "Name").unwrap();
        assert_eq!(dd.value().unwrap(), Value::from("Zoe"));
        dd.set_value("Zed".into()).unwrap();
        assert_eq!(dd.value().unwrap(), Value::from("Zed"));
    }

    #[test]
    fn field_is_not_a_property() {
        let p = ObjectRef::new(Person::named("Ann"));
        assert!(SimplePropertyDescriptor::find(&p, "Age").is_none());
        let age = FieldDescriptor::find(&p, "Age").unwrap();
        age.set_value(Value::Int(41)).unwrap();
        assert_eq!(age.value().unwrap(), Value::Int(41));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let p = ObjectRef::new(Person::named("Ann"));
        let age = FieldDescriptor::find(&p, "Age").unwrap();
        assert!(matches!(age.set_value("old".into()), Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn read_only_and_failing_accessors() {
        let p = ObjectRef::new(Person::named("Ann"));
        let id = SimplePropertyDescriptor::find(&p, "Id").unwrap();
        assert!(!id.supports_write());
        assert!(matches!(id.set_value(Value::Int(1)), Err(Error::Access { action: "set", .. })));

        let secret = SimplePropertyDescriptor::find(&p, "Secret").unwrap();
        match secret.value() {
            Err(Error::Access { member, target, .. }) => {
                assert_eq!(member, "Secret");
                assert_eq!(target, "Person");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn indexed_property() {
        let sheet = ObjectRef::new(Sheet::default());
        let cell = SimplePropertyDescriptor::find(&sheet, "Cell").unwrap();
        let at = cell.with_indices(vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(at.value().unwrap(), Value::Int(6));
        assert_ne!(cell, at);
    }
}
