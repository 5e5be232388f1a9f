use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::object::{ObjectRef, Param, Signature};
use crate::reflection;
use crate::convert::TypeConverter;
use crate::value::{DictRef, ListRef, Value, ValueType};

/// What an indexer descriptor indexes into.
#[derive(Clone)]
pub enum IndexTarget {
    List(ListRef),
    Dict(DictRef),
    Object(ObjectRef),
}

impl IndexTarget {
    fn same(&self, other: &IndexTarget) -> bool {
        match (self, other) {
            (IndexTarget::List(a), IndexTarget::List(b)) => Rc::ptr_eq(a, b),
            (IndexTarget::Dict(a), IndexTarget::Dict(b)) => Rc::ptr_eq(a, b),
            (IndexTarget::Object(a), IndexTarget::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    fn value(&self) -> Value {
        match self {
            IndexTarget::List(l) => Value::List(Rc::clone(l)),
            IndexTarget::Dict(d) => Value::Dict(Rc::clone(d)),
            IndexTarget::Object(o) => Value::Object(o.clone()),
        }
    }
}

/// One slot of a list, dictionary or registered indexer.
#[derive(Clone)]
pub struct IndexerDescriptor {
    target: IndexTarget,
    indices: Vec<Value>,
}

impl IndexerDescriptor {
    /// Indexer parameters of `value`: `[Int]` for lists, `[Any]` for
    /// dictionaries, the registered indexer for objects.
    pub fn indexer_params(value: &Value) -> Option<Vec<Param>> {
        match value {
            Value::List(_) => Some(vec![Param::required(ValueType::Int)]),
            Value::Dict(_) => Some(vec![Param::required(ValueType::Any)]),
            Value::Object(o) => o.class().indexer().map(|i| i.params().to_vec()),
            _ => None,
        }
    }

    /// Fails unless `indices` fit the target's indexer by count and type.
    pub fn new(target: &Value, indices: Vec<Value>) -> Result<Self> {
        let incompatible = || Error::IncompatibleIndices {
            indices: join(&indices),
            target: target.describe(),
        };
        let params = Self::indexer_params(target).ok_or_else(incompatible)?;
        let fits = reflection::consume_parameters(&indices, &params, false, &TypeConverter::new())?
            .is_some_and(|converted| converted == indices);
        if !fits {
            return Err(incompatible());
        }
        let target = match target {
            Value::List(l) => IndexTarget::List(Rc::clone(l)),
            Value::Dict(d) => IndexTarget::Dict(Rc::clone(d)),
            Value::Object(o) => IndexTarget::Object(o.clone()),
            _ => return Err(incompatible()),
        };
        Ok(Self { target, indices })
    }

    pub fn indices(&self) -> &[Value] {
        &self.indices
    }

    fn list_index(&self, count: usize) -> Result<usize> {
        let index = self.indices.first().and_then(Value::as_int).unwrap_or(-1);
        usize::try_from(index)
            .ok()
            .filter(|i| *i < count)
            .ok_or(Error::IndexOutOfRange { index, count })
    }

    pub fn supports_read(&self) -> bool {
        true
    }

    pub fn supports_write(&self) -> bool {
        match &self.target {
            IndexTarget::Object(o) => o.class().indexer().is_some_and(|i| i.can_write()),
            _ => true,
        }
    }

    pub fn value(&self) -> Result<Value> {
        match self.target.value() {
            Value::List(list) => {
                let list = list.borrow();
                let index = self.list_index(list.len())?;
                Ok(list[index].clone())
            }
            Value::Dict(dict) => dict.borrow().get(&self.indices[0]).cloned().ok_or_else(|| {
                Error::access("get", format!("[{}]", self.indices[0]), "Dictionary", anyhow::anyhow!("key not found"))
            }),
            Value::Object(obj) => {
                let indexer = obj.class().indexer().ok_or_else(|| self.no_indexer(&obj))?;
                let target = obj.borrow();
                indexer
                    .get(&*target, &self.indices)
                    .map_err(|e| Error::access("get", format!("[{}]", join(&self.indices)), obj.class().name(), e))
            }
            _ => Ok(Value::Null),
        }
    }

    pub fn set_value(&self, value: Value) -> Result<()> {
        match self.target.value() {
            Value::List(list) => {
                let mut list = list.borrow_mut();
                let index = self.list_index(list.len())?;
                list[index] = value;
                Ok(())
            }
            Value::Dict(dict) => {
                dict.borrow_mut().insert(self.indices[0].clone(), value);
                Ok(())
            }
            Value::Object(obj) => {
                let indexer = obj.class().indexer().ok_or_else(|| self.no_indexer(&obj))?;
                if !indexer.value_type().accepts(&value) {
                    return Err(Error::TypeMismatch {
                        target: format!("{}[{}]", obj.class().name(), join(&self.indices)),
                        expected: indexer.value_type().to_string(),
                        value: value.describe(),
                    });
                }
                let mut target = obj.borrow_mut();
                indexer
                    .set(&mut *target, &self.indices, value)
                    .map_err(|e| Error::access("set", format!("[{}]", join(&self.indices)), obj.class().name(), e))
            }
            _ => Ok(()),
        }
    }

    pub fn data_type(&self) -> ValueType {
        match &self.target {
            IndexTarget::Object(o) => o.class().indexer().map_or(ValueType::Any, |i| i.value_type().clone()),
            _ => ValueType::Any,
        }
    }

    pub fn target_object(&self) -> Option<Value> {
        Some(self.target.value())
    }

    pub fn retarget(&self, new_target: &Value) -> Result<Self> {
        Self::new(new_target, self.indices.clone()).map_err(|_| Error::IncompatibleTarget {
            member: format!("[{}]", join(&self.indices)),
            target: new_target.describe(),
        })
    }

    fn no_indexer(&self, obj: &crate::object::ObjectRef) -> Error {
        Error::NotSupported(format!("'{}' has no indexer", obj.class().name()))
    }
}

fn join(indices: &[Value]) -> String {
    indices.iter().map(Value::to_string).collect::<Vec<_>>().join(", ")
}

impl PartialEq for IndexerDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.target.same(&other.target) && self.indices == other.indices
    }
}

impl fmt::Debug for IndexerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Indexer([{}])", join(&self.indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Lookup;

    #[test]
    fn list_slots() {
        let list = Value::list([Value::Int(10), Value::Int(20), Value::Int(30)]);
        let dd = IndexerDescriptor::new(&list, vec![Value::Int(1)]).unwrap();
        assert_eq!(dd.value().unwrap(), Value::Int(20));
        dd.set_value(Value::Int(21)).unwrap();
        assert_eq!(list.to_string(), "[10, 21, 30]");
        let past = IndexerDescriptor::new(&list, vec![Value::Int(3)]).unwrap();
        assert!(matches!(past.value(), Err(Error::IndexOutOfRange { index: 3, count: 3 })));
    }

    #[test]
    fn slot_keeps_a_temporary_list_alive() {
        let dd = IndexerDescriptor::new(&Value::list([Value::from("a"), Value::from("b")]), vec![Value::Int(1)]).unwrap();
        assert_eq!(dd.value().unwrap(), Value::from("b"));
        assert_eq!(dd.target_object().map(|t| t.to_string()).as_deref(), Some("[a, b]"));
    }

    #[test]
    fn construction_checks_indices() {
        let list = Value::list([]);
        assert!(matches!(
            IndexerDescriptor::new(&list, vec!["a".into()]),
            Err(Error::IncompatibleIndices { .. })
        ));
        assert!(IndexerDescriptor::new(&list, vec![Value::Int(0), Value::Int(1)]).is_err());
        assert!(IndexerDescriptor::new(&Value::Int(1), vec![Value::Int(0)]).is_err());
    }

    #[test]
    fn optional_trailing_parameter() {
        let lookup = Value::object(Lookup::default());
        let one = IndexerDescriptor::new(&lookup, vec!["b".into()]).unwrap();
        let two = IndexerDescriptor::new(&lookup, vec!["b".into(), Value::Int(10)]).unwrap();
        assert_eq!(one.value().unwrap(), Value::Int(2));
        assert_eq!(two.value().unwrap(), Value::Int(20));
        assert!(IndexerDescriptor::new(&lookup, vec![]).is_err());
        assert!(IndexerDescriptor::new(&lookup, vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn dictionary_slots_and_retarget() {
        let a = Value::dict([("k".into(), Value::Int(1))]);
        let b = Value::dict([("k".into(), Value::Int(2))]);
        let dd = IndexerDescriptor::new(&a, vec!["k".into()]).unwrap();
        assert_eq!(dd.value().unwrap(), Value::Int(1));
        let moved = dd.retarget(&b).unwrap();
        assert_eq!(moved.value().unwrap(), Value::Int(2));
        assert_ne!(dd, moved);
        assert!(matches!(dd.retarget(&Value::Int(0)), Err(Error::IncompatibleTarget { .. })));
    }
}
