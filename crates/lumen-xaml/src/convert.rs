use std::fmt;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::namespace::registry::{primitive_type, TypeRegistry};
use crate::reflection;
use crate::value::{Value, ValueType};

/// Session-supplied conversion hook, consulted before the built-in rules.
pub type CustomConverter = Rc<dyn Fn(&Value, &ValueType) -> Option<Value>>;

/// Converts values between types.
///
/// Conversion never fails with an error: `None` means "not convertible" and
/// callers decide whether that is fatal ([`TypeConverter::convert_or_err`]).
#[derive(Clone, Default)]
pub struct TypeConverter {
    custom: Option<CustomConverter>,
    types: Option<Rc<TypeRegistry>>,
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom(mut self, custom: CustomConverter) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Registry used to resolve type names for `Type` targets.
    pub fn with_types(mut self, types: Rc<TypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn convert(&self, value: &Value, target: &ValueType) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        if target.accepts(value) {
            return Some(value.clone());
        }
        if let Some(custom) = &self.custom {
            if let Some(converted) = custom(value, target) {
                return Some(converted);
            }
        }
        self.string_to_type(value, target)
            .or_else(|| string_to_enum(value, target))
            .or_else(|| self.to_collection(value, target))
            .or_else(|| self.unwrap_single(value, target))
            .or_else(|| self.primitive(value, target))
            .or_else(|| to_string(value, target))
    }

    pub fn convert_or_err(&self, value: &Value, target: &ValueType) -> Result<Value> {
        self.convert(value, target).ok_or_else(|| Error::conversion(value, target))
    }

    // ── rules ─────────────────────────────────────────────────────────────

    fn string_to_type(&self, value: &Value, target: &ValueType) -> Option<Value> {
        if *target != ValueType::Type {
            return None;
        }
        let name = value.as_str()?.trim();
        primitive_type(name)
            .or_else(|| self.types.as_ref()?.find_type(name))
            .map(Value::Type)
    }

    fn to_collection(&self, value: &Value, target: &ValueType) -> Option<Value> {
        match target {
            ValueType::List(entry) | ValueType::Enumerable(entry) => {
                let items = reflection::collection_items(value)?;
                let converted = items
                    .iter()
                    .map(|item| self.convert(item, entry))
                    .collect::<Option<Vec<_>>>()?;
                Some(Value::list(converted))
            }
            ValueType::Dict(key, val) => {
                let entries = reflection::dictionary_entries(value)?;
                let converted = entries
                    .iter()
                    .map(|(k, v)| Some((self.convert(k, key)?, self.convert(v, val)?)))
                    .collect::<Option<Vec<_>>>()?;
                Some(Value::dict(converted))
            }
            ValueType::Object(class) => {
                // Collection classes built from a sequence: default-construct, then add.
                let list = class.list()?;
                let items = reflection::collection_items(value)?;
                let ctor = class.constructors().iter().find(|c| {
                    reflection::mandatory_count(crate::object::Signature::params(*c)) == 0
                })?;
                let converted = items
                    .iter()
                    .map(|item| self.convert(item, list.entry_type()))
                    .collect::<Option<Vec<_>>>()?;
                let obj = ctor.construct(&[]).ok()?;
                {
                    let mut target = obj.borrow_mut();
                    for item in converted {
                        list.add(&mut *target, item).ok()?;
                    }
                }
                Some(Value::Object(obj))
            }
            _ => None,
        }
    }

    fn unwrap_single(&self, value: &Value, target: &ValueType) -> Option<Value> {
        if reflection::find_enumerable_type(target).is_some() {
            return None;
        }
        let single = match value {
            Value::List(items) => {
                let items = items.borrow();
                if items.len() != 1 {
                    return None;
                }
                items[0].clone()
            }
            _ => return None,
        };
        self.convert(&single, target)
    }

    fn primitive(&self, value: &Value, target: &ValueType) -> Option<Value> {
        let direct = match (value, target) {
            (Value::Str(s), ValueType::Bool) => parse_bool(s.trim()).map(Value::Bool),
            (Value::Str(s), ValueType::Int) => s.trim().parse::<i64>().ok().map(Value::Int),
            (Value::Str(s), ValueType::Float) => s.trim().parse::<f64>().ok().map(Value::Float),
            (Value::Int(i), ValueType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), ValueType::Int) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some(Value::Int(*f as i64))
            }
            _ => None,
        };
        if direct.is_some() {
            return direct;
        }
        // Ask the target type first, then the source's own type.
        if let ValueType::Object(class) = target {
            if let Some(converted) = class.convert_from(value) {
                return Some(converted);
            }
        }
        if let Value::Object(obj) = value {
            let source = obj.try_borrow()?;
            return obj.class().convert_to(&*source, target).filter(|v| target.accepts(v));
        }
        None
    }
}

fn string_to_enum(value: &Value, target: &ValueType) -> Option<Value> {
    match (value, target) {
        (Value::Str(s), ValueType::Enum(ty)) => ty.value(s.trim()),
        _ => None,
    }
}

fn to_string(value: &Value, target: &ValueType) -> Option<Value> {
    (*target == ValueType::String).then(|| Value::Str(value.to_string()))
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl fmt::Debug for TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverter")
            .field("custom", &self.custom.is_some())
            .field("types", &self.types.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_registry, Color, Person, Tags, MOOD};

    fn conv() -> TypeConverter {
        TypeConverter::new().with_types(Rc::new(test_registry()))
    }

    fn ok(value: Value, target: ValueType) -> Value {
        let converted = conv().convert(&value, &target).unwrap();
        assert!(target.accepts(&converted), "{:?} not assignable to {}", converted, target);
        converted
    }

    fn err(value: Value, target: ValueType) {
        assert!(conv().convert(&value, &target).is_none());
    }

    #[test] fn null_and_assignable_pass_through() {
        assert_eq!(ok(Value::Null, ValueType::Int), Value::Null);
        let list = Value::list([Value::Int(1)]);
        assert_eq!(ok(list.clone(), ValueType::Any), list);
    }
    #[test] fn strings_to_primitives() {
        assert_eq!(ok(" 42 ".into(), ValueType::Int), Value::Int(42));
        assert_eq!(ok("2.5".into(), ValueType::Float), Value::Float(2.5));
        assert_eq!(ok("True".into(), ValueType::Bool), Value::Bool(true));
        err("yes".into(), ValueType::Bool);
        err("4x".into(), ValueType::Int);
    }
    #[test] fn numbers() {
        assert_eq!(ok(Value::Int(3), ValueType::Float), Value::Float(3.0));
        assert_eq!(ok(Value::Float(3.0), ValueType::Int), Value::Int(3));
        err(Value::Float(3.5), ValueType::Int);
    }
    #[test] fn type_names() {
        assert_eq!(ok("Int32".into(), ValueType::Type), Value::Type(ValueType::Int));
        assert_eq!(ok("Person".into(), ValueType::Type), Value::Type(ValueType::Object(Person::class_def())));
        err("Nope".into(), ValueType::Type);
    }
    #[test] fn enums() {
        assert_eq!(ok("Happy".into(), ValueType::Enum(&MOOD)).to_string(), "Happy");
        err("happy".into(), ValueType::Enum(&MOOD));
    }
    #[test] fn collections() {
        let converted = ok(Value::list(["1".into(), "2".into()]), ValueType::list_of(ValueType::Int));
        assert_eq!(converted.to_string(), "[1, 2]");
        let scalar = ok("7".into(), ValueType::list_of(ValueType::Int));
        assert_eq!(scalar.to_string(), "[7]");
        err(Value::list(["1".into(), "x".into()]), ValueType::list_of(ValueType::Int));
        let dict = ok(Value::dict([("a".into(), "1".into())]), ValueType::dict_of(ValueType::String, ValueType::Int));
        assert_eq!(dict.to_string(), "{a: 1}");
    }
    #[test] fn collection_class_target() {
        let tags = ok(Value::list(["a".into(), "b".into()]), ValueType::Object(Tags::class_def()));
        let names = tags.as_object().unwrap().with(|t: &Tags| t.items.clone()).unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }
    #[test] fn single_element_unwrap() {
        assert_eq!(ok(Value::list(["5".into()]), ValueType::Int), Value::Int(5));
        err(Value::list(["5".into(), "6".into()]), ValueType::Int);
    }
    #[test] fn class_conversions() {
        let color = ok("#ff0000".into(), ValueType::Object(Color::class_def()));
        assert_eq!(color.as_object().unwrap().with(|c: &Color| c.rgb), Some(0xff0000));
        assert_eq!(ok(color, ValueType::Int), Value::Int(0xff0000));
    }
    #[test] fn anything_to_string() {
        assert_eq!(ok(Value::Int(5), ValueType::String), Value::from("5"));
        assert_eq!(ok(Value::Bool(false), ValueType::String), Value::from("false"));
    }
    #[test] fn custom_converter_wins() {
        let conv = conv().with_custom(Rc::new(|v, t| match (v, t) {
            (Value::Str(s), ValueType::Int) if s == "many" => Some(Value::Int(1000)),
            _ => None,
        }));
        assert_eq!(conv.convert(&"many".into(), &ValueType::Int), Some(Value::Int(1000)));
        assert_eq!(conv.convert(&"3".into(), &ValueType::Int), Some(Value::Int(3)));
    }
    #[test] fn convert_or_err_names_target() {
        let err = conv().convert_or_err(&"x".into(), &ValueType::Int).unwrap_err();
        assert!(matches!(err, Error::Conversion { ref target, .. } if target == "Int64"));
    }
}
