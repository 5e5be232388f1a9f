//! Object builder and data-binding engine for **Lumen markup** (`.xaml`).
//!
//! A document is parsed into a live object graph of registered types.
//! Members are reached through [`DataDescriptor`]s, addressed by compiled
//! [`PathExpression`]s, and kept in sync by bindings.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`value`] | `Value`, `ValueType`, `EnumType` |
//! | [`object`] | `Object`, `ObjectRef`, `Class`, `ClassBuilder`, `NameScope` |
//! | [`property`] | `Property`, the observable value cell |
//! | [`convert`] | `TypeConverter` |
//! | [`descriptor`] | `DataDescriptor` and its variants |
//! | [`reflection`] | member lookup, overload resolution, collection merging |
//! | [`path`] | `PathExpression`, `PathSegment`, `BoundMethod` |
//! | [`namespace`] | `NamespaceHandler`, `TypeRegistry`, built-in handlers |
//! | [`markup`] | `x:Null`, `x:Type`, `Binding`, `RelativeSource`, `ValueConverter` |
//! | [`parser`] | `Parser`, `ParserConfig`, `ParserContext` |
//! | [`error`] | `Error`, `ErrorClass` |
//!
//! # Quick start
//!
//! ```rust
//! use lumen_xaml::{Parser, ParserConfig, Value};
//!
//! let src = r#"<sys:Int32 xmlns:sys="clr-namespace:System">42</sys:Int32>"#;
//! let mut parser = Parser::new(src, ParserConfig::new()).unwrap();
//! assert_eq!(parser.parse().unwrap(), Value::Int(42));
//! ```

pub mod convert;
pub mod descriptor;
pub mod error;
pub mod markup;
pub mod namespace;
pub mod object;
pub mod parser;
pub mod path;
pub mod property;
pub mod reflection;
pub mod value;

#[cfg(test)]
mod testing;

pub use convert::{CustomConverter, TypeConverter};
pub use descriptor::{ChangeHandler, DataDescriptor};
pub use error::{Error, ErrorClass, Result};
pub use markup::{
    register_extensions, BindingExtension, BindingMode, MarkupExtension, RelativeSource, RelativeSourceMode,
    UpdateSourceTrigger, ValueConverter,
};
pub use namespace::{NamespaceContext, NamespaceHandler, NamespaceHandlerRef, NamespaceResolver, TypeRegistry};
pub use object::{Class, ClassBuilder, EventSignature, Handler, NameScope, Object, ObjectRef, Param};
pub use parser::{EventHandlerResolver, ImportResolver, Parser, ParserConfig, ParserContext};
pub use path::{BoundMethod, PathExpression, PathSegment};
pub use property::{Property, PropertyRef};
pub use value::{EnumType, Value, ValueType};

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use std::rc::Rc;

    use crate::descriptor::IndexerDescriptor;
    use crate::namespace::NamespaceScope;
    use crate::testing::{test_registry, Color, ContentElement, Lookup, Person, Robot, MOOD};

    const X: &str = r#"xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml""#;

    fn context() -> NamespaceResolver {
        let mut scope = NamespaceScope::new();
        scope.declare("", "clr-namespace:Testing");
        let types = Rc::new(test_registry());
        let converter = TypeConverter::new().with_types(Rc::clone(&types));
        NamespaceResolver::new(scope, types, converter)
    }

    fn evaluate(path: &str, start: Value) -> DataDescriptor {
        PathExpression::compile(&context(), path)
            .unwrap()
            .evaluate(&DataDescriptor::value_of(start))
            .unwrap()
            .unwrap()
    }

    fn parse(src: &str) -> Result<Value> {
        let config = ParserConfig::new().with_types(test_registry()).with_namespace("", "clr-namespace:Testing");
        Parser::new(src, config)?.parse()
    }

    #[test]
    fn a_plain_property() {
        let dd = evaluate("Name", Value::object(Person::named("Foo")));
        assert_eq!(dd.value().unwrap(), Value::from("Foo"));
    }

    #[test]
    fn b_list_indexer() {
        let person = Person::named("Ann");
        person.items.borrow_mut().extend([Value::Int(10), Value::Int(20), Value::Int(30)]);
        let dd = evaluate("Items[1]", Value::object(person));
        assert_eq!(dd.value().unwrap(), Value::Int(20));
    }

    #[test]
    fn c_content_property_converts_text() {
        let root = parse(r#"<Element xmlns:sys="clr-namespace:System"><sys:Int32>42</sys:Int32></Element>"#).unwrap();
        let content = root.as_object().and_then(|o| o.with(|e: &ContentElement| e.content.clone()));
        assert_eq!(content, Some(Value::Int(42)));
    }

    #[test]
    fn d_duplicate_keys() {
        let explicit = parse(&format!(r#"<Element {X}><Person x:Key="a"/><Person x:Key="a"/></Element>"#));
        assert!(matches!(explicit.unwrap_err().root_cause(), Error::DuplicateKey(k) if k == "a"));
        let implicit = parse(&format!(r#"<Element {X}><Person x:Key="a"/><Item Key="a"/></Element>"#));
        assert!(matches!(implicit.unwrap_err().root_cause(), Error::DuplicateKey(k) if k == "a"));
    }

    #[test]
    fn e_negation() {
        let mut person = Person::named("Ann");
        person.enabled = true;
        let person = ObjectRef::new(person);
        let dd = evaluate("!IsEnabled", Value::Object(person.clone()));
        assert_eq!(dd.value().unwrap(), Value::Bool(false));
        dd.set_value(Value::Bool(true)).unwrap();
        assert_eq!(person.with(|p: &Person| p.enabled), Some(false));
    }

    #[test]
    fn retarget_addresses_the_same_member() {
        let (a, b) = (Value::object(Person::named("A")), Value::object(Person::named("B")));
        let moved = evaluate("Name", a).retarget(&b).unwrap();
        assert_eq!(moved.value().unwrap(), Value::from("B"));
        assert!(moved.retarget(&Value::object(Robot::default())).is_err());
    }

    #[test]
    fn conversions_are_assignable() {
        let conv = TypeConverter::new().with_types(Rc::new(test_registry()));
        let cases = [
            (Value::from("12"), ValueType::Int),
            (Value::from("Sad"), ValueType::Enum(&MOOD)),
            (Value::from("#102030"), ValueType::Object(Color::class_def())),
            (Value::list([Value::from("1")]), ValueType::list_of(ValueType::Float)),
            (Value::Int(3), ValueType::String),
            (Value::from("Person"), ValueType::Type),
        ];
        for (value, target) in cases {
            let converted = conv.convert(&value, &target).unwrap();
            assert!(target.accepts(&converted), "{:?} -> {}", value, target);
        }
    }

    #[test]
    fn compiled_paths_round_trip() {
        for path in ["Friend.Name", "Items[0]", "!IsEnabled", "(Grid.Column)", "[a, 2].Name"] {
            let compiled = PathExpression::compile(&context(), path).unwrap();
            let again = PathExpression::compile(&context(), &compiled.to_string()).unwrap();
            assert_eq!(compiled.segments(), again.segments());
        }
    }

    #[test]
    fn evaluation_is_repeatable_on_other_types() {
        let path = PathExpression::compile(&context(), "Name").unwrap();
        let person = DataDescriptor::value_of(Value::object(Person::named("P")));
        assert_eq!(path.evaluate(&person).unwrap(), path.evaluate(&person).unwrap());
        let robot = DataDescriptor::value_of(Value::object(Robot::default()));
        assert!(path.evaluate(&robot).unwrap().is_none());
    }

    #[test]
    fn indexer_construction_rejects_incompatible_indices() {
        let lookup = Value::object(Lookup::default());
        assert!(IndexerDescriptor::new(&lookup, vec!["a".into()]).is_ok());
        assert!(IndexerDescriptor::new(&lookup, vec![Value::Null, Value::Int(1), Value::Int(2)]).is_err());
        assert!(IndexerDescriptor::new(&Value::list([]), vec![Value::from("x")]).is_err());
    }
}
