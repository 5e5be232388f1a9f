use std::rc::Rc;

use log::debug;

use crate::convert::TypeConverter;
use crate::descriptor::{DataDescriptor, ObservableDescriptor};
use crate::error::{Error, Result};
use crate::namespace::registry::{TypeEntry, TypeRegistry};
use crate::namespace::{NamespaceHandler, CLR_NAMESPACE_PREFIX};
use crate::object::Class;
use crate::reflection;
use crate::value::{Value, ValueType};

/// Handler for `clr-namespace:Name[;assembly=Asm]` imports, backed by one
/// namespace of the [`TypeRegistry`].
#[derive(Debug)]
pub struct DefaultNamespaceHandler {
    namespace: String,
    types: Rc<TypeRegistry>,
    converter: TypeConverter,
}

impl DefaultNamespaceHandler {
    pub fn from_uri(uri: &str, types: Rc<TypeRegistry>, converter: TypeConverter) -> Result<Self> {
        let spec = uri
            .strip_prefix(CLR_NAMESPACE_PREFIX)
            .ok_or_else(|| Error::NamespaceNotSupported(uri.to_string()))?;
        let mut parts = spec.split(';').map(str::trim);
        let namespace = parts.next().unwrap_or_default().to_string();
        let mut assembly = None;
        for part in parts.filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some(("assembly", name)) => assembly = Some(name.trim().to_string()),
                _ => return Err(Error::NamespaceNotSupported(uri.to_string())),
            }
        }
        if !types.has_namespace(&namespace) {
            return Err(Error::NamespaceNotSupported(uri.to_string()));
        }
        if let (Some(wanted), Some(actual)) = (&assembly, types.assembly(&namespace)) {
            if wanted != actual {
                return Err(Error::NamespaceNotSupported(uri.to_string()));
            }
        }
        debug!("imported code namespace '{}' from '{}'", namespace, uri);
        Ok(Self { namespace, types, converter })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn entry(&self, type_name: &str) -> Result<&TypeEntry> {
        self.types.lookup(&self.namespace, type_name).ok_or_else(|| Error::TypeNotFound {
            name: type_name.to_string(),
            namespace: self.namespace.clone(),
        })
    }

    fn provider(&self, provider: &str) -> Result<&'static Class> {
        match self.entry(provider)? {
            TypeEntry::Class(class) => Ok(*class),
            _ => Err(Error::NotSupported(format!("'{}' cannot provide attached properties", provider))),
        }
    }
}

/// Value of a primitive or enum element with no content.
fn default_value(ty: &ValueType) -> Value {
    match ty {
        ValueType::Bool => Value::Bool(false),
        ValueType::Int => Value::Int(0),
        ValueType::Float => Value::Float(0.0),
        ValueType::String => Value::Str(String::new()),
        ValueType::Enum(e) => {
            let e = *e;
            e.members().first().and_then(|m| e.value(m)).unwrap_or_default()
        }
        _ => Value::Null,
    }
}

impl NamespaceHandler for DefaultNamespaceHandler {
    fn resolve_type(&self, type_name: &str, _namespace_uri: &str) -> Result<ValueType> {
        self.entry(type_name).map(TypeEntry::value_type)
    }

    fn instantiate_element(&self, type_name: &str, _namespace_uri: &str, params: &[Value]) -> Result<Value> {
        let class = match self.entry(type_name)? {
            TypeEntry::Class(class) => *class,
            other => {
                let ty = other.value_type();
                return match params {
                    [] => Ok(default_value(&ty)),
                    [single] => self.converter.convert_or_err(single, &ty),
                    _ => Err(Error::NotSupported(format!(
                        "'{}' takes at most one argument, got {}",
                        type_name,
                        params.len()
                    ))),
                };
            }
        };
        let (ctor, args) = reflection::find_best_member(type_name, class.constructors(), params, &self.converter)?
            .ok_or_else(|| {
                Error::NotSupported(format!("no constructor of '{}' takes {} argument(s)", type_name, params.len()))
            })?;
        ctor.construct(&args)
            .map(Value::Object)
            .map_err(|e| Error::access("construct", type_name, class.name(), e))
    }

    fn has_attached_property(
        &self,
        provider: &str,
        property: &str,
        _target: &Value,
        _namespace_uri: &str,
    ) -> Result<bool> {
        Ok(match self.types.lookup(&self.namespace, provider) {
            Some(TypeEntry::Class(class)) => class.attached_property(property).is_some(),
            _ => false,
        })
    }

    fn get_attached_property(
        &self,
        provider: &str,
        property: &str,
        target: &Value,
        _namespace_uri: &str,
    ) -> Result<DataDescriptor> {
        let class = self.provider(provider)?;
        let Value::Object(obj) = target else {
            return Err(Error::NotSupported(format!(
                "attached property '{}.{}' needs an object target, got {}",
                provider,
                property,
                target.describe()
            )));
        };
        ObservableDescriptor::attached(obj, class, property).map(DataDescriptor::Observable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use crate::testing::{test_registry, Grid, Person};

    const URI: &str = "clr-namespace:Testing";

    fn handler(uri: &str) -> Result<DefaultNamespaceHandler> {
        let types = Rc::new(test_registry());
        DefaultNamespaceHandler::from_uri(uri, Rc::clone(&types), TypeConverter::new().with_types(types))
    }

    #[test]
    fn import_checks_namespace_and_assembly() {
        assert!(handler(URI).is_ok());
        assert!(handler("clr-namespace:Testing;assembly=Lumen.Testing").is_ok());
        assert!(matches!(handler("clr-namespace:Testing;assembly=Other"), Err(Error::NamespaceNotSupported(_))));
        assert!(matches!(handler("clr-namespace:Missing"), Err(Error::NamespaceNotSupported(_))));
        assert_eq!(handler("clr-namespace:System").unwrap().namespace(), "System");
    }

    #[test]
    fn instantiates_through_constructors() {
        let h = handler(URI).unwrap();
        let p = h.instantiate_element("Person", URI, &[]).unwrap();
        assert_eq!(p.as_object().map(ObjectRef::class), Some(Person::class_def()));
        let named = h.instantiate_element("Person", URI, &["Ann".into()]).unwrap();
        assert_eq!(named.as_object().unwrap().with(|p: &Person| p.name.clone()).unwrap(), "Ann");
        assert!(matches!(h.instantiate_element("Nope", URI, &[]), Err(Error::TypeNotFound { .. })));
    }

    #[test]
    fn primitive_elements() {
        let h = handler("clr-namespace:System").unwrap();
        assert_eq!(h.instantiate_element("Int32", "", &["42".into()]).unwrap(), Value::Int(42));
        assert_eq!(h.instantiate_element("Boolean", "", &[]).unwrap(), Value::Bool(false));
        assert!(matches!(h.instantiate_element("Int32", "", &["x".into()]), Err(Error::Conversion { .. })));
    }

    #[test]
    fn attached_properties() {
        let h = handler(URI).unwrap();
        let target = Value::object(Person::named("Ann"));
        assert!(h.has_attached_property("Grid", "Row", &target, URI).unwrap());
        assert!(!h.has_attached_property("Grid", "Span", &target, URI).unwrap());
        assert!(!h.has_attached_property("Nope", "Row", &target, URI).unwrap());
        let dd = h.get_attached_property("Grid", "Row", &target, URI).unwrap();
        dd.set_value(Value::Int(3)).unwrap();
        let again = ObservableDescriptor::attached(target.as_object().unwrap(), Grid::class_def(), "Row").unwrap();
        assert_eq!(again.value(), Value::Int(3));
        assert!(h.get_attached_property("Grid", "Row", &Value::Int(1), URI).is_err());
    }
}
