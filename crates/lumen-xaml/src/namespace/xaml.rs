use crate::convert::TypeConverter;
use crate::descriptor::DataDescriptor;
use crate::error::{Error, Result};
use crate::markup::{NullExtension, TypeExtension};
use crate::namespace::{NamespaceHandler, XAML_NS_URI};
use crate::object::Class;
use crate::reflection;
use crate::value::{Value, ValueType};

/// Built-in handler of the markup namespace: `x:Null` and `x:Type`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XamlNamespaceHandler;

impl XamlNamespaceHandler {
    fn class(type_name: &str) -> Result<&'static Class> {
        match type_name {
            "Null" | "NullExtension" => Ok(NullExtension::class_def()),
            "Type" | "TypeExtension" => Ok(TypeExtension::class_def()),
            _ => Err(Error::TypeNotFound { name: type_name.to_string(), namespace: XAML_NS_URI.to_string() }),
        }
    }
}

impl NamespaceHandler for XamlNamespaceHandler {
    fn resolve_type(&self, type_name: &str, _namespace_uri: &str) -> Result<ValueType> {
        Self::class(type_name).map(ValueType::Object)
    }

    fn instantiate_element(&self, type_name: &str, _namespace_uri: &str, params: &[Value]) -> Result<Value> {
        let class = Self::class(type_name)?;
        let (ctor, args) = reflection::find_best_member(type_name, class.constructors(), params, &TypeConverter::new())?
            .ok_or_else(|| Error::NotSupported(format!("'{}' does not take {} argument(s)", type_name, params.len())))?;
        ctor.construct(&args)
            .map(Value::Object)
            .map_err(|e| Error::access("construct", type_name, class.name(), e))
    }

    fn has_attached_property(&self, _: &str, _: &str, _: &Value, _: &str) -> Result<bool> {
        Ok(false)
    }

    fn get_attached_property(&self, provider: &str, property: &str, _: &Value, _: &str) -> Result<DataDescriptor> {
        Err(Error::MemberNotFound {
            member: format!("{}.{}", provider, property),
            target: XAML_NS_URI.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knows_both_spellings() {
        let h = XamlNamespaceHandler;
        assert_eq!(h.resolve_type("Null", XAML_NS_URI).unwrap(), h.resolve_type("NullExtension", XAML_NS_URI).unwrap());
        let ty = h.instantiate_element("Type", XAML_NS_URI, &["sys:Int32".into()]).unwrap();
        assert_eq!(
            ty.as_object().unwrap().with(|t: &TypeExtension| t.type_name.clone()).unwrap(),
            "sys:Int32"
        );
        assert!(matches!(h.resolve_type("Static", XAML_NS_URI), Err(Error::TypeNotFound { .. })));
        assert!(!h.has_attached_property("A", "B", &Value::Null, XAML_NS_URI).unwrap());
    }
}
