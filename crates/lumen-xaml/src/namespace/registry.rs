use indexmap::IndexMap;

use crate::object::Class;
use crate::value::{EnumType, ValueType};

/// What a registered type name stands for.
#[derive(Debug, Clone)]
pub enum TypeEntry {
    Primitive(ValueType),
    Class(&'static Class),
    Enum(&'static EnumType),
}

impl TypeEntry {
    pub fn value_type(&self) -> ValueType {
        match self {
            TypeEntry::Primitive(ty) => ty.clone(),
            TypeEntry::Class(class) => ValueType::Object(*class),
            TypeEntry::Enum(ty) => ValueType::Enum(*ty),
        }
    }
}

#[derive(Debug, Default)]
struct RegisteredNamespace {
    assembly: Option<String>,
    types: IndexMap<String, TypeEntry>,
}

/// Code namespaces reachable from `clr-namespace:` imports.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    namespaces: IndexMap<String, RegisteredNamespace>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `System` namespace of primitive types.
    pub fn with_system() -> Self {
        let mut registry = Self::new();
        for (name, ty) in [
            ("Boolean", ValueType::Bool),
            ("Int32", ValueType::Int),
            ("Int64", ValueType::Int),
            ("Double", ValueType::Float),
            ("Single", ValueType::Float),
            ("String", ValueType::String),
            ("Object", ValueType::Any),
        ] {
            registry.register_primitive("System", name, ty);
        }
        registry
    }

    fn namespace_mut(&mut self, namespace: &str) -> &mut RegisteredNamespace {
        self.namespaces.entry(namespace.to_string()).or_default()
    }

    pub fn register_class(&mut self, namespace: &str, class: &'static Class) -> &mut Self {
        self.namespace_mut(namespace)
            .types
            .insert(class.name().to_string(), TypeEntry::Class(class));
        self
    }

    pub fn register_enum(&mut self, namespace: &str, ty: &'static EnumType) -> &mut Self {
        self.namespace_mut(namespace)
            .types
            .insert(ty.name().to_string(), TypeEntry::Enum(ty));
        self
    }

    pub fn register_primitive(&mut self, namespace: &str, name: &str, ty: ValueType) -> &mut Self {
        self.namespace_mut(namespace)
            .types
            .insert(name.to_string(), TypeEntry::Primitive(ty));
        self
    }

    /// Bind `namespace` to an assembly name; imports naming a different
    /// assembly are rejected.
    pub fn set_assembly(&mut self, namespace: &str, assembly: &str) -> &mut Self {
        self.namespace_mut(namespace).assembly = Some(assembly.to_string());
        self
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn assembly(&self, namespace: &str) -> Option<&str> {
        self.namespaces.get(namespace)?.assembly.as_deref()
    }

    pub fn lookup(&self, namespace: &str, name: &str) -> Option<&TypeEntry> {
        self.namespaces.get(namespace)?.types.get(name)
    }

    /// Resolve `Namespace.Name`, or a plain `Name` registered in exactly one
    /// namespace.
    pub fn find_type(&self, name: &str) -> Option<ValueType> {
        if let Some((namespace, local)) = name.rsplit_once('.') {
            if let Some(entry) = self.lookup(namespace, local) {
                return Some(entry.value_type());
            }
        }
        let mut found = self.namespaces.values().filter_map(|ns| ns.types.get(name));
        let first = found.next()?;
        found.next().is_none().then(|| first.value_type())
    }
}

/// Built-in spellings of primitive type names.
pub fn primitive_type(name: &str) -> Option<ValueType> {
    let name = name.strip_prefix("System.").unwrap_or(name);
    Some(match name {
        "bool" | "Boolean" => ValueType::Bool,
        "int" | "long" | "Int32" | "Int64" => ValueType::Int,
        "float" | "double" | "Single" | "Double" => ValueType::Float,
        "string" | "String" => ValueType::String,
        "object" | "Object" => ValueType::Any,
        "Type" => ValueType::Type,
        _ => return None,
    })
}
