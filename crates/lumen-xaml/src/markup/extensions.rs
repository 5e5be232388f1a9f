use std::any::Any;
use std::sync::OnceLock;

use anyhow::anyhow;

use crate::error::Result;
use crate::markup::MarkupExtension;
use crate::object::{Class, ClassBuilder, Object, Param};
use crate::parser::ParserContext;
use crate::value::{Value, ValueType};

// ── x:Null ────────────────────────────────────────────────────────────────

/// `{x:Null}`: evaluates to null.
#[derive(Debug, Default)]
pub struct NullExtension;

impl NullExtension {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| ClassBuilder::<NullExtension>::new("NullExtension").default_constructor().build())
    }
}

impl MarkupExtension for NullExtension {
    fn evaluate(&self, _ctx: &mut dyn ParserContext) -> Result<Value> {
        Ok(Value::Null)
    }
}

impl Object for NullExtension {
    fn class(&self) -> &'static Class {
        Self::class_def()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_markup_extension(&self) -> Option<&dyn MarkupExtension> {
        Some(self)
    }
}

// ── x:Type ────────────────────────────────────────────────────────────────

/// `{x:Type p:Name}`: evaluates to the type named by a (possibly prefixed)
/// type name.
#[derive(Debug, Default)]
pub struct TypeExtension {
    pub type_name: String,
}

impl TypeExtension {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<TypeExtension>::new("TypeExtension")
                .constructor(vec![Param::optional(ValueType::String)], |args| {
                    let type_name = args.first().and_then(Value::as_str).unwrap_or_default().to_string();
                    Ok(TypeExtension { type_name })
                })
                .property(
                    "TypeName",
                    ValueType::String,
                    |t| t.type_name.clone().into(),
                    |t, v| {
                        t.type_name = v.as_str().ok_or_else(|| anyhow!("type name must be a string"))?.to_string();
                        Ok(())
                    },
                )
                .build()
        })
    }
}

impl MarkupExtension for TypeExtension {
    fn evaluate(&self, ctx: &mut dyn ParserContext) -> Result<Value> {
        let resolved = ctx.lookup_namespace(&self.type_name).and_then(|(local, uri)| {
            let handler = ctx.namespace_handler(&uri)?;
            handler.resolve_type(&local, &uri)
        });
        match resolved {
            Ok(ty) => Ok(Value::Type(ty)),
            // Unprefixed names may still be well-known or registered types.
            Err(e) => ctx
                .converter()
                .convert(&Value::from(self.type_name.as_str()), &ValueType::Type)
                .ok_or(e),
        }
    }
}

impl Object for TypeExtension {
    fn class(&self) -> &'static Class {
        Self::class_def()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_markup_extension(&self) -> Option<&dyn MarkupExtension> {
        Some(self)
    }
}
