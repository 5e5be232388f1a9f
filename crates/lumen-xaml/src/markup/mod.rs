//! Markup extensions: objects created from `{Name ...}` attribute values or
//! from elements that compute a value instead of standing for one.

mod binding;
mod extensions;

pub use binding::{
    BindingExtension, BindingMode, RelativeSource, RelativeSourceMode, UpdateSourceTrigger, BINDING_MODE,
    RELATIVE_SOURCE_MODE, UPDATE_SOURCE_TRIGGER,
};
pub use extensions::{NullExtension, TypeExtension};

use lumen_markup::Element;

use crate::descriptor::DataDescriptor;
use crate::error::Result;
use crate::namespace::TypeRegistry;
use crate::parser::ParserContext;
use crate::value::{Value, ValueType};

/// An extension that is evaluated once to produce the value it stands for.
pub trait MarkupExtension {
    fn evaluate(&self, ctx: &mut dyn ParserContext) -> Result<Value>;
}

/// A deferred link between a source path and a target location.
///
/// The parser prepares a binding against the descriptor it was assigned to
/// and activates it right away.
pub trait Binding {
    fn prepare(&mut self, ctx: &mut dyn ParserContext, target: DataDescriptor) -> Result<()>;

    /// Copy the source value to the target and start tracking changes.
    /// `Ok(false)` when the source path does not resolve yet.
    fn activate(&mut self) -> Result<bool>;
}

/// Transforms values on their way through a binding. `parameter` is the
/// binding's `ConverterParameter`, `target` the type the result is stored as.
pub trait ValueConverter {
    fn convert(&self, value: &Value, target: &ValueType, parameter: &Value) -> anyhow::Result<Value>;

    /// Target to source, for bindings that write back.
    fn convert_back(&self, _value: &Value, target: &ValueType, _parameter: &Value) -> anyhow::Result<Value> {
        anyhow::bail!("cannot convert back to {}", target)
    }
}

/// Objects that take their child elements themselves instead of through a
/// content property or collection.
///
/// The parser builds each child and then hands it over together with the
/// element it came from. The object is not borrowed while a child is being
/// built, so children may bind to it or register names in its scope.
pub trait NativeElement {
    fn add_native_child(&mut self, element: &Element, child: Value) -> Result<()>;
}

/// Evaluate `extension` and store the result in `target`, converted to the
/// target's type.
pub fn activate_markup_extension(
    extension: &dyn MarkupExtension,
    ctx: &mut dyn ParserContext,
    target: &DataDescriptor,
) -> Result<()> {
    let value = extension.evaluate(ctx)?;
    let converted = ctx.converter().convert_or_err(&value, &target.data_type())?;
    target.set_value(converted)
}

/// Make the built-in extensions available under `namespace`.
pub fn register_extensions(registry: &mut TypeRegistry, namespace: &str) {
    registry
        .register_class(namespace, BindingExtension::class_def())
        .register_class(namespace, RelativeSource::class_def())
        .register_class(namespace, NullExtension::class_def())
        .register_class(namespace, TypeExtension::class_def())
        .register_enum(namespace, &BINDING_MODE)
        .register_enum(namespace, &RELATIVE_SOURCE_MODE)
        .register_enum(namespace, &UPDATE_SOURCE_TRIGGER);
}
