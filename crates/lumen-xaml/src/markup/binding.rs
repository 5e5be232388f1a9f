use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use log::{debug, warn};

use crate::convert::TypeConverter;
use crate::descriptor::{ChangeHandler, DataDescriptor};
use crate::error::{Error, Result};
use crate::markup::Binding;
use crate::object::{Class, ClassBuilder, Object, ObjectRef, Param};
use crate::parser::ParserContext;
use crate::path::PathExpression;
use crate::reflection;
use crate::value::{EnumType, Value, ValueType};

pub static BINDING_MODE: EnumType = EnumType::new("BindingMode", &["OneTime", "OneWay", "TwoWay", "OneWayToSource"]);

pub static UPDATE_SOURCE_TRIGGER: EnumType = EnumType::new("UpdateSourceTrigger", &["PropertyChanged", "Explicit"]);

pub static RELATIVE_SOURCE_MODE: EnumType = EnumType::new("RelativeSourceMode", &["Self", "FindAncestor"]);

/// Conversions between a fieldless Rust enum and the registered [`EnumType`]
/// whose members are listed in the same order.
macro_rules! markup_enum {
    ($ty:ty, $enum_type:expr, [$($variant:ident),+]) => {
        impl $ty {
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn to_value(self) -> Value {
                $enum_type.value($enum_type.members()[self as usize]).unwrap_or_default()
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Enum(e) if e.enum_type() == &$enum_type => Self::ALL.get(e.index()).copied(),
                    _ => None,
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingMode {
    /// Copy once on activation.
    OneTime,
    /// Follow changes of the source.
    #[default]
    OneWay,
    /// Follow changes in both directions.
    TwoWay,
    /// Copy the target to the source, then follow changes of the target.
    OneWayToSource,
}

markup_enum!(BindingMode, BINDING_MODE, [OneTime, OneWay, TwoWay, OneWayToSource]);

impl BindingMode {
    fn reads_source(self) -> bool {
        !matches!(self, BindingMode::OneWayToSource)
    }

    fn writes_source(self) -> bool {
        matches!(self, BindingMode::TwoWay | BindingMode::OneWayToSource)
    }
}

/// When target changes are written back to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateSourceTrigger {
    #[default]
    PropertyChanged,
    /// Only through [`BindingExtension::update_source`].
    Explicit,
}

markup_enum!(UpdateSourceTrigger, UPDATE_SOURCE_TRIGGER, [PropertyChanged, Explicit]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelativeSourceMode {
    /// `Self` in markup: the object the binding is assigned to.
    #[default]
    Target,
    /// The `AncestorLevel`-th enclosing element of type `AncestorType`.
    FindAncestor,
}

markup_enum!(RelativeSourceMode, RELATIVE_SOURCE_MODE, [Target, FindAncestor]);

// ── RelativeSource ────────────────────────────────────────────────────────

/// `{RelativeSource Self}` or
/// `{RelativeSource Mode=FindAncestor, AncestorType={x:Type Panel}}`: a
/// binding source found relative to the binding target.
#[derive(Debug)]
pub struct RelativeSource {
    pub mode: RelativeSourceMode,
    pub ancestor_type: Option<ValueType>,
    pub ancestor_level: usize,
}

impl Default for RelativeSource {
    fn default() -> Self {
        Self { mode: RelativeSourceMode::default(), ancestor_type: None, ancestor_level: 1 }
    }
}

impl RelativeSource {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<RelativeSource>::new("RelativeSource")
                .constructor(vec![Param::optional(ValueType::Enum(&RELATIVE_SOURCE_MODE))], |args| {
                    let mode = match args.first() {
                        Some(v) => RelativeSourceMode::from_value(v).ok_or_else(|| anyhow!("not a relative source mode: {}", v))?,
                        None => RelativeSourceMode::default(),
                    };
                    Ok(RelativeSource { mode, ..Default::default() })
                })
                .property("Mode", ValueType::Enum(&RELATIVE_SOURCE_MODE), |r| r.mode.to_value(), |r, v| {
                    r.mode = RelativeSourceMode::from_value(&v).ok_or_else(|| anyhow!("not a relative source mode: {}", v))?;
                    Ok(())
                })
                .property(
                    "AncestorType",
                    ValueType::Type,
                    |r| r.ancestor_type.clone().map(Value::Type).unwrap_or_default(),
                    |r, v| {
                        r.ancestor_type = match v {
                            Value::Null => None,
                            Value::Type(ty) => Some(ty),
                            other => bail!("expected a type, got {}", other.describe()),
                        };
                        Ok(())
                    },
                )
                .property("AncestorLevel", ValueType::Int, |r| Value::Int(r.ancestor_level as i64), |r, v| {
                    r.ancestor_level = match v.as_int() {
                        Some(level) if level >= 1 => level as usize,
                        _ => bail!("ancestor level must be a positive integer, got {}", v),
                    };
                    Ok(())
                })
                .build()
        })
    }

    fn find(&self, ctx: &dyn ParserContext, target: &DataDescriptor) -> Result<Value> {
        match self.mode {
            RelativeSourceMode::Target => Ok(target.target_object().or_else(|| ctx.current_instance()).unwrap_or_default()),
            RelativeSourceMode::FindAncestor => {
                let ty = self
                    .ancestor_type
                    .as_ref()
                    .ok_or_else(|| Error::NotSupported("FindAncestor needs an AncestorType".to_string()))?;
                ctx.ancestors()
                    .into_iter()
                    .filter(|a| !a.is_null() && ty.accepts(a))
                    .nth(self.ancestor_level.saturating_sub(1))
                    .ok_or_else(|| Error::MemberNotFound {
                        member: format!("ancestor {} at level {}", ty, self.ancestor_level),
                        target: "enclosing elements".to_string(),
                    })
            }
        }
    }
}

impl Object for RelativeSource {
    fn class(&self) -> &'static Class {
        Self::class_def()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── Binding ───────────────────────────────────────────────────────────────

/// `{Binding Path=..., ElementName=..., RelativeSource=..., Source=...,
/// Mode=..., Converter=..., ConverterParameter=..., UpdateSourceTrigger=...}`.
///
/// The source is the element registered under `ElementName`, the object
/// `RelativeSource` finds, or the explicit `Source`; at most one of them may
/// be given. Without any, it is the `DataContext` member of the object the
/// binding is assigned to.
#[derive(Debug, Default)]
pub struct BindingExtension {
    pub path: Option<String>,
    pub source: Value,
    pub element_name: Option<String>,
    pub relative_source: Value,
    pub mode: BindingMode,
    pub update_source_trigger: UpdateSourceTrigger,
    pub converter: Value,
    pub converter_parameter: Value,
    prepared: Option<Prepared>,
    active: Option<Rc<ActiveBinding>>,
}

#[derive(Debug, Clone)]
struct Prepared {
    path: Option<PathExpression>,
    source: DataDescriptor,
    target: DataDescriptor,
    converter: TypeConverter,
    value_converter: Option<BoundConverter>,
}

/// A `Converter` object together with the binding's `ConverterParameter`.
#[derive(Debug, Clone)]
struct BoundConverter {
    converter: ObjectRef,
    parameter: Value,
}

impl BoundConverter {
    fn new(converter: &Value, parameter: &Value) -> Result<Option<Self>> {
        match converter {
            Value::Null => Ok(None),
            Value::Object(obj) if obj.try_borrow().is_some_and(|o| o.as_value_converter().is_some()) => {
                Ok(Some(Self { converter: obj.clone(), parameter: parameter.clone() }))
            }
            other => Err(Error::NotSupported(format!("{} is not a value converter", other.describe()))),
        }
    }

    fn apply(&self, value: &Value, target: &ValueType, back: bool) -> Result<Value> {
        let class = self.converter.class();
        let guard = self.converter.borrow();
        let converter = guard
            .as_value_converter()
            .ok_or_else(|| Error::NotSupported(format!("'{}' is not a value converter", class.name())))?;
        let (action, result) = match back {
            false => ("convert with", converter.convert(value, target, &self.parameter)),
            true => ("convert back with", converter.convert_back(value, target, &self.parameter)),
        };
        result.map_err(|e| Error::access(action, "Converter", class.name(), e))
    }
}

fn optional_string(value: Value) -> anyhow::Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::Str(s) => Ok(Some(s)),
        other => Err(anyhow!("expected a string, got {}", other.describe())),
    }
}

impl BindingExtension {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<BindingExtension>::new("BindingExtension")
                .constructor(vec![Param::optional(ValueType::String)], |args| {
                    let path = args.first().and_then(Value::as_str).map(str::to_string);
                    Ok(BindingExtension { path, ..Default::default() })
                })
                .property(
                    "Path",
                    ValueType::String,
                    |b| b.path.clone().map(Value::Str).unwrap_or_default(),
                    |b, v| {
                        b.path = optional_string(v)?;
                        Ok(())
                    },
                )
                .property(
                    "ElementName",
                    ValueType::String,
                    |b| b.element_name.clone().map(Value::Str).unwrap_or_default(),
                    |b, v| {
                        b.element_name = optional_string(v)?;
                        Ok(())
                    },
                )
                .property(
                    "RelativeSource",
                    ValueType::Object(RelativeSource::class_def()),
                    |b| b.relative_source.clone(),
                    |b, v| {
                        b.relative_source = v;
                        Ok(())
                    },
                )
                .property("Source", ValueType::Any, |b| b.source.clone(), |b, v| {
                    b.source = v;
                    Ok(())
                })
                .property("Mode", ValueType::Enum(&BINDING_MODE), |b| b.mode.to_value(), |b, v| {
                    b.mode = BindingMode::from_value(&v).ok_or_else(|| anyhow!("not a binding mode: {}", v))?;
                    Ok(())
                })
                .property(
                    "UpdateSourceTrigger",
                    ValueType::Enum(&UPDATE_SOURCE_TRIGGER),
                    |b| b.update_source_trigger.to_value(),
                    |b, v| {
                        b.update_source_trigger =
                            UpdateSourceTrigger::from_value(&v).ok_or_else(|| anyhow!("not an update trigger: {}", v))?;
                        Ok(())
                    },
                )
                .property("Converter", ValueType::Any, |b| b.converter.clone(), |b, v| {
                    b.converter = v;
                    Ok(())
                })
                .property("ConverterParameter", ValueType::Any, |b| b.converter_parameter.clone(), |b, v| {
                    b.converter_parameter = v;
                    Ok(())
                })
                .build()
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Stop tracking changes. The target keeps its last value.
    pub fn deactivate(&mut self) {
        self.active = None;
    }

    /// Copy the source value to the target now. `Ok(false)` when the path
    /// does not resolve or the binding is not active.
    pub fn update_target(&self) -> Result<bool> {
        match &self.active {
            Some(active) => active.update_target(),
            None => Ok(false),
        }
    }

    /// Write the target value back to the source now; the only way an
    /// `Explicit` binding does so.
    pub fn update_source(&self) -> Result<()> {
        match &self.active {
            Some(active) => active.update_source(),
            None => Ok(()),
        }
    }

    fn find_source(&self, ctx: &mut dyn ParserContext, target: &DataDescriptor) -> Result<DataDescriptor> {
        let given = [self.element_name.is_some(), !self.relative_source.is_null(), !self.source.is_null()];
        if given.into_iter().filter(|g| *g).count() > 1 {
            return Err(Error::NotSupported(
                "a binding takes at most one of ElementName, RelativeSource and Source".to_string(),
            ));
        }
        if let Some(name) = &self.element_name {
            let element = ctx.find_name(name).ok_or_else(|| Error::MemberNotFound {
                member: name.clone(),
                target: "naming scope".to_string(),
            })?;
            return Ok(DataDescriptor::value_of(element));
        }
        if let Value::Object(relative) = &self.relative_source {
            let found = relative
                .with(|r: &RelativeSource| r.find(&*ctx, target))
                .ok_or_else(|| Error::NotSupported(format!("{} is not a relative source", relative.class().name())))??;
            return Ok(DataDescriptor::value_of(found));
        }
        if !self.source.is_null() {
            return Ok(DataDescriptor::value_of(self.source.clone()));
        }
        let owner = target.target_object().or_else(|| ctx.current_instance());
        if let Some(Value::Object(obj)) = owner {
            if let Some(context) = reflection::find_member_descriptor(&obj, "DataContext")? {
                return Ok(context);
            }
        }
        Ok(DataDescriptor::value_of(Value::Null))
    }
}

impl Binding for BindingExtension {
    fn prepare(&mut self, ctx: &mut dyn ParserContext, target: DataDescriptor) -> Result<()> {
        let path = match self.path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() && path != "." => Some(PathExpression::compile(&*ctx, path)?),
            _ => None,
        };
        let source = self.find_source(ctx, &target)?;
        let value_converter = BoundConverter::new(&self.converter, &self.converter_parameter)?;
        self.prepared = Some(Prepared { path, source, target, converter: ctx.converter(), value_converter });
        Ok(())
    }

    fn activate(&mut self) -> Result<bool> {
        let prepared = self
            .prepared
            .clone()
            .ok_or_else(|| Error::NotSupported("binding activated before it was prepared".to_string()))?;
        self.active = None;
        let active = ActiveBinding::new(prepared, self.mode);
        active.tracking.set(self.mode != BindingMode::OneTime);
        let bound = match self.mode.reads_source() {
            true => active.update_target()?,
            false => {
                active.refresh()?;
                active.update_source()?;
                active.leaf.borrow().is_some()
            }
        };
        if self.mode.writes_source() && self.update_source_trigger == UpdateSourceTrigger::PropertyChanged {
            active.prepared.target.attach(Rc::clone(&active.on_target));
        }
        debug!("activated {:?} binding on '{}' (bound: {})", self.mode, self.path.as_deref().unwrap_or("."), bound);
        self.active = Some(active);
        Ok(bound)
    }
}

impl Object for BindingExtension {
    fn class(&self) -> &'static Class {
        Self::class_def()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn as_binding_mut(&mut self) -> Option<&mut dyn Binding> {
        Some(self)
    }
}

// ── ActiveBinding ─────────────────────────────────────────────────────────

/// A running binding. Its handlers hold it weakly; dropping it detaches
/// them from every descriptor they were attached to.
struct ActiveBinding {
    prepared: Prepared,
    mode: BindingMode,
    leaf: RefCell<Option<DataDescriptor>>,
    /// Descriptors `on_source` is attached to: every step of the path and,
    /// when the target follows the source, the leaf.
    watched: RefCell<Vec<DataDescriptor>>,
    tracking: Cell<bool>,
    updating: Cell<bool>,
    on_source: ChangeHandler,
    on_target: ChangeHandler,
}

impl ActiveBinding {
    fn new(prepared: Prepared, mode: BindingMode) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<ActiveBinding>| {
            let source = weak.clone();
            let on_source: ChangeHandler = Rc::new(move |_| {
                if let Some(binding) = source.upgrade() {
                    if let Err(e) = binding.source_changed() {
                        warn!("binding could not follow its source: {}", e);
                    }
                }
            });
            let target = weak.clone();
            let on_target: ChangeHandler = Rc::new(move |_| {
                if let Some(binding) = target.upgrade() {
                    if let Err(e) = binding.update_source() {
                        warn!("binding could not update its source: {}", e);
                    }
                }
            });
            ActiveBinding {
                prepared,
                mode,
                leaf: RefCell::new(None),
                watched: RefCell::new(Vec::new()),
                tracking: Cell::new(false),
                updating: Cell::new(false),
                on_source,
                on_target,
            }
        })
    }

    fn source_changed(&self) -> Result<()> {
        match self.mode.reads_source() {
            true => self.update_target().map(|_| ()),
            false => {
                self.refresh()?;
                self.update_source()
            }
        }
    }

    /// Evaluate the path again and move `on_source` to the descriptors the
    /// walk now passes through.
    fn refresh(&self) -> Result<()> {
        let (mut steps, leaf) = match &self.prepared.path {
            Some(path) => path.trace(&self.prepared.source)?,
            None => (Vec::new(), Some(self.prepared.source.clone())),
        };
        if self.tracking.get() {
            if self.mode.reads_source() {
                steps.extend(leaf.clone());
            }
            self.watch(steps);
        }
        *self.leaf.borrow_mut() = leaf;
        Ok(())
    }

    /// Descriptors already watched keep their subscription; handlers live on
    /// the instance they were attached to.
    fn watch(&self, wanted: Vec<DataDescriptor>) {
        let mut watched = self.watched.borrow_mut();
        let (kept, gone): (Vec<_>, Vec<_>) = std::mem::take(&mut *watched).into_iter().partition(|d| wanted.contains(d));
        for descriptor in &gone {
            descriptor.detach(&self.on_source);
        }
        *watched = kept;
        for descriptor in wanted {
            if !watched.contains(&descriptor) {
                descriptor.attach(Rc::clone(&self.on_source));
                watched.push(descriptor);
            }
        }
    }

    fn update_target(&self) -> Result<bool> {
        if self.updating.get() {
            return Ok(true);
        }
        self.refresh()?;
        let Some(leaf) = self.leaf.borrow().clone() else {
            return Ok(false);
        };
        let target_type = self.prepared.target.data_type();
        let mut value = leaf.value()?;
        if let Some(converter) = &self.prepared.value_converter {
            value = converter.apply(&value, &target_type, false)?;
        }
        let converted = self.prepared.converter.convert_or_err(&value, &target_type)?;
        self.updating.set(true);
        let result = self.prepared.target.set_value(converted);
        self.updating.set(false);
        result.map(|_| true)
    }

    fn update_source(&self) -> Result<()> {
        if self.updating.get() {
            return Ok(());
        }
        let Some(leaf) = self.leaf.borrow().clone() else {
            return Ok(());
        };
        let source_type = leaf.data_type();
        let mut value = self.prepared.target.value()?;
        if let Some(converter) = &self.prepared.value_converter {
            value = converter.apply(&value, &source_type, true)?;
        }
        let converted = self.prepared.converter.convert_or_err(&value, &source_type)?;
        self.updating.set(true);
        let result = leaf.set_value(converted);
        self.updating.set(false);
        result
    }
}

impl Drop for ActiveBinding {
    fn drop(&mut self) {
        for descriptor in self.watched.get_mut().drain(..) {
            descriptor.detach(&self.on_source);
        }
        if self.mode.writes_source() {
            self.prepared.target.detach(&self.on_target);
        }
    }
}

impl fmt::Debug for ActiveBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveBinding")
            .field("mode", &self.mode)
            .field("path", &self.prepared.path.as_ref().map(ToString::to_string))
            .field("leaf", &self.leaf.borrow())
            .field("watched", &self.watched.borrow().len())
            .finish()
    }
}
