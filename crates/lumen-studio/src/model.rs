//! Demo object model for the studio: a handful of player-screen controls
//! registered under the `Studio` namespace.

use std::any::Any;
use std::rc::Rc;
use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use log::warn;
use lumen_xaml::object::AttachedProperties;
use lumen_xaml::{
    register_extensions, Class, ClassBuilder, EnumType, EventSignature, Handler, NameScope, Object, Param,
    Property, PropertyRef, TypeRegistry, Value, ValueType,
};

pub const NAMESPACE: &str = "Studio";
pub const NAMESPACE_URI: &str = "clr-namespace:Studio";

pub static ORIENTATION: EnumType = EnumType::new("Orientation", &["Vertical", "Horizontal"]);

/// Registry with `System` plus the studio controls and markup extensions.
pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_system();
    registry
        .register_class(NAMESPACE, Window::class_def())
        .register_class(NAMESPACE, StackPanel::class_def())
        .register_class(NAMESPACE, Label::class_def())
        .register_class(NAMESPACE, Slider::class_def())
        .register_class(NAMESPACE, CheckBox::class_def())
        .register_class(NAMESPACE, Button::class_def())
        .register_class(NAMESPACE, Color::class_def())
        .register_enum(NAMESPACE, &ORIENTATION)
        .set_assembly(NAMESPACE, "Lumen.Studio");
    register_extensions(&mut registry, NAMESPACE);
    registry
}

macro_rules! object_impl {
    ($ty:ty) => {
        fn class(&self) -> &'static Class {
            <$ty>::class_def()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

fn string(v: &Value) -> anyhow::Result<String> {
    match v {
        Value::Null => Ok(String::new()),
        other => other.as_str().map(str::to_string).ok_or_else(|| anyhow!("expected a string, got {}", other.describe())),
    }
}

fn number(v: &Value) -> anyhow::Result<f64> {
    v.as_float().ok_or_else(|| anyhow!("expected a number, got {}", v.describe()))
}

// ── Window ────────────────────────────────────────────────────────────────

/// Root of a screen. Opens a naming scope; `window[name]` looks names up in it.
#[derive(Debug, Default)]
pub struct Window {
    pub title: String,
    pub content: Value,
    pub data_context: Value,
    pub scope: NameScope,
}

impl Window {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Window>::new("Window")
                .default_constructor()
                .property("Title", ValueType::String, |w| w.title.clone().into(), |w, v| {
                    w.title = string(&v)?;
                    Ok(())
                })
                .property("Content", ValueType::Any, |w| w.content.clone(), |w, v| {
                    w.content = v;
                    Ok(())
                })
                .content_property("Content")
                .property("DataContext", ValueType::Any, |w| w.data_context.clone(), |w, v| {
                    w.data_context = v;
                    Ok(())
                })
                .read_only_property("Names", ValueType::list_of(ValueType::String), |w| {
                    Value::list(w.scope.names().into_iter().map(Value::from))
                })
                .indexer(
                    vec![Param::required(ValueType::String)],
                    ValueType::Any,
                    |w, idx| {
                        let name = string(&idx[0])?;
                        w.scope.find_name(&name).ok_or_else(|| anyhow!("no element named '{}'", name))
                    },
                    |_, _, _| bail!("named elements cannot be replaced"),
                )
                .build()
        })
    }
}

impl Object for Window {
    object_impl!(Window);

    fn name_scope(&self) -> Option<&NameScope> {
        Some(&self.scope)
    }
}

// ── StackPanel ────────────────────────────────────────────────────────────

/// Lays children out in a row or a column and lends them a `Spacing`.
#[derive(Debug)]
pub struct StackPanel {
    pub orientation: Value,
    pub children: Vec<Value>,
}

impl Default for StackPanel {
    fn default() -> Self {
        Self { orientation: ORIENTATION.value("Vertical").unwrap_or_default(), children: Vec::new() }
    }
}

impl StackPanel {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<StackPanel>::new("StackPanel")
                .default_constructor()
                .property("Orientation", ValueType::Enum(&ORIENTATION), |p| p.orientation.clone(), |p, v| {
                    p.orientation = v;
                    Ok(())
                })
                .read_only_property("Children", ValueType::list_of(ValueType::Any), |p| {
                    Value::list(p.children.iter().cloned())
                })
                .attached_property("Spacing", ValueType::Int, || Value::Int(0))
                .add_child(ValueType::Any, |p, child| {
                    p.children.push(child);
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for StackPanel {
    object_impl!(StackPanel);
}

// ── Label ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Label {
    pub text: PropertyRef,
    pub foreground: Value,
    attached: AttachedProperties,
}

impl Default for Label {
    fn default() -> Self {
        Self {
            text: Property::new(ValueType::String, Value::from("")),
            foreground: Value::Null,
            attached: AttachedProperties::new(),
        }
    }
}

impl Label {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Label>::new("Label")
                .default_constructor()
                .constructor(vec![Param::required(ValueType::String)], |args| {
                    let label = Label::default();
                    label.text.set_value(Value::from(string(&args[0])?));
                    Ok(label)
                })
                .observable("Text", |l| l.text.clone())
                .property("Foreground", ValueType::Object(Color::class_def()), |l| l.foreground.clone(), |l, v| {
                    l.foreground = v;
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Label {
    object_impl!(Label);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

// ── Slider ────────────────────────────────────────────────────────────────

/// `ValueChanged` handlers run after every change of `Value`.
#[derive(Debug)]
pub struct Slider {
    pub value: PropertyRef,
    pub minimum: f64,
    pub maximum: f64,
    pub enabled: PropertyRef,
    attached: AttachedProperties,
}

impl Default for Slider {
    fn default() -> Self {
        Self {
            value: Property::new(ValueType::Float, Value::Float(0.0)),
            minimum: 0.0,
            maximum: 100.0,
            enabled: Property::new(ValueType::Bool, Value::Bool(true)),
            attached: AttachedProperties::new(),
        }
    }
}

impl Slider {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Slider>::new("Slider")
                .default_constructor()
                .observable("Value", |s| s.value.clone())
                .observable("IsEnabled", |s| s.enabled.clone())
                .property("Minimum", ValueType::Float, |s| s.minimum.into(), |s, v| {
                    s.minimum = number(&v)?;
                    Ok(())
                })
                .property("Maximum", ValueType::Float, |s| s.maximum.into(), |s, v| {
                    s.maximum = number(&v)?;
                    Ok(())
                })
                .event("ValueChanged", EventSignature::new(vec![ValueType::Float]), |s, handler| {
                    s.value.attach(Rc::new(move |property: &Property, _old: &Value| {
                        if let Err(e) = handler(&[property.value()]) {
                            warn!("ValueChanged handler failed: {}", e);
                        }
                    }));
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Slider {
    object_impl!(Slider);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

// ── CheckBox ──────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CheckBox {
    pub checked: PropertyRef,
    pub content: Value,
    attached: AttachedProperties,
}

impl Default for CheckBox {
    fn default() -> Self {
        Self {
            checked: Property::new(ValueType::Bool, Value::Bool(false)),
            content: Value::Null,
            attached: AttachedProperties::new(),
        }
    }
}

impl CheckBox {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<CheckBox>::new("CheckBox")
                .default_constructor()
                .observable("IsChecked", |c| c.checked.clone())
                .property("Content", ValueType::Any, |c| c.content.clone(), |c, v| {
                    c.content = v;
                    Ok(())
                })
                .content_property("Content")
                .build()
        })
    }
}

impl Object for CheckBox {
    object_impl!(CheckBox);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

// ── Button ────────────────────────────────────────────────────────────────

/// `PerformClick` runs every `Click` handler and returns the click count.
#[derive(Default)]
pub struct Button {
    pub content: Value,
    pub clicks: i64,
    click: Vec<Handler>,
    attached: AttachedProperties,
}

impl std::fmt::Debug for Button {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Button")
            .field("content", &self.content)
            .field("clicks", &self.clicks)
            .field("handlers", &self.click.len())
            .finish()
    }
}

impl Button {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Button>::new("Button")
                .default_constructor()
                .property("Content", ValueType::Any, |b| b.content.clone(), |b, v| {
                    b.content = v;
                    Ok(())
                })
                .content_property("Content")
                .read_only_property("ClickCount", ValueType::Int, |b| Value::Int(b.clicks))
                .event("Click", EventSignature::new(Vec::new()), |b, handler| {
                    b.click.push(handler);
                    Ok(())
                })
                .method("PerformClick", Vec::new(), ValueType::Int, |b, _| {
                    b.clicks += 1;
                    for handler in &b.click {
                        handler(&[])?;
                    }
                    Ok(Value::Int(b.clicks))
                })
                .build()
        })
    }
}

impl Object for Button {
    object_impl!(Button);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

// ── Color ─────────────────────────────────────────────────────────────────

/// Converts from `#rrggbb`, back to the same text and to its integer value.
#[derive(Debug, Default)]
pub struct Color {
    pub rgb: u32,
}

impl Color {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Color>::new("Color")
                .default_constructor()
                .from_value(|v| {
                    let hex = v.as_str()?.trim().strip_prefix('#')?;
                    if hex.len() != 6 {
                        return None;
                    }
                    u32::from_str_radix(hex, 16).ok().map(|rgb| Color { rgb })
                })
                .to_value(|c, target| match target {
                    ValueType::String => Some(Value::Str(format!("#{:06x}", c.rgb))),
                    ValueType::Int => Some(Value::Int(i64::from(c.rgb))),
                    _ => None,
                })
                .build()
        })
    }
}

impl Object for Color {
    object_impl!(Color);
}
