//! Object model shared by the unit tests.

use std::any::Any;
use std::fmt;
use std::sync::OnceLock;

use anyhow::{anyhow, bail};
use lumen_markup::Element;

use crate::error::Result;
use crate::markup::{register_extensions, NativeElement, ValueConverter};
use crate::namespace::{NamespaceContext, TypeRegistry};
use crate::object::{AttachedProperties, Class, ClassBuilder, EventSignature, Handler, NameScope, Object, Param};
use crate::property::{Property, PropertyRef};
use crate::value::{EnumType, ListRef, Value, ValueType};

pub static MOOD: EnumType = EnumType::new("Mood", &["Happy", "Sad"]);

/// Registry with `System` plus every fixture under `Testing`
/// (assembly `Lumen.Testing`).
pub fn test_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_system();
    registry
        .register_class("Testing", Person::class_def())
        .register_class("Testing", Robot::class_def())
        .register_class("Testing", Shape::class_def())
        .register_class("Testing", Square::class_def())
        .register_class("Testing", Panel::class_def())
        .register_class("Testing", Grid::class_def())
        .register_class("Testing", Sheet::class_def())
        .register_class("Testing", Lookup::class_def())
        .register_class("Testing", Broken::class_def())
        .register_class("Testing", Tags::class_def())
        .register_class("Testing", Color::class_def())
        .register_class("Testing", Calculator::class_def())
        .register_class("Testing", ContentElement::class_def())
        .register_class("Testing", Item::class_def())
        .register_class("Testing", Include::class_def())
        .register_class("Testing", Recorder::class_def())
        .register_class("Testing", Prefix::class_def())
        .register_enum("Testing", &MOOD)
        .set_assembly("Testing", "Lumen.Testing");
    register_extensions(&mut registry, "Testing");
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
    v.as_str().map(str::to_string).ok_or_else(|| anyhow!("expected a string, got {}", v.describe()))
}

fn int(v: &Value) -> anyhow::Result<i64> {
    v.as_int().ok_or_else(|| anyhow!("expected an integer, got {}", v.describe()))
}

// ── Person ────────────────────────────────────────────────────────────────

pub struct Person {
    pub name: String,
    pub age: i64,
    pub enabled: bool,
    pub title: PropertyRef,
    pub partner: PropertyRef,
    pub items: ListRef,
    pub friend: Value,
    pub data_context: Value,
    pub tag: Value,
    pub renamed: Vec<Handler>,
    attached: AttachedProperties,
}

impl Default for Person {
    fn default() -> Self {
        Self {
            name: String::new(),
            age: 0,
            enabled: false,
            title: Property::new(ValueType::String, Value::Null),
            partner: Property::new(ValueType::Any, Value::Null),
            items: ListRef::default(),
            friend: Value::Null,
            data_context: Value::Null,
            tag: Value::Null,
            renamed: Vec::new(),
            attached: AttachedProperties::new(),
        }
    }
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Person>::new("Person")
                .default_constructor()
                .constructor(vec![Param::required(ValueType::String)], |args| Ok(Person::named(&string(&args[0])?)))
                .property(
                    "Name",
                    ValueType::String,
                    |p| p.name.clone().into(),
                    |p, v| {
                        p.name = string(&v)?;
                        for handler in &p.renamed {
                            handler(&[v.clone()])?;
                        }
                        Ok(())
                    },
                )
                .field("Age", ValueType::Int, |p| p.age.into(), |p, v| {
                    p.age = int(&v)?;
                    Ok(())
                })
                .read_only_property("Id", ValueType::Int, |_| Value::Int(7))
                .read_only_property("Copy", ValueType::Any, |p| Value::object(Person::named(&p.name)))
                .indexed_property("Secret", ValueType::String, Vec::new(), |_, _| bail!("classified"))
                .observable("Title", |p| p.title.clone())
                .observable("Partner", |p| p.partner.clone())
                .property("IsEnabled", ValueType::Bool, |p| p.enabled.into(), |p, v| {
                    p.enabled = v.as_bool().ok_or_else(|| anyhow!("expected a boolean"))?;
                    Ok(())
                })
                .read_only_property("Items", ValueType::list_of(ValueType::Any), |p| Value::List(p.items.clone()))
                .property("Friend", ValueType::Any, |p| p.friend.clone(), |p, v| {
                    p.friend = v;
                    Ok(())
                })
                .property("DataContext", ValueType::Any, |p| p.data_context.clone(), |p, v| {
                    p.data_context = v;
                    Ok(())
                })
                .property("Tag", ValueType::Any, |p| p.tag.clone(), |p, v| {
                    p.tag = v;
                    Ok(())
                })
                .event("Renamed", EventSignature::new(vec![ValueType::String]), |p, h| {
                    p.renamed.push(h);
                    Ok(())
                })
                .build()
        })
    }
}

impl fmt::Debug for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Person").field("name", &self.name).field("age", &self.age).finish_non_exhaustive()
    }
}

impl Object for Person {
    object_impl!(Person);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

/// Shares no members with [`Person`].
#[derive(Debug, Default)]
pub struct Robot {
    pub model: String,
}

impl Robot {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Robot>::new("Robot")
                .default_constructor()
                .property("Model", ValueType::String, |r| r.model.clone().into(), |r, v| {
                    r.model = string(&v)?;
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Robot {
    object_impl!(Robot);
}

#[derive(Debug, Default)]
pub struct Shape;

impl Shape {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| ClassBuilder::<Shape>::new("Shape").default_constructor().build())
    }
}

impl Object for Shape {
    object_impl!(Shape);
}

#[derive(Debug, Default)]
pub struct Square {
    pub side: f64,
}

impl Square {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Square>::new("Square")
                .is_a(Shape::class_def())
                .default_constructor()
                .property("Side", ValueType::Float, |s| s.side.into(), |s, v| {
                    s.side = v.as_float().ok_or_else(|| anyhow!("expected a number"))?;
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Square {
    object_impl!(Square);
}

// ── Containers ────────────────────────────────────────────────────────────

/// Opens a naming scope and takes children one by one.
#[derive(Debug, Default)]
pub struct Panel {
    pub name: String,
    pub background: Value,
    pub children: Vec<Value>,
    pub scope: NameScope,
}

impl Panel {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Panel>::new("Panel")
                .default_constructor()
                .property("Name", ValueType::String, |p| p.name.clone().into(), |p, v| {
                    p.name = string(&v)?;
                    Ok(())
                })
                .property("Background", ValueType::Object(Color::class_def()), |p| p.background.clone(), |p, v| {
                    p.background = v;
                    Ok(())
                })
                .add_child(ValueType::Any, |p, child| {
                    p.children.push(child);
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Panel {
    object_impl!(Panel);

    fn name_scope(&self) -> Option<&NameScope> {
        Some(&self.scope)
    }
}

/// Provides the attached `Row` and `Column` properties.
#[derive(Debug, Default)]
pub struct Grid {
    pub children: Vec<Value>,
    attached: AttachedProperties,
}

impl Grid {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Grid>::new("Grid")
                .default_constructor()
                .attached_property("Row", ValueType::Int, || Value::Int(0))
                .attached_property("Column", ValueType::Int, || Value::Int(0))
                .add_child(ValueType::Any, |g, child| {
                    g.children.push(child);
                    Ok(())
                })
                .build()
        })
    }
}

impl Object for Grid {
    object_impl!(Grid);

    fn attached_properties(&self) -> Option<&AttachedProperties> {
        Some(&self.attached)
    }
}

/// `Cell[row, col]` is `row * col`.
#[derive(Debug, Default)]
pub struct Sheet;

impl Sheet {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Sheet>::new("Sheet")
                .default_constructor()
                .indexed_property(
                    "Cell",
                    ValueType::Int,
                    vec![Param::required(ValueType::Int), Param::required(ValueType::Int)],
                    |_, idx| Ok(Value::Int(int(&idx[0])? * int(&idx[1])?)),
                )
                .build()
        })
    }
}

impl Object for Sheet {
    object_impl!(Sheet);
}

/// Indexer `[name, factor = 1]` over a few fixed entries.
#[derive(Debug)]
pub struct Lookup {
    pub entries: Vec<(String, i64)>,
}

impl Default for Lookup {
    fn default() -> Self {
        Self { entries: vec![("a".to_string(), 1), ("b".to_string(), 2)] }
    }
}

impl Lookup {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Lookup>::new("Lookup")
                .default_constructor()
                .indexer(
                    vec![Param::required(ValueType::String), Param::optional(ValueType::Int)],
                    ValueType::Int,
                    |l, idx| {
                        let key = string(&idx[0])?;
                        let factor = idx.get(1).map(int).transpose()?.unwrap_or(1);
                        match l.entries.iter().find(|(k, _)| *k == key) {
                            Some((_, v)) => Ok(Value::Int(v * factor)),
                            None => bail!("no entry '{}'", key),
                        }
                    },
                    |l, idx, value| {
                        let key = string(&idx[0])?;
                        let value = int(&value)?;
                        match l.entries.iter_mut().find(|(k, _)| *k == key) {
                            Some(entry) => entry.1 = value,
                            None => l.entries.push((key, value)),
                        }
                        Ok(())
                    },
                )
                .build()
        })
    }
}

impl Object for Lookup {
    object_impl!(Lookup);
}

/// Declares an observable member that yields no property cell.
#[derive(Debug, Default)]
pub struct Broken;

impl Broken {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Broken>::new("Broken")
                .default_constructor()
                .read_only_property("ValueProperty", ValueType::Observable, |_| Value::Null)
                .build()
        })
    }
}

impl Object for Broken {
    object_impl!(Broken);
}

/// A list of strings.
#[derive(Debug, Default)]
pub struct Tags {
    pub items: Vec<String>,
}

impl Tags {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Tags>::new("Tags")
                .default_constructor()
                .list(
                    ValueType::String,
                    |t| t.items.iter().map(|s| Value::from(s.as_str())).collect(),
                    |t, item| {
                        t.items.push(string(&item)?);
                        Ok(())
                    },
                )
                .build()
        })
    }
}

impl Object for Tags {
    object_impl!(Tags);
}

/// Converts from `#rrggbb` and to its integer value.
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
                    u32::from_str_radix(hex, 16).ok().map(|rgb| Color { rgb })
                })
                .to_value(|c, target| match target {
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

/// `Add` overloaded on integers and strings, accumulating a total.
#[derive(Debug, Default)]
pub struct Calculator {
    pub total: i64,
}

impl Calculator {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Calculator>::new("Calculator")
                .default_constructor()
                .method("Add", vec![Param::required(ValueType::Int)], ValueType::Int, |c, args| {
                    c.total += int(&args[0])?;
                    Ok(Value::Int(c.total))
                })
                .method("Add", vec![Param::required(ValueType::String)], ValueType::Int, |c, args| {
                    c.total += string(&args[0])?.trim().parse::<i64>()?;
                    Ok(Value::Int(c.total))
                })
                .build()
        })
    }
}

impl Object for Calculator {
    object_impl!(Calculator);
}

// ── Content, keys and includes ────────────────────────────────────────────

/// Registered as `Element`: a single `Content` member taking anything.
#[derive(Debug, Default)]
pub struct ContentElement {
    pub content: Value,
    pub initialized: bool,
}

impl ContentElement {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<ContentElement>::new("Element")
                .default_constructor()
                .property("Content", ValueType::Any, |e| e.content.clone(), |e, v| {
                    e.content = v;
                    Ok(())
                })
                .content_property("Content")
                .build()
        })
    }
}

impl Object for ContentElement {
    object_impl!(ContentElement);

    fn initialize(&mut self, _ctx: &dyn NamespaceContext) -> Result<()> {
        self.initialized = true;
        Ok(())
    }
}

/// Keyed implicitly by its `Key` member.
#[derive(Debug, Default)]
pub struct Item {
    pub key: String,
    pub value: Value,
}

impl Item {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Item>::new("Item")
                .default_constructor()
                .property("Key", ValueType::String, |i| i.key.clone().into(), |i, v| {
                    i.key = string(&v)?;
                    Ok(())
                })
                .property("Value", ValueType::Any, |i| i.value.clone(), |i, v| {
                    i.value = v;
                    Ok(())
                })
                .content_property("Value")
                .build()
        })
    }
}

impl Object for Item {
    object_impl!(Item);

    fn implicit_key(&self) -> Option<Value> {
        (!self.key.is_empty()).then(|| Value::from(self.key.as_str()))
    }
}

/// Stands in for its content once built.
#[derive(Debug, Default)]
pub struct Include {
    pub content: Value,
}

impl Include {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Include>::new("Include")
                .default_constructor()
                .property("Content", ValueType::Any, |i| i.content.clone(), |i, v| {
                    i.content = v;
                    Ok(())
                })
                .content_property("Content")
                .build()
        })
    }
}

impl Object for Include {
    object_impl!(Include);

    fn include_content(&self) -> Option<Value> {
        (!self.content.is_null()).then(|| self.content.clone())
    }
}

/// Takes its own children, remembering the element names it saw. Opens a
/// naming scope.
#[derive(Debug, Default)]
pub struct Recorder {
    pub label: String,
    pub seen: Vec<String>,
    pub built: Vec<Value>,
    pub scope: NameScope,
}

impl Recorder {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| {
            ClassBuilder::<Recorder>::new("Recorder")
                .default_constructor()
                .property("Label", ValueType::String, |r| r.label.clone().into(), |r, v| {
                    r.label = string(&v)?;
                    Ok(())
                })
                .build()
        })
    }
}

impl NativeElement for Recorder {
    fn add_native_child(&mut self, element: &Element, child: Value) -> Result<()> {
        self.seen.push(element.name.to_string());
        self.built.push(child);
        Ok(())
    }
}

impl Object for Recorder {
    object_impl!(Recorder);

    fn name_scope(&self) -> Option<&NameScope> {
        Some(&self.scope)
    }

    fn as_native_element_mut(&mut self) -> Option<&mut dyn NativeElement> {
        Some(self)
    }
}

/// Value converter prepending its parameter to the text of a value, and
/// stripping it again on the way back.
#[derive(Debug, Default)]
pub struct Prefix;

impl Prefix {
    pub fn class_def() -> &'static Class {
        static CLASS: OnceLock<Class> = OnceLock::new();
        CLASS.get_or_init(|| ClassBuilder::<Prefix>::new("Prefix").default_constructor().build())
    }
}

impl ValueConverter for Prefix {
    fn convert(&self, value: &Value, _target: &ValueType, parameter: &Value) -> anyhow::Result<Value> {
        Ok(Value::Str(format!("{}{}", parameter, value)))
    }

    fn convert_back(&self, value: &Value, _target: &ValueType, parameter: &Value) -> anyhow::Result<Value> {
        let text = value.to_string();
        let prefix = parameter.to_string();
        text.strip_prefix(&prefix)
            .map(Value::from)
            .ok_or_else(|| anyhow!("'{}' does not start with '{}'", text, prefix))
    }
}

impl Object for Prefix {
    object_impl!(Prefix);

    fn as_value_converter(&self) -> Option<&dyn ValueConverter> {
        Some(self)
    }
}
