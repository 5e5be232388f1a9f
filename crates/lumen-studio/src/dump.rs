//! Indented text rendering of an object graph.

use std::io::{self, Write};

use lumen_xaml::{ObjectRef, Value, ValueType};

/// Graphs deeper than this are cut off; bindings can make them cyclic.
const MAX_DEPTH: usize = 12;

/// Write `value` and everything reachable through readable members.
pub fn write_tree(out: &mut impl Write, value: &Value) -> io::Result<()> {
    write_value(out, None, value, 0)
}

fn write_value(out: &mut impl Write, label: Option<&str>, value: &Value, depth: usize) -> io::Result<()> {
    let indent = "  ".repeat(depth);
    let label = label.map(|l| format!("{} = ", l)).unwrap_or_default();
    match value {
        Value::Object(obj) if depth < MAX_DEPTH => {
            writeln!(out, "{}{}{}", indent, label, obj.class().name())?;
            write_members(out, obj, depth + 1)
        }
        Value::Object(obj) => writeln!(out, "{}{}{} …", indent, label, obj.class().name()),
        Value::List(items) => {
            let items = items.borrow().clone();
            if items.iter().all(|v| !matches!(v, Value::Object(_))) {
                return writeln!(out, "{}{}{}", indent, label, value);
            }
            writeln!(out, "{}{}[{}]", indent, label, items.len())?;
            for item in &items {
                write_value(out, None, item, depth + 1)?;
            }
            Ok(())
        }
        Value::Str(s) => writeln!(out, "{}{}{:?}", indent, label, s),
        other => writeln!(out, "{}{}{}", indent, label, other),
    }
}

fn write_members(out: &mut impl Write, obj: &ObjectRef, depth: usize) -> io::Result<()> {
    let class = obj.class();
    let Some(instance) = obj.try_borrow() else {
        return writeln!(out, "{}<in use>", "  ".repeat(depth));
    };
    let mut members = Vec::new();
    for member in class.members().filter(|m| m.can_read() && m.index_params().is_empty()) {
        let value = match member.get(&*instance, &[]) {
            Ok(value) => value,
            Err(e) => Value::Str(format!("<{}>", e)),
        };
        // Observable members are listed under their property name.
        let name = match member.value_type() {
            ValueType::Observable => member.name().strip_suffix("Property").unwrap_or(member.name()),
            _ => member.name(),
        };
        if !value.is_null() {
            members.push((name.to_string(), value));
        }
    }
    if let Some(attached) = instance.attached_properties() {
        for key in attached.keys() {
            if let Some(property) = attached.get(&key) {
                members.push((format!("({})", key), property.value()));
            }
        }
    }
    drop(instance);
    for (name, value) in members {
        let value = match value {
            Value::Property(p) => p.value(),
            other => other,
        };
        write_value(out, Some(&name), &value, depth)?;
    }
    Ok(())
}
