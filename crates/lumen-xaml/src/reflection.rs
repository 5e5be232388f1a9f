//! Member lookup, overload resolution and collection-shape helpers shared by
//! the path evaluator, the parser and the namespace handlers.

use crate::convert::TypeConverter;
use crate::descriptor::{
    DataDescriptor, FieldDescriptor, IndexerDescriptor, ObservableDescriptor, SimplePropertyDescriptor,
};
use crate::error::{Error, Result};
use crate::object::{Event, Method, ObjectRef, Param, Signature};
use crate::value::{Value, ValueType};

// ── Members ───────────────────────────────────────────────────────────────

/// Resolve `name` on `obj`: observable property first, then plain property,
/// then field. `Ok(None)` when nothing matches.
pub fn find_member_descriptor(obj: &ObjectRef, name: &str) -> Result<Option<DataDescriptor>> {
    if let Some(dd) = ObservableDescriptor::find(obj, name)? {
        return Ok(Some(DataDescriptor::Observable(dd)));
    }
    if let Some(dd) = SimplePropertyDescriptor::find(obj, name) {
        return Ok(Some(DataDescriptor::SimpleProperty(dd)));
    }
    Ok(FieldDescriptor::find(obj, name).map(DataDescriptor::Field))
}

pub fn find_event<'a>(obj: &'a ObjectRef, name: &str) -> Option<&'a Event> {
    obj.class().event(name)
}

pub fn find_methods<'a>(obj: &'a ObjectRef, name: &str) -> &'a [Method] {
    obj.class().methods(name)
}

// ── Parameters ────────────────────────────────────────────────────────────

/// Number of leading parameters that are not optional.
pub fn mandatory_count(params: &[Param]) -> usize {
    params.iter().rposition(|p| !p.optional).map_or(0, |i| i + 1)
}

/// Convert `values` to the types of `params`, allowing trailing optional
/// parameters to be omitted.
///
/// Non-strict: a count or conversion mismatch yields `Ok(None)`.
/// Strict: the same mismatches are errors.
pub fn consume_parameters(
    values: &[Value],
    params: &[Param],
    strict: bool,
    conv: &TypeConverter,
) -> Result<Option<Vec<Value>>> {
    let mandatory = mandatory_count(params);
    if values.len() < mandatory || values.len() > params.len() {
        if strict {
            return Err(Error::NotSupported(format!(
                "expected {} to {} arguments, got {}",
                mandatory,
                params.len(),
                values.len()
            )));
        }
        return Ok(None);
    }
    let mut converted = Vec::with_capacity(values.len());
    for (value, param) in values.iter().zip(params) {
        match conv.convert(value, &param.ty) {
            Some(v) => converted.push(v),
            None if strict => return Err(Error::conversion(value, &param.ty)),
            None => return Ok(None),
        }
    }
    Ok(Some(converted))
}

/// Convert each value to the type at the same position. Fails when there are
/// more values than types or any conversion fails.
pub fn convert_types(values: &[Value], types: &[ValueType], conv: &TypeConverter) -> Option<Vec<Value>> {
    if values.len() > types.len() {
        return None;
    }
    values.iter().zip(types).map(|(v, t)| conv.convert(v, t)).collect()
}

/// Pick the overload to call with `args`.
///
/// Candidates whose arity fits are considered. A candidate whose parameter
/// types match the arguments exactly wins; otherwise exactly one candidate
/// that can take the arguments by conversion may be chosen. More than one
/// such candidate is ambiguous.
pub fn find_best_member<'a, S: Signature>(
    name: &str,
    candidates: &'a [S],
    args: &[Value],
    conv: &TypeConverter,
) -> Result<Option<(&'a S, Vec<Value>)>> {
    let fits = |c: &&S| {
        let params = c.params();
        args.len() >= mandatory_count(params) && args.len() <= params.len()
    };
    for candidate in candidates.iter().filter(fits) {
        let exact = args
            .iter()
            .zip(candidate.params())
            .all(|(a, p)| !a.is_null() && a.value_type() == p.ty);
        if exact {
            return Ok(Some((candidate, args.to_vec())));
        }
    }
    let mut vague = None;
    for candidate in candidates.iter().filter(fits) {
        if consume_parameters(args, candidate.params(), false, conv)?.is_some() {
            if vague.is_some() {
                return Err(Error::AmbiguousMember(name.to_string()));
            }
            vague = Some(candidate);
        }
    }
    match vague {
        Some(candidate) => {
            let converted = consume_parameters(args, candidate.params(), true, conv)?.unwrap_or_default();
            Ok(Some((candidate, converted)))
        }
        None => Ok(None),
    }
}

// ── Collection shapes ─────────────────────────────────────────────────────

/// Entry type of any enumerable shape.
pub fn find_enumerable_type(ty: &ValueType) -> Option<ValueType> {
    match ty {
        ValueType::Enumerable(entry) => Some((**entry).clone()),
        other => find_collection_type(other),
    }
}

/// Entry type of a sized collection (lists, dictionaries, collection classes).
pub fn find_collection_type(ty: &ValueType) -> Option<ValueType> {
    match ty {
        ValueType::Dict(..) => Some(ValueType::Any),
        ValueType::Object(class) if class.list().is_none() && class.dictionary().is_some() => {
            Some(ValueType::Any)
        }
        other => find_list_type(other),
    }
}

/// Entry type of a list shape.
pub fn find_list_type(ty: &ValueType) -> Option<ValueType> {
    match ty {
        ValueType::List(entry) => Some((**entry).clone()),
        ValueType::Object(class) => class.list().map(|l| l.entry_type().clone()),
        _ => None,
    }
}

/// Key and value types of a dictionary shape.
pub fn find_dictionary_type(ty: &ValueType) -> Option<(ValueType, ValueType)> {
    match ty {
        ValueType::Dict(k, v) => Some(((**k).clone(), (**v).clone())),
        ValueType::Object(class) => class
            .dictionary()
            .map(|d| (d.key_type().clone(), d.value_type().clone())),
        _ => None,
    }
}

/// Elements of a collection-shaped value; a scalar is a one-element
/// collection. Dictionaries contribute their values.
pub fn collection_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Null => None,
        Value::List(items) => Some(items.borrow().clone()),
        Value::Dict(entries) => Some(entries.borrow().values().cloned().collect()),
        Value::Object(obj) => {
            let class = obj.class();
            let target = obj.try_borrow()?;
            if let Some(list) = class.list() {
                Some(list.items(&*target))
            } else if let Some(dict) = class.dictionary() {
                Some(dict.entries(&*target).into_iter().map(|(_, v)| v).collect())
            } else {
                Some(vec![value.clone()])
            }
        }
        scalar => Some(vec![scalar.clone()]),
    }
}

/// Entries of a dictionary-shaped value.
pub fn dictionary_entries(value: &Value) -> Option<Vec<(Value, Value)>> {
    match value {
        Value::Dict(entries) => Some(entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Value::Object(obj) => {
            let dict = obj.class().dictionary()?;
            let target = obj.try_borrow()?;
            Some(dict.entries(&*target))
        }
        _ => None,
    }
}

/// Descriptor for the `index`-th element of an enumerable value: an indexer
/// slot for lists, a snapshot for other sequences. `Ok(None)` when `value`
/// is not enumerable.
pub fn get_enumeration_entry_by_index(value: &Value, index: i64) -> Result<Option<DataDescriptor>> {
    if let Value::List(_) = value {
        return IndexerDescriptor::new(value, vec![Value::Int(index)])
            .map(|d| Some(DataDescriptor::Indexer(d)));
    }
    let Value::Object(obj) = value else {
        return Ok(None);
    };
    if obj.class().list().is_none() && obj.class().dictionary().is_none() {
        return Ok(None);
    }
    let items = collection_items(value).unwrap_or_default();
    let count = items.len();
    usize::try_from(index)
        .ok()
        .and_then(|i| items.into_iter().nth(i))
        .map(|item| Some(DataDescriptor::value_of(item)))
        .ok_or(Error::IndexOutOfRange { index, count })
}

/// Merge `value` into an existing collection `target` instead of replacing
/// it: list entries are appended, dictionary entries inserted, other
/// containers receive children through their add-child capability.
///
/// `Ok(false)` when `target` is not a collection this applies to.
pub fn check_handle_collection_assignment(target: &Value, value: &Value, conv: &TypeConverter) -> Result<bool> {
    if target.is_null() || value.is_null() {
        return Ok(false);
    }
    let target_type = target.value_type();

    if let Some(entry) = find_list_type(&target_type) {
        let items = collection_items(value).unwrap_or_default();
        let converted = items
            .iter()
            .map(|item| conv.convert_or_err(item, &entry))
            .collect::<Result<Vec<_>>>()?;
        match target {
            Value::List(list) => list.borrow_mut().extend(converted),
            Value::Object(obj) => {
                if let Some(list) = obj.class().list() {
                    let mut t = obj.borrow_mut();
                    for item in converted {
                        list.add(&mut *t, item)
                            .map_err(|e| Error::access("add", "list item", obj.class().name(), e))?;
                    }
                }
            }
            _ => return Ok(false),
        }
        return Ok(true);
    }

    if let (Some((key_ty, value_ty)), Some(entries)) = (find_dictionary_type(&target_type), dictionary_entries(value)) {
        let mut converted = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            converted.push((conv.convert_or_err(&k, &key_ty)?, conv.convert_or_err(&v, &value_ty)?));
        }
        match target {
            Value::Dict(dict) => dict.borrow_mut().extend(converted),
            Value::Object(obj) => {
                if let Some(dict) = obj.class().dictionary() {
                    let mut t = obj.borrow_mut();
                    for (k, v) in converted {
                        dict.insert(&mut *t, k, v)
                            .map_err(|e| Error::access("insert", "dictionary entry", obj.class().name(), e))?;
                    }
                }
            }
            _ => return Ok(false),
        }
        return Ok(true);
    }

    if let Value::Object(obj) = target {
        if let Some(add_child) = obj.class().add_child() {
            let items = collection_items(value).unwrap_or_default();
            let converted = items
                .iter()
                .map(|item| conv.convert_or_err(item, add_child.entry_type()))
                .collect::<Result<Vec<_>>>()?;
            let mut t = obj.borrow_mut();
            for child in converted {
                add_child
                    .add(&mut *t, child)
                    .map_err(|e| Error::access("add", "child", obj.class().name(), e))?;
            }
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Calculator, Panel, Person, Tags};

    fn conv() -> TypeConverter {
        TypeConverter::new()
    }

    #[test]
    fn member_lookup_order() {
        let p = ObjectRef::new(Person::named("Ann"));
        assert!(matches!(find_member_descriptor(&p, "Title").unwrap(), Some(DataDescriptor::Observable(_))));
        assert!(matches!(find_member_descriptor(&p, "Name").unwrap(), Some(DataDescriptor::SimpleProperty(_))));
        assert!(matches!(find_member_descriptor(&p, "Age").unwrap(), Some(DataDescriptor::Field(_))));
        assert!(find_member_descriptor(&p, "Nope").unwrap().is_none());
        assert!(find_event(&p, "Renamed").is_some());
    }

    #[test]
    fn consume_with_optional_trailing() {
        let params = [Param::required(ValueType::Int), Param::optional(ValueType::String)];
        assert_eq!(
            consume_parameters(&["1".into()], &params, false, &conv()).unwrap(),
            Some(vec![Value::Int(1)])
        );
        assert_eq!(
            consume_parameters(&["1".into(), Value::Int(2)], &params, false, &conv()).unwrap(),
            Some(vec![Value::Int(1), Value::from("2")])
        );
        assert_eq!(consume_parameters(&[], &params, false, &conv()).unwrap(), None);
        assert!(consume_parameters(&[], &params, true, &conv()).is_err());
        assert_eq!(consume_parameters(&["x".into()], &params, false, &conv()).unwrap(), None);
        assert!(matches!(consume_parameters(&["x".into()], &params, true, &conv()), Err(Error::Conversion { .. })));
    }

    #[test]
    fn convert_types_counts() {
        assert_eq!(convert_types(&["3".into()], &[ValueType::Int], &conv()), Some(vec![Value::Int(3)]));
        assert_eq!(convert_types(&["3".into(), "4".into()], &[ValueType::Int], &conv()), None);
    }

    #[test]
    fn best_member_prefers_exact_match() {
        let calc = ObjectRef::new(Calculator::default());
        let adds = find_methods(&calc, "Add");
        let (m, _) = find_best_member("Add", adds, &[Value::Int(1)], &conv()).unwrap().unwrap();
        assert_eq!(m.params()[0].ty, ValueType::Int);
        let (m, _) = find_best_member("Add", adds, &["x".into()], &conv()).unwrap().unwrap();
        assert_eq!(m.params()[0].ty, ValueType::String);
    }

    #[test]
    fn best_member_ambiguity() {
        let calc = ObjectRef::new(Calculator::default());
        // Float converts to both Int (whole number) and String.
        let err = find_best_member("Add", find_methods(&calc, "Add"), &[Value::Float(2.0)], &conv()).unwrap_err();
        assert!(matches!(err, Error::AmbiguousMember(ref n) if n == "Add"));
        assert!(find_best_member("Add", find_methods(&calc, "Add"), &[], &conv()).unwrap().is_none());
    }

    #[test]
    fn shapes() {
        let tags = ValueType::Object(Tags::class_def());
        assert_eq!(find_list_type(&tags), Some(ValueType::String));
        assert_eq!(find_enumerable_type(&ValueType::Enumerable(Box::new(ValueType::Int))), Some(ValueType::Int));
        assert_eq!(find_collection_type(&ValueType::Enumerable(Box::new(ValueType::Int))), None);
        assert_eq!(find_dictionary_type(&ValueType::dict_of(ValueType::String, ValueType::Int)).map(|(k, _)| k), Some(ValueType::String));
        assert_eq!(find_list_type(&ValueType::Int), None);
    }

    #[test]
    fn entry_by_index() {
        let list = Value::list([Value::Int(1), Value::Int(2)]);
        let dd = get_enumeration_entry_by_index(&list, 1).unwrap().unwrap();
        assert_eq!(dd.value().unwrap(), Value::Int(2));
        let tags = Value::object(Tags { items: vec!["a".into(), "b".into()] });
        let dd = get_enumeration_entry_by_index(&tags, 0).unwrap().unwrap();
        assert_eq!(dd.value().unwrap(), Value::from("a"));
        assert!(matches!(get_enumeration_entry_by_index(&tags, 5), Err(Error::IndexOutOfRange { .. })));
        assert!(get_enumeration_entry_by_index(&Value::Int(3), 0).unwrap().is_none());
    }

    #[test]
    fn collection_merge() {
        let list = Value::list([Value::Int(1)]);
        assert!(check_handle_collection_assignment(&list, &Value::list(["2".into()]), &conv()).unwrap());
        assert!(check_handle_collection_assignment(&list, &Value::Int(3), &conv()).unwrap());
        assert_eq!(list.to_string(), "[1, 2, 3]");

        let dict = Value::dict([]);
        let more = Value::dict([("a".into(), Value::Int(1))]);
        assert!(check_handle_collection_assignment(&dict, &more, &conv()).unwrap());
        assert_eq!(dict.to_string(), "{a: 1}");

        let panel = Value::object(Panel::default());
        assert!(check_handle_collection_assignment(&panel, &Value::object(Person::named("x")), &conv()).unwrap());
        assert_eq!(panel.as_object().unwrap().with(|p: &Panel| p.children.len()), Some(1));

        assert!(!check_handle_collection_assignment(&Value::Int(1), &Value::Int(2), &conv()).unwrap());
        assert!(!check_handle_collection_assignment(&list, &Value::Null, &conv()).unwrap());
    }
}
