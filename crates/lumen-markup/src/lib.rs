//! Syntax front end for **Lumen markup** (`.xaml`).
//!
//! This crate only knows about text: it reads an XML document into a
//! positioned element tree and understands the two small grammars embedded in
//! attribute values (`{Extension ...}` expressions and `[a, b]` index lists).
//! Resolving names to types and building objects is the job of `lumen-xaml`.
//!
//! # Structure
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`document`] | `Document`, `Element`, `Attribute`, `Node`, `QName`, `parse_document` |
//! | [`error`] | `ParseError` |
//! | [`extension`] | `ExtensionExpr`, `ExtensionParams`, `parse_attribute_value`, `split_indices` |
//!
//! # Quick start
//!
//! ```rust
//! use lumen_markup::{parse_document, parse_attribute_value, AttributeValue};
//!
//! let doc = parse_document(r#"<Panel Title="{Binding Name}"><Label/></Panel>"#).unwrap();
//! assert_eq!(doc.root.name.local, "Panel");
//!
//! let title = parse_attribute_value(&doc.root.attributes[0].value).unwrap();
//! assert!(matches!(title, AttributeValue::Extension(e) if e.name == "Binding"));
//! ```

pub mod document;
pub mod error;
pub mod extension;

pub use document::{parse_document, Attribute, Document, Element, Node, QName};
pub use error::ParseError;
pub use extension::{
    parse_attribute_value, parse_extension, split_indices, AttributeValue, ExtensionExpr,
    ExtensionParams,
};
