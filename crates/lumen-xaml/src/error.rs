use lumen_markup::ParseError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed markup or path syntax, duplicate names/keys, misplaced attributes.
    Structural,
    /// Member resolution, conversion and accessor failures.
    Binding,
}

#[derive(Debug, Error)]
pub enum Error {
    // ── structural ────────────────────────────────────────────────────────
    #[error(transparent)]
    Markup(#[from] ParseError),

    #[error("{0}")]
    Syntax(String),

    #[error("invalid path '{path}' at position {position}: {message}")]
    Path { path: String, position: usize, message: String },

    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    #[error("name '{0}' is already registered in this naming scope")]
    DuplicateName(String),

    #[error("{0}")]
    AttributeNotAllowed(String),

    #[error("the parser has already parsed its document")]
    AlreadyParsed,

    #[error("the root element cannot carry a key")]
    KeyOnRoot,

    #[error("namespace prefix '{0}' is not declared")]
    UndefinedPrefix(String),

    #[error("namespace '{0}' is not supported")]
    NamespaceNotSupported(String),

    #[error("children of '{0}' mix keyed and unkeyed elements, and an unkeyed element has no implicit key")]
    MixedKeyedChildren(String),

    // ── binding ───────────────────────────────────────────────────────────
    #[error("type '{name}' was not found in namespace '{namespace}'")]
    TypeNotFound { name: String, namespace: String },

    #[error("member '{member}' was not found on '{target}'")]
    MemberNotFound { member: String, target: String },

    #[error("cannot convert '{value}' to type '{target}'")]
    Conversion { value: String, target: String },

    #[error("value '{value}' is not assignable to '{target}' of type '{expected}'")]
    TypeMismatch { target: String, expected: String, value: String },

    #[error("{0}")]
    NotSupported(String),

    #[error("ambiguous call to '{0}': more than one overload matches")]
    AmbiguousMember(String),

    #[error("failed to {action} '{member}' on '{target}'")]
    Access {
        action: &'static str,
        member: String,
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("error evaluating path '{path}'")]
    Evaluation {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error("index {index} is out of range (count {count})")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("member '{member}' on '{target}' does not yield an observable property")]
    NotAnObservable { member: String, target: String },

    #[error("'{member}' cannot be retargeted to '{target}'")]
    IncompatibleTarget { member: String, target: String },

    #[error("indices [{indices}] do not fit the indexer of '{target}'")]
    IncompatibleIndices { indices: String, target: String },

    #[error("'{0}' does not support child elements")]
    ChildrenNotSupported(String),

    #[error("cannot resolve handler '{handler}' for event '{event}'")]
    EventHandler {
        event: String,
        handler: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // ── context ───────────────────────────────────────────────────────────
    #[error("error in element <{element}> at {line}:{col}")]
    Element {
        element: String,
        line: usize,
        col: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Markup(_)
            | Error::Syntax(_)
            | Error::Path { .. }
            | Error::DuplicateKey(_)
            | Error::DuplicateName(_)
            | Error::AttributeNotAllowed(_)
            | Error::AlreadyParsed
            | Error::KeyOnRoot
            | Error::UndefinedPrefix(_)
            | Error::NamespaceNotSupported(_)
            | Error::MixedKeyedChildren(_) => ErrorClass::Structural,
            Error::Evaluation { source, .. } | Error::Element { source, .. } => source.class(),
            _ => ErrorClass::Binding,
        }
    }

    /// The innermost error, looking through element and evaluation wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Evaluation { source, .. } | Error::Element { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Attach element position once; an error that already names its element
    /// is passed through unchanged so the innermost element wins.
    pub(crate) fn in_element(self, element: &lumen_markup::Element) -> Error {
        match self {
            e @ Error::Element { .. } => e,
            other => Error::Element {
                element: element.name.to_string(),
                line: element.line,
                col: element.col,
                source: Box::new(other),
            },
        }
    }

    pub(crate) fn access(
        action: &'static str,
        member: impl Into<String>,
        target: impl Into<String>,
        source: anyhow::Error,
    ) -> Error {
        Error::Access {
            action,
            member: member.into(),
            target: target.into(),
            source: source.into(),
        }
    }

    pub(crate) fn conversion(value: &crate::value::Value, target: &crate::value::ValueType) -> Error {
        Error::Conversion { value: value.to_string(), target: target.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes() {
        assert_eq!(Error::DuplicateKey("a".into()).class(), ErrorClass::Structural);
        assert_eq!(Error::AmbiguousMember("f".into()).class(), ErrorClass::Binding);
        let wrapped = Error::Evaluation {
            path: "A.B".into(),
            source: Box::new(Error::IndexOutOfRange { index: 4, count: 2 }),
        };
        assert_eq!(wrapped.class(), ErrorClass::Binding);
        assert!(matches!(wrapped.root_cause(), Error::IndexOutOfRange { index: 4, .. }));
    }

    #[test]
    fn element_wrapping_keeps_innermost() {
        let doc = lumen_markup::parse_document("<Outer><Inner/></Outer>").unwrap();
        let inner = doc.root.child_elements().next().unwrap();
        let err = Error::KeyOnRoot.in_element(inner).in_element(&doc.root);
        match err {
            Error::Element { element, .. } => assert_eq!(element, "Inner"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn access_keeps_source() {
        let err = Error::access("get", "Name", "Person", anyhow::anyhow!("boom"));
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("boom"));
    }
}
