//! A loaded document and the operations the command line runs on it.

use anyhow::{anyhow, Context};
use log::info;
use lumen_xaml::{
    BoundMethod, DataDescriptor, NamespaceContext, NamespaceResolver, ObjectRef, Parser, ParserConfig,
    PathExpression, Value,
};

use crate::handlers;
use crate::model;

/// Parsed object graph plus what keeps it live: the namespace context for
/// compiling paths and the bindings created while parsing.
#[derive(Debug)]
pub struct Session {
    root: Value,
    context: NamespaceResolver,
    bindings: Vec<ObjectRef>,
}

impl Session {
    pub fn config() -> ParserConfig {
        ParserConfig::new()
            .with_types(model::registry())
            .with_namespace("", model::NAMESPACE_URI)
            .with_event_handler_resolver(handlers::resolve)
    }

    pub fn load(src: &str) -> anyhow::Result<Self> {
        let mut parser = Parser::new(src, Self::config())?;
        let root = parser.parse()?;
        let context = parser.namespace_context();
        let bindings = parser.into_bindings();
        info!("loaded {} with {} live binding(s)", root.describe(), bindings.len());
        Ok(Self { root, context, bindings })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    fn compile(&self, path: &str) -> anyhow::Result<PathExpression> {
        PathExpression::compile(&self.context, path).with_context(|| format!("invalid path '{}'", path))
    }

    /// Descriptor `path` leads to from the root.
    pub fn locate(&self, path: &str) -> anyhow::Result<DataDescriptor> {
        self.compile(path)?
            .evaluate(&DataDescriptor::value_of(self.root.clone()))?
            .ok_or_else(|| anyhow!("'{}' does not resolve on {}", path, self.root.describe()))
    }

    pub fn evaluate(&self, path: &str) -> anyhow::Result<Value> {
        Ok(self.locate(path)?.value()?)
    }

    /// Parse `PATH=VALUE` and store the converted value.
    pub fn assign(&self, assignment: &str) -> anyhow::Result<()> {
        let (path, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected PATH=VALUE, got '{}'", assignment))?;
        let target = self.locate(path.trim())?;
        let value = self.context.converter().convert_or_err(&Value::from(raw.trim()), &target.data_type())?;
        target.set_value(value).with_context(|| format!("cannot assign '{}'", path.trim()))?;
        Ok(())
    }

    /// Call the parameterless method `path` names.
    pub fn invoke(&self, path: &str) -> anyhow::Result<Value> {
        let method: BoundMethod = self
            .compile(path)?
            .get_method(&DataDescriptor::value_of(self.root.clone()))?
            .ok_or_else(|| anyhow!("'{}' does not name a method", path))?;
        Ok(method.invoke(&[])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Button, Slider, Window};

    const PLAYER: &str = include_str!("../ui/player.xaml");

    fn ok<T>(result: anyhow::Result<T>) -> T {
        match result {
            Ok(v) => v,
            Err(e) => panic!("unexpected error: {:#}", e),
        }
    }

    fn err<T: std::fmt::Debug>(result: anyhow::Result<T>) -> String {
        format!("{:#}", result.expect_err("expected an error"))
    }

    #[test]
    fn bundled_screen_loads() {
        let session = ok(Session::load(PLAYER));
        let title = session.root().as_object().and_then(|o| o.with(|w: &Window| w.title.clone()));
        assert_eq!(title.as_deref(), Some("Lumen Player"));
        assert_eq!(session.binding_count(), 3);
        assert_eq!(ok(session.evaluate("[readout].Text")), Value::from("40"));
    }

    #[test]
    fn assignments_flow_through_bindings() {
        let session = ok(Session::load(PLAYER));
        ok(session.assign("[volume].Value=75"));
        assert_eq!(ok(session.evaluate("[readout].Text")), Value::from("75"));
        assert_eq!(ok(session.evaluate("[balance].Value")), Value::Float(75.0));

        ok(session.assign("[balance].Value = 20"));
        assert_eq!(ok(session.evaluate("[volume].Value")), Value::Float(20.0));

        ok(session.assign("[mute].IsChecked=true"));
        assert_eq!(ok(session.evaluate("[balance].IsEnabled")), Value::Bool(false));
    }

    #[test]
    fn methods_are_invoked_by_path() {
        let session = ok(Session::load(PLAYER));
        assert_eq!(ok(session.invoke("[play].PerformClick")), Value::Int(1));
        assert_eq!(ok(session.invoke("[play].PerformClick")), Value::Int(2));
        let play = ok(session.evaluate("[play]"));
        assert_eq!(play.as_object().and_then(|o| o.with(|b: &Button| b.clicks)), Some(2));
        assert_eq!(ok(session.invoke("[stop].PerformClick")), Value::Int(1));
    }

    #[test]
    fn attached_values_are_addressable() {
        let session = ok(Session::load(PLAYER));
        assert_eq!(ok(session.evaluate("[volume].(StackPanel.Spacing)")), Value::Int(8));
        let volume = ok(session.evaluate("[volume]"));
        assert_eq!(volume.as_object().and_then(|o| o.with(|s: &Slider| s.maximum)), Some(100.0));
    }

    #[test]
    fn failures_are_reported() {
        let session = ok(Session::load(PLAYER));
        assert!(err(session.evaluate("[nobody].Text")).contains("nobody"));
        assert!(err(session.assign("[volume].Value")).contains("PATH=VALUE"));
        assert!(err(session.invoke("Title")).contains("method"));
        assert!(err(Session::load("<Window><Unknown/></Window>")).contains("Unknown"));
        assert!(err(Session::load(r#"<Button Click="on_launch"/>"#)).contains("on_launch"));
    }
}
