//! Platform context attached to every event.

use beacon_core::Properties;
use serde_json::Value;

/// Library name reported in `$lib`.
pub const LIB_NAME: &str = "beacon-rust";

/// Library version reported in `$lib_version`.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Supplies host-specific facts (app version, device, locale, ...).
///
/// Called once per event while the payload is built; keep it cheap.
pub trait ContextProvider: Send + Sync {
    fn collect(&self, context: &mut Properties);
}

/// Context provider returning a fixed set of properties.
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    properties: Properties,
}

impl StaticContext {
    pub fn new(properties: Properties) -> Self {
        Self { properties }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl ContextProvider for StaticContext {
    fn collect(&self, context: &mut Properties) {
        context.extend(self.properties.clone());
    }
}

/// Built-in facts, then each provider in registration order.
pub(crate) fn build_context(session_id: &str, providers: &[std::sync::Arc<dyn ContextProvider>]) -> Properties {
    let mut context = Properties::new();
    context.insert("session_id".to_string(), session_id.into());
    context.insert("$lib".to_string(), LIB_NAME.into());
    context.insert("$lib_version".to_string(), LIB_VERSION.into());
    context.insert("$os".to_string(), std::env::consts::OS.into());
    context.insert("$arch".to_string(), std::env::consts::ARCH.into());

    for provider in providers {
        provider.collect(&mut context);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn builtin_facts_present() {
        let context = build_context("session-1", &[]);

        assert_eq!(context["session_id"], "session-1");
        assert_eq!(context["$lib"], LIB_NAME);
        assert_eq!(context["$lib_version"], LIB_VERSION);
        assert_eq!(context["$os"], std::env::consts::OS);
    }

    #[test]
    fn providers_apply_in_order() {
        let providers: Vec<Arc<dyn ContextProvider>> = vec![
            Arc::new(StaticContext::default().with("app", "first").with("locale", "en")),
            Arc::new(StaticContext::default().with("app", "second")),
        ];

        let context = build_context("s", &providers);

        assert_eq!(context["app"], "second");
        assert_eq!(context["locale"], "en");
    }
}
