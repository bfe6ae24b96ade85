//! Declarative components described in TOML or JSON.
//!
//! A manifest holds either one component or a `components` array:
//!
//! ```toml
//! reply = ["Hello {{name}}!"]
//! transition = "greeted"
//!
//! [metadata]
//! name = "greeting"
//! supportedActions = ["greeted"]
//!
//! [metadata.properties.name]
//! type = "string"
//! required = true
//!
//! [variables]
//! greeted = true
//! ```
//!
//! `{{key}}` placeholders in string replies are filled from the invocation
//! properties first and the context variables second.

use std::path::Path;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::BoxFuture;
use crate::component::{ComponentMetadata, CustomComponent, HandlerError};
use crate::context::ComponentContext;
use crate::loader::{ComponentLoader, ComponentModule, ComponentSource, LoadError};
use crate::message::MessageModel;

/// One declarative component.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComponentManifest {
    pub metadata: ComponentMetadata,
    #[serde(default)]
    pub reply: Vec<Value>,
    /// Transition along this action once the replies are queued.
    #[serde(default)]
    pub transition: Option<String>,
    #[serde(default)]
    pub keep_turn: Option<bool>,
    #[serde(default)]
    pub variables: Map<String, Value>,
}

impl ComponentManifest {
    fn check(&self) -> Result<(), String> {
        if self.metadata.name.trim().is_empty() {
            return Err("metadata.name must not be empty".to_string());
        }
        if let Some(kind) = self.metadata.event_handler_type {
            return Err(format!(
                "manifests describe custom components, not {kind} handlers"
            ));
        }
        for (i, reply) in self.reply.iter().enumerate() {
            if reply.is_string() {
                continue;
            }
            if let Some(error) = MessageModel::new(reply.clone()).validation_error() {
                return Err(format!("reply[{i}]: {error}"));
            }
        }
        Ok(())
    }

    pub fn into_source(self) -> ComponentSource {
        let metadata = self.metadata.clone();
        ComponentSource::instance(metadata, ManifestComponent { manifest: self })
    }
}

struct ManifestComponent {
    manifest: ComponentManifest,
}

impl CustomComponent for ManifestComponent {
    fn invoke<'a>(
        &'a self,
        ctx: &'a mut ComponentContext,
    ) -> BoxFuture<'a, Result<(), HandlerError>> {
        Box::pin(async move {
            let manifest = &self.manifest;
            for (name, value) in &manifest.variables {
                ctx.set_variable(name, value.clone());
            }
            for reply in &manifest.reply {
                let reply = match reply {
                    Value::String(text) => Value::String(render(text, ctx)),
                    other => other.clone(),
                };
                ctx.reply(reply);
            }
            if let Some(keep_turn) = manifest.keep_turn {
                ctx.keep_turn(keep_turn);
            }
            if let Some(action) = &manifest.transition {
                ctx.transition(Some(action.as_str()));
            }
            Ok(())
        })
    }
}

/// Fill `{{key}}` placeholders; unknown keys render as empty strings.
fn render(template: &str, ctx: &ComponentContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        let value = ctx.property(key).or_else(|| ctx.variable(key));
        match value {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {}
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

const SUPPORTED_EXTENSIONS: [&str; 2] = ["toml", "json"];

/// Loads `.toml` and `.json` manifests; extension-less files are tried as
/// JSON, then TOML.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    extensions: Vec<&'static str>,
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self {
            extensions: SUPPORTED_EXTENSIONS.to_vec(),
        }
    }
}

impl ManifestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the listed extensions during discovery. Unsupported
    /// entries are ignored.
    pub fn with_extensions<S: AsRef<str>>(extensions: &[S]) -> Self {
        let extensions = SUPPORTED_EXTENSIONS
            .into_iter()
            .filter(|supported| extensions.iter().any(|ext| ext.as_ref() == *supported))
            .collect();
        Self { extensions }
    }

    /// Parse manifest text. `format` is `"json"`, `"toml"`, or `None` to
    /// try both.
    pub fn parse(&self, text: &str, format: Option<&str>) -> Result<ComponentModule, String> {
        let document: Value = match format {
            Some("json") => serde_json::from_str(text).map_err(|e| e.to_string())?,
            Some("toml") => toml::from_str(text).map_err(|e| e.to_string())?,
            Some(other) => return Err(format!("unsupported manifest format `{other}`")),
            None => match serde_json::from_str(text) {
                Ok(document) => document,
                Err(_) => toml::from_str(text).map_err(|e| e.to_string())?,
            },
        };
        module_from_document(document)
    }
}

fn module_from_document(mut document: Value) -> Result<ComponentModule, String> {
    let components = document
        .as_object_mut()
        .and_then(|object| object.remove("components"));
    match components {
        Some(Value::Array(entries)) => {
            let mut exports = Vec::with_capacity(entries.len());
            for (i, entry) in entries.into_iter().enumerate() {
                let manifest = manifest_from_value(entry).map_err(|e| format!("components[{i}]: {e}"))?;
                exports.push((manifest.metadata.name.clone(), manifest.into_source()));
            }
            Ok(ComponentModule::Named(exports))
        }
        Some(_) => Err("`components` must be an array".to_string()),
        None => Ok(ComponentModule::single(manifest_from_value(document)?.into_source())),
    }
}

fn manifest_from_value(value: Value) -> Result<ComponentManifest, String> {
    let manifest: ComponentManifest = serde_json::from_value(value).map_err(|e| e.to_string())?;
    manifest.check()?;
    Ok(manifest)
}

impl ComponentLoader for ManifestLoader {
    fn extensions(&self) -> &[&str] {
        &self.extensions
    }

    fn load(&self, path: &Path) -> Result<ComponentModule, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format = path.extension().and_then(|ext| ext.to_str());
        debug!(path = %path.display(), "Loading component manifest");
        self.parse(&text, format).map_err(|reason| LoadError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const GREETING: &str = r#"
reply = ["Hello {{name}}, you are {{age}}!"]
transition = "greeted"

[metadata]
name = "greeting"
supportedActions = ["greeted"]

[metadata.properties.name]
type = "string"
required = true

[variables]
greeted = true
"#;

    fn context() -> ComponentContext {
        ComponentContext::from_value(json!({
            "botId": "bot",
            "platformVersion": "1.1",
            "context": {"variables": {"age": {"type": "int", "value": 42, "entity": false}}},
            "properties": {"name": "Ada"},
            "message": {
                "messagePayload": {"text": "hi"},
                "channelConversation": {
                    "botId": "bot", "sessionId": "s", "type": "test", "userId": "u", "channelId": "c"
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_toml_manifest_runs() {
        let module = ManifestLoader::new().parse(GREETING, Some("toml")).unwrap();
        let (_, source) = module.into_exports().remove(0);
        let component = source.qualify().unwrap();
        assert_eq!(component.name(), "greeting");
        assert!(component.metadata().properties["name"].required);

        let crate::component::ComponentKind::Custom(instance) = component.kind() else {
            panic!("expected a custom component");
        };
        let mut ctx = context();
        instance.invoke(&mut ctx).await.unwrap();
        let response = ctx.into_response();
        assert_eq!(response.messages[0].text(), Some("Hello Ada, you are 42!"));
        assert_eq!(response.action.as_deref(), Some("greeted"));
        assert!(response.transition);
        assert!(response.modify_context);
    }

    #[test]
    fn test_json_components_array() {
        let text = r#"{"components": [
            {"metadata": {"name": "a"}, "reply": ["one"]},
            {"metadata": {"name": "b"}, "reply": [{"type": "text", "text": "two"}]}
        ]}"#;
        let exports = ManifestLoader::new().parse(text, None).unwrap().into_exports();
        let names: Vec<_> = exports.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_extensionless_falls_back_to_toml() {
        assert!(ManifestLoader::new().parse(GREETING, None).is_ok());
    }

    #[test]
    fn test_invalid_manifests_rejected() {
        let loader = ManifestLoader::new();
        assert!(loader.parse(r#"{"metadata": {"name": ""}}"#, Some("json")).is_err());
        assert!(
            loader
                .parse(r#"{"metadata": {"name": "x"}, "reply": [{"type": "hologram"}]}"#, Some("json"))
                .unwrap_err()
                .contains("reply[0]")
        );
        assert!(
            loader
                .parse(r#"{"metadata": {"name": "x"}, "colour": "red"}"#, Some("json"))
                .is_err()
        );
        assert!(
            loader
                .parse(
                    r#"{"metadata": {"name": "x", "eventHandlerType": "DataQuery"}}"#,
                    Some("json")
                )
                .is_err()
        );
    }

    #[test]
    fn test_with_extensions_filters_unsupported() {
        let loader = ManifestLoader::with_extensions(&["toml", "yaml"]);
        assert_eq!(loader.extensions(), &["toml"]);
        assert!(loader.accepts(Path::new("a.toml")));
        assert!(!loader.accepts(Path::new("a.json")));
    }

    #[test]
    fn test_render_leaves_unclosed_braces() {
        let ctx = context();
        assert_eq!(render("{{missing}} ok", &ctx), " ok");
        assert_eq!(render("broken {{name", &ctx), "broken {{name");
    }
}
