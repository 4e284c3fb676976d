//! Template engine based on MiniJinja

use indexmap::IndexMap;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, Value};
use std::sync::{Arc, OnceLock};

use cort_core::Parameters;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::functions;
use crate::lookup::{self, ObjectStore, StaticObjectStore};

/// Ordered set of named template sources (IndexMap preserves insertion order)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    templates: IndexMap<String, String>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template; a template with the same name is replaced in place
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.add(name, source);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.templates.iter().map(|(n, s)| (n.as_str(), s.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Output of rendering one template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    /// Path of the artifact, same as the template name
    pub path: String,
    pub content: Vec<u8>,
}

impl RenderedArtifact {
    pub fn content_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }
}

/// Inputs of a render pass
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub parameters: &'a Parameters,
}

impl<'a> RenderContext<'a> {
    pub fn new(namespace: &'a str, name: &'a str, parameters: &'a Parameters) -> Self {
        Self {
            namespace,
            name,
            parameters,
        }
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
    client: Option<Arc<dyn ObjectStore>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict_mode: true,
            client: None,
        }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    /// Object store used by `lookup` and `mustLookup`
    pub fn with_client(mut self, client: Arc<dyn ObjectStore>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            strict_mode: self.strict_mode,
            client: self
                .client
                .unwrap_or_else(|| Arc::new(StaticObjectStore::new())),
        }
    }
}

/// Pure filters and functions, registered once per process
fn base_environment() -> &'static Environment<'static> {
    static BASE: OnceLock<Environment<'static>> = OnceLock::new();

    BASE.get_or_init(|| {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("fromyaml", filters::fromyaml);
        env.add_filter("fromjson", filters::fromjson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("empty", filters::empty);
        env.add_filter("haskey", filters::haskey);
        env.add_filter("keys", filters::keys);
        env.add_filter("merge", filters::merge);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);

        env.add_function("fail", functions::fail);
        env.add_function("dict", functions::dict);
        env.add_function("list", functions::list);
        env.add_function("get", functions::get);
        env.add_function("dig", functions::dig);
        env.add_function("coalesce", functions::coalesce);
        env.add_function("ternary", functions::ternary);
        env.add_function("tostring", functions::tostring);
        env.add_function("toint", functions::toint);
        env.add_function("printf", functions::printf);
        env.add_function("tpl", functions::tpl);

        env
    })
}

/// The template engine
#[derive(Clone)]
pub struct Engine {
    strict_mode: bool,
    client: Arc<dyn ObjectStore>,
}

impl Engine {
    /// Engine with an empty object store
    pub fn new(strict_mode: bool) -> Self {
        EngineBuilder::new().strict(strict_mode).build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn is_strict(&self) -> bool {
        self.strict_mode
    }

    /// Environment for one render pass
    ///
    /// Starts from the shared pure library and adds the structural helpers for
    /// `ctx` and the lookup helpers bound to this engine's client.
    fn create_environment(&self, ctx: &RenderContext<'_>) -> Environment<'static> {
        let mut env = base_environment().clone();

        env.set_undefined_behavior(if self.strict_mode {
            UndefinedBehavior::Strict
        } else {
            UndefinedBehavior::Lenient
        });

        let parameters = Value::from_serialize(ctx.parameters.inner());
        env.add_function("parameters", move || parameters.clone());

        let namespace = ctx.namespace.to_string();
        env.add_function("deployment_namespace", move || namespace.clone());

        let name = ctx.name.to_string();
        env.add_function("deployment_name", move || name.clone());

        lookup::register(&mut env, Arc::clone(&self.client));

        env
    }

    fn template_error(
        err: minijinja::Error,
        name: &str,
        source: &str,
        ctx: &RenderContext<'_>,
    ) -> EngineError {
        EngineError::Template(TemplateError::from_minijinja(
            err,
            name,
            source,
            Some(ctx.parameters.inner()),
        ))
    }

    /// Render a single template string
    pub fn render_string(
        &self,
        template: &str,
        ctx: &RenderContext<'_>,
        template_name: &str,
    ) -> Result<String> {
        let set = TemplateSet::new().with(template_name, template);
        let mut artifacts = self.render_all(&set, ctx)?;
        match artifacts.pop() {
            Some(artifact) => String::from_utf8(artifact.content)
                .map_err(|_| TemplateError::simple(template_name, "output is not valid UTF-8").into()),
            None => Ok(String::new()),
        }
    }

    /// Render every template of the set
    ///
    /// All templates share one environment so they can include each other.
    /// The parameters are the root context. Any failure aborts the whole pass.
    pub fn render_all(
        &self,
        templates: &TemplateSet,
        ctx: &RenderContext<'_>,
    ) -> Result<Vec<RenderedArtifact>> {
        let mut env = self.create_environment(ctx);

        for (name, source) in templates.iter() {
            env.add_template_owned(name.to_string(), source.to_string())
                .map_err(|e| Self::template_error(e, name, source, ctx))?;
        }

        let root = Value::from_serialize(ctx.parameters.inner());
        let mut artifacts = Vec::with_capacity(templates.len());

        for (name, source) in templates.iter() {
            let rendered = env
                .get_template(name)
                .and_then(|tmpl| tmpl.render(&root))
                .map_err(|e| Self::template_error(e, name, source, ctx))?;

            tracing::trace!(template = name, bytes = rendered.len(), "rendered template");

            artifacts.push(RenderedArtifact {
                path: name.to_string(),
                content: rendered.into_bytes(),
            });
        }

        tracing::debug!(
            templates = artifacts.len(),
            strict = self.strict_mode,
            namespace = ctx.namespace,
            name = ctx.name,
            "rendered template set"
        );

        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorKind;
    use cort_core::DecodedObject;

    fn parameters() -> Parameters {
        Parameters::from_yaml(
            r#"
env: prod
image:
  repository: nginx
  tag: "1.25"
replicas: 3
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_simple() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let result = engine.render_string("replicas: {{ replicas }}", &ctx, "t.yaml").unwrap();
        assert_eq!(result, "replicas: 3");
    }

    #[test]
    fn test_render_keeps_trailing_newline() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let result = engine.render_string("env: {{ env }}\n", &ctx, "t.yaml").unwrap();
        assert_eq!(result, "env: prod\n");
    }

    #[test]
    fn test_render_with_filters() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let template = "image: {{ image | toyaml | nindent(2) }}";
        let result = engine.render_string(template, &ctx, "t.yaml").unwrap();

        assert!(result.contains("\n  repository: nginx"));
        assert!(result.contains("\n  tag: '1.25'"));
    }

    #[test]
    fn test_structural_helpers() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let template = "{{ deployment_namespace() }}/{{ deployment_name() }} {{ parameters().image.tag }}";
        let result = engine.render_string(template, &ctx, "t.yaml").unwrap();

        assert_eq!(result, "apps/shop 1.25");
    }

    #[test]
    fn test_strict_undefined_fails() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let err = engine
            .render_string("value: {{ missing }}", &ctx, "t.yaml")
            .unwrap_err();

        match err {
            EngineError::Template(e) => {
                assert_eq!(e.kind(), TemplateErrorKind::UndefinedVariable);
                assert_eq!(e.template, "t.yaml");
                assert_eq!(e.line, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lenient_undefined_renders_empty() {
        let engine = Engine::new(false);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let result = engine
            .render_string("value: '{{ missing }}'", &ctx, "t.yaml")
            .unwrap();
        assert_eq!(result, "value: ''");
    }

    #[test]
    fn test_render_all_preserves_order_and_includes() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let set = TemplateSet::new()
            .with("z.yaml", "{% include 'labels.txt' %}")
            .with("labels.txt", "app: {{ deployment_name() }}");

        let artifacts = engine.render_all(&set, &ctx).unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].path, "z.yaml");
        assert_eq!(artifacts[0].content_str(), "app: shop");
        assert_eq!(artifacts[1].path, "labels.txt");
    }

    #[test]
    fn test_render_all_aborts_on_first_error() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let set = TemplateSet::new()
            .with("ok.yaml", "a: 1")
            .with("bad.yaml", "a: 1\nb: {{ fail('boom') }}");

        let err = engine.render_all(&set, &ctx).unwrap_err();
        let EngineError::Template(e) = err else {
            panic!("expected template error");
        };
        assert_eq!(e.template, "bad.yaml");
        assert_eq!(e.line, Some(2));
        assert!(e.message.contains("boom"));
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let engine = Engine::new(true);
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let err = engine.render_string("{{ oops", &ctx, "t.yaml").unwrap_err();
        let EngineError::Template(e) = err else {
            panic!("expected template error");
        };
        assert_eq!(e.kind(), TemplateErrorKind::SyntaxError);
    }

    #[test]
    fn test_lookup_through_client() {
        let cm = DecodedObject::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "apps"},
            "data": {"color": "blue"}
        }))
        .unwrap();
        let engine = Engine::builder()
            .with_client(Arc::new(StaticObjectStore::from_objects([cm])))
            .build();
        let params = parameters();
        let ctx = RenderContext::new("apps", "shop", &params);

        let template = r#"{{ lookup("v1", "ConfigMap", deployment_namespace(), "settings").data.color }}"#;
        let result = engine.render_string(template, &ctx, "t.yaml").unwrap();
        assert_eq!(result, "blue");
    }

    #[test]
    fn test_yaml_templates_are_not_escaped() {
        let engine = Engine::new(true);
        let params = Parameters::from_yaml("msg: \"a <b> & 'c'\"").unwrap();
        let ctx = RenderContext::new("", "", &params);

        let result = engine.render_string("{{ msg }}", &ctx, "t.yaml").unwrap();
        assert_eq!(result, "a <b> & 'c'");
    }
}
