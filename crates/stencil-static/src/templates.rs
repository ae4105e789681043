//! Template engine for rendering pages.

use std::collections::BTreeMap;

use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior, Value};
use serde_json::Map;

use stencil_content::{PageDescriptor, TemplateSet};

/// Name the base layout is registered under.
pub const BASE_TEMPLATE: &str = "layouts/base";

/// Context key the rendered page body is injected under in the base layout.
pub const BODY_KEY: &str = "body";

/// Errors that can occur while compiling or rendering templates.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Failed to compile template {name}: {message}")]
    Compile { name: String, message: String },

    #[error("Failed to render page {page}: {message}")]
    Render { page: String, message: String },
}

/// Template engine using minijinja.
///
/// One engine is built per build from a freshly loaded [`TemplateSet`], so
/// repeated builds in the same process never share registrations.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Compile every template in the set.
    ///
    /// Components are registered under their bare names so any template can
    /// `{% include "name" %}` them. Page templates live under `pages/<stem>`.
    pub fn new(templates: &TemplateSet) -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_function("add", add);
        env.add_filter("add", add);

        for component in templates.components.iter() {
            add_template(&mut env, component.name.clone(), component.source.clone())?;
        }

        add_template(
            &mut env,
            BASE_TEMPLATE.to_string(),
            templates.base_layout.clone(),
        )?;

        for (name, source) in &templates.pages {
            add_template(&mut env, page_template_name(name), source.clone())?;
        }

        Ok(Self { env })
    }

    /// Render a page.
    ///
    /// The page template produces the body. Standalone pages return the body
    /// as is; every other page is rendered into the base layout with the same
    /// context plus the body under [`BODY_KEY`].
    pub fn render_page(
        &self,
        page: &PageDescriptor,
        context: &Map<String, serde_json::Value>,
    ) -> Result<String, RenderError> {
        let fail = |e: Error| RenderError::Render {
            page: page.name.clone(),
            message: format!("{e:#}"),
        };

        let body = self
            .env
            .get_template(&page_template_name(page.kind.template()))
            .and_then(|tmpl| tmpl.render(context))
            .map_err(fail)?;

        if page.kind.is_standalone() {
            return Ok(body);
        }

        let mut layout_context: BTreeMap<String, Value> = context
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_serialize(value)))
            .collect();
        layout_context.insert(BODY_KEY.to_string(), Value::from_safe_string(body));

        self.env
            .get_template(BASE_TEMPLATE)
            .and_then(|tmpl| tmpl.render(&layout_context))
            .map_err(fail)
    }
}

fn page_template_name(stem: &str) -> String {
    format!("pages/{stem}")
}

fn add_template(
    env: &mut Environment<'static>,
    name: String,
    source: String,
) -> Result<(), RenderError> {
    env.add_template_owned(name.clone(), source)
        .map_err(|e| RenderError::Compile {
            name,
            message: e.to_string(),
        })
}

/// Integer addition, available as `add(a, b)` and `a | add(b)`.
fn add(a: i64, b: i64) -> Result<i64, Error> {
    a.checked_add(b)
        .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "integer overflow in add"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stencil_content::{ComponentRegistry, PageKind};

    fn template_set() -> TemplateSet {
        let mut components = ComponentRegistry::new();
        components
            .register(
                "nav",
                "components/nav.html",
                "<nav>{% for link in navigation %}<a href=\"{{ link.href }}\">{{ link.label }}</a>{% endfor %}</nav>",
            )
            .unwrap();
        components
            .register("hero", "components/hero.html", "<h1>{{ title }}</h1>")
            .unwrap();

        let mut pages = BTreeMap::new();
        pages.insert(
            "landing-page".to_string(),
            "{% include \"hero\" %}<ol>{% for item in steps %}<li>{{ add(loop.index0, 1) }}. {{ item }}</li>{% endfor %}</ol>"
                .to_string(),
        );
        pages.insert(
            "landing-page-anduril".to_string(),
            "<!DOCTYPE html><main>{{ title }}</main>".to_string(),
        );

        TemplateSet {
            components,
            base_layout: "<html>{% include \"nav\" %}<div id=\"page\">{{ body }}</div>\
                          <footer>{{ footer.text }}</footer></html>"
                .to_string(),
            pages,
        }
    }

    fn context(value: serde_json::Value) -> Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn wraps_page_in_base_layout() {
        let engine = TemplateEngine::new(&template_set()).unwrap();
        let page = PageDescriptor::new("about", PageKind::Landing);

        let html = engine
            .render_page(
                &page,
                &context(json!({
                    "title": "About",
                    "steps": ["Plan", "Build"],
                    "navigation": [{"label": "Home", "href": "index.html"}],
                    "footer": {"text": "Bye"},
                })),
            )
            .unwrap();

        assert!(html.starts_with("<html><nav><a href=\"index.html\">Home</a></nav>"));
        assert!(html.contains("<div id=\"page\"><h1>About</h1>"));
        assert!(html.contains("<li>1. Plan</li><li>2. Build</li>"));
        assert!(html.ends_with("<footer>Bye</footer></html>"));
    }

    #[test]
    fn standalone_pages_are_not_wrapped() {
        let engine = TemplateEngine::new(&template_set()).unwrap();
        let page = PageDescriptor::new(
            "promo",
            PageKind::Standalone {
                template: "landing-page-anduril".to_string(),
            },
        );

        let html = engine
            .render_page(&page, &context(json!({"title": "Promo"})))
            .unwrap();

        assert_eq!(html, "<!DOCTYPE html><main>Promo</main>");
    }

    #[test]
    fn escapes_content_values() {
        let engine = TemplateEngine::new(&template_set()).unwrap();
        let page = PageDescriptor::new(
            "promo",
            PageKind::Standalone {
                template: "landing-page-anduril".to_string(),
            },
        );

        let html = engine
            .render_page(&page, &context(json!({"title": "<b>x</b>"})))
            .unwrap();

        assert!(html.contains("&lt;b&gt;x&lt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn add_helper_works_as_function_and_filter() {
        let mut set = template_set();
        set.pages.insert(
            "landing-page".to_string(),
            "{{ add(2, 3) }}|{{ 40 | add(2) }}".to_string(),
        );
        let engine = TemplateEngine::new(&set).unwrap();
        let page = PageDescriptor::new("math", PageKind::Landing);

        let html = engine.render_page(&page, &context(json!({}))).unwrap();

        assert!(html.contains("<div id=\"page\">5|42</div>"));
    }

    #[test]
    fn reports_compile_errors() {
        let mut set = template_set();
        set.pages.insert("broken".to_string(), "{% if %}".to_string());

        let result = TemplateEngine::new(&set);

        assert!(matches!(
            result,
            Err(RenderError::Compile { ref name, .. }) if name == "pages/broken"
        ));
    }

    #[test]
    fn reports_missing_page_template_at_render() {
        let engine = TemplateEngine::new(&template_set()).unwrap();
        let page = PageDescriptor::new("home", PageKind::Home);

        let result = engine.render_page(&page, &context(json!({})));

        assert!(matches!(result, Err(RenderError::Render { ref page, .. }) if page == "home"));
    }
}
