//! Script environment
//!
//! A structured spec is a minijinja template that renders to a JSON array of
//! tests. Templates in the same directory can be included or imported, and
//! macros defined in a spec double as custom assertions:
//!
//! ```jinja
//! {% macro single_row(actual) -%}
//!   {% if (actual | returned | length) != 1 %}expected one returned event{% endif %}
//! {%- endmacro %}
//! [{"name": "one", "test": "/* s1 */ select 1;", "assertMethod": "single_row"}]
//! ```

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use minijinja::{context, AutoEscape, Environment, Value};
use regex::Regex;

/// Errors raised by spec templates, filters and assertion scripts
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template error in {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("invalid filter expression `{expr}`: {source}")]
    Filter {
        expr: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("invalid assertion name `{0}`")]
    InvalidName(String),

    #[error("assertion `{name}` is not defined in {template}")]
    UnknownAssertion { name: String, template: String },
}

fn base_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.add_filter("returned", crate::filters::returned);
    env.add_filter("errors", crate::filters::errors);
    env.add_filter("session", crate::filters::session);
    env.add_filter("cells", crate::filters::cells);
    env
}

fn is_identifier(name: &str) -> bool {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    IDENT
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(name))
}

/// Template environment rooted at a spec file's directory
pub struct ScriptEnv {
    env: Environment<'static>,
    template: String,
    path: PathBuf,
}

impl std::fmt::Debug for ScriptEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEnv").field("path", &self.path).finish()
    }
}

impl ScriptEnv {
    /// Create an environment for the spec at `path`
    pub fn for_spec(path: &Path) -> Result<Self, ScriptError> {
        if !path.is_file() {
            return Err(ScriptError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "spec file not found"),
            });
        }
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let template = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut env = base_environment();
        tracing::debug!(dir = %dir.display(), template = %template, "spec environment");
        env.set_loader(minijinja::path_loader(dir));

        Ok(Self {
            env,
            template,
            path: path.to_path_buf(),
        })
    }

    /// Path of the spec this environment renders
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render the spec template to text
    pub fn render_spec(&self) -> Result<String, ScriptError> {
        self.env
            .get_template(&self.template)
            .and_then(|tmpl| tmpl.render(context! {}))
            .map_err(|source| self.template_error(source))
    }

    /// Ensure `name` is a macro the spec defines
    pub fn check_assertion(&self, name: &str) -> Result<(), ScriptError> {
        if !is_identifier(name) {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        let tmpl = self
            .env
            .get_template(&self.template)
            .map_err(|source| self.template_error(source))?;
        let captured = tmpl
            .render_captured(context! {})
            .map_err(|source| self.template_error(source))?;
        match captured.state().lookup(name) {
            Some(value) if !value.is_undefined() => Ok(()),
            _ => Err(ScriptError::UnknownAssertion {
                name: name.to_string(),
                template: self.template.clone(),
            }),
        }
    }

    /// Call assertion macro `name` with `actual` bound to the history JSON
    ///
    /// Returns the trimmed output; an empty string means the assertion held.
    pub fn run_assertion(&self, name: &str, actual: &serde_json::Value) -> Result<String, ScriptError> {
        if !is_identifier(name) {
            return Err(ScriptError::InvalidName(name.to_string()));
        }
        let source = format!(
            "{{% from {:?} import {name} %}}{{{{ {name}(actual) }}}}",
            self.template
        );
        let output = self
            .env
            .render_str(&source, context! { actual => Value::from_serialize(actual) })
            .map_err(|source| self.template_error(source))?;
        Ok(output.trim().to_string())
    }

    fn template_error(&self, source: minijinja::Error) -> ScriptError {
        ScriptError::Template {
            name: self.template.clone(),
            source,
        }
    }
}

/// Name the compiled filter is registered under
const FILTER_TEMPLATE: &str = "<filter>";

/// Predicate over candidate tests, written as a minijinja expression
///
/// The candidate is bound to `test`, e.g. `'gc' in test.labels`. The
/// expression is compiled once, as a template printing `1` when it holds.
pub struct TestFilter {
    env: Environment<'static>,
    expr: String,
}

impl std::fmt::Debug for TestFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestFilter").field("expr", &self.expr).finish()
    }
}

impl TestFilter {
    /// Compile a filter expression
    pub fn new(expr: &str) -> Result<Self, ScriptError> {
        let to_error = |source| ScriptError::Filter {
            expr: expr.to_string(),
            source,
        };
        let mut env = base_environment();
        env.compile_expression(expr).map_err(to_error)?;
        env.add_template_owned(FILTER_TEMPLATE, format!("{{% if {expr} %}}1{{% endif %}}"))
            .map_err(to_error)?;
        Ok(Self {
            env,
            expr: expr.to_string(),
        })
    }

    /// Expression text
    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// Whether `test` is selected
    pub fn matches(&self, test: &serde_json::Value) -> Result<bool, ScriptError> {
        let to_error = |source| ScriptError::Filter {
            expr: self.expr.clone(),
            source,
        };
        let selected = self
            .env
            .get_template(FILTER_TEMPLATE)
            .and_then(|tmpl| tmpl.render(context! { test => Value::from_serialize(test) }))
            .map_err(to_error)?;
        Ok(selected == "1")
    }
}
