//! HTML rendering of the cluster settings
//!
//! [`ReportRenderer`] turns rows into a single HTML page through a handlebars
//! template. Every piece of text coming from the cluster or the DSN goes
//! through `{{ }}` interpolation, which HTML-escapes it; the template has no
//! raw `{{{ }}}` blocks.

pub mod redact;

use crate::queries::ClusterSetting;
use handlebars::Handlebars;
use serde::Serialize;

pub use redact::{PLACEHOLDER, Visibility, classify};

const TEMPLATE_NAME: &str = "cluster_settings";
const TEMPLATE: &str = include_str!("settings.html.hbs");

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid report template")]
    Template(#[from] handlebars::TemplateError),

    #[error("failed to render report")]
    Render(#[from] handlebars::RenderError),
}

/// Values handed to the template
#[derive(Debug, Serialize)]
struct Report<'a> {
    descriptor: &'a str,
    rows: Vec<Row<'a>>,
}

#[derive(Debug, Serialize)]
struct Row<'a> {
    name: &'a str,
    display_value: &'a str,
    description: &'a str,
    redacted: bool,
}

impl<'a> From<&'a ClusterSetting> for Row<'a> {
    fn from(setting: &'a ClusterSetting) -> Self {
        let redacted = classify(&setting.name).is_redacted();
        Self {
            name: &setting.name,
            display_value: if redacted {
                PLACEHOLDER
            } else {
                setting.value.as_str()
            },
            description: &setting.description,
            redacted,
        }
    }
}

/// Renders the settings page; cheap to share between requests
pub struct ReportRenderer {
    handlebars: Handlebars<'static>,
}

impl ReportRenderer {
    /// Compile the page template
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded template does not parse
    pub fn new() -> Result<Self, RenderError> {
        let mut handlebars = Handlebars::new();

        // Fail on missing fields instead of rendering them empty
        handlebars.set_strict_mode(true);
        handlebars.register_template_string(TEMPLATE_NAME, TEMPLATE)?;

        Ok(Self { handlebars })
    }

    /// Render the page for `settings`, keeping their order
    ///
    /// The output depends only on the arguments, so equal inputs give
    /// byte-identical pages.
    ///
    /// # Errors
    ///
    /// Returns an error if the template fails to render
    pub fn render(
        &self,
        descriptor: &str,
        settings: &[ClusterSetting],
    ) -> Result<String, RenderError> {
        let report = Report {
            descriptor,
            rows: settings.iter().map(Row::from).collect(),
        };

        Ok(self.handlebars.render(TEMPLATE_NAME, &report)?)
    }
}

/// Connection target shown on the page, without credentials
///
/// Everything after the first `@` of the DSN, i.e. host, port, database and
/// query parameters. A DSN without credentials is shown minus its scheme.
#[must_use]
pub fn connection_descriptor(dsn: &str) -> String {
    let dsn = dsn.trim();
    if let Some((_, target)) = dsn.split_once('@') {
        return target.to_string();
    }

    dsn.split_once("://")
        .map_or(dsn, |(_, target)| target)
        .to_string()
}
