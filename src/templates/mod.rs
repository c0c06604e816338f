//! Template catalog.
//!
//! Templates live under the template folder as `<path>/<slug>.html` next to a shared
//! `<path>/settings.yaml`. A template is named by its slash-qualified path without the
//! extension (`awards/gold` is `awards/gold.html`). Each one is loaded, compiled and
//! cached the first time it is requested and reused for the rest of the run.

pub mod context;
pub mod naming;

pub use context::{RenderContext, SystemNamespace};

use moka::future::Cache;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tera::Tera;
use thiserror::Error;

const SETTINGS_FILE: &str = "settings.yaml";
const TEMPLATE_EXTENSION: &str = "html";
// The `.html` suffix turns on expression autoescaping for both templates.
const CONTENT_TEMPLATE: &str = "content.html";
const FILE_NAME_TEMPLATE: &str = "file_name.html";

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error("template '{name}' not found at {}", path.display())]
    NotFound { name: String, path: PathBuf },
    #[error("template '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },
}

/// Per-template settings read from `settings.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateSettings {
    /// Expression producing the output file name (without extension).
    pub file_name: Option<String>,
    /// Page format, e.g. `A4` or `Letter`.
    pub format: Option<String>,
    pub landscape: Option<bool>,
    pub intermediary_folder: Option<PathBuf>,
    pub output_folder: Option<PathBuf>,
    /// Everything else, exposed to expressions as `s.settings`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Folders shared by every template of a run.
#[derive(Debug, Clone)]
pub struct CatalogFolders {
    pub template_folder: PathBuf,
    pub intermediary_folder: PathBuf,
    pub output_folder: PathBuf,
}

/// A loaded, compiled template.
#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub file_slug: String,
    pub path_slug: String,
    /// Folder holding the template file, absolute.
    pub base_path: PathBuf,
    pub template_file: PathBuf,
    pub settings: TemplateSettings,
    pub intermediary_folder: PathBuf,
    pub output_folder: PathBuf,
    settings_value: serde_json::Value,
    tera: Tera,
}

impl Template {
    /// Render the document body.
    pub fn render_contents(&self, context: &tera::Context) -> tera::Result<String> {
        self.tera.render(CONTENT_TEMPLATE, context)
    }

    /// Render the raw (still escaped, unsanitized) output file name.
    pub fn render_file_name(&self, context: &tera::Context) -> tera::Result<String> {
        self.tera.render(FILE_NAME_TEMPLATE, context)
    }

    /// Extra settings as JSON, for the render context.
    pub fn settings_value(&self) -> &serde_json::Value {
        &self.settings_value
    }

    /// Base path as exposed to expressions: absolute, with a trailing separator.
    pub fn base_path_string(&self) -> String {
        let mut path = self.base_path.to_string_lossy().into_owned();
        if !path.ends_with(std::path::MAIN_SEPARATOR) {
            path.push(std::path::MAIN_SEPARATOR);
        }
        path
    }
}

/// Split `a/b/slug` into (`a/b`, `slug`).
pub fn split_template_name(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(n) => (&name[..n], &name[n + 1..]),
        None => ("", name),
    }
}

fn validate_name(name: &str) -> Result<(), TemplateError> {
    let (_, slug) = split_template_name(name);
    let escapes = Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));

    if slug.is_empty() || escapes {
        return Err(TemplateError::Invalid {
            name: name.to_string(),
            reason: "template names are relative paths without '.' or '..' segments".to_string(),
        });
    }
    Ok(())
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

async fn read_required(name: &str, path: &Path) -> Result<String, TemplateError> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TemplateError::NotFound {
                name: name.to_string(),
                path: path.to_path_buf(),
            }
        } else {
            TemplateError::Invalid {
                name: name.to_string(),
                reason: format!("cannot read {}: {}", path.display(), e),
            }
        }
    })
}

async fn ensure_folder(name: &str, path: &Path) -> Result<(), TemplateError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| TemplateError::Invalid {
            name: name.to_string(),
            reason: format!("cannot create folder {}: {}", path.display(), e),
        })
}

/// Parse a settings document; an empty file means no settings.
pub fn parse_settings(name: &str, raw: &str) -> Result<TemplateSettings, TemplateError> {
    if raw.trim().is_empty() {
        return Ok(TemplateSettings::default());
    }
    serde_yaml::from_str(raw).map_err(|e| TemplateError::Invalid {
        name: name.to_string(),
        reason: format!("malformed {}: {}", SETTINGS_FILE, e),
    })
}

async fn load_template(folders: &CatalogFolders, name: &str) -> Result<Template, TemplateError> {
    validate_name(name)?;
    log::info!("Loading template '{}'", name);

    let (path_slug, file_slug) = split_template_name(name);
    let base_path = absolute(&folders.template_folder.join(path_slug));
    let template_file = base_path.join(format!("{}.{}", file_slug, TEMPLATE_EXTENSION));
    let settings_file = base_path.join(SETTINGS_FILE);

    let raw_settings = read_required(name, &settings_file).await?;
    let settings = parse_settings(name, &raw_settings)?;
    let settings_value =
        serde_json::to_value(&settings.extra).map_err(|e| TemplateError::Invalid {
            name: name.to_string(),
            reason: format!("settings cannot be exposed to expressions: {}", e),
        })?;

    let intermediary_folder = absolute(
        &settings
            .intermediary_folder
            .clone()
            .unwrap_or_else(|| folders.intermediary_folder.join(path_slug)),
    );
    let output_folder = absolute(
        &settings
            .output_folder
            .clone()
            .unwrap_or_else(|| folders.output_folder.join(path_slug)),
    );
    ensure_folder(name, &intermediary_folder).await?;
    ensure_folder(name, &output_folder).await?;

    let contents = read_required(name, &template_file).await?;
    let file_name = settings
        .file_name
        .clone()
        .ok_or_else(|| TemplateError::Invalid {
            name: name.to_string(),
            reason: format!("{} has no 'file_name' entry", settings_file.display()),
        })?;

    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        (CONTENT_TEMPLATE, contents.as_str()),
        (FILE_NAME_TEMPLATE, file_name.as_str()),
    ])
    .map_err(|e| TemplateError::Invalid {
        name: name.to_string(),
        reason: format!("does not compile: {}", e),
    })?;

    log::debug!(
        "Template '{}': file {}, intermediaries in {}, output in {}",
        name,
        template_file.display(),
        intermediary_folder.display(),
        output_folder.display()
    );

    Ok(Template {
        name: name.to_string(),
        file_slug: file_slug.to_string(),
        path_slug: path_slug.to_string(),
        base_path,
        template_file,
        settings,
        intermediary_folder,
        output_folder,
        settings_value,
        tera,
    })
}

/// Load-once cache of compiled templates.
#[derive(Clone)]
pub struct TemplateCatalog {
    folders: Arc<CatalogFolders>,
    cache: Cache<String, Arc<Template>>,
}

impl TemplateCatalog {
    pub fn new(folders: CatalogFolders) -> Self {
        Self {
            folders: Arc::new(folders),
            cache: Cache::builder().build(),
        }
    }

    pub fn folders(&self) -> &CatalogFolders {
        &self.folders
    }

    /// Return the named template, loading and compiling it on first use.
    pub async fn get(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        let folders = self.folders.clone();
        let owned = name.to_string();
        self.cache
            .try_get_with(name.to_string(), async move {
                load_template(&folders, &owned).await.map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn catalog(root: &Path) -> TemplateCatalog {
        TemplateCatalog::new(CatalogFolders {
            template_folder: root.join("templates"),
            intermediary_folder: root.join("intermediaries"),
            output_folder: root.join("results"),
        })
    }

    fn write_template(root: &Path, path: &str, slug: &str, body: &str, settings: &str) {
        let dir = root.join("templates").join(path);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.html", slug)), body).unwrap();
        fs::write(dir.join("settings.yaml"), settings).unwrap();
    }

    #[test]
    fn test_split_template_name() {
        assert_eq!(split_template_name("greeting"), ("", "greeting"));
        assert_eq!(split_template_name("awards/2019/gold"), ("awards/2019", "gold"));
    }

    #[test]
    fn test_validate_name_rejects_escapes() {
        assert!(validate_name("../secret").is_err());
        assert!(validate_name("awards/").is_err());
        assert!(validate_name("/etc/passwd").is_err());
        assert!(validate_name("awards/gold").is_ok());
    }

    #[test]
    fn test_parse_settings() {
        let settings = parse_settings(
            "t",
            "file_name: \"{{ Name }}\"\nformat: A4\nlandscape: true\nsigner: Dean\n",
        )
        .unwrap();
        assert_eq!(settings.file_name.as_deref(), Some("{{ Name }}"));
        assert_eq!(settings.format.as_deref(), Some("A4"));
        assert_eq!(settings.landscape, Some(true));
        assert!(settings.extra.contains_key("signer"));

        assert!(parse_settings("t", "").unwrap().file_name.is_none());
        assert!(parse_settings("t", "landscape: [").is_err());
    }

    #[tokio::test]
    async fn test_get_loads_and_creates_folders() {
        let dir = tempfile::tempdir().unwrap();
        write_template(
            dir.path(),
            "awards",
            "gold",
            "<p>{{ Name }}</p>",
            "file_name: \"{{ Name }} gold\"\nformat: Letter\n",
        );

        let catalog = catalog(dir.path());
        let template = catalog.get("awards/gold").await.unwrap();

        assert_eq!(template.file_slug, "gold");
        assert_eq!(template.path_slug, "awards");
        assert!(template.intermediary_folder.ends_with("intermediaries/awards"));
        assert!(template.intermediary_folder.is_dir());
        assert!(template.output_folder.is_dir());
        assert!(template.base_path_string().ends_with("awards/"));

        let mut ctx = tera::Context::new();
        ctx.insert("Name", "Ada & Co");
        assert_eq!(template.render_contents(&ctx).unwrap(), "<p>Ada &amp; Co</p>");
        assert_eq!(template.render_file_name(&ctx).unwrap(), "Ada &amp; Co gold");
    }

    #[tokio::test]
    async fn test_get_caches_templates() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "", "greeting", "Hello", "file_name: x\n");

        let catalog = catalog(dir.path());
        assert!(!catalog.is_cached("greeting"));
        let first = catalog.get("greeting").await.unwrap();
        let second = catalog.get("greeting").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(catalog.is_cached("greeting"));
    }

    #[tokio::test]
    async fn test_settings_override_folders() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom-out");
        write_template(
            dir.path(),
            "",
            "letter",
            "Dear {{ Name }}",
            &format!("file_name: x\noutput_folder: {}\n", custom.display()),
        );

        let template = catalog(dir.path()).get("letter").await.unwrap();
        assert_eq!(template.output_folder, custom);
        assert!(custom.is_dir());
    }

    #[tokio::test]
    async fn test_missing_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("templates");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("settings.yaml"), "file_name: x\n").unwrap();

        let err = catalog(dir.path()).get("nothing").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { ref path, .. } if path.ends_with("nothing.html")));
    }

    #[tokio::test]
    async fn test_missing_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("templates");
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join("greeting.html"), "Hello").unwrap();

        let err = catalog(dir.path()).get("greeting").await.unwrap_err();
        assert!(matches!(err, TemplateError::NotFound { ref path, .. } if path.ends_with("settings.yaml")));
    }

    #[tokio::test]
    async fn test_missing_file_name_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "", "greeting", "Hello", "format: A4\n");

        let err = catalog(dir.path()).get("greeting").await.unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_bad_expression_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_template(dir.path(), "", "broken", "{{ Name ", "file_name: x\n");

        let err = catalog(dir.path()).get("broken").await.unwrap_err();
        assert!(matches!(err, TemplateError::Invalid { .. }));
    }
}
