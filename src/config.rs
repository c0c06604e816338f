//! Run configuration.
//!
//! Settings are layered: built-in defaults, then the YAML settings file, then command line
//! arguments (each of which may also come from a `CERTGEN_*` environment variable, with
//! `.env` loaded first).

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no data source selected; set 'source' to csv or google_sheet")]
    MissingSource,
    #[error("the {kind} data source needs '{key}'")]
    MissingSetting {
        kind: &'static str,
        key: &'static str,
    },
}

/// Which tabular backend supplies the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Csv,
    #[value(alias = "google_sheet")]
    GoogleSheet,
}

/// Backend selection with its required parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataBackend {
    Csv {
        path: PathBuf,
    },
    GoogleSheet {
        spreadsheet_id: String,
        worksheet: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: Option<SourceKind>,
    pub template_header: String,
    pub file_header: String,
    pub preserve_intermediary: bool,
    pub preserve_output: bool,
    pub upload: bool,
    pub change: bool,
    pub replace: bool,
    pub output_folder: PathBuf,
    pub intermediary_folder: PathBuf,
    pub template_folder: PathBuf,
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,
    pub csv_file: Option<PathBuf>,
    pub google_sheet_id: Option<String>,
    pub worksheet: Option<String>,
    pub google_folder_id: Option<String>,
    /// Default template for records that do not name one.
    pub template: Option<String>,
    pub chrome_binary: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            template_header: "Template".to_string(),
            file_header: "File".to_string(),
            preserve_intermediary: false,
            preserve_output: true,
            upload: true,
            change: true,
            replace: false,
            output_folder: PathBuf::from("certificates/results/"),
            intermediary_folder: PathBuf::from("certificates/intermediaries/"),
            template_folder: PathBuf::from("certificates/templates/"),
            config_file: PathBuf::from("config/settings.yaml"),
            credentials_file: PathBuf::from("config/auth/credentials.json"),
            token_file: PathBuf::from("config/auth/token.json"),
            csv_file: None,
            google_sheet_id: None,
            worksheet: None,
            google_folder_id: None,
            template: None,
            chrome_binary: None,
        }
    }
}

/// Command line arguments. Anything left unset keeps the value from the settings file.
#[derive(Debug, Default, Parser)]
#[command(name = "certgen", version, about = "Render table records into PDF documents")]
pub struct Cli {
    /// Data source backend
    #[arg(long, value_enum, env = "CERTGEN_SOURCE")]
    pub source: Option<SourceKind>,

    /// CSV file holding the records
    #[arg(short = 'c', long, env = "CERTGEN_CSV_FILE")]
    pub csv_file: Option<PathBuf>,

    /// Google spreadsheet id
    #[arg(short = 's', long, env = "CERTGEN_SHEET_ID")]
    pub google_sheet_id: Option<String>,

    /// Worksheet title inside the spreadsheet
    #[arg(short = 'w', long, env = "CERTGEN_WORKSHEET")]
    pub worksheet: Option<String>,

    /// Drive folder receiving uploads
    #[arg(short = 'd', long, env = "CERTGEN_DRIVE_FOLDER_ID")]
    pub google_folder_id: Option<String>,

    /// Default template
    #[arg(short = 't', long, env = "CERTGEN_TEMPLATE")]
    pub template: Option<String>,

    #[arg(long, env = "CERTGEN_TEMPLATE_HEADER")]
    pub template_header: Option<String>,

    #[arg(long, env = "CERTGEN_FILE_HEADER")]
    pub file_header: Option<String>,

    #[arg(long, env = "CERTGEN_TEMPLATE_FOLDER")]
    pub template_folder: Option<PathBuf>,

    #[arg(long, env = "CERTGEN_INTERMEDIARY_FOLDER")]
    pub intermediary_folder: Option<PathBuf>,

    #[arg(long, env = "CERTGEN_OUTPUT_FOLDER")]
    pub output_folder: Option<PathBuf>,

    /// YAML settings file
    #[arg(long, env = "CERTGEN_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    #[arg(long, env = "CERTGEN_CREDENTIALS_FILE")]
    pub credentials_file: Option<PathBuf>,

    #[arg(long, env = "CERTGEN_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Browser executable used for PDF export
    #[arg(long, env = "CERTGEN_CHROME")]
    pub chrome_binary: Option<PathBuf>,

    /// Keep the rendered HTML files
    #[arg(long)]
    pub preserve_intermediary: bool,

    /// Keep the PDF files (the default)
    #[arg(long)]
    pub preserve_output: bool,

    /// Delete the PDF files after they are distributed
    #[arg(long, conflicts_with = "preserve_output")]
    pub discard_output: bool,

    /// Keep artifacts local instead of uploading them
    #[arg(long)]
    pub no_upload: bool,

    /// Do not write file references back to the data source
    #[arg(long)]
    pub no_change: bool,

    /// Regenerate records that already reference a file
    #[arg(short = 'r', long)]
    pub replace: bool,
}

impl Cli {
    /// Overlay the arguments that were actually given onto `settings`.
    pub fn apply(&self, settings: &mut Settings) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        fn set_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                target.clone_from(value);
            }
        }

        set_opt(&mut settings.source, &self.source);
        set_opt(&mut settings.csv_file, &self.csv_file);
        set_opt(&mut settings.google_sheet_id, &self.google_sheet_id);
        set_opt(&mut settings.worksheet, &self.worksheet);
        set_opt(&mut settings.google_folder_id, &self.google_folder_id);
        set_opt(&mut settings.template, &self.template);
        set_opt(&mut settings.chrome_binary, &self.chrome_binary);
        set(&mut settings.template_header, &self.template_header);
        set(&mut settings.file_header, &self.file_header);
        set(&mut settings.template_folder, &self.template_folder);
        set(&mut settings.intermediary_folder, &self.intermediary_folder);
        set(&mut settings.output_folder, &self.output_folder);
        set(&mut settings.config_file, &self.config_file);
        set(&mut settings.credentials_file, &self.credentials_file);
        set(&mut settings.token_file, &self.token_file);

        if self.preserve_intermediary {
            settings.preserve_intermediary = true;
        }
        if self.preserve_output {
            settings.preserve_output = true;
        }
        if self.discard_output {
            settings.preserve_output = false;
        }
        if self.no_upload {
            settings.upload = false;
        }
        if self.no_change {
            settings.change = false;
        }
        if self.replace {
            settings.replace = true;
        }
    }
}

impl Settings {
    /// Resolve the final settings for a run.
    ///
    /// A settings file at the default location is optional; one named explicitly must exist.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let (path, explicit) = match &cli.config_file {
            Some(path) => (path.clone(), true),
            None => (Settings::default().config_file, false),
        };

        let mut settings = match std::fs::read_to_string(&path) {
            Ok(raw) => Self::from_yaml(&path, &raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                log::warn!(
                    "Settings file {} not found; using defaults",
                    path.display()
                );
                Settings::default()
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        settings.config_file = path;

        cli.apply(&mut settings);
        settings.backend()?;
        Ok(settings)
    }

    /// Parse a settings document over the defaults. An empty document means defaults.
    pub fn from_yaml(path: &Path, raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The selected backend and its parameters.
    pub fn backend(&self) -> Result<DataBackend, ConfigError> {
        match self.source.ok_or(ConfigError::MissingSource)? {
            SourceKind::Csv => {
                let path = self
                    .csv_file
                    .clone()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or(ConfigError::MissingSetting {
                        kind: "csv",
                        key: "csv_file",
                    })?;
                Ok(DataBackend::Csv { path })
            }
            SourceKind::GoogleSheet => {
                let spreadsheet_id = non_blank(&self.google_sheet_id).ok_or(
                    ConfigError::MissingSetting {
                        kind: "google_sheet",
                        key: "google_sheet_id",
                    },
                )?;
                let worksheet =
                    non_blank(&self.worksheet).ok_or(ConfigError::MissingSetting {
                        kind: "google_sheet",
                        key: "worksheet",
                    })?;
                Ok(DataBackend::GoogleSheet {
                    spreadsheet_id,
                    worksheet,
                })
            }
        }
    }

    /// Google credentials are only needed to read a sheet or upload to Drive.
    pub fn needs_google(&self) -> bool {
        self.upload || self.source == Some(SourceKind::GoogleSheet)
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}
