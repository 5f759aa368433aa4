//! tfparse cli interface

use clap::{Parser, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Terraform root module directory
    pub path: PathBuf,

    /// Fail on files that are not valid HCL instead of skipping them
    #[clap(long = "stop-on-hcl-error")]
    pub stop_on_hcl_error: bool,

    /// Permit fetching remote modules
    ///
    /// Only modules installed by `terraform init` are evaluated, this flag is accepted for
    /// compatibility.
    #[clap(long = "allow-downloads")]
    pub allow_downloads: bool,

    /// Load variables from a .tfvars file
    ///
    /// Can be specified multiple times, later files override earlier ones.
    #[clap(long = "vars-file")]
    pub vars_files: Vec<PathBuf>,

    /// Value of terraform.workspace
    #[clap(long = "workspace", default_value = "default")]
    pub workspace: String,

    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,

    /// Log diagnostics to stderr
    ///
    /// TFPARSE_LOG takes precedence when set.
    #[clap(long = "debug")]
    pub debug: bool,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
