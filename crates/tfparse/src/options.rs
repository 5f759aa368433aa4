use std::path::PathBuf;

/// Options of a conversion
#[derive(Debug, Clone)]
pub struct Options {
    /// log diagnostics to stderr
    pub debug: bool,
    /// fail instead of skipping files that are not valid hcl
    pub stop_on_hcl_error: bool,
    /// permit fetching remote modules
    pub allow_downloads: bool,
    /// variable files, relative paths are resolved against the root directory
    pub vars_paths: Vec<PathBuf>,
    /// value of `terraform.workspace`
    pub workspace_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            stop_on_hcl_error: false,
            allow_downloads: false,
            vars_paths: vec![],
            workspace_name: "default".to_string(),
        }
    }
}

impl Options {
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_stop_on_hcl_error(mut self, stop_on_hcl_error: bool) -> Self {
        self.stop_on_hcl_error = stop_on_hcl_error;
        self
    }

    pub fn with_allow_downloads(mut self, allow_downloads: bool) -> Self {
        self.allow_downloads = allow_downloads;
        self
    }

    pub fn with_vars_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.vars_paths.push(path.into());
        self
    }

    pub fn with_workspace_name(mut self, workspace_name: impl Into<String>) -> Self {
        self.workspace_name = workspace_name.into();
        self
    }

    /// Log sink matching these options
    ///
    /// Writes to stderr at debug level if [Options::debug] is set, discards everything otherwise.
    pub fn log_sink(&self) -> tracing::Dispatch {
        if !self.debug {
            return tracing::Dispatch::none();
        }

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .finish();

        tracing::Dispatch::new(subscriber)
    }
}
