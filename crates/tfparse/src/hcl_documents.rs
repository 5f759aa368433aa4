//! collection of hcl documents ([Body] and the source it came from)
//!
//! [HclDocuments] tracks
//! - the source (display name and text, used to turn byte spans into line numbers)
//! - the root blocks
//! - the root attributes
//! and defines a numeric index for each. Once added those indices are stable (removal is not possible)
use hcl_edit::structure::{Attribute, Block, Body, Structure};
use hcl_edit::Span;
use std::path::Path;

#[derive(Default, Debug)]
pub struct HclDocuments {
    sources: Vec<Source>,
    root_attributes: Vec<(usize, Attribute)>,
    root_blocks: Vec<(usize, Block)>,
}

impl HclDocuments {
    /// Inserts and indexes an hcl document
    pub fn insert(&mut self, document: Body, source: Source) {
        let source_index = self.sources.len();
        self.sources.push(source);

        for structure in document.into_iter() {
            match structure {
                Structure::Block(block) => self.root_blocks.push((source_index, block)),
                Structure::Attribute(attribute) => {
                    self.root_attributes.push((source_index, attribute))
                }
            }
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = SourceAttribute> {
        self.root_attributes
            .iter()
            .map(|(source_index, attribute)| (&self.sources[*source_index], attribute))
    }

    pub fn blocks(&self) -> impl Iterator<Item = SourceBlock> {
        self.root_blocks
            .iter()
            .map(|(source_index, block)| (&self.sources[*source_index], block))
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

impl HclDocuments {
    /// Parse a single file, `filename` is the name reported in block metadata
    pub fn load_file(&mut self, file_path: &Path, filename: String) -> Result<(), LoadError> {
        tracing::debug!(path=%file_path.display(), "loading file");

        let text = std::fs::read_to_string(file_path)?;
        let body = hcl_edit::parser::parse_body(&text).map_err(|source| LoadError::HclParseFailed {
            filename: filename.clone(),
            source,
        })?;

        self.insert(body, Source::new(filename, text));
        Ok(())
    }

    /// Load all `*.tf` files of a directory, in file name order
    ///
    /// Files that fail to parse are skipped unless `stop_on_parse_error` is set. File names are
    /// reported relative to `display_root` when possible.
    pub fn load_directory(
        &mut self,
        dir_path: &Path,
        display_root: &Path,
        stop_on_parse_error: bool,
    ) -> Result<(), LoadError> {
        let mut file_paths = vec![];

        let read_dir = std::fs::read_dir(dir_path)?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }

            let is_tf_file = dir_entry.file_name().to_string_lossy().ends_with(".tf");
            if !is_tf_file {
                continue;
            }

            file_paths.push(dir_entry.path());
        }

        file_paths.sort();

        for file_path in file_paths {
            let filename = file_path
                .strip_prefix(display_root)
                .unwrap_or(&file_path)
                .to_string_lossy()
                .into_owned();

            match self.load_file(&file_path, filename) {
                Err(LoadError::HclParseFailed { filename, source }) if !stop_on_parse_error => {
                    tracing::warn!(%filename, error=%source, "skipping file that failed to parse");
                }
                result => result?,
            }
        }

        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("unable to parse {filename}: {source}")]
    HclParseFailed {
        filename: String,
        source: hcl_edit::parser::Error,
    },
}

/// Origin of a document
#[derive(Debug)]
pub struct Source {
    pub filename: String,
    /// byte offsets of every line start
    line_starts: Vec<usize>,
}

impl Source {
    pub fn new(filename: impl Into<String>, text: impl AsRef<str>) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.as_ref().match_indices('\n').map(|(offset, _)| offset + 1))
            .collect();

        Self {
            filename: filename.into(),
            line_starts,
        }
    }

    /// 1-based line containing the byte at `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|start| *start <= offset)
    }

    /// First and last line covered by a spanned element, `(0, 0)` if it has no span
    pub fn line_range(&self, element: &impl Span) -> (usize, usize) {
        let Some(span) = element.span() else {
            return (0, 0);
        };

        let last_byte = span.end.saturating_sub(1).max(span.start);
        (self.line_of(span.start), self.line_of(last_byte))
    }
}

/// Utility macro to create [HclDocuments]
///
/// Create from a single document, reported as `main.tf`
/// ```
/// # use tfparse::hcl_documents;
/// hcl_documents!("resource \"a\" \"b\" {}");
/// ```
///
/// Create from multiple documents
/// ```
/// # use tfparse::hcl_documents;
/// hcl_documents! {
///   "one.tf" => "variable \"one\" {}",
///   "two.tf" => "variable \"two\" {}"
/// };
/// ```
///
/// # Panic
/// Panics on invalid input
///
/// ```should_panic
/// # use tfparse::hcl_documents;
/// hcl_documents!("not = valid = hcl");
/// ```
#[macro_export]
macro_rules! hcl_documents {
    // single document
    { $expr:expr } => {
        $crate::hcl_documents!("main.tf" => $expr)
    };
    // multi document with file names
    { $($source:expr => $expr:expr),+ } => {{
        let mut docs = $crate::hcl_documents::HclDocuments::default();
        $(
            docs.insert(
                hcl_edit::parser::parse_body($expr).expect("body must parse"),
                $crate::hcl_documents::Source::new($source, $expr),
            );
        )+

        docs
    }};
}

pub type SourceAttribute<'a> = (&'a Source, &'a Attribute);
pub type SourceBlock<'a> = (&'a Source, &'a Block);
