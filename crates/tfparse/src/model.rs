//! evaluated configuration tree
//!
//! These types are what an [crate::eval::Evaluator] produces and what the conversion engine
//! consumes. The engine only ever reads them.
//!
//! A [ConfigBlock] owns its children. There is no back-reference to the parent, the engine hands
//! the parent down while it walks the tree.
use crate::value::EvaluatedValue;

/// Block type tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Resource,
    Data,
    Module,
    Variable,
    Output,
    Locals,
    Provider,
    Terraform,
    Moved,
    Import,
    Removed,
    Check,
    /// `dynamic` block, generates repeated sibling blocks from its `content`
    Template,
    /// the `content` block of a [BlockKind::Template]
    TemplateBody,
    /// any other block below a root block
    Nested(String),
    /// root block with an identifier we do not know about
    Unknown(String),
}

impl BlockKind {
    /// Kind of a block at the root of a module
    pub fn root(ident: &str) -> Self {
        match ident {
            "resource" => BlockKind::Resource,
            "data" => BlockKind::Data,
            "module" => BlockKind::Module,
            "variable" => BlockKind::Variable,
            "output" => BlockKind::Output,
            "locals" => BlockKind::Locals,
            "provider" => BlockKind::Provider,
            "terraform" => BlockKind::Terraform,
            "moved" => BlockKind::Moved,
            "import" => BlockKind::Import,
            "removed" => BlockKind::Removed,
            "check" => BlockKind::Check,
            other => BlockKind::Unknown(other.to_string()),
        }
    }

    /// Kind of a block nested inside a block of kind `parent`
    pub fn nested(ident: &str, parent: &BlockKind) -> Self {
        match (ident, parent) {
            ("dynamic", _) => BlockKind::Template,
            ("content", BlockKind::Template) => BlockKind::TemplateBody,
            (other, _) => BlockKind::Nested(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BlockKind::Resource => "resource",
            BlockKind::Data => "data",
            BlockKind::Module => "module",
            BlockKind::Variable => "variable",
            BlockKind::Output => "output",
            BlockKind::Locals => "locals",
            BlockKind::Provider => "provider",
            BlockKind::Terraform => "terraform",
            BlockKind::Moved => "moved",
            BlockKind::Import => "import",
            BlockKind::Removed => "removed",
            BlockKind::Check => "check",
            BlockKind::Template => "dynamic",
            BlockKind::TemplateBody => "content",
            BlockKind::Nested(ident) | BlockKind::Unknown(ident) => ident,
        }
    }

    pub fn is_template(&self) -> bool {
        matches!(self, BlockKind::Template)
    }

    /// Default self-descriptor of a block with this kind and `labels`
    ///
    /// `aws_s3_bucket.logs`, `data.aws_region.current`, `variable.name`, `locals`, ...
    pub fn descriptor(&self, labels: &[String]) -> String {
        if matches!(self, BlockKind::Resource) {
            return labels.join(".");
        }

        let mut descriptor = self.as_str().to_string();
        for label in labels {
            descriptor.push('.');
            descriptor.push_str(label);
        }
        descriptor
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filename and line range of a block
#[derive(Debug, Clone, PartialEq, Eq, derive_new::new)]
pub struct SourceRange {
    pub filename: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A named value of a block
#[derive(Debug, Clone, derive_new::new)]
pub struct ConfigAttribute {
    pub name: String,
    /// value as far as the evaluator could determine it
    pub value: EvaluatedValue,
    /// the unevaluated expression
    pub expr: hcl::Expression,
    /// best-effort textual rendering of the expression
    pub raw: String,
}

/// A node of the evaluated configuration tree
#[derive(Debug, Clone)]
pub struct ConfigBlock {
    pub kind: BlockKind,
    pub labels: Vec<String>,
    /// stable identifier, empty if the block has none
    pub id: String,
    pub attributes: Vec<ConfigAttribute>,
    /// child blocks in source order, including expanded template copies
    pub children: Vec<ConfigBlock>,
    pub range: SourceRange,
    /// canonical self-descriptor: `aws_s3_bucket.logs[0]`, `variable.name`, `dynamic.rule`, ...
    pub descriptor: String,
    /// globally unique name, used as reference target: `module.vpc.aws_subnet.private`
    pub full_name: String,
    /// declared number of repetitions of a [BlockKind::Template]
    pub repetitions: usize,
}

impl ConfigBlock {
    pub fn new(kind: BlockKind, labels: Vec<String>, range: SourceRange) -> Self {
        let descriptor = kind.descriptor(&labels);
        Self {
            full_name: descriptor.clone(),
            descriptor,
            kind,
            labels,
            id: String::new(),
            attributes: vec![],
            children: vec![],
            range,
            repetitions: 0,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_attribute(mut self, attribute: ConfigAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_child(mut self, child: ConfigBlock) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// First label (resource type, variable name, module name, ...)
    pub fn type_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    pub fn attribute(&self, name: &str) -> Option<&ConfigAttribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }
}

/// One evaluated module: the root module or a module call
#[derive(Debug, Clone, Default, derive_new::new)]
pub struct ConfigModule {
    /// names of the module calls leading to this module, empty for the root module
    module_path: Vec<String>,
    pub blocks: Vec<ConfigBlock>,
    /// final values of `var.*`
    #[new(default)]
    pub variables: indexmap::IndexMap<String, EvaluatedValue>,
    /// final values of `local.*`
    #[new(default)]
    pub locals: indexmap::IndexMap<String, EvaluatedValue>,
}

impl ConfigModule {
    /// Enclosing module path
    pub fn module_path(&self) -> &[String] {
        &self.module_path
    }

    /// `module.a.module.b`, empty for the root module
    pub fn address_prefix(&self) -> String {
        self.module_path
            .iter()
            .map(|name| format!("module.{name}"))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Prefix `address` with [ConfigModule::address_prefix]
    pub fn qualify(&self, address: &str) -> String {
        let prefix = self.address_prefix();
        if prefix.is_empty() {
            address.to_string()
        } else {
            format!("{prefix}.{address}")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn descriptors() {
        let labels = |l: &[&str]| l.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(
            BlockKind::Resource.descriptor(&labels(&["aws_s3_bucket", "logs"])),
            "aws_s3_bucket.logs"
        );
        assert_eq!(
            BlockKind::Data.descriptor(&labels(&["aws_region", "current"])),
            "data.aws_region.current"
        );
        assert_eq!(BlockKind::Locals.descriptor(&[]), "locals");
        assert_eq!(
            BlockKind::Template.descriptor(&labels(&["ingress"])),
            "dynamic.ingress"
        );
    }

    #[test]
    fn nested_kinds() {
        assert_eq!(
            BlockKind::nested("dynamic", &BlockKind::Resource),
            BlockKind::Template
        );
        assert_eq!(
            BlockKind::nested("content", &BlockKind::Template),
            BlockKind::TemplateBody
        );
        assert_eq!(
            BlockKind::nested("content", &BlockKind::Resource),
            BlockKind::Nested("content".to_string())
        );
    }

    #[test]
    fn qualified_addresses() {
        let root = ConfigModule::new(vec![], vec![]);
        assert_eq!(root.qualify("aws_vpc.main"), "aws_vpc.main");

        let nested = ConfigModule::new(vec!["network".into(), "subnets".into()], vec![]);
        assert_eq!(
            nested.qualify("aws_vpc.main"),
            "module.network.module.subnets.aws_vpc.main"
        );
    }
}
