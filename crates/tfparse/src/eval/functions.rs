//! function registry
//!
//! A subset of the terraform built-in functions, implemented on top of [hcl::eval::FuncDef].
//!
//! Relative paths given to the filesystem functions (`file`, `fileexists`, `fileset`) are
//! resolved against the directory of the current [BaseDirectory], the root module directory
//! while a module tree is evaluated.
use hcl::eval::{Context, Evaluate, FuncArgs, FuncDef, ParamType};
use hcl::expr::FuncCall;
use hcl::{Expression, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

thread_local! {
    static BASE_DIRECTORY: RefCell<PathBuf> = RefCell::new(PathBuf::from("."));
}

/// Base directory of the filesystem functions on this thread, restored on drop
#[derive(Debug)]
pub(crate) struct BaseDirectory {
    previous: PathBuf,
}

impl BaseDirectory {
    pub fn enter(directory: &Path) -> Self {
        let previous = BASE_DIRECTORY.with(|base| base.replace(directory.to_path_buf()));
        Self { previous }
    }
}

impl Drop for BaseDirectory {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut self.previous);
        BASE_DIRECTORY.with(|base| *base.borrow_mut() = previous);
    }
}

fn resolve_path(path: &str) -> PathBuf {
    BASE_DIRECTORY.with(|base| base.borrow().join(path))
}

/// Named functions available to expressions
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    funcs: BTreeMap<String, FuncDef>,
}

impl FunctionRegistry {
    /// Registry with all built-in functions
    pub fn builtin() -> Self {
        let mut registry = Self::default();

        // strings
        registry.declare(
            "lower",
            FuncDef::builder().param(ParamType::String).build(lower),
        );
        registry.declare(
            "upper",
            FuncDef::builder().param(ParamType::String).build(upper),
        );
        registry.declare(
            "trimspace",
            FuncDef::builder().param(ParamType::String).build(trimspace),
        );
        registry.declare(
            "trimprefix",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .build(trimprefix),
        );
        registry.declare(
            "trimsuffix",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .build(trimsuffix),
        );
        registry.declare(
            "replace",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .param(ParamType::String)
                .build(replace),
        );
        registry.declare(
            "join",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::array_of(ParamType::Any))
                .build(join),
        );
        registry.declare(
            "split",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .build(split),
        );
        registry.declare(
            "format",
            FuncDef::builder()
                .param(ParamType::String)
                .variadic_param(ParamType::Any)
                .build(format),
        );

        // collections
        registry.declare(
            "length",
            FuncDef::builder().param(ParamType::Any).build(length),
        );
        registry.declare(
            "concat",
            FuncDef::builder()
                .variadic_param(ParamType::array_of(ParamType::Any))
                .build(concat),
        );
        registry.declare(
            "merge",
            FuncDef::builder()
                .variadic_param(ParamType::nullable(ParamType::object_of(ParamType::Any)))
                .build(merge),
        );
        registry.declare(
            "keys",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .build(keys),
        );
        registry.declare(
            "values",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .build(values),
        );
        registry.declare(
            "lookup",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .param(ParamType::String)
                .variadic_param(ParamType::Any)
                .build(lookup),
        );
        registry.declare(
            "contains",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .param(ParamType::Any)
                .build(contains),
        );
        registry.declare(
            "element",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .param(ParamType::Number)
                .build(element),
        );
        registry.declare(
            "flatten",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .build(flatten),
        );
        registry.declare(
            "distinct",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .build(distinct),
        );
        registry.declare(
            "coalesce",
            FuncDef::builder()
                .variadic_param(ParamType::Any)
                .build(coalesce),
        );

        // conversion
        registry.declare(
            "tolist",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .build(identity),
        );
        registry.declare(
            "toset",
            FuncDef::builder()
                .param(ParamType::array_of(ParamType::Any))
                .build(toset),
        );
        registry.declare(
            "tomap",
            FuncDef::builder()
                .param(ParamType::object_of(ParamType::Any))
                .build(identity),
        );
        registry.declare(
            "tostring",
            FuncDef::builder().param(ParamType::Any).build(tostring),
        );
        registry.declare(
            "tonumber",
            FuncDef::builder().param(ParamType::Any).build(tonumber),
        );

        // numeric
        registry.declare(
            "min",
            FuncDef::builder()
                .variadic_param(ParamType::Number)
                .build(min),
        );
        registry.declare(
            "max",
            FuncDef::builder()
                .variadic_param(ParamType::Number)
                .build(max),
        );
        registry.declare(
            "abs",
            FuncDef::builder().param(ParamType::Number).build(abs),
        );

        // filesystem
        registry.declare(
            "file",
            FuncDef::builder().param(ParamType::String).build(file),
        );
        registry.declare(
            "fileexists",
            FuncDef::builder().param(ParamType::String).build(fileexists),
        );
        registry.declare(
            "fileset",
            FuncDef::builder()
                .param(ParamType::String)
                .param(ParamType::String)
                .build(fileset),
        );

        registry
    }

    pub fn declare(&mut self, name: impl Into<String>, func: FuncDef) {
        self.funcs.insert(name.into(), func);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    /// Declare every function in an evaluation context
    pub fn declare_into(&self, context: &mut Context) {
        for (name, func) in &self.funcs {
            context.declare_func(name.as_str(), func.clone());
        }
    }

    /// Call a function with already evaluated arguments
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let Some(func) = self.funcs.get(name) else {
            return Err(CallError::UnknownFunction(name.to_string()));
        };

        let mut context = Context::new();
        context.declare_func(name, func.clone());

        let mut call = FuncCall::builder(name);
        for arg in args {
            call = call.arg(Expression::from(arg));
        }

        Expression::FuncCall(Box::new(call.build()))
            .evaluate(&context)
            .map_err(|errors| CallError::Failed(errors.to_string()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CallError {
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("{0}")]
    Failed(String),
}

fn arg_str(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args[index]
        .as_str()
        .ok_or_else(|| format!("argument {index} must be a string"))
}

fn arg_array(args: &FuncArgs, index: usize) -> Result<&Vec<Value>, String> {
    args[index]
        .as_array()
        .ok_or_else(|| format!("argument {index} must be a list"))
}

fn arg_f64(args: &FuncArgs, index: usize) -> Result<f64, String> {
    args[index]
        .as_f64()
        .ok_or_else(|| format!("argument {index} must be a number"))
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Value::from(n as i64);
    }
    hcl::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Render a primitive the way string interpolation does
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(arg_str(&args, 0)?.to_lowercase()))
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(arg_str(&args, 0)?.to_uppercase()))
}

fn trimspace(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(arg_str(&args, 0)?.trim()))
}

fn trimprefix(args: FuncArgs) -> Result<Value, String> {
    let (s, prefix) = (arg_str(&args, 0)?, arg_str(&args, 1)?);
    Ok(Value::from(s.strip_prefix(prefix).unwrap_or(s)))
}

fn trimsuffix(args: FuncArgs) -> Result<Value, String> {
    let (s, suffix) = (arg_str(&args, 0)?, arg_str(&args, 1)?);
    Ok(Value::from(s.strip_suffix(suffix).unwrap_or(s)))
}

fn replace(args: FuncArgs) -> Result<Value, String> {
    let (s, from, to) = (arg_str(&args, 0)?, arg_str(&args, 1)?, arg_str(&args, 2)?);
    Ok(Value::from(s.replace(from, to)))
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = arg_str(&args, 0)?;
    let parts = arg_array(&args, 1)?
        .iter()
        .map(|v| value_to_string(v).ok_or_else(|| "join expects a list of strings".to_string()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(parts.join(separator)))
}

fn split(args: FuncArgs) -> Result<Value, String> {
    let (separator, s) = (arg_str(&args, 0)?, arg_str(&args, 1)?);
    Ok(Value::from(
        s.split(separator).map(Value::from).collect::<Vec<_>>(),
    ))
}

fn format(args: FuncArgs) -> Result<Value, String> {
    let spec = arg_str(&args, 0)?;
    let mut values = args.iter().skip(1);
    let mut out = String::new();
    let mut chars = spec.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.next() {
            Some('%') => out.push('%'),
            Some('s' | 'd' | 'v') => {
                let value = values
                    .next()
                    .ok_or_else(|| "not enough arguments for format".to_string())?;
                let rendered = value_to_string(value)
                    .ok_or_else(|| "format only supports primitive arguments".to_string())?;
                out.push_str(&rendered);
            }
            Some(other) => return Err(format!("unsupported format verb %{other}")),
            None => return Err("format string ends with %".to_string()),
        }
    }

    Ok(Value::from(out))
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        _ => return Err("length expects a string, list or map".to_string()),
    };
    Ok(Value::from(len as i64))
}

fn concat(args: FuncArgs) -> Result<Value, String> {
    let mut result: Vec<Value> = Vec::new();
    for index in 0..args.len() {
        result.extend(arg_array(&args, index)?.iter().cloned());
    }
    Ok(Value::from(result))
}

fn merge(args: FuncArgs) -> Result<Value, String> {
    let mut result = hcl::value::Map::new();
    for arg in args.iter() {
        if let Value::Object(object) = arg {
            for (key, value) in object {
                result.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(Value::Object(result))
}

fn sorted_entries(value: &Value) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = value.as_object().into_iter().flatten().collect();
    entries.sort_by(|(a, _), (b, _)| a.cmp(b));
    entries
}

fn keys(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(
        sorted_entries(&args[0])
            .into_iter()
            .map(|(key, _)| Value::from(key.as_str()))
            .collect::<Vec<_>>(),
    ))
}

fn values(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(
        sorted_entries(&args[0])
            .into_iter()
            .map(|(_, value)| value.clone())
            .collect::<Vec<_>>(),
    ))
}

fn lookup(args: FuncArgs) -> Result<Value, String> {
    let key = arg_str(&args, 1)?;
    if let Some(value) = args[0].as_object().and_then(|object| object.get(key)) {
        return Ok(value.clone());
    }

    if args.len() > 2 {
        return Ok(args[2].clone());
    }

    Err(format!("lookup failed to find key {key:?}"))
}

fn contains(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Bool(arg_array(&args, 0)?.contains(&args[1])))
}

fn element(args: FuncArgs) -> Result<Value, String> {
    let list = arg_array(&args, 0)?;
    if list.is_empty() {
        return Err("cannot use element function with an empty list".to_string());
    }

    let index = arg_f64(&args, 1)?;
    if index < 0.0 {
        return Err("element index must not be negative".to_string());
    }

    Ok(list[index as usize % list.len()].clone())
}

fn flatten(args: FuncArgs) -> Result<Value, String> {
    fn flatten_into(values: &[Value], out: &mut Vec<Value>) {
        for v in values {
            match v.as_array() {
                Some(inner) => flatten_into(inner, out),
                None => out.push(v.clone()),
            }
        }
    }

    let mut result = Vec::new();
    flatten_into(arg_array(&args, 0)?, &mut result);
    Ok(Value::from(result))
}

fn distinct_values(values: &[Value]) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();
    for v in values {
        if !result.contains(v) {
            result.push(v.clone());
        }
    }
    result
}

fn distinct(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::from(distinct_values(arg_array(&args, 0)?)))
}

fn coalesce(args: FuncArgs) -> Result<Value, String> {
    args.iter()
        .find(|v| match v {
            Value::Null => false,
            Value::String(s) => !s.is_empty(),
            _ => true,
        })
        .cloned()
        .ok_or_else(|| "no non-null, non-empty-string arguments".to_string())
}

fn identity(args: FuncArgs) -> Result<Value, String> {
    Ok(args[0].clone())
}

fn toset(args: FuncArgs) -> Result<Value, String> {
    let mut values = distinct_values(arg_array(&args, 0)?);

    // sets of primitives have a stable order
    if values.iter().all(|v| v.is_string()) {
        values.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else if values.iter().all(|v| v.is_number()) {
        values.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.total_cmp(&b)
        });
    }

    Ok(Value::from(values))
}

fn tostring(args: FuncArgs) -> Result<Value, String> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        other => value_to_string(other)
            .map(Value::from)
            .ok_or_else(|| "cannot convert to string".to_string()),
    }
}

fn tonumber(args: FuncArgs) -> Result<Value, String> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Number(n) => Ok(Value::Number(n.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(number)
            .map_err(|_| format!("cannot convert {s:?} to number")),
        _ => Err("cannot convert to number".to_string()),
    }
}

fn numbers(args: &FuncArgs) -> Result<Vec<f64>, String> {
    (0..args.len()).map(|index| arg_f64(args, index)).collect()
}

fn min(args: FuncArgs) -> Result<Value, String> {
    numbers(&args)?
        .into_iter()
        .reduce(f64::min)
        .map(number)
        .ok_or_else(|| "min expects at least one number".to_string())
}

fn max(args: FuncArgs) -> Result<Value, String> {
    numbers(&args)?
        .into_iter()
        .reduce(f64::max)
        .map(number)
        .ok_or_else(|| "max expects at least one number".to_string())
}

fn abs(args: FuncArgs) -> Result<Value, String> {
    Ok(number(arg_f64(&args, 0)?.abs()))
}

fn file(args: FuncArgs) -> Result<Value, String> {
    let path = resolve_path(arg_str(&args, 0)?);
    std::fs::read_to_string(&path)
        .map(Value::from)
        .map_err(|err| format!("{}: {err}", path.display()))
}

fn fileexists(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Bool(resolve_path(arg_str(&args, 0)?).is_file()))
}

/// Files below a directory matching a glob pattern, relative to that directory and sorted
fn fileset(args: FuncArgs) -> Result<Value, String> {
    let directory = resolve_path(arg_str(&args, 0)?);
    let pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&directory.to_string_lossy()),
        arg_str(&args, 1)?
    );

    let mut matches = vec![];
    for entry in glob::glob(&pattern).map_err(|err| err.to_string())? {
        let path = entry.map_err(|err| err.to_string())?;
        if !path.is_file() {
            continue;
        }

        if let Ok(relative) = path.strip_prefix(&directory) {
            matches.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
    matches.sort();

    Ok(Value::from(
        matches.into_iter().map(Value::from).collect::<Vec<_>>(),
    ))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn call(name: &str, args: Vec<Value>) -> Value {
        FunctionRegistry::builtin()
            .call(name, args)
            .expect("call must succeed")
    }

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn merge_objects() {
        let merged = call(
            "merge",
            vec![
                object(&[("Environment", "sandbox".into())]),
                object(&[("ApplyTimeVal", Value::Null)]),
            ],
        );

        assert_eq!(
            merged,
            object(&[
                ("Environment", "sandbox".into()),
                ("ApplyTimeVal", Value::Null)
            ])
        );
    }

    #[test]
    fn string_functions() {
        assert_eq!(call("upper", vec!["default".into()]), Value::from("DEFAULT"));
        assert_eq!(call("lower", vec!["OTHER".into()]), Value::from("other"));
        assert_eq!(
            call("trimprefix", vec!["abc/def".into(), "abc".into()]),
            Value::from("/def")
        );
        assert_eq!(
            call("format", vec!["%s-%d".into(), "app".into(), Value::from(3i64)]),
            Value::from("app-3")
        );
    }

    #[test]
    fn toset_sorts_primitives() {
        assert_eq!(
            call("toset", vec![Value::from(vec!["c", "a", "b", "a"])]),
            Value::from(vec!["a", "b", "c"])
        );
    }

    #[test]
    fn unknown_function() {
        let registry = FunctionRegistry::builtin();
        assert!(!registry.contains("jsonencode"));
        assert!(matches!(
            registry.call("jsonencode", vec![]),
            Err(CallError::UnknownFunction(_))
        ));
    }

    #[test]
    fn filesystem_functions() {
        let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/functions");
        let _base = BaseDirectory::enter(&fixture);

        assert_eq!(call("file", vec!["x.txt".into()]), Value::from("hello\n"));
        assert_eq!(call("fileexists", vec!["./x.txt".into()]), Value::Bool(true));
        assert_eq!(call("fileexists", vec!["missing.txt".into()]), Value::Bool(false));
        assert_eq!(
            call("fileset", vec![".".into(), "files/*.py".into()]),
            Value::from(vec!["files/x.py", "files/y.py"])
        );
        assert_eq!(
            call("fileset", vec!["files".into(), "*.py".into()]),
            Value::from(vec!["x.py", "y.py"])
        );

        let missing = FunctionRegistry::builtin().call("file", vec!["missing.txt".into()]);
        assert!(matches!(missing, Err(CallError::Failed(_))));
    }

    #[test]
    fn base_directory_is_restored() {
        {
            let _base = BaseDirectory::enter(Path::new("/somewhere"));
            assert_eq!(resolve_path("a.txt"), PathBuf::from("/somewhere/a.txt"));
        }
        assert_eq!(resolve_path("a.txt"), PathBuf::from("./a.txt"));
    }

    #[test]
    fn functions_in_context() {
        let mut context = Context::new();
        FunctionRegistry::builtin().declare_into(&mut context);

        let expr: hcl_edit::expr::Expression = r#"join("-", ["a", "b"])"#.parse().unwrap();
        let expr: Expression = expr.into();
        assert_eq!(expr.evaluate(&context).unwrap(), Value::from("a-b"));
    }
}
