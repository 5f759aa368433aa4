//! the json document under construction
use crate::model::ConfigBlock;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;

/// Handle to the `__tfmeta` of one emitted block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaHandle(usize);

/// `__tfmeta` of an emitted block
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TfMeta {
    pub filename: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceEntry>,
}

impl TfMeta {
    /// Source location of `block`, nothing else
    pub fn located(block: &ConfigBlock) -> Self {
        Self {
            filename: block.range.filename.clone(),
            line_start: block.range.start_line,
            line_end: block.range.end_line,
            ..Self::default()
        }
    }
}

/// A resolved reference to another block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub label: String,
    pub name: String,
}

/// Member of a [BlockObject]
#[derive(Debug)]
pub enum Field {
    Value(Json),
    /// the only child block of its kind
    Block(BlockObject),
    /// two or more child blocks of the same kind, in source order
    Blocks(Vec<BlockObject>),
}

/// A block as it will be emitted
#[derive(Debug)]
pub struct BlockObject {
    pub fields: IndexMap<String, Field>,
    pub id: Option<String>,
    pub meta: MetaHandle,
}

impl BlockObject {
    fn into_json(self, metas: &[Json]) -> Json {
        let mut object = serde_json::Map::new();

        for (name, field) in self.fields {
            let value = match field {
                Field::Value(value) => value,
                Field::Block(block) => block.into_json(metas),
                Field::Blocks(blocks) => Json::Array(
                    blocks
                        .into_iter()
                        .map(|block| block.into_json(metas))
                        .collect(),
                ),
            };
            object.insert(name, value);
        }

        if let Some(id) = self.id {
            object.insert("id".to_string(), Json::String(id));
        }

        if let Some(meta) = metas.get(self.meta.0) {
            object.insert("__tfmeta".to_string(), meta.clone());
        }

        Json::Object(object)
    }
}

/// Emission key to emitted root blocks, plus every `__tfmeta` handed out so far
#[derive(Debug, Default)]
pub struct ConversionOutput {
    blocks: IndexMap<String, Vec<BlockObject>>,
    metas: Vec<TfMeta>,
}

impl ConversionOutput {
    pub fn add_meta(&mut self, meta: TfMeta) -> MetaHandle {
        self.metas.push(meta);
        MetaHandle(self.metas.len() - 1)
    }

    pub fn meta_mut(&mut self, handle: MetaHandle) -> &mut TfMeta {
        &mut self.metas[handle.0]
    }

    /// Append a root block under `key`
    pub fn push(&mut self, key: impl Into<String>, block: BlockObject) {
        self.blocks.entry(key.into()).or_default().push(block);
    }

    pub fn into_json(self) -> Result<Json, serde_json::Error> {
        let metas = self
            .metas
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let document = self
            .blocks
            .into_iter()
            .map(|(key, blocks)| {
                let blocks = blocks
                    .into_iter()
                    .map(|block| block.into_json(&metas))
                    .collect();
                (key, Json::Array(blocks))
            })
            .collect();

        Ok(Json::Object(document))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn singletons_and_arrays() {
        let mut output = ConversionOutput::default();

        let meta = |output: &mut ConversionOutput, line: usize| {
            output.add_meta(TfMeta {
                filename: "main.tf".into(),
                line_start: line,
                line_end: line,
                ..TfMeta::default()
            })
        };

        let leaf = |meta: MetaHandle| BlockObject {
            fields: IndexMap::new(),
            id: None,
            meta,
        };

        let root_meta = meta(&mut output, 1);
        let mut fields = IndexMap::new();
        fields.insert("name".to_string(), Field::Value(json!("x")));
        fields.insert("one".to_string(), Field::Block(leaf(meta(&mut output, 2))));
        fields.insert(
            "many".to_string(),
            Field::Blocks(vec![leaf(meta(&mut output, 3)), leaf(meta(&mut output, 4))]),
        );

        output.push(
            "thing",
            BlockObject {
                fields,
                id: Some("abc".into()),
                meta: root_meta,
            },
        );
        output.meta_mut(root_meta).label = Some("thing".into());

        let meta_json = |line: usize| json!({"filename": "main.tf", "line_start": line, "line_end": line});
        assert_eq!(
            output.into_json().unwrap(),
            json!({
                "thing": [{
                    "name": "x",
                    "id": "abc",
                    "one": {"__tfmeta": meta_json(2)},
                    "many": [{"__tfmeta": meta_json(3)}, {"__tfmeta": meta_json(4)}],
                    "__tfmeta": {"filename": "main.tf", "line_start": 1, "line_end": 1, "label": "thing"},
                }]
            })
        );
    }
}
