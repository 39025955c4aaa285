use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{SummaryStat, ValueType};
use crate::error::FillError;

/// Raw attribute types file, e.g.
///
/// ```json
/// {
///   "attributes": {
///     "assembly_span": { "type": "integer", "summary": ["mean", "count"], "traverse": "mean" },
///     "busco_lineage": { "type": "keyword", "summary": "list", "traverse": true }
///   }
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct TypesFile {
    #[serde(default)]
    pub attributes: BTreeMap<String, TypeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TypeEntry {
    #[serde(rename = "type")]
    pub value_type: String,
    pub summary: SummaryEntry,
    #[serde(default)]
    pub traverse: Option<TraverseEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SummaryEntry {
    Shorthand(String),
    Detailed(Vec<String>),
}

/// `traverse` accepts `true` (copy the canonical stat down) or a stat name.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TraverseEntry {
    Flag(bool),
    Stat(String),
}

/// Resolved schema for one attribute key, immutable during a traversal.
#[derive(Debug, Clone)]
pub struct AttributeTypeMeta {
    pub key: String,
    pub value_type: ValueType,
    pub summary: Vec<SummaryStat>,
    pub traverse: Option<SummaryStat>,
}

impl AttributeTypeMeta {
    /// The first configured stat is canonical: it names `aggregation_method`
    /// and fills `<type>_value`.
    pub fn canonical_stat(&self) -> SummaryStat {
        self.summary[0]
    }

    /// The stat pushed up to the parent accumulator and copied down by the
    /// descending pass: the traverse stat when set, else the canonical one.
    pub fn propagation_stat(&self) -> SummaryStat {
        self.traverse.unwrap_or_else(|| self.canonical_stat())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, AttributeTypeMeta>,
}

impl TypeRegistry {
    pub fn load(path: &Path) -> Result<Self, FillError> {
        let content =
            fs::read_to_string(path).map_err(|_| FillError::TypesRead(path.to_path_buf()))?;
        let file: TypesFile =
            serde_json::from_str(&content).map_err(|err| FillError::TypesParse(err.to_string()))?;
        Self::resolve(file)
    }

    pub fn resolve(file: TypesFile) -> Result<Self, FillError> {
        let mut types = BTreeMap::new();
        for (key, entry) in file.attributes {
            types.insert(key.clone(), resolve_entry(key, entry)?);
        }
        Ok(Self { types })
    }

    pub fn get(&self, key: &str) -> Option<&AttributeTypeMeta> {
        self.types.get(key)
    }

    pub fn traversable(&self) -> impl Iterator<Item = &AttributeTypeMeta> {
        self.types.values().filter(|meta| meta.traverse.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }
}

fn resolve_entry(key: String, entry: TypeEntry) -> Result<AttributeTypeMeta, FillError> {
    let value_type: ValueType = entry.value_type.parse()?;
    let stat_names = match entry.summary {
        SummaryEntry::Shorthand(name) => vec![name],
        SummaryEntry::Detailed(names) => names,
    };
    if stat_names.is_empty() {
        return Err(FillError::TypesParse(format!(
            "attribute {key} has an empty summary list"
        )));
    }
    let summary = stat_names
        .iter()
        .map(|name| name.parse::<SummaryStat>())
        .collect::<Result<Vec<_>, FillError>>()?;
    for stat in &summary {
        if !stat_supports(value_type, *stat) {
            return Err(FillError::TypesParse(format!(
                "attribute {key}: summary {stat} is not valid for {value_type} values"
            )));
        }
    }
    let traverse = match entry.traverse {
        None | Some(TraverseEntry::Flag(false)) => None,
        Some(TraverseEntry::Flag(true)) => Some(summary[0]),
        Some(TraverseEntry::Stat(name)) => {
            let stat: SummaryStat = name.parse()?;
            if !summary.contains(&stat) {
                return Err(FillError::TraverseStatNotInSummary {
                    key,
                    stat: stat.to_string(),
                });
            }
            Some(stat)
        }
    };
    Ok(AttributeTypeMeta {
        key,
        value_type,
        summary,
        traverse,
    })
}

fn stat_supports(value_type: ValueType, stat: SummaryStat) -> bool {
    match stat {
        SummaryStat::Count | SummaryStat::Mode => true,
        SummaryStat::List => value_type == ValueType::Keyword,
        SummaryStat::Min
        | SummaryStat::Max
        | SummaryStat::Mean
        | SummaryStat::Median
        | SummaryStat::MedianHigh
        | SummaryStat::MedianLow => value_type.is_numeric(),
    }
}
