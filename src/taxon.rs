use serde::{Deserialize, Serialize};

use crate::domain::{SummaryStat, TaxonId, ValueType};

/// One ancestor in a node's flattened lineage. `node_depth` is the distance
/// from the node itself (0 = self) increasing toward the taxonomy root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEntry {
    pub taxon_id: TaxonId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    pub node_depth: u32,
}

/// A typed raw value. Untagged so index documents carry plain JSON scalars;
/// integers must precede doubles for round numbers to keep their type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Integer(i64),
    Double(f64),
    Keyword(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Integer(value) => Some(*value as f64),
            AttrValue::Double(value) => Some(*value),
            AttrValue::Keyword(_) => None,
        }
    }

    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            AttrValue::Keyword(value) => Some(value),
            _ => None,
        }
    }
}

/// A single direct observation attached to an attribute during import,
/// tagged with the record it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub value: AttrValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationSource {
    Direct,
    Descendant,
    Ancestor,
}

/// Canonical keyword summaries are a single term except for `list`, which
/// keeps the de-duplicated set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordValue {
    One(String),
    Many(Vec<String>),
}

/// Per-node, per-key attribute entry: raw observations plus whatever summary
/// fields the last aggregation run set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<RawObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_common: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integer_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub double_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_value: Option<KeywordValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_source: Option<AggregationSource>,
}

impl Attribute {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            values: Vec::new(),
            count: None,
            min: None,
            max: None,
            mean: None,
            median: None,
            median_high: None,
            median_low: None,
            mode: None,
            most_common: None,
            integer_value: None,
            double_value: None,
            keyword_value: None,
            aggregation_method: None,
            aggregation_source: None,
        }
    }

    pub fn raw_values(&self) -> Vec<AttrValue> {
        self.values
            .iter()
            .map(|observation| observation.value.clone())
            .collect()
    }

    pub fn has_direct_values(&self) -> bool {
        !self.values.is_empty()
    }

    /// Drop every summary field while keeping raw observations, so a re-run
    /// replaces stale aggregates instead of merging with them.
    pub fn clear_summary(&mut self) {
        let values = std::mem::take(&mut self.values);
        let key = std::mem::take(&mut self.key);
        *self = Attribute::new(&key);
        self.values = values;
    }

    pub fn set_canonical(&mut self, value_type: ValueType, value: &AttrValue) {
        match value_type {
            ValueType::Integer => {
                self.integer_value = value.as_f64().map(round_half_away);
            }
            ValueType::Double => {
                self.double_value = value.as_f64();
            }
            ValueType::Keyword => {
                self.keyword_value = value
                    .as_keyword()
                    .map(|keyword| KeywordValue::One(keyword.to_string()));
            }
        }
    }

    /// The summary fields copied onto a descendant by the descending pass:
    /// only the stats the type requests, plus the canonical value and count.
    pub fn trimmed_copy(&self, value_type: ValueType, stats: &[SummaryStat]) -> Attribute {
        let mut copy = Attribute::new(&self.key);
        copy.count = self.count;
        for stat in stats {
            match stat {
                SummaryStat::Count => {}
                SummaryStat::Min => copy.min = self.min,
                SummaryStat::Max => copy.max = self.max,
                SummaryStat::Mean => copy.mean = self.mean,
                SummaryStat::Median => copy.median = self.median,
                SummaryStat::MedianHigh => copy.median_high = self.median_high,
                SummaryStat::MedianLow => copy.median_low = self.median_low,
                SummaryStat::Mode => {
                    copy.mode = self.mode.clone();
                    copy.most_common = self.most_common.clone();
                }
                SummaryStat::List => copy.keyword_value = self.keyword_value.clone(),
            }
        }
        match value_type {
            ValueType::Integer => copy.integer_value = self.integer_value,
            ValueType::Double => copy.double_value = self.double_value,
            ValueType::Keyword => copy.keyword_value = self.keyword_value.clone(),
        }
        copy
    }
}

/// A taxon document as stored in the index. The tree is implicit: `parent`
/// plus the flattened `lineage` stand in for pointers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonNode {
    pub taxon_id: TaxonId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TaxonId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taxon_rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lineage: Vec<LineageEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl TaxonNode {
    pub fn doc_id(&self) -> String {
        format!("taxon-{}", self.taxon_id)
    }

    pub fn attribute(&self, key: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.key == key)
    }

    pub fn attribute_mut(&mut self, key: &str) -> Option<&mut Attribute> {
        self.attributes
            .iter_mut()
            .find(|attribute| attribute.key == key)
    }

    pub fn attribute_entry(&mut self, key: &str) -> &mut Attribute {
        if let Some(position) = self
            .attributes
            .iter()
            .position(|attribute| attribute.key == key)
        {
            return &mut self.attributes[position];
        }
        self.attributes.push(Attribute::new(key));
        self.attributes.last_mut().unwrap()
    }

    /// Distance from this node up to `ancestor`, if it appears in the lineage.
    pub fn depth_from(&self, ancestor: &TaxonId) -> Option<u32> {
        if &self.taxon_id == ancestor {
            return Some(0);
        }
        self.lineage
            .iter()
            .find(|entry| &entry.taxon_id == ancestor)
            .map(|entry| entry.node_depth)
    }
}

pub fn round_half_away(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}
