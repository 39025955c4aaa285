use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::json;

use crate::domain::{Direction, SummaryStat, TaxonId};
use crate::error::FillError;
use crate::registry::{AttributeTypeMeta, TypeRegistry};
use crate::store::{BulkOp, BulkOutcome, DocumentStore};
use crate::summary::summarize;
use crate::taxon::{AggregationSource, AttrValue, TaxonNode};
use crate::writer::BulkWriter;

#[derive(Debug, Clone)]
pub struct FillOptions {
    pub direction: Direction,
    pub page_size: usize,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            direction: Direction::Both,
            page_size: 1000,
            batch_size: 500,
            dry_run: false,
        }
    }
}

/// Per-depth counters. In the ascending pass `examined`/`changed` count the
/// nodes at that depth; in the descending pass `examined` counts candidate
/// ancestors and `changed` counts descendants that received a copy.
#[derive(Debug, Clone, Serialize)]
pub struct DepthReport {
    pub depth: u32,
    pub examined: u64,
    pub changed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FillReport {
    pub root: String,
    pub index: String,
    pub direction: Direction,
    pub started_at: String,
    pub finished_at: String,
    pub max_depth: Option<u32>,
    pub ascending: Vec<DepthReport>,
    pub descending: Vec<DepthReport>,
    pub written: u64,
    pub failed: u64,
}

/// The aggregation engine: one run over one taxonomy subtree. Holds no state
/// between runs; accumulators are scoped to a single pass. Concurrent runs
/// against the same taxonomy must be serialized by the caller.
pub struct Filler<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    registry: &'a TypeRegistry,
    index: &'a str,
    root: &'a TaxonId,
    options: FillOptions,
}

/// Raw values pushed up from processed children, keyed by the parent that
/// will consume them, then by attribute key.
type Accumulators = HashMap<TaxonId, HashMap<String, Vec<AttrValue>>>;

impl<'a, S: DocumentStore + ?Sized> Filler<'a, S> {
    pub fn new(
        store: &'a S,
        registry: &'a TypeRegistry,
        index: &'a str,
        root: &'a TaxonId,
        options: FillOptions,
    ) -> Self {
        Self {
            store,
            registry,
            index,
            root,
            options,
        }
    }

    pub fn run(&self) -> Result<FillReport, FillError> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let max_depth = self.store.max_depth(self.index, self.root)?;
        let mut report = FillReport {
            root: self.root.to_string(),
            index: self.index.to_string(),
            direction: self.options.direction,
            started_at,
            finished_at: String::new(),
            max_depth,
            ascending: Vec::new(),
            descending: Vec::new(),
            written: 0,
            failed: 0,
        };
        match max_depth {
            None => {
                tracing::info!(root = %self.root, "taxonomy root not found; nothing to fill");
            }
            Some(max_depth) => {
                if self.options.direction.runs_ascending() {
                    let outcome = self.traverse_from_tips(max_depth, &mut report.ascending)?;
                    report.written += outcome.written;
                    report.failed += outcome.failed;
                }
                if self.options.direction.runs_descending() {
                    let outcome = self.traverse_from_root(max_depth, &mut report.descending)?;
                    report.written += outcome.written;
                    report.failed += outcome.failed;
                }
            }
        }
        report.finished_at = chrono::Utc::now().to_rfc3339();
        Ok(report)
    }

    /// Ascending pass: depths from the tips up to the root. By the time a
    /// parent's depth is reached every child has already pushed its
    /// propagation value into the parent's accumulator.
    fn traverse_from_tips(
        &self,
        max_depth: u32,
        depths: &mut Vec<DepthReport>,
    ) -> Result<BulkOutcome, FillError> {
        let mut accumulators: Accumulators = HashMap::new();
        let mut outcome = BulkOutcome::default();
        for depth in (0..=max_depth).rev() {
            let mut writer = BulkWriter::new(
                self.store,
                self.index,
                BulkOp::Update,
                self.options.batch_size,
                self.options.dry_run,
            );
            let mut examined = 0;
            let mut changed = 0;
            let nodes =
                self.store
                    .nodes_at_depth(self.index, self.root, depth, self.options.page_size)?;
            for node in nodes {
                let mut node = node?;
                examined += 1;
                let pushed = accumulators.remove(&node.taxon_id).unwrap_or_default();
                if self.fill_node(&mut node, pushed, &mut accumulators) {
                    changed += 1;
                    writer.push(node.doc_id(), json!({ "attributes": &node.attributes }))?;
                }
            }
            let depth_outcome = writer.finish()?;
            outcome.written += depth_outcome.written;
            outcome.failed += depth_outcome.failed;
            tracing::info!(depth, examined, changed, "ascending pass depth complete");
            depths.push(DepthReport {
                depth,
                examined,
                changed,
            });
        }
        Ok(outcome)
    }

    /// Summarize every tracked attribute on one node from its own raw values
    /// plus descendant-pushed values, then push the node's propagation value
    /// up to its parent. Returns whether the node changed.
    fn fill_node(
        &self,
        node: &mut TaxonNode,
        pushed: HashMap<String, Vec<AttrValue>>,
        accumulators: &mut Accumulators,
    ) -> bool {
        let mut keys: Vec<String> = node
            .attributes
            .iter()
            .map(|attribute| attribute.key.clone())
            .collect();
        for key in pushed.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }

        let mut node_changed = false;
        for key in keys {
            let Some(meta) = self.registry.get(&key) else {
                if node.attribute(&key).is_some() {
                    tracing::warn!(
                        taxon_id = %node.taxon_id,
                        key = %key,
                        "attribute key absent from type registry; skipping"
                    );
                }
                continue;
            };
            let extra = pushed.get(&key).cloned().unwrap_or_default();
            if node.attribute(&key).is_none() && extra.is_empty() {
                continue;
            }
            let attribute = node.attribute_entry(&key);
            let had_direct = attribute.has_direct_values();
            let Some(summarized) = summarize(attribute, meta, &extra) else {
                continue;
            };
            attribute.aggregation_source = Some(if had_direct {
                AggregationSource::Direct
            } else {
                AggregationSource::Descendant
            });
            node_changed = true;
            if let Some(parent) = node.parent.clone() {
                let slot = accumulators
                    .entry(parent)
                    .or_default()
                    .entry(key)
                    .or_default();
                push_propagation(slot, summarized.propagate, meta);
            }
        }
        node_changed
    }

    /// Descending pass: ancestor depths deepest-first, so a descendant's
    /// nearest qualifying ancestor is always the first writer. The `filled`
    /// set enforces that even though the pass never re-reads its own writes.
    fn traverse_from_root(
        &self,
        max_depth: u32,
        depths: &mut Vec<DepthReport>,
    ) -> Result<BulkOutcome, FillError> {
        let traversable: Vec<&AttributeTypeMeta> = self.registry.traversable().collect();
        let mut outcome = BulkOutcome::default();
        if traversable.is_empty() || max_depth == 0 {
            return Ok(outcome);
        }
        let mut filled: HashSet<(TaxonId, String)> = HashSet::new();
        for depth in (0..max_depth).rev() {
            let mut writer = BulkWriter::new(
                self.store,
                self.index,
                BulkOp::Update,
                self.options.batch_size,
                self.options.dry_run,
            );
            let mut examined = 0;
            let mut changed = 0;
            let ancestors =
                self.store
                    .nodes_at_depth(self.index, self.root, depth, self.options.page_size)?;
            for ancestor in ancestors {
                let ancestor = ancestor?;
                examined += 1;
                let updates = self.copy_to_descendants(&ancestor, &traversable, &mut filled)?;
                changed += updates.len() as u64;
                for descendant in updates.into_values() {
                    writer.push(
                        descendant.doc_id(),
                        json!({ "attributes": &descendant.attributes }),
                    )?;
                }
            }
            let depth_outcome = writer.finish()?;
            outcome.written += depth_outcome.written;
            outcome.failed += depth_outcome.failed;
            tracing::info!(depth, examined, changed, "descending pass depth complete");
            depths.push(DepthReport {
                depth,
                examined,
                changed,
            });
        }
        Ok(outcome)
    }

    /// For each traversable attribute the ancestor has summarized, copy a
    /// trimmed summary onto every descendant still lacking the key. Updates
    /// for one descendant across several attributes merge into one document.
    fn copy_to_descendants(
        &self,
        ancestor: &TaxonNode,
        traversable: &[&AttributeTypeMeta],
        filled: &mut HashSet<(TaxonId, String)>,
    ) -> Result<HashMap<TaxonId, TaxonNode>, FillError> {
        let mut updates: HashMap<TaxonId, TaxonNode> = HashMap::new();
        for meta in traversable {
            let Some(source) = ancestor.attribute(&meta.key) else {
                continue;
            };
            if source.count.is_none() {
                continue;
            }
            let descendants = self.store.nodes_missing_attribute(
                self.index,
                &ancestor.taxon_id,
                &meta.key,
                self.options.page_size,
            )?;
            for descendant in descendants {
                let descendant = descendant?;
                // stale index result: the descendant may have gained the key
                if descendant.attribute(&meta.key).is_some() {
                    continue;
                }
                let marker = (descendant.taxon_id.clone(), meta.key.clone());
                if filled.contains(&marker) {
                    continue;
                }
                let target = updates
                    .entry(descendant.taxon_id.clone())
                    .or_insert(descendant);
                let mut copy = source.trimmed_copy(meta.value_type, &meta.summary);
                copy.aggregation_method = Some(meta.propagation_stat().to_string());
                copy.aggregation_source = Some(AggregationSource::Ancestor);
                target.attributes.push(copy);
                filled.insert(marker);
            }
        }
        Ok(updates)
    }
}

/// List-typed propagation keeps set semantics; everything else appends.
fn push_propagation(slot: &mut Vec<AttrValue>, values: Vec<AttrValue>, meta: &AttributeTypeMeta) {
    if meta.propagation_stat() == SummaryStat::List {
        for value in values {
            if !slot.contains(&value) {
                slot.push(value);
            }
        }
    } else {
        slot.extend(values);
    }
}
