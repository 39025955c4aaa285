use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::Value;

use genomehubs_fill::domain::{Direction, TaxonId};
use genomehubs_fill::error::FillError;
use genomehubs_fill::fill::{FillOptions, Filler};
use genomehubs_fill::registry::{TypeRegistry, TypesFile};
use genomehubs_fill::store::{BulkOp, BulkOutcome, DocumentStore, NodeStream};
use genomehubs_fill::taxon::{
    AggregationSource, AttrValue, Attribute, KeywordValue, LineageEntry, RawObservation, TaxonNode,
};

/// In-memory document store. `freeze` snapshots the current documents so
/// later reads serve stale data, mimicking an index that does not reflect
/// the engine's own writes within a pass.
#[derive(Default)]
struct MockStore {
    live: Mutex<BTreeMap<String, TaxonNode>>,
    frozen: Mutex<Option<BTreeMap<String, TaxonNode>>>,
    events: Mutex<Vec<String>>,
    fail_ids: Vec<String>,
}

impl MockStore {
    fn with_nodes(nodes: Vec<TaxonNode>) -> Self {
        let store = Self::default();
        {
            let mut live = store.live.lock().unwrap();
            for node in nodes {
                live.insert(node.doc_id(), node);
            }
        }
        store
    }

    fn freeze(&self) {
        let live = self.live.lock().unwrap();
        *self.frozen.lock().unwrap() = Some(live.clone());
    }

    fn view(&self) -> BTreeMap<String, TaxonNode> {
        if let Some(frozen) = self.frozen.lock().unwrap().as_ref() {
            return frozen.clone();
        }
        self.live.lock().unwrap().clone()
    }

    fn node(&self, taxon_id: &str) -> TaxonNode {
        self.live
            .lock()
            .unwrap()
            .get(&format!("taxon-{taxon_id}"))
            .cloned()
            .unwrap_or_else(|| panic!("no document for taxon {taxon_id}"))
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl DocumentStore for MockStore {
    fn max_depth(&self, _index: &str, root: &TaxonId) -> Result<Option<u32>, FillError> {
        Ok(self
            .view()
            .values()
            .filter_map(|node| node.depth_from(root))
            .max())
    }

    fn nodes_at_depth(
        &self,
        _index: &str,
        root: &TaxonId,
        depth: u32,
        _page_size: usize,
    ) -> Result<NodeStream<'_>, FillError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("scan depth={depth}"));
        let nodes: Vec<TaxonNode> = self
            .view()
            .into_values()
            .filter(|node| node.depth_from(root) == Some(depth))
            .collect();
        Ok(Box::new(nodes.into_iter().map(Ok)))
    }

    fn nodes_missing_attribute(
        &self,
        _index: &str,
        ancestor: &TaxonId,
        key: &str,
        _page_size: usize,
    ) -> Result<NodeStream<'_>, FillError> {
        let nodes: Vec<TaxonNode> = self
            .view()
            .into_values()
            .filter(|node| {
                node.depth_from(ancestor).is_some_and(|depth| depth > 0)
                    && node.attribute(key).is_none()
            })
            .collect();
        Ok(Box::new(nodes.into_iter().map(Ok)))
    }

    fn bulk_write(
        &self,
        _index: &str,
        _op: BulkOp,
        docs: &[(String, Value)],
    ) -> Result<BulkOutcome, FillError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("bulk n={}", docs.len()));
        let mut outcome = BulkOutcome::default();
        let mut live = self.live.lock().unwrap();
        for (doc_id, doc) in docs {
            if self.fail_ids.contains(doc_id) {
                outcome.failed += 1;
                continue;
            }
            let Some(node) = live.get_mut(doc_id) else {
                outcome.failed += 1;
                continue;
            };
            let attributes: Vec<Attribute> =
                serde_json::from_value(doc["attributes"].clone()).unwrap();
            node.attributes = attributes;
            outcome.written += 1;
        }
        Ok(outcome)
    }
}

fn taxon(taxon_id: &str, parent: Option<&str>, lineage: &[(&str, u32)]) -> TaxonNode {
    TaxonNode {
        taxon_id: taxon_id.parse().unwrap(),
        parent: parent.map(|id| id.parse().unwrap()),
        taxon_rank: None,
        scientific_name: None,
        lineage: lineage
            .iter()
            .map(|(id, depth)| LineageEntry {
                taxon_id: id.parse().unwrap(),
                taxon_rank: None,
                scientific_name: None,
                node_depth: *depth,
            })
            .collect(),
        attributes: Vec::new(),
    }
}

fn with_raw(mut node: TaxonNode, key: &str, values: &[AttrValue]) -> TaxonNode {
    let mut attribute = Attribute::new(key);
    attribute.values = values
        .iter()
        .map(|value| RawObservation {
            source: Some("test".to_string()),
            source_id: None,
            class: None,
            value: value.clone(),
        })
        .collect();
    node.attributes.push(attribute);
    node
}

fn registry(json: &str) -> TypeRegistry {
    let file: TypesFile = serde_json::from_str(json).unwrap();
    TypeRegistry::resolve(file).unwrap()
}

fn span_registry() -> TypeRegistry {
    registry(
        r#"{"attributes": {
            "assembly_span": {"type": "integer", "summary": ["mean", "count"], "traverse": "mean"}
        }}"#,
    )
}

/// root(1) -> genus(10) -> species 100 (span 100) and 101 (span 300).
fn span_tree() -> Vec<TaxonNode> {
    vec![
        taxon("1", None, &[]),
        taxon("10", Some("1"), &[("1", 1)]),
        with_raw(
            taxon("100", Some("10"), &[("10", 1), ("1", 2)]),
            "assembly_span",
            &[AttrValue::Integer(100)],
        ),
        with_raw(
            taxon("101", Some("10"), &[("10", 1), ("1", 2)]),
            "assembly_span",
            &[AttrValue::Integer(300)],
        ),
    ]
}

fn run(
    store: &MockStore,
    registry: &TypeRegistry,
    direction: Direction,
) -> genomehubs_fill::fill::FillReport {
    let root: TaxonId = "1".parse().unwrap();
    let options = FillOptions {
        direction,
        ..FillOptions::default()
    };
    Filler::new(store, registry, "taxon--test--1", &root, options)
        .run()
        .unwrap()
}

#[test]
fn ascending_summarizes_descendants_to_root() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    let report = run(&store, &registry, Direction::Ascending);

    let genus = store.node("10");
    let span = genus.attribute("assembly_span").unwrap();
    assert_eq!(span.integer_value, Some(200));
    assert_eq!(span.mean, Some(200.0));
    assert_eq!(span.count, Some(2));
    assert_eq!(span.aggregation_method.as_deref(), Some("mean"));
    assert_eq!(span.aggregation_source, Some(AggregationSource::Descendant));

    // genus pushes its mean one level further, so the root sees 200 too
    let root = store.node("1");
    let span = root.attribute("assembly_span").unwrap();
    assert_eq!(span.integer_value, Some(200));
    assert_eq!(span.aggregation_source, Some(AggregationSource::Descendant));

    let species = store.node("100");
    let span = species.attribute("assembly_span").unwrap();
    assert_eq!(span.integer_value, Some(100));
    assert_eq!(span.aggregation_source, Some(AggregationSource::Direct));

    assert_eq!(report.max_depth, Some(2));
    assert_eq!(report.failed, 0);
    assert_eq!(report.written, 4);
}

#[test]
fn ascending_processes_depths_tips_first() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    run(&store, &registry, Direction::Ascending);

    let scans: Vec<String> = store
        .events()
        .into_iter()
        .filter(|event| event.starts_with("scan"))
        .collect();
    assert_eq!(scans, vec!["scan depth=2", "scan depth=1", "scan depth=0"]);

    // each depth's writes land before the next depth is scanned
    let events = store.events();
    let first_bulk = events.iter().position(|e| e.starts_with("bulk")).unwrap();
    let second_scan = events.iter().position(|e| e == "scan depth=1").unwrap();
    assert!(first_bulk < second_scan);
}

#[test]
fn descending_fills_gaps_from_nearest_ancestor() {
    let mut nodes = span_tree();
    // species with no assembly_span of its own
    nodes.push(taxon("102", Some("10"), &[("10", 1), ("1", 2)]));
    let store = MockStore::with_nodes(nodes);
    let registry = span_registry();
    run(&store, &registry, Direction::Both);

    let orphan = store.node("102");
    let span = orphan.attribute("assembly_span").unwrap();
    assert_eq!(span.integer_value, Some(200));
    assert_eq!(span.count, Some(2));
    assert_eq!(span.aggregation_method.as_deref(), Some("mean"));
    assert_eq!(span.aggregation_source, Some(AggregationSource::Ancestor));
    assert!(span.values.is_empty());
}

#[test]
fn descending_never_overwrites_existing_values() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    run(&store, &registry, Direction::Ascending);
    let before = store.node("100");
    run(&store, &registry, Direction::Descending);
    let after = store.node("100");

    let before_span = before.attribute("assembly_span").unwrap();
    let after_span = after.attribute("assembly_span").unwrap();
    assert_eq!(after_span.integer_value, before_span.integer_value);
    assert_eq!(after_span.aggregation_source, Some(AggregationSource::Direct));
}

#[test]
fn closest_ancestor_wins_even_with_stale_reads() {
    // root and genus already summarized with different means; the orphan
    // species must receive the genus value even though the frozen index
    // still reports it missing when the root's depth is processed.
    let mut root = taxon("1", None, &[]);
    let mut root_span = Attribute::new("assembly_span");
    root_span.count = Some(10);
    root_span.mean = Some(999.0);
    root_span.integer_value = Some(999);
    root_span.aggregation_source = Some(AggregationSource::Descendant);
    root.attributes.push(root_span);

    let mut genus = taxon("10", Some("1"), &[("1", 1)]);
    let mut genus_span = Attribute::new("assembly_span");
    genus_span.count = Some(2);
    genus_span.mean = Some(200.0);
    genus_span.integer_value = Some(200);
    genus_span.aggregation_source = Some(AggregationSource::Descendant);
    genus.attributes.push(genus_span);

    let orphan = taxon("102", Some("10"), &[("10", 1), ("1", 2)]);

    let store = MockStore::with_nodes(vec![root, genus, orphan]);
    store.freeze();
    let registry = span_registry();
    run(&store, &registry, Direction::Descending);

    let orphan = store.node("102");
    let span = orphan.attribute("assembly_span").unwrap();
    assert_eq!(span.integer_value, Some(200));
    assert_eq!(span.mean, Some(200.0));
}

#[test]
fn rerun_with_new_raw_data_switches_to_direct() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    run(&store, &registry, Direction::Ascending);

    // genus gains its own observation between runs
    {
        let mut live = store.live.lock().unwrap();
        let genus = live.get_mut("taxon-10").unwrap();
        let span = genus.attribute_mut("assembly_span").unwrap();
        span.values.push(RawObservation {
            source: Some("INSDC".to_string()),
            source_id: None,
            class: None,
            value: AttrValue::Integer(500),
        });
    }
    run(&store, &registry, Direction::Ascending);

    let genus = store.node("10");
    let span = genus.attribute("assembly_span").unwrap();
    assert_eq!(span.aggregation_source, Some(AggregationSource::Direct));
    // recomputed from scratch: own 500 plus the two descendant means
    assert_eq!(span.count, Some(3));
    assert_eq!(span.integer_value, Some(300));
}

#[test]
fn unknown_attribute_key_is_skipped() {
    let mut nodes = span_tree();
    nodes[2] = with_raw(
        nodes[2].clone(),
        "mystery_metric",
        &[AttrValue::Integer(7)],
    );
    let store = MockStore::with_nodes(nodes);
    let registry = span_registry();
    run(&store, &registry, Direction::Both);

    let species = store.node("100");
    let mystery = species.attribute("mystery_metric").unwrap();
    assert!(mystery.count.is_none());
    assert!(mystery.aggregation_source.is_none());
    assert_eq!(mystery.values.len(), 1);
}

#[test]
fn missing_root_is_a_noop() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    let root: TaxonId = "404404".parse().unwrap();
    let report = Filler::new(
        &store,
        &registry,
        "taxon--test--1",
        &root,
        FillOptions::default(),
    )
    .run()
    .unwrap();

    assert_eq!(report.max_depth, None);
    assert!(report.ascending.is_empty());
    assert!(report.descending.is_empty());
    assert_eq!(report.written, 0);
}

#[test]
fn bulk_failures_are_counted_not_fatal() {
    let mut store = MockStore::with_nodes(span_tree());
    store.fail_ids = vec!["taxon-10".to_string()];
    let registry = span_registry();
    let report = run(&store, &registry, Direction::Ascending);

    assert_eq!(report.failed, 1);
    assert_eq!(report.written, 3);
}

#[test]
fn dry_run_writes_nothing() {
    let store = MockStore::with_nodes(span_tree());
    let registry = span_registry();
    let root: TaxonId = "1".parse().unwrap();
    let options = FillOptions {
        direction: Direction::Both,
        dry_run: true,
        ..FillOptions::default()
    };
    let report = Filler::new(&store, &registry, "taxon--test--1", &root, options)
        .run()
        .unwrap();

    assert_eq!(report.written, 0);
    let genus = store.node("10");
    assert!(genus.attribute("assembly_span").is_none());
    // changed counts still reflect what a real run would touch
    assert!(report.ascending.iter().any(|depth| depth.changed > 0));
}

#[test]
fn keyword_list_attributes_merge_as_sets() {
    let registry = registry(
        r#"{"attributes": {
            "assembly_level": {"type": "keyword", "summary": ["list", "count"], "traverse": true}
        }}"#,
    );
    let nodes = vec![
        taxon("1", None, &[]),
        taxon("10", Some("1"), &[("1", 1)]),
        with_raw(
            taxon("100", Some("10"), &[("10", 1), ("1", 2)]),
            "assembly_level",
            &[AttrValue::Keyword("chromosome".to_string())],
        ),
        with_raw(
            taxon("101", Some("10"), &[("10", 1), ("1", 2)]),
            "assembly_level",
            &[
                AttrValue::Keyword("scaffold".to_string()),
                AttrValue::Keyword("chromosome".to_string()),
            ],
        ),
    ];
    let store = MockStore::with_nodes(nodes);
    run(&store, &registry, Direction::Ascending);

    let genus = store.node("10");
    let level = genus.attribute("assembly_level").unwrap();
    match &level.keyword_value {
        Some(KeywordValue::Many(values)) => {
            let mut sorted = values.clone();
            sorted.sort();
            assert_eq!(sorted, vec!["chromosome".to_string(), "scaffold".to_string()]);
        }
        other => panic!("expected keyword list, got {other:?}"),
    }
    assert_eq!(level.aggregation_source, Some(AggregationSource::Descendant));
}

#[test]
fn non_traversable_attributes_stay_put_in_descending() {
    let registry = registry(
        r#"{"attributes": {
            "gc_percent": {"type": "double", "summary": ["mean"], "traverse": false}
        }}"#,
    );
    let mut nodes = vec![
        taxon("1", None, &[]),
        taxon("10", Some("1"), &[("1", 1)]),
        with_raw(
            taxon("100", Some("10"), &[("10", 1), ("1", 2)]),
            "gc_percent",
            &[AttrValue::Double(41.5)],
        ),
    ];
    nodes.push(taxon("102", Some("10"), &[("10", 1), ("1", 2)]));
    let store = MockStore::with_nodes(nodes);
    run(&store, &registry, Direction::Both);

    let orphan = store.node("102");
    assert!(orphan.attribute("gc_percent").is_none());

    // ascending still summarized upward
    let genus = store.node("10");
    assert_eq!(
        genus.attribute("gc_percent").unwrap().double_value,
        Some(41.5)
    );
}
