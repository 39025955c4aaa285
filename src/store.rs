use std::collections::VecDeque;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::{Value, json};

use crate::domain::TaxonId;
use crate::error::FillError;
use crate::taxon::TaxonNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOp {
    Index,
    Update,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BulkOutcome {
    pub written: u64,
    pub failed: u64,
}

pub type NodeStream<'a> = Box<dyn Iterator<Item = Result<TaxonNode, FillError>> + 'a>;

/// Seam between the fill engine and the search index. Calls fail fast on
/// connection errors; retry policy belongs to the orchestration layer above.
pub trait DocumentStore {
    /// Maximum lineage `node_depth` among descendants of `root`, or `None`
    /// when the root is absent from the index.
    fn max_depth(&self, index: &str, root: &TaxonId) -> Result<Option<u32>, FillError>;

    /// All nodes at exactly `depth` below `root` (depth 0 = the root itself),
    /// paginated transparently.
    fn nodes_at_depth(
        &self,
        index: &str,
        root: &TaxonId,
        depth: u32,
        page_size: usize,
    ) -> Result<NodeStream<'_>, FillError>;

    /// All descendants of `ancestor` lacking `key` in their attributes.
    fn nodes_missing_attribute(
        &self,
        index: &str,
        ancestor: &TaxonId,
        key: &str,
        page_size: usize,
    ) -> Result<NodeStream<'_>, FillError>;

    /// At-least-once per document; individual failures are counted, never
    /// retried here, and do not abort the batch.
    fn bulk_write(
        &self,
        index: &str,
        op: BulkOp,
        docs: &[(String, Value)],
    ) -> Result<BulkOutcome, FillError>;
}

#[derive(Clone)]
pub struct EsHttpStore {
    client: Client,
    base_url: String,
}

const SCROLL_KEEPALIVE: &str = "10m";

impl EsHttpStore {
    pub fn new(base_url: &str) -> Result<Self, FillError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("gh-fill/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FillError::StoreHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| FillError::StoreHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post_json(&self, path: &str, body: &Value) -> Result<Value, FillError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .map_err(|err| FillError::StoreHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "store request failed".to_string());
            return Err(FillError::StoreStatus { status, message });
        }
        response
            .json()
            .map_err(|err| FillError::StoreHttp(err.to_string()))
    }

    fn search(&self, index: &str, body: &Value) -> Result<Value, FillError> {
        self.post_json(
            &format!("{index}/_search?scroll={SCROLL_KEEPALIVE}"),
            body,
        )
    }

    fn scroll_stream(&self, index: &str, query: Value, page_size: usize) -> ScrollStream<'_> {
        ScrollStream {
            store: self,
            index: index.to_string(),
            query: Some(json!({ "size": page_size, "query": query })),
            scroll_id: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn query_nodes_at_depth(root: &TaxonId, depth: u32) -> Value {
        if depth == 0 {
            return json!({ "term": { "taxon_id": root.as_str() } });
        }
        json!({
            "nested": {
                "path": "lineage",
                "query": {
                    "bool": {
                        "filter": [
                            { "term": { "lineage.taxon_id": root.as_str() } },
                            { "term": { "lineage.node_depth": depth } }
                        ]
                    }
                }
            }
        })
    }

    fn query_missing_attribute(ancestor: &TaxonId, key: &str) -> Value {
        json!({
            "bool": {
                "filter": [
                    {
                        "nested": {
                            "path": "lineage",
                            "query": { "term": { "lineage.taxon_id": ancestor.as_str() } }
                        }
                    }
                ],
                "must_not": [
                    {
                        "nested": {
                            "path": "attributes",
                            "query": { "term": { "attributes.key": key } }
                        }
                    }
                ]
            }
        })
    }
}

impl DocumentStore for EsHttpStore {
    fn max_depth(&self, index: &str, root: &TaxonId) -> Result<Option<u32>, FillError> {
        let body = json!({
            "size": 0,
            "query": {
                "nested": {
                    "path": "lineage",
                    "query": { "term": { "lineage.taxon_id": root.as_str() } }
                }
            },
            "aggs": {
                "lineage": {
                    "nested": { "path": "lineage" },
                    "aggs": {
                        "root": {
                            "filter": { "term": { "lineage.taxon_id": root.as_str() } },
                            "aggs": {
                                "max_depth": { "max": { "field": "lineage.node_depth" } }
                            }
                        }
                    }
                }
            }
        });
        let response = self.post_json(&format!("{index}/_search"), &body)?;
        let value = response
            .pointer("/aggregations/lineage/root/max_depth/value")
            .ok_or_else(|| FillError::StoreResponse("aggregations.max_depth".to_string()))?;
        if let Some(depth) = value.as_f64() {
            return Ok(Some(depth as u32));
        }

        // No descendants mention the root; it may still exist as a lone node.
        let body = json!({
            "size": 0,
            "query": { "term": { "taxon_id": root.as_str() } },
            "track_total_hits": true
        });
        let response = self.post_json(&format!("{index}/_search"), &body)?;
        let total = response
            .pointer("/hits/total/value")
            .and_then(Value::as_u64)
            .ok_or_else(|| FillError::StoreResponse("hits.total".to_string()))?;
        Ok((total > 0).then_some(0))
    }

    fn nodes_at_depth(
        &self,
        index: &str,
        root: &TaxonId,
        depth: u32,
        page_size: usize,
    ) -> Result<NodeStream<'_>, FillError> {
        let query = Self::query_nodes_at_depth(root, depth);
        Ok(Box::new(self.scroll_stream(index, query, page_size)))
    }

    fn nodes_missing_attribute(
        &self,
        index: &str,
        ancestor: &TaxonId,
        key: &str,
        page_size: usize,
    ) -> Result<NodeStream<'_>, FillError> {
        let query = Self::query_missing_attribute(ancestor, key);
        Ok(Box::new(self.scroll_stream(index, query, page_size)))
    }

    fn bulk_write(
        &self,
        index: &str,
        op: BulkOp,
        docs: &[(String, Value)],
    ) -> Result<BulkOutcome, FillError> {
        if docs.is_empty() {
            return Ok(BulkOutcome::default());
        }
        let action = match op {
            BulkOp::Index => "index",
            BulkOp::Update => "update",
        };
        let mut payload = String::new();
        for (doc_id, doc) in docs {
            payload.push_str(&json!({ action: { "_id": doc_id } }).to_string());
            payload.push('\n');
            let line = match op {
                BulkOp::Index => doc.to_string(),
                BulkOp::Update => json!({ "doc": doc }).to_string(),
            };
            payload.push_str(&line);
            payload.push('\n');
        }
        let url = format!("{}/{index}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(payload)
            .send()
            .map_err(|err| FillError::StoreHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "bulk request failed".to_string());
            return Err(FillError::StoreStatus { status, message });
        }
        let body: Value = response
            .json()
            .map_err(|err| FillError::StoreHttp(err.to_string()))?;
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| FillError::StoreResponse("items".to_string()))?;
        let mut outcome = BulkOutcome::default();
        for item in items {
            let errored = item
                .get(action)
                .and_then(|entry| entry.get("error"))
                .is_some();
            if errored {
                outcome.failed += 1;
            } else {
                outcome.written += 1;
            }
        }
        Ok(outcome)
    }
}

/// Cursor-paginated read over one query. Restartable only from the beginning;
/// the scroll context is released once the last page drains.
struct ScrollStream<'a> {
    store: &'a EsHttpStore,
    index: String,
    query: Option<Value>,
    scroll_id: Option<String>,
    buffer: VecDeque<TaxonNode>,
    done: bool,
}

impl ScrollStream<'_> {
    fn fetch_page(&mut self) -> Result<(), FillError> {
        let response = match self.query.take() {
            Some(body) => self.store.search(&self.index, &body)?,
            None => {
                let Some(scroll_id) = &self.scroll_id else {
                    self.done = true;
                    return Ok(());
                };
                self.store.post_json(
                    "_search/scroll",
                    &json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": scroll_id }),
                )?
            }
        };
        self.scroll_id = response
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        let hits = response
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| FillError::StoreResponse("hits.hits".to_string()))?;
        if hits.is_empty() {
            self.done = true;
            self.release();
            return Ok(());
        }
        for hit in hits {
            let source = hit
                .get("_source")
                .cloned()
                .ok_or_else(|| FillError::StoreResponse("_source".to_string()))?;
            let node: TaxonNode = serde_json::from_value(source)
                .map_err(|err| FillError::StoreResponse(err.to_string()))?;
            self.buffer.push_back(node);
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(scroll_id) = self.scroll_id.take() {
            let url = format!("{}/_search/scroll", self.store.base_url);
            let result = self
                .store
                .client
                .delete(&url)
                .json(&json!({ "scroll_id": scroll_id }))
                .send();
            if let Err(err) = result {
                tracing::debug!("failed to release scroll context: {err}");
            }
        }
    }
}

impl Iterator for ScrollStream<'_> {
    type Item = Result<TaxonNode, FillError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(node) = self.buffer.pop_front() {
                return Some(Ok(node));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.fetch_page() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}
