//! Chain discovery: builds a state machine from explicit OpenAPI links and
//! seed-walks it to produce `ChainCase` templates with coverage guarantees
//! (§4.4, steps 1-4).

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::constants::{DEFAULT_MAX_SEEDS, DEFAULT_MIN_COVERAGE_PCT, DEFAULT_MIN_HITS_PER_OP};
use crate::jsonpointer::decode_link_expression;
use crate::model::{ChainCase, ChainStep, LinkSource, RequestCase};
use crate::spec::{Link, OperationInfo, SpecDocument};

use super::{operation_requires_path_params, synthesize_request};

#[derive(Debug, Clone)]
pub struct ChainDiscoveryConfig {
    pub max_chains: usize,
    pub max_steps: usize,
    pub min_hits_per_op: u32,
    pub min_coverage_pct: u32,
    pub max_seeds: u32,
}

impl Default for ChainDiscoveryConfig {
    fn default() -> Self {
        Self {
            max_chains: 200,
            max_steps: 8,
            min_hits_per_op: DEFAULT_MIN_HITS_PER_OP,
            min_coverage_pct: DEFAULT_MIN_COVERAGE_PCT,
            max_seeds: DEFAULT_MAX_SEEDS,
        }
    }
}

struct StateMachine<'a> {
    operations: BTreeMap<String, &'a OperationInfo>,
    raw_operations: BTreeMap<String, &'a Value>,
    outgoing: BTreeMap<String, Vec<&'a Link>>,
    entry_points: Vec<String>,
}

fn build_state_machine<'a>(
    doc: &'a SpecDocument,
    operations: &'a [OperationInfo],
    links: &'a [Link],
    raw_by_id: &BTreeMap<String, &'a Value>,
) -> StateMachine<'a> {
    let mut outgoing: BTreeMap<String, Vec<&Link>> = BTreeMap::new();
    for link in links {
        outgoing.entry(link.source_operation_id.clone()).or_default().push(link);
    }

    let mut entry_points = Vec::new();
    for op in operations {
        let raw = raw_by_id.get(&op.operation_id).copied();
        let requires_path_params = raw.is_some_and(|r| operation_requires_path_params(r));
        if !requires_path_params {
            entry_points.push(op.operation_id.clone());
        }
    }

    let operations_by_id = operations.iter().map(|op| (op.operation_id.clone(), op)).collect();
    let _ = doc;

    StateMachine {
        operations: operations_by_id,
        raw_operations: raw_by_id.clone(),
        outgoing,
        entry_points,
    }
}

fn build_step(op: &OperationInfo, raw: Option<&Value>, link_source: Option<LinkSource>, upstream: Option<&RequestCase>) -> ChainStep {
    let mut request = synthesize_request(op, raw);
    if let Some(LinkSource::Single { field, .. }) = &link_source {
        if let Some(param_name) = request.path_params.keys().next().cloned() {
            // Placeholder value satisfying the downstream schema; the executor
            // overwrites this at run time from the upstream response.
            let _ = field;
            let _ = upstream;
            request.set_path_param(param_name, uuid::Uuid::new_v4().to_string());
        }
    }
    ChainStep {
        request_template: request,
        link_source,
    }
}

/// Seed-walks the link state machine, producing deduplicated chain
/// templates until coverage targets are met or `max_seeds` is exhausted.
#[must_use]
pub fn discover_chains(doc: &SpecDocument, config: &ChainDiscoveryConfig) -> Vec<ChainCase> {
    let operations = doc.enumerate_operations();
    let links = doc.links();
    let raw_by_id = raw_operations_by_id(doc);
    let machine = build_state_machine(doc, &operations, &links, &raw_by_id);

    if machine.entry_points.is_empty() {
        return Vec::new();
    }

    let linked_operations: BTreeSet<&String> = machine.outgoing.keys().chain(
        links.iter().map(|l| &l.target_operation_id)
    ).collect();

    let mut chains = Vec::new();
    let mut signatures = BTreeSet::new();
    let mut hits: BTreeMap<String, u32> = BTreeMap::new();

    for seed in 0..config.max_seeds {
        if chains.len() >= config.max_chains {
            break;
        }
        let mut rng = fastrand::Rng::with_seed(u64::from(seed));
        if let Some(chain) = walk_one_chain(&machine, &mut rng, config.max_steps) {
            let signature = chain.signature();
            if signatures.insert(signature) {
                for step in &chain.steps {
                    *hits.entry(step.request_template.operation_id.clone()).or_insert(0) += 1;
                }
                chains.push(chain);
            }
        }

        if coverage_satisfied(&linked_operations, &hits, config) {
            break;
        }
    }

    chains
}

fn coverage_satisfied(linked: &BTreeSet<&String>, hits: &BTreeMap<String, u32>, config: &ChainDiscoveryConfig) -> bool {
    if linked.is_empty() {
        return true;
    }
    let covered = linked.iter().filter(|op| hits.get(**op).copied().unwrap_or(0) >= config.min_hits_per_op).count();
    let pct = (covered * 100) / linked.len();
    pct >= config.min_coverage_pct as usize
}

fn walk_one_chain(machine: &StateMachine, rng: &mut fastrand::Rng, max_steps: usize) -> Option<ChainCase> {
    let entry_idx = rng.usize(..machine.entry_points.len());
    let start_id = &machine.entry_points[entry_idx];
    let start_op = machine.operations.get(start_id)?;
    let start_raw = machine.raw_operations.get(start_id).copied();

    let mut steps = vec![build_step(start_op, start_raw, None, None)];
    let mut current_id = start_id.clone();
    let mut visited = BTreeSet::from([current_id.clone()]);

    for step_index in 0..max_steps.saturating_sub(1) {
        let Some(candidates) = machine.outgoing.get(&current_id) else { break };
        if candidates.is_empty() {
            break;
        }
        let link = candidates[rng.usize(..candidates.len())];
        if visited.contains(&link.target_operation_id) {
            break;
        }
        let Some(target_op) = machine.operations.get(&link.target_operation_id) else { break };
        let target_raw = machine.raw_operations.get(&link.target_operation_id).copied();

        let link_source = link
            .parameters
            .values()
            .next()
            .and_then(|expr| decode_link_expression(expr))
            .map(|field| LinkSource::Single { step: step_index, field });

        let upstream = steps.last().map(|s: &ChainStep| &s.request_template);
        steps.push(build_step(target_op, target_raw, link_source, upstream));
        visited.insert(link.target_operation_id.clone());
        current_id = link.target_operation_id.clone();
    }

    Some(ChainCase::new(steps))
}

fn raw_operations_by_id<'a>(doc: &'a SpecDocument) -> BTreeMap<String, &'a Value> {
    // Operations are re-walked from the raw document so chain discovery can
    // read parameter schemas without depending on openapiv3's typed model.
    super::raw_operation_index(doc)
}

#[must_use]
pub fn is_chain_orphan(doc: &SpecDocument, operation_id: &str) -> bool {
    let links = doc.links();
    !links
        .iter()
        .any(|l| l.source_operation_id == operation_id || l.target_operation_id == operation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = r#"
openapi: 3.0.0
info:
  title: t
  version: '1.0'
paths:
  /orders:
    post:
      operationId: create-order
      responses:
        '201':
          description: created
          links:
            GetOrder:
              operationId: get-order
              parameters:
                id: $response.body#/id
  /orders/{id}:
    get:
      operationId: get-order
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: string
      responses:
        '200':
          description: ok
"#;

    #[test]
    fn discovers_one_chain_from_explicit_link() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let chains = discover_chains(&doc, &ChainDiscoveryConfig::default());
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].steps.len(), 2);
        assert_eq!(chains[0].signature(), "create-order>get-order");
    }

    #[test]
    fn chain_step_carries_link_source_from_body_pointer() {
        let doc = SpecDocument::from_str(SPEC).unwrap();
        let chains = discover_chains(&doc, &ChainDiscoveryConfig::default());
        let second = &chains[0].steps[1];
        assert!(matches!(&second.link_source, Some(LinkSource::Single { field, .. }) if field == "/id"));
    }

    #[test]
    fn different_seeds_walk_different_entry_points() {
        let mut spec = String::from(
            "openapi: 3.0.0\ninfo:\n  title: t\n  version: '1.0'\npaths:\n",
        );
        for i in 0..20 {
            spec.push_str(&format!(
                "  /entry{i}:\n    post:\n      operationId: entry-{i}\n      responses:\n        '201':\n          description: created\n  /entry{i}/next:\n    post:\n      operationId: next-{i}\n      responses:\n        '200':\n          description: ok\n"
            ));
        }
        let doc = SpecDocument::from_str(&spec).unwrap();
        let operations = doc.enumerate_operations();
        let machine = build_state_machine(&doc, &operations, &[], &raw_operations_by_id(&doc));
        let starts: BTreeSet<String> = (0..20u64)
            .filter_map(|seed| {
                let mut rng = fastrand::Rng::with_seed(seed);
                walk_one_chain(&machine, &mut rng, 1).map(|c| c.steps[0].request_template.operation_id.clone())
            })
            .collect();
        assert!(starts.len() > 1, "expected varied entry points across seeds, got {starts:?}");
    }
}
