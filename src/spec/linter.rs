//! Static link-connectivity, depth, and reachability analysis (§4.11).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use super::SpecDocument;

#[derive(Debug, Clone, Serialize)]
pub struct LintIssue {
    pub severity: String,
    pub message: String,
}

fn error(message: impl Into<String>) -> LintIssue {
    LintIssue {
        severity: "error".to_string(),
        message: message.into(),
    }
}

fn warning(message: impl Into<String>) -> LintIssue {
    LintIssue {
        severity: "warning".to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LintReport {
    pub operations: usize,
    pub links: usize,
    pub orphans: Vec<String>,
    pub max_depth: usize,
    pub issues: Vec<LintIssue>,
}

/// Default threshold past which a chain's depth is flagged.
const DEFAULT_DEPTH_WARNING_THRESHOLD: usize = 8;

/// Runs the full static analysis described in §4.11.
#[must_use]
pub fn lint(doc: &SpecDocument) -> LintReport {
    let operations = doc.enumerate_operations();
    let operation_ids: BTreeSet<String> = operations.iter().map(|o| o.operation_id.clone()).collect();
    let links = doc.links();

    let mut issues = Vec::new();
    let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut linked: BTreeSet<String> = BTreeSet::new();

    for link in &links {
        if !operation_ids.contains(&link.source_operation_id) {
            issues.push(error(format!(
                "link '{}' references unknown source operation '{}'",
                link.link_name, link.source_operation_id
            )));
            continue;
        }
        if !operation_ids.contains(&link.target_operation_id) {
            issues.push(error(format!(
                "link '{}' on operation '{}' references unknown target operation '{}'",
                link.link_name, link.source_operation_id, link.target_operation_id
            )));
            continue;
        }
        linked.insert(link.source_operation_id.clone());
        linked.insert(link.target_operation_id.clone());
        adjacency
            .entry(link.source_operation_id.clone())
            .or_default()
            .push(link.target_operation_id.clone());
    }

    let orphans: Vec<String> = operation_ids.iter().filter(|id| !linked.contains(*id)).cloned().collect();

    let max_depth = longest_chain_depth(&operation_ids, &adjacency);
    if max_depth > DEFAULT_DEPTH_WARNING_THRESHOLD {
        issues.push(warning(format!(
            "longest explicit-link chain has depth {max_depth}, exceeding the warning threshold of {DEFAULT_DEPTH_WARNING_THRESHOLD}"
        )));
    }

    LintReport {
        operations: operations.len(),
        links: links.len(),
        orphans,
        max_depth,
        issues,
    }
}

/// Longest path (in edges) reachable from any entry operation, via BFS from
/// every node since links form a DAG in well-formed specs; a cycle simply
/// stops contributing further depth once a node repeats on the active path.
fn longest_chain_depth(operation_ids: &BTreeSet<String>, adjacency: &BTreeMap<String, Vec<String>>) -> usize {
    let mut max_depth = 0;
    for start in operation_ids {
        max_depth = max_depth.max(longest_path_from(start, adjacency));
    }
    max_depth
}

fn longest_path_from(start: &str, adjacency: &BTreeMap<String, Vec<String>>) -> usize {
    let mut best = 0;
    let mut queue = VecDeque::new();
    queue.push_back((start.to_string(), BTreeSet::from([start.to_string()]), 0usize));
    while let Some((node, visited, depth)) = queue.pop_front() {
        best = best.max(depth);
        let Some(neighbors) = adjacency.get(&node) else { continue };
        for next in neighbors {
            if visited.contains(next) {
                continue;
            }
            let mut next_visited = visited.clone();
            next_visited.insert(next.clone());
            queue.push_back((next.clone(), next_visited, depth + 1));
        }
    }
    best
}

#[must_use]
pub fn render_text(report: &LintReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{} operations, {} links, {} orphans, max chain depth {}\n",
        report.operations,
        report.links,
        report.orphans.len(),
        report.max_depth
    ));
    if !report.orphans.is_empty() {
        out.push_str(&format!("orphans: {}\n", report.orphans.join(", ")));
    }
    for issue in &report.issues {
        out.push_str(&format!("[{}] {}\n", issue.severity, issue.message));
    }
    out
}
