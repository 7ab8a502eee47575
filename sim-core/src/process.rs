//! Process definition schema (§6.2) and the DAG Scheduler (§3 `ProcessNode`/`ProcessGraph`, §4.2).

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::GraphError;

/// One of the five operation types a [`ProcessNode`] can be (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    /// Human (manual assembly).
    H,
    /// Automated.
    A,
    /// Manual inspection — the only op_type subject to rework (§4.5 step 6).
    M,
    /// Test.
    T,
    /// Delivery/handoff.
    D,
}

/// Accepts either a JSON/YAML list of strings, or a single semicolon-separated
/// string, per §6.2's `predecessors` / `required_tools` fields.
fn semicolon_list_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrVec {
        String(String),
        Vec(Vec<String>),
    }

    match StringOrVec::deserialize(deserializer)? {
        StringOrVec::String(s) => Ok(s
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()),
        StringOrVec::Vec(v) => Ok(v),
    }
}

/// Raw on-disk node shape (§6.2). `predecessors` and `required_tools` accept
/// either a list or a semicolon-separated string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessNode {
    pub step_id: String,
    pub task_name: String,
    pub op_type: OpType,

    #[serde(default, deserialize_with = "semicolon_list_or_vec")]
    pub predecessors: Vec<String>,

    pub std_duration: f64,
    #[serde(default)]
    pub time_variance: f64,
    pub work_load_score: u32,
    #[serde(default)]
    pub rework_prob: f64,
    #[serde(default = "default_required_workers")]
    pub required_workers: u32,

    #[serde(default, deserialize_with = "semicolon_list_or_vec")]
    pub required_tools: Vec<String>,

    /// Opaque, passed through but never read by the engine (§6.2).
    #[serde(default)]
    pub station: String,
}

fn default_required_workers() -> u32 {
    1
}

/// A process definition as loaded from disk (§6.2): `{name, description, nodes[]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub nodes: Vec<ProcessNode>,
}

impl ProcessDefinition {
    /// Run every graph/Invariant-1 check (§4.2, A.3) without consuming or
    /// compiling the definition. Shares its logic with [`into_graph`], which
    /// additionally builds the [`ProcessGraph`] the caller actually runs.
    ///
    /// [`into_graph`]: ProcessDefinition::into_graph
    pub fn validate(&self) -> Result<(), GraphError> {
        validate_nodes(&self.nodes)?;
        Ok(())
    }

    /// Validate and compile into a [`ProcessGraph`] (§4.2 `validate()`).
    pub fn into_graph(self) -> Result<ProcessGraph, GraphError> {
        ProcessGraph::build(self.nodes)
    }
}

/// The DAG Scheduler: an immutable, validated process graph (§4.2).
///
/// Nodes keep their declaration order; `ready()` iterates in that order so
/// that, together with a fixed RNG seed, resource contention resolves
/// deterministically (§4.2, §5).
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    nodes: Vec<ProcessNode>,
    index_of: HashMap<String, usize>,
}

/// Invariant 1 (§4.2) plus the §9 rework-divergence rejection, shared by
/// [`ProcessDefinition::validate`] and [`ProcessGraph::build`]. Returns the
/// step_id index so `build` doesn't have to recompute it.
fn validate_nodes(nodes: &[ProcessNode]) -> Result<HashMap<String, usize>, GraphError> {
    if nodes.is_empty() {
        return Err(GraphError::EmptyGraph);
    }

    let mut index_of = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index_of.insert(node.step_id.clone(), i).is_some() {
            return Err(GraphError::DuplicateStepId(node.step_id.clone()));
        }
    }

    for node in nodes {
        if node.required_workers == 0 {
            return Err(GraphError::NoWorkersRequired {
                step_id: node.step_id.clone(),
            });
        }
        if node.std_duration < 0.0 {
            return Err(GraphError::NegativeDuration {
                step_id: node.step_id.clone(),
                std_duration: node.std_duration,
            });
        }
        if node.time_variance < 0.0 {
            return Err(GraphError::NegativeVariance {
                step_id: node.step_id.clone(),
                time_variance: node.time_variance,
            });
        }
        if !(0.0..=1.0).contains(&node.rework_prob) {
            return Err(GraphError::ReworkProbOutOfRange {
                step_id: node.step_id.clone(),
                rework_prob: node.rework_prob,
            });
        }
        if !(1..=10).contains(&node.work_load_score) {
            return Err(GraphError::WorkLoadScoreOutOfRange {
                step_id: node.step_id.clone(),
                work_load_score: node.work_load_score,
            });
        }
        if node.op_type == OpType::M && node.rework_prob >= 1.0 {
            return Err(GraphError::DivergentRework {
                step_id: node.step_id.clone(),
                rework_prob: node.rework_prob,
            });
        }
        for pred in &node.predecessors {
            if !index_of.contains_key(pred) {
                return Err(GraphError::UnknownPredecessor {
                    step_id: node.step_id.clone(),
                    predecessor: pred.clone(),
                });
            }
        }
    }

    Ok(index_of)
}

impl ProcessGraph {
    /// Validate `nodes` (Invariant 1, §4.2, §9 rework-divergence rejection)
    /// and build the scheduler.
    pub fn build(nodes: Vec<ProcessNode>) -> Result<Self, GraphError> {
        let index_of = validate_nodes(&nodes)?;

        let mut graph: DiGraph<(), ()> = DiGraph::with_capacity(nodes.len(), nodes.len());
        let graph_idx: Vec<NodeIndex> = (0..nodes.len()).map(|_| graph.add_node(())).collect();
        for (i, node) in nodes.iter().enumerate() {
            for pred in &node.predecessors {
                let pred_i = index_of[pred];
                graph.add_edge(graph_idx[pred_i], graph_idx[i], ());
            }
        }
        if is_cyclic_directed(&graph) {
            // Report the first node whose in-edges form part of a cycle;
            // exact cycle membership isn't required by §4.2, only that one
            // participating step_id is named.
            let step_id = nodes
                .iter()
                .find(|n| !n.predecessors.is_empty())
                .map(|n| n.step_id.clone())
                .unwrap_or_else(|| nodes[0].step_id.clone());
            return Err(GraphError::Cycle { step_id });
        }

        Ok(ProcessGraph { nodes, index_of })
    }

    /// Nodes with no predecessors (§4.2).
    pub fn start_nodes(&self) -> Vec<&ProcessNode> {
        self.nodes.iter().filter(|n| n.predecessors.is_empty()).collect()
    }

    /// Nodes whose predecessors are all in `completed` and which are not
    /// themselves in it, in declaration order (§4.2).
    pub fn ready(&self, completed: &HashSet<String>) -> Vec<&ProcessNode> {
        self.nodes
            .iter()
            .filter(|n| !completed.contains(&n.step_id))
            .filter(|n| n.predecessors.iter().all(|p| completed.contains(p)))
            .collect()
    }

    /// Immutable lookup by step_id (§4.2).
    pub fn node(&self, step_id: &str) -> Option<&ProcessNode> {
        self.index_of.get(step_id).map(|&i| &self.nodes[i])
    }

    /// Node count (§4.2).
    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    /// All step_ids in declaration order.
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.step_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(step_id: &str, preds: &[&str]) -> ProcessNode {
        ProcessNode {
            step_id: step_id.to_string(),
            task_name: step_id.to_string(),
            op_type: OpType::A,
            predecessors: preds.iter().map(|s| s.to_string()).collect(),
            std_duration: 10.0,
            time_variance: 0.0,
            work_load_score: 3,
            rework_prob: 0.0,
            required_workers: 1,
            required_tools: vec![],
            station: String::new(),
        }
    }

    #[test]
    fn validate_does_not_consume_the_definition() {
        let def = ProcessDefinition {
            name: "p".to_string(),
            description: String::new(),
            nodes: vec![node("S1", &[])],
        };
        assert!(def.validate().is_ok());
        // still owns `def`, e.g. to report its name before compiling it.
        assert_eq!(def.name, "p");
        assert!(def.into_graph().is_ok());
    }

    #[test]
    fn validate_surfaces_the_same_errors_as_build() {
        let def = ProcessDefinition {
            name: "p".to_string(),
            description: String::new(),
            nodes: vec![node("S1", &["S0"])],
        };
        let err = def.validate().unwrap_err();
        assert!(matches!(err, GraphError::UnknownPredecessor { .. }));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(ProcessGraph::build(vec![]), Err(GraphError::EmptyGraph));
    }

    #[test]
    fn rejects_unknown_predecessor() {
        let err = ProcessGraph::build(vec![node("S1", &["S0"])]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownPredecessor { .. }));
    }

    #[test]
    fn rejects_cycle() {
        let mut a = node("A", &["B"]);
        let b = node("B", &["A"]);
        a.predecessors = vec!["B".to_string()];
        let err = ProcessGraph::build(vec![a, b]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn rejects_divergent_rework() {
        let mut m = node("M1", &[]);
        m.op_type = OpType::M;
        m.rework_prob = 1.0;
        let err = ProcessGraph::build(vec![m]).unwrap_err();
        assert!(matches!(err, GraphError::DivergentRework { .. }));
    }

    #[test]
    fn ready_resolves_in_declaration_order() {
        let g = ProcessGraph::build(vec![
            node("S1", &[]),
            node("S2", &["S1"]),
            node("S3", &["S1"]),
            node("S4", &["S2", "S3"]),
        ])
        .unwrap();

        assert_eq!(g.start_nodes().iter().map(|n| n.step_id.as_str()).collect::<Vec<_>>(), vec!["S1"]);

        let mut completed = HashSet::new();
        completed.insert("S1".to_string());
        let ready = g.ready(&completed);
        assert_eq!(ready.iter().map(|n| n.step_id.as_str()).collect::<Vec<_>>(), vec!["S2", "S3"]);
    }

    #[test]
    fn semicolon_predecessors_parse() {
        let yaml = "step_id: S2\ntask_name: t\nop_type: A\npredecessors: \"S1;S0\"\nstd_duration: 1.0\nwork_load_score: 1\nrequired_tools: \"X;X\"\n";
        let n: ProcessNode = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(n.predecessors, vec!["S1".to_string(), "S0".to_string()]);
        assert_eq!(n.required_tools, vec!["X".to_string(), "X".to_string()]);
    }
}
