//! リソース依存グラフ
//!
//! 宣言に含まれる参照と `depends_on` から有向グラフを組み立てる。
//! 辺は「依存先 → 依存元」の向きで張る。

use crate::error::{Result, StackError};
use crate::model::{Resource, ResourceAddress, ResourceKind};
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 依存関係の辺
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// 依存元が参照している依存先の属性
    pub attributes: BTreeSet<String>,
    /// `depends_on` で明示された順序制約か
    pub explicit: bool,
}

/// リソース依存グラフ
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraph<Resource, Dependency>,
    indices: HashMap<ResourceAddress, NodeIndex>,
}

impl ResourceGraph {
    /// 宣言からグラフを構築
    ///
    /// 重複アドレス、未定義リソースへの参照、存在しない属性への参照、
    /// 循環依存はいずれもエラーになる。
    pub fn build(resources: Vec<Resource>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();

        for resource in resources {
            if indices.contains_key(&resource.address) {
                return Err(StackError::DuplicateResource(resource.address.to_string()));
            }
            let address = resource.address.clone();
            let idx = graph.add_node(resource);
            indices.insert(address, idx);
        }

        let mut edges: BTreeMap<(NodeIndex, NodeIndex), Dependency> = BTreeMap::new();
        for idx in graph.node_indices() {
            let resource = &graph[idx];
            let address = &resource.address;

            for reference in resource.references() {
                let &target = indices.get(&reference.address).ok_or_else(|| {
                    StackError::DanglingReference {
                        from: address.to_string(),
                        reference: reference.to_string(),
                    }
                })?;
                if !graph[target].exposes(&reference.attribute) {
                    return Err(StackError::UnknownAttribute {
                        from: address.to_string(),
                        target: reference.address.to_string(),
                        attribute: reference.attribute.clone(),
                    });
                }
                edges
                    .entry((target, idx))
                    .or_default()
                    .attributes
                    .insert(reference.attribute.clone());
            }

            for dependency in &resource.depends_on {
                let &target = indices.get(dependency).ok_or_else(|| {
                    StackError::DanglingReference {
                        from: address.to_string(),
                        reference: dependency.to_string(),
                    }
                })?;
                edges.entry((target, idx)).or_default().explicit = true;
            }
        }

        for ((from, to), dependency) in edges {
            graph.add_edge(from, to, dependency);
        }

        let built = Self { graph, indices };
        built.check_cycles()?;

        tracing::debug!(
            resources = built.graph.node_count(),
            edges = built.graph.edge_count(),
            "Built resource graph"
        );
        Ok(built)
    }

    fn check_cycles(&self) -> Result<()> {
        let self_loop = self
            .graph
            .edge_references()
            .find(|edge| edge.source() == edge.target());
        if let Some(edge) = self_loop {
            return Err(StackError::CircularDependency(
                self.graph[edge.source()].address.to_string(),
            ));
        }
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }

        let cycle = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .unwrap_or_default();

        let mut members: Vec<String> = cycle
            .into_iter()
            .map(|idx| self.graph[idx].address.to_string())
            .collect();
        members.sort();
        Err(StackError::CircularDependency(members.join(" <-> ")))
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.indices.contains_key(address)
    }

    pub fn get(&self, address: &ResourceAddress) -> Option<&Resource> {
        self.indices.get(address).map(|&idx| &self.graph[idx])
    }

    /// 宣言順のリソース
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    pub fn by_kind(&self, kind: ResourceKind) -> Vec<&Resource> {
        self.resources().filter(|r| r.kind() == kind).collect()
    }

    /// 直接の依存先
    pub fn dependencies_of(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbors(address, Direction::Incoming)
    }

    /// 直接の依存元
    pub fn dependents_of(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbors(address, Direction::Outgoing)
    }

    fn neighbors(&self, address: &ResourceAddress, direction: Direction) -> Vec<&ResourceAddress> {
        let Some(&idx) = self.indices.get(address) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        found.sort();
        found.dedup();
        found
            .into_iter()
            .map(|n| &self.graph[n].address)
            .collect()
    }

    /// 互いに依存しないリソースの層
    ///
    /// 各層のリソースは前の層までのリソースにのみ依存する。
    /// 層内は宣言順に並ぶ。
    pub fn waves(&self) -> Vec<Vec<&Resource>> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let incoming = self
                    .graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .count();
                (idx, incoming)
            })
            .collect();

        let mut current: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| remaining.get(idx) == Some(&0))
            .collect();

        let mut waves = Vec::new();
        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for &idx in &current {
                for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                    if let Some(count) = remaining.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.insert(dependent);
                        }
                    }
                }
            }
            waves.push(current.iter().map(|&idx| &self.graph[idx]).collect());
            current = next.into_iter().collect();
        }
        waves
    }

    /// 依存先が必ず依存元より前に来る決定的な順序
    pub fn topological_order(&self) -> Vec<&Resource> {
        self.waves().into_iter().flatten().collect()
    }

    /// Graphviz の DOT 形式で出力
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph resources {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for resource in self.resources() {
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"];\n",
                resource.address,
                resource.address.name,
                resource.kind()
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()].address;
            let target = &self.graph[edge.target()].address;
            let dependency = edge.weight();

            let mut label: Vec<&str> = dependency.attributes.iter().map(String::as_str).collect();
            if dependency.explicit {
                label.push("depends_on");
            }
            let style = if dependency.attributes.is_empty() {
                "dashed"
            } else {
                "solid"
            };

            output.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\", style={}];\n",
                source,
                target,
                label.join(","),
                style
            ));
        }

        output.push_str("}\n");
        output
    }
}
