//! Graph Compiler
//!
//! Turns one `MappingGraph` into a rule forest rooted at the source and
//! target anchors, plus the dependency map the emitter needs to order
//! references between target variables.
//!
//! Passes:
//! 1. every edge endpoint must name a node of the snapshot
//! 2. element and group nodes become entities
//! 3. self edges mark nested nodes; the rest hang under the anchors
//! 4. self edges instantiate nested nodes (`create` / navigation rules)
//! 5. remaining edges become rules, in edge order
//! 6. group calls attach under their deepest parameter
//! 7. reference rules record the path of the variable they read

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use super::entity::{
    EntityId, EntityKind, FmlGroupNode, FmlNode, FmlRule, Forest, Instantiation, NodeType,
    RuleParam,
};
use super::graph::{GraphEdge, GraphNode, MappingGraph, NodeData, Side, TransformAction};
use super::names::{default_alias, sanitize_identifier, LabelCounter};
use crate::environment::TypeEnvironment;
use crate::error::{FmlError, Result};
use crate::fhir_types;

/// A root variable of a group: appears in the group header and `uses` lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupParam {
    pub side: Side,
    pub alias: String,
    pub resource: String,
    pub url: Option<String>,
}

impl GroupParam {
    /// `source patient_0 : Patient`
    pub fn declaration(&self) -> String {
        self.declaration_as(&self.resource)
    }

    /// Declaration naming the type through a `uses` alias
    pub fn declaration_as(&self, type_name: &str) -> String {
        format!("{} {} : {}", self.side, self.alias, type_name)
    }
}

/// Output of one compile pass
#[derive(Debug, Clone, Serialize)]
pub struct CompiledGraph {
    pub forest: Forest,
    /// Reference rule -> root-to-node path of the variable it reads
    pub dependencies: BTreeMap<EntityId, Vec<EntityId>>,
    /// Root element nodes in node order
    pub params: Vec<GroupParam>,
}

impl From<Side> for NodeType {
    fn from(side: Side) -> Self {
        match side {
            Side::Source => NodeType::Source,
            Side::Target => NodeType::Target,
        }
    }
}

/// Compile a graph snapshot
pub fn compile(graph: &MappingGraph) -> Result<CompiledGraph> {
    Compiler::new(graph, None).run()
}

/// Compile, additionally warning about handles that name no field of the
/// node's type
pub fn compile_with_environment(
    graph: &MappingGraph,
    env: &TypeEnvironment,
) -> Result<CompiledGraph> {
    Compiler::new(graph, Some(env)).run()
}

/// Type of a rule from the sides of its endpoints
fn rule_type(source: Option<Side>, target: Side) -> NodeType {
    match (source, target) {
        (Some(Side::Source), Side::Target) => NodeType::Both,
        (_, side) => side.into(),
    }
}

fn invalid(edge: &GraphEdge, reason: &str) -> FmlError {
    FmlError::InvalidEdge {
        edge_id: edge.id.clone(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
struct Element {
    side: Side,
    entity: EntityId,
    alias: String,
}

struct Compiler<'a> {
    graph: &'a MappingGraph,
    env: Option<&'a TypeEnvironment>,
    nodes: HashMap<&'a str, &'a GraphNode>,
    elements: HashMap<&'a str, Element>,
    groups: HashMap<&'a str, EntityId>,
    group_endpoints: HashMap<EntityId, Vec<EntityId>>,
    forest: Forest,
    labels: LabelCounter,
    /// (reference rule, variable it reads)
    references: Vec<(EntityId, EntityId)>,
}

impl<'a> Compiler<'a> {
    fn new(graph: &'a MappingGraph, env: Option<&'a TypeEnvironment>) -> Self {
        Self {
            graph,
            env,
            nodes: graph.nodes.iter().map(|n| (n.id.as_str(), n)).collect(),
            elements: HashMap::new(),
            groups: HashMap::new(),
            group_endpoints: HashMap::new(),
            forest: Forest::new(),
            labels: LabelCounter::new(),
            references: Vec::new(),
        }
    }

    fn run(mut self) -> Result<CompiledGraph> {
        let graph = self.graph;
        for edge in &graph.edges {
            self.node(edge, &edge.source)?;
            self.node(edge, &edge.target)?;
        }

        self.create_entities();
        let nested = self.nested_nodes()?;
        let params = self.attach_roots(&nested);

        let (self_edges, other_edges): (Vec<&GraphEdge>, Vec<&GraphEdge>) =
            graph.edges.iter().partition(|e| self.is_self_edge(e));
        for edge in self_edges {
            self.instantiate(edge)?;
        }
        for edge in other_edges {
            self.compile_edge(edge)?;
        }

        self.attach_groups();
        self.check_fields();

        let dependencies = self
            .references
            .iter()
            .map(|&(rule, node)| (rule, self.forest.path_to(node)))
            .collect();

        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            entities = self.forest.len(),
            "graph compiled"
        );

        Ok(CompiledGraph {
            forest: self.forest,
            dependencies,
            params,
        })
    }

    // ========== Lookup ==========

    fn node(&self, edge: &GraphEdge, id: &str) -> Result<&'a GraphNode> {
        self.nodes
            .get(id)
            .copied()
            .ok_or_else(|| FmlError::UnresolvedNodeReference {
                edge_id: edge.id.clone(),
                node_id: id.to_string(),
            })
    }

    fn element(&self, edge: &GraphEdge, id: &str) -> Result<Element> {
        self.elements
            .get(id)
            .cloned()
            .ok_or_else(|| invalid(edge, &format!("node '{}' is not an element", id)))
    }

    fn is_self_edge(&self, edge: &GraphEdge) -> bool {
        match (
            self.elements.get(edge.source.as_str()),
            self.elements.get(edge.target.as_str()),
        ) {
            (Some(parent), Some(child)) => {
                parent.side == child.side
                    && edge.source != edge.target
                    && edge.source_handle.is_some()
                    && edge.target_handle.is_none()
            }
            _ => false,
        }
    }

    // ========== Entities ==========

    fn create_entities(&mut self) {
        let graph = self.graph;
        for (index, node) in graph.nodes.iter().enumerate() {
            match &node.data {
                NodeData::Element {
                    side,
                    resource,
                    url,
                    alias,
                } => {
                    let alias = alias
                        .as_deref()
                        .map(sanitize_identifier)
                        .unwrap_or_else(|| default_alias(resource, index));
                    let url = url.clone().or_else(|| {
                        fhir_types::is_defined_type(resource)
                            .then(|| fhir_types::canonical_url(resource))
                    });
                    let entity = self.forest.add(
                        (*side).into(),
                        EntityKind::Node(FmlNode {
                            resource: resource.clone(),
                            alias: alias.clone(),
                            url,
                        }),
                    );
                    self.elements.insert(
                        node.id.as_str(),
                        Element {
                            side: *side,
                            entity,
                            alias,
                        },
                    );
                }
                NodeData::Group { name } => {
                    let name = sanitize_identifier(name);
                    let label = self.labels.next(&name);
                    let entity = self.forest.add(
                        NodeType::GroupNode,
                        EntityKind::Group(FmlGroupNode {
                            name,
                            label,
                            sources: Vec::new(),
                            targets: Vec::new(),
                        }),
                    );
                    self.groups.insert(node.id.as_str(), entity);
                }
                NodeData::Transform { .. } | NodeData::Constant { .. } => {}
            }
        }
    }

    /// Nodes instantiated by a self edge; each at most once
    fn nested_nodes(&self) -> Result<HashSet<&'a str>> {
        let mut nested = HashSet::new();
        for edge in self.graph.edges.iter().filter(|e| self.is_self_edge(e)) {
            if !nested.insert(edge.target.as_str()) {
                return Err(FmlError::DuplicateInstantiation {
                    node_id: edge.target.clone(),
                });
            }
        }
        Ok(nested)
    }

    fn attach_roots(&mut self, nested: &HashSet<&str>) -> Vec<GroupParam> {
        let graph = self.graph;
        let mut params = Vec::new();
        for node in &graph.nodes {
            if nested.contains(node.id.as_str()) {
                continue;
            }
            let NodeData::Element { side, resource, .. } = &node.data else {
                continue;
            };
            let Some(element) = self.elements.get(node.id.as_str()).cloned() else {
                continue;
            };
            let anchor = self.forest.anchor_for((*side).into());
            self.forest.attach_parent_child(anchor, element.entity);

            let url = match &self.forest[element.entity].kind {
                EntityKind::Node(n) => n.url.clone(),
                _ => None,
            };
            params.push(GroupParam {
                side: *side,
                alias: element.alias,
                resource: resource.clone(),
                url,
            });
        }
        params
    }

    /// Link `child` under `parent`, falling back to the anchor of its type
    fn attach(&mut self, parent: EntityId, child: EntityId) {
        if self.forest.attach_parent_child(parent, child) {
            return;
        }
        let anchor = self.forest.anchor_for(self.forest[child].node_type);
        debug!(%parent, %child, %anchor, "attachment refused, using anchor");
        self.forest.attach_parent_child(anchor, child);
    }

    /// Deepest of `candidates`; `preferred` wins ties
    fn deepest(&self, candidates: &[EntityId], preferred: EntityId) -> EntityId {
        let mut best = preferred;
        let mut best_depth = self.forest.depth(preferred);
        for &candidate in candidates {
            let depth = self.forest.depth(candidate);
            if depth > best_depth {
                best = candidate;
                best_depth = depth;
            }
        }
        best
    }

    /// Instantiated by a self edge rather than hung under an anchor
    fn is_nested(&self, id: EntityId) -> bool {
        self.forest[id]
            .father
            .is_some_and(|father| !self.forest.roots().contains(&father))
    }

    /// Parent of a rule reading `sources` and writing `target`. A nested
    /// target variable is only in scope inside its `create` block, so the
    /// rule goes there; otherwise under the deepest endpoint.
    fn both_parent(&self, edge: &GraphEdge, sources: &[EntityId], target: EntityId) -> EntityId {
        if !self.is_nested(target) {
            return self.deepest(sources, target);
        }
        if sources.iter().any(|&s| self.is_nested(s)) {
            warn!(
                edge = %edge.id,
                "source and target variables are both nested, rule placed in the target block"
            );
        }
        target
    }

    fn add_rule(&mut self, node_type: NodeType, rule: FmlRule) -> EntityId {
        self.forest.add(node_type, EntityKind::Rule(rule))
    }

    // ========== Rules ==========

    /// Self edge: the parent's field instantiates the nested node
    fn instantiate(&mut self, edge: &GraphEdge) -> Result<()> {
        let parent = self.element(edge, &edge.source)?;
        let child = self.element(edge, &edge.target)?;
        let resource = match &self.forest[child.entity].kind {
            EntityKind::Node(node) => node.resource.clone(),
            _ => return Err(invalid(edge, "instantiated node is not an element")),
        };

        let action = match parent.side {
            Side::Target => TransformAction::Create,
            Side::Source => TransformAction::Copy,
        };
        let rule = FmlRule {
            label: self.labels.next(action.as_str()),
            action,
            left_param: RuleParam::variable(&parent.alias, edge.source_handle.as_deref()),
            right_params: Vec::new(),
            is_reference: false,
            condition: edge.condition.clone(),
            creates: Some(Instantiation {
                resource,
                alias: child.alias.clone(),
            }),
        };
        let id = self.add_rule(parent.side.into(), rule);
        self.attach(parent.entity, id);
        self.attach(id, child.entity);
        Ok(())
    }

    fn compile_edge(&mut self, edge: &GraphEdge) -> Result<()> {
        let source = self.node(edge, &edge.source)?;
        let target = self.node(edge, &edge.target)?;

        match (&source.data, &target.data) {
            // Inputs are read when the transform's output edge is compiled
            (_, NodeData::Transform { .. }) => Ok(()),
            (_, NodeData::Constant { .. }) => Err(invalid(edge, "a constant cannot receive an edge")),
            (NodeData::Transform { action }, NodeData::Element { .. }) => {
                self.transform_rule(edge, source, *action)
            }
            (NodeData::Transform { .. }, _) => {
                Err(invalid(edge, "a transform output must feed an element"))
            }
            (NodeData::Group { .. }, NodeData::Group { .. }) => {
                Err(invalid(edge, "groups cannot be connected to each other"))
            }
            (_, NodeData::Group { .. }) | (NodeData::Group { .. }, _) => {
                self.group_binding(edge, source, target)
            }
            (NodeData::Constant { value }, NodeData::Element { .. }) => {
                self.constant_rule(edge, value)
            }
            (NodeData::Element { .. }, NodeData::Element { .. }) => self.copy_rule(edge),
        }
    }

    fn copy_rule(&mut self, edge: &GraphEdge) -> Result<()> {
        let src = self.element(edge, &edge.source)?;
        let tgt = self.element(edge, &edge.target)?;
        if src.side == Side::Target && tgt.side == Side::Source {
            return Err(invalid(edge, "target values cannot flow into a source element"));
        }

        let is_reference =
            edge.source_handle.is_none() && src.side == Side::Target && tgt.side == Side::Target;
        let node_type = rule_type(Some(src.side), tgt.side);
        let rule = FmlRule {
            label: self.labels.next(TransformAction::Copy.as_str()),
            action: TransformAction::Copy,
            left_param: RuleParam::variable(&tgt.alias, edge.target_handle.as_deref()),
            right_params: vec![RuleParam::variable(&src.alias, edge.source_handle.as_deref())],
            is_reference,
            condition: edge.condition.clone(),
            creates: None,
        };
        let id = self.add_rule(node_type, rule);

        let parent = if node_type == NodeType::Both {
            self.both_parent(edge, &[src.entity], tgt.entity)
        } else {
            tgt.entity
        };
        self.attach(parent, id);

        if is_reference {
            self.references.push((id, src.entity));
        }
        Ok(())
    }

    fn constant_rule(&mut self, edge: &GraphEdge, value: &serde_json::Value) -> Result<()> {
        let tgt = self.element(edge, &edge.target)?;
        let rule = FmlRule {
            label: self.labels.next(TransformAction::Copy.as_str()),
            action: TransformAction::Copy,
            left_param: RuleParam::variable(&tgt.alias, edge.target_handle.as_deref()),
            right_params: vec![RuleParam::Literal(value.clone())],
            is_reference: false,
            condition: edge.condition.clone(),
            creates: None,
        };
        let id = self.add_rule(rule_type(None, tgt.side), rule);
        self.attach(tgt.entity, id);
        Ok(())
    }

    /// Output edge of a transform node; its inputs are the edges into it
    fn transform_rule(
        &mut self,
        edge: &GraphEdge,
        transform: &GraphNode,
        action: TransformAction,
    ) -> Result<()> {
        let output = self.element(edge, &edge.target)?;
        let graph = self.graph;

        let mut right_params = Vec::new();
        let mut inputs: Vec<Element> = Vec::new();
        for input in graph.edges.iter().filter(|e| e.target == transform.id) {
            let node = self.node(input, &input.source)?;
            match &node.data {
                NodeData::Constant { value } => right_params.push(RuleParam::Literal(value.clone())),
                NodeData::Element { .. } => {
                    let element = self.element(input, &input.source)?;
                    right_params.push(RuleParam::variable(
                        &element.alias,
                        input.source_handle.as_deref(),
                    ));
                    inputs.push(element);
                }
                _ => return Err(invalid(input, "transform inputs must be elements or constants")),
            }
        }

        let has_source_input = inputs.iter().any(|i| i.side == Side::Source);
        let has_target_input = inputs.iter().any(|i| i.side == Side::Target);
        if output.side == Side::Source && has_target_input {
            return Err(invalid(edge, "target values cannot flow into a source element"));
        }

        let node_type = rule_type(has_source_input.then_some(Side::Source), output.side);
        let is_reference = action == TransformAction::Reference
            && !inputs.is_empty()
            && inputs.iter().all(|i| i.side == Side::Target);

        let rule = FmlRule {
            label: self.labels.next(action.as_str()),
            action,
            left_param: RuleParam::variable(&output.alias, edge.target_handle.as_deref()),
            right_params,
            is_reference,
            condition: edge.condition.clone(),
            creates: None,
        };
        let id = self.add_rule(node_type, rule);

        let parent = if node_type == NodeType::Both {
            let entities: Vec<EntityId> = inputs.iter().map(|i| i.entity).collect();
            self.both_parent(edge, &entities, output.entity)
        } else {
            output.entity
        };
        self.attach(parent, id);

        if let (true, Some(first)) = (is_reference, inputs.first()) {
            self.references.push((id, first.entity));
        }
        Ok(())
    }

    /// Edge into or out of a group node: binds one call parameter
    fn group_binding(
        &mut self,
        edge: &GraphEdge,
        source: &GraphNode,
        target: &GraphNode,
    ) -> Result<()> {
        let (group_node, other, handle) = match source.data {
            NodeData::Group { .. } => (source, target, edge.target_handle.as_deref()),
            _ => (target, source, edge.source_handle.as_deref()),
        };
        let group = self
            .groups
            .get(group_node.id.as_str())
            .copied()
            .ok_or_else(|| invalid(edge, "group node has no entity"))?;

        let (param, side) = match &other.data {
            NodeData::Element { .. } => {
                let element = self.element(edge, &other.id)?;
                self.group_endpoints
                    .entry(group)
                    .or_default()
                    .push(element.entity);
                (RuleParam::variable(&element.alias, handle), Some(element.side))
            }
            NodeData::Constant { value } => (RuleParam::Literal(value.clone()), None),
            _ => return Err(invalid(edge, "group parameters must be elements or constants")),
        };

        let Some(EntityKind::Group(call)) = self.forest.get_mut(group).map(|e| &mut e.kind) else {
            return Err(invalid(edge, "group node has no entity"));
        };
        let label = call.label.clone();
        match side {
            Some(Side::Target) => call.targets.push(param.clone()),
            _ => call.sources.push(param.clone()),
        }

        let binding = FmlRule {
            label,
            action: TransformAction::Copy,
            left_param: param,
            right_params: Vec::new(),
            is_reference: false,
            condition: edge.condition.clone(),
            creates: None,
        };
        let id = self.add_rule(NodeType::GroupNode, binding);
        self.attach(group, id);
        Ok(())
    }

    /// Each group call hangs under its deepest parameter, target side on ties
    fn attach_groups(&mut self) {
        let graph = self.graph;
        for node in &graph.nodes {
            let Some(&group) = self.groups.get(node.id.as_str()) else {
                continue;
            };
            let endpoints = self.group_endpoints.get(&group).cloned().unwrap_or_default();
            let parent = endpoints
                .into_iter()
                .max_by_key(|&e| {
                    (
                        self.forest.depth(e),
                        self.forest[e].node_type == NodeType::Target,
                    )
                })
                .unwrap_or_else(|| self.forest.target_anchor());
            self.attach(parent, group);
        }
    }

    // ========== Field checks ==========

    fn check_fields(&self) {
        let Some(env) = self.env else {
            return;
        };
        for edge in &self.graph.edges {
            let endpoints = [
                (edge.source.as_str(), edge.source_handle.as_deref()),
                (edge.target.as_str(), edge.target_handle.as_deref()),
            ];
            for (node_id, handle) in endpoints {
                let (Some(node), Some(handle)) = (self.nodes.get(node_id), handle) else {
                    continue;
                };
                let NodeData::Element { resource, .. } = &node.data else {
                    continue;
                };
                if env.get_type(resource).is_none() {
                    debug!(resource = %resource, "type not loaded, field not checked");
                } else if env.resolve_path(resource, handle).is_none() {
                    warn!(edge = %edge.id, resource = %resource, field = handle, "field not found in type");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(id: &str, side: Side, resource: &str, alias: &str) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            data: NodeData::Element {
                side,
                resource: resource.to_string(),
                url: None,
                alias: Some(alias.to_string()),
            },
        }
    }

    fn edge(id: &str, source: &str, target: &str, sh: Option<&str>, th: Option<&str>) -> GraphEdge {
        GraphEdge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            source_handle: sh.map(str::to_string),
            target_handle: th.map(str::to_string),
            condition: None,
        }
    }

    fn patient_observation() -> MappingGraph {
        MappingGraph {
            nodes: vec![
                element("p", Side::Source, "Patient", "patient_0"),
                element("o", Side::Target, "Observation", "observation_1"),
            ],
            edges: vec![edge("e1", "p", "o", Some("id"), Some("subject"))],
        }
    }

    fn rules(compiled: &CompiledGraph) -> Vec<&FmlRule> {
        compiled.forest.iter().filter_map(|e| e.rule()).collect()
    }

    #[test]
    fn test_copy_between_roots() {
        let compiled = compile(&patient_observation()).unwrap();
        let forest = &compiled.forest;

        assert_eq!(compiled.params.len(), 2);
        assert_eq!(compiled.params[0].declaration(), "source patient_0 : Patient");
        assert_eq!(
            compiled.params[1].url.as_deref(),
            Some("http://hl7.org/fhir/StructureDefinition/Observation")
        );

        let rule_id = forest.iter().find(|e| e.rule().is_some()).unwrap().id;
        assert_eq!(forest[rule_id].node_type, NodeType::Both);
        // tie on depth goes to the target endpoint
        let father = forest[rule_id].father.unwrap();
        assert!(matches!(&forest[father].kind, EntityKind::Node(n) if n.alias == "observation_1"));
        assert!(compiled.dependencies.is_empty());
    }

    #[test]
    fn test_unknown_node_is_fatal() {
        let mut graph = patient_observation();
        graph.edges.push(edge("e2", "p", "ghost", Some("id"), Some("id")));

        match compile(&graph).unwrap_err() {
            FmlError::UnresolvedNodeReference { edge_id, node_id } => {
                assert_eq!(edge_id, "e2");
                assert_eq!(node_id, "ghost");
            }
            other => panic!("Expected UnresolvedNodeReference, got {:?}", other),
        }
    }

    #[test]
    fn test_target_to_source_is_fatal() {
        let mut graph = patient_observation();
        graph.edges.push(edge("e2", "o", "p", Some("status"), Some("gender")));

        assert!(matches!(compile(&graph).unwrap_err(), FmlError::InvalidEdge { .. }));
    }

    #[test]
    fn test_self_edge_creates_nested_node() {
        let mut graph = patient_observation();
        graph.nodes.push(element("c", Side::Target, "CodeableConcept", "code_2"));
        graph.edges.push(edge("e2", "o", "c", Some("code"), None));
        graph.edges.push(edge("e3", "p", "c", Some("gender"), Some("text")));

        let compiled = compile(&graph).unwrap();
        let forest = &compiled.forest;

        let create = forest
            .iter()
            .find(|e| e.rule().is_some_and(|r| r.action == TransformAction::Create))
            .unwrap();
        assert_eq!(create.node_type, NodeType::Target);
        assert_eq!(create.rule().unwrap().label, "create");

        let nested = create.children[0];
        assert!(matches!(&forest[nested].kind, EntityKind::Node(n) if n.alias == "code_2"));
        // the copy into code_2 hangs under the nested target
        let copy_into_code = forest[nested].children[0];
        assert_eq!(forest[copy_into_code].rule().unwrap().label, "copy_1");
        // nested nodes are not group parameters
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_double_instantiation_is_fatal() {
        let mut graph = patient_observation();
        graph.nodes.push(element("c", Side::Target, "CodeableConcept", "code_2"));
        graph.edges.push(edge("e2", "o", "c", Some("code"), None));
        graph.edges.push(edge("e3", "o", "c", Some("category"), None));

        assert!(matches!(
            compile(&graph).unwrap_err(),
            FmlError::DuplicateInstantiation { node_id } if node_id == "c"
        ));
    }

    #[test]
    fn test_reference_between_targets_records_dependency() {
        let mut graph = patient_observation();
        graph.nodes.push(element("enc", Side::Target, "Encounter", "encounter_2"));
        graph.edges.push(edge("e2", "enc", "o", None, Some("encounter")));

        let compiled = compile(&graph).unwrap();
        let reference = compiled
            .forest
            .iter()
            .find(|e| e.rule().is_some_and(|r| r.is_reference))
            .unwrap();

        assert_eq!(reference.node_type, NodeType::Target);
        let path = &compiled.dependencies[&reference.id];
        assert_eq!(path[0], compiled.forest.target_anchor());
        assert!(matches!(
            &compiled.forest[*path.last().unwrap()].kind,
            EntityKind::Node(n) if n.alias == "encounter_2"
        ));
    }

    #[test]
    fn test_transform_collects_inputs_in_edge_order() {
        let mut graph = patient_observation();
        graph.nodes.push(GraphNode {
            id: "t".to_string(),
            data: NodeData::Transform { action: TransformAction::Append },
        });
        graph.nodes.push(GraphNode {
            id: "k".to_string(),
            data: NodeData::Constant { value: json!(" ") },
        });
        graph.edges.push(edge("e2", "p", "t", Some("name"), None));
        graph.edges.push(edge("e3", "t", "o", None, Some("note")));
        graph.edges.push(edge("e4", "k", "t", None, None));

        let compiled = compile(&graph).unwrap();
        let append = rules(&compiled)
            .into_iter()
            .find(|r| r.action == TransformAction::Append)
            .unwrap();

        assert_eq!(append.label, "append");
        assert_eq!(append.right_params.len(), 2);
        assert_eq!(append.right_params[0].to_string(), "patient_0.name");
        assert_eq!(append.right_params[1].to_string(), "' '");
    }

    #[test]
    fn test_group_call_collects_parameters() {
        let mut graph = patient_observation();
        graph.nodes.push(GraphNode {
            id: "g".to_string(),
            data: NodeData::Group { name: "ContactMap".to_string() },
        });
        graph.edges.push(edge("e2", "p", "g", Some("contact"), None));
        graph.edges.push(edge("e3", "g", "o", None, Some("note")));

        let compiled = compile(&graph).unwrap();
        let call = compiled
            .forest
            .iter()
            .find_map(|e| match &e.kind {
                EntityKind::Group(g) => Some((e, g)),
                _ => None,
            })
            .unwrap();

        assert_eq!(call.1.sources, vec![RuleParam::variable("patient_0", Some("contact"))]);
        assert_eq!(call.1.targets, vec![RuleParam::variable("observation_1", Some("note"))]);
        assert_eq!(call.0.children.len(), 2);
        assert!(call.0.father.is_some());
    }

    #[test]
    fn test_group_names_do_not_collide_with_rule_labels() {
        let mut graph = patient_observation();
        graph.nodes.push(GraphNode {
            id: "g".to_string(),
            data: NodeData::Group { name: "copy_1".to_string() },
        });
        graph.edges.push(edge("e2", "p", "g", Some("name"), None));
        graph.edges.push(edge("e3", "p", "o", Some("gender"), Some("status")));

        let compiled = compile(&graph).unwrap();
        let call_label = compiled
            .forest
            .iter()
            .find_map(|e| match &e.kind {
                EntityKind::Group(g) => Some(g.label.clone()),
                _ => None,
            })
            .unwrap();
        let copy_labels: Vec<&str> = rules(&compiled)
            .into_iter()
            .filter(|r| r.action == TransformAction::Copy && !r.right_params.is_empty())
            .map(|r| r.label.as_str())
            .collect();

        assert_eq!(call_label, "copy_1");
        assert_eq!(copy_labels, vec!["copy", "copy_2"]);
    }

    #[test]
    fn test_default_aliases() {
        let graph = MappingGraph {
            nodes: vec![GraphNode {
                id: "p".to_string(),
                data: NodeData::Element {
                    side: Side::Source,
                    resource: "Patient".to_string(),
                    url: None,
                    alias: None,
                },
            }],
            edges: Vec::new(),
        };

        let compiled = compile(&graph).unwrap();
        assert_eq!(compiled.params[0].alias, "patient_0");
    }
}
