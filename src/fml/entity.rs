//! FML Entity Model
//!
//! The rule forest one compile pass builds. Entities live in an arena and
//! refer to each other by `EntityId`: the father is a plain id, children an
//! owned id list. Two synthetic anchors root the source and target sides.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::ops::Index;

use super::graph::TransformAction;

/// Position of an entity in its `Forest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityId(pub usize);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which sub-forest an entity may live in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Source,
    Target,
    /// Source-to-target rule, attachable anywhere
    Both,
    /// Group call or group parameter binding
    GroupNode,
}

impl NodeType {
    /// Wildcards attach under any father
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Both | Self::GroupNode)
    }
}

// =============================================================================
// Entity payloads
// =============================================================================

/// One source or target variable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FmlNode {
    pub resource: String,
    pub alias: String,
    pub url: Option<String>,
}

/// Right-hand side (or target) of a rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RuleParam {
    /// `alias` or `alias.field`
    Variable { alias: String, field: Option<String> },
    Literal(Value),
}

impl RuleParam {
    pub fn variable(alias: impl Into<String>, field: Option<&str>) -> Self {
        Self::Variable {
            alias: alias.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }
}

impl fmt::Display for RuleParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable { alias, field: Some(field) } => write!(f, "{}.{}", alias, field),
            Self::Variable { alias, field: None } => write!(f, "{}", alias),
            Self::Literal(Value::String(s)) => write!(f, "'{}'", quote(s)),
            Self::Literal(Value::Null) => write!(f, "''"),
            Self::Literal(Value::Number(n)) => write!(f, "{}", n),
            Self::Literal(Value::Bool(b)) => write!(f, "{}", b),
            Self::Literal(other) => write!(f, "'{}'", quote(&other.to_string())),
        }
    }
}

/// Escape a string literal body: backslashes first, then quotes
fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// The variable a create/navigation rule brings into scope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instantiation {
    pub resource: String,
    pub alias: String,
}

/// One emitted mapping statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FmlRule {
    /// Quoted name closing the statement
    pub label: String,
    pub action: TransformAction,
    pub left_param: RuleParam,
    pub right_params: Vec<RuleParam>,
    /// Assignment between two target variables, ordered after the referenced one
    pub is_reference: bool,
    pub condition: Option<String>,
    /// Set for rules that instantiate a nested node
    pub creates: Option<Instantiation>,
}

/// Call of a named sub-mapping group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FmlGroupNode {
    pub name: String,
    pub label: String,
    pub sources: Vec<RuleParam>,
    pub targets: Vec<RuleParam>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EntityKind {
    Anchor,
    Node(FmlNode),
    Group(FmlGroupNode),
    Rule(FmlRule),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub node_type: NodeType,
    pub father: Option<EntityId>,
    pub children: Vec<EntityId>,
    pub kind: EntityKind,
}

impl Entity {
    pub fn rule(&self) -> Option<&FmlRule> {
        match &self.kind {
            EntityKind::Rule(rule) => Some(rule),
            _ => None,
        }
    }
}

// =============================================================================
// Forest
// =============================================================================

/// Arena holding every entity of one compile pass
#[derive(Debug, Clone, Serialize)]
pub struct Forest {
    entities: Vec<Entity>,
    source_anchor: EntityId,
    target_anchor: EntityId,
}

impl Default for Forest {
    fn default() -> Self {
        Self::new()
    }
}

impl Forest {
    /// Empty forest holding only the two anchors
    pub fn new() -> Self {
        let mut forest = Self {
            entities: Vec::new(),
            source_anchor: EntityId(0),
            target_anchor: EntityId(1),
        };
        forest.source_anchor = forest.add(NodeType::Source, EntityKind::Anchor);
        forest.target_anchor = forest.add(NodeType::Target, EntityKind::Anchor);
        forest
    }

    pub fn add(&mut self, node_type: NodeType, kind: EntityKind) -> EntityId {
        let id = EntityId(self.entities.len());
        self.entities.push(Entity {
            id,
            node_type,
            father: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id.0)
    }

    pub fn source_anchor(&self) -> EntityId {
        self.source_anchor
    }

    pub fn target_anchor(&self) -> EntityId {
        self.target_anchor
    }

    /// Anchors in emission order: source side first
    pub fn roots(&self) -> [EntityId; 2] {
        [self.source_anchor, self.target_anchor]
    }

    /// Anchor a detached entity of this type falls back to
    pub fn anchor_for(&self, node_type: NodeType) -> EntityId {
        match node_type {
            NodeType::Source => self.source_anchor,
            NodeType::Target | NodeType::Both | NodeType::GroupNode => self.target_anchor,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Link `child` under `parent`.
    ///
    /// Succeeds only when the types match or the child is a wildcard, the
    /// child has no father yet and the link would not close a cycle.
    pub fn attach_parent_child(&mut self, parent: EntityId, child: EntityId) -> bool {
        let (Some(p), Some(c)) = (self.get(parent), self.get(child)) else {
            return false;
        };
        if c.father.is_some() || parent == child {
            return false;
        }
        if p.node_type != c.node_type && !c.node_type.is_wildcard() {
            return false;
        }
        if self.path_to(parent).contains(&child) {
            return false;
        }

        self.entities[child.0].father = Some(parent);
        self.entities[parent.0].children.push(child);
        true
    }

    /// Ids from the root down to `id`, both included
    pub fn path_to(&self, id: EntityId) -> Vec<EntityId> {
        let mut path = Vec::new();
        let mut current = self.get(id).map(|e| e.id);
        while let Some(entity) = current.and_then(|c| self.get(c)) {
            path.push(entity.id);
            current = entity.father;
        }
        path.reverse();
        path
    }

    /// Number of entities on the path from the root to `id`
    pub fn depth(&self, id: EntityId) -> usize {
        self.path_to(id).len()
    }

    /// Pre-order subtree of `id`, itself included
    pub fn subtree(&self, id: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(entity) = self.get(current) else {
                continue;
            };
            result.push(current);
            stack.extend(entity.children.iter().rev().copied());
        }
        result
    }
}

impl Index<EntityId> for Forest {
    type Output = Entity;

    fn index(&self, id: EntityId) -> &Entity {
        &self.entities[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(forest: &mut Forest, node_type: NodeType, alias: &str) -> EntityId {
        forest.add(
            node_type,
            EntityKind::Node(FmlNode {
                resource: "Patient".to_string(),
                alias: alias.to_string(),
                url: None,
            }),
        )
    }

    fn copy_rule(forest: &mut Forest, node_type: NodeType) -> EntityId {
        forest.add(
            node_type,
            EntityKind::Rule(FmlRule {
                label: "copy".to_string(),
                action: TransformAction::Copy,
                left_param: RuleParam::variable("b", Some("x")),
                right_params: vec![RuleParam::variable("a", Some("y"))],
                is_reference: false,
                condition: None,
                creates: None,
            }),
        )
    }

    #[test]
    fn test_attach_requires_matching_type() {
        let mut forest = Forest::new();
        let patient = node(&mut forest, NodeType::Source, "patient_0");
        let observation = node(&mut forest, NodeType::Target, "observation_1");

        assert!(!forest.attach_parent_child(forest.target_anchor(), patient));
        assert!(forest.attach_parent_child(forest.source_anchor(), patient));
        assert!(forest.attach_parent_child(forest.target_anchor(), observation));

        let source_rule = copy_rule(&mut forest, NodeType::Source);
        assert!(!forest.attach_parent_child(observation, source_rule));

        let both = copy_rule(&mut forest, NodeType::Both);
        assert!(forest.attach_parent_child(observation, both));
        // already attached
        assert!(!forest.attach_parent_child(patient, both));
    }

    #[test]
    fn test_attach_rejects_cycles() {
        let mut forest = Forest::new();
        let a = node(&mut forest, NodeType::Target, "a");
        let b = node(&mut forest, NodeType::Target, "b");
        assert!(forest.attach_parent_child(a, b));
        assert!(!forest.attach_parent_child(b, a));
    }

    #[test]
    fn test_path_and_subtree() {
        let mut forest = Forest::new();
        let observation = node(&mut forest, NodeType::Target, "observation_1");
        let rule = copy_rule(&mut forest, NodeType::Target);
        forest.attach_parent_child(forest.target_anchor(), observation);
        forest.attach_parent_child(observation, rule);

        assert_eq!(forest.path_to(rule), vec![forest.target_anchor(), observation, rule]);
        assert_eq!(forest.depth(rule), 3);
        assert_eq!(forest.subtree(forest.target_anchor()), vec![forest.target_anchor(), observation, rule]);
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(RuleParam::Literal(json!("final")).to_string(), "'final'");
        assert_eq!(RuleParam::Literal(json!(3)).to_string(), "3");
        assert_eq!(RuleParam::Literal(json!("it's")).to_string(), "'it\\'s'");
        assert_eq!(RuleParam::Literal(json!("C:\\")).to_string(), "'C:\\\\'");
        assert_eq!(RuleParam::Literal(json!("a\\'b")).to_string(), "'a\\\\\\'b'");
        assert_eq!(RuleParam::variable("p", None).to_string(), "p");
    }
}
