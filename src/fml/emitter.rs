//! Program Emitter
//!
//! Depth-first printer over a compiled rule forest. Before an entity is
//! printed, the branches holding variables that reference rules in its
//! subtree read are printed at the same level, so every variable exists
//! before it is used. A `visited` set makes re-entry from several
//! dependencies a no-op; the output depends only on the forest.

use std::collections::HashSet;
use std::fmt::Write as _;
use tracing::warn;

use super::compiler::CompiledGraph;
use super::entity::{EntityId, EntityKind, FmlGroupNode, FmlRule, NodeType, RuleParam};
use super::graph::TransformAction;
use crate::config::TemplateConfig;
use crate::error::{FmlError, Result};

/// Print the rule lines of one group body, indented `base_level` levels
pub fn emit(compiled: &CompiledGraph, config: &TemplateConfig, base_level: usize) -> Result<String> {
    let mut emitter = Emitter {
        compiled,
        config,
        base_level,
        visited: HashSet::new(),
        in_progress: HashSet::new(),
        out: String::new(),
    };
    for root in compiled.forest.roots() {
        emitter.emit_entity(root, 0)?;
    }
    Ok(emitter.out)
}

struct Emitter<'a> {
    compiled: &'a CompiledGraph,
    config: &'a TemplateConfig,
    base_level: usize,
    visited: HashSet<EntityId>,
    in_progress: HashSet<EntityId>,
    out: String,
}

impl<'a> Emitter<'a> {
    fn line(&mut self, nesting: usize, text: &str) {
        let width = (self.base_level + nesting) * self.config.indent;
        let _ = writeln!(self.out, "{:width$}{}", "", text, width = width);
    }

    fn emit_entity(&mut self, id: EntityId, nesting: usize) -> Result<()> {
        if !self.visited.insert(id) {
            return Ok(());
        }
        self.in_progress.insert(id);
        self.emit_dependencies(id, nesting)?;

        let compiled = self.compiled;
        let entity = &compiled.forest[id];
        match &entity.kind {
            EntityKind::Anchor | EntityKind::Node(_) => {
                for &child in &entity.children {
                    self.emit_entity(child, nesting)?;
                }
            }
            EntityKind::Group(call) => self.line(nesting, &group_call(call)),
            // Parameter bindings are printed as part of the call
            EntityKind::Rule(_) if entity.node_type == NodeType::GroupNode => {}
            EntityKind::Rule(rule) => {
                let head = rule_head(rule);
                if self.has_output_below(id) {
                    if nesting + 1 > self.config.max_depth {
                        return Err(FmlError::NestingTooDeep {
                            max_depth: self.config.max_depth,
                        });
                    }
                    self.line(nesting, &format!("{} then {{", head));
                    for &child in &entity.children {
                        self.emit_entity(child, nesting + 1)?;
                    }
                    self.line(nesting, &format!("}} \"{}\";", rule.label));
                } else {
                    self.line(nesting, &format!("{} \"{}\";", head, rule.label));
                }
            }
        }

        self.in_progress.remove(&id);
        Ok(())
    }

    /// Print, beside `id`, the branches that reference rules below it read
    fn emit_dependencies(&mut self, id: EntityId, nesting: usize) -> Result<()> {
        let compiled = self.compiled;
        let forest = &compiled.forest;
        let father = forest[id].father;

        for member in forest.subtree(id) {
            let Some(path) = compiled.dependencies.get(&member) else {
                continue;
            };
            let Some(&branch) = path.iter().find(|&&p| forest[p].father == father) else {
                continue;
            };
            if branch == id {
                continue;
            }
            if self.in_progress.contains(&branch) {
                warn!(rule = %member, branch = %branch, "cyclic reference, emitting in forest order");
                continue;
            }
            self.emit_entity(branch, nesting)?;
        }
        Ok(())
    }

    /// Does anything below `id` print a line?
    fn has_output_below(&self, id: EntityId) -> bool {
        let forest = &self.compiled.forest;
        forest.subtree(id).into_iter().skip(1).any(|e| match &forest[e].kind {
            EntityKind::Group(_) => true,
            EntityKind::Rule(_) => forest[e].node_type != NodeType::GroupNode,
            EntityKind::Anchor | EntityKind::Node(_) => false,
        })
    }
}

fn join(params: &[RuleParam]) -> String {
    params
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Statement text before `then {` or the closing label
pub fn rule_head(rule: &FmlRule) -> String {
    let left = rule.left_param.to_string();

    let (source, target) = match (&rule.creates, rule.action) {
        (Some(inst), TransformAction::Create) => (
            None,
            Some(format!("{} = create('{}') as {}", left, inst.resource, inst.alias)),
        ),
        // source navigation
        (Some(inst), _) => (Some(format!("{} as {}", left, inst.alias)), None),
        (None, _) if rule.is_reference => (
            None,
            Some(format!("{} = reference({})", left, join(&rule.right_params))),
        ),
        (None, TransformAction::Copy) => match rule.right_params.first() {
            Some(var @ RuleParam::Variable { .. }) => {
                (Some(var.to_string()), Some(format!("{} = {}", left, var)))
            }
            Some(literal) => (None, Some(format!("{} = {}", left, literal))),
            None => (None, Some(left)),
        },
        (None, action) => {
            let inputs: Vec<String> = rule
                .right_params
                .iter()
                .filter(|p| p.is_variable())
                .map(ToString::to_string)
                .collect();
            let call = format!("{} = {}({})", left, action, join(&rule.right_params));
            ((!inputs.is_empty()).then(|| inputs.join(", ")), Some(call))
        }
    };

    let condition = rule
        .condition
        .as_ref()
        .map(|c| format!(" where {}", c))
        .unwrap_or_default();

    match (source, target) {
        (Some(s), Some(t)) => format!("{}{} -> {}", s, condition, t),
        (Some(s), None) => format!("{}{}", s, condition),
        (None, Some(t)) => format!("{}{}", t, condition),
        (None, None) => condition.trim_start().to_string(),
    }
}

/// `sources -> targets then Name(args) "label";`
fn group_call(call: &FmlGroupNode) -> String {
    let sources = join(&call.sources);
    let targets = join(&call.targets);
    let args: Vec<String> = call
        .sources
        .iter()
        .chain(&call.targets)
        .map(ToString::to_string)
        .collect();

    let head = match (sources.is_empty(), targets.is_empty()) {
        (false, false) => format!("{} -> {} ", sources, targets),
        (false, true) => format!("{} ", sources),
        (true, false) => format!("{} ", targets),
        (true, true) => String::new(),
    };
    format!("{}then {}({}) \"{}\";", head, call.name, args.join(", "), call.label)
}
