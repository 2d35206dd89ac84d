//! Template Assembly
//!
//! Builds the whole FML program for one snapshot: the `map` header, the
//! `uses` declarations, the main group and every named group.
//!
//! All-or-nothing: every graph is compiled and emitted before any text is
//! returned, so a fatal error never leaves a partial program behind.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::compiler::{compile, compile_with_environment, CompiledGraph, GroupParam};
use super::emitter::emit;
use super::graph::{MappingGraph, Side, TemplateSnapshot};
use super::names::sanitize_identifier;
use crate::config::TemplateConfig;
use crate::environment::TypeEnvironment;
use crate::error::Result;

/// Compile a snapshot into FML text
pub fn generate_template(snapshot: &TemplateSnapshot, config: &TemplateConfig) -> Result<String> {
    generate(snapshot, config, None)
}

/// Like `generate_template`, also checking edge handles against the loaded types
pub fn generate_template_with_environment(
    snapshot: &TemplateSnapshot,
    config: &TemplateConfig,
    env: &TypeEnvironment,
) -> Result<String> {
    generate(snapshot, config, Some(env))
}

fn compile_graph(graph: &MappingGraph, env: Option<&TypeEnvironment>) -> Result<CompiledGraph> {
    match env {
        Some(env) => compile_with_environment(graph, env),
        None => compile(graph),
    }
}

fn generate(
    snapshot: &TemplateSnapshot,
    config: &TemplateConfig,
    env: Option<&TypeEnvironment>,
) -> Result<String> {
    let main = compile_graph(&snapshot.main, env)?;
    let groups = snapshot
        .groups
        .iter()
        .map(|group| Ok((group.name.as_str(), compile_graph(&group.graph, env)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut out = String::new();

    let map_url = snapshot.map_url.clone().unwrap_or_else(|| {
        format!("{}{}", config.map_url_base, sanitize_identifier(&snapshot.map_name))
    });
    out.push_str(&format!("map \"{}\" = \"{}\"\n\n", map_url, snapshot.map_name));

    let aliases = TypeAliases::new(&main.params);
    let uses = uses_lines(&main.params, &aliases);
    if !uses.is_empty() {
        for line in &uses {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }

    let mut headers = HashSet::new();
    let mut blocks = Vec::new();
    for (name, compiled) in std::iter::once((config.main_group_name.as_str(), &main))
        .chain(groups.iter().map(|(name, compiled)| (*name, compiled)))
    {
        let header = group_header(name, &compiled.params, &aliases);
        if !headers.insert(header.clone()) {
            debug!(group = name, "duplicate group header skipped");
            continue;
        }
        let body = emit(compiled, config, 1)?;
        blocks.push(format!("{}\n{}}}\n", header, body));
    }
    out.push_str(&blocks.join("\n"));

    Ok(out)
}

/// Type names used in `uses` lines and group headers. A declared type
/// bound on both sides gets a side suffix (`PatientSource`,
/// `PatientTarget`) so every alias names one `uses` line.
#[derive(Debug, Default)]
pub struct TypeAliases {
    aliases: HashMap<(Side, String), String>,
}

impl TypeAliases {
    pub fn new(params: &[GroupParam]) -> Self {
        let declared = |side: Side| {
            params
                .iter()
                .filter(|p| p.side == side && p.url.is_some())
                .map(|p| p.resource.as_str())
                .collect::<HashSet<_>>()
        };
        let sources = declared(Side::Source);
        let targets = declared(Side::Target);

        let mut aliases = HashMap::new();
        for resource in sources.intersection(&targets) {
            aliases.insert((Side::Source, resource.to_string()), format!("{}Source", resource));
            aliases.insert((Side::Target, resource.to_string()), format!("{}Target", resource));
        }
        Self { aliases }
    }

    /// Type name `param` is declared with
    pub fn get<'a>(&'a self, param: &'a GroupParam) -> &'a str {
        self.aliases
            .get(&(param.side, param.resource.clone()))
            .map(String::as_str)
            .unwrap_or(&param.resource)
    }
}

/// De-duplicated `uses` lines, source declarations first
pub fn uses_lines(params: &[GroupParam], aliases: &TypeAliases) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut lines: Vec<(Side, String)> = params
        .iter()
        .filter_map(|p| {
            p.url.as_ref().map(|url| {
                (
                    p.side,
                    format!("uses \"{}\" alias {} as {}", url, aliases.get(p), p.side),
                )
            })
        })
        .filter(|(_, line)| seen.insert(line.clone()))
        .collect();
    lines.sort_by_key(|(side, _)| *side != Side::Source);
    lines.into_iter().map(|(_, line)| line).collect()
}

/// `group Name(source a : T, target b : U) {`, sources first
pub fn group_header(name: &str, params: &[GroupParam], aliases: &TypeAliases) -> String {
    let mut params: Vec<&GroupParam> = params.iter().collect();
    params.sort_by_key(|p| p.side != Side::Source);
    let declarations: Vec<String> = params
        .iter()
        .map(|p| p.declaration_as(aliases.get(p)))
        .collect();
    format!(
        "group {}({}) {{",
        sanitize_identifier(name),
        declarations.join(", ")
    )
}
