//! Terminal rendering of plans and apply results

use std::collections::{BTreeMap, HashMap, HashSet};

use colored::{ColoredString, Colorize};

use terrace_core::effect::Effect;
use terrace_core::interpreter::{ApplyResult, EffectOutcome};
use terrace_core::plan::Plan;
use terrace_core::resource::{Attributes, Value};

const UNKNOWN: &str = "(known after apply)";

pub fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    let effects = plan.effects();

    // Dependency edges between effects of this plan
    let mut binding_to_effect: HashMap<String, usize> = HashMap::new();
    for (idx, effect) in effects.iter().enumerate() {
        if let Some(r) = effect.desired() {
            binding_to_effect.insert(r.binding(), idx);
        }
    }

    let mut dependents: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots: Vec<usize> = Vec::new();
    for (idx, effect) in effects.iter().enumerate() {
        let deps: Vec<usize> = effect
            .desired()
            .map(|r| {
                r.dependencies()
                    .iter()
                    .filter_map(|d| binding_to_effect.get(d).copied())
                    .collect()
            })
            .unwrap_or_default();
        if deps.is_empty() {
            roots.push(idx);
        }
        for dep_idx in deps {
            dependents.entry(dep_idx).or_default().push(idx);
        }
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    let mut printed: HashSet<usize> = HashSet::new();
    for (i, root_idx) in roots.iter().enumerate() {
        print_effect_tree(
            *root_idx,
            effects,
            &dependents,
            &mut printed,
            0,
            i == roots.len() - 1,
            "",
        );
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to create, {} to update, {} to replace, {} to delete.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

fn symbol(effect: &Effect) -> ColoredString {
    match effect {
        Effect::Create(_) => "+".green().bold(),
        Effect::Update { .. } => "~".yellow().bold(),
        Effect::Replace { .. } => "-/+".magenta().bold(),
        Effect::Delete { .. } => "-".red().bold(),
    }
}

fn print_effect_tree(
    idx: usize,
    effects: &[Effect],
    dependents: &HashMap<usize, Vec<usize>>,
    printed: &mut HashSet<usize>,
    depth: usize,
    is_last: bool,
    prefix: &str,
) {
    if !printed.insert(idx) {
        return;
    }

    let effect = &effects[idx];
    let connector = if depth == 0 {
        String::new()
    } else if is_last {
        format!("{}└─ ", prefix)
    } else {
        format!("{}├─ ", prefix)
    };
    // Continuation column for lines below this resource
    let continuation = if depth == 0 {
        "  ".to_string()
    } else if is_last {
        format!("{}   ", prefix)
    } else {
        format!("{}│  ", prefix)
    };
    let attr_prefix = format!("  {}  ", continuation);

    let id = effect.resource_id();
    println!(
        "  {}{} {} {}",
        connector,
        symbol(effect),
        id.resource_type.cyan().bold(),
        id.name.bold()
    );

    match effect {
        Effect::Create(r) => {
            for (key, value) in sorted_attributes(&r.attributes) {
                println!("{}{}: {}", attr_prefix, key, format_value(value).green());
            }
        }
        Effect::Update { from, to, .. } | Effect::Replace { from, to, .. } => {
            let replace = matches!(effect, Effect::Replace { .. });
            for (key, new_value) in sorted_attributes(&to.attributes) {
                let old_value = from.attributes.get(key);
                if old_value == Some(new_value) {
                    continue;
                }
                let old_str = old_value
                    .map(format_value)
                    .unwrap_or_else(|| "(none)".to_string());
                let marker = if replace && from.attributes.contains_key(key) {
                    " (forces replacement)".magenta()
                } else {
                    "".normal()
                };
                println!(
                    "{}{}: {} → {}{}",
                    attr_prefix,
                    key,
                    old_str.red(),
                    format_value(new_value).green(),
                    marker
                );
            }
        }
        Effect::Delete { identifier, .. } => {
            println!("{}{}: {}", attr_prefix, "id".bold(), identifier.red());
        }
    }

    let children: Vec<usize> = dependents
        .get(&idx)
        .map(|c| c.iter().copied().filter(|c| !printed.contains(c)).collect())
        .unwrap_or_default();
    for (i, child_idx) in children.iter().enumerate() {
        print_effect_tree(
            *child_idx,
            effects,
            dependents,
            printed,
            depth + 1,
            i == children.len() - 1,
            &format!("{}  ", continuation),
        );
    }
}

fn sorted_attributes(attributes: &Attributes) -> Vec<(&String, &Value)> {
    let mut attrs: Vec<_> = attributes
        .iter()
        .filter(|(k, _)| !k.starts_with('_'))
        .collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    attrs
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let mut lines = s.lines();
            match (lines.next(), lines.count()) {
                (Some(first), rest) if rest > 0 => {
                    format!("\"{}...\" ({} lines)", first, rest + 1)
                }
                _ => format!("\"{}\"", s),
            }
        }
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let sorted: BTreeMap<_, _> = map.iter().collect();
            let strs: Vec<_> = sorted
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(_, _) | Value::Computed(_) => UNKNOWN.to_string(),
    }
}

/// One line per effect with its outcome
pub fn print_apply_result(plan: &Plan, result: &ApplyResult) {
    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(EffectOutcome::Skipped { reason }) => {
                println!("  {} {} ({})", "○".dimmed(), effect, reason.dimmed())
            }
            Ok(outcome) => {
                let identifier = outcome
                    .state()
                    .and_then(|s| s.identifier.as_deref())
                    .map(|i| format!(" [{}]", i))
                    .unwrap_or_default();
                println!("  {} {}{}", "✓".green(), effect, identifier.dimmed())
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), effect, e),
        }
    }
}

pub fn print_outputs(outputs: &BTreeMap<String, serde_json::Value>) {
    for (name, value) in outputs {
        let rendered = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("{} = {}", name.bold(), rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_values_render_as_known_after_apply() {
        assert_eq!(
            format_value(&Value::reference("db_instance", "private_ip")),
            "(known after apply)"
        );
        assert_eq!(
            format_value(&Value::List(vec![
                Value::string("sg-1"),
                Value::reference("app_sg", "id")
            ])),
            "[\"sg-1\", (known after apply)]"
        );
    }

    #[test]
    fn multi_line_strings_are_abbreviated() {
        assert_eq!(
            format_value(&Value::string("#!/bin/bash\napt-get update\n")),
            "\"#!/bin/bash...\" (2 lines)"
        );
        assert_eq!(format_value(&Value::string("t2.micro")), "\"t2.micro\"");
    }
}
