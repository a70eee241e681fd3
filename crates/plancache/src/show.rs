//! Read-only inspection of stored plans.
//!
//! `show_cached_plan` is a plain lookup plus rendering — it does not run
//! the controller, collect parameters, or touch enablement. Ordinal 0 shows
//! the entry normal lookups would serve; ordinal N shows the N-th stored
//! candidate whether or not it is enabled.

use plancache_core::{CacheError, Plan, PlanKind, PlannedStmt, Result};
use plancache_store::PlanStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainFormat {
    Text,
    Xml,
    Json,
    Yaml,
}

impl std::str::FromStr for ExplainFormat {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(ExplainFormat::Text),
            "xml" => Ok(ExplainFormat::Xml),
            "json" => Ok(ExplainFormat::Json),
            "yaml" => Ok(ExplainFormat::Yaml),
            other => Err(CacheError::InvalidDiagnosticRequest(format!(
                "unrecognized value for output format \"{}\" (supported: text, xml, json, yaml)",
                other
            ))),
        }
    }
}

/// Look up a stored plan by fingerprint and render it as output lines.
pub fn show_cached_plan(
    store: &PlanStore,
    fingerprint: u32,
    ordinal: usize,
    format: ExplainFormat,
) -> Result<Vec<String>> {
    let stmt = {
        let scope = store.read_scope();
        let entry = scope
            .lookup_by_query_fingerprint(fingerprint, ordinal)
            .ok_or_else(|| {
                CacheError::InvalidDiagnosticRequest("could not find saved plan".to_string())
            })?;
        entry.decode_plan()?
    };

    match format {
        ExplainFormat::Text => Ok(render_text(&stmt)),
        ExplainFormat::Json => {
            let rendered = serde_json::to_string_pretty(&stmt)?;
            Ok(rendered.lines().map(str::to_string).collect())
        }
        ExplainFormat::Xml => Ok(render_xml(&stmt)),
        ExplainFormat::Yaml => Ok(render_yaml(&stmt)),
    }
}

fn node_detail(plan: &Plan) -> String {
    match &plan.kind {
        PlanKind::SeqScan { relation } | PlanKind::BitmapHeapScan { relation } => {
            format!("{} on relation {}", plan.kind_name(), relation)
        }
        PlanKind::IndexScan { relation, index } | PlanKind::IndexOnlyScan { relation, index } => {
            format!(
                "{} using index {} on relation {}",
                plan.kind_name(),
                index,
                relation
            )
        }
        PlanKind::BitmapIndexScan { index } => {
            format!("{} on index {}", plan.kind_name(), index)
        }
        _ => plan.kind_name().to_string(),
    }
}

fn children_of(plan: &Plan) -> Vec<&Plan> {
    let mut children: Vec<&Plan> = Vec::new();
    match &plan.kind {
        PlanKind::SubqueryScan { subplan } => children.push(subplan),
        PlanKind::CustomScan { children: list }
        | PlanKind::Append { children: list }
        | PlanKind::MergeAppend { children: list }
        | PlanKind::BitmapAnd { children: list }
        | PlanKind::BitmapOr { children: list }
        | PlanKind::ModifyTable { children: list } => children.extend(list.iter()),
        _ => {}
    }
    if let Some(left) = plan.left.as_deref() {
        children.push(left);
    }
    if let Some(right) = plan.right.as_deref() {
        children.push(right);
    }
    children
}

fn render_text(stmt: &PlannedStmt) -> Vec<String> {
    let mut lines = Vec::new();
    render_text_node(&stmt.plan, 0, &mut lines);
    for (pos, subplan) in stmt.subplans.iter().enumerate() {
        lines.push(format!("SubPlan {}", pos + 1));
        render_text_node(subplan, 1, &mut lines);
    }
    lines
}

fn render_text_node(plan: &Plan, depth: usize, lines: &mut Vec<String>) {
    let prefix = if depth == 0 {
        String::new()
    } else {
        format!("{}->  ", "  ".repeat(depth))
    };
    lines.push(format!("{}{}", prefix, node_detail(plan)));
    if !plan.qual.is_empty() {
        lines.push(format!(
            "{}  Filter: {} condition(s)",
            "  ".repeat(depth + 1),
            plan.qual.len()
        ));
    }
    for child in children_of(plan) {
        render_text_node(child, depth + 1, lines);
    }
}

fn render_xml(stmt: &PlannedStmt) -> Vec<String> {
    let mut lines = vec!["<plan>".to_string()];
    render_xml_node(&stmt.plan, 1, &mut lines);
    lines.push("</plan>".to_string());
    lines
}

fn render_xml_node(plan: &Plan, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let children = children_of(plan);
    if children.is_empty() {
        lines.push(format!("{}<node kind=\"{}\"/>", indent, plan.kind_name()));
    } else {
        lines.push(format!("{}<node kind=\"{}\">", indent, plan.kind_name()));
        for child in children {
            render_xml_node(child, depth + 1, lines);
        }
        lines.push(format!("{}</node>", indent));
    }
}

fn render_yaml(stmt: &PlannedStmt) -> Vec<String> {
    let mut lines = Vec::new();
    render_yaml_node(&stmt.plan, 0, &mut lines);
    lines
}

fn render_yaml_node(plan: &Plan, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    lines.push(format!("{}- Node Kind: \"{}\"", indent, plan.kind_name()));
    let children = children_of(plan);
    if !children.is_empty() {
        lines.push(format!("{}  Plans:", indent));
        for child in children {
            render_yaml_node(child, depth + 1, lines);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plancache_core::{IndexId, RelationId};
    use plancache_store::CacheEntry;

    fn seeded_store() -> PlanStore {
        let plan = Plan::new(PlanKind::Sort).with_left(
            Plan::new(PlanKind::IndexScan {
                relation: RelationId(10),
                index: IndexId(20),
            })
            .with_qual(vec![plancache_core::Expr::constant(
                plancache_core::ScalarValue::Boolean(Some(true)),
                -1,
            )]),
        );
        let stmt = PlannedStmt::new(plan);
        let store = PlanStore::new();
        store
            .write_scope()
            .insert(CacheEntry::new(
                77,
                1,
                "SELECT * FROM t ORDER BY id",
                serde_json::to_vec(&stmt).unwrap(),
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_text_rendering_shows_tree() {
        let store = seeded_store();
        let lines = show_cached_plan(&store, 77, 1, ExplainFormat::Text).unwrap();

        assert_eq!(lines[0], "Sort");
        assert!(lines[1].contains("Index Scan using index 20 on relation 10"));
        assert!(lines.iter().any(|line| line.contains("Filter")));
    }

    #[test]
    fn test_json_rendering_parses_back() {
        let store = seeded_store();
        let lines = show_cached_plan(&store, 77, 1, ExplainFormat::Json).unwrap();
        let joined = lines.join("\n");
        let parsed: PlannedStmt = serde_json::from_str(&joined).unwrap();
        assert_eq!(parsed.plan.kind_name(), "Sort");
    }

    #[test]
    fn test_xml_and_yaml_render() {
        let store = seeded_store();

        let xml = show_cached_plan(&store, 77, 1, ExplainFormat::Xml).unwrap();
        assert_eq!(xml.first().map(String::as_str), Some("<plan>"));
        assert_eq!(xml.last().map(String::as_str), Some("</plan>"));

        let yaml = show_cached_plan(&store, 77, 1, ExplainFormat::Yaml).unwrap();
        assert!(yaml[0].contains("Sort"));
    }

    #[test]
    fn test_unknown_fingerprint_is_user_error() {
        let store = seeded_store();
        let result = show_cached_plan(&store, 999, 0, ExplainFormat::Text);
        assert!(matches!(
            result,
            Err(CacheError::InvalidDiagnosticRequest(_))
        ));
    }

    #[test]
    fn test_ordinal_zero_respects_enablement() {
        let store = seeded_store();
        // The only entry is disabled, so the "what would be served" view is
        // empty while ordinal 1 still shows the candidate.
        assert!(show_cached_plan(&store, 77, 0, ExplainFormat::Text).is_err());
        assert!(show_cached_plan(&store, 77, 1, ExplainFormat::Text).is_ok());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ExplainFormat>().unwrap(), ExplainFormat::Json);
        assert!(matches!(
            "html".parse::<ExplainFormat>(),
            Err(CacheError::InvalidDiagnosticRequest(_))
        ));
    }
}
