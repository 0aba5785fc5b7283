//! Comment-driven assembly of the area and command tree.
//!
//! Template designers annotate cells with `sf:` lines, one command per
//! line: `sf:each(items="rows" var="r" lastCell="C3")`. Root rectangles
//! come from `sf:area`; every other command nests inside the smallest
//! strictly larger command rectangle (or root) containing its anchor cell.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use sheetfill_common::{AreaRef, CellRef, Size};

use crate::area::Area;
use crate::command::{Command, CommandRegistry, CommandSpec};
use crate::error::{Result, TemplateError};
use crate::transform::{DocumentTransformer, FormulaParams};

/// Prefix marking a comment line as a command.
pub const ANNOTATION_MARKER: &str = "sf:";

static COMMAND_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sf:(\w+)\((.*)\)$").expect("command pattern"));

static LIST_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)\s*=\s*\[([^\]]*)\]").expect("list attribute pattern"));

/// Values take matching double, single or smart quotes.
static SCALAR_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\w+)\s*=\s*(?:"([^"]*)"|'([^']*)'|“([^”]*)”)"#).expect("attribute pattern")
});

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

fn bad_rectangle(command: &str, cell: &CellRef, text: &str) -> TemplateError {
    TemplateError::BadRectangle {
        command: command.to_string(),
        cell: cell.clone(),
        last_cell: text.to_string(),
    }
}

/// Parse every `sf:` line of one comment into command specs, in line
/// order. Non-command lines are ignored.
pub fn parse_annotation(cell: &CellRef, comment: &str) -> Vec<Result<CommandSpec>> {
    comment
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(ANNOTATION_MARKER))
        .map(|line| parse_command_line(cell, line))
        .collect()
}

fn parse_command_line(cell: &CellRef, line: &str) -> Result<CommandSpec> {
    let caps = COMMAND_LINE
        .captures(line)
        .ok_or_else(|| TemplateError::MalformedAnnotation {
            cell: cell.clone(),
            text: line.to_string(),
        })?;
    let name = caps[1].to_string();
    let body = &caps[2];

    let mut area_refs = Vec::new();
    for list in LIST_ATTR.captures_iter(body) {
        if &list[1] != "areas" {
            continue;
        }
        for entry in list[2].split(',') {
            let entry = unquote(entry);
            if entry.is_empty() {
                continue;
            }
            let rect = AreaRef::parse_with_default(entry, &cell.sheet)
                .map_err(|_| bad_rectangle(&name, cell, entry))?;
            area_refs.push(rect);
        }
    }

    let scalars = LIST_ATTR.replace_all(body, " ");
    let mut attrs = FxHashMap::default();
    for attr in SCALAR_ATTR.captures_iter(scalars.as_ref()) {
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        attrs.insert(attr[1].to_string(), value.to_string());
    }

    // `params` annotates its own cell; everything else spans to `lastCell`.
    let rect = if name == "params" {
        AreaRef::new(cell.clone(), Size::new(1, 1))
    } else {
        let raw = attrs
            .get("lastCell")
            .ok_or_else(|| TemplateError::MissingAttribute {
                command: name.clone(),
                cell: cell.clone(),
                attribute: "lastCell".to_string(),
            })?;
        let last = CellRef::parse_with_default(raw, &cell.sheet)
            .map_err(|_| bad_rectangle(&name, cell, raw))?;
        AreaRef::from_corners(cell.clone(), &last)
            .ok_or_else(|| bad_rectangle(&name, cell, raw))?
    };

    Ok(CommandSpec {
        name,
        cell: cell.clone(),
        rect,
        attrs,
        area_refs,
    })
}

fn formula_params(spec: &CommandSpec) -> Result<FormulaParams> {
    let strategy = match spec.attr("formulaStrategy") {
        None => Default::default(),
        Some(raw) => raw
            .parse()
            .map_err(|_| spec.invalid("formulaStrategy", raw))?,
    };
    Ok(FormulaParams {
        default_value: spec.attr("defaultValue").map(str::to_string),
        strategy,
    })
}

struct Pending {
    rect: AreaRef,
    command: Box<dyn Command>,
}

/// Assembles the area tree from a transformer's commented cells.
pub struct AreaBuilder {
    registry: CommandRegistry,
}

impl AreaBuilder {
    pub fn new() -> Self {
        AreaBuilder {
            registry: CommandRegistry::with_builtins(),
        }
    }

    pub fn with_registry(registry: CommandRegistry) -> Self {
        AreaBuilder { registry }
    }

    /// Extension point for user commands.
    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Parse all annotations and produce the root areas, ready to apply.
    pub fn build(&self, transformer: &mut dyn DocumentTransformer) -> Result<Vec<Area>> {
        let mut specs = Vec::new();
        for (cell, comment) in transformer.commented_cells() {
            for spec in parse_annotation(&cell, &comment) {
                specs.push(spec?);
            }
        }
        if specs.is_empty() {
            return Err(TemplateError::NoAnnotatedCells);
        }

        let mut roots: Vec<Area> = Vec::new();
        let mut commands: Vec<Pending> = Vec::new();
        for spec in specs {
            match spec.name.as_str() {
                "params" => {
                    transformer.set_formula_params(&spec.cell, formula_params(&spec)?)?;
                }
                "area" => roots.push(Area::new(spec.rect.clone())),
                _ => commands.push(Pending {
                    rect: spec.rect.clone(),
                    command: self.registry.create(&spec)?,
                }),
            }
        }
        if roots.is_empty() {
            return Err(TemplateError::NoRootArea);
        }
        debug!(roots = roots.len(), commands = commands.len(), "template parsed");

        // Children first: ascending cell count, ties by anchor position
        // then parse order. Equal counts never nest, so every command's
        // parent is still unprocessed when the command attaches.
        let mut order: Vec<usize> = (0..commands.len()).collect();
        order.sort_by_key(|&i| {
            (
                commands[i].rect.cell_count(),
                commands[i].rect.first_cell.row,
                commands[i].rect.first_cell.col,
                i,
            )
        });
        let mut slots: Vec<Option<Pending>> = commands.into_iter().map(Some).collect();
        for &i in &order {
            let pending = slots[i].take().expect("each command nests once");
            let mut parent: Option<(usize, usize)> = None;
            for &j in &order {
                if j == i {
                    continue;
                }
                let Some(candidate) = slots[j].as_ref() else {
                    continue;
                };
                if candidate.rect.cell_count() <= pending.rect.cell_count() {
                    continue;
                }
                let found = candidate
                    .command
                    .areas()
                    .iter()
                    .position(|area| area.area_ref().contains(&pending.rect.first_cell));
                if let Some(area_idx) = found {
                    parent = Some((j, area_idx));
                    break;
                }
            }
            match parent {
                Some((j, area_idx)) => {
                    let owner = slots[j].as_mut().expect("parent not yet attached");
                    owner.command.areas_mut()[area_idx].add_command(pending.command, &pending.rect);
                }
                None => {
                    match roots
                        .iter_mut()
                        .find(|root| root.area_ref().contains(&pending.rect.first_cell))
                    {
                        Some(root) => root.add_command(pending.command, &pending.rect),
                        None => warn!(
                            command = pending.command.name(),
                            rect = %pending.rect,
                            "command lies outside every root area, skipped"
                        ),
                    }
                }
            }
        }

        for root in &mut roots {
            root.sort_tree();
        }
        Ok(roots)
    }
}

impl Default for AreaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{FormulaStrategy, InMemoryTransformer};
    use sheetfill_common::Value;

    fn doc_with(comments: &[(&str, &str)]) -> InMemoryTransformer {
        let mut doc = InMemoryTransformer::new();
        doc.add_sheet("S");
        for (cell, text) in comments {
            let cell: CellRef = cell.parse().unwrap();
            doc.load_value(cell.clone(), Value::Empty);
            doc.load_comment(&cell, *text);
        }
        doc
    }

    #[test]
    fn no_annotations_fails() {
        let mut doc = InMemoryTransformer::new();
        doc.load_value(CellRef::new("S", 0, 0), Value::from("x"));
        doc.load_comment(&CellRef::new("S", 0, 0), "plain note");
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::NoAnnotatedCells)
        ));
    }

    #[test]
    fn missing_root_area_fails() {
        let mut doc = doc_with(&[(
            "S!A2",
            r#"sf:each(items="rows" var="r" lastCell="B2")"#,
        )]);
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::NoRootArea)
        ));
    }

    #[test]
    fn builds_a_root_with_one_binding() {
        let mut doc = doc_with(&[
            ("S!A1", r#"sf:area(lastCell="C4")"#),
            ("S!A2", r#"sf:each(items="rows" var="r" lastCell="C3")"#),
        ]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].area_ref().to_string(), "S!A1:C4");
        let bindings = roots[0].bindings();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].command().name(), "each");
        assert_eq!(bindings[0].row_offset(), 1);
        assert_eq!(bindings[0].col_offset(), 0);
        assert_eq!(bindings[0].size(), Size::new(3, 2));
    }

    #[test]
    fn commands_nest_inside_the_smallest_containing_rectangle() {
        let mut doc = doc_with(&[
            ("S!A1", r#"sf:area(lastCell="D8")"#),
            ("S!A2", r#"sf:each(items="rows" var="r" lastCell="D6")"#),
            ("S!B3", r#"sf:if(condition="r.ok" lastCell="C4")"#),
        ]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        let root_bindings = roots[0].bindings();
        assert_eq!(root_bindings.len(), 1);
        let each_area = &root_bindings[0].command().areas()[0];
        assert_eq!(each_area.bindings().len(), 1);
        let nested = &each_area.bindings()[0];
        assert_eq!(nested.command().name(), "if");
        // Offsets are relative to the each rectangle anchored at A2.
        assert_eq!(nested.row_offset(), 1);
        assert_eq!(nested.col_offset(), 1);
    }

    #[test]
    fn multiple_commands_per_comment() {
        let mut doc = doc_with(&[(
            "S!A1",
            "sf:area(lastCell=\"B3\")\nsf:mergeCells(lastCell=\"B1\")",
        )]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        assert_eq!(roots[0].bindings().len(), 1);
        assert_eq!(roots[0].bindings()[0].command().name(), "mergeCells");
    }

    #[test]
    fn params_line_configures_the_cell() {
        let mut doc = doc_with(&[("S!A1", r#"sf:area(lastCell="B2")"#)]);
        doc.load_formula("S!B2".parse().unwrap(), "SUM(A1:A1)");
        doc.load_comment(
            &"S!B2".parse().unwrap(),
            r#"sf:params(defaultValue="1" formulaStrategy="BY_COLUMN")"#,
        );
        AreaBuilder::new().build(&mut doc).unwrap();
        let params = doc
            .cell_data(&"S!B2".parse().unwrap())
            .unwrap()
            .params
            .clone()
            .unwrap();
        assert_eq!(params.default_value.as_deref(), Some("1"));
        assert_eq!(params.strategy, FormulaStrategy::ByColumn);
    }

    #[test]
    fn explicit_areas_attribute_reaches_the_command() {
        let mut doc = doc_with(&[
            ("S!A1", r#"sf:area(lastCell="D4")"#),
            (
                "S!A2",
                r#"sf:if(condition="ok" lastCell="B2" areas=["A2:B2", "Other!A9:B9"])"#,
            ),
        ]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        let command = roots[0].bindings()[0].command();
        let areas = command.areas();
        assert_eq!(areas.len(), 2);
        assert_eq!(areas[0].area_ref().to_string(), "S!A2:B2");
        assert_eq!(areas[1].area_ref().to_string(), "Other!A9:B9");
    }

    #[test]
    fn smart_quotes_are_accepted() {
        let mut doc = doc_with(&[("S!A1", "sf:area(lastCell=“B2”)")]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        assert_eq!(roots[0].size(), Size::new(2, 2));
    }

    #[test]
    fn unknown_commands_are_fatal() {
        let mut doc = doc_with(&[
            ("S!A1", r#"sf:area(lastCell="B2")"#),
            ("S!A2", r#"sf:explode(lastCell="B2")"#),
        ]);
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn commands_outside_every_root_are_skipped() {
        let mut doc = doc_with(&[
            ("S!A1", r#"sf:area(lastCell="B2")"#),
            ("S!A9", r#"sf:mergeCells(lastCell="B9")"#),
        ]);
        let roots = AreaBuilder::new().build(&mut doc).unwrap();
        assert!(roots[0].bindings().is_empty());
    }

    #[test]
    fn malformed_lines_are_rejected() {
        let mut doc = doc_with(&[("S!A1", "sf:area lastCell=\"B2\"")]);
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::MalformedAnnotation { .. })
        ));
    }

    #[test]
    fn missing_last_cell_is_rejected() {
        let mut doc = doc_with(&[("S!A1", r#"sf:area(notLast="B2")"#)]);
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::MissingAttribute { ref attribute, .. }) if attribute == "lastCell"
        ));
    }

    #[test]
    fn cross_sheet_last_cell_is_rejected() {
        let mut doc = doc_with(&[("S!A1", r#"sf:area(lastCell="Other!B2")"#)]);
        assert!(matches!(
            AreaBuilder::new().build(&mut doc),
            Err(TemplateError::BadRectangle { .. })
        ));
    }
}
