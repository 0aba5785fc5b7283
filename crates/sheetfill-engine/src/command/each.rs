//! The repeating command.
//!
//! `each` walks an ordered sequence and replays its inner area once per
//! element, advancing down or right. The sequence can be filtered with
//! `select`, partitioned with `groupBy`, sorted with `orderBy`, or spread
//! over one generated worksheet per element with `multisheet`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use sheetfill_common::{CellRef, Size, Value, unique_sheet_name};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::{Context, VarGuard};
use crate::error::{Result, TemplateError};
use crate::transform::DocumentTransformer;

/// Axis along which successive iterations are laid out.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    #[default]
    Down,
    Right,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DOWN" => Ok(Direction::Down),
            "RIGHT" => Ok(Direction::Right),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ASC" => Ok(SortOrder::Asc),
            "DESC" => Ok(SortOrder::Desc),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
struct OrderKey {
    path: String,
    order: SortOrder,
}

/// Parse `"name, age DESC"` into ordered sort keys. A key is a field path
/// optionally followed by a direction word.
fn parse_order_by(raw: &str) -> std::result::Result<Vec<OrderKey>, String> {
    let mut keys = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (path, order) = match part.rsplit_once(char::is_whitespace) {
            Some((path, word)) => {
                let order = word.parse::<SortOrder>().map_err(|_| part.to_string())?;
                (path.trim_end(), order)
            }
            None => (part, SortOrder::Asc),
        };
        keys.push(OrderKey {
            path: path.to_string(),
            order,
        });
    }
    Ok(keys)
}

fn directed(ord: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// Group sequences surface to expressions as a map with the representative
/// element under `item` and all members under `items`.
fn group_value(members: Vec<Value>) -> Value {
    let mut map = BTreeMap::new();
    map.insert("item".to_string(), members[0].clone());
    map.insert("items".to_string(), Value::list(members));
    Value::map(map)
}

#[derive(Debug)]
pub struct EachCommand {
    items: String,
    var: String,
    var_index: Option<String>,
    direction: Direction,
    select: Option<String>,
    group_by: Option<String>,
    group_order: Option<SortOrder>,
    group_order_ignore_case: bool,
    order_by: Vec<OrderKey>,
    multisheet: Option<String>,
    area: Area,
}

impl EachCommand {
    pub fn new(items: impl Into<String>, var: impl Into<String>, area: Area) -> Self {
        EachCommand {
            items: items.into(),
            var: var.into(),
            var_index: None,
            direction: Direction::Down,
            select: None,
            group_by: None,
            group_order: None,
            group_order_ignore_case: false,
            order_by: Vec::new(),
            multisheet: None,
            area,
        }
    }

    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        let mut cmd = EachCommand::new(
            spec.required("items")?,
            spec.required("var")?,
            Area::new(spec.rect.clone()),
        );
        cmd.var_index = spec.attr("varIndex").map(str::to_string);
        if let Some(raw) = spec.attr("direction") {
            cmd.direction = raw.parse().map_err(|_| spec.invalid("direction", raw))?;
        }
        cmd.select = spec.attr("select").map(str::to_string);
        cmd.group_by = spec.attr("groupBy").map(str::to_string);
        if let Some(raw) = spec.attr("groupOrder") {
            cmd.group_order = Some(raw.parse().map_err(|_| spec.invalid("groupOrder", raw))?);
        }
        cmd.group_order_ignore_case = spec.bool_attr("groupOrderIgnoreCase")?;
        if let Some(raw) = spec.attr("orderBy") {
            cmd.order_by = parse_order_by(raw).map_err(|bad| spec.invalid("orderBy", &bad))?;
        }
        cmd.multisheet = spec.attr("multisheet").map(str::to_string);
        Ok(cmd)
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_index_var(mut self, name: impl Into<String>) -> Self {
        self.var_index = Some(name.into());
        self
    }

    pub fn with_select(mut self, predicate: impl Into<String>) -> Self {
        self.select = Some(predicate.into());
        self
    }

    pub fn with_group_by(mut self, field: impl Into<String>, order: Option<SortOrder>) -> Self {
        self.group_by = Some(field.into());
        self.group_order = order;
        self
    }

    pub fn with_order_by(mut self, keys: Vec<(String, SortOrder)>) -> Self {
        self.order_by = keys
            .into_iter()
            .map(|(path, order)| OrderKey { path, order })
            .collect();
        self
    }

    pub fn with_multisheet(mut self, names: impl Into<String>) -> Self {
        self.multisheet = Some(names.into());
        self
    }

    pub fn area(&self) -> &Area {
        &self.area
    }

    fn filtered(&self, items: Vec<Value>, ctx: &mut Context) -> Result<Vec<Value>> {
        let Some(select) = &self.select else {
            return Ok(items);
        };
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let keep = {
                let mut scope = VarGuard::new(&mut *ctx);
                scope.bind(&self.var, item.clone());
                scope.evaluate_condition(select)?
            };
            if keep {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Partition into group records, key order first-seen unless
    /// `groupOrder` asks for a sort.
    fn grouped(&self, items: Vec<Value>, ctx: &mut Context) -> Result<Vec<Value>> {
        let Some(group_by) = &self.group_by else {
            return Ok(items);
        };
        let path = format!("{}.{}", self.var, group_by);
        let mut seen: FxHashMap<String, usize> = FxHashMap::default();
        let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
        for item in items {
            let key = {
                let mut scope = VarGuard::new(&mut *ctx);
                scope.bind(&self.var, item.clone());
                scope.evaluate(&path)?
            };
            let bucket = key.group_key(self.group_order_ignore_case);
            match seen.get(&bucket) {
                Some(&i) => groups[i].1.push(item),
                None => {
                    seen.insert(bucket, groups.len());
                    groups.push((key, vec![item]));
                }
            }
        }
        if let Some(order) = self.group_order {
            groups.sort_by(|a, b| {
                directed(a.0.compare(&b.0, self.group_order_ignore_case), order)
            });
        }
        Ok(groups
            .into_iter()
            .map(|(_, members)| group_value(members))
            .collect())
    }

    /// Stable multi-key sort over whatever the pipeline produced so far,
    /// items or group records alike.
    fn ordered(&self, items: Vec<Value>, ctx: &mut Context) -> Result<Vec<Value>> {
        if self.order_by.is_empty() {
            return Ok(items);
        }
        let mut keyed = Vec::with_capacity(items.len());
        for item in items {
            let mut keys = Vec::with_capacity(self.order_by.len());
            {
                let mut scope = VarGuard::new(&mut *ctx);
                scope.bind(&self.var, item.clone());
                for key in &self.order_by {
                    keys.push(scope.evaluate(&format!("{}.{}", self.var, key.path))?);
                }
            }
            keyed.push((keys, item));
        }
        keyed.sort_by(|a, b| {
            for (i, key) in self.order_by.iter().enumerate() {
                let ord = directed(a.0[i].compare(&b.0[i], false), key.order);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// One generated worksheet per element: clone the template sheet under a
    /// sanitized unique name, replay the area there at its template offset,
    /// then drop the template sheet.
    fn apply_multisheet(
        &self,
        items: &[Value],
        names_expr: &str,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let names = match ctx.evaluate(names_expr)? {
            Value::List(names) => names,
            other => {
                return Err(TemplateError::WrongResultType {
                    expression: names_expr.to_string(),
                    expected: "list",
                    actual: other.type_name(),
                });
            }
        };
        let template_sheet = self.area.sheet().to_string();
        if names.len() < items.len() {
            return Err(TemplateError::sheet(
                &template_sheet,
                format!("{} sheet names for {} elements", names.len(), items.len()),
            ));
        }
        let mut taken: BTreeSet<String> = transformer
            .sheet_names()
            .iter()
            .map(|n| n.to_lowercase())
            .collect();
        for (index, item) in items.iter().enumerate() {
            let requested = names[index].to_string();
            let name = unique_sheet_name(&requested, &mut taken);
            if name != requested {
                warn!(requested = %requested, sheet = %name, "sheet name adjusted");
            }
            debug!(sheet = %name, "multisheet copy");
            transformer.clone_sheet(&template_sheet, &name)?;
            let step = CellRef::new(name, self.area.start().row, self.area.start().col);
            let mut scope = VarGuard::new(&mut *ctx);
            scope.bind(&self.var, item.clone());
            if let Some(index_var) = &self.var_index {
                scope.bind(index_var, Value::Int(index as i64));
            }
            self.area.apply_at(&step, &mut scope, transformer)?;
        }
        transformer.delete_sheet(&template_sheet)?;
        Ok(self.area.size())
    }
}

impl Command for EachCommand {
    fn name(&self) -> &str {
        "each"
    }

    fn areas(&self) -> Vec<&Area> {
        vec![&self.area]
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        vec![&mut self.area]
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let items = match ctx.evaluate(&self.items)? {
            Value::List(items) => items.as_ref().clone(),
            other => {
                return Err(TemplateError::WrongResultType {
                    expression: self.items.clone(),
                    expected: "list",
                    actual: other.type_name(),
                });
            }
        };
        if items.is_empty() {
            debug!(items = %self.items, "empty sequence, nothing to write");
            return Ok(Size::ZERO);
        }
        let items = self.filtered(items, ctx)?;
        let items = self.grouped(items, ctx)?;
        let items = self.ordered(items, ctx)?;
        if let Some(names_expr) = &self.multisheet {
            return self.apply_multisheet(&items, names_expr, ctx, transformer);
        }

        let mut total = Size::ZERO;
        let mut row = target.row;
        let mut col = target.col;
        for (index, item) in items.into_iter().enumerate() {
            let step = CellRef::new(target.sheet.clone(), row, col);
            let size = {
                let mut scope = VarGuard::new(&mut *ctx);
                scope.bind(&self.var, item);
                if let Some(index_var) = &self.var_index {
                    scope.bind(index_var, Value::Int(index as i64));
                }
                self.area.apply_at(&step, &mut scope, transformer)?
            };
            match self.direction {
                Direction::Down => {
                    row += size.height;
                    total.height += size.height;
                    total.width = total.width.max(size.width);
                }
                Direction::Right => {
                    col += size.width;
                    total.width += size.width;
                    total.height = total.height.max(size.height);
                }
            }
        }
        Ok(total)
    }
}
