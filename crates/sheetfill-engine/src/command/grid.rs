//! The grid command: header row plus data matrix from one annotation.

use rustc_hash::FxHashMap;

use sheetfill_common::{AreaRef, CellRef, Size, Value};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::{Context, VarGuard};
use crate::error::{Result, TemplateError};
use crate::transform::DocumentTransformer;

/// Fills a header band from `headers` and one band per `data` row, binding
/// `header` and `cell` while replaying the two sub-areas across columns.
///
/// Rows may be lists (cells in order) or maps read through the `props` key
/// list. `formatCells` maps a value kind to an alternate template cell, so
/// numbers and dates can carry their own styling.
pub struct GridCommand {
    headers: String,
    data: String,
    props: Vec<String>,
    cell: CellRef,
    header_area: Area,
    body_area: Area,
    format_areas: FxHashMap<String, Area>,
}

impl GridCommand {
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        let headers = spec.required("headers")?.to_string();
        let data = spec.required("data")?.to_string();
        match spec.area_refs.len() {
            0 => return Err(spec.missing("areas")),
            2 => {}
            n => return Err(spec.invalid("areas", &format!("{n} rectangles"))),
        }
        let props = match spec.attr("props") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };
        let mut format_areas = FxHashMap::default();
        if let Some(raw) = spec.attr("formatCells") {
            for pair in raw.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (kind, cell) = pair
                    .split_once(':')
                    .ok_or_else(|| spec.invalid("formatCells", raw))?;
                let cell = CellRef::parse_with_default(cell.trim(), &spec.cell.sheet)
                    .map_err(|_| spec.invalid("formatCells", raw))?;
                format_areas.insert(
                    kind.trim().to_lowercase(),
                    Area::new(AreaRef::new(cell, Size::new(1, 1))),
                );
            }
        }
        Ok(GridCommand {
            headers,
            data,
            props,
            cell: spec.cell.clone(),
            header_area: Area::new(spec.area_refs[0].clone()),
            body_area: Area::new(spec.area_refs[1].clone()),
            format_areas,
        })
    }

    fn sequence(&self, expression: &str, ctx: &mut Context) -> Result<Vec<Value>> {
        match ctx.evaluate(expression)? {
            Value::List(items) => Ok(items.as_ref().clone()),
            other => Err(TemplateError::WrongResultType {
                expression: expression.to_string(),
                expected: "list",
                actual: other.type_name(),
            }),
        }
    }

    fn row_cells(&self, row: Value) -> Result<Vec<Value>> {
        if let Value::Map(map) = &row {
            if self.props.is_empty() {
                return Err(TemplateError::MissingAttribute {
                    command: "grid".to_string(),
                    cell: self.cell.clone(),
                    attribute: "props".to_string(),
                });
            }
            return Ok(self
                .props
                .iter()
                .map(|p| map.get(p).cloned().unwrap_or(Value::Empty))
                .collect());
        }
        Ok(row.iter_items())
    }

    fn area_for(&self, value: &Value) -> &Area {
        self.format_areas
            .get(value.type_name())
            .unwrap_or(&self.body_area)
    }

    /// Replay one sub-area per value across columns, binding `var`. Body
    /// bands pick the area by value kind. Returns the band's (width, height).
    #[allow(clippy::too_many_arguments)]
    fn fill_band(
        &self,
        values: Vec<Value>,
        var: &str,
        body: bool,
        sheet: &str,
        row: u32,
        start_col: u32,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let mut col = start_col;
        let mut height = 0u32;
        for value in values {
            let area = if body {
                self.area_for(&value)
            } else {
                &self.header_area
            };
            let step = CellRef::new(sheet.to_string(), row, col);
            let size = {
                let mut scope = VarGuard::new(&mut *ctx);
                scope.bind(var, value);
                area.apply_at(&step, &mut scope, transformer)?
            };
            col += size.width;
            height = height.max(size.height);
        }
        Ok(Size::new(col - start_col, height))
    }
}

impl Command for GridCommand {
    fn name(&self) -> &str {
        "grid"
    }

    fn areas(&self) -> Vec<&Area> {
        vec![&self.header_area, &self.body_area]
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        vec![&mut self.header_area, &mut self.body_area]
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let mut total = Size::ZERO;
        let mut row = target.row;

        let headers = self.sequence(&self.headers, ctx)?;
        let band = self.fill_band(
            headers,
            "header",
            false,
            &target.sheet,
            row,
            target.col,
            ctx,
            transformer,
        )?;
        total.width = total.width.max(band.width);
        total.height += band.height;
        row += band.height;

        for row_value in self.sequence(&self.data, ctx)? {
            let cells = self.row_cells(row_value)?;
            let band = self.fill_band(
                cells,
                "cell",
                true,
                &target.sheet,
                row,
                target.col,
                ctx,
                transformer,
            )?;
            total.width = total.width.max(band.width);
            total.height += band.height;
            row += band.height;
        }
        Ok(total)
    }
}
