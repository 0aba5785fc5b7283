//! The image command.

use sheetfill_common::{AreaRef, CellRef, Size, Value};

use crate::area::Area;
use crate::command::{Command, CommandSpec};
use crate::context::Context;
use crate::error::{Result, TemplateError};
use crate::transform::{DocumentTransformer, ImageKind};

/// Embeds image bytes over the command rectangle. `src` must evaluate to a
/// byte list; `imageType` defaults to PNG.
#[derive(Debug)]
pub struct ImageCommand {
    src: String,
    kind: ImageKind,
    size: Size,
}

impl ImageCommand {
    pub fn from_spec(spec: &CommandSpec) -> Result<Self> {
        let src = spec.required("src")?.to_string();
        let kind = match spec.attr("imageType") {
            None => ImageKind::default(),
            Some(raw) => raw.parse().map_err(|_| spec.invalid("imageType", raw))?,
        };
        Ok(ImageCommand {
            src,
            kind,
            size: spec.rect.size,
        })
    }

    fn bytes(&self, value: Value) -> Result<Vec<u8>> {
        let items = match &value {
            Value::List(items) => items,
            _ => {
                return Err(TemplateError::WrongResultType {
                    expression: self.src.clone(),
                    expected: "byte list",
                    actual: value.type_name(),
                });
            }
        };
        let mut bytes = Vec::with_capacity(items.len());
        for item in items.iter() {
            match item {
                Value::Int(b) if (0..=255).contains(b) => bytes.push(*b as u8),
                _ => {
                    return Err(TemplateError::WrongResultType {
                        expression: self.src.clone(),
                        expected: "byte list",
                        actual: item.type_name(),
                    });
                }
            }
        }
        Ok(bytes)
    }
}

impl Command for ImageCommand {
    fn name(&self) -> &str {
        "image"
    }

    fn areas(&self) -> Vec<&Area> {
        Vec::new()
    }

    fn areas_mut(&mut self) -> Vec<&mut Area> {
        Vec::new()
    }

    fn apply(
        &self,
        target: &CellRef,
        ctx: &mut Context,
        transformer: &mut dyn DocumentTransformer,
    ) -> Result<Size> {
        let bytes = self.bytes(ctx.evaluate(&self.src)?)?;
        let anchor = AreaRef::new(target.clone(), self.size);
        transformer.add_image(&anchor, &bytes, self.kind)?;
        Ok(self.size)
    }
}
