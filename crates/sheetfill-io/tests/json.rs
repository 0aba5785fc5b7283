#![cfg(feature = "json")]

//! End-to-end fills over templates loaded from document json, plus disk
//! round-trips of the filled output.

use std::collections::BTreeMap;
use std::sync::Arc;

use sheetfill_engine::{
    CellRef, Context, DocumentTransformer, InMemoryTransformer, RhaiEvaluator, Value, fill,
};
use sheetfill_io::backends::json;

fn ctx() -> Context {
    Context::new(Arc::new(RhaiEvaluator::new()))
}

fn at(row: u32, col: u32) -> CellRef {
    CellRef::new("Sheet1", row, col)
}

fn line(desc: &str, total: i64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("desc".to_string(), Value::from(desc));
    map.insert("total".to_string(), Value::Int(total));
    Value::map(map)
}

const INVOICE_TEMPLATE: &str = r#"{
  "sheets": [
    {
      "name": "Sheet1",
      "cells": [
        { "row": 0, "col": 0, "value": { "Text": "Invoice" } },
        { "row": 1, "col": 0, "value": { "Text": "${line.desc}" } },
        { "row": 1, "col": 1, "value": { "Text": "${line.total}" } }
      ],
      "comments": [
        { "row": 0, "col": 0, "text": "sf:area(lastCell=\"B2\")" },
        { "row": 1, "col": 0, "text": "sf:each(items=\"lines\" var=\"line\" lastCell=\"B2\")" }
      ]
    }
  ]
}"#;

#[test]
fn annotated_template_fills_from_json() {
    let mut doc = json::read_template_str(INVOICE_TEMPLATE).unwrap();
    let mut ctx = ctx();
    ctx.put(
        "lines",
        Value::list(vec![line("Widget", 120), line("Gadget", 75)]),
    );

    let summary = fill(&mut doc, &mut ctx).unwrap();

    assert_eq!(summary.areas, 1);
    assert_eq!(doc.value_at(&at(0, 0)), Value::from("Invoice"));
    assert_eq!(doc.value_at(&at(1, 0)), Value::from("Widget"));
    assert_eq!(doc.value_at(&at(1, 1)), Value::Int(120));
    assert_eq!(doc.value_at(&at(2, 0)), Value::from("Gadget"));
    assert_eq!(doc.value_at(&at(2, 1)), Value::Int(75));
}

#[test]
fn loop_formulas_are_rewritten_in_the_json_pipeline() {
    let template = r#"{
      "sheets": [
        {
          "name": "Sheet1",
          "cells": [
            { "row": 0, "col": 0, "value": { "Text": "Amount" } },
            { "row": 1, "col": 0, "value": { "Text": "${r.amount}" } },
            { "row": 2, "col": 0, "formula": "SUM(A2:A2)" }
          ],
          "comments": [
            { "row": 0, "col": 0, "text": "sf:area(lastCell=\"A3\")" },
            { "row": 1, "col": 0, "text": "sf:each(items=\"rows\" var=\"r\" lastCell=\"A2\")" }
          ]
        }
      ]
    }"#;
    let mut doc = json::read_template_str(template).unwrap();
    let mut ctx = ctx();
    let rows: Vec<Value> = [10, 20, 30]
        .iter()
        .map(|n| {
            let mut map = BTreeMap::new();
            map.insert("amount".to_string(), Value::Int(*n));
            Value::map(map)
        })
        .collect();
    ctx.put("rows", Value::list(rows));

    let summary = fill(&mut doc, &mut ctx).unwrap();

    assert_eq!(summary.formulas_rewritten, 1);
    assert_eq!(doc.formula_at(&at(3, 0)), Some("SUM(A2:A4)".to_string()));
    assert_eq!(doc.value_at(&at(2, 0)), Value::Int(30));
}

#[test]
fn filled_output_round_trips_through_json_text() {
    let mut doc = json::read_template_str(INVOICE_TEMPLATE).unwrap();
    let mut ctx = ctx();
    ctx.put("lines", Value::list(vec![line("Widget", 120)]));
    fill(&mut doc, &mut ctx).unwrap();

    let text = json::document_to_string(&doc).unwrap();
    let back = json::read_template_str(&text).unwrap();

    assert_eq!(back.value_at(&at(0, 0)), Value::from("Invoice"));
    assert_eq!(back.value_at(&at(1, 0)), Value::from("Widget"));
    assert_eq!(back.value_at(&at(1, 1)), Value::Int(120));
    assert_eq!(
        back.cell_comment(&at(0, 0)),
        Some("sf:area(lastCell=\"B2\")".to_string())
    );
}

#[test]
fn documents_survive_a_path_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");

    let mut doc = InMemoryTransformer::new();
    doc.load_value(at(0, 0), Value::from("hello"));
    doc.load_value(at(0, 1), Value::Number(2.5));
    json::write_document_path(&doc, &path).unwrap();

    let back = json::read_template_path(&path).unwrap();
    assert_eq!(back.value_at(&at(0, 0)), Value::from("hello"));
    assert_eq!(back.value_at(&at(0, 1)), Value::Number(2.5));
}
