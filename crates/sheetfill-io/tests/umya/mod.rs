//! Exercises the xlsx adapter: template snapshotting, write-through to the
//! live workbook, sheet management, and an annotated fill saved to disk.

use std::collections::BTreeMap;
use std::sync::Arc;

use sheetfill_engine::{CellRef, Context, DocumentTransformer, RhaiEvaluator, Value, fill};
use sheetfill_io::UmyaTransformer;

fn ctx() -> Context {
    Context::new(Arc::new(RhaiEvaluator::new()))
}

fn at(row: u32, col: u32) -> CellRef {
    CellRef::new("Sheet1", row, col)
}

fn employee(name: &str, age: i64) -> Value {
    let mut map = BTreeMap::new();
    map.insert("name".to_string(), Value::from(name));
    map.insert("age".to_string(), Value::Int(age));
    Value::map(map)
}

#[test]
fn workbook_cells_snapshot_into_template_data() {
    let mut book = umya_spreadsheet::new_file();
    {
        let ws = book.get_sheet_mut(&0).unwrap();
        ws.get_cell_mut("A1").set_value("title");
        ws.get_cell_mut("B1").set_value_number(41.5);
        ws.get_cell_mut("C1").set_value_bool(true);
        ws.get_cell_mut("D1").set_formula("=A1+B1");
    }

    let doc = UmyaTransformer::from_book(book);

    assert_eq!(doc.cell_data(&at(0, 0)).unwrap().value, Value::from("title"));
    assert_eq!(doc.cell_data(&at(0, 1)).unwrap().value, Value::Number(41.5));
    assert_eq!(doc.cell_data(&at(0, 2)).unwrap().value, Value::Bool(true));
    assert_eq!(
        doc.cell_data(&at(0, 3)).unwrap().formula.as_deref(),
        Some("A1+B1")
    );
    assert!(doc.cell_data(&at(5, 5)).is_none());
}

#[test]
fn values_write_through_to_the_workbook() {
    let mut doc = UmyaTransformer::from_book(umya_spreadsheet::new_file());

    doc.set_cell_value(&at(0, 0), Value::Int(7)).unwrap();
    doc.set_formula(&at(0, 1), "A1*2").unwrap();

    let ws = doc.book().get_sheet_by_name("Sheet1").unwrap();
    assert_eq!(ws.get_cell("A1").unwrap().get_value(), "7");
    assert!(ws.get_cell("B1").unwrap().get_cell_value().is_formula());
    assert_eq!(
        ws.get_cell("B1").unwrap().get_cell_value().get_formula(),
        "A1*2"
    );

    doc.clear_cell(&at(0, 0)).unwrap();
    let ws = doc.book().get_sheet_by_name("Sheet1").unwrap();
    assert!(ws.get_cell("A1").is_none());
}

#[test]
fn sheets_clone_delete_and_error_when_missing() {
    let mut doc = UmyaTransformer::from_book(umya_spreadsheet::new_file());

    doc.clone_sheet("Sheet1", "Copy").unwrap();
    assert_eq!(doc.sheet_names(), vec!["Sheet1", "Copy"]);
    assert!(doc.clone_sheet("Sheet1", "Copy").is_err());

    doc.delete_sheet("Copy").unwrap();
    assert_eq!(doc.sheet_names(), vec!["Sheet1"]);
    assert!(doc.delete_sheet("Copy").is_err());

    doc.hide_sheet("Sheet1").unwrap();
}

#[test]
fn row_heights_read_back_after_writing() {
    let mut doc = UmyaTransformer::from_book(umya_spreadsheet::new_file());

    assert_eq!(doc.row_height("Sheet1", 0), None);
    doc.set_row_height("Sheet1", 0, 24.0).unwrap();
    assert_eq!(doc.row_height("Sheet1", 0), Some(24.0));
}

#[test]
fn annotated_fill_writes_the_workbook_and_saves() {
    let mut book = umya_spreadsheet::new_file();
    {
        let ws = book.get_sheet_mut(&0).unwrap();
        ws.get_cell_mut("A1").set_value("Report");
        ws.get_cell_mut("A2").set_value("${e.name}");
        ws.get_cell_mut("B2").set_value("${e.age}");
    }
    let mut doc = UmyaTransformer::from_book(book);
    doc.annotate(at(0, 0), "sf:area(lastCell=\"B2\")");
    doc.annotate(at(1, 0), "sf:each(items=\"employees\" var=\"e\" lastCell=\"B2\")");

    let mut ctx = ctx();
    ctx.put(
        "employees",
        Value::list(vec![employee("Ann", 31), employee("Bob", 27)]),
    );
    let summary = fill(&mut doc, &mut ctx).unwrap();
    assert_eq!(summary.areas, 1);

    let ws = doc.book().get_sheet_by_name("Sheet1").unwrap();
    assert_eq!(ws.get_cell("A1").unwrap().get_value(), "Report");
    assert_eq!(ws.get_cell("A2").unwrap().get_value(), "Ann");
    assert_eq!(ws.get_cell("A3").unwrap().get_value(), "Bob");
    assert_eq!(ws.get_cell("B3").unwrap().get_value(), "27");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filled.xlsx");
    doc.save_path(&path).unwrap();

    let back = UmyaTransformer::open_path(&path).unwrap();
    assert_eq!(back.cell_data(&at(1, 0)).unwrap().value, Value::from("Ann"));
}
