use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use folio_formula::{parse, FormulaEvaluator};
use folio_model::{Database, PropertyDefinition, PropertyId, PropertyType, PropertyValue, Row, RowId};

const PROGRESS: &str = r#"if(prop("Total") = 0, "n/a", concat(round(prop("Completed") / prop("Total") * 100), "%"))"#;

fn sample_database(rows: usize) -> Database {
    let mut db = Database::new("bench", "Bench");
    for definition in [
        PropertyDefinition::new("completed", "Completed", PropertyType::Number),
        PropertyDefinition::new("total", "Total", PropertyType::Number),
        PropertyDefinition::formula("progress", "Progress", PROGRESS),
        PropertyDefinition::formula("overall", "Overall", r#"sum(prop("Completed")) / sum(prop("Total"))"#),
    ] {
        db.properties.insert(definition.id.clone(), definition);
    }
    for i in 0..rows {
        let mut row = Row::new(RowId::new(format!("r{}", i)));
        row.properties.insert(PropertyId::from("completed"), PropertyValue::Number(i as f64));
        row.properties.insert(PropertyId::from("total"), PropertyValue::Number(100.0));
        db.rows.push(row);
    }
    db
}

fn parse_progress_formula(c: &mut Criterion) {
    c.bench_function("parse_progress_formula", |b| b.iter(|| parse(black_box(PROGRESS))));
}

fn evaluate_row_formula(c: &mut Criterion) {
    let db = sample_database(100);
    let now = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
    let property = PropertyId::from("progress");

    c.bench_function("evaluate_row_formula", |b| {
        b.iter(|| {
            let mut evaluator = FormulaEvaluator::new(&db, now);
            for row in &db.rows {
                black_box(evaluator.property_value(&property, row).ok());
            }
        })
    });
}

fn evaluate_aggregate(c: &mut Criterion) {
    let db = sample_database(1000);
    let now = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(12, 0, 0).unwrap();
    let property = PropertyId::from("overall");

    c.bench_function("evaluate_aggregate", |b| {
        b.iter(|| {
            let mut evaluator = FormulaEvaluator::new(&db, now);
            black_box(evaluator.property_value(&property, &db.rows[0]).ok())
        })
    });
}

criterion_group!(benches, parse_progress_formula, evaluate_row_formula, evaluate_aggregate);
criterion_main!(benches);
