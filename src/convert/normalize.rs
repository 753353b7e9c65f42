// src/convert/normalize.rs

use calamine::{Data, ExcelDateTime};
use chrono::{NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use std::collections::HashSet;

use super::sheet::Sheet;
use super::Record;
use crate::tables::{DateFixup, TableDescriptor};

/// Cell texts that mean "no value" in the source workbooks.
pub const NULL_SENTINELS: [&str; 5] = ["NaT", "NA", "nan", "NaN", "########"];

/// Header-less columns get this name from the reader and are dropped.
static UNNAMED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Unnamed").unwrap());

/// Characters BigQuery does not accept in column names.
static FORBIDDEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[!"$()*,./;?@\[\\\]^`{}~]"#).unwrap());

/// How date cells of one column are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// every date in the column falls on midnight
    DateOnly,
    DateTime,
}

impl DateStyle {
    fn format(self, dt: &NaiveDateTime) -> String {
        match self {
            DateStyle::DateOnly => dt.format("%Y-%m-%d").to_string(),
            DateStyle::DateTime => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// A kept column: where it sits in the sheet and its output name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPlan {
    pub index: usize,
    pub name: String,
    pub dates: DateStyle,
}

/// Strip whitespace and replace forbidden characters. Returns `None` for
/// columns that should be dropped.
pub fn clean_column_name(raw: &str) -> Option<String> {
    let squeezed: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if squeezed.is_empty() || UNNAMED.is_match(&squeezed) {
        return None;
    }
    Some(FORBIDDEN.replace_all(&squeezed, "_").into_owned())
}

/// Decide which columns survive and what they are called.
pub fn plan_columns(sheet: &Sheet) -> Vec<ColumnPlan> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut plan = Vec::with_capacity(sheet.headers.len());

    for (index, header) in sheet.headers.iter().enumerate() {
        let raw = if header.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            header.clone()
        };
        let Some(base) = clean_column_name(&raw) else {
            continue;
        };

        let mut name = base.clone();
        let mut n = 1;
        while seen.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        seen.insert(name.clone());

        plan.push(ColumnPlan {
            index,
            name,
            dates: column_date_style(sheet, index),
        });
    }
    plan
}

fn column_date_style(sheet: &Sheet, index: usize) -> DateStyle {
    let all_midnight = sheet
        .rows
        .iter()
        .filter_map(|r| match r.get(index) {
            Some(Data::DateTime(dt)) if !is_time_of_day(dt) => dt.as_datetime(),
            _ => None,
        })
        .all(|dt| dt.time() == NaiveTime::MIN);
    if all_midnight {
        DateStyle::DateOnly
    } else {
        DateStyle::DateTime
    }
}

/// Durations and serials below one day carry no calendar date.
fn is_time_of_day(dt: &ExcelDateTime) -> bool {
    dt.is_duration() || dt.as_f64() < 1.0
}

/// `0.5` -> `12:00:00`; durations may run past 24 hours.
pub fn serial_to_clock(serial: f64) -> String {
    let total = (serial * 86_400.0).round() as i64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn float_value(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(f as i64));
    }
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Convert one cell to JSON. Dates always become text.
pub fn cell_value(cell: &Data, dates: DateStyle) -> Value {
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::String(s.clone()),
        Data::Int(i) => Value::Number(Number::from(*i)),
        Data::Float(f) => float_value(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) if is_time_of_day(dt) => Value::String(serial_to_clock(dt.as_f64())),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(ndt) => Value::String(dates.format(&ndt)),
            None => Value::String(dt.to_string()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
    }
}

/// Force a value to its text form; null stays null.
pub fn force_text(v: Value) -> Value {
    match v {
        Value::Null | Value::String(_) => v,
        Value::Bool(true) => Value::String("True".into()),
        Value::Bool(false) => Value::String("False".into()),
        other => Value::String(other.to_string()),
    }
}

/// `2014.05.06.` or `2014.05.06 00:00:00` -> `2014-05-06`.
pub fn dotted_to_dashed(s: &str) -> String {
    s.replace(" 00:00:00", "")
        .trim_matches('.')
        .replace('.', "-")
}

fn apply_date_fixup(rec: &mut Record, fix: &DateFixup) {
    if let Some(v) = rec.get_mut(fix.date_column) {
        if let Value::String(s) = force_text(v.take()) {
            *v = Value::String(dotted_to_dashed(&s));
        }
    }
    if let Some(v) = rec.get_mut(fix.time_column) {
        *v = force_text(v.take());
    }
}

pub fn is_null_sentinel(s: &str) -> bool {
    NULL_SENTINELS.contains(&s)
}

fn null_sentinels(rec: &mut Record) {
    for v in rec.values_mut() {
        if matches!(v, Value::String(s) if is_null_sentinel(s)) {
            *v = Value::Null;
        }
    }
}

/// Turn a worksheet into records following the table's rules.
pub fn normalize_sheet(sheet: &Sheet, desc: &TableDescriptor) -> Vec<Record> {
    let plan = plan_columns(sheet);
    let mut out = Vec::with_capacity(sheet.rows.len());

    for row in &sheet.rows {
        let mut rec = Record::with_capacity(plan.len());
        for col in &plan {
            let v = row
                .get(col.index)
                .map(|c| cell_value(c, col.dates))
                .unwrap_or(Value::Null);
            rec.insert(col.name.clone(), v);
        }
        if let Some(fix) = &desc.date_fixup {
            apply_date_fixup(&mut rec, fix);
        }
        null_sentinels(&mut rec);
        out.push(rec);
    }
    out
}
