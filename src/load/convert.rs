use anyhow::{bail, Result};
use arrow::{
    array::{Array, ArrayRef, Float64Builder, Int64Builder, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
    record_batch::RecordBatch,
};
use std::{path::Path, sync::Arc};

use crate::load::RawFile;

/// Trim whitespace + strip outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decide each column's nominal type from the first file's content.
/// A column is Int64 if every non-empty value parses as i64, Float64 if
/// every non-empty value parses as f64, else Utf8. Columns with no
/// non-empty values stay Utf8.
pub fn infer_table_schema(file: &RawFile) -> Schema {
    let mut fields = Vec::with_capacity(file.headers.len());
    for (i, name) in file.headers.iter().enumerate() {
        let ty = infer_column_dtype(file.batches.iter().map(|b| b.column(i)));
        fields.push(Field::new(name.clone(), ty, true));
    }
    Schema::new(fields)
}

fn infer_column_dtype<'a>(columns: impl Iterator<Item = &'a ArrayRef>) -> DataType {
    let mut saw_value = false;
    let mut all_int = true;
    let mut all_float = true;

    for col in columns {
        let sarr = col
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("raw batches are Utf8");
        for opt in sarr.iter() {
            let Some(raw) = opt else { continue };
            let s = clean_str(raw);
            if s.is_empty() {
                continue;
            }
            saw_value = true;
            if all_int && s.parse::<i64>().is_err() {
                all_int = false;
            }
            if all_float && s.parse::<f64>().is_err() {
                all_float = false;
            }
        }
    }

    if !saw_value {
        DataType::Utf8
    } else if all_int {
        DataType::Int64
    } else if all_float {
        DataType::Float64
    } else {
        DataType::Utf8
    }
}

/// Convert a raw all-Utf8 batch into its final column types. Empty fields
/// become nulls; a non-empty field that does not parse under the schema is
/// malformed content and aborts the load.
pub fn convert_batch(batch: &RecordBatch, schema: &SchemaRef, path: &Path) -> Result<RecordBatch> {
    let mut out: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (arr, field) in batch.columns().iter().zip(schema.fields()) {
        let sarr = arr
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("raw batches are Utf8");

        match field.data_type() {
            DataType::Int64 => {
                let mut b = Int64Builder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    match opt.map(clean_str).filter(|s| !s.is_empty()) {
                        None => b.append_null(),
                        Some(s) => match s.parse::<i64>() {
                            Ok(v) => b.append_value(v),
                            Err(_) => bail!(
                                "{}: column {} has non-integer value {:?}",
                                path.display(),
                                field.name(),
                                s
                            ),
                        },
                    }
                }
                out.push(Arc::new(b.finish()) as ArrayRef);
            }

            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(sarr.len());
                for opt in sarr.iter() {
                    match opt.map(clean_str).filter(|s| !s.is_empty()) {
                        None => b.append_null(),
                        Some(s) => match s.parse::<f64>() {
                            Ok(v) => b.append_value(v),
                            Err(_) => bail!(
                                "{}: column {} has non-numeric value {:?}",
                                path.display(),
                                field.name(),
                                s
                            ),
                        },
                    }
                }
                out.push(Arc::new(b.finish()) as ArrayRef);
            }

            // Everything else stays as the strings the file held
            _ => out.push(arr.clone()),
        }
    }

    RecordBatch::try_new(schema.clone(), out).map_err(Into::into)
}
