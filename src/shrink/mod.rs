use anyhow::{Context, Result};
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array},
    compute,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod catalog;

use crate::shrink::catalog::{narrowest, Candidate, FLOAT_WIDTHS, INT_WIDTHS};

/// What happened to one column during a shrink pass.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOutcome {
    /// Converted to the narrowest width that holds the observed range.
    /// `to` equals `from` when the column was already minimal.
    Narrowed { from: DataType, to: DataType },
    /// Numeric, but no catalog width can represent the observed range.
    /// The column keeps its original type.
    NoSuitableWidth { range: String },
    /// Numeric with no non-null values, so there is no range to measure.
    NoValues,
    /// Not a numeric column; never touched.
    NonNumeric,
}

/// Result of one in-place shrink pass over a table.
#[derive(Debug)]
pub struct ShrinkReport {
    /// One entry per column, in column order.
    pub columns: Vec<(String, ColumnOutcome)>,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Narrow every numeric column of `batch` to the smallest width that holds
/// its observed `[min, max]`, rewriting the batch in place. Columns that
/// cannot be narrowed keep their type; the report says why. Row count,
/// column names and column order never change.
pub fn shrink_columns(batch: &mut RecordBatch) -> Result<ShrinkReport> {
    let bytes_before = estimated_bytes(batch);

    let mut columns = Vec::with_capacity(batch.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
    let mut fields: Vec<Field> = Vec::with_capacity(batch.num_columns());

    for (arr, field) in batch.columns().iter().zip(batch.schema().fields()) {
        let (replacement, outcome) = match field.data_type() {
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
                shrink_to(arr, &*INT_WIDTHS, as_i64_range)?
            }
            DataType::Float16 | DataType::Float32 | DataType::Float64 => {
                shrink_to(arr, &*FLOAT_WIDTHS, as_f64_range)?
            }
            _ => (None, ColumnOutcome::NonNumeric),
        };

        match &outcome {
            ColumnOutcome::Narrowed { from, to } => {
                debug!(column = %field.name(), %from, %to, "narrowed column")
            }
            ColumnOutcome::NoSuitableWidth { range } => warn!(
                column = %field.name(),
                ty = %field.data_type(),
                %range,
                "no suitable width, leaving column unchanged"
            ),
            ColumnOutcome::NoValues => {
                debug!(column = %field.name(), "no values to measure, leaving column unchanged")
            }
            ColumnOutcome::NonNumeric => {
                debug!(column = %field.name(), ty = %field.data_type(), "skipping non-numeric column")
            }
        }

        match replacement {
            Some(narrowed) => {
                fields.push(Field::new(
                    field.name().clone(),
                    narrowed.data_type().clone(),
                    field.is_nullable(),
                ));
                arrays.push(narrowed);
            }
            None => {
                fields.push(field.as_ref().clone());
                arrays.push(arr.clone());
            }
        }
        columns.push((field.name().clone(), outcome));
    }

    let schema = Arc::new(Schema::new(fields));
    *batch = RecordBatch::try_new(schema, arrays).context("rebuilding batch with narrowed columns")?;

    let bytes_after = estimated_bytes(batch);
    info!(
        "footprint {:.3} MiB -> {:.3} MiB ({:.1}% reduction)",
        mib(bytes_before),
        mib(bytes_after),
        if bytes_before > 0 {
            100.0 * (bytes_before as f64 - bytes_after as f64) / bytes_before as f64
        } else {
            0.0
        }
    );

    Ok(ShrinkReport {
        columns,
        bytes_before,
        bytes_after,
    })
}

/// Measure a column's range in the catalog's scalar domain, pick the
/// narrowest width that holds it, and cast. `None` for the array means the
/// column is left alone.
fn shrink_to<T>(
    arr: &ArrayRef,
    candidates: &[Candidate<T>],
    range_of: fn(&ArrayRef) -> Result<Option<(T, T)>>,
) -> Result<(Option<ArrayRef>, ColumnOutcome)>
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    let Some((min, max)) = range_of(arr)? else {
        return Ok((None, ColumnOutcome::NoValues));
    };

    match narrowest(candidates, min, max) {
        Ok(candidate) => {
            let narrowed = compute::cast(arr.as_ref(), &candidate.ty)
                .with_context(|| format!("casting column to {}", candidate.ty))?;
            let outcome = ColumnOutcome::Narrowed {
                from: arr.data_type().clone(),
                to: candidate.ty.clone(),
            };
            Ok((Some(narrowed), outcome))
        }
        Err(err) => Ok((None, ColumnOutcome::NoSuitableWidth { range: err.range })),
    }
}

/// Observed [min, max] of an integer column, nulls ignored. None when the
/// column holds no values at all.
fn as_i64_range(arr: &ArrayRef) -> Result<Option<(i64, i64)>> {
    let widened = compute::cast(arr.as_ref(), &DataType::Int64).context("widening to Int64")?;
    let values = widened
        .as_any()
        .downcast_ref::<Int64Array>()
        .expect("cast to Int64 yields Int64Array");
    Ok(compute::min(values).zip(compute::max(values)))
}

/// Observed [min, max] of a floating-point column, nulls ignored.
fn as_f64_range(arr: &ArrayRef) -> Result<Option<(f64, f64)>> {
    let widened = compute::cast(arr.as_ref(), &DataType::Float64).context("widening to Float64")?;
    let values = widened
        .as_any()
        .downcast_ref::<Float64Array>()
        .expect("cast to Float64 yields Float64Array");
    Ok(compute::min(values).zip(compute::max(values)))
}

/// Approximate storage as byte width x row count; variable-width columns
/// are counted at pointer width.
fn estimated_bytes(batch: &RecordBatch) -> usize {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.data_type().primitive_width().unwrap_or(8) * batch.num_rows())
        .sum()
}

fn mib(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
