// src/shrink/catalog.rs

use arrow::datatypes::DataType;
use half::f16;
use once_cell::sync::Lazy;
use std::fmt;

/// One storage width a column may be narrowed to, with the closed range of
/// values that width can represent.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub width: usize,
    pub ty: DataType,
    pub lo: T,
    pub hi: T,
}

/// Signed integer widths, ascending.
pub static INT_WIDTHS: Lazy<[Candidate<i64>; 4]> = Lazy::new(|| {
    [
        Candidate {
            width: 1,
            ty: DataType::Int8,
            lo: i8::MIN as i64,
            hi: i8::MAX as i64,
        },
        Candidate {
            width: 2,
            ty: DataType::Int16,
            lo: i16::MIN as i64,
            hi: i16::MAX as i64,
        },
        Candidate {
            width: 4,
            ty: DataType::Int32,
            lo: i32::MIN as i64,
            hi: i32::MAX as i64,
        },
        Candidate {
            width: 8,
            ty: DataType::Int64,
            lo: i64::MIN,
            hi: i64::MAX,
        },
    ]
});

/// Floating-point widths, ascending.
pub static FLOAT_WIDTHS: Lazy<[Candidate<f64>; 3]> = Lazy::new(|| {
    [
        Candidate {
            width: 2,
            ty: DataType::Float16,
            lo: f16::MIN.to_f64(),
            hi: f16::MAX.to_f64(),
        },
        Candidate {
            width: 4,
            ty: DataType::Float32,
            lo: f32::MIN as f64,
            hi: f32::MAX as f64,
        },
        Candidate {
            width: 8,
            ty: DataType::Float64,
            lo: f64::MIN,
            hi: f64::MAX,
        },
    ]
});

/// No catalog entry can represent the observed range.
#[derive(Debug, Clone, PartialEq)]
pub struct NoSuitableWidth {
    pub range: String,
}

impl fmt::Display for NoSuitableWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no suitable width for range {}", self.range)
    }
}

impl std::error::Error for NoSuitableWidth {}

/// Pick the first candidate whose range contains `[lo, hi]`, bounds
/// inclusive. Catalogs are ordered by ascending width, so the smallest
/// sufficient width always wins.
pub fn narrowest<T>(
    candidates: &[Candidate<T>],
    lo: T,
    hi: T,
) -> Result<&Candidate<T>, NoSuitableWidth>
where
    T: PartialOrd + Copy + fmt::Display,
{
    candidates
        .iter()
        .find(|c| c.lo <= lo && hi <= c.hi)
        .ok_or_else(|| NoSuitableWidth {
            range: format!("[{}, {}]", lo, hi),
        })
}
