use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    csv::ReaderBuilder,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use glob::glob;
use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;

pub mod convert;

use crate::load::convert::clean_str;

/// One tab-separated file, parsed but not yet typed.
#[derive(Debug)]
pub struct RawFile {
    /// Column names from the file's first line, cleaned.
    pub headers: Vec<String>,
    /// The file's rows, every column still Utf8.
    pub batches: Vec<RecordBatch>,
    pub path: PathBuf,
}

/// Read every file in `dir` as tab-separated text and stack the rows into
/// one table, in lexicographic file order. The first file decides column
/// names and types; every other file must carry the same header row.
#[tracing::instrument(level = "info", skip(dir), fields(dir = %dir.as_ref().display()))]
pub fn load_dir(dir: impl AsRef<Path>) -> Result<RecordBatch> {
    let dir = dir.as_ref();
    if !dir.exists() {
        bail!("data path not found at {}", dir.display());
    }

    // 1) list every entry, no extension filter
    let pattern = format!("{}/*", dir.display());
    let mut paths = Vec::new();
    for entry in glob(&pattern).context("invalid glob pattern for load_dir")? {
        paths.push(entry.context("reading directory entry")?);
    }
    if paths.is_empty() {
        bail!("no files found in {}", dir.display());
    }

    // 2) parse each file as strings, in listing order
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        info!(file = %path.display(), "loading");
        files.push(read_tsv_file(path)?);
    }

    // 3) first file decides the schema; the rest must match its header
    let first = &files[0];
    for file in &files[1..] {
        if file.headers != first.headers {
            bail!(
                "{} has columns {:?}, expected {:?} from {}",
                file.path.display(),
                file.headers,
                first.headers,
                first.path.display()
            );
        }
    }
    let schema = Arc::new(convert::infer_table_schema(first));

    // 4) convert to final types and stack
    let mut typed = Vec::new();
    for file in &files {
        for batch in &file.batches {
            typed.push(convert::convert_batch(batch, &schema, &file.path)?);
        }
    }
    let table = arrow::compute::concat_batches(&schema, typed.iter())
        .context("concatenating file batches")?;

    info!("loaded {} rows from {} files", table.num_rows(), files.len());
    Ok(table)
}

/// Parse one file as tab-delimited text with a header line, every column
/// read as Utf8. Types are decided later, across the whole directory.
fn read_tsv_file(path: &Path) -> Result<RawFile> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;

    let header_line = content
        .lines()
        .next()
        .ok_or_else(|| anyhow!("{} is empty", path.display()))?;
    let headers: Vec<String> = header_line.split('\t').map(clean_str).collect();

    let fields: Vec<Field> = headers
        .iter()
        .map(|n| Field::new(n.clone(), DataType::Utf8, true))
        .collect();
    let schema = Arc::new(Schema::new(fields));

    let cursor = Cursor::new(content.as_bytes());
    let reader = ReaderBuilder::new(schema)
        .with_header(true)
        .with_delimiter(b'\t')
        .build(cursor)
        .with_context(|| format!("creating TSV reader for {}", path.display()))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch.with_context(|| format!("parsing {}", path.display()))?);
    }

    Ok(RawFile {
        headers,
        batches,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use std::fs;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,tsvshrink=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    #[test]
    fn stacks_files_in_listing_order() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        // written out of order on purpose; listing is lexicographic
        fs::write(
            dir.path().join("b.tsv"),
            "id\tscore\tlabel\n3\t3.5\tbaz\n",
        )?;
        fs::write(
            dir.path().join("a.tsv"),
            "id\tscore\tlabel\n1\t1.5\tfoo\n2\t2.5\tbar\n",
        )?;

        let table = load_dir(dir.path())?;
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.num_columns(), 3);

        let schema = table.schema();
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(1).name(), "score");
        assert_eq!(schema.field(2).name(), "label");
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Float64);
        assert_eq!(schema.field(2).data_type(), &DataType::Utf8);

        let ids: Vec<i64> = table
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .iter()
            .flatten()
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let scores: Vec<f64> = table
            .column(1)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .iter()
            .flatten()
            .collect();
        assert_eq!(scores, vec![1.5, 2.5, 3.5]);
        Ok(())
    }

    #[test]
    fn missing_directory_fails_before_any_read() {
        init_test_logging();
        let err = load_dir("/no/such/directory").unwrap_err();
        assert!(err.to_string().contains("data path not found"));
    }

    #[test]
    fn empty_directory_fails() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no files found"));
        Ok(())
    }

    #[test]
    fn empty_fields_load_as_nulls() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "id\tscore\n1\t1.5\n2\t\n")?;

        let table = load_dir(dir.path())?;
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column(1).null_count(), 1);
        Ok(())
    }

    #[test]
    fn completely_empty_file_is_fatal() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "id\n1\n")?;
        fs::write(dir.path().join("b.tsv"), "")?;

        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("is empty"));
        Ok(())
    }

    #[test]
    fn mismatched_headers_are_fatal() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "id\tscore\n1\t1.5\n")?;
        fs::write(dir.path().join("b.tsv"), "id\tvalue\n2\t2.5\n")?;

        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("b.tsv"));
        Ok(())
    }

    #[test]
    fn unparseable_value_under_inferred_type_is_fatal() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        // first file makes `id` an integer column, second file breaks it
        fs::write(dir.path().join("a.tsv"), "id\n1\n")?;
        fs::write(dir.path().join("b.tsv"), "id\nnot-a-number\n")?;

        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("non-integer value"));
        Ok(())
    }

    #[test]
    fn ragged_row_is_fatal() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "id\tscore\n1\t1.5\t999\n")?;

        assert!(load_dir(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn header_only_file_contributes_zero_rows() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "id\tscore\n1\t1.5\n")?;
        fs::write(dir.path().join("b.tsv"), "id\tscore\n")?;

        let table = load_dir(dir.path())?;
        assert_eq!(table.num_rows(), 1);
        Ok(())
    }

    #[test]
    fn mixed_int_and_float_values_infer_float() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "x\n1\n2.5\n")?;

        let table = load_dir(dir.path())?;
        assert_eq!(table.schema().field(0).data_type(), &DataType::Float64);
        Ok(())
    }

    #[test]
    fn non_numeric_column_stays_utf8() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        fs::write(dir.path().join("a.tsv"), "name\n12ab\nhello\n")?;

        let table = load_dir(dir.path())?;
        assert_eq!(table.schema().field(0).data_type(), &DataType::Utf8);
        let names: Vec<&str> = table
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .iter()
            .flatten()
            .collect();
        assert_eq!(names, vec!["12ab", "hello"]);
        Ok(())
    }
}
