// src/process/mod.rs
pub mod tokenize;

use rayon::prelude::*;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};
use tracing::{debug, info, warn};

use crate::{
    config::LoaderConfig,
    encode::{encode_column, CategoryMap, ColumnCategories, ColumnMaps, EncodedColumn, NumericLevels},
    error::{FormatError, LoadError},
    matrix::Matrix,
    schema::{derive_kind, Column, ColumnKind},
};
use tokenize::{Dialect, Line, Lines, Tokenized};

/// Non-fatal conditions seen during one load.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadDiagnostics {
    /// Rows with fewer fields than the header; padded with missing cells.
    pub short_rows: usize,
    /// Rows with more fields than the header; extra fields dropped.
    pub long_rows: usize,
    /// Lines with an unbalanced quote, split best-effort.
    pub malformed_lines: usize,
    /// Cells of numeric columns that failed to parse; stored as NaN.
    pub parse_failures: usize,
    pub blank_lines: usize,
}

impl LoadDiagnostics {
    /// Rows or cells that were repaired rather than read as-is.
    pub fn repaired(&self) -> usize {
        self.short_rows + self.long_rows + self.malformed_lines + self.parse_failures
    }

    /// Sum of two loads' counts.
    pub fn combine(self, other: LoadDiagnostics) -> LoadDiagnostics {
        LoadDiagnostics {
            short_rows: self.short_rows + other.short_rows,
            long_rows: self.long_rows + other.long_rows,
            malformed_lines: self.malformed_lines + other.malformed_lines,
            parse_failures: self.parse_failures + other.parse_failures,
            blank_lines: self.blank_lines + other.blank_lines,
        }
    }
}

/// The selected columns of a file, buffered column by column.
#[derive(Debug)]
pub struct RawTable {
    /// Every column name in the header row, in file order.
    pub headers: Vec<String>,
    /// Names of the retained columns, in output order.
    pub selected: Vec<String>,
    /// `columns[j]` holds every cell of `selected[j]`, one per data row.
    pub columns: Vec<Vec<String>>,
    pub rows: usize,
    pub diagnostics: LoadDiagnostics,
}

/// A fully encoded file.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub columns: Vec<Column>,
    pub matrix: Matrix,
    /// One dictionary per column, aligned with `columns`. Kept by position
    /// so repeated header names never share a dictionary.
    pub maps: Vec<ColumnMaps>,
    pub diagnostics: LoadDiagnostics,
}

impl LoadedTable {
    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn kinds(&self) -> Vec<ColumnKind> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    pub fn is_categorical(&self) -> Vec<bool> {
        self.columns.iter().map(|c| c.kind.is_categorical()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.matrix.rows()
    }

    /// Index of the first column called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn categories_at(&self, idx: usize) -> Option<&ColumnCategories> {
        match self.maps.get(idx)? {
            ColumnMaps::Categorical(cats) => Some(cats),
            ColumnMaps::Numeric(_) => None,
        }
    }

    pub fn numeric_levels_at(&self, idx: usize) -> Option<&NumericLevels> {
        match self.maps.get(idx)? {
            ColumnMaps::Numeric(levels) => Some(levels),
            ColumnMaps::Categorical(_) => None,
        }
    }

    /// Dictionary of the first column called `column`, if it is categorical.
    pub fn categories_for(&self, column: &str) -> Option<&ColumnCategories> {
        self.categories_at(self.position(column)?)
    }

    pub fn numeric_levels_for(&self, column: &str) -> Option<&NumericLevels> {
        self.numeric_levels_at(self.position(column)?)
    }

    /// Categorical dictionaries by name. A repeated name maps to its first
    /// column, the same column a selection by that name would load.
    pub fn category_map(&self) -> CategoryMap {
        let mut map = CategoryMap::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if let Some(cats) = self.categories_at(idx) {
                map.entry(column.name.clone()).or_insert_with(|| cats.clone());
            }
        }
        map
    }
}

/// Reads CSV files into [`LoadedTable`]s.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    config: LoaderConfig,
}

impl Loader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load `path`, keeping only `selected` columns (in that order) if given.
    ///
    /// The file handle lives only for this call.
    #[tracing::instrument(level = "info", skip(self, path, selected), fields(path = %path.as_ref().display()))]
    pub fn load<P: AsRef<Path>>(
        &self,
        path: P,
        selected: Option<&[String]>,
    ) -> Result<LoadedTable, LoadError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_from_reader(BufReader::new(file), selected, path)
    }

    /// Same as [`Loader::load`] for any buffered reader; `origin` only names
    /// the source in errors and logs.
    pub fn load_from_reader<R: BufRead>(
        &self,
        reader: R,
        selected: Option<&[String]>,
        origin: &Path,
    ) -> Result<LoadedTable, LoadError> {
        let raw = self.read_raw(reader, selected, origin)?;
        let file_cols = raw.headers.len();
        let table = self.encode_raw(raw);
        info!(
            rows = table.matrix.rows(),
            cols = table.matrix.cols(),
            file_cols,
            categorical = table.columns.iter().filter(|c| c.kind.is_categorical()).count(),
            repaired = table.diagnostics.repaired(),
            "loaded {}",
            origin.display()
        );
        Ok(table)
    }

    /// Tokenize every line and buffer the selected columns.
    pub fn read_raw<R: BufRead>(
        &self,
        reader: R,
        selected: Option<&[String]>,
        origin: &Path,
    ) -> Result<RawTable, LoadError> {
        let dialect = Dialect::from(&self.config);
        let mut lines = Lines::new(reader, dialect);
        let mut diag = LoadDiagnostics::default();

        // 1) header is line 1
        let header = read_header(&mut lines, origin)?;
        if header.malformed {
            diag.malformed_lines += 1;
            debug!(line = 1, "unbalanced quote in header, split best-effort");
        }
        let headers = header.fields;
        warn_duplicates(&headers, origin);

        // 2) resolve the selection to header indices
        let indices = select_indices(&headers, selected).map_err(|e| format_error(origin, e))?;
        let names: Vec<String> = indices.iter().map(|&i| headers[i].clone()).collect();
        debug!(?names, ?indices, "selected columns");

        // 3) buffer each data row into the selected columns
        let width = headers.len();
        let mut columns: Vec<Vec<String>> = vec![Vec::new(); indices.len()];
        let mut rows = 0usize;

        for (n, line) in lines {
            let Tokenized { fields, malformed } = match line.map_err(|e| io_error(origin, n, e))? {
                Line::Blank => {
                    diag.blank_lines += 1;
                    continue;
                }
                Line::Fields(t) => t,
            };
            if malformed {
                diag.malformed_lines += 1;
                debug!(line = n, "unbalanced quote, split best-effort");
            }
            if fields.len() < width {
                diag.short_rows += 1;
                debug!(line = n, got = fields.len(), width, "short row padded");
            } else if fields.len() > width {
                diag.long_rows += 1;
                debug!(line = n, got = fields.len(), width, "long row truncated");
            }

            for (col, &idx) in columns.iter_mut().zip(&indices) {
                col.push(fields.get(idx).cloned().unwrap_or_default());
            }
            rows += 1;
        }

        if diag.short_rows + diag.long_rows > 0 {
            warn!(
                short = diag.short_rows,
                long = diag.long_rows,
                "{}: rows did not match the {}-column header",
                origin.display(),
                width
            );
        }
        if diag.malformed_lines > 0 {
            warn!(
                malformed = diag.malformed_lines,
                "{}: lines with unbalanced quotes",
                origin.display()
            );
        }

        Ok(RawTable {
            headers,
            selected: names,
            columns,
            rows,
            diagnostics: diag,
        })
    }

    /// Infer, encode and assemble. Consumes the raw cells.
    pub fn encode_raw(&self, raw: RawTable) -> LoadedTable {
        let max_levels = self.config.max_numeric_levels;
        let encode_one = |(name, cells): (&String, &Vec<String>)| {
            let kind = derive_kind(name, cells);
            (kind, encode_column(name, kind, cells, max_levels))
        };

        let encoded: Vec<(ColumnKind, EncodedColumn)> = if self.config.parallel {
            raw.selected
                .par_iter()
                .zip(raw.columns.par_iter())
                .map(encode_one)
                .collect()
        } else {
            raw.selected.iter().zip(raw.columns.iter()).map(encode_one).collect()
        };
        drop(raw.columns);

        let mut diagnostics = raw.diagnostics;
        let mut columns = Vec::with_capacity(encoded.len());
        let mut values = Vec::with_capacity(encoded.len());
        let mut maps = Vec::with_capacity(encoded.len());

        for (name, (kind, enc)) in raw.selected.into_iter().zip(encoded) {
            diagnostics.parse_failures += enc.parse_failures;
            values.push(enc.values);
            maps.push(enc.extra);
            columns.push(Column { name, kind });
        }

        LoadedTable {
            columns,
            matrix: Matrix::from_columns(raw.rows, &values),
            maps,
            diagnostics,
        }
    }
}

/// Load `path` with the default configuration.
pub fn load<P: AsRef<Path>>(path: P, selected: Option<&[String]>) -> Result<LoadedTable, LoadError> {
    Loader::default().load(path, selected)
}

/// Read only the header row of `path`.
pub fn read_headers<P: AsRef<Path>>(path: P, config: &LoaderConfig) -> Result<Vec<String>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut lines = Lines::new(BufReader::new(file), Dialect::from(config));
    let header = read_header(&mut lines, path)?;
    if header.malformed {
        warn!("{}: unbalanced quote in header", path.display());
    }
    Ok(header.fields)
}

/// Consume line 1 and return its names. A leading byte-order mark is dropped.
fn read_header<R: BufRead>(lines: &mut Lines<R>, origin: &Path) -> Result<Tokenized, LoadError> {
    let mut header = match lines.next() {
        Some((n, line)) => match line.map_err(|e| io_error(origin, n, e))? {
            Line::Fields(t) => t,
            Line::Blank => Tokenized {
                fields: Vec::new(),
                malformed: false,
            },
        },
        None => Tokenized {
            fields: Vec::new(),
            malformed: false,
        },
    };
    if let Some(first) = header.fields.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.trim_start().to_string();
        }
    }
    if header.fields.iter().all(String::is_empty) {
        return Err(format_error(origin, FormatError::EmptyHeader));
    }
    Ok(header)
}

/// Repeated names stay separate columns; selecting one by name picks the first.
fn warn_duplicates(headers: &[String], origin: &Path) {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(headers.len());
    for (i, h) in headers.iter().enumerate() {
        if let Some(first) = seen.get(h.as_str()) {
            warn!(
                "{}: duplicate header `{}` at index {} (first at {})",
                origin.display(),
                h,
                i,
                first
            );
        } else {
            seen.insert(h.as_str(), i);
        }
    }
}

/// Map the selection to header indices. Duplicate header names resolve to
/// their first occurrence.
fn select_indices(headers: &[String], selected: Option<&[String]>) -> Result<Vec<usize>, FormatError> {
    let Some(selected) = selected else {
        return Ok((0..headers.len()).collect());
    };

    let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(headers.len());
    for (i, h) in headers.iter().enumerate() {
        by_name.entry(h.as_str()).or_insert(i);
    }

    selected
        .iter()
        .map(|name| {
            by_name
                .get(name.as_str())
                .copied()
                .ok_or_else(|| FormatError::UnknownColumn { name: name.clone() })
        })
        .collect()
}

fn format_error(origin: &Path, source: FormatError) -> LoadError {
    LoadError::Format {
        path: origin.to_path_buf(),
        source,
    }
}

fn io_error(origin: &Path, line: usize, e: io::Error) -> LoadError {
    if e.kind() == io::ErrorKind::InvalidData {
        LoadError::Encoding {
            path: origin.to_path_buf(),
            line,
        }
    } else {
        LoadError::Io {
            path: origin.to_path_buf(),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,pointtab::process=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn csv_file(content: &str) -> Result<NamedTempFile> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(content.as_bytes())?;
        Ok(tmp)
    }

    fn sel(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn loads_mixed_example() -> Result<()> {
        init_test_logging();
        let tmp = csv_file("x,y,z,cluster\n1.0,2.0,3.0,A\n4.0,5.0,6.0,B\n7.0,8.0,9.0,A\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.matrix.shape(), (3, 4));
        assert_eq!(
            table.matrix.as_slice(),
            &[1.0, 2.0, 3.0, 0.0, 4.0, 5.0, 6.0, 1.0, 7.0, 8.0, 9.0, 0.0]
        );
        assert_eq!(
            table.kinds(),
            vec![
                ColumnKind::Numeric,
                ColumnKind::Numeric,
                ColumnKind::Numeric,
                ColumnKind::Categorical
            ]
        );
        assert_eq!(table.headers(), vec!["x", "y", "z", "cluster"]);
        let cluster = table.categories_for("cluster").expect("cluster map");
        assert_eq!(cluster.iter().collect::<Vec<_>>(), vec![("A", 0), ("B", 1)]);
        assert_eq!(table.diagnostics, LoadDiagnostics::default());
        Ok(())
    }

    #[test]
    fn short_row_is_padded_and_counted() -> Result<()> {
        init_test_logging();
        let tmp = csv_file("x,y,z,cluster\n1.0,2.0,3.0,A\n1.0,2.0\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.matrix.shape(), (2, 4));
        assert_eq!(table.diagnostics.short_rows, 1);
        let row = table.matrix.row(1).unwrap();
        assert_eq!(&row[..2], &[1.0, 2.0]);
        assert!(row[2].is_nan());
        assert!(row[3].is_nan());
        Ok(())
    }

    #[test]
    fn long_row_is_truncated_and_counted() -> Result<()> {
        let tmp = csv_file("a,b\n1,2,3,4\n5,6\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.matrix.shape(), (2, 2));
        assert_eq!(table.matrix.as_slice(), &[1.0, 2.0, 5.0, 6.0]);
        assert_eq!(table.diagnostics.long_rows, 1);
        Ok(())
    }

    #[test]
    fn selection_picks_columns_in_given_order() -> Result<()> {
        let tmp = csv_file("id,cell_type,score,batch\n1,T,0.5,b1\n2,B,0.7,b2\n3,T,,b1\n")?;

        let table = load(tmp.path(), Some(&sel(&["batch", "score"])))?;

        assert_eq!(table.headers(), vec!["batch", "score"]);
        assert_eq!(table.is_categorical(), vec![true, false]);
        assert_eq!(table.matrix.shape(), (3, 2));
        assert_eq!(table.matrix.get(1, 0), Some(1.0));
        assert_eq!(table.matrix.get(1, 1), Some(0.7));
        assert!(table.matrix.get(2, 1).unwrap().is_nan());
        assert!(table.categories_for("cell_type").is_none());
        Ok(())
    }

    #[test]
    fn unknown_selected_column_is_format_error() -> Result<()> {
        let tmp = csv_file("a,b\n1,2\n")?;

        let err = load(tmp.path(), Some(&sel(&["a", "nope"]))).unwrap_err();

        assert_eq!(
            err.format_error(),
            Some(&FormatError::UnknownColumn {
                name: "nope".into()
            })
        );
        Ok(())
    }

    #[test]
    fn empty_header_is_format_error() -> Result<()> {
        for content in ["", "\n1,2\n", " , \n1,2\n"] {
            let tmp = csv_file(content)?;
            let err = load(tmp.path(), None).unwrap_err();
            assert_eq!(err.format_error(), Some(&FormatError::EmptyHeader), "{content:?}");
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load("/no/such/file.csv", None).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }), "got {err:?}");
    }

    #[test]
    fn invalid_utf8_is_encoding_error() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"a,b\n1,2\n\xff\xfe,3\n")?;

        let err = load(tmp.path(), None).unwrap_err();

        assert!(matches!(err, LoadError::Encoding { line: 3, .. }), "got {err:?}");
        Ok(())
    }

    #[test]
    fn reloading_gives_identical_maps() -> Result<()> {
        let tmp = csv_file("g,h\nz,1\ny,2\nz,3\nx,4\ny,5\n")?;

        let first = load(tmp.path(), None)?;
        let second = load(tmp.path(), None)?;

        assert_eq!(first.maps, second.maps);
        assert_eq!(first.category_map(), second.category_map());
        assert_eq!(first.matrix, second.matrix);
        let g = first.categories_for("g").unwrap();
        assert_eq!(g.iter().collect::<Vec<_>>(), vec![("z", 0), ("y", 1), ("x", 2)]);
        Ok(())
    }

    #[test]
    fn quoted_fields_and_crlf() -> Result<()> {
        let lf = csv_file("\"name\",val\n\"Smith, J\",1\n\"O\"\"Neil\",2\n")?;
        let crlf = csv_file("\"name\",val\r\n\"Smith, J\",1\r\n\"O\"\"Neil\",2\r\n")?;

        let a = load(lf.path(), None)?;
        let b = load(crlf.path(), None)?;

        assert_eq!(a.headers(), vec!["name", "val"]);
        let names = a.categories_for("name").unwrap();
        assert_eq!(names.code("Smith, J"), Some(0));
        assert_eq!(names.code("O\"Neil"), Some(1));
        assert_eq!(a.matrix, b.matrix);
        assert_eq!(a.maps, b.maps);
        Ok(())
    }

    #[test]
    fn blank_lines_and_malformed_quotes_are_counted() -> Result<()> {
        let tmp = csv_file("a,b\n1,x\n\n2,\"unclosed\n3,y\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.matrix.rows(), 3);
        assert_eq!(table.diagnostics.blank_lines, 1);
        assert_eq!(table.diagnostics.malformed_lines, 1);
        let b = table.categories_for("b").unwrap();
        assert_eq!(b.code("unclosed"), Some(1));
        Ok(())
    }

    #[test]
    fn repeated_header_names_keep_their_own_dictionaries() -> Result<()> {
        init_test_logging();
        let src = Cursor::new("g,g\nA,x\nB,y\n");

        let table = Loader::default().load_from_reader(src, None, Path::new("<memory>"))?;

        assert_eq!(table.headers(), vec!["g", "g"]);
        assert_eq!(table.matrix.as_slice(), &[0.0, 0.0, 1.0, 1.0]);
        assert_eq!(table.maps.len(), 2);

        let first = table.categories_at(0).expect("first g");
        assert_eq!(first.iter().collect::<Vec<_>>(), vec![("A", 0), ("B", 1)]);
        let second = table.categories_at(1).expect("second g");
        assert_eq!(second.iter().collect::<Vec<_>>(), vec![("x", 0), ("y", 1)]);

        assert_eq!(table.categories_for("g").and_then(|c| c.code("A")), Some(0));
        assert_eq!(table.category_map()["g"], *first);
        Ok(())
    }

    #[test]
    fn selecting_a_repeated_name_loads_the_first_column() -> Result<()> {
        let src = Cursor::new("g,n,g\nA,1,x\nB,2,y\n");

        let table = Loader::default().load_from_reader(
            src,
            Some(&sel(&["g", "n"])),
            Path::new("<memory>"),
        )?;

        assert_eq!(table.matrix.as_slice(), &[0.0, 1.0, 1.0, 2.0]);
        assert_eq!(table.categories_for("g").and_then(|c| c.code("A")), Some(0));
        Ok(())
    }

    #[test]
    fn malformed_header_is_counted() -> Result<()> {
        let tmp = csv_file("a,\"b\nx,y\n1,\"z\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.headers(), vec!["a", "b"]);
        assert_eq!(table.matrix.rows(), 2);
        assert_eq!(table.diagnostics.malformed_lines, 2);
        Ok(())
    }

    #[test]
    fn header_only_file_has_zero_rows() -> Result<()> {
        let tmp = csv_file("a,b,c\n")?;

        let table = load(tmp.path(), None)?;

        assert_eq!(table.matrix.shape(), (0, 3));
        assert!(table.is_categorical().iter().all(|&c| c));
        assert!(table.category_map().values().all(|m| m.is_empty()));
        Ok(())
    }

    #[test]
    fn sequential_and_parallel_agree() -> Result<()> {
        let mut content = String::from("x,label,y\n");
        for i in 0..500 {
            content.push_str(&format!("{},{},{}\n", i, ["a", "b", "c"][i % 3], i as f64 * 0.5));
        }
        let tmp = csv_file(&content)?;

        let par = Loader::default().load(tmp.path(), None)?;
        let seq = Loader::new(LoaderConfig {
            parallel: false,
            ..LoaderConfig::default()
        })
        .load(tmp.path(), None)?;

        assert_eq!(par.matrix, seq.matrix);
        assert_eq!(par.maps, seq.maps);
        Ok(())
    }

    #[test]
    fn numeric_levels_respect_config() -> Result<()> {
        let tmp = csv_file("n,m\n1,5\n2,5\n3,6\n")?;
        let loader = Loader::new(LoaderConfig {
            max_numeric_levels: 2,
            ..LoaderConfig::default()
        });

        let table = loader.load(tmp.path(), None)?;

        assert_eq!(table.numeric_levels_for("n"), Some(&NumericLevels::Overflow));
        assert!(matches!(table.numeric_levels_for("m"), Some(NumericLevels::Levels(l)) if l.len() == 2));
        Ok(())
    }

    #[test]
    fn reader_source_with_semicolons() -> Result<()> {
        let loader = Loader::new(LoaderConfig {
            delimiter: ';',
            ..LoaderConfig::default()
        });
        let src = Cursor::new("a;b\n1,5;x\n2;y\n");

        let table = loader.load_from_reader(src, None, Path::new("<memory>"))?;

        // "1,5" is not a number without locale support
        assert_eq!(table.is_categorical(), vec![true, true]);
        assert_eq!(table.matrix.shape(), (2, 2));
        Ok(())
    }

    #[test]
    fn read_headers_strips_quotes_and_bom() -> Result<()> {
        let tmp = csv_file("\u{feff}\"x\", y ,\"cell type\"\n1,2,3\n")?;

        let headers = read_headers(tmp.path(), &LoaderConfig::default())?;

        assert_eq!(headers, vec!["x", "y", "cell type"]);
        Ok(())
    }
}
