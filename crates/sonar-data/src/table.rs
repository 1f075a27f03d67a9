//! Comma-delimited sample tables.
//!
//! The first line is a header naming every field. The first field of every
//! row is an identifier (usually a timestamp) and is kept as text; all other
//! fields must parse as numbers.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DataError, Result};

/// Which numeric field becomes the regression target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelection {
    /// Index among the numeric fields (identifier excluded).
    pub index: usize,
    /// Keep the target column inside the feature matrix as well.
    pub include_in_features: bool,
}

impl Default for TargetSelection {
    fn default() -> Self {
        Self {
            index: 1,
            include_in_features: false,
        }
    }
}

impl TargetSelection {
    /// Selects the numeric field at `index`.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Sets whether the target also stays a feature.
    pub fn with_include_in_features(mut self, include: bool) -> Self {
        self.include_in_features = include;
        self
    }
}

/// Row-major numeric matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
    column_names: Vec<String>,
}

impl FeatureMatrix {
    /// Creates a matrix from row-major data.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::InvalidConfig`] if `data` or `column_names` do not
    /// match `rows x cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>, column_names: Vec<String>) -> Result<Self> {
        if data.len() != rows * cols || column_names.len() != cols {
            return Err(DataError::InvalidConfig(format!(
                "matrix of {} x {} needs {} values and {} names, got {} and {}",
                rows,
                cols,
                rows * cols,
                cols,
                data.len(),
                column_names.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            column_names,
        })
    }

    /// Number of rows (samples).
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (features).
    pub fn num_cols(&self) -> usize {
        self.cols
    }

    /// Column names in order.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Returns row `i`.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Returns the value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    /// Row-major data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable row-major data.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// A parsed sample table.
#[derive(Debug, Clone)]
pub struct SampleTable {
    header: Vec<String>,
    identifiers: Vec<String>,
    /// Numeric fields, row-major, `header.len() - 1` per row
    values: Vec<f32>,
}

impl SampleTable {
    /// Reads and parses the file at `path`. The file is closed before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Io`] naming the path if the file cannot be read,
    /// and any error from [`SampleTable::parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| DataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&text)?;
        info!(
            path = %path.display(),
            rows = table.num_rows(),
            columns = table.header.len(),
            "Loaded dataset"
        );
        Ok(table)
    }

    /// Parses comma-delimited text with a header line.
    ///
    /// Blank lines are skipped. Every other line must have exactly as many
    /// fields as the header.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::EmptyDataset`] without data rows,
    /// [`DataError::ColumnCount`] for ragged rows and
    /// [`DataError::InvalidNumber`] for fields that do not parse.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header_line) = lines.next().ok_or(DataError::EmptyDataset)?;
        let header: Vec<String> = header_line
            .split(',')
            .map(|field| field.trim().to_string())
            .collect();
        let width = header.len();
        debug!(?header, "Parsed header");

        let mut identifiers = Vec::new();
        let mut values = Vec::new();
        for (line_no, line) in lines {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != width {
                return Err(DataError::ColumnCount {
                    line: line_no,
                    expected: width,
                    actual: fields.len(),
                });
            }

            identifiers.push(fields[0].trim().to_string());
            for (col, raw) in fields.iter().enumerate().skip(1) {
                let value: f32 = raw.trim().parse().map_err(|_| DataError::InvalidNumber {
                    line: line_no,
                    column: header[col].clone(),
                    value: raw.to_string(),
                })?;
                values.push(value);
            }
        }

        if identifiers.is_empty() {
            return Err(DataError::EmptyDataset);
        }

        Ok(Self {
            header,
            identifiers,
            values,
        })
    }

    /// Full header, identifier column included.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Names of the numeric fields.
    pub fn numeric_columns(&self) -> &[String] {
        &self.header[1..]
    }

    /// Identifier field of every row.
    pub fn identifiers(&self) -> &[String] {
        &self.identifiers
    }

    /// Number of data rows.
    pub fn num_rows(&self) -> usize {
        self.identifiers.len()
    }

    /// Number of numeric fields per row.
    pub fn num_numeric(&self) -> usize {
        self.header.len().saturating_sub(1)
    }

    /// Numeric fields of row `i`.
    pub fn numeric_row(&self, i: usize) -> &[f32] {
        let width = self.num_numeric();
        &self.values[i * width..(i + 1) * width]
    }

    /// Splits the numeric fields into a feature matrix and a target vector.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::TargetColumnOutOfRange`] if the target index does
    /// not name a numeric field and [`DataError::NoFeatures`] if no feature
    /// column would remain.
    pub fn split_target(&self, target: &TargetSelection) -> Result<(FeatureMatrix, Vec<f32>)> {
        let width = self.num_numeric();
        if target.index >= width {
            return Err(DataError::TargetColumnOutOfRange {
                index: target.index,
                available: width,
            });
        }

        let keep: Vec<usize> = (0..width)
            .filter(|&c| target.include_in_features || c != target.index)
            .collect();
        if keep.is_empty() {
            return Err(DataError::NoFeatures);
        }

        let rows = self.num_rows();
        let mut data = Vec::with_capacity(rows * keep.len());
        let mut targets = Vec::with_capacity(rows);
        for i in 0..rows {
            let row = self.numeric_row(i);
            data.extend(keep.iter().map(|&c| row[c]));
            targets.push(row[target.index]);
        }

        let names = keep
            .iter()
            .map(|&c| self.numeric_columns()[c].clone())
            .collect();
        debug!(
            target = %self.numeric_columns()[target.index],
            features = keep.len(),
            "Extracted target column"
        );

        let features = FeatureMatrix::new(rows, keep.len(), data, names)?;
        Ok((features, targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "Date Time,p (mbar),T (degC),rh (%)\n\
                          01.01.2009 00:10:00,996.52,-8.02,93.3\n\
                          01.01.2009 00:20:00,996.57,-8.41,93.4\n\
                          01.01.2009 00:30:00,996.53,-8.51,93.9\n";

    #[test]
    fn test_parse_header_and_rows() {
        let table = SampleTable::parse(SAMPLE).unwrap();
        assert_eq!(table.header().len(), 4);
        assert_eq!(table.numeric_columns(), &["p (mbar)", "T (degC)", "rh (%)"]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.identifiers()[1], "01.01.2009 00:20:00");
        assert_eq!(table.numeric_row(2), &[996.53, -8.51, 93.9]);
    }

    #[test]
    fn test_split_target_excludes_target_by_default() {
        let table = SampleTable::parse(SAMPLE).unwrap();
        let (features, targets) = table.split_target(&TargetSelection::default()).unwrap();
        assert_eq!(targets, vec![-8.02, -8.41, -8.51]);
        assert_eq!(features.num_cols(), 2);
        assert_eq!(features.column_names(), &["p (mbar)", "rh (%)"]);
        assert_eq!(features.row(0), &[996.52, 93.3]);
    }

    #[test]
    fn test_split_target_can_keep_target() {
        let table = SampleTable::parse(SAMPLE).unwrap();
        let selection = TargetSelection::default().with_include_in_features(true);
        let (features, targets) = table.split_target(&selection).unwrap();
        assert_eq!(features.num_cols(), 3);
        assert_eq!(features.get(1, 1), targets[1]);
    }

    #[test]
    fn test_target_out_of_range() {
        let table = SampleTable::parse(SAMPLE).unwrap();
        let err = table.split_target(&TargetSelection::new(3)).unwrap_err();
        assert!(matches!(
            err,
            DataError::TargetColumnOutOfRange {
                index: 3,
                available: 3
            }
        ));
    }

    #[test]
    fn test_single_numeric_column_has_no_features() {
        let table = SampleTable::parse("id,value\na,1\nb,2\n").unwrap();
        assert!(matches!(
            table.split_target(&TargetSelection::new(0)),
            Err(DataError::NoFeatures)
        ));
    }

    #[test]
    fn test_ragged_row_reports_line() {
        let err = SampleTable::parse("id,a,b\nx,1,2\ny,3\n").unwrap_err();
        assert!(matches!(
            err,
            DataError::ColumnCount {
                line: 3,
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_invalid_number_names_column() {
        let err = SampleTable::parse("id,a,b\nx,1,oops\n").unwrap_err();
        match err {
            DataError::InvalidNumber {
                line,
                column,
                value,
            } => {
                assert_eq!(line, 2);
                assert_eq!(column, "b");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let table = SampleTable::parse("id,a,b\r\nx,1,2\r\n\r\ny,3,4\r\n\n").unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.numeric_row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(matches!(
            SampleTable::parse("id,a,b\n"),
            Err(DataError::EmptyDataset)
        ));
        assert!(matches!(SampleTable::parse(""), Err(DataError::EmptyDataset)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("climate.csv");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        drop(file);

        let table = SampleTable::load(&path).unwrap();
        assert_eq!(table.num_rows(), 3);
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        let err = SampleTable::load(&path).unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
        assert!(err.to_string().contains("missing.csv"));
    }
}
