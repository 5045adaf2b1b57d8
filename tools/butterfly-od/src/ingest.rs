//! CSV readers for the raw OD table and the point table
//!
//! Matrix rows are yielded one by one so a bad row only costs that row.
//! The point table is small and read eagerly; any bad row fails the read.

use butterfly_common::{Error, Result};
use csv::{StringRecord, StringRecordsIntoIter};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::filter::RawRecord;
use crate::spatial::{Point, PointId};

const FROM_COLUMNS: &[&str] = &["from_id", "origin", "from"];
const TO_COLUMNS: &[&str] = &["to_id", "destination", "to"];
const TIME_COLUMNS: &[&str] = &["travel_time", "duration", "time"];
const ID_COLUMNS: &[&str] = &["id", "point_id"];
const X_COLUMNS: &[&str] = &["x", "lon", "lng", "longitude"];
const Y_COLUMNS: &[&str] = &["y", "lat", "latitude"];

/// Markers meaning "no travel time" in the raw table
const MISSING: &[&str] = &["", "na", "nan", "null", "none"];

fn find_column(headers: &StringRecord, names: &[&str], fallback: usize) -> usize {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        .unwrap_or(fallback)
}

fn csv_error(e: csv::Error) -> Error {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::IoError(io),
            other => Error::format(format!("{other:?}")),
        }
    } else {
        Error::format(e.to_string())
    }
}

fn field<'r>(record: &'r StringRecord, column: usize, name: &str, line: u64) -> Result<&'r str> {
    record
        .get(column)
        .map(str::trim)
        .ok_or_else(|| Error::format(format!("line {line}: missing {name} column")))
}

fn parse<T: std::str::FromStr>(value: &str, name: &str, line: u64) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::format(format!("line {line}: {name} '{value}' is not a number")))
}

/// Streaming reader over a `from_id,to_id,travel_time` table (seconds)
pub struct MatrixCsv<R: Read> {
    rows: StringRecordsIntoIter<R>,
    from_col: usize,
    to_col: usize,
    time_col: usize,
    line: u64,
}

impl MatrixCsv<File> {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }
}

impl<R: Read> MatrixCsv<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv.headers().map_err(csv_error)?.clone();
        Ok(Self {
            from_col: find_column(&headers, FROM_COLUMNS, 0),
            to_col: find_column(&headers, TO_COLUMNS, 1),
            time_col: find_column(&headers, TIME_COLUMNS, 2),
            rows: csv.into_records(),
            line: 1,
        })
    }

    fn parse_row(&self, record: &StringRecord) -> Result<RawRecord> {
        let line = self.line;
        let from_id = parse(field(record, self.from_col, "from_id", line)?, "from_id", line)?;
        let to_id = parse(field(record, self.to_col, "to_id", line)?, "to_id", line)?;
        let time = record.get(self.time_col).map(str::trim).unwrap_or("");
        let travel_time = if MISSING.iter().any(|m| time.eq_ignore_ascii_case(m)) {
            None
        } else {
            Some(parse::<f64>(time, "travel_time", line)?)
        };
        Ok(RawRecord {
            from_id,
            to_id,
            travel_time,
        })
    }
}

impl<R: Read> Iterator for MatrixCsv<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.rows.next()?;
        self.line += 1;
        Some(record.map_err(csv_error).and_then(|r| self.parse_row(&r)))
    }
}

/// Read an `id,x,y` point table
pub fn read_points<P: AsRef<Path>>(path: P) -> Result<Vec<Point>> {
    let file = File::open(path.as_ref())?;
    read_points_from(file)
}

pub fn read_points_from<R: Read>(reader: R) -> Result<Vec<Point>> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv.headers().map_err(csv_error)?.clone();
    let id_col = find_column(&headers, ID_COLUMNS, 0);
    let x_col = find_column(&headers, X_COLUMNS, 1);
    let y_col = find_column(&headers, Y_COLUMNS, 2);

    let mut points = Vec::new();
    for (i, record) in csv.records().enumerate() {
        let line = i as u64 + 2;
        let record = record.map_err(csv_error)?;
        let id: PointId = parse(field(&record, id_col, "id", line)?, "id", line)?;
        let x: f64 = parse(field(&record, x_col, "x", line)?, "x", line)?;
        let y: f64 = parse(field(&record, y_col, "y", line)?, "y", line)?;
        points.push(Point { id, x, y });
    }

    tracing::info!(points = points.len(), "read point table");
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_rows_and_missing_values() {
        let data = "from_id,to_id,travel_time\n1,2,300\n1,3,\n2,3,NaN\n3,1,abc\n";
        let rows: Vec<_> = MatrixCsv::from_reader(data.as_bytes()).unwrap().collect();

        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &RawRecord {
                from_id: 1,
                to_id: 2,
                travel_time: Some(300.0)
            }
        );
        assert_eq!(rows[1].as_ref().unwrap().travel_time, None);
        assert_eq!(rows[2].as_ref().unwrap().travel_time, None);
        assert!(matches!(rows[3], Err(Error::FormatError(_))));
    }

    #[test]
    fn test_matrix_columns_found_by_name() {
        let data = "travel_time,destination,origin\n120.5,4,9\n";
        let rows: Vec<_> = MatrixCsv::from_reader(data.as_bytes()).unwrap().collect();
        assert_eq!(
            rows[0].as_ref().unwrap(),
            &RawRecord {
                from_id: 9,
                to_id: 4,
                travel_time: Some(120.5)
            }
        );
    }

    #[test]
    fn test_points_table() {
        let data = "id,x,y\n1,0.0,0.0\n2,4.35,50.85\n";
        let points = read_points_from(data.as_bytes()).unwrap();
        assert_eq!(
            points,
            vec![
                Point { id: 1, x: 0.0, y: 0.0 },
                Point { id: 2, x: 4.35, y: 50.85 },
            ]
        );
    }

    #[test]
    fn test_malformed_point_table_fails() {
        let data = "id,x,y\n1,0.0,0.0\n2,east,50.0\n";
        assert!(matches!(
            read_points_from(data.as_bytes()),
            Err(Error::FormatError(_))
        ));
    }
}
