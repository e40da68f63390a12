//src/tsv.rs

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use flate2::read::MultiGzDecoder;

use crate::error::{CountError, Result};

/// Opens a file for reading, transparently decompressing `.gz` input.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    let f = File::open(path).map_err(|e| CountError::io(path, e))?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn Read> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// A tab-separated table held as raw string records.
///
/// Column roles are assigned by the caller; nothing here guesses types.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub header: Vec<String>,
    /// Line the header was read from, after any leading comments.
    pub header_line: u64,
    /// `(line number, record)` for every data row, in file order.
    pub rows: Vec<(u64, StringRecord)>,
}

impl RawTable {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads a whole tab-separated file. The first non-comment line is the header
/// when `has_header` is set; `#` lines are skipped when `skip_comments` is set.
pub fn read_table(path: &Path, has_header: bool, skip_comments: bool) -> Result<RawTable> {
    let input = open_input(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_header)
        .flexible(true)
        .comment(if skip_comments { Some(b'#') } else { None })
        .from_reader(input);

    let (header, header_line) = if has_header {
        let header = reader
            .headers()
            .map_err(|e| CountError::csv(path, e))?;
        if header.is_empty() {
            return Err(CountError::EmptyHeader(path.to_path_buf()));
        }
        let line = header.position().map(|p| p.line()).unwrap_or(1);
        (header.iter().map(str::to_string).collect(), line)
    } else {
        (Vec::new(), 0)
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CountError::csv(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        rows.push((line, record));
    }

    log::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(RawTable {
        header,
        header_line,
        rows,
    })
}

/// Fetches field `idx`, failing with a column-count error naming the line.
pub fn field<'r>(
    path: &Path,
    line: u64,
    record: &'r StringRecord,
    idx: usize,
) -> Result<&'r str> {
    record.get(idx).ok_or_else(|| CountError::TooFewColumns {
        path: path.to_path_buf(),
        line,
        expected: idx + 1,
        found: record.len(),
    })
}

/// Parses a count cell. Empty and `NaN` cells are absent values.
pub fn parse_count(path: &Path, line: u64, column: &str, value: &str) -> Result<Option<f64>> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(_) => Err(CountError::InvalidNumber {
            path: path.to_path_buf(),
            line,
            column: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Writes rows to a tab-separated file, creating parent directories first.
pub fn write_table<I>(path: &Path, header: &[String], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| CountError::io(parent, e))?;
        }
    }

    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(|e| CountError::csv(path, e))?;

    writer
        .write_record(header)
        .map_err(|e| CountError::csv(path, e))?;
    let mut n = 0usize;
    for row in rows {
        writer
            .write_record(&row)
            .map_err(|e| CountError::csv(path, e))?;
        n += 1;
    }
    writer.flush().map_err(|e| CountError::io(path, e))?;

    log::info!("Wrote {} rows to {}", n, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn reads_header_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv");
        std::fs::write(&path, "# program\nid\ta\nx\t1\ny\t2\n").unwrap();

        let table = read_table(&path, true, true).unwrap();
        assert_eq!(table.header, vec!["id", "a"]);
        assert_eq!(table.header_line, 2);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(&table.rows[1].1[0], "y");
        assert_eq!(table.column("a"), Some(1));
    }

    #[test]
    fn reads_gzip_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.tsv.gz");
        let mut enc = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        enc.write_all(b"id\ta\nx\t1\n").unwrap();
        enc.finish().unwrap();

        let table = read_table(&path, true, false).unwrap();
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tsv");
        std::fs::write(&path, "").unwrap();

        let err = read_table(&path, true, false).unwrap_err();
        assert!(matches!(err, CountError::EmptyHeader(_)));
    }

    #[test]
    fn count_cells() {
        let p = Path::new("x.tsv");
        assert_eq!(parse_count(p, 1, "S1", "5").unwrap(), Some(5.0));
        assert_eq!(parse_count(p, 1, "S1", "").unwrap(), None);
        assert_eq!(parse_count(p, 1, "S1", "NaN").unwrap(), None);
        assert!(matches!(
            parse_count(p, 3, "S1", "abc"),
            Err(CountError::InvalidNumber { line: 3, .. })
        ));
    }

    #[test]
    fn writes_into_new_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.tsv");
        write_table(
            &path,
            &["".to_string(), "S1".to_string()],
            vec![vec!["a".to_string(), "1".to_string()]],
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "\tS1\na\t1\n");
    }
}
