use super::error::Error;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Reads the first field of every non-empty line.
pub fn read_first_field(path: &Path) -> Result<Vec<String>, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::csv(path, e))?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::csv(path, e))?;
        if let Some(field) = record.get(0) {
            values.push(field.trim().to_string());
        }
    }
    Ok(values)
}

/// Writes one value per line with no header.
pub fn write_lines<T: std::fmt::Display>(path: &Path, values: &[T]) -> Result<(), Error> {
    let file = fs::File::create(path).map_err(|e| Error::file(path, e))?;
    let mut out = BufWriter::new(file);
    for value in values {
        writeln!(out, "{value}")?;
    }
    out.flush()?;
    Ok(())
}

/// Lists the `*.csv` files directly inside `dir`, sorted by file name.
pub fn list_csv(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| Error::file(dir, e))? {
        let path = entry.map_err(|e| Error::file(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_first_field_of_each_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shifts.csv");
        fs::write(&path, "1.25,H1\n7.30\n\nabc\n").unwrap();

        let values = read_first_field(&path).unwrap();
        assert_eq!(values, vec!["1.25", "7.30", "abc"]);
    }

    #[test]
    fn writes_one_value_per_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist.csv");
        write_lines(&path, &[0u32, 3, 1]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\n3\n1\n");
    }

    #[test]
    fn lists_only_csv_files_in_name_order() {
        let dir = TempDir::new().unwrap();
        for name in ["b.csv", "a.csv", "c_error.txt"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();
        let names: Vec<String> = list_csv(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.csv");
        let err = read_first_field(&path).unwrap_err();
        assert!(err.to_string().contains("absent.csv"));
    }
}
