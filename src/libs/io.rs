use std::io::{BufRead, BufReader};

use crate::libs::error::{ReportError, Result};

/// Opens a plain or gzipped text file, or stdin.
///
/// ```
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("q.lookup");
/// std::fs::write(&path, "0\t1ABC_A\t0\n1\t1ABC_B\t0\n").unwrap();
///
/// use std::io::BufRead;
/// let reader = cmplx::reader(path.to_str().unwrap()).unwrap();
/// assert_eq!(reader.lines().count(), 2);
///
/// assert!(cmplx::reader("no/such/file").is_err());
/// ```
pub fn reader(input: &str) -> Result<Box<dyn BufRead>> {
    let reader: Box<dyn BufRead> = if input == "stdin" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let path = std::path::Path::new(input);
        let file = std::fs::File::open(path).map_err(|why| {
            ReportError::Setup(format!("could not open {}: {}", path.display(), why))
        })?;

        if path.extension() == Some(std::ffi::OsStr::new("gz")) {
            Box::new(BufReader::new(flate2::read::MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        }
    };

    Ok(reader)
}
