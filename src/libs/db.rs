//! Indexed key-value stores.
//!
//! A store is a data file with NUL-terminated entries plus an `.index` file of
//! `key\toffset\tlength` lines, where `length` includes the trailing NUL.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::libs::error::{ReportError, Result};

enum Backing {
    Mapped(Mmap),
    Loaded(Vec<u8>),
}

impl Backing {
    fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(m) => &m[..],
            Backing::Loaded(v) => v.as_slice(),
        }
    }
}

/// Read-only store, safe to share between worker threads.
pub struct DbReader {
    data: Backing,
    offsets: HashMap<u32, (usize, usize)>,
}

impl DbReader {
    /// Opens `<path>` and `<path>.index`.
    ///
    /// With `preload` the data file is read into memory, otherwise it is
    /// memory-mapped.
    pub fn open(path: &str, preload: bool) -> Result<Self> {
        let index_path = format!("{}.index", path);
        let offsets = load_index(&index_path)?;

        let data = if preload {
            let bytes = std::fs::read(path)
                .map_err(|e| ReportError::Setup(format!("could not read {}: {}", path, e)))?;
            Backing::Loaded(bytes)
        } else {
            let file = File::open(path)
                .map_err(|e| ReportError::Setup(format!("could not open {}: {}", path, e)))?;
            // Zero-length files cannot be mapped on every platform
            if file.metadata()?.len() == 0 {
                Backing::Loaded(vec![])
            } else {
                let mmap = unsafe { Mmap::map(&file)? };
                Backing::Mapped(mmap)
            }
        };

        let len = data.bytes().len();
        for (key, &(offset, length)) in &offsets {
            if offset.checked_add(length).filter(|&end| end <= len).is_none() {
                return Err(ReportError::Setup(format!(
                    "index entry {} of {} points past the end of the data (offset {}, length {}, size {})",
                    key, path, offset, length, len
                )));
            }
        }

        log::debug!("Opened {} with {} entries ({} bytes)", path, offsets.len(), len);

        Ok(Self { data, offsets })
    }

    /// Entry bytes without the terminating NUL, or `None` for an unknown key.
    pub fn get(&self, key: u32) -> Option<&[u8]> {
        let &(offset, length) = self.offsets.get(&key)?;
        let mut entry = &self.data.bytes()[offset..offset + length];
        if let Some(nul) = entry.iter().position(|&b| b == 0) {
            entry = &entry[..nul];
        }
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

fn load_index(index_path: &str) -> Result<HashMap<u32, (usize, usize)>> {
    let reader = crate::libs::io::reader(index_path)?;
    let mut offsets = HashMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        let parsed = if fields.len() >= 3 {
            match (
                fields[0].parse::<u32>(),
                fields[1].parse::<usize>(),
                fields[2].parse::<usize>(),
            ) {
                (Ok(k), Ok(o), Ok(l)) => Some((k, o, l)),
                _ => None,
            }
        } else {
            None
        };

        match parsed {
            Some((key, offset, length)) => {
                offsets.insert(key, (offset, length));
            }
            None => {
                return Err(ReportError::Setup(format!(
                    "malformed line {} in {}: {}",
                    i + 1,
                    index_path,
                    line
                )))
            }
        }
    }

    Ok(offsets)
}

/// Header store at `<db>_h`, mapping keys to identifiers.
pub struct HeaderDb {
    db: DbReader,
}

impl HeaderDb {
    pub fn open(db: &str, preload: bool) -> Result<Self> {
        let db = DbReader::open(&format!("{}_h", db), preload)?;
        Ok(Self { db })
    }

    /// First whitespace-delimited token of the header, without a leading `>`.
    pub fn identifier(&self, key: u32) -> Option<String> {
        let header = self.db.get(key)?;
        Some(parse_header(&String::from_utf8_lossy(header)))
    }
}

/// ```
/// use cmplx::libs::db::parse_header;
/// assert_eq!(parse_header(">1ABC_A some protein\n"), "1ABC_A");
/// assert_eq!(parse_header("2XYZ_B"), "2XYZ_B");
/// assert_eq!(parse_header(""), "");
/// ```
pub fn parse_header(header: &str) -> String {
    let header = header.trim_start();
    let header = header.strip_prefix('>').unwrap_or(header);
    header
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

/// Output sink: record texts go to `<path>` verbatim, one index line per
/// record goes to `<path>.index`.
pub struct DbWriter {
    data_path: String,
    index_path: String,
    data: BufWriter<File>,
    index: BufWriter<File>,
    offset: usize,
    count: usize,
}

impl DbWriter {
    pub fn create(path: &str) -> Result<Self> {
        let index_path = format!("{}.index", path);
        let data = File::create(path)
            .map_err(|e| ReportError::Setup(format!("could not create {}: {}", path, e)))?;
        let index = File::create(&index_path)
            .map_err(|e| ReportError::Setup(format!("could not create {}: {}", index_path, e)))?;

        Ok(Self {
            data_path: path.to_string(),
            index_path,
            data: BufWriter::new(data),
            index: BufWriter::new(index),
            offset: 0,
            count: 0,
        })
    }

    pub fn write_record(&mut self, key: u32, text: &str) -> Result<()> {
        self.data.write_all(text.as_bytes())?;
        writeln!(self.index, "{}\t{}\t{}", key, self.offset, text.len())?;
        self.offset += text.len();
        self.count += 1;
        Ok(())
    }

    /// Flushes both files; drops the index unless `keep_index`.
    pub fn finish(mut self, keep_index: bool) -> Result<usize> {
        self.data.flush()?;
        self.index.flush()?;
        drop(self.index);

        if !keep_index && Path::new(&self.index_path).exists() {
            std::fs::remove_file(&self.index_path)?;
        }
        log::debug!("Wrote {} records to {}", self.count, self.data_path);

        Ok(self.count)
    }
}
