use crate::libs::error::{ReportError, Result};

/// One chain-to-chain alignment line carrying complex-level scores.
///
/// Columns (tab-separated):
/// `targetKey score seqId eval qStart qEnd qLen tStart tEnd tLen backtrace
///  qTmScore tTmScore rotation translation assId`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlnEntry {
    pub target_key: u32,
    pub assignment_id: u32,
    pub q_tm_score: f64,
    pub t_tm_score: f64,
    pub rotation: String,
    pub translation: String,
}

const N_COLUMNS: usize = 16;

impl std::str::FromStr for AlnEntry {
    type Err = ReportError;

    fn from_str(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() < N_COLUMNS {
            return Err(ReportError::Format(format!(
                "alignment line has {} columns, expected {}: {}",
                fields.len(),
                N_COLUMNS,
                line
            )));
        }

        let bad = |name: &str, value: &str| {
            ReportError::Format(format!("invalid {} '{}' in alignment line", name, value))
        };

        let target_key = fields[0]
            .parse::<u32>()
            .map_err(|_| bad("target key", fields[0]))?;
        let q_tm_score = fields[11]
            .parse::<f64>()
            .map_err(|_| bad("query TM-score", fields[11]))?;
        let t_tm_score = fields[12]
            .parse::<f64>()
            .map_err(|_| bad("target TM-score", fields[12]))?;
        let assignment_id = fields[15]
            .parse::<u32>()
            .map_err(|_| bad("assignment id", fields[15]))?;

        Ok(AlnEntry {
            target_key,
            assignment_id,
            q_tm_score,
            t_tm_score,
            rotation: fields[13].to_string(),
            translation: fields[14].to_string(),
        })
    }
}

/// Cursor over the lines of one alignment-store entry.
///
/// Stops at the end of the entry or at the first empty line. A malformed
/// line is yielded as an error and the cursor still moves past it.
pub struct AlnLines<'a> {
    rest: &'a str,
}

impl<'a> AlnLines<'a> {
    pub fn new(data: &'a str) -> Self {
        Self { rest: data }
    }
}

impl<'a> Iterator for AlnLines<'a> {
    type Item = Result<AlnEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let (line, rest) = match self.rest.find('\n') {
            Some(pos) => (&self.rest[..pos], &self.rest[pos + 1..]),
            None => (self.rest, ""),
        };
        if line.trim().is_empty() {
            self.rest = "";
            return None;
        }
        self.rest = rest;

        Some(line.parse::<AlnEntry>())
    }
}
