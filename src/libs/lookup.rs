use std::collections::BTreeMap;
use std::io::BufRead;

use crate::libs::error::{ReportError, Result};

pub type ChainKey = u32;
pub type ComplexId = u32;

/// Complex membership built from a `.lookup` file.
///
/// Immutable once loaded; workers only read it.
#[derive(Debug, Clone, Default)]
pub struct MembershipIndex {
    pub chain_to_complex: BTreeMap<ChainKey, ComplexId>,
    pub complex_to_chains: BTreeMap<ComplexId, Vec<ChainKey>>,
    /// Complex ids in order of first appearance
    pub complex_ids: Vec<ComplexId>,
}

impl MembershipIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines are `chainKey\tname\tcomplexId`.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut index = Self::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(ReportError::Setup(format!(
                    "lookup line {} has {} fields, expected 3: {}",
                    i + 1,
                    fields.len(),
                    line
                )));
            }
            let chain_key: ChainKey = fields[0].parse().map_err(|_| {
                ReportError::Setup(format!("lookup line {}: bad chain key {}", i + 1, fields[0]))
            })?;
            let complex_id: ComplexId = fields[2].parse().map_err(|_| {
                ReportError::Setup(format!("lookup line {}: bad complex id {}", i + 1, fields[2]))
            })?;

            index.insert(chain_key, complex_id);
        }

        Ok(index)
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let reader = crate::libs::io::reader(path)?;
        Self::from_reader(reader)
    }

    pub fn insert(&mut self, chain_key: ChainKey, complex_id: ComplexId) {
        self.chain_to_complex.insert(chain_key, complex_id);
        let chains = self.complex_to_chains.entry(complex_id).or_insert_with(|| {
            self.complex_ids.push(complex_id);
            vec![]
        });
        chains.push(chain_key);
    }

    pub fn chains(&self, complex_id: ComplexId) -> &[ChainKey] {
        self.complex_to_chains
            .get(&complex_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.complex_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complex_ids.is_empty()
    }
}
