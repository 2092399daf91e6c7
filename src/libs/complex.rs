use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::libs::aln::AlnEntry;
use crate::libs::error::{ReportError, Result};
use crate::libs::ident::split_identifier;
use crate::libs::lookup::ComplexId;

/// (assignment id, query complex name)
pub type GroupKey = (u32, String);

/// All chain-level alignments of one assignment seen from one query complex.
///
/// Scores and transform come from the entry that created the group; later
/// entries only extend the two chain lists, which always have equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentGroup {
    pub assignment_id: u32,
    /// Membership-index id of the complex that created the group
    pub query_complex_id: ComplexId,
    pub query_complex: String,
    pub target_complex: String,
    pub query_chains: Vec<String>,
    pub target_chains: Vec<String>,
    pub q_tm_score: f64,
    pub t_tm_score: f64,
    pub rotation: String,
    pub translation: String,
}

/// Folds decoded alignment entries into groups keyed by
/// (assignment id, query complex name).
///
/// Each worker owns one; they are combined afterwards with [`merge`].
#[derive(Debug, Default)]
pub struct Accumulator {
    groups: IndexMap<GroupKey, AlignmentGroup>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one entry found while walking the chains of `complex_id`.
    ///
    /// A key already owned by another complex id is a `KeyCollision`: two
    /// complexes of the membership index carry the same name.
    pub fn ingest(
        &mut self,
        complex_id: ComplexId,
        entry: &AlnEntry,
        query_id: &str,
        target_id: &str,
    ) -> Result<()> {
        // Both identifiers are checked before anything is touched
        let (q_complex, q_chain) = split_identifier(query_id)?;
        let (t_complex, t_chain) = split_identifier(target_id)?;

        match self.groups.entry((entry.assignment_id, q_complex.to_string())) {
            Entry::Vacant(slot) => {
                slot.insert(AlignmentGroup {
                    assignment_id: entry.assignment_id,
                    query_complex_id: complex_id,
                    query_complex: q_complex.to_string(),
                    target_complex: t_complex.to_string(),
                    query_chains: vec![q_chain.to_string()],
                    target_chains: vec![t_chain.to_string()],
                    q_tm_score: entry.q_tm_score,
                    t_tm_score: entry.t_tm_score,
                    rotation: entry.rotation.clone(),
                    translation: entry.translation.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                if group.query_complex_id != complex_id {
                    return Err(collision(group, complex_id));
                }
                group.query_chains.push(q_chain.to_string());
                group.target_chains.push(t_chain.to_string());
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Groups in discovery order.
    pub fn finalize(self) -> Vec<(u32, AlignmentGroup)> {
        self.groups
            .into_values()
            .map(|g| (g.assignment_id, g))
            .collect()
    }
}

fn collision(group: &AlignmentGroup, other: ComplexId) -> ReportError {
    ReportError::KeyCollision {
        assignment_id: group.assignment_id,
        complex_name: group.query_complex.clone(),
        first: group.query_complex_id,
        second: other,
    }
}

/// Combines per-batch accumulators in the given order.
///
/// Every complex lives in exactly one batch, so a key present in two parts
/// was claimed by two complexes sharing a name.
pub fn merge<I>(parts: I) -> Result<Accumulator>
where
    I: IntoIterator<Item = Accumulator>,
{
    let mut merged = Accumulator::new();

    for part in parts {
        for (key, group) in part.groups {
            match merged.groups.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(group);
                }
                Entry::Occupied(slot) => {
                    return Err(collision(slot.get(), group.query_complex_id));
                }
            }
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ass: u32, qtm: f64, ttm: f64, rot: &str, trans: &str) -> AlnEntry {
        AlnEntry {
            target_key: 0,
            assignment_id: ass,
            q_tm_score: qtm,
            t_tm_score: ttm,
            rotation: rot.to_string(),
            translation: trans.to_string(),
        }
    }

    fn groups(acc: Accumulator) -> Vec<AlignmentGroup> {
        acc.finalize().into_iter().map(|(_, g)| g).collect()
    }

    #[test]
    fn test_first_entry_wins() {
        let mut acc = Accumulator::new();
        acc.ingest(0, &entry(7, 0.85, 0.77, "rot1", "trans1"), "Q_A", "T_X")
            .unwrap();
        acc.ingest(0, &entry(7, 0.10, 0.20, "rot2", "trans2"), "Q_B", "T_Y")
            .unwrap();

        assert_eq!(acc.len(), 1);
        let g = &groups(acc)[0];
        assert_eq!(g.assignment_id, 7);
        assert_eq!(g.query_complex, "Q");
        assert_eq!(g.query_chains, vec!["A", "B"]);
        assert_eq!(g.target_chains, vec!["X", "Y"]);
        assert_eq!(g.q_tm_score, 0.85);
        assert_eq!(g.t_tm_score, 0.77);
        assert_eq!(g.rotation, "rot1");
        assert_eq!(g.translation, "trans1");
        assert_eq!(g.target_complex, "T");
    }

    #[test]
    fn test_key_includes_query_complex() {
        let mut acc = Accumulator::new();
        acc.ingest(0, &entry(3, 0.5, 0.5, "r", "t"), "P_A", "T_X").unwrap();
        acc.ingest(1, &entry(3, 0.5, 0.5, "r", "t"), "Q_A", "T_X").unwrap();
        acc.ingest(0, &entry(4, 0.5, 0.5, "r", "t"), "P_B", "S_Z").unwrap();

        assert_eq!(acc.len(), 3);
        let order: Vec<_> = acc
            .finalize()
            .into_iter()
            .map(|(id, g)| (id, g.query_complex))
            .collect();
        assert_eq!(
            order,
            vec![(3, "P".to_string()), (3, "Q".to_string()), (4, "P".to_string())]
        );
    }

    #[test]
    fn test_bad_identifier_leaves_groups_untouched() {
        let mut acc = Accumulator::new();
        acc.ingest(0, &entry(1, 0.5, 0.5, "r", "t"), "Q_A", "T_X").unwrap();

        let err = acc
            .ingest(0, &entry(1, 0.5, 0.5, "r", "t"), "Q_B", "noDelimiter")
            .unwrap_err();
        assert!(err.is_format());
        assert!(acc
            .ingest(0, &entry(2, 0.5, 0.5, "r", "t"), "bad", "T_X")
            .is_err());

        let all = groups(acc);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].query_chains, vec!["A"]);
        assert_eq!(all[0].query_chains.len(), all[0].target_chains.len());
    }

    #[test]
    fn test_shared_name_within_one_accumulator() {
        let mut acc = Accumulator::new();
        acc.ingest(4, &entry(1, 0.5, 0.5, "r", "t"), "Q_A", "T_X").unwrap();

        match acc.ingest(9, &entry(1, 0.5, 0.5, "r", "t"), "Q_C", "T_X") {
            Err(ReportError::KeyCollision {
                assignment_id,
                complex_name,
                first,
                second,
            }) => {
                assert_eq!(assignment_id, 1);
                assert_eq!(complex_name, "Q");
                assert_eq!((first, second), (4, 9));
            }
            other => panic!("expected a collision, got {:?}", other),
        }

        // the group is left as it was
        assert_eq!(groups(acc)[0].query_chains, vec!["A"]);
    }

    #[test]
    fn test_merge() {
        let mut a = Accumulator::new();
        a.ingest(0, &entry(5, 0.5, 0.5, "r", "t"), "Q_A", "T_X").unwrap();
        let mut b = Accumulator::new();
        b.ingest(1, &entry(2, 0.5, 0.5, "r", "t"), "R_A", "T_X").unwrap();
        b.ingest(1, &entry(5, 0.5, 0.5, "r", "t"), "R_A", "T_X").unwrap();

        let merged = merge(vec![a, Accumulator::new(), b]).unwrap();
        let ids: Vec<u32> = merged.finalize().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![5, 2, 5]);
    }

    #[test]
    fn test_merge_collision() {
        let mut a = Accumulator::new();
        a.ingest(0, &entry(5, 0.5, 0.5, "r", "t"), "Q_A", "T_X").unwrap();
        let mut b = Accumulator::new();
        b.ingest(3, &entry(5, 0.5, 0.5, "r", "t"), "Q_B", "T_Y").unwrap();

        match merge(vec![a, b]) {
            Err(ReportError::KeyCollision {
                assignment_id,
                complex_name,
                first,
                second,
            }) => {
                assert_eq!(assignment_id, 5);
                assert_eq!(complex_name, "Q");
                assert_eq!((first, second), (0, 3));
            }
            other => panic!("expected a collision, got {:?}", other.map(|m| m.len())),
        }
    }
}
