use itertools::Itertools;

use crate::libs::complex::{Accumulator, AlignmentGroup};
use crate::libs::db::DbWriter;
use crate::libs::error::Result;

/// One finished output line and the assignment it is sorted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedRecord {
    pub assignment_id: u32,
    pub text: String,
}

/// Renders a group as
/// `qComplex tComplex qChains tChains qTM tTM rotation translation assId`,
/// tab-separated and newline-terminated.
///
/// TM-scores are printed at single precision, so a halfway value such as
/// `5e-6` rounds as its nearest `f32` does.
///
/// ```
/// use cmplx::libs::complex::AlignmentGroup;
/// use cmplx::libs::report::format_group;
///
/// let group = AlignmentGroup {
///     assignment_id: 7,
///     query_complex_id: 0,
///     query_complex: "Q".to_string(),
///     target_complex: "T".to_string(),
///     query_chains: vec!["A".to_string(), "B".to_string()],
///     target_chains: vec!["X".to_string(), "Y".to_string()],
///     q_tm_score: 0.85123,
///     t_tm_score: 0.77001,
///     rotation: "rot1".to_string(),
///     translation: "trans1".to_string(),
/// };
/// let record = format_group(&group);
/// assert_eq!(record.assignment_id, 7);
/// assert_eq!(record.text, "Q\tT\tA,B\tX,Y\t0.85123\t0.77001\trot1\ttrans1\t7\n");
/// ```
pub fn format_group(group: &AlignmentGroup) -> FormattedRecord {
    let text = format!(
        "{}\t{}\t{}\t{}\t{:.5}\t{:.5}\t{}\t{}\t{}\n",
        group.query_complex,
        group.target_complex,
        group.query_chains.iter().join(","),
        group.target_chains.iter().join(","),
        group.q_tm_score as f32,
        group.t_tm_score as f32,
        group.rotation,
        group.translation,
        group.assignment_id,
    );

    FormattedRecord {
        assignment_id: group.assignment_id,
        text,
    }
}

/// Stable sort by assignment id; equal ids keep their input order.
pub fn sequence(mut records: Vec<FormattedRecord>) -> Vec<FormattedRecord> {
    records.sort_by_key(|r| r.assignment_id);
    records
}

/// Formats every group and puts the records in report order.
pub fn render(groups: Accumulator) -> Vec<FormattedRecord> {
    let records = groups
        .finalize()
        .into_iter()
        .map(|(_, group)| format_group(&group))
        .collect();
    sequence(records)
}

pub fn write_records(records: &[FormattedRecord], writer: &mut DbWriter) -> Result<()> {
    for record in records {
        writer.write_record(record.assignment_id, &record.text)?;
    }
    Ok(())
}
