use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::libs::aln::AlnLines;
use crate::libs::complex::{merge, Accumulator};
use crate::libs::db::{DbReader, HeaderDb};
use crate::libs::error::{ReportError, Result};
use crate::libs::lookup::{ChainKey, ComplexId, MembershipIndex};

/// Raw alignment lines of one query chain.
pub trait AlignmentStore {
    fn entry(&self, chain_key: ChainKey) -> Option<&[u8]>;
}

/// Chain key to `<complex>_<chain>` identifier.
pub trait HeaderLookup {
    fn identifier(&self, key: u32) -> Option<String>;
}

impl AlignmentStore for DbReader {
    fn entry(&self, chain_key: ChainKey) -> Option<&[u8]> {
        self.get(chain_key)
    }
}

impl HeaderLookup for HeaderDb {
    fn identifier(&self, key: u32) -> Option<String> {
        HeaderDb::identifier(self, key)
    }
}

#[derive(Debug, Clone)]
pub struct PassOptions {
    pub parallel: usize,
    pub batch: usize,
    /// Skipped malformed records tolerated before the run aborts;
    /// `None` for no limit
    pub max_errors: Option<usize>,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            parallel: 1,
            batch: 10,
            max_errors: None,
        }
    }
}

#[derive(Debug)]
pub struct PassOutput {
    pub groups: Accumulator,
    pub format_errors: usize,
}

/// Number of workers actually started.
pub fn worker_count(requested: usize, n_entries: usize) -> usize {
    requested.min(n_entries).max(1)
}

/// Runs every query complex of `index` through private per-batch
/// accumulators on a pool of `opts.parallel` threads and merges them.
///
/// The batch partition depends only on `opts.batch`, so the merged group
/// order is the same for any number of workers.
pub fn aggregate<A, Q, T>(
    index: &MembershipIndex,
    alignments: &A,
    q_headers: &Q,
    t_headers: &T,
    n_entries: usize,
    opts: &PassOptions,
) -> Result<PassOutput>
where
    A: AlignmentStore + Sync + ?Sized,
    Q: HeaderLookup + Sync + ?Sized,
    T: HeaderLookup + Sync + ?Sized,
{
    let threads = worker_count(opts.parallel, n_entries);
    let batch = opts.batch.max(1);
    let errors = AtomicUsize::new(0);

    log::info!(
        "Processing {} query complexes with {} worker(s), batch size {}",
        index.len(),
        threads,
        batch
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ReportError::Setup(format!("could not start worker pool: {}", e)))?;

    let parts: Vec<Accumulator> = pool.install(|| {
        index
            .complex_ids
            .par_chunks(batch)
            .map(|complexes| {
                process_batch(
                    complexes,
                    index,
                    alignments,
                    q_headers,
                    t_headers,
                    opts.max_errors,
                    &errors,
                )
            })
            .collect::<Result<Vec<_>>>()
    })?;

    let groups = merge(parts)?;
    let format_errors = errors.into_inner();
    if format_errors > 0 {
        log::warn!("Skipped {} malformed record(s)", format_errors);
    }

    Ok(PassOutput {
        groups,
        format_errors,
    })
}

fn process_batch<A, Q, T>(
    complexes: &[ComplexId],
    index: &MembershipIndex,
    alignments: &A,
    q_headers: &Q,
    t_headers: &T,
    max_errors: Option<usize>,
    errors: &AtomicUsize,
) -> Result<Accumulator>
where
    A: AlignmentStore + ?Sized,
    Q: HeaderLookup + ?Sized,
    T: HeaderLookup + ?Sized,
{
    let mut acc = Accumulator::new();

    for &complex_id in complexes {
        for &chain_key in index.chains(complex_id) {
            let data = match alignments.entry(chain_key) {
                Some(data) => data,
                None => {
                    log::debug!("No alignments for chain key {}", chain_key);
                    continue;
                }
            };

            let query_id = match q_headers.identifier(chain_key) {
                Some(id) => id,
                None => {
                    tolerate(
                        ReportError::Format(format!("no header for query chain key {}", chain_key)),
                        max_errors,
                        errors,
                    )?;
                    continue;
                }
            };

            let text = String::from_utf8_lossy(data);
            for parsed in AlnLines::new(&text) {
                let ingested = parsed.and_then(|entry| {
                    let target_id = t_headers.identifier(entry.target_key).ok_or_else(|| {
                        ReportError::Format(format!(
                            "no header for target key {}",
                            entry.target_key
                        ))
                    })?;
                    acc.ingest(complex_id, &entry, &query_id, &target_id)
                });

                if let Err(err) = ingested {
                    tolerate(err, max_errors, errors)?;
                }
            }
        }
    }

    Ok(acc)
}

// Format errors are counted and skipped until the limit is passed; anything
// else ends the run.
fn tolerate(err: ReportError, max_errors: Option<usize>, errors: &AtomicUsize) -> Result<()> {
    if !err.is_format() {
        return Err(err);
    }

    let seen = errors.fetch_add(1, Ordering::Relaxed) + 1;
    match max_errors {
        Some(max) if seen > max => {
            log::error!("More than {} malformed record(s), aborting", max);
            Err(err)
        }
        _ => {
            log::warn!("{}; record skipped", err);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::report;
    use std::collections::HashMap;

    struct Store(HashMap<u32, String>);

    impl AlignmentStore for Store {
        fn entry(&self, chain_key: ChainKey) -> Option<&[u8]> {
            self.0.get(&chain_key).map(|s| s.as_bytes())
        }
    }

    impl HeaderLookup for Store {
        fn identifier(&self, key: u32) -> Option<String> {
            self.0.get(&key).cloned()
        }
    }

    fn line(target: u32, qtm: f64, ttm: f64, ass: u32) -> String {
        format!(
            "{}\t100\t0.900\t1e-10\t0\t99\t100\t0\t99\t100\t100M\t{}\t{}\trot{}\ttrans{}\t{}\n",
            target, qtm, ttm, ass, ass, ass
        )
    }

    // Query complexes Q0..Qn, each with two chains A and B. Every chain aligns
    // to target complex T with assignment id (n - i) so sorting matters.
    fn fixture(n: u32) -> (MembershipIndex, Store, Store, Store) {
        let mut index = MembershipIndex::new();
        let mut alignments = HashMap::new();
        let mut q_headers = HashMap::new();
        let mut t_headers = HashMap::new();
        t_headers.insert(100, "T_X".to_string());
        t_headers.insert(101, "T_Y".to_string());

        for i in 0..n {
            for (j, chain) in ["A", "B"].iter().enumerate() {
                let key = i * 2 + j as u32;
                index.insert(key, i);
                q_headers.insert(key, format!("Q{}_{}", i, chain));
                alignments.insert(key, line(100 + j as u32, 0.8, 0.7, (n - i) % 5));
            }
        }

        (index, Store(alignments), Store(q_headers), Store(t_headers))
    }

    fn render(out: PassOutput) -> String {
        report::render(out.groups).into_iter().map(|r| r.text).collect()
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(8, 3), 3);
        assert_eq!(worker_count(2, 100), 2);
        assert_eq!(worker_count(4, 0), 1);
        assert_eq!(worker_count(0, 5), 1);
    }

    #[test]
    fn test_workers_do_not_change_output() {
        let (index, aln, qh, th) = fixture(57);
        let mut outputs = vec![];
        for parallel in [1, 2, 4, 8] {
            let opts = PassOptions {
                parallel,
                ..Default::default()
            };
            let out = aggregate(&index, &aln, &qh, &th, 114, &opts).unwrap();
            assert_eq!(out.groups.len(), 57);
            outputs.push(render(out));
        }
        assert!(outputs.windows(2).all(|w| w[0] == w[1]));

        let ids: Vec<u32> = outputs[0]
            .lines()
            .map(|l| l.rsplit('\t').next().unwrap().parse().unwrap())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_missing_chain_is_skipped() {
        let (index, mut aln, qh, th) = fixture(2);
        // complex 0 loses chain A, complex 1 loses both chains
        aln.0.remove(&0);
        aln.0.remove(&2);
        aln.0.remove(&3);

        let out = aggregate(&index, &aln, &qh, &th, 1, &PassOptions::default()).unwrap();
        assert_eq!(out.format_errors, 0);
        let groups = out.groups.finalize();
        assert_eq!(groups.len(), 1);
        let (ass, g) = &groups[0];
        assert_eq!((*ass, g.query_complex.as_str()), (2, "Q0"));
        assert_eq!(g.query_chains, vec!["B"]);
        assert_eq!(g.target_chains, vec!["Y"]);
    }

    #[test]
    fn test_format_errors() {
        let (index, mut aln, qh, mut th) = fixture(1);
        aln.0.get_mut(&0).unwrap().push_str("not an alignment\n");
        th.0.insert(101, "nodelimiter".to_string());

        let out = aggregate(&index, &aln, &qh, &th, 2, &PassOptions::default()).unwrap();
        assert_eq!(out.format_errors, 2);
        let groups = out.groups.finalize();
        assert_eq!(groups[0].1.query_chains, vec!["A"]);

        // two bad records fit under a limit of two, not under one
        let limited = |max| PassOptions {
            max_errors: Some(max),
            ..Default::default()
        };
        let out = aggregate(&index, &aln, &qh, &th, 2, &limited(2)).unwrap();
        assert_eq!(out.format_errors, 2);

        let err = aggregate(&index, &aln, &qh, &th, 2, &limited(1)).unwrap_err();
        assert!(err.is_format());
        let err = aggregate(&index, &aln, &qh, &th, 2, &limited(0)).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_duplicate_complex_name_is_reported() {
        let (mut index, mut aln, mut qh, th) = fixture(1);
        // complex 1 reuses the name of complex 0
        index.insert(10, 1);
        qh.0.insert(10, "Q0_C".to_string());
        aln.0.insert(10, line(100, 0.8, 0.7, 1));

        // same outcome whether both complexes share a batch or not
        for batch in [1, 2, 10] {
            for parallel in [1, 4] {
                let opts = PassOptions {
                    parallel,
                    batch,
                    ..Default::default()
                };
                let err = aggregate(&index, &aln, &qh, &th, 3, &opts).unwrap_err();
                match err {
                    ReportError::KeyCollision {
                        assignment_id,
                        complex_name,
                        first,
                        second,
                    } => {
                        assert_eq!(assignment_id, 1);
                        assert_eq!(complex_name, "Q0");
                        assert_eq!((first, second), (0, 1));
                    }
                    other => panic!("expected a collision, got {:?}", other),
                }
            }
        }

        // a name collision is not a format error and ignores the error limit
        let err = aggregate(&index, &aln, &qh, &th, 3, &PassOptions::default()).unwrap_err();
        assert!(!err.is_format());
    }
}
