use anyhow::Context;
use clap::*;

use cmplx::libs::db::{DbReader, DbWriter, HeaderDb};
use cmplx::libs::lookup::MembershipIndex;
use cmplx::libs::pass::{aggregate, PassOptions};
use cmplx::libs::report;

// Create clap subcommand arguments
pub fn make_subcommand() -> Command {
    Command::new("report")
        .about("Summarizes chain-level alignments as one line per complex pair")
        .after_help(
            r###"
Groups the chain-to-chain alignments of every query complex by assignment id
and writes one tab-separated line per (assignment, query complex):

    qComplex tComplex qChains tChains qTMscore tTMscore rotation translation assId

Chains are listed in the order they were found, comma-separated, and the two
chain lists correspond position by position. Lines are sorted by assignment id.

Inputs:
* <query-db>.lookup    chainKey, name, complexId
* <query-db>_h         query headers (and <target-db>_h for targets)
* <aln-db>             alignment lines keyed by query chain key
Every store comes with a `.index` file of key, offset, length.

Notes:
* Chains without alignments are skipped silently
* Malformed lines or identifiers are reported and skipped; the run aborts
  once more than --max-errors of them were seen (--strict means 0)
* Two complexes of the lookup file sharing a name abort the run
* The output is identical for any --parallel value
* Without --db-output only the flat file is kept

Examples:
1. Write the report:
   cmplx report qdb tdb aln report.tsv

2. Use 8 threads and keep the output index:
   cmplx report qdb tdb aln report --parallel 8 --db-output

"###,
        )
        .arg(
            Arg::new("query_db")
                .required(true)
                .index(1)
                .help("Query database"),
        )
        .arg(
            Arg::new("target_db")
                .required(true)
                .index(2)
                .help("Target database"),
        )
        .arg(
            Arg::new("aln_db")
                .required(true)
                .index(3)
                .help("Alignment database"),
        )
        .arg(
            Arg::new("outfile")
                .required(true)
                .index(4)
                .help("Output file"),
        )
        .arg(
            Arg::new("parallel")
                .long("parallel")
                .short('p')
                .value_parser(value_parser!(usize))
                .num_args(1)
                .default_value("1")
                .help("Number of threads for parallel processing"),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .default_value("10")
                .help("Query complexes handed to a worker at a time"),
        )
        .arg(
            Arg::new("db_output")
                .long("db-output")
                .action(ArgAction::SetTrue)
                .help("Keep the output index next to the report"),
        )
        .arg(
            Arg::new("preload")
                .long("preload")
                .action(ArgAction::SetTrue)
                .help("Read databases into memory instead of mapping them"),
        )
        .arg(
            Arg::new("max_errors")
                .long("max-errors")
                .value_parser(value_parser!(usize))
                .num_args(1)
                .conflicts_with("strict")
                .help("Abort after skipping more than this many malformed records"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Abort on the first malformed record, same as --max-errors 0"),
        )
}

#[derive(Debug, Clone)]
struct ReportOptions {
    query_db: String,
    target_db: String,
    aln_db: String,
    outfile: String,
    db_output: bool,
    preload: bool,
    pass: PassOptions,
}

impl ReportOptions {
    fn from_matches(args: &ArgMatches) -> anyhow::Result<Self> {
        let path = |name: &str| -> anyhow::Result<String> {
            args.get_one::<String>(name)
                .cloned()
                .with_context(|| format!("missing argument <{}>", name))
        };

        Ok(Self {
            query_db: path("query_db")?,
            target_db: path("target_db")?,
            aln_db: path("aln_db")?,
            outfile: path("outfile")?,
            db_output: args.get_flag("db_output"),
            preload: args.get_flag("preload"),
            pass: PassOptions {
                parallel: args.get_one::<usize>("parallel").copied().unwrap_or(1),
                batch: args.get_one::<usize>("batch").copied().unwrap_or(10),
                max_errors: if args.get_flag("strict") {
                    Some(0)
                } else {
                    args.get_one::<usize>("max_errors").copied()
                },
            },
        })
    }
}

// command implementation
pub fn execute(args: &ArgMatches) -> anyhow::Result<()> {
    //----------------------------
    // Args
    //----------------------------
    let opt = ReportOptions::from_matches(args)?;

    //----------------------------
    // Open inputs
    //----------------------------
    let lookup_file = format!("{}.lookup", opt.query_db);
    let index = MembershipIndex::from_path(&lookup_file)
        .with_context(|| format!("loading complex membership from {}", lookup_file))?;

    let alignments = DbReader::open(&opt.aln_db, opt.preload)
        .with_context(|| format!("opening alignments {}", opt.aln_db))?;

    let q_headers = HeaderDb::open(&opt.query_db, opt.preload)
        .with_context(|| format!("opening headers of {}", opt.query_db))?;
    let t_headers_own = if opt.target_db == opt.query_db {
        None
    } else {
        Some(
            HeaderDb::open(&opt.target_db, opt.preload)
                .with_context(|| format!("opening headers of {}", opt.target_db))?,
        )
    };
    let t_headers = t_headers_own.as_ref().unwrap_or(&q_headers);

    let mut writer = DbWriter::create(&opt.outfile)
        .with_context(|| format!("creating output {}", opt.outfile))?;

    log::info!(
        "{} query complexes, {} alignment entries",
        index.len(),
        alignments.len()
    );

    //----------------------------
    // Operating
    //----------------------------
    let out = aggregate(
        &index,
        &alignments,
        &q_headers,
        t_headers,
        alignments.len(),
        &opt.pass,
    )?;

    //----------------------------
    // Output
    //----------------------------
    let records = report::render(out.groups);
    report::write_records(&records, &mut writer)?;
    let written = writer.finish(opt.db_output)?;

    log::info!("Wrote {} complex alignments to {}", written, opt.outfile);

    Ok(())
}
