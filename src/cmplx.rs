extern crate clap;
use clap::*;

mod cmd_cmplx;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let app = Command::new("cmplx")
        .version(crate_version!())
        .author(crate_authors!())
        .about("`cmplx` - Complex-level structural alignment reports")
        .propagate_version(true)
        .arg_required_else_help(true)
        .color(ColorChoice::Auto)
        .subcommand(cmd_cmplx::report::make_subcommand())
        .after_help(
            r###"Subcommands:

* report - Merge chain alignments into one line per complex pair

Set RUST_LOG=debug for per-chain messages, RUST_LOG=warn to silence progress.

"###,
        );

    // Check which subcommand the user ran...
    match app.get_matches().subcommand() {
        Some(("report", sub_matches)) => cmd_cmplx::report::execute(sub_matches),
        _ => unreachable!(),
    }?;

    Ok(())
}
