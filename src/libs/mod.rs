pub mod aln;
pub mod complex;
pub mod db;
pub mod error;
pub mod ident;
pub mod io;
pub mod lookup;
pub mod pass;
pub mod report;
