use std::{error::Error, path::PathBuf};

use clap::Parser;
use egtb::{Position, Tablebase};

#[derive(Debug, Parser)]
struct Opt {
    /// Tablebase directories
    #[arg(long = "path")]
    path: Vec<PathBuf>,
    /// Cache capacity in bytes
    #[arg(long = "cache", default_value_t = 8 * 1024 * 1024)]
    cache: usize,
    /// Prints the result only
    #[arg(long = "test")]
    test: bool,
    /// Positions to probe
    fens: Vec<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();

    let mut tablebase = Tablebase::builder().cache_capacity(opt.cache).build();
    let max_pieces = tablebase.initialize_tables(&opt.path)?;
    if !opt.test {
        println!("tables with up to {max_pieces} pieces");
    }

    for fen in &opt.fens {
        let pos: Position = fen.parse()?;
        let outcome = tablebase.probe(&pos);
        if opt.test {
            println!("{outcome}");
        } else {
            println!("{pos} ({}): {outcome}", pos.composition());
        }
    }

    if !opt.test {
        println!("{:?}", tablebase.cache_stats());
    }
    Ok(())
}
