use std::{
    error::Error,
    fs::{self, File},
    io::{BufWriter, Write as _},
    path::PathBuf,
};

use clap::Parser;
use egtb::{write_emd, CacheConfig, COMPRESSED_EXTENSION};

#[derive(Debug, Parser)]
struct Opt {
    /// Block size, must match the chunk size of the probing cache
    #[arg(long = "block-size", default_value_t = CacheConfig::default().chunk_size as u32)]
    block_size: u32,
    /// Uncompressed table files
    tables: Vec<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();

    for path in &opt.tables {
        let data = fs::read(path)?;
        let mut target = path.clone().into_os_string();
        target.push(COMPRESSED_EXTENSION);
        let target = PathBuf::from(target);

        let mut writer = BufWriter::new(File::create(&target)?);
        write_emd(&data, opt.block_size, &mut writer)?;
        writer.flush()?;

        let compressed = fs::metadata(&target)?.len();
        println!(
            "{} -> {} ({} -> {compressed} bytes)",
            path.display(),
            target.display(),
            data.len()
        );
    }
    Ok(())
}
