use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
};

use egtb::{
    filesystem::{Filesystem, RandomAccessFile, ReadHint},
    write_emd, Color, Composition, Enumerator, IndexCalculator, InitError, Outcome, Position,
    RawSide, Tablebase,
};

#[derive(Default)]
struct State {
    reads: AtomicUsize,
    broken: AtomicBool,
}

#[derive(Default)]
struct MemoryFilesystem {
    dirs: Vec<PathBuf>,
    files: HashMap<PathBuf, Arc<[u8]>>,
    state: Arc<State>,
}

impl MemoryFilesystem {
    fn add(&mut self, path: &str, data: Vec<u8>) {
        let path = PathBuf::from(path);
        if let Some(dir) = path.parent() {
            if !self.dirs.iter().any(|d| d == dir) {
                self.dirs.push(dir.to_owned());
            }
        }
        self.files.insert(path, data.into());
    }
}

impl Filesystem for MemoryFilesystem {
    fn regular_file_size(&self, path: &Path) -> io::Result<u64> {
        self.files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.dirs.iter().any(|d| d == path) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(self
            .files
            .keys()
            .filter(|file| file.parent() == Some(path))
            .cloned()
            .collect())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn RandomAccessFile>> {
        if self.state.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "broken disk"));
        }
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        Ok(Box::new(MemoryFile {
            data,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryFile {
    data: Arc<[u8]>,
    state: Arc<State>,
}

impl RandomAccessFile for MemoryFile {
    fn read_at(&self, _hint: ReadHint, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if self.state.broken.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "broken disk"));
        }
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        let data = self.data.get(pos as usize..).unwrap_or_default();
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

fn narrow(index: u64) -> i8 {
    (index % 100) as i8 - 50
}

fn wide(index: u64) -> i16 {
    (index % 1000) as i16 - 500
}

fn calculator(name: &str, side: Color) -> IndexCalculator {
    let composition: Composition = name.parse().expect("composition");
    IndexCalculator::new(composition, side, &Enumerator::new())
}

fn narrow_table(name: &str, side: Color) -> Vec<u8> {
    (0..calculator(name, side).size()).map(|i| narrow(i) as u8).collect()
}

fn wide_table(name: &str, side: Color) -> Vec<u8> {
    (0..calculator(name, side).size())
        .flat_map(|i| wide(i).to_le_bytes())
        .collect()
}

fn emd(data: &[u8], block_size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_emd(data, block_size, &mut out).expect("write emd");
    out
}

fn krk_filesystem() -> MemoryFilesystem {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/krk.nbw", narrow_table("krk", Color::White));
    fs.add("/tb/krk.nbb", narrow_table("krk", Color::Black));
    fs
}

fn expected_narrow(calc: &IndexCalculator, pos: &Position) -> Outcome {
    Outcome::from_byte(narrow(calc.index(pos).expect("indexable")))
}

#[test]
fn test_no_tables() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(MemoryFilesystem::default()));
    assert_eq!(tablebase.initialize_tables(["/missing"]).expect("init"), 0);
    assert_eq!(tablebase.max_pieces(), 0);

    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
}

#[test]
fn test_probe_both_sides() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    assert_eq!(tablebase.initialize_tables(["/missing", "/tb"]).expect("init"), 3);

    let id = tablebase.table_id(&"krk".parse().expect("composition")).expect("known");
    assert!(tablebase.has_table(id, Color::White));
    assert!(tablebase.has_table(id, Color::Black));

    for side in Color::ALL {
        let calc = calculator("krk", side);
        for index in (0..calc.size()).step_by(37) {
            let pos = calc.unindex(index).expect("position");
            assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos), "{pos}");
            assert_eq!(
                tablebase.probe_outcome(id, side, calc.index(&pos).expect("indexable")),
                expected_narrow(&calc, &pos)
            );
        }
    }

    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));

    let stats = tablebase.cache_stats();
    assert!(stats.misses > 0);
    assert!(stats.hits > 0);
    assert_eq!(stats.io_errors, 0);
}

#[test]
fn test_probe_mirrored() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    tablebase.initialize_tables(["/tb"]).expect("init");

    // Black has the rook: looked up in the krk table with colors swapped.
    let pos: Position = "r3k3/8/8/8/8/8/8/4K3 w - -".parse().expect("valid");
    assert!(tablebase.lookup(&pos.composition().count_vector()) < 0);
    let calc = calculator("krk", Color::Black);
    assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos.inverted()));

    let pos: Position = "r3k3/8/8/8/8/8/8/4K3 b - -".parse().expect("valid");
    let calc = calculator("krk", Color::White);
    assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos.inverted()));
}

#[test]
fn test_probe_symmetric() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kpkp.nbw", narrow_table("kpkp", Color::White));
    // Never looked for.
    fs.add("/tb/kpkp.nbb", vec![0; 3]);
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    assert_eq!(tablebase.initialize_tables(["/tb"]).expect("init"), 4);

    let calc = calculator("kpkp", Color::White);
    let pos: Position = "4k3/8/8/3pP3/8/8/8/4K3 w - d6".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos));

    // Black to move is answered from the white to move table.
    let pos: Position = "4k3/8/8/8/3pP3/8/8/4K3 b - e3".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos.inverted()));
}

#[test]
fn test_size_mismatch() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kqk.nbw", vec![0; 1000]);
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    assert!(matches!(
        tablebase.initialize_tables(["/tb"]),
        Err(InitError::SizeMismatch {
            expected: 25623,
            actual: 1000,
            ..
        })
    ));
}

#[test]
fn test_wide_table() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kqk.nbw", wide_table("kqk", Color::White));
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    assert_eq!(tablebase.initialize_tables(["/tb"]).expect("init"), 3);

    let calc = calculator("kqk", Color::White);
    for index in (0..calc.size()).step_by(11) {
        let pos = calc.unindex(index).expect("position");
        let expected = Outcome::from_score16(wide(calc.index(&pos).expect("indexable")));
        assert_eq!(tablebase.probe(&pos), expected, "{pos}");
    }

    // Not installed.
    let pos: Position = "4k3/8/8/8/8/8/8/Q3K3 b - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
}

#[test]
fn test_compressed_tables() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kpk.nbw.emd", emd(&narrow_table("kpk", Color::White), 4096));
    // 8.3 name.
    fs.add("/tb/kpknbb.emd", emd(&narrow_table("kpk", Color::Black), 4096));
    let mut tablebase = Tablebase::builder()
        .filesystem(Arc::new(fs))
        .chunk_size(4096)
        .cache_capacity(64 * 1024)
        .build();
    assert_eq!(tablebase.initialize_tables(["/tb"]).expect("init"), 3);

    for side in Color::ALL {
        let calc = calculator("kpk", side);
        for index in (0..calc.size()).step_by(101) {
            let pos = calc.unindex(index).expect("position");
            assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos), "{pos}");
        }
    }
    assert!(tablebase.cache_stats().evictions > 0);
}

#[test]
fn test_block_size_mismatch() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kpk.nbw.emd", emd(&narrow_table("kpk", Color::White), 1024));
    let mut tablebase = Tablebase::builder()
        .filesystem(Arc::new(fs))
        .chunk_size(4096)
        .build();
    assert!(matches!(
        tablebase.initialize_tables(["/tb"]),
        Err(InitError::BlockSize {
            block_size: 1024,
            chunk_size: 4096,
            ..
        })
    ));
}

#[test]
fn test_first_directory_wins() {
    let mut fs = MemoryFilesystem::default();
    fs.add("/a/krk.nbw", narrow_table("krk", Color::White));
    fs.add("/b/krk.nbw", vec![0; 27030]);
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    tablebase.initialize_tables(["/a", "/b"]).expect("init");

    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));
}

#[test]
fn test_max_pieces() {
    let mut fs = krk_filesystem();
    fs.add("/tb/kqkr.nbw", narrow_table("kqkr", Color::White));
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    assert_eq!(tablebase.initialize_tables(["/tb"]).expect("init"), 4);
    assert_eq!(tablebase.max_pieces(), 4);
}

#[test]
fn test_unregistered() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    tablebase.initialize_tables(["/tb"]).expect("init");

    // Six pieces besides the kings.
    let counts = [0, 0, 0, 3, 0, 0, 0, 0, 3, 0];
    assert_eq!(tablebase.lookup(&counts), 0);

    let pos: Position = "4k3/8/8/8/8/8/8/Q3K3 w - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);

    let id = tablebase.table_id(&"krk".parse().expect("composition")).expect("known");
    assert_eq!(tablebase.probe_outcome(id, Color::White, 27030), Outcome::Broken);
    assert_eq!(tablebase.probe_outcome(0, Color::White, 0), Outcome::Broken);
    assert_eq!(tablebase.probe_outcome(1000, Color::White, 0), Outcome::Broken);
}

#[test]
fn test_probe_raw() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    tablebase.initialize_tables(["/tb"]).expect("init");

    // K e1, R a1 against k e8.
    let white = RawSide {
        king: 4,
        counts: [0, 0, 0, 1, 0],
        squares: &[0],
    };
    let black = RawSide {
        king: 60,
        counts: [0; 5],
        squares: &[],
    };
    assert_eq!(
        tablebase.probe_raw(Color::White, white, black, None),
        Outcome::from_byte(narrow(11816))
    );

    // Mismatched counts and squares.
    let bad = RawSide {
        squares: &[0, 1],
        ..white
    };
    assert_eq!(tablebase.probe_raw(Color::White, bad, black, None), Outcome::Broken);

    // Too many pieces.
    let many = RawSide {
        counts: [0, 0, 0, 3, 0],
        squares: &[0, 1, 2],
        ..white
    };
    let more = RawSide {
        counts: [0, 0, 0, 3, 0],
        squares: &[61, 62, 63],
        ..black
    };
    assert_eq!(tablebase.probe_raw(Color::White, many, more, None), Outcome::Broken);
}

#[test]
fn test_io_error_marks_unavailable() {
    let fs = krk_filesystem();
    let state = Arc::clone(&fs.state);
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    tablebase.initialize_tables(["/tb"]).expect("init");

    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    state.broken.store(true, Ordering::SeqCst);
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
    assert_eq!(tablebase.cache_stats().io_errors, 1);

    // The table stays unavailable.
    state.broken.store(false, Ordering::SeqCst);
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
    assert_eq!(tablebase.cache_stats().io_errors, 1);

    // The other side is unaffected.
    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 b - -".parse().expect("valid");
    assert_ne!(tablebase.probe(&pos), Outcome::Broken);
}

/// Offset of the first block and number of blocks of an `emd` file.
fn emd_layout(data: &[u8]) -> (usize, usize) {
    let blocks = u32::from_le_bytes(data[16..20].try_into().expect("header")) as usize;
    let first = u64::from_le_bytes(data[20..28].try_into().expect("offset")) as usize;
    (first, blocks)
}

#[test]
fn test_corrupted_block_marks_unavailable() {
    let mut data = emd(&narrow_table("kpk", Color::White), 4096);
    let (first, _) = emd_layout(&data);
    // Damage the checksum of the first block.
    data[first] ^= 0xff;

    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kpk.nbw.emd", data);
    fs.add("/tb/kpk.nbb", narrow_table("kpk", Color::Black));
    let mut tablebase = Tablebase::builder()
        .filesystem(Arc::new(fs))
        .chunk_size(4096)
        .build();
    assert_eq!(tablebase.initialize_tables(["/tb"]).expect("init"), 3);

    let calc = calculator("kpk", Color::White);
    let pos = calc.unindex(0).expect("position");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
    assert_eq!(tablebase.cache_stats().io_errors, 1);

    // Intact blocks of the same table are not read any more.
    let pos = calc.unindex(5 * 4096).expect("position");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
    let stats = tablebase.cache_stats();
    assert_eq!(stats.io_errors, 1);
    assert_eq!(stats.reads, 1);

    let calc = calculator("kpk", Color::Black);
    let pos = calc.unindex(0).expect("position");
    assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos));
}

#[test]
fn test_corrupted_block_offsets() {
    let mut data = emd(&narrow_table("kpk", Color::White), 4096);
    let (_, blocks) = emd_layout(&data);
    // Point the end of the last block far beyond the end of the file.
    let last = 20 + 8 * blocks;
    data[last..last + 8].copy_from_slice(&(1u64 << 62).to_le_bytes());

    let mut fs = MemoryFilesystem::default();
    fs.add("/tb/kpk.nbw.emd", data);
    let mut tablebase = Tablebase::builder()
        .filesystem(Arc::new(fs))
        .chunk_size(4096)
        .build();
    assert!(matches!(
        tablebase.initialize_tables(["/tb"]),
        Err(InitError::Corrupted { .. })
    ));

    let pos = calculator("kpk", Color::White).unindex(0).expect("position");
    assert_eq!(tablebase.probe(&pos), Outcome::Broken);
}

#[test]
fn test_load_table_to_memory() {
    let fs = krk_filesystem();
    let state = Arc::clone(&fs.state);
    let mut tablebase = Tablebase::with_filesystem(Arc::new(fs));
    tablebase.initialize_tables(["/tb"]).expect("init");

    let id = tablebase.table_id(&"krk".parse().expect("composition")).expect("known");
    tablebase.load_table_to_memory(id, Color::White).expect("load");
    assert!(tablebase.is_table_in_memory(id, Color::White));
    let reads = state.reads.load(Ordering::SeqCst);

    let calc = calculator("krk", Color::White);
    for index in (0..calc.size()).step_by(7) {
        let pos = calc.unindex(index).expect("position");
        assert_eq!(tablebase.probe(&pos), expected_narrow(&calc, &pos), "{pos}");
    }
    assert_eq!(state.reads.load(Ordering::SeqCst), reads);
    assert_eq!(tablebase.cache_stats().misses, 0);

    assert!(tablebase.unload_table(id, Color::White));
    assert!(!tablebase.unload_table(id, Color::White));
    assert!(tablebase.load_table_to_memory(id + 1, Color::White).is_err());
}

#[test]
fn test_set_cache_capacity() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    tablebase.initialize_tables(["/tb"]).expect("init");
    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");

    // Without a cache every probe reads from the file.
    tablebase.set_cache_capacity(0);
    for _ in 0..3 {
        assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));
    }
    let stats = tablebase.cache_stats();
    assert_eq!(stats.reads, 3);
    assert_eq!(stats.hits, 0);

    tablebase.set_cache_capacity(1 << 20);
    for _ in 0..3 {
        assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));
    }
    let stats = tablebase.cache_stats();
    assert_eq!(stats.reads, 1);
    assert_eq!(stats.hits, 2);
}

#[test]
fn test_concurrent_probes() {
    let mut fs = krk_filesystem();
    fs.add("/tb/kpk.nbw", narrow_table("kpk", Color::White));
    fs.add("/tb/kpk.nbb", narrow_table("kpk", Color::Black));
    let mut tablebase = Tablebase::builder()
        .filesystem(Arc::new(fs))
        .chunk_size(512)
        .cache_capacity(8 * (512 + egtb::DECODE_HEADROOM))
        .buckets(2)
        .build();
    tablebase.initialize_tables(["/tb"]).expect("init");
    let tablebase = Arc::new(tablebase);

    let calculators: Arc<Vec<IndexCalculator>> = Arc::new(
        ["krk", "kpk"]
            .into_iter()
            .flat_map(|name| Color::ALL.map(|side| calculator(name, side)))
            .collect(),
    );

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let tablebase = Arc::clone(&tablebase);
            let calculators = Arc::clone(&calculators);
            thread::spawn(move || {
                let mut seed = t + 1;
                for _ in 0..2000 {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let calc = &calculators[(seed >> 60) as usize % calculators.len()];
                    let pos = calc.unindex((seed >> 16) % calc.size()).expect("position");
                    assert_eq!(tablebase.probe(&pos), expected_narrow(calc, &pos), "{pos}");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("no panic");
    }

    let stats = tablebase.cache_stats();
    assert_eq!(stats.hits + stats.misses, 8 * 2000);
    assert_eq!(stats.io_errors, 0);
    assert!(stats.evictions > 0);
}

#[test]
fn test_concurrent_probes_same_entry() {
    let mut tablebase = Tablebase::with_filesystem(Arc::new(krk_filesystem()));
    tablebase.initialize_tables(["/tb"]).expect("init");
    let tablebase = Arc::new(tablebase);

    const THREADS: usize = 8;
    const PROBES: usize = 500;
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let tablebase = Arc::clone(&tablebase);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
                barrier.wait();
                for _ in 0..PROBES {
                    assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("no panic");
    }

    // Every thread misses at most once, before its own fill is inserted.
    let stats = tablebase.cache_stats();
    assert_eq!(stats.hits + stats.misses, (THREADS * PROBES) as u64);
    assert!((1..=THREADS as u64).contains(&stats.misses));
    assert_eq!(stats.reads, stats.misses);
    assert_eq!(stats.io_errors, 0);
    assert_eq!(stats.evictions, 0);
}

#[cfg(feature = "mmap")]
#[test]
fn test_map_table() {
    let dir = std::env::temp_dir().join(format!("egtb-map-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create dir");
    std::fs::write(dir.join("krk.nbw"), narrow_table("krk", Color::White)).expect("write");
    std::fs::write(dir.join("krk.nbb"), narrow_table("krk", Color::Black)).expect("write");

    let mut tablebase = Tablebase::new();
    assert_eq!(tablebase.initialize_tables([&dir]).expect("init"), 3);
    let id = tablebase.table_id(&"krk".parse().expect("composition")).expect("known");

    tablebase.map_table(id, Color::White).expect("map");
    assert!(tablebase.is_table_in_memory(id, Color::White));
    let pos: Position = "4k3/8/8/8/8/8/8/R3K3 w - -".parse().expect("valid");
    assert_eq!(tablebase.probe(&pos), Outcome::from_byte(narrow(11816)));
    assert_eq!(tablebase.cache_stats().misses, 0);
    assert!(tablebase.unload_table(id, Color::White));

    std::fs::remove_dir_all(&dir).expect("remove dir");
}
