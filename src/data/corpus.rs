// --- File: src/data/corpus.rs ---

//! Streaming of sharded text corpora.

use super::{DataError, DataResult};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

/// Anything that can stream lines of text.
pub trait TextCorpus {
    type Stream: Iterator<Item = io::Result<String>>;
    fn stream(&self) -> io::Result<Self::Stream>;
}

/// A dataset split on disk: the shards `<path>/<name>/<split>*.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSource {
    pub path: PathBuf,
    pub name: String,
    pub split: String,
}

impl CorpusSource {
    /// Shard files of this split, sorted by file name.
    pub fn shards(&self) -> DataResult<Vec<PathBuf>> {
        let dir = self.path.join(&self.name);
        let mut shards = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let matches = path.is_file()
                && path.extension().map_or(false, |e| e == "txt")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.starts_with(&self.split));
            if matches {
                shards.push(path);
            }
        }
        if shards.is_empty() {
            return Err(DataError::NoShards { dir, pattern: format!("{}*.txt", self.split) });
        }
        shards.sort();
        Ok(shards)
    }

    pub fn open(&self) -> DataResult<StreamingCorpus> {
        Ok(StreamingCorpus::new(self.shards()?)?)
    }
}

/// Shards read one after another, one non-blank line per item.
#[derive(Clone, Debug)]
pub struct StreamingCorpus {
    shards: Vec<PathBuf>,
}

impl StreamingCorpus {
    pub fn new(shards: Vec<PathBuf>) -> io::Result<Self> {
        if shards.is_empty() {
            let msg = "expected at least one shard for corpus";
            return Err(io::Error::new(io::ErrorKind::InvalidInput, msg));
        }
        Ok(Self { shards })
    }

    pub fn shard_paths(&self) -> &[PathBuf] {
        &self.shards
    }
}

impl TextCorpus for StreamingCorpus {
    type Stream = CorpusStream;

    fn stream(&self) -> io::Result<Self::Stream> {
        info!("streaming corpus of {} shard(s)", self.shards.len());
        Ok(CorpusStream { shards: self.shards.clone(), next_shard: 0, current_reader: None })
    }
}

pub struct CorpusStream {
    shards: Vec<PathBuf>,
    next_shard: usize,
    current_reader: Option<io::Lines<BufReader<File>>>,
}

impl CorpusStream {
    /// Opens the next shard, `None` once every shard has been read.
    fn advance_shard(&mut self) -> Option<io::Result<()>> {
        let path = self.shards.get(self.next_shard)?;
        self.next_shard += 1;
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                let msg = format!("failed to open shard {}: {}", path.display(), err);
                return Some(Err(io::Error::new(err.kind(), msg)));
            }
        };
        debug!("streaming shard {} of {}: {:?}", self.next_shard, self.shards.len(), path);
        self.current_reader = Some(BufReader::new(file).lines());
        Some(Ok(()))
    }
}

impl Iterator for CorpusStream {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current_reader.as_mut() {
                match reader.next() {
                    Some(Ok(line)) if line.trim().is_empty() => continue,
                    Some(item) => return Some(item),
                    None => self.current_reader = None,
                }
            }
            if let Err(err) = self.advance_shard()? {
                return Some(Err(err));
            }
        }
    }
}

/// Approximate shuffle of a stream through a bounded buffer.
///
/// The first `capacity` items fill the buffer. Each later item replaces a
/// uniformly chosen buffered one, which is yielded. Once the source is
/// exhausted the buffer drains in random order.
pub struct ShuffleBuffer<I: Iterator> {
    source: I,
    buffer: Vec<I::Item>,
    capacity: usize,
    rng: StdRng,
    exhausted: bool,
}

impl<I: Iterator> ShuffleBuffer<I> {
    pub fn new(source: I, capacity: usize, seed: u64) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(capacity.min(1 << 16)),
            capacity: capacity.max(1),
            rng: StdRng::seed_from_u64(seed),
            exhausted: false,
        }
    }
}

impl<I: Iterator> Iterator for ShuffleBuffer<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.capacity {
            match self.source.next() {
                Some(item) => self.buffer.push(item),
                None => self.exhausted = true,
            }
        }
        if self.buffer.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..self.buffer.len());
        let incoming = if self.exhausted { None } else { self.source.next() };
        match incoming {
            Some(item) => Some(std::mem::replace(&mut self.buffer[i], item)),
            None => {
                self.exhausted = true;
                Some(self.buffer.swap_remove(i))
            }
        }
    }
}

/// Draws `batch_size` shuffled lines of at least `min_length` chars.
pub fn sample_sequences<C: TextCorpus>(
    corpus: &C,
    batch_size: usize,
    min_length: usize,
    shuffle_window: usize,
    seed: u64,
) -> DataResult<Vec<String>> {
    let mut picked = Vec::with_capacity(batch_size);
    if batch_size == 0 {
        return Ok(picked);
    }
    for line in ShuffleBuffer::new(corpus.stream()?, shuffle_window, seed) {
        let line = line?;
        if line.chars().count() >= min_length {
            picked.push(line);
            if picked.len() == batch_size {
                break;
            }
        }
    }
    if picked.len() < batch_size {
        let found = picked.len();
        return Err(DataError::NotEnoughSequences { wanted: batch_size, found, min_length });
    }
    debug!("sampled {} sequences of at least {} chars", picked.len(), min_length);
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_shard(dir: &std::path::Path, name: &str, lines: &[&str]) {
        let mut f = File::create(dir.join(name)).unwrap();
        for l in lines {
            writeln!(f, "{l}").unwrap();
        }
    }

    fn fixture() -> (tempfile::TempDir, CorpusSource) {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("tiny");
        fs::create_dir(&dir).unwrap();
        write_shard(&dir, "test-01.txt", &["second shard a", "", "second shard b"]);
        write_shard(&dir, "test-00.txt", &["first", "   ", "first shard, longer line"]);
        write_shard(&dir, "train-00.txt", &["train only"]);
        let source = CorpusSource {
            path: root.path().to_path_buf(),
            name: "tiny".into(),
            split: "test".into(),
        };
        (root, source)
    }

    #[test]
    fn shards_are_sorted_and_filtered_by_split() {
        let (_root, source) = fixture();
        let names: Vec<_> = source
            .shards()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["test-00.txt", "test-01.txt"]);

        let missing = CorpusSource { split: "validation".into(), ..source };
        assert!(matches!(missing.shards(), Err(DataError::NoShards { .. })));
    }

    #[test]
    fn stream_skips_blank_lines_across_shards() {
        let (_root, source) = fixture();
        let lines: Vec<_> = source.open().unwrap().stream().unwrap().map(Result::unwrap).collect();
        assert_eq!(
            lines,
            ["first", "first shard, longer line", "second shard a", "second shard b"]
        );
    }

    #[test]
    fn unreadable_shard_is_an_error() {
        let (root, source) = fixture();
        let mut shards = source.shards().unwrap();
        shards.insert(1, root.path().join("tiny").join("test-gone.txt"));
        let corpus = StreamingCorpus::new(shards).unwrap();

        let items: Vec<_> = corpus.stream().unwrap().collect();
        assert_eq!(items[0].as_ref().unwrap(), "first");
        let err = items[2].as_ref().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("test-gone.txt"));
        assert_eq!(items.len(), 5);

        let err = sample_sequences(&corpus, 5, 1, 10, 1472).unwrap_err();
        assert!(matches!(err, DataError::Io(_)));
    }

    #[test]
    fn shuffle_buffer_is_a_seeded_permutation() {
        let a: Vec<_> = ShuffleBuffer::new(0..100, 10, 7).collect();
        let b: Vec<_> = ShuffleBuffer::new(0..100, 10, 7).collect();
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..100).collect::<Vec<_>>());
        assert_ne!(a, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn sampling_filters_short_lines() {
        let (_root, source) = fixture();
        let corpus = source.open().unwrap();
        let picked = sample_sequences(&corpus, 2, 14, 10, 1472).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|l| l.chars().count() >= 14));

        let err = sample_sequences(&corpus, 2, 20, 10, 1472).unwrap_err();
        assert!(matches!(err, DataError::NotEnoughSequences { wanted: 2, found: 1, .. }));
    }
}
