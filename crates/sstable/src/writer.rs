use bloom::BloomFilter;
use merkle::MerkleTree;
use record::Record;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::format::{IndexEntry, RunPaths};
use crate::{RunInfo, RunOptions, SSTableError};

/// Writes a batch of records to disk as an immutable sorted run.
///
/// The writer is stateless; all work happens inside
/// [`flush`](SSTableWriter::flush).
pub struct SSTableWriter {}

impl SSTableWriter {
    /// Writes `records` as the run at `prefix` (see [`RunPaths`]).
    ///
    /// # Steps
    ///
    /// 1. Sort records by key (byte-wise).
    /// 2. Create or truncate `.data` and `.index`; append each encoded
    ///    record to `.data` and an index entry holding the record's starting
    ///    offset to `.index`. Every key goes into the bloom filter.
    /// 3. Save the filter to `.filter`.
    /// 4. Write every `summary_step`-th index entry, starting with the first,
    ///    to `.summary`.
    /// 5. Build the integrity tree over the record values in sorted order
    ///    and write its root to `.meta`.
    ///
    /// Each file is fsynced before the next step. Flushing to the prefix of
    /// an existing run replaces all five files.
    ///
    /// # Errors
    ///
    /// [`SSTableError::InvalidOptions`] for zero-valued options,
    /// [`SSTableError::EmptyRun`] if `records` yields nothing, and
    /// [`SSTableError::Io`] on any I/O failure. A failure part-way through
    /// may leave some of the five files written.
    pub fn flush<P, I>(prefix: P, records: I, opts: &RunOptions) -> Result<RunInfo, SSTableError>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = Record>,
    {
        opts.validate()?;

        let mut records: Vec<Record> = records.into_iter().collect();
        if records.is_empty() {
            return Err(SSTableError::EmptyRun);
        }
        records.sort_by(|a, b| a.key().cmp(b.key()));

        let paths = RunPaths::new(prefix);
        debug!(data = %paths.data.display(), records = records.len(), "writing run");

        let mut data = BufWriter::new(create_truncate(&paths.data)?);
        let mut index = BufWriter::new(create_truncate(&paths.index)?);
        let mut filter = BloomFilter::new(opts.bloom_bytes, opts.bloom_hashes);

        let mut entries: Vec<IndexEntry> = Vec::with_capacity(records.len());
        let mut record_buf: Vec<u8> = Vec::with_capacity(256);
        let mut offset: u64 = 0;

        for rec in &records {
            record_buf.clear();
            rec.encode_into(&mut record_buf);
            data.write_all(&record_buf)?;

            let entry = IndexEntry::new(rec.key().to_vec(), offset);
            entry.write_to(&mut index)?;
            entries.push(entry);

            filter.add(rec.key());
            offset += record_buf.len() as u64;
        }

        finish(data)?;
        finish(index)?;

        filter.save(&paths.filter)?;
        File::open(&paths.filter)?.sync_all()?;

        let mut summary = BufWriter::new(create_truncate(&paths.summary)?);
        let mut summary_entries = 0usize;
        for entry in entries.iter().step_by(opts.summary_step) {
            entry.write_to(&mut summary)?;
            summary_entries += 1;
        }
        finish(summary)?;

        let tree = MerkleTree::build(records.iter().map(Record::value));
        let root = *tree.root();
        let mut meta = create_truncate(&paths.meta)?;
        meta.write_all(&root)?;
        meta.sync_all()?;

        debug!(
            records = records.len(),
            data_bytes = offset,
            summary_entries,
            root = %merkle::to_hex(&root),
            "run written"
        );

        Ok(RunInfo {
            records: records.len(),
            data_bytes: offset,
            index_entries: entries.len(),
            summary_entries,
            root,
        })
    }
}

fn create_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Flushes the buffer and syncs the file; the handle is closed on drop.
fn finish(mut w: BufWriter<File>) -> io::Result<()> {
    w.flush()?;
    let file = w.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}
