use merkle::{to_hex, MerkleTree};
use record::{Record, RecordError};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, warn};

use crate::format::RunPaths;
use crate::SSTableError;

/// Rebuilds the integrity tree from the values in `<prefix>.data` and
/// compares its root with the one stored in `<prefix>.meta`.
///
/// Records whose checksum does not match are skipped, and reading stops at a
/// truncated record, the same way WAL replay treats damage. Either kind of
/// damage changes the rebuilt root, so it still surfaces as
/// [`SSTableError::IntegrityFailure`].
pub fn verify<P: AsRef<Path>>(prefix: P) -> Result<(), SSTableError> {
    let paths = RunPaths::new(prefix);
    let expected = fs::read(&paths.meta)?;

    let mut reader = BufReader::new(File::open(&paths.data)?);
    let mut values: Vec<Vec<u8>> = Vec::new();
    let mut skipped = 0usize;
    loop {
        match Record::read_from(&mut reader) {
            Ok(Some(rec)) => values.push(rec.into_key_value().1),
            Ok(None) => break,
            Err(RecordError::Truncated) => {
                warn!(data = %paths.data.display(), "run data ends inside a record");
                break;
            }
            Err(RecordError::Io(e)) => return Err(SSTableError::Io(e)),
            Err(e) => {
                warn!(data = %paths.data.display(), error = %e, "skipping corrupt run record");
                skipped += 1;
            }
        }
    }

    let tree = MerkleTree::build(&values);
    let actual = tree.root();
    debug!(records = values.len(), skipped, "rebuilt integrity tree");

    if expected.as_slice() != actual.as_slice() {
        return Err(SSTableError::IntegrityFailure {
            expected: to_hex(&expected),
            actual: to_hex(actual),
        });
    }
    Ok(())
}
