
use record::Record;

pub(crate) fn put(key: &str, value: &str) -> Record {
    Record::new(1, false, key.as_bytes().to_vec(), value.as_bytes().to_vec())
}

pub(crate) fn del(key: &str) -> Record {
    Record::new(1, true, key.as_bytes().to_vec(), Vec::new())
}

/// `count` live records with keys `key-000`, `key-001`, ... in shuffled order.
pub(crate) fn numbered(count: usize) -> Vec<Record> {
    let mut recs: Vec<Record> = (0..count)
        .map(|i| put(&format!("key-{:03}", i), &format!("value-{}", i)))
        .collect();
    recs.reverse();
    recs
}
