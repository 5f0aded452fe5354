use super::*;
use tempfile::tempdir;

// -------------------- Construction --------------------

#[test]
fn new_creates_empty_filter() {
    let bf = BloomFilter::new(1024, 3);
    assert_eq!(bf.num_bits(), 8192);
    assert_eq!(bf.num_hashes(), 3);
    assert!(bf.as_bytes().iter().all(|&b| b == 0));
}

#[test]
#[should_panic(expected = "m_bytes must be > 0")]
fn new_panics_on_zero_bytes() {
    BloomFilter::new(0, 3);
}

#[test]
#[should_panic(expected = "k must be > 0")]
fn new_panics_on_zero_hashes() {
    BloomFilter::new(16, 0);
}

// -------------------- Hashing --------------------

#[test]
fn seeded_hash_prefixes_seed_bytes() {
    // FNV-1a 64 over eight zero bytes.
    assert_eq!(seeded_fnv1a_64(b"", 0), 0xa8c7f832281a39c5);
    assert_ne!(seeded_fnv1a_64(b"k", 0), seeded_fnv1a_64(b"k", 1));
}

#[test]
fn add_sets_expected_bits() {
    let mut bf = BloomFilter::new(1024, 3);
    bf.add(b"apple");

    let set: Vec<u64> = (0..bf.num_bits())
        .filter(|&i| bf.get_bit(i))
        .collect();
    assert_eq!(set, vec![1853, 5420, 7903]);
    // bit 1853 -> byte 231, position 5
    assert_eq!(bf.as_bytes()[231], 1 << 5);
}

// -------------------- Add / Contains --------------------

#[test]
fn added_key_is_found() {
    let mut bf = BloomFilter::new(1024, 3);
    bf.add(b"hello");
    assert!(bf.might_contain(b"hello"));
}

#[test]
fn missing_key_is_not_found_in_empty_filter() {
    let bf = BloomFilter::new(1024, 3);
    assert!(!bf.might_contain(b"hello"));
}

#[test]
fn no_false_negatives_after_later_adds() {
    let mut bf = BloomFilter::new(256, 4);
    let mut added = Vec::new();
    for i in 0..2_000u64 {
        let key = format!("key-{}", i).into_bytes();
        bf.add(&key);
        added.push(key);
        // Everything added so far must still be reported.
        if i % 250 == 0 {
            for k in &added {
                assert!(bf.might_contain(k));
            }
        }
    }
    for k in &added {
        assert!(bf.might_contain(k), "key {:?} lost", k);
    }
}

#[test]
fn false_positive_rate_is_reasonable() {
    // 1 KiB, k = 3, 1000 keys: theoretical FPR is about 3%.
    let mut bf = BloomFilter::new(1024, 3);
    for i in 0..1_000u64 {
        bf.add(&i.to_le_bytes());
    }

    let test_count = 10_000u64;
    let false_positives = (1_000_000..1_000_000 + test_count)
        .filter(|i: &u64| bf.might_contain(&i.to_le_bytes()))
        .count();

    let actual_fpr = false_positives as f64 / test_count as f64;
    assert!(actual_fpr < 0.10, "FPR too high: {:.4}", actual_fpr);
}

#[test]
fn empty_and_binary_keys() {
    let mut bf = BloomFilter::new(64, 2);
    let key = vec![0u8, 1, 2, 255, 254, 253];
    bf.add(b"");
    bf.add(&key);
    assert!(bf.might_contain(b""));
    assert!(bf.might_contain(&key));
}

#[test]
fn single_byte_filter_still_has_no_false_negatives() {
    let mut bf = BloomFilter::new(1, 5);
    bf.add(b"only");
    assert!(bf.might_contain(b"only"));
}

// -------------------- Persistence --------------------

#[test]
fn save_writes_raw_bitset_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.filter");

    let mut bf = BloomFilter::new(128, 3);
    bf.add(b"a");
    bf.add(b"b");
    bf.save(&path).unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(raw.len(), 128);
    assert_eq!(raw.as_slice(), bf.as_bytes());
}

#[test]
fn load_with_same_k_answers_identically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.filter");

    let mut bf = BloomFilter::new(512, 3);
    for i in 0..300u64 {
        bf.add(&i.to_le_bytes());
    }
    bf.save(&path).unwrap();

    let loaded = BloomFilter::load(&path, 3).unwrap();
    assert_eq!(loaded, bf);
    for i in 0..300u64 {
        assert!(loaded.might_contain(&i.to_le_bytes()));
    }
}

#[test]
fn load_empty_file_is_invalid_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.filter");
    std::fs::write(&path, b"").unwrap();

    let err = BloomFilter::load(&path, 3).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let bf = BloomFilter::new(100, 3);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
    assert!(debug.contains("num_bits"));
    assert!(debug.contains("num_hashes"));
}
