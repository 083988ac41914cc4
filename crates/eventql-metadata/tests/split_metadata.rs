//! End-to-end scenario 2 from the spec, exercised purely at the metadata
//! file / store level (the partition writers themselves live in
//! `eventql-partition`).

use eventql_metadata::file::{Id160, MetadataFile, PartitionMapEntry};
use eventql_metadata::keyspace::{KeyspaceKey, KeyspaceType};
use eventql_metadata::store::MetadataStore;
use tempfile::tempdir;

#[test]
fn split_then_replace_routes_to_new_partitions() {
    let dir = tempdir().unwrap();
    let store = MetadataStore::new(dir.path());

    let p = Id160::from_sha1(b"P");
    let step1 = MetadataFile::new(
        Id160::from_sha1(b"txid-1"),
        1,
        KeyspaceType::Uint64,
        vec![PartitionMapEntry::new(KeyspaceKey::empty(), p, vec!["s1".to_string()])],
    );
    step1.validate().unwrap();
    store.store("ns1", "t1", step1).unwrap();

    let split_point = KeyspaceType::encode_uint64(1_700_003_600_000_000);
    let p_low = Id160::from_sha1(b"P_low");
    let p_high = Id160::from_sha1(b"P_high");

    let mut splitting_entry = PartitionMapEntry::new(KeyspaceKey::empty(), p, vec!["s1".to_string()]);
    splitting_entry.splitting = true;
    splitting_entry.split_point = Some(split_point.clone());
    splitting_entry.split_partition_id_low = Some(p_low);
    splitting_entry.split_partition_id_high = Some(p_high);

    let step2 = MetadataFile::new(Id160::from_sha1(b"txid-2"), 2, KeyspaceType::Uint64, vec![splitting_entry]);
    step2.validate().unwrap();
    store.store("ns1", "t1", step2).unwrap();

    // Step 3: the split entry is replaced by the two new entries.
    let step3 = MetadataFile::new(
        Id160::from_sha1(b"txid-3"),
        3,
        KeyspaceType::Uint64,
        vec![
            PartitionMapEntry::new(KeyspaceKey::empty(), p_low, vec!["s1".to_string()]),
            PartitionMapEntry::new(split_point.clone(), p_high, vec!["s1".to_string()]),
        ],
    );
    step3.validate().unwrap();
    store.store("ns1", "t1", step3.clone()).unwrap();

    let at_low = KeyspaceType::encode_uint64(1_700_001_200_000_000);
    let at_high = KeyspaceType::encode_uint64(1_700_005_400_000_000);
    assert_eq!(step3.lookup(&at_low).unwrap().partition_id, p_low);
    assert_eq!(step3.lookup(&at_high).unwrap().partition_id, p_high);
    assert_ne!(step3.lookup(&at_low).unwrap().partition_id, p);
    assert_ne!(step3.lookup(&at_high).unwrap().partition_id, p);

    // Applying step 3 again is a no-op: re-storing the same txid is rejected,
    // and the cached/fetched file is unchanged.
    let err = store.store("ns1", "t1", step3.clone()).unwrap_err();
    assert!(matches!(err, eventql_metadata::MetadataError::AlreadyExists { .. }));
    let refetched = store.get("ns1", "t1", step3.txid).unwrap();
    assert_eq!(*refetched, step3);
}
