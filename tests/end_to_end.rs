//! Integration tests over the literal end-to-end scenarios in spec.md §8.

use dbcore::buffer::BufferPoolManager;
use dbcore::catalog::ColType;
use dbcore::database::{ColumnSpec, Database};
use dbcore::disk::DiskManager;
use dbcore::executor::{ColSchema, Context, DeleteExecutor, Executor, SeqScanExecutor, SetClause, UpdateExecutor, Value};
use dbcore::index::IndexHandle;
use std::sync::Arc;

fn read_row(data: &[u8]) -> (i32, i32) {
    (
        i32::from_le_bytes(data[0..4].try_into().unwrap()),
        i32::from_le_bytes(data[4..8].try_into().unwrap()),
    )
}

fn scan_all(schema: &[ColSchema], rm: &Arc<dbcore::record::RmFileHandle>) -> Vec<(i32, i32)> {
    let mut exec = SeqScanExecutor::new(rm.clone(), schema.to_vec(), vec![]);
    let mut rows = vec![];
    exec.begin_tuple().unwrap();
    while !exec.is_end() {
        rows.push(read_row(&exec.current().unwrap()));
        exec.next_tuple().unwrap();
    }
    rows.sort();
    rows
}

fn ab_schema() -> Vec<ColSchema> {
    vec![
        ColSchema { name: "a".into(), col_type: ColType::Int, len: 4, offset: 0 },
        ColSchema { name: "b".into(), col_type: ColType::Int, len: 4, offset: 4 },
    ]
}

#[test]
fn delete_then_abort_restores_all_rows() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(dir.path(), 10).unwrap();
    db.create_table(
        "t",
        vec![ColumnSpec::new("a", ColType::Int, 4), ColumnSpec::new("b", ColType::Int, 4)],
        vec![],
    )
    .unwrap();
    let rm = db.table_handle("t").unwrap();

    let mut rids = vec![];
    for (a, b) in [(1i32, 10i32), (2, 20), (3, 30)] {
        let mut buf = vec![0u8; 8];
        buf[0..4].copy_from_slice(&a.to_le_bytes());
        buf[4..8].copy_from_slice(&b.to_le_bytes());
        rids.push(rm.insert_record(&buf).unwrap());
    }

    let txn = db.begin();
    let ctx = Context::new(txn.clone(), db.lock_manager().clone());
    let exec = DeleteExecutor::new(rm.clone(), rm.fd(), "t", ab_schema(), vec![], vec![rids[1]]);
    let deleted = exec.execute(&ctx).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(scan_all(&ab_schema(), &rm), vec![(1, 10), (3, 30)]);

    db.abort(&txn).unwrap();
    assert_eq!(scan_all(&ab_schema(), &rm), vec![(1, 10), (2, 20), (3, 30)]);
}

#[test]
fn update_moves_index_entry_and_commits() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(dir.path(), 10).unwrap();
    db.create_table(
        "t",
        vec![ColumnSpec::new("a", ColType::Int, 4), ColumnSpec::new("b", ColType::Int, 4)],
        vec![vec!["a".to_string()]],
    )
    .unwrap();
    let rm = db.table_handle("t").unwrap();
    let index = db.table_index("t", &["a".to_string()]).unwrap().unwrap();

    let mut buf = vec![0u8; 8];
    buf[0..4].copy_from_slice(&1i32.to_le_bytes());
    buf[4..8].copy_from_slice(&10i32.to_le_bytes());
    let rid = rm.insert_record(&buf).unwrap();
    index.insert_entry(&1i32.to_le_bytes(), rid).unwrap();

    let txn = db.begin();
    let ctx = Context::new(txn.clone(), db.lock_manager().clone());
    let exec = UpdateExecutor::new(
        rm.clone(),
        rm.fd(),
        "t",
        ab_schema(),
        vec![(vec!["a".to_string()], index.clone() as Arc<dyn IndexHandle>)],
        vec![rid],
        vec![SetClause { col: "b".into(), value: Value::Int(99) }],
    );
    exec.execute(&ctx).unwrap();
    db.commit(&txn).unwrap();

    let row = rm.get_record(rid).unwrap();
    assert_eq!(read_row(&row.data), (1, 99));

    let found = index.scan(dbcore::index::lower_bound(&1i32.to_le_bytes()), dbcore::index::KeyBound::Included(1i32.to_le_bytes().to_vec()));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].1, rid);
}

#[test]
fn exclusive_table_lock_denies_concurrent_shared_lock() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(dir.path(), 10).unwrap();
    db.create_table("t", vec![ColumnSpec::new("a", ColType::Int, 4)], vec![]).unwrap();
    let rm = db.table_handle("t").unwrap();

    let t1 = db.begin();
    let t2 = db.begin();
    db.lock_manager().lock_exclusive_on_table(&t1, rm.fd()).unwrap();

    let err = db.lock_manager().lock_shared_on_table(&t2, rm.fd()).unwrap_err();
    let reason = err.downcast_ref::<dbcore::error::Error>();
    match reason {
        Some(dbcore::error::Error::TransactionAbort(dbcore::error::AbortReason::DeadlockPrevention)) => {}
        other => panic!("expected DEADLOCK_PREVENTION, got {other:?}"),
    }
}

#[test]
fn sole_shared_holder_upgrades_to_exclusive_on_same_record() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::create(dir.path(), 10).unwrap();
    db.create_table("t", vec![ColumnSpec::new("a", ColType::Int, 4)], vec![]).unwrap();
    let rm = db.table_handle("t").unwrap();
    let rid = rm.insert_record(&1i32.to_le_bytes()).unwrap();

    let t1 = db.begin();
    assert!(db.lock_manager().lock_shared_on_record(&t1, rm.fd(), rid).unwrap());
    assert!(db.lock_manager().lock_exclusive_on_record(&t1, rm.fd(), rid).unwrap());
}

#[test]
fn concurrent_inserts_on_distinct_tables_do_not_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::create(dir.path(), 10).unwrap());
    db.create_table("t1", vec![ColumnSpec::new("a", ColType::Int, 4)], vec![]).unwrap();
    db.create_table("t2", vec![ColumnSpec::new("a", ColType::Int, 4)], vec![]).unwrap();

    let db1 = db.clone();
    let h1 = std::thread::spawn(move || {
        let rm = db1.table_handle("t1").unwrap();
        let txn = db1.begin();
        db1.lock_manager().lock_exclusive_on_table(&txn, rm.fd()).unwrap();
        let rid = rm.insert_record(&7i32.to_le_bytes()).unwrap();
        db1.commit(&txn).unwrap();
        rid
    });
    let db2 = db.clone();
    let h2 = std::thread::spawn(move || {
        let rm = db2.table_handle("t2").unwrap();
        let txn = db2.begin();
        db2.lock_manager().lock_exclusive_on_table(&txn, rm.fd()).unwrap();
        let rid = rm.insert_record(&8i32.to_le_bytes()).unwrap();
        db2.commit(&txn).unwrap();
        rid
    });
    let rid1 = h1.join().unwrap();
    let rid2 = h2.join().unwrap();

    assert_eq!(
        i32::from_le_bytes(db.table_handle("t1").unwrap().get_record(rid1).unwrap().data.try_into().unwrap()),
        7
    );
    assert_eq!(
        i32::from_le_bytes(db.table_handle("t2").unwrap().get_record(rid2).unwrap().data.try_into().unwrap()),
        8
    );
}

#[test]
fn buffer_pool_of_two_evicts_only_after_unpin() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::new(dir.path()).unwrap();
    let mut bpm = BufferPoolManager::new(2, disk);
    let fd = bpm.disk_manager_mut().open_file("t").unwrap();

    let (p1, _) = bpm.new_page(fd).unwrap().unwrap();
    let (p2, _) = bpm.new_page(fd).unwrap().unwrap();
    assert!(bpm.new_page(fd).unwrap().is_none());

    assert!(bpm.unpin_page(p1, false));
    let (p3, frame3) = bpm.new_page(fd).unwrap().unwrap();
    assert_eq!(bpm.page_id_of(frame3).unwrap(), p3);
    assert_ne!(p3, p1);
    assert_ne!(p3, p2);
}
