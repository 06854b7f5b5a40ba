//! # Scan, Index and Query Integration Tests
//!
//! End-to-end over files on disk:
//! - Scan scenarios and index tables
//! - Compressed inputs (gzip, bzip2, zip)
//! - Background scans, progress and cancellation
//! - Multi-file database
//! - Index persistence

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use common::*;
use stdfdb_core::config::Config;
use stdfdb_core::types::{BinClass, BinKind, ByteOrder, FailCount, TestKind, TestOutcome};
use stdfdb_core::{Error, Metrics};
use stdfdb_storage::format::records::{Bps, Dtr, Ftr, Pgr, Pmr, Prr};
use stdfdb_storage::format::{RecordKind, StdfRecord};
use stdfdb_storage::{
    Compression, FileHandle, IndexStore, ProcessBackend, ScanCoordinator, StdfDatabase, StdfSource,
    ThreadBackend,
};

fn open(dir: &TempDir, fixture: &Fixture) -> FileHandle {
    let path = fixture.write(dir.path(), "lot.stdf", Compression::None);
    FileHandle::open_and_index(&path, 0, &Config::default()).unwrap()
}

/// Two wafers, hard/soft bins, a retest and an MPR
fn wafer_lot() -> Fixture {
    Fixture::le()
        .mir("LOT42")
        .record(StdfRecord::Dtr(Dtr { text_dat: "lot start".to_string() }))
        .wafer(1, "W01", |f| {
            f.part(1, 0, vec![ptr_with_limits(100, "VDD", 1.0, 0, 0.5, 1.5, "V"), mpr(200, "LEAK", &[3, 4], &[0.1, 0.2])], die(1, 0, 0, "p1"))
                .part(1, 1, vec![at(ptr(100, "VDD", 2.0, 0x80), 1, 1)], die(5, 1, 0, "p2"))
        })
        .wafer(1, "W02", |f| {
            f.part(1, 0, vec![ptr(100, "VDD", 1.1, 0)], die(1, 0, 0, "p3"))
        })
        .record(hbr(1, 'P', "GOOD"))
        .record(hbr(5, 'F', "OPEN"))
}

mod scan_tests {
    use super::*;

    #[test]
    fn test_single_part_scenario() {
        let dir = TempDir::new().unwrap();
        let fixture = Fixture::le().part(
            1,
            0,
            vec![ptr_with_limits(1000, "VDD", 5.0, 0, 1.0, 10.0, "V")],
            prr(1, 1, 0),
        );
        let handle = open(&dir, &fixture);

        assert_eq!(handle.duts().len(), 1);
        let items = handle.list_test_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].test_num, 1000);
        assert_eq!(items[0].pin_index, 0);
        assert_eq!(handle.store().total_entries(), 1);

        let series = handle.get_test_series(&items[0], &[], &[]).unwrap();
        assert_eq!(series.values, vec![5.0]);
        assert_eq!(series.low_limit, Some(1.0));
        assert_eq!(series.high_limit, Some(10.0));
        assert_eq!(series.statistics.cpk, f64::INFINITY);
        assert_eq!(TestOutcome::from_flag(series.flags[0]), TestOutcome::Pass);
        assert_eq!(series.fail_count, 0);
        assert_eq!(handle.dut(1).unwrap().hard_bin, Some(1));
        assert_eq!(handle.dut(1).unwrap().soft_bin, Some(1));
    }

    #[test]
    fn test_later_records_use_first_seen_limits() {
        let dir = TempDir::new().unwrap();
        let fixture = Fixture::le()
            .part(1, 0, vec![ptr_with_limits(7, "IDD", 0.002, 3, 0.001, 0.003, "A")], prr(1, 1, 0))
            .part(1, 0, vec![ptr(7, "IDD", 0.0025, 0)], prr(1, 1, 0));
        let handle = open(&dir, &fixture);

        let item = &handle.list_test_items()[0];
        let series = handle.get_test_series(item, &[], &[]).unwrap();
        assert_eq!(series.values.len(), 2);
        assert!((series.values[0] - 2.0).abs() < 1e-6);
        assert!((series.values[1] - 2.5).abs() < 1e-6);
        assert!((series.low_limit.unwrap() - 1.0).abs() < 1e-6);
        assert!((series.high_limit.unwrap() - 3.0).abs() < 1e-6);
        assert_eq!(series.unit, "mA");
        assert!(handle.dynamic_limits(item).unwrap().is_empty());
    }

    #[test]
    fn test_entries_match_physical_records() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let store = handle.store();

        assert_eq!(store.record_count(RecordKind::Ptr), 3);
        assert_eq!(store.record_count(RecordKind::Mpr), 1);
        let vdd = store.find_test(100, "VDD").unwrap();
        let leak = store.find_test(200, "LEAK").unwrap();
        assert_eq!(store.entry_count(vdd.test_id), 3);
        assert_eq!(store.entry_count(leak.test_id), 1);
        assert_eq!(store.record_count(RecordKind::Pir), store.duts().len() as u64);
    }

    #[test]
    fn test_big_endian_matches_little_endian() {
        let dir = TempDir::new().unwrap();
        let build = |order| {
            Fixture::new(order).part(1, 0, vec![ptr_with_limits(1, "T", 1.25, 0, 0.0, 2.0, "V")], prr(1, 1, 0))
        };
        let le = build(ByteOrder::LittleEndian).write(dir.path(), "le.stdf", Compression::None);
        let be = build(ByteOrder::BigEndian).write(dir.path(), "be.stdf", Compression::None);

        let config = Config::default();
        let le = FileHandle::open_and_index(&le, 0, &config).unwrap();
        let be = FileHandle::open_and_index(&be, 1, &config).unwrap();
        assert_eq!(be.store().byte_order(), ByteOrder::BigEndian);
        assert_eq!(be.store().info("BYTE_ORD"), Some("Big endian"));

        let item = &le.list_test_items()[0];
        assert_eq!(
            le.get_test_series(item, &[], &[]).unwrap().values,
            be.get_test_series(item, &[], &[]).unwrap().values
        );
    }

    #[test]
    fn test_non_far_first_is_format_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.stdf");
        let pir = StdfRecord::Pir(stdfdb_storage::format::records::Pir { head_num: 1, site_num: 0 });
        std::fs::write(&path, pir.to_bytes(ByteOrder::LittleEndian).unwrap()).unwrap();

        let err = FileHandle::open_and_index(&path, 0, &Config::default()).err().unwrap();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn test_test_record_outside_part_is_structure_error() {
        let dir = TempDir::new().unwrap();
        let fixture = Fixture::le().record(ptr(1, "T", 1.0, 0));
        let path = fixture.write(dir.path(), "orphan.stdf", Compression::None);

        let err = FileHandle::open_and_index(&path, 0, &Config::default()).err().unwrap();
        assert!(matches!(err, Error::Structure { .. }));
    }

    #[test]
    fn test_truncated_file_keeps_complete_records() {
        let dir = TempDir::new().unwrap();
        let fixture = Fixture::le()
            .part(1, 0, vec![ptr(1, "T", 1.0, 0)], prr(1, 1, 0))
            .part(1, 0, vec![ptr(1, "T", 2.0, 0)], prr(1, 1, 0));
        let mut bytes = fixture.bytes();
        bytes.truncate(bytes.len() - 3);
        let path = dir.path().join("cut.stdf");
        std::fs::write(&path, bytes).unwrap();

        let handle = FileHandle::open_and_index(&path, 0, &Config::default()).unwrap();
        assert_eq!(handle.store().truncated_records(), 1);
        // Second PRR lost; its PIR and PTR are indexed
        assert_eq!(handle.duts().len(), 2);
        assert_eq!(handle.dut(2).unwrap().hard_bin, None);
        let item = &handle.list_test_items()[0];
        assert_eq!(handle.get_test_series(item, &[], &[]).unwrap().values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_head_site_filters() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let vdd = handle
            .list_test_items()
            .into_iter()
            .find(|i| i.test_num == 100)
            .unwrap();

        let site1 = handle.get_test_series(&vdd, &[1], &[1]).unwrap();
        assert_eq!(site1.values, vec![2.0]);
        assert_eq!(site1.duts, vec![2]);
        assert_eq!(site1.outcomes.fail, 1);

        let all = handle.get_test_series(&vdd, &[], &[]).unwrap();
        assert_eq!(all.duts, vec![1, 2, 3]);
        assert!(handle.get_test_series(&vdd, &[2], &[]).unwrap().values.is_empty());
    }
}

mod table_tests {
    use super::*;

    #[test]
    fn test_file_info_fields() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let store = handle.store();

        assert_eq!(store.info("STDF Version"), Some("4"));
        assert_eq!(store.info("BYTE_ORD"), Some("Little endian"));
        assert_eq!(store.info("LOT_ID"), Some("LOT42"));
        assert_eq!(store.info("MODE_COD"), Some("P"));
        assert_eq!(store.info("SETUP_T"), Some("2001-09-09 01:46:40"));
        assert_eq!(store.info("RTST_COD"), None);
        assert_eq!(store.info("BURN_TIM"), None);
        assert_eq!(store.file_info()[0].0, "STDF Version");
    }

    #[test]
    fn test_mpr_expands_per_pin() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let leak: Vec<_> = handle
            .list_test_items()
            .into_iter()
            .filter(|i| i.test_num == 200)
            .collect();
        assert_eq!(leak.iter().map(|i| i.pin_index).collect::<Vec<_>>(), vec![3, 4]);
        assert!(leak.iter().all(|i| i.kind == TestKind::MultiResult));

        let pin4 = handle.get_test_series(&leak[1], &[], &[]).unwrap();
        assert!((pin4.values[0] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_bins_and_distribution() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());

        let hard = handle.get_bin_distribution(None, None, BinKind::Hard);
        assert_eq!(hard.len(), 2);
        assert_eq!((hard[0].number, hard[0].count, hard[0].class), (1, 2, BinClass::Pass));
        assert_eq!(hard[0].name, "GOOD");
        assert_eq!((hard[1].number, hard[1].count, hard[1].class), (5, 1, BinClass::Fail));

        let site0 = handle.get_bin_distribution(Some(1), Some(0), BinKind::Hard);
        assert_eq!(site0.len(), 1);
        assert_eq!(site0[0].count, 2);

        // No SBR: soft bins are inferred from part results
        let soft = handle.get_bin_distribution(None, None, BinKind::Soft);
        assert_eq!(soft.len(), 2);
        assert!(!handle.store().bin_info(BinKind::Soft, 5).unwrap().explicit);
        assert_eq!(soft[1].class, BinClass::Fail);
    }

    #[test]
    fn test_wafers_and_dies() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());

        assert_eq!(
            handle.list_wafers(),
            vec![(1, "W01".to_string()), (2, "W02".to_string())]
        );
        assert_eq!(handle.wafer(1).unwrap().part_cnt, Some(2));
        let dut2 = handle.dut(2).unwrap();
        assert_eq!(dut2.wafer_index, Some(1));
        assert_eq!((dut2.x, dut2.y), (Some(1), Some(0)));
        assert_eq!(handle.dut(3).unwrap().wafer_index, Some(2));
    }

    #[test]
    fn test_retest_supersedes_earlier_part() {
        let dir = TempDir::new().unwrap();
        let retest = Prr { part_flg: 0x01, ..die(1, 0, 0, "p1") };
        let fixture = Fixture::le()
            .part(1, 0, vec![ptr(1, "T", 9.0, 0x80)], die(5, 0, 0, "p1"))
            .part(1, 0, vec![ptr(1, "T", 1.0, 0)], retest);
        let handle = open(&dir, &fixture);

        assert!(handle.dut(1).unwrap().superseded);
        assert!(!handle.dut(2).unwrap().superseded);
    }

    #[test]
    fn test_fail_counts_from_tsr() {
        let dir = TempDir::new().unwrap();
        let fixture = Fixture::le()
            .part(1, 0, vec![ptr(1, "T", 1.0, 0x80)], prr(5, 5, 0x08))
            .part(1, 0, vec![ptr(2, "U", 1.0, 0x80)], prr(5, 5, 0x08))
            .record(tsr(255, 1, "T", 4))
            .record(tsr(1, 2, "U", u32::MAX));
        let handle = open(&dir, &fixture);
        let items = handle.list_test_items();

        let t = handle.get_test_series(&items[0], &[], &[]).unwrap();
        assert_eq!(t.declared_fail_count, FailCount::Count(4));
        assert_eq!(t.fail_count, 4);

        let u = handle.get_test_series(&items[1], &[], &[]).unwrap();
        assert_eq!(u.declared_fail_count, FailCount::Unknown);
        assert_eq!(u.fail_count, 1);
    }

    #[test]
    fn test_dynamic_limits_and_sections() {
        let dir = TempDir::new().unwrap();
        let changed = match ptr_with_limits(1, "T", 1.0, 0, 0.0, 5.0, "V") {
            StdfRecord::Ptr(p) => StdfRecord::Ptr(stdfdb_storage::format::records::Ptr { lo_limit: Some(0.5), ..p }),
            other => other,
        };
        let fixture = Fixture::le()
            .record(StdfRecord::Bps(Bps { seq_name: Some("dc".to_string()) }))
            .part(1, 0, vec![ptr_with_limits(1, "T", 1.0, 0, 0.0, 5.0, "V")], prr(1, 1, 0))
            .part(1, 0, vec![changed], prr(1, 1, 0))
            .record(StdfRecord::Eps);
        let handle = open(&dir, &fixture);
        let item = &handle.list_test_items()[0];

        let limits = handle.dynamic_limits(item).unwrap();
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0].dut, 2);
        assert_eq!(limits[0].low_limit, Some(0.5));
        assert_eq!(limits[0].high_limit, None);
        assert_eq!(handle.store().find_test(1, "T").unwrap().seq_name, "dc");
    }

    #[test]
    fn test_datalog_and_functional_tests() {
        let dir = TempDir::new().unwrap();
        let ftr = StdfRecord::Ftr(Ftr { test_num: 9, head_num: 1, site_num: 0, test_flg: 0x80, ..Default::default() });
        let fixture = Fixture::le()
            .record(StdfRecord::Dtr(Dtr { text_dat: "before".to_string() }))
            .part(1, 0, vec![ftr, StdfRecord::Dtr(Dtr { text_dat: "inside".to_string() })], prr(5, 5, 0x08));
        let handle = open(&dir, &fixture);

        let log = handle.datalog();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].after_dut, None);
        assert_eq!((log[1].after_dut, log[1].before_prr), (Some(1), true));

        let item = &handle.list_test_items()[0];
        assert_eq!(item.kind, TestKind::Functional);
        let series = handle.get_test_series(item, &[], &[]).unwrap();
        assert_eq!(series.values, vec![128.0]);
        assert_eq!(series.outcomes.fail, 1);
    }

    #[test]
    fn test_pin_map_and_groups() {
        let dir = TempDir::new().unwrap();
        let pmr = |index: u16, name: &str| {
            StdfRecord::Pmr(Pmr {
                pmr_indx: index,
                chan_typ: Some(0),
                chan_nam: Some(format!("ch{}", index)),
                phy_nam: Some(name.to_string()),
                log_nam: Some(name.to_lowercase()),
                head_num: Some(1),
                site_num: Some(0),
            })
        };
        let fixture = Fixture::le()
            .record(pmr(3, "P3"))
            .record(pmr(4, "P4"))
            .record(StdfRecord::Pgr(Pgr {
                grp_indx: 32768,
                grp_nam: Some("LEAKAGE".to_string()),
                indx_cnt: Some(2),
                pmr_indx: Some(vec![3, 4]),
            }))
            .part(1, 0, vec![mpr(200, "LEAK", &[3, 4], &[0.1, 0.2])], prr(1, 1, 0));
        let handle = open(&dir, &fixture);

        let (pins, groups) = handle.pin_map();
        assert_eq!(pins.len(), 2);
        assert_eq!(pins[0].phy_nam, "P3");
        assert_eq!(pins[1].log_nam, "p4");
        assert_eq!(pins[1].groups, vec![32768]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "LEAKAGE");
        assert_eq!(groups[0].pins, vec![3, 4]);
    }

    #[test]
    fn test_site_lookup_tables() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let store = handle.store();

        assert_eq!(store.head_sites(), vec![(1, 0), (1, 1)]);
        assert_eq!(store.duts_at(1, 0), &[1, 3]);
        assert_eq!(store.duts_at(1, 1), &[2]);
        assert!(store.duts_at(2, 0).is_empty());

        let vdd = store.find_test(100, "VDD").unwrap();
        assert_eq!(store.dynamic_limit(vdd.test_id, 1), None);
    }
}

mod compression_tests {
    use super::*;

    fn values_for(path: &std::path::Path) -> Vec<Vec<f64>> {
        let handle = FileHandle::open_and_index(path, 0, &Config::default()).unwrap();
        handle
            .list_test_items()
            .iter()
            .map(|item| handle.get_test_series(item, &[], &[]).unwrap().values)
            .collect()
    }

    #[test]
    fn test_compressed_inputs_match_plain() {
        let dir = TempDir::new().unwrap();
        let fixture = wafer_lot();
        let plain = values_for(&fixture.write(dir.path(), "lot.stdf", Compression::None));

        for (name, compression) in [
            ("lot.stdf.gz", Compression::Gzip),
            ("lot.stdf.bz2", Compression::Bzip2),
            ("lot.zip", Compression::Zip),
        ] {
            let path = fixture.write(dir.path(), name, compression);
            assert_eq!(StdfSource::open(&path).unwrap().compression(), compression);
            assert_eq!(values_for(&path), plain, "{}", name);
        }
    }

    #[test]
    fn test_small_blocks_span_records() {
        let dir = TempDir::new().unwrap();
        let mut fixture = Fixture::le();
        for i in 0..400 {
            fixture = fixture.part(1, 0, vec![ptr(1, "T", i as f32, 0)], prr(1, 1, 0));
        }
        let path = fixture.write(dir.path(), "many.stdf.gz", Compression::Gzip);

        let mut config = Config::default();
        config.stream.block_size = 4096;
        config.stream.block_cache_blocks = 1;
        let handle = FileHandle::open_and_index(&path, 0, &config).unwrap();
        let item = &handle.list_test_items()[0];
        let values = handle.get_test_series(item, &[], &[]).unwrap().values;
        assert_eq!(values, (0..400).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_zip_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.add_directory("only-a-dir/", zip::write::FileOptions::default()).unwrap();
        zip.finish().unwrap();

        let err = FileHandle::open_and_index(&path, 0, &Config::default()).err().unwrap();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}

mod coordinator_tests {
    use super::*;

    fn large_lot() -> Fixture {
        let mut fixture = Fixture::le();
        for i in 0..2000 {
            fixture = fixture.part(
                1,
                (i % 4) as u8,
                vec![at(ptr(1, "T", i as f32, 0), 1, (i % 4) as u8)],
                prr(1, 1, 0),
            );
        }
        fixture
    }

    #[tokio::test]
    async fn test_thread_backend_completes_with_progress() {
        let dir = TempDir::new().unwrap();
        let path = large_lot().write(dir.path(), "lot.stdf", Compression::None);
        let samples = Arc::new(Mutex::new(Vec::new()));
        let sink = samples.clone();
        let metrics = Metrics::new();
        let coordinator = ScanCoordinator::new(Config::default(), metrics.clone())
            .with_progress_callback(move |p| sink.lock().push(p));

        let task = coordinator.start(StdfSource::open(&path).unwrap(), 0);
        let progress = task.subscribe();
        let output = task.wait().await.unwrap();

        assert_eq!(output.store.duts().len(), 2000);
        assert_eq!(*progress.borrow(), 1.0);
        assert_eq!(samples.lock().last().copied(), Some(1.0));
        assert_eq!(metrics.snapshot().scans_completed, 1);
    }

    #[tokio::test]
    async fn test_cancel_returns_cancelled() {
        let dir = TempDir::new().unwrap();
        let path = large_lot().write(dir.path(), "lot.stdf.gz", Compression::Gzip);
        let metrics = Metrics::new();
        let coordinator = ScanCoordinator::new(Config::default(), metrics.clone());

        let task = coordinator.start_with(Arc::new(ThreadBackend), StdfSource::open(&path).unwrap(), 0);
        task.cancel();
        let err = task.wait().await.err().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(metrics.snapshot().scans_cancelled, 1);
        assert_eq!(metrics.snapshot().scans_completed, 0);
    }

    #[tokio::test]
    async fn test_structure_error_surfaces_from_consumer() {
        let dir = TempDir::new().unwrap();
        let path = Fixture::le()
            .record(ptr(1, "T", 1.0, 0))
            .write(dir.path(), "orphan.stdf", Compression::None);
        let coordinator = ScanCoordinator::new(Config::default(), Metrics::new());

        let err = coordinator.start(StdfSource::open(&path).unwrap(), 0).wait().await.err().unwrap();
        assert!(matches!(err, Error::Structure { .. }));
    }

    #[tokio::test]
    async fn test_missing_worker_executable() {
        let dir = TempDir::new().unwrap();
        let path = large_lot().write(dir.path(), "lot.stdf", Compression::None);
        let coordinator = ScanCoordinator::new(Config::default(), Metrics::new());
        let backend = Arc::new(ProcessBackend::new(dir.path().join("no-such-stdfdb")));

        let err = coordinator
            .start_with(backend, StdfSource::open(&path).unwrap(), 0)
            .wait()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Worker { .. }));
    }

    #[tokio::test]
    async fn test_database_background_open() {
        let dir = TempDir::new().unwrap();
        let path = wafer_lot().write(dir.path(), "lot.stdf.bz2", Compression::Bzip2);
        let mut db = StdfDatabase::new(Config::default());

        let id = db.open_background(&path).await.unwrap();
        let file = db.file(id).unwrap();
        assert_eq!(file.list_wafers().len(), 2);
        let item = &file.list_test_items()[0];
        assert_eq!(file.get_test_series(item, &[], &[]).unwrap().values.len(), 3);
    }
}

mod database_tests {
    use super::*;

    #[test]
    fn test_union_of_test_items() {
        let dir = TempDir::new().unwrap();
        let a = Fixture::le()
            .part(1, 0, vec![ptr(1, "A", 1.0, 0), ptr(2, "B", 1.0, 0)], prr(1, 1, 0))
            .write(dir.path(), "a.stdf", Compression::None);
        let b = Fixture::le()
            .part(1, 0, vec![ptr(2, "B", 2.0, 0), ptr(3, "C", 1.0, 0)], prr(1, 1, 0))
            .write(dir.path(), "b.stdf", Compression::None);

        let mut db = StdfDatabase::new(Config::default());
        assert_eq!(db.open(&a).unwrap(), 0);
        assert_eq!(db.open(&b).unwrap(), 1);

        let items = db.list_test_items();
        assert_eq!(items.iter().map(|i| i.test_num).collect::<Vec<_>>(), vec![1, 2, 3]);
        let b_item = &items[1];
        assert_eq!(db.get_test_series(0, b_item, &[], &[]).unwrap().values, vec![1.0]);
        assert_eq!(db.get_test_series(1, b_item, &[], &[]).unwrap().values, vec![2.0]);
        assert!(matches!(db.get_test_series(0, &items[2], &[], &[]), Err(Error::Query { .. })));
        assert!(db.get_test_series(5, b_item, &[], &[]).is_err());
        assert_eq!(db.paths(), vec![a.clone(), b.clone()]);

        db.close_all();
        assert!(db.files().is_empty());
        assert!(db.list_test_items().is_empty());
    }

    #[test]
    fn test_close_keeps_index_queries() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let item = handle.list_test_items()[0].clone();
        handle.get_test_series(&item, &[], &[]).unwrap();

        handle.close();
        assert!(!handle.is_open());
        assert!(handle.get_test_series(&item, &[], &[]).is_err());
        assert_eq!(handle.duts().len(), 3);

        handle.reopen_stream().unwrap();
        assert_eq!(handle.get_test_series(&item, &[], &[]).unwrap().values.len(), 3);
    }

    #[test]
    fn test_repeat_query_hits_cache() {
        let dir = TempDir::new().unwrap();
        let path = wafer_lot().write(dir.path(), "lot.stdf", Compression::None);
        let metrics = Metrics::new();
        let handle = FileHandle::open_and_index_with(&path, 0, &Config::default(), metrics.clone()).unwrap();
        let item = handle.list_test_items()[0].clone();

        handle.get_test_series(&item, &[], &[]).unwrap();
        let before = metrics.snapshot().decode_cache_hits;
        handle.get_test_series(&item, &[], &[]).unwrap();
        assert_eq!(metrics.snapshot().decode_cache_hits - before, 3);
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let index_path = dir.path().join("lot.sidx");
        handle.save_index(&index_path).unwrap();

        let loaded = IndexStore::load(&index_path).unwrap();
        let scanned = handle.store();
        assert_eq!(loaded.tests(), scanned.tests());
        assert_eq!(loaded.duts(), scanned.duts());
        assert_eq!(loaded.file_info(), scanned.file_info());
        assert_eq!(loaded.wafers(), scanned.wafers());
        assert_eq!(loaded.test_items(), scanned.test_items());
        assert_eq!(loaded.total_entries(), scanned.total_entries());
    }

    #[test]
    fn test_reopen_compressed_with_saved_index() {
        let dir = TempDir::new().unwrap();
        let path = wafer_lot().write(dir.path(), "lot.stdf.gz", Compression::Gzip);
        let config = Config::default();
        let scanned = FileHandle::open_and_index(&path, 0, &config).unwrap();
        let index_path = dir.path().join("lot.sidx");
        scanned.save_index(&index_path).unwrap();

        let reopened = FileHandle::open_with_index(&path, &index_path, &config, Metrics::new()).unwrap();
        for item in scanned.list_test_items() {
            assert_eq!(
                reopened.get_test_series(&item, &[], &[]).unwrap().values,
                scanned.get_test_series(&item, &[], &[]).unwrap().values
            );
        }
    }

    #[test]
    fn test_corruption_rejected() {
        let dir = TempDir::new().unwrap();
        let handle = open(&dir, &wafer_lot());
        let bytes = handle.store().to_bytes().unwrap();

        let mut flipped = bytes.clone();
        let middle = flipped.len() / 2;
        flipped[middle] ^= 0xFF;
        assert!(matches!(IndexStore::from_bytes(&flipped), Err(Error::Index { .. })));

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(IndexStore::from_bytes(&bad_magic), Err(Error::Index { .. })));

        assert!(matches!(IndexStore::from_bytes(&bytes[..bytes.len() - 1]), Err(Error::Index { .. })));
        assert!(IndexStore::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_oversized_payload_length_rejected() {
        let mut bytes = stdfdb_storage::index::persist::INDEX_MAGIC.to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 4]);
        assert!(matches!(IndexStore::from_bytes(&bytes), Err(Error::Index { .. })));
    }
}
