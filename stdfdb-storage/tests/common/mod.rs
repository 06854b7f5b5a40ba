//! Shared fixtures: STDF streams written from typed records.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use stdfdb_core::types::ByteOrder;
use stdfdb_storage::format::records::{BinRecord, Far, Mir, Mpr, Pir, Prr, Ptr, Tsr, Wir, Wrr};
use stdfdb_storage::format::StdfRecord;
use stdfdb_storage::Compression;

/// Builder for an in-memory STDF stream
pub struct Fixture {
    order: ByteOrder,
    records: Vec<StdfRecord>,
}

impl Fixture {
    /// Starts with a FAR for `order`
    pub fn new(order: ByteOrder) -> Self {
        let cpu_type = match order {
            ByteOrder::LittleEndian => 2,
            ByteOrder::BigEndian => 1,
        };
        Self {
            order,
            records: vec![StdfRecord::Far(Far { cpu_type, stdf_ver: 4 })],
        }
    }

    pub fn le() -> Self {
        Self::new(ByteOrder::LittleEndian)
    }

    pub fn record(mut self, record: StdfRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn mir(self, lot_id: &str) -> Self {
        self.record(StdfRecord::Mir(Mir {
            setup_t: 1_000_000_000,
            start_t: 1_000_000_060,
            stat_num: 3,
            mode_cod: Some('P'),
            rtst_cod: Some(' '),
            prot_cod: Some(' '),
            burn_tim: Some(65535),
            cmod_cod: Some(' '),
            lot_id: Some(lot_id.to_string()),
            part_typ: Some("PART-A".to_string()),
            ..Default::default()
        }))
    }

    /// PIR, the given test records, then PRR
    pub fn part(mut self, head: u8, site: u8, tests: Vec<StdfRecord>, prr: Prr) -> Self {
        self.records.push(StdfRecord::Pir(Pir { head_num: head, site_num: site }));
        self.records.extend(tests);
        self.records.push(StdfRecord::Prr(Prr { head_num: head, site_num: site, ..prr }));
        self
    }

    pub fn wafer(self, head: u8, id: &str, parts: impl FnOnce(Self) -> Self) -> Self {
        let with_wir = self.record(StdfRecord::Wir(Wir {
            head_num: head,
            site_grp: 255,
            start_t: 1_000_000_100,
            wafer_id: Some(id.to_string()),
        }));
        parts(with_wir).record(StdfRecord::Wrr(Wrr {
            head_num: head,
            site_grp: 255,
            finish_t: 1_000_000_200,
            part_cnt: 2,
            ..Default::default()
        }))
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.records
            .iter()
            .flat_map(|r| r.to_bytes(self.order).unwrap())
            .collect()
    }

    /// Write to `dir/name`, compressed as requested
    pub fn write(&self, dir: &Path, name: &str, compression: Compression) -> PathBuf {
        let path = dir.join(name);
        write_compressed(&path, &self.bytes(), compression);
        path
    }
}

pub fn write_compressed(path: &Path, data: &[u8], compression: Compression) {
    let file = File::create(path).unwrap();
    match compression {
        Compression::None => {
            let mut file = file;
            file.write_all(data).unwrap();
        }
        Compression::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap();
        }
        Compression::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(file, bzip2::Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap();
        }
        Compression::Zip => {
            let mut zip = zip::ZipWriter::new(file);
            zip.add_directory("lot/", zip::write::FileOptions::default()).unwrap();
            zip.start_file("lot/data.stdf", zip::write::FileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
            zip.finish().unwrap();
        }
    }
}

/// PTR with only the required fields and a result
pub fn ptr(test_num: u32, name: &str, result: f32, test_flg: u8) -> StdfRecord {
    StdfRecord::Ptr(Ptr {
        test_num,
        head_num: 1,
        site_num: 0,
        test_flg,
        parm_flg: Some(0),
        result: Some(result),
        test_txt: Some(name.to_string()),
        ..Default::default()
    })
}

/// PTR carrying scale, limits and units
pub fn ptr_with_limits(test_num: u32, name: &str, result: f32, res_scal: i8, lo: f32, hi: f32, units: &str) -> StdfRecord {
    StdfRecord::Ptr(Ptr {
        test_num,
        head_num: 1,
        site_num: 0,
        test_flg: 0,
        parm_flg: Some(0),
        result: Some(result),
        test_txt: Some(name.to_string()),
        alarm_id: Some(String::new()),
        opt_flag: Some(0),
        res_scal: Some(res_scal),
        llm_scal: Some(res_scal),
        hlm_scal: Some(res_scal),
        lo_limit: Some(lo),
        hi_limit: Some(hi),
        units: Some(units.to_string()),
        ..Default::default()
    })
}

/// Move a test record to another head/site
pub fn at(record: StdfRecord, head: u8, site: u8) -> StdfRecord {
    match record {
        StdfRecord::Ptr(ptr) => StdfRecord::Ptr(Ptr { head_num: head, site_num: site, ..ptr }),
        StdfRecord::Mpr(mpr) => StdfRecord::Mpr(Mpr { head_num: head, site_num: site, ..mpr }),
        other => other,
    }
}

pub fn mpr(test_num: u32, name: &str, pins: &[u16], results: &[f32]) -> StdfRecord {
    StdfRecord::Mpr(Mpr {
        test_num,
        head_num: 1,
        site_num: 0,
        test_flg: 0,
        parm_flg: Some(0),
        rtn_icnt: Some(pins.len() as u16),
        rslt_cnt: Some(results.len() as u16),
        rtn_stat: Some(vec![0; pins.len()]),
        rtn_rslt: Some(results.to_vec()),
        test_txt: Some(name.to_string()),
        alarm_id: Some(String::new()),
        opt_flag: Some(0x02),
        res_scal: Some(0),
        llm_scal: Some(0),
        hlm_scal: Some(0),
        lo_limit: Some(0.0),
        hi_limit: Some(1.0),
        start_in: Some(0.0),
        incr_in: Some(0.0),
        rtn_indx: Some(pins.to_vec()),
        units: Some("A".to_string()),
        ..Default::default()
    })
}

pub fn prr(hard_bin: u16, soft_bin: u16, part_flg: u8) -> Prr {
    Prr {
        part_flg,
        num_test: 1,
        hard_bin,
        soft_bin: Some(soft_bin),
        x_coord: Some(Prr::NO_COORD),
        y_coord: Some(Prr::NO_COORD),
        test_t: Some(12),
        part_id: Some(String::new()),
        ..Default::default()
    }
}

pub fn die(hard_bin: u16, x: i16, y: i16, part_id: &str) -> Prr {
    Prr {
        x_coord: Some(x),
        y_coord: Some(y),
        part_id: Some(part_id.to_string()),
        ..prr(hard_bin, hard_bin, if hard_bin == 1 { 0 } else { 0x08 })
    }
}

pub fn hbr(bin: u16, pf: char, name: &str) -> StdfRecord {
    StdfRecord::Hbr(BinRecord {
        head_num: 255,
        site_num: 0,
        bin_num: bin,
        bin_cnt: Some(0),
        bin_pf: Some(pf),
        bin_nam: Some(name.to_string()),
    })
}

pub fn tsr(head: u8, test_num: u32, name: &str, fail_cnt: u32) -> StdfRecord {
    StdfRecord::Tsr(Tsr {
        head_num: head,
        site_num: 0,
        test_typ: 'P',
        test_num,
        exec_cnt: Some(0),
        fail_cnt: Some(fail_cnt),
        alrm_cnt: Some(0),
        test_nam: Some(name.to_string()),
        ..Default::default()
    })
}
