//! Consumer side of the scan: turns raw records into index tables.

use std::collections::btree_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use stdfdb_core::error::{Error, Result};
use stdfdb_core::metrics::Metrics;
use stdfdb_core::types::{BinClass, BinKind, ByteOrder, FailCount, PartStatus, TestKind};
use stdfdb_core::utils::format_timestamp;

use crate::format::records::{
    Atr, BinRecord, Far, Ftr, Mir, Mpr, Mrr, Pcr, Pgr, Pmr, Prr, Ptr, Tsr, Vur, Wcr, Wir, Wrr,
};
use crate::format::{Record, RecordKind, StdfRecord, TestHeader};
use crate::index::{
    BinInfo, DatalogEntry, DutInfo, IndexStore, PartCount, PinGroup, PinInfo, TestMeta, TestOffsets,
    WaferInfo,
};
use crate::stream::Compression;

use super::{ProduceSummary, RawRecord};

/// Head number of summary TSR/PCR/HBR/SBR records
const SUMMARY_HEAD: u8 = 255;
/// SOFT_BIN value meaning "no soft bin"
const NO_SOFT_BIN: u16 = 65535;

fn test_kind(kind: RecordKind) -> Option<TestKind> {
    match kind {
        RecordKind::Ptr => Some(TestKind::Parametric),
        RecordKind::Mpr => Some(TestKind::MultiResult),
        RecordKind::Ftr => Some(TestKind::Functional),
        _ => None,
    }
}

/// Builds an [`IndexStore`] from records in stream order
pub struct IndexBuilder {
    store: IndexStore,
    order: Option<ByteOrder>,
    size_hint: Option<u64>,
    /// (head, site) -> DUT between its PIR and PRR
    open_duts: HashMap<(u8, u8), u32>,
    /// head -> wafer opened by the last WIR
    open_wafers: HashMap<u8, u32>,
    /// BPS/EPS nesting
    sections: Vec<String>,
    before_prr: bool,
    metrics: Metrics,
}

impl IndexBuilder {
    pub fn new(file_id: u32, compression: Compression, size_hint: Option<u64>, metrics: Metrics) -> Self {
        Self {
            store: IndexStore::new(file_id, ByteOrder::LittleEndian, compression),
            order: None,
            size_hint,
            open_duts: HashMap::new(),
            open_wafers: HashMap::new(),
            sections: Vec::new(),
            before_prr: true,
            metrics,
        }
    }

    /// Merge one record into the index.
    ///
    /// Records whose body cannot be decoded are skipped with a warning.
    /// Structure errors are returned and end the scan.
    pub fn push(&mut self, record: &RawRecord) -> Result<()> {
        *self.store.record_counts.entry(record.kind).or_insert(0) += 1;

        let result = match (record.kind, self.order) {
            (RecordKind::Far, _) => self.on_far(record),
            (kind, None) => {
                return Err(Error::format(format!("{} record before FAR", kind)));
            }
            (kind, Some(order)) if kind.is_test_record() => self.on_test(record, order),
            (kind, Some(order)) => {
                StdfRecord::decode(kind, &record.body, order).and_then(|decoded| self.apply(decoded))
            }
        };

        match result {
            Ok(()) => {
                self.metrics.record_indexed();
                Ok(())
            }
            Err(e @ Error::TruncatedRecord { .. }) => {
                warn!(kind = %record.kind, offset = record.offset, error = %e, "Skipping truncated record");
                self.store.truncated_records += 1;
                self.metrics.record_truncated();
                Ok(())
            }
            Err(e @ Error::Decode { .. }) => {
                warn!(kind = %record.kind, offset = record.offset, error = %e, "Skipping undecodable record");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Close the index
    pub fn finish(mut self, summary: &ProduceSummary) -> IndexStore {
        if summary.truncated {
            self.store.truncated_records += 1;
        }
        if !self.open_duts.is_empty() {
            warn!(open = self.open_duts.len(), "Parts without PRR at end of stream");
        }
        info!(
            file_id = self.store.file_id,
            tests = self.store.tests.len(),
            entries = self.store.total_entries(),
            duts = self.store.duts.len(),
            wafers = self.store.wafers.len(),
            "Index built"
        );
        self.store
    }

    fn on_far(&mut self, record: &RawRecord) -> Result<()> {
        // Both FAR fields are single bytes
        let far = Far::from_body(&record.body, ByteOrder::LittleEndian)?;
        if self.order.is_some() {
            debug!(offset = record.offset, "Ignoring repeated FAR");
            return Ok(());
        }
        let order = ByteOrder::from_cpu_type(far.cpu_type);
        self.order = Some(order);
        self.store.byte_order = order;
        self.store.set_info("STDF Version", far.stdf_ver.to_string());
        self.store.set_info("BYTE_ORD", order.label());
        Ok(())
    }

    fn apply(&mut self, record: StdfRecord) -> Result<()> {
        match record {
            StdfRecord::Atr(atr) => self.on_atr(atr),
            StdfRecord::Vur(vur) => self.on_vur(vur),
            StdfRecord::Mir(mir) => self.on_mir(mir),
            StdfRecord::Mrr(mrr) => self.on_mrr(mrr),
            StdfRecord::Pcr(pcr) => self.on_pcr(pcr),
            StdfRecord::Hbr(hbr) => self.on_bin(BinKind::Hard, hbr),
            StdfRecord::Sbr(sbr) => self.on_bin(BinKind::Soft, sbr),
            StdfRecord::Pmr(pmr) => self.on_pmr(pmr),
            StdfRecord::Pgr(pgr) => self.on_pgr(pgr),
            StdfRecord::Wir(wir) => self.on_wir(wir),
            StdfRecord::Wrr(wrr) => self.on_wrr(wrr),
            StdfRecord::Wcr(wcr) => self.on_wcr(wcr),
            StdfRecord::Pir(pir) => self.open_dut(pir.head_num, pir.site_num),
            StdfRecord::Prr(prr) => return self.close_dut(prr),
            StdfRecord::Tsr(tsr) => self.on_tsr(tsr),
            StdfRecord::Bps(bps) => self.sections.push(bps.seq_name.unwrap_or_default()),
            StdfRecord::Eps => {
                self.sections.pop();
            }
            StdfRecord::Dtr(dtr) => {
                let entry = DatalogEntry {
                    after_dut: self.last_dut(),
                    before_prr: self.before_prr,
                    text: dtr.text_dat,
                };
                self.store.datalog.push(entry);
            }
            StdfRecord::Far(_)
            | StdfRecord::Ptr(_)
            | StdfRecord::Mpr(_)
            | StdfRecord::Ftr(_)
            | StdfRecord::Generic(..) => {}
        }
        Ok(())
    }

    fn last_dut(&self) -> Option<u32> {
        self.store.duts.last().map(|d| d.index)
    }

    fn on_atr(&mut self, atr: Atr) {
        let entry = format!(
            "Time: {}\nCMD: {}",
            atr.mod_tim.map(format_timestamp).unwrap_or_default(),
            atr.cmd_line.unwrap_or_default()
        );
        // Every ATR is kept, oldest first
        match self.store.info("File Modification") {
            Some(history) => {
                let history = format!("{}\n{}", history, entry);
                self.store.replace_info("File Modification", history);
            }
            None => self.store.set_info("File Modification", entry),
        }
    }

    fn on_vur(&mut self, vur: Vur) {
        let names = vur.upd_nam.unwrap_or_default().join(", ");
        if !names.is_empty() {
            self.store.replace_info("STDF Version", names);
        }
    }

    fn on_mir(&mut self, mir: Mir) {
        let store = &mut self.store;
        store.set_info("SETUP_T", format_timestamp(mir.setup_t));
        store.set_info("START_T", format_timestamp(mir.start_t));
        store.set_info("STAT_NUM", mir.stat_num.to_string());
        for (name, code) in [
            ("MODE_COD", mir.mode_cod),
            ("RTST_COD", mir.rtst_cod),
            ("PROT_COD", mir.prot_cod),
            ("CMOD_COD", mir.cmod_cod),
        ] {
            if let Some(c) = code.filter(|c| *c != ' ') {
                store.set_info(name, c.to_string());
            }
        }
        if let Some(burn) = mir.burn_tim.filter(|b| *b != u16::MAX) {
            store.set_info("BURN_TIM", burn.to_string());
        }
        for (name, text) in mir.text_fields() {
            if let Some(text) = text {
                store.set_info(name, text.clone());
            }
        }
    }

    fn on_mrr(&mut self, mrr: Mrr) {
        self.store.set_info("FINISH_T", format_timestamp(mrr.finish_t));
        if let Some(c) = mrr.disp_cod.filter(|c| *c != ' ') {
            self.store.set_info("DISP_COD", c.to_string());
        }
        self.store.set_info("USR_DESC", mrr.usr_desc.unwrap_or_default());
        self.store.set_info("EXC_DESC", mrr.exc_desc.unwrap_or_default());
    }

    fn on_wcr(&mut self, wcr: Wcr) {
        let store = &mut self.store;
        for (name, value) in [("WAFR_SIZ", wcr.wafr_siz), ("DIE_HT", wcr.die_ht), ("DIE_WID", wcr.die_wid)] {
            if let Some(v) = value.filter(|v| *v != 0.0) {
                store.set_info(name, v.to_string());
            }
        }
        if let Some(units) = wcr.wf_units.filter(|u| *u != 0) {
            let label = match units {
                1 => "inch",
                2 => "cm",
                3 => "mm",
                _ => "mil",
            };
            store.set_info("WF_UNITS", label);
        }
        for (name, value) in [("CENTER_X", wcr.center_x), ("CENTER_Y", wcr.center_y)] {
            if let Some(v) = value.filter(|v| *v != Prr::NO_COORD) {
                store.set_info(name, v.to_string());
            }
        }
        for (name, value) in [("WF_FLAT", wcr.wf_flat), ("POS_X", wcr.pos_x), ("POS_Y", wcr.pos_y)] {
            if let Some(c) = value.filter(|c| *c != ' ') {
                store.set_info(name, c.to_string());
            }
        }
    }

    fn on_pcr(&mut self, pcr: Pcr) {
        self.store.part_counts.push(PartCount {
            head: pcr.head_num,
            site: pcr.site_num,
            part_cnt: pcr.part_cnt,
            rtst_cnt: pcr.rtst_cnt,
            abrt_cnt: pcr.abrt_cnt,
            good_cnt: pcr.good_cnt,
            func_cnt: pcr.func_cnt,
        });
    }

    fn on_pmr(&mut self, pmr: Pmr) {
        let pin = self.store.pins.entry(pmr.pmr_indx).or_insert_with(|| PinInfo {
            index: pmr.pmr_indx,
            ..Default::default()
        });
        pin.chan_typ = pmr.chan_typ;
        pin.chan_nam = pmr.chan_nam.unwrap_or_default();
        pin.phy_nam = pmr.phy_nam.unwrap_or_default();
        pin.log_nam = pmr.log_nam.unwrap_or_default();
        pin.head = pmr.head_num;
        pin.site = pmr.site_num;
    }

    fn on_pgr(&mut self, pgr: Pgr) {
        let pins = pgr.pmr_indx.unwrap_or_default();
        for index in &pins {
            let pin = self.store.pins.entry(*index).or_insert_with(|| PinInfo {
                index: *index,
                ..Default::default()
            });
            if !pin.groups.contains(&pgr.grp_indx) {
                pin.groups.push(pgr.grp_indx);
            }
        }
        self.store.pin_groups.insert(
            pgr.grp_indx,
            PinGroup {
                index: pgr.grp_indx,
                name: pgr.grp_nam.unwrap_or_default(),
                pins,
            },
        );
    }

    fn on_wir(&mut self, wir: Wir) {
        let index = self.store.wafers.len() as u32 + 1;
        self.store.wafers.push(WaferInfo {
            index,
            head: wir.head_num,
            wafer_id: wir.wafer_id.unwrap_or_default(),
            start_t: Some(wir.start_t),
            ..Default::default()
        });
        self.open_wafers.insert(wir.head_num, index);
    }

    fn on_wrr(&mut self, wrr: Wrr) {
        let Some(index) = self.open_wafers.get(&wrr.head_num).copied() else {
            warn!(head = wrr.head_num, "WRR without a preceding WIR; ignored");
            return;
        };
        let Some(wafer) = self.store.wafers.get_mut(index as usize - 1) else {
            return;
        };
        wafer.finish_t = Some(wrr.finish_t);
        wafer.part_cnt = Some(wrr.part_cnt);
        wafer.rtst_cnt = wrr.rtst_cnt;
        wafer.abrt_cnt = wrr.abrt_cnt;
        wafer.good_cnt = wrr.good_cnt;
        wafer.func_cnt = wrr.func_cnt;
        if let Some(id) = wrr.wafer_id.filter(|id| !id.is_empty()) {
            wafer.wafer_id = id;
        }
        wafer.fabwf_id = wrr.fabwf_id;
        wafer.frame_id = wrr.frame_id;
        wafer.mask_id = wrr.mask_id;
        wafer.usr_desc = wrr.usr_desc;
        wafer.exc_desc = wrr.exc_desc;
    }

    fn open_dut(&mut self, head: u8, site: u8) {
        let index = self.store.duts.len() as u32 + 1;
        if let Some(previous) = self.open_duts.insert((head, site), index) {
            warn!(head, site, dut = previous, "PIR before the previous part's PRR");
        }
        self.store.duts.push(DutInfo::new(index, head, site));
        self.store.duts_by_site.entry((head, site)).or_default().push(index);
        self.before_prr = true;
    }

    fn close_dut(&mut self, prr: Prr) -> Result<()> {
        let (head, site) = (prr.head_num, prr.site_num);
        let index = self.open_duts.remove(&(head, site)).ok_or_else(|| {
            Error::structure(format!("PRR for head {} site {} before its PIR", head, site))
        })?;
        self.sections.clear();
        self.before_prr = false;

        let status = PartStatus::from_part_flag(prr.part_flg);
        let soft_bin = prr.soft_bin.filter(|b| *b != NO_SOFT_BIN);
        self.count_bin(BinKind::Hard, head, site, prr.hard_bin, status);
        if let Some(bin) = soft_bin {
            self.count_bin(BinKind::Soft, head, site, bin, status);
        }

        let wafer_index = self.open_wafers.get(&head).copied();
        let (x, y) = (prr.x(), prr.y());
        let dut = DutInfo {
            test_count: Some(prr.num_test),
            test_time_ms: prr.test_t,
            part_id: prr.part_id,
            hard_bin: Some(prr.hard_bin),
            soft_bin,
            part_flag: Some(prr.part_flg),
            status: Some(status),
            wafer_index,
            x,
            y,
            ..DutInfo::new(index, head, site)
        };

        if dut.supersedes_part() || dut.supersedes_die() {
            self.mark_superseded(&dut);
        }
        if let Some(slot) = self.store.duts.get_mut(index as usize - 1) {
            *slot = dut;
        }
        Ok(())
    }

    /// Mark earlier parts retested by `dut`
    fn mark_superseded(&mut self, dut: &DutInfo) {
        let earlier = self.store.duts_by_site.get(&(dut.head, dut.site)).cloned().unwrap_or_default();
        for index in earlier.into_iter().filter(|i| *i < dut.index) {
            let Some(previous) = self.store.duts.get_mut(index as usize - 1) else {
                continue;
            };
            let same_part = dut.supersedes_part() && previous.part_id == dut.part_id;
            let same_die = dut.supersedes_die()
                && previous.wafer_index == dut.wafer_index
                && previous.x == dut.x
                && previous.y == dut.y;
            if same_part || same_die {
                previous.superseded = true;
            }
        }
    }

    fn count_bin(&mut self, kind: BinKind, head: u8, site: u8, bin: u16, status: PartStatus) {
        // Inferred from the part result; never replaces an HBR/SBR entry
        self.store.bins.entry((kind, bin)).or_insert_with(|| BinInfo {
            number: bin,
            kind,
            name: String::new(),
            class: status.bin_class(),
            explicit: false,
        });
        *self.store.bin_counts.entry((kind, head, site, bin)).or_insert(0) += 1;
    }

    fn on_bin(&mut self, kind: BinKind, record: BinRecord) {
        let class = record.bin_pf.map_or(BinClass::Unknown, BinClass::from_pf_char);
        let name = record.bin_nam.unwrap_or_default();
        match self.store.bins.entry((kind, record.bin_num)) {
            Entry::Occupied(mut entry) => {
                let info = entry.get_mut();
                if !name.is_empty() {
                    info.name = name;
                }
                if class != BinClass::Unknown {
                    info.class = class;
                }
                info.explicit = true;
            }
            Entry::Vacant(entry) => {
                entry.insert(BinInfo {
                    number: record.bin_num,
                    kind,
                    name,
                    class,
                    explicit: true,
                });
            }
        }
    }

    fn on_tsr(&mut self, tsr: Tsr) {
        let name = tsr.test_nam.unwrap_or_default();
        let test_id = match self.store.test_ids.get(&(tsr.test_num, name.clone())) {
            Some(id) => *id,
            None => {
                let by_number = self
                    .store
                    .test_ids
                    .range((tsr.test_num, String::new())..)
                    .next()
                    .filter(|((num, _), _)| *num == tsr.test_num);
                match by_number {
                    Some(((_, matched), id)) => {
                        debug!(test_num = tsr.test_num, tsr_name = %name, matched = %matched, "TSR name differs; matched by test number");
                        *id
                    }
                    None => {
                        warn!(test_num = tsr.test_num, name = %name, "TSR matches no test record; ignored");
                        return;
                    }
                }
            }
        };

        let count = tsr.fail_cnt.map_or(FailCount::Unknown, FailCount::from_raw);
        if let Some(meta) = self.store.tests.get_mut(test_id as usize) {
            if tsr.head_num == SUMMARY_HEAD {
                meta.summary_fail_count = meta.summary_fail_count.merge(count);
            } else {
                meta.site_fail_count = meta.site_fail_count.merge(count);
            }
        }
    }

    fn on_test(&mut self, record: &RawRecord, order: ByteOrder) -> Result<()> {
        let header = TestHeader::peek(record.kind, &record.body, order)?;
        let kind = test_kind(record.kind).ok_or_else(|| Error::Internal {
            message: format!("{} is not a test record", record.kind),
        })?;
        let dut = self
            .open_duts
            .get(&(header.head_num, header.site_num))
            .copied()
            .ok_or_else(|| {
                Error::structure(format!(
                    "{} test {} for head {} site {} before its PIR",
                    record.kind, header.test_num, header.head_num, header.site_num
                ))
            })?;

        let key = (header.test_num, header.name);
        let test_id = match self.store.test_ids.get(&key).copied() {
            Some(test_id) => {
                if record.kind == RecordKind::Ptr {
                    self.check_limits(test_id, dut, record, order);
                }
                test_id
            }
            None => {
                let test_id = self.store.tests.len() as u32;
                let mut meta = TestMeta::new(test_id, key.0, key.1.clone(), kind);
                first_occurrence(&mut meta, record, order)?;
                meta.seq_name = self.sections.join(";");
                self.store.tests.push(meta);
                self.store.test_ids.insert(key, test_id);
                self.store.offsets.push(TestOffsets::new(self.size_hint));
                test_id
            }
        };

        if let Some(entries) = self.store.offsets.get_mut(test_id as usize) {
            entries.push(kind, dut, header.head_num, header.site_num, record.offset, record.length());
        }
        Ok(())
    }

    /// Record PTR limits that differ from the test's first-seen ones
    fn check_limits(&mut self, test_id: u32, dut: u32, record: &RawRecord, order: ByteOrder) {
        let Ok(ptr) = Ptr::from_body(&record.body, order) else {
            return;
        };
        let Some(flag) = ptr.opt_flag else {
            return;
        };
        let change = self
            .store
            .tests
            .get(test_id as usize)
            .and_then(|meta| meta.limit_change(flag, ptr.lo_limit, ptr.hi_limit));
        if let Some(change) = change {
            self.store.dynamic_limits.insert((test_id, dut), change);
        }
    }
}

/// Fill the optional metadata cached from a test's first record
fn first_occurrence(meta: &mut TestMeta, record: &RawRecord, order: ByteOrder) -> Result<()> {
    match record.kind {
        RecordKind::Ptr => {
            let ptr = Ptr::from_body(&record.body, order)?;
            meta.opt_flag = ptr.opt_flag;
            meta.res_scal = ptr.res_scal;
            meta.lo_limit = ptr.lo_limit;
            meta.hi_limit = ptr.hi_limit;
            meta.lo_spec = ptr.lo_spec;
            meta.hi_spec = ptr.hi_spec;
            meta.units = ptr.units.unwrap_or_default();
        }
        RecordKind::Mpr => {
            let mpr = Mpr::from_body(&record.body, order)?;
            meta.opt_flag = mpr.opt_flag;
            meta.res_scal = mpr.res_scal;
            meta.lo_limit = mpr.lo_limit;
            meta.hi_limit = mpr.hi_limit;
            meta.lo_spec = mpr.lo_spec;
            meta.hi_spec = mpr.hi_spec;
            meta.units = mpr.units.unwrap_or_default();
            meta.result_count = mpr.rslt_cnt.unwrap_or(0);
            meta.pins = mpr.rtn_indx.unwrap_or_default();
        }
        RecordKind::Ftr => {
            let ftr = Ftr::from_body(&record.body, order)?;
            meta.opt_flag = ftr.opt_flag;
            meta.result_count = ftr.rtn_icnt.unwrap_or(0);
            meta.program_count = ftr.pgm_icnt.unwrap_or(0);
            meta.vector = ftr.vect_nam;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::records::Pir;
    use bytes::Bytes;

    const ORDER: ByteOrder = ByteOrder::LittleEndian;

    fn builder() -> IndexBuilder {
        IndexBuilder::new(0, Compression::None, Some(1 << 20), Metrics::new())
    }

    fn push(builder: &mut IndexBuilder, offset: u64, record: StdfRecord) -> Result<()> {
        let raw = RawRecord {
            kind: record.kind(),
            offset,
            body: Bytes::from(record.encode_body(ORDER).unwrap()),
        };
        builder.push(&raw)
    }

    fn start(builder: &mut IndexBuilder) {
        push(builder, 4, StdfRecord::Far(Far { cpu_type: 2, stdf_ver: 4 })).unwrap();
    }

    #[test]
    fn test_record_before_pir_is_structure_error() {
        let mut b = builder();
        start(&mut b);
        let err = push(&mut b, 10, StdfRecord::Ptr(Ptr { test_num: 1, head_num: 1, ..Default::default() }))
            .unwrap_err();
        assert!(matches!(err, Error::Structure { .. }));

        let err = push(&mut b, 40, StdfRecord::Prr(Prr { head_num: 1, ..Default::default() })).unwrap_err();
        assert!(matches!(err, Error::Structure { .. }));
    }

    #[test]
    fn test_explicit_bin_overrides_inferred() {
        let mut b = builder();
        start(&mut b);
        push(&mut b, 10, StdfRecord::Pir(Pir { head_num: 1, site_num: 0 })).unwrap();
        push(
            &mut b,
            16,
            StdfRecord::Prr(Prr { head_num: 1, site_num: 0, part_flg: 0x08, hard_bin: 5, soft_bin: Some(50), ..Default::default() }),
        )
        .unwrap();
        assert_eq!(b.store.bin_info(BinKind::Hard, 5).unwrap().class, BinClass::Fail);

        let hbr = BinRecord { head_num: 255, site_num: 0, bin_num: 5, bin_cnt: Some(1), bin_pf: Some('P'), bin_nam: Some("ODD".into()) };
        push(&mut b, 40, StdfRecord::Hbr(hbr)).unwrap();
        let info = b.store.bin_info(BinKind::Hard, 5).unwrap();
        assert_eq!(info.class, BinClass::Pass);
        assert_eq!(info.name, "ODD");
        assert!(info.explicit);

        // An unknown classification does not replace a known one
        let sbr = BinRecord { head_num: 255, site_num: 0, bin_num: 50, bin_cnt: Some(1), bin_pf: Some(' '), bin_nam: None };
        push(&mut b, 60, StdfRecord::Sbr(sbr)).unwrap();
        assert_eq!(b.store.bin_info(BinKind::Soft, 50).unwrap().class, BinClass::Fail);
    }

    #[test]
    fn test_tsr_summary_and_name_fallback() {
        let mut b = builder();
        start(&mut b);
        push(&mut b, 10, StdfRecord::Pir(Pir { head_num: 1, site_num: 0 })).unwrap();
        let ptr = Ptr { test_num: 7, head_num: 1, site_num: 0, parm_flg: Some(0), result: Some(1.0), test_txt: Some("VDD".into()), ..Default::default() };
        push(&mut b, 16, StdfRecord::Ptr(ptr)).unwrap();

        let site_tsr = Tsr { head_num: 1, site_num: 0, test_typ: 'P', test_num: 7, exec_cnt: Some(1), fail_cnt: Some(2), alrm_cnt: Some(0), test_nam: Some("vdd_alias".into()), ..Default::default() };
        push(&mut b, 60, StdfRecord::Tsr(site_tsr)).unwrap();
        assert_eq!(b.store.tests[0].fail_count(), FailCount::Count(2));

        let summary = Tsr { head_num: 255, site_num: 0, test_typ: 'P', test_num: 7, exec_cnt: Some(1), fail_cnt: Some(5), alrm_cnt: Some(0), test_nam: Some("VDD".into()), ..Default::default() };
        push(&mut b, 90, StdfRecord::Tsr(summary)).unwrap();
        assert_eq!(b.store.tests[0].fail_count(), FailCount::Count(5));

        let unknown = Tsr { head_num: 1, site_num: 0, test_typ: 'P', test_num: 99, fail_cnt: Some(u32::MAX), ..Default::default() };
        push(&mut b, 120, StdfRecord::Tsr(unknown)).unwrap();
    }

    #[test]
    fn test_program_sections_and_dynamic_limits() {
        let mut b = builder();
        start(&mut b);
        push(&mut b, 10, StdfRecord::Bps(crate::format::records::Bps { seq_name: Some("power".into()) })).unwrap();
        push(&mut b, 14, StdfRecord::Pir(Pir { head_num: 1, site_num: 0 })).unwrap();
        let first = Ptr {
            test_num: 1,
            head_num: 1,
            site_num: 0,
            parm_flg: Some(0),
            result: Some(1.0),
            test_txt: Some("IDD".into()),
            alarm_id: Some(String::new()),
            opt_flag: Some(0),
            res_scal: Some(0),
            llm_scal: Some(0),
            hlm_scal: Some(0),
            lo_limit: Some(0.5),
            hi_limit: Some(2.0),
            ..Default::default()
        };
        push(&mut b, 20, StdfRecord::Ptr(first.clone())).unwrap();
        push(&mut b, 80, StdfRecord::Prr(Prr { head_num: 1, site_num: 0, hard_bin: 1, ..Default::default() })).unwrap();
        push(&mut b, 100, StdfRecord::Pir(Pir { head_num: 1, site_num: 0 })).unwrap();
        let later = Ptr { hi_limit: Some(3.0), ..first };
        push(&mut b, 110, StdfRecord::Ptr(later)).unwrap();

        assert_eq!(b.store.tests[0].seq_name, "power");
        let limits = b.store.dynamic_limits(0);
        assert_eq!(limits.len(), 1);
        assert_eq!(limits[0].0, 2);
        assert_eq!(limits[0].1.hi_limit, Some(3.0));
        assert_eq!(limits[0].1.lo_limit, None);
        assert_eq!(b.store.entry_count(0), 2);
    }

    #[test]
    fn test_truncated_body_skipped() {
        let mut b = builder();
        start(&mut b);
        let raw = RawRecord { kind: RecordKind::Prr, offset: 10, body: Bytes::from_static(&[1, 0]) };
        b.push(&raw).unwrap();
        assert_eq!(b.store.truncated_records(), 1);
        assert_eq!(b.store.record_count(RecordKind::Prr), 1);
    }
}
