//! Row types of the offset index store.

use serde::{Deserialize, Serialize};

use stdfdb_core::types::{BinClass, BinKind, FailCount, PartStatus, TestKind};
use stdfdb_core::utils::{scale_factor, scaled_unit};

use super::offsets::OffsetColumn;

/// OPT_FLAG bits that invalidate each limit
const LO_LIMIT_INVALID: u8 = 0x50;
const HI_LIMIT_INVALID: u8 = 0xA0;
const LO_SPEC_INVALID: u8 = 0x04;
const HI_SPEC_INVALID: u8 = 0x08;
const RES_SCAL_INVALID: u8 = 0x01;

/// First-seen metadata of one test identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestMeta {
    pub test_id: u32,
    pub test_num: u32,
    pub name: String,
    pub kind: TestKind,
    pub opt_flag: Option<u8>,
    pub res_scal: Option<i8>,
    pub lo_limit: Option<f32>,
    pub hi_limit: Option<f32>,
    pub lo_spec: Option<f32>,
    pub hi_spec: Option<f32>,
    pub units: String,
    /// MPR RTN_INDX of the first occurrence
    pub pins: Vec<u16>,
    /// MPR RSLT_CNT, or FTR RTN_ICNT, of the first occurrence
    pub result_count: u16,
    /// FTR PGM_ICNT of the first occurrence
    pub program_count: u16,
    /// FTR VECT_NAM of the first occurrence
    pub vector: Option<String>,
    /// Program sections open at the first occurrence, joined with ';'
    pub seq_name: String,
    /// Sum of per-site TSR fail counts
    pub site_fail_count: FailCount,
    /// Fail count from a head-255 summary TSR
    pub summary_fail_count: FailCount,
}

impl TestMeta {
    pub fn new(test_id: u32, test_num: u32, name: String, kind: TestKind) -> Self {
        Self {
            test_id,
            test_num,
            name,
            kind,
            opt_flag: None,
            res_scal: None,
            lo_limit: None,
            hi_limit: None,
            lo_spec: None,
            hi_spec: None,
            units: String::new(),
            pins: Vec::new(),
            result_count: 0,
            program_count: 0,
            vector: None,
            seq_name: String::new(),
            site_fail_count: FailCount::Unknown,
            summary_fail_count: FailCount::Unknown,
        }
    }

    /// Result scale exponent; 0 when absent or flagged invalid
    pub fn scale(&self) -> i8 {
        match (self.opt_flag, self.res_scal) {
            (Some(flag), _) if flag & RES_SCAL_INVALID != 0 => 0,
            (_, Some(scale)) => scale,
            _ => 0,
        }
    }

    fn masked(&self, value: Option<f32>, mask: u8) -> Option<f64> {
        let flag = self.opt_flag?;
        if flag & mask != 0 {
            return None;
        }
        value
            .filter(|v| v.is_finite())
            .map(|v| v as f64 * scale_factor(self.scale()))
    }

    pub fn low_limit(&self) -> Option<f64> {
        self.masked(self.lo_limit, LO_LIMIT_INVALID)
    }

    pub fn high_limit(&self) -> Option<f64> {
        self.masked(self.hi_limit, HI_LIMIT_INVALID)
    }

    pub fn low_spec(&self) -> Option<f64> {
        self.masked(self.lo_spec, LO_SPEC_INVALID)
    }

    pub fn high_spec(&self) -> Option<f64> {
        self.masked(self.hi_spec, HI_SPEC_INVALID)
    }

    /// Unit with the scale prefix applied
    pub fn unit(&self) -> String {
        if self.units.is_empty() {
            return String::new();
        }
        scaled_unit(&self.units, self.scale())
    }

    /// TSR fail count; a summary TSR wins over per-site ones
    pub fn fail_count(&self) -> FailCount {
        match self.summary_fail_count {
            FailCount::Count(n) => FailCount::Count(n),
            FailCount::Unknown => self.site_fail_count,
        }
    }

    /// Pin indexes this test expands into; positional when RTN_INDX was absent
    pub fn pin_indexes(&self) -> Vec<u32> {
        if self.kind != TestKind::MultiResult {
            return vec![0];
        }
        if !self.pins.is_empty() {
            self.pins.iter().map(|p| *p as u32).collect()
        } else if self.result_count > 0 {
            (1..=self.result_count as u32).collect()
        } else {
            vec![0]
        }
    }

    /// Position inside RTN_RSLT for a pin index
    pub fn result_position(&self, pin_index: u32) -> Option<usize> {
        if self.kind != TestKind::MultiResult || pin_index == 0 {
            return None;
        }
        if !self.pins.is_empty() {
            self.pins.iter().position(|p| *p as u32 == pin_index)
        } else {
            Some(pin_index as usize - 1)
        }
    }

    /// Limits of a later record that differ from the first-seen ones.
    ///
    /// Only sides the later OPT_FLAG marks valid are compared; `None` when
    /// neither side changed.
    pub fn limit_change(&self, opt_flag: u8, lo: Option<f32>, hi: Option<f32>) -> Option<DynamicLimit> {
        let first_lo = self.opt_flag.and_then(|f| valid_limit(f, LO_LIMIT_INVALID, self.lo_limit));
        let first_hi = self.opt_flag.and_then(|f| valid_limit(f, HI_LIMIT_INVALID, self.hi_limit));
        let lo = valid_limit(opt_flag, LO_LIMIT_INVALID, lo).filter(|v| Some(*v) != first_lo);
        let hi = valid_limit(opt_flag, HI_LIMIT_INVALID, hi).filter(|v| Some(*v) != first_hi);
        if lo.is_none() && hi.is_none() {
            return None;
        }
        Some(DynamicLimit { lo_limit: lo, hi_limit: hi })
    }
}

fn valid_limit(opt_flag: u8, mask: u8, value: Option<f32>) -> Option<f32> {
    if opt_flag & mask != 0 {
        return None;
    }
    value.filter(|v| v.is_finite())
}

/// All offset entries of one test identity, in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOffsets {
    pub kinds: Vec<TestKind>,
    pub duts: Vec<u32>,
    pub heads: Vec<u8>,
    pub sites: Vec<u8>,
    pub offsets: OffsetColumn,
    pub lengths: Vec<u16>,
}

impl TestOffsets {
    pub fn new(size_hint: Option<u64>) -> Self {
        Self {
            kinds: Vec::new(),
            duts: Vec::new(),
            heads: Vec::new(),
            sites: Vec::new(),
            offsets: OffsetColumn::for_size(size_hint),
            lengths: Vec::new(),
        }
    }

    pub fn push(&mut self, kind: TestKind, dut: u32, head: u8, site: u8, offset: u64, length: u16) {
        self.kinds.push(kind);
        self.duts.push(dut);
        self.heads.push(head);
        self.sites.push(site);
        self.offsets.push(offset);
        self.lengths.push(length);
    }

    pub fn len(&self) -> usize {
        self.duts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.duts.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<OffsetRow> {
        Some(OffsetRow {
            kind: *self.kinds.get(i)?,
            dut: *self.duts.get(i)?,
            head: *self.heads.get(i)?,
            site: *self.sites.get(i)?,
            offset: self.offsets.get(i)?,
            length: *self.lengths.get(i)?,
        })
    }
}

/// One offset entry as returned by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRow {
    pub kind: TestKind,
    pub dut: u32,
    pub head: u8,
    pub site: u8,
    pub offset: u64,
    pub length: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DutInfo {
    /// 1-based, in PIR order
    pub index: u32,
    pub head: u8,
    pub site: u8,
    pub test_count: Option<u16>,
    pub test_time_ms: Option<u32>,
    pub part_id: Option<String>,
    pub hard_bin: Option<u16>,
    pub soft_bin: Option<u16>,
    pub part_flag: Option<u8>,
    /// `None` while the DUT is open, or if its PRR never arrived
    pub status: Option<PartStatus>,
    pub wafer_index: Option<u32>,
    pub x: Option<i16>,
    pub y: Option<i16>,
    /// A later part retested this one
    pub superseded: bool,
}

impl DutInfo {
    pub fn new(index: u32, head: u8, site: u8) -> Self {
        Self {
            index,
            head,
            site,
            test_count: None,
            test_time_ms: None,
            part_id: None,
            hard_bin: None,
            soft_bin: None,
            part_flag: None,
            status: None,
            wafer_index: None,
            x: None,
            y: None,
            superseded: false,
        }
    }

    /// PART_FLG bit 0: retest of an earlier part with the same PART_ID
    pub fn supersedes_part(&self) -> bool {
        self.part_flag.is_some_and(|f| f & 0b0000_0001 != 0)
    }

    /// PART_FLG bit 1: retest of an earlier part at the same die position
    pub fn supersedes_die(&self) -> bool {
        self.part_flag.is_some_and(|f| f & 0b0000_0010 != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinInfo {
    pub number: u16,
    pub kind: BinKind,
    pub name: String,
    pub class: BinClass,
    /// Set once an HBR/SBR described this bin
    pub explicit: bool,
}

/// Row of a bin distribution query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinCount {
    pub number: u16,
    pub name: String,
    pub class: BinClass,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaferInfo {
    /// 1-based, in WIR order
    pub index: u32,
    pub head: u8,
    pub wafer_id: String,
    pub start_t: Option<u32>,
    pub finish_t: Option<u32>,
    pub part_cnt: Option<u32>,
    pub rtst_cnt: Option<u32>,
    pub abrt_cnt: Option<u32>,
    pub good_cnt: Option<u32>,
    pub func_cnt: Option<u32>,
    pub fabwf_id: Option<String>,
    pub frame_id: Option<String>,
    pub mask_id: Option<String>,
    pub usr_desc: Option<String>,
    pub exc_desc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInfo {
    pub index: u16,
    pub chan_typ: Option<u16>,
    pub chan_nam: String,
    pub phy_nam: String,
    pub log_nam: String,
    pub head: Option<u8>,
    pub site: Option<u8>,
    /// Pin groups (PGR) containing this pin
    pub groups: Vec<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinGroup {
    pub index: u16,
    pub name: String,
    pub pins: Vec<u16>,
}

/// PCR counts for one head/site (255/255 for the whole lot)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCount {
    pub head: u8,
    pub site: u8,
    pub part_cnt: Option<u32>,
    pub rtst_cnt: Option<u32>,
    pub abrt_cnt: Option<u32>,
    pub good_cnt: Option<u32>,
    pub func_cnt: Option<u32>,
}

/// Raw limits of a later record that differ from the first-seen ones;
/// `None` on a side means that side did not change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicLimit {
    pub lo_limit: Option<f32>,
    pub hi_limit: Option<f32>,
}

impl DynamicLimit {
    /// Scaled the same way as the test's first-seen limits
    pub fn scaled(&self, scale: i8) -> (Option<f64>, Option<f64>) {
        let factor = scale_factor(scale);
        (
            self.lo_limit.map(|v| v as f64 * factor),
            self.hi_limit.map(|v| v as f64 * factor),
        )
    }
}

/// DTR text, anchored to the most recently started DUT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatalogEntry {
    /// `None` before the first PIR
    pub after_dut: Option<u32>,
    /// Written between that DUT's PIR and PRR
    pub before_prr: bool,
    pub text: String,
}
