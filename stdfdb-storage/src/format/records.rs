//! Typed STDF records.
//!
//! Each tracked record kind has a struct carrying exactly its fields.
//! Identity fields the index depends on are plain values; everything a writer
//! may omit from the tail is an `Option`. Count-prefixed arrays keep their
//! count field so a record whose tail was cut before the array decodes the
//! same way it was written.

use stdfdb_core::error::{Error, Result};
use stdfdb_core::types::ByteOrder;

use super::codec::{BitField, FieldReader, FieldWriter};
use super::schema::{decode_generic, FieldValue, RecordKind};
use super::RecordHeader;

/// Decode/encode for one typed record body
pub trait Record: Sized {
    const KIND: RecordKind;

    fn decode(reader: &mut FieldReader<'_>) -> Result<Self>;

    fn encode(&self, writer: &mut FieldWriter);

    fn from_body(body: &[u8], order: ByteOrder) -> Result<Self> {
        Self::decode(&mut FieldReader::new(body, order))
    }
}

fn count_of(count: Option<u16>) -> Option<usize> {
    count.map(usize::from)
}

/// File Attributes Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Far {
    pub cpu_type: u8,
    pub stdf_ver: u8,
}

impl Record for Far {
    const KIND: RecordKind = RecordKind::Far;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { cpu_type: r.u1()?, stdf_ver: r.u1()? })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.cpu_type);
        w.u1(self.stdf_ver);
    }
}

/// Audit Trail Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Atr {
    pub mod_tim: Option<u32>,
    pub cmd_line: Option<String>,
}

impl Record for Atr {
    const KIND: RecordKind = RecordKind::Atr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { mod_tim: r.opt(FieldReader::u4), cmd_line: r.opt(FieldReader::cn) })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.opt(&self.mod_tim, |w, v| w.u4(*v));
        w.opt(&self.cmd_line, |w, v| w.cn(v));
    }
}

/// Version Update Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vur {
    pub upd_cnt: u8,
    pub upd_nam: Option<Vec<String>>,
}

impl Record for Vur {
    const KIND: RecordKind = RecordKind::Vur;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let upd_cnt = r.u1()?;
        let upd_nam = r.opt_array(Some(upd_cnt as usize), FieldReader::cn_array);
        Ok(Self { upd_cnt, upd_nam })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.upd_cnt);
        w.opt(&self.upd_nam, |w, names| names.iter().for_each(|n| w.cn(n)));
    }
}

/// Master Information Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mir {
    pub setup_t: u32,
    pub start_t: u32,
    pub stat_num: u8,
    pub mode_cod: Option<char>,
    pub rtst_cod: Option<char>,
    pub prot_cod: Option<char>,
    pub burn_tim: Option<u16>,
    pub cmod_cod: Option<char>,
    pub lot_id: Option<String>,
    pub part_typ: Option<String>,
    pub node_nam: Option<String>,
    pub tstr_typ: Option<String>,
    pub job_nam: Option<String>,
    pub job_rev: Option<String>,
    pub sblot_id: Option<String>,
    pub oper_nam: Option<String>,
    pub exec_typ: Option<String>,
    pub exec_ver: Option<String>,
    pub test_cod: Option<String>,
    pub tst_temp: Option<String>,
    pub user_txt: Option<String>,
    pub aux_file: Option<String>,
    pub pkg_typ: Option<String>,
    pub famly_id: Option<String>,
    pub date_cod: Option<String>,
    pub facil_id: Option<String>,
    pub floor_id: Option<String>,
    pub proc_id: Option<String>,
    pub oper_frq: Option<String>,
    pub spec_nam: Option<String>,
    pub spec_ver: Option<String>,
    pub flow_id: Option<String>,
    pub setup_id: Option<String>,
    pub dsgn_rev: Option<String>,
    pub eng_id: Option<String>,
    pub rom_cod: Option<String>,
    pub serl_num: Option<String>,
    pub supr_nam: Option<String>,
}

impl Mir {
    /// Text fields in record order, paired with their field names
    pub fn text_fields(&self) -> [(&'static str, &Option<String>); 30] {
        [
            ("LOT_ID", &self.lot_id),
            ("PART_TYP", &self.part_typ),
            ("NODE_NAM", &self.node_nam),
            ("TSTR_TYP", &self.tstr_typ),
            ("JOB_NAM", &self.job_nam),
            ("JOB_REV", &self.job_rev),
            ("SBLOT_ID", &self.sblot_id),
            ("OPER_NAM", &self.oper_nam),
            ("EXEC_TYP", &self.exec_typ),
            ("EXEC_VER", &self.exec_ver),
            ("TEST_COD", &self.test_cod),
            ("TST_TEMP", &self.tst_temp),
            ("USER_TXT", &self.user_txt),
            ("AUX_FILE", &self.aux_file),
            ("PKG_TYP", &self.pkg_typ),
            ("FAMLY_ID", &self.famly_id),
            ("DATE_COD", &self.date_cod),
            ("FACIL_ID", &self.facil_id),
            ("FLOOR_ID", &self.floor_id),
            ("PROC_ID", &self.proc_id),
            ("OPER_FRQ", &self.oper_frq),
            ("SPEC_NAM", &self.spec_nam),
            ("SPEC_VER", &self.spec_ver),
            ("FLOW_ID", &self.flow_id),
            ("SETUP_ID", &self.setup_id),
            ("DSGN_REV", &self.dsgn_rev),
            ("ENG_ID", &self.eng_id),
            ("ROM_COD", &self.rom_cod),
            ("SERL_NUM", &self.serl_num),
            ("SUPR_NAM", &self.supr_nam),
        ]
    }
}

impl Record for Mir {
    const KIND: RecordKind = RecordKind::Mir;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            setup_t: r.u4()?,
            start_t: r.u4()?,
            stat_num: r.u1()?,
            mode_cod: r.opt(FieldReader::c1),
            rtst_cod: r.opt(FieldReader::c1),
            prot_cod: r.opt(FieldReader::c1),
            burn_tim: r.opt(FieldReader::u2),
            cmod_cod: r.opt(FieldReader::c1),
            lot_id: r.opt(FieldReader::cn),
            part_typ: r.opt(FieldReader::cn),
            node_nam: r.opt(FieldReader::cn),
            tstr_typ: r.opt(FieldReader::cn),
            job_nam: r.opt(FieldReader::cn),
            job_rev: r.opt(FieldReader::cn),
            sblot_id: r.opt(FieldReader::cn),
            oper_nam: r.opt(FieldReader::cn),
            exec_typ: r.opt(FieldReader::cn),
            exec_ver: r.opt(FieldReader::cn),
            test_cod: r.opt(FieldReader::cn),
            tst_temp: r.opt(FieldReader::cn),
            user_txt: r.opt(FieldReader::cn),
            aux_file: r.opt(FieldReader::cn),
            pkg_typ: r.opt(FieldReader::cn),
            famly_id: r.opt(FieldReader::cn),
            date_cod: r.opt(FieldReader::cn),
            facil_id: r.opt(FieldReader::cn),
            floor_id: r.opt(FieldReader::cn),
            proc_id: r.opt(FieldReader::cn),
            oper_frq: r.opt(FieldReader::cn),
            spec_nam: r.opt(FieldReader::cn),
            spec_ver: r.opt(FieldReader::cn),
            flow_id: r.opt(FieldReader::cn),
            setup_id: r.opt(FieldReader::cn),
            dsgn_rev: r.opt(FieldReader::cn),
            eng_id: r.opt(FieldReader::cn),
            rom_cod: r.opt(FieldReader::cn),
            serl_num: r.opt(FieldReader::cn),
            supr_nam: r.opt(FieldReader::cn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u4(self.setup_t);
        w.u4(self.start_t);
        w.u1(self.stat_num);
        w.opt(&self.mode_cod, |w, v| w.c1(*v));
        w.opt(&self.rtst_cod, |w, v| w.c1(*v));
        w.opt(&self.prot_cod, |w, v| w.c1(*v));
        w.opt(&self.burn_tim, |w, v| w.u2(*v));
        w.opt(&self.cmod_cod, |w, v| w.c1(*v));
        for (_, text) in self.text_fields() {
            w.opt(text, |w, v| w.cn(v));
        }
    }
}

/// Master Results Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mrr {
    pub finish_t: u32,
    pub disp_cod: Option<char>,
    pub usr_desc: Option<String>,
    pub exc_desc: Option<String>,
}

impl Record for Mrr {
    const KIND: RecordKind = RecordKind::Mrr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            finish_t: r.u4()?,
            disp_cod: r.opt(FieldReader::c1),
            usr_desc: r.opt(FieldReader::cn),
            exc_desc: r.opt(FieldReader::cn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u4(self.finish_t);
        w.opt(&self.disp_cod, |w, v| w.c1(*v));
        w.opt(&self.usr_desc, |w, v| w.cn(v));
        w.opt(&self.exc_desc, |w, v| w.cn(v));
    }
}

/// Part Count Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pcr {
    pub head_num: u8,
    pub site_num: u8,
    pub part_cnt: Option<u32>,
    pub rtst_cnt: Option<u32>,
    pub abrt_cnt: Option<u32>,
    pub good_cnt: Option<u32>,
    pub func_cnt: Option<u32>,
}

impl Record for Pcr {
    const KIND: RecordKind = RecordKind::Pcr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_num: r.u1()?,
            part_cnt: r.opt(FieldReader::u4),
            rtst_cnt: r.opt(FieldReader::u4),
            abrt_cnt: r.opt(FieldReader::u4),
            good_cnt: r.opt(FieldReader::u4),
            func_cnt: r.opt(FieldReader::u4),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_num);
        for count in [&self.part_cnt, &self.rtst_cnt, &self.abrt_cnt, &self.good_cnt, &self.func_cnt] {
            w.opt(count, |w, v| w.u4(*v));
        }
    }
}

/// Hardware (HBR) or software (SBR) bin record; both share one layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinRecord {
    pub head_num: u8,
    pub site_num: u8,
    pub bin_num: u16,
    pub bin_cnt: Option<u32>,
    pub bin_pf: Option<char>,
    pub bin_nam: Option<String>,
}

impl BinRecord {
    pub fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_num: r.u1()?,
            bin_num: r.u2()?,
            bin_cnt: r.opt(FieldReader::u4),
            bin_pf: r.opt(FieldReader::c1),
            bin_nam: r.opt(FieldReader::cn),
        })
    }

    pub fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.u2(self.bin_num);
        w.opt(&self.bin_cnt, |w, v| w.u4(*v));
        w.opt(&self.bin_pf, |w, v| w.c1(*v));
        w.opt(&self.bin_nam, |w, v| w.cn(v));
    }
}

/// Pin Map Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pmr {
    pub pmr_indx: u16,
    pub chan_typ: Option<u16>,
    pub chan_nam: Option<String>,
    pub phy_nam: Option<String>,
    pub log_nam: Option<String>,
    pub head_num: Option<u8>,
    pub site_num: Option<u8>,
}

impl Record for Pmr {
    const KIND: RecordKind = RecordKind::Pmr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            pmr_indx: r.u2()?,
            chan_typ: r.opt(FieldReader::u2),
            chan_nam: r.opt(FieldReader::cn),
            phy_nam: r.opt(FieldReader::cn),
            log_nam: r.opt(FieldReader::cn),
            head_num: r.opt(FieldReader::u1),
            site_num: r.opt(FieldReader::u1),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u2(self.pmr_indx);
        w.opt(&self.chan_typ, |w, v| w.u2(*v));
        w.opt(&self.chan_nam, |w, v| w.cn(v));
        w.opt(&self.phy_nam, |w, v| w.cn(v));
        w.opt(&self.log_nam, |w, v| w.cn(v));
        w.opt(&self.head_num, |w, v| w.u1(*v));
        w.opt(&self.site_num, |w, v| w.u1(*v));
    }
}

/// Pin Group Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pgr {
    pub grp_indx: u16,
    pub grp_nam: Option<String>,
    pub indx_cnt: Option<u16>,
    pub pmr_indx: Option<Vec<u16>>,
}

impl Record for Pgr {
    const KIND: RecordKind = RecordKind::Pgr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let grp_indx = r.u2()?;
        let grp_nam = r.opt(FieldReader::cn);
        let indx_cnt = r.opt(FieldReader::u2);
        let pmr_indx = r.opt_array(count_of(indx_cnt), |r, n| r.array(n, FieldReader::u2));
        Ok(Self { grp_indx, grp_nam, indx_cnt, pmr_indx })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u2(self.grp_indx);
        w.opt(&self.grp_nam, |w, v| w.cn(v));
        w.opt(&self.indx_cnt, |w, v| w.u2(*v));
        w.opt(&self.pmr_indx, |w, v| v.iter().for_each(|i| w.u2(*i)));
    }
}

/// Wafer Information Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wir {
    pub head_num: u8,
    pub site_grp: u8,
    pub start_t: u32,
    pub wafer_id: Option<String>,
}

impl Record for Wir {
    const KIND: RecordKind = RecordKind::Wir;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_grp: r.u1()?,
            start_t: r.u4()?,
            wafer_id: r.opt(FieldReader::cn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_grp);
        w.u4(self.start_t);
        w.opt(&self.wafer_id, |w, v| w.cn(v));
    }
}

/// Wafer Results Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wrr {
    pub head_num: u8,
    pub site_grp: u8,
    pub finish_t: u32,
    pub part_cnt: u32,
    pub rtst_cnt: Option<u32>,
    pub abrt_cnt: Option<u32>,
    pub good_cnt: Option<u32>,
    pub func_cnt: Option<u32>,
    pub wafer_id: Option<String>,
    pub fabwf_id: Option<String>,
    pub frame_id: Option<String>,
    pub mask_id: Option<String>,
    pub usr_desc: Option<String>,
    pub exc_desc: Option<String>,
}

impl Record for Wrr {
    const KIND: RecordKind = RecordKind::Wrr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_grp: r.u1()?,
            finish_t: r.u4()?,
            part_cnt: r.u4()?,
            rtst_cnt: r.opt(FieldReader::u4),
            abrt_cnt: r.opt(FieldReader::u4),
            good_cnt: r.opt(FieldReader::u4),
            func_cnt: r.opt(FieldReader::u4),
            wafer_id: r.opt(FieldReader::cn),
            fabwf_id: r.opt(FieldReader::cn),
            frame_id: r.opt(FieldReader::cn),
            mask_id: r.opt(FieldReader::cn),
            usr_desc: r.opt(FieldReader::cn),
            exc_desc: r.opt(FieldReader::cn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_grp);
        w.u4(self.finish_t);
        w.u4(self.part_cnt);
        for count in [&self.rtst_cnt, &self.abrt_cnt, &self.good_cnt, &self.func_cnt] {
            w.opt(count, |w, v| w.u4(*v));
        }
        for text in [&self.wafer_id, &self.fabwf_id, &self.frame_id, &self.mask_id, &self.usr_desc, &self.exc_desc] {
            w.opt(text, |w, v| w.cn(v));
        }
    }
}

/// Wafer Configuration Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Wcr {
    pub wafr_siz: Option<f32>,
    pub die_ht: Option<f32>,
    pub die_wid: Option<f32>,
    pub wf_units: Option<u8>,
    pub wf_flat: Option<char>,
    pub center_x: Option<i16>,
    pub center_y: Option<i16>,
    pub pos_x: Option<char>,
    pub pos_y: Option<char>,
}

impl Record for Wcr {
    const KIND: RecordKind = RecordKind::Wcr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            wafr_siz: r.opt(FieldReader::r4),
            die_ht: r.opt(FieldReader::r4),
            die_wid: r.opt(FieldReader::r4),
            wf_units: r.opt(FieldReader::u1),
            wf_flat: r.opt(FieldReader::c1),
            center_x: r.opt(FieldReader::i2),
            center_y: r.opt(FieldReader::i2),
            pos_x: r.opt(FieldReader::c1),
            pos_y: r.opt(FieldReader::c1),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.opt(&self.wafr_siz, |w, v| w.r4(*v));
        w.opt(&self.die_ht, |w, v| w.r4(*v));
        w.opt(&self.die_wid, |w, v| w.r4(*v));
        w.opt(&self.wf_units, |w, v| w.u1(*v));
        w.opt(&self.wf_flat, |w, v| w.c1(*v));
        w.opt(&self.center_x, |w, v| w.i2(*v));
        w.opt(&self.center_y, |w, v| w.i2(*v));
        w.opt(&self.pos_x, |w, v| w.c1(*v));
        w.opt(&self.pos_y, |w, v| w.c1(*v));
    }
}

/// Part Information Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pir {
    pub head_num: u8,
    pub site_num: u8,
}

impl Record for Pir {
    const KIND: RecordKind = RecordKind::Pir;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { head_num: r.u1()?, site_num: r.u1()? })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_num);
    }
}

/// Part Results Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prr {
    pub head_num: u8,
    pub site_num: u8,
    pub part_flg: u8,
    pub num_test: u16,
    pub hard_bin: u16,
    pub soft_bin: Option<u16>,
    pub x_coord: Option<i16>,
    pub y_coord: Option<i16>,
    pub test_t: Option<u32>,
    pub part_id: Option<String>,
    pub part_txt: Option<String>,
    pub part_fix: Option<Vec<u8>>,
}

impl Prr {
    /// Coordinates use -32768 for "no coordinate"
    pub const NO_COORD: i16 = i16::MIN;

    pub fn x(&self) -> Option<i16> {
        self.x_coord.filter(|x| *x != Self::NO_COORD)
    }

    pub fn y(&self) -> Option<i16> {
        self.y_coord.filter(|y| *y != Self::NO_COORD)
    }
}

impl Record for Prr {
    const KIND: RecordKind = RecordKind::Prr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_num: r.u1()?,
            part_flg: r.b1()?,
            num_test: r.u2()?,
            hard_bin: r.u2()?,
            soft_bin: r.opt(FieldReader::u2),
            x_coord: r.opt(FieldReader::i2),
            y_coord: r.opt(FieldReader::i2),
            test_t: r.opt(FieldReader::u4),
            part_id: r.opt(FieldReader::cn),
            part_txt: r.opt(FieldReader::cn),
            part_fix: r.opt(FieldReader::bn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.b1(self.part_flg);
        w.u2(self.num_test);
        w.u2(self.hard_bin);
        w.opt(&self.soft_bin, |w, v| w.u2(*v));
        w.opt(&self.x_coord, |w, v| w.i2(*v));
        w.opt(&self.y_coord, |w, v| w.i2(*v));
        w.opt(&self.test_t, |w, v| w.u4(*v));
        w.opt(&self.part_id, |w, v| w.cn(v));
        w.opt(&self.part_txt, |w, v| w.cn(v));
        w.opt(&self.part_fix, |w, v| w.bn(v));
    }
}

/// Test Synopsis Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tsr {
    pub head_num: u8,
    pub site_num: u8,
    pub test_typ: char,
    pub test_num: u32,
    pub exec_cnt: Option<u32>,
    pub fail_cnt: Option<u32>,
    pub alrm_cnt: Option<u32>,
    pub test_nam: Option<String>,
    pub seq_name: Option<String>,
    pub test_lbl: Option<String>,
    pub opt_flag: Option<u8>,
    pub test_tim: Option<f32>,
    pub test_min: Option<f32>,
    pub test_max: Option<f32>,
    pub tst_sums: Option<f32>,
    pub tst_sqrs: Option<f32>,
}

impl Record for Tsr {
    const KIND: RecordKind = RecordKind::Tsr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            head_num: r.u1()?,
            site_num: r.u1()?,
            test_typ: r.c1()?,
            test_num: r.u4()?,
            exec_cnt: r.opt(FieldReader::u4),
            fail_cnt: r.opt(FieldReader::u4),
            alrm_cnt: r.opt(FieldReader::u4),
            test_nam: r.opt(FieldReader::cn),
            seq_name: r.opt(FieldReader::cn),
            test_lbl: r.opt(FieldReader::cn),
            opt_flag: r.opt(FieldReader::b1),
            test_tim: r.opt(FieldReader::r4),
            test_min: r.opt(FieldReader::r4),
            test_max: r.opt(FieldReader::r4),
            tst_sums: r.opt(FieldReader::r4),
            tst_sqrs: r.opt(FieldReader::r4),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.c1(self.test_typ);
        w.u4(self.test_num);
        w.opt(&self.exec_cnt, |w, v| w.u4(*v));
        w.opt(&self.fail_cnt, |w, v| w.u4(*v));
        w.opt(&self.alrm_cnt, |w, v| w.u4(*v));
        w.opt(&self.test_nam, |w, v| w.cn(v));
        w.opt(&self.seq_name, |w, v| w.cn(v));
        w.opt(&self.test_lbl, |w, v| w.cn(v));
        w.opt(&self.opt_flag, |w, v| w.b1(*v));
        for value in [&self.test_tim, &self.test_min, &self.test_max, &self.tst_sums, &self.tst_sqrs] {
            w.opt(value, |w, v| w.r4(*v));
        }
    }
}

/// Parametric Test Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ptr {
    pub test_num: u32,
    pub head_num: u8,
    pub site_num: u8,
    pub test_flg: u8,
    pub parm_flg: Option<u8>,
    pub result: Option<f32>,
    pub test_txt: Option<String>,
    pub alarm_id: Option<String>,
    pub opt_flag: Option<u8>,
    pub res_scal: Option<i8>,
    pub llm_scal: Option<i8>,
    pub hlm_scal: Option<i8>,
    pub lo_limit: Option<f32>,
    pub hi_limit: Option<f32>,
    pub units: Option<String>,
    pub c_resfmt: Option<String>,
    pub c_llmfmt: Option<String>,
    pub c_hlmfmt: Option<String>,
    pub lo_spec: Option<f32>,
    pub hi_spec: Option<f32>,
}

impl Record for Ptr {
    const KIND: RecordKind = RecordKind::Ptr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            test_num: r.u4()?,
            head_num: r.u1()?,
            site_num: r.u1()?,
            test_flg: r.b1()?,
            parm_flg: r.opt(FieldReader::b1),
            result: r.opt(FieldReader::r4),
            test_txt: r.opt(FieldReader::cn),
            alarm_id: r.opt(FieldReader::cn),
            opt_flag: r.opt(FieldReader::b1),
            res_scal: r.opt(FieldReader::i1),
            llm_scal: r.opt(FieldReader::i1),
            hlm_scal: r.opt(FieldReader::i1),
            lo_limit: r.opt(FieldReader::r4),
            hi_limit: r.opt(FieldReader::r4),
            units: r.opt(FieldReader::cn),
            c_resfmt: r.opt(FieldReader::cn),
            c_llmfmt: r.opt(FieldReader::cn),
            c_hlmfmt: r.opt(FieldReader::cn),
            lo_spec: r.opt(FieldReader::r4),
            hi_spec: r.opt(FieldReader::r4),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u4(self.test_num);
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.b1(self.test_flg);
        w.opt(&self.parm_flg, |w, v| w.b1(*v));
        w.opt(&self.result, |w, v| w.r4(*v));
        w.opt(&self.test_txt, |w, v| w.cn(v));
        w.opt(&self.alarm_id, |w, v| w.cn(v));
        w.opt(&self.opt_flag, |w, v| w.b1(*v));
        w.opt(&self.res_scal, |w, v| w.i1(*v));
        w.opt(&self.llm_scal, |w, v| w.i1(*v));
        w.opt(&self.hlm_scal, |w, v| w.i1(*v));
        w.opt(&self.lo_limit, |w, v| w.r4(*v));
        w.opt(&self.hi_limit, |w, v| w.r4(*v));
        w.opt(&self.units, |w, v| w.cn(v));
        w.opt(&self.c_resfmt, |w, v| w.cn(v));
        w.opt(&self.c_llmfmt, |w, v| w.cn(v));
        w.opt(&self.c_hlmfmt, |w, v| w.cn(v));
        w.opt(&self.lo_spec, |w, v| w.r4(*v));
        w.opt(&self.hi_spec, |w, v| w.r4(*v));
    }
}

/// Multiple-Result Parametric Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mpr {
    pub test_num: u32,
    pub head_num: u8,
    pub site_num: u8,
    pub test_flg: u8,
    pub parm_flg: Option<u8>,
    pub rtn_icnt: Option<u16>,
    pub rslt_cnt: Option<u16>,
    pub rtn_stat: Option<Vec<u8>>,
    pub rtn_rslt: Option<Vec<f32>>,
    pub test_txt: Option<String>,
    pub alarm_id: Option<String>,
    pub opt_flag: Option<u8>,
    pub res_scal: Option<i8>,
    pub llm_scal: Option<i8>,
    pub hlm_scal: Option<i8>,
    pub lo_limit: Option<f32>,
    pub hi_limit: Option<f32>,
    pub start_in: Option<f32>,
    pub incr_in: Option<f32>,
    pub rtn_indx: Option<Vec<u16>>,
    pub units: Option<String>,
    pub units_in: Option<String>,
    pub c_resfmt: Option<String>,
    pub c_llmfmt: Option<String>,
    pub c_hlmfmt: Option<String>,
    pub lo_spec: Option<f32>,
    pub hi_spec: Option<f32>,
}

impl Record for Mpr {
    const KIND: RecordKind = RecordKind::Mpr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let test_num = r.u4()?;
        let head_num = r.u1()?;
        let site_num = r.u1()?;
        let test_flg = r.b1()?;
        let parm_flg = r.opt(FieldReader::b1);
        let rtn_icnt = r.opt(FieldReader::u2);
        let rslt_cnt = r.opt(FieldReader::u2);
        let rtn_stat = r.opt_array(count_of(rtn_icnt), FieldReader::nibbles);
        let rtn_rslt = r.opt_array(count_of(rslt_cnt), |r, n| r.array(n, FieldReader::r4));
        Ok(Self {
            test_num,
            head_num,
            site_num,
            test_flg,
            parm_flg,
            rtn_icnt,
            rslt_cnt,
            rtn_stat,
            rtn_rslt,
            test_txt: r.opt(FieldReader::cn),
            alarm_id: r.opt(FieldReader::cn),
            opt_flag: r.opt(FieldReader::b1),
            res_scal: r.opt(FieldReader::i1),
            llm_scal: r.opt(FieldReader::i1),
            hlm_scal: r.opt(FieldReader::i1),
            lo_limit: r.opt(FieldReader::r4),
            hi_limit: r.opt(FieldReader::r4),
            start_in: r.opt(FieldReader::r4),
            incr_in: r.opt(FieldReader::r4),
            rtn_indx: r.opt_array(count_of(rtn_icnt), |r, n| r.array(n, FieldReader::u2)),
            units: r.opt(FieldReader::cn),
            units_in: r.opt(FieldReader::cn),
            c_resfmt: r.opt(FieldReader::cn),
            c_llmfmt: r.opt(FieldReader::cn),
            c_hlmfmt: r.opt(FieldReader::cn),
            lo_spec: r.opt(FieldReader::r4),
            hi_spec: r.opt(FieldReader::r4),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u4(self.test_num);
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.b1(self.test_flg);
        w.opt(&self.parm_flg, |w, v| w.b1(*v));
        w.opt(&self.rtn_icnt, |w, v| w.u2(*v));
        w.opt(&self.rslt_cnt, |w, v| w.u2(*v));
        w.opt(&self.rtn_stat, |w, v| w.nibbles(v));
        w.opt(&self.rtn_rslt, |w, v| v.iter().for_each(|x| w.r4(*x)));
        w.opt(&self.test_txt, |w, v| w.cn(v));
        w.opt(&self.alarm_id, |w, v| w.cn(v));
        w.opt(&self.opt_flag, |w, v| w.b1(*v));
        w.opt(&self.res_scal, |w, v| w.i1(*v));
        w.opt(&self.llm_scal, |w, v| w.i1(*v));
        w.opt(&self.hlm_scal, |w, v| w.i1(*v));
        w.opt(&self.lo_limit, |w, v| w.r4(*v));
        w.opt(&self.hi_limit, |w, v| w.r4(*v));
        w.opt(&self.start_in, |w, v| w.r4(*v));
        w.opt(&self.incr_in, |w, v| w.r4(*v));
        w.opt(&self.rtn_indx, |w, v| v.iter().for_each(|x| w.u2(*x)));
        w.opt(&self.units, |w, v| w.cn(v));
        w.opt(&self.units_in, |w, v| w.cn(v));
        w.opt(&self.c_resfmt, |w, v| w.cn(v));
        w.opt(&self.c_llmfmt, |w, v| w.cn(v));
        w.opt(&self.c_hlmfmt, |w, v| w.cn(v));
        w.opt(&self.lo_spec, |w, v| w.r4(*v));
        w.opt(&self.hi_spec, |w, v| w.r4(*v));
    }
}

/// Functional Test Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ftr {
    pub test_num: u32,
    pub head_num: u8,
    pub site_num: u8,
    pub test_flg: u8,
    pub opt_flag: Option<u8>,
    pub cycl_cnt: Option<u32>,
    pub rel_vadr: Option<u32>,
    pub rept_cnt: Option<u32>,
    pub num_fail: Option<u32>,
    pub xfail_ad: Option<i32>,
    pub yfail_ad: Option<i32>,
    pub vect_off: Option<i16>,
    pub rtn_icnt: Option<u16>,
    pub pgm_icnt: Option<u16>,
    pub rtn_indx: Option<Vec<u16>>,
    pub rtn_stat: Option<Vec<u8>>,
    pub pgm_indx: Option<Vec<u16>>,
    pub pgm_stat: Option<Vec<u8>>,
    pub fail_pin: Option<BitField>,
    pub vect_nam: Option<String>,
    pub time_set: Option<String>,
    pub op_code: Option<String>,
    pub test_txt: Option<String>,
    pub alarm_id: Option<String>,
    pub prog_txt: Option<String>,
    pub rslt_txt: Option<String>,
    pub patg_num: Option<u8>,
    pub spin_map: Option<BitField>,
}

impl Record for Ftr {
    const KIND: RecordKind = RecordKind::Ftr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let test_num = r.u4()?;
        let head_num = r.u1()?;
        let site_num = r.u1()?;
        let test_flg = r.b1()?;
        let opt_flag = r.opt(FieldReader::b1);
        let cycl_cnt = r.opt(FieldReader::u4);
        let rel_vadr = r.opt(FieldReader::u4);
        let rept_cnt = r.opt(FieldReader::u4);
        let num_fail = r.opt(FieldReader::u4);
        let xfail_ad = r.opt(FieldReader::i4);
        let yfail_ad = r.opt(FieldReader::i4);
        let vect_off = r.opt(FieldReader::i2);
        let rtn_icnt = r.opt(FieldReader::u2);
        let pgm_icnt = r.opt(FieldReader::u2);
        Ok(Self {
            test_num,
            head_num,
            site_num,
            test_flg,
            opt_flag,
            cycl_cnt,
            rel_vadr,
            rept_cnt,
            num_fail,
            xfail_ad,
            yfail_ad,
            vect_off,
            rtn_icnt,
            pgm_icnt,
            rtn_indx: r.opt_array(count_of(rtn_icnt), |r, n| r.array(n, FieldReader::u2)),
            rtn_stat: r.opt_array(count_of(rtn_icnt), FieldReader::nibbles),
            pgm_indx: r.opt_array(count_of(pgm_icnt), |r, n| r.array(n, FieldReader::u2)),
            pgm_stat: r.opt_array(count_of(pgm_icnt), FieldReader::nibbles),
            fail_pin: r.opt(FieldReader::dn),
            vect_nam: r.opt(FieldReader::cn),
            time_set: r.opt(FieldReader::cn),
            op_code: r.opt(FieldReader::cn),
            test_txt: r.opt(FieldReader::cn),
            alarm_id: r.opt(FieldReader::cn),
            prog_txt: r.opt(FieldReader::cn),
            rslt_txt: r.opt(FieldReader::cn),
            patg_num: r.opt(FieldReader::u1),
            spin_map: r.opt(FieldReader::dn),
        })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.u4(self.test_num);
        w.u1(self.head_num);
        w.u1(self.site_num);
        w.b1(self.test_flg);
        w.opt(&self.opt_flag, |w, v| w.b1(*v));
        w.opt(&self.cycl_cnt, |w, v| w.u4(*v));
        w.opt(&self.rel_vadr, |w, v| w.u4(*v));
        w.opt(&self.rept_cnt, |w, v| w.u4(*v));
        w.opt(&self.num_fail, |w, v| w.u4(*v));
        w.opt(&self.xfail_ad, |w, v| w.i4(*v));
        w.opt(&self.yfail_ad, |w, v| w.i4(*v));
        w.opt(&self.vect_off, |w, v| w.i2(*v));
        w.opt(&self.rtn_icnt, |w, v| w.u2(*v));
        w.opt(&self.pgm_icnt, |w, v| w.u2(*v));
        w.opt(&self.rtn_indx, |w, v| v.iter().for_each(|x| w.u2(*x)));
        w.opt(&self.rtn_stat, |w, v| w.nibbles(v));
        w.opt(&self.pgm_indx, |w, v| v.iter().for_each(|x| w.u2(*x)));
        w.opt(&self.pgm_stat, |w, v| w.nibbles(v));
        w.opt(&self.fail_pin, |w, v| w.dn(v));
        for text in [
            &self.vect_nam,
            &self.time_set,
            &self.op_code,
            &self.test_txt,
            &self.alarm_id,
            &self.prog_txt,
            &self.rslt_txt,
        ] {
            w.opt(text, |w, v| w.cn(v));
        }
        w.opt(&self.patg_num, |w, v| w.u1(*v));
        w.opt(&self.spin_map, |w, v| w.dn(v));
    }
}

/// Begin Program Section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bps {
    pub seq_name: Option<String>,
}

impl Record for Bps {
    const KIND: RecordKind = RecordKind::Bps;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { seq_name: r.opt(FieldReader::cn) })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.opt(&self.seq_name, |w, v| w.cn(v));
    }
}

/// Datalog Text Record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dtr {
    pub text_dat: String,
}

impl Record for Dtr {
    const KIND: RecordKind = RecordKind::Dtr;

    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self { text_dat: r.cn()? })
    }

    fn encode(&self, w: &mut FieldWriter) {
        w.cn(&self.text_dat);
    }
}

/// Any STDF v4 record, decoded
#[derive(Debug, Clone, PartialEq)]
pub enum StdfRecord {
    Far(Far),
    Atr(Atr),
    Vur(Vur),
    Mir(Mir),
    Mrr(Mrr),
    Pcr(Pcr),
    Hbr(BinRecord),
    Sbr(BinRecord),
    Pmr(Pmr),
    Pgr(Pgr),
    Wir(Wir),
    Wrr(Wrr),
    Wcr(Wcr),
    Pir(Pir),
    Prr(Prr),
    Tsr(Tsr),
    Ptr(Ptr),
    Mpr(Mpr),
    Ftr(Ftr),
    Bps(Bps),
    Eps,
    Dtr(Dtr),
    /// Kinds without a typed struct (PLR, RDR, SDR, GDR)
    Generic(RecordKind, Vec<(&'static str, Option<FieldValue>)>),
}

impl StdfRecord {
    /// Decode a body of the given kind
    pub fn decode(kind: RecordKind, body: &[u8], order: ByteOrder) -> Result<Self> {
        let mut r = FieldReader::new(body, order);
        Ok(match kind {
            RecordKind::Far => StdfRecord::Far(Far::decode(&mut r)?),
            RecordKind::Atr => StdfRecord::Atr(Atr::decode(&mut r)?),
            RecordKind::Vur => StdfRecord::Vur(Vur::decode(&mut r)?),
            RecordKind::Mir => StdfRecord::Mir(Mir::decode(&mut r)?),
            RecordKind::Mrr => StdfRecord::Mrr(Mrr::decode(&mut r)?),
            RecordKind::Pcr => StdfRecord::Pcr(Pcr::decode(&mut r)?),
            RecordKind::Hbr => StdfRecord::Hbr(BinRecord::decode(&mut r)?),
            RecordKind::Sbr => StdfRecord::Sbr(BinRecord::decode(&mut r)?),
            RecordKind::Pmr => StdfRecord::Pmr(Pmr::decode(&mut r)?),
            RecordKind::Pgr => StdfRecord::Pgr(Pgr::decode(&mut r)?),
            RecordKind::Wir => StdfRecord::Wir(Wir::decode(&mut r)?),
            RecordKind::Wrr => StdfRecord::Wrr(Wrr::decode(&mut r)?),
            RecordKind::Wcr => StdfRecord::Wcr(Wcr::decode(&mut r)?),
            RecordKind::Pir => StdfRecord::Pir(Pir::decode(&mut r)?),
            RecordKind::Prr => StdfRecord::Prr(Prr::decode(&mut r)?),
            RecordKind::Tsr => StdfRecord::Tsr(Tsr::decode(&mut r)?),
            RecordKind::Ptr => StdfRecord::Ptr(Ptr::decode(&mut r)?),
            RecordKind::Mpr => StdfRecord::Mpr(Mpr::decode(&mut r)?),
            RecordKind::Ftr => StdfRecord::Ftr(Ftr::decode(&mut r)?),
            RecordKind::Bps => StdfRecord::Bps(Bps::decode(&mut r)?),
            RecordKind::Eps => StdfRecord::Eps,
            RecordKind::Dtr => StdfRecord::Dtr(Dtr::decode(&mut r)?),
            RecordKind::Plr | RecordKind::Rdr | RecordKind::Sdr | RecordKind::Gdr => {
                StdfRecord::Generic(kind, decode_generic(kind, body, order))
            }
        })
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            StdfRecord::Far(_) => RecordKind::Far,
            StdfRecord::Atr(_) => RecordKind::Atr,
            StdfRecord::Vur(_) => RecordKind::Vur,
            StdfRecord::Mir(_) => RecordKind::Mir,
            StdfRecord::Mrr(_) => RecordKind::Mrr,
            StdfRecord::Pcr(_) => RecordKind::Pcr,
            StdfRecord::Hbr(_) => RecordKind::Hbr,
            StdfRecord::Sbr(_) => RecordKind::Sbr,
            StdfRecord::Pmr(_) => RecordKind::Pmr,
            StdfRecord::Pgr(_) => RecordKind::Pgr,
            StdfRecord::Wir(_) => RecordKind::Wir,
            StdfRecord::Wrr(_) => RecordKind::Wrr,
            StdfRecord::Wcr(_) => RecordKind::Wcr,
            StdfRecord::Pir(_) => RecordKind::Pir,
            StdfRecord::Prr(_) => RecordKind::Prr,
            StdfRecord::Tsr(_) => RecordKind::Tsr,
            StdfRecord::Ptr(_) => RecordKind::Ptr,
            StdfRecord::Mpr(_) => RecordKind::Mpr,
            StdfRecord::Ftr(_) => RecordKind::Ftr,
            StdfRecord::Bps(_) => RecordKind::Bps,
            StdfRecord::Eps => RecordKind::Eps,
            StdfRecord::Dtr(_) => RecordKind::Dtr,
            StdfRecord::Generic(kind, _) => *kind,
        }
    }

    /// Encode the body only
    pub fn encode_body(&self, order: ByteOrder) -> Result<Vec<u8>> {
        let mut w = FieldWriter::new(order);
        match self {
            StdfRecord::Far(r) => r.encode(&mut w),
            StdfRecord::Atr(r) => r.encode(&mut w),
            StdfRecord::Vur(r) => r.encode(&mut w),
            StdfRecord::Mir(r) => r.encode(&mut w),
            StdfRecord::Mrr(r) => r.encode(&mut w),
            StdfRecord::Pcr(r) => r.encode(&mut w),
            StdfRecord::Hbr(r) | StdfRecord::Sbr(r) => r.encode(&mut w),
            StdfRecord::Pmr(r) => r.encode(&mut w),
            StdfRecord::Pgr(r) => r.encode(&mut w),
            StdfRecord::Wir(r) => r.encode(&mut w),
            StdfRecord::Wrr(r) => r.encode(&mut w),
            StdfRecord::Wcr(r) => r.encode(&mut w),
            StdfRecord::Pir(r) => r.encode(&mut w),
            StdfRecord::Prr(r) => r.encode(&mut w),
            StdfRecord::Tsr(r) => r.encode(&mut w),
            StdfRecord::Ptr(r) => r.encode(&mut w),
            StdfRecord::Mpr(r) => r.encode(&mut w),
            StdfRecord::Ftr(r) => r.encode(&mut w),
            StdfRecord::Bps(r) => r.encode(&mut w),
            StdfRecord::Eps => {}
            StdfRecord::Dtr(r) => r.encode(&mut w),
            StdfRecord::Generic(kind, _) => {
                return Err(Error::Decode {
                    message: format!("No encoder for {} records", kind),
                })
            }
        }
        if w.len() > u16::MAX as usize {
            return Err(Error::Decode {
                message: format!("{} body of {} bytes exceeds the record length limit", self.kind(), w.len()),
            });
        }
        Ok(w.into_bytes())
    }

    /// Encode header and body
    pub fn to_bytes(&self, order: ByteOrder) -> Result<Vec<u8>> {
        let body = self.encode_body(order)?;
        let (typ, sub) = self.kind().code();
        let header = RecordHeader { length: body.len() as u16, typ, sub };
        let mut out = Vec::with_capacity(RecordHeader::SIZE + body.len());
        out.extend_from_slice(&header.to_bytes(order));
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Identity fields of a test record, read without decoding the rest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestHeader {
    pub test_num: u32,
    pub head_num: u8,
    pub site_num: u8,
    pub test_flg: u8,
    pub name: String,
}

impl TestHeader {
    /// Read test number, head, site, flag and TEST_TXT from a PTR/MPR/FTR body,
    /// skipping the fields in between.
    pub fn peek(kind: RecordKind, body: &[u8], order: ByteOrder) -> Result<Self> {
        let mut r = FieldReader::new(body, order);
        let test_num = r.u4()?;
        let head_num = r.u1()?;
        let site_num = r.u1()?;
        let test_flg = r.b1()?;

        let name = match kind {
            RecordKind::Ptr => {
                // PARM_FLG, RESULT
                r.skip(1 + 4).and_then(|_| r.cn())
            }
            RecordKind::Mpr => Self::skip_mpr_arrays(&mut r).and_then(|_| r.cn()),
            RecordKind::Ftr => Self::skip_ftr_arrays(&mut r).and_then(|_| r.cn()),
            other => {
                return Err(Error::Decode {
                    message: format!("{} is not a test record", other),
                })
            }
        };

        Ok(Self {
            test_num,
            head_num,
            site_num,
            test_flg,
            name: name.unwrap_or_default(),
        })
    }

    fn skip_mpr_arrays(r: &mut FieldReader<'_>) -> Result<()> {
        r.skip(1)?;
        let rtn_icnt = r.u2()? as usize;
        let rslt_cnt = r.u2()? as usize;
        r.skip(rtn_icnt.div_ceil(2) + rslt_cnt * 4)
    }

    fn skip_ftr_arrays(r: &mut FieldReader<'_>) -> Result<()> {
        // OPT_FLAG, CYCL_CNT, REL_VADR, REPT_CNT, NUM_FAIL, XFAIL_AD, YFAIL_AD, VECT_OFF
        r.skip(1 + 4 * 4 + 4 + 4 + 2)?;
        let rtn_icnt = r.u2()? as usize;
        let pgm_icnt = r.u2()? as usize;
        r.skip(rtn_icnt * 2 + rtn_icnt.div_ceil(2) + pgm_icnt * 2 + pgm_icnt.div_ceil(2))?;
        r.skip_dn()?;
        // VECT_NAM, TIME_SET, OP_CODE
        r.skip_cn()?;
        r.skip_cn()?;
        r.skip_cn()
    }
}
