//! Record schema registry.
//!
//! Static description of every STDF v4 record: its (type, subtype) code,
//! whether the scanner indexes it, and its ordered field list. The
//! schema-driven [`decode_generic`] turns any body into named optional values
//! and backs the record kinds that have no typed struct.

use serde::{Deserialize, Serialize};

use stdfdb_core::error::Result;
use stdfdb_core::types::ByteOrder;

use super::codec::{BitField, FieldReader, GenericValue};

/// STDF v4 record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    Far,
    Atr,
    Vur,
    Mir,
    Mrr,
    Pcr,
    Hbr,
    Sbr,
    Pmr,
    Pgr,
    Plr,
    Rdr,
    Sdr,
    Wir,
    Wrr,
    Wcr,
    Pir,
    Prr,
    Tsr,
    Ptr,
    Mpr,
    Ftr,
    Bps,
    Eps,
    Gdr,
    Dtr,
}

impl RecordKind {
    pub const ALL: [RecordKind; 26] = [
        RecordKind::Far,
        RecordKind::Atr,
        RecordKind::Vur,
        RecordKind::Mir,
        RecordKind::Mrr,
        RecordKind::Pcr,
        RecordKind::Hbr,
        RecordKind::Sbr,
        RecordKind::Pmr,
        RecordKind::Pgr,
        RecordKind::Plr,
        RecordKind::Rdr,
        RecordKind::Sdr,
        RecordKind::Wir,
        RecordKind::Wrr,
        RecordKind::Wcr,
        RecordKind::Pir,
        RecordKind::Prr,
        RecordKind::Tsr,
        RecordKind::Ptr,
        RecordKind::Mpr,
        RecordKind::Ftr,
        RecordKind::Bps,
        RecordKind::Eps,
        RecordKind::Gdr,
        RecordKind::Dtr,
    ];

    /// Look up a kind by its header (type, subtype)
    pub fn from_code(typ: u8, sub: u8) -> Option<Self> {
        let kind = match (typ, sub) {
            (0, 10) => RecordKind::Far,
            (0, 20) => RecordKind::Atr,
            (0, 30) => RecordKind::Vur,
            (1, 10) => RecordKind::Mir,
            (1, 20) => RecordKind::Mrr,
            (1, 30) => RecordKind::Pcr,
            (1, 40) => RecordKind::Hbr,
            (1, 50) => RecordKind::Sbr,
            (1, 60) => RecordKind::Pmr,
            (1, 62) => RecordKind::Pgr,
            (1, 63) => RecordKind::Plr,
            (1, 70) => RecordKind::Rdr,
            (1, 80) => RecordKind::Sdr,
            (2, 10) => RecordKind::Wir,
            (2, 20) => RecordKind::Wrr,
            (2, 30) => RecordKind::Wcr,
            (5, 10) => RecordKind::Pir,
            (5, 20) => RecordKind::Prr,
            (10, 30) => RecordKind::Tsr,
            (15, 10) => RecordKind::Ptr,
            (15, 15) => RecordKind::Mpr,
            (15, 20) => RecordKind::Ftr,
            (20, 10) => RecordKind::Bps,
            (20, 20) => RecordKind::Eps,
            (50, 10) => RecordKind::Gdr,
            (50, 30) => RecordKind::Dtr,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(&self) -> (u8, u8) {
        match self {
            RecordKind::Far => (0, 10),
            RecordKind::Atr => (0, 20),
            RecordKind::Vur => (0, 30),
            RecordKind::Mir => (1, 10),
            RecordKind::Mrr => (1, 20),
            RecordKind::Pcr => (1, 30),
            RecordKind::Hbr => (1, 40),
            RecordKind::Sbr => (1, 50),
            RecordKind::Pmr => (1, 60),
            RecordKind::Pgr => (1, 62),
            RecordKind::Plr => (1, 63),
            RecordKind::Rdr => (1, 70),
            RecordKind::Sdr => (1, 80),
            RecordKind::Wir => (2, 10),
            RecordKind::Wrr => (2, 20),
            RecordKind::Wcr => (2, 30),
            RecordKind::Pir => (5, 10),
            RecordKind::Prr => (5, 20),
            RecordKind::Tsr => (10, 30),
            RecordKind::Ptr => (15, 10),
            RecordKind::Mpr => (15, 15),
            RecordKind::Ftr => (15, 20),
            RecordKind::Bps => (20, 10),
            RecordKind::Eps => (20, 20),
            RecordKind::Gdr => (50, 10),
            RecordKind::Dtr => (50, 30),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::Far => "FAR",
            RecordKind::Atr => "ATR",
            RecordKind::Vur => "VUR",
            RecordKind::Mir => "MIR",
            RecordKind::Mrr => "MRR",
            RecordKind::Pcr => "PCR",
            RecordKind::Hbr => "HBR",
            RecordKind::Sbr => "SBR",
            RecordKind::Pmr => "PMR",
            RecordKind::Pgr => "PGR",
            RecordKind::Plr => "PLR",
            RecordKind::Rdr => "RDR",
            RecordKind::Sdr => "SDR",
            RecordKind::Wir => "WIR",
            RecordKind::Wrr => "WRR",
            RecordKind::Wcr => "WCR",
            RecordKind::Pir => "PIR",
            RecordKind::Prr => "PRR",
            RecordKind::Tsr => "TSR",
            RecordKind::Ptr => "PTR",
            RecordKind::Mpr => "MPR",
            RecordKind::Ftr => "FTR",
            RecordKind::Bps => "BPS",
            RecordKind::Eps => "EPS",
            RecordKind::Gdr => "GDR",
            RecordKind::Dtr => "DTR",
        }
    }

    /// Kinds the scanner hands to the index builder; the rest are skipped
    pub fn is_tracked(&self) -> bool {
        !matches!(self, RecordKind::Plr | RecordKind::Rdr | RecordKind::Sdr | RecordKind::Gdr)
    }

    /// PTR, MPR and FTR
    pub fn is_test_record(&self) -> bool {
        matches!(self, RecordKind::Ptr | RecordKind::Mpr | RecordKind::Ftr)
    }

    pub fn fields(&self) -> &'static [FieldDef] {
        match self {
            RecordKind::Far => FAR_FIELDS,
            RecordKind::Atr => ATR_FIELDS,
            RecordKind::Vur => VUR_FIELDS,
            RecordKind::Mir => MIR_FIELDS,
            RecordKind::Mrr => MRR_FIELDS,
            RecordKind::Pcr => PCR_FIELDS,
            RecordKind::Hbr => HBR_FIELDS,
            RecordKind::Sbr => SBR_FIELDS,
            RecordKind::Pmr => PMR_FIELDS,
            RecordKind::Pgr => PGR_FIELDS,
            RecordKind::Plr => PLR_FIELDS,
            RecordKind::Rdr => RDR_FIELDS,
            RecordKind::Sdr => SDR_FIELDS,
            RecordKind::Wir => WIR_FIELDS,
            RecordKind::Wrr => WRR_FIELDS,
            RecordKind::Wcr => WCR_FIELDS,
            RecordKind::Pir => PIR_FIELDS,
            RecordKind::Prr => PRR_FIELDS,
            RecordKind::Tsr => TSR_FIELDS,
            RecordKind::Ptr => PTR_FIELDS,
            RecordKind::Mpr => MPR_FIELDS,
            RecordKind::Ftr => FTR_FIELDS,
            RecordKind::Bps => BPS_FIELDS,
            RecordKind::Eps => EPS_FIELDS,
            RecordKind::Gdr => GDR_FIELDS,
            RecordKind::Dtr => DTR_FIELDS,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of a `kxTYPE` array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Element {
    U1,
    U2,
    R4,
    N1,
    Cn,
    Vn,
}

/// STDF field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U1,
    U2,
    U4,
    I1,
    I2,
    I4,
    R4,
    C1,
    B1,
    Cn,
    Bn,
    Dn,
    /// Array whose element count is the value of the field at the given position
    Array(Element, usize),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn f(name: &'static str, ty: FieldType) -> FieldDef {
    FieldDef { name, ty }
}

const FAR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("CPU_TYPE", U1),
        f("STDF_VER", U1),
    ]
};

const ATR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("MOD_TIM", U4),
        f("CMD_LINE", Cn),
    ]
};

const VUR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("UPD_CNT", U1),
        f("UPD_NAM", Array(Element::Cn, 0)),
    ]
};

const MRR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("FINISH_T", U4),
        f("DISP_COD", C1),
        f("USR_DESC", Cn),
        f("EXC_DESC", Cn),
    ]
};

const PCR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("PART_CNT", U4),
        f("RTST_CNT", U4),
        f("ABRT_CNT", U4),
        f("GOOD_CNT", U4),
        f("FUNC_CNT", U4),
    ]
};

const HBR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("HBIN_NUM", U2),
        f("HBIN_CNT", U4),
        f("HBIN_PF", C1),
        f("HBIN_NAM", Cn),
    ]
};

const SBR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("SBIN_NUM", U2),
        f("SBIN_CNT", U4),
        f("SBIN_PF", C1),
        f("SBIN_NAM", Cn),
    ]
};

const PMR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("PMR_INDX", U2),
        f("CHAN_TYP", U2),
        f("CHAN_NAM", Cn),
        f("PHY_NAM", Cn),
        f("LOG_NAM", Cn),
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
    ]
};

const PGR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("GRP_INDX", U2),
        f("GRP_NAM", Cn),
        f("INDX_CNT", U2),
        f("PMR_INDX", Array(Element::U2, 2)),
    ]
};

const PLR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("GRP_CNT", U2),
        f("GRP_INDX", Array(Element::U2, 0)),
        f("GRP_MODE", Array(Element::U2, 0)),
        f("GRP_RADX", Array(Element::U1, 0)),
        f("PGM_CHAR", Array(Element::Cn, 0)),
        f("RTN_CHAR", Array(Element::Cn, 0)),
        f("PGM_CHAL", Array(Element::Cn, 0)),
        f("RTN_CHAL", Array(Element::Cn, 0)),
    ]
};

const RDR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("NUM_BINS", U2),
        f("RTST_BIN", Array(Element::U2, 0)),
    ]
};

const WIR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_GRP", U1),
        f("START_T", U4),
        f("WAFER_ID", Cn),
    ]
};

const WRR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_GRP", U1),
        f("FINISH_T", U4),
        f("PART_CNT", U4),
        f("RTST_CNT", U4),
        f("ABRT_CNT", U4),
        f("GOOD_CNT", U4),
        f("FUNC_CNT", U4),
        f("WAFER_ID", Cn),
        f("FABWF_ID", Cn),
        f("FRAME_ID", Cn),
        f("MASK_ID", Cn),
        f("USR_DESC", Cn),
        f("EXC_DESC", Cn),
    ]
};

const WCR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("WAFR_SIZ", R4),
        f("DIE_HT", R4),
        f("DIE_WID", R4),
        f("WF_UNITS", U1),
        f("WF_FLAT", C1),
        f("CENTER_X", I2),
        f("CENTER_Y", I2),
        f("POS_X", C1),
        f("POS_Y", C1),
    ]
};

const PIR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
    ]
};

const PRR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("PART_FLG", B1),
        f("NUM_TEST", U2),
        f("HARD_BIN", U2),
        f("SOFT_BIN", U2),
        f("X_COORD", I2),
        f("Y_COORD", I2),
        f("TEST_T", U4),
        f("PART_ID", Cn),
        f("PART_TXT", Cn),
        f("PART_FIX", Bn),
    ]
};

const TSR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("TEST_TYP", C1),
        f("TEST_NUM", U4),
        f("EXEC_CNT", U4),
        f("FAIL_CNT", U4),
        f("ALRM_CNT", U4),
        f("TEST_NAM", Cn),
        f("SEQ_NAME", Cn),
        f("TEST_LBL", Cn),
        f("OPT_FLAG", B1),
        f("TEST_TIM", R4),
        f("TEST_MIN", R4),
        f("TEST_MAX", R4),
        f("TST_SUMS", R4),
        f("TST_SQRS", R4),
    ]
};

const BPS_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("SEQ_NAME", Cn),
    ]
};

const EPS_FIELDS: &[FieldDef] = &[];

const GDR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("FLD_CNT", U2),
        f("GEN_DATA", Array(Element::Vn, 0)),
    ]
};

const DTR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("TEXT_DAT", Cn),
    ]
};

const MIR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("SETUP_T", U4),
        f("START_T", U4),
        f("STAT_NUM", U1),
        f("MODE_COD", C1),
        f("RTST_COD", C1),
        f("PROT_COD", C1),
        f("BURN_TIM", U2),
        f("CMOD_COD", C1),
        f("LOT_ID", Cn),
        f("PART_TYP", Cn),
        f("NODE_NAM", Cn),
        f("TSTR_TYP", Cn),
        f("JOB_NAM", Cn),
        f("JOB_REV", Cn),
        f("SBLOT_ID", Cn),
        f("OPER_NAM", Cn),
        f("EXEC_TYP", Cn),
        f("EXEC_VER", Cn),
        f("TEST_COD", Cn),
        f("TST_TEMP", Cn),
        f("USER_TXT", Cn),
        f("AUX_FILE", Cn),
        f("PKG_TYP", Cn),
        f("FAMLY_ID", Cn),
        f("DATE_COD", Cn),
        f("FACIL_ID", Cn),
        f("FLOOR_ID", Cn),
        f("PROC_ID", Cn),
        f("OPER_FRQ", Cn),
        f("SPEC_NAM", Cn),
        f("SPEC_VER", Cn),
        f("FLOW_ID", Cn),
        f("SETUP_ID", Cn),
        f("DSGN_REV", Cn),
        f("ENG_ID", Cn),
        f("ROM_COD", Cn),
        f("SERL_NUM", Cn),
        f("SUPR_NAM", Cn),
    ]
};

const SDR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("HEAD_NUM", U1),
        f("SITE_GRP", U1),
        f("SITE_CNT", U1),
        f("SITE_NUM", Array(Element::U1, 2)),
        f("HAND_TYP", Cn),
        f("HAND_ID", Cn),
        f("CARD_TYP", Cn),
        f("CARD_ID", Cn),
        f("LOAD_TYP", Cn),
        f("LOAD_ID", Cn),
        f("DIB_TYP", Cn),
        f("DIB_ID", Cn),
        f("CABL_TYP", Cn),
        f("CABL_ID", Cn),
        f("CONT_TYP", Cn),
        f("CONT_ID", Cn),
        f("LASR_TYP", Cn),
        f("LASR_ID", Cn),
        f("EXTR_TYP", Cn),
        f("EXTR_ID", Cn),
    ]
};

const PTR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("TEST_NUM", U4),
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("TEST_FLG", B1),
        f("PARM_FLG", B1),
        f("RESULT", R4),
        f("TEST_TXT", Cn),
        f("ALARM_ID", Cn),
        f("OPT_FLAG", B1),
        f("RES_SCAL", I1),
        f("LLM_SCAL", I1),
        f("HLM_SCAL", I1),
        f("LO_LIMIT", R4),
        f("HI_LIMIT", R4),
        f("UNITS", Cn),
        f("C_RESFMT", Cn),
        f("C_LLMFMT", Cn),
        f("C_HLMFMT", Cn),
        f("LO_SPEC", R4),
        f("HI_SPEC", R4),
    ]
};

const MPR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("TEST_NUM", U4),
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("TEST_FLG", B1),
        f("PARM_FLG", B1),
        f("RTN_ICNT", U2),
        f("RSLT_CNT", U2),
        f("RTN_STAT", Array(Element::N1, 5)),
        f("RTN_RSLT", Array(Element::R4, 6)),
        f("TEST_TXT", Cn),
        f("ALARM_ID", Cn),
        f("OPT_FLAG", B1),
        f("RES_SCAL", I1),
        f("LLM_SCAL", I1),
        f("HLM_SCAL", I1),
        f("LO_LIMIT", R4),
        f("HI_LIMIT", R4),
        f("START_IN", R4),
        f("INCR_IN", R4),
        f("RTN_INDX", Array(Element::U2, 5)),
        f("UNITS", Cn),
        f("UNITS_IN", Cn),
        f("C_RESFMT", Cn),
        f("C_LLMFMT", Cn),
        f("C_HLMFMT", Cn),
        f("LO_SPEC", R4),
        f("HI_SPEC", R4),
    ]
};

const FTR_FIELDS: &[FieldDef] = {
    use FieldType::*;
    &[
        f("TEST_NUM", U4),
        f("HEAD_NUM", U1),
        f("SITE_NUM", U1),
        f("TEST_FLG", B1),
        f("OPT_FLAG", B1),
        f("CYCL_CNT", U4),
        f("REL_VADR", U4),
        f("REPT_CNT", U4),
        f("NUM_FAIL", U4),
        f("XFAIL_AD", I4),
        f("YFAIL_AD", I4),
        f("VECT_OFF", I2),
        f("RTN_ICNT", U2),
        f("PGM_ICNT", U2),
        f("RTN_INDX", Array(Element::U2, 12)),
        f("RTN_STAT", Array(Element::N1, 12)),
        f("PGM_INDX", Array(Element::U2, 13)),
        f("PGM_STAT", Array(Element::N1, 13)),
        f("FAIL_PIN", Dn),
        f("VECT_NAM", Cn),
        f("TIME_SET", Cn),
        f("OP_CODE", Cn),
        f("TEST_TXT", Cn),
        f("ALARM_ID", Cn),
        f("PROG_TXT", Cn),
        f("RSLT_TXT", Cn),
        f("PATG_NUM", U1),
        f("SPIN_MAP", Dn),
    ]
};

/// A decoded field value with no record-specific meaning attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Char(char),
    Text(String),
    Bytes(Vec<u8>),
    Bits(BitField),
    List(Vec<FieldValue>),
    Generic(GenericValue),
}

impl FieldValue {
    fn as_count(&self) -> usize {
        match self {
            FieldValue::Unsigned(n) => *n as usize,
            _ => 0,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Unsigned(v) => write!(f, "{}", v),
            FieldValue::Signed(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Char(c) => write!(f, "{:?}", c),
            FieldValue::Text(s) => write!(f, "{:?}", s),
            FieldValue::Bytes(b) => write!(f, "{:02X?}", b),
            FieldValue::Bits(b) => write!(f, "{}", b),
            FieldValue::Generic(g) => write!(f, "{}", g),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Decode a body field by field from the schema.
///
/// Trailing fields missing from the body come back as `None`; a field cut off
/// in the middle also ends the record.
pub fn decode_generic(
    kind: RecordKind,
    body: &[u8],
    order: ByteOrder,
) -> Vec<(&'static str, Option<FieldValue>)> {
    let mut reader = FieldReader::new(body, order);
    let defs = kind.fields();
    let mut values: Vec<(&'static str, Option<FieldValue>)> = Vec::with_capacity(defs.len());

    for def in defs {
        let value = match def.ty {
            FieldType::Array(elem, count_at) => {
                let count = values
                    .get(count_at)
                    .and_then(|(_, v)| v.as_ref())
                    .map(FieldValue::as_count);
                reader.opt_array(count, |r, n| read_array(r, elem, n)).map(FieldValue::List)
            }
            ty => reader.opt(|r| read_scalar(r, ty)),
        };
        values.push((def.name, value));
    }
    values
}

fn read_scalar(reader: &mut FieldReader<'_>, ty: FieldType) -> Result<FieldValue> {
    Ok(match ty {
        FieldType::U1 => FieldValue::Unsigned(reader.u1()? as u64),
        FieldType::U2 => FieldValue::Unsigned(reader.u2()? as u64),
        FieldType::U4 => FieldValue::Unsigned(reader.u4()? as u64),
        FieldType::I1 => FieldValue::Signed(reader.i1()? as i64),
        FieldType::I2 => FieldValue::Signed(reader.i2()? as i64),
        FieldType::I4 => FieldValue::Signed(reader.i4()? as i64),
        FieldType::R4 => FieldValue::Float(reader.r4()? as f64),
        FieldType::C1 => FieldValue::Char(reader.c1()?),
        FieldType::B1 => FieldValue::Unsigned(reader.b1()? as u64),
        FieldType::Cn => FieldValue::Text(reader.cn()?),
        FieldType::Bn => FieldValue::Bytes(reader.bn()?),
        FieldType::Dn => FieldValue::Bits(reader.dn()?),
        FieldType::Array(elem, _) => FieldValue::List(read_array(reader, elem, 0)?),
    })
}

fn read_array(reader: &mut FieldReader<'_>, elem: Element, count: usize) -> Result<Vec<FieldValue>> {
    Ok(match elem {
        Element::N1 => reader
            .nibbles(count)?
            .into_iter()
            .map(|n| FieldValue::Unsigned(n as u64))
            .collect(),
        Element::U1 => reader.array(count, |r| Ok(FieldValue::Unsigned(r.u1()? as u64)))?,
        Element::U2 => reader.array(count, |r| Ok(FieldValue::Unsigned(r.u2()? as u64)))?,
        Element::R4 => reader.array(count, |r| Ok(FieldValue::Float(r.r4()? as f64)))?,
        Element::Cn => reader.array(count, |r| Ok(FieldValue::Text(r.cn()?)))?,
        Element::Vn => reader.array(count, |r| Ok(FieldValue::Generic(r.vn()?)))?,
    })
}
