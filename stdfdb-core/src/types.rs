//! Core data types shared by the scanner, index and query layers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte order of every multi-byte field in one STDF file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// CPU_TYPE 2 (DEC/Intel) writes little-endian; anything else is read as big-endian.
    pub fn from_cpu_type(cpu_type: u8) -> Self {
        if cpu_type == 2 {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ByteOrder::LittleEndian => "Little endian",
            ByteOrder::BigEndian => "Big endian",
        }
    }
}

/// Kind of test record a test identity was indexed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TestKind {
    /// PTR
    Parametric,
    /// MPR
    MultiResult,
    /// FTR
    Functional,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TestKind::Parametric => "PTR",
            TestKind::MultiResult => "MPR",
            TestKind::Functional => "FTR",
        };
        f.write_str(s)
    }
}

/// Logical test identity exposed to callers
///
/// `pin_index` is 0 for single-result tests. Multi-result tests expand into
/// one identity per pin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestItem {
    pub test_num: u32,
    pub pin_index: u32,
    pub name: String,
    pub kind: TestKind,
}

/// Hardware or software bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BinKind {
    Hard,
    Soft,
}

/// Pass/fail classification of a bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinClass {
    Pass,
    Fail,
    Unknown,
}

impl BinClass {
    /// HBR/SBR `*_PF` character
    pub fn from_pf_char(c: char) -> Self {
        match c {
            'P' | 'p' => BinClass::Pass,
            'F' | 'f' => BinClass::Fail,
            _ => BinClass::Unknown,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            BinClass::Pass => 'P',
            BinClass::Fail => 'F',
            BinClass::Unknown => 'U',
        }
    }
}

/// Part-level result derived from PRR.PART_FLG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartStatus {
    Pass,
    Fail,
    /// PART_FLG bit 4 set: no pass/fail indication
    Unknown,
}

impl PartStatus {
    /// Bits 3 and 4 of PART_FLG: `00` pass, bit 3 alone fail, bit 4 no indication
    pub fn from_part_flag(flag: u8) -> Self {
        if flag & 0b0001_1000 == 0 {
            PartStatus::Pass
        } else if flag & 0b0001_0000 == 0 {
            PartStatus::Fail
        } else {
            PartStatus::Unknown
        }
    }

    /// Parts without an indication count as passing
    pub fn counts_as_pass(&self) -> bool {
        !matches!(self, PartStatus::Fail)
    }

    pub fn bin_class(&self) -> BinClass {
        if self.counts_as_pass() {
            BinClass::Pass
        } else {
            BinClass::Fail
        }
    }
}

/// Outcome of one test execution, derived from its TEST_FLG byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestOutcome {
    Pass,
    Fail,
    /// Bit 6 set: no pass/fail indication
    Indeterminate,
    /// No record for this DUT (flag sentinel below zero)
    NotTested,
}

impl TestOutcome {
    /// Classify a flag value where negative means the DUT has no record
    pub fn from_flag(flag: i16) -> Self {
        if flag < 0 {
            return TestOutcome::NotTested;
        }
        let flag = flag as u8;
        if flag & 0b0100_0000 != 0 {
            TestOutcome::Indeterminate
        } else if flag & 0b1000_0000 != 0 {
            TestOutcome::Fail
        } else {
            TestOutcome::Pass
        }
    }

    /// Indeterminate and not-tested results are treated as passing
    pub fn is_fail(&self) -> bool {
        matches!(self, TestOutcome::Fail)
    }
}

/// Per-test fail count from TSR, where `0xFFFFFFFF` on disk means unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FailCount {
    #[default]
    Unknown,
    Count(u32),
}

impl FailCount {
    pub const UNKNOWN_SENTINEL: u32 = u32::MAX;

    pub fn from_raw(raw: u32) -> Self {
        if raw == Self::UNKNOWN_SENTINEL {
            FailCount::Unknown
        } else {
            FailCount::Count(raw)
        }
    }

    /// Sum two counts; unknown only if both are unknown
    pub fn merge(self, other: FailCount) -> FailCount {
        match (self, other) {
            (FailCount::Count(a), FailCount::Count(b)) => FailCount::Count(a.saturating_add(b)),
            (FailCount::Count(a), FailCount::Unknown) | (FailCount::Unknown, FailCount::Count(a)) => {
                FailCount::Count(a)
            }
            (FailCount::Unknown, FailCount::Unknown) => FailCount::Unknown,
        }
    }

    pub fn known(&self) -> Option<u32> {
        match self {
            FailCount::Count(n) => Some(*n),
            FailCount::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_flag() {
        assert_eq!(TestOutcome::from_flag(0), TestOutcome::Pass);
        assert_eq!(TestOutcome::from_flag(0x80), TestOutcome::Fail);
        assert_eq!(TestOutcome::from_flag(0xC0), TestOutcome::Indeterminate);
        assert_eq!(TestOutcome::from_flag(0x40), TestOutcome::Indeterminate);
        assert_eq!(TestOutcome::from_flag(-1), TestOutcome::NotTested);
        assert!(!TestOutcome::from_flag(-1).is_fail());
        assert!(!TestOutcome::from_flag(0xC0).is_fail());
    }

    #[test]
    fn test_part_status_bits() {
        assert_eq!(PartStatus::from_part_flag(0x00), PartStatus::Pass);
        assert_eq!(PartStatus::from_part_flag(0x08), PartStatus::Fail);
        assert_eq!(PartStatus::from_part_flag(0x10), PartStatus::Unknown);
        assert_eq!(PartStatus::from_part_flag(0x18), PartStatus::Unknown);
        // Supersede bits do not affect the result
        assert_eq!(PartStatus::from_part_flag(0x03), PartStatus::Pass);
        assert!(PartStatus::Unknown.counts_as_pass());
    }

    #[test]
    fn test_unindicated_part_infers_pass_bin() {
        assert_eq!(PartStatus::from_part_flag(0x10).bin_class(), BinClass::Pass);
        assert_eq!(PartStatus::from_part_flag(0x08).bin_class(), BinClass::Fail);
    }

    #[test]
    fn test_fail_count_merge() {
        assert_eq!(FailCount::from_raw(u32::MAX), FailCount::Unknown);
        assert_eq!(FailCount::Unknown.merge(FailCount::Unknown), FailCount::Unknown);
        assert_eq!(FailCount::Unknown.merge(FailCount::Count(3)), FailCount::Count(3));
        assert_eq!(FailCount::Count(2).merge(FailCount::Count(3)), FailCount::Count(5));
    }
}
