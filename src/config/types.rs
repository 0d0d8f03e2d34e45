//! Small tag types shared by the vector layer.

use crate::error::VError;
use bitflags::bitflags;
use std::str::FromStr;

/// How a staged write or an arriving halo value combines with what is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Overwrite the stored value.
    #[default]
    Insert,
    /// Accumulate into the stored value.
    Add,
}

impl FromStr for InsertMode {
    type Err = VError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" | "insert_values" => Ok(InsertMode::Insert),
            "add" | "add_values" => Ok(InsertMode::Add),
            other => Err(VError::Config(format!("unrecognized insert mode '{other}'"))),
        }
    }
}

/// Direction of a halo exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScatterDirection {
    /// Owner values are copied out to every ghost copy.
    Forward,
    /// Ghost copies are sent back to their owner.
    Reverse,
}

/// Access requested when borrowing local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Vector norms supported by [`crate::Vector::norm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormType {
    One,
    Two,
    Infinity,
}

impl NormType {
    /// Map a numeric `p` onto a norm kind.
    pub fn from_p(p: f64) -> Result<Self, VError> {
        if p == 1.0 {
            Ok(NormType::One)
        } else if p == 2.0 {
            Ok(NormType::Two)
        } else if p.is_infinite() && p > 0.0 {
            Ok(NormType::Infinity)
        } else {
            Err(VError::Config(format!("unrecognized norm kind p = {p}")))
        }
    }
}

impl FromStr for NormType {
    type Err = VError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(NormType::One),
            "2" | "two" => Ok(NormType::Two),
            "inf" | "infinity" => Ok(NormType::Infinity),
            other => Err(VError::Config(format!("unrecognized norm kind '{other}'"))),
        }
    }
}

/// Variant tag of a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecKind {
    /// Distributed over every process of the communicator.
    Standard,
    /// Process-local; reductions never leave the process.
    Sequential,
    /// Distributed, with trailing ghost slots mirroring remote entries.
    Ghosted,
}

bitflags! {
    /// Per-vector state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VecFlags: u8 {
        /// No staged-but-uncommitted writes on this process.
        const ASSEMBLED = 1;
        /// `is_assembled` asks every process instead of trusting the local bit.
        const VERIFY_ASSEMBLED = 1 << 1;
        /// The vector is a ghost local form and may only be restored.
        const LOCAL_FORM = 1 << 2;
        /// Storage was supplied by the caller.
        const WRAPPED = 1 << 3;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_type_parsing() {
        assert_eq!("inf".parse::<NormType>().unwrap(), NormType::Infinity);
        assert_eq!("2".parse::<NormType>().unwrap(), NormType::Two);
        assert!(matches!("3".parse::<NormType>(), Err(VError::Config(_))));
        assert_eq!(NormType::from_p(f64::INFINITY).unwrap(), NormType::Infinity);
        assert!(NormType::from_p(0.5).is_err());
    }

    #[test]
    fn insert_mode_parsing() {
        assert_eq!(InsertMode::default(), InsertMode::Insert);
        assert_eq!("ADD_VALUES".parse::<InsertMode>().unwrap(), InsertMode::Add);
    }
}
