//! Command-line or API options for vectors.
//!
//! `VecOptions` holds the defaults a [`crate::Context`] hands to every vector it
//! creates: whether `is_assembled` verifies across all processes, the default
//! block size, and the insertion mode used by scalar and range assignment.
//! Options can be set directly or parsed from PETSc-style arguments such as
//! `-vec_block_size 2`.

use crate::config::types::InsertMode;
use crate::error::VError;

/// Vector defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct VecOptions {
    /// Make `is_assembled` a collective AND over all processes.
    pub verify_assembled: bool,

    /// Block size applied to newly sized vectors.
    pub block_size: usize,

    /// Mode used by `set`, range and mask assignment.
    pub insert_mode: InsertMode,
}

impl Default for VecOptions {
    fn default() -> Self {
        Self {
            verify_assembled: false,
            block_size: 1,
            insert_mode: InsertMode::Insert,
        }
    }
}

impl VecOptions {
    /// Parse `-vec_*` options out of an argument list; other arguments are skipped.
    ///
    /// Recognized keys: `-vec_verify_assembled [true|false]`,
    /// `-vec_block_size <n>`, `-vec_insert_mode <insert|add>`.
    pub fn from_args<I, S>(args: I) -> Result<Self, VError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_owned()).collect();
        let mut opts = Self::default();
        let mut i = 0;
        while i < args.len() {
            let key = args[i].as_str();
            let value = args.get(i + 1).filter(|v| !v.starts_with('-'));
            match key {
                "-vec_verify_assembled" => {
                    opts.verify_assembled = match value.map(String::as_str) {
                        None => true,
                        Some("true") | Some("1") | Some("yes") => true,
                        Some("false") | Some("0") | Some("no") => false,
                        Some(other) => {
                            return Err(VError::Config(format!(
                                "-vec_verify_assembled expects a boolean, got '{other}'"
                            )));
                        }
                    };
                    if value.is_some() {
                        i += 1;
                    }
                }
                "-vec_block_size" => {
                    let raw = value.ok_or_else(|| {
                        VError::Config("-vec_block_size requires a value".into())
                    })?;
                    let bs: usize = raw.parse().map_err(|_| {
                        VError::Config(format!("-vec_block_size expects an integer, got '{raw}'"))
                    })?;
                    if bs == 0 {
                        return Err(VError::Config("block size must be positive".into()));
                    }
                    opts.block_size = bs;
                    i += 1;
                }
                "-vec_insert_mode" => {
                    let raw = value.ok_or_else(|| {
                        VError::Config("-vec_insert_mode requires a value".into())
                    })?;
                    opts.insert_mode = raw.parse()?;
                    i += 1;
                }
                k if k.starts_with("-vec_") => {
                    return Err(VError::Config(format!("unknown vector option '{k}'")));
                }
                _ => {}
            }
            i += 1;
        }
        Ok(opts)
    }
}
