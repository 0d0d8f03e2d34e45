//! Human-readable dump of a vector's local part.

use crate::config::VecFlags;
use crate::core::Scalar;
use crate::error::VError;
use crate::vector::Vector;
use std::fmt;
use std::io;

impl<T: Scalar> Vector<T> {
    fn render(&self, out: &mut impl fmt::Write) -> fmt::Result {
        let Some(raw) = self.handle.as_ref() else {
            return writeln!(out, "Vector<{}> (finalized)", T::TYPE_NAME);
        };
        let ctx = raw.context();
        if ctx.is_finalized() {
            return writeln!(out, "Vector<{}> (finalized)", T::TYPE_NAME);
        }
        let Ok(layout) = raw.layout() else {
            return writeln!(out, "Vector<{}> rank {}: (sizes not set)", T::TYPE_NAME, ctx.rank());
        };
        writeln!(
            out,
            "Vector<{}> rank {}: local length {} of {}",
            T::TYPE_NAME,
            ctx.rank(),
            layout.local(),
            layout.global()
        )?;
        if !self.flags.contains(VecFlags::ASSEMBLED) {
            return writeln!(out, "  (not assembled)");
        }
        match raw.read() {
            Ok(values) => {
                for (i, v) in values.iter().enumerate() {
                    writeln!(out, "  {}: {}", layout.start() + i + 1, v)?;
                }
                Ok(())
            }
            Err(_) => writeln!(out, "  (storage busy)"),
        }
    }

    /// Write the dump of this process's entries to `out`.
    pub fn view<W: io::Write>(&self, out: &mut W) -> Result<(), VError> {
        let mut text = String::new();
        self.render(&mut text)
            .map_err(|_| VError::Resource("failed to format vector".into()))?;
        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

impl<T: Scalar> fmt::Display for Vector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}
