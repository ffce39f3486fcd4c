//! Formatting of the probe output.
//!
//! One `arg <i>: <value>` line per argument, then `arg <tbss> <tdata>` without a trailing newline.

use std::{ffi::OsStr, io::Write};

use crate::entries::TlsSnapshot;

/// Write one line per argument, index first.
pub fn write_args<W, I, S>(out: &mut W, args: I) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    for (i, arg) in args.into_iter().enumerate() {
        write!(out, "arg {}: ", i)?;
        write_os_str(out, arg.as_ref())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Write the summary line with both entry values.
pub fn write_summary<W: Write>(out: &mut W, snapshot: &TlsSnapshot) -> std::io::Result<()> {
    write!(out, "arg {} {}", snapshot.tbss, snapshot.tdata)
}

/// Write the complete probe output.
pub fn write_report<W, I, S>(out: &mut W, args: I, snapshot: &TlsSnapshot) -> std::io::Result<()>
where
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    write_args(out, args)?;
    write_summary(out, snapshot)
}

#[cfg(unix)]
fn write_os_str<W: Write>(out: &mut W, s: &OsStr) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    out.write_all(s.as_bytes())
}

#[cfg(not(unix))]
fn write_os_str<W: Write>(out: &mut W, s: &OsStr) -> std::io::Result<()> {
    out.write_all(s.to_string_lossy().as_bytes())
}
