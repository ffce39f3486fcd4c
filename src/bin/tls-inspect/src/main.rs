//! Report and check the TLS layout of ELF executables.

use std::path::PathBuf;

use clap::Parser;
use miette::IntoDiagnostic;
use tlsprobe::{logging, Expectations, InspectError, InspectErrorKind, TlsImage, TDATA_INIT};

#[derive(clap::Parser, Clone, Debug)]
#[clap(
    name = "tls-inspect",
    version,
    about = "Report and check the thread-local storage layout of ELF executables",
    long_about = None
)]
struct Cli {
    /// ELF images to inspect
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Fail unless each image has .tbss, .tdata and a PT_TLS template
    #[arg(long)]
    check: bool,
    /// With --check, a u32 that must appear in the initialized TLS data
    #[arg(long, value_name = "VALUE", value_parser = parse_u32, requires = "check")]
    expect_tdata: Option<u32>,
    /// With --check, also require a position independent executable
    #[arg(long, requires = "check")]
    require_pie: bool,
    /// Print reports as JSON
    #[arg(long)]
    json: bool,
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn expectations(&self) -> Expectations {
        Expectations {
            require_pie: self.require_pie,
            tdata_value: Some(self.expect_tdata.unwrap_or(TDATA_INIT)),
        }
    }
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{}' is not a u32: {}", s, e))
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(logging::level_for(cli.verbose))?;

    let images = cli
        .files
        .iter()
        .map(|path| TlsImage::read(path))
        .collect::<Result<Vec<_>, _>>()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&images).into_diagnostic()?);
    } else {
        for image in &images {
            println!("{}", image);
        }
    }

    if cli.check {
        check_all(&images, &cli.expectations())?;
        tracing::info!("{} images passed TLS checks", images.len());
    }

    Ok(())
}

fn check_all(images: &[TlsImage], expect: &Expectations) -> Result<(), InspectError> {
    let mut errs = images
        .iter()
        .filter_map(|image| image.verify(expect).err())
        .collect::<Vec<_>>();
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        n => Err(InspectError::new_collect(
            InspectErrorKind::VerifyFailed {
                name: format!("{} of {} images", n, images.len()),
            },
            errs,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_u32("3735928559"), Ok(0xdeadbeef));
        assert_eq!(parse_u32("0xdeadbeef"), Ok(0xdeadbeef));
        assert_eq!(parse_u32("0XDEADBEEF"), Ok(0xdeadbeef));
        assert!(parse_u32("0x1_0000_0000").is_err());
        assert!(parse_u32("beef").is_err());
    }

    #[test]
    fn expect_tdata_requires_check() {
        assert!(Cli::try_parse_from(["tls-inspect", "--expect-tdata", "1", "a.out"]).is_err());
        let cli =
            Cli::try_parse_from(["tls-inspect", "--check", "--expect-tdata", "0x10", "a.out"])
                .unwrap();
        assert_eq!(cli.expectations().tdata_value, Some(0x10));
        assert!(!cli.expectations().require_pie);
    }

    #[test]
    fn check_defaults_to_probe_constant() {
        let cli = Cli::try_parse_from(["tls-inspect", "--check", "-vv", "a.out"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.expectations().tdata_value, Some(TDATA_INIT));
    }

    #[test]
    fn needs_a_file() {
        assert!(Cli::try_parse_from(["tls-inspect"]).is_err());
    }

    #[test]
    fn no_images_no_errors() {
        check_all(&[], &Expectations::default()).unwrap();
    }
}
