// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result};
use brikuu::{degrade_file, DegradeConfig, DegradeReport, Error};
use brikuu_layout::{ImageLayout, CHECKSUM_SCAN_SZ, HEADER_SIZE, NULL_END};
use clap::Parser;
use colored::Colorize;
use log::{error, info};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
struct LayoutArgs {
    /// Length of the header copied from the original image; the zeroed boot
    /// region starts right after it
    #[clap(long, value_parser = parse_int::parse::<usize>, default_value_t = HEADER_SIZE)]
    header_size: usize,

    /// End of the zeroed boot region, and the minimum image size
    #[clap(long, value_parser = parse_int::parse::<usize>, default_value_t = NULL_END)]
    zero_end: usize,

    /// Number of leading bytes searched for a CRC32 field
    #[clap(long, value_parser = parse_int::parse::<usize>, default_value_t = CHECKSUM_SCAN_SZ)]
    scan_size: usize,
}

impl From<LayoutArgs> for ImageLayout {
    fn from(args: LayoutArgs) -> Self {
        ImageLayout {
            header_size: args.header_size,
            null_start: args.header_size,
            null_end: args.zero_end,
            checksum_scan_size: args.scan_size,
        }
    }
}

#[derive(Debug, Parser)]
enum Command {
    /// Generate a degraded image for resilience / failover testing
    Degrade {
        /// Original firmware image; prompted for if omitted
        input: Option<PathBuf>,

        /// Directory the degraded image is written to
        #[clap(long, default_value = brikuu::degrade::OUTPUT_DIR)]
        out_dir: PathBuf,

        /// File name of the degraded image
        #[clap(long, default_value = brikuu::degrade::OUTPUT_NAME)]
        out_name: String,

        #[clap(flatten)]
        layout: LayoutArgs,
    },
    /// Check a degraded image against the original it was made from
    Verify {
        #[clap(short, long)]
        verbose: bool,
        src_original: PathBuf,
        src_degraded: PathBuf,

        #[clap(flatten)]
        layout: LayoutArgs,
    },
}

#[derive(Debug, Parser)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

fn prompt_for_input() -> Result<PathBuf> {
    print!("Enter path to original firmware file: ");
    std::io::stdout().flush()?;
    let mut reply = String::new();
    std::io::stdin()
        .read_line(&mut reply)
        .context("could not read input path")?;
    Ok(PathBuf::from(reply.trim()))
}

/// Runs the degrade pipeline. A missing input is reported and yields `None`
/// so the process exits cleanly without writing anything.
fn degrade(input: &Path, cfg: &DegradeConfig) -> Result<Option<DegradeReport>> {
    match degrade_file(input, cfg) {
        Ok(r) => Ok(Some(r)),
        Err(Error::InputNotFound(path)) => {
            error!("Input file not found: {}", path.display());
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> Result<()> {
    let cmd = Opts::parse();

    // Verify has a custom logger; everyone else can use the default
    if !matches!(cmd.cmd, Command::Verify { .. }) {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    match cmd.cmd {
        Command::Degrade {
            input,
            out_dir,
            out_name,
            layout,
        } => {
            let input = match input {
                Some(p) => p,
                None => prompt_for_input()?,
            };
            let cfg = DegradeConfig {
                layout: layout.into(),
                output_dir: out_dir,
                output_name: out_name,
            };

            let Some(report) = degrade(&input, &cfg)? else {
                return Ok(());
            };

            match report.checksum {
                Some(field) => info!(
                    "CRC32 field at 0x{:04X} set to {:08x}",
                    field.offset, field.value
                ),
                None => println!(
                    "{}: no CRC32 field patched; the image may still flash if \
                     the bootloader does not check it",
                    "WARNING".yellow()
                ),
            }
            println!("{} Firmware transformation complete", "[✓]".green());
            println!(
                "{} Output file : {}",
                "[✓]".green(),
                report.output_path.display()
            );
            println!("{} Final size  : {} bytes", "[✓]".green(), report.size);
        }
        Command::Verify {
            verbose,
            src_original,
            src_degraded,
            layout,
        } => {
            let original = std::fs::read(&src_original)
                .with_context(|| format!("could not read {src_original:?}"))?;
            let degraded = std::fs::read(&src_degraded)
                .with_context(|| format!("could not read {src_degraded:?}"))?;
            brikuu::verify::init_verify_logger(verbose);
            brikuu::verify::verify_image(&original, &degraded, &layout.into())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_input_is_not_an_error() {
        let dir = tempdir().expect("create temp dir");
        let cfg = DegradeConfig {
            output_dir: dir.path().join("brikuu"),
            ..Default::default()
        };

        let report = degrade(&dir.path().join("missing.bin"), &cfg).unwrap();
        assert!(report.is_none());
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn short_input_is_an_error() {
        let dir = tempdir().expect("create temp dir");
        let src = dir.path().join("tiny.bin");
        std::fs::write(&src, [0u8; 100]).unwrap();
        let cfg = DegradeConfig {
            output_dir: dir.path().join("brikuu"),
            ..Default::default()
        };

        assert!(degrade(&src, &cfg).is_err());
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn layout_flags_keep_regions_contiguous() {
        let opts = Opts::parse_from(["brikuu", "degrade", "fw.bin", "--header-size", "0x100"]);
        let Command::Degrade { layout, .. } = opts.cmd else {
            panic!("expected degrade");
        };
        let layout: ImageLayout = layout.into();
        assert_eq!(layout.header_size, 0x100);
        assert_eq!(layout.null_start, 0x100);
        assert_eq!(layout.null_end, NULL_END);
        assert_eq!(layout.checksum_scan_size, CHECKSUM_SCAN_SZ);
    }
}
