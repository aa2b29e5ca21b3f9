#![allow(dead_code)]

mod convert;
mod efs;
mod endian;
mod error;
mod format;
mod image;
mod logger;
mod sgi;
mod tar;
#[cfg(test)]
mod test_image;
mod util;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{bail, Result};
use clap::{crate_version, App, Arg, ArgMatches};

use crate::error::EfsError;
use crate::format::EfsLayout;

const EXIT_ERROR: i32 = 1;
const EXIT_NOT_EFS: i32 = 2;

enum Mode {
    Convert { output: PathBuf },
    Check,
    List,
}

fn main() {
    let matches = App::new("efs2tar-rs")
        .version(crate_version!())
        .about("Converts SGI IRIX EFS disk and CD-ROM images into tar archives")
        .arg(Arg::with_name("IMAGE").help("The EFS image to convert").index(1))
        .arg(
            Arg::with_name("in")
                .long("in")
                .value_name("IMAGE")
                .help("The EFS image to convert, takes precedence over IMAGE"),
        )
        .arg(
            Arg::with_name("out")
                .long("out")
                .value_name("TAR")
                .help("The tar archive to create [default: IMAGE with the extension .tar]"),
        )
        .arg(
            Arg::with_name("check")
                .long("check")
                .value_name("IMAGE")
                .help("Only check whether the image holds an EFS filesystem"),
        )
        .arg(
            Arg::with_name("list")
                .long("list")
                .conflicts_with("out")
                .help("Print the files of the image instead of converting it"),
        )
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Log more, repeat for even more"))
        .arg(Arg::with_name("quiet").short("q").multiple(true).help("Log less"))
        .get_matches();

    if let Err(err) = logger::init(matches.occurrences_of("verbose"), matches.occurrences_of("quiet")) {
        eprintln!("Error: {:#}", err);
        exit(EXIT_ERROR);
    }

    if let Err(err) = run(&matches) {
        let not_efs = err.downcast_ref::<EfsError>().map_or(false, EfsError::is_not_efs);
        if not_efs {
            eprintln!("WARNING: {:#}", err);
            exit(EXIT_NOT_EFS);
        }
        eprintln!("Error: {:#}", err);
        exit(EXIT_ERROR);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let (input, mode) = resolve_arguments(matches)?;
    let layout = EfsLayout::IRIX;
    match mode {
        Mode::Convert { output } => {
            let stats = convert::convert(&input, &output, layout)?;
            println!("OK: valid EFS: {}", input.display());
            println!(
                "wrote tar: {} ({} directories, {} files, {} symlinks)",
                output.display(),
                stats.directories,
                stats.files,
                stats.symlinks
            );
        }
        Mode::Check => {
            let filesystem = convert::open_image(&input, layout)?;
            println!("OK: valid EFS: {}", input.display());
            println!("{}", convert::summary(&filesystem));
        }
        Mode::List => {
            let filesystem = convert::open_image(&input, layout)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            convert::list(&filesystem, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

/// `--in` takes precedence over `--check`, which takes precedence over the positional argument.
fn resolve_arguments(matches: &ArgMatches) -> Result<(PathBuf, Mode)> {
    let (input, check_only) = match (matches.value_of("in"), matches.value_of("check"), matches.value_of("IMAGE")) {
        (Some(input), _, _) => (input, false),
        (None, Some(input), _) => (input, true),
        (None, None, Some(input)) => (input, false),
        (None, None, None) => bail!("Need an input EFS image"),
    };
    let input = PathBuf::from(input);

    let mode = if check_only {
        Mode::Check
    } else if matches.is_present("list") {
        Mode::List
    } else {
        let output = match matches.value_of("out") {
            Some(output) => PathBuf::from(output),
            None => convert::output_path_for(&input),
        };
        Mode::Convert { output }
    };
    Ok((input, mode))
}
