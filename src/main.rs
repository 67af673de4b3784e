// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023
// - Volker Schwaberow <volker@schwaberow.de>

use adffs::consts::{ADF_DD_CAPACITY, ADF_HD_CAPACITY};
use adffs::{AdfImage, Dialect, Volume};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{LevelFilter, Log, Metadata, Record};
use std::error::Error;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn required<'a>(m: &'a ArgMatches, id: &str) -> Result<&'a str, Box<dyn Error>> {
    m.get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| format!("missing argument {}", id).into())
}

/// Opens a plain ADF, or the first ADF inside a ZIP archive. A strict load
/// fails on undecodable blocks and bad checksums.
fn load_volume(path: &str, strict: bool) -> Result<Volume, Box<dyn Error>> {
    let adf = if path.to_ascii_lowercase().ends_with(".zip") {
        AdfImage::load_from_zip(&fs::read(path)?, None)?
    } else {
        AdfImage::from_file(Path::new(path))?
    };
    if strict {
        Ok(Volume::from_image_strict(adf.as_bytes())?)
    } else {
        Ok(Volume::from_device(&adf)?)
    }
}

fn save_volume(vol: &Volume, path: &str) -> Result<(), Box<dyn Error>> {
    vol.to_adf_image()?.write_to_file(Path::new(path))?;
    Ok(())
}

fn type_arg() -> Arg {
    Arg::new("TYPE")
        .short('t')
        .long("type")
        .value_name("TYPE")
        .help("Filesystem type (OFS, FFS)")
        .default_value("OFS")
}

fn name_arg() -> Arg {
    Arg::new("NAME")
        .short('n')
        .long("name")
        .value_name("NAME")
        .help("Volume name")
        .default_value("Untitled")
}

fn strict_arg() -> Arg {
    Arg::new("strict")
        .long("strict")
        .action(ArgAction::SetTrue)
        .help("Refuse images with bad checksums or undecodable blocks")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of text")
}

fn main() -> Result<(), Box<dyn Error>> {
    let cmd = Command::new("adffs")
        .bin_name("adffs")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Volker Schwaberow <volker@schwaberow.de>")
        .about("Build, inspect and check Amiga OFS/FFS disk images")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Log to stderr (repeat for more detail)"),
        )
        .subcommand(
            Command::new("create")
                .about("Creates a new formatted ADF file")
                .arg(Arg::new("FILE").required(true).help("The ADF file to create"))
                .arg(type_arg())
                .arg(name_arg())
                .arg(
                    Arg::new("hd")
                        .long("hd")
                        .action(ArgAction::SetTrue)
                        .help("Create a high density disk"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Displays information about an ADF file")
                .arg(Arg::new("FILE").required(true).help("The ADF file to analyze"))
                .arg(strict_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("Lists contents of an ADF file")
                .arg(Arg::new("FILE").required(true).help("The ADF file to read"))
                .arg(
                    Arg::new("directory")
                        .short('d')
                        .long("directory")
                        .value_name("DIR")
                        .help("Directory to list (default: root)"),
                )
                .arg(
                    Arg::new("recursive")
                        .short('r')
                        .long("recursive")
                        .action(ArgAction::SetTrue)
                        .help("List subdirectories too"),
                )
                .arg(strict_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("check")
                .about("Checks the consistency of an ADF file")
                .arg(Arg::new("FILE").required(true).help("The ADF file to check"))
                .arg(
                    Arg::new("deep")
                        .long("deep")
                        .action(ArgAction::SetTrue)
                        .help("Also check padding and block ownership"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("extract")
                .about("Extracts a file from an ADF")
                .arg(
                    Arg::new("ADF_FILE")
                        .required(true)
                        .help("The ADF file to read from"),
                )
                .arg(
                    Arg::new("FILE_NAME")
                        .required(true)
                        .help("Path of the file inside the ADF"),
                )
                .arg(
                    Arg::new("OUTPUT")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output file (default: stdout)"),
                )
                .arg(strict_arg()),
        )
        .subcommand(
            Command::new("import")
                .about("Builds an ADF file from a host directory")
                .arg(Arg::new("DIR").required(true).help("The host directory to import"))
                .arg(Arg::new("FILE").required(true).help("The ADF file to create"))
                .arg(type_arg())
                .arg(name_arg()),
        )
        .subcommand(
            Command::new("export")
                .about("Copies the contents of an ADF into an empty host directory")
                .arg(Arg::new("ADF_FILE").required(true).help("The ADF file to read"))
                .arg(Arg::new("DIR").required(true).help("The target directory")),
        );

    let matches = cmd.get_matches();
    init_logging(matches.get_count("verbose"));

    match matches.subcommand() {
        Some(("create", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let dialect: Dialect = required(sub_matches, "TYPE")?.parse()?;
            let name = required(sub_matches, "NAME")?;
            let capacity = if sub_matches.get_flag("hd") {
                ADF_HD_CAPACITY
            } else {
                ADF_DD_CAPACITY
            };

            let vol = Volume::new(dialect, name, capacity)?;
            save_volume(&vol, file_path)?;
            println!(
                "Created ADF file: {} (Type: {}, Name: {})",
                file_path, dialect, name
            );
        }
        Some(("info", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let info = load_volume(file_path, sub_matches.get_flag("strict"))?.info();
            if sub_matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("ADF Information for {}:\n{}", file_path, info);
            }
        }
        Some(("list", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let vol = load_volume(file_path, sub_matches.get_flag("strict"))?;
            let dir = match sub_matches.get_one::<String>("directory") {
                Some(path) => vol.resolve(path)?,
                None => vol.layout().root,
            };

            let entries = vol.list(dir, sub_matches.get_flag("recursive"))?;
            if sub_matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                println!("Directory of {}:{}", vol.name(), vol.path_of(dir));
                for entry in &entries {
                    println!("{}", entry);
                }
                println!("{} entries", entries.len());
            }
        }
        Some(("check", sub_matches)) => {
            let file_path = required(sub_matches, "FILE")?;
            let report = load_volume(file_path, false)?.check(sub_matches.get_flag("deep"));
            if sub_matches.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Some(("extract", sub_matches)) => {
            let adf_path = required(sub_matches, "ADF_FILE")?;
            let file_name = required(sub_matches, "FILE_NAME")?;
            let output_path = sub_matches.get_one::<String>("OUTPUT");

            let vol = load_volume(adf_path, sub_matches.get_flag("strict"))?;
            let contents = vol.read_file(vol.resolve(file_name)?)?;

            match output_path {
                Some(path) => {
                    let mut file = File::create(path)?;
                    file.write_all(&contents)?;
                }
                None => {
                    std::io::stdout().write_all(&contents)?;
                }
            }
        }
        Some(("import", sub_matches)) => {
            let dir = required(sub_matches, "DIR")?;
            let file_path = required(sub_matches, "FILE")?;
            let dialect: Dialect = required(sub_matches, "TYPE")?.parse()?;
            let name = required(sub_matches, "NAME")?;

            let vol = Volume::from_host_dir(dialect, name, Path::new(dir))?;
            save_volume(&vol, file_path)?;
            println!(
                "Imported {} into {} ({} of {} blocks used)",
                dir,
                file_path,
                vol.used_blocks(),
                vol.capacity()
            );
        }
        Some(("export", sub_matches)) => {
            let adf_path = required(sub_matches, "ADF_FILE")?;
            let dir = required(sub_matches, "DIR")?;

            let vol = load_volume(adf_path, false)?;
            let count = vol.export_directory(vol.layout().root, Path::new(dir))?;
            println!("Exported {} item(s) to {}", count, dir);
        }
        _ => unreachable!("Exhaustive subcommand matching should prevent this"),
    }

    Ok(())
}
