//! CLI entry point for the offline TXT inspector.

mod logging;
mod report;

use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
#[cfg(test)]
use tempfile as _;
use txt_decode::{
    decode_register_space, parse_bios_data_region, read_acm_status, MemoryImage, MsrTable,
    PlatformConfig, PlatformFeatures,
};

use crate::report::{render, BiosDataReport, FeaturesReport, RegistersReport};

const USAGE_TEXT: &str = "\
Usage: txt-inspect <command> [options]

Commands:
  registers <public-space.bin> [--base <addr>] [--json]  Decode a TXT public space dump
  bios-data <heap.bin> [--json]                          Parse the BIOS data region of a heap dump
  features  <msrs.txt> [--cpu <n>] [--json]              Evaluate platform features from an MSR table

Options:
  --base <addr>    Physical address of the dump (default: 0xFED30000)
  --cpu <n>        Logical CPU whose MSRs are queried (default: 0)
  --json           Print the decoded record as JSON
  -v, --verbose    Log every register read to stderr
  -h, --help       Show this help message

Environment:
  TXT_INSPECT_DEBUG=1   Same as --verbose

Examples:
  txt-inspect registers fed30000.bin
  txt-inspect bios-data heap.bin --json
  txt-inspect features msrs.txt --cpu 2
";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Registers(RegistersArgs),
    BiosData(BiosDataArgs),
    Features(FeaturesArgs),
}

#[derive(Debug, PartialEq, Eq)]
struct RegistersArgs {
    input: PathBuf,
    base: u64,
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct BiosDataArgs {
    input: PathBuf,
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct FeaturesArgs {
    input: PathBuf,
    cpu: u32,
    json: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    command: Command,
    verbose: bool,
}

#[derive(Debug)]
enum ParseResult {
    Command(Invocation),
    Help,
}

fn is_verbose_flag(arg: &OsStr) -> bool {
    arg == "-v" || arg == "--verbose"
}

fn parse_args(args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let mut verbose = false;
    let remaining: Vec<OsString> = args
        .filter(|arg| {
            let flag = is_verbose_flag(arg);
            verbose |= flag;
            !flag
        })
        .collect();
    let mut rest = remaining.into_iter();

    let first = rest.next().ok_or_else(|| "missing command".to_string())?;
    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command = match &*first.to_string_lossy() {
        "registers" => parse_registers_args(&mut rest).map(Command::Registers)?,
        "bios-data" => parse_bios_data_args(&mut rest).map(Command::BiosData)?,
        "features" => parse_features_args(&mut rest).map(Command::Features)?,
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(ParseResult::Command(Invocation { command, verbose }))
}

/// Options shared by every subcommand.
#[derive(Debug, Default)]
struct CommonArgs {
    input: Option<PathBuf>,
    json: bool,
}

impl CommonArgs {
    fn accept(&mut self, arg: OsString) -> Result<(), String> {
        if arg == "--help" || arg == "-h" {
            return Err(USAGE_TEXT.to_string());
        }

        if arg == "--json" {
            self.json = true;
            return Ok(());
        }

        if arg.to_string_lossy().starts_with('-') {
            return Err(format!("unknown option: {}", arg.to_string_lossy()));
        }

        if self.input.is_some() {
            return Err("multiple input paths provided".to_string());
        }
        self.input = Some(PathBuf::from(arg));
        Ok(())
    }

    fn input(self) -> Result<(PathBuf, bool), String> {
        let input = self.input.ok_or_else(|| "missing input path".to_string())?;
        Ok((input, self.json))
    }
}

fn option_value(
    args: &mut impl Iterator<Item = OsString>,
    option: &str,
) -> Result<String, String> {
    args.next()
        .map(|value| value.to_string_lossy().into_owned())
        .ok_or_else(|| format!("missing value for {option}"))
}

fn parse_address(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => text.replace('_', "").parse(),
    };
    parsed.map_err(|error| format!("invalid address {text}: {error}"))
}

#[allow(clippy::while_let_on_iterator)]
fn parse_registers_args(
    args: &mut impl Iterator<Item = OsString>,
) -> Result<RegistersArgs, String> {
    let mut common = CommonArgs::default();
    let mut base = PlatformConfig::default().txt_public_base;

    while let Some(arg) = args.next() {
        if arg == "--base" {
            base = parse_address(&option_value(args, "--base")?)?;
            continue;
        }
        common.accept(arg)?;
    }

    let (input, json) = common.input()?;
    Ok(RegistersArgs { input, base, json })
}

fn parse_bios_data_args(
    args: &mut impl Iterator<Item = OsString>,
) -> Result<BiosDataArgs, String> {
    let mut common = CommonArgs::default();
    for arg in args {
        common.accept(arg)?;
    }

    let (input, json) = common.input()?;
    Ok(BiosDataArgs { input, json })
}

#[allow(clippy::while_let_on_iterator)]
fn parse_features_args(
    args: &mut impl Iterator<Item = OsString>,
) -> Result<FeaturesArgs, String> {
    let mut common = CommonArgs::default();
    let mut cpu = PlatformConfig::default().msr_cpu;

    while let Some(arg) = args.next() {
        if arg == "--cpu" {
            let value = option_value(args, "--cpu")?;
            cpu = value
                .parse()
                .map_err(|error| format!("invalid cpu {value}: {error}"))?;
            continue;
        }
        common.accept(arg)?;
    }

    let (input, json) = common.input()?;
    Ok(FeaturesArgs { input, cpu, json })
}

fn read_dump(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path).map_err(|error| format!("cannot read {}: {error}", path.display()))
}

fn run_registers(args: &RegistersArgs) -> Result<String, String> {
    let bytes = read_dump(&args.input)?;
    info!("mapping {} bytes at {:#x}", bytes.len(), args.base);

    let config = PlatformConfig {
        txt_public_base: args.base,
        ..PlatformConfig::default()
    };
    let mut mem = MemoryImage::new(args.base, bytes);
    let registers = decode_register_space(&mut mem, &config).map_err(|error| error.to_string())?;
    let acm_status = read_acm_status(&mut mem, args.base).map_err(|error| error.to_string())?;

    render(
        &RegistersReport {
            base: args.base,
            registers: &registers,
            acm_status: &acm_status,
        },
        args.json,
    )
}

fn run_bios_data(args: &BiosDataArgs) -> Result<String, String> {
    let bytes = read_dump(&args.input)?;
    let bios_data = parse_bios_data_region(&bytes).map_err(|error| error.to_string())?;
    render(
        &BiosDataReport {
            bios_data: &bios_data,
        },
        args.json,
    )
}

fn run_features(args: &FeaturesArgs) -> Result<String, String> {
    let text = fs::read_to_string(&args.input)
        .map_err(|error| format!("cannot read {}: {error}", args.input.display()))?;
    let mut msrs = MsrTable::parse(&text)
        .map_err(|error| format!("{}: {error}", args.input.display()))?;
    debug!("loaded {} msr values", msrs.len());

    let features =
        PlatformFeatures::query(&mut msrs, args.cpu).map_err(|error| error.to_string())?;
    render(
        &FeaturesReport {
            features: &features,
        },
        args.json,
    )
}

fn run(invocation: &Invocation) -> Result<String, String> {
    logging::init(invocation.verbose);
    match &invocation.command {
        Command::Registers(args) => run_registers(args),
        Command::BiosData(args) => run_bios_data(args),
        Command::Features(args) => run_features(args),
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Command(invocation)) => match run(&invocation) {
            Ok(output) => {
                print!("{output}");
                if !output.ends_with('\n') {
                    println!();
                }
                0
            }
            Err(error) => {
                eprintln!("error: {error}");
                1
            }
        },
        Err(error) => {
            if error.starts_with("Usage:") {
                println!("{error}");
            } else {
                eprintln!("error: {error}");
                eprintln!("{USAGE_TEXT}");
            }
            1
        }
    };

    std::process::exit(exit_code);
}
