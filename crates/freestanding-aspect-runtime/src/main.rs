//! A freestanding version of the Aspect runtime, for offline development.
//!
//! ## About
//!
//! The Aspect binary to execute is passed with the `--program-binary` flag,
//! either as WebAssembly binary or text, and the method to call with
//! `--method`.  Arguments are passed in order with `--arg` (as strings) and
//! `--bytes-arg` (hex-encoded byte arrays).  No host APIs are linked, so
//! the binary must not import any.
//!
//! To see verbose output of what is happening, set `RUST_LOG=info` before
//! executing.
//!
//! On success, the decoded return value of the method and the remaining gas
//! are printed to stdout.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use anyhow::{anyhow, Result};
use aspect_runtime::{
    new_aspect_runtime, new_validator, EngineKind, GasMetering, HostApiRegistry, RuntimeConfig,
    Value,
};
use clap::{Arg, ArgAction, ArgMatches};
use log::*;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};

////////////////////////////////////////////////////////////////////////////////
// Constants.
////////////////////////////////////////////////////////////////////////////////

/// About freestanding-aspect-runtime.
const ABOUT: &str = "freestanding-aspect-runtime, an offline counterpart of the Aspect runtime.  \
                     This can be used to test and develop Aspect binaries before deployment.";
/// The name of the application.
const APPLICATION_NAME: &str = "freestanding-aspect-runtime";
/// The authors list.
const AUTHORS: &str = "The Aspect Runtime Development Team.";
/// Application version number.
const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Gas budget of the call unless `--gas` says otherwise.
const DEFAULT_GAS: &str = "1000000";

////////////////////////////////////////////////////////////////////////////////
// Command line options and parsing.
////////////////////////////////////////////////////////////////////////////////

/// A struct capturing all of the command line options passed to the program.
struct CommandLineOptions {
    /// Path to the Aspect binary.
    program_binary: PathBuf,
    /// The exported method to call.
    method: String,
    /// EVM gas budget of the call.
    gas: i64,
    /// Method arguments, in command line order.
    arguments: Vec<Value>,
    config: RuntimeConfig,
    /// Whether the binary is validated before it is run.
    validate: bool,
}

/// Parses the command line options, building a `CommandLineOptions` struct out
/// of them.
fn parse_command_line() -> Result<CommandLineOptions> {
    let matches = clap::Command::new(APPLICATION_NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(ABOUT)
        .arg(
            Arg::new("program-binary")
                .short('p')
                .long("program-binary")
                .value_name("FILE")
                .help("Path to the Aspect binary, in .wasm or .wat format.")
                .required(true),
        )
        .arg(
            Arg::new("method")
                .short('m')
                .long("method")
                .value_name("NAME")
                .help("The exported method to call.")
                .required(true),
        )
        .arg(
            Arg::new("gas")
                .short('g')
                .long("gas")
                .value_name("EVM GAS")
                .default_value(DEFAULT_GAS)
                .help("Gas budget of the call, in EVM units."),
        )
        .arg(
            Arg::new("arg")
                .short('a')
                .long("arg")
                .value_name("STRING")
                .help("A string argument.  May be repeated.")
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("bytes-arg")
                .short('b')
                .long("bytes-arg")
                .value_name("HEX")
                .help("A byte array argument, hex-encoded.  May be repeated.")
                .num_args(1)
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("metering")
                .long("metering")
                .value_name("counter | fuel")
                .default_value("counter")
                .help("How gas is counted inside the guest."),
        )
        .arg(
            Arg::new("multiplier")
                .long("multiplier")
                .value_name("N")
                .help("WASM gas units per EVM gas unit."),
        )
        .arg(
            Arg::new("validate")
                .long("validate")
                .help("Validate the binary before running it.")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    info!("Parsed command line.");

    let program_binary = PathBuf::from(
        matches
            .get_one::<String>("program-binary")
            .ok_or_else(|| anyhow!("No program binary provided"))?,
    );
    let method = matches
        .get_one::<String>("method")
        .ok_or_else(|| anyhow!("No method provided"))?
        .to_string();
    let gas = matches
        .get_one::<String>("gas")
        .map(|gas| gas.parse::<i64>())
        .transpose()?
        .unwrap_or_default();

    let mut config = RuntimeConfig::default();
    if let Some(metering) = matches.get_one::<String>("metering") {
        config.gas.metering = GasMetering::from_str(metering).map_err(|_| {
            anyhow!(
                "Expecting 'counter' or 'fuel' as gas metering, but found {}",
                metering
            )
        })?;
    }
    if let Some(multiplier) = matches.get_one::<String>("multiplier") {
        config.gas.multiplier = multiplier.parse()?;
    }
    config.validate()?;

    let arguments = parse_arguments(&matches)?;
    info!("Selected {} arguments for {}.", arguments.len(), method);

    Ok(CommandLineOptions {
        program_binary,
        method,
        gas,
        arguments,
        config,
        validate: matches.get_flag("validate"),
    })
}

/// Collects `--arg` and `--bytes-arg` values in the order they were given.
fn parse_arguments(matches: &ArgMatches) -> Result<Vec<Value>> {
    let mut indexed = Vec::new();
    if let (Some(values), Some(indices)) = (
        matches.get_many::<String>("arg"),
        matches.indices_of("arg"),
    ) {
        for (value, index) in values.zip(indices) {
            indexed.push((index, Value::String(value.to_string())));
        }
    }
    if let (Some(values), Some(indices)) = (
        matches.get_many::<String>("bytes-arg"),
        matches.indices_of("bytes-arg"),
    ) {
        for (value, index) in values.zip(indices) {
            indexed.push((index, Value::ByteArray(hex::decode(value)?)));
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, value)| value).collect())
}

/// Reads the Aspect binary, assembling it first if it is in text format.
fn load_program(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path)?;
    let is_text = path
        .extension()
        .map_or(false, |extension| extension == "wat");
    if is_text {
        Ok(wat::parse_bytes(&bytes)?.into_owned())
    } else {
        Ok(bytes)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Entry point.
////////////////////////////////////////////////////////////////////////////////

fn main() -> Result<()> {
    env_logger::init();
    let cmdline = parse_command_line()?;
    info!("Command line read successfully.");

    let program = load_program(&cmdline.program_binary)?;
    info!(
        "Loaded {} bytes from {}.",
        program.len(),
        cmdline.program_binary.display()
    );

    if cmdline.validate {
        new_validator(EngineKind::Wasmtime, &cmdline.config)?.validate(&program)?;
        info!("Program binary validated.");
    }

    let main_time = Instant::now();
    let runtime = new_aspect_runtime(
        EngineKind::Wasmtime,
        &program,
        &HostApiRegistry::new(),
        &cmdline.config,
    )?;
    info!("Runtime ready in {:?}.", main_time.elapsed());

    let call_time = Instant::now();
    let output = runtime.call(&cmdline.method, cmdline.gas, &cmdline.arguments)?;
    info!("Call finished in {:?}.", call_time.elapsed());

    match output.value {
        Some(value) => println!("{}: {}", value.kind(), value),
        None => println!("(no return value)"),
    }
    println!("gas remaining: {}", output.gas_remaining);

    runtime.destroy();
    Ok(())
}
