use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use colored::Colorize;

use ocho::error::{EmuError, ExitStatus};
use ocho::{Assembler, Emulator, Machine, Screen};

/// Ocho is a complete assembler & emulator toolchain for the CHIP-8 virtual machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.cp8` or `.ch8` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble (if needed) and run a `.cp8` or `.ch8` file
    Run {
        /// `.cp8` or `.ch8` file to run
        name: PathBuf,
    },
    /// Create a binary `.ch8` image to run later or distribute
    Compile {
        /// `.cp8` file to assemble
        name: PathBuf,
        /// Destination for the `.ch8` image
        dest: Option<PathBuf>,
    },
    /// Check a `.cp8` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit(ExitStatus::Success.code())
                }
                _ => exit(ExitStatus::Usage.code()),
            }
        }
    };

    let _ = miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(ocho::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }));

    match args.command {
        Some(Command::Run { name }) => run(&name),
        Some(Command::Compile { name, dest }) => compile(&name, dest),
        Some(Command::Check { name }) => check(&name),
        None => match args.path {
            Some(path) => run(&path),
            None => {
                println!("\n~ ocho v{VERSION} ~");
                println!("{}", LOGO.truecolor(255, 140, 105).bold());
                println!("{SHORT_INFO}");
                exit(ExitStatus::Usage.code());
            }
        },
    }
}

fn run(name: &Path) -> ! {
    use MsgColor::*;
    let image = build_image(name);
    let mut machine = Machine::new();
    if let Err(e) = machine.load_image(&image) {
        fail(ExitStatus::Io, e);
    }
    let screen = match Screen::open() {
        Ok(screen) => screen,
        Err(e) => fail(ExitStatus::System, e),
    };

    message(Green, "Running", "emitted image");
    let mut emulator = Emulator::new(machine, screen);
    match emulator.run() {
        Ok(()) => {}
        Err(EmuError::Exec(e)) => fail(ExitStatus::Runtime, e),
        Err(EmuError::Frontend(e)) => fail(ExitStatus::System, e),
    }

    file_message(Green, "Completed", name);
    exit(ExitStatus::Success.code())
}

/// Program bytes for a source or binary file, dispatched on extension.
fn build_image(name: &Path) -> Vec<u8> {
    use MsgColor::*;
    file_message(Green, "Assembling", name);
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("cp8") => assemble(&read_source(name)),
        Some("ch8") => match fs::read(name) {
            Ok(bytes) => bytes,
            Err(e) => fail(ExitStatus::Io, e),
        },
        _ => {
            message(Red, "Error", "file must have a .cp8 or .ch8 extension");
            exit(ExitStatus::Usage.code())
        }
    }
}

fn compile(name: &Path, dest: Option<PathBuf>) -> ! {
    use MsgColor::*;
    file_message(Green, "Assembling", name);
    require_source_extension(name);
    let image = assemble(&read_source(name));

    let out_file_name =
        dest.unwrap_or_else(|| name.with_extension("ch8").file_name().unwrap().into());
    if let Err(e) = fs::write(&out_file_name, &image) {
        fail(ExitStatus::Io, e);
    }

    message(Green, "Finished", "emit binary");
    file_message(Green, "Saved", &out_file_name);
    exit(ExitStatus::Success.code())
}

fn check(name: &Path) -> ! {
    use MsgColor::*;
    file_message(Green, "Checking", name);
    require_source_extension(name);
    let _ = assemble(&read_source(name));
    message(Green, "Success", "no errors found!");
    exit(ExitStatus::Success.code())
}

fn require_source_extension(name: &Path) {
    if name.extension().and_then(|ext| ext.to_str()) != Some("cp8") {
        message(MsgColor::Red, "Error", "expected a .cp8 source file");
        exit(ExitStatus::Usage.code());
    }
}

fn read_source(name: &Path) -> String {
    match fs::read_to_string(name) {
        Ok(source) => source,
        Err(e) => fail(ExitStatus::Io, e),
    }
}

/// Assemble source to an image, rendering diagnostics on failure.
fn assemble(source: &str) -> Vec<u8> {
    match Assembler::new(source).assemble() {
        Ok(image) => image,
        Err(report) => {
            eprintln!("{report:?}");
            exit(ExitStatus::Assembler.code())
        }
    }
}

fn fail(status: ExitStatus, err: impl std::fmt::Display) -> ! {
    message(MsgColor::Red, "Error", err.to_string().as_str());
    exit(status.code())
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

const LOGO: &str = r#"
            888
 .d88b.  .d8888b 88888b.   .d88b.
d88""88b d88P"   888 "88b d88""88b
888  888 888     888  888 888  888
Y88..88P Y88b.   888  888 Y88..88P
 "Y88P"   "Y8888 888  888  "Y88P""#;

const SHORT_INFO: &str = r"
Welcome to ocho, an all-in-one toolchain for assembling and running
CHIP-8 programs.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
