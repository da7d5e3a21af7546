use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use fsbwav::OutputLocation;

const EXAMPLES: &str = "\
Examples:
  fsbwav audio.fsb                    Write next to audio.fsb (same as --res)
  fsbwav music.bank --res             Write next to music.bank
  fsbwav sounds.fsb --exe             Write next to the fsbwav executable
  fsbwav voices.bank -o out/audio     Write into out/audio
  fsbwav music.bank -v                Also write a diagnostic log per bank

Every bank gets its own directory named after it. Streams are named after their
embedded name, or <bank>_<index> if they have none.";

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Extract the audio streams of FMOD .fsb and .bank files into .wav files")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_flag(true)
        .arg_required_else_help(true)
        .after_long_help(EXAMPLES)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .help("Print help (must be used alone)")
                .action(ArgAction::SetTrue)
                .exclusive(true),
        )
        .arg(
            Arg::new("res")
                .long("res")
                .help("Write output next to the input file (default)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("exe")
                .long("exe")
                .help("Write output next to this executable")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("OUTPUT_DIR")
                .help("Write output into the given directory")
                .value_parser(value_parser!(PathBuf)),
        )
        .group(ArgGroup::new("location").args(["res", "exe", "output"]))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Write a diagnostic log file for every bank")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("input")
                .value_name("FILE_PATH")
                .help("Path to the .fsb or .bank file")
                .required_unless_present("help")
                .value_parser(value_parser!(PathBuf)),
        )
}

pub fn output_location(matches: &ArgMatches) -> OutputLocation {
    if matches.get_flag("exe") {
        OutputLocation::Executable
    } else if let Some(dir) = matches.get_one::<PathBuf>("output") {
        OutputLocation::Custom(dir.clone())
    } else {
        OutputLocation::Resource
    }
}
