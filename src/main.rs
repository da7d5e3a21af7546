mod cli;

use std::error::Error;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::error::ErrorKind;
use fsbwav::{Config, Event, Extractor, FsbEngine, RunSummary};

use crate::cli::{build_cli, output_location};

fn main() -> ExitCode {
    env_logger::init();

    let matches = match build_cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            if let Err(print_error) = e.print() {
                log::debug!("failed to print usage error: {print_error}");
            }
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    if matches.get_flag("help") {
        return match build_cli().print_long_help() {
            Ok(()) => ExitCode::SUCCESS,
            Err(_) => ExitCode::FAILURE,
        };
    }

    let input = matches
        .get_one::<PathBuf>("input")
        .expect("required argument");
    let config = Config::builder(input)
        .output(output_location(&matches))
        .verbose(matches.get_flag("verbose"))
        .build()
        .with_context(|| format!("failed to configure extraction of '{}'", input.display()));

    let result = config.and_then(|config| {
        let summary = Extractor::new(FsbEngine::new())
            .context("the decoding engine cannot be used")?
            .run(&config, render)
            .with_context(|| format!("failed to extract '{}'", input.display()))?;

        print_tally(&summary);

        if summary.is_total_failure() {
            return Err(anyhow!("no container in '{}' could be opened", input.display()));
        }
        Ok(())
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\n ===== ERROR =====");
            eprintln!(" {e:#}\n");
            acknowledge();
            ExitCode::FAILURE
        }
    }
}

fn render(event: Event<'_>) {
    match event {
        Event::RegionSkipped(failure) => eprintln!(
            " Skipped embedded bank at offset {} ({}): {}",
            failure.offset,
            failure.name,
            chain(&failure.error)
        ),
        Event::NoEmbeddedBanks { bank } => {
            println!(" No FSB5 banks found inside bank file: {}", bank.display());
        }
        Event::ContainerStart { name } => println!("\n ===== '{name}' Processing Start =====\n"),
        Event::ContainerUnreadable { name, error } => {
            eprintln!(" Failed to open '{name}': {}", chain(error));
        }
        Event::NoStreams { .. } => println!(" No sub-sounds found in the audio file."),
        Event::DirectoryCreated { path } => println!(" Created directory: {}", path.display()),
        Event::DirectoryFallback {
            path,
            fallback,
            error,
        } => eprintln!(
            " Failed to create directory {} ({error}), writing to {} instead",
            path.display(),
            fallback.display()
        ),
        Event::LogFile { path } => println!(" Log file path: {}", path.display()),
        Event::LogFileFailed { path, error } => {
            eprintln!(" Failed to create log file {}: {error}", path.display());
        }
        Event::StreamStart {
            descriptor,
            stream_count,
        } => {
            println!(
                "\n Processing sub-sound {}/{stream_count}:",
                u64::from(descriptor.index) + 1
            );
            println!(" Name: {}", descriptor.name.as_deref().unwrap_or_default());
            println!(" Channels: {}", descriptor.format.channels);
            println!(" Sample Rate: {} Hz", descriptor.sample_rate);
            println!(" Length: {} ms", descriptor.duration_ms);
        }
        Event::StreamWritten {
            path, data_size, ..
        } => println!(" Saved {} ({data_size} bytes of samples)", path.display()),
        Event::StreamFailed(failure) => eprintln!(" {}", chain(failure)),
        Event::ContainerEnd(report) => {
            if report.error.is_none() && report.stream_count > 0 {
                println!(
                    "\n {} of {} sub-sounds written",
                    report.streams_written, report.stream_count
                );
            }
            println!("\n ===== '{}' Processing End =====\n", report.name);
        }
        Event::TempCleanupFailed { path, error } => eprintln!(
            " Error deleting temporary FSB file {}: {error}",
            path.display()
        ),
    }
}

fn print_tally(summary: &RunSummary) {
    let failed = summary.streams_failed();
    let unreadable = summary
        .containers
        .iter()
        .filter(|report| report.error.is_some())
        .count();

    println!(
        " Done: {} streams written, {failed} failed, {unreadable} of {} containers unreadable",
        summary.streams_written(),
        summary.containers.len()
    );

    if summary.skipped_regions > 0 {
        println!(" {} embedded banks were skipped", summary.skipped_regions);
    }
}

// "outer: inner: innermost"
fn chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }

    message
}

fn acknowledge() {
    if !io::stdin().is_terminal() {
        return;
    }

    eprintln!(" Press Enter to continue...");
    let mut line = String::new();
    if let Err(e) = io::stdin().read_line(&mut line) {
        log::debug!("failed to read acknowledgment: {e}");
    }
}
