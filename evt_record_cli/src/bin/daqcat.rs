use clap::{Arg, Command};
use std::io::Write;
use std::path::PathBuf;

use libevt_record::segment_reader::{ConcatOutcome, RunConcatenator};
use libevt_record::signal;

fn main() {
    let matches = Command::new("daqcat")
        .about("Dump a recorded run's segment files to stdout as one record stream")
        .arg(
            Arg::new("directory")
                .required(true)
                .help("Directory holding the run's segment files"),
        )
        .arg(
            Arg::new("run")
                .long("run")
                .required(true)
                .value_parser(clap::value_parser!(u32))
                .help("Run number to dump"),
        )
        .get_matches();

    // Record bytes go to stdout; all feedback goes to stderr.
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");

    signal::install_filter_policy();

    let directory = PathBuf::from(matches.get_one::<String>("directory").expect("required arg"));
    let run = *matches.get_one::<u32>("run").expect("required arg");

    let mut concat = match RunConcatenator::new(&directory, run) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match concat.dump(&mut out) {
        Ok(ConcatOutcome::CleanEnd { .. }) => {}
        Ok(ConcatOutcome::BadEnd { .. }) => {
            log::warn!("Run {run} is incomplete (bad-end terminator).");
        }
        Ok(ConcatOutcome::Truncated { .. }) => {
            log::warn!("Run {run} has no terminator record; the writer likely crashed.");
        }
        Err(e) => {
            log::error!("Dump of run {run} failed: {e}");
            std::process::exit(1);
        }
    }
    if let Err(e) = out.flush() {
        log::error!("Could not flush stdout: {e}");
        std::process::exit(1);
    }
}
