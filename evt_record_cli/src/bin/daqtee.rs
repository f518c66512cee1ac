use clap::{Arg, Command};

use libevt_record::byte_source::FdSource;
use libevt_record::record_reader::BufferedRecordReader;
use libevt_record::signal;
use libevt_record::tee::{RecordTee, TypeRange, TypeRangeSet};

fn main() {
    let matches = Command::new("daqtee")
        .about("Forward the record stream while duplicating selected types to a child process")
        .arg(
            Arg::new("ranges")
                .required(true)
                .num_args(1..)
                .help("Record type selections, each N or N-M (inclusive)"),
        )
        .arg(
            Arg::new("command")
                .long("command")
                .required(true)
                .help("Child command line receiving the duplicated records on stdin"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");

    signal::install_filter_policy();

    let mut ranges = Vec::new();
    for raw in matches
        .get_many::<String>("ranges")
        .expect("required args")
    {
        match raw.parse::<TypeRange>() {
            Ok(TypeRange(lo, hi)) => ranges.push((lo, hi)),
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        }
    }
    let ranges = match TypeRangeSet::new(ranges) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let command_line = matches.get_one::<String>("command").expect("required arg");
    let mut words = command_line.split_whitespace();
    let program = match words.next() {
        Some(p) => p.to_string(),
        None => {
            log::error!("--command is empty");
            std::process::exit(1);
        }
    };
    let args: Vec<String> = words.map(String::from).collect();

    let mut tee = match RecordTee::spawn(&program, &args, ranges) {
        Ok(t) => t,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut reader = BufferedRecordReader::new(FdSource::new(std::io::stdin()));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match tee.run(&mut reader, &mut out) {
        Ok(forwarded) => log::info!("Forwarded {forwarded} record(s)."),
        Err(e) => {
            log::error!("Tee failed: {e}");
            std::process::exit(1);
        }
    }
}
