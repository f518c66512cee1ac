use clap::{Arg, Command};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use libevt_record::byte_source::FdSource;
use libevt_record::config::SegmenterConfig;
use libevt_record::record_reader::BufferedRecordReader;
use libevt_record::segment_writer::{RunSegmenter, SegmenterOutcome};
use libevt_record::signal;

fn make_template_config(path: &Path) {
    let config = SegmenterConfig::default();
    let yaml_str = serde_yaml::to_string(&config).expect("Could not serialize default config!");
    let mut file = File::create(path).expect("Could not create template config file!");
    file.write_all(yaml_str.as_bytes())
        .expect("Failed to write yaml data to file!");
}

fn main() {
    let matches = Command::new("segmenter")
        .about("Record the run arriving on stdin into size-capped segment files")
        .arg(
            Arg::new("directory")
                .required_unless_present("new-config")
                .help("Directory the segment files are written into"),
        )
        .arg(
            Arg::new("segsize")
                .long("segsize")
                .value_parser(clap::value_parser!(u64))
                .help("Segment size threshold in megabytes (default 2000)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .value_parser(clap::value_parser!(u64))
                .help("Seconds to pause at startup, for attaching a debugger"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Optional YAML configuration file"),
        )
        .arg(
            Arg::new("new-config")
                .long("new-config")
                .help("Write a template configuration yaml file to the given path and exit"),
        )
        .get_matches();

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .expect("Could not create logging!");

    if let Some(path) = matches.get_one::<String>("new-config") {
        log::info!("Making a template config at {path}...");
        make_template_config(&PathBuf::from(path));
        log::info!("Done.");
        return;
    }

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => match SegmenterConfig::read_config_file(&PathBuf::from(path)) {
            Ok(c) => c,
            Err(e) => {
                log::error!("{e}");
                std::process::exit(1);
            }
        },
        None => SegmenterConfig::default(),
    };
    if let Some(segsize) = matches.get_one::<u64>("segsize") {
        config.segment_size_mb = *segsize;
    }
    if let Some(debug) = matches.get_one::<u64>("debug") {
        config.debug_holdoff_secs = Some(*debug);
    }

    let directory = PathBuf::from(matches.get_one::<String>("directory").expect("required arg"));

    signal::install_writer_policy();

    if let Some(secs) = config.debug_holdoff_secs {
        log::info!("Holding off {secs} second(s) before consuming input...");
        std::thread::sleep(std::time::Duration::from_secs(secs));
    }

    log::info!(
        "Segmenting into {} with a {} MB cap",
        directory.to_string_lossy(),
        config.segment_size_mb
    );

    let mut segmenter = match RunSegmenter::new(&directory, config.segment_size_mb) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let mut reader = BufferedRecordReader::new(FdSource::new(std::io::stdin()));
    match segmenter.process(&mut reader) {
        Ok(SegmenterOutcome::CleanEnd { run, segments }) => {
            log::info!("Run {run} recorded cleanly in {segments} segment(s).");
        }
        Ok(SegmenterOutcome::BadEnd { run, segments }) => {
            log::warn!(
                "Run {run} ended without an end-run record; {segments} segment(s) written with a bad-end terminator."
            );
        }
        Ok(SegmenterOutcome::NoInput) => {
            log::warn!("Input carried no run; nothing written.");
        }
        Err(e) => {
            log::error!("Segmenting failed: {e}");
            std::process::exit(1);
        }
    }
}
