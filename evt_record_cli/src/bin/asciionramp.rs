use clap::{Arg, Command};

use libevt_record::constants::FIRST_USER_TYPE;
use libevt_record::injector::Injector;
use libevt_record::signal;

fn main() {
    let matches = Command::new("asciionramp")
        .about("Inject a child process's output into the record stream as typed records")
        .arg(
            Arg::new("command")
                .long("command")
                .required(true)
                .help("Child command line whose stdout is injected"),
        )
        .arg(
            Arg::new("type")
                .long("type")
                .value_parser(clap::value_parser!(u32))
                .help("Record type assigned to injected records (default: first user type)"),
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

    let inject_type = *matches.get_one::<u32>("type").unwrap_or(&FIRST_USER_TYPE);

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

    let mut injector = match Injector::spawn(&program, &args, inject_type) {
        Ok(i) => i,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(1);
        }
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = injector.run(std::io::stdin(), &mut out) {
        log::error!("Injection failed: {e}");
        std::process::exit(1);
    }
}
