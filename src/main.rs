use clap::{arg, command, value_parser, Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use teamalloc::alloc::CostModel;
use teamalloc::config::Config;
use teamalloc::io::checkpoint::{self, Checkpointer};
use teamalloc::io::roster::Roster;
use teamalloc::io::{report, survey};
use teamalloc::search::driver::{self, SearchOptions};
use teamalloc::{Cost, Survey};

/// An exit code with the message to report
type Failure = (exitcode::ExitCode, String);

fn main() {
    let args = parse_cli_args();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let code = match run(&args) {
        Ok(()) => exitcode::OK,
        Err((code, message)) => {
            error!("{}", message);
            code
        }
    };
    std::process::exit(code);
}

fn parse_cli_args() -> ArgMatches {
    command!()
        .about("Allocate students to project teams according to their preferences")
        .arg(
            arg!(-c --config <FILE> "Configuration file (JSON)")
                .value_parser(value_parser!(PathBuf))
                .default_value("config.json")
                .global(true),
        )
        .arg(
            arg!(-r --roster <FILE> "Roster CSV file from the registrar")
                .value_parser(value_parser!(PathBuf))
                .default_value("students.csv")
                .global(true),
        )
        .arg(
            arg!(-s --survey <FILE> "Survey export CSV file")
                .value_parser(value_parser!(PathBuf))
                .default_value("survey.csv")
                .global(true),
        )
        .arg(
            arg!(-d --"out-dir" <DIR> "Directory to store checkpoints of good allocations in")
                .value_parser(value_parser!(PathBuf))
                .default_value("."),
        )
        .arg(
            arg!(--seed <SEED> "Seed for the random number generator (random if not given)")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            arg!(--restarts <N> "Stop the search after N restarts instead of running until \
                 interrupted")
            .value_parser(value_parser!(usize)),
        )
        .arg(
            arg!(--threshold <SCORE> "Save allocations scoring below SCORE (overrides the \
                 configuration)")
            .value_parser(value_parser!(Cost)),
        )
        .arg(arg!(--swaps "List possible swaps and moves for each rendered checkpoint"))
        .arg(
            Arg::new("final")
                .long("final")
                .action(ArgAction::SetTrue)
                .conflicts_with("swaps")
                .help("Only list the names of the team members of each rendered checkpoint"),
        )
        .arg(
            arg!([CHECKPOINTS] ... "Checkpoint files to render instead of searching")
                .value_parser(value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("tokens")
                .about("Write the token database for the survey platform from the roster")
                .arg(
                    arg!(-o --output <FILE> "Output CSV file")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("token_database.csv"),
                ),
        )
        .subcommand(Command::new("summary").about("Print a summary of the survey data"))
        .subcommand(
            Command::new("dedupe")
                .about("Delete checkpoint files holding the same allocation as another one")
                .arg(
                    arg!([DIR] "Directory of the checkpoint files")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("."),
                ),
        )
        .get_matches()
}

/// Get the value of a path argument with default value
fn path_arg<'a>(args: &'a ArgMatches, id: &str) -> &'a Path {
    args.get_one::<PathBuf>(id)
        .expect("path arguments have default values")
}

fn run(args: &ArgMatches) -> Result<(), Failure> {
    match args.subcommand() {
        Some(("tokens", sub_args)) => write_tokens(args, path_arg(sub_args, "output")),
        Some(("summary", _)) => {
            let (_, survey) = read_inputs(args)?;
            print!("{}", report::format_summary(&survey));
            Ok(())
        }
        Some(("dedupe", sub_args)) => {
            let dir = path_arg(sub_args, "DIR");
            let removed = checkpoint::dedupe(dir).map_err(|e| (exitcode::IOERR, e))?;
            info!("Removed {} duplicate checkpoints from {}", removed, dir.display());
            Ok(())
        }
        _ => {
            let (config, survey) = read_inputs(args)?;
            match args.get_many::<PathBuf>("CHECKPOINTS") {
                Some(files) => render(args, &config, &survey, files),
                None => optimize(args, &config, &survey),
            }
        }
    }
}

fn read_config(path: &Path) -> Result<Config, Failure> {
    let file = std::fs::File::open(path).map_err(|e| {
        (
            exitcode::NOINPUT,
            format!("Could not open config file {}: {}", path.display(), e),
        )
    })?;
    Config::read(std::io::BufReader::new(file))
        .map_err(|e| (exitcode::CONFIG, format!("Invalid config file {}: {}", path.display(), e)))
}

fn read_roster(path: &Path) -> Result<Roster, Failure> {
    let file = std::fs::File::open(path).map_err(|e| {
        (
            exitcode::NOINPUT,
            format!("Could not open roster file {}: {}", path.display(), e),
        )
    })?;
    let roster = Roster::read(std::io::BufReader::new(file))
        .map_err(|e| (exitcode::DATAERR, format!("{}: {}", path.display(), e)))?;
    info!("Read {} students from roster {}", roster.len(), path.display());
    Ok(roster)
}

/// Read configuration, roster and survey and build the survey data
fn read_inputs(args: &ArgMatches) -> Result<(Config, Survey), Failure> {
    let config = read_config(path_arg(args, "config"))?;
    let roster = read_roster(path_arg(args, "roster"))?;

    let path = path_arg(args, "survey");
    let file = std::fs::File::open(path).map_err(|e| {
        (
            exitcode::NOINPUT,
            format!("Could not open survey file {}: {}", path.display(), e),
        )
    })?;
    let survey = survey::read(std::io::BufReader::new(file), &roster, &config)
        .map_err(|e| (exitcode::DATAERR, format!("{}: {}", path.display(), e)))?;
    info!(
        "Read {} students and {} projects",
        survey.students.len(),
        survey.projects.len()
    );

    Ok((config, survey))
}

fn write_tokens(args: &ArgMatches, output: &Path) -> Result<(), Failure> {
    let roster = read_roster(path_arg(args, "roster"))?;
    let file = std::fs::File::create(output).map_err(|e| {
        (
            exitcode::CANTCREAT,
            format!("Could not create {}: {}", output.display(), e),
        )
    })?;
    roster
        .write_tokens(std::io::BufWriter::new(file))
        .map_err(|e| (exitcode::IOERR, e))?;
    info!("Wrote {} tokens to {}", roster.len(), output.display());
    Ok(())
}

/// Print the reports of the given checkpoint files
fn render<'a>(
    args: &ArgMatches,
    config: &Config,
    survey: &Survey,
    files: impl Iterator<Item = &'a PathBuf>,
) -> Result<(), Failure> {
    let model = CostModel::new(survey, &config.penalties);
    for path in files {
        let (alloc, _) = checkpoint::load(path, survey).map_err(|e| (exitcode::DATAERR, e))?;

        if args.get_flag("final") {
            println!("{}", report::format_final(survey, &alloc));
            continue;
        }
        print!("\n\n{}\n", path.display());
        println!("{}", report::format_allocation(model, &alloc));
        if args.get_flag("swaps") {
            print!(
                "{}",
                report::format_swaps(model, &alloc, config.suggestion_cutoff)
            );
        }
    }
    Ok(())
}

/// Run the search until interrupted (or the given number of restarts is reached), saving good
/// allocations to the output directory
fn optimize(args: &ArgMatches, config: &Config, survey: &Survey) -> Result<(), Failure> {
    let mut options = SearchOptions::from_config(config);
    options.max_restarts = args.get_one::<usize>("restarts").copied();
    if let Some(threshold) = args.get_one::<Cost>("threshold") {
        options.save_threshold = *threshold;
    }
    if survey.students.len() < options.min_students {
        return Err((
            exitcode::DATAERR,
            format!(
                "Not enough students: {} found, at least {} required.",
                survey.students.len(),
                options.min_students
            ),
        ));
    }

    let out_dir = path_arg(args, "out-dir");
    std::fs::create_dir_all(out_dir).map_err(|e| {
        (
            exitcode::CANTCREAT,
            format!("Could not create {}: {}", out_dir.display(), e),
        )
    })?;

    let seed = args
        .get_one::<u64>("seed")
        .copied()
        .unwrap_or_else(|| rand::rng().random());
    info!("Using random seed {}", seed);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        info!("Interrupted. Finishing the current round.");
        handler_stop.store(true, Ordering::Relaxed);
    })
    .map_err(|e| {
        (
            exitcode::OSERR,
            format!("Could not install interrupt handler: {}", e),
        )
    })?;

    let model = CostModel::new(survey, &config.penalties);
    let mut checkpointer = Checkpointer::new(out_dir.to_owned(), survey);
    let mut checkpoint_failed = false;
    let result = driver::optimize(
        model,
        &options,
        ChaCha8Rng::seed_from_u64(seed),
        &stop,
        |alloc, score| {
            checkpointer.save(alloc, score).map(|_| ()).map_err(|e| {
                checkpoint_failed = true;
                e
            })
        },
    );

    match result {
        Ok(Some((mut alloc, score))) => {
            info!("Best allocation found has score {}", score);
            alloc.note_conflicts(survey);
            print!("{}", report::format_allocation(model, &alloc));
            Ok(())
        }
        Ok(None) => {
            info!("Stopped before the first allocation was complete.");
            Ok(())
        }
        Err(e) if checkpoint_failed => Err((exitcode::CANTCREAT, e)),
        Err(e) => Err((exitcode::SOFTWARE, e)),
    }
}
