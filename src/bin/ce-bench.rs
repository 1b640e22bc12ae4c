use ce_bench::logging::{init_logging, parse_level};
use ce_bench::provider::classify_sources;
use ce_bench::report::{load_json, write_report, ReportOptions, SvgChart};
use ce_bench::{dedup, BenchConfig};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use tracing::Level;

/// Cardinality estimation benchmark CLI
///
/// - report: build the Markdown report from a collected JSON dump
/// - split: split and classify SQL files without executing them

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() {
    let matches = create_cli().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .and_then(|raw| parse_level(raw))
        .unwrap_or(Level::INFO);
    init_logging(level, matches.get_flag("log-json"));

    if let Err(e) = run_command(matches) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn create_cli() -> Command {
    Command::new("ce-bench")
        .about("Cardinality estimation benchmark")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("log-level")
                .help("Log level (trace, debug, info, warn, error)")
                .long("log-level")
                .global(true)
                .default_value("info"),
        )
        .arg(
            Arg::new("log-json")
                .help("Emit logs as JSON")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .help("JSON configuration file")
                .long("config")
                .global(true),
        )
        .subcommand(
            Command::new("report")
                .about("Write the report for a collected JSON dump")
                .arg(Arg::new("input")
                    .help("JSON dump mapping estimator type to records")
                    .required(true)
                    .index(1))
                .arg(Arg::new("out-dir")
                    .help("Directory receiving report.md, the dump and charts")
                    .long("out-dir")
                    .default_value("report"))
                .arg(Arg::new("worst")
                    .help("Number of worst estimations listed per section")
                    .long("worst"))
                .arg(Arg::new("threshold")
                    .help("List every estimation with |PError| at or above this value")
                    .long("threshold"))
                .arg(Arg::new("no-dedup")
                    .help("Keep duplicate records")
                    .long("no-dedup")
                    .action(ArgAction::SetTrue))
        )
        .subcommand(
            Command::new("split")
                .about("Split SQL files into statements and count them per kind")
                .arg(Arg::new("files")
                    .help("SQL files")
                    .required(true)
                    .num_args(1..)
                    .index(1))
                .arg(Arg::new("format")
                    .help("Output format")
                    .long("format")
                    .value_parser(["text", "json"])
                    .default_value("text"))
        )
}

fn run_command(matches: ArgMatches) -> CliResult<()> {
    let config = match matches.get_one::<String>("config") {
        Some(path) => BenchConfig::from_file(path)?,
        None => BenchConfig::default(),
    };

    match matches.subcommand() {
        Some(("report", sub)) => run_report(sub, &config),
        Some(("split", sub)) => run_split(sub),
        _ => Err("Unknown command".into()),
    }
}

fn run_report(matches: &ArgMatches, config: &BenchConfig) -> CliResult<()> {
    let input = matches
        .get_one::<String>("input")
        .ok_or("input argument is required")?;
    let out_dir = PathBuf::from(
        matches
            .get_one::<String>("out-dir")
            .ok_or("out-dir argument is required")?,
    );

    let worst_k = match matches.get_one::<String>("worst") {
        Some(raw) => raw.parse().map_err(|_| "worst must be a positive number")?,
        None => config.worst_k,
    };
    let p_error_threshold = match matches.get_one::<String>("threshold") {
        Some(raw) => raw.parse().map_err(|_| "threshold must be a number")?,
        None => config.p_error_threshold,
    };

    let mut records = load_json(input)?;
    if config.dedup && !matches.get_flag("no-dedup") {
        records = dedup(records);
    }

    let files = write_report(
        &records,
        &out_dir,
        ReportOptions {
            worst_k,
            p_error_threshold,
        },
        &SvgChart::default(),
    )?;

    println!("Report:  {}", files.report.display());
    println!("Dump:    {}", files.dump.display());
    println!("Charts:  {}", files.charts.len());
    println!("Records: {}", records.len());
    Ok(())
}

fn run_split(matches: &ArgMatches) -> CliResult<()> {
    let files: Vec<&String> = matches
        .get_many::<String>("files")
        .ok_or("files argument is required")?
        .collect();

    let mut sources = Vec::with_capacity(files.len());
    for file in &files {
        sources.push(fs::read_to_string(file)?);
    }
    let counts = classify_sources(&sources);

    let json = matches
        .get_one::<String>("format")
        .is_some_and(|format| format == "json");
    if json {
        let by_name: serde_json::Map<String, serde_json::Value> = counts
            .iter()
            .map(|(kind, count)| (kind.as_str().to_string(), (*count).into()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&by_name)?);
    } else {
        println!("Files: {}", files.len());
        for (kind, count) in &counts {
            println!("  {:<14} {}", kind.as_str(), count);
        }
        println!("  {:<14} {}", "total", counts.values().sum::<u64>());
    }
    Ok(())
}
