use std::error::Error;
use std::path::PathBuf;

use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use flow_expressions::dates::{format_iso_datetime, Mode, Temporal};
use flow_expressions::{DateStyle, EvaluationContext, Evaluator, EvaluatorConfig, DEFAULT_FUNCTIONS};
use tracing::level_filters::LevelFilter;

/// Evaluate and inspect `@` expression templates.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Evaluator configuration (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More logging on stderr; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template and print the output and errors as JSON
    Eval {
        /// Serialized evaluation context (JSON file)
        #[arg(long)]
        context: Option<PathBuf>,
        /// Percent-encode substituted values
        #[arg(long)]
        url_encode: bool,
        template: String,
    },
    /// List the expressions found in text
    Scan { text: String },
    /// Show the expression and autocomplete context at the end of text
    Complete { text: String },
    /// Parse a date, time or datetime
    Date {
        #[arg(long, value_enum, default_value_t = StyleArg::DayFirst)]
        style: StyleArg,
        #[arg(long, default_value = "UTC")]
        timezone: String,
        #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
        mode: ModeArg,
        text: String,
    },
    /// List the builtin functions
    Functions,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StyleArg {
    DayFirst,
    MonthFirst,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Auto,
    Date,
    Datetime,
    Time,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    if let Err(e) = run(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => EvaluatorConfig::from_path(path)?,
        None => EvaluatorConfig::default(),
    };

    match args.command {
        Command::Eval { context, url_encode, template } => {
            let ctx = match context {
                Some(path) => EvaluationContext::from_json(&std::fs::read_to_string(path)?)?,
                None => EvaluationContext::default(),
            };
            let ctx = config.configure(ctx);
            let outcome = Evaluator::new(&config).evaluate_template(&template, &ctx, url_encode);
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Scan { text } => {
            println!("{}", serde_json::to_string_pretty(&config.scanner().scan(&text))?);
        }
        Command::Complete { text } => {
            let scanner = config.scanner();
            let answer = serde_json::json!({
                "expression": scanner.expression_context(&text),
                "auto_complete": scanner.auto_complete_context(&text),
            });
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Date { style, timezone, mode, text } => {
            let timezone: Tz = timezone.parse().map_err(|_| format!("unknown timezone: {timezone}"))?;
            let style = match style {
                StyleArg::DayFirst => DateStyle::DayFirst,
                StyleArg::MonthFirst => DateStyle::MonthFirst,
            };
            let mode = match mode {
                ModeArg::Auto => Mode::Auto,
                ModeArg::Date => Mode::Date,
                ModeArg::Datetime => Mode::DateTime,
                ModeArg::Time => Mode::Time,
            };
            let ctx = config.configure(EvaluationContext::new(Default::default(), timezone, style));
            let shown = match ctx.date_parser().parse(&text, mode)? {
                Temporal::Date(date) => date.format("%Y-%m-%d").to_string(),
                Temporal::Time(time) => time.format("%H:%M:%S%.f").to_string(),
                Temporal::DateTime(datetime) => format_iso_datetime(&datetime),
            };
            println!("{shown}");
        }
        Command::Functions => {
            println!("{}", serde_json::to_string_pretty(&DEFAULT_FUNCTIONS.build_listing())?);
        }
    }
    Ok(())
}
