use anyhow::{Context, Result, bail, format_err};
use clap::{Arg, ArgAction, ArgMatches, Command};
use dialoguer::Confirm;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use trace_correlator::{
    Guid, MANIFEST_EVENT_ID, PipelineSettings, TracePipeline, TraceRecordReader, session_reports,
};

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

struct TraceReplay {
    settings: PipelineSettings,
    input: PathBuf,
    output_target: Option<PathBuf>,
    confirm_overwrite: bool,
    indent: bool,
    show_stats: bool,
    verbosity_level: Option<LevelFilter>,
}

impl TraceReplay {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .ok_or_else(|| format_err!("INPUT is a required argument"))?,
        );

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            3 => Some(LevelFilter::Trace),
            _ => {
                eprintln!("using more than  -vvv does not affect verbosity level");
                Some(LevelFilter::Trace)
            }
        };

        let manifest_event_id = matches
            .get_one::<u16>("manifest-event-id")
            .copied()
            .unwrap_or(MANIFEST_EVENT_ID);

        let settings = PipelineSettings::new()
            .application_provider(matches.get_one::<Guid>("provider").copied())
            .manifest_event_id(manifest_event_id)
            .resolve_messages(!matches.get_flag("no-messages"));

        Ok(TraceReplay {
            settings,
            input,
            output_target: matches.get_one::<String>("output-target").map(PathBuf::from),
            confirm_overwrite: !matches.get_flag("no-confirm-overwrite"),
            indent: !matches.get_flag("no-indent"),
            show_stats: matches.get_flag("stats"),
            verbosity_level,
        })
    }

    /// Main entry point for `TraceReplay`
    pub fn run(&self) -> Result<()> {
        self.try_to_initialize_logging();

        if self.input.is_dir() {
            bail!(
                "There is a directory at {}, refusing to read it as a capture",
                self.input.display()
            );
        }

        // Fail on a bad output target before replaying anything.
        let output: Box<dyn Write> = match &self.output_target {
            Some(path) => Box::new(BufWriter::new(
                Self::create_output_file(path, self.confirm_overwrite).with_context(|| {
                    format!("failed to create output file at `{}`", path.display())
                })?,
            )),
            None => Box::new(BufWriter::new(io::stdout())),
        };

        let input: Box<dyn BufRead> = if self.input.as_os_str() == "-" {
            Box::new(BufReader::new(io::stdin()))
        } else {
            Box::new(BufReader::new(File::open(&self.input).with_context(|| {
                format!("failed to open capture `{}`", self.input.display())
            })?))
        };

        let mut pipeline = TracePipeline::new().with_configuration(self.settings.clone());
        let stats = pipeline.run(TraceRecordReader::new(input));

        self.write_report(output, &pipeline)?;

        if self.show_stats {
            eprintln!("{}", serde_json::to_string(&stats)?);
        }

        Ok(())
    }

    fn write_report(&self, mut output: Box<dyn Write>, pipeline: &TracePipeline) -> Result<()> {
        let reports = session_reports(pipeline.engine());

        if self.indent {
            serde_json::to_writer_pretty(&mut output, &reports)?;
        } else {
            serde_json::to_writer(&mut output, &reports)?;
        }
        writeln!(output)?;
        output.flush()?;

        Ok(())
    }

    /// If `prompt` is passed, will display a confirmation prompt before overwriting files.
    fn create_output_file(path: impl AsRef<Path>, prompt: bool) -> Result<File> {
        let p = path.as_ref();

        if p.is_dir() {
            bail!(
                "There is a directory at {}, refusing to overwrite",
                p.display()
            );
        }

        if p.exists() && prompt {
            let confirmed = Confirm::new()
                .with_prompt(format!(
                    "Are you sure you want to override output file at {}",
                    p.display()
                ))
                .default(false)
                .interact()
                .context("Failed to write confirmation prompt to term")?;

            if !confirmed {
                bail!("Cancelled");
            }
        }

        match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                fs::create_dir_all(parent)?;
            }
            Some(_) => {}
            None => bail!("Output file cannot be root."),
        }

        Ok(File::create(p)?)
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {}", e);
            }
        }
    }
}

fn main() {
    let matches = Command::new("trace_replay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Replays a captured trace and reports the reconstructed import timeline")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .help("JSON lines capture, one record per line. Pass `-` to read from stdin."),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .action(ArgAction::Set)
                .help("Writes the report to the file specified instead of stdout, errors will still be printed to stderr. \
                       Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`. \
                       Will create parent directories if needed."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("provider")
                .long("provider")
                .short('p')
                .value_parser(|s: &str| s.parse::<Guid>())
                .help("Only process records of this provider (the application's own provider)."),
        )
        .arg(
            Arg::new("manifest-event-id")
                .long("manifest-event-id")
                .value_parser(clap::value_parser!(u16))
                .default_value("65534")
                .help("Event id carrying the inline manifest."),
        )
        .arg(
            Arg::new("no-messages")
                .long("no-messages")
                .action(ArgAction::SetTrue)
                .help("When set, localized messages are not resolved."),
        )
        .arg(
            Arg::new("no-indent")
                .long("no-indent")
                .action(ArgAction::SetTrue)
                .help("When set, output will not be indented."),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("Print record counters as JSON to stderr once the capture is replayed."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace. Resolved messages are logged at info."),
        )
        .get_matches();

    let result = TraceReplay::from_cli_matches(&matches).and_then(|app| app.run());

    if let Err(e) = result {
        eprintln!("{:#}", e);
        exit(1)
    }
}
