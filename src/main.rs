use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;
use anyhow::Context;
use clap::{Parser, ValueEnum, ColorChoice, ArgAction, CommandFactory};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};
use is_terminal::IsTerminal;
mod error;
mod xml_tree;
mod record;
mod extract;
mod dates;
mod normalizer;
mod report;
mod markdown;

use crate::dates::{DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR, YearRange};
use crate::error::IngestError;
use crate::normalizer::{Normalizer, NormalizerConfig, field_mapping};
use crate::record::IncidentRecord;
use crate::report::{DEFAULT_SAMPLE_COUNT, DEFAULT_TOP, GroupField, ReportSummary};
use crate::xml_tree::decode_document;

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

const DEFAULT_CONFIG_FILE: &str = "IncidentReport.toml";
const CONFIG_ENV: &str = "INCIDENT_REPORT_CONFIG";
const DEFAULT_DESC_WIDTH: usize = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "incident-report",
    about = "Summarize incident XML exports",
    long_about = "Reads an incident export (clean <incidencies> XML or a spreadsheet XML export), normalizes it, drops records with implausible dates and prints a sample listing with frequency statistics.",
    after_long_help = "Examples:\n  incident-report incidencies.xml\n  incident-report export.xml --text-format table --top 5\n  incident-report incidencies.xml --group-by team,room --min-year 2020\n  cat export.xml | incident-report - --output json\n  incident-report incidencies.xml --csv-path incidents.csv --md-path report.md",
    color = ColorChoice::Auto
)]
struct Args {
    /// XML export to read, or `-` for stdin
    #[arg(required_unless_present = "completions")]
    input: Option<String>,
    /// Number of incidents shown in the sample listing
    #[arg(long, short = 'n', default_value_t = DEFAULT_SAMPLE_COUNT)]
    sample_count: usize,
    /// Entries printed per statistics table
    #[arg(long, default_value_t = DEFAULT_TOP)]
    top: usize,
    #[arg(long, default_value_t = DEFAULT_MIN_YEAR)]
    min_year: i32,
    #[arg(long, default_value_t = DEFAULT_MAX_YEAR)]
    max_year: i32,
    /// Fields to build frequency tables for (default team,type,priority,room)
    #[arg(long, num_args = 0.., value_delimiter = ',', value_enum)]
    group_by: Vec<GroupField>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    #[arg(long, value_enum, default_value = "lines")]
    text_format: TextFormat,
    #[arg(long)]
    desc_width: Option<usize>,
    #[arg(long, default_value_t = false)]
    no_truncate: bool,
    #[arg(long, default_value_t = false)]
    summary_only: bool,
    #[arg(long, default_value_t = false)]
    no_header: bool,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    #[arg(long)]
    csv_path: Option<String>,
    #[arg(long)]
    md_path: Option<String>,
    /// TOML config (default $INCIDENT_REPORT_CONFIG, then ./IncidentReport.toml)
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            input: None,
            sample_count: DEFAULT_SAMPLE_COUNT,
            top: DEFAULT_TOP,
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            group_by: vec![],
            output: OutputFmt::Text,
            text_format: TextFormat::Lines,
            desc_width: None,
            no_truncate: false,
            summary_only: false,
            no_header: false,
            no_color: false,
            force_color: false,
            json_path: None,
            csv_path: None,
            md_path: None,
            config: None,
            log_level: None,
            log_format: None,
            log_path: None,
            verbose: 0,
            quiet: false,
            completions: None,
            completions_out: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AppConfig {
    output: Option<OutputFmt>,
    text_format: Option<TextFormat>,
    sample_count: Option<usize>,
    top: Option<usize>,
    min_year: Option<i32>,
    max_year: Option<i32>,
    group_by: Option<Vec<GroupField>>,
    desc_width: Option<usize>,
    no_truncate: Option<bool>,
    summary_only: Option<bool>,
    force_color: Option<bool>,
    json_path: Option<String>,
    csv_path: Option<String>,
    md_path: Option<String>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    normalizer: Option<NormalizerSection>,
}

/// `[normalizer]` table: tag names for both document layouts.
#[derive(Debug, Default, Deserialize)]
struct NormalizerSection {
    container_tag: Option<String>,
    incident_tag: Option<String>,
    id_attribute: Option<String>,
    field_tags: Option<Vec<String>>,
    row_tag: Option<String>,
    cell_tag: Option<String>,
    header_keywords: Option<Vec<String>>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "incident-report", &mut f); } else { clap_complete::generate(sh, &mut cmd, "incident-report", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "incident-report", &mut std::io::stdout());
        }
        return;
    }
    let file_cfg = load_config(args.config.as_deref());
    if let Ok(Some(cfg)) = file_cfg.as_ref() { apply_config(&mut args, cfg); }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);
    let result = file_cfg.and_then(|cfg| run(&args, cfg.as_ref().and_then(|c| c.normalizer.as_ref())));
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("{} {:#}", paint("Error:", "1;31"), e);
        std::process::exit(exit_code(&e));
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(e) => {
                eprintln!("Failed to open log file {}: {}", path, e);
            }
        }
    }
    builder.init();
}

/// Explicit `--config` must load; the env and default locations are optional.
fn load_config(explicit: Option<&str>) -> anyhow::Result<Option<AppConfig>> {
    let (path, required) = match explicit {
        Some(p) => (PathBuf::from(p), true),
        None => match std::env::var(CONFIG_ENV) {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        },
    };
    if !path.exists() {
        if required { return Err(IngestError::NotFound { path }.into()); }
        return Ok(None);
    }
    let s = std::fs::read_to_string(&path).with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| IngestError::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(cfg))
}

fn apply_config(args: &mut Args, cfg: &AppConfig) {
    if args.output == OutputFmt::Text && let Some(v) = cfg.output { args.output = v; }
    if args.text_format == TextFormat::Lines && let Some(v) = cfg.text_format { args.text_format = v; }
    if args.sample_count == DEFAULT_SAMPLE_COUNT && let Some(v) = cfg.sample_count { args.sample_count = v; }
    if args.top == DEFAULT_TOP && let Some(v) = cfg.top { args.top = v; }
    if args.min_year == DEFAULT_MIN_YEAR && let Some(v) = cfg.min_year { args.min_year = v; }
    if args.max_year == DEFAULT_MAX_YEAR && let Some(v) = cfg.max_year { args.max_year = v; }
    if args.group_by.is_empty() && let Some(v) = cfg.group_by.as_ref() { args.group_by = v.clone(); }
    if args.desc_width.is_none() && let Some(v) = cfg.desc_width { args.desc_width = Some(v); }
    if let Some(v) = cfg.no_truncate { args.no_truncate = args.no_truncate || v; }
    if let Some(v) = cfg.summary_only { args.summary_only = args.summary_only || v; }
    if let Some(v) = cfg.force_color { args.force_color = args.force_color || v; }
    if args.json_path.is_none() && let Some(v) = cfg.json_path.as_ref() { args.json_path = Some(v.clone()); }
    if args.csv_path.is_none() && let Some(v) = cfg.csv_path.as_ref() { args.csv_path = Some(v.clone()); }
    if args.md_path.is_none() && let Some(v) = cfg.md_path.as_ref() { args.md_path = Some(v.clone()); }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path.as_ref() { args.log_path = Some(v.clone()); }
}

fn normalizer_config(args: &Args, section: Option<&NormalizerSection>) -> Result<NormalizerConfig, IngestError> {
    let mut cfg = NormalizerConfig { years: YearRange { min: args.min_year, max: args.max_year }, ..Default::default() };
    if let Some(sec) = section {
        if let Some(v) = sec.container_tag.as_ref() { cfg.container_tag = v.clone(); }
        if let Some(v) = sec.incident_tag.as_ref() { cfg.incident_tag = v.clone(); }
        if let Some(v) = sec.id_attribute.as_ref() { cfg.id_attribute = v.clone(); }
        if let Some(v) = sec.row_tag.as_ref() { cfg.row_tag = v.clone(); }
        if let Some(v) = sec.cell_tag.as_ref() { cfg.cell_tag = v.clone(); }
        if let Some(v) = sec.header_keywords.as_ref() { cfg.header_keywords = v.clone(); }
        if let Some(v) = sec.field_tags.as_ref() { cfg = cfg.with_field_tags(v.clone())?; }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn read_input(input: &str) -> Result<String, IngestError> {
    if input == "-" {
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes).map_err(|source| IngestError::Io { path: PathBuf::from("<stdin>"), source })?;
        return decode_document(&bytes);
    }
    let p = PathBuf::from(input);
    if !p.exists() { return Err(IngestError::NotFound { path: p }); }
    match std::fs::read(&p) {
        Ok(bytes) => decode_document(&bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IngestError::NotFound { path: p }),
        Err(source) => Err(IngestError::Io { path: p, source }),
    }
}

fn run(args: &Args, section: Option<&NormalizerSection>) -> anyhow::Result<()> {
    let input = args.input.as_deref().context("no input file given")?;
    let config = normalizer_config(args, section)?;
    log::debug!("Field mapping: {:?}", field_mapping(&config));
    let xml = read_input(input)?;
    let normalized = Normalizer::new(config).normalize_str(&xml)?;
    let fields: Vec<GroupField> = if args.group_by.is_empty() { GroupField::DEFAULT.to_vec() } else { args.group_by.clone() };
    let summary = crate::report::build_summary(input, &normalized, args.sample_count, &fields, args.top);
    let records = &normalized.records;
    if records.is_empty() {
        log::warn!("No incident in {} survived the {}..={} year filter", input, args.min_year, args.max_year);
    }
    match args.output {
        OutputFmt::Text if records.is_empty() => print!("{}", crate::report::render_empty(normalized.scanned, args.no_header)),
        OutputFmt::Text => print_text(args, &summary, records, &fields),
        OutputFmt::Json => {
            let body = serde_json::to_string_pretty(&summary)?;
            if let Some(p) = args.json_path.as_ref() {
                std::fs::write(p, body).with_context(|| format!("JSON write failed for {}", p))?;
                if !args.quiet { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); }
            } else { println!("{}", body); }
        }
    }
    if records.is_empty() { return Ok(()); }
    if let Some(p) = args.csv_path.as_ref() {
        write_csv(p, records).with_context(|| format!("CSV write failed for {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("CSV written: {}", p), "1;36")); }
    }
    if let Some(p) = args.md_path.as_ref() {
        let md = crate::markdown::render_markdown(&summary);
        std::fs::write(p, md).with_context(|| format!("Markdown write failed for {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("Markdown written: {}", p), "1;36")); }
    }
    Ok(())
}

fn print_text(args: &Args, rep: &ReportSummary, records: &[IncidentRecord], fields: &[GroupField]) {
    if !args.no_header {
        println!("{}", paint(&format!("Source: {} ({} layout)", rep.source, rep.shape), "1;36"));
        if rep.dropped > 0 { println!("{}", paint(&format!("Skipped {} of {} incidents with an implausible date.", rep.dropped, rep.scanned), "2")); }
    }
    match args.text_format {
        TextFormat::Lines => {
            if !args.summary_only { print!("{}", crate::report::render_sample(records, args.sample_count, args.no_header)); }
            print!("{}", crate::report::render_stats(records, fields, args.top, args.no_header));
        }
        TextFormat::Table => {
            let width = if args.no_truncate { None } else { Some(args.desc_width.unwrap_or(DEFAULT_DESC_WIDTH)) };
            if !args.summary_only { println!("{}", crate::report::render_sample_table(records, args.sample_count, width)); }
            print!("{}", crate::report::render_stats_table(records, fields, args.top));
        }
    }
}

fn write_csv(path: &str, records: &[IncidentRecord]) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in records { wtr.serialize(r)?; }
    wtr.flush()?;
    Ok(())
}

fn exit_code(e: &anyhow::Error) -> i32 {
    e.downcast_ref::<IngestError>().map(IngestError::exit_code).unwrap_or(1)
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&false) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}
