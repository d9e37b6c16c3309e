//! witr: explains why a process is running
//!
//! Usage:
//!   witr --pid 1234          # Explain a specific PID
//!   witr --port 5000         # Explain whatever listens on port 5000
//!   witr --file /var/lib/x   # Explain whoever holds a file open
//!   witr nginx               # Explain the process or service named nginx
//!
//! Output formats:
//!   --json       Machine-readable JSON
//!   --short      Single-line summary
//!   --tree       Ancestry tree
//!   --warnings   Warnings only
//!   --env        Command line and environment only
//!   (default)    Human-readable narrative

use clap::{Parser, ValueEnum};
use owo_colors::{OwoColorize, Style};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use tabled::{
    settings::{object::Columns, style::Style as TableStyle, Alignment, Modify},
    Table, Tabled,
};
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use witr_core::{
    render, AnalysisConfig, Candidate, Confidence, ProcessRecord, Query, Report, WitrError,
};
use witr_platform_linux::ProbeConfig;

/// Label width for aligned output
const LABEL_WIDTH: usize = 12;

/// Command lines longer than this are cut in the narrative view
const MAX_COMMAND_WIDTH: usize = 80;

/// Exit codes for scripting
mod exit_codes {
    pub const ERROR_GENERAL: i32 = 1;
    pub const ERROR_INVALID_INPUT: i32 = 2;
    pub const ERROR_NOT_FOUND: i32 = 3;
    pub const ERROR_ACCESS_DENIED: i32 = 4;
    pub const ERROR_AMBIGUOUS: i32 = 5;
}

/// Configuration file support
mod config {
    use serde::Deserialize;
    use std::fs;
    use std::path::PathBuf;

    /// User configuration from ~/.witr/config.toml
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Config {
        pub output: OutputConfig,
        pub analysis: AnalysisSection,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct OutputConfig {
        pub no_color: bool,
        pub json: bool,
        pub short: bool,
        pub tree: bool,
    }

    /// Overrides for the analysis knobs; unset keys keep built-in defaults
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct AnalysisSection {
        pub exact: bool,
        pub confidence_threshold: Option<f32>,
        pub max_depth: Option<usize>,
        pub probe_timeout_secs: Option<u64>,
        pub excluded_helpers: Option<Vec<String>>,
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".witr").join("config.toml"))
    }

    /// Load the config file; a missing file is the default config
    pub fn load_config() -> Result<Config, String> {
        let Some(path) = config_path() else {
            return Ok(Config::default());
        };
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        parse(&content).map_err(|e| format!("invalid {}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn sample_config() -> &'static str {
        r#"# witr configuration file
# Place this file at ~/.witr/config.toml

[output]
# Disable colored output
no_color = false
# Use JSON output by default
json = false
# Use short (one-line) output by default
short = false
# Use tree view by default
tree = false

[analysis]
# Match process names exactly instead of by substring
exact = false
# Classifications scoring below this are reported as uncertain (0.0 - 1.0)
confidence_threshold = 0.5
# Maximum number of ancestors to walk
max_depth = 64
# Seconds to wait for ss, lsof and systemctl
probe_timeout_secs = 3
# Command names never reported as name matches
excluded_helpers = ["lsof", "ss", "netstat", "systemctl", "fuser"]
"#
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Effective filter; `-v` raises anything quieter than debug to debug
    fn filter(self, verbose: bool) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            _ if verbose => LevelFilter::DEBUG,
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
        }
    }
}

#[derive(Parser)]
#[command(name = "witr")]
#[command(version, about = "Explain why a process is running", long_about = None)]
#[command(after_help = "Examples:
  witr --pid 1234              Explain process 1234
  witr --port 8080             What is listening on port 8080, and why?
  witr --file /var/lib/dpkg/lock
                               Who holds this file open?
  witr nginx                   Find the nginx service or process
  witr -x sh                   Match the command name exactly
  witr --pid 1234 --json       Output as JSON for scripting
  witr --port 80 --tree        Show the ancestry tree of the port owner")]
struct Cli {
    /// Process ID to explain
    #[arg(long, short = 'p', value_name = "PID")]
    pid: Option<String>,

    /// TCP port whose listener to explain
    #[arg(long, short = 'P', value_name = "PORT")]
    port: Option<String>,

    /// File whose holder to explain
    #[arg(long, short = 'f', value_name = "PATH")]
    file: Option<String>,

    /// Process or service name (substring match unless --exact)
    #[arg(value_name = "NAME")]
    name: Option<String>,

    /// Match NAME exactly
    #[arg(long, short = 'x')]
    exact: bool,

    /// Output as JSON
    #[arg(long, short = 'j', conflicts_with_all = ["short", "tree"])]
    json: bool,

    /// Output a single-line summary
    #[arg(long, short = 's', conflicts_with_all = ["json", "tree", "warnings", "env"])]
    short: bool,

    /// Show the ancestry tree
    #[arg(long, short = 't', conflicts_with_all = ["json", "short", "warnings", "env"])]
    tree: bool,

    /// Show only warnings
    #[arg(long, short = 'w', conflicts_with = "env")]
    warnings: bool,

    /// Show only the command line and environment
    #[arg(long, short = 'e')]
    env: bool,

    /// Include direct children of the process
    #[arg(long, short = 'c')]
    children: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Verbose diagnostics on stderr
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Diagnostic log level
    #[arg(long, value_enum, default_value_t = LogLevel::Warn, value_name = "LEVEL")]
    log_level: LogLevel,

    /// Write a sample config file to ~/.witr/config.toml
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn has_format_flag(&self) -> bool {
        self.json || self.short || self.tree || self.warnings || self.env
    }

    /// Apply config-file defaults; flags given on the command line win
    fn apply_config(&mut self, cfg: &config::Config) {
        if cfg.output.no_color {
            self.no_color = true;
        }
        if !self.has_format_flag() {
            self.json = cfg.output.json;
            self.short = !self.json && cfg.output.short;
            self.tree = !self.json && !self.short && cfg.output.tree;
        }
        if cfg.analysis.exact {
            self.exact = true;
        }
    }

    /// The single target given, or a usage message
    fn query(&self) -> Result<Query, &'static str> {
        let mut targets = [
            self.pid.as_deref().map(Query::pid),
            self.port.as_deref().map(Query::port),
            self.file.as_deref().map(Query::file),
            self.name.as_deref().map(Query::name),
        ]
        .into_iter()
        .flatten();

        match (targets.next(), targets.next()) {
            (None, _) => Err("No target specified"),
            (Some(_), Some(_)) => Err("Only one target can be specified at a time"),
            (Some(query), None) => Ok(query.with_exact(self.exact)),
        }
    }
}

/// Color configuration for output
struct Colors {
    enabled: bool,
    header: Style,
    success: Style,
    warning: Style,
    error: Style,
    info: Style,
    dim: Style,
    highlight: Style,
}

impl Colors {
    fn new(enabled: bool) -> Self {
        if enabled {
            Self {
                enabled: true,
                header: Style::new().bold().cyan(),
                success: Style::new().green(),
                warning: Style::new().yellow(),
                error: Style::new().red().bold(),
                info: Style::new().cyan(),
                dim: Style::new().dimmed(),
                highlight: Style::new().bold().white(),
            }
        } else {
            Self {
                enabled: false,
                header: Style::new(),
                success: Style::new(),
                warning: Style::new(),
                error: Style::new(),
                info: Style::new(),
                dim: Style::new(),
                highlight: Style::new(),
            }
        }
    }
}

fn main() {
    let mut cli = Cli::parse();
    setup_logging(&cli);

    let cfg = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("ignoring config file: {}", e);
            config::Config::default()
        }
    };
    cli.apply_config(&cfg);

    let colors = Colors::new(!cli.no_color && supports_color());

    if cli.init_config {
        handle_init_config(&colors);
        return;
    }

    let query = match cli.query() {
        Ok(query) => query,
        Err(message) => {
            print_error(&colors, message);
            print_usage();
            std::process::exit(exit_codes::ERROR_INVALID_INPUT);
        }
    };

    let analysis = analysis_config(&cfg.analysis);
    let probe_config = probe_config(&cfg.analysis);
    debug!(%query, threshold = analysis.confidence_threshold, max_depth = analysis.max_depth, "starting analysis");

    if let Err(e) = run(&cli, &query, &analysis, probe_config, &colors) {
        let code = report_error(&cli, &colors, &e);
        std::process::exit(code);
    }
}

/// Install the stderr log subscriber
fn setup_logging(cli: &Cli) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.log_level.filter(cli.verbose))
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {}", e);
    }
}

fn analysis_config(section: &config::AnalysisSection) -> AnalysisConfig {
    let mut analysis = AnalysisConfig::for_current_process();
    if let Some(threshold) = section.confidence_threshold {
        analysis = analysis.with_confidence_threshold(threshold);
    }
    if let Some(depth) = section.max_depth {
        analysis = analysis.with_max_depth(depth);
    }
    if let Some(helpers) = &section.excluded_helpers {
        analysis.excluded_helpers = helpers.iter().map(|h| h.to_lowercase()).collect();
    }
    analysis
}

fn probe_config(section: &config::AnalysisSection) -> ProbeConfig {
    match section.probe_timeout_secs {
        Some(secs) if secs > 0 => ProbeConfig::default().with_timeout(Duration::from_secs(secs)),
        _ => ProbeConfig::default(),
    }
}

fn print_usage() {
    eprintln!();
    eprintln!("Usage: witr [OPTIONS] [NAME]");
    eprintln!();
    eprintln!("Specify one of:");
    eprintln!("  --pid <PID>     Explain a process by PID (short: -p)");
    eprintln!("  --port <PORT>   Explain the listener on a TCP port (short: -P)");
    eprintln!("  --file <PATH>   Explain the holder of an open file (short: -f)");
    eprintln!("  <NAME>          Explain a process or service by name");
    eprintln!();
    eprintln!("Run 'witr --help' for more information.");
}

/// Handle --init-config flag
fn handle_init_config(colors: &Colors) {
    use std::fs;

    let Some(config_path) = config::config_path() else {
        print_error(colors, "Could not determine home directory");
        std::process::exit(exit_codes::ERROR_GENERAL);
    };

    if config_path.exists() {
        eprintln!(
            "{} Config file already exists at: {}",
            "warning:".style(colors.warning),
            config_path.display()
        );
        eprintln!("Edit it, or delete it first to regenerate.");
        return;
    }

    if let Some(parent) = config_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            print_error(colors, &format!("Failed to create config directory: {}", e));
            std::process::exit(exit_codes::ERROR_GENERAL);
        }
    }

    match fs::write(&config_path, config::sample_config()) {
        Ok(()) => eprintln!(
            "{} Created config file at: {}",
            "success:".style(colors.success),
            config_path.display()
        ),
        Err(e) => {
            print_error(colors, &format!("Failed to write config file: {}", e));
            std::process::exit(exit_codes::ERROR_GENERAL);
        }
    }
}

#[cfg(target_os = "linux")]
fn run(
    cli: &Cli,
    query: &Query,
    analysis: &AnalysisConfig,
    probe_config: ProbeConfig,
    colors: &Colors,
) -> Result<(), WitrError> {
    use witr_core::Analyzer;
    use witr_platform_linux::LinuxProbe;

    let probe = LinuxProbe::new(probe_config);
    let analyzer = Analyzer::new(&probe, analysis);
    let mut report = analyzer.analyze(query)?;

    if cli.children {
        match analyzer.children(report.resolved_pid) {
            Ok(children) => report.children = children,
            Err(e) => warn!(pid = report.resolved_pid, error = %e, "cannot list children"),
        }
    }

    render_report(&report, cli, colors);
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run(
    _cli: &Cli,
    _query: &Query,
    _analysis: &AnalysisConfig,
    _probe_config: ProbeConfig,
    colors: &Colors,
) -> Result<(), WitrError> {
    print_error(colors, "This tool only works on Linux");
    std::process::exit(exit_codes::ERROR_GENERAL);
}

/// Render a report in the selected view
fn render_report(report: &Report, cli: &Cli, colors: &Colors) {
    if cli.env {
        if cli.json {
            println!("{}", json_or_exit(render::render_env_json(&report.process), colors));
        } else {
            print!("{}", render::render_env(&report.process));
        }
    } else if cli.warnings {
        if cli.json {
            let warnings = serde_json::to_string_pretty(&report.warnings);
            println!("{}", json_or_exit(warnings, colors));
        } else {
            print!("{}", render::render_warnings(report).style(colors.warning));
        }
    } else if cli.json {
        println!("{}", json_or_exit(render::render_json_string(report), colors));
    } else if cli.short {
        println!("{}", render::render_short(report));
    } else if cli.tree {
        if colors.enabled {
            print_colored_tree(report, colors);
        } else {
            print!("{}", render::render_tree(report));
        }
    } else if colors.enabled {
        print_colored_report(report, colors);
    } else {
        print!("{}", render::render_human(report));
    }
}

fn json_or_exit(result: serde_json::Result<String>, colors: &Colors) -> String {
    match result {
        Ok(json) => json,
        Err(e) => {
            print_error(colors, &format!("Failed to render JSON: {}", e));
            std::process::exit(exit_codes::ERROR_GENERAL);
        }
    }
}

/// Map an error to its exit code
fn exit_code(err: &WitrError) -> i32 {
    match err {
        WitrError::InvalidInput { .. } => exit_codes::ERROR_INVALID_INPUT,
        WitrError::AmbiguousMatch { .. } => exit_codes::ERROR_AMBIGUOUS,
        _ if err.needs_privileges() => exit_codes::ERROR_ACCESS_DENIED,
        WitrError::NotFound { .. } | WitrError::NoAncestryFound { .. } => {
            exit_codes::ERROR_NOT_FOUND
        }
        WitrError::Probe(e) if e.is_not_found() => exit_codes::ERROR_NOT_FOUND,
        _ => exit_codes::ERROR_GENERAL,
    }
}

/// Print an error with whatever follow-up helps the user retry
fn report_error(cli: &Cli, colors: &Colors, err: &WitrError) -> i32 {
    let code = exit_code(err);

    if cli.json {
        let mut body = serde_json::json!({
            "error": err.to_string(),
            "exit_code": code,
        });
        if let WitrError::AmbiguousMatch { candidates, .. } = err {
            body["candidates"] = serde_json::json!(candidates);
        }
        println!("{}", body);
        return code;
    }

    print_error(colors, &err.to_string());
    if let WitrError::AmbiguousMatch { candidates, .. } = err {
        print_candidates(candidates, colors);
    } else if err.needs_privileges() {
        let args: Vec<String> = std::env::args().skip(1).collect();
        eprintln!(
            "{} Try running with elevated privileges: {}",
            "tip:".style(colors.dim),
            format!("sudo witr {}", args.join(" ")).style(colors.info)
        );
    }
    code
}

#[derive(Tabled)]
struct CandidateRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "PID")]
    pid: u32,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Command")]
    command: String,
}

fn candidate_rows(candidates: &[Candidate]) -> Vec<CandidateRow> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| CandidateRow {
            index: i + 1,
            pid: c.pid,
            name: c.command_name.clone(),
            command: render::truncate(&c.cmdline, MAX_COMMAND_WIDTH),
        })
        .collect()
}

/// Numbered disambiguation table
fn print_candidates(candidates: &[Candidate], colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let rows = candidate_rows(candidates);

    let table = Table::new(&rows)
        .with(TableStyle::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();

    writeln!(out).ok();
    for line in table.lines() {
        writeln!(out, "  {}", line).ok();
    }
    writeln!(
        out,
        "\n{} Re-run with {} to pick one.",
        "tip:".style(colors.dim),
        "--pid <PID>".style(colors.info)
    )
    .ok();
}

/// Print a colored human-readable report
fn print_colored_report(report: &Report, colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let proc = &report.process;

    print_row(
        &mut out,
        "Target",
        &report.target.to_string(),
        colors.header,
        colors.dim,
    );
    let process_value = format!(
        "{} (pid {})",
        proc.name().style(colors.highlight),
        proc.pid.to_string().style(colors.info)
    );
    print_row_raw(&mut out, "Process", process_value, colors.header);

    if let Some(user) = &proc.user {
        let style = if user == "root" { colors.warning } else { colors.info };
        print_row(&mut out, "User", user, colors.header, style);
    }
    if let Some(path) = &proc.exe_path {
        print_row(&mut out, "Executable", path, colors.header, colors.dim);
    }
    if !proc.cmdline.is_empty() {
        print_row(
            &mut out,
            "Command",
            &render::truncate(&proc.cmdline, MAX_COMMAND_WIDTH),
            colors.header,
            colors.dim,
        );
    }
    if let Some(start) = &proc.start_time {
        let started = format!(
            "{} {}",
            format_relative_time(start),
            format!("({})", format_absolute_time(start)).style(colors.dim)
        );
        print_row_raw(&mut out, "Started", started, colors.header);
    }
    if let Some(dir) = &proc.working_dir {
        print_row(&mut out, "Working Dir", dir, colors.header, colors.dim);
    }
    if !proc.listening_ports.is_empty() {
        print_row(
            &mut out,
            "Listening",
            &listening_summary(proc),
            colors.header,
            colors.info,
        );
    }
    let health_style = if proc.health.is_healthy() {
        colors.success
    } else {
        colors.warning
    };
    print_row(
        &mut out,
        "Health",
        &proc.health.to_string(),
        colors.header,
        health_style,
    );

    print_section(&mut out, "Why It Exists", colors.header);
    let arrow = format!(" {} ", "→".style(colors.dim));
    let lineage = report
        .ancestry
        .records
        .iter()
        .map(|r| lineage_label(r, r.pid == report.resolved_pid, colors))
        .collect::<Vec<_>>()
        .join(&arrow);
    print_sub_item_raw(&mut out, lineage);
    if report.restart_count > 0 {
        print_sub_item(
            &mut out,
            &format!("restarted {} time(s)", report.restart_count),
            colors.warning,
        );
    }

    writeln!(out).ok();
    let source = format!(
        "{} {}",
        report.source.kind.style(colors.highlight),
        format!(
            "({}, {} confidence)",
            report.source.label,
            report.source.level()
        )
        .style(colors.dim)
    );
    print_row_raw(&mut out, "Source", source, colors.header);
    print_sub_item(&mut out, &report.source.description, colors.dim);

    if let Some(socket) = &report.socket {
        writeln!(out).ok();
        let style = if socket.is_problematic() {
            colors.warning
        } else {
            colors.success
        };
        let value = format!(
            "{} {}",
            socket.state.style(style),
            format!("{} -> {}", socket.local_addr, socket.remote_addr).style(colors.dim)
        );
        print_row_raw(&mut out, "Socket", value, colors.header);
        if let Some(explanation) = &socket.explanation {
            print_sub_item(&mut out, explanation, colors.dim);
        }
        if let Some(workaround) = &socket.workaround {
            print_sub_item(&mut out, &format!("hint: {}", workaround), colors.info);
        }
    }

    if let Some(files) = &report.file_context {
        writeln!(out).ok();
        let usage = match files.usage_percent() {
            Some(pct) => format!("{} of {} ({:.0}%)", files.open_files, files.file_limit, pct),
            None => files.open_files.to_string(),
        };
        print_row(&mut out, "Open Files", &usage, colors.header, colors.info);
        for lock in &files.locked_files {
            print_sub_item(&mut out, &format!("lock: {}", lock), colors.warning);
        }
    }

    if !report.children.is_empty() {
        print_section(&mut out, "Children", colors.header);
        for child in &report.children {
            print_sub_item_raw(
                &mut out,
                format!(
                    "{} {}",
                    child.command_name.style(colors.info),
                    format!("(PID {})", child.pid).style(colors.dim)
                ),
            );
        }
    }

    if !report.evidence.is_empty() {
        print_section(&mut out, "Evidence", colors.header);
        for ev in &report.evidence {
            let (marker, style) = match ev.confidence {
                Confidence::High => ("●", colors.success),
                Confidence::Medium => ("◐", colors.info),
                Confidence::Low => ("○", colors.dim),
            };
            print_sub_item_raw(
                &mut out,
                format!(
                    "{} {} {}",
                    marker.style(style),
                    ev.fact,
                    format!("(via {})", ev.source).style(colors.dim)
                ),
            );
            if let Some(detail) = &ev.details {
                print_sub_item(&mut out, &format!("  {}", detail), colors.dim);
            }
        }
    }

    if report.has_warnings() {
        print_section(&mut out, "Warnings", colors.header);
        for warning in &report.warnings {
            print_sub_item(&mut out, &format!("⚠ {}", warning), colors.warning);
        }
    }

    writeln!(out).ok();
}

/// Print a colored ancestry tree, oldest ancestor first
fn print_colored_tree(report: &Report, colors: &Colors) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let records = &report.ancestry.records;

    for (i, record) in records.iter().enumerate() {
        let indent = "  ".repeat(i);
        let connector = if i == 0 { "" } else { "└─ " };
        let is_target = record.pid == report.resolved_pid;
        let marker = if is_target { "▶ " } else { "" };
        writeln!(
            out,
            "{}{}{}{}",
            indent,
            connector.style(colors.dim),
            marker.style(colors.success),
            lineage_label(record, is_target, colors)
        )
        .ok();
    }

    let indent = "  ".repeat(records.len());
    for (i, child) in report.children.iter().enumerate() {
        let connector = if i + 1 == report.children.len() {
            "└─ "
        } else {
            "├─ "
        };
        writeln!(
            out,
            "{}{}{} {}",
            indent,
            connector.style(colors.dim),
            child.command_name.style(colors.info),
            format!("(PID {})", child.pid).style(colors.dim)
        )
        .ok();
    }

    writeln!(out).ok();
    writeln!(
        out,
        "{}: {} {}",
        "Source".style(colors.header),
        report.source.kind.style(colors.highlight),
        format!("({} confidence)", report.source.level()).style(colors.dim)
    )
    .ok();
    for warning in &report.warnings {
        writeln!(out, "{}", format!("⚠ {}", warning).style(colors.warning)).ok();
    }
}

fn lineage_label(record: &ProcessRecord, is_target: bool, colors: &Colors) -> String {
    let name_style = if is_target {
        colors.highlight
    } else {
        colors.info
    };
    let name = if record.synthetic {
        "<unreadable>"
    } else {
        record.name()
    };
    format!(
        "{} {}",
        name.style(name_style),
        format!("(PID {})", record.pid).style(colors.dim)
    )
}

/// `80, 443 on 0.0.0.0`
fn listening_summary(proc: &ProcessRecord) -> String {
    let ports: Vec<String> = proc.listening_ports.iter().map(u16::to_string).collect();
    let mut summary = ports.join(", ");
    if !proc.bind_addresses.is_empty() {
        let addrs: Vec<&str> = proc.bind_addresses.iter().map(String::as_str).collect();
        summary.push_str(&format!(" on {}", addrs.join(", ")));
    }
    summary
}

/// Format relative time (e.g., "3 hours ago")
fn format_relative_time(dt: &time::OffsetDateTime) -> String {
    let elapsed = time::OffsetDateTime::now_utc() - *dt;
    let (count, unit) = if elapsed.whole_days() > 0 {
        (elapsed.whole_days(), "day")
    } else if elapsed.whole_hours() > 0 {
        (elapsed.whole_hours(), "hour")
    } else if elapsed.whole_minutes() > 0 {
        (elapsed.whole_minutes(), "minute")
    } else {
        (elapsed.whole_seconds().max(0), "second")
    };
    format!("{} {}{} ago", count, unit, if count == 1 { "" } else { "s" })
}

fn format_absolute_time(dt: &time::OffsetDateTime) -> String {
    dt.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| dt.to_string())
}

/// Print an aligned label with value
fn print_row(
    out: &mut impl Write,
    label: &str,
    value: &str,
    label_style: Style,
    value_style: Style,
) {
    print_row_raw(out, label, value.style(value_style).to_string(), label_style);
}

/// Print an aligned label with an already styled value
fn print_row_raw(out: &mut impl Write, label: &str, value: String, label_style: Style) {
    writeln!(
        out,
        "{} : {}",
        format!("{:>width$}", label, width = LABEL_WIDTH).style(label_style),
        value
    )
    .ok();
}

/// Print an aligned section header
fn print_section(out: &mut impl Write, label: &str, label_style: Style) {
    writeln!(out).ok();
    writeln!(
        out,
        "{} :",
        format!("{:>width$}", label, width = LABEL_WIDTH).style(label_style)
    )
    .ok();
}

/// Print a sub-item under the previous label
fn print_sub_item(out: &mut impl Write, value: &str, value_style: Style) {
    print_sub_item_raw(out, value.style(value_style).to_string());
}

fn print_sub_item_raw(out: &mut impl Write, value: String) {
    writeln!(out, "{:>width$}   {}", "", value, width = LABEL_WIDTH).ok();
}

/// Print an error message
fn print_error(colors: &Colors, message: &str) {
    eprintln!("{} {}", "error:".style(colors.error), message);
}

/// Check if the terminal supports color
fn supports_color() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var("TERM").is_ok_and(|term| term == "dumb") {
        return false;
    }
    io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use witr_core::{ProbeError, TargetKind};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("witr").chain(args.iter().copied()))
            .expect("Should parse arguments")
    }

    #[rstest]
    #[case(&["--pid", "42"], TargetKind::Pid, "42")]
    #[case(&["-P", "8080"], TargetKind::Port, "8080")]
    #[case(&["--file", "/tmp/x"], TargetKind::File, "/tmp/x")]
    #[case(&["nginx"], TargetKind::Name, "nginx")]
    fn test_single_target(
        #[case] args: &[&str],
        #[case] kind: TargetKind,
        #[case] value: &str,
    ) {
        let query = parse(args).query().expect("Should build query");
        assert_eq!(query.kind, kind);
        assert_eq!(query.value, value);
        assert!(!query.exact);
    }

    #[test]
    fn test_target_count_enforced() {
        assert!(parse(&[]).query().is_err());
        assert!(parse(&["--pid", "1", "nginx"]).query().is_err());
    }

    #[test]
    fn test_exact_flag_carries_into_query() {
        let query = parse(&["-x", "sh"]).query().unwrap();
        assert!(query.exact);
    }

    #[test]
    fn test_conflicting_views_rejected() {
        let err = Cli::try_parse_from(["witr", "--json", "--short", "nginx"]);
        assert!(err.is_err());
        let err = Cli::try_parse_from(["witr", "--tree", "--env", "nginx"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_verbose_raises_log_level() {
        assert_eq!(LogLevel::Warn.filter(false), LevelFilter::WARN);
        assert_eq!(LogLevel::Warn.filter(true), LevelFilter::DEBUG);
        assert_eq!(LogLevel::Trace.filter(true), LevelFilter::TRACE);
        assert_eq!(LogLevel::Off.filter(false), LevelFilter::OFF);
    }

    #[test]
    fn test_sample_config_parses() {
        let cfg = config::parse(config::sample_config()).expect("Sample should parse");
        assert!(!cfg.output.json);
        assert_eq!(cfg.analysis.max_depth, Some(64));
        assert_eq!(cfg.analysis.probe_timeout_secs, Some(3));
        assert!(cfg
            .analysis
            .excluded_helpers
            .as_ref()
            .is_some_and(|h| h.iter().any(|n| n == "lsof")));
    }

    #[test]
    fn test_config_applies_under_flags() {
        let cfg = config::parse("[output]\ntree = true\nno_color = true\n").unwrap();

        let mut cli = parse(&["nginx"]);
        cli.apply_config(&cfg);
        assert!(cli.tree);
        assert!(cli.no_color);

        let mut cli = parse(&["--json", "nginx"]);
        cli.apply_config(&cfg);
        assert!(cli.json);
        assert!(!cli.tree);
    }

    #[test]
    fn test_analysis_overrides() {
        let cfg = config::parse(
            "[analysis]\nconfidence_threshold = 0.7\nmax_depth = 8\nexcluded_helpers = [\"LSOF\"]\n",
        )
        .unwrap();
        let analysis = analysis_config(&cfg.analysis);
        assert_eq!(analysis.confidence_threshold, 0.7);
        assert_eq!(analysis.max_depth, 8);
        assert_eq!(analysis.excluded_helpers, vec!["lsof".to_string()]);

        assert_eq!(probe_config(&cfg.analysis).timeout, Duration::from_secs(3));
        let cfg = config::parse("[analysis]\nprobe_timeout_secs = 10\n").unwrap();
        assert_eq!(probe_config(&cfg.analysis).timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_exit_codes() {
        let invalid = WitrError::InvalidInput {
            kind: TargetKind::Pid,
            value: "abc".into(),
            reason: "not a number".into(),
        };
        assert_eq!(exit_code(&invalid), exit_codes::ERROR_INVALID_INPUT);

        let missing = WitrError::NotFound {
            query: Query::name("nope"),
        };
        assert_eq!(exit_code(&missing), exit_codes::ERROR_NOT_FOUND);

        let hidden = WitrError::SocketFoundNoOwner { port: 22 };
        assert_eq!(exit_code(&hidden), exit_codes::ERROR_ACCESS_DENIED);

        let denied = WitrError::NoAncestryFound {
            pid: 1,
            cause: Some(ProbeError::AccessDenied { pid: 1 }),
        };
        assert_eq!(exit_code(&denied), exit_codes::ERROR_ACCESS_DENIED);

        let gone = WitrError::NoAncestryFound { pid: 9, cause: None };
        assert_eq!(exit_code(&gone), exit_codes::ERROR_NOT_FOUND);

        let ambiguous = WitrError::AmbiguousMatch {
            query: Query::name("node"),
            candidates: Vec::new(),
        };
        assert_eq!(exit_code(&ambiguous), exit_codes::ERROR_AMBIGUOUS);

        let parse = WitrError::Probe(ProbeError::Parse("bad".into()));
        assert_eq!(exit_code(&parse), exit_codes::ERROR_GENERAL);
    }

    #[test]
    fn test_candidate_rows_numbered_and_cut() {
        let long = format!("node {}", "é".repeat(200));
        let rows = candidate_rows(&[
            Candidate {
                pid: 700,
                command_name: "node".to_string(),
                cmdline: long,
            },
            Candidate {
                pid: 701,
                command_name: "node".to_string(),
                cmdline: "node worker.js".to_string(),
            },
        ]);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[0].command.chars().count(), MAX_COMMAND_WIDTH);
        assert!(rows[0].command.ends_with("..."));
        assert_eq!(rows[1].index, 2);
        assert_eq!(rows[1].command, "node worker.js");
    }
}
