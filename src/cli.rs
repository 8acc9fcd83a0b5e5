use crate::decoder::STDIN;
use crate::defaults;
use crate::error::ReportError;
use crate::histogram::Buckets;
use crate::output::STDOUT;
use crate::reporter::ReportKind;
use crate::utils::parse_duration;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Latency Report - aggregate load-generation results into latency reports
#[derive(Parser, Debug, Clone)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Result files encoded as JSON lines or CSV
    #[clap(default_values_t = vec![STDIN.to_string()])]
    pub files: Vec<String>,

    /// Report type to generate (text, json, hist, or legacy hist[buckets])
    #[clap(short = 't', long = "type", default_value = defaults::REPORT_TYPE, help_heading = "Report Options")]
    pub report_type: String,

    /// Write the report at every given interval (e.g. 500ms); 0 reports only at the end
    #[clap(short = 'e', long, default_value = "0", value_parser = parse_every)]
    pub every: Duration,

    /// Output file
    #[clap(short = 'o', long, default_value = STDOUT)]
    pub output: PathBuf,

    /// Histogram buckets, e.g. "[0,1ms,10ms]"
    #[clap(long, alias = "hist", help_heading = "Report Options")]
    pub buckets: Option<String>,

    /// Grow histogram buckets geometrically by this factor (0 keeps them fixed)
    #[clap(long, help_heading = "Report Options")]
    pub growth_factor: Option<u32>,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,

    /// Also write logs to this file
    #[clap(long)]
    pub log_file: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            files: vec![STDIN.to_string()],
            report_type: defaults::REPORT_TYPE.to_string(),
            every: Duration::ZERO,
            output: PathBuf::from(STDOUT),
            buckets: None,
            growth_factor: None,
            verbose: false,
            log_file: None,
        }
    }
}

fn parse_every(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Validated configuration for one report run
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub kind: ReportKind,
    pub buckets: Option<Buckets>,
    /// `Some(0)` forces fixed buckets, `None` uses the kind's default
    pub growth_factor: Option<u32>,
    /// Interval between intermediate reports, `None` for a final report only
    pub every: Option<Duration>,
    pub output: PathBuf,
    pub inputs: Vec<PathBuf>,
}

impl ReportConfig {
    /// Validate command-line arguments into a run configuration.
    ///
    /// Fails on an unknown or deprecated report type, malformed buckets or a
    /// growth factor of 1, before any input is opened.
    pub fn from_args(args: &Args) -> Result<Self, ReportError> {
        let kind: ReportKind = args.report_type.parse()?;

        // An explicit --buckets wins over the legacy hist[...] suffix.
        let bucket_spec = match (&args.buckets, &kind) {
            (Some(spec), _) => Some(spec.as_str()),
            (None, ReportKind::Histogram(Some(spec))) => Some(spec.as_str()),
            (None, _) => None,
        };
        let buckets = bucket_spec.map(str::parse::<Buckets>).transpose()?;

        if let Some(factor) = args.growth_factor {
            if factor == 1 {
                return Err(ReportError::InvalidGrowthFactor(factor));
            }
        }

        let inputs = if args.files.is_empty() {
            vec![PathBuf::from(STDIN)]
        } else {
            args.files.iter().map(PathBuf::from).collect()
        };

        Ok(Self {
            kind,
            buckets,
            growth_factor: args.growth_factor,
            every: Some(args.every).filter(|every| !every.is_zero()),
            output: args.output.clone(),
            inputs,
        })
    }
}
