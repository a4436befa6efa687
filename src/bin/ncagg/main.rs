use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use error_stack::ResultExt;
use ncagg::config::Config;
use ncagg::dataset::{DataStore, GranuleReader};
use ncagg::logging::init_logging;
use ncagg::netcdf_io::NetcdfStore;

use crate::error::CliError;

mod error;

fn main() -> ExitCode {
    let clargs = Cli::parse();
    init_logging(clargs.verbosity.log_level_filter());
    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: Cli) -> error_stack::Result<(), CliError> {
    match clargs.cmd {
        Command::Files(args) => run_aggregate(args.files, &args.common),
        Command::Dir(args) => {
            let files = args.get_files()?;
            run_aggregate(files, &args.common)
        }
        Command::Template(args) => write_template(args),
    }
}

fn run_aggregate(inputs: Vec<PathBuf>, common: &AggregateCli) -> error_stack::Result<(), CliError> {
    if inputs.is_empty() {
        return Err(CliError::usage("no input files were given").into());
    }

    let store = NetcdfStore::new();
    let config = match &common.config {
        Some(path) => {
            let mut config =
                Config::from_file(path).change_context_lazy(|| CliError::config(path))?;
            apply_udc_overrides(&mut config, &common.udc)?;
            Some(config)
        }
        None if common.udc.is_empty() => None,
        None => {
            // shorthand UDCs need a config to land on; derive one from
            // the first input
            let mut config = derive_config(&store, &inputs)?;
            apply_udc_overrides(&mut config, &common.udc)?;
            Some(config)
        }
    };

    ncagg::aggregate(&store, &inputs, &common.out, config.as_ref())
        .change_context_lazy(|| CliError::aggregation(&common.out))?;
    Ok(())
}

fn derive_config(store: &NetcdfStore, inputs: &[PathBuf]) -> error_stack::Result<Config, CliError> {
    let sample = inputs
        .iter()
        .min_by_key(|p| p.file_name().map(|f| f.to_os_string()))
        .expect("inputs were checked to be non-empty");
    let reader = store.open(sample).change_context_lazy(|| CliError::sample(sample))?;
    let schema = reader.schema().change_context_lazy(|| CliError::sample(sample))?;
    Ok(Config::from_sample(&schema))
}

fn write_template(args: TemplateCli) -> error_stack::Result<(), CliError> {
    let store = NetcdfStore::new();
    let mut config = derive_config(&store, std::slice::from_ref(&args.sample))?;
    apply_udc_overrides(&mut config, &args.udc)?;

    let json = config
        .to_json_pretty()
        .change_context_lazy(|| CliError::TemplateRender)?;
    match &args.out {
        Some(path) => {
            let mut f = std::fs::File::create(path)
                .change_context_lazy(|| CliError::template(path))?;
            writeln!(f, "{json}").change_context_lazy(|| CliError::template(path))?;
            log::info!("wrote configuration template to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Apply `-u dim:index_var:hz[:inner_hz]` shorthands onto a
/// configuration: the outer rate attaches to the dimension itself, the
/// inner rate to every other dimension of the index variable.
fn apply_udc_overrides(config: &mut Config, overrides: &[UdcShorthand]) -> Result<(), CliError> {
    for udc in overrides {
        let index_var_dims = config
            .variable(&udc.index_var)
            .ok_or_else(|| {
                CliError::usage(format!(
                    "-u names index variable '{}', which is not in the configuration",
                    udc.index_var
                ))
            })?
            .dimensions
            .clone();

        let dim = config
            .dimensions
            .iter_mut()
            .find(|d| d.name == udc.dim)
            .ok_or_else(|| {
                CliError::usage(format!(
                    "-u names dimension '{}', which is not in the configuration",
                    udc.dim
                ))
            })?;

        dim.index_by = Some(udc.index_var.clone());
        dim.expected_cadence.insert(udc.dim.clone(), udc.hz);
        if let Some(inner_hz) = udc.inner_hz {
            for inner in index_var_dims.iter().skip(1) {
                dim.expected_cadence.insert(inner.clone(), inner_hz);
                dim.other_dim_indices.entry(inner.clone()).or_insert(0);
            }
        }
    }
    Ok(())
}

/// One `-u` unlimited dimension configuration shorthand, e.g.
/// `record_number:time:1` or `report_number:OB_time:1:10`.
#[derive(Debug, Clone)]
struct UdcShorthand {
    dim: String,
    index_var: String,
    hz: f64,
    inner_hz: Option<f64>,
}

impl FromStr for UdcShorthand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if !(3..=4).contains(&parts.len()) {
            return Err(format!(
                "expected dim:index_var:hz[:inner_hz], got '{s}'"
            ));
        }
        let hz: f64 = parts[2]
            .parse()
            .map_err(|_| format!("'{}' is not a valid rate in Hz", parts[2]))?;
        let inner_hz = parts
            .get(3)
            .map(|p| p.parse::<f64>().map_err(|_| format!("'{p}' is not a valid rate in Hz")))
            .transpose()?;
        Ok(Self {
            dim: parts[0].to_string(),
            index_var: parts[1].to_string(),
            hz,
            inner_hz,
        })
    }
}

#[derive(Debug, clap::Parser)]
#[command(about = "Aggregate many small netCDF granules into one file")]
struct Cli {
    #[clap(subcommand)]
    cmd: Command,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// List specific granules to aggregate on the command line.
    Files(FilesCli),

    /// Aggregate all matching granules from a directory.
    Dir(DirCli),

    /// Derive a configuration template from a sample granule.
    Template(TemplateCli),
}

#[derive(Debug, clap::Args)]
struct AggregateCli {
    /// Path of the aggregated output file.
    #[clap(long, short)]
    out: PathBuf,

    /// Product configuration JSON. Without it, a default configuration
    /// is derived from the first input granule.
    #[clap(long, short)]
    config: Option<PathBuf>,

    /// Unlimited dimension shorthand, dim:index_var:hz[:inner_hz].
    /// May be given once per unlimited dimension.
    #[clap(long = "udc", short)]
    udc: Vec<UdcShorthand>,
}

#[derive(Debug, clap::Args)]
struct FilesCli {
    #[command(flatten)]
    common: AggregateCli,

    /// The granules to aggregate, as individual arguments.
    files: Vec<PathBuf>,
}

#[derive(Debug, clap::Args)]
struct DirCli {
    #[command(flatten)]
    common: AggregateCli,

    /// Glob pattern the granule filenames must match.
    #[clap(long, default_value = "*.nc")]
    pattern: String,

    /// The directory to take input granules from.
    path: PathBuf,
}

impl DirCli {
    fn get_files(&self) -> error_stack::Result<Vec<PathBuf>, CliError> {
        if !self.path.is_dir() {
            return Err(CliError::usage(format!(
                "{} is not a directory",
                self.path.display()
            ))
            .into());
        }

        let matches = glob::glob(&format!("{}/{}", self.path.display(), self.pattern))
            .change_context_lazy(|| CliError::discovery(&self.path))?;

        let mut files = vec![];
        for entry in matches {
            let entry = entry.change_context_lazy(|| CliError::discovery(&self.path))?;
            files.push(entry);
        }
        Ok(files)
    }
}

#[derive(Debug, clap::Args)]
struct TemplateCli {
    /// The granule to derive the configuration from.
    sample: PathBuf,

    /// Where to write the configuration; stdout when omitted.
    #[clap(long, short)]
    out: Option<PathBuf>,

    /// Unlimited dimension shorthand, dim:index_var:hz[:inner_hz].
    #[clap(long = "udc", short)]
    udc: Vec<UdcShorthand>,
}
