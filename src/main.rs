use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::info;

use geostat::{AutocorrelationOptions, Contiguity, JoinOptions, PcaOptions, SamplingOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of worker threads (default: number of CPU cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an evapotranspiration raster (mm) to water volume (m³) and total mass (Tg)
    WaterMass {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output volume GeoTIFF
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Output text report
        #[arg(short, long, value_name = "FILE")]
        report: PathBuf,
    },

    /// Sample a raster at point locations
    Sample {
        #[arg(value_name = "POINTS")]
        points: PathBuf,

        #[arg(value_name = "RASTER")]
        raster: PathBuf,

        /// Output table (.xlsx or .csv)
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Field receiving the sampled values
        #[arg(long, default_value = "np")]
        field: String,

        /// Field to sort the output by
        #[arg(long, default_value = "ORIG_FID")]
        sort_key: String,
    },

    /// Left-join one field of a value layer onto a source layer
    Join {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(value_name = "VALUES")]
        values: PathBuf,

        /// Output table (.xlsx or .csv)
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(long, default_value = "ORIG_FID")]
        key: String,

        #[arg(long, default_value = "soil2000")]
        field: String,
    },

    /// Min-max normalize one column of a CSV file
    Normalize {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        #[arg(short, long)]
        column: String,
    },

    /// Moran's I, Geary's C and LISA for point observations
    Autocorr {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory for plots and the summary workbook
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Variable columns (default: detected from the headers)
        #[arg(long, value_delimiter = ',')]
        variables: Vec<String>,

        #[arg(long, default_value = "lon")]
        lon: String,

        #[arg(long, default_value = "lat")]
        lat: String,

        #[arg(long)]
        sheet: Option<String>,

        #[arg(long, value_enum, default_value_t = ContiguityArg::Queen)]
        contiguity: ContiguityArg,

        #[arg(long, default_value_t = 999)]
        permutations: usize,

        #[arg(long, default_value_t = 12345)]
        seed: u64,

        /// Pseudo p-value threshold for LISA clusters
        #[arg(long, default_value_t = 0.05)]
        significance: f64,
    },

    /// PCA with Kaiser criterion and varimax rotation
    Pca {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output directory for the scree plot and workbooks
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        #[arg(long)]
        sheet: Option<String>,

        /// Significance level Bartlett's test must reach
        #[arg(long, default_value_t = 0.05)]
        alpha: f64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ContiguityArg {
    Rook,
    Queen,
}

impl From<ContiguityArg> for Contiguity {
    fn from(value: ContiguityArg) -> Self {
        match value {
            ContiguityArg::Rook => Contiguity::Rook,
            ContiguityArg::Queen => Contiguity::Queen,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    match args.command {
        Command::WaterMass {
            input,
            output,
            report,
        } => {
            let summary = geostat::run_water_mass(&input, &output, &report)?;
            info!("Total water mass: {:.6} Tg", summary.total_tg);
        }
        Command::Sample {
            points,
            raster,
            output,
            field,
            sort_key,
        } => {
            let options = SamplingOptions {
                value_field: field,
                sort_key,
            };
            let table = geostat::run_sampling(&points, &raster, &output, &options)?;
            info!("Sampled {} points", table.n_rows());
        }
        Command::Join {
            source,
            values,
            output,
            key,
            field,
        } => {
            let options = JoinOptions {
                key,
                value_field: field,
            };
            geostat::run_join(&source, &values, &output, &options)?;
        }
        Command::Normalize {
            input,
            output,
            column,
        } => {
            geostat::run_normalize(&input, &output, &column)?;
        }
        Command::Autocorr {
            input,
            output,
            variables,
            lon,
            lat,
            sheet,
            contiguity,
            permutations,
            seed,
            significance,
        } => {
            let options = AutocorrelationOptions {
                lon_field: lon,
                lat_field: lat,
                variables,
                sheet,
                contiguity: contiguity.into(),
                permutations,
                seed,
                significance,
            };
            let report = geostat::run_autocorrelation(&input, &output, &options)?;
            info!("Analysed {} variables", report.variables.len());
        }
        Command::Pca {
            input,
            output,
            sheet,
            alpha,
        } => {
            let options = PcaOptions {
                sheet,
                alpha,
                ..Default::default()
            };
            let model = geostat::run_pca(&input, &output, &options)?;
            info!("Retained {} principal components", model.n_components());
        }
    }

    let elapsed = start_time.elapsed();
    info!("Finished in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
