use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use popgen_sims::{
    simulations::{Fitness, Model, Parameters},
    visualizations::{graph_from_migration_counts, render_png, save_graph_dot},
};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Population-genetics teaching simulations: drift, selection, mutation and gene flow
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// File name prefix for outputs (no file type)
    #[arg(short, long, global = true, default_value = "out")]
    out: String,

    /// Also write the trajectories as tab separated values
    #[arg(long, global = true)]
    tsv: bool,

    /// Also render the migration graph to PNG with Graphviz
    #[arg(long, global = true)]
    png: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Diploid individuals per population
    #[arg(short = 'n', long, default_value_t = 100)]
    population_size: usize,

    /// Generations to simulate
    #[arg(short, long, default_value_t = 100)]
    generations: usize,

    /// Starting frequency of allele A
    #[arg(short = 'p', long, default_value_t = 0.5)]
    initial_frequency: f64,

    /// Independent replicate populations (isolated models only)
    #[arg(short, long, default_value_t = 1)]
    replicates: usize,

    /// Observe this many individuals per generation instead of the census frequency
    #[arg(long)]
    sample_size: Option<usize>,

    /// Seed for reproducible simulation
    #[arg(short, long, default_value_t = 42)]
    seed: u64,
}

impl CommonArgs {
    fn with_model(self, model: Model) -> Parameters {
        Parameters {
            population_size: self.population_size,
            generations: self.generations,
            initial_frequency: self.initial_frequency,
            replicates: self.replicates,
            sample_size: self.sample_size,
            seed: self.seed,
            model,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Neutral genetic drift
    Drift {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Natural selection on genotype fitness
    Selection {
        #[command(flatten)]
        common: CommonArgs,

        /// Fitness of AA,Aa,aa
        #[arg(short = 'w', long, default_value = "1,1,1")]
        fitness: Fitness,
    },

    /// Recurrent mutation between the two alleles
    Mutation {
        #[command(flatten)]
        common: CommonArgs,

        /// Per-copy probability of A mutating to a
        #[arg(long, default_value_t = 0.0)]
        forward_rate: f64,

        /// Per-copy probability of a mutating to A
        #[arg(long, default_value_t = 0.0)]
        backward_rate: f64,
    },

    /// Gene flow between demes (island model)
    Flow {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of demes
        #[arg(short, long, default_value_t = 6)]
        demes: usize,

        /// Probability that a parent comes from another deme
        #[arg(short, long, default_value_t = 0.01)]
        migration_rate: f64,
    },

    /// Gene flow between demes under deme-specific selection
    SelectionFlow {
        #[command(flatten)]
        common: CommonArgs,

        /// Probability that a parent comes from another deme
        #[arg(short, long, default_value_t = 0.01)]
        migration_rate: f64,

        /// Fitness of AA,Aa,aa, repeated once per deme
        #[arg(short = 'w', long, required = true)]
        fitness: Vec<Fitness>,
    },

    /// Run with parameters loaded from a JSON file
    Run {
        /// Path to the parameter file
        config: PathBuf,
    },

    /// Print an example parameter file
    Example,
}

impl Commands {
    fn into_parameters(self) -> Result<Option<Parameters>> {
        let params = match self {
            Commands::Drift { common } => common.with_model(Model::Drift),
            Commands::Selection { common, fitness } => {
                common.with_model(Model::Selection { fitness })
            }
            Commands::Mutation {
                common,
                forward_rate,
                backward_rate,
            } => common.with_model(Model::Mutation {
                forward_rate,
                backward_rate,
            }),
            Commands::Flow {
                common,
                demes,
                migration_rate,
            } => common.with_model(Model::Flow {
                demes,
                migration_rate,
            }),
            Commands::SelectionFlow {
                common,
                migration_rate,
                fitness,
            } => common.with_model(Model::SelectionFlow {
                migration_rate,
                fitness,
            }),
            Commands::Run { config } => {
                let text = fs::read_to_string(&config)
                    .with_context(|| format!("reading {}", config.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", config.display()))?
            }
            Commands::Example => {
                println!("{}", serde_json::to_string_pretty(&Parameters::example())?);
                return Ok(None);
            }
        };

        Ok(Some(params))
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {e}");
    }
}

fn main() -> Result<()> {
    let Cli {
        command,
        out,
        tsv,
        png,
        verbose,
    } = Cli::parse();

    setup_logging(verbose);

    let Some(params) = command.into_parameters()? else {
        return Ok(());
    };

    let run = params.run().context("simulation failed")?;
    let trajectories = &run.trajectories;

    for (label, f) in trajectories.labels.iter().zip(trajectories.final_frequencies()) {
        info!(%label, final_frequency = f, "population summary");
    }

    let csv_path = format!("{out}_trajectories.csv");
    trajectories
        .write_csv(BufWriter::new(File::create(&csv_path)?))
        .with_context(|| format!("writing {csv_path}"))?;
    info!("Wrote trajectories to {csv_path}");

    if tsv {
        let tsv_path = format!("{out}_trajectories.tsv");
        trajectories
            .write_tsv(BufWriter::new(File::create(&tsv_path)?))
            .with_context(|| format!("writing {tsv_path}"))?;
        info!("Wrote trajectories to {tsv_path}");
    }

    let json_path = format!("{out}_trajectories.json");
    trajectories
        .json_dump(BufWriter::new(File::create(&json_path)?))
        .with_context(|| format!("writing {json_path}"))?;
    info!("Wrote trajectories to {json_path}");

    if let Some(migrations) = &run.migrations {
        let g = graph_from_migration_counts(migrations);
        let dot_path = format!("{out}_migration_graph.dot");
        save_graph_dot(&g, &dot_path).with_context(|| format!("writing {dot_path}"))?;
        info!("Wrote migration graph to {dot_path}");

        if png {
            let png_path = format!("{out}_migration_graph.png");
            match render_png(&dot_path, &png_path) {
                Ok(_) => info!("Saved to {png_path}"),
                Err(e) => warn!("{e}: while rendering {png_path}"),
            }
        }
    }

    Ok(())
}
