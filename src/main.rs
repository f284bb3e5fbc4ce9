//! CLI entry point for the PDF correlation search tool.
//!
//! Provides the `search` command matching observed curves against a store
//! of precomputed COD simulations, plus `config` to inspect the active
//! settings.

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codpdf::search::{Composition, ObservedSource, SearchRequest, run_search};
use codpdf::store::{Backend, CurveStore, FlatStore, HierarchicalStore};
use codpdf::Settings;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Correlation search over simulated COD pair distribution functions
#[derive(Parser)]
#[command(
    name = "codpdf",
    version = env!("CARGO_PKG_VERSION"),
    about = "Search precomputed COD PDF simulations by correlation",
    long_about = "Match an observed pair distribution function against a store of \
                  precomputed COD simulations and report correlation coefficients.",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to a custom codpdf.toml settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate correlation coefficients between a given PDF and COD simulations
    Search {
        /// Storage backend for calculated PDFs
        #[arg(long, default_value = "hdf")]
        store: Backend,

        /// Lower bound for evaluating the correlation coefficient
        #[arg(long)]
        rmin: Option<f64>,

        /// Upper bound for evaluating the correlation coefficient
        #[arg(long)]
        rmax: Option<f64>,

        /// Minimum correlation value for a COD match (inclusive)
        #[arg(long)]
        ccmin: Option<f32>,

        /// Tolerance on normalized stoichiometry, e.g. 0.1
        #[arg(short = 't', long, default_value_t = 0.0)]
        tolerance: f64,

        /// Sort the output by correlation coefficient in descending order
        #[arg(short = 's', long)]
        sort: bool,

        /// PDF data to be matched, a two-column (r, g) text file;
        /// use "cod:ID" for the stored simulation of a COD entry
        searchpdf: String,

        /// Limit the search to a normalized composition, e.g. "Na 0.5 Cl 0.5"
        composition: Vec<String>,
    },

    /// Display the active settings
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    match cli.command {
        Commands::Search {
            store,
            rmin,
            rmax,
            ccmin,
            tolerance,
            sort,
            searchpdf,
            composition,
        } => {
            let observed: ObservedSource = searchpdf.parse()?;
            let composition = {
                let joined = composition.join(" ");
                if joined.is_empty() || joined == "*" {
                    None
                } else {
                    Some(Composition::parse(&joined)?)
                }
            };
            let request = SearchRequest {
                observed,
                rmin,
                rmax,
                ccmin,
                tolerance,
                sort,
                composition,
            };
            let store: Box<dyn CurveStore> = match store {
                Backend::Hdf => Box::new(
                    HierarchicalStore::open(&settings.hdf_store)
                        .with_context(|| format!("cannot open {}", settings.hdf_store.display()))?,
                ),
                Backend::Flat => Box::new(
                    FlatStore::open(&settings.flat_store)
                        .with_context(|| format!("cannot open {}", settings.flat_store.display()))?,
                ),
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            // The composition index is an external service; no filter is
            // wired in by default, so composition queries report an error.
            run_search(store.as_ref(), &request, None, &mut out)?;
            out.flush()?;
        }
        Commands::Config => {
            print!("{}", settings.to_toml()?);
        }
    }
    Ok(())
}
