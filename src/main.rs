// ==============================================================================
// main.rs - Genetics Loader Entry Point
// ==============================================================================
// Description: Command line entry point for gene catalog and case loads
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-11-21
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genetics_loader::loader::{BulkLoader, DEFAULT_BATCH_SIZE};
use genetics_loader::models::Build;
use genetics_loader::processor::{CatalogFiles, GeneticsLoader};
use genetics_loader::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "genetics.db")]
    database_path: PathBuf,

    /// Documents per store transaction
    #[arg(long, env = "LOAD_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Link the gene catalogs of one build and load genes and transcripts
    LoadGenes {
        /// Genome build (37 or 38)
        #[arg(short, long)]
        build: String,

        /// HGNC complete set
        #[arg(long)]
        hgnc: PathBuf,

        /// Ensembl biomart gene export
        #[arg(long)]
        ensembl_genes: Option<PathBuf>,

        /// Ensembl biomart transcript export
        #[arg(long)]
        ensembl_transcripts: Option<PathBuf>,

        /// ExAC constraint scores
        #[arg(long)]
        exac: Option<PathBuf>,

        /// HPO genes_to_phenotype
        #[arg(long)]
        hpo_genes: Option<PathBuf>,

        /// HPO phenotype_to_genes
        #[arg(long)]
        hpo_terms: Option<PathBuf>,

        /// HPO phenotype.hpoa
        #[arg(long)]
        hpo_diseases: Option<PathBuf>,

        /// OMIM mim2gene
        #[arg(long)]
        mim2gene: Option<PathBuf>,

        /// OMIM genemap2
        #[arg(long)]
        genemap: Option<PathBuf>,
    },

    /// Build a case from its load config and load its variants
    LoadCase {
        /// YAML load config
        config: PathBuf,

        /// PED file replacing the config's family and samples
        #[arg(long)]
        ped: Option<PathBuf>,

        /// Institute owning the case, when the config has none
        #[arg(long)]
        owner: Option<String>,

        /// Remove previously loaded variants of each reloaded file first
        #[arg(long)]
        update: bool,
    },

    /// Remove a case and all of its variants
    DeleteCase {
        /// `{owner}-{family id}`
        case_id: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "genetics_loader=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Genetics Loader starting (database {:?})", args.database_path);

    let store = SqliteStore::open(&args.database_path)
        .with_context(|| format!("Failed to open database {:?}", args.database_path))?;
    let mut pipeline = GeneticsLoader::new(BulkLoader::new(store).with_batch_size(args.batch_size));

    match args.command {
        Command::LoadGenes {
            build,
            hgnc,
            ensembl_genes,
            ensembl_transcripts,
            exac,
            hpo_genes,
            hpo_terms,
            hpo_diseases,
            mim2gene,
            genemap,
        } => {
            let build: Build = build.parse()?;
            let files = CatalogFiles {
                hgnc,
                ensembl_genes,
                ensembl_transcripts,
                exac,
                hpo_genes,
                hpo_terms,
                hpo_diseases,
                mim2gene,
                genemap,
            };
            if files.ensembl_genes.is_none() {
                warn!("No Ensembl genes given; genes will have no coordinates");
            }

            let summary = pipeline.load_gene_catalog(&files, build)?;
            info!(
                "Loaded {} genes and {} transcripts for build {}",
                summary.genes, summary.transcripts, build
            );
        }
        Command::LoadCase {
            config,
            ped,
            owner,
            update,
        } => {
            let summary = pipeline.load_case(&config, ped.as_deref(), owner.as_deref(), update)?;
            for (variant_type, category, loaded) in &summary.variants {
                info!(
                    "{} {} {} variants: {} loaded, {} filtered",
                    summary.case_id,
                    variant_type.as_str(),
                    category.as_str(),
                    loaded.loaded,
                    loaded.filtered
                );
            }
        }
        Command::DeleteCase { case_id } => {
            let deleted = pipeline.delete_case(&case_id)?;
            if deleted == 0 {
                warn!("Case {} not found", case_id);
            } else {
                info!("Deleted {} documents of case {}", deleted, case_id);
            }
        }
    }

    Ok(())
}
