// ==============================================================================
// processor.rs - Load Pipelines
// ==============================================================================
// Description: Gene catalog load and case load, from source files to store
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-11-21
// Version: 3.0.0
// ==============================================================================
// Gene catalog (one build):
//   parse catalogs -> link genes -> load genes -> link + load transcripts
//   -> load HPO terms and diseases
// Case:
//   config (+ PED) -> Case -> genes of the case build from the store
//   -> for each configured VCF: parse -> build -> filter -> load -> case
// ==============================================================================

use anyhow::{Context, Result};
use serde_json::json;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::builder::{build_disease_terms, build_hpo_terms, VariantBuilder, GENE_COLLECTION};
use crate::case::{CaseBuilder, CaseConfig};
use crate::error::LoadError;
use crate::link::{GeneIndex, GeneLinker, GeneSources, LinkedGenes};
use crate::loader::{BulkLoader, LoadSummary};
use crate::models::{Build, Case, Category, GeneRecord, VariantFilter, VariantType};
use crate::parsers::{
    open_source, open_variant_source, EnsemblParser, ExacParser, HgncParser, HpoParser,
    OmimParser, PedigreeParser, SourceTable, VariantParser, VcfReader,
};
use crate::store::Store;
use crate::transcripts::TranscriptLinker;

/// Source files of one gene catalog load; only HGNC is mandatory
#[derive(Debug, Clone, Default)]
pub struct CatalogFiles {
    pub hgnc: PathBuf,
    pub ensembl_genes: Option<PathBuf>,
    pub ensembl_transcripts: Option<PathBuf>,
    pub exac: Option<PathBuf>,
    pub hpo_genes: Option<PathBuf>,
    pub hpo_terms: Option<PathBuf>,
    pub hpo_diseases: Option<PathBuf>,
    pub mim2gene: Option<PathBuf>,
    pub genemap: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub genes: usize,
    pub transcripts: usize,
    pub hpo_terms: usize,
    pub disease_terms: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseSummary {
    pub case_id: String,
    /// One entry per loaded (variant type, category)
    pub variants: Vec<(VariantType, Category, LoadSummary)>,
}

/// Runs the load pipelines against one store
pub struct GeneticsLoader<S: Store> {
    loader: BulkLoader<S>,
}

impl<S: Store> GeneticsLoader<S> {
    pub fn new(loader: BulkLoader<S>) -> Self {
        Self { loader }
    }

    pub fn store(&self) -> &S {
        self.loader.store()
    }

    /// Parse, link and load every gene catalog of one build
    pub fn load_gene_catalog(&mut self, files: &CatalogFiles, build: Build) -> Result<CatalogSummary> {
        info!("Loading gene catalog for build {}", build);
        self.loader
            .ensure_indexes()
            .context("Failed to create store indexes")?;

        let sources = GeneSources {
            hgnc: parse_file(&files.hgnc, |r| HgncParser::parse(r))
                .context("Failed to parse HGNC genes")?,
            ensembl: parse_optional(&files.ensembl_genes, |r| EnsemblParser::parse_genes(r))
                .context("Failed to parse Ensembl genes")?,
            exac: parse_optional(&files.exac, |r| ExacParser::parse(r))
                .context("Failed to parse ExAC constraint scores")?,
            hpo: parse_optional(&files.hpo_genes, |r| HpoParser::parse_genes(r))
                .context("Failed to parse HPO gene annotations")?,
            mim2gene: parse_optional(&files.mim2gene, |r| OmimParser::parse_mim2gene(r))
                .context("Failed to parse OMIM mim2gene")?,
            genemap: parse_optional(&files.genemap, |r| OmimParser::parse_genemap(r))
                .context("Failed to parse OMIM genemap")?,
        };

        let genes = GeneLinker::link(&sources, build).context("Failed to link gene catalogs")?;
        drop(sources);

        let mut summary = CatalogSummary {
            genes: self.loader.load_genes(genes.iter().cloned())?.loaded,
            ..CatalogSummary::default()
        };

        if let Some(path) = &files.ensembl_transcripts {
            let transcripts = parse_file(path, |r| EnsemblParser::parse_transcripts(r))
                .context("Failed to parse Ensembl transcripts")?;
            let linked = TranscriptLinker::link(transcripts.into_values(), &genes);
            summary.transcripts = self.loader.load_transcripts(linked)?.loaded;
        }

        if let Some(path) = &files.hpo_terms {
            let terms = parse_file(path, |r| HpoParser::parse_terms(r))
                .context("Failed to parse HPO terms")?;
            summary.hpo_terms = self.loader.load_hpo_terms(build_hpo_terms(terms, &genes))?.loaded;
        }

        if let Some(path) = &files.hpo_diseases {
            let diseases = parse_file(path, |r| HpoParser::parse_diseases(r))
                .context("Failed to parse HPO diseases")?;
            summary.disease_terms = self
                .loader
                .load_disease_terms(build_disease_terms(diseases, &genes))?
                .loaded;
        }

        info!(
            "Gene catalog {} loaded: {} genes, {} transcripts, {} HPO terms, {} diseases",
            build, summary.genes, summary.transcripts, summary.hpo_terms, summary.disease_terms
        );
        Ok(summary)
    }

    /// Build a case from its load config and load all of its variant files
    ///
    /// Relative VCF paths are resolved against the config's directory. With
    /// `update`, variants of a reloaded track are removed before loading.
    pub fn load_case(
        &mut self,
        config_path: &Path,
        ped_path: Option<&Path>,
        owner: Option<&str>,
        update: bool,
    ) -> Result<CaseSummary> {
        info!("Loading case from {:?}", config_path);
        let config = CaseConfig::from_path(config_path)
            .with_context(|| format!("Failed to read case config {:?}", config_path))?;

        let pedigree = match ped_path {
            Some(path) => Some(
                parse_file(path, |r| PedigreeParser::parse(r))
                    .with_context(|| format!("Failed to parse pedigree {:?}", path))?,
            ),
            None => None,
        };

        let case = CaseBuilder::build(config, pedigree, owner).context("Failed to build case")?;

        let genes = self
            .stored_genes(case.genome_build)
            .context("Failed to read genes from store")?;
        if genes.is_empty() {
            warn!(
                "No genes stored for build {}; variants will carry no hgnc_ids",
                case.genome_build
            );
        }
        let index = GeneIndex::new(&genes);

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut summary = CaseSummary {
            case_id: case.case_id.clone(),
            variants: Vec::new(),
        };

        for (variant_type, category) in load_tracks(&case) {
            let Some(file) = case.vcf_files.get(variant_type, category) else {
                continue;
            };
            let path = base_dir.join(file);

            if update {
                self.loader
                    .delete_variants(&case.case_id, variant_type, category)?;
            }

            let loaded = self
                .load_variant_file(&case, &index, &path, variant_type, category)
                .with_context(|| {
                    format!(
                        "Failed to load {} {} variants from {:?}",
                        variant_type.as_str(),
                        category.as_str(),
                        path
                    )
                })?;
            summary.variants.push((variant_type, category, loaded));
        }

        self.loader.load_case(&case).context("Failed to store case")?;
        info!("Case {} loaded", case.case_id);
        Ok(summary)
    }

    pub fn delete_case(&mut self, case_id: &str) -> Result<usize> {
        Ok(self.loader.delete_case(case_id)?)
    }

    fn load_variant_file(
        &mut self,
        case: &Case,
        index: &GeneIndex,
        path: &Path,
        variant_type: VariantType,
        category: Category,
    ) -> Result<LoadSummary, LoadError> {
        let reader = VcfReader::new(open_variant_source(path)?)?;
        let parser = VariantParser::new(
            case,
            &reader.header().individual_positions(),
            variant_type,
            category,
        )?;
        let builder = VariantBuilder::new(case, index);
        let filter = VariantFilter::new(category, case.rank_score_threshold);

        // Records are consumed lazily; the first read error aborts the file
        let mut error: Option<LoadError> = None;
        let variants = reader.map_while(|record| match record {
            Ok(record) => Some(builder.build(parser.parse(&record))),
            Err(err) => {
                error = Some(err);
                None
            }
        });
        let summary = self.loader.load_variants(variants, &filter)?;

        match error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn stored_genes(&self, build: Build) -> Result<LinkedGenes, LoadError> {
        let documents = self
            .loader
            .store()
            .find(GENE_COLLECTION, &[("build", json!(build.as_str()))])?;

        let genes = documents
            .into_iter()
            .map(|doc| serde_json::from_value::<GeneRecord>(doc).map_err(crate::store::StoreError::from))
            .collect::<Result<Vec<_>, _>>()?;

        LinkedGenes::new(build, genes)
    }
}

/// Clinical tracks always, research tracks only for research cases
fn load_tracks(case: &Case) -> Vec<(VariantType, Category)> {
    let mut tracks = vec![
        (VariantType::Clinical, Category::Snv),
        (VariantType::Clinical, Category::Sv),
    ];
    if case.is_research {
        tracks.push((VariantType::Research, Category::Snv));
        tracks.push((VariantType::Research, Category::Sv));
    }
    tracks
}

fn parse_file<T>(
    path: &Path,
    parse: impl FnOnce(Box<dyn BufRead>) -> Result<T, LoadError>,
) -> Result<T, LoadError> {
    parse(open_source(path)?)
}

fn parse_optional<K, T>(
    path: &Option<PathBuf>,
    parse: impl FnOnce(Box<dyn BufRead>) -> Result<SourceTable<K, T>, LoadError>,
) -> Result<SourceTable<K, T>, LoadError>
where
    K: Eq + std::hash::Hash + Clone,
{
    match path {
        Some(path) => parse_file(path, parse),
        None => Ok(SourceTable::new()),
    }
}
