// ==============================================================================
// link.rs - Gene Identifier Linker
// ==============================================================================
// Description: Joins the gene catalogs into one canonical gene per hgnc_id
// Author: Matt Barham
// Created: 2025-11-16
// Modified: 2025-11-22
// Version: 1.3.0
// ==============================================================================
// Identity comes from HGNC only. Every other source enriches:
//   1. match by the HGNC Ensembl gene id when the source carries one
//   2. else by hgnc_id when the source carries one
//   3. else exact match on the HGNC symbol
//   4. else match among HGNC aliases (first gene in HGNC order wins)
// Each gene takes at most one record per source, best match kind first.
// Fields are filled only when still empty; unmatched records are dropped.
// ==============================================================================

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::models::{normalize_chromosome, Build, GeneRecord};
use crate::parsers::ensembl::EnsemblGene;
use crate::parsers::exac::ExacGene;
use crate::parsers::hgnc::HgncGene;
use crate::parsers::hpo::HpoGene;
use crate::parsers::omim::{MimGene, OmimGene};
use crate::parsers::tabular::SourceTable;

const PRIMARY_CHROMOSOMES: &[&str] = &[
    "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12", "13", "14", "15", "16", "17",
    "18", "19", "20", "21", "22", "X", "Y", "MT",
];

/// The six parsed gene catalogs for one build
#[derive(Debug, Default)]
pub struct GeneSources {
    pub hgnc: SourceTable<u32, HgncGene>,
    pub ensembl: SourceTable<String, EnsemblGene>,
    pub exac: SourceTable<String, ExacGene>,
    pub hpo: SourceTable<String, HpoGene>,
    pub mim2gene: SourceTable<u32, MimGene>,
    pub genemap: SourceTable<u32, OmimGene>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchKind {
    Ensembl,
    Id,
    Symbol,
    Alias,
}

/// Join keys one enrichment record offers
#[derive(Debug, Default)]
struct MatchKeys<'s> {
    ensembl_id: Option<&'s str>,
    hgnc_id: Option<u32>,
    symbols: Vec<&'s str>,
}

impl<'s> MatchKeys<'s> {
    fn symbols(symbols: Vec<&'s str>) -> Self {
        Self {
            symbols,
            ..Self::default()
        }
    }
}

/// Linked genes of one build, stored in an arena and looked up by id
#[derive(Debug, Clone)]
pub struct LinkedGenes {
    build: Build,
    genes: Vec<GeneRecord>,
    by_hgnc: HashMap<u32, usize>,
    by_ensembl: HashMap<String, usize>,
    by_symbol: HashMap<String, usize>,
    by_alias: HashMap<String, usize>,
}

impl LinkedGenes {
    /// Index already linked genes
    ///
    /// Fails with `DuplicateIdentifier` when two records share an hgnc_id.
    pub fn new(build: Build, genes: Vec<GeneRecord>) -> Result<Self, LoadError> {
        let mut by_hgnc = HashMap::with_capacity(genes.len());
        let mut by_ensembl = HashMap::new();
        let mut by_symbol = HashMap::with_capacity(genes.len());
        let mut by_alias = HashMap::new();

        for (idx, gene) in genes.iter().enumerate() {
            if by_hgnc.insert(gene.hgnc_id, idx).is_some() {
                return Err(LoadError::DuplicateIdentifier {
                    hgnc_id: gene.hgnc_id,
                });
            }
            if let Some(ensembl_id) = &gene.ensembl_id {
                by_ensembl.entry(ensembl_id.clone()).or_insert(idx);
            }
            by_symbol.entry(gene.symbol.clone()).or_insert(idx);
        }

        // Aliases never shadow a primary symbol
        for (idx, gene) in genes.iter().enumerate() {
            for alias in &gene.aliases {
                if !by_symbol.contains_key(alias) {
                    by_alias.entry(alias.clone()).or_insert(idx);
                }
            }
        }

        Ok(Self {
            build,
            genes,
            by_hgnc,
            by_ensembl,
            by_symbol,
            by_alias,
        })
    }

    pub fn build(&self) -> Build {
        self.build
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneRecord> {
        self.genes.iter()
    }

    pub fn get(&self, hgnc_id: u32) -> Option<&GeneRecord> {
        self.by_hgnc.get(&hgnc_id).map(|&idx| &self.genes[idx])
    }

    pub fn by_ensembl_id(&self, ensembl_gene_id: &str) -> Option<&GeneRecord> {
        self.by_ensembl.get(ensembl_gene_id).map(|&idx| &self.genes[idx])
    }

    /// hgnc_id for a symbol, trying primary symbols before aliases
    pub fn hgnc_id_for_symbol(&self, symbol: &str) -> Option<u32> {
        self.by_symbol
            .get(symbol)
            .or_else(|| self.by_alias.get(symbol))
            .map(|&idx| self.genes[idx].hgnc_id)
    }

    pub fn into_genes(self) -> Vec<GeneRecord> {
        self.genes
    }

    fn resolve(&self, keys: &MatchKeys<'_>) -> Option<(usize, MatchKind)> {
        if let Some(&idx) = keys.ensembl_id.and_then(|id| self.by_ensembl.get(id)) {
            return Some((idx, MatchKind::Ensembl));
        }
        if let Some(&idx) = keys.hgnc_id.and_then(|id| self.by_hgnc.get(&id)) {
            return Some((idx, MatchKind::Id));
        }
        if let Some(&idx) = keys.symbols.iter().find_map(|s| self.by_symbol.get(*s)) {
            return Some((idx, MatchKind::Symbol));
        }
        keys.symbols
            .iter()
            .find_map(|s| self.by_alias.get(*s))
            .map(|&idx| (idx, MatchKind::Alias))
    }

    /// Merge one enrichment source into the linked genes
    fn enrich<'s, T: 's>(
        &mut self,
        source_name: &str,
        records: impl Iterator<Item = &'s T>,
        keys: impl Fn(&'s T) -> MatchKeys<'s>,
        merge: impl Fn(&mut GeneRecord, &T),
    ) {
        let mut matches: Vec<(MatchKind, usize, &T)> = Vec::new();
        let mut dropped = 0;

        for record in records {
            let record_keys = keys(record);
            match self.resolve(&record_keys) {
                Some((idx, kind)) => matches.push((kind, idx, record)),
                None => {
                    dropped += 1;
                    debug!("{}: no HGNC gene for {:?}", source_name, record_keys);
                }
            }
        }

        // Stable sort keeps source order within a match kind
        matches.sort_by_key(|(kind, _, _)| *kind);

        let mut taken = vec![false; self.genes.len()];
        let mut merged = 0;
        for (_, idx, record) in matches {
            if taken[idx] {
                continue;
            }
            taken[idx] = true;
            merge(&mut self.genes[idx], record);
            merged += 1;
        }

        if dropped > 0 {
            warn!(
                "{}: {} records matched no HGNC gene and were dropped",
                source_name, dropped
            );
        }
        info!("{}: enriched {} genes", source_name, merged);
    }

    /// Refresh the lookup maps after enrichment changed ensembl ids
    fn reindex(self) -> Result<Self, LoadError> {
        Self::new(self.build, self.genes)
    }
}

/// Links HGNC genes with their enrichment sources for one build
pub struct GeneLinker;

impl GeneLinker {
    pub fn link(sources: &GeneSources, build: Build) -> Result<LinkedGenes, LoadError> {
        if let Some(&hgnc_id) = sources.hgnc.duplicates().first() {
            return Err(LoadError::DuplicateIdentifier { hgnc_id });
        }

        let genes = sources
            .hgnc
            .values()
            .map(|hgnc| from_hgnc(hgnc, build))
            .collect();
        let mut linked = LinkedGenes::new(build, genes)?;

        linked.enrich(
            "ensembl",
            sources
                .ensembl
                .values()
                .filter(|g| PRIMARY_CHROMOSOMES.contains(&normalize_chromosome(&g.chromosome).as_str())),
            |g| MatchKeys {
                ensembl_id: Some(g.ensembl_gene_id.as_str()),
                hgnc_id: g.hgnc_id,
                symbols: g.hgnc_symbol.as_deref().into_iter().collect(),
            },
            |gene, g| {
                fill(&mut gene.ensembl_id, Some(&g.ensembl_gene_id));
                // Coordinates only from the gene's own Ensembl record
                if gene.chromosome.is_none() && gene.ensembl_id.as_ref() == Some(&g.ensembl_gene_id) {
                    gene.chromosome = Some(normalize_chromosome(&g.chromosome));
                    gene.start = Some(g.start);
                    gene.end = Some(g.end);
                }
            },
        );

        linked.enrich(
            "exac",
            sources.exac.values(),
            |g| MatchKeys::symbols(vec![g.symbol.as_str()]),
            |gene, g| {
                fill(&mut gene.pli_score, g.pli_score.as_ref());
                fill(&mut gene.mis_z, g.mis_z.as_ref());
                fill(&mut gene.syn_z, g.syn_z.as_ref());
            },
        );

        linked.enrich(
            "hpo genes",
            sources.hpo.values(),
            |g| MatchKeys::symbols(vec![g.symbol.as_str()]),
            |gene, g| {
                gene.hpo_terms.extend(g.hpo_terms.iter().cloned());
                gene.incomplete_penetrance |= g.incomplete_penetrance;
                fill(&mut gene.entrez_id, g.entrez_id.as_ref());
            },
        );

        linked.enrich(
            "mim2gene",
            sources.mim2gene.values(),
            |g| MatchKeys {
                ensembl_id: g.ensembl_gene_id.as_deref(),
                hgnc_id: None,
                symbols: g.hgnc_symbol.as_deref().into_iter().collect(),
            },
            |gene, g| {
                fill(&mut gene.omim_id, Some(&g.mim_number));
                fill(&mut gene.entrez_id, g.entrez_id.as_ref());
                fill(&mut gene.ensembl_id, g.ensembl_gene_id.as_ref());
            },
        );

        linked.enrich(
            "genemap2",
            sources.genemap.values(),
            |g| {
                let symbols = g
                    .approved_symbol
                    .iter()
                    .chain(g.gene_symbols.iter())
                    .map(String::as_str)
                    .collect();
                MatchKeys::symbols(symbols)
            },
            |gene, g| {
                fill(&mut gene.omim_id, Some(&g.mim_number));
                fill(&mut gene.entrez_id, g.entrez_id.as_ref());
                if gene.phenotypes.is_empty() {
                    gene.phenotypes = g.phenotypes.clone();
                }
                gene.inheritance_models.extend(g.inheritance_models.iter().cloned());
            },
        );

        let linked = linked.reindex()?;
        info!("Linked {} genes for build {}", linked.len(), build);

        Ok(linked)
    }
}

fn from_hgnc(hgnc: &HgncGene, build: Build) -> GeneRecord {
    let mut gene = GeneRecord::new(hgnc.hgnc_id, hgnc.symbol.clone(), build);
    gene.aliases.extend(hgnc.aliases.iter().cloned());
    gene.ensembl_id = hgnc.ensembl_gene_id.clone();
    gene.description = hgnc.description.clone();
    gene.location = hgnc.location.clone();
    gene.entrez_id = hgnc.entrez_id;
    gene.omim_id = hgnc.omim_id;
    gene.ucsc_id = hgnc.ucsc_id.clone();
    gene.vega_id = hgnc.vega_id.clone();
    gene.uniprot_ids = hgnc.uniprot_ids.iter().cloned().collect();
    gene.primary_transcripts = hgnc.refseq_accessions.iter().cloned().collect();
    gene
}

/// Set an empty field, never overwrite a populated one
fn fill<T: Clone>(slot: &mut Option<T>, value: Option<&T>) {
    if slot.is_none() {
        *slot = value.cloned();
    }
}

#[derive(Debug, Clone, Copy)]
struct IndexedGene {
    start: u64,
    end: u64,
    hgnc_id: u32,
}

#[derive(Debug, Default)]
struct ChromosomeGenes {
    /// Sorted by start
    genes: Vec<IndexedGene>,
    max_len: u64,
}

/// Interval lookup of gene coordinates for one build
#[derive(Debug, Default)]
pub struct GeneIndex {
    chromosomes: HashMap<String, ChromosomeGenes>,
}

impl GeneIndex {
    pub fn new(genes: &LinkedGenes) -> Self {
        let mut chromosomes: HashMap<String, ChromosomeGenes> = HashMap::new();

        for gene in genes.iter() {
            if let (Some(chromosome), Some(start), Some(end)) = (&gene.chromosome, gene.start, gene.end) {
                let entry = chromosomes.entry(normalize_chromosome(chromosome)).or_default();
                entry.max_len = entry.max_len.max(end.saturating_sub(start));
                entry.genes.push(IndexedGene {
                    start,
                    end,
                    hgnc_id: gene.hgnc_id,
                });
            }
        }

        for entry in chromosomes.values_mut() {
            entry.genes.sort_by_key(|g| (g.start, g.end));
        }

        Self { chromosomes }
    }

    /// hgnc_ids of genes overlapping [start, end] (1-based, inclusive)
    pub fn overlapping(&self, chromosome: &str, start: u64, end: u64) -> BTreeSet<u32> {
        let Some(entry) = self.chromosomes.get(&normalize_chromosome(chromosome)) else {
            return BTreeSet::new();
        };
        let (start, end) = (start.min(end), start.max(end));

        let lo = entry
            .genes
            .partition_point(|g| g.start.saturating_add(entry.max_len) < start);
        let hi = entry.genes.partition_point(|g| g.start <= end);

        entry.genes[lo..hi.max(lo)]
            .iter()
            .filter(|g| g.end >= start)
            .map(|g| g.hgnc_id)
            .collect()
    }
}
