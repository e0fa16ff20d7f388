// ==============================================================================
// parsers/omim.rs - OMIM mim2gene / genemap2 Parsers
// ==============================================================================
// Description: Parsers for the OMIM gene map and MIM to gene mapping files
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-11-20
// Version: 1.1.0
// ==============================================================================
// Both files put their header behind '#':
//   # MIM Number  MIM Entry Type (see FAQ 1.3 ...)  Entrez Gene ID (NCBI) ...
//   # Chromosome  Genomic Position Start ... MIM Number ... Phenotypes ...
// genemap2 phenotype entries are ';' separated:
//   Cortical dysplasia, complex, 615191 (3), Autosomal dominant
// ==============================================================================

use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::info;

use crate::error::LoadError;
use crate::models::OmimPhenotype;
use crate::parsers::tabular::{split_list, SourceTable, TabularReader};

/// OMIM inheritance phrases and their short tags
const INHERITANCE_MODELS: &[(&str, &str)] = &[
    ("autosomal recessive", "AR"),
    ("autosomal dominant", "AD"),
    ("x-linked dominant", "XD"),
    ("x-linked recessive", "XR"),
    ("x-linked", "X"),
    ("y-linked", "Y"),
    ("mitochondrial", "MT"),
];

/// A gene entry of mim2gene.txt
#[derive(Debug, Clone, PartialEq)]
pub struct MimGene {
    pub mim_number: u32,
    pub entry_type: String,
    pub entrez_id: Option<u32>,
    pub hgnc_symbol: Option<String>,
    pub ensembl_gene_id: Option<String>,
}

/// A gene entry of genemap2.txt with its phenotypes
#[derive(Debug, Clone, PartialEq)]
pub struct OmimGene {
    pub mim_number: u32,
    pub approved_symbol: Option<String>,
    /// All symbols OMIM lists for the locus
    pub gene_symbols: Vec<String>,
    pub entrez_id: Option<u32>,
    pub ensembl_gene_id: Option<String>,
    pub phenotypes: Vec<OmimPhenotype>,
    /// Union over the phenotypes
    pub inheritance_models: BTreeSet<String>,
}

pub struct OmimParser;

impl OmimParser {
    /// Parse mim2gene.txt keyed by MIM number, keeping gene entries only
    pub fn parse_mim2gene(reader: impl BufRead) -> Result<SourceTable<u32, MimGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "mim2gene", &["mim number", "mim entry type"])?;

        let mim_col = reader.require(&["mim number"])?;
        let type_col = reader.require(&["mim entry type"])?;
        let entrez_col = reader.column("entrez gene id");
        let symbol_col = reader.column("approved gene symbol");
        let ensembl_col = reader.column("ensembl gene id");

        let mut genes = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let entry_type = row.get(type_col).unwrap_or_default();
            if !matches!(entry_type, "gene" | "gene/phenotype") {
                continue;
            }

            let mim_number = match row.parse::<u32>(mim_col, "MIM number") {
                Ok(Some(number)) => number,
                Ok(None) => {
                    reader.skip(row.line, "missing MIM number");
                    continue;
                }
                Err(reason) => {
                    reader.skip(row.line, reason);
                    continue;
                }
            };

            let gene = MimGene {
                mim_number,
                entry_type: entry_type.to_string(),
                entrez_id: entrez_col.and_then(|c| row.get(c)).and_then(|v| v.parse().ok()),
                hgnc_symbol: symbol_col.and_then(|c| row.get(c)).map(str::to_string),
                ensembl_gene_id: ensembl_col.and_then(|c| row.get(c)).map(str::to_string),
            };

            genes.insert(mim_number, gene);
        }

        let skipped = reader.finish();
        info!("Parsed {} mim2gene entries ({} skipped lines)", genes.len(), skipped.len());

        Ok(genes.with_skipped(skipped))
    }

    /// Parse genemap2.txt keyed by MIM number
    pub fn parse_genemap(reader: impl BufRead) -> Result<SourceTable<u32, OmimGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "genemap2", &["mim number", "phenotypes"])?;

        let mim_col = reader.require(&["mim number"])?;
        let phenotypes_col = reader.require(&["phenotypes"])?;
        let approved_col = reader.column_any(&["approved gene symbol", "approved symbol"]);
        let symbols_col = reader.column("gene symbols");
        let entrez_col = reader.column("entrez gene id");
        let ensembl_col = reader.column("ensembl gene id");

        let mut genes = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let mim_number = match row.parse::<u32>(mim_col, "MIM number") {
                Ok(Some(number)) => number,
                Ok(None) => {
                    reader.skip(row.line, "missing MIM number");
                    continue;
                }
                Err(reason) => {
                    reader.skip(row.line, reason);
                    continue;
                }
            };

            let phenotypes: Vec<OmimPhenotype> = row
                .get(phenotypes_col)
                .map(|raw| raw.split(';').filter_map(parse_phenotype).collect())
                .unwrap_or_default();

            let inheritance_models = phenotypes
                .iter()
                .flat_map(|p| p.inheritance_models.iter().cloned())
                .collect();

            let gene = OmimGene {
                mim_number,
                approved_symbol: approved_col.and_then(|c| row.get(c)).map(str::to_string),
                gene_symbols: split_list(symbols_col.and_then(|c| row.get(c)), ','),
                entrez_id: entrez_col.and_then(|c| row.get(c)).and_then(|v| v.parse().ok()),
                ensembl_gene_id: ensembl_col.and_then(|c| row.get(c)).map(str::to_string),
                phenotypes,
                inheritance_models,
            };

            genes.insert(mim_number, gene);
        }

        let skipped = reader.finish();
        info!("Parsed {} genemap2 entries ({} skipped lines)", genes.len(), skipped.len());

        Ok(genes.with_skipped(skipped))
    }
}

/// Decode one genemap2 phenotype entry
///
/// "Description, 615191 (3), Autosomal dominant, X-linked"
/// The "(N)" mapping key separates the description from the inheritance.
pub fn parse_phenotype(entry: &str) -> Option<OmimPhenotype> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let (head, tail) = match find_mapping_key(entry) {
        Some((start, end)) => (entry[..start].trim(), entry[end..].trim()),
        None => (entry, ""),
    };

    let (description, mim_number) = match head.rsplit_once(',') {
        Some((desc, number)) if is_mim_number(number.trim()) => {
            (desc.trim(), number.trim().parse().ok())
        }
        _ => (head, None),
    };

    let inheritance_models = tail
        .split(',')
        .filter_map(|phrase| inheritance_tag(phrase.trim()))
        .map(str::to_string)
        .collect();

    Some(OmimPhenotype {
        mim_number,
        description: description.to_string(),
        inheritance_models,
    })
}

/// Byte range of the last " (N)" mapping key
fn find_mapping_key(entry: &str) -> Option<(usize, usize)> {
    let bytes = entry.as_bytes();
    (0..bytes.len().saturating_sub(2)).rev().find_map(|i| {
        let is_key = bytes[i] == b'('
            && bytes[i + 1].is_ascii_digit()
            && bytes[i + 2] == b')';
        is_key.then_some((i, i + 3))
    })
}

fn is_mim_number(value: &str) -> bool {
    value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit())
}

fn inheritance_tag(phrase: &str) -> Option<&'static str> {
    let phrase = phrase.trim_start_matches('?').to_ascii_lowercase();
    INHERITANCE_MODELS
        .iter()
        .find(|(name, _)| phrase == *name)
        .map(|(_, tag)| *tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_phenotype_entry() {
        let phenotype =
            parse_phenotype("Cortical dysplasia, complex, with other brain malformations 5, 615191 (3), Autosomal dominant").unwrap();
        assert_eq!(phenotype.mim_number, Some(615191));
        assert_eq!(
            phenotype.description,
            "Cortical dysplasia, complex, with other brain malformations 5"
        );
        assert!(phenotype.inheritance_models.contains("AD"));

        let phenotype = parse_phenotype(" Hypotrichosis (2), X-linked, Autosomal recessive").unwrap();
        assert_eq!(phenotype.mim_number, None);
        assert_eq!(phenotype.description, "Hypotrichosis");
        assert_eq!(phenotype.inheritance_models.len(), 2);
        assert!(phenotype.inheritance_models.contains("X"));
        assert!(phenotype.inheritance_models.contains("AR"));

        assert!(parse_phenotype("  ").is_none());
    }

    #[test]
    fn test_parse_mim2gene() {
        let data = "# Copyright (c) 1966-2019 Johns Hopkins University\n\
                    # Generated: 2019-05-21\n\
                    # MIM Number\tMIM Entry Type (see FAQ 1.3 at https://omim.org/help/faq)\tEntrez Gene ID (NCBI)\tApproved Gene Symbol (HGNC)\tEnsembl Gene ID (Ensembl)\n\
                    100050\tpredominantly phenotypes\t\t\t\n\
                    100640\tgene\t216\tALDH1A1\tENSG00000165092\n\
                    100650\tgene/phenotype\t217\tALDH2\tENSG00000111275\n\
                    10066x\tgene\t218\tALDH3A1\tENSG00000108602\n";

        let genes = OmimParser::parse_mim2gene(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 2);
        assert_eq!(genes.skipped().len(), 1);

        let gene = genes.get(&100640).unwrap();
        assert_eq!(gene.hgnc_symbol.as_deref(), Some("ALDH1A1"));
        assert_eq!(gene.entrez_id, Some(216));
        assert!(!genes.contains_key(&100050));
    }

    #[test]
    fn test_parse_genemap() {
        let data = "# Copyright (c) 1966-2019 Johns Hopkins University\n\
                    # Chromosome\tGenomic Position Start\tGenomic Position End\tCyto Location\tComputed Cyto Location\tMIM Number\tGene Symbols\tGene Name\tApproved Symbol\tEntrez Gene ID\tEnsembl Gene ID\tComments\tPhenotypes\tMouse Gene Symbol/ID\n\
                    chr1\t1\t2300000\t1p36\t\t607413\tOR4F29\tOlfactory receptor\tOR4F29\t729759\tENSG00000284662\t\t\t\n\
                    chr1\t1167628\t1170420\t1p36.33\t\t615291\tB3GALT6, SEMDJL1, EDSP2\tBeta-1,3-galactosyltransferase 6\tB3GALT6\t126792\tENSG00000176022\t\tEhlers-Danlos syndrome, progeroid type, 2, 615349 (3), Autosomal recessive; Spondyloepimetaphyseal dysplasia with joint laxity, type 1, with or without fractures, 271640 (3), Autosomal recessive\tB3galt6 (MGI:2152819)\n";

        let genes = OmimParser::parse_genemap(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 2);

        let gene = genes.get(&615291).unwrap();
        assert_eq!(gene.approved_symbol.as_deref(), Some("B3GALT6"));
        assert_eq!(gene.gene_symbols, vec!["B3GALT6", "SEMDJL1", "EDSP2"]);
        assert_eq!(gene.phenotypes.len(), 2);
        assert_eq!(gene.phenotypes[0].mim_number, Some(615349));
        assert_eq!(gene.phenotypes[1].mim_number, Some(271640));
        assert_eq!(gene.inheritance_models.iter().collect::<Vec<_>>(), vec!["AR"]);

        assert!(genes.get(&607413).unwrap().phenotypes.is_empty());
    }
}
