// ==============================================================================
// parsers/hpo.rs - Human Phenotype Ontology Annotation Parsers
// ==============================================================================
// Description: Parsers for HPO gene, phenotype and disease association files
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-11-20
// Version: 1.1.0
// ==============================================================================
// Files:
//   genes_to_phenotype.txt  ncbi_gene_id  gene_symbol  hpo_id  hpo_name ...
//   phenotype_to_genes.txt  hpo_id  hpo_name  ncbi_gene_id  gene_symbol ...
//   phenotype.hpoa          database_id  disease_name  qualifier  hpo_id ...
// Every file repeats its key once per association; rows are aggregated.
// ==============================================================================

use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::info;

use crate::error::LoadError;
use crate::parsers::tabular::{SourceTable, TabularReader};

/// HPO term marking incomplete penetrance
pub const INCOMPLETE_PENETRANCE: &str = "HP:0003829";

/// Phenotype associations of one gene
#[derive(Debug, Clone, PartialEq)]
pub struct HpoGene {
    pub symbol: String,
    pub entrez_id: Option<u32>,
    pub hpo_terms: BTreeSet<String>,
    pub incomplete_penetrance: bool,
}

/// One HPO term with the genes annotated to it
#[derive(Debug, Clone, PartialEq)]
pub struct HpoTerm {
    pub hpo_id: String,
    pub description: String,
    /// Gene symbols
    pub genes: BTreeSet<String>,
}

/// A disease (OMIM, ORPHA, DECIPHER) with its phenotypes
#[derive(Debug, Clone, PartialEq)]
pub struct HpoDisease {
    /// e.g. "OMIM:614300"
    pub disease_id: String,
    pub source: String,
    pub disease_nr: u32,
    pub description: Option<String>,
    pub hpo_terms: BTreeSet<String>,
}

pub struct HpoParser;

impl HpoParser {
    /// Parse gene to phenotype associations keyed by gene symbol
    pub fn parse_genes(reader: impl BufRead) -> Result<SourceTable<String, HpoGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "hpo genes", &["gene_symbol", "hpo_id"])?;

        let symbol_col = reader.require(&["gene_symbol"])?;
        let hpo_col = reader.require(&["hpo_id"])?;
        let entrez_col = reader.column("ncbi_gene_id");

        let mut genes: SourceTable<String, HpoGene> = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let (symbol, hpo_id) = match (row.get(symbol_col), row.get(hpo_col)) {
                (Some(symbol), Some(hpo_id)) => (symbol.to_string(), hpo_id.to_string()),
                _ => {
                    reader.skip(row.line, "missing gene symbol or HPO id");
                    continue;
                }
            };

            let gene = genes.entry_or_insert_with(symbol.clone(), || HpoGene {
                symbol,
                entrez_id: entrez_col.and_then(|c| row.get(c)).and_then(|v| v.parse().ok()),
                hpo_terms: BTreeSet::new(),
                incomplete_penetrance: false,
            });

            if hpo_id == INCOMPLETE_PENETRANCE {
                gene.incomplete_penetrance = true;
            }
            gene.hpo_terms.insert(hpo_id);
        }

        let skipped = reader.finish();
        info!("Parsed {} HPO genes ({} skipped lines)", genes.len(), skipped.len());

        Ok(genes.with_skipped(skipped))
    }

    /// Parse phenotype to gene associations keyed by HPO id
    pub fn parse_terms(reader: impl BufRead) -> Result<SourceTable<String, HpoTerm>, LoadError> {
        let mut reader = TabularReader::open(reader, "hpo terms", &["hpo_id", "hpo_name"])?;

        let hpo_col = reader.require(&["hpo_id"])?;
        let name_col = reader.require(&["hpo_name"])?;
        let symbol_col = reader.column("gene_symbol");

        let mut terms: SourceTable<String, HpoTerm> = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let (hpo_id, description) = match (row.get(hpo_col), row.get(name_col)) {
                (Some(id), Some(name)) if id.starts_with("HP:") => (id.to_string(), name.to_string()),
                _ => {
                    reader.skip(row.line, "missing or invalid HPO term");
                    continue;
                }
            };

            let term = terms.entry_or_insert_with(hpo_id.clone(), || HpoTerm {
                hpo_id,
                description,
                genes: BTreeSet::new(),
            });

            if let Some(symbol) = symbol_col.and_then(|c| row.get(c)) {
                term.genes.insert(symbol.to_string());
            }
        }

        let skipped = reader.finish();
        info!("Parsed {} HPO terms ({} skipped lines)", terms.len(), skipped.len());

        Ok(terms.with_skipped(skipped))
    }

    /// Parse disease annotations (phenotype.hpoa) keyed by disease id
    ///
    /// Rows qualified with NOT exclude a phenotype and are ignored.
    pub fn parse_diseases(reader: impl BufRead) -> Result<SourceTable<String, HpoDisease>, LoadError> {
        let mut reader = TabularReader::open(reader, "hpo diseases", &["hpo_id"])?;

        let disease_col = reader.require(&["database_id", "databaseid"])?;
        let hpo_col = reader.require(&["hpo_id"])?;
        let name_col = reader.column_any(&["disease_name", "diseasename"]);
        let qualifier_col = reader.column("qualifier");

        let mut diseases: SourceTable<String, HpoDisease> = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            if qualifier_col.and_then(|c| row.get(c)) == Some("NOT") {
                continue;
            }

            let disease_id = match row.get(disease_col) {
                Some(id) => id.to_string(),
                None => {
                    reader.skip(row.line, "missing disease id");
                    continue;
                }
            };
            let (source, disease_nr) = match split_disease_id(&disease_id) {
                Some(parts) => parts,
                None => {
                    reader.skip(row.line, format!("invalid disease id '{}'", disease_id));
                    continue;
                }
            };

            let disease = diseases.entry_or_insert_with(disease_id.clone(), || HpoDisease {
                disease_id,
                source,
                disease_nr,
                description: name_col.and_then(|c| row.get(c)).map(str::to_string),
                hpo_terms: BTreeSet::new(),
            });

            if let Some(hpo_id) = row.get(hpo_col) {
                disease.hpo_terms.insert(hpo_id.to_string());
            }
        }

        let skipped = reader.finish();
        info!("Parsed {} HPO diseases ({} skipped lines)", diseases.len(), skipped.len());

        Ok(diseases.with_skipped(skipped))
    }
}

/// "OMIM:614300" -> ("OMIM", 614300)
fn split_disease_id(disease_id: &str) -> Option<(String, u32)> {
    let (source, number) = disease_id.split_once(':')?;
    let number = number.trim().parse().ok()?;
    Some((source.trim().to_string(), number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genes_aggregates_terms() {
        let data = "ncbi_gene_id\tgene_symbol\thpo_id\thpo_name\tfrequency\tdisease_id\n\
                    8192\tCLPP\tHP:0000013\tHypoplasia of the uterus\t-\tOMIM:614129\n\
                    8192\tCLPP\tHP:0003829\tTypified by incomplete penetrance\t-\tOMIM:614129\n\
                    2\tA2M\tHP:0001300\tParkinsonism\t-\tOMIM:104300\n\
                    3\t\tHP:0001300\tParkinsonism\t-\tOMIM:104300\n";

        let genes = HpoParser::parse_genes(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 2);
        assert_eq!(genes.skipped().len(), 1);

        let clpp = genes.get(&"CLPP".to_string()).unwrap();
        assert_eq!(clpp.hpo_terms.len(), 2);
        assert!(clpp.incomplete_penetrance);
        assert_eq!(clpp.entrez_id, Some(8192));

        assert!(!genes.get(&"A2M".to_string()).unwrap().incomplete_penetrance);
    }

    #[test]
    fn test_parse_terms() {
        let data = "hpo_id\thpo_name\tncbi_gene_id\tgene_symbol\tdisease_id\n\
                    HP:0000002\tAbnormality of body height\t2\tA2M\tOMIM:104300\n\
                    HP:0000002\tAbnormality of body height\t8192\tCLPP\tOMIM:614129\n\
                    nonsense\tdescription\t1\tX\tOMIM:1\n";

        let terms = HpoParser::parse_terms(data.as_bytes()).unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms.skipped().len(), 1);

        let term = terms.get(&"HP:0000002".to_string()).unwrap();
        assert_eq!(term.description, "Abnormality of body height");
        assert_eq!(term.genes.len(), 2);
    }

    #[test]
    fn test_parse_diseases() {
        let data = "#description: \"HPO annotations for rare diseases\"\n\
                    #date: 2023-04-05\n\
                    database_id\tdisease_name\tqualifier\thpo_id\treference\tevidence\n\
                    OMIM:614300\tCortical dysplasia\t\tHP:0002187\tOMIM:614300\tTAS\n\
                    OMIM:614300\tCortical dysplasia\tNOT\tHP:0000001\tOMIM:614300\tTAS\n\
                    OMIM:614300\tCortical dysplasia\t\tHP:0001250\tOMIM:614300\tTAS\n\
                    ORPHA:166035\tBrachydactyly\t\tHP:0001156\tORPHA:166035\tTAS\n\
                    BROKEN\tNo number\t\tHP:0001156\tx\tTAS\n";

        let diseases = HpoParser::parse_diseases(data.as_bytes()).unwrap();
        assert_eq!(diseases.len(), 2);
        assert_eq!(diseases.skipped().len(), 1);

        let disease = diseases.get(&"OMIM:614300".to_string()).unwrap();
        assert_eq!(disease.source, "OMIM");
        assert_eq!(disease.disease_nr, 614300);
        assert_eq!(disease.hpo_terms.len(), 2);
        assert!(!disease.hpo_terms.contains("HP:0000001"));
        assert_eq!(disease.description.as_deref(), Some("Cortical dysplasia"));
    }
}
