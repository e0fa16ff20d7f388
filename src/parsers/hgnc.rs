// ==============================================================================
// parsers/hgnc.rs - HGNC Complete Set Parser
// ==============================================================================
// Description: Parser for the HGNC gene dump (authoritative gene identity)
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-18
// Version: 1.0.0
// ==============================================================================
// Format: Tab-delimited with header
// Example:
//   hgnc_id    symbol    name    location    alias_symbol    prev_symbol ...
//   HGNC:5     A1BG      alpha-1-B glycoprotein    19q13.43 ...
// Multi-valued fields are pipe separated and may be quoted ("A1B|ABG")
// ==============================================================================

use std::io::BufRead;
use tracing::info;

use crate::error::LoadError;
use crate::parsers::tabular::{parse_prefixed_id, split_list, SourceTable, TabularReader};

/// One gene from the HGNC dump
#[derive(Debug, Clone, PartialEq)]
pub struct HgncGene {
    pub hgnc_id: u32,
    pub symbol: String,
    pub description: Option<String>,
    /// Cytoband (e.g., "19q13.43")
    pub location: Option<String>,
    /// Alias and previous symbols
    pub aliases: Vec<String>,
    pub previous_symbols: Vec<String>,
    pub entrez_id: Option<u32>,
    pub ensembl_gene_id: Option<String>,
    pub omim_id: Option<u32>,
    pub ucsc_id: Option<String>,
    pub vega_id: Option<String>,
    pub uniprot_ids: Vec<String>,
    /// RefSeq accessions of the primary transcripts
    pub refseq_accessions: Vec<String>,
}

pub struct HgncParser;

impl HgncParser {
    /// Parse the HGNC dump keyed by hgnc_id
    ///
    /// Repeated hgnc_ids are kept in `duplicates()` so the linker can refuse
    /// an ambiguous gene identity.
    pub fn parse(reader: impl BufRead) -> Result<SourceTable<u32, HgncGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "hgnc", &["hgnc_id", "symbol"])?;

        let hgnc_col = reader.require(&["hgnc_id"])?;
        let symbol_col = reader.require(&["symbol"])?;
        let name_col = reader.column("name");
        let location_col = reader.column("location");
        let alias_col = reader.column("alias_symbol");
        let prev_col = reader.column("prev_symbol");
        let entrez_col = reader.column("entrez_id");
        let ensembl_col = reader.column("ensembl_gene_id");
        let omim_col = reader.column("omim_id");
        let ucsc_col = reader.column("ucsc_id");
        let vega_col = reader.column("vega_id");
        let uniprot_col = reader.column("uniprot_ids");
        let refseq_col = reader.column("refseq_accession");

        let mut genes = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let hgnc_id = match row.get(hgnc_col).and_then(parse_prefixed_id) {
                Some(id) => id,
                None => {
                    reader.skip(row.line, "missing or non-numeric hgnc_id");
                    continue;
                }
            };
            let symbol = match row.get(symbol_col) {
                Some(symbol) => symbol.to_string(),
                None => {
                    reader.skip(row.line, "missing symbol");
                    continue;
                }
            };

            let field = |col: Option<usize>| col.and_then(|c| row.get(c)).map(str::to_string);
            let list = |col: Option<usize>| split_list(col.and_then(|c| row.get(c)), '|');

            let previous_symbols = list(prev_col);
            let mut aliases = list(alias_col);
            aliases.extend(previous_symbols.iter().cloned());

            let entrez_id = match entrez_col.map(|c| row.parse::<u32>(c, "entrez_id")) {
                Some(Err(reason)) => {
                    reader.skip(row.line, reason);
                    continue;
                }
                Some(Ok(id)) => id,
                None => None,
            };

            // omim_id may list several numbers; the first is the gene entry
            let omim_id = list(omim_col).iter().find_map(|id| id.parse().ok());

            let gene = HgncGene {
                hgnc_id,
                symbol,
                description: field(name_col),
                location: field(location_col),
                aliases,
                previous_symbols,
                entrez_id,
                ensembl_gene_id: field(ensembl_col),
                omim_id,
                ucsc_id: field(ucsc_col),
                vega_id: field(vega_col),
                uniprot_ids: list(uniprot_col),
                refseq_accessions: list(refseq_col),
            };

            genes.insert(hgnc_id, gene);
        }

        let skipped = reader.finish();
        info!(
            "Parsed {} HGNC genes ({} skipped lines, {} repeated ids)",
            genes.len(),
            skipped.len(),
            genes.duplicates().len()
        );

        Ok(genes.with_skipped(skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HGNC_HEADER: &str = "hgnc_id\tsymbol\tname\tlocation\talias_symbol\tprev_symbol\tentrez_id\tensembl_gene_id\tomim_id\tucsc_id\tvega_id\tuniprot_ids\trefseq_accession\n";

    #[test]
    fn test_parse_hgnc_line() {
        let data = format!(
            "{}HGNC:5\tA1BG\talpha-1-B glycoprotein\t19q13.43\t\t\t1\tENSG00000121410\t138670\tuc002qsd.5\tOTTHUMG00000183507\tP04217\tNM_130786\n\
             HGNC:37133\tA1BG-AS1\tA1BG antisense RNA 1\t19q13.43\t\"FLJ23569\"\t\"NCRNA00181|A1BGAS\"\t503538\tENSG00000268895\t\t\t\t\tNR_015380\n",
            HGNC_HEADER
        );

        let genes = HgncParser::parse(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 2);

        let a1bg = genes.get(&5).unwrap();
        assert_eq!(a1bg.symbol, "A1BG");
        assert_eq!(a1bg.description.as_deref(), Some("alpha-1-B glycoprotein"));
        assert_eq!(a1bg.omim_id, Some(138670));
        assert_eq!(a1bg.entrez_id, Some(1));
        assert_eq!(a1bg.refseq_accessions, vec!["NM_130786"]);
        assert!(a1bg.aliases.is_empty());

        let antisense = genes.get(&37133).unwrap();
        assert_eq!(antisense.aliases, vec!["FLJ23569", "NCRNA00181", "A1BGAS"]);
        assert_eq!(antisense.previous_symbols, vec!["NCRNA00181", "A1BGAS"]);
        assert_eq!(antisense.omim_id, None);
    }

    #[test]
    fn test_skips_bad_lines() {
        let data = format!(
            "{}HGNC:x\tBAD\t\t\t\t\t\t\t\t\t\t\t\n\
             HGNC:5\tA1BG\t\t\t\t\tnot_a_number\t\t\t\t\t\t\n\
             HGNC:7\tA2M\t\t\t\t\t2\t\t\t\t\t\t\n\
             HGNC:8\ttoo_short\n",
            HGNC_HEADER
        );

        let genes = HgncParser::parse(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 1);
        assert!(genes.contains_key(&7));
        assert_eq!(genes.skipped().len(), 3);
    }

    #[test]
    fn test_duplicates_recorded() {
        let data = format!(
            "{}HGNC:5\tA1BG\t\t\t\t\t\t\t\t\t\t\t\nHGNC:5\tA1BG2\t\t\t\t\t\t\t\t\t\t\t\n",
            HGNC_HEADER
        );
        let genes = HgncParser::parse(data.as_bytes()).unwrap();
        assert_eq!(genes.duplicates(), &[5]);
        assert_eq!(genes.get(&5).unwrap().symbol, "A1BG");
    }

    #[test]
    fn test_missing_header() {
        let data = "HGNC:5\tA1BG\n";
        assert!(matches!(
            HgncParser::parse(data.as_bytes()),
            Err(LoadError::MalformedSource { .. })
        ));
    }
}
