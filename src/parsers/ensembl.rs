// ==============================================================================
// parsers/ensembl.rs - Ensembl Biomart Export Parser
// ==============================================================================
// Description: Parser for Ensembl gene and transcript biomart exports
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-19
// Version: 1.1.0
// ==============================================================================
// Format: Tab-delimited with header. Both header generations are accepted:
//   Chromosome Name            | Chromosome/scaffold name
//   Ensembl Gene ID            | Gene stable ID
//   Ensembl Transcript ID      | Transcript stable ID
//   RefSeq mRNA [e.g. NM_...]  | RefSeq mRNA ID
// Transcript exports repeat a transcript once per RefSeq id.
// ==============================================================================

use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::info;

use crate::error::LoadError;
use crate::parsers::tabular::{parse_prefixed_id, Row, SourceTable, TabularReader};

const CHROMOSOME: &[&str] = &["chromosome/scaffold name", "chromosome name"];
const GENE_ID: &[&str] = &["gene stable id", "ensembl gene id"];
const TRANSCRIPT_ID: &[&str] = &["transcript stable id", "ensembl transcript id"];
const REFSEQ_MRNA: &[&str] = &["refseq mrna id", "refseq mrna ["];
const REFSEQ_MRNA_PREDICTED: &[&str] = &["refseq mrna predicted id", "refseq mrna predicted ["];
const REFSEQ_NCRNA: &[&str] = &["refseq ncrna id", "refseq ncrna ["];

/// Gene coordinates from Ensembl (build specific)
#[derive(Debug, Clone, PartialEq)]
pub struct EnsemblGene {
    pub ensembl_gene_id: String,
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub hgnc_symbol: Option<String>,
    pub hgnc_id: Option<u32>,
}

/// Transcript coordinates and RefSeq ids from Ensembl
#[derive(Debug, Clone, PartialEq)]
pub struct EnsemblTranscript {
    pub ensembl_gene_id: String,
    pub ensembl_transcript_id: String,
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
    pub refseq_mrna: Option<String>,
    pub refseq_mrna_predicted: Option<String>,
    pub refseq_ncrna: Option<String>,
    pub refseq_identifiers: BTreeSet<String>,
}

pub struct EnsemblParser;

impl EnsemblParser {
    /// Parse a biomart gene export keyed by Ensembl gene id
    pub fn parse_genes(reader: impl BufRead) -> Result<SourceTable<String, EnsemblGene>, LoadError> {
        let mut reader = TabularReader::open(reader, "ensembl genes", &["gene start (bp)", "gene end (bp)"])?;

        let chrom_col = reader.require(CHROMOSOME)?;
        let gene_col = reader.require(GENE_ID)?;
        let start_col = reader.require(&["gene start (bp)"])?;
        let end_col = reader.require(&["gene end (bp)"])?;
        let symbol_col = reader.column("hgnc symbol");
        let hgnc_col = reader.column("hgnc id");

        let mut genes = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let (gene_id, chromosome, start, end) =
                match Self::coordinates(&row, gene_col, chrom_col, start_col, end_col) {
                    Ok(fields) => fields,
                    Err(reason) => {
                        reader.skip(row.line, reason);
                        continue;
                    }
                };

            let gene = EnsemblGene {
                ensembl_gene_id: gene_id.clone(),
                chromosome,
                start,
                end,
                hgnc_symbol: symbol_col.and_then(|c| row.get(c)).map(str::to_string),
                hgnc_id: hgnc_col.and_then(|c| row.get(c)).and_then(parse_prefixed_id),
            };

            genes.insert(gene_id, gene);
        }

        let skipped = reader.finish();
        info!("Parsed {} Ensembl genes ({} skipped lines)", genes.len(), skipped.len());

        Ok(genes.with_skipped(skipped))
    }

    /// Parse a biomart transcript export keyed by Ensembl transcript id
    pub fn parse_transcripts(
        reader: impl BufRead,
    ) -> Result<SourceTable<String, EnsemblTranscript>, LoadError> {
        let mut reader = TabularReader::open(
            reader,
            "ensembl transcripts",
            &["transcript start (bp)", "transcript end (bp)"],
        )?;

        let chrom_col = reader.require(CHROMOSOME)?;
        let gene_col = reader.require(GENE_ID)?;
        let tx_col = reader.require(TRANSCRIPT_ID)?;
        let start_col = reader.require(&["transcript start (bp)"])?;
        let end_col = reader.require(&["transcript end (bp)"])?;
        let mrna_col = reader.column_any(REFSEQ_MRNA);
        let predicted_col = reader.column_any(REFSEQ_MRNA_PREDICTED);
        let ncrna_col = reader.column_any(REFSEQ_NCRNA);

        let mut transcripts: SourceTable<String, EnsemblTranscript> = SourceTable::new();

        while let Some(row) = reader.next_row()? {
            let (gene_id, chromosome, start, end) =
                match Self::coordinates(&row, gene_col, chrom_col, start_col, end_col) {
                    Ok(fields) => fields,
                    Err(reason) => {
                        reader.skip(row.line, reason);
                        continue;
                    }
                };
            let tx_id = match row.get(tx_col) {
                Some(id) => id.to_string(),
                None => {
                    reader.skip(row.line, "missing transcript id");
                    continue;
                }
            };

            let transcript = transcripts.entry_or_insert_with(tx_id.clone(), || EnsemblTranscript {
                ensembl_gene_id: gene_id,
                ensembl_transcript_id: tx_id,
                chromosome,
                start,
                end,
                refseq_mrna: None,
                refseq_mrna_predicted: None,
                refseq_ncrna: None,
                refseq_identifiers: BTreeSet::new(),
            });

            let refseq = |col: Option<usize>| col.and_then(|c| row.get(c)).map(str::to_string);
            for (slot, value) in [
                (&mut transcript.refseq_mrna, refseq(mrna_col)),
                (&mut transcript.refseq_mrna_predicted, refseq(predicted_col)),
                (&mut transcript.refseq_ncrna, refseq(ncrna_col)),
            ] {
                if let Some(value) = value {
                    transcript.refseq_identifiers.insert(value.clone());
                    slot.get_or_insert(value);
                }
            }
        }

        let skipped = reader.finish();
        info!(
            "Parsed {} Ensembl transcripts ({} skipped lines)",
            transcripts.len(),
            skipped.len()
        );

        Ok(transcripts.with_skipped(skipped))
    }

    fn coordinates(
        row: &Row,
        gene_col: usize,
        chrom_col: usize,
        start_col: usize,
        end_col: usize,
    ) -> Result<(String, String, u64, u64), String> {
        let gene_id = row.get(gene_col).ok_or("missing Ensembl gene id")?;
        let chromosome = row.get(chrom_col).ok_or("missing chromosome")?;
        let start = row.parse::<u64>(start_col, "start")?.ok_or("missing start")?;
        let end = row.parse::<u64>(end_col, "end")?.ok_or("missing end")?;

        Ok((gene_id.to_string(), chromosome.to_string(), start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_genes_new_header() {
        let data = "Chromosome/scaffold name\tGene stable ID\tGene start (bp)\tGene end (bp)\tHGNC symbol\tHGNC ID\n\
                    1\tENSG00000176022\t1167629\t1170421\tB3GALT6\tHGNC:17978\n\
                    1\tENSG00000000001\tabc\t100\tBAD\tHGNC:1\n";

        let genes = EnsemblParser::parse_genes(data.as_bytes()).unwrap();
        assert_eq!(genes.len(), 1);
        assert_eq!(genes.skipped().len(), 1);

        let gene = genes.get(&"ENSG00000176022".to_string()).unwrap();
        assert_eq!(gene.chromosome, "1");
        assert_eq!(gene.start, 1167629);
        assert_eq!(gene.hgnc_id, Some(17978));
        assert_eq!(gene.hgnc_symbol.as_deref(), Some("B3GALT6"));
    }

    #[test]
    fn test_parse_genes_old_header() {
        let data = "Chromosome Name\tGene Start (bp)\tGene End (bp)\tEnsembl Gene ID\tHGNC symbol\tHGNC ID(s)\n\
                    X\t100\t200\tENSG1\tAAA\t1\n";

        let genes = EnsemblParser::parse_genes(data.as_bytes()).unwrap();
        let gene = genes.get(&"ENSG1".to_string()).unwrap();
        assert_eq!(gene.chromosome, "X");
        assert_eq!(gene.end, 200);
        assert_eq!(gene.hgnc_id, Some(1));
    }

    #[test]
    fn test_parse_transcripts_aggregates_refseq() {
        let data = "Chromosome/scaffold name\tGene stable ID\tTranscript stable ID\tTranscript start (bp)\tTranscript end (bp)\tRefSeq mRNA ID\tRefSeq mRNA predicted ID\tRefSeq ncRNA ID\n\
                    1\tENSG00000176022\tENST00000379198\t1167629\t1170421\tNM_080605\t\t\n\
                    1\tENSG00000176022\tENST00000379198\t1167629\t1170421\tNM_999999\tXM_1\t\n\
                    1\tENSG00000176022\tENST00000480000\t1167700\t1169000\t\t\t\n";

        let transcripts = EnsemblParser::parse_transcripts(data.as_bytes()).unwrap();
        assert_eq!(transcripts.len(), 2);

        let tx = transcripts.get(&"ENST00000379198".to_string()).unwrap();
        assert_eq!(tx.refseq_mrna.as_deref(), Some("NM_080605"));
        assert_eq!(tx.refseq_mrna_predicted.as_deref(), Some("XM_1"));
        assert_eq!(tx.refseq_ncrna, None);
        assert_eq!(tx.refseq_identifiers.len(), 3);

        let bare = transcripts.get(&"ENST00000480000".to_string()).unwrap();
        assert!(bare.refseq_identifiers.is_empty());
    }
}
