// ==============================================================================
// loader.rs - Bulk Loader
// ==============================================================================
// Description: Filters, batches and upserts canonical entities into the store
// Author: Matt Barham
// Created: 2025-11-19
// Modified: 2025-11-21
// Version: 1.1.0
// ==============================================================================
// - Variants are filtered on category and rank_score >= threshold before
//   they reach the store; dropped variants are never written
// - Every entity is upserted under its deterministic id, so re-running a
//   load replaces documents in place
// - Transient store failures (busy/locked) are retried a bounded number of
//   times; a retried batch is safe because upserts are idempotent
// ==============================================================================

use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::builder::{
    Document, CASE_COLLECTION, GENE_COLLECTION, TRANSCRIPT_COLLECTION, VARIANT_COLLECTION,
};
use crate::error::LoadError;
use crate::models::{
    Case, Category, DiseaseTermRecord, GeneRecord, HpoTermRecord, TranscriptRecord, Variant,
    VariantFilter, VariantType,
};
use crate::store::{Store, StoreError};

pub const DEFAULT_BATCH_SIZE: usize = 5000;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Counts of one bulk load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Entities handed to the loader
    pub seen: usize,
    /// Entities upserted
    pub loaded: usize,
    /// Entities dropped by category or rank filters
    pub filtered: usize,
}

pub struct BulkLoader<S: Store> {
    store: S,
    batch_size: usize,
}

impl<S: Store> BulkLoader<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Indexes used by symbol/id resolution and case reloads
    pub fn ensure_indexes(&mut self) -> Result<(), LoadError> {
        let indexes: [(&str, &[&str]); 4] = [
            (GENE_COLLECTION, &["build", "symbol"]),
            (GENE_COLLECTION, &["build", "hgnc_id"]),
            (TRANSCRIPT_COLLECTION, &["build", "hgnc_id"]),
            (VARIANT_COLLECTION, &["case_id", "variant_type", "category"]),
        ];

        for (collection, fields) in indexes {
            with_retry(|| self.store.create_index(collection, fields))?;
        }
        info!("Store indexes ensured");
        Ok(())
    }

    pub fn load_genes(
        &mut self,
        genes: impl IntoIterator<Item = GeneRecord>,
    ) -> Result<LoadSummary, LoadError> {
        self.load_documents(genes)
    }

    pub fn load_transcripts(
        &mut self,
        transcripts: impl IntoIterator<Item = TranscriptRecord>,
    ) -> Result<LoadSummary, LoadError> {
        self.load_documents(transcripts)
    }

    pub fn load_hpo_terms(
        &mut self,
        terms: impl IntoIterator<Item = HpoTermRecord>,
    ) -> Result<LoadSummary, LoadError> {
        self.load_documents(terms)
    }

    pub fn load_disease_terms(
        &mut self,
        terms: impl IntoIterator<Item = DiseaseTermRecord>,
    ) -> Result<LoadSummary, LoadError> {
        self.load_documents(terms)
    }

    pub fn load_case(&mut self, case: &Case) -> Result<(), LoadError> {
        let body = serde_json::to_value(case).map_err(StoreError::from)?;
        let id = case.document_id();
        with_retry(|| self.store.upsert(CASE_COLLECTION, &id, &body))?;
        info!("Case {} stored", case.case_id);
        Ok(())
    }

    /// Upsert variants that pass `filter`, in batches
    pub fn load_variants(
        &mut self,
        variants: impl IntoIterator<Item = Variant>,
        filter: &VariantFilter,
    ) -> Result<LoadSummary, LoadError> {
        let mut summary = LoadSummary::default();
        let mut batch: Vec<(String, Value)> = Vec::with_capacity(self.batch_size);

        for variant in variants {
            summary.seen += 1;
            if !filter.passes_category(variant.category) || !filter.passes_rank(variant.rank_score) {
                summary.filtered += 1;
                continue;
            }

            batch.push(to_entry(&variant)?);
            if batch.len() >= self.batch_size {
                summary.loaded += self.flush(VARIANT_COLLECTION, &mut batch)?;
            }
        }
        summary.loaded += self.flush(VARIANT_COLLECTION, &mut batch)?;

        info!(
            "Loaded {} {} variants ({} seen, {} below rank {} or other category)",
            summary.loaded,
            filter.category.as_str(),
            summary.seen,
            summary.filtered,
            filter.rank_threshold
        );
        Ok(summary)
    }

    /// Remove the variants of one load track of a case
    pub fn delete_variants(
        &mut self,
        case_id: &str,
        variant_type: VariantType,
        category: Category,
    ) -> Result<usize, LoadError> {
        let query = [
            ("case_id", json!(case_id)),
            ("variant_type", json!(variant_type.as_str())),
            ("category", json!(category.as_str())),
        ];
        let deleted = with_retry(|| self.store.delete_many(VARIANT_COLLECTION, &query))?;
        info!(
            "Deleted {} {} {} variants of case {}",
            deleted,
            variant_type.as_str(),
            category.as_str(),
            case_id
        );
        Ok(deleted)
    }

    /// Remove a case together with all of its variants
    pub fn delete_case(&mut self, case_id: &str) -> Result<usize, LoadError> {
        let variants =
            with_retry(|| self.store.delete_many(VARIANT_COLLECTION, &[("case_id", json!(case_id))]))?;
        let cases =
            with_retry(|| self.store.delete_many(CASE_COLLECTION, &[("case_id", json!(case_id))]))?;
        info!("Deleted case {} ({} variants)", case_id, variants);
        Ok(cases + variants)
    }

    fn load_documents<D: Document>(
        &mut self,
        documents: impl IntoIterator<Item = D>,
    ) -> Result<LoadSummary, LoadError> {
        let mut summary = LoadSummary::default();
        let mut batch: Vec<(String, Value)> = Vec::with_capacity(self.batch_size);

        for document in documents {
            summary.seen += 1;
            batch.push(to_entry(&document)?);
            if batch.len() >= self.batch_size {
                summary.loaded += self.flush(D::collection(), &mut batch)?;
            }
        }
        summary.loaded += self.flush(D::collection(), &mut batch)?;

        info!("Loaded {} documents into {}", summary.loaded, D::collection());
        Ok(summary)
    }

    fn flush(&mut self, collection: &str, batch: &mut Vec<(String, Value)>) -> Result<usize, LoadError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let size = batch.len();
        with_retry(|| self.store.upsert_many(collection, &batch[..]))?;
        debug!("Flushed {} documents into {}", size, collection);
        batch.clear();
        Ok(size)
    }
}

fn to_entry<D: Document>(document: &D) -> Result<(String, Value), LoadError> {
    let body = serde_json::to_value(document).map_err(StoreError::from)?;
    Ok((document.document_id(), body))
}

fn with_retry<T>(mut operation: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
    let mut attempt = 0;
    loop {
        match operation() {
            Err(err) if err.is_transient() && attempt < MAX_RETRIES => {
                attempt += 1;
                warn!("Transient store failure (attempt {}/{}): {}", attempt, MAX_RETRIES, err);
                thread::sleep(RETRY_DELAY * attempt);
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::VariantBuilder;
    use crate::link::{GeneIndex, LinkedGenes};
    use crate::models::{Build, Individual, Phenotype, Sex, VcfFiles};
    use crate::parsers::variant::VariantParser;
    use crate::parsers::vcf::VcfReader;
    use crate::store::SqliteStore;
    use chrono::Utc;
    use std::cell::Cell;

    const VCF: &str = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tADM1059A1\n\
        1\t880086\t.\tT\tC\t50\tPASS\tRankScore=clinical:7.5\tGT\t0/1\n\
        1\t880200\t.\tA\tG\t50\tPASS\tRankScore=clinical:12\tGT\t0/1\n\
        1\t880300\t.\tG\tT\t50\tPASS\tRankScore=clinical:10\tGT\t1/1\n";

    fn test_case() -> Case {
        Case {
            case_id: "cust000-643594".to_string(),
            display_name: "643594".to_string(),
            owner: "cust000".to_string(),
            collaborators: vec!["cust000".to_string()],
            individuals: vec![Individual {
                individual_id: "ADM1059A1".to_string(),
                display_name: "ADM1059A1".to_string(),
                sex: Sex::Male,
                phenotype: Phenotype::Affected,
                paternal_id: "0".to_string(),
                maternal_id: "0".to_string(),
                capture_kits: Vec::new(),
            }],
            analysis_date: Utc::now(),
            gene_panels: Vec::new(),
            is_research: false,
            genome_build: Build::Grch37,
            rank_score_threshold: 10.0,
            rank_model_version: None,
            vcf_files: VcfFiles::default(),
            track: "rare".to_string(),
        }
    }

    fn variants(case: &Case) -> Vec<Variant> {
        let reader = VcfReader::new(VCF.as_bytes()).unwrap();
        let positions = reader.header().individual_positions();
        let parser = VariantParser::new(case, &positions, VariantType::Clinical, Category::Snv).unwrap();
        let index = GeneIndex::new(&LinkedGenes::new(Build::Grch37, Vec::new()).unwrap());
        let builder = VariantBuilder::new(case, &index);

        reader
            .map(|record| builder.build(parser.parse(&record.unwrap())))
            .collect()
    }

    #[test]
    fn test_rank_threshold_excludes_variants() {
        let case = test_case();
        let mut loader = BulkLoader::new(SqliteStore::open_in_memory().unwrap());
        let filter = VariantFilter::new(Category::Snv, case.rank_score_threshold);

        let summary = loader.load_variants(variants(&case), &filter).unwrap();
        assert_eq!(summary, LoadSummary { seen: 3, loaded: 2, filtered: 1 });

        let store = loader.store();
        assert_eq!(store.count(VARIANT_COLLECTION, &[("simple_id", json!("1_880086_T_C"))]).unwrap(), 0);
        assert_eq!(store.count(VARIANT_COLLECTION, &[("rank_score", json!(10.0))]).unwrap(), 1);
    }

    #[test]
    fn test_category_filter() {
        let case = test_case();
        let mut loader = BulkLoader::new(SqliteStore::open_in_memory().unwrap());
        let summary = loader
            .load_variants(variants(&case), &VariantFilter::new(Category::Sv, 0.0))
            .unwrap();
        assert_eq!(summary.loaded, 0);
        assert_eq!(summary.filtered, 3);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let case = test_case();
        let mut loader = BulkLoader::new(SqliteStore::open_in_memory().unwrap()).with_batch_size(1);
        loader.ensure_indexes().unwrap();
        let filter = VariantFilter::new(Category::Snv, 0.0);
        let query = [("case_id", json!("cust000-643594"))];

        loader.load_case(&case).unwrap();
        loader.load_variants(variants(&case), &filter).unwrap();
        let first = loader.store().count(VARIANT_COLLECTION, &query).unwrap();

        loader.load_case(&case).unwrap();
        loader.load_variants(variants(&case), &filter).unwrap();
        assert_eq!(loader.store().count(VARIANT_COLLECTION, &query).unwrap(), first);
        assert_eq!(first, 3);
        assert_eq!(loader.store().count(CASE_COLLECTION, &query).unwrap(), 1);
    }

    #[test]
    fn test_delete_variants_and_case() {
        let case = test_case();
        let mut loader = BulkLoader::new(SqliteStore::open_in_memory().unwrap());
        loader.load_case(&case).unwrap();
        loader
            .load_variants(variants(&case), &VariantFilter::new(Category::Snv, 0.0))
            .unwrap();

        let deleted = loader
            .delete_variants(&case.case_id, VariantType::Research, Category::Snv)
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = loader
            .delete_variants(&case.case_id, VariantType::Clinical, Category::Snv)
            .unwrap();
        assert_eq!(deleted, 3);

        assert_eq!(loader.delete_case(&case.case_id).unwrap(), 1);
        assert_eq!(loader.store().count(CASE_COLLECTION, &[]).unwrap(), 0);
    }

    #[test]
    fn test_load_genes_in_batches() {
        let genes: Vec<GeneRecord> = (1..=7)
            .map(|id| GeneRecord::new(id, format!("GENE{}", id), Build::Grch38))
            .collect();
        let mut loader = BulkLoader::new(SqliteStore::open_in_memory().unwrap()).with_batch_size(3);

        let summary = loader.load_genes(genes).unwrap();
        assert_eq!(summary.loaded, 7);
        let store = loader.store();
        assert_eq!(store.count(GENE_COLLECTION, &[("build", json!("38"))]).unwrap(), 7);
        assert!(store
            .find_one(GENE_COLLECTION, &[("symbol", json!("GENE4"))])
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_retry_gives_up_on_permanent_errors() {
        let calls = Cell::new(0);
        let result: Result<(), StoreError> = with_retry(|| {
            calls.set(calls.get() + 1);
            Err(StoreError::InvalidQuery("bad".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);

        let calls = Cell::new(0);
        let result = with_retry(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 2 {
                Err(StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
                    None,
                )))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 2);
    }
}
