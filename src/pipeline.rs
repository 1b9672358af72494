use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::clean::{clean_customers, clean_products, clean_sales, Cleaned};
use crate::error::{EtlError, Result};
use crate::extract::ExtractSource;
use crate::loader::Loader;
use crate::metrics::StageMetrics;
use crate::report::{RecordOutcome, RunReport, StageReport};
use crate::storage::Sink;
use crate::types::Stage;

/// Runs the customers, products and sales stages in that order against one
/// sink. Each stage is read, cleaned, loaded and committed before the next
/// one starts; a stage-level failure aborts the remaining stages and leaves
/// earlier commits in place.
pub struct Pipeline {
    sink: Arc<dyn Sink>,
    extracts: Arc<dyn ExtractSource>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(sink: Arc<dyn Sink>, extracts: Arc<dyn ExtractSource>) -> Self {
        Self { sink, extracts }
    }

    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("etl_run", run_id = %run_id);
        self.run_stages(run_id).instrument(span).await
    }

    async fn run_stages(&self, run_id: Uuid) -> Result<RunReport> {
        info!("Starting ETL run");
        let mut report = RunReport::start(run_id);

        for stage in Stage::ORDERED {
            let started = Instant::now();
            match self.run_stage(stage).await {
                Ok(stage_report) => {
                    stage_report.log();
                    StageMetrics::record_stage(&stage_report);
                    StageMetrics::record_stage_duration(stage, started.elapsed().as_secs_f64());
                    report.stages.push(stage_report);
                }
                Err(e) => {
                    error!("Run aborted at {} stage: {}", stage, e);
                    StageMetrics::record_stage_aborted(stage);
                    return Err(EtlError::StageAborted {
                        stage,
                        completed: report.stages,
                        source: Box::new(e),
                    });
                }
            }
        }

        let report = report.finish();
        info!(
            committed = report.total_committed(),
            skipped = report.total_skipped(),
            "ETL run complete"
        );
        Ok(report)
    }

    async fn run_stage(&self, stage: Stage) -> Result<StageReport> {
        info!("Running {} stage", stage);
        let loader = Loader::new(self.sink.as_ref());

        match stage {
            Stage::Customers => {
                let cleaned = clean_customers(self.extracts.customers()?);
                let outcomes = loader.load_customers(&cleaned.admissible).await?;
                Ok(fold(stage, cleaned, outcomes))
            }
            Stage::Products => {
                let cleaned = clean_products(self.extracts.products()?);
                let outcomes = loader.load_products(&cleaned.admissible).await?;
                Ok(fold(stage, cleaned, outcomes))
            }
            Stage::Sales => {
                let cleaned = clean_sales(self.extracts.sales()?);
                let outcomes = loader.load_sales(&cleaned.admissible).await?;
                Ok(fold(stage, cleaned, outcomes))
            }
        }
    }
}

fn fold<T>(stage: Stage, cleaned: Cleaned<T>, outcomes: Vec<RecordOutcome>) -> StageReport {
    StageReport::from_outcomes(stage, cleaned.input_rows, cleaned.dropped, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::InMemoryExtracts;
    use crate::storage::InMemorySink;
    use crate::types::{RawCustomer, RawProduct, RawSale};

    fn s(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    fn extracts() -> InMemoryExtracts {
        InMemoryExtracts {
            customers: vec![RawCustomer {
                first_name: s("Rahul"),
                last_name: s("Sharma"),
                email: s("rahul@example.com"),
                phone: s("9876543210"),
                city: s("Bangalore"),
                registration_date: s("2023-01-15"),
            }],
            products: vec![RawProduct {
                product_name: s("Laptop"),
                category: s("electronics"),
                price: s("45000"),
                stock_quantity: s("5"),
            }],
            sales: vec![RawSale {
                transaction_id: s("T001"),
                customer_id: s("C1"),
                product_id: s("P1"),
                quantity: s("1"),
                unit_price: s("45000"),
                transaction_date: s("2024-01-20"),
                status: s("Completed"),
            }],
        }
    }

    #[tokio::test]
    async fn test_run_loads_every_stage_in_order() {
        let sink = Arc::new(InMemorySink::new());
        let pipeline = Pipeline::new(sink.clone(), Arc::new(extracts()));

        let report = pipeline.run().await.unwrap();
        let stages: Vec<Stage> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(stages, Stage::ORDERED.to_vec());
        assert_eq!(report.total_committed(), 3);
        assert_eq!(report.total_skipped(), 0);
        assert!(report.finished_at.is_some());

        let tables = sink.committed();
        assert_eq!(tables.orders.len(), 1);
        assert_eq!(tables.order_items.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_commits_no_new_customers_or_products() {
        let sink = Arc::new(InMemorySink::new());
        let pipeline = Pipeline::new(sink.clone(), Arc::new(extracts()));
        pipeline.run().await.unwrap();

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.stage(Stage::Customers).unwrap().committed_rows, 0);
        assert_eq!(report.stage(Stage::Products).unwrap().committed_rows, 0);
        assert_eq!(sink.committed().customers.len(), 1);
        assert_eq!(sink.committed().products.len(), 1);
    }
}
