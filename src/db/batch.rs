use crate::db::Database;
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::params;

/// Commit threshold, kept under the storage layer's comfortable
/// per-transaction operation count.
const MAX_PENDING_OPS: usize = 400;

/// A single merge-style write destined for the next batch commit.
/// Both variants touch only the columns the pipeline owns.
#[derive(Debug, Clone)]
pub enum WriteOp {
    ClimateBalance {
        farm_id: String,
        date: NaiveDate,
        soil_balance: f64,
        pef: f64,
    },
    TreeBalance {
        tree_id: String,
        soil_balance: f64,
        start_of_day_balance: f64,
        last_balance_update: DateTime<Utc>,
        calculated_reg_area: f64,
    },
}

/// Accumulates pending writes and commits them in size-bounded transactions.
/// `add` flushes eagerly once the pending batch fills; callers finish with an
/// explicit `flush`.
pub struct BatchWriter {
    db: Database,
    pending: Vec<WriteOp>,
    total_writes: usize,
}

impl BatchWriter {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            pending: Vec::new(),
            total_writes: 0,
        }
    }

    pub fn add(&mut self, op: WriteOp) -> Result<()> {
        self.pending.push(op);
        if self.pending.len() >= MAX_PENDING_OPS {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let ops = std::mem::take(&mut self.pending);
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for op in &ops {
                match op {
                    WriteOp::ClimateBalance {
                        farm_id,
                        date,
                        soil_balance,
                        pef,
                    } => {
                        tx.execute(
                            r#"
                            INSERT INTO climate_facts (farm_id, date, soil_balance, pef)
                            VALUES (?1, ?2, ?3, ?4)
                            ON CONFLICT(farm_id, date) DO UPDATE SET
                                soil_balance = excluded.soil_balance,
                                pef = excluded.pef
                            "#,
                            params![
                                farm_id,
                                date.format("%Y-%m-%d").to_string(),
                                soil_balance,
                                pef
                            ],
                        )?;
                    }
                    WriteOp::TreeBalance {
                        tree_id,
                        soil_balance,
                        start_of_day_balance,
                        last_balance_update,
                        calculated_reg_area,
                    } => {
                        tx.execute(
                            r#"
                            UPDATE trees SET
                                soil_balance = ?2,
                                start_of_day_balance = ?3,
                                last_balance_update = ?4,
                                calculated_reg_area = ?5
                            WHERE id = ?1
                            "#,
                            params![
                                tree_id,
                                soil_balance,
                                start_of_day_balance,
                                last_balance_update.to_rfc3339(),
                                calculated_reg_area
                            ],
                        )?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        self.total_writes += ops.len();
        tracing::debug!(writes = ops.len(), "Batch committed");
        Ok(())
    }

    pub fn total_writes(&self) -> usize {
        self.total_writes
    }
}
