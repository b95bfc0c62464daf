use crate::config::Config;
use crate::datasources::MeteocatClient;
use crate::db::{BatchWriter, Database, WriteOp};
use crate::error::Result;
use crate::logic::water_balance;
use crate::models::ClimateFact;
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveTime, Utc};

/// Which day an invocation targets. Live runs update today under the quota;
/// the nightly audit run closes out yesterday and ignores the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Live,
    Audit,
}

#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub fetched: bool,
    pub latest_date: Option<NaiveDate>,
    pub trees_updated: usize,
}

/// One full water-cycle invocation: acquire station data, replay the global
/// balance, advance every viable tree. Runs to completion sequentially; the
/// external scheduler is responsible for invocation timing.
pub struct WaterCycleService {
    config: Config,
    db: Database,
    meteocat: MeteocatClient,
}

impl WaterCycleService {
    pub fn new(config: Config, db: Database) -> Self {
        let meteocat = MeteocatClient::new(config.meteocat.clone());
        Self {
            config,
            db,
            meteocat,
        }
    }

    pub async fn run(&self, mode: FetchMode) -> Result<CycleOutcome> {
        let mut outcome = CycleOutcome::default();

        outcome.fetched = self.acquire(mode).await?;
        if !outcome.fetched {
            match mode {
                FetchMode::Live => {
                    // Stored facts are presumed stale; the next scheduled run retries
                    tracing::warn!("Acquisition failed or quota exhausted; skipping recalculation");
                    return Ok(outcome);
                }
                FetchMode::Audit => {
                    // The audit run exists to force a recompute, so carry on
                    // with whatever facts are already stored
                    tracing::warn!("Audit acquisition failed; recalculating from stored facts");
                }
            }
        }

        let today = Local::now().date_naive();
        let period_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);

        if let Some(latest) = self.recalculate_global(period_start)? {
            outcome.latest_date = Some(latest.date);
            outcome.trees_updated = self.advance_trees(&latest)?;
        }

        Ok(outcome)
    }

    /// Fetch one day of station measurements, derive ET0, and merge the
    /// climate fact. Returns `false` on quota exhaustion or provider failure;
    /// neither is an error, the next scheduled run retries naturally.
    pub async fn acquire(&self, mode: FetchMode) -> Result<bool> {
        let today = Local::now().date_naive();
        let target_date = match mode {
            FetchMode::Live => today,
            FetchMode::Audit => today - Duration::days(1),
        };

        if mode == FetchMode::Live {
            if let Some(quota) = self.db.quota(&self.config.farm.id)? {
                if !quota.allows_live_call(today, self.config.meteocat.daily_quota) {
                    tracing::warn!(
                        count = quota.count,
                        cap = self.config.meteocat.daily_quota,
                        "Meteocat quota exhausted; skipping live fetch"
                    );
                    return Ok(false);
                }
            }
        }

        let reading = match self.meteocat.fetch_day(target_date).await {
            Ok(reading) => reading,
            Err(e) => {
                tracing::error!(error = %e, date = %target_date, "Meteocat fetch failed");
                return Ok(false);
            }
        };

        let et0 = water_balance::hargreaves_et0(reading.max_temp, reading.min_temp);
        self.db
            .merge_climate_fact(&self.config.farm.id, target_date, &reading, et0)?;

        if mode == FetchMode::Live {
            self.db
                .increment_quota(&self.config.farm.id, today, Utc::now())?;
        }

        tracing::info!(date = %target_date, et0, rain = reading.rain, "Climate fact saved");
        Ok(true)
    }

    /// Replay the period's facts and persist the recomputed balances.
    /// Returns the chronologically latest fact, the anchor for tree updates
    /// (live data may lag, so this is not necessarily today).
    pub fn recalculate_global(&self, period_start: NaiveDate) -> Result<Option<ClimateFact>> {
        let mut facts = self
            .db
            .climate_facts_since(&self.config.farm.id, period_start)?;

        if facts.is_empty() {
            tracing::info!(%period_start, "No climate facts for the period; nothing to recalculate");
            return Ok(None);
        }

        water_balance::fold_global_balance(&mut facts, &self.config.balance);

        let mut writer = BatchWriter::new(self.db.clone());
        for fact in &facts {
            writer.add(WriteOp::ClimateBalance {
                farm_id: fact.farm_id.clone(),
                date: fact.date,
                soil_balance: fact.soil_balance,
                pef: fact.pef,
            })?;
        }
        writer.flush()?;

        tracing::info!(facts = facts.len(), writes = writer.total_writes(), "Global balance recalculated");
        Ok(facts.last().cloned())
    }

    /// Advance every viable tree against the latest fact and that day's
    /// irrigation totals. Returns the number of trees updated.
    pub fn advance_trees(&self, latest: &ClimateFact) -> Result<usize> {
        let day_start = latest.date.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);

        let irrigation = self.db.liters_by_tree(day_start, day_end)?;
        let trees = self.db.viable_trees()?;

        let mut writer = BatchWriter::new(self.db.clone());
        for tree in &trees {
            let liters = irrigation.get(&tree.id).copied().unwrap_or(0.0);
            let update = water_balance::advance_tree(tree, latest, liters, &self.config.balance);

            writer.add(WriteOp::TreeBalance {
                tree_id: update.tree_id,
                soil_balance: update.soil_balance,
                start_of_day_balance: update.start_of_day_balance,
                last_balance_update: update.last_balance_update,
                calculated_reg_area: update.calculated_reg_area,
            })?;
        }
        writer.flush()?;

        tracing::info!(
            trees = trees.len(),
            irrigated = irrigation.len(),
            date = %latest.date,
            "Tree balances advanced"
        );
        Ok(trees.len())
    }

    pub fn meteocat(&self) -> &MeteocatClient {
        &self.meteocat
    }
}
