//! Postgres implementation of [`CommissionStore`].
//!
//! # Design
//!
//! Every mutating call is one transaction:
//!
//! ```text
//! BEGIN
//!   SELECT ... FOR UPDATE           (rows locked in id order)
//!   domain transition on the rows   (mkt-commission state machines)
//!   UPDATE ... WHERE version = $old (belt and braces on top of the lock)
//! COMMIT
//! ```
//!
//! Any domain error returns early, dropping the transaction, which rolls it
//! back. Nothing is written unless every step succeeded.
//!
//! Idempotent recording relies on the partial unique index
//! `uq_seller_commissions_live_item`; payout numbers come from
//! `payout_number_seq`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use mkt_commission::{
    CommissionError, CommissionPayout, CommissionPayoutItem, CommissionTier, EntityKind,
    PayoutCompleted, PayoutPlan, RecordOutcome, SellerCommission, SellerCommissionSettings,
    Transition,
};
use mkt_engine::{CommissionStore, PayoutRecord, SellerSnapshot, StoreResult};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::is_unique_constraint_violation;
use crate::rows::{self, COMMISSION_COLUMNS, PAYOUT_COLUMNS, SETTINGS_COLUMNS, TIER_COLUMNS};

/// Insert attempts for one `record_commission` call.
const RECORD_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct PgCommissionStore {
    pool: PgPool,
}

impl PgCommissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace one seller's settings.
    pub async fn upsert_settings(&self, s: &SellerCommissionSettings) -> StoreResult<()> {
        s.validate()?;
        sqlx::query(
            r#"
            insert into seller_commission_settings (
              seller_id, custom_commission_rate, use_custom_rate,
              minimum_payout_amount, payment_method, payment_details, updated_at
            ) values ($1, $2, $3, $4, $5, $6, now())
            on conflict (seller_id) do update set
              custom_commission_rate = excluded.custom_commission_rate,
              use_custom_rate        = excluded.use_custom_rate,
              minimum_payout_amount  = excluded.minimum_payout_amount,
              payment_method         = excluded.payment_method,
              payment_details        = excluded.payment_details,
              updated_at             = now()
            "#,
        )
        .bind(s.seller_id)
        .bind(s.custom_commission_rate)
        .bind(s.use_custom_rate)
        .bind(s.minimum_payout_amount)
        .bind(&s.payment_method)
        .bind(&s.payment_details)
        .execute(&self.pool)
        .await
        .context("upsert_settings failed")?;
        Ok(())
    }

    /// Insert or replace one tier (keyed by id; names are unique).
    pub async fn upsert_tier(&self, t: &CommissionTier) -> StoreResult<()> {
        t.validate()?;
        let res = sqlx::query(
            r#"
            insert into commission_tiers (
              id, name, min_sales, max_sales, commission_rate, platform_fee_rate, priority, is_active
            ) values ($1, $2, $3, $4, $5, $6, $7, $8)
            on conflict (id) do update set
              name              = excluded.name,
              min_sales         = excluded.min_sales,
              max_sales         = excluded.max_sales,
              commission_rate   = excluded.commission_rate,
              platform_fee_rate = excluded.platform_fee_rate,
              priority          = excluded.priority,
              is_active         = excluded.is_active
            "#,
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(t.min_sales)
        .bind(t.max_sales)
        .bind(t.commission_rate)
        .bind(t.platform_fee_rate)
        .bind(t.priority)
        .bind(t.is_active)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_constraint_violation(&e, "uq_commission_tiers_name") => Err(
                CommissionError::Validation(format!("tier name {} already in use", t.name)),
            ),
            Err(e) => Err(anyhow::Error::new(e).context("upsert_tier failed").into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Locked reads + versioned writes (run inside a transaction)
// ---------------------------------------------------------------------------

async fn lock_commission(conn: &mut PgConnection, id: Uuid) -> StoreResult<SellerCommission> {
    let sql = format!("select {COMMISSION_COLUMNS} from seller_commissions where id = $1 for update");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock_commission failed")?
        .ok_or_else(|| CommissionError::not_found(EntityKind::Commission, id))?;
    Ok(rows::commission(&row)?)
}

/// Lock `ids` in ascending id order so concurrent claimers cannot deadlock.
async fn lock_commissions(conn: &mut PgConnection, ids: &[Uuid]) -> StoreResult<Vec<SellerCommission>> {
    let sql = format!(
        "select {COMMISSION_COLUMNS} from seller_commissions where id = any($1) order by id for update"
    );
    let found = sqlx::query(&sql)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await
        .context("lock_commissions failed")?;
    Ok(found.iter().map(rows::commission).collect::<anyhow::Result<Vec<_>>>()?)
}

async fn lock_payout(conn: &mut PgConnection, id: Uuid) -> StoreResult<CommissionPayout> {
    let sql = format!("select {PAYOUT_COLUMNS} from commission_payouts where id = $1 for update");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("lock_payout failed")?
        .ok_or_else(|| CommissionError::not_found(EntityKind::Payout, id))?;
    Ok(rows::payout(&row)?)
}

async fn load_items(conn: &mut PgConnection, payout_id: Uuid) -> StoreResult<Vec<CommissionPayoutItem>> {
    let found = sqlx::query(
        r#"
        select payout_id, commission_id, amount
        from commission_payout_items
        where payout_id = $1
        order by commission_id
        "#,
    )
    .bind(payout_id)
    .fetch_all(&mut *conn)
    .await
    .context("load_items failed")?;
    Ok(found.iter().map(rows::payout_item).collect::<anyhow::Result<Vec<_>>>()?)
}

/// Persist the mutable columns of `c`, guarded by the version it was read at.
async fn write_commission_state(
    conn: &mut PgConnection,
    c: &SellerCommission,
    read_version: i64,
) -> StoreResult<()> {
    let res = sqlx::query(
        r#"
        update seller_commissions
        set status = $3,
            approved_at = $4,
            paid_at = $5,
            cancelled_at = $6,
            payment_reference = $7,
            version = $8
        where id = $1 and version = $2
        "#,
    )
    .bind(c.id)
    .bind(read_version)
    .bind(c.status.as_str())
    .bind(c.approved_at)
    .bind(c.paid_at)
    .bind(c.cancelled_at)
    .bind(&c.payment_reference)
    .bind(c.version)
    .execute(&mut *conn)
    .await
    .context("write_commission_state failed")?;

    if res.rows_affected() != 1 {
        return Err(CommissionError::ConcurrencyConflict(format!(
            "commission {} moved past version {read_version}",
            c.id
        )));
    }
    Ok(())
}

async fn write_payout_state(
    conn: &mut PgConnection,
    p: &CommissionPayout,
    read_version: i64,
) -> StoreResult<()> {
    let res = sqlx::query(
        r#"
        update commission_payouts
        set status = $3,
            transaction_reference = $4,
            processed_at = $5,
            completed_at = $6,
            failed_at = $7,
            notes = $8,
            version = $9
        where id = $1 and version = $2
        "#,
    )
    .bind(p.id)
    .bind(read_version)
    .bind(p.status.as_str())
    .bind(&p.transaction_reference)
    .bind(p.processed_at)
    .bind(p.completed_at)
    .bind(p.failed_at)
    .bind(&p.notes)
    .bind(p.version)
    .execute(&mut *conn)
    .await
    .context("write_payout_state failed")?;

    if res.rows_affected() != 1 {
        return Err(CommissionError::ConcurrencyConflict(format!(
            "payout {} moved past version {read_version}",
            p.payout_number
        )));
    }
    Ok(())
}

async fn insert_commission(conn: &mut PgConnection, c: &SellerCommission) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        insert into seller_commissions (
          id, seller_id, order_id, order_item_id, order_amount,
          commission_rate, platform_fee_rate, rate_source,
          commission_amount, platform_fee, net_amount, status,
          approved_at, paid_at, cancelled_at, payment_reference,
          created_at, version
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
        )
        on conflict (order_item_id) where status <> 'CANCELLED' do nothing
        "#,
    )
    .bind(c.id)
    .bind(c.seller_id)
    .bind(c.order_id)
    .bind(c.order_item_id)
    .bind(c.order_amount)
    .bind(c.commission_rate)
    .bind(c.platform_fee_rate)
    .bind(c.rate_source.label())
    .bind(c.commission_amount)
    .bind(c.platform_fee)
    .bind(c.net_amount)
    .bind(c.status.as_str())
    .bind(c.approved_at)
    .bind(c.paid_at)
    .bind(c.cancelled_at)
    .bind(&c.payment_reference)
    .bind(c.created_at)
    .bind(c.version)
    .execute(&mut *conn)
    .await?;
    Ok(res.rows_affected())
}

async fn insert_payout(conn: &mut PgConnection, p: &CommissionPayout) -> StoreResult<()> {
    sqlx::query(
        r#"
        insert into commission_payouts (
          id, seller_id, payout_number, total_amount, transaction_fee, net_amount,
          status, payment_method, transaction_reference,
          processed_at, completed_at, failed_at, notes, created_at, version
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
        )
        "#,
    )
    .bind(p.id)
    .bind(p.seller_id)
    .bind(&p.payout_number)
    .bind(p.total_amount)
    .bind(p.transaction_fee)
    .bind(p.net_amount)
    .bind(p.status.as_str())
    .bind(&p.payment_method)
    .bind(&p.transaction_reference)
    .bind(p.processed_at)
    .bind(p.completed_at)
    .bind(p.failed_at)
    .bind(&p.notes)
    .bind(p.created_at)
    .bind(p.version)
    .execute(&mut *conn)
    .await
    .context("insert_payout failed")?;
    Ok(())
}

async fn insert_item(conn: &mut PgConnection, item: &CommissionPayoutItem) -> StoreResult<()> {
    sqlx::query(
        r#"
        insert into commission_payout_items (payout_id, commission_id, amount)
        values ($1, $2, $3)
        "#,
    )
    .bind(item.payout_id)
    .bind(item.commission_id)
    .bind(item.amount)
    .execute(&mut *conn)
    .await
    .context("insert_item failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CommissionStore
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
impl CommissionStore for PgCommissionStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn load_settings(&self, seller_id: Uuid) -> StoreResult<Option<SellerCommissionSettings>> {
        let sql = format!("select {SETTINGS_COLUMNS} from seller_commission_settings where seller_id = $1");
        let row = sqlx::query(&sql)
            .bind(seller_id)
            .fetch_optional(&self.pool)
            .await
            .context("load_settings failed")?;
        Ok(row.as_ref().map(rows::settings).transpose()?)
    }

    async fn active_tiers(&self) -> StoreResult<Vec<CommissionTier>> {
        let sql = format!("select {TIER_COLUMNS} from commission_tiers where is_active order by priority, id");
        let found = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("active_tiers failed")?;
        Ok(found.iter().map(rows::tier).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn cumulative_sales(&self, seller_id: Uuid) -> StoreResult<Decimal> {
        let (total,): (Decimal,) = sqlx::query_as::<_, (Decimal,)>(
            r#"
            select coalesce(sum(order_amount), 0)::numeric(14,2)
            from seller_commissions
            where seller_id = $1 and status <> 'CANCELLED'
            "#,
        )
        .bind(seller_id)
        .fetch_one(&self.pool)
        .await
        .context("cumulative_sales failed")?;
        Ok(total)
    }

    async fn record_commission(&self, commission: SellerCommission) -> StoreResult<RecordOutcome> {
        let mut tx = self.pool.begin().await.context("record_commission begin failed")?;

        // A live row can be cancelled between the conflicting insert and the
        // lookup. Each statement sees a fresh read-committed snapshot, so one
        // more insert then succeeds.
        for _ in 0..RECORD_ATTEMPTS {
            let inserted = match insert_commission(&mut tx, &commission).await {
                Ok(n) => n,
                Err(e) if is_unique_constraint_violation(&e, "seller_commissions_pkey") => {
                    return Err(CommissionError::Validation(format!(
                        "commission id {} already in use",
                        commission.id
                    )));
                }
                Err(e) => return Err(anyhow::Error::new(e).context("record_commission insert failed").into()),
            };

            if inserted == 1 {
                tx.commit().await.context("record_commission commit failed")?;
                return Ok(RecordOutcome::Created(commission));
            }

            let sql = format!(
                "select {COMMISSION_COLUMNS} from seller_commissions \
                 where order_item_id = $1 and status <> 'CANCELLED'"
            );
            let found = sqlx::query(&sql)
                .bind(commission.order_item_id)
                .fetch_optional(&mut *tx)
                .await
                .context("record_commission existing lookup failed")?;
            if let Some(row) = found {
                let existing = rows::commission(&row)?;
                tx.commit().await.context("record_commission commit failed")?;
                return Ok(RecordOutcome::AlreadyExists(existing));
            }
            tracing::debug!(
                order_item_id = %commission.order_item_id,
                "live commission vanished after insert conflict; retrying"
            );
        }

        Err(CommissionError::ConcurrencyConflict(format!(
            "order item {} kept changing while recording its commission",
            commission.order_item_id
        )))
    }

    async fn fetch_commission(&self, id: Uuid) -> StoreResult<SellerCommission> {
        let sql = format!("select {COMMISSION_COLUMNS} from seller_commissions where id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_commission failed")?
            .ok_or_else(|| CommissionError::not_found(EntityKind::Commission, id))?;
        Ok(rows::commission(&row)?)
    }

    async fn commissions_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<SellerCommission>> {
        let sql = format!("select {COMMISSION_COLUMNS} from seller_commissions where id = any($1) order by id");
        let found = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("commissions_by_ids failed")?;
        Ok(found.iter().map(rows::commission).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn approve_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)> {
        let mut tx = self.pool.begin().await.context("approve begin failed")?;
        let mut row = lock_commission(&mut tx, id).await?;
        let read_version = row.version;
        let t = row.approve(now)?;
        if t == Transition::Applied {
            write_commission_state(&mut tx, &row, read_version).await?;
        }
        tx.commit().await.context("approve commit failed")?;
        Ok((row, t))
    }

    async fn cancel_commission(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(SellerCommission, Transition)> {
        let mut tx = self.pool.begin().await.context("cancel begin failed")?;
        let mut row = lock_commission(&mut tx, id).await?;
        let read_version = row.version;
        let t = row.cancel(now)?;
        if t == Transition::Applied {
            write_commission_state(&mut tx, &row, read_version).await?;
        }
        tx.commit().await.context("cancel commit failed")?;
        Ok((row, t))
    }

    async fn claim_payout(&self, plan: &PayoutPlan, now: DateTime<Utc>) -> StoreResult<PayoutRecord> {
        let ids: Vec<Uuid> = plan.commission_ids().collect();
        let mut tx = self.pool.begin().await.context("claim begin failed")?;

        let mut locked = lock_commissions(&mut tx, &ids).await?;
        if locked.len() != ids.len() {
            return Err(CommissionError::ConcurrencyConflict(format!(
                "expected {} commissions to lock, found {}",
                ids.len(),
                locked.len()
            )));
        }
        for row in &locked {
            plan.verify_locked(row)?;
        }

        let (seq,): (i64,) = sqlx::query_as::<_, (i64,)>("select nextval('payout_number_seq')")
            .fetch_one(&mut *tx)
            .await
            .context("payout_number_seq nextval failed")?;

        let issued = plan.issue(Uuid::new_v4(), seq, now);
        insert_payout(&mut tx, &issued.payout).await?;
        for item in &issued.items {
            insert_item(&mut tx, item).await?;
        }
        for row in locked.iter_mut() {
            let read_version = row.version;
            row.mark_paid(&issued.claim, now)?;
            write_commission_state(&mut tx, row, read_version).await?;
        }

        tx.commit().await.context("claim commit failed")?;
        tracing::debug!(
            seller_id = %issued.payout.seller_id,
            payout_number = %issued.payout.payout_number,
            "payout claim committed"
        );
        Ok(PayoutRecord {
            payout: issued.payout,
            items: issued.items,
        })
    }

    async fn fetch_payout(&self, id: Uuid) -> StoreResult<PayoutRecord> {
        let mut conn = self.pool.acquire().await.context("fetch_payout acquire failed")?;
        let sql = format!("select {PAYOUT_COLUMNS} from commission_payouts where id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .context("fetch_payout failed")?
            .ok_or_else(|| CommissionError::not_found(EntityKind::Payout, id))?;
        let payout = rows::payout(&row)?;
        let items = load_items(&mut conn, id).await?;
        Ok(PayoutRecord { payout, items })
    }

    async fn process_payout(
        &self,
        id: Uuid,
        transaction_reference: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<CommissionPayout> {
        let mut tx = self.pool.begin().await.context("process begin failed")?;
        let mut p = lock_payout(&mut tx, id).await?;
        let read_version = p.version;
        p.process(transaction_reference, now)?;
        write_payout_state(&mut tx, &p, read_version).await?;
        tx.commit().await.context("process commit failed")?;
        Ok(p)
    }

    async fn complete_payout(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, PayoutCompleted)> {
        let mut tx = self.pool.begin().await.context("complete begin failed")?;
        let mut p = lock_payout(&mut tx, id).await?;
        let read_version = p.version;
        let event = p.complete(now)?;
        write_payout_state(&mut tx, &p, read_version).await?;
        tx.commit().await.context("complete commit failed")?;
        Ok((p, event))
    }

    async fn fail_payout(
        &self,
        id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<(CommissionPayout, Vec<SellerCommission>)> {
        let mut tx = self.pool.begin().await.context("fail begin failed")?;
        let mut p = lock_payout(&mut tx, id).await?;
        let read_version = p.version;
        let members = load_items(&mut tx, id).await?;
        let rollback = p.fail(reason, &members, now)?;

        let ids: Vec<Uuid> = rollback.commission_ids().copied().collect();
        let mut reverted = lock_commissions(&mut tx, &ids).await?;
        for row in reverted.iter_mut() {
            let row_version = row.version;
            row.revert_to_approved(&rollback)?;
            write_commission_state(&mut tx, row, row_version).await?;
        }
        write_payout_state(&mut tx, &p, read_version).await?;

        tx.commit().await.context("fail commit failed")?;
        Ok((p, reverted))
    }

    async fn seller_snapshot(&self, seller_id: Uuid) -> StoreResult<SellerSnapshot> {
        // One snapshot for all three reads so the projection sees a
        // consistent ledger.
        let mut tx = self.pool.begin().await.context("snapshot begin failed")?;
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await
            .context("snapshot isolation failed")?;

        let sql = format!("select {SETTINGS_COLUMNS} from seller_commission_settings where seller_id = $1");
        let settings = sqlx::query(&sql)
            .bind(seller_id)
            .fetch_optional(&mut *tx)
            .await
            .context("snapshot settings failed")?
            .as_ref()
            .map(rows::settings)
            .transpose()?;

        let sql = format!("select {COMMISSION_COLUMNS} from seller_commissions where seller_id = $1 order by created_at, id");
        let commissions = sqlx::query(&sql)
            .bind(seller_id)
            .fetch_all(&mut *tx)
            .await
            .context("snapshot commissions failed")?
            .iter()
            .map(rows::commission)
            .collect::<anyhow::Result<Vec<_>>>()?;

        let sql = format!("select {PAYOUT_COLUMNS} from commission_payouts where seller_id = $1 order by payout_number");
        let payouts = sqlx::query(&sql)
            .bind(seller_id)
            .fetch_all(&mut *tx)
            .await
            .context("snapshot payouts failed")?
            .iter()
            .map(rows::payout)
            .collect::<anyhow::Result<Vec<_>>>()?;

        tx.commit().await.context("snapshot commit failed")?;
        Ok(SellerSnapshot {
            settings,
            commissions,
            payouts,
        })
    }
}
