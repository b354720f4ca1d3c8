//! Row <-> domain mapping. Column lists live next to their decoders so a
//! schema change touches one place.

use anyhow::Result;
use mkt_commission::{
    CommissionPayout, CommissionPayoutItem, CommissionStatus, CommissionTier, PayoutStatus,
    RateSource, SellerCommission, SellerCommissionSettings,
};
use sqlx::postgres::PgRow;
use sqlx::Row;

pub(crate) const COMMISSION_COLUMNS: &str = r#"
    id, seller_id, order_id, order_item_id, order_amount,
    commission_rate, platform_fee_rate, rate_source,
    commission_amount, platform_fee, net_amount, status,
    approved_at, paid_at, cancelled_at, payment_reference,
    created_at, version
"#;

pub(crate) const PAYOUT_COLUMNS: &str = r#"
    id, seller_id, payout_number, total_amount, transaction_fee, net_amount,
    status, payment_method, transaction_reference,
    processed_at, completed_at, failed_at, notes, created_at, version
"#;

pub(crate) const TIER_COLUMNS: &str = r#"
    id, name, min_sales, max_sales, commission_rate, platform_fee_rate, priority, is_active
"#;

pub(crate) const SETTINGS_COLUMNS: &str = r#"
    seller_id, custom_commission_rate, use_custom_rate, minimum_payout_amount,
    payment_method, payment_details
"#;

pub(crate) fn commission(row: &PgRow) -> Result<SellerCommission> {
    Ok(SellerCommission {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        order_id: row.try_get("order_id")?,
        order_item_id: row.try_get("order_item_id")?,
        order_amount: row.try_get("order_amount")?,
        commission_rate: row.try_get("commission_rate")?,
        platform_fee_rate: row.try_get("platform_fee_rate")?,
        rate_source: RateSource::parse_label(&row.try_get::<String, _>("rate_source")?)?,
        commission_amount: row.try_get("commission_amount")?,
        platform_fee: row.try_get("platform_fee")?,
        net_amount: row.try_get("net_amount")?,
        status: CommissionStatus::parse(&row.try_get::<String, _>("status")?)?,
        approved_at: row.try_get("approved_at")?,
        paid_at: row.try_get("paid_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        payment_reference: row.try_get("payment_reference")?,
        created_at: row.try_get("created_at")?,
        version: row.try_get("version")?,
    })
}

pub(crate) fn payout(row: &PgRow) -> Result<CommissionPayout> {
    Ok(CommissionPayout {
        id: row.try_get("id")?,
        seller_id: row.try_get("seller_id")?,
        payout_number: row.try_get("payout_number")?,
        total_amount: row.try_get("total_amount")?,
        transaction_fee: row.try_get("transaction_fee")?,
        net_amount: row.try_get("net_amount")?,
        status: PayoutStatus::parse(&row.try_get::<String, _>("status")?)?,
        payment_method: row.try_get("payment_method")?,
        transaction_reference: row.try_get("transaction_reference")?,
        processed_at: row.try_get("processed_at")?,
        completed_at: row.try_get("completed_at")?,
        failed_at: row.try_get("failed_at")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        version: row.try_get("version")?,
    })
}

pub(crate) fn payout_item(row: &PgRow) -> Result<CommissionPayoutItem> {
    Ok(CommissionPayoutItem {
        payout_id: row.try_get("payout_id")?,
        commission_id: row.try_get("commission_id")?,
        amount: row.try_get("amount")?,
    })
}

pub(crate) fn tier(row: &PgRow) -> Result<CommissionTier> {
    Ok(CommissionTier {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        min_sales: row.try_get("min_sales")?,
        max_sales: row.try_get("max_sales")?,
        commission_rate: row.try_get("commission_rate")?,
        platform_fee_rate: row.try_get("platform_fee_rate")?,
        priority: row.try_get("priority")?,
        is_active: row.try_get("is_active")?,
    })
}

pub(crate) fn settings(row: &PgRow) -> Result<SellerCommissionSettings> {
    Ok(SellerCommissionSettings {
        seller_id: row.try_get("seller_id")?,
        custom_commission_rate: row.try_get("custom_commission_rate")?,
        use_custom_rate: row.try_get("use_custom_rate")?,
        minimum_payout_amount: row.try_get("minimum_payout_amount")?,
        payment_method: row.try_get("payment_method")?,
        payment_details: row.try_get("payment_details")?,
    })
}
