//! `mkt commission ...` and `mkt balance`.

use anyhow::Result;
use mkt_commission::{SellerBalance, SellerCommission};

use super::{open_engine, opt_str, parse_id};

pub async fn approve(id: &str) -> Result<()> {
    let id = parse_id("commission", id)?;
    let c = open_engine().await?.approve(id).await?;
    print_commission(&c);
    Ok(())
}

pub async fn cancel(id: &str) -> Result<()> {
    let id = parse_id("commission", id)?;
    let c = open_engine().await?.cancel(id).await?;
    print_commission(&c);
    Ok(())
}

pub async fn show(id: &str) -> Result<()> {
    let id = parse_id("commission", id)?;
    let c = open_engine().await?.commission(id).await?;
    print_commission(&c);
    Ok(())
}

/// Prints the projection and exits non-zero if it does not reconcile.
pub async fn balance(seller: &str) -> Result<()> {
    let seller_id = parse_id("seller", seller)?;
    let bal = open_engine().await?.seller_balance(seller_id).await?;
    print_balance(&bal);
    if let Err(brk) = bal.reconcile() {
        anyhow::bail!(
            "BALANCE_RECONCILIATION_BREAK seller_id={} accounted={} recorded={}",
            brk.seller_id,
            brk.accounted,
            brk.recorded
        );
    }
    Ok(())
}

fn print_commission(c: &SellerCommission) {
    println!("commission_id={}", c.id);
    println!("seller_id={}", c.seller_id);
    println!("order_item_id={}", c.order_item_id);
    println!("status={}", c.status.as_str());
    println!("order_amount={}", c.order_amount);
    println!("rate_source={}", c.rate_source.label());
    println!("commission_amount={}", c.commission_amount);
    println!("platform_fee={}", c.platform_fee);
    println!("net_amount={}", c.net_amount);
    println!("payment_reference={}", opt_str(c.payment_reference.as_deref()));
    println!("version={}", c.version);
}

fn print_balance(b: &SellerBalance) {
    println!("seller_id={}", b.seller_id);
    println!("pending_balance={}", b.pending_balance);
    println!("available_balance={}", b.available_balance);
    println!("in_transit_balance={}", b.in_transit_balance);
    println!("total_paid={}", b.total_paid);
    println!("fees_withheld={}", b.fees_withheld);
    println!("cancelled_amount={}", b.cancelled_amount);
    println!("total_recorded={}", b.total_recorded);
    println!("minimum_payout_amount={}", b.minimum_payout_amount);
    println!("eligible_for_payout={}", b.eligible_for_payout);
}
