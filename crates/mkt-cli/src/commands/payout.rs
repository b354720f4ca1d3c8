//! `mkt payout ...`

use anyhow::{bail, Result};
use mkt_commission::{CommissionPayout, CommissionStatus, PayoutRequest};
use mkt_engine::PayoutRecord;
use uuid::Uuid;

use super::{open_engine, opt_str, parse_id};

/// Claim `commission_ids`, or every Approved commission of the seller when
/// `all_approved` is set.
pub async fn request(seller: &str, commission_ids: &[String], all_approved: bool) -> Result<()> {
    let seller_id = parse_id("seller", seller)?;
    let engine = open_engine().await?;

    let ids: Vec<Uuid> = if all_approved {
        let snap = engine.store().seller_snapshot(seller_id).await?;
        snap.commissions
            .iter()
            .filter(|c| c.status == CommissionStatus::Approved)
            .map(|c| c.id)
            .collect()
    } else {
        commission_ids
            .iter()
            .map(|raw| parse_id("commission", raw))
            .collect::<Result<_>>()?
    };
    if ids.is_empty() {
        bail!("nothing to request: pass --commission <id> (repeatable) or --all-approved");
    }

    let record = engine
        .request_payout(&PayoutRequest {
            seller_id,
            commission_ids: ids,
        })
        .await?;
    print_record(&record);
    Ok(())
}

pub async fn process(id: &str, transaction_reference: &str) -> Result<()> {
    let id = parse_id("payout", id)?;
    let p = open_engine().await?.process_payout(id, transaction_reference).await?;
    print_payout(&p);
    Ok(())
}

pub async fn complete(id: &str) -> Result<()> {
    let id = parse_id("payout", id)?;
    let p = open_engine().await?.complete_payout(id).await?;
    print_payout(&p);
    Ok(())
}

pub async fn fail(id: &str, reason: &str) -> Result<()> {
    let id = parse_id("payout", id)?;
    let (p, reverted) = open_engine().await?.fail_payout(id, reason).await?;
    print_payout(&p);
    for c in &reverted {
        println!("reverted_commission_id={}", c.id);
    }
    Ok(())
}

pub async fn show(id: &str) -> Result<()> {
    let id = parse_id("payout", id)?;
    let record = open_engine().await?.payout(id).await?;
    print_record(&record);
    Ok(())
}

fn print_record(r: &PayoutRecord) {
    print_payout(&r.payout);
    for item in &r.items {
        println!("item commission_id={} amount={}", item.commission_id, item.amount);
    }
}

fn print_payout(p: &CommissionPayout) {
    println!("payout_id={}", p.id);
    println!("payout_number={}", p.payout_number);
    println!("seller_id={}", p.seller_id);
    println!("status={}", p.status.as_str());
    println!("total_amount={}", p.total_amount);
    println!("transaction_fee={}", p.transaction_fee);
    println!("net_amount={}", p.net_amount);
    println!("payment_method={}", p.payment_method);
    println!("transaction_reference={}", opt_str(p.transaction_reference.as_deref()));
    println!("notes={}", opt_str(p.notes.as_deref()));
}
