use std::fmt::Write as _;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::types::{Alert, AlertKind, RunSummary};

const POLYGONSCAN: &str = "https://polygonscan.com";

/// Render one alert as a plain-text block.
pub fn format_alert(alert: &Alert) -> String {
    let trade = &alert.trade;
    let value = format_usd(trade.usd_value);
    let headline = match alert.kind {
        AlertKind::Whale => format!("WHALE: ${value} big bet"),
        AlertKind::NewAccount => format!("WHALE ALERT: New user ${value} bet!"),
    };
    let age_note = match alert.wallet_age_days {
        Some(days) if days < 1.0 => "brand new".to_string(),
        Some(days) => format!("age: {days:.1}d"),
        None => "age: unknown".to_string(),
    };

    let mut block = String::new();
    let _ = writeln!(block, "{headline}");
    let _ = writeln!(block, "Wallet: {} ({age_note})", trade.wallet);
    let _ = writeln!(block, "Market: {}", trade.title);
    let _ = writeln!(
        block,
        "Side: {} {} {} @ ${}",
        trade.side,
        trade.outcome,
        trade.size.normalize(),
        trade.price.normalize()
    );
    let _ = writeln!(block, "Time: {}", trade.timestamp.to_rfc3339());
    if let Some(hash) = &trade.transaction_hash {
        let _ = writeln!(block, "Tx: {POLYGONSCAN}/tx/{hash}");
    }
    let _ = write!(block, "Wallet Explorer: {POLYGONSCAN}/address/{}", trade.wallet);
    block
}

/// All alert blocks separated by blank lines, followed by a one-line summary.
pub fn format_report(alerts: &[Alert], summary: &RunSummary) -> String {
    let mut out = String::new();
    for alert in alerts {
        out.push_str(&format_alert(alert));
        out.push_str("\n\n");
    }
    out.push_str(&format_summary_line(summary));
    out.push('\n');
    out
}

pub fn format_summary_line(summary: &RunSummary) -> String {
    format!(
        "Scanned {} trades: {} whale alert(s), {} new-account alert(s)",
        summary.trades_scanned, summary.whale_alerts, summary.new_account_alerts
    )
}

/// Whole dollars with thousands separators, e.g. `87,200`.
pub fn format_usd(value: Decimal) -> String {
    let whole = value.round().to_i128().unwrap_or(0);
    let digits = whole.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Emit each alert block to stdout.
pub fn report_alerts(alerts: &[Alert]) {
    for alert in alerts {
        println!("\n{}\n", format_alert(alert));
    }
}

/// Emit the run summary as a single JSON line to stdout.
pub fn report_summary(summary: &RunSummary) {
    if let Ok(json) = serde_json::to_string(summary) {
        println!("{json}");
    }
}
