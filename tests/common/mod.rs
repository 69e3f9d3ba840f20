#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::path::{Path, PathBuf};

/// Base instant all builders offset from: 2023.01.04 09:00:00.
pub fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 4)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap()
}

pub fn at(minutes: i64) -> NaiveDateTime {
    base() + TimeDelta::minutes(minutes)
}

/// Wraps a message the way the tester journal does.
pub fn tester_line(minutes: i64, message: &str) -> String {
    let ts = at(minutes);
    format!(
        "CS\t0\t{}.000\tCore 1\t{}   [{}] [INFO] {}",
        ts.format("%H:%M:%S"),
        ts.format("%Y.%m.%d %H:%M:%S"),
        ts.format("%H:%M:%S"),
        message
    )
}

pub fn deposit_line(amount: f64) -> String {
    format!("RL\t0\t08:59:59.000\tTester\tinitial deposit {amount:.2} USD, leverage 1:100")
}

pub fn signal_line(minutes: i64, entry: i8, strength: i32, confluence: f64) -> String {
    tester_line(
        minutes,
        &format!(
            "🎯 Sinal detectado! Bar={}, Entry={}, Strength={}, Confluence={:.1}%",
            minutes, entry, strength, confluence
        ),
    )
}

pub fn open_line(minutes: i64, side: &str, price: f64) -> String {
    tester_line(
        minutes,
        &format!(
            "TRADE: {} @ {:.5} | Vol: 0.10 | SL: {:.5} | TP: {:.5}",
            side,
            price,
            price - 0.005,
            price + 0.010
        ),
    )
}

pub fn open_line_with_ticket(minutes: i64, side: &str, ticket: u64) -> String {
    tester_line(
        minutes,
        &format!(
            "TRADE: {} #{} @ 1.10000 | Vol: 0.10 | SL: 1.09500 | TP: 1.11000",
            side, ticket
        ),
    )
}

pub fn close_line(minutes: i64, profit: f64, reason: &str) -> String {
    let outcome = if profit > 0.0 { "WIN" } else { "LOSS" };
    tagged_close_line(minutes, outcome, profit, reason)
}

pub fn tagged_close_line(minutes: i64, outcome: &str, profit: f64, reason: &str) -> String {
    tester_line(
        minutes,
        &format!(
            "TRADE CLOSED: {} | Profit: {:.2} | Razão: {}",
            outcome, profit, reason
        ),
    )
}

pub fn close_line_with_ticket(minutes: i64, profit: f64, ticket: u64) -> String {
    let outcome = if profit > 0.0 { "WIN" } else { "LOSS" };
    tester_line(
        minutes,
        &format!(
            "TRADE CLOSED: {} #{} | Profit: {:.2} | Razão: Take Profit",
            outcome, ticket, profit
        ),
    )
}

/// The tester's own fill record, which the advisor does not write.
pub fn deal_line(minutes: i64, deal_id: u64, side: &str, order_id: u64) -> String {
    let ts = at(minutes);
    format!(
        "GK\t0\t{}.000\tTrade\t{}   deal #{} {} 0.10 USDJPY at 1.10000 done (based on order #{})",
        ts.format("%H:%M:%S"),
        ts.format("%Y.%m.%d %H:%M:%S"),
        deal_id,
        side,
        order_id
    )
}

pub fn block_line(minutes: i64, detail: &str) -> String {
    tester_line(minutes, &format!("⛔ FILTRO BLOQUEOU: {}", detail))
}

pub fn join_log(lines: &[String]) -> String {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text
}

pub fn utf16le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    bytes
}

pub fn utf16be_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
    bytes
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// One open/close pair per profit, one hour apart, each trade lasting 30 minutes.
pub fn sequential_trades(profits: &[f64]) -> Vec<String> {
    profits
        .iter()
        .enumerate()
        .flat_map(|(i, &profit)| {
            let start = i as i64 * 60;
            let reason = if profit > 0.0 { "Take Profit" } else { "Stop Loss" };
            [
                open_line(start, "BUY", 1.1),
                close_line(start + 30, profit, reason),
            ]
        })
        .collect()
}
