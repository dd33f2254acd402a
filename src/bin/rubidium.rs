// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Script driver for the transaction engine.
//!
//! Reads an instruction script from a file (first argument) or stdin, feeds
//! it to the engine one instruction per tick, and prints the resulting
//! trace. Set `RUST_LOG` to see engine diagnostics on stderr.
//!
//! Usage:
//!   rubidium script.txt
//!   rubidium < script.txt

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::process::ExitCode;

use rubidiumdb::script::Instruction;
use rubidiumdb::txn::{Event, TransactionManager, TxnId};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let reader: Box<dyn BufRead> = match args.get(1) {
        Some(path) => match File::open(path) {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(err) => {
                eprintln!("{path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut mgr = TransactionManager::new();
    for (index, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                eprintln!("read error: {err}");
                return ExitCode::FAILURE;
            }
        };
        let instruction = match Instruction::parse(&line) {
            Ok(Some(instruction)) => instruction,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("line {}: {err}", index + 1);
                return ExitCode::FAILURE;
            }
        };
        match mgr.execute(&instruction) {
            Ok(events) => {
                for event in &events {
                    println!("{}", render(&mgr, event));
                }
            }
            Err(err) => {
                eprintln!("line {}: {err}", index + 1);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}

/// Formats one engine event as a trace line.
fn render(mgr: &TransactionManager, event: &Event) -> String {
    let name = |id: TxnId| {
        mgr.transaction_by_id(id)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| id.to_string())
    };
    match event {
        Event::ReadServed {
            txn,
            var,
            value,
            site: Some(site),
        } => format!("{} reads {var} = {value} from {site}", name(*txn)),
        Event::ReadServed {
            txn, var, value, ..
        } => format!("{} reads {var} = {value}", name(*txn)),
        Event::WriteBuffered { txn, var, value } => {
            format!("{} writes {var} = {value}", name(*txn))
        }
        Event::Waiting { txn } => format!("{} waits", name(*txn)),
        Event::Committed { txn } => format!("{} commits", name(*txn)),
        Event::Aborted { txn, reason } => format!("{} aborts ({reason})", name(*txn)),
        Event::SiteDown { site } => format!("{site} is down"),
        Event::SiteUp { site } => format!("{site} is up"),
        Event::Dump { snapshot } => {
            let lines: Vec<String> = snapshot
                .iter()
                .map(|(site, values)| {
                    let values: Vec<String> = values
                        .iter()
                        .map(|(var, value)| format!("{var}: {value}"))
                        .collect();
                    format!("{site}: {}", values.join(", "))
                })
                .collect();
            lines.join("\n")
        }
    }
}
