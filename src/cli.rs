//! Line-oriented textual front end.
//!
//! Grammar, one command per line:
//!   NEW,<orderId>,<symbol>,<BUY|SELL>,<LIMIT|MARKET>,<price>,<qty>
//!   CANCEL,<symbol>,<orderId>
//!   SNAP[,<symbol>]
//!   HELP
//!   QUIT | EXIT
//!
//! Blank lines are skipped. `#` starts a comment, either as a whole line
//! or trailing after a command.

use std::io::IsTerminal;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::errors::ProtocolError;
use crate::order::{OrderId, OrderKind, Side};
use crate::pipeline::{NewOrderRequest, SubmissionPipeline};
use crate::price::Price;
use crate::symbol::Symbol;

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    New {
        order_id: OrderId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        price: f64,
        quantity: u32,
    },
    Cancel {
        symbol: Symbol,
        order_id: OrderId,
    },
    Snapshot {
        symbol: Option<Symbol>,
    },
    Help,
    Quit,
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Parses one line of input. Returns `Ok(None)` for blank/comment-only
/// lines, which the caller should simply skip.
pub fn parse_line(line: &str) -> Result<Option<CliCommand>, ProtocolError> {
    let line = strip_comment(line).trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let command = match parts[0].to_ascii_uppercase().as_str() {
        "NEW" => {
            if parts.len() != 7 {
                return Err(ProtocolError::Malformed(line.to_string()));
            }
            let order_id: OrderId = parts[1].parse().map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            let symbol = Symbol::new(parts[2]).map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            let side = parse_side(parts[3]).ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            let kind = parse_kind(parts[4]).ok_or_else(|| ProtocolError::Malformed(line.to_string()))?;
            let price: f64 = parts[5].parse().map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            let quantity: u32 = parts[6].parse().map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            CliCommand::New { order_id, symbol, side, kind, price, quantity }
        }
        "CANCEL" => {
            if parts.len() != 3 {
                return Err(ProtocolError::Malformed(line.to_string()));
            }
            let symbol = Symbol::new(parts[1]).map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            let order_id: OrderId = parts[2].parse().map_err(|_| ProtocolError::Malformed(line.to_string()))?;
            CliCommand::Cancel { symbol, order_id }
        }
        "SNAP" => match parts.len() {
            1 => CliCommand::Snapshot { symbol: None },
            2 => {
                let symbol = Symbol::new(parts[1]).map_err(|_| ProtocolError::Malformed(line.to_string()))?;
                CliCommand::Snapshot { symbol: Some(symbol) }
            }
            _ => return Err(ProtocolError::Malformed(line.to_string())),
        },
        "HELP" => CliCommand::Help,
        "QUIT" | "EXIT" => CliCommand::Quit,
        other => return Err(ProtocolError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_side(s: &str) -> Option<Side> {
    match s.to_ascii_uppercase().as_str() {
        "BUY" => Some(Side::Buy),
        "SELL" => Some(Side::Sell),
        _ => None,
    }
}

fn parse_kind(s: &str) -> Option<OrderKind> {
    match s.to_ascii_uppercase().as_str() {
        "LIMIT" => Some(OrderKind::Limit),
        "MARKET" => Some(OrderKind::Market),
        _ => None,
    }
}

const HELP_TEXT: &str = "\
commands:
  NEW,<orderId>,<symbol>,<BUY|SELL>,<LIMIT|MARKET>,<price>,<qty>
  CANCEL,<symbol>,<orderId>
  SNAP[,<symbol>]
  HELP
  QUIT | EXIT";

fn print_snapshot(snapshot: &crate::book::BookSnapshot) {
    println!("--- {} ---", snapshot.symbol);
    println!("bids (highest first):");
    for (price, qty) in snapshot.bids.iter() {
        println!("  {price} x {qty}");
    }
    println!("asks (lowest first):");
    for (price, qty) in snapshot.asks.iter() {
        println!("  {price} x {qty}");
    }
}

/// Drives the REPL against `pipeline` until `QUIT`/`EXIT` or EOF.
pub async fn run_repl(pipeline: &SubmissionPipeline) {
    let interactive = std::io::stdin().is_terminal();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        if interactive {
            print!("> ");
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
        let Ok(Some(line)) = lines.next_line().await else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {e}");
                continue;
            }
        };

        match command {
            CliCommand::New { order_id, symbol, side, kind, price, quantity } => {
                let request = NewOrderRequest {
                    order_id: Some(order_id),
                    symbol,
                    side,
                    kind,
                    price: Price::from_f64(price),
                    quantity,
                    timestamp: None,
                };
                match pipeline.submit(request).await {
                    Ok((id, trades)) => {
                        println!("ok: order {id} accepted, {} trade(s)", trades.len());
                        for t in trades {
                            println!("  trade {} : {} @ {}", t.trade_id, t.quantity, t.price);
                        }
                    }
                    Err(e) => println!("error: {e}"),
                }
            }
            CliCommand::Cancel { symbol, order_id } => match pipeline.cancel(symbol, order_id).await {
                Ok(crate::book::CancelOutcome::Cancelled) => println!("ok: order {order_id} cancelled"),
                Ok(crate::book::CancelOutcome::NotFound) => println!("not found: order {order_id}"),
                Err(e) => println!("error: {e}"),
            },
            CliCommand::Snapshot { symbol } => {
                let Some(symbol) = symbol else {
                    println!("error: SNAP requires a symbol");
                    continue;
                };
                match pipeline.book_snapshot(symbol).await {
                    Ok(snap) => print_snapshot(&snap),
                    Err(e) => println!("error: {e}"),
                }
            }
            CliCommand::Help => println!("{HELP_TEXT}"),
            CliCommand::Quit => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_order() {
        let cmd = parse_line("NEW,1,BTC-USD,BUY,LIMIT,48.5,10").unwrap().unwrap();
        assert_eq!(
            cmd,
            CliCommand::New {
                order_id: 1,
                symbol: Symbol::new("BTC-USD").unwrap(),
                side: Side::Buy,
                kind: OrderKind::Limit,
                price: 48.5,
                quantity: 10,
            }
        );
    }

    #[test]
    fn parses_cancel() {
        let cmd = parse_line("CANCEL,BTC-USD,7").unwrap().unwrap();
        assert_eq!(cmd, CliCommand::Cancel { symbol: Symbol::new("BTC-USD").unwrap(), order_id: 7 });
    }

    #[test]
    fn parses_snap_without_symbol() {
        let cmd = parse_line("SNAP").unwrap().unwrap();
        assert_eq!(cmd, CliCommand::Snapshot { symbol: None });
    }

    #[test]
    fn blank_and_comment_only_lines_are_skipped() {
        assert_eq!(parse_line("").unwrap(), None);
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# just a comment").unwrap(), None);
    }

    #[test]
    fn trailing_comment_is_stripped() {
        let cmd = parse_line("SNAP,BTC-USD # show me the book").unwrap().unwrap();
        assert_eq!(cmd, CliCommand::Snapshot { symbol: Some(Symbol::new("BTC-USD").unwrap()) });
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(matches!(parse_line("FOO,1,2"), Err(ProtocolError::UnknownCommand(_))));
    }

    #[test]
    fn malformed_new_is_rejected() {
        assert!(matches!(parse_line("NEW,1,BTC-USD,BUY,LIMIT,48.5"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn quit_and_exit_both_terminate() {
        assert_eq!(parse_line("QUIT").unwrap().unwrap(), CliCommand::Quit);
        assert_eq!(parse_line("exit").unwrap().unwrap(), CliCommand::Quit);
    }
}
