// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Instruction script parsing.
//!
//! Scripts are plain text, one instruction per line, in the form
//! `command(arg, ...)`. Blank lines and `//` comments are skipped. The
//! parser only checks syntax; whether a named transaction, variable, or
//! site actually exists is decided by the engine when the instruction runs.

mod error;

pub use error::ScriptError;

use crate::site::{SiteId, Value, VarId};

/// One parsed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `begin(T)`: start a read-write transaction.
    Begin { txn: String },
    /// `beginRO(T)`: start a read-only transaction.
    BeginRo { txn: String },
    /// `R(T,x)`: read a variable.
    Read { txn: String, var: VarId },
    /// `W(T,x,v)`: write a variable.
    Write {
        txn: String,
        var: VarId,
        value: Value,
    },
    /// `end(T)`: commit, or abort if validation fails.
    End { txn: String },
    /// `fail(s)`: take a site down.
    Fail { site: SiteId },
    /// `recover(s)`: bring a site back up.
    Recover { site: SiteId },
    /// `dump()`: report every committed value at every site.
    Dump,
}

impl Instruction {
    /// Parses one script line. Returns `Ok(None)` for blank and comment
    /// lines.
    pub fn parse(line: &str) -> Result<Option<Self>, ScriptError> {
        let text = match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (command, rest) = text
            .split_once('(')
            .ok_or_else(|| ScriptError::Malformed(text.to_string()))?;
        let command = command.trim();
        let args_str = rest
            .trim_end()
            .strip_suffix(')')
            .ok_or_else(|| ScriptError::Malformed(text.to_string()))?;
        let args: Vec<&str> = if args_str.trim().is_empty() {
            Vec::new()
        } else {
            args_str.split(',').map(str::trim).collect()
        };

        let instruction = match command {
            "begin" => {
                arity(command, &args, 1)?;
                Instruction::Begin {
                    txn: args[0].to_string(),
                }
            }
            "beginRO" => {
                arity(command, &args, 1)?;
                Instruction::BeginRo {
                    txn: args[0].to_string(),
                }
            }
            "R" => {
                arity(command, &args, 2)?;
                Instruction::Read {
                    txn: args[0].to_string(),
                    var: parse_var(args[1])?,
                }
            }
            "W" => {
                arity(command, &args, 3)?;
                Instruction::Write {
                    txn: args[0].to_string(),
                    var: parse_var(args[1])?,
                    value: parse_value(args[2])?,
                }
            }
            "end" => {
                arity(command, &args, 1)?;
                Instruction::End {
                    txn: args[0].to_string(),
                }
            }
            "fail" => {
                arity(command, &args, 1)?;
                Instruction::Fail {
                    site: parse_site(args[0])?,
                }
            }
            "recover" => {
                arity(command, &args, 1)?;
                Instruction::Recover {
                    site: parse_site(args[0])?,
                }
            }
            "dump" => {
                arity(command, &args, 0)?;
                Instruction::Dump
            }
            other => return Err(ScriptError::UnknownCommand(other.to_string())),
        };
        Ok(Some(instruction))
    }
}

fn arity(command: &str, args: &[&str], expected: usize) -> Result<(), ScriptError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ScriptError::Arity {
            command: command.to_string(),
            expected,
            found: args.len(),
        })
    }
}

fn parse_var(token: &str) -> Result<VarId, ScriptError> {
    token
        .strip_prefix('x')
        .and_then(|digits| digits.parse::<u16>().ok())
        .map(VarId)
        .ok_or_else(|| ScriptError::InvalidVariable(token.to_string()))
}

fn parse_site(token: &str) -> Result<SiteId, ScriptError> {
    token
        .parse::<u16>()
        .map(SiteId)
        .map_err(|_| ScriptError::InvalidSite(token.to_string()))
}

fn parse_value(token: &str) -> Result<Value, ScriptError> {
    token
        .parse::<Value>()
        .map_err(|_| ScriptError::InvalidValue(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_form() {
        assert_eq!(
            Instruction::parse("begin(T1)").unwrap(),
            Some(Instruction::Begin { txn: "T1".into() })
        );
        assert_eq!(
            Instruction::parse("beginRO(T2)").unwrap(),
            Some(Instruction::BeginRo { txn: "T2".into() })
        );
        assert_eq!(
            Instruction::parse("R(T1,x4)").unwrap(),
            Some(Instruction::Read {
                txn: "T1".into(),
                var: VarId(4),
            })
        );
        assert_eq!(
            Instruction::parse("W(T1,x6,v)").unwrap_err().to_string(),
            "invalid value \"v\""
        );
        assert_eq!(
            Instruction::parse("W(T1,x6,-3)").unwrap(),
            Some(Instruction::Write {
                txn: "T1".into(),
                var: VarId(6),
                value: -3,
            })
        );
        assert_eq!(
            Instruction::parse("end(T1)").unwrap(),
            Some(Instruction::End { txn: "T1".into() })
        );
        assert_eq!(
            Instruction::parse("fail(7)").unwrap(),
            Some(Instruction::Fail { site: SiteId(7) })
        );
        assert_eq!(
            Instruction::parse("recover(7)").unwrap(),
            Some(Instruction::Recover { site: SiteId(7) })
        );
        assert_eq!(Instruction::parse("dump()").unwrap(), Some(Instruction::Dump));
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        assert_eq!(
            Instruction::parse("  W( T1 , x2 , 10 )  ").unwrap(),
            Some(Instruction::Write {
                txn: "T1".into(),
                var: VarId(2),
                value: 10,
            })
        );
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped() {
        assert_eq!(Instruction::parse("").unwrap(), None);
        assert_eq!(Instruction::parse("   ").unwrap(), None);
        assert_eq!(Instruction::parse("// a comment").unwrap(), None);
        assert_eq!(
            Instruction::parse("fail(2) // site two dies").unwrap(),
            Some(Instruction::Fail { site: SiteId(2) })
        );
    }

    #[test]
    fn test_malformed_lines_are_rejected() {
        assert!(matches!(
            Instruction::parse("begin T1"),
            Err(ScriptError::Malformed(_))
        ));
        assert!(matches!(
            Instruction::parse("begin(T1"),
            Err(ScriptError::Malformed(_))
        ));
        assert!(matches!(
            Instruction::parse("frob(T1)"),
            Err(ScriptError::UnknownCommand(_))
        ));
        assert!(matches!(
            Instruction::parse("R(T1)"),
            Err(ScriptError::Arity { .. })
        ));
        assert!(matches!(
            Instruction::parse("R(T1,y3)"),
            Err(ScriptError::InvalidVariable(_))
        ));
        assert!(matches!(
            Instruction::parse("fail(two)"),
            Err(ScriptError::InvalidSite(_))
        ));
        assert!(matches!(
            Instruction::parse("dump(3)"),
            Err(ScriptError::Arity { .. })
        ));
    }
}
