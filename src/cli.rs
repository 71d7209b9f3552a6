// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::Parser;

/// Reads one user message from stdin, runs it through the conversational
/// agent core, and writes the assistant's reply to stdout.
#[derive(Parser, Debug)]
#[command(name = "agentcore", about = "Conversational agent core")]
pub struct Cli {
    /// Explicit config file, merged on top of the usual search paths.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Session id to append this turn to and resume history from.
    /// Defaults to a fresh random session.
    #[arg(short, long)]
    pub session: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace). Quiet by default.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
