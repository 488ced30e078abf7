// This file is a part of Audit-Inspector
// Copyright (C) 2024 Kiersten Gross

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::{fs::File, io::Write};
use clap::{Parser, Subcommand};
use anyhow::Result;
use console::Style;
use lazy_static::lazy_static;
use tracing_subscriber::EnvFilter;
mod analysis;
mod cli;
mod fortigate;
mod info;
mod node;

use analysis::ConfigCheck;
use fortigate::{FortiGateConfig, Scope};

lazy_static!{
    static ref ERR_STYLE: Style = Style::new().red().bold();
    static ref HEADER_STYLE: Style = Style::new().bold();
    static ref OK_STYLE: Style = Style::new().green();
}

#[derive(Parser)]
#[command(name="FGT Insight", version)]
struct Args {
    /// FortiGate backup, or a .json document written by `save`
    #[arg(short='i', long, required = true)]
    input: String,
    /// Force the text encoding of the backup (e.g. utf-16le)
    #[arg(short='e', long)]
    encoding: Option<String>,
    #[arg(short='v', long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the device information found in the backup header
    Info,
    /// Print the configuration below a path as JSON
    Get {
        #[arg(short='s', long, value_enum, default_value_t = Scope::Global)]
        scope: Scope,
        #[arg(short='p', long, default_value = "/")]
        path: String,
    },
    /// List the VDOMs of a multi-VDOM device
    Vdoms,
    /// Run check bundles and print every failed condition
    Check {
        /// Bundle file or directory of bundles, defaults to a `checks` directory
        #[arg(short='c', long)]
        checks: Option<String>,
        #[arg(long)]
        json: bool,
        /// Also write the failures to this file (`pwd` for the current directory)
        #[arg(short='o', long)]
        output: Option<String>,
    },
    /// Save the parsed configuration as JSON for later runs
    Save {
        #[arg(short='o', long, required = true)]
        output: String,
    },
}

fn main() -> Result<()> {
    eprintln!("FGT Insight v{}, Copyright (C) 2024 Kiersten Gross\n\nThis project is licensed under the GNU General Public License v3.0. <https://www.gnu.org/licenses/>.\nThis program comes with ABSOLUTELY NO WARRANTY.\n", env!("CARGO_PKG_VERSION").to_owned());
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    let input_path = cli::parse_input_path(&args.input)?;
    let config = FortiGateConfig::from_path(&input_path, args.encoding.as_deref())?;

    match args.command {
        Command::Info => {
            println!("{}", HEADER_STYLE.apply_to("Device Information"));
            println!("{}", config.info);
            let vdoms = config.get_vdoms();
            if vdoms.is_empty() {
                println!("{:<14}{}", "vdoms", "single VDOM mode");
            } else {
                println!("{:<14}{}", "vdoms", vdoms.join(", "));
            }
        }
        Command::Get { scope, path } => {
            match config.get_configuration(scope, &path) {
                Some(node) => println!("{}", serde_json::to_string_pretty(node)?),
                None => eprintln!("{}", ERR_STYLE.apply_to(format!("No data at {} in the {} scope.", path, scope))),
            }
        }
        Command::Vdoms => {
            for vdom in config.get_vdoms() {
                println!("{}", vdom);
            }
        }
        Command::Check { checks, json, output } => {
            let checks_path = match checks {
                Some(v) => cli::parse_input_path(&v)?,
                None => cli::find_checks_dir()?,
            };
            let output_path = output.map(|v| cli::parse_output_path(&v, "fgt-insight-results.txt")).transpose()?;
            let checks = cli::load_checks(&checks_path)?;

            let results = ConfigCheck::new(&config).execute(&checks)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("{}", OK_STYLE.apply_to(format!("No failures found by {} checks for {}.", checks.len(), config.info.hostname)));
            } else {
                println!("{}", HEADER_STYLE.apply_to("Failures"));
                for result in results.iter() {
                    println!("{}", ERR_STYLE.apply_to(result));
                }
            }

            if let Some(path) = output_path {
                let mut out_file = File::create(&path)?;
                out_file.write_all(format!("Failures\n{}\n", results.join("\n")).as_bytes())?;
            }

            if !results.is_empty() {
                std::process::exit(1);
            }
        }
        Command::Save { output } => {
            let output_path = cli::parse_output_path(&output, "fgt-insight.json")?;
            config.save(&output_path)?;
            println!("Saved {} to {}.", input_path.display(), output_path.display());
        }
    }

    Ok(())
}
