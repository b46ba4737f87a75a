//! fleetgen CLI
//!
//! Entry point for the `fleetgen` command-line tool.

use clap::{Parser, Subcommand};
use fleetgen::pipeline::{self, PipelineConfig};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "fleetgen")]
#[command(about = "Generate deployment artifacts from a fleet inventory", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the full artifact set from the inventory
    Render {
        /// Path to the base inventory document
        #[arg(long, short = 'i', default_value = "inventory.yml")]
        inventory: PathBuf,

        /// Path to the private override document (optional; a missing
        /// file is treated as empty)
        #[arg(long, default_value = "inventory.private.yml")]
        overrides: PathBuf,

        /// Templates directory (built-in templates when omitted)
        #[arg(long, short = 't')]
        templates: Option<PathBuf>,

        /// Output directory
        #[arg(long, short = 'o', default_value = "generated")]
        out: PathBuf,

        /// Verbose progress on stderr
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Validate the merged inventory without writing anything
    Check {
        /// Path to the base inventory document
        #[arg(long, short = 'i', default_value = "inventory.yml")]
        inventory: PathBuf,

        /// Path to the private override document
        #[arg(long, default_value = "inventory.private.yml")]
        overrides: PathBuf,

        /// Output the report in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            inventory,
            overrides,
            templates,
            out,
            verbose,
        } => {
            let config = PipelineConfig {
                inventory_path: inventory,
                overrides_path: overrides,
                templates_dir: templates,
                out_dir: out,
                verbose,
            };
            run_render(&config);
        }
        Commands::Check {
            inventory,
            overrides,
            json,
        } => {
            let config = PipelineConfig {
                inventory_path: inventory,
                overrides_path: overrides,
                ..PipelineConfig::default()
            };
            run_check(&config, json);
        }
    }
}

fn run_render(config: &PipelineConfig) {
    match pipeline::run(config) {
        Ok(summary) => {
            println!(
                "Generated {} file(s) for {} instance(s) in {}",
                summary.files.len(),
                summary.instance_count,
                summary.out_dir
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

fn run_check(config: &PipelineConfig, json_output: bool) {
    match pipeline::check(config) {
        Ok(report) => {
            if json_output {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        eprintln!("Error serializing output: {}", e);
                        process::exit(1);
                    }
                }
            } else {
                println!("Inventory valid");
                println!();
                for source in &report.sources {
                    println!("  Source: {} ({})", source.path, &source.digest[..12]);
                }
                println!("  IPv4 subnet: {}", report.subnet_ipv4);
                println!("  IPv6 subnet: {}", report.subnet_ipv6);
                println!("  Instances ({}):", report.instance_count);
                for name in &report.instances {
                    println!("    {}", name);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}
