//! CLI commands for waymill.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{ExtractorConfig, DEFAULT_SMALL_COMPONENT_SIZE};
use crate::extractor::Extractor;
use crate::osm::PbfSource;
use crate::profile::CarProfile;

#[derive(Parser)]
#[command(name = "waymill")]
#[command(about = "Turns raw street-map dumps into routing-ready edge-expanded graphs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a routing graph from a map dump
    Extract {
        /// Input map dump (PBF)
        input: PathBuf,

        /// Output prefix; artifacts land at <prefix>.nbg_nodes, <prefix>.ebg, ...
        #[arg(short, long)]
        output: PathBuf,

        /// Classification profile
        #[arg(long, default_value = "car")]
        profile: String,

        /// Worker threads (0 = all cores)
        #[arg(short, long, default_value = "0")]
        threads: usize,

        /// Components smaller than this are flagged as unreachable islands
        #[arg(long, default_value_t = DEFAULT_SMALL_COMPONENT_SIZE)]
        small_component_size: u32,

        /// Ignore source metadata (replication timestamp)
        #[arg(long)]
        no_metadata: bool,

        /// Skip the node-location cache even for location-dependent profiles
        #[arg(long)]
        no_locations_cache: bool,

        /// Accept time-conditional turn restrictions
        #[arg(long)]
        parse_conditionals: bool,
    },
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Extract {
                input,
                output,
                profile,
                threads,
                small_component_size,
                no_metadata,
                no_locations_cache,
                parse_conditionals,
            } => {
                if profile != "car" {
                    anyhow::bail!("unknown profile {profile}; available: car");
                }

                let mut config = ExtractorConfig::new(input.clone(), output);
                config.requested_threads = threads;
                config.small_component_size = small_component_size;
                config.use_metadata = !no_metadata;
                config.use_locations_cache = !no_locations_cache;
                config.parse_conditionals = parse_conditionals;

                let mut source = PbfSource::new(input);
                let summary = Extractor::new(config).run(&CarProfile, &mut source)?;

                println!(
                    "extracted {} edge-based nodes, {} edges, {} components in {:.2}s",
                    summary.edge_based_nodes,
                    summary.edge_based_edges,
                    summary.components,
                    summary.total_ms as f64 / 1000.0
                );
                Ok(())
            }
        }
    }
}
