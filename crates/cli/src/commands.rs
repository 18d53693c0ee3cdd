use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use model::harvest::HarvestRequest;

#[derive(Subcommand)]
pub enum Commands {
    /// Harvest a window of any length, split into sub-ranges, and print the report as JSON
    Harvest {
        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, help = "Page budget shared by all sub-ranges (default 100)")]
        max_pages: Option<u32>,
    },
    /// Harvest a single sub-range and print the report as JSON
    Range {
        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, help = "Page budget of this call (default 50)")]
        max_pages: Option<u32>,
    },
    /// Show the stored checkpoint of a window
    Progress {
        #[command(flatten)]
        window: WindowArgs,

        #[arg(
            long,
            help = "If set, prints the checkpoint as JSON instead of a table"
        )]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    #[arg(long, help = "Window start (RFC 3339), inclusive")]
    pub start: DateTime<Utc>,

    #[arg(long, help = "Window end (RFC 3339), exclusive")]
    pub end: DateTime<Utc>,

    #[arg(long, help = "Seller SKU to restrict the harvest to; omit for all items")]
    pub scope: Option<String>,
}

impl WindowArgs {
    pub fn request(&self, max_pages: Option<u32>) -> HarvestRequest {
        HarvestRequest {
            window_start: self.start,
            window_end: self.end,
            scope: self.scope.clone(),
            max_pages,
        }
    }
}
