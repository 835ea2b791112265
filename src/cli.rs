use clap::{Args, Parser, Subcommand};
use scripture_pager::{Theme, WeightMetric};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scripture-pager")]
#[command(about = "Paginate scripture chapters into book-like pages and read through them")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the page layout of one chapter
    Paginate(PaginateArgs),

    /// Move through a persisted reading session
    Read(ReadArgs),

    /// Paginate a global verse range regardless of chapter boundaries
    Range(RangeArgs),

    /// Check a verse source for numbering problems
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct LayoutArgs {
    /// Page capacity at font scale 1.0
    #[arg(short, long, default_value = "1000")]
    pub capacity: usize,

    /// How verse weight is measured
    #[arg(long, value_enum, default_value = "chars")]
    pub metric: WeightMetric,
}

#[derive(Args)]
pub struct PaginateArgs {
    /// Corpus JSON file or HTTP base URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Chapter to paginate
    #[arg(long, default_value = "1")]
    pub chapter: u32,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Font scale applied to the capacity
    #[arg(long, default_value = "1.0")]
    pub scale: f32,

    /// Write the pages as JSON to this file
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReadArgs {
    /// Corpus JSON file or HTTP base URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// File holding the persisted reader state
    #[arg(long, value_name = "FILE", default_value = "./reader-state.json")]
    pub state: PathBuf,

    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Skip background fetching of neighbouring chapters
    #[arg(long)]
    pub no_prefetch: bool,

    /// Advance one page
    #[arg(long, group = "action")]
    pub next: bool,

    /// Go back one page
    #[arg(long, group = "action")]
    pub previous: bool,

    /// Go to a page of the current chapter
    #[arg(long, group = "action", value_name = "N")]
    pub page: Option<usize>,

    /// Go to a page counted across the whole corpus
    #[arg(long, group = "action", value_name = "N")]
    pub global_page: Option<usize>,

    /// Jump to the first page of a chapter
    #[arg(long, group = "action", value_name = "ID")]
    pub chapter: Option<u32>,

    /// Jump to the page holding a global verse index
    #[arg(long, group = "action", value_name = "INDEX")]
    pub verse: Option<u32>,

    /// Change the font scale, repaginating around the current verse
    #[arg(long)]
    pub scale: Option<f32>,

    /// Change the display theme
    #[arg(long, value_enum)]
    pub theme: Option<Theme>,
}

#[derive(Args)]
pub struct RangeArgs {
    /// Corpus JSON file or HTTP base URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// First global verse index (inclusive)
    #[arg(long)]
    pub start: u32,

    /// Last global verse index (inclusive)
    #[arg(long)]
    pub end: u32,

    #[command(flatten)]
    pub layout: LayoutArgs,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Corpus JSON file or HTTP base URL
    #[arg(required = true, value_name = "SOURCE")]
    pub sources: Vec<String>,
}
