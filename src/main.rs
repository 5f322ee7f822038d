// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use pointtab::{distinct_labels, plot, read_headers, Loader, LoaderConfig, SessionCache};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Load coordinates + metadata CSVs and summarize the merged matrix")]
struct Args {
    /// CSV with one row per point: embedding/spatial coordinates
    #[arg(long)]
    coords: PathBuf,

    /// CSV with one row per point: observation metadata
    #[arg(long)]
    obs: PathBuf,

    /// Metadata columns to load, comma separated (default: every header)
    #[arg(long, value_delimiter = ',')]
    labels: Vec<String>,

    /// Label to report the colour range for (default: the first label)
    #[arg(long)]
    color_label: Option<String>,

    /// YAML loader config
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    let args = Args::parse();

    // ─── 2) config ───────────────────────────────────────────────────
    let config = match &args.config {
        Some(path) => LoaderConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LoaderConfig::default(),
    };

    // ─── 3) labels: all headers unless narrowed ──────────────────────
    let labels = if args.labels.is_empty() {
        let headers = read_headers(&args.obs, &config)
            .with_context(|| format!("reading headers of {}", args.obs.display()))?;
        let labels = distinct_labels(&headers);
        info!("no labels given, using all {} headers", labels.len());
        labels
    } else {
        args.labels.clone()
    };

    // ─── 4) load, merge, cache ───────────────────────────────────────
    let loader = Loader::new(config);
    let mut cache = SessionCache::in_memory();
    let summary = plot(&mut cache, &loader, &args.coords, &args.obs, &labels)
        .context("plotting data")?;

    if summary.diagnostics.repaired() > 0 {
        warn!(diagnostics = ?summary.diagnostics, "input needed repairs");
    }

    // ─── 5) report ───────────────────────────────────────────────────
    let color_label = args
        .color_label
        .clone()
        .or_else(|| labels.first().cloned())
        .context("no label to colour by")?;
    let max_color = cache
        .label_max(&color_label)
        .with_context(|| format!("colour range for `{}`", color_label))?;

    if args.json {
        let out = serde_json::json!({
            "summary": summary,
            "color_label": color_label,
            "max_color": max_color,
            "categories": cache.categories_for(&color_label),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "{} points, {} coordinate columns, {} labels",
            summary.points,
            summary.coord_cols,
            summary.labels.len()
        );
        for (label, is_cat) in summary.labels.iter().zip(&summary.categorical) {
            let kind = if *is_cat { "categorical" } else { "numeric" };
            println!("  {:<24} {}", label, kind);
        }
        println!("colour label `{}`: max {}", color_label, max_color);
    }

    Ok(())
}
