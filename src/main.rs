//! `asg-scales`: tracks a toy model and writes its scale chart.

use asg_scales::analysis::graph_to_table;
use asg_scales::asg::{DType, Value};
use asg_scales::nn::{Linear, Module};
use asg_scales::plot::{plot, PlotOptions};
use asg_scales::tensor::{GraphContext, Tensor};
use asg_scales::tracking::ScaleTracker;

use clap::Parser;
use log::info;
use ndarray::Array2;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Scale chart of a toy relu -> linear -> sum model",
    long_about = None
)]
struct Args {
    /// Metric to plot (short or full name), overrides the config file
    #[arg(short, long)]
    metric: Option<String>,

    /// JSON file with plot options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output chart, PNG if the extension is .png, SVG otherwise
    #[arg(short, long, default_value = "scales.svg")]
    output: PathBuf,

    #[arg(long, default_value_t = 16)]
    batch: usize,

    /// Input width; the linear layer maps dim -> dim / 2
    #[arg(long, default_value_t = 256)]
    dim: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Skip the backward pass
    #[arg(long)]
    no_backward: bool,

    /// Print the table as JSON records
    #[arg(long)]
    json: bool,

    /// More log output (-v, -vv, ...)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    stderrlog::new()
        .module(module_path!())
        .verbosity(usize::from(args.verbose) + 1)
        .init()?;

    let mut options = match &args.config {
        Some(path) => PlotOptions::from_json_file(path)?,
        None => PlotOptions::default(),
    };
    if let Some(metric) = &args.metric {
        options.metric = metric.clone();
    }
    if options.title.is_empty() {
        options.title = "relu -> linear -> sum".to_string();
    }
    // fail on a bad metric before doing any work
    options.metric_name()?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let ctx = GraphContext::shared();
    let fc = Linear::new(&ctx, "linear", args.dim, (args.dim / 2).max(1), &mut rng);
    let x = Tensor::new_input(&ctx, "x", DType::F32);
    let loss = fc.forward(&x.relu()).sum();

    let data = Array2::<f32>::random_using((args.batch, args.dim), StandardNormal, &mut rng);
    let feeds = HashMap::from([("x".to_string(), Value::F32(data.into_dyn()))]);

    let mut tracker = ScaleTracker::new(&ctx);
    tracker.forward(&feeds, &[&loss])?;
    if !args.no_backward {
        tracker.backward(&loss)?;
    }
    let graph = tracker.scales_graph()?;

    let table = graph_to_table(&graph);
    if args.json {
        println!("{}", table.to_json()?);
    } else {
        print!("{}", table);
    }

    let chart = plot(&graph, &options)?;
    let is_png = args
        .output
        .extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("png"));
    if is_png {
        chart.render_png(&args.output)?;
    } else {
        chart.render_svg(&args.output)?;
    }
    info!("{} rows plotted", chart.rows.len());
    Ok(())
}
