use clap::Parser;
use std::process;

use rust_ewald::{read_run_config, Ewald, EwaldEnergy, Result, ShardSummary, ShardedEwald};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// YAML run description
    #[arg(short, long, default_value = "ewald.yml")]
    config: String,

    /// Override the number of worker threads from the config file
    #[arg(short, long)]
    threads: Option<usize>,

    /// Print the per-particle energies of every configuration
    #[arg(long)]
    per_particle: bool,
}

fn run(args: &Args) -> Result<()> {
    let config = read_run_config(&args.config)?;
    let cell = config.cell()?;
    let configs = config.configurations(&cell)?;
    let threads = config.num_threads(args.threads);
    let nshards = config.num_shards(args.threads);

    let ewald = Ewald::new(cell, config.ewald)?;
    let report = ewald.convergence_report();

    println!("Ewald Summation Results");
    println!("----------------------------------------");
    println!("Alpha: {:.6}", report.alpha);
    println!("Lattice displacements: {}", report.num_displacements);
    println!("Reciprocal vectors: {}", report.num_gpoints);
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }
    println!("Configurations: {}", configs.nconf());
    println!("Electrons per configuration: {}", configs.nelec());

    let driver = ShardedEwald::new(&ewald, threads)?;
    let parts = driver.evaluate_shards(&configs, nshards)?;
    let energy = EwaldEnergy::concat(&parts)?;
    let summaries: Vec<ShardSummary> = parts.iter().map(ShardSummary::from_energy).collect();

    if let Some(mean) = ShardSummary::merge(&summaries) {
        println!("Electron-electron energy: {:.10} Ha", mean.ee);
        println!("Electron-ion energy: {:.10} Ha", mean.ei);
    }
    println!("Ion-ion energy: {:.10} Ha", energy.ii);
    if energy.nconf() > 0 {
        println!("Total energy: {:.10} Ha", energy.total().mean());
    }

    if args.per_particle {
        print_per_particle(&energy);
    }
    Ok(())
}

fn print_per_particle(energy: &EwaldEnergy) {
    let separated = energy.energy_separated();
    for (c, row) in separated.row_iter().enumerate() {
        let values: Vec<String> = row.iter().map(|v| format!("{:.8}", v)).collect();
        println!("Configuration {}: {}", c, values.join(" "));
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
