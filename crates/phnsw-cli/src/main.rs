//! `phnsw` — command-line runner for the phnsw accelerator simulator.
//!
//! ```text
//! USAGE:
//!   phnsw run <program> [--config FILE] [--max-cycles N]
//!             [--preload FILE@ADDR]... [--show REG]...
//!   phnsw dump <program>             Print the decoded program image
//!   phnsw registers                  Print the register catalog
//!   phnsw opcodes                    Print the opcode table
//!   phnsw config [--config FILE]     Print the effective config as TOML
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use phnsw_core::catalog::CATALOG;
use phnsw_core::isa::OPCODE_TABLE;
use phnsw_core::{CycleLimit, Program, RegisterValue, SimConfig, Simulator};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "phnsw", about = "phnsw graph-search accelerator simulator", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a program until END or the cycle budget runs out.
    Run {
        /// Assembly program file.
        program: PathBuf,
        /// TOML simulator config (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the config's cycle budget.
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Copy a binary file into memory before the run (e.g. vectors.bin@0x138c00).
        #[arg(long, value_name = "FILE@ADDR")]
        preload: Vec<String>,
        /// Print a register after the run.
        #[arg(long, value_name = "REG")]
        show: Vec<String>,
    },
    /// Print the decoded program image, one slot per block.
    Dump {
        /// Assembly program file.
        program: PathBuf,
    },
    /// Print the register catalog.
    Registers,
    /// Print the opcode table with destinations and pipeline depths.
    Opcodes,
    /// Print the effective simulator config as a `[phnsw]` TOML section.
    Config {
        /// TOML simulator config (defaults apply when omitted).
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run { program, config, max_cycles, preload, show } => {
            cmd_run(&program, config.as_deref(), max_cycles, &preload, &show)?;
        }
        Cmd::Dump { program } => cmd_dump(&program)?,
        Cmd::Registers => cmd_registers(),
        Cmd::Opcodes => cmd_opcodes(),
        Cmd::Config { config } => cmd_config(config.as_deref())?,
    }

    Ok(())
}

fn cmd_run(
    program: &Path,
    config: Option<&Path>,
    max_cycles: Option<u64>,
    preload: &[String],
    show: &[String],
) -> Result<()> {
    let config = load_config(config)?;
    let budget = max_cycles.unwrap_or(config.max_cycles);

    let image = Program::load(program)?;
    let mut sim = Simulator::new(image, &config)?;

    for spec in preload {
        let (file, addr) = parse_preload(spec)?;
        let bytes = std::fs::read(&file)
            .with_context(|| format!("Failed to read preload file {}", file.display()))?;
        sim.memory_mut().load_memory(addr, &bytes)?;
        info!("Preloaded {} bytes at {addr:#x} from {}", bytes.len(), file.display());
    }

    let summary = sim
        .run(&mut CycleLimit::new(budget))
        .with_context(|| format!("Run aborted at pc {}", sim.engine().pc()))?;

    println!("Program : {}", program.display());
    println!("Clock   : {}", config.clock);
    println!("{summary}");

    if !show.is_empty() {
        println!();
        for name in show {
            let reg = sim.registers().lookup(name)?;
            println!("{name:<16} = {}", format_value(reg.value()));
        }
    }

    if !summary.halted {
        bail!("Cycle budget of {budget} exhausted before END");
    }
    Ok(())
}

fn cmd_dump(program: &Path) -> Result<()> {
    let image = Program::load(program)?;
    println!(
        "{}: {} slots, {} instructions",
        program.display(),
        image.len(),
        image.instruction_count()
    );
    println!();
    print!("{image}");
    Ok(())
}

fn cmd_registers() {
    println!("{:<16} {:<12} {:<18} Purpose", "Name", "Shape", "Group");
    for spec in CATALOG {
        println!(
            "{:<16} {:<12} {:<18} {}",
            spec.name,
            spec.kind.to_string(),
            spec.group.to_string(),
            spec.description
        );
    }
}

fn cmd_opcodes() {
    println!("{:<6} {:>5}  {:<32} Description", "Op", "Depth", "Destinations");
    for spec in &OPCODE_TABLE {
        let dests: Vec<&str> = spec.dests.iter().flatten().copied().collect();
        let dests = if dests.is_empty() { "none".to_string() } else { dests.join(", ") };
        println!(
            "{:<6} {:>5}  {:<32} {}",
            spec.opcode.mnemonic(),
            spec.depth,
            dests,
            spec.description
        );
    }
}

fn cmd_config(path: Option<&Path>) -> Result<()> {
    print!("{}", render_config(&load_config(path)?)?);
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    match path {
        Some(path) => {
            SimConfig::load(path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => Ok(SimConfig::default()),
    }
}

/// Render `config` under a `[phnsw]` section, the form `SimConfig::load` reads.
fn render_config(config: &SimConfig) -> Result<String> {
    let mut root = toml::Table::new();
    root.insert("phnsw".to_string(), toml::Value::try_from(config)?);
    Ok(toml::to_string_pretty(&root)?)
}

/// Split `FILE@ADDR`; the address is decimal or `0x`-prefixed hex.
fn parse_preload(spec: &str) -> Result<(PathBuf, u64)> {
    let Some((file, addr)) = spec.rsplit_once('@') else {
        bail!("Preload '{spec}' is not FILE@ADDR");
    };
    let addr = match addr.strip_prefix("0x").or_else(|| addr.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => addr.parse(),
    }
    .with_context(|| format!("Bad preload address '{addr}'"))?;
    Ok((PathBuf::from(file), addr))
}

fn format_value(value: &RegisterValue) -> String {
    match value {
        RegisterValue::Array8(v) => format!("{:?}", trim_zeros(&v[..])),
        RegisterValue::Array32(v) => format!("{:?}", trim_zeros(&v[..])),
        scalar => {
            let v = scalar.first_scalar();
            format!("{v} ({v:#x})")
        }
    }
}

/// Drop trailing zero elements; list registers are mostly empty.
fn trim_zeros<T: Default + PartialEq>(v: &[T]) -> &[T] {
    let zero = T::default();
    let end = v.iter().rposition(|x| *x != zero).map_or(0, |i| i + 1);
    &v[..end]
}
