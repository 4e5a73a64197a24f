use crate::config::{Config, load_config};
use crate::ir::Graph;
use crate::layout_dump::{LayoutDump, write_layout_dump, write_layout_dump_file};
use crate::regenerate::regenerate_prompt;
use crate::session::Session;
use crate::tabular::Tables;
use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "clusterflow", version, about = "Lay out clustered node diagrams from a small text language")]
pub struct Args {
    /// Input file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file with layout and routing overrides
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Graph (or layout dump) JSON to reconcile against, keeping ids and positions
    #[arg(short = 'p', long = "previous")]
    pub previous: Option<PathBuf>,

    /// Treat the input as node and edge tables in JSON
    #[arg(long = "tables")]
    pub tables: bool,

    /// Print the canonical diagram text instead of the layout dump
    #[arg(long = "regenerate")]
    pub regenerate: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

pub fn run(args: &Args) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let input = read_input(args.input.as_deref())?;
    let previous = match args.previous.as_deref() {
        Some(path) => Some(read_previous(path)?),
        None => None,
    };

    let output = produce(args, &input, previous, config)?;
    match args.output.as_deref() {
        Some(path) if args.regenerate => {
            std::fs::write(path, output.text.unwrap_or_default())
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Some(path) => {
            if let Some(dump) = &output.dump {
                write_layout_dump_file(path, dump)?;
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            if let Some(text) = &output.text {
                writeln!(handle, "{text}")?;
            }
            if let Some(dump) = &output.dump {
                write_layout_dump(&mut handle, dump)?;
                writeln!(handle)?;
            }
        }
    }
    info!("done");
    Ok(())
}

struct Output {
    text: Option<String>,
    dump: Option<LayoutDump>,
}

fn produce(args: &Args, input: &str, previous: Option<Graph>, config: Config) -> Result<Output> {
    let text = if args.tables {
        Tables::from_json(input).context("invalid tables document")?.to_dsl()
    } else {
        input.to_string()
    };
    debug!("diagram text has {} lines", text.lines().count());

    let mut session = match previous {
        Some(graph) => Session::with_graph(graph, config),
        None => Session::new(config),
    };
    session.update_from_text(&text);

    if args.regenerate {
        return Ok(Output {
            text: Some(regenerate_prompt(session.graph())),
            dump: None,
        });
    }
    Ok(Output {
        text: None,
        dump: Some(LayoutDump::from_graph(session.graph(), session.config())),
    })
}

fn read_previous(path: &Path) -> Result<Graph> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a graph document", path.display()))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
