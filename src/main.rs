use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use tracing::{Level, info};

/// Compile a tiny C-like expression language to x86-64 assembly.
#[derive(Parser, Debug)]
#[command(name = "rs9cc", version, about, long_about = None)]
struct Cli {
  /// Program text, e.g. "a=3; b=a*2; a+b;"
  program: String,

  /// Write the assembly here instead of stdout.
  #[arg(short, long)]
  output: Option<PathBuf>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace).
  #[arg(short, long, action = ArgAction::Count)]
  verbose: u8,
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => Level::WARN,
    1 => Level::INFO,
    2 => Level::DEBUG,
    _ => Level::TRACE,
  };
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_writer(io::stderr)
    .init();
}

fn write_lines(lines: &[String], out: impl Write) -> io::Result<()> {
  let mut out = BufWriter::new(out);
  for line in lines {
    writeln!(out, "{line}")?;
  }
  out.flush()
}

fn main() {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let lines = match rs9cc::compile(&cli.program) {
    Ok(lines) => lines,
    Err(err) => {
      eprintln!("{err}");
      process::exit(1);
    }
  };

  let written = match &cli.output {
    Some(path) => File::create(path).and_then(|file| write_lines(&lines, file)),
    None => write_lines(&lines, io::stdout().lock()),
  };

  if let Err(err) = written {
    eprintln!("rs9cc: failed to write assembly: {err}");
    process::exit(1);
  }

  info!(lines = lines.len(), "compilation finished");
}
