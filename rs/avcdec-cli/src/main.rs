mod decode;
mod log;

use decode::*;

use anyhow::Context;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Clone)]
#[command(name = "avcdec", version, about)]
pub struct Cli {
	#[command(flatten)]
	log: log::Log,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Clone)]
pub enum Command {
	/// Print the access units of an Annex-B stream.
	Split {
		/// The Annex-B input, or `-` for stdin.
		#[arg(long, default_value = "-")]
		input: PathBuf,
	},

	/// Decode an Annex-B stream into raw I420 pictures.
	Decode {
		/// The Annex-B input, or `-` for stdin.
		#[arg(long, default_value = "-")]
		input: PathBuf,

		/// Where to write the decoded pictures, or `-` for stdout.
		#[arg(long)]
		output: PathBuf,

		/// Load the decoder configuration from a TOML file.
		///
		/// Flags given on the command line override the file.
		#[arg(long)]
		config: Option<PathBuf>,

		/// The decoder configuration.
		///
		/// The width and height must match the stream.
		#[command(flatten)]
		decoder: avcdec::Config,
	},
}

fn main() -> anyhow::Result<()> {
	let matches = Cli::command().get_matches();
	let cli = Cli::from_arg_matches(&matches)?;

	cli.log.init();

	match cli.command {
		Command::Split { input } => split(&read(&input)?),
		Command::Decode {
			input,
			output,
			config,
			decoder,
		} => {
			let decoder = match config {
				Some(path) => {
					let matches = matches
						.subcommand_matches("decode")
						.context("missing decode arguments")?;
					load(&path, matches)?
				}
				None => decoder,
			};

			let interface = decoder.init().context("invalid decoder configuration")?;
			decode(interface, read(&input)?, &output)
		}
	}
}

/// Load the configuration file, then re-apply any flags given on the command line.
fn load(path: &Path, matches: &clap::ArgMatches) -> anyhow::Result<avcdec::Config> {
	let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
	let mut config: avcdec::Config =
		toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;

	config.update_from_arg_matches(matches)?;
	tracing::debug!(?config, path = %path.display(), "loaded config");

	Ok(config)
}

fn read(path: &Path) -> anyhow::Result<bytes::Bytes> {
	let mut data = Vec::new();

	if path == Path::new("-") {
		std::io::stdin()
			.read_to_end(&mut data)
			.context("failed to read stdin")?;
	} else {
		data = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
	}

	Ok(data.into())
}

fn split(data: &bytes::Bytes) -> anyhow::Result<()> {
	let mut count = 0;

	for (index, unit) in avcdec::annexb::AccessUnits::new(data.clone()).enumerate() {
		let types: Vec<String> = avcdec::annexb::nals(&unit)
			.map(|nal| match avcdec::annexb::NalType::of(nal) {
				Some(kind) => format!("{kind:?}"),
				None => format!("Unknown({})", nal.first().map_or(0, |b| b & 0x1f)),
			})
			.collect();

		println!("{index}\t{}\t{}", unit.len(), types.join(","));
		count += 1;
	}

	tracing::info!(count, bytes = data.len(), "split stream");
	Ok(())
}
