use tracing_subscriber::EnvFilter;

/// Logging configuration.
#[derive(Clone, Debug, clap::Args)]
pub struct Log {
	/// The log filter, using the `RUST_LOG` syntax (ex. `info,avcdec=trace`).
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "RUST_LOG")]
	pub level: String,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: "info".into() }
	}
}

impl Log {
	/// Install a global subscriber writing to stderr; stdout may carry decoded pictures.
	pub fn init(&self) {
		let filter = EnvFilter::try_new(&self.level).unwrap_or_else(|err| {
			eprintln!("invalid log filter {:?}: {err}", self.level);
			EnvFilter::new("info")
		});

		tracing_subscriber::fmt()
			.with_env_filter(filter)
			.with_writer(std::io::stderr)
			.init();
	}
}
