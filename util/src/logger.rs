//! Logging setup shared by every binary built on top of this workspace.
//! Configures `log4rs` behind the `log` facade: a stdout appender plus an
//! optional size-rotated file appender under `data_dir/logs/`.

use std::path::PathBuf;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::Mutex;

const LOGGING_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} {t} - {m}{n}";
const MAX_LOG_FILE_SIZE: u64 = 16 * 1024 * 1024;
const MAX_LOG_FILES: u32 = 8;

lazy_static! {
	/// Guards against double initialization (tests and integration
	/// harnesses may call `init_logger` more than once).
	static ref WAS_INIT: Mutex<bool> = Mutex::new(false);
}

/// Logging verbosity, mirrored from `NodeConfig` so this crate has no
/// dependency on `ledger_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
	Error,
	Warning,
	Info,
	Debug,
	Trace,
}

impl From<LogLevel> for LevelFilter {
	fn from(level: LogLevel) -> LevelFilter {
		match level {
			LogLevel::Error => LevelFilter::Error,
			LogLevel::Warning => LevelFilter::Warn,
			LogLevel::Info => LevelFilter::Info,
			LogLevel::Debug => LevelFilter::Debug,
			LogLevel::Trace => LevelFilter::Trace,
		}
	}
}

/// Initializes the global logger. `log_dir` of `None` disables the file
/// appender and logs to stdout only, which is what the test suite uses.
pub fn init_logger(level: LogLevel, log_dir: Option<PathBuf>) {
	let mut was_init = WAS_INIT.lock();
	if *was_init {
		return;
	}

	let stdout = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
		.build();

	let mut builder = Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
	let mut root = Root::builder().appender("stdout");

	if let Some(dir) = log_dir {
		let log_file = dir.join("ledgerd.log");
		let roll_pattern = dir.join("ledgerd.{}.log.gz");
		let trigger = SizeTrigger::new(MAX_LOG_FILE_SIZE);
		let roller = FixedWindowRoller::builder()
			.build(&roll_pattern.to_string_lossy(), MAX_LOG_FILES)
			.expect("fixed window roller pattern is well-formed");
		let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));
		if let Ok(file) = RollingFileAppender::builder()
			.encoder(Box::new(PatternEncoder::new(LOGGING_PATTERN)))
			.build(&log_file, Box::new(policy))
		{
			builder = builder.appender(Appender::builder().build("file", Box::new(file)));
			root = root.appender("file");
		}
	}

	let config = builder
		.build(root.build(level.into()))
		.expect("logger configuration is well-formed");

	if log4rs::init_config(config).is_ok() {
		*was_init = true;
	}
}
