//! Command-line host for plugflow extensions.
//!
//! # Responsibility
//! - Bootstrap a host from a config file and command-line overrides.
//! - List, inspect, and run extensions and workflows.

use clap::{Parser, Subcommand};
use log::error;
use plugflow_core::{
    init_logging, init_stderr_logging, CallArgs, ConfigError, Host, HostConfig, EXECUTE_METHOD,
};
use plugflow_logger::LoggerExtension;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;

const LOGGER_BUILTIN: &str = "logger";

/// Extension host and workflow runner.
#[derive(Parser, Debug)]
#[command(name = "plugflow")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Host config file (YAML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extension directory; repeat to scan several. Replaces configured dirs.
    #[arg(short = 'p', long = "plugins-dir", global = true)]
    plugins_dirs: Vec<PathBuf>,

    /// Absolute directory for rolling log files; logs go to stderr without one.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// trace|debug|info|warn|error
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List identifiers found in the extension directories.
    Discover,
    /// Register everything and print each extension's metadata.
    List,
    /// Show metadata of one registered extension.
    Info {
        name: String,
    },
    /// Call an extension or workflow and print its JSON result.
    Run {
        /// Identifier, e.g. `logger` or `workflow:organize`.
        name: String,
        /// Method to call instead of `execute`.
        #[arg(short, long, default_value = EXECUTE_METHOD)]
        method: String,
        /// Positional argument; parsed as JSON, else taken as a string.
        #[arg(short, long = "arg")]
        args: Vec<String>,
        /// Keyword argument as `key=value`; value parsed like `--arg`.
        #[arg(short, long = "kwarg", value_parser = parse_kwarg)]
        kwargs: Vec<(String, Value)>,
    },
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_kwarg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    Ok((key.to_string(), parse_value(value)))
}

fn load_config(args: &Args) -> Result<HostConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => HostConfig::load(path)?,
        None => HostConfig::default(),
    };
    if !args.plugins_dirs.is_empty() {
        config.extension_dirs = args.plugins_dirs.clone();
    }
    if let Some(log_dir) = &args.log_dir {
        config.log_dir = Some(log_dir.clone());
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

fn start_logging(config: &HostConfig) -> Result<(), String> {
    match &config.log_dir {
        Some(log_dir) => init_logging(&config.log_level, &log_dir.to_string_lossy()),
        None => init_stderr_logging(&config.log_level),
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("plugflow: {err}");
            return ExitCode::from(2);
        }
    };

    if let Err(err) = start_logging(&config) {
        eprintln!("plugflow: logging disabled: {err}");
    }

    if let Command::Discover = args.command {
        for id in plugflow_core::discover(&config.extension_dirs) {
            println!("{id}");
        }
        return ExitCode::SUCCESS;
    }

    let host = Host::builder(&config)
        .with_builtin(LOGGER_BUILTIN, || Box::new(LoggerExtension::default()))
        .bootstrap();
    for failure in host.failures() {
        eprintln!("plugflow: failed to register {}: {}", failure.name, failure.reason);
    }

    let code = match args.command {
        Command::Discover => ExitCode::SUCCESS,
        Command::List => {
            for (name, extension) in host.registry().get_all() {
                let info = extension.info();
                println!("{name}\t{} {}\t{}", info.name, info.version, info.description);
            }
            ExitCode::SUCCESS
        }
        Command::Info { name } => match host.registry().get(&name) {
            Some(extension) => match serde_json::to_value(extension.info()) {
                Ok(info) => {
                    print_json(&info);
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("plugflow: {err}");
                    ExitCode::FAILURE
                }
            },
            None => {
                eprintln!("plugflow: extension `{name}` is not registered");
                ExitCode::FAILURE
            }
        },
        Command::Run {
            name,
            method,
            args,
            kwargs,
        } => {
            let call = CallArgs {
                args: args.iter().map(|raw| parse_value(raw)).collect(),
                kwargs: kwargs.into_iter().collect::<Map<String, Value>>(),
            };
            run(&host, &name, &method, &call)
        }
    };

    host.shutdown();
    code
}

fn run(host: &Host, name: &str, method: &str, call: &CallArgs) -> ExitCode {
    let registry = host.registry();
    if method == EXECUTE_METHOD {
        return match registry.execute(name, call) {
            Some(value) => {
                print_json(&value);
                ExitCode::SUCCESS
            }
            None => {
                eprintln!("plugflow: `{name}` failed; see log for details");
                ExitCode::FAILURE
            }
        };
    }

    let Some(extension) = registry.get(name) else {
        eprintln!("plugflow: extension `{name}` is not registered");
        return ExitCode::FAILURE;
    };
    if !extension.has_method(method) {
        eprintln!("plugflow: `{name}` does not expose method `{method}`");
        return ExitCode::FAILURE;
    }
    match extension.call_method(method, call) {
        Ok(value) => {
            print_json(&value);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("event=cli_run module=cli status=error name={name} method={method} error={err}");
            eprintln!("plugflow: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_kwarg, parse_value, Args};
    use clap::Parser;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_or_fall_back_to_strings() {
        assert_eq!(parse_value("3"), json!(3));
        assert_eq!(parse_value("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_value("hello"), json!("hello"));
    }

    #[test]
    fn kwargs_require_a_key() {
        assert_eq!(
            parse_kwarg("level=warning").expect("kwarg"),
            ("level".to_string(), json!("warning"))
        );
        assert_eq!(parse_kwarg("n=1=2").expect("kwarg").1, json!("1=2"));
        assert!(parse_kwarg("novalue").is_err());
        assert!(parse_kwarg("=x").is_err());
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let args = Args::try_parse_from([
            "plugflow",
            "run",
            "workflow:tidy",
            "--kwarg",
            "n=1",
            "-p",
            "a",
            "-p",
            "b",
        ])
        .expect("parse");
        assert_eq!(args.plugins_dirs.len(), 2);
    }
}
