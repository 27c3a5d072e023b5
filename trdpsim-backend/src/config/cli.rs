//! CLI argument parsing for the simulator.
//!
//! This module handles command line argument parsing using clap and provides
//! a structured representation of CLI configuration that can be used by
//! other configuration components.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const DEFAULT_ENDPOINT: &str = "127.0.0.1";

/// Subcommand selected on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    DeviceRegister { files: Vec<PathBuf> },
    DeviceList,
    ScenarioValidate { file: PathBuf },
    ScenarioImport { file: PathBuf },
    ScenarioList,
    ScenarioExport { id: String, destination: PathBuf },
    ScenarioShow { id: String },
    Run(RunOptions),
    RunsList { scenario: Option<String> },
    RunsShow { run_id: String },
}

/// Options of the `run` command.
///
/// The scenario comes from `scenario_file` when set, from `device` and
/// `events` when either is given, and from the repository otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stored scenario id, or the id given to an inline scenario
    pub scenario_id: Option<String>,
    /// Document run without importing it
    pub scenario_file: Option<PathBuf>,
    /// Device profiles registered before the run
    pub device_xmls: Vec<PathBuf>,
    pub device: Option<String>,
    /// Inline event specs, `<pd|md>:label[:comId][:dataset][:payload]`
    pub events: Vec<String>,
    pub no_artefacts: bool,
}

impl RunOptions {
    pub fn is_inline(&self) -> bool {
        self.scenario_file.is_none() && (self.device.is_some() || !self.events.is_empty())
    }
}

/// CLI configuration structure containing all parsed command line arguments
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub verbose: bool,
    pub json: bool,
    pub home: Option<PathBuf>,
    pub scenario_schema: Option<PathBuf>,
    pub device_schema: Option<PathBuf>,
    pub endpoint: String,
    pub command: CliCommand,
}

impl CliConfig {
    /// Parse CLI arguments and create CliConfig
    pub fn from_args() -> Result<Self> {
        let matches = Self::build_cli().get_matches();
        Self::from_matches(&matches)
    }

    /// Create CliConfig from pre-parsed ArgMatches (useful for testing)
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let endpoint = matches
            .get_one::<String>("endpoint")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        Ok(Self {
            verbose: matches.get_flag("verbose"),
            json: matches.get_flag("json"),
            home: matches.get_one::<PathBuf>("home").cloned(),
            scenario_schema: matches.get_one::<PathBuf>("scenario-schema").cloned(),
            device_schema: matches.get_one::<PathBuf>("device-schema").cloned(),
            endpoint,
            command: Self::command_from_matches(matches)?,
        })
    }

    fn command_from_matches(matches: &ArgMatches) -> Result<CliCommand> {
        let command = match matches.subcommand() {
            Some(("device", sub)) => match sub.subcommand() {
                Some(("register", args)) => CliCommand::DeviceRegister {
                    files: args
                        .get_many::<PathBuf>("files")
                        .map(|vals| vals.cloned().collect())
                        .unwrap_or_default(),
                },
                Some(("list", _)) => CliCommand::DeviceList,
                _ => return Err(anyhow!("Missing device subcommand")),
            },
            Some(("scenario", sub)) => match sub.subcommand() {
                Some(("validate", args)) => CliCommand::ScenarioValidate {
                    file: required_path(args, "file")?,
                },
                Some(("import", args)) => CliCommand::ScenarioImport {
                    file: required_path(args, "file")?,
                },
                Some(("list", _)) => CliCommand::ScenarioList,
                Some(("export", args)) => CliCommand::ScenarioExport {
                    id: required_string(args, "id")?,
                    destination: required_path(args, "destination")?,
                },
                Some(("show", args)) => CliCommand::ScenarioShow {
                    id: required_string(args, "id")?,
                },
                _ => return Err(anyhow!("Missing scenario subcommand")),
            },
            Some(("run", args)) => CliCommand::Run(RunOptions {
                scenario_id: args.get_one::<String>("scenario").cloned(),
                scenario_file: args.get_one::<PathBuf>("scenario-file").cloned(),
                device_xmls: args
                    .get_many::<PathBuf>("device-xml")
                    .map(|vals| vals.cloned().collect())
                    .unwrap_or_default(),
                device: args.get_one::<String>("device").cloned(),
                events: args
                    .get_many::<String>("event")
                    .map(|vals| vals.cloned().collect())
                    .unwrap_or_default(),
                no_artefacts: args.get_flag("no-artefacts"),
            }),
            Some(("runs", sub)) => match sub.subcommand() {
                Some(("list", args)) => CliCommand::RunsList {
                    scenario: args.get_one::<String>("scenario").cloned(),
                },
                Some(("show", args)) => CliCommand::RunsShow {
                    run_id: required_string(args, "run")?,
                },
                _ => return Err(anyhow!("Missing runs subcommand")),
            },
            _ => return Err(anyhow!("No command given")),
        };
        Ok(command)
    }

    /// Build the clap Command structure
    pub fn build_cli() -> Command {
        Command::new("trdp-sim")
            .version(env!("CARGO_PKG_VERSION"))
            .about("TRDP scenario simulator")
            .long_about(
                "Registers device profiles, imports scenario documents and replays them \
                 through a communication endpoint while recording telemetry and run artefacts.",
            )
            .subcommand_required(true)
            .arg_required_else_help(true)
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Enable verbose logging"),
            )
            .arg(
                Arg::new("json")
                    .long("json")
                    .global(true)
                    .action(ArgAction::SetTrue)
                    .help("Print records as JSON"),
            )
            .arg(
                Arg::new("home")
                    .long("home")
                    .value_name("DIR")
                    .global(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Simulator data directory")
                    .long_help(
                        "Directory holding the device and scenario repositories and run \
                         artefacts. Defaults to $TRDP_SIM_HOME, then ~/.trdp-simulator.",
                    ),
            )
            .arg(
                Arg::new("scenario-schema")
                    .long("scenario-schema")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("Scenario schema rules file (built-in rules when omitted)"),
            )
            .arg(
                Arg::new("device-schema")
                    .long("device-schema")
                    .value_name("FILE")
                    .global(true)
                    .value_parser(clap::value_parser!(PathBuf))
                    .help("XSD used to validate device profiles"),
            )
            .arg(
                Arg::new("endpoint")
                    .long("endpoint")
                    .value_name("ADDR")
                    .global(true)
                    .default_value(DEFAULT_ENDPOINT)
                    .help("Endpoint address the session opens"),
            )
            .subcommand(
                Command::new("device")
                    .about("Manage device profiles")
                    .subcommand_required(true)
                    .subcommand(
                        Command::new("register")
                            .about("Validate and register device profile XML files")
                            .arg(
                                Arg::new("files")
                                    .value_name("XML")
                                    .required(true)
                                    .num_args(1..)
                                    .value_parser(clap::value_parser!(PathBuf)),
                            ),
                    )
                    .subcommand(Command::new("list").about("List registered device profiles")),
            )
            .subcommand(
                Command::new("scenario")
                    .about("Manage scenarios")
                    .subcommand_required(true)
                    .subcommand(
                        Command::new("validate")
                            .about("Check a scenario document without importing it")
                            .arg(path_arg("file", "FILE")),
                    )
                    .subcommand(
                        Command::new("import")
                            .about("Validate, parse and store a scenario document")
                            .arg(path_arg("file", "FILE")),
                    )
                    .subcommand(Command::new("list").about("List imported scenarios"))
                    .subcommand(
                        Command::new("export")
                            .about("Copy a stored scenario and its device profile out")
                            .arg(Arg::new("id").value_name("ID").required(true))
                            .arg(path_arg("destination", "DEST")),
                    )
                    .subcommand(
                        Command::new("show")
                            .about("Print a stored scenario")
                            .arg(Arg::new("id").value_name("ID").required(true)),
                    ),
            )
            .subcommand(
                Command::new("run")
                    .about("Execute a stored, file-based or inline scenario")
                    .arg(
                        Arg::new("scenario")
                            .value_name("SCENARIO_ID")
                            .required_unless_present("scenario-file")
                            .help("Stored scenario to run, or the id of an inline scenario"),
                    )
                    .arg(
                        Arg::new("scenario-file")
                            .long("scenario-file")
                            .value_name("FILE")
                            .value_parser(clap::value_parser!(PathBuf))
                            .conflicts_with_all(["scenario", "device", "event"])
                            .help("Run a scenario document without importing it"),
                    )
                    .arg(
                        Arg::new("device-xml")
                            .long("device-xml")
                            .value_name("XML")
                            .action(ArgAction::Append)
                            .value_parser(clap::value_parser!(PathBuf))
                            .help("Register a device profile before running"),
                    )
                    .arg(
                        Arg::new("device")
                            .long("device")
                            .value_name("PROFILE_ID")
                            .help("Device profile of an inline scenario"),
                    )
                    .arg(
                        Arg::new("event")
                            .long("event")
                            .value_name("SPEC")
                            .action(ArgAction::Append)
                            .help("Inline event <pd|md>:label[:comId][:dataset][:payload]")
                            .long_help(
                                "Inline event <pd|md>:label[:comId][:dataset][:payload]. May be \
                                 repeated. With --device and no --event the built-in demo \
                                 sequence runs.",
                            ),
                    )
                    .arg(
                        Arg::new("no-artefacts")
                            .long("no-artefacts")
                            .action(ArgAction::SetTrue)
                            .help("Do not write a run directory"),
                    ),
            )
            .subcommand(
                Command::new("runs")
                    .about("Inspect run history")
                    .subcommand_required(true)
                    .subcommand(
                        Command::new("list").about("List recorded runs").arg(
                            Arg::new("scenario")
                                .long("scenario")
                                .value_name("ID")
                                .help("Only runs of this scenario"),
                        ),
                    )
                    .subcommand(
                        Command::new("show")
                            .about("Show a run and the scenario it executed")
                            .arg(Arg::new("run").value_name("RUN_ID").required(true)),
                    ),
            )
    }

    /// Validate CLI configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(anyhow!("Endpoint cannot be empty"));
        }
        if let CliCommand::DeviceRegister { files } = &self.command
            && files.is_empty()
        {
            return Err(anyhow!("At least one device profile is required"));
        }
        Ok(())
    }
}

fn path_arg(name: &'static str, value_name: &'static str) -> Arg {
    Arg::new(name)
        .value_name(value_name)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
}

fn required_path(matches: &ArgMatches, name: &str) -> Result<PathBuf> {
    matches
        .get_one::<PathBuf>(name)
        .cloned()
        .ok_or_else(|| anyhow!("Argument '{}' is required", name))
}

fn required_string(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("Argument '{}' is required", name))
}
