use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use trdpsim_backend::communication::{CommunicationEndpoint, LoopbackStack, TrdpSession};
use trdpsim_backend::config::{AppConfig, CliCommand, ConfigManager, RunOptions};
use trdpsim_backend::device::{DeviceProfileRepository, XmllintValidator};
use trdpsim_backend::scenario::{ScenarioRepository, ScenarioSchemaValidator, SimulationEngine, inline};
use trdpsim_shared::scenario_text::{describe_event, render_scenario};
use trdpsim_shared::{Scenario, SimError};

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn run_cli() -> Result<()> {
    let config = ConfigManager::from_cli_and_env()?;
    config.validate()?;
    config.init_logging()?;

    let app = &config.app;
    app.ensure_dirs()?;
    info!("Using data home {}", app.home.display());

    let mut devices = DeviceProfileRepository::open(
        &app.devices_dir,
        XmllintValidator::new(&app.device_schema),
    )
    .context("Failed to open device repository")?;

    if let CliCommand::Run(options) = &config.command {
        for xml in &options.device_xmls {
            let id = devices
                .register_profile(xml)
                .with_context(|| format!("Failed to register {}", xml.display()))?;
            if app.json_output {
                info!("Registered device profile '{}' from {}", id, xml.display());
            } else {
                println!("Registered device profile '{}' from {}", id, xml.display());
            }
        }
    }

    match &config.command {
        CliCommand::DeviceRegister { files } => {
            for file in files {
                let id = devices
                    .register_profile(file)
                    .with_context(|| format!("Failed to register {}", file.display()))?;
                println!("{}", id);
            }
            Ok(())
        }
        CliCommand::DeviceList => {
            let records = devices.list();
            if app.json_output {
                return print_json(&records);
            }
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.id, record.validated_at, record.checksum
                );
            }
            Ok(())
        }
        command => {
            let schema = schema_validator(app)?;
            let mut scenarios = ScenarioRepository::open(&app.scenarios_dir, schema, &devices)
                .context("Failed to open scenario repository")?;
            scenario_command(app, &mut scenarios, command)
        }
    }
}

fn scenario_command(
    app: &AppConfig,
    scenarios: &mut ScenarioRepository<'_>,
    command: &CliCommand,
) -> Result<()> {
    match command {
        CliCommand::ScenarioValidate { file } => {
            let scenario = scenarios.read_scenario_file(file)?;
            println!(
                "{}: valid ({} events, device {})",
                scenario.id,
                scenario.events.len(),
                scenario.device_profile_id
            );
            Ok(())
        }
        CliCommand::ScenarioImport { file } => {
            let id = scenarios
                .import_scenario(file)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            println!("{}", id);
            Ok(())
        }
        CliCommand::ScenarioList => {
            let records = scenarios.list();
            if app.json_output {
                return print_json(&records);
            }
            for record in records {
                println!(
                    "{}\t{}\t{}",
                    record.id, record.device_profile_id, record.updated_at
                );
            }
            Ok(())
        }
        CliCommand::ScenarioExport { id, destination } => {
            let path = scenarios.export_scenario(id, destination)?;
            println!("{}", path.display());
            Ok(())
        }
        CliCommand::ScenarioShow { id } => {
            let scenario = scenarios.load(id)?;
            print_scenario(app, &scenario)
        }
        CliCommand::Run(options) => run_scenario(app, scenarios, options),
        CliCommand::RunsList { scenario } => {
            let runs = match scenario {
                Some(id) => scenarios.list_runs_for_scenario(id),
                None => scenarios.list_runs(),
            };
            if app.json_output {
                return print_json(&runs);
            }
            for run in runs {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    run.id,
                    run.scenario_id,
                    run.started_at,
                    if run.success { "ok" } else { "failed" },
                    run.detail
                );
            }
            Ok(())
        }
        CliCommand::RunsShow { run_id } => {
            let run = scenarios.get_run(run_id)?;
            // Runs executed without artefacts have no snapshot to rebuild
            let scenario = if run.artefact_path.as_os_str().is_empty() {
                None
            } else {
                Some(scenarios.load_run_scenario(run_id)?)
            };
            if app.json_output {
                #[derive(Serialize)]
                struct RunView<'a> {
                    run: &'a trdpsim_shared::RunRecord,
                    scenario: Option<&'a Scenario>,
                }
                return print_json(&RunView {
                    run: &run,
                    scenario: scenario.as_ref(),
                });
            }
            println!("run: {}", run.id);
            println!("scenario: {}", run.scenario_id);
            println!("started_at: {}", run.started_at);
            println!("completed_at: {}", run.completed_at);
            println!("success: {}", run.success);
            println!("detail: {}", run.detail);
            if let Some(scenario) = scenario {
                println!("artefacts: {}", run.artefact_path.display());
                println!();
                print!("{}", render_scenario(&scenario));
            }
            Ok(())
        }
        CliCommand::DeviceRegister { .. } | CliCommand::DeviceList => Ok(()),
    }
}

/// Pick the scenario a `run` executes: a document, inline events, or a stored id
fn select_scenario(scenarios: &ScenarioRepository<'_>, options: &RunOptions) -> Result<Scenario> {
    if let Some(file) = &options.scenario_file {
        let scenario = scenarios
            .read_scenario_file(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        return Ok(scenario);
    }
    let scenario_id = options.scenario_id.as_deref().unwrap_or_default();
    if options.is_inline() {
        let scenario = inline::build_scenario(
            scenario_id,
            options.device.as_deref(),
            &options.events,
            scenarios.devices(),
        )?;
        return Ok(scenario);
    }
    if scenario_id.is_empty() {
        return Err(SimError::invalid_argument("A scenario id is required").into());
    }
    Ok(scenarios.load(scenario_id)?)
}

#[instrument(skip(app, scenarios, options), fields(endpoint = %app.endpoint))]
fn run_scenario(
    app: &AppConfig,
    scenarios: &mut ScenarioRepository<'_>,
    options: &RunOptions,
) -> Result<()> {
    let scenario = select_scenario(scenarios, options)?;

    let mut session = TrdpSession::new(app.endpoint.clone(), LoopbackStack::new());
    session.on_process_data(|message| info!("Received PD {}", message));
    session.on_message_data(|message| info!("Received MD {}", message));

    let outcome = {
        let mut engine = SimulationEngine::new(&mut session).with_recorder(scenarios);
        if !options.no_artefacts {
            engine = engine.with_artefact_root(&app.runs_dir);
        }
        engine.load_scenario(scenario)?;
        engine.run()
    };

    for event in session.diagnostics() {
        eprintln!("{}", event);
    }

    let summary = outcome?;
    if app.json_output {
        return print_json(&summary);
    }
    println!("run: {}", summary.run_id);
    println!("success: {}", summary.success);
    println!("detail: {}", summary.detail);
    if let Some(path) = &summary.artefact_path {
        println!("artefacts: {}", path.display());
    }
    Ok(())
}

fn schema_validator(app: &AppConfig) -> Result<ScenarioSchemaValidator> {
    let validator = match &app.scenario_schema {
        Some(path) => ScenarioSchemaValidator::load(path)
            .with_context(|| format!("Failed to load scenario schema {}", path.display()))?,
        None => ScenarioSchemaValidator::with_defaults()?,
    };
    Ok(validator)
}

fn print_scenario(app: &AppConfig, scenario: &Scenario) -> Result<()> {
    if app.json_output {
        return print_json(scenario);
    }
    println!("scenario: {}", scenario.id);
    println!("device: {}", scenario.device_profile_id);
    for (index, event) in scenario.events.iter().enumerate() {
        println!("  {:>3}. {}", index + 1, describe_event(event));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to encode JSON")?;
    println!("{}", text);
    Ok(())
}

/// Exit code of the first [`SimError`] in the chain, 1 otherwise
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SimError>())
        .map(SimError::exit_code)
        .unwrap_or(1)
}
