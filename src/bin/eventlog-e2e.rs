use anyhow::Result;
use clap::{value_parser, Arg, ArgMatches, Command};
use log::info;
use std::process::ExitCode;
use std::sync::Arc;

use eventlog_e2e::clients::{ElasticsearchClient, ManagerClient, NeutronClient};
use eventlog_e2e::config::{create_sample_config, load_config};
use eventlog_e2e::fixture::{run_test_case, Deployer, EventTimestampFormatTest, TestContext};

fn cli() -> Command {
    Command::new("eventlog-e2e")
        .version(env!("CARGO_PKG_VERSION"))
        .about("End-to-end check of event timestamps written by the manager")
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Run the event timestamp format test against a live manager")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Configuration file path")
                        .default_value("config/eventlog-e2e.toml"),
                )
                .arg(
                    Arg::new("management-ip")
                        .short('m')
                        .long("management-ip")
                        .value_name("IP")
                        .help("Management host address"),
                )
                .arg(
                    Arg::new("security-group")
                        .long("security-group")
                        .value_name("NAME")
                        .help("Security group guarding the management host"),
                )
                .arg(
                    Arg::new("es-port")
                        .long("es-port")
                        .value_name("PORT")
                        .help("Elasticsearch port to open and query")
                        .value_parser(value_parser!(u16)),
                )
                .arg(
                    Arg::new("blueprint")
                        .short('b')
                        .long("blueprint")
                        .value_name("PATH")
                        .help("Blueprint archive to deploy"),
                )
                .arg(
                    Arg::new("port-timeout")
                        .long("port-timeout")
                        .value_name("SECONDS")
                        .help("How long to wait for the Elasticsearch port to open")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("init-config")
                .about("Write a sample configuration file")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Where to write the sample")
                        .default_value("eventlog-e2e.toml"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("run", sub)) => run(sub).await,
        Some(("init-config", sub)) => {
            let path = sub
                .get_one::<String>("output")
                .map(|s| s.as_str())
                .unwrap_or("eventlog-e2e.toml");
            create_sample_config(path)?;
            Ok(ExitCode::SUCCESS)
        }
        _ => unreachable!("subcommand_required"),
    }
}

async fn run(matches: &ArgMatches) -> Result<ExitCode> {
    let config_path = matches.get_one::<String>("config");
    let settings = load_config(config_path.map(|s| s.as_str()), matches)?;

    let network = Arc::new(NeutronClient::new((&settings.openstack).into())?);
    let manager = Arc::new(ManagerClient::new(settings.management_rest_url())?);
    let search = Arc::new(ElasticsearchClient::new(settings.elasticsearch_url())?);
    let deployer = Deployer::new(
        manager,
        settings.execution_timeout(),
        settings.execution_poll_interval(),
    );

    let test_id = TestContext::generate_test_id(&settings.test.id_prefix);
    let mut ctx = TestContext::new(test_id, settings.management.ip.clone());
    let case = EventTimestampFormatTest::new(settings, network, deployer, search);

    let report = run_test_case(&case, &mut ctx).await;
    if let Some(teardown) = &report.teardown_error {
        log::warn!("Teardown also failed: {teardown}");
    }

    if report.passed() {
        info!("{} ({}) passed", report.name, report.test_id);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!(
            "{} ({}) FAILED: {}",
            report.name,
            report.test_id,
            report.failure_message().unwrap_or_default()
        );
        Ok(ExitCode::FAILURE)
    }
}
