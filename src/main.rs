use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use eth_interface_generator::config::Config;
use eth_interface_generator::ethereum::{
    abi::load_contracts,
    chain::{AlloyChainClient, ChainClient},
    classifier::DispatchClass,
    dispatcher::{Dispatched, Dispatcher, Invocation, TxOptions},
    utils, TxEvent,
};
use eth_interface_generator::{interface, server};
use std::path::PathBuf;
use tracing::{error, info, warn};

fn contracts_arg() -> Arg {
    Arg::new("contracts")
        .short('c')
        .long("contracts")
        .value_name("DIRECTORY")
        .default_value(".")
        .help("Folder that contains the built smart contracts")
}

fn cli() -> Command {
    Command::new("eth-interface-generator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Smart contract GUI generator for Ethereum")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (ganache, localhost, sepolia, ethereum)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .global(true)
                .help("Allow `invoke` to send transactions")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("version").about("Show the version of the package"))
        .subcommand(
            Command::new("serve")
                .about("Build the UI and start the server")
                .arg(contracts_arg())
                .arg(
                    Arg::new("port")
                        .short('p')
                        .long("port")
                        .value_name("PORT")
                        .value_parser(clap::value_parser!(u16).range(1..))
                        .help("Port of the server. EG: http://localhost:5432"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Build the UI and export to the target folder")
                .arg(contracts_arg())
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("DIRECTORY")
                        .default_value(".")
                        .help("Destination folder where to export the UI"),
                )
                .arg(
                    Arg::new("minify")
                        .short('m')
                        .long("minify")
                        .help("Minify the Javascript")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("info").about("Show network id, account and gas defaults of the node"))
        .subcommand(
            Command::new("invoke")
                .about("Call or transact with a deployed contract function")
                .arg(contracts_arg())
                .arg(
                    Arg::new("contract")
                        .long("contract")
                        .value_name("NAME")
                        .required(true)
                        .help("Contract name as found in the build artifact"),
                )
                .arg(
                    Arg::new("function")
                        .short('f')
                        .long("function")
                        .value_name("NAME")
                        .required(true)
                        .help("Function to call"),
                )
                .arg(
                    Arg::new("params")
                        .long("params")
                        .value_name("JSON")
                        .help("Arguments as a JSON array, object or scalar"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("ADDRESS")
                        .help("Sender address, defaults to the first node account"),
                )
                .arg(
                    Arg::new("private-key")
                        .long("private-key")
                        .value_name("KEY")
                        .help("Sign locally with this key (falls back to ETH_PRIVATE_KEY)"),
                )
                .arg(Arg::new("value").long("value").value_name("WEI").help("Wei to send"))
                .arg(
                    Arg::new("gas-limit")
                        .long("gas-limit")
                        .value_name("GAS")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(Arg::new("gas-price").long("gas-price").value_name("WEI"))
                .arg(
                    Arg::new("nonce")
                        .long("nonce")
                        .value_name("NONCE")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = cli().get_matches();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    if let Some(network) = matches.get_one::<String>("network") {
        utils::validate_network(network, &config.network_names())?;
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }

    let result = match matches.subcommand() {
        Some(("version", _)) => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => cli().print_help().map_err(Into::into),
        Some(("serve", args)) => serve(&config, args).await,
        Some(("export", args)) => export(args),
        Some(("info", _)) => show_info(&config).await,
        Some(("invoke", args)) => invoke(&config, args).await,
        Some((name, _)) => Err(anyhow!("Unknown command: {}", name)),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn contracts_dir(args: &ArgMatches) -> PathBuf {
    args.get_one::<String>("contracts")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn serve(config: &Config, args: &ArgMatches) -> Result<()> {
    let records = load_contracts(contracts_dir(args))?;
    let port = args
        .get_one::<u16>("port")
        .copied()
        .unwrap_or(config.server.port);

    // Removed when the server stops.
    let dist = interface::build_to_temp_dir(&records)?;
    info!("Built the interface for {} contract(s) into {:?}", records.len(), dist.path());

    server::serve(&config.server.host, port, dist.path().join(interface::INDEX_FILE)).await
}

fn export(args: &ArgMatches) -> Result<()> {
    let target = args
        .get_one::<String>("target")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let records = load_contracts(contracts_dir(args))?;

    let path = interface::export(&records, &target, args.get_flag("minify"))?;
    println!("{}", path.display());
    Ok(())
}

async fn connect(config: &Config) -> Result<Dispatcher<AlloyChainClient>> {
    let network = config.network(None)?;
    info!("Connecting to {} ({})", config.default_network, network.rpc_url);

    let client = AlloyChainClient::new(network, config.dispatcher.receipt_poll_interval())?;
    client.check_connection().await?;
    Ok(Dispatcher::new(client))
}

async fn show_info(config: &Config) -> Result<()> {
    let dispatcher = connect(config).await?;
    let client = dispatcher.client();

    println!("network id: {}", client.network_id().await?);
    println!("chain id:   {}", client.chain_id().await?);
    match dispatcher.user_account().await? {
        Some(account) => println!("account:    {}", account),
        None => println!("account:    -"),
    }
    println!("gas price:  {}", dispatcher.gas_price().await?);
    println!("gas limit:  {}", dispatcher.gas_limit().await?);
    Ok(())
}

fn tx_options(args: &ArgMatches) -> Result<TxOptions> {
    let value = args
        .get_one::<String>("value")
        .map(|v| utils::parse_wei(v))
        .transpose()?;
    let gas_price = args
        .get_one::<String>("gas-price")
        .map(|v| {
            let wei = utils::parse_wei(v)?;
            u128::try_from(wei).map_err(|_| anyhow!("Gas price too large: {}", v))
        })
        .transpose()?;

    Ok(TxOptions {
        value,
        nonce: args.get_one::<u64>("nonce").copied(),
        gas_price,
        gas_limit: args.get_one::<u64>("gas-limit").copied(),
    })
}

fn invocation(args: &ArgMatches) -> Result<Invocation> {
    let params = match args.get_one::<String>("params") {
        Some(raw) => serde_json::from_str(raw).context("--params must be valid JSON")?,
        None => serde_json::Value::Null,
    };
    let from = args
        .get_one::<String>("from")
        .map(|a| utils::parse_address(a))
        .transpose()?;
    let private_key = args
        .get_one::<String>("private-key")
        .cloned()
        .or_else(|| std::env::var("ETH_PRIVATE_KEY").ok())
        .filter(|key| !key.trim().is_empty());

    Ok(Invocation {
        contract: args
            .get_one::<String>("contract")
            .cloned()
            .unwrap_or_default(),
        method: args
            .get_one::<String>("function")
            .cloned()
            .unwrap_or_default(),
        params,
        from,
        private_key,
        options: tx_options(args)?,
    })
}

/// Rejects unknown functions up front and state-changing ones unless writes
/// are allowed. Unknown contracts are left to the dispatcher.
fn check_invocation<C: ChainClient>(
    dispatcher: &Dispatcher<C>,
    invocation: &Invocation,
    allow_writes: bool,
) -> Result<()> {
    let Some(contract) = dispatcher.contract(&invocation.contract) else {
        return Ok(());
    };

    let methods = contract.methods();
    if methods.find(&invocation.method).is_none() {
        return Err(anyhow!(
            "Function '{}' not found in contract '{}'. Available functions: {}",
            invocation.method,
            contract.name,
            methods.names().join(", ")
        ));
    }

    let mutability = methods.classify(&invocation.method);
    if matches!(
        mutability.dispatch_class(&invocation.method),
        Ok(DispatchClass::Transaction { .. })
    ) && !allow_writes
    {
        return Err(anyhow!(
            "{} is {} and changes state. Write operations are disabled: pass --allow-writes or set security.allow_write_operations",
            invocation.method,
            mutability.as_str()
        ));
    }

    Ok(())
}

async fn invoke(config: &Config, args: &ArgMatches) -> Result<()> {
    let records = load_contracts(contracts_dir(args))?;
    let invocation = invocation(args)?;

    let mut dispatcher = connect(config).await?;
    let network_id = dispatcher.client().network_id().await?;
    let skipped = dispatcher.boot_contracts(&records, network_id);
    if !skipped.is_empty() {
        warn!("Not deployed on network {}: {}", network_id, skipped.join(", "));
    }

    check_invocation(&dispatcher, &invocation, config.security.allow_write_operations)?;

    match dispatcher.dispatch(&invocation).await? {
        Dispatched::Read(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Dispatched::Submitted(pending) => {
            let receipt = pending
                .finish(|event| match event {
                    TxEvent::Submitted(hash) => println!("transactionHash: 0x{:x}", hash),
                    TxEvent::Mined(_) => {}
                    TxEvent::Failed(e) => error!("Error occurred: {}", e),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_invoke_arguments() {
        let matches = cli()
            .try_get_matches_from([
                "eth-interface-generator",
                "invoke",
                "--contract",
                "Token",
                "-f",
                "transfer",
                "--params",
                r#"["0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e", 5]"#,
                "--value",
                "0x10",
                "--gas-price",
                "20000000000",
                "--nonce",
                "7",
                "--private-key",
                "0x01",
            ])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        let invocation = invocation(args).unwrap();

        assert_eq!(invocation.contract, "Token");
        assert_eq!(invocation.method, "transfer");
        assert_eq!(invocation.params.as_array().unwrap().len(), 2);
        assert_eq!(invocation.private_key.as_deref(), Some("0x01"));
        assert_eq!(invocation.options.value, Some(alloy::primitives::U256::from(16)));
        assert_eq!(invocation.options.gas_price, Some(20_000_000_000));
        assert_eq!(invocation.options.nonce, Some(7));
        assert_eq!(invocation.options.gas_limit, None);
    }

    #[test]
    fn test_invoke_checks_function_and_write_permission() {
        let config = Config::default();
        let client = AlloyChainClient::new(
            config.network(None).unwrap(),
            config.dispatcher.receipt_poll_interval(),
        )
        .unwrap();
        let mut dispatcher = Dispatcher::new(client);
        dispatcher.load_contract(
            utils::parse_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").unwrap(),
            serde_json::json!([
                { "type": "function", "name": "total", "stateMutability": "view", "inputs": [], "outputs": [] },
                { "type": "function", "name": "deposit", "stateMutability": "payable", "inputs": [], "outputs": [] }
            ]),
            "Vault",
        );
        let call = |method: &str| Invocation {
            contract: "Vault".to_string(),
            method: method.to_string(),
            ..Default::default()
        };

        assert!(check_invocation(&dispatcher, &call("total"), false).is_ok());

        let err = check_invocation(&dispatcher, &call("deposit"), false).unwrap_err();
        assert!(err.to_string().contains("deposit is payable"));
        assert!(check_invocation(&dispatcher, &call("deposit"), true).is_ok());

        let err = check_invocation(&dispatcher, &call("withdraw"), true).unwrap_err();
        assert!(err.to_string().contains("total, deposit"));

        let missing = Invocation {
            contract: "Missing".to_string(),
            ..call("deposit")
        };
        assert!(check_invocation(&dispatcher, &missing, false).is_ok());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(cli()
            .try_get_matches_from(["eth-interface-generator", "serve", "--port", "0"])
            .is_err());
        assert!(cli()
            .try_get_matches_from(["eth-interface-generator", "serve", "--port", "abc"])
            .is_err());
    }

    #[test]
    fn test_export_writes_into_target() {
        let contracts = tempfile::tempdir().unwrap();
        std::fs::write(
            contracts.path().join("Token.json"),
            serde_json::json!({
                "contractName": "Token",
                "abi": [],
                "networks": {}
            })
            .to_string(),
        )
        .unwrap();
        let target = tempfile::tempdir().unwrap();

        let argv: Vec<std::ffi::OsString> = vec![
            "eth-interface-generator".into(),
            "export".into(),
            "-c".into(),
            contracts.path().into(),
            "-t".into(),
            target.path().into(),
            "--minify".into(),
        ];
        let matches = cli().try_get_matches_from(argv).unwrap();
        let (_, args) = matches.subcommand().unwrap();

        export(args).unwrap();
        assert!(target.path().join(interface::INDEX_FILE).is_file());
    }
}
