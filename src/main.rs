use anyhow::{Context, Result};
use btserver::config::Config;
use clap::{arg, value_parser, ArgAction, ArgMatches, Command};
use log::info;

fn cli() -> Command<'static> {
    Command::new("btserver")
        .version("0.1")
        .about("BLE peripheral with device information, current time and heart rate services")
        .arg(
            arg!(
                -c --config <PATH> "Read settings from a json config file"
            )
            .required(false),
        )
        .arg(
            arg!(
                -a --adapter <NAME> "The bluetooth adapter to use, e.g. hci0"
            )
            .required(false),
        )
        .arg(
            arg!(
                -n --name <NAME> "The name to advertise"
            )
            .required(false),
        )
        .arg(
            arg!(
                -l --location <LOCATION> "Body sensor location reported by the heart rate service"
            )
            .required(false)
            .value_parser(value_parser!(u8)),
        )
        .arg(
            arg!(
                -D --deamon "run the server as a deamon"
            )
            .action(ArgAction::SetTrue),
        )
}

async fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(x) => Config::load(x).await?,
        None => Config::default(),
    };
    if let Some(x) = matches.get_one::<String>("adapter") {
        config.adapter = Some(x.clone());
    }
    if let Some(x) = matches.get_one::<String>("name") {
        config.device_name = x.clone();
    }
    if let Some(x) = matches.get_one::<u8>("location") {
        config.sensor_location = *x;
    }
    Ok(config)
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config = load_config(&matches).await?;
    info!("starting with {:?}", config);

    let server = btserver::server::instance(&config)
        .await
        .context("failed to start bluetooth server")?;
    server.run().await
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    if matches.get_one::<bool>("deamon").copied().unwrap_or(false) {
        btserver::deamonize().context("failed to create a deamon")?;
    }

    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(matches))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cli_is_valid() {
        cli().debug_assert();
    }

    #[tokio::test]
    async fn arguments_override_defaults() {
        let matches = cli()
            .try_get_matches_from(["btserver", "-n", "watch", "-a", "hci1", "-l", "3"])
            .unwrap();
        let config = load_config(&matches).await.unwrap();
        assert_eq!(config.device_name, "watch");
        assert_eq!(config.adapter.as_deref(), Some("hci1"));
        assert_eq!(config.sensor_location, 3);
        assert_eq!(config.model, Config::default().model);
        assert!(!matches.get_one::<bool>("deamon").copied().unwrap());
    }

    #[test]
    fn invalid_location() {
        assert!(cli()
            .try_get_matches_from(["btserver", "-l", "chest"])
            .is_err());
    }
}
