mod api;
mod audio;
mod cli;
mod config;
mod error;
mod relay;

use anyhow::Context;
use clap::Parser;
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::{GeminiLive, RestStore, TranscriptStore};
use audio::{list_output_devices, DeviceOutput, FragmentScheduler, PlaybackEvent, PlaybackListener};
use cli::{Cli, Commands, ConfigCommand, KeysCommand, SessionArgs};
use config::{
    get_config_path, is_known_voice, language_name, load_config_from, save_config_to, Config,
    LANGUAGES, VOICES,
};
use error::mask_token;
use relay::{CredentialPool, Poller, Relay, RelayEvent, RelayStatus, SessionController};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let config_path = cli.global.config.clone().unwrap_or_else(get_config_path);
    let config = load_config_from(&config_path);

    match cli.command {
        Commands::Run(args) => run_relay(with_overrides(config, &args), &config_path, None),
        Commands::Speak { text, session } => {
            run_relay(with_overrides(config, &session), &config_path, Some(text))
        }
        Commands::Keys(KeysCommand::List) => list_keys(&config),
        Commands::Keys(KeysCommand::Add { token }) => add_key(config, &config_path, &token),
        Commands::Languages => {
            for (code, name) in LANGUAGES {
                println!("{:<8} {}", code, name);
            }
            Ok(())
        }
        Commands::Voices => {
            for (id, persona) in VOICES {
                println!("{:<8} {}", id, persona);
            }
            Ok(())
        }
        Commands::Devices => {
            for name in list_output_devices()? {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Config(ConfigCommand::Init { force }) => {
            if config_path.exists() && !force {
                println!("{} already exists (use --force to overwrite)", config_path.display());
                return Ok(());
            }
            save_config_to(&Config::default(), &config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
        Commands::Config(ConfigCommand::Path) => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "orbit_relay=debug"
    } else {
        "orbit_relay=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn with_overrides(mut config: Config, args: &SessionArgs) -> Config {
    if let Some(session) = &args.session {
        config.session_id = session.clone();
    }
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    if let Some(voice) = &args.voice {
        config.voice = voice.clone();
    }
    if let Some(device) = &args.device {
        config.output_device = device.clone();
    }
    config
}

/// Local keys first, then the store's, without duplicates
fn load_pool(config: &Config, store: &dyn TranscriptStore) -> CredentialPool {
    let shared = store.list_credentials().unwrap_or_else(|e| {
        warn!("Could not load shared credentials: {}", e);
        Vec::new()
    });
    CredentialPool::new(config.credentials.iter().cloned().chain(shared))
}

fn run_relay(config: Config, config_path: &Path, speak: Option<String>) -> anyhow::Result<()> {
    let language = language_name(&config.language);
    if !is_known_voice(&config.voice) {
        warn!("Voice '{}' is not in the catalog; trying it anyway", config.voice);
    }

    let store: Arc<dyn TranscriptStore> = Arc::new(RestStore::new(config.store.clone()));
    let pool = load_pool(&config, store.as_ref());
    if pool.is_empty() {
        anyhow::bail!(
            "no credentials: run `orbit-relay keys add <TOKEN>` or list them under \"credentials\" in {}",
            config_path.display()
        );
    }
    info!("{} credential(s) loaded", pool.len());

    let output = DeviceOutput::open(&config.output_device).context("opening audio output")?;

    let (tx, rx) = mpsc::channel();
    let interrupt_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(RelayEvent::Shutdown);
    })
    .context("installing Ctrl-C handler")?;

    let playback_tx = tx.clone();
    let listener: PlaybackListener = Arc::new(move |event: PlaybackEvent| {
        let _ = playback_tx.send(RelayEvent::Playback(event));
    });
    let scheduler = Arc::new(FragmentScheduler::new(
        output.mixer(),
        config.decode_workers,
        listener,
    ));

    let controller =
        SessionController::new(GeminiLive, config.model.clone(), pool, scheduler, tx.clone());
    let mut relay = Relay::new(controller, rx, language.clone(), config.voice.clone())
        .exit_when_idle(speak.is_some())
        .on_status(|status| match status {
            RelayStatus::Error(message) => warn!("Status: {}", message),
            other => info!("Status: {:?}", other),
        });

    info!("Relaying into {} with voice {}", language, config.voice);
    relay.start()?;

    let _poller = match speak {
        Some(text) => {
            let _ = tx.send(RelayEvent::Speak(text));
            None
        }
        None => Some(Poller::spawn(
            store,
            config.session_id.clone(),
            config.polling.clone(),
            tx.clone(),
        )?),
    };
    drop(tx);

    relay.run()?;
    Ok(())
}

fn list_keys(config: &Config) -> anyhow::Result<()> {
    let store = RestStore::new(config.store.clone());
    for token in &config.credentials {
        println!("local   {}", mask_token(token));
    }
    for token in store.list_credentials()? {
        println!("shared  {}", mask_token(&token));
    }
    Ok(())
}

/// Store the key remotely when a store is configured, else in the config file.
fn add_key(mut config: Config, config_path: &Path, token: &str) -> anyhow::Result<()> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("empty token");
    }

    if config.store.is_configured() {
        let store = RestStore::new(config.store.clone());
        if store.add_credential(token)? {
            println!("Stored {}", mask_token(token));
        } else {
            println!("{} is already stored", mask_token(token));
        }
        return Ok(());
    }

    let mut pool = CredentialPool::new(config.credentials.clone());
    if !pool.add(token) {
        println!("{} is already configured", mask_token(token));
        return Ok(());
    }
    config.credentials = pool.tokens().to_vec();
    save_config_to(&config, config_path)?;
    println!("Added {} to {}", mask_token(token), config_path.display());
    Ok(())
}
