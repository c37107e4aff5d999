use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use transcription_relay::backoff::BackoffStrategy;
use transcription_relay::client::{RelayClient, TranscriptionBackend, UpstreamClient};
use transcription_relay::config::{env_vars, ApiCredentials, PollingConfig};
use transcription_relay::config_loader::load_config;
use transcription_relay::file_utils::read_audio_file;
use transcription_relay::poller::poll_transcription_status;
use transcription_relay::session::TranscriptionSession;
use transcription_relay::transcript::Transcript;

#[derive(Parser)]
#[command(name = "transcribe")]
#[command(about = "Transcribe audio files through a transcription service or relay")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Relay base URL; the service is called directly when omitted
    #[arg(long, global = true)]
    relay: Option<String>,

    /// Upstream endpoint (defaults to API_ENDPOINT)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Upstream API key (defaults to API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Print the transcript as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a file and wait for its transcript
    Run {
        file: PathBuf,

        /// Language hint, automatic detection when omitted
        #[arg(short, long)]
        language: Option<String>,

        #[arg(long, value_enum, default_value_t = Backoff::Fixed)]
        backoff: Backoff,
    },
    /// Wait for a previously started job
    Wait { file_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Backoff {
    Fixed,
    Exponential,
}

impl From<Backoff> for BackoffStrategy {
    fn from(backoff: Backoff) -> Self {
        match backoff {
            Backoff::Fixed => BackoffStrategy::fixed(),
            Backoff::Exponential => BackoffStrategy::exponential(),
        }
    }
}

fn backend(args: &Args) -> Result<Arc<dyn TranscriptionBackend>> {
    if let Some(relay) = &args.relay {
        let mut client = RelayClient::new(relay.as_str());
        if let Some(endpoint) = &args.endpoint {
            client = client.with_endpoint(endpoint.as_str());
        }
        if let Some(api_key) = &args.api_key {
            client = client.with_api_key(api_key.as_str());
        }
        return Ok(Arc::new(client));
    }

    let default_endpoint = std::env::var(env_vars::API_ENDPOINT).ok();
    let default_api_key = std::env::var(env_vars::API_KEY).ok();
    let credentials = ApiCredentials::resolve(
        args.endpoint.as_deref(),
        args.api_key.as_deref(),
        default_endpoint.as_deref(),
        default_api_key.as_deref(),
    )?;
    Ok(Arc::new(UpstreamClient::new(credentials)))
}

fn print_transcript(transcript: &Transcript, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(transcript)?);
    } else {
        println!("{}", transcript.text);
    }
    Ok(())
}

async fn run(
    backend: Arc<dyn TranscriptionBackend>,
    file: PathBuf,
    language: Option<String>,
    backoff: Backoff,
) -> Result<Transcript> {
    let audio = read_audio_file(&file).with_context(|| format!("reading {}", file.display()))?;
    let config = PollingConfig::default().with_strategy(backoff.into());
    let session = TranscriptionSession::new(backend, config);

    let mut updates = session.subscribe();
    let reporter = tokio::spawn(async move {
        let mut last = None;
        while updates.changed().await.is_ok() {
            let (status, progress) = {
                let job = updates.borrow_and_update();
                (job.status, job.progress)
            };
            if last != Some((status, progress)) {
                info!("{:?} {}%", status, progress);
                last = Some((status, progress));
            }
        }
    });

    let result = async {
        session
            .process_audio_file(&audio, language.as_deref())
            .await?;
        session.wait_until_terminal().await
    }
    .await;

    reporter.abort();
    Ok(result?)
}

async fn wait(backend: Arc<dyn TranscriptionBackend>, file_id: &str) -> Result<Transcript> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping polling");
            on_interrupt.cancel();
        }
    });

    let transcript = poll_transcription_status(
        backend.as_ref(),
        file_id,
        BackoffStrategy::exponential(),
        |progress| info!("Progress {}%", progress),
        &cancel,
    )
    .await?;
    Ok(transcript)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    load_config();

    let args = Args::parse();
    let backend = backend(&args)?;

    let transcript = match args.command {
        Command::Run {
            ref file,
            ref language,
            backoff,
        } => run(backend, file.clone(), language.clone(), backoff).await?,
        Command::Wait { ref file_id } => wait(backend, file_id).await?,
    };

    print_transcript(&transcript, args.json)
}
