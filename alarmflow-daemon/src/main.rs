use alarmflow::auth::{FileTokenPersistence, IopgpsTokenIssuer, NoopTokenPersistence, TokenManager, TokenStore};
use alarmflow::clients::{BackendClient, GeoapifyClient, HttpPollTransport, HttpSettings, TwilioClient};
use alarmflow::config::AlarmflowConfig;
use alarmflow::pipeline::AlarmPipeline;
use alarmflow::ports::{Geocoder, NoGeocoder, PipelinePorts, TokenPersistence};
use alarmflow::scheduler::Scheduler;
use alarmflow::telemetry::{init_tracing, LogFormat};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(clap::Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file. Flags and environment variables override it.
    #[clap(long = "config", env = "ALARMFLOW_CONFIG")]
    config: Option<PathBuf>,
    /// Root URL of the backend REST API.
    #[clap(long = "backend-url", env = "BACKEND_URL")]
    backend_url: Option<String>,
    /// Backend API key.
    #[clap(long = "backend-api-key", env = "BACKEND_API_KEY", hide_env_values = true)]
    backend_api_key: Option<String>,
    /// IOPGPS application id.
    #[clap(long = "iopgps-app-id", env = "APPID")]
    iopgps_app_id: Option<String>,
    /// IOPGPS login key.
    #[clap(long = "iopgps-login-key", env = "LOGIN_KEY", hide_env_values = true)]
    iopgps_login_key: Option<String>,
    /// WhatsGPS API token.
    #[clap(long = "whatsgps-token", env = "WHATSGPS_TOKEN", hide_env_values = true)]
    whatsgps_token: Option<String>,
    /// Geoapify API key. Without it, messages carry no address.
    #[clap(long = "geoapify-api-key", env = "GEOAPIFY_API_KEY", hide_env_values = true)]
    geoapify_api_key: Option<String>,
    /// Twilio account SID.
    #[clap(long = "twilio-account-sid", env = "TWILIO_ACCOUNT_SID")]
    twilio_account_sid: Option<String>,
    /// Twilio auth token.
    #[clap(long = "twilio-auth-token", env = "TWILIO_AUTH_TOKEN", hide_env_values = true)]
    twilio_auth_token: Option<String>,
    /// WhatsApp sender number.
    #[clap(long = "twilio-from", env = "TWILIO_FROM")]
    twilio_from: Option<String>,
    /// File the IOPGPS access token is kept in across restarts.
    #[clap(long = "token-file", env = "TOKEN_FILE")]
    token_file: Option<PathBuf>,
    /// Log output format: pretty or json.
    #[clap(long = "log-format", env = "LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,
    /// Log filter directives; RUST_LOG is used when absent.
    #[clap(long = "log-filter")]
    log_filter: Option<String>,
    /// Run a single cycle and exit.
    #[clap(long = "once")]
    once: bool,
}

fn load_config(args: &Args) -> anyhow::Result<AlarmflowConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?
        }
        None => AlarmflowConfig::default(),
    };

    let set = |target: &mut String, value: &Option<String>| {
        if let Some(value) = value {
            target.clone_from(value);
        }
    };
    set(&mut config.backend.url, &args.backend_url);
    set(&mut config.backend.api_key, &args.backend_api_key);
    set(&mut config.iopgps.app_id, &args.iopgps_app_id);
    set(&mut config.iopgps.login_key, &args.iopgps_login_key);
    set(&mut config.whatsgps.token, &args.whatsgps_token);
    set(&mut config.geoapify.api_key, &args.geoapify_api_key);
    set(&mut config.twilio.account_sid, &args.twilio_account_sid);
    set(&mut config.twilio.auth_token, &args.twilio_auth_token);
    set(&mut config.twilio.from, &args.twilio_from);
    if let Some(path) = &args.token_file {
        config.token_file = Some(path.clone());
    }

    config.validate().context("validating configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format, args.log_filter.as_deref())?;

    let config = load_config(&args)?;
    let http = HttpSettings::default()
        .with_timeout(config.http_timeout())
        .build_client()?;

    let backend = Arc::new(BackendClient::new(http.clone(), &config.backend.url, &config.backend.api_key));
    let geocoder: Arc<dyn Geocoder> = if config.geoapify.api_key.is_empty() {
        tracing::warn!("No Geoapify API key, messages will not include addresses");
        Arc::new(NoGeocoder)
    } else {
        Arc::new(GeoapifyClient::new(http.clone(), &config.geoapify.url, &config.geoapify.api_key))
    };
    let delivery = Arc::new(TwilioClient::new(
        http.clone(),
        &config.twilio.url,
        &config.twilio.account_sid,
        &config.twilio.auth_token,
        &config.twilio.from,
    ));

    let persistence: Arc<dyn TokenPersistence> = match &config.token_file {
        Some(path) => Arc::new(FileTokenPersistence::new(path)),
        None => Arc::new(NoopTokenPersistence),
    };
    let issuer = Arc::new(IopgpsTokenIssuer::new(
        http.clone(),
        &config.iopgps.auth_url,
        &config.iopgps.app_id,
        &config.iopgps.login_key,
    ));
    let tokens = Arc::new(TokenStore::new());
    let token_manager = Arc::new(TokenManager::new(tokens.clone(), issuer, persistence));

    let ports = PipelinePorts {
        devices: backend.clone(),
        alarms: backend.clone(),
        contacts: backend,
        geocoder,
        delivery,
    };
    let pipeline = AlarmPipeline::builder(config.clone())
        .with_ports(ports)
        .with_transport(Arc::new(HttpPollTransport::new(http)))
        .with_tokens(tokens)
        .build()?;

    if args.once {
        if !token_manager.load_persisted().await {
            token_manager.refresh().await.context("requesting access token")?;
        }
        let report = pipeline.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let scheduler = Scheduler::new(Arc::new(pipeline), config.schedule).with_token_manager(token_manager);
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
