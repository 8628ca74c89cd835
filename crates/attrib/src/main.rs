use std::path::PathBuf;

use attrib::common::session::{FileSessionStore, SessionStore};
use attrib::{
    CalculationType, Dispatch, ExecutorOptions, ReferralCodeParams, ReferralCodeRequest,
    RewardLocation, SessionData, callback,
};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, miette};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(author, version, about = "attrib - referral code client")]
struct Args {
    /// API base URL
    #[arg(long, default_value = attrib::common::executor::DEFAULT_BASE_URL)]
    base_url: Url,

    /// API key added to every request
    #[arg(long)]
    api_key: Option<String>,

    /// JSON session store to read identifiers from
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Key of the session inside the store
    #[arg(long, default_value = "default")]
    session_key: String,

    /// Identity id (overrides the session store)
    #[arg(long)]
    identity_id: Option<String>,

    /// Device fingerprint id (overrides the session store)
    #[arg(long)]
    device_fingerprint_id: Option<String>,

    /// Session id (overrides the session store)
    #[arg(long)]
    session_id: Option<String>,

    /// Link click id (overrides the session store)
    #[arg(long)]
    link_click_id: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the referral code already generated for this identity
    Fetch,
    /// Mint a new referral code
    Create {
        /// Credits attached to the code
        #[arg(long)]
        amount: i32,
        /// Code prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Expiration, passed through verbatim
        #[arg(long)]
        expiration: Option<String>,
        /// Referral bucket
        #[arg(long)]
        bucket: Option<String>,
        /// Redemption policy
        #[arg(long, value_enum, default_value = "unique")]
        calculation_type: CalculationType,
        /// Reward recipient
        #[arg(long, value_enum, default_value = "referring-user")]
        location: RewardLocation,
    },
}

async fn load_session(args: &Args) -> miette::Result<SessionData> {
    let mut session = match &args.session_file {
        Some(path) => {
            let store = FileSessionStore::open(path).into_diagnostic()?;
            SessionStore::<String, SessionData>::get(&store, &args.session_key)
                .await
                .unwrap_or_default()
        }
        None => SessionData::default(),
    };
    if let Some(id) = &args.identity_id {
        session.identity_id = id.clone();
    }
    if let Some(id) = &args.device_fingerprint_id {
        session.device_fingerprint_id = id.clone();
    }
    if let Some(id) = &args.session_id {
        session.session_id = id.clone();
    }
    if let Some(id) = &args.link_click_id {
        session.link_click_id = id.clone();
    }
    Ok(session)
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let session = load_session(&args).await?;

    let (tx, rx) = tokio::sync::oneshot::channel();
    let cb = Some(callback(move |payload, error| {
        let _ = tx.send((payload, error));
    }));

    let mut request = match &args.command {
        Command::Fetch => ReferralCodeRequest::fetch(&session, cb),
        Command::Create {
            amount,
            prefix,
            expiration,
            bucket,
            calculation_type,
            location,
        } => {
            let params = ReferralCodeParams::new()
                .amount(*amount)
                .maybe_prefix(prefix.clone())
                .maybe_expiration(expiration.clone())
                .maybe_bucket(bucket.clone())
                .calculation_type(*calculation_type)
                .location(*location)
                .build();
            ReferralCodeRequest::create(&session, &params, cb)
        }
    };

    let opts = ExecutorOptions::new()
        .base_url(args.base_url.clone())
        .maybe_api_key(args.api_key.clone())
        .user_agent(concat!("attrib/", env!("CARGO_PKG_VERSION")))
        .build();
    let executor = attrib::basic_executor(opts);

    if executor.execute(&mut request).await == Dispatch::Rejected {
        return Err(miette!("could not build the referral code payload"));
    }

    let (payload, error) = rx.await.into_diagnostic()?;
    if let Some(payload) = payload {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).into_diagnostic()?
        );
    }
    match error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
