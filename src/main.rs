use clap::Parser;
use fail_email_extractor::cli::{self, Args, Settings, EXIT_FAILURE};
use fail_email_extractor::{AddressSink, BounceScanner, Error, Result, ScanOutcome};
use secrecy::SecretString;
use std::process::ExitCode;
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

type Output = Box<dyn AsyncWrite + Unpin + Send>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            print_error(&error);
            ExitCode::from(cli::error_exit_code(&error))
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fail_email_extractor=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(args: Args) -> Result<u8> {
    let file = args.load_file()?;
    let mut settings = Settings::resolve(args, file)?;

    if !settings.has_password() {
        settings.set_password(prompt_password(settings.login())?);
    }

    let filter = settings.sender_filter();
    let output = open_output(&settings).await?;
    let config = settings.scan_config()?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let sink = AddressSink::spawn(output);
    let tx = sink.sender();
    let mut code = EXIT_FAILURE;

    BounceScanner::from_config(&config)
        .with_cancellation(cancel)
        .run(
            filter,
            |address| {
                if tx.send(address).is_err() {
                    debug!("Output closed, dropping address");
                }
            },
            |outcome| {
                if let ScanOutcome::Failed { error, .. } = &outcome {
                    print_error(error);
                }
                code = cli::exit_code(&outcome);
            },
        )
        .await;

    drop(tx);
    let (_, written) = sink.finish().await?;
    debug!(written, "Output complete");

    Ok(code)
}

fn prompt_password(login: &str) -> Result<SecretString> {
    rpassword::prompt_password(format!("Password for {login}: "))
        .map(SecretString::from)
        .map_err(|e| Error::InvalidConfig {
            message: format!("cannot read password: {e}"),
        })
}

async fn open_output(settings: &Settings) -> Result<Output> {
    match &settings.out {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .map_err(|source| Error::Output { source })?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupted, stopping after the current message");
        cancel.cancel();
    }
}

fn print_error(error: &Error) {
    eprintln!("error: {error}");
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
