//! Command-line client for the WeChat Pay V2 gateway.
//!
//! # Usage
//!
//! ```bash
//! # Sign a parameter set offline
//! wxpay --api-key K sign appid=A mch_id=M nonce_str=n1
//!
//! # Query an order against the sandbox
//! wxpay call orderquery out_trade_no=20240101000001
//!
//! # Refund in production with a client certificate
//! wxpay --production --cert-path cert.pem --key-path key.pem \
//!     call refund out_trade_no=o1 out_refund_no=r1 total_fee=100 refund_fee=100
//! ```
//!
//! # Environment Variables
//!
//! Every flag can be set through its `WXPAY_*` variable; a `.env` file in the
//! working directory is loaded first. `RUST_LOG` sets the log filter
//! (default: `info`).

mod args;

use std::io::{Read, Write};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wxpay::{ParameterSet, compute_signature, verify_signature};
use wxpay_http::{Client, RawResponse};

use crate::args::{Cli, Command, to_params};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("wxpay failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Sign { sign_type, params } => {
            let secret = cli
                .merchant
                .api_key
                .as_deref()
                .ok_or("--api-key is required for this command")?;
            let sign = compute_signature(&to_params(&params), secret, sign_type);
            emit(&sign)
        }
        Command::Verify { sign_type, file } => {
            let secret = cli
                .merchant
                .api_key
                .as_deref()
                .ok_or("--api-key is required for this command")?;
            let xml = if file.as_os_str() == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                std::fs::read_to_string(&file)?
            };
            let reply = ParameterSet::from_xml(&xml)?;
            if verify_signature(&reply, secret, sign_type) {
                emit("signature OK")
            } else {
                Err("signature mismatch".into())
            }
        }
        Command::Nonce => emit(&wxpay::nonce_str()),
        Command::Call { endpoint, params } => {
            let client = Client::new(cli.merchant.client_config()?)?;
            let mut params = params.to_params();
            let cancel = cancel_on_ctrl_c();
            tracing::info!(%endpoint, environment = %client.environment(), "calling gateway");
            let reply = client.call(endpoint, &mut params, Some(&cancel)).await?;
            print_reply(&reply)
        }
        Command::Post { path, cert, params } => {
            let client = Client::new(cli.merchant.client_config()?)?;
            let mut params = params.to_params();
            let cancel = cancel_on_ctrl_c();
            let reply = client
                .post_api(&path, &mut params, cert, Some(&cancel))
                .await?;
            print_reply(&reply)
        }
        Command::Get {
            path,
            sign_type,
            params,
        } => {
            let client = Client::new(cli.merchant.client_config()?)?;
            let mut params = params.to_params();
            let cancel = cancel_on_ctrl_c();
            let reply = client
                .get(&path, &mut params, sign_type, Some(&cancel))
                .await?;
            print_reply(&reply)
        }
    }
}

/// Returns a token that is cancelled on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, cancelling...");
            trigger.cancel();
        }
    });
    token
}

fn print_reply(reply: &RawResponse) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(url = %reply.url, status = reply.status.as_u16(), "gateway replied");
    emit(&reply.text())
}

fn emit(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut out = std::io::stdout().lock();
    writeln!(out, "{text}")?;
    Ok(())
}
