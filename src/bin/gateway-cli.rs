use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use service_gateway::auth::cipher::{open_handle, seal_handle};
use service_gateway::auth::session::unix_now;
use service_gateway::auth::{AccessClaims, AesCbcCipher, TokenKeys};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the service gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a raw user ID into an identity handle
    Seal {
        #[arg(long)]
        cipher_key: String,
        id: String,
    },
    /// Decrypt an identity handle back into the raw user ID
    Open {
        #[arg(long)]
        cipher_key: String,
        handle: String,
    },
    /// Mint an access token for a raw user ID
    Token {
        #[arg(long)]
        signing_key: String,
        #[arg(long)]
        cipher_key: String,
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value_t = 3600)]
        ttl_secs: i64,
    },
    /// Call a gateway route and print the envelope
    Call {
        url: String,
        #[arg(short, long)]
        token: Option<String>,
        /// JSON body; sends a POST when present
        #[arg(short, long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Seal { cipher_key, id } => {
            let cipher = AesCbcCipher::new(cipher_key.as_bytes())?;
            println!("{}", seal_handle(&cipher, &id)?);
        }
        Commands::Open { cipher_key, handle } => {
            let cipher = AesCbcCipher::new(cipher_key.as_bytes())?;
            println!("{}", open_handle(&cipher, &handle)?);
        }
        Commands::Token {
            signing_key,
            cipher_key,
            id,
            name,
            ttl_secs,
        } => {
            let cipher = AesCbcCipher::new(cipher_key.as_bytes())?;
            let handle = seal_handle(&cipher, &id)?;
            let claims = AccessClaims::new(handle, name, unix_now() + ttl_secs);
            println!("{}", TokenKeys::from_secret(signing_key.as_bytes()).sign(&claims)?);
        }
        Commands::Call { url, token, data } => {
            let client = reqwest::Client::new();

            let mut headers = HeaderMap::new();
            if let Some(token) = token.as_deref() {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
            }

            let res = match data {
                Some(body) => {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    client.post(&url).headers(headers).body(body).send().await?
                }
                None => client.get(&url).headers(headers).send().await?,
            };
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
