use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use waitlist_intake::config::load_config;
use waitlist_intake::lifecycle::preflight::run_preflight;

#[derive(Parser)]
#[command(name = "waitlist-cli")]
#[command(about = "Operations CLI for the waitlist intake service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check production settings and store connectivity
    Preflight {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Post a submission to a running instance
    Submit {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,

        #[arg(short, long)]
        email: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Value for the Origin header
        #[arg(long)]
        origin: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Preflight { config } => {
            let config = load_config(config.as_deref())?;
            let report = run_preflight(&config).await;

            let mut lines = report.lines().into_iter();
            if report.passed() {
                lines.for_each(|line| println!("{}", line));
                Ok(ExitCode::SUCCESS)
            } else {
                if let Some(verdict) = lines.next() {
                    eprintln!("{}", verdict);
                }
                lines.for_each(|line| eprintln!("{}", line));
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Submit {
            url,
            email,
            name,
            origin,
        } => {
            let mut body = json!({ "email": email });
            if let Some(name) = name {
                body["name"] = Value::String(name);
            }

            let mut request = reqwest::Client::new()
                .post(format!("{}/api/waitlist", url.trim_end_matches('/')))
                .json(&body);
            if let Some(origin) = origin {
                request = request.header(reqwest::header::ORIGIN, origin);
            }

            let res = request.send().await?;
            print_response(res).await
        }
    }
}

async fn print_response(res: reqwest::Response) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if status.is_success() {
        println!("{}", rendered);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Error: service returned status {}", status);
        eprintln!("{}", rendered);
        Ok(ExitCode::FAILURE)
    }
}
